use std::path::{Path, PathBuf};

use itertools::iproduct;
use serde::{Deserialize, Serialize};

use crate::{
    constants::DEFAULT_PARALLELISM,
    core::{
        domain::{Configuration, MemoryLimit, OpenListLimit, TimeLimit},
        pipeline::planning::DependencyPolicy,
    },
};

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("i/o error on {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("invalid plan {path}: {source}")]
    Invalid {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
}

/// Working tree of a benchmark campaign.
#[derive(Clone, Debug)]
pub struct Layout {
    root: PathBuf,
}

impl Layout {
    pub fn new<T: AsRef<Path>>(root: T) -> Self {
        Self {
            root: root.as_ref().into(),
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn instances(&self) -> PathBuf {
        self.root.join("instances")
    }

    pub fn results(&self) -> PathBuf {
        self.root.join("results")
    }

    pub fn processed_results(&self) -> PathBuf {
        self.root.join("processed_results")
    }

    pub fn analysis(&self) -> PathBuf {
        self.root.join("analysis")
    }

    /// Scratch space for translator output, emptied before every campaign.
    pub fn trash(&self) -> PathBuf {
        self.root.join("trash")
    }

    pub async fn empty_trash(&self) -> Result<(), ConfigError> {
        let trash = self.trash();
        let io_error = |source| ConfigError::Io {
            path: trash.clone(),
            source,
        };
        match tokio::fs::remove_dir_all(&trash).await {
            Ok(()) => {}
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => return Err(io_error(e)),
        }
        tokio::fs::create_dir_all(&trash).await.map_err(io_error)
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SolverSettings {
    pub program: String,
    pub driver: String,
}

impl Default for SolverSettings {
    fn default() -> Self {
        Self {
            program: "python3".to_string(),
            driver: "./fast-downward.py".to_string(),
        }
    }
}

/// Cartesian product of configuration fields.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ConfigurationMatrix {
    pub suite: String,
    pub cost_system: String,
    pub memory_limit: MemoryLimit,
    pub time_limit: TimeLimit,
    pub algorithms: Vec<String>,
    pub open_limits: Vec<OpenListLimit>,
    pub heuristics: Vec<String>,
}

impl ConfigurationMatrix {
    pub fn expand(&self) -> Vec<Configuration> {
        iproduct!(&self.algorithms, &self.open_limits, &self.heuristics)
            .map(|(algorithm, open_list_limit, heuristic)| Configuration {
                suite: self.suite.clone(),
                cost_system: self.cost_system.clone(),
                heuristic: heuristic.clone(),
                algorithm: algorithm.clone(),
                open_list_limit: *open_list_limit,
                memory_limit: self.memory_limit,
                time_limit: self.time_limit,
            })
            .collect()
    }
}

/// Runs of one stage only depend on results of earlier stages.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Stage {
    pub name: String,
    pub matrices: Vec<ConfigurationMatrix>,
}

impl Stage {
    pub fn configurations(&self) -> Vec<Configuration> {
        self.matrices
            .iter()
            .flat_map(ConfigurationMatrix::expand)
            .collect()
    }
}

fn default_parallelism() -> usize {
    DEFAULT_PARALLELISM
}

fn default_prune() -> bool {
    true
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct BenchmarkPlan {
    #[serde(default)]
    pub solver: SolverSettings,
    #[serde(default = "default_parallelism")]
    pub parallelism: usize,
    #[serde(default = "default_prune")]
    pub prune: bool,
    #[serde(default)]
    pub dependencies: DependencyPolicy,
    pub stages: Vec<Stage>,
}

impl BenchmarkPlan {
    pub async fn load(path: &Path) -> Result<Self, ConfigError> {
        let text = tokio::fs::read_to_string(path)
            .await
            .map_err(|source| ConfigError::Io {
                path: path.into(),
                source,
            })?;
        serde_json::from_str(&text).map_err(|source| ConfigError::Invalid {
            path: path.into(),
            source,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const PLAN: &str = r#"{
        "parallelism": 4,
        "stages": [
            {
                "name": "baselines",
                "matrices": [{
                    "suite": "FD-IPC-opt-strips",
                    "cost_system": "real-costs",
                    "memory_limit": "2G",
                    "time_limit": "10m",
                    "algorithms": ["edd-eh"],
                    "open_limits": ["unlimited"],
                    "heuristics": ["lmcut", "blind"]
                }]
            },
            {
                "name": "hybrid",
                "matrices": [{
                    "suite": "FD-IPC-opt-strips",
                    "cost_system": "real-costs",
                    "memory_limit": "2G",
                    "time_limit": "360m",
                    "algorithms": ["pe-edd-eh", "edd-eh"],
                    "open_limits": ["limited-90", "limited-50", "limited-10"],
                    "heuristics": ["lmcut"]
                }]
            }
        ]
    }"#;

    #[test]
    fn test_plan_defaults_and_expansion() {
        let plan: BenchmarkPlan = serde_json::from_str(PLAN).unwrap();
        assert_eq!(plan.parallelism, 4);
        assert!(plan.prune);
        assert_eq!(plan.solver, SolverSettings::default());
        assert_eq!(plan.dependencies, DependencyPolicy::default());

        assert_eq!(plan.stages[0].configurations().len(), 2);
        let hybrid = plan.stages[1].configurations();
        assert_eq!(hybrid.len(), 6);
        assert_eq!(hybrid[0].algorithm, "pe-edd-eh");
        assert_eq!(hybrid[0].open_list_limit, OpenListLimit::Limited { percent: 90 });
        assert_eq!(hybrid[0].time_limit.seconds(), 360 * 60);
    }

    #[test]
    fn test_bundled_plan_parses() {
        let plan: BenchmarkPlan =
            serde_json::from_str(include_str!("../plans/fd-ipc-opt-strips.json")).unwrap();
        let stages = plan.stages.iter().map(|stage| stage.name.as_str()).collect::<Vec<_>>();
        assert_eq!(stages, ["astar", "blind-astar", "hybrid", "artificial-hybrid"]);

        let pebound = plan.stages[3].configurations();
        assert_eq!(pebound.len(), 3);
        assert_eq!(pebound[2].open_list_limit.pebound(), Some(10));
    }

    #[test]
    fn test_invalid_limit_is_rejected() {
        let broken = PLAN.replace("\"2G\"", "\"2X\"");
        assert!(serde_json::from_str::<BenchmarkPlan>(&broken).is_err());
    }

    #[tokio::test]
    async fn test_empty_trash() {
        let layout = Layout::new(format!("/tmp/benchrunner_{}", uuid::Uuid::new_v4()));
        layout.empty_trash().await.unwrap();
        tokio::fs::write(layout.trash().join("stale.sas"), "begin_version")
            .await
            .unwrap();

        layout.empty_trash().await.unwrap();
        let mut entries = tokio::fs::read_dir(layout.trash()).await.unwrap();
        assert!(entries.next_entry().await.unwrap().is_none());

        tokio::fs::remove_dir_all(layout.root()).await.unwrap();
    }

    #[tokio::test]
    async fn test_load_reports_missing_file() {
        let result = BenchmarkPlan::load(Path::new("/nonexistent/plan.json")).await;
        assert!(matches!(result, Err(ConfigError::Io { .. })));
    }
}
