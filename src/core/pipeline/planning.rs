use serde::{Deserialize, Serialize};

use crate::core::{
    domain::{Configuration, OpenListLimit, RunDescriptor, TimeLimit},
    metrics::{self, Metric, MetricValue},
    outcome::Outcome,
    snapshot::ResultsSnapshot,
    traits::catalog::{CatalogError, InstanceCatalog},
};

/// Which earlier results a run needs before it is worth executing.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DependencyPolicy {
    /// Heuristic of the uninformed baseline.
    pub blind_heuristic: String,
    pub baseline_time_limit: TimeLimit,
    pub baseline_algorithm: String,
    /// Limited-open-list siblings that must all be solved before a
    /// `limited-N-pebound-M` run.
    pub hybrid_algorithms: Vec<String>,
    pub hybrid_percents: Vec<u32>,
    /// Algorithm of the run that supplies the second-phase lower bound.
    pub reference_algorithm: String,
}

impl Default for DependencyPolicy {
    fn default() -> Self {
        Self {
            blind_heuristic: "blind".to_string(),
            baseline_time_limit: TimeLimit::minutes(10),
            baseline_algorithm: "edd-eh".to_string(),
            hybrid_algorithms: vec!["pe-edd-eh".to_string(), "edd-eh".to_string()],
            hybrid_percents: vec![10, 50],
            reference_algorithm: "pe-edd-eh".to_string(),
        }
    }
}

/// Why a run was left out of a batch.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Exclusion {
    NoSolvedHeuristicSibling,
    BaselineUnsolved,
    BlindBaselineMissing,
    BlindBaselineSolved,
    BaselineWithoutOpenPeak,
    HybridSiblingUnsolved { algorithm: String, percent: u32 },
    ReferenceWithoutBound,
}

/// Checks `run` against earlier results and fills in the limits derived
/// from them.
///
/// * unlimited runs of the blind heuristic need a sibling configuration,
///   differing only by heuristic, that solved the instance;
/// * limited runs need a solved unlimited baseline that reports its open
///   peak size, and a blind baseline that ran without solving it. The open
///   limit is the configured percentage of that peak, rounded up;
/// * `pebound` runs additionally need every hybrid sibling solved and take
///   their second-phase lower bound from the reference run: its minimum
///   F-value at the phase transition, or else its plan cost.
pub fn resolve(
    snapshot: &ResultsSnapshot,
    policy: &DependencyPolicy,
    mut run: RunDescriptor,
) -> Result<RunDescriptor, Exclusion> {
    let configuration = run.configuration.clone();
    let (domain, instance) = (run.domain.clone(), run.instance.clone());
    let outcome_of = |other: &Configuration| snapshot.outcome(other, &domain, &instance);
    let metrics_of = |other: &Configuration| {
        snapshot
            .output(other, &domain, &instance)
            .map(|output| metrics::extract(&output.combined()))
            .unwrap_or_default()
    };

    if configuration.open_list_limit.is_unlimited() {
        if configuration.heuristic == policy.blind_heuristic {
            let solved_by_sibling = snapshot
                .configurations()
                .iter()
                .filter(|other| other.differs_only_by_heuristic(&configuration))
                .any(|other| outcome_of(other) == Outcome::FoundSolution);
            if !solved_by_sibling {
                return Err(Exclusion::NoSolvedHeuristicSibling);
            }
        }
        return Ok(run);
    }

    let baseline = Configuration {
        time_limit: policy.baseline_time_limit,
        algorithm: policy.baseline_algorithm.clone(),
        open_list_limit: OpenListLimit::Unlimited,
        ..configuration.clone()
    };
    if outcome_of(&baseline) != Outcome::FoundSolution {
        return Err(Exclusion::BaselineUnsolved);
    }

    let blind = Configuration {
        heuristic: policy.blind_heuristic.clone(),
        ..baseline.clone()
    };
    match outcome_of(&blind) {
        Outcome::Nonexistent => return Err(Exclusion::BlindBaselineMissing),
        Outcome::FoundSolution => return Err(Exclusion::BlindBaselineSolved),
        _ => {}
    }

    let peak = metrics_of(&baseline)
        .get(&Metric::OpenPeakSize)
        .and_then(MetricValue::as_u64)
        .ok_or(Exclusion::BaselineWithoutOpenPeak)?;
    let percent = configuration.open_list_limit.percent().unwrap_or(100);
    run.open_limit = Some((peak * u64::from(percent)).div_ceil(100));

    let Some(pebound) = configuration.open_list_limit.pebound() else {
        return Ok(run);
    };

    for algorithm in &policy.hybrid_algorithms {
        for &percent in &policy.hybrid_percents {
            let sibling = Configuration {
                algorithm: algorithm.clone(),
                open_list_limit: OpenListLimit::Limited { percent },
                ..configuration.clone()
            };
            if outcome_of(&sibling) != Outcome::FoundSolution {
                return Err(Exclusion::HybridSiblingUnsolved {
                    algorithm: algorithm.clone(),
                    percent,
                });
            }
        }
    }

    let reference = Configuration {
        algorithm: policy.reference_algorithm.clone(),
        open_list_limit: OpenListLimit::Limited { percent: pebound },
        ..configuration.clone()
    };
    let metrics = metrics_of(&reference);
    let bound = metrics
        .get(&Metric::MinFAtPhaseChange)
        .or_else(|| metrics.get(&Metric::SolutionCost))
        .and_then(MetricValue::as_u64)
        .ok_or(Exclusion::ReferenceWithoutBound)?;
    run.second_phase_lower_bound = Some(bound);

    Ok(run)
}

/// Runs requested for a stage after dependency filtering.
#[derive(Debug, Default)]
pub struct Batch {
    pub runs: Vec<RunDescriptor>,
    pub requested: usize,
    pub excluded: usize,
}

/// Expands every configuration over the instances of its suite and keeps
/// the runs whose dependencies hold in `snapshot`.
#[tracing::instrument(skip_all, fields(configurations = configurations.len()))]
pub fn plan(
    configurations: &[Configuration],
    catalog: &dyn InstanceCatalog,
    snapshot: &ResultsSnapshot,
    policy: &DependencyPolicy,
) -> Result<Batch, CatalogError> {
    let mut batch = Batch::default();

    for configuration in configurations {
        for domain in catalog.domains(&configuration.suite)? {
            let entries = match catalog.instances(&configuration.suite, &domain) {
                Ok(entries) => entries,
                Err(e) => {
                    tracing::warn!("Skipping domain {}: {}", domain, e);
                    continue;
                }
            };

            for entry in entries {
                batch.requested += 1;
                let run = RunDescriptor::new(configuration.clone(), &entry);
                match resolve(snapshot, policy, run) {
                    Ok(run) => batch.runs.push(run),
                    Err(exclusion) => {
                        batch.excluded += 1;
                        tracing::debug!(
                            "Excluding {}/{} of {}: {:?}",
                            entry.domain,
                            entry.instance,
                            configuration,
                            exclusion
                        );
                    }
                }
            }
        }
    }

    tracing::info!(
        "Planned {} of {} runs ({} excluded by dependencies)",
        batch.runs.len(),
        batch.requested,
        batch.excluded
    );
    Ok(batch)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::domain::{CapturedOutput, fixtures};
    use crate::core::traits::catalog::{InstanceEntry, MockInstanceCatalog};

    const DOMAIN: &str = "gripper";
    const INSTANCE: &str = "prob01";

    fn lmcut() -> Configuration {
        fixtures::configuration()
    }

    fn with(
        configuration: Configuration,
        change: impl FnOnce(&mut Configuration),
    ) -> Configuration {
        let mut configuration = configuration;
        change(&mut configuration);
        configuration
    }

    fn blind() -> Configuration {
        with(lmcut(), |c| c.heuristic = "blind".to_string())
    }

    fn limited(algorithm: &str, open_list_limit: OpenListLimit) -> Configuration {
        with(lmcut(), |c| {
            c.algorithm = algorithm.to_string();
            c.open_list_limit = open_list_limit;
            c.time_limit = "360m".parse().unwrap();
        })
    }

    fn record(snapshot: &mut ResultsSnapshot, configuration: &Configuration, stdout: &str) {
        snapshot.insert(
            configuration.grouping_key(),
            format!("{DOMAIN}_{INSTANCE}"),
            CapturedOutput {
                stdout: stdout.to_string(),
                stderr: String::new(),
            },
        );
    }

    fn run(configuration: Configuration) -> RunDescriptor {
        fixtures::run(configuration, DOMAIN, INSTANCE)
    }

    fn baselines() -> ResultsSnapshot {
        let mut snapshot = ResultsSnapshot::new(vec![lmcut(), blind()]);
        record(
            &mut snapshot,
            &lmcut(),
            "Solution found!\nOpen peak size: 1001 states\nPlan cost: 12\n",
        );
        record(&mut snapshot, &blind(), "Time limit has been reached\n");
        snapshot
    }

    #[test]
    fn test_unconstrained_runs_have_no_dependencies() {
        let resolved = resolve(
            &ResultsSnapshot::default(),
            &DependencyPolicy::default(),
            run(lmcut()),
        );
        assert_eq!(resolved, Ok(run(lmcut())));
    }

    #[test]
    fn test_blind_baseline_needs_solved_sibling() {
        let policy = DependencyPolicy::default();
        let mut snapshot = ResultsSnapshot::new(vec![lmcut(), blind()]);
        assert_eq!(
            resolve(&snapshot, &policy, run(blind())),
            Err(Exclusion::NoSolvedHeuristicSibling)
        );

        record(&mut snapshot, &lmcut(), "Solution found!\n");
        assert!(resolve(&snapshot, &policy, run(blind())).is_ok());
    }

    #[test]
    fn test_limited_run_derives_open_limit() {
        let policy = DependencyPolicy::default();
        let resolved = resolve(
            &baselines(),
            &policy,
            run(limited("edd-eh", OpenListLimit::Limited { percent: 10 })),
        )
        .unwrap();
        // ceil(1001 * 10 / 100)
        assert_eq!(resolved.open_limit, Some(101));
        assert_eq!(resolved.second_phase_lower_bound, None);
    }

    #[test]
    fn test_limited_run_excluded_when_baseline_hit_a_limit() {
        let policy = DependencyPolicy::default();
        let mut snapshot = baselines();
        record(&mut snapshot, &lmcut(), "Time limit has been reached\n");

        assert_eq!(
            resolve(
                &snapshot,
                &policy,
                run(limited("edd-eh", OpenListLimit::Limited { percent: 50 }))
            ),
            Err(Exclusion::BaselineUnsolved)
        );
    }

    #[test]
    fn test_limited_run_needs_unsolved_blind_baseline() {
        let policy = DependencyPolicy::default();
        let target = run(limited("edd-eh", OpenListLimit::Limited { percent: 50 }));

        let mut snapshot = baselines();
        record(&mut snapshot, &blind(), "Solution found!\n");
        assert_eq!(
            resolve(&snapshot, &policy, target.clone()),
            Err(Exclusion::BlindBaselineSolved)
        );

        let mut snapshot = ResultsSnapshot::new(vec![lmcut()]);
        record(&mut snapshot, &lmcut(), "Solution found!\nOpen peak size: 10\n");
        assert_eq!(
            resolve(&snapshot, &policy, target),
            Err(Exclusion::BlindBaselineMissing)
        );
    }

    #[test]
    fn test_limited_run_needs_open_peak() {
        let policy = DependencyPolicy::default();
        let mut snapshot = baselines();
        record(&mut snapshot, &lmcut(), "Solution found!\n");
        assert_eq!(
            resolve(
                &snapshot,
                &policy,
                run(limited("edd-eh", OpenListLimit::Limited { percent: 50 }))
            ),
            Err(Exclusion::BaselineWithoutOpenPeak)
        );
    }

    #[test]
    fn test_pebound_run_takes_reference_bound() {
        let policy = DependencyPolicy::default();
        let mut snapshot = baselines();
        for algorithm in ["pe-edd-eh", "edd-eh"] {
            for percent in [10, 50] {
                record(
                    &mut snapshot,
                    &limited(algorithm, OpenListLimit::Limited { percent }),
                    "Solution found!\nPlan cost: 12\n",
                );
            }
        }
        let target = run(limited(
            "edd-eh",
            OpenListLimit::LimitedPeBound {
                percent: 10,
                pebound: 10,
            },
        ));

        let resolved = resolve(&snapshot, &policy, target.clone()).unwrap();
        assert_eq!(resolved.second_phase_lower_bound, Some(12));
        assert_eq!(resolved.open_limit, Some(101));

        record(
            &mut snapshot,
            &limited("pe-edd-eh", OpenListLimit::Limited { percent: 10 }),
            "Solution found!\nMininum F-value at phase transition: 9\nPlan cost: 12\n",
        );
        let resolved = resolve(&snapshot, &policy, target).unwrap();
        assert_eq!(resolved.second_phase_lower_bound, Some(9));
    }

    #[test]
    fn test_pebound_run_needs_every_hybrid_sibling() {
        let policy = DependencyPolicy::default();
        let mut snapshot = baselines();
        record(
            &mut snapshot,
            &limited("pe-edd-eh", OpenListLimit::Limited { percent: 10 }),
            "Solution found!\nPlan cost: 12\n",
        );
        let target = run(limited(
            "edd-eh",
            OpenListLimit::LimitedPeBound {
                percent: 10,
                pebound: 10,
            },
        ));

        assert_eq!(
            resolve(&snapshot, &policy, target),
            Err(Exclusion::HybridSiblingUnsolved {
                algorithm: "pe-edd-eh".to_string(),
                percent: 50
            })
        );
    }

    #[test]
    fn test_plan_counts_requested_and_excluded() {
        let mut catalog = MockInstanceCatalog::new();
        catalog
            .expect_domains()
            .returning(|_| Ok(vec![DOMAIN.to_string()]));
        catalog.expect_instances().returning(|_, domain| {
            Ok(["prob01", "prob02"]
                .iter()
                .enumerate()
                .map(|(index, instance)| InstanceEntry {
                    domain: domain.to_string(),
                    domain_file: "domain".to_string(),
                    instance: instance.to_string(),
                    index,
                })
                .collect())
        });

        // prob01 has solved baselines, prob02 has nothing
        let configurations = vec![
            lmcut(),
            limited("edd-eh", OpenListLimit::Limited { percent: 10 }),
        ];
        let batch = plan(
            &configurations,
            &catalog,
            &baselines(),
            &DependencyPolicy::default(),
        )
        .unwrap();

        assert_eq!(batch.requested, 4);
        assert_eq!(batch.excluded, 1);
        assert_eq!(batch.runs.len(), 3);
        assert_eq!(batch.runs.len() + batch.excluded, batch.requested);
        assert_eq!(
            baselines().outcome(&batch.runs[0].configuration, DOMAIN, INSTANCE),
            Outcome::FoundSolution
        );
    }
}
