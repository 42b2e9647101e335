use std::path::{Path, PathBuf};

use crate::{
    constants::UNDEFINED_CELL,
    core::{
        aggregation::{Domain, Instance, Node, Suite},
        domain::{Configuration, RunKey},
        metrics::Metric,
        outcome,
        traits::{
            catalog::{CatalogError, InstanceCatalog},
            store::{ResultStore, StoreError},
        },
    },
};

#[derive(Debug, thiserror::Error)]
pub enum AnalysisError {
    #[error(transparent)]
    Catalog(#[from] CatalogError),
    #[error(transparent)]
    Store(#[from] StoreError),
    #[error("failed to write report {path}: {source}")]
    Write {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// Grouping-key substrings a configuration must contain (`include`) or
/// must not contain (`exclude`) to become a report column.
#[derive(Clone, Debug, Default)]
pub struct Selection {
    pub include: Vec<String>,
    pub exclude: Vec<String>,
}

impl Selection {
    pub fn matches(&self, configuration: &Configuration) -> bool {
        let key = configuration.grouping_key();
        self.include.iter().all(|part| key.contains(part.as_str()))
            && !self.exclude.iter().any(|part| key.contains(part.as_str()))
    }
}

/// Builds the aggregation tree of `suite`, one classification per
/// instance and column.
pub async fn build_suite(
    suite: &str,
    columns: &[Configuration],
    catalog: &dyn InstanceCatalog,
    store: &dyn ResultStore,
    metrics: &[Metric],
) -> Result<Suite, AnalysisError> {
    let mut domains = Vec::new();

    for domain in catalog.domains(suite)? {
        let entries = match catalog.instances(suite, &domain) {
            Ok(entries) => entries,
            Err(e) => {
                tracing::warn!("Leaving {} out of the report: {}", domain, e);
                continue;
            }
        };

        let mut instances = Vec::with_capacity(entries.len());
        for entry in entries {
            let mut results = Vec::with_capacity(columns.len());
            for configuration in columns {
                let key = RunKey::new(configuration, &entry.domain, &entry.instance);
                let output = store.load_output(&key.grouping_key, &key.stem()).await?;
                results.push(outcome::classify(output.as_ref(), metrics));
            }
            instances.push(Instance::new(entry.instance, results));
        }
        domains.push(Domain::new(domain, instances));
    }

    Ok(Suite::from_domains(suite, domains))
}

/// heuristic, time_limit, memory_limit, cost_system, algorithm, open_limitness
const HEADERS: &[fn(&Configuration) -> String] = &[
    |c| c.heuristic.clone(),
    |c| c.time_limit.to_string(),
    |c| c.memory_limit.to_string(),
    |c| c.cost_system.clone(),
    |c| c.algorithm.clone(),
    |c| c.open_list_limit.to_string(),
];

const COUNT_COLUMNS: &[&str] = &["f.s.", "f.i.", "m.o.", "t.o."];

fn row<N: Node>(name: &str, node: &N, columns: usize, metrics: &[Metric]) -> String {
    let mut cells = vec![
        name.to_string(),
        node.number_of_instances().to_string(),
        node.coverage().to_string(),
    ];
    for index in 0..columns {
        cells.extend([
            node.number_of_solutions_found(index).to_string(),
            node.number_of_insolutions_found(index).to_string(),
            node.number_of_failures_by_memory(index).to_string(),
            node.number_of_failures_by_time(index).to_string(),
        ]);
        cells.extend(metrics.iter().map(|metric| {
            node.metric_aggregation(index, *metric)
                .map_or_else(|| UNDEFINED_CELL.to_string(), |value| format!("{value:.2}"))
        }));
    }
    cells.join(",")
}

/// Renders the suite as CSV: one header row per configuration field, the
/// column names, the `ALL` row, then every super-domain followed by its
/// domains. Domain rows are named `<super-domain>/<domain>`.
pub fn render_report(suite: &Suite, columns: &[Configuration], metrics: &[Metric]) -> String {
    let width = COUNT_COLUMNS.len() + metrics.len();
    let mut lines = Vec::new();

    for field in HEADERS {
        let mut cells = vec![String::new(); 3];
        for configuration in columns {
            cells.push(field(configuration));
            cells.extend(std::iter::repeat_n(String::new(), width - 1));
        }
        lines.push(cells.join(","));
    }

    let mut names = vec!["Super Domain".to_string(), "n".to_string(), "c".to_string()];
    for _ in columns {
        names.extend(COUNT_COLUMNS.iter().map(|name| name.to_string()));
        names.extend(metrics.iter().map(|metric| metric.name().to_string()));
    }
    lines.push(names.join(","));

    lines.push(row("ALL", suite, columns.len(), metrics));
    for super_domain in suite.children() {
        lines.push(row(super_domain.name(), super_domain, columns.len(), metrics));
        for domain in super_domain.children() {
            let name = format!("{}/{}", super_domain.name(), domain.name());
            lines.push(row(&name, domain, columns.len(), metrics));
        }
    }

    lines.join("\n") + "\n"
}

/// Writes `<out_dir>/<suite>.csv` for every suite with at least one
/// selected configuration and returns the written paths.
#[tracing::instrument(skip(catalog, store))]
pub async fn analyze(
    catalog: &dyn InstanceCatalog,
    store: &dyn ResultStore,
    selection: &Selection,
    metrics: &[Metric],
    out_dir: &Path,
) -> Result<Vec<PathBuf>, AnalysisError> {
    let configurations = store.configurations().await?;
    let mut reports = Vec::new();

    for suite in catalog.suites()? {
        let columns: Vec<Configuration> = configurations
            .iter()
            .filter(|configuration| {
                configuration.suite == suite && selection.matches(configuration)
            })
            .cloned()
            .collect();
        if columns.is_empty() {
            tracing::debug!("No selected configuration for suite {}", suite);
            continue;
        }

        let tree = build_suite(&suite, &columns, catalog, store, metrics).await?;
        let path = out_dir.join(format!("{suite}.csv"));
        let write_error = |source| AnalysisError::Write {
            path: path.clone(),
            source,
        };
        tokio::fs::create_dir_all(out_dir).await.map_err(write_error)?;
        tokio::fs::write(&path, render_report(&tree, &columns, metrics))
            .await
            .map_err(write_error)?;

        tracing::info!(
            "Wrote {} ({} columns, {} of {} instances covered)",
            path.display(),
            columns.len(),
            tree.coverage(),
            tree.number_of_instances()
        );
        for (index, configuration) in columns.iter().enumerate() {
            tracing::info!(
                "  {}: {} covered",
                configuration.grouping_key(),
                tree.coverage_at(index)
            );
        }
        reports.push(path);
    }

    Ok(reports)
}
