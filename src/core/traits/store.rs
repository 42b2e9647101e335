use std::path::PathBuf;

use serde_json::{Map, Value};

use crate::core::domain::{CapturedOutput, Configuration, RunArtifact, RunKey};

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("i/o error on {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("malformed json in {path}: {source}")]
    Json {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
}

/// Persisted raw run artifacts, addressed by grouping key and
/// `<domain>_<instance>` stem.
#[mockall::automock]
#[async_trait::async_trait]
pub trait ResultStore: std::fmt::Debug + Send + Sync {
    /// Whether the complete artifact of the run is stored.
    async fn has_run(&self, key: &RunKey) -> bool;

    async fn ensure_configuration(&self, configuration: &Configuration) -> Result<(), StoreError>;

    async fn save(&self, artifact: &RunArtifact) -> Result<(), StoreError>;

    /// `None` when the run never completed.
    async fn load_output(
        &self,
        grouping_key: &str,
        stem: &str,
    ) -> Result<Option<CapturedOutput>, StoreError>;

    async fn load_parameters(
        &self,
        grouping_key: &str,
        stem: &str,
    ) -> Result<Option<Map<String, Value>>, StoreError>;

    /// Every stored configuration, sorted.
    async fn configurations(&self) -> Result<Vec<Configuration>, StoreError>;

    /// Stems of every completed run of a configuration, sorted.
    async fn run_stems(&self, grouping_key: &str) -> Result<Vec<String>, StoreError>;
}

/// Destination of derived per-run metric records.
#[mockall::automock]
#[async_trait::async_trait]
pub trait RecordSink: std::fmt::Debug + Send + Sync {
    async fn write_record(
        &self,
        grouping_key: &str,
        stem: &str,
        record: &Map<String, Value>,
    ) -> Result<(), StoreError>;
}
