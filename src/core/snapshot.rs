use std::collections::HashMap;

use crate::core::domain::{CapturedOutput, Configuration, RunKey};
use crate::core::outcome::{self, Outcome};
use crate::core::traits::store::{ResultStore, StoreError};

/// Immutable view of every result persisted before a batch starts.
///
/// Dependency checks read only from here, never from runs of the batch
/// being planned.
#[derive(Clone, Debug, Default)]
pub struct ResultsSnapshot {
    configurations: Vec<Configuration>,
    runs: HashMap<(String, String), CapturedOutput>,
}

impl ResultsSnapshot {
    pub fn new(configurations: Vec<Configuration>) -> Self {
        Self {
            configurations,
            runs: HashMap::new(),
        }
    }

    /// Reads every completed run of every stored configuration.
    #[tracing::instrument(skip(store))]
    pub async fn load(store: &dyn ResultStore) -> Result<Self, StoreError> {
        let configurations = store.configurations().await?;
        let mut snapshot = Self::new(configurations.clone());

        for configuration in &configurations {
            let grouping_key = configuration.grouping_key();
            for stem in store.run_stems(&grouping_key).await? {
                if let Some(output) = store.load_output(&grouping_key, &stem).await? {
                    snapshot.insert(grouping_key.clone(), stem, output);
                }
            }
        }

        tracing::debug!(
            "Loaded {} runs of {} configurations",
            snapshot.len(),
            configurations.len()
        );
        Ok(snapshot)
    }

    pub fn insert(&mut self, grouping_key: String, stem: String, output: CapturedOutput) {
        self.runs.insert((grouping_key, stem), output);
    }

    pub fn configurations(&self) -> &[Configuration] {
        &self.configurations
    }

    pub fn output(
        &self,
        configuration: &Configuration,
        domain: &str,
        instance: &str,
    ) -> Option<&CapturedOutput> {
        let key = RunKey::new(configuration, domain, instance);
        self.runs.get(&(key.grouping_key.clone(), key.stem()))
    }

    pub fn outcome(&self, configuration: &Configuration, domain: &str, instance: &str) -> Outcome {
        outcome::status(self.output(configuration, domain, instance))
    }

    pub fn len(&self) -> usize {
        self.runs.len()
    }
}
