use serde_json::{Map, Value};

use crate::{
    constants::MISSING_METRIC,
    core::{
        domain::CapturedOutput,
        metrics::{self, Metric},
        traits::store::{RecordSink, ResultStore, StoreError},
    },
};

/// Run parameters merged with every catalogue metric. Metrics the output
/// does not report are set to `"?"`.
pub fn record(parameters: Map<String, Value>, output: &CapturedOutput) -> Map<String, Value> {
    let mut record: Map<String, Value> = Metric::all()
        .map(|metric| (metric.name().to_string(), Value::from(MISSING_METRIC)))
        .collect();
    record.extend(parameters);
    for (metric, value) in metrics::extract(&output.combined()) {
        record.insert(metric.name().to_string(), value.into());
    }
    record
}

/// Writes one derived record per completed run into `sink`.
#[tracing::instrument(skip_all)]
pub async fn process_results(
    store: &dyn ResultStore,
    sink: &dyn RecordSink,
) -> Result<usize, StoreError> {
    let mut written = 0;

    for configuration in store.configurations().await? {
        let grouping_key = configuration.grouping_key();
        for stem in store.run_stems(&grouping_key).await? {
            let Some(output) = store.load_output(&grouping_key, &stem).await? else {
                continue;
            };
            let parameters = store
                .load_parameters(&grouping_key, &stem)
                .await?
                .unwrap_or_default();

            sink.write_record(&grouping_key, &stem, &record(parameters, &output))
                .await?;
            written += 1;
        }
    }

    tracing::info!("Processed {} runs", written);
    Ok(written)
}
