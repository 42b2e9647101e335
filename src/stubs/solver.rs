use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use crate::core::traits::solver::{Solver, SolverError, SolverOutput};

/// Answers every invocation with the same output after a delay and records
/// how many invocations overlapped.
#[derive(Debug, Clone)]
pub struct SolverStub {
    result: Result<SolverOutput, SolverError>,
    delay: Duration,
    in_flight: Arc<AtomicUsize>,
    peak: Arc<AtomicUsize>,
    calls: Arc<AtomicUsize>,
}

impl SolverStub {
    pub fn new(result: Result<SolverOutput, SolverError>, delay: Duration) -> Self {
        Self {
            result,
            delay,
            in_flight: Arc::new(AtomicUsize::new(0)),
            peak: Arc::new(AtomicUsize::new(0)),
            calls: Arc::new(AtomicUsize::new(0)),
        }
    }

    pub fn solved(stdout: &str, delay: Duration) -> Self {
        Self::new(
            Ok(SolverOutput {
                status: Some(0),
                stdout: stdout.to_string(),
                stderr: String::new(),
                elapsed: delay,
            }),
            delay,
        )
    }

    /// Highest number of invocations that were running at the same time.
    pub fn peak_in_flight(&self) -> usize {
        self.peak.load(Ordering::SeqCst)
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait::async_trait]
impl Solver for SolverStub {
    #[tracing::instrument(skip_all)]
    async fn solve(&self, args: Vec<String>) -> Result<SolverOutput, SolverError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let running = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.peak.fetch_max(running, Ordering::SeqCst);

        tracing::debug!("Solving with arguments: {:?}", args);
        tokio::time::sleep(self.delay).await;
        tracing::debug!("Solver result: {:?}", self.result);

        self.in_flight.fetch_sub(1, Ordering::SeqCst);
        self.result.clone()
    }
}
