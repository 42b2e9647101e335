use std::time::Duration;

use crate::core::domain::RunDescriptor;

#[derive(Clone, Debug)]
pub struct SolverOutput {
    /// Exit code, `None` when the process died from a signal.
    pub status: Option<i32>,
    pub stdout: String,
    pub stderr: String,
    pub elapsed: Duration,
}

#[derive(Debug, Clone, thiserror::Error)]
pub enum SolverError {
    #[error("failed to launch solver: {msg}")]
    FailedToLaunch { msg: String },
}

/// Launches one solver process with a fully resolved argument list and
/// waits for it. Resource limits are enforced by the solver itself.
#[mockall::automock]
#[async_trait::async_trait]
pub trait Solver: std::fmt::Debug + Send + Sync {
    async fn solve(&self, args: Vec<String>) -> Result<SolverOutput, SolverError>;
}

/// Translates a run into the argument list handed to the solver.
#[mockall::automock]
pub trait Invocation: std::fmt::Debug + Send + Sync {
    fn arguments(&self, run: &RunDescriptor) -> Vec<String>;
}
