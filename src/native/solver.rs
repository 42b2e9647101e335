use std::path::{Path, PathBuf};
use std::process::Stdio;

use tokio::process::Command;
use tokio::time::Instant;

use crate::core::traits::solver::{Solver, SolverError, SolverOutput};

/// Runs the solver as a child process of the driver. The child is killed
/// if the run is abandoned before it exits.
#[derive(Clone, Debug)]
pub struct ProcessSolver {
    working_dir: PathBuf,
}

impl ProcessSolver {
    pub fn new<T: AsRef<Path>>(working_dir: T) -> Self {
        Self {
            working_dir: working_dir.as_ref().into(),
        }
    }
}

#[async_trait::async_trait]
impl Solver for ProcessSolver {
    async fn solve(&self, args: Vec<String>) -> Result<SolverOutput, SolverError> {
        let Some((program, args)) = args.split_first() else {
            return Err(SolverError::FailedToLaunch {
                msg: "empty command line".to_string(),
            });
        };

        let start_time = Instant::now();
        let output = Command::new(program)
            .args(args)
            .current_dir(&self.working_dir)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| SolverError::FailedToLaunch {
                msg: format!("Failed to spawn {}: {}", program, e),
            })?
            .wait_with_output()
            .await
            .map_err(|e| SolverError::FailedToLaunch {
                msg: format!("Failed to wait for {}: {}", program, e),
            })?;

        Ok(SolverOutput {
            status: output.status.code(),
            stdout: String::from_utf8_lossy(&output.stdout).to_string(),
            stderr: String::from_utf8_lossy(&output.stderr).to_string(),
            elapsed: start_time.elapsed(),
        })
    }
}
