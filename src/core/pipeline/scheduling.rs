use std::sync::Arc;

use chrono::{DateTime, Local, TimeDelta};
use futures::stream::FuturesUnordered;
use rand::seq::SliceRandom;
use tokio::sync::{Mutex, Semaphore};
use tokio_stream::StreamExt;

use crate::{
    constants::SEMAPHORE_ERR,
    core::{
        domain::{CapturedOutput, RunArtifact, RunDescriptor},
        outcome,
        traits::{
            solver::{Invocation, Solver, SolverError},
            store::{ResultStore, StoreError},
        },
    },
};

#[derive(Debug, thiserror::Error)]
pub enum ScheduleError {
    #[error("run {run} was interrupted")]
    Interrupted { run: String },
    #[error(transparent)]
    Launch(#[from] SolverError),
    #[error(transparent)]
    Store(#[from] StoreError),
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct SchedulerOptions {
    pub parallelism: usize,
    /// Skip runs whose output is already stored.
    pub prune: bool,
}

/// One of `count` disjoint slices of a batch.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Shard {
    index: usize,
    count: usize,
}

impl Shard {
    pub fn new(index: usize, count: usize) -> Option<Self> {
        (index < count).then_some(Self { index, count })
    }
}

/// Keeps the runs of `shard`, caps them at `limit` and shuffles the rest.
pub fn select(
    runs: Vec<RunDescriptor>,
    shard: Option<Shard>,
    limit: Option<usize>,
) -> Vec<RunDescriptor> {
    let mut runs: Vec<RunDescriptor> = match shard {
        Some(shard) => runs
            .into_iter()
            .enumerate()
            .filter(|(i, _)| i % shard.count == shard.index)
            .map(|(_, run)| run)
            .collect(),
        None => runs,
    };
    if let Some(limit) = limit {
        runs.truncate(limit);
    }
    runs.shuffle(&mut rand::thread_rng());
    runs
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct BatchSummary {
    pub total: usize,
    pub done: usize,
    pub pruned: usize,
}

#[derive(Debug)]
pub struct Progress {
    total: usize,
    done: usize,
    pruned: usize,
    started_at: DateTime<Local>,
}

impl Progress {
    pub fn new(total: usize) -> Self {
        Self::starting_at(total, Local::now())
    }

    fn starting_at(total: usize, started_at: DateTime<Local>) -> Self {
        Self {
            total,
            done: 0,
            pruned: 0,
            started_at,
        }
    }

    /// Extrapolates the mean time per executed run over the runs not yet
    /// attempted. Unknown until a run has finished.
    pub fn expected_end(&self, now: DateTime<Local>) -> Option<DateTime<Local>> {
        if self.done == 0 {
            return None;
        }
        let remaining = self.total.saturating_sub(self.done + self.pruned);
        let elapsed_ms = (now - self.started_at).num_milliseconds() as f64;
        let left_ms = elapsed_ms / self.done as f64 * remaining as f64;
        Some(now + TimeDelta::milliseconds(left_ms as i64))
    }

    fn record_done(&mut self) {
        self.done += 1;
        self.report();
    }

    fn record_pruned(&mut self) {
        self.pruned += 1;
        self.report();
    }

    fn report(&self) {
        let expected_end = self
            .expected_end(Local::now())
            .map(|end| end.format("%Y-%m-%d %H:%M:%S").to_string())
            .unwrap_or_else(|| "unknown".to_string());
        tracing::info!(
            done = self.done,
            pruned = self.pruned,
            total = self.total,
            expected_end = %expected_end,
            "Progress"
        );
    }

    fn summary(&self) -> BatchSummary {
        BatchSummary {
            total: self.total,
            done: self.done,
            pruned: self.pruned,
        }
    }
}

/// Executes batches of runs with at most `parallelism` solvers in flight.
#[derive(Debug)]
pub struct Scheduler {
    solver: Arc<dyn Solver>,
    store: Arc<dyn ResultStore>,
    invocation: Arc<dyn Invocation>,
    options: SchedulerOptions,
}

impl Scheduler {
    pub fn new(
        solver: Arc<dyn Solver>,
        store: Arc<dyn ResultStore>,
        invocation: Arc<dyn Invocation>,
        options: SchedulerOptions,
    ) -> Self {
        Self {
            solver,
            store,
            invocation,
            options,
        }
    }

    /// Runs every descriptor, storing each artifact as it completes.
    ///
    /// Returns on the first interrupted run, launch failure or storage
    /// failure. Runs still in flight are dropped, which kills their
    /// solver processes.
    #[tracing::instrument(skip_all, fields(runs = runs.len()))]
    pub async fn run_batch(&self, runs: Vec<RunDescriptor>) -> Result<BatchSummary, ScheduleError> {
        let semaphore = Semaphore::new(self.options.parallelism.max(1));
        let progress = Mutex::new(Progress::new(runs.len()));

        let mut futures: FuturesUnordered<_> = runs
            .into_iter()
            .map(|run| self.execute(run, &semaphore, &progress))
            .collect();
        while let Some(result) = futures.next().await {
            result?;
        }
        drop(futures);

        let summary = progress.into_inner().summary();
        tracing::info!(
            "Batch finished: {} done, {} pruned of {}",
            summary.done,
            summary.pruned,
            summary.total
        );
        Ok(summary)
    }

    async fn execute(
        &self,
        run: RunDescriptor,
        semaphore: &Semaphore,
        progress: &Mutex<Progress>,
    ) -> Result<(), ScheduleError> {
        let key = run.run_key();
        if self.options.prune && self.store.has_run(&key).await {
            tracing::debug!("Pruning {}", key);
            progress.lock().await.record_pruned();
            return Ok(());
        }

        let permit = semaphore.acquire().await.expect(SEMAPHORE_ERR);
        let args = self.invocation.arguments(&run);
        tracing::debug!("Starting {}: {}", key, args.join(" "));
        let result = self.solver.solve(args).await;
        drop(permit);
        let result = result?;

        let output = CapturedOutput {
            stdout: result.stdout,
            stderr: result.stderr,
        };
        if outcome::indicates_interrupt(&output) {
            tracing::error!("Run {} was interrupted:\n{}", key, output.combined());
            return Err(ScheduleError::Interrupted {
                run: key.to_string(),
            });
        }

        tracing::debug!(
            "Finished {} in {:?} (exit {:?}): {}",
            key,
            result.elapsed,
            result.status,
            outcome::status(Some(&output))
        );
        self.store
            .save(&RunArtifact {
                descriptor: run,
                output,
            })
            .await?;

        progress.lock().await.record_done();
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::domain::{Configuration, fixtures};
    use crate::core::traits::solver::{MockInvocation, MockSolver, SolverOutput};
    use crate::core::traits::store::MockResultStore;
    use crate::stubs::solver::SolverStub;
    use itertools::Itertools;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    fn runs(count: usize) -> Vec<RunDescriptor> {
        (0..count)
            .map(|i| fixtures::run(fixtures::configuration(), "gripper", &format!("prob{i:02}")))
            .collect()
    }

    fn invocation() -> Arc<dyn Invocation> {
        let mut invocation = MockInvocation::new();
        invocation
            .expect_arguments()
            .returning(|run| vec!["solve".to_string(), run.instance.clone()]);
        Arc::new(invocation)
    }

    /// Store holding no runs that accepts every save.
    fn empty_store(saved: Arc<AtomicUsize>) -> MockResultStore {
        let mut store = MockResultStore::new();
        store.expect_has_run().returning(|_| false);
        store.expect_save().returning(move |_| {
            saved.fetch_add(1, Ordering::SeqCst);
            Ok(())
        });
        store
    }

    fn scheduler(
        solver: Arc<dyn Solver>,
        store: MockResultStore,
        options: SchedulerOptions,
    ) -> Scheduler {
        Scheduler::new(solver, Arc::new(store), invocation(), options)
    }

    fn solved_output(stdout: &str) -> SolverOutput {
        SolverOutput {
            status: Some(0),
            stdout: stdout.to_string(),
            stderr: String::new(),
            elapsed: Duration::from_millis(1),
        }
    }

    #[tokio::test]
    async fn test_parallelism_bounds_runs_in_flight() {
        let saved = Arc::new(AtomicUsize::new(0));
        let solver = SolverStub::solved("Solution found!\n", Duration::from_millis(20));
        let options = SchedulerOptions {
            parallelism: 3,
            prune: true,
        };

        let summary = scheduler(Arc::new(solver.clone()), empty_store(saved.clone()), options)
            .run_batch(runs(10))
            .await
            .unwrap();

        assert_eq!(
            summary,
            BatchSummary {
                total: 10,
                done: 10,
                pruned: 0
            }
        );
        assert_eq!(solver.calls(), 10);
        assert!(solver.peak_in_flight() <= 3);
        assert!(solver.peak_in_flight() >= 1);
        assert_eq!(saved.load(Ordering::SeqCst), 10);
    }

    #[tokio::test]
    async fn test_stored_runs_are_pruned() {
        let batch = runs(4);
        let stored = batch[0].run_key();

        let mut store = MockResultStore::new();
        store
            .expect_has_run()
            .times(4)
            .returning(move |key| *key == stored);
        store.expect_save().times(3).returning(|_| Ok(()));

        let mut solver = MockSolver::new();
        solver
            .expect_solve()
            .times(3)
            .returning(|_| Ok(solved_output("Solution found!\n")));
        let options = SchedulerOptions {
            parallelism: 2,
            prune: true,
        };

        let summary = scheduler(Arc::new(solver), store, options)
            .run_batch(batch)
            .await
            .unwrap();
        assert_eq!(summary.done, 3);
        assert_eq!(summary.pruned, 1);
        assert_eq!(summary.done + summary.pruned, summary.total);
    }

    #[tokio::test]
    async fn test_pruning_disabled_reruns_everything() {
        let mut store = MockResultStore::new();
        store.expect_has_run().never();
        store
            .expect_save()
            .times(2)
            .withf(|artifact| artifact.output.stdout == "Solution found!\n")
            .returning(|_| Ok(()));

        let mut solver = MockSolver::new();
        solver
            .expect_solve()
            .times(2)
            .returning(|_| Ok(solved_output("Solution found!\n")));
        let options = SchedulerOptions {
            parallelism: 4,
            prune: false,
        };

        let summary = scheduler(Arc::new(solver), store, options)
            .run_batch(runs(2))
            .await
            .unwrap();
        assert_eq!((summary.done, summary.pruned), (2, 0));
    }

    #[tokio::test]
    async fn test_solver_receives_invocation_arguments() {
        let mut solver = MockSolver::new();
        solver
            .expect_solve()
            .withf(|args| args == &["solve".to_string(), "prob00".to_string()])
            .times(1)
            .returning(|_| Ok(solved_output("Solution found!\n")));
        let options = SchedulerOptions {
            parallelism: 1,
            prune: true,
        };

        let saved = Arc::new(AtomicUsize::new(0));
        scheduler(Arc::new(solver), empty_store(saved.clone()), options)
            .run_batch(runs(1))
            .await
            .unwrap();
        assert_eq!(saved.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_interrupt_aborts_batch_without_storing() {
        let mut solver = MockSolver::new();
        solver.expect_solve().returning(|_| {
            Ok(SolverOutput {
                status: Some(1),
                stdout: String::new(),
                stderr: "Traceback\nKeyboardInterrupt\n".to_string(),
                elapsed: Duration::from_millis(1),
            })
        });
        let mut store = MockResultStore::new();
        store.expect_has_run().returning(|_| false);
        store.expect_save().never();
        let options = SchedulerOptions {
            parallelism: 1,
            prune: true,
        };

        let result = scheduler(Arc::new(solver), store, options)
            .run_batch(runs(3))
            .await;
        assert!(matches!(result, Err(ScheduleError::Interrupted { .. })));
    }

    #[tokio::test]
    async fn test_launch_failure_aborts_batch() {
        let solver = SolverStub::new(
            Err(SolverError::FailedToLaunch {
                msg: "python3 not found".to_string(),
            }),
            Duration::ZERO,
        );
        let mut store = MockResultStore::new();
        store.expect_has_run().returning(|_| false);
        store.expect_save().never();
        let options = SchedulerOptions {
            parallelism: 2,
            prune: true,
        };

        let result = scheduler(Arc::new(solver), store, options)
            .run_batch(runs(2))
            .await;
        assert!(matches!(result, Err(ScheduleError::Launch(_))));
    }

    #[tokio::test]
    async fn test_store_failure_aborts_batch() {
        let mut store = MockResultStore::new();
        store.expect_has_run().returning(|_| false);
        store.expect_save().returning(|_| {
            Err(StoreError::Io {
                path: "/results".into(),
                source: std::io::Error::other("disk full"),
            })
        });
        let solver = SolverStub::solved("Solution found!\n", Duration::ZERO);
        let options = SchedulerOptions {
            parallelism: 1,
            prune: true,
        };

        let result = scheduler(Arc::new(solver), store, options)
            .run_batch(runs(2))
            .await;
        assert!(matches!(result, Err(ScheduleError::Store(_))));
    }

    #[tokio::test]
    async fn test_empty_batch() {
        let options = SchedulerOptions {
            parallelism: 2,
            prune: true,
        };
        let summary = scheduler(Arc::new(MockSolver::new()), MockResultStore::new(), options)
            .run_batch(Vec::new())
            .await
            .unwrap();
        assert_eq!(summary.total, 0);
    }

    #[test]
    fn test_expected_end() {
        let now = Local::now();
        let mut progress = Progress::starting_at(5, now - TimeDelta::seconds(10));
        assert_eq!(progress.expected_end(now), None);

        progress.done = 2;
        progress.pruned = 1;
        // 5s per run, 2 runs left
        assert_eq!(progress.expected_end(now), Some(now + TimeDelta::seconds(10)));

        progress.done = 4;
        assert_eq!(progress.expected_end(now), Some(now));
    }

    #[test]
    fn test_shards_partition_the_batch() {
        let batch = runs(10);
        let count = 3;
        let shards: Vec<Vec<String>> = (0..count)
            .map(|index| {
                select(batch.clone(), Shard::new(index, count), None)
                    .iter()
                    .map(|run| run.instance.clone())
                    .collect()
            })
            .collect();

        assert_eq!(shards[0].len(), 4);
        assert_eq!(shards[1].len(), 3);
        let all: Vec<String> = shards.concat().into_iter().sorted().collect();
        let expected: Vec<String> = batch.iter().map(|run| run.instance.clone()).collect();
        assert_eq!(all, expected);
        assert!(shards[0].contains(&"prob09".to_string()));
    }

    #[test]
    fn test_select_limit_and_invalid_shard() {
        assert_eq!(select(runs(10), None, Some(4)).len(), 4);
        assert_eq!(select(runs(10), Shard::new(1, 2), Some(2)).len(), 2);
        assert_eq!(Shard::new(2, 2), None);
        assert_eq!(Shard::new(0, 0), None);

        let configuration = Configuration {
            heuristic: "blind".to_string(),
            ..fixtures::configuration()
        };
        let mixed = vec![
            fixtures::run(configuration, "gripper", "prob01"),
            fixtures::run(fixtures::configuration(), "gripper", "prob01"),
        ];
        assert_eq!(select(mixed, None, None).len(), 2);
    }
}
