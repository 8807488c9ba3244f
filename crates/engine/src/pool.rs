//! Worker pool
//!
//! Owns the threads partition jobs run on. Every job gets an exclusive
//! [`Partition`] and read-only access to whatever the closure captured; the
//! driver blocks until all jobs finish and concatenates their fragments in
//! worker order. The first failure cancels the remaining jobs and fails the
//! whole run.

use crate::partition::Partition;
use sinf_common::errors::{InfluenceError, Result};
use sinf_common::metrics::{record_worker, set_active_workers};
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Instant;
use tokio::runtime::{Builder, Runtime};
use tokio::task::JoinSet;
use tracing::{debug, error, info, info_span, instrument};

/// Cooperative cancellation flag shared by the jobs of one run.
///
/// A child token also observes its parent, so cancelling the pool cancels
/// every run in flight.
#[derive(Debug, Clone, Default)]
pub struct CancelToken {
    flag: Arc<AtomicBool>,
    parent: Option<Arc<AtomicBool>>,
}

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    /// Token cancelled by this one, with its own independent flag
    pub fn child(&self) -> Self {
        Self {
            flag: Arc::new(AtomicBool::new(false)),
            parent: Some(Arc::clone(&self.flag)),
        }
    }

    pub fn cancel(&self) {
        self.flag.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.flag.load(Ordering::SeqCst)
            || self
                .parent
                .as_ref()
                .is_some_and(|parent| parent.load(Ordering::SeqCst))
    }

    /// `Err(Cancelled)` once cancelled
    pub fn check(&self) -> Result<()> {
        if self.is_cancelled() {
            Err(InfluenceError::Cancelled)
        } else {
            Ok(())
        }
    }
}

/// Engine context holding the worker threads.
///
/// Created by [`WorkerPool::start`] and torn down by [`WorkerPool::stop`] or
/// on drop, whichever comes first.
pub struct WorkerPool {
    runtime: Option<Runtime>,
    n_workers: usize,
    cancel: CancelToken,
}

impl WorkerPool {
    /// Start a pool with room for `n_workers` concurrent jobs
    pub fn start(n_workers: usize) -> Result<Self> {
        if n_workers == 0 {
            return Err(InfluenceError::config("n_workers must be at least 1"));
        }

        let runtime = Builder::new_multi_thread()
            .worker_threads(1)
            .max_blocking_threads(n_workers)
            .thread_name("sinf-worker")
            .enable_all()
            .build()?;

        info!(n_workers, "Worker pool started");

        Ok(Self {
            runtime: Some(runtime),
            n_workers,
            cancel: CancelToken::new(),
        })
    }

    pub fn n_workers(&self) -> usize {
        self.n_workers
    }

    /// Token that cancels every current and future run of this pool
    pub fn cancel_token(&self) -> CancelToken {
        self.cancel.clone()
    }

    /// Run `job` once per partition and collect the fragments in worker order.
    ///
    /// Blocks the calling thread; must not be called from inside an async
    /// context (use [`dispatch`] there).
    pub fn run<T, F>(&self, stage: &'static str, partitions: Vec<Partition>, job: F) -> Result<Vec<T>>
    where
        T: Send + 'static,
        F: Fn(Partition, &CancelToken) -> Result<Vec<T>> + Send + Sync + 'static,
    {
        let runtime = self
            .runtime
            .as_ref()
            .ok_or_else(|| InfluenceError::Other(anyhow::anyhow!("worker pool has been stopped")))?;
        self.cancel.check()?;

        runtime.block_on(dispatch(stage, partitions, job, self.cancel.child()))
    }

    /// Shut the pool down and release its threads
    pub fn stop(mut self) {
        if let Some(runtime) = self.runtime.take() {
            runtime.shutdown_background();
            info!("Worker pool stopped");
        }
    }
}

impl Drop for WorkerPool {
    fn drop(&mut self) {
        if let Some(runtime) = self.runtime.take() {
            self.cancel.cancel();
            runtime.shutdown_background();
            debug!("Worker pool dropped");
        }
    }
}

/// Spawn one blocking job per partition on the current runtime and gather
/// their fragments.
///
/// Fails with the first real error reported by any job; `Cancelled` is only
/// returned when nothing else went wrong.
#[instrument(skip(partitions, job, cancel), fields(workers = partitions.len()))]
pub async fn dispatch<T, F>(
    stage: &'static str,
    partitions: Vec<Partition>,
    job: F,
    cancel: CancelToken,
) -> Result<Vec<T>>
where
    T: Send + 'static,
    F: Fn(Partition, &CancelToken) -> Result<Vec<T>> + Send + Sync + 'static,
{
    let job = Arc::new(job);
    let mut set = JoinSet::new();
    set_active_workers(partitions.len());

    for partition in partitions {
        let job = Arc::clone(&job);
        let cancel = cancel.clone();
        let span = info_span!(
            "worker",
            stage,
            worker = partition.worker,
            start = partition.start,
            end = partition.end
        );

        set.spawn_blocking(move || {
            let _entered = span.enter();
            let started = Instant::now();

            let result = match catch_unwind(AssertUnwindSafe(|| job(partition, &cancel))) {
                Ok(result) => result,
                Err(panic) => Err(InfluenceError::Worker {
                    worker: partition.worker,
                    message: panic_message(panic.as_ref()),
                }),
            };

            let elapsed = started.elapsed().as_secs_f64();
            record_worker(stage, elapsed);
            if result.is_ok() {
                info!(keys = partition.len(), elapsed_secs = elapsed, "Worker finished");
            }
            (partition.worker, result)
        });
    }

    let mut fragments: Vec<(usize, Vec<T>)> = Vec::new();
    let mut failure: Option<InfluenceError> = None;

    while let Some(joined) = set.join_next().await {
        let err = match joined {
            Ok((worker, Ok(fragment))) => {
                fragments.push((worker, fragment));
                continue;
            }
            Ok((_, Err(err))) => err,
            Err(join_err) if join_err.is_cancelled() => InfluenceError::Cancelled,
            Err(join_err) => InfluenceError::Other(anyhow::anyhow!("worker task failed: {}", join_err)),
        };

        if failure.is_none() {
            // Jobs already running observe the token; queued ones never start
            cancel.cancel();
            set.abort_all();
        }
        let keep_previous = matches!(&failure, Some(prev) if !matches!(prev, InfluenceError::Cancelled));
        if !keep_previous {
            if !matches!(err, InfluenceError::Cancelled) {
                error!(stage, error = %err, "Worker failed");
            }
            failure = Some(err);
        }
    }

    set_active_workers(0);

    if let Some(err) = failure {
        return Err(err);
    }

    fragments.sort_by_key(|(worker, _)| *worker);
    Ok(fragments.into_iter().flat_map(|(_, fragment)| fragment).collect())
}

fn panic_message(panic: &(dyn std::any::Any + Send)) -> String {
    if let Some(s) = panic.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = panic.downcast_ref::<String>() {
        s.clone()
    } else {
        "worker panicked".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::partition::WorkerPartitioner;
    use tokio_test::{assert_err, assert_ok};

    fn squares(partition: Partition, _cancel: &CancelToken) -> Result<Vec<usize>> {
        Ok(partition.range().map(|i| i * i).collect())
    }

    #[test]
    fn test_run_concatenates_in_worker_order() {
        let pool = WorkerPool::start(4).unwrap();
        let partitions = WorkerPartitioner::new(4).unwrap().partition(10);
        let out = assert_ok!(pool.run("test", partitions, squares));
        assert_eq!(out, (0..10).map(|i| i * i).collect::<Vec<_>>());
        pool.stop();
    }

    #[test]
    fn test_empty_partitions() {
        let pool = WorkerPool::start(2).unwrap();
        let out: Vec<usize> = assert_ok!(pool.run("test", Vec::new(), squares));
        assert!(out.is_empty());
    }

    #[test]
    fn test_failure_fails_the_run() {
        let pool = WorkerPool::start(3).unwrap();
        let partitions = WorkerPartitioner::new(3).unwrap().partition(9);
        let result = pool.run("test", partitions, |p: Partition, _c: &CancelToken| {
            if p.worker == 1 {
                Err(InfluenceError::InvalidWeight { weight: 0.0 })
            } else {
                Ok(vec![p.worker])
            }
        });
        let err = assert_err!(result);
        assert!(matches!(err, InfluenceError::InvalidWeight { .. }));
    }

    #[test]
    fn test_real_error_preferred_over_cancellation() {
        let pool = WorkerPool::start(4).unwrap();
        let partitions = WorkerPartitioner::new(4).unwrap().partition(4);
        let result = pool.run("test", partitions, |p: Partition, cancel: &CancelToken| {
            if p.worker == 0 {
                return Err(InfluenceError::config("boom"));
            }
            // Other workers wait until they observe the cancellation
            let deadline = Instant::now() + std::time::Duration::from_secs(5);
            while Instant::now() < deadline {
                cancel.check()?;
                std::thread::sleep(std::time::Duration::from_millis(1));
            }
            Ok(vec![p.worker])
        });
        assert!(matches!(result, Err(InfluenceError::Config { .. })));
    }

    #[test]
    fn test_panic_becomes_worker_error() {
        let pool = WorkerPool::start(2).unwrap();
        let partitions = WorkerPartitioner::new(2).unwrap().partition(2);
        let result = pool.run("test", partitions, |p: Partition, _c: &CancelToken| -> Result<Vec<usize>> {
            if p.worker == 1 {
                panic!("bad partition");
            }
            Ok(vec![p.worker])
        });
        match result {
            Err(InfluenceError::Worker { worker, message }) => {
                assert_eq!(worker, 1);
                assert!(message.contains("bad partition"));
            }
            other => panic!("unexpected result: {:?}", other.map(|v| v.len())),
        }
    }

    #[test]
    fn test_cancelled_pool_refuses_new_runs() {
        let pool = WorkerPool::start(2).unwrap();
        pool.cancel_token().cancel();
        let partitions = WorkerPartitioner::new(2).unwrap().partition(4);
        assert!(matches!(
            pool.run("test", partitions, squares),
            Err(InfluenceError::Cancelled)
        ));
    }

    #[test]
    fn test_zero_workers_rejected() {
        assert!(WorkerPool::start(0).is_err());
    }

    #[test]
    fn test_child_token_observes_parent() {
        let parent = CancelToken::new();
        let child = parent.child();
        child.cancel();
        assert!(!parent.is_cancelled());

        let other = parent.child();
        parent.cancel();
        assert!(other.is_cancelled());
        assert!(other.check().is_err());
    }

    #[tokio::test]
    async fn test_dispatch_inside_runtime() {
        let partitions = WorkerPartitioner::new(3).unwrap().partition(7);
        let out = dispatch("test", partitions, squares, CancelToken::new()).await;
        assert_eq!(assert_ok!(out).len(), 7);
    }
}
