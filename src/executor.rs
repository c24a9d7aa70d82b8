//! Bounded-concurrency fan-out engine with ordered result collection.
//!
//! Used inside nodes for per-section work (writing, depth checks, code and
//! image generation, revision edits). Results always come back in
//! submission order; a failing or timed-out task never aborts its
//! siblings, and failures are reported in the outcome rather than raised.

use std::sync::Arc;
use std::time::Duration;

use futures_util::future::BoxFuture;
use tokio::sync::Semaphore;

/// A named unit of work. The future is `'static`: tasks clone whatever
/// inputs they need up front.
pub struct ParallelTask<T> {
    pub name: String,
    pub fut: BoxFuture<'static, Result<T, String>>,
}

impl<T> ParallelTask<T> {
    pub fn new<F>(name: impl Into<String>, fut: F) -> Self
    where
        F: std::future::Future<Output = Result<T, String>> + Send + 'static,
    {
        ParallelTask {
            name: name.into(),
            fut: Box::pin(fut),
        }
    }
}

/// Execution parameters for one fan-out batch.
#[derive(Clone, Debug)]
pub struct TaskConfig {
    /// Batch label for logs.
    pub name: String,
    /// Per-task timeout, counted from when the task starts running.
    pub timeout: Duration,
    pub max_workers: usize,
}

impl TaskConfig {
    pub fn new(name: impl Into<String>) -> Self {
        TaskConfig {
            name: name.into(),
            timeout: Duration::from_secs(120),
            max_workers: 3,
        }
    }

    #[must_use]
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    #[must_use]
    pub fn max_workers(mut self, workers: usize) -> Self {
        self.max_workers = workers.max(1);
        self
    }
}

/// Result of one task, in submission order.
#[derive(Clone, Debug)]
pub struct TaskOutcome<T> {
    pub task_name: String,
    pub success: bool,
    pub result: Option<T>,
    pub error: Option<String>,
}

impl<T> TaskOutcome<T> {
    fn ok(name: String, value: T) -> Self {
        TaskOutcome {
            task_name: name,
            success: true,
            result: Some(value),
            error: None,
        }
    }

    fn failed(name: String, error: String) -> Self {
        TaskOutcome {
            task_name: name,
            success: false,
            result: None,
            error: Some(error),
        }
    }
}

/// The fan-out engine. Cheap to clone; concurrency is decided per batch by
/// the [`TaskConfig`], with serial mode forced when tracing is enabled.
#[derive(Clone, Debug, Default)]
pub struct ParallelTaskExecutor {
    serial: bool,
}

impl ParallelTaskExecutor {
    pub fn new() -> Self {
        Self::default()
    }

    /// Serial mode preserves call-context propagation under tracing.
    #[must_use]
    pub fn serial(mut self, serial: bool) -> Self {
        self.serial = serial;
        self
    }

    /// Run a batch. At most `config.max_workers` tasks execute at once;
    /// every task is bounded by `config.timeout`; outcomes are collected in
    /// submission order.
    pub async fn run_parallel<T: Send + 'static>(
        &self,
        tasks: Vec<ParallelTask<T>>,
        config: TaskConfig,
    ) -> Vec<TaskOutcome<T>> {
        if tasks.is_empty() {
            return Vec::new();
        }
        let total = tasks.len();
        if self.serial || config.max_workers == 1 {
            tracing::debug!(batch = %config.name, total, "running batch serially");
            return self.run_serial(tasks, &config).await;
        }

        tracing::debug!(
            batch = %config.name,
            total,
            workers = config.max_workers.min(total),
            "running batch in parallel"
        );
        let semaphore = Arc::new(Semaphore::new(config.max_workers));
        let timeout = config.timeout;
        let handles: Vec<_> = tasks
            .into_iter()
            .map(|task| {
                let semaphore = Arc::clone(&semaphore);
                let name = task.name.clone();
                let fut = task.fut;
                let handle = tokio::spawn(async move {
                    // Hold the permit for the task's whole run; the timeout
                    // clock starts only once a worker slot is acquired.
                    let _permit = semaphore.acquire_owned().await;
                    match tokio::time::timeout(timeout, fut).await {
                        Ok(Ok(value)) => TaskOutcome::ok(name, value),
                        Ok(Err(err)) => TaskOutcome::failed(name, err),
                        Err(_) => TaskOutcome::failed(name, "timeout".to_string()),
                    }
                });
                handle
            })
            .collect();

        let mut outcomes = Vec::with_capacity(total);
        for (idx, handle) in handles.into_iter().enumerate() {
            match handle.await {
                Ok(outcome) => outcomes.push(outcome),
                Err(join_err) => {
                    tracing::error!(batch = %config.name, idx, %join_err, "task panicked");
                    outcomes.push(TaskOutcome::failed(
                        format!("{}#{idx}", config.name),
                        format!("task panicked: {join_err}"),
                    ));
                }
            }
        }
        outcomes
    }

    async fn run_serial<T: Send + 'static>(
        &self,
        tasks: Vec<ParallelTask<T>>,
        config: &TaskConfig,
    ) -> Vec<TaskOutcome<T>> {
        let mut outcomes = Vec::with_capacity(tasks.len());
        for task in tasks {
            let outcome = match tokio::time::timeout(config.timeout, task.fut).await {
                Ok(Ok(value)) => TaskOutcome::ok(task.name, value),
                Ok(Err(err)) => TaskOutcome::failed(task.name, err),
                Err(_) => TaskOutcome::failed(task.name, "timeout".to_string()),
            };
            outcomes.push(outcome);
        }
        outcomes
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[tokio::test]
    async fn results_come_back_in_submission_order() {
        let executor = ParallelTaskExecutor::new();
        let tasks: Vec<ParallelTask<usize>> = (0..8)
            .map(|i| {
                ParallelTask::new(format!("t{i}"), async move {
                    // Later tasks finish sooner.
                    tokio::time::sleep(Duration::from_millis(40 - 4 * i as u64)).await;
                    Ok(i)
                })
            })
            .collect();
        let outcomes = executor
            .run_parallel(tasks, TaskConfig::new("order").max_workers(8))
            .await;
        let values: Vec<usize> = outcomes.iter().map(|o| o.result.unwrap()).collect();
        assert_eq!(values, (0..8).collect::<Vec<_>>());
    }

    #[tokio::test]
    async fn one_failure_does_not_abort_siblings() {
        let executor = ParallelTaskExecutor::new();
        let tasks = vec![
            ParallelTask::new("ok", async { Ok::<_, String>(1) }),
            ParallelTask::new("bad", async { Err::<i32, _>("boom".to_string()) }),
            ParallelTask::new("ok2", async { Ok::<_, String>(3) }),
        ];
        let outcomes = executor
            .run_parallel(tasks, TaskConfig::new("mixed"))
            .await;
        assert!(outcomes[0].success);
        assert!(!outcomes[1].success);
        assert_eq!(outcomes[1].error.as_deref(), Some("boom"));
        assert!(outcomes[2].success);
    }

    #[tokio::test]
    async fn timeout_is_reported_per_task() {
        let executor = ParallelTaskExecutor::new();
        let tasks = vec![
            ParallelTask::new("slow", async {
                tokio::time::sleep(Duration::from_secs(5)).await;
                Ok::<_, String>(0)
            }),
            ParallelTask::new("fast", async { Ok::<_, String>(1) }),
        ];
        let outcomes = executor
            .run_parallel(
                tasks,
                TaskConfig::new("timeouts").timeout(Duration::from_millis(20)),
            )
            .await;
        assert_eq!(outcomes[0].error.as_deref(), Some("timeout"));
        assert!(outcomes[1].success);
    }

    #[tokio::test]
    async fn concurrency_is_bounded() {
        static RUNNING: AtomicUsize = AtomicUsize::new(0);
        static PEAK: AtomicUsize = AtomicUsize::new(0);
        let executor = ParallelTaskExecutor::new();
        let tasks: Vec<ParallelTask<()>> = (0..9)
            .map(|i| {
                ParallelTask::new(format!("t{i}"), async {
                    let now = RUNNING.fetch_add(1, Ordering::SeqCst) + 1;
                    PEAK.fetch_max(now, Ordering::SeqCst);
                    tokio::time::sleep(Duration::from_millis(15)).await;
                    RUNNING.fetch_sub(1, Ordering::SeqCst);
                    Ok(())
                })
            })
            .collect();
        executor
            .run_parallel(tasks, TaskConfig::new("bounded").max_workers(3))
            .await;
        assert!(PEAK.load(Ordering::SeqCst) <= 3);
    }

    #[tokio::test]
    async fn serial_mode_runs_one_at_a_time() {
        static RUNNING: AtomicUsize = AtomicUsize::new(0);
        static PEAK: AtomicUsize = AtomicUsize::new(0);
        let executor = ParallelTaskExecutor::new().serial(true);
        let tasks: Vec<ParallelTask<()>> = (0..4)
            .map(|i| {
                ParallelTask::new(format!("t{i}"), async {
                    let now = RUNNING.fetch_add(1, Ordering::SeqCst) + 1;
                    PEAK.fetch_max(now, Ordering::SeqCst);
                    tokio::time::sleep(Duration::from_millis(5)).await;
                    RUNNING.fetch_sub(1, Ordering::SeqCst);
                    Ok(())
                })
            })
            .collect();
        executor
            .run_parallel(tasks, TaskConfig::new("serial").max_workers(4))
            .await;
        assert_eq!(PEAK.load(Ordering::SeqCst), 1);
    }
}
