//! Bounded task pool with per-task timeouts.
//!
//! Tasks are submitted all at once and collected as they complete: at most
//! `width` run concurrently, each on its own tokio task so a panic stays
//! contained. A task that outlives its timeout is reported as
//! [`TaskError::TimedOut`] and detached; it is not cancelled, its result
//! is simply ignored.
//!
//! With `width == 1` tasks run strictly one after another in input order,
//! which makes the pool deterministic for tests.

use std::any::Any;
use std::future::Future;
use std::time::Duration;

use futures_util::stream::{self, StreamExt};

/// Why a pooled task produced no value.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum TaskError {
    #[error("task timed out after {}s", .0.as_secs_f64())]
    TimedOut(Duration),

    #[error("task panicked: {0}")]
    Panicked(String),

    #[error("task was cancelled")]
    Cancelled,
}

impl TaskError {
    fn from_join(err: tokio::task::JoinError) -> Self {
        if !err.is_panic() {
            return TaskError::Cancelled;
        }
        TaskError::Panicked(panic_message(err.into_panic().as_ref()))
    }
}

/// Text of a panic payload, for `&str` and `String` payloads.
pub(crate) fn panic_message(payload: &(dyn Any + Send)) -> String {
    payload
        .downcast_ref::<&str>()
        .map(|s| s.to_string())
        .or_else(|| payload.downcast_ref::<String>().cloned())
        .unwrap_or_else(|| "unknown panic".to_string())
}

/// Result of one pooled task, tagged with its position in the input.
#[derive(Debug)]
pub struct TaskOutcome<T> {
    pub index: usize,
    pub result: Result<T, TaskError>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TaskPool {
    width: usize,
    task_timeout: Option<Duration>,
}

impl TaskPool {
    /// A pool running at most `width` tasks at once (minimum 1), no timeout.
    pub fn new(width: usize) -> Self {
        TaskPool {
            width: width.max(1),
            task_timeout: None,
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.task_timeout = Some(timeout);
        self
    }

    pub fn width(&self) -> usize {
        self.width
    }

    /// Run every task; outcomes come back in completion order.
    pub async fn run<T, F>(&self, tasks: Vec<F>) -> Vec<TaskOutcome<T>>
    where
        F: Future<Output = T> + Send + 'static,
        T: Send + 'static,
    {
        let timeout = self.task_timeout;
        stream::iter(tasks.into_iter().enumerate())
            .map(move |(index, task)| async move {
                let handle = tokio::spawn(task);
                let result = match timeout {
                    Some(limit) => match tokio::time::timeout(limit, handle).await {
                        Ok(joined) => joined.map_err(TaskError::from_join),
                        Err(_) => Err(TaskError::TimedOut(limit)),
                    },
                    None => handle.await.map_err(TaskError::from_join),
                };
                TaskOutcome { index, result }
            })
            .buffer_unordered(self.width)
            .collect()
            .await
    }

    /// Run every task; results come back in input order.
    pub async fn run_ordered<T, F>(&self, tasks: Vec<F>) -> Vec<Result<T, TaskError>>
    where
        F: Future<Output = T> + Send + 'static,
        T: Send + 'static,
    {
        let mut outcomes = self.run(tasks).await;
        outcomes.sort_by_key(|o| o.index);
        outcomes.into_iter().map(|o| o.result).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::pin::Pin;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    type BoxTask = Pin<Box<dyn Future<Output = usize> + Send>>;

    fn sleeper(id: usize, millis: u64) -> BoxTask {
        Box::pin(async move {
            tokio::time::sleep(Duration::from_millis(millis)).await;
            id
        })
    }

    fn completion_order(outcomes: &[TaskOutcome<usize>]) -> Vec<usize> {
        outcomes.iter().map(|o| o.index).collect()
    }

    #[tokio::test(start_paused = true)]
    async fn width_one_runs_in_input_order() {
        let pool = TaskPool::new(1);
        let outcomes = pool
            .run(vec![sleeper(0, 30), sleeper(1, 10), sleeper(2, 20)])
            .await;
        assert_eq!(completion_order(&outcomes), vec![0, 1, 2]);
    }

    #[tokio::test(start_paused = true)]
    async fn wide_pool_collects_in_completion_order() {
        let pool = TaskPool::new(3);
        let outcomes = pool
            .run(vec![sleeper(0, 30), sleeper(1, 10), sleeper(2, 20)])
            .await;
        assert_eq!(completion_order(&outcomes), vec![1, 2, 0]);
        assert!(outcomes.iter().all(|o| o.result.as_ref().ok() == Some(&o.index)));
    }

    #[tokio::test(start_paused = true)]
    async fn run_ordered_restores_input_order() {
        let pool = TaskPool::new(3);
        let results = pool
            .run_ordered(vec![sleeper(0, 30), sleeper(1, 10), sleeper(2, 20)])
            .await;
        assert_eq!(results, vec![Ok(0), Ok(1), Ok(2)]);
    }

    #[tokio::test(start_paused = true)]
    async fn never_exceeds_width() {
        let running = Arc::new(AtomicUsize::new(0));
        let peak = Arc::new(AtomicUsize::new(0));
        let tasks: Vec<BoxTask> = (0..8usize)
            .map(|id| {
                let running = running.clone();
                let peak = peak.clone();
                Box::pin(async move {
                    let now = running.fetch_add(1, Ordering::SeqCst) + 1;
                    peak.fetch_max(now, Ordering::SeqCst);
                    tokio::time::sleep(Duration::from_millis(10)).await;
                    running.fetch_sub(1, Ordering::SeqCst);
                    id
                }) as BoxTask
            })
            .collect();

        let outcomes = TaskPool::new(2).run(tasks).await;
        assert_eq!(outcomes.len(), 8);
        assert_eq!(peak.load(Ordering::SeqCst), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn slow_task_times_out_without_failing_others() {
        let pool = TaskPool::new(2).with_timeout(Duration::from_secs(30));
        let results = pool
            .run_ordered(vec![sleeper(0, 5), sleeper(1, 60_000), sleeper(2, 5)])
            .await;
        assert_eq!(results[0], Ok(0));
        assert_eq!(
            results[1],
            Err(TaskError::TimedOut(Duration::from_secs(30)))
        );
        assert_eq!(results[2], Ok(2));
    }

    fn explode() -> usize {
        panic!("boom")
    }

    #[tokio::test]
    async fn panic_is_contained() {
        let tasks: Vec<BoxTask> = vec![
            Box::pin(async { 1usize }) as BoxTask,
            Box::pin(async { explode() }) as BoxTask,
        ];
        let results = TaskPool::new(2).run_ordered(tasks).await;
        assert_eq!(results[0], Ok(1));
        assert_eq!(results[1], Err(TaskError::Panicked("boom".into())));
    }

    #[tokio::test]
    async fn empty_input() {
        let results = TaskPool::new(3).run_ordered(Vec::<BoxTask>::new()).await;
        assert!(results.is_empty());
    }

    #[test]
    fn zero_width_is_clamped() {
        assert_eq!(TaskPool::new(0).width(), 1);
    }
}
