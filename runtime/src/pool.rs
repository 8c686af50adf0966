//! Fixed-size worker group draining a bounded task queue.
//!
//! # Overview
//!
//! [`TaskPool`] owns one bounded `mpsc` queue shared by `workers` workers.
//! Every unit of background work in the process (event delivery, message
//! synchronization, inbound action handling) runs here, never inline on the
//! caller.
//!
//! - [`TaskPool::submit`] suspends the caller while the queue is full. Tasks
//!   are never dropped and the queue never grows past its capacity.
//! - [`TaskPool::run`] spawns the workers and resolves once all of them have
//!   exited.
//! - A failing task is logged and forgotten. There is no retry.
//!
//! # Shutdown
//!
//! Flipping the shutdown `watch` channel to `true` stops workers from pulling
//! new tasks. A worker that is executing a task finishes it first. Tasks still
//! sitting in the queue are abandoned, and later submissions fail with
//! [`PoolError::Closed`].
//!
//! # Example
//!
//! ```
//! use storefront_sync_runtime::pool::TaskPool;
//! use tokio::sync::watch;
//!
//! # #[tokio::main]
//! # async fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let pool = TaskPool::new(4, 100);
//! let (shutdown_tx, shutdown_rx) = watch::channel(false);
//! let runner = tokio::spawn({
//!     let pool = pool.clone();
//!     async move { pool.run(shutdown_rx).await }
//! });
//!
//! pool.submit(async {
//!     tracing::info!("hello from the pool");
//!     Ok(())
//! })
//! .await?;
//!
//! shutdown_tx.send(true)?;
//! runner.await?;
//! # Ok(())
//! # }
//! ```

use futures::FutureExt;
use futures::future::BoxFuture;
use metrics::counter;
use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::{Mutex, mpsc, watch};
use tokio::task::JoinSet;

/// A nullary fallible job.
pub type Task = BoxFuture<'static, anyhow::Result<()>>;

/// Errors from [`TaskPool`] operations.
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum PoolError {
    /// The pool has shut down and no longer accepts tasks
    #[error("task pool is closed")]
    Closed,
}

/// Bounded queue plus a fixed number of workers.
///
/// Cloning is cheap: clones share the same queue.
#[derive(Clone)]
pub struct TaskPool {
    sender: mpsc::Sender<Task>,
    receiver: Arc<Mutex<mpsc::Receiver<Task>>>,
    workers: usize,
}

impl TaskPool {
    /// Create a pool with `workers` workers and room for `capacity` queued
    /// tasks.
    ///
    /// Both values are clamped to at least 1.
    #[must_use]
    pub fn new(workers: usize, capacity: usize) -> Self {
        let (sender, receiver) = mpsc::channel(capacity.max(1));
        Self {
            sender,
            receiver: Arc::new(Mutex::new(receiver)),
            workers: workers.max(1),
        }
    }

    /// Number of workers spawned by [`TaskPool::run`].
    #[must_use]
    pub const fn workers(&self) -> usize {
        self.workers
    }

    /// Maximum number of queued tasks.
    #[must_use]
    pub fn capacity(&self) -> usize {
        self.sender.max_capacity()
    }

    /// Number of tasks waiting for a worker.
    #[must_use]
    pub fn queued(&self) -> usize {
        self.sender.max_capacity() - self.sender.capacity()
    }

    /// Enqueue a task, waiting for a free slot if the queue is full.
    ///
    /// # Errors
    ///
    /// Returns [`PoolError::Closed`] once the pool has shut down.
    pub async fn submit<F>(&self, task: F) -> Result<(), PoolError>
    where
        F: Future<Output = anyhow::Result<()>> + Send + 'static,
    {
        self.sender
            .send(task.boxed())
            .await
            .map_err(|_| PoolError::Closed)?;
        counter!("task_pool_tasks_submitted_total").increment(1);
        Ok(())
    }

    /// Run the workers until `shutdown` turns `true`.
    ///
    /// Resolves once every worker has exited. The queue is closed afterwards,
    /// so tasks left in it are dropped and further submissions fail.
    pub async fn run(&self, shutdown: watch::Receiver<bool>) {
        let mut workers = JoinSet::new();
        for worker in 0..self.workers {
            workers.spawn(work(worker, Arc::clone(&self.receiver), shutdown.clone()));
        }
        tracing::info!(workers = self.workers, capacity = self.capacity(), "Task pool started");

        while let Some(result) = workers.join_next().await {
            if let Err(e) = result {
                tracing::error!(error = %e, "Task pool worker aborted");
            }
        }

        let mut receiver = self.receiver.lock().await;
        receiver.close();
        let abandoned = std::iter::from_fn(|| receiver.try_recv().ok()).count();
        tracing::info!(abandoned, "Task pool stopped");
    }
}

impl std::fmt::Debug for TaskPool {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TaskPool")
            .field("workers", &self.workers)
            .field("capacity", &self.capacity())
            .field("queued", &self.queued())
            .finish()
    }
}

async fn work(
    worker: usize,
    receiver: Arc<Mutex<mpsc::Receiver<Task>>>,
    mut shutdown: watch::Receiver<bool>,
) {
    loop {
        let task = tokio::select! {
            biased;

            () = cancelled(&mut shutdown) => break,

            task = async { receiver.lock().await.recv().await } => match task {
                Some(task) => task,
                None => break,
            },
        };

        // Runs outside the select: cancellation never interrupts a task.
        execute(worker, task).await;
    }

    tracing::debug!(worker, "Task pool worker stopped");
}

async fn execute(worker: usize, task: Task) {
    match AssertUnwindSafe(task).catch_unwind().await {
        Ok(Ok(())) => {}
        Ok(Err(e)) => {
            counter!("task_pool_tasks_failed_total").increment(1);
            tracing::error!(worker, error = %format!("{e:#}"), "Task failed");
        }
        Err(panic) => {
            counter!("task_pool_tasks_panicked_total").increment(1);
            let message = panic
                .downcast_ref::<&str>()
                .map(|s| (*s).to_string())
                .or_else(|| panic.downcast_ref::<String>().cloned())
                .unwrap_or_else(|| "unknown panic".to_string());
            tracing::error!(worker, panic = %message, "Task panicked");
        }
    }
}

/// Resolves once `shutdown` is `true`. A dropped sender never cancels.
async fn cancelled(shutdown: &mut watch::Receiver<bool>) {
    if shutdown.wait_for(|stop| *stop).await.is_err() {
        std::future::pending::<()>().await;
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::panic)] // Test code
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;
    use tokio::sync::oneshot;

    async fn explode() -> anyhow::Result<()> {
        panic!("worse")
    }

    #[tokio::test]
    async fn submit_returns_immediately_when_queue_has_room() {
        let pool = TaskPool::new(1, 2);

        tokio::time::timeout(Duration::from_millis(50), pool.submit(async { Ok(()) }))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(pool.queued(), 1);
    }

    #[tokio::test]
    async fn submit_blocks_while_queue_is_full() {
        let pool = TaskPool::new(1, 1);
        pool.submit(async { Ok(()) }).await.unwrap();

        let blocked =
            tokio::time::timeout(Duration::from_millis(50), pool.submit(async { Ok(()) })).await;
        assert!(blocked.is_err(), "submit should wait for a free slot");

        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let runner = tokio::spawn({
            let pool = pool.clone();
            async move { pool.run(shutdown_rx).await }
        });

        tokio::time::timeout(Duration::from_secs(1), pool.submit(async { Ok(()) }))
            .await
            .unwrap()
            .unwrap();

        shutdown_tx.send(true).unwrap();
        runner.await.unwrap();
    }

    #[tokio::test]
    async fn failing_and_panicking_tasks_do_not_stop_workers() {
        let pool = TaskPool::new(1, 8);
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let runner = tokio::spawn({
            let pool = pool.clone();
            async move { pool.run(shutdown_rx).await }
        });

        pool.submit(async { Err(anyhow::anyhow!("boom")) })
            .await
            .unwrap();
        pool.submit(explode()).await.unwrap();

        let (done_tx, done_rx) = oneshot::channel();
        pool.submit(async move {
            let _ = done_tx.send(());
            Ok(())
        })
        .await
        .unwrap();

        tokio::time::timeout(Duration::from_secs(1), done_rx)
            .await
            .unwrap()
            .unwrap();

        shutdown_tx.send(true).unwrap();
        runner.await.unwrap();
    }

    #[tokio::test]
    async fn in_flight_task_completes_on_shutdown() {
        let pool = TaskPool::new(1, 4);
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let runner = tokio::spawn({
            let pool = pool.clone();
            async move { pool.run(shutdown_rx).await }
        });

        let finished = Arc::new(AtomicUsize::new(0));
        let (started_tx, started_rx) = oneshot::channel();
        pool.submit({
            let finished = Arc::clone(&finished);
            async move {
                let _ = started_tx.send(());
                tokio::time::sleep(Duration::from_millis(50)).await;
                finished.fetch_add(1, Ordering::SeqCst);
                Ok(())
            }
        })
        .await
        .unwrap();

        started_rx.await.unwrap();
        shutdown_tx.send(true).unwrap();
        runner.await.unwrap();

        assert_eq!(finished.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn submit_fails_after_shutdown() {
        let pool = TaskPool::new(2, 4);
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        shutdown_tx.send(true).unwrap();

        pool.run(shutdown_rx).await;

        assert_eq!(pool.submit(async { Ok(()) }).await, Err(PoolError::Closed));
    }

    #[test]
    fn zero_sizes_are_clamped() {
        let pool = TaskPool::new(0, 0);
        assert_eq!(pool.workers(), 1);
        assert_eq!(pool.capacity(), 1);
    }
}
