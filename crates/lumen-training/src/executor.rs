//! Where background work runs.
//!
//! Training and inference never run on the caller's (UI) thread in
//! production; tests swap in [`InlineExecutor`] to drive workers
//! deterministically.

use crate::error::{TrainingError, TrainingResult};

pub type Task = Box<dyn FnOnce() + Send + 'static>;

pub trait Executor: Send + Sync {
    fn execute(&self, task: Task) -> TrainingResult<()>;
}

/// Runs each task on the tokio blocking pool, one dedicated thread per task.
#[derive(Debug, Clone)]
pub struct TokioExecutor {
    handle: tokio::runtime::Handle,
}

impl TokioExecutor {
    #[must_use]
    pub fn new(handle: tokio::runtime::Handle) -> Self {
        Self { handle }
    }

    /// Bind to the runtime of the calling context.
    pub fn current() -> TrainingResult<Self> {
        tokio::runtime::Handle::try_current()
            .map(Self::new)
            .map_err(|e| TrainingError::Trainer(format!("no tokio runtime: {e}")))
    }
}

impl Executor for TokioExecutor {
    fn execute(&self, task: Task) -> TrainingResult<()> {
        // Detached; completion is reported through the job's phase and sink.
        drop(self.handle.spawn_blocking(task));
        Ok(())
    }
}

/// Runs tasks to completion on the calling thread.
#[derive(Debug, Clone, Copy, Default)]
pub struct InlineExecutor;

impl Executor for InlineExecutor {
    fn execute(&self, task: Task) -> TrainingResult<()> {
        task();
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[test]
    fn test_inline_executor_runs_immediately() {
        let count = Arc::new(AtomicUsize::new(0));
        let c = Arc::clone(&count);
        InlineExecutor.execute(Box::new(move || {
            c.fetch_add(1, Ordering::SeqCst);
        }))
        .unwrap();
        assert_eq!(count.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_tokio_executor_runs_off_thread() {
        let executor = TokioExecutor::current().unwrap();
        let caller = std::thread::current().id();
        let (tx, rx) = tokio::sync::oneshot::channel();
        executor
            .execute(Box::new(move || {
                let _ = tx.send(std::thread::current().id());
            }))
            .unwrap();
        let worker = rx.await.unwrap();
        assert_ne!(caller, worker);
    }
}
