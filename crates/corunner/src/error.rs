//! Error types for the task runner.

use std::sync::Arc;

use thiserror::Error;

/// Errors raised by the scheduler itself (never by the tasks it runs).
#[derive(Debug, Error)]
pub enum SchedulerError {
    #[error("no tokio runtime available; start() must be called from within a runtime")]
    NoRuntime,

    #[error("invalid concurrency {0}, expected at least 1")]
    InvalidConcurrency(usize),

    #[error("config error: {0}")]
    Config(String),

    #[error("config parse error: {0}")]
    ConfigParse(#[from] toml::de::Error),

    #[error("config I/O error: {0}")]
    ConfigIo(#[from] std::io::Error),
}

/// Failure delivered to a [`TaskHandle`](crate::TaskHandle).
///
/// `T` is the submitted task type, `E` the task's own error type.
#[derive(Debug, Error)]
pub enum TaskError<T, E> {
    /// The task's outcome future resolved with an error.
    #[error("task failed: {0}")]
    Failed(E),

    /// The task was canceled through its handle before it completed.
    #[error("{0}")]
    Aborted(AbortError<T>),

    /// The task panicked, either in `run` or while its outcome was polled.
    #[error("task panicked: {0}")]
    Panicked(String),

    /// The scheduler dropped the task without running it.
    #[error("task discarded before it ran")]
    Discarded,
}

impl<T, E> TaskError<T, E> {
    pub fn is_aborted(&self) -> bool {
        matches!(self, TaskError::Aborted(_))
    }

    pub fn is_failed(&self) -> bool {
        matches!(self, TaskError::Failed(_))
    }

    pub fn is_discarded(&self) -> bool {
        matches!(self, TaskError::Discarded)
    }

    pub fn is_panicked(&self) -> bool {
        matches!(self, TaskError::Panicked(_))
    }

    /// The task's own error, if this is a [`TaskError::Failed`].
    pub fn failure(&self) -> Option<&E> {
        match self {
            TaskError::Failed(e) => Some(e),
            _ => None,
        }
    }
}

/// Abort outcome synthesized by cancellation. Carries the canceled task.
#[derive(Debug, Error)]
#[error("task aborted by cancellation")]
pub struct AbortError<T> {
    task: Arc<T>,
}

impl<T> AbortError<T> {
    pub(crate) fn new(task: Arc<T>) -> Self {
        Self { task }
    }

    /// The task that was canceled.
    pub fn task(&self) -> &T {
        &self.task
    }

    pub fn into_task(self) -> Arc<T> {
        self.task
    }
}
