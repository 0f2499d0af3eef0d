//! Caller-side view of a submitted task.

use std::fmt;
use std::future::Future;
use std::pin::Pin;
use std::sync::Weak;
use std::task::{Context, Poll};

use tokio::sync::oneshot;

use crate::error::TaskError;
use crate::runner::Shared;
use crate::task::{Task, TaskId, TaskResult};

/// Future of a submitted task's outcome, plus the means to cancel it.
///
/// Resolves exactly once: with the task's value, its failure, an abort
/// error if canceled first, or [`TaskError::Discarded`] if the scheduler
/// dropped it unrun.
pub struct TaskHandle<T: Task> {
    id: TaskId,
    receiver: oneshot::Receiver<TaskResult<T>>,
    canceler: CancelHandle<T>,
}

impl<T: Task> TaskHandle<T> {
    pub(crate) fn new(id: TaskId, receiver: oneshot::Receiver<TaskResult<T>>, canceler: CancelHandle<T>) -> Self {
        Self { id, receiver, canceler }
    }

    pub fn id(&self) -> TaskId {
        self.id
    }

    /// Cancel the task. Safe at any time; no-op once it has ended.
    pub fn cancel(&self) {
        self.canceler.cancel();
    }

    /// A detached canceler, usable while this handle is being awaited.
    pub fn canceler(&self) -> CancelHandle<T> {
        self.canceler.clone()
    }
}

impl<T: Task> Future for TaskHandle<T> {
    type Output = TaskResult<T>;

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        Pin::new(&mut self.receiver)
            .poll(cx)
            .map(|received| received.unwrap_or_else(|_| Err(TaskError::Discarded)))
    }
}

impl<T: Task> fmt::Debug for TaskHandle<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TaskHandle").field("id", &self.id).finish()
    }
}

/// Cloneable cancel capability for one submission.
///
/// Holds the scheduler weakly: once the scheduler is gone, canceling does
/// nothing.
pub struct CancelHandle<T: Task> {
    id: TaskId,
    shared: Weak<Shared<T>>,
}

impl<T: Task> CancelHandle<T> {
    pub(crate) fn new(id: TaskId, shared: Weak<Shared<T>>) -> Self {
        Self { id, shared }
    }

    pub fn id(&self) -> TaskId {
        self.id
    }

    pub fn cancel(&self) {
        if let Some(shared) = self.shared.upgrade() {
            shared.cancel(self.id);
        }
    }
}

impl<T: Task> Clone for CancelHandle<T> {
    fn clone(&self) -> Self {
        Self {
            id: self.id,
            shared: Weak::clone(&self.shared),
        }
    }
}

impl<T: Task> fmt::Debug for CancelHandle<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CancelHandle").field("id", &self.id).finish()
    }
}
