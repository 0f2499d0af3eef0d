use std::cmp::Ordering;
use std::future::Future;
use std::sync::Arc;

use futures::future::{BoxFuture, FutureExt};

use crate::error::TaskError;

/// Identifier assigned to every submission, unique per scheduler.
pub type TaskId = u64;

/// Cooperative stop signal returned alongside a task's outcome.
pub type StopFn = Box<dyn FnOnce() + Send + 'static>;

/// Ranks two tasks. `Ordering::Less` means the left task runs first.
pub type Comparator<T> = Arc<dyn Fn(&T, &T) -> Ordering + Send + Sync>;

/// Final outcome of a submitted task, as seen by its handle and by
/// `on_task_end`.
pub type TaskResult<T> = Result<<T as Task>::Output, TaskError<T, <T as Task>::Error>>;

/// A unit of asynchronous work the scheduler can run.
///
/// The scheduler only knows how to start the work, await its outcome and ask
/// it to stop. Attributes used for ranking (priority, deadline, ...) live on
/// the implementing type and are only seen by the comparator.
pub trait Task: Send + Sync + 'static {
    type Output: Send + 'static;
    type Error: Send + 'static;

    /// Start the work. Called at most once per submission.
    fn run(&self) -> TaskRun<Self::Output, Self::Error>;
}

/// What [`Task::run`] hands back: the in-flight outcome and an optional
/// stop function.
pub struct TaskRun<O, E> {
    pub(crate) outcome: BoxFuture<'static, Result<O, E>>,
    pub(crate) stop: Option<StopFn>,
}

impl<O, E> TaskRun<O, E> {
    /// Wrap an outcome future with no way to stop it early.
    pub fn new<F>(outcome: F) -> Self
    where
        F: Future<Output = Result<O, E>> + Send + 'static,
    {
        Self {
            outcome: outcome.boxed(),
            stop: None,
        }
    }

    /// Attach a stop function, called at most once if the task is canceled
    /// while running. It must tolerate being called after the work finished.
    pub fn with_stop(mut self, stop: impl FnOnce() + Send + 'static) -> Self {
        self.stop = Some(Box::new(stop));
        self
    }

    pub fn is_stoppable(&self) -> bool {
        self.stop.is_some()
    }
}

/// Build a comparator from an `Ord` key; smaller keys run first.
pub fn by_key<T, K, F>(key: F) -> Comparator<T>
where
    K: Ord,
    F: Fn(&T) -> K + Send + Sync + 'static,
{
    Arc::new(move |a: &T, b: &T| key(a).cmp(&key(b)))
}
