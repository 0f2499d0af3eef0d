//! Priority-ordered, concurrency-bounded runner for asynchronous tasks.
//!
//! Tasks are submitted with [`Scheduler::add_task`] and queued in a binary
//! heap ranked by a caller-supplied comparator. At most `concurrency` of them
//! run at once; each submission gets a [`TaskHandle`] that resolves exactly
//! once and can be canceled whether the task is queued or running.

pub mod error;
pub mod handle;
pub mod heap;
pub mod metrics;
pub mod runner;
pub mod task;
pub mod types;

pub use error::{AbortError, SchedulerError, TaskError};
pub use handle::{CancelHandle, TaskHandle};
pub use heap::PriorityHeap;
pub use metrics::SchedulerMetrics;
pub use runner::{Scheduler, SchedulerBuilder};
pub use task::{by_key, Comparator, StopFn, Task, TaskId, TaskResult, TaskRun};
pub use types::{SchedulerConfig, SchedulerStatus, CONCURRENCY_ENV};
