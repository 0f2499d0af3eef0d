//! Scheduler runner -- admission control, completion and cancellation.
//!
//! Split into focused submodules:
//! - `core`: Scheduler struct, builder, lifecycle and accessor methods
//! - `state`: task records and the lock-protected state machine
//! - `scheduling`: admission pass, task launch, settlement and drain check
//! - `cancel`: cancellation protocol for queued and running tasks

mod cancel;
mod core;
mod scheduling;
mod state;

pub(crate) use self::core::Shared;
pub use self::core::{Scheduler, SchedulerBuilder};
pub use self::state::{EmptyHook, EndHook, StartHook};
