//! Core shared-state primitives
//!
//! The counter record layout, the cross-process lock abstraction and the
//! shared memory segment that holds the record.

pub mod lock;
pub mod models;
pub mod shared_state;

pub use lock::{acquire, CrossProcessLock, LockGuard};
pub use models::{CounterRecord, StateSnapshot, WorkerKind, WorkerSlot};
pub use shared_state::{InitWait, SharedState, StateGuard};
