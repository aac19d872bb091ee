//! Task execution: a worker pool and the waiters that track batches of
//! submitted work.

pub(crate) mod entry;
pub mod pool;
pub mod waiter;

pub use pool::{PoolKind, TaskThreadPool};
pub use waiter::{Waiter, WaiterHandle};
