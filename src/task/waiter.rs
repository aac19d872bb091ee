//! Batch completion tracking.
//!
//! A [`Waiter`] counts the tasks of one batch that are still pending and
//! remembers whether any of them failed. It is bound to the pool it was
//! created for; while blocked in [`Waiter::wait`] the calling thread runs
//! queued tasks of its own batch, and leaf tasks up to a fixed nesting
//! depth, instead of idling.

use crate::task::pool::{Shared, TaskThreadPool};
use log::warn;
use std::cell::Cell;
use std::sync::{Arc, Condvar, Mutex, MutexGuard, PoisonError};

/// Deepest inline nesting at which a waiting thread still picks up leaf
/// tasks of other batches.
pub const MAX_LEAF_HELP_DEPTH: usize = 16;

thread_local! {
    /// Number of tasks this thread is currently running from inside `wait`.
    static INLINE_DEPTH: Cell<usize> = const { Cell::new(0) };
}

pub(crate) fn inline_depth() -> usize {
    INLINE_DEPTH.with(Cell::get)
}

#[derive(Debug, Default)]
struct Counters {
    pending: usize,
    error: bool,
}

#[derive(Debug, Default)]
struct WaiterState {
    counters: Mutex<Counters>,
    done: Condvar,
}

impl WaiterState {
    fn lock(&self) -> MutexGuard<'_, Counters> {
        self.counters
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }
}

/// Cloneable reference to a waiter's counters, captured by tasks that need
/// to report failure.
#[derive(Debug, Clone)]
pub struct WaiterHandle {
    state: Arc<WaiterState>,
}

impl WaiterHandle {
    /// Marks the batch as failed. The flag is never cleared.
    pub fn set_error(&self) {
        self.state.lock().error = true;
    }

    pub(crate) fn same_batch(&self, other: &WaiterHandle) -> bool {
        Arc::ptr_eq(&self.state, &other.state)
    }

    pub(crate) fn inc(&self) {
        self.state.lock().pending += 1;
    }

    pub(crate) fn dec(&self) {
        let mut counters = self.state.lock();
        if counters.pending == 0 {
            warn!("Waiter decremented below zero, ignoring");
            return;
        }
        counters.pending -= 1;
        if counters.pending == 0 {
            self.state.done.notify_all();
        }
    }
}

/// Completion and error tracker for a batch of pool tasks.
///
/// # Example
///
/// ```rust
/// use netgate::task::{TaskThreadPool, Waiter};
///
/// let pool = TaskThreadPool::new(2);
/// let waiter = Waiter::new(&pool);
/// for _ in 0..4 {
///     pool.submit(Some(&waiter), || {}, false);
/// }
/// assert!(waiter.wait());
/// ```
#[derive(Debug)]
pub struct Waiter {
    state: Arc<WaiterState>,
    pool: Arc<Shared>,
}

impl Waiter {
    /// Creates an idle waiter bound to `pool`.
    pub fn new(pool: &TaskThreadPool) -> Self {
        Self {
            state: Arc::new(WaiterState::default()),
            pool: pool.shared(),
        }
    }

    pub(crate) fn is_bound_to(&self, pool: &Arc<Shared>) -> bool {
        Arc::ptr_eq(&self.pool, pool)
    }

    /// Handle for tasks of this batch to report failure through.
    pub fn handle(&self) -> WaiterHandle {
        WaiterHandle {
            state: self.state.clone(),
        }
    }

    /// Adds one pending task. Paired with [`dec`](Self::dec).
    pub fn inc(&self) {
        self.handle().inc();
    }

    /// Removes one pending task, waking blocked callers at zero.
    pub fn dec(&self) {
        self.handle().dec();
    }

    pub fn set_error(&self) {
        self.handle().set_error();
    }

    /// Number of tasks not yet finished.
    pub fn pending(&self) -> usize {
        self.state.lock().pending
    }

    /// Whether any task of the batch failed so far.
    pub fn has_error(&self) -> bool {
        self.state.lock().error
    }

    /// Blocks until every task of the batch has finished.
    ///
    /// While tasks are pending, queued tasks of this batch are executed on
    /// the calling thread, so a task waiting on its own sub-batch never
    /// starves the pool. Leaf tasks of other batches are picked up too while
    /// the inline nesting stays below [`MAX_LEAF_HELP_DEPTH`]. Ordinary tasks
    /// of other batches are left to the workers. Once nothing eligible is
    /// queued the caller sleeps.
    ///
    /// # Returns
    ///
    /// `true` if no task of the batch reported an error or panicked
    pub fn wait(&self) -> bool {
        let handle = self.handle();
        while self.pending() > 0 {
            let depth = inline_depth();
            let Some(entry) = self
                .pool
                .try_pop_for(&handle, depth < MAX_LEAF_HELP_DEPTH)
            else {
                break;
            };
            INLINE_DEPTH.with(|cell| cell.set(depth + 1));
            entry.run();
            INLINE_DEPTH.with(|cell| cell.set(depth));
        }

        let mut counters = self.state.lock();
        while counters.pending > 0 {
            counters = self
                .state
                .done
                .wait(counters)
                .unwrap_or_else(PoisonError::into_inner);
        }
        !counters.error
    }
}

impl Drop for Waiter {
    fn drop(&mut self) {
        let pending = self.pending();
        if pending > 0 {
            warn!("Waiter dropped with {} pending task(s), waiting", pending);
            self.wait();
        }
    }
}
