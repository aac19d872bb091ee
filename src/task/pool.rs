//! Fixed-size worker pool with batch waiters.
//!
//! Tasks are closures queued FIFO and executed by a fixed set of native
//! threads. A task may be flagged as a *leaf*: it promises not to block on
//! other work of the same pool. Leaf tasks are queued ahead of ordinary
//! ones, and a pool may reserve extra workers that run nothing but leaf
//! tasks, so leaf work always makes progress even while every ordinary
//! worker is blocked in [`Waiter::wait`].

use crate::settings::pool::PoolOptions;
use crate::task::entry::TaskEntry;
use crate::task::waiter::{Waiter, WaiterHandle};
use crate::utils::hardware_concurrency;
use lazy_static::lazy_static;
use log::{debug, error, info, warn};
use std::cell::Cell;
use std::collections::VecDeque;
use std::fmt;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Condvar, Mutex, MutexGuard, PoisonError};
use std::thread::{self, JoinHandle};

/// Worker count of the IO preset.
pub const IO_POOL_THREADS: usize = crate::settings::pool::DEFAULT_IO_THREADS;

static NEXT_POOL_ID: AtomicUsize = AtomicUsize::new(1);

thread_local! {
    /// Id of the pool whose worker is running on this thread.
    static WORKER_OF: Cell<Option<usize>> = const { Cell::new(None) };
}

lazy_static! {
    static ref COMPUTE_POOL: TaskThreadPool = TaskThreadPool::new(0);
    static ref IO_POOL: TaskThreadPool = TaskThreadPool::new(IO_POOL_THREADS);
}

/// Which preset a pool built from configuration stands in for.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PoolKind {
    Compute,
    Io,
}

struct PoolState {
    queue: VecDeque<TaskEntry>,
    running: bool,
}

impl PoolState {
    /// Takes the next task a worker may run. Leaf-only workers take a task
    /// only when a leaf sits at the front.
    fn take(&mut self, leaf_only: bool) -> Option<TaskEntry> {
        if leaf_only && !self.queue.front().is_some_and(|entry| entry.leaf) {
            return None;
        }
        self.queue.pop_front()
    }
}

/// Queue and wake-up signal shared by a pool, its workers and its waiters.
pub(crate) struct Shared {
    id: usize,
    state: Mutex<PoolState>,
    work_available: Condvar,
}

impl fmt::Debug for Shared {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Shared").field("id", &self.id).finish()
    }
}

impl Shared {
    fn lock(&self) -> MutexGuard<'_, PoolState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Pops a queued task of `batch`, newest first. Failing that, pops a
    /// leaf task from the front when `take_leaf` is set.
    pub(crate) fn try_pop_for(&self, batch: &WaiterHandle, take_leaf: bool) -> Option<TaskEntry> {
        let mut state = self.lock();
        let own = state
            .queue
            .iter()
            .rposition(|entry| entry.waiter().is_some_and(|waiter| waiter.same_batch(batch)));
        if let Some(index) = own {
            return state.queue.remove(index);
        }
        if take_leaf && state.queue.front().is_some_and(|entry| entry.leaf) {
            return state.queue.pop_front();
        }
        None
    }
}

/// A fixed set of worker threads executing queued closures.
///
/// Dropping the pool shuts it down: queued tasks are still executed before
/// the workers are joined.
pub struct TaskThreadPool {
    shared: Arc<Shared>,
    max: usize,
    leaf_reserve: usize,
    workers: Mutex<Vec<JoinHandle<()>>>,
}

impl fmt::Debug for TaskThreadPool {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TaskThreadPool")
            .field("id", &self.shared.id)
            .field("max", &self.max)
            .field("leaf_reserve", &self.leaf_reserve)
            .finish()
    }
}

impl TaskThreadPool {
    /// Creates and starts a pool of `threads` workers.
    ///
    /// # Arguments
    ///
    /// * `threads` - Worker count (0 = hardware concurrency)
    pub fn new(threads: usize) -> Self {
        Self::with_leaf_reserve(threads, 0)
    }

    /// Creates and starts a pool with `reserve` additional workers that
    /// only execute leaf tasks.
    ///
    /// # Arguments
    ///
    /// * `threads` - Ordinary worker count (0 = hardware concurrency)
    /// * `reserve` - Leaf-only worker count
    pub fn with_leaf_reserve(threads: usize, reserve: usize) -> Self {
        let max = if threads == 0 {
            hardware_concurrency()
        } else {
            threads
        };
        let pool = Self {
            shared: Arc::new(Shared {
                id: NEXT_POOL_ID.fetch_add(1, Ordering::Relaxed),
                state: Mutex::new(PoolState {
                    queue: VecDeque::new(),
                    running: true,
                }),
                work_available: Condvar::new(),
            }),
            max,
            leaf_reserve: reserve,
            workers: Mutex::new(Vec::new()),
        };

        let mut workers = pool.lock_workers();
        pool.spawn_workers(&mut workers);
        drop(workers);

        info!(
            "Started task pool {} with {} worker(s) and {} leaf worker(s)",
            pool.shared.id, max, reserve
        );
        pool
    }

    /// Builds a pool sized from configuration.
    pub fn from_options(options: &PoolOptions, kind: PoolKind) -> Self {
        let threads = match kind {
            PoolKind::Compute => options.compute_threads,
            PoolKind::Io => options.io_threads,
        };
        Self::with_leaf_reserve(threads, options.leaf_reserve)
    }

    /// Shared pool for CPU-bound work, one worker per logical CPU.
    pub fn for_compute() -> &'static TaskThreadPool {
        &COMPUTE_POOL
    }

    /// Shared pool for blocking IO work.
    pub fn for_io() -> &'static TaskThreadPool {
        &IO_POOL
    }

    pub(crate) fn shared(&self) -> Arc<Shared> {
        self.shared.clone()
    }

    /// Number of ordinary workers, not counting leaf-only ones.
    pub fn get_max_concurrency(&self) -> usize {
        self.max
    }

    pub fn leaf_reserve(&self) -> usize {
        self.leaf_reserve
    }

    /// Whether the pool accepts new tasks.
    pub fn is_running(&self) -> bool {
        self.shared.lock().running
    }

    /// Number of tasks waiting for a worker.
    pub fn queued(&self) -> usize {
        self.shared.lock().queue.len()
    }

    /// Queues `job` for execution.
    ///
    /// If `waiter` is given, its pending count is raised before the task
    /// can be picked up, and a panic in `job` marks the waiter failed.
    ///
    /// # Arguments
    ///
    /// * `waiter` - Batch to account the task to
    /// * `job` - The closure to run
    /// * `leaf` - `job` never waits on other work of this pool
    ///
    /// # Panics
    ///
    /// Panics if the pool has been shut down, or if `waiter` belongs to a
    /// different pool.
    pub fn submit<F>(&self, waiter: Option<&Waiter>, job: F, leaf: bool)
    where
        F: FnOnce() + Send + 'static,
    {
        if let Some(waiter) = waiter {
            assert!(
                waiter.is_bound_to(&self.shared),
                "waiter belongs to a different task pool"
            );
        }

        let mut state = self.shared.lock();
        if !state.running {
            drop(state);
            panic!("submit on stopped task pool {}", self.shared.id);
        }

        let handle = waiter.map(|waiter| {
            let handle = waiter.handle();
            handle.inc();
            handle
        });
        let entry = TaskEntry::new(Box::new(job), handle, leaf);
        if leaf {
            state.queue.push_front(entry);
        } else {
            state.queue.push_back(entry);
        }
        drop(state);

        // leaf-only workers may sleep on the same condvar
        if self.leaf_reserve > 0 {
            self.shared.work_available.notify_all();
        } else {
            self.shared.work_available.notify_one();
        }
    }

    /// Stops the workers after they drain the queue, then starts a fresh
    /// set with the same configuration. Waiters stay bound to the pool.
    ///
    /// # Panics
    ///
    /// Panics when called from one of this pool's workers.
    pub fn recycle(&self) {
        assert!(
            !self.on_own_worker(),
            "recycle called from a worker of task pool {}",
            self.shared.id
        );

        let mut workers = self.lock_workers();
        self.stop_and_join(&mut workers);
        self.shared.lock().running = true;
        self.spawn_workers(&mut workers);
        info!("Recycled task pool {}", self.shared.id);
    }

    /// Stops accepting tasks, drains the queue and joins every worker.
    /// Calling it again is a no-op.
    ///
    /// From one of the pool's own workers the workers are stopped but
    /// detached instead of joined.
    pub fn shutdown(&self) {
        let mut workers = self.lock_workers();
        if workers.is_empty() && !self.is_running() {
            return;
        }

        if self.on_own_worker() {
            warn!(
                "Task pool {} shut down from its own worker, detaching workers",
                self.shared.id
            );
            self.shared.lock().running = false;
            self.shared.work_available.notify_all();
            workers.clear();
            return;
        }

        self.stop_and_join(&mut workers);
        info!("Shut down task pool {}", self.shared.id);
    }

    fn on_own_worker(&self) -> bool {
        WORKER_OF.with(|worker| worker.get() == Some(self.shared.id))
    }

    fn lock_workers(&self) -> MutexGuard<'_, Vec<JoinHandle<()>>> {
        self.workers.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn spawn_workers(&self, workers: &mut Vec<JoinHandle<()>>) {
        for index in 0..self.max + self.leaf_reserve {
            let shared = self.shared.clone();
            let leaf_only = index >= self.max;
            workers.push(thread::spawn(move || worker_loop(shared, leaf_only)));
        }
    }

    fn stop_and_join(&self, workers: &mut Vec<JoinHandle<()>>) {
        self.shared.lock().running = false;
        self.shared.work_available.notify_all();

        debug!(
            "Joining {} worker(s) of task pool {}",
            workers.len(),
            self.shared.id
        );
        for handle in workers.drain(..) {
            if handle.join().is_err() {
                error!("Worker of task pool {} exited abnormally", self.shared.id);
            }
        }
    }
}

impl Drop for TaskThreadPool {
    fn drop(&mut self) {
        self.shutdown();
    }
}

fn worker_loop(shared: Arc<Shared>, leaf_only: bool) {
    WORKER_OF.with(|worker| worker.set(Some(shared.id)));

    loop {
        let entry = {
            let mut state = shared.lock();
            loop {
                if let Some(entry) = state.take(leaf_only) {
                    break Some(entry);
                }
                if !state.running {
                    break None;
                }
                state = shared
                    .work_available
                    .wait(state)
                    .unwrap_or_else(PoisonError::into_inner);
            }
        };

        match entry {
            Some(entry) => entry.run(),
            None => break,
        }
    }

    WORKER_OF.with(|worker| worker.set(None));
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::Rng;
    use std::sync::atomic::AtomicBool;
    use std::sync::mpsc;
    use std::time::Duration;

    fn counting_tasks(pool: &TaskThreadPool, waiter: &Waiter, count: usize) -> Arc<AtomicUsize> {
        let counter = Arc::new(AtomicUsize::new(0));
        for _ in 0..count {
            let counter = counter.clone();
            pool.submit(
                Some(waiter),
                move || {
                    counter.fetch_add(1, Ordering::SeqCst);
                },
                false,
            );
        }
        counter
    }

    #[test]
    fn test_thousand_tasks_run_exactly_once() {
        crate::logging::init_for_tests();
        let pool = TaskThreadPool::new(4);
        let waiter = Waiter::new(&pool);
        let counter = counting_tasks(&pool, &waiter, 1000);

        assert!(waiter.wait());
        assert_eq!(counter.load(Ordering::SeqCst), 1000);
        assert_eq!(waiter.pending(), 0);
    }

    #[test]
    fn test_single_error_fails_batch_in_any_order() {
        let pool = TaskThreadPool::new(4);
        let mut rng = rand::rng();

        for _ in 0..5 {
            let waiter = Waiter::new(&pool);
            let failing = rng.random_range(0..40);
            for index in 0..40 {
                let handle = waiter.handle();
                let pause = Duration::from_micros(rng.random_range(0..500));
                pool.submit(
                    Some(&waiter),
                    move || {
                        thread::sleep(pause);
                        if index == failing {
                            handle.set_error();
                        }
                    },
                    false,
                );
            }
            assert!(!waiter.wait());
        }
    }

    #[test]
    fn test_batch_without_errors_succeeds() {
        let pool = TaskThreadPool::new(3);
        let waiter = Waiter::new(&pool);
        let mut rng = rand::rng();
        for _ in 0..20 {
            let pause = Duration::from_micros(rng.random_range(0..300));
            pool.submit(Some(&waiter), move || thread::sleep(pause), false);
        }
        assert!(waiter.wait());
    }

    #[test]
    fn test_panicking_task_fails_waiter_and_worker_survives() {
        crate::logging::init_for_tests();
        let pool = TaskThreadPool::new(1);

        let waiter = Waiter::new(&pool);
        pool.submit(Some(&waiter), || panic!("task failure"), false);
        assert!(!waiter.wait());

        // without a waiter the panic is only logged
        pool.submit(None, || panic!("unobserved failure"), false);

        let waiter = Waiter::new(&pool);
        let counter = counting_tasks(&pool, &waiter, 10);
        assert!(waiter.wait());
        assert_eq!(counter.load(Ordering::SeqCst), 10);
    }

    #[test]
    fn test_recycle_behaves_like_fresh_pool() {
        let pool = TaskThreadPool::new(2);
        let waiter = Waiter::new(&pool);
        counting_tasks(&pool, &waiter, 10);
        assert!(waiter.wait());

        pool.recycle();
        assert!(pool.is_running());
        assert_eq!(pool.get_max_concurrency(), 2);

        let counter = counting_tasks(&pool, &waiter, 100);
        assert!(waiter.wait());
        assert_eq!(counter.load(Ordering::SeqCst), 100);
    }

    #[test]
    fn test_recycle_drains_queue() {
        let pool = TaskThreadPool::new(1);
        let waiter = Waiter::new(&pool);
        let counter = counting_tasks(&pool, &waiter, 50);

        pool.recycle();
        assert_eq!(counter.load(Ordering::SeqCst), 50);
        assert_eq!(waiter.pending(), 0);
        assert!(waiter.wait());
    }

    #[test]
    fn test_recycle_from_own_worker_panics() {
        let pool = Arc::new(TaskThreadPool::new(1));
        let waiter = Waiter::new(&pool);
        let inner = pool.clone();
        pool.submit(Some(&waiter), move || inner.recycle(), false);
        assert!(!waiter.wait());
    }

    #[test]
    fn test_leaf_task_with_nested_batch_completes() {
        let pool = Arc::new(TaskThreadPool::with_leaf_reserve(1, 1));
        let load = Waiter::new(&pool);
        for _ in 0..4 {
            pool.submit(
                Some(&load),
                || thread::sleep(Duration::from_millis(20)),
                false,
            );
        }

        let nested_ok = Arc::new(AtomicBool::new(false));
        let outer = Waiter::new(&pool);
        {
            let pool = pool.clone();
            let nested_ok = nested_ok.clone();
            pool.clone().submit(
                Some(&outer),
                move || {
                    let inner = Waiter::new(&pool);
                    let counter = counting_tasks(&pool, &inner, 3);
                    let ok = inner.wait() && counter.load(Ordering::SeqCst) == 3;
                    nested_ok.store(ok, Ordering::SeqCst);
                },
                true,
            );
        }

        assert!(outer.wait());
        assert!(nested_ok.load(Ordering::SeqCst));
        assert!(load.wait());
    }

    #[test]
    fn test_nested_wait_on_single_worker() {
        let pool = Arc::new(TaskThreadPool::new(1));
        let outer = Waiter::new(&pool);
        let total = Arc::new(AtomicUsize::new(0));

        for _ in 0..3 {
            let pool_ref = pool.clone();
            let total = total.clone();
            pool.submit(
                Some(&outer),
                move || {
                    let inner = Waiter::new(&pool_ref);
                    let counter = counting_tasks(&pool_ref, &inner, 5);
                    assert!(inner.wait());
                    total.fetch_add(counter.load(Ordering::SeqCst), Ordering::SeqCst);
                },
                false,
            );
        }

        assert!(outer.wait());
        assert_eq!(total.load(Ordering::SeqCst), 15);
    }

    /// Occupies the only worker of `pool` until the returned sender fires.
    fn park_worker(pool: &TaskThreadPool) -> mpsc::Sender<()> {
        let (started_tx, started_rx) = mpsc::channel();
        let (release_tx, release_rx) = mpsc::channel::<()>();
        pool.submit(
            None,
            move || {
                started_tx.send(()).ok();
                release_rx.recv().ok();
            },
            false,
        );
        started_rx.recv().unwrap();
        release_tx
    }

    #[test]
    fn test_deep_queue_of_nested_waits_completes() {
        let pool = Arc::new(TaskThreadPool::new(1));
        let release = park_worker(&pool);

        let outer = Waiter::new(&pool);
        let finished = Arc::new(AtomicUsize::new(0));
        let deepest = Arc::new(AtomicUsize::new(0));
        for _ in 0..3000 {
            let pool_ref = pool.clone();
            let finished = finished.clone();
            let deepest = deepest.clone();
            pool.submit(
                Some(&outer),
                move || {
                    let inner = Waiter::new(&pool_ref);
                    pool_ref.submit(
                        Some(&inner),
                        move || {
                            deepest.fetch_max(
                                crate::task::waiter::inline_depth(),
                                Ordering::SeqCst,
                            );
                        },
                        false,
                    );
                    if inner.wait() {
                        finished.fetch_add(1, Ordering::SeqCst);
                    }
                },
                false,
            );
        }

        release.send(()).unwrap();
        assert!(outer.wait());
        assert_eq!(finished.load(Ordering::SeqCst), 3000);
        // a waiting task only inlines its own sub-batch
        assert!(deepest.load(Ordering::SeqCst) <= 2);
    }

    #[test]
    fn test_wait_leaves_other_batches_to_workers() {
        let pool = TaskThreadPool::new(1);
        let release = park_worker(&pool);
        let foreign = Arc::new(AtomicUsize::new(0));

        for leaf in [false, true] {
            let foreign = foreign.clone();
            pool.submit(
                None,
                move || {
                    foreign.fetch_add(1, Ordering::SeqCst);
                },
                leaf,
            );
        }
        let waiter = Waiter::new(&pool);
        let own = counting_tasks(&pool, &waiter, 3);

        assert!(waiter.wait());
        assert_eq!(own.load(Ordering::SeqCst), 3);
        assert_eq!(foreign.load(Ordering::SeqCst), 0);
        assert_eq!(pool.queued(), 2);

        release.send(()).unwrap();
        pool.shutdown();
        assert_eq!(foreign.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn test_leaf_help_respects_depth_limit() {
        let pool = TaskThreadPool::new(1);
        let release = park_worker(&pool);
        pool.submit(None, || {}, true);

        let waiter = Waiter::new(&pool);
        let shared = pool.shared();
        assert!(shared.try_pop_for(&waiter.handle(), false).is_none());
        assert!(shared.try_pop_for(&waiter.handle(), true).is_some_and(|entry| entry.leaf));
        assert_eq!(pool.queued(), 0);

        release.send(()).unwrap();
    }

    #[test]
    fn test_wait_runs_queued_tasks_on_caller() {
        let pool = TaskThreadPool::new(1);
        let (started_tx, started_rx) = mpsc::channel();
        let (release_tx, release_rx) = mpsc::channel::<()>();

        let blocker = Waiter::new(&pool);
        pool.submit(
            Some(&blocker),
            move || {
                started_tx.send(()).ok();
                release_rx.recv().ok();
            },
            false,
        );
        started_rx.recv().unwrap();

        // the only worker is busy, so the caller has to run these itself
        let waiter = Waiter::new(&pool);
        let counter = counting_tasks(&pool, &waiter, 5);
        assert!(waiter.wait());
        assert_eq!(counter.load(Ordering::SeqCst), 5);

        release_tx.send(()).unwrap();
        assert!(blocker.wait());
    }

    #[test]
    fn test_leaf_tasks_jump_the_queue() {
        let pool = TaskThreadPool::new(1);
        let (started_tx, started_rx) = mpsc::channel();
        let (release_tx, release_rx) = mpsc::channel::<()>();
        let order = Arc::new(Mutex::new(Vec::new()));

        let waiter = Waiter::new(&pool);
        pool.submit(
            Some(&waiter),
            move || {
                started_tx.send(()).ok();
                release_rx.recv().ok();
            },
            false,
        );
        started_rx.recv().unwrap();

        for (label, leaf) in [("a", false), ("b", false), ("leaf", true)] {
            let order = order.clone();
            pool.submit(
                Some(&waiter),
                move || order.lock().unwrap().push(label),
                leaf,
            );
        }
        assert_eq!(pool.queued(), 3);

        release_tx.send(()).unwrap();
        pool.shutdown();
        assert_eq!(*order.lock().unwrap(), vec!["leaf", "a", "b"]);
    }

    #[test]
    fn test_waiter_drop_waits_for_pending() {
        let pool = TaskThreadPool::new(2);
        let counter = {
            let waiter = Waiter::new(&pool);
            counting_tasks(&pool, &waiter, 20)
        };
        assert_eq!(counter.load(Ordering::SeqCst), 20);
    }

    #[test]
    fn test_waiter_reuse_after_completion() {
        let pool = TaskThreadPool::new(2);
        let waiter = Waiter::new(&pool);
        counting_tasks(&pool, &waiter, 5);
        assert!(waiter.wait());

        let counter = counting_tasks(&pool, &waiter, 7);
        assert!(waiter.wait());
        assert_eq!(counter.load(Ordering::SeqCst), 7);
    }

    #[test]
    fn test_shutdown_drains_and_is_idempotent() {
        let pool = TaskThreadPool::new(2);
        let waiter = Waiter::new(&pool);
        let counter = counting_tasks(&pool, &waiter, 30);

        pool.shutdown();
        assert!(!pool.is_running());
        assert_eq!(counter.load(Ordering::SeqCst), 30);
        assert!(waiter.wait());
        pool.shutdown();
    }

    #[test]
    #[should_panic(expected = "submit on stopped task pool")]
    fn test_submit_after_shutdown_panics() {
        let pool = TaskThreadPool::new(1);
        pool.shutdown();
        pool.submit(None, || {}, false);
    }

    #[test]
    #[should_panic(expected = "different task pool")]
    fn test_waiter_from_other_pool_panics() {
        let first = TaskThreadPool::new(1);
        let second = TaskThreadPool::new(1);
        let waiter = Waiter::new(&first);
        second.submit(Some(&waiter), || {}, false);
    }

    #[test]
    fn test_zero_threads_uses_hardware_concurrency() {
        let pool = TaskThreadPool::new(0);
        assert_eq!(pool.get_max_concurrency(), hardware_concurrency());
        assert_eq!(pool.leaf_reserve(), 0);
    }

    #[test]
    fn test_from_options() {
        let options = PoolOptions {
            compute_threads: 3,
            io_threads: 2,
            leaf_reserve: 1,
        };
        let compute = TaskThreadPool::from_options(&options, PoolKind::Compute);
        let io = TaskThreadPool::from_options(&options, PoolKind::Io);
        assert_eq!(compute.get_max_concurrency(), 3);
        assert_eq!(io.get_max_concurrency(), 2);
        assert_eq!(io.leaf_reserve(), 1);
    }

    #[test]
    fn test_presets() {
        let compute = TaskThreadPool::for_compute();
        assert!(std::ptr::eq(compute, TaskThreadPool::for_compute()));
        assert_eq!(compute.get_max_concurrency(), hardware_concurrency());
        assert_eq!(TaskThreadPool::for_io().get_max_concurrency(), IO_POOL_THREADS);

        let waiter = Waiter::new(compute);
        let counter = counting_tasks(compute, &waiter, 8);
        assert!(waiter.wait());
        assert_eq!(counter.load(Ordering::SeqCst), 8);
    }
}
