use crate::task::waiter::WaiterHandle;
use log::error;
use std::any::Any;
use std::panic::{self, AssertUnwindSafe};

pub(crate) type Job = Box<dyn FnOnce() + Send + 'static>;

/// A queued unit of work.
pub(crate) struct TaskEntry {
    job: Job,
    waiter: Option<WaiterHandle>,
    /// The job never blocks on work queued in the same pool.
    pub(crate) leaf: bool,
}

impl TaskEntry {
    pub(crate) fn new(job: Job, waiter: Option<WaiterHandle>, leaf: bool) -> Self {
        Self { job, waiter, leaf }
    }

    pub(crate) fn waiter(&self) -> Option<&WaiterHandle> {
        self.waiter.as_ref()
    }

    /// Runs the job, turning a panic into an error on the attached waiter,
    /// then marks the task done.
    pub(crate) fn run(self) {
        let TaskEntry { job, waiter, leaf } = self;

        if let Err(payload) = panic::catch_unwind(AssertUnwindSafe(job)) {
            error!(
                "{} task panicked: {}",
                if leaf { "Leaf" } else { "Pool" },
                panic_message(payload.as_ref())
            );
            if let Some(waiter) = &waiter {
                waiter.set_error();
            }
        }

        if let Some(waiter) = waiter {
            waiter.dec();
        }
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> &str {
    if let Some(message) = payload.downcast_ref::<&str>() {
        message
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.as_str()
    } else {
        "non-string panic payload"
    }
}
