//! Per-thread trampoline for continuation dispatch.
//!
//! Settling a promise usually settles the next one in its chain, which
//! settles the next one, and so on. Running those drains recursively would
//! grow the stack with the length of the chain, so every drain is scheduled
//! here instead. The outermost call on a thread runs the queue in a loop and
//! any drain scheduled while it runs is appended to the back.
use std::{cell::RefCell, collections::VecDeque};

pub(crate) type Job = Box<dyn FnOnce()>;

thread_local! {
    // `None` while no dispatcher is running on this thread.
    static QUEUE: RefCell<Option<VecDeque<Job>>> = const { RefCell::new(None) };
}

/// Run `job` now if nothing is dispatching on this thread, otherwise queue it
/// behind the jobs already scheduled.
pub(crate) fn schedule(job: Job) {
    let job = QUEUE.with(|queue| {
        let mut queue = queue.borrow_mut();
        match queue.as_mut() {
            Some(pending) => {
                pending.push_back(job);
                None
            }
            None => {
                *queue = Some(VecDeque::new());
                Some(job)
            }
        }
    });
    let Some(job) = job else {
        return;
    };

    let _running = Running;
    job();
    while let Some(next) = QUEUE.with(|queue| queue.borrow_mut().as_mut()?.pop_front()) {
        next();
    }
}

/// Returns the thread to the idle state, even if a job unwinds.
struct Running;

impl Drop for Running {
    fn drop(&mut self) {
        // Leftover jobs are dropped outside the borrow: dropping one may
        // release promises, and that must not touch the queue while borrowed.
        let leftover = QUEUE.with(|queue| queue.borrow_mut().take());
        drop(leftover);
    }
}
