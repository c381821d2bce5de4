//! Lets a promise be `.await`ed.
//!
//! The future is one more continuation: it registers a `done` observer which
//! stores the outcome and wakes whoever polled last.
use parking_lot::Mutex;
use std::{
    future::{Future, IntoFuture},
    pin::Pin,
    sync::Arc,
    task::{Context, Poll, Waker},
};

use crate::{promise::Outcome, Promise};

/// Future returned by `Promise::into_future`.
///
/// # Examples
///
/// ```
/// use core_promise::Promise;
/// use futures::executor::block_on;
/// use std::thread;
///
/// let (promise, resolver) = Promise::<String, ()>::pending();
/// let task1 = thread::spawn(move || block_on(async {
///     println!("Received {:?}", promise.await);
/// }));
/// resolver.fulfill("Hi".into()).unwrap();
/// task1.join().expect("The task1 thread has panicked.");
/// ```
pub struct Settled<T, E> {
    shared: Arc<Mutex<Waiting<T, E>>>,
}

struct Waiting<T, E> {
    outcome: Option<Outcome<T, E>>,
    waker: Option<Waker>,
}

impl<T, E> IntoFuture for Promise<T, E>
where
    T: Clone + Send + 'static,
    E: Clone + Send + 'static,
{
    type Output = Outcome<T, E>;
    type IntoFuture = Settled<T, E>;

    fn into_future(self) -> Self::IntoFuture {
        let shared = Arc::new(Mutex::new(Waiting {
            outcome: None,
            waker: None,
        }));
        let slot = shared.clone();
        self.done(move |outcome| {
            let waker = {
                let mut waiting = slot.lock();
                waiting.outcome = Some(outcome);
                waiting.waker.take()
            };
            if let Some(waker) = waker {
                waker.wake()
            }
        });
        Settled { shared }
    }
}

impl<T, E> Future for Settled<T, E> {
    type Output = Outcome<T, E>;

    fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        let mut waiting = self.shared.lock();
        match waiting.outcome.take() {
            Some(outcome) => Poll::Ready(outcome),
            None => {
                waiting.waker = Some(cx.waker().clone());
                Poll::Pending
            }
        }
    }
}
