//! Chainable promises with exactly-once settlement.
//!
//! A [`Promise`] is created pending together with the [`Resolver`] that
//! settles it, or already settled from a known result. Continuations
//! ([`Promise::then`], [`Promise::catch`], [`Promise::finally`], ...) each
//! return a new promise, so error handling can be attached anywhere
//! downstream of where a failure happens. [`when`] combines several promises
//! into one that fails fast.
//!
//! Handlers run after the lock guarding settlement is released, one promise's
//! handlers in registration order. There is no executor here: a handler runs
//! on whichever thread settled the promise, or on the thread that attached it
//! if the promise was already settled.
//!
//! The exception is work started from inside a running handler. Handlers are
//! dispatched from a per-thread queue, so a handler attached (or a promise
//! settled) while another handler is running on the same thread is deferred
//! until that handler returns. A promise derived inside a handler is therefore
//! still pending when the handler looks at it, even if its source was already
//! settled. Return it as [`Step::Promise`] instead of waiting on it: blocking a
//! handler until such a promise settles never returns.
//!
//! ```
//! use core_promise::{Promise, Rejection, Step};
//!
//! let (download, resolver) = Promise::<Vec<u8>, String>::pending();
//! let size = download
//!     .then(|bytes| Step::Value(bytes.len()))
//!     .catch(|rejection| match rejection {
//!         Rejection::Error(_) => Step::Value(0),
//!         other => Step::Error(other),
//!     });
//!
//! resolver.reject("connection reset".into()).unwrap();
//! assert_eq!(size.value(), Some(0));
//! ```
use thiserror::Error;

mod aggregate;
mod chain;
mod continuation;
mod dispatch;
mod future;
mod promise;
mod rejection;

pub use aggregate::when;
pub use chain::{Ancestors, ChainNode, PromiseId};
pub use continuation::{OnFulfilled, OnRejected, Step};
pub use future::Settled;
pub use promise::{Outcome, Promise, Resolver, State};
pub use rejection::{HandlerException, Rejection};

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum Error {
    /// The promise had already settled; the late outcome was dropped.
    #[error("promise {0} is already settled")]
    AlreadySettled(PromiseId),
}
