//! `then`-style continuations.
//!
//! Every handler runs behind one catch boundary: a panic becomes a
//! [`Rejection::HandlerException`] on the derived promise. Whatever the
//! handler returns is a [`Step`], which is flattened into the derived promise.
use std::{
    panic::{catch_unwind, AssertUnwindSafe},
    sync::Arc,
};

use crate::{
    chain::{Chain, ChainLink},
    promise::{Outcome, Resolver},
    HandlerException, Promise, Rejection,
};

/// What a handler hands back to settle the derived promise.
pub enum Step<T, E> {
    /// Fulfill with this value.
    Value(T),
    /// Reject with this rejection.
    Error(Rejection<E>),
    /// Settle the same way as this promise, once it settles.
    Promise(Promise<T, E>),
}

impl<T, E> Step<T, E> {
    pub fn reject(error: E) -> Self {
        Step::Error(Rejection::Error(error))
    }

    pub fn from_outcome(outcome: Outcome<T, E>) -> Self {
        match outcome {
            Ok(value) => Step::Value(value),
            Err(rejection) => Step::Error(rejection),
        }
    }
}

impl<T: Default, E> Step<T, E> {
    /// Fulfill with the empty value of `T`.
    pub fn empty() -> Self {
        Step::Value(T::default())
    }
}

impl<T, E> From<Result<T, E>> for Step<T, E> {
    fn from(result: Result<T, E>) -> Self {
        match result {
            Ok(value) => Step::Value(value),
            Err(error) => Step::reject(error),
        }
    }
}

impl<T, E> From<Promise<T, E>> for Step<T, E> {
    fn from(promise: Promise<T, E>) -> Self {
        Step::Promise(promise)
    }
}

pub type OnFulfilled<T, E> = Box<dyn FnOnce(T) -> Step<T, E> + Send + 'static>;
pub type OnRejected<T, E> = Box<dyn FnOnce(Rejection<E>) -> Step<T, E> + Send + 'static>;

impl<T, E> Resolver<T, E>
where
    T: Clone + Send + 'static,
    E: Clone + Send + 'static,
{
    pub(crate) fn settle_step(&self, step: Step<T, E>) {
        match step {
            Step::Value(value) => {
                self.settle(Ok(value));
            }
            Step::Error(rejection) => {
                self.settle(Err(rejection));
            }
            Step::Promise(nested) if Arc::ptr_eq(&nested.inner, &self.inner) => {
                self.settle(Err(HandlerException::new("promise resolved with itself").into()));
            }
            Step::Promise(nested) => {
                let target = self.clone();
                nested.inner.react(Box::new(move |outcome| {
                    target.settle(outcome);
                }));
            }
        }
    }
}

impl<T, E> Promise<T, E>
where
    T: Clone + Send + 'static,
    E: Clone + Send + 'static,
{
    /// Registers `reaction` and returns the promise it settles.
    fn derive<U, F>(&self, reaction: F) -> Promise<U, E>
    where
        U: Clone + Send + 'static,
        F: FnOnce(Outcome<T, E>) -> Step<U, E> + Send + 'static,
    {
        let parent: Arc<dyn ChainLink> = self.inner.clone();
        let (derived, resolver) = Promise::pending_with(Chain::derived_from(&parent));
        self.inner.react(Box::new(move |outcome| {
            let step = match catch_unwind(AssertUnwindSafe(move || reaction(outcome))) {
                Ok(step) => step,
                Err(panic) => Step::Error(HandlerException::from_panic(panic).into()),
            };
            resolver.settle_step(step);
        }));
        derived
    }

    /// Chains a fulfillment handler. Rejections skip it and reach the derived
    /// promise unchanged.
    ///
    /// ```
    /// use core_promise::{Promise, Step};
    ///
    /// let length = Promise::<&str, ()>::fulfilled("promise")
    ///     .then(|s| Step::Value(s.len()));
    /// assert_eq!(length.value(), Some(7));
    /// ```
    pub fn then<U, F>(&self, on_fulfilled: F) -> Promise<U, E>
    where
        U: Clone + Send + 'static,
        F: FnOnce(T) -> Step<U, E> + Send + 'static,
    {
        self.derive(move |outcome| match outcome {
            Ok(value) => on_fulfilled(value),
            Err(rejection) => Step::Error(rejection),
        })
    }

    /// Chains a rejection handler. Fulfillments skip it and reach the derived
    /// promise unchanged.
    ///
    /// ```
    /// use core_promise::{Promise, Step};
    ///
    /// let recovered = Promise::<u8, String>::rejected("offline".into())
    ///     .then(|v| Step::Value(v + 1))
    ///     .catch(|_| Step::Value(0));
    /// assert_eq!(recovered.value(), Some(0));
    /// ```
    pub fn catch<F>(&self, on_rejected: F) -> Promise<T, E>
    where
        F: FnOnce(Rejection<E>) -> Step<T, E> + Send + 'static,
    {
        self.derive(move |outcome| match outcome {
            Ok(value) => Step::Value(value),
            Err(rejection) => on_rejected(rejection),
        })
    }

    /// Chains both handlers; exactly one of them runs.
    pub fn then_catch<U, F, R>(&self, on_fulfilled: F, on_rejected: R) -> Promise<U, E>
    where
        U: Clone + Send + 'static,
        F: FnOnce(T) -> Step<U, E> + Send + 'static,
        R: FnOnce(Rejection<E>) -> Step<U, E> + Send + 'static,
    {
        self.derive(move |outcome| match outcome {
            Ok(value) => on_fulfilled(value),
            Err(rejection) => on_rejected(rejection),
        })
    }

    /// `then` with either handler optional. A missing handler passes its side
    /// of the outcome through.
    pub fn then_opt(
        &self,
        on_fulfilled: Option<OnFulfilled<T, E>>,
        on_rejected: Option<OnRejected<T, E>>,
    ) -> Promise<T, E> {
        self.derive(move |outcome| match (outcome, on_fulfilled, on_rejected) {
            (Ok(value), Some(handler), _) => handler(value),
            (Err(rejection), _, Some(handler)) => handler(rejection),
            (outcome, _, _) => Step::from_outcome(outcome),
        })
    }

    /// Runs `handler` on either settlement and passes the outcome through.
    ///
    /// If `handler` panics, its exception replaces the outcome for the
    /// derived promise, even when the source was rejected.
    pub fn finally<F>(&self, handler: F) -> Promise<T, E>
    where
        F: FnOnce() + Send + 'static,
    {
        self.derive(move |outcome| {
            handler();
            Step::from_outcome(outcome)
        })
    }

    /// Observes the outcome without deriving a new promise.
    ///
    /// A panic in `observer` is caught and logged; nothing else sees it.
    pub fn done<F>(&self, observer: F)
    where
        F: FnOnce(Outcome<T, E>) + Send + 'static,
    {
        let id = self.id();
        self.inner.react(Box::new(move |outcome| {
            if let Err(panic) = catch_unwind(AssertUnwindSafe(move || observer(outcome))) {
                let exception = HandlerException::from_panic(panic);
                tracing::warn!(promise = %id, %exception, "done observer panicked");
            }
        }));
    }
}
