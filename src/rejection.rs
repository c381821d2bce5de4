use std::any::Any;
use thiserror::Error;

/// Why a promise was rejected.
///
/// `Error` carries whatever the resolving code handed to
/// [`Resolver::reject`](crate::Resolver::reject). `HandlerException` means a
/// handler panicked while processing an outcome, which lets callers tell "the
/// operation failed" apart from "a bug fired while handling the result".
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum Rejection<E> {
    #[error("{0}")]
    Error(E),
    #[error(transparent)]
    HandlerException(#[from] HandlerException),
}

impl<E> Rejection<E> {
    /// The domain error, if this is not a handler exception.
    pub fn error(&self) -> Option<&E> {
        match self {
            Rejection::Error(err) => Some(err),
            Rejection::HandlerException(_) => None,
        }
    }

    pub fn handler_exception(&self) -> Option<&HandlerException> {
        match self {
            Rejection::Error(_) => None,
            Rejection::HandlerException(exception) => Some(exception),
        }
    }

    pub fn is_handler_exception(&self) -> bool {
        matches!(self, Rejection::HandlerException(_))
    }

    pub fn into_error(self) -> Option<E> {
        match self {
            Rejection::Error(err) => Some(err),
            Rejection::HandlerException(_) => None,
        }
    }
}

/// A panic caught while running a handler, an executor or a `finally` block.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("handler raised an exception: {payload}")]
pub struct HandlerException {
    /// The panic message, when the panic carried a string.
    pub payload: String,
}

impl HandlerException {
    pub fn new(payload: impl Into<String>) -> Self {
        Self {
            payload: payload.into(),
        }
    }

    pub(crate) fn from_panic(panic: Box<dyn Any + Send>) -> Self {
        let payload = match panic.downcast::<String>() {
            Ok(message) => *message,
            Err(panic) => match panic.downcast_ref::<&'static str>() {
                Some(message) => (*message).to_owned(),
                None => "non-string panic payload".to_owned(),
            },
        };
        Self { payload }
    }
}
