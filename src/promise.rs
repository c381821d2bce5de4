use parking_lot::Mutex;
use std::{
    collections::VecDeque,
    fmt,
    panic::{catch_unwind, AssertUnwindSafe},
    sync::Arc,
};

use crate::{
    chain::{Chain, ChainLink, ChainNode, PromiseId},
    dispatch, Error, HandlerException, Rejection,
};

/// The final outcome of a promise.
pub type Outcome<T, E> = Result<T, Rejection<E>>;

pub(crate) type Reaction<T, E> = Box<dyn FnOnce(Outcome<T, E>) + Send + 'static>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum State {
    Pending,
    Fulfilled,
    Rejected,
}

enum Settlement<T, E> {
    Pending,
    Fulfilled(T),
    Rejected(Rejection<E>),
}

impl<T: Clone, E: Clone> Settlement<T, E> {
    fn state(&self) -> State {
        match self {
            Settlement::Pending => State::Pending,
            Settlement::Fulfilled(_) => State::Fulfilled,
            Settlement::Rejected(_) => State::Rejected,
        }
    }

    fn outcome(&self) -> Option<Outcome<T, E>> {
        match self {
            Settlement::Pending => None,
            Settlement::Fulfilled(value) => Some(Ok(value.clone())),
            Settlement::Rejected(rejection) => Some(Err(rejection.clone())),
        }
    }
}

impl<T, E> From<Outcome<T, E>> for Settlement<T, E> {
    fn from(outcome: Outcome<T, E>) -> Self {
        match outcome {
            Ok(value) => Settlement::Fulfilled(value),
            Err(rejection) => Settlement::Rejected(rejection),
        }
    }
}

struct Slot<T, E> {
    settlement: Settlement<T, E>,
    reactions: VecDeque<Reaction<T, E>>,
    // Set while one thread owns draining `reactions`.
    dispatching: bool,
    #[cfg_attr(not(feature = "unhandled-rejections"), allow(dead_code))]
    observed: bool,
}

impl<T, E> Slot<T, E> {
    /// Whether the caller became the dispatcher for this promise.
    fn claim_dispatch(&mut self) -> bool {
        if self.dispatching || self.reactions.is_empty() {
            return false;
        }
        self.dispatching = true;
        true
    }
}

pub(crate) struct Inner<T, E> {
    id: PromiseId,
    name: Mutex<Option<String>>,
    chain: Chain,
    slot: Mutex<Slot<T, E>>,
}

impl<T, E> Inner<T, E>
where
    T: Clone + Send + 'static,
    E: Clone + Send + 'static,
{
    fn new(settlement: Settlement<T, E>, chain: Chain) -> Arc<Self> {
        Arc::new(Inner {
            id: PromiseId::next(),
            name: Mutex::new(None),
            chain,
            slot: Mutex::new(Slot {
                settlement,
                reactions: VecDeque::new(),
                dispatching: false,
                observed: false,
            }),
        })
    }

    /// Moves a pending promise to its final state. Returns `false`, leaving
    /// the promise untouched, if it was already settled.
    pub(crate) fn settle(self: &Arc<Self>, outcome: Outcome<T, E>) -> bool {
        let (state, dispatch) = {
            let mut slot = self.slot.lock();
            if !matches!(slot.settlement, Settlement::Pending) {
                drop(slot);
                tracing::debug!(promise = %self.id, name = ?self.name(), "ignored late settlement");
                return false;
            }
            slot.settlement = outcome.into();
            (slot.settlement.state(), slot.claim_dispatch())
        };
        tracing::trace!(promise = %self.id, name = ?self.name(), ?state, "promise settled");
        if dispatch {
            self.schedule_drain();
        }
        true
    }

    /// Queues `reaction`. It runs once the promise is settled, after every
    /// reaction queued before it.
    pub(crate) fn react(self: &Arc<Self>, reaction: Reaction<T, E>) {
        let dispatch = {
            let mut slot = self.slot.lock();
            slot.observed = true;
            slot.reactions.push_back(reaction);
            match slot.settlement {
                Settlement::Pending => false,
                _ => slot.claim_dispatch(),
            }
        };
        if dispatch {
            self.schedule_drain();
        }
    }

    fn schedule_drain(self: &Arc<Self>) {
        let inner = Arc::clone(self);
        dispatch::schedule(Box::new(move || inner.drain()));
    }

    fn drain(&self) {
        loop {
            let next = {
                let mut slot = self.slot.lock();
                let next = match slot.reactions.pop_front() {
                    Some(reaction) => slot.settlement.outcome().map(|outcome| (reaction, outcome)),
                    None => None,
                };
                if next.is_none() {
                    slot.dispatching = false;
                }
                next
            };
            let Some((reaction, outcome)) = next else {
                return;
            };
            // Runs with the lock released.
            reaction(outcome);
        }
    }

    fn name(&self) -> Option<String> {
        self.name.lock().clone()
    }
}

impl<T, E> ChainLink for Inner<T, E>
where
    T: Clone + Send + 'static,
    E: Clone + Send + 'static,
{
    fn id(&self) -> PromiseId {
        self.id
    }

    fn name(&self) -> Option<String> {
        Inner::name(self)
    }

    fn state(&self) -> State {
        self.slot.lock().settlement.state()
    }

    fn chain(&self) -> &Chain {
        &self.chain
    }
}

#[cfg(feature = "unhandled-rejections")]
impl<T, E> Drop for Inner<T, E> {
    fn drop(&mut self) {
        let slot = self.slot.get_mut();
        if !slot.observed && matches!(slot.settlement, Settlement::Rejected(_)) {
            tracing::warn!(
                promise = %self.id,
                name = ?self.name.get_mut(),
                "rejected promise dropped without a handler"
            );
        }
    }
}

/// A handle to the eventual outcome of an operation.
///
/// Cloning a `Promise` clones the handle, not the operation: every clone
/// observes the same settlement.
///
/// # Examples
///
/// ```
/// use core_promise::{Promise, Step};
/// use std::thread;
///
/// let (promise, resolver) = Promise::<u32, String>::pending();
/// let doubled = promise.then(|v| Step::Value(v * 2));
///
/// thread::spawn(move || resolver.fulfill(21))
///     .join()
///     .expect("The resolver thread has panicked")
///     .unwrap();
/// assert_eq!(doubled.value(), Some(42));
/// ```
pub struct Promise<T, E> {
    pub(crate) inner: Arc<Inner<T, E>>,
}

impl<T, E> Clone for Promise<T, E> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

/// The capability to settle one promise.
///
/// Several clones may race to settle it; only the first call wins.
pub struct Resolver<T, E> {
    pub(crate) inner: Arc<Inner<T, E>>,
}

impl<T, E> Clone for Resolver<T, E> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<T, E> Promise<T, E>
where
    T: Clone + Send + 'static,
    E: Clone + Send + 'static,
{
    /// Creates a pending promise and the resolver that settles it.
    pub fn pending() -> (Self, Resolver<T, E>) {
        Self::pending_with(Chain::default())
    }

    pub(crate) fn pending_with(chain: Chain) -> (Self, Resolver<T, E>) {
        let inner = Inner::new(Settlement::Pending, chain);
        (
            Promise {
                inner: Arc::clone(&inner),
            },
            Resolver { inner },
        )
    }

    /// Creates an already settled promise: `Ok` fulfills, `Err` rejects.
    pub fn settled(result: Result<T, E>) -> Self {
        Self::from_outcome(result.map_err(Rejection::Error))
    }

    pub fn fulfilled(value: T) -> Self {
        Self::from_outcome(Ok(value))
    }

    pub fn rejected(error: E) -> Self {
        Self::from_outcome(Err(Rejection::Error(error)))
    }

    pub(crate) fn from_outcome(outcome: Outcome<T, E>) -> Self {
        Promise {
            inner: Inner::new(outcome.into(), Chain::default()),
        }
    }

    /// Runs `executor` right away with the resolver of a new promise.
    ///
    /// A panic inside `executor` rejects the promise with a
    /// [`HandlerException`], unless the executor settled it first.
    ///
    /// ```
    /// use core_promise::Promise;
    ///
    /// let promise = Promise::<&str, ()>::new(|resolver| {
    ///     resolver.fulfill("ready").unwrap();
    /// });
    /// assert_eq!(promise.value(), Some("ready"));
    /// ```
    pub fn new<F>(executor: F) -> Self
    where
        F: FnOnce(Resolver<T, E>),
    {
        let (promise, resolver) = Self::pending();
        let fallback = resolver.clone();
        if let Err(panic) = catch_unwind(AssertUnwindSafe(move || executor(resolver))) {
            fallback.settle(Err(HandlerException::from_panic(panic).into()));
        }
        promise
    }

    pub fn id(&self) -> PromiseId {
        self.inner.id
    }

    pub fn state(&self) -> State {
        self.inner.slot.lock().settlement.state()
    }

    pub fn is_pending(&self) -> bool {
        self.state() == State::Pending
    }

    /// The fulfilled value, or `None` while pending or when rejected.
    pub fn value(&self) -> Option<T> {
        match &self.inner.slot.lock().settlement {
            Settlement::Fulfilled(value) => Some(value.clone()),
            _ => None,
        }
    }

    /// The rejection, or `None` while pending or when fulfilled.
    pub fn error(&self) -> Option<Rejection<E>> {
        match &self.inner.slot.lock().settlement {
            Settlement::Rejected(rejection) => Some(rejection.clone()),
            _ => None,
        }
    }

    pub fn outcome(&self) -> Option<Outcome<T, E>> {
        self.inner.slot.lock().settlement.outcome()
    }

    pub fn name(&self) -> Option<String> {
        self.inner.name()
    }

    /// Labels the promise for diagnostics. Has no effect on behavior.
    pub fn set_name(&self, name: impl Into<String>) {
        *self.inner.name.lock() = Some(name.into());
    }

    pub fn with_name(self, name: impl Into<String>) -> Self {
        self.set_name(name);
        self
    }

    /// A type-erased view of this promise's place in its chain.
    pub fn node(&self) -> ChainNode {
        let link: Arc<dyn ChainLink> = self.inner.clone();
        ChainNode::new(link)
    }

    pub fn parent(&self) -> Option<ChainNode> {
        self.node().parent()
    }

    pub fn parent_id(&self) -> Option<PromiseId> {
        self.inner.chain.parent_id()
    }

    pub fn root(&self) -> ChainNode {
        self.node().root()
    }
}

impl<T, E> Promise<T, E>
where
    T: Clone + Default + Send + 'static,
    E: Clone + Send + 'static,
{
    /// An already fulfilled promise carrying `T::default()`.
    pub fn empty() -> Self {
        Self::fulfilled(T::default())
    }
}

impl<T, E> fmt::Debug for Promise<T, E>
where
    T: Clone + Send + 'static,
    E: Clone + Send + 'static,
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Promise")
            .field("id", &self.id())
            .field("name", &self.name())
            .field("state", &self.state())
            .finish()
    }
}

impl<T, E> Resolver<T, E>
where
    T: Clone + Send + 'static,
    E: Clone + Send + 'static,
{
    /// Settles the promise from `result`: `Ok` fulfills, `Err` rejects.
    ///
    /// Only the first settlement counts. Any later call leaves the promise
    /// as it is and returns [`Error::AlreadySettled`].
    ///
    /// ```
    /// use core_promise::{Error, Promise};
    ///
    /// let (promise, resolver) = Promise::<i32, String>::pending();
    /// assert_eq!(resolver.resolve(Ok(1)), Ok(()));
    /// assert_eq!(
    ///     resolver.resolve(Err("too late".into())),
    ///     Err(Error::AlreadySettled(promise.id()))
    /// );
    /// assert_eq!(promise.value(), Some(1));
    /// ```
    pub fn resolve(&self, result: Result<T, E>) -> Result<(), Error> {
        if self.settle(result.map_err(Rejection::Error)) {
            Ok(())
        } else {
            Err(Error::AlreadySettled(self.inner.id))
        }
    }

    pub fn fulfill(&self, value: T) -> Result<(), Error> {
        self.resolve(Ok(value))
    }

    pub fn reject(&self, error: E) -> Result<(), Error> {
        self.resolve(Err(error))
    }

    pub fn id(&self) -> PromiseId {
        self.inner.id
    }

    pub(crate) fn settle(&self, outcome: Outcome<T, E>) -> bool {
        self.inner.settle(outcome)
    }
}

impl<T, E> fmt::Debug for Resolver<T, E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Resolver").field("promise", &self.inner.id).finish()
    }
}
