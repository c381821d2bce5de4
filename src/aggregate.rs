use std::sync::{
    atomic::{AtomicBool, AtomicUsize, Ordering},
    Arc,
};

use crate::Promise;

struct Tally {
    remaining: AtomicUsize,
    // Flipped once, by the first input to reject.
    failed: AtomicBool,
}

/// Settles once every input has fulfilled, or as soon as one rejects.
///
/// The aggregate fulfills with `()` and does not collect the inputs' values.
/// The first rejection wins; when inputs reject concurrently on different
/// threads, which one wins is not deterministic. Outcomes arriving after the
/// aggregate has settled are ignored.
///
/// # Examples
///
/// ```
/// use core_promise::{when, Promise, Rejection};
///
/// let (slow, _slow_resolver) = Promise::<i32, String>::pending();
/// let (failing, failing_resolver) = Promise::<i32, String>::pending();
/// let all = when([slow, failing, Promise::fulfilled(3)]);
///
/// failing_resolver.reject("E2".into()).unwrap();
/// assert_eq!(all.error(), Some(Rejection::Error("E2".to_string())));
/// ```
pub fn when<T, E, I>(promises: I) -> Promise<(), E>
where
    T: Clone + Send + 'static,
    E: Clone + Send + 'static,
    I: IntoIterator<Item = Promise<T, E>>,
{
    let promises: Vec<_> = promises.into_iter().collect();
    if promises.is_empty() {
        return Promise::fulfilled(());
    }

    let (aggregate, resolver) = Promise::pending();
    tracing::trace!(promise = %aggregate.id(), inputs = promises.len(), "aggregating");
    let tally = Arc::new(Tally {
        remaining: AtomicUsize::new(promises.len()),
        failed: AtomicBool::new(false),
    });
    for promise in &promises {
        let tally = Arc::clone(&tally);
        let resolver = resolver.clone();
        promise.done(move |outcome| match outcome {
            Ok(_) => {
                if tally.remaining.fetch_sub(1, Ordering::AcqRel) == 1 {
                    resolver.settle(Ok(()));
                }
            }
            Err(rejection) => {
                if !tally.failed.swap(true, Ordering::AcqRel) {
                    resolver.settle(Err(rejection));
                }
            }
        });
    }
    aggregate
}

impl<T, E> Promise<T, E>
where
    T: Clone + Send + 'static,
    E: Clone + Send + 'static,
{
    /// See [`when`].
    pub fn when<I>(promises: I) -> Promise<(), E>
    where
        I: IntoIterator<Item = Promise<T, E>>,
    {
        when(promises)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{Rejection, State, Step};
    use std::thread;

    #[test]
    fn test_empty_input_fulfills() {
        let all = when(Vec::<Promise<i32, String>>::new());
        assert_eq!(all.outcome(), Some(Ok(())));
    }

    #[test]
    fn test_fulfills_after_every_input() {
        let (p1, r1) = Promise::<i32, String>::pending();
        let (p2, r2) = Promise::<i32, String>::pending();
        let all = when([p1, p2, Promise::fulfilled(0)]);

        r1.fulfill(1).unwrap();
        assert_eq!(all.state(), State::Pending);
        r2.fulfill(2).unwrap();
        assert_eq!(all.outcome(), Some(Ok(())));
    }

    #[test]
    fn test_first_rejection_wins() {
        let (p1, r1) = Promise::<i32, String>::pending();
        let (p2, r2) = Promise::<i32, String>::pending();
        let (p3, r3) = Promise::<i32, String>::pending();
        let all = when([p1, p2, p3]);

        r2.reject("E2".into()).unwrap();
        assert_eq!(all.error(), Some(Rejection::Error("E2".to_string())));

        r3.reject("E3".into()).unwrap();
        r1.fulfill(1).unwrap();
        assert_eq!(all.error(), Some(Rejection::Error("E2".to_string())));
    }

    #[test]
    fn test_already_rejected_input() {
        let all = Promise::when([
            Promise::<i32, String>::fulfilled(1),
            Promise::rejected("early".into()),
        ]);
        assert_eq!(all.error(), Some(Rejection::Error("early".to_string())));
    }

    #[test]
    fn test_handler_exception_propagates() {
        let broken = Promise::<i32, String>::fulfilled(1).then(|_| -> Step<i32, String> {
            panic!("inside when");
        });
        let all = when([broken]);
        assert!(all.error().map_or(false, |r| r.is_handler_exception()));
    }

    #[test]
    fn test_concurrent_rejections_settle_once() {
        let pairs: Vec<_> = (0..8).map(|_| Promise::<i32, usize>::pending()).collect();
        let all = when(pairs.iter().map(|(promise, _)| promise.clone()));
        let tasks: Vec<_> = pairs
            .into_iter()
            .enumerate()
            .map(|(i, (_, resolver))| thread::spawn(move || resolver.reject(i)))
            .collect();
        for task in tasks {
            task.join().expect("The resolver thread has panicked").unwrap();
        }
        let winner = all.error().and_then(Rejection::into_error);
        assert!(matches!(winner, Some(i) if i < 8));
    }
}
