//! Chain bookkeeping: who a promise was derived from and which promise
//! started the chain.
//!
//! Promises in one chain usually have different value types, so links are
//! type-erased behind [`ChainLink`].
use std::{
    fmt,
    sync::{
        atomic::{AtomicU64, Ordering},
        Arc, Weak,
    },
};

use crate::State;

static NEXT_ID: AtomicU64 = AtomicU64::new(1);

/// Process-unique identity of a promise.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct PromiseId(u64);

impl PromiseId {
    pub(crate) fn next() -> Self {
        PromiseId(NEXT_ID.fetch_add(1, Ordering::Relaxed))
    }

    pub fn as_u64(&self) -> u64 {
        self.0
    }
}

impl fmt::Display for PromiseId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

pub(crate) trait ChainLink: Send + Sync {
    fn id(&self) -> PromiseId;
    fn name(&self) -> Option<String>;
    fn state(&self) -> State;
    fn chain(&self) -> &Chain;
}

/// Links stored on every promise. Both are empty on a root.
#[derive(Default)]
pub(crate) struct Chain {
    parent: Option<(PromiseId, Weak<dyn ChainLink>)>,
    root: Option<Arc<dyn ChainLink>>,
}

impl Chain {
    /// Links for a promise derived from `parent`.
    pub(crate) fn derived_from(parent: &Arc<dyn ChainLink>) -> Self {
        let root = match &parent.chain().root {
            Some(root) => Arc::clone(root),
            None => Arc::clone(parent),
        };
        Chain {
            parent: Some((parent.id(), Arc::downgrade(parent))),
            root: Some(root),
        }
    }

    pub(crate) fn parent_id(&self) -> Option<PromiseId> {
        self.parent.as_ref().map(|(id, _)| *id)
    }
}

/// A type-erased view of one promise in a chain, for diagnostics.
///
/// Holding a `ChainNode` keeps the promise's storage alive, but grants no way
/// to settle it.
#[derive(Clone)]
pub struct ChainNode {
    link: Arc<dyn ChainLink>,
}

impl ChainNode {
    pub(crate) fn new(link: Arc<dyn ChainLink>) -> Self {
        Self { link }
    }

    pub fn id(&self) -> PromiseId {
        self.link.id()
    }

    pub fn name(&self) -> Option<String> {
        self.link.name()
    }

    pub fn state(&self) -> State {
        self.link.state()
    }

    /// The promise this one was derived from, if it is still alive.
    pub fn parent(&self) -> Option<ChainNode> {
        let (_, parent) = self.link.chain().parent.as_ref()?;
        parent.upgrade().map(ChainNode::new)
    }

    /// Recorded even after the parent itself has been released.
    pub fn parent_id(&self) -> Option<PromiseId> {
        self.link.chain().parent_id()
    }

    pub fn is_root(&self) -> bool {
        self.link.chain().root.is_none()
    }

    /// The first promise of the chain. A root is its own root.
    pub fn root(&self) -> ChainNode {
        match &self.link.chain().root {
            Some(root) => ChainNode::new(Arc::clone(root)),
            None => self.clone(),
        }
    }

    /// Walks parent links towards the root, nearest first, stopping early at
    /// a parent that has already been released.
    pub fn ancestors(&self) -> Ancestors {
        Ancestors {
            next: self.parent(),
        }
    }
}

impl fmt::Debug for ChainNode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ChainNode")
            .field("id", &self.id())
            .field("name", &self.name())
            .field("state", &self.state())
            .field("parent", &self.parent_id())
            .finish()
    }
}

pub struct Ancestors {
    next: Option<ChainNode>,
}

impl Iterator for Ancestors {
    type Item = ChainNode;

    fn next(&mut self) -> Option<ChainNode> {
        let current = self.next.take()?;
        self.next = current.parent();
        Some(current)
    }
}

#[cfg(test)]
mod tests {
    use crate::{Promise, Step};

    #[test]
    fn test_root_of_root_is_itself() {
        let p0 = Promise::<i32, String>::fulfilled(1);
        let node = p0.node();
        assert!(node.is_root());
        assert_eq!(node.root().id(), p0.id());
        assert!(node.parent().is_none());
        assert_eq!(node.ancestors().count(), 0);
    }

    #[test]
    fn test_derived_links() {
        let (p0, _resolver) = Promise::<i32, String>::pending();
        let p1 = p0.then(|v| Step::Value(v + 1));
        let p2 = p1.then(|v| Step::Value(v.to_string()));

        assert_eq!(p2.root().id(), p0.id());
        assert_eq!(p1.root().id(), p0.id());
        assert_eq!(p1.parent().map(|n| n.id()), Some(p0.id()));
        assert_eq!(p2.parent().map(|n| n.id()), Some(p1.id()));

        let ids: Vec<_> = p2.node().ancestors().map(|n| n.id()).collect();
        assert_eq!(ids, vec![p1.id(), p0.id()]);
    }

    #[test]
    fn test_parent_is_not_kept_alive() {
        let p0 = Promise::<i32, String>::fulfilled(1);
        let p1 = p0.then(|v| Step::Value(v + 1));
        let p2 = p1.then(|v| Step::Value(v + 1));
        let p1_id = p1.id();
        drop(p1);

        assert!(p2.parent().is_none());
        assert_eq!(p2.parent_id(), Some(p1_id));
        assert_eq!(p2.root().id(), p0.id());
        assert_eq!(p2.value(), Some(3));
    }

    #[test]
    fn test_pending_parent_outlives_handle() {
        let (p0, resolver) = Promise::<i32, String>::pending();
        let p1 = p0.then(|v| Step::Value(v + 1));
        let p2 = p1.then(|v| Step::Value(v + 1));
        drop(p1);
        // p0's queued continuation owns p1's resolver until p0 settles.
        assert!(p2.parent().is_some());
        resolver.fulfill(1).unwrap();
        assert_eq!(p2.value(), Some(3));
    }

    #[test]
    fn test_root_keeps_chain_alive() {
        let derived = {
            let p0 = Promise::<i32, String>::fulfilled(1).with_name("origin");
            p0.then(|v| Step::Value(v * 2))
        };
        assert_eq!(derived.root().name().as_deref(), Some("origin"));
        assert_eq!(derived.value(), Some(2));
    }
}
