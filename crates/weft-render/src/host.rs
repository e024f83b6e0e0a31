#![forbid(unsafe_code)]

//! The externally owned ordered structure a reconciler patches.
//!
//! A [`Host`] holds nodes in order. The reconciler never reads the host; it
//! only issues `insert` (which doubles as move) and `remove`. [`VecHost`] is
//! the in-memory reference host used in tests and benchmarks, and records
//! every operation it receives.

use std::fmt;

/// Ordered node container driven by the reconciler.
pub trait Host {
    /// Handle to one node. Clones refer to the same node.
    type Node: Clone;

    /// Place `node` immediately before `before`, or at the end when `before`
    /// is `None`. A node already in the host is moved.
    fn insert(&mut self, node: &Self::Node, before: Option<&Self::Node>);

    /// Take `node` out of the host.
    fn remove(&mut self, node: &Self::Node);

    /// Remove every node in `nodes`, which is the full current content.
    fn clear(&mut self, nodes: &[Self::Node]) {
        for node in nodes {
            self.remove(node);
        }
    }
}

/// One operation received by a [`VecHost`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HostOp<N> {
    Insert(N),
    Move(N),
    Remove(N),
    Clear,
}

/// `Vec`-backed host. Nodes are compared with `PartialEq`, so they should be
/// unique handles (ids, `Rc` pointers wrapped for identity, and so on).
#[derive(Clone, PartialEq, Eq)]
pub struct VecHost<N> {
    children: Vec<N>,
    log: Vec<HostOp<N>>,
}

impl<N> Default for VecHost<N> {
    fn default() -> Self {
        Self {
            children: Vec::new(),
            log: Vec::new(),
        }
    }
}

impl<N: Clone + PartialEq> VecHost<N> {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Current content, in order.
    #[must_use]
    pub fn children(&self) -> &[N] {
        &self.children
    }

    /// Operations received since construction or the last [`Self::take_log`].
    #[must_use]
    pub fn log(&self) -> &[HostOp<N>] {
        &self.log
    }

    pub fn take_log(&mut self) -> Vec<HostOp<N>> {
        std::mem::take(&mut self.log)
    }

    fn position(&self, node: &N) -> Option<usize> {
        self.children.iter().position(|n| n == node)
    }
}

impl<N: Clone + PartialEq> Host for VecHost<N> {
    type Node = N;

    fn insert(&mut self, node: &N, before: Option<&N>) {
        let op = match self.position(node) {
            Some(at) => {
                self.children.remove(at);
                HostOp::Move(node.clone())
            }
            None => HostOp::Insert(node.clone()),
        };
        let at = before
            .and_then(|b| self.position(b))
            .unwrap_or(self.children.len());
        self.children.insert(at, node.clone());
        self.log.push(op);
    }

    fn remove(&mut self, node: &N) {
        if let Some(at) = self.position(node) {
            self.children.remove(at);
            self.log.push(HostOp::Remove(node.clone()));
        }
    }

    fn clear(&mut self, _nodes: &[N]) {
        self.children.clear();
        self.log.push(HostOp::Clear);
    }
}

impl<N: fmt::Debug> fmt::Debug for VecHost<N> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_list().entries(&self.children).finish()
    }
}
