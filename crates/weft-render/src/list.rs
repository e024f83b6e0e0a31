#![forbid(unsafe_code)]

//! List rendering on top of [`reconcile`].
//!
//! [`render_list`] picks the cheapest strategy from the emptiness of the two
//! sequences: clear everything, append everything, or reconcile.
//! [`ListRenderer`] keeps the previous items and nodes between renders.

use std::fmt;
use std::hash::Hash;

use tracing::trace;

use crate::host::Host;
use crate::reconcile::{ReconcileError, ReconcileStats, Reconciled, index_unique, reconcile};

/// Render `next` over a host currently showing `prev` through `prev_nodes`.
///
/// # Errors
///
/// As [`reconcile`].
pub fn render_list<T, H, C, U>(
    host: &mut H,
    prev: &[T],
    prev_nodes: &[H::Node],
    next: &[T],
    mut create: C,
    update: U,
) -> Result<Reconciled<H::Node>, ReconcileError>
where
    T: Eq + Hash,
    H: Host,
    C: FnMut(&T) -> H::Node,
    U: FnMut(&H::Node, &T),
{
    if prev.len() != prev_nodes.len() {
        return Err(ReconcileError::NodeCountMismatch {
            items: prev.len(),
            nodes: prev_nodes.len(),
        });
    }
    if next.is_empty() {
        if !prev_nodes.is_empty() {
            host.clear(prev_nodes);
        }
        trace!(removed = prev_nodes.len(), "list cleared");
        return Ok(Reconciled {
            nodes: Vec::new(),
            stats: ReconcileStats {
                removed: prev_nodes.len(),
                ..ReconcileStats::default()
            },
        });
    }
    if prev.is_empty() {
        index_unique(next)?;
        let nodes: Vec<H::Node> = next
            .iter()
            .map(|item| {
                let node = create(item);
                host.insert(&node, None);
                node
            })
            .collect();
        trace!(created = nodes.len(), "list appended");
        return Ok(Reconciled {
            stats: ReconcileStats {
                created: nodes.len(),
                ..ReconcileStats::default()
            },
            nodes,
        });
    }
    reconcile(host, prev, prev_nodes, next, create, update)
}

/// Stateful list renderer: remembers what it last rendered.
pub struct ListRenderer<T, N> {
    items: Vec<T>,
    nodes: Vec<N>,
    create: Box<dyn FnMut(&T) -> N>,
    update: Box<dyn FnMut(&N, &T)>,
    totals: ReconcileStats,
    renders: u64,
}

impl<T: Eq + Hash, N: Clone> ListRenderer<T, N> {
    /// Renderer with nothing rendered yet.
    pub fn new(create: impl FnMut(&T) -> N + 'static, update: impl FnMut(&N, &T) + 'static) -> Self {
        Self {
            items: Vec::new(),
            nodes: Vec::new(),
            create: Box::new(create),
            update: Box::new(update),
            totals: ReconcileStats::default(),
            renders: 0,
        }
    }

    /// Patch `host` to show `next`.
    ///
    /// # Errors
    ///
    /// As [`render_list`]; on error the renderer keeps its previous state.
    pub fn render<H>(&mut self, host: &mut H, next: Vec<T>) -> Result<ReconcileStats, ReconcileError>
    where
        H: Host<Node = N>,
    {
        let out = render_list(
            host,
            &self.items,
            &self.nodes,
            &next,
            &mut self.create,
            &mut self.update,
        )?;
        self.items = next;
        self.nodes = out.nodes;
        self.totals.absorb(out.stats);
        self.renders += 1;
        Ok(out.stats)
    }

    /// Items last rendered.
    #[must_use]
    pub fn items(&self) -> &[T] {
        &self.items
    }

    /// Nodes last rendered, aligned with [`Self::items`].
    #[must_use]
    pub fn nodes(&self) -> &[N] {
        &self.nodes
    }

    /// Stats summed over every successful render.
    #[must_use]
    pub fn totals(&self) -> ReconcileStats {
        self.totals
    }

    #[must_use]
    pub fn renders(&self) -> u64 {
        self.renders
    }
}

impl<T, N> fmt::Debug for ListRenderer<T, N> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ListRenderer")
            .field("len", &self.items.len())
            .field("renders", &self.renders)
            .field("totals", &self.totals)
            .finish()
    }
}
