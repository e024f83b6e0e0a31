#![forbid(unsafe_code)]

//! Mount a reactive [`Array`] onto a [`Host`].
//!
//! The mount renders the current items immediately, then registers the
//! array's structural observer so every flushed shape change re-runs the
//! [`ListRenderer`]. Changes inside nested items do not re-render; the
//! `update` callback of the next structural render sees them.

use std::cell::RefCell;
use std::fmt;
use std::rc::Rc;

use tracing::{error, trace};
use weft_render::{Host, ListRenderer, ReconcileError, ReconcileStats};
use weft_runtime::{Array, Datum, Subscription};

type Renderer<N> = Rc<RefCell<ListRenderer<Datum, N>>>;

/// A live list mount. Dropping it stops re-rendering but leaves the host as
/// it is; [`ListMount::unmount`] also clears the host.
pub struct ListMount<H: Host> {
    renderer: Renderer<H::Node>,
    host: Rc<RefCell<H>>,
    subscription: Subscription,
}

/// Render `array` into `host` and keep it in sync.
///
/// # Errors
///
/// [`ReconcileError::DuplicateKey`] if the array currently holds two equal
/// plain values. Later failures are logged at `error` and leave the host
/// showing the last good render.
pub fn mount_list<H, C, U>(
    array: &Array,
    host: Rc<RefCell<H>>,
    create: C,
    update: U,
) -> Result<ListMount<H>, ReconcileError>
where
    H: Host + 'static,
    H::Node: 'static,
    C: FnMut(&Datum) -> H::Node + 'static,
    U: FnMut(&H::Node, &Datum) + 'static,
{
    let renderer: Renderer<H::Node> = Rc::new(RefCell::new(ListRenderer::new(create, update)));
    renderer
        .borrow_mut()
        .render(&mut *host.borrow_mut(), array.items())?;

    let weak_renderer = Rc::downgrade(&renderer);
    let weak_host = Rc::downgrade(&host);
    let subscription = array.on_structure(move |items| {
        let (Some(renderer), Some(host)) = (weak_renderer.upgrade(), weak_host.upgrade()) else {
            return;
        };
        let result = renderer
            .borrow_mut()
            .render(&mut *host.borrow_mut(), items.to_vec());
        match result {
            Ok(stats) => trace!(
                created = stats.created,
                moved = stats.moved,
                removed = stats.removed,
                "list re-rendered"
            ),
            Err(err) => error!(error = %err, "list render failed; keeping previous render"),
        }
    });

    Ok(ListMount {
        renderer,
        host,
        subscription,
    })
}

impl<H: Host> ListMount<H> {
    /// Nodes currently rendered, in order.
    #[must_use]
    pub fn nodes(&self) -> Vec<H::Node> {
        self.renderer.borrow().nodes().to_vec()
    }

    /// Stats summed over every render, the initial one included.
    #[must_use]
    pub fn totals(&self) -> ReconcileStats {
        self.renderer.borrow().totals()
    }

    #[must_use]
    pub fn renders(&self) -> u64 {
        self.renderer.borrow().renders()
    }

    /// Stop re-rendering and remove every rendered node from the host.
    pub fn unmount(self) {
        let nodes = self.nodes();
        let Self {
            host, subscription, ..
        } = self;
        subscription.unsubscribe();
        if !nodes.is_empty() {
            host.borrow_mut().clear(&nodes);
        }
    }
}

impl<H: Host> fmt::Debug for ListMount<H> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ListMount")
            .field("renderer", &*self.renderer.borrow())
            .field("subscription", &self.subscription.id())
            .finish()
    }
}
