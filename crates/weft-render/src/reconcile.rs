#![forbid(unsafe_code)]

//! Keyed-sequence reconciliation.
//!
//! Given the previous items with their nodes and the next items, patch a
//! [`Host`] into the next order while reusing every node whose item survives.
//!
//! # Design
//!
//! Four phases over a shrinking window `[a0, a1)` of old items and
//! `[b0, b1)` of new items:
//!
//! 1. **Ends**: match common prefix and suffix in place; an old head equal to
//!    the new tail (or old tail equal to the new head) is moved across. This
//!    settles prepend, append, no-op and reversal linearly. The cross move is
//!    taken greedily and can cost one move the LIS pass would have avoided
//!    (`[A, B] -> [X, A]` moves `A`).
//! 2. **Exhaustion**: an empty new window removes the rest; an empty old
//!    window creates the rest before the first settled suffix node.
//! 3. **Index map**: each remaining old item is looked up among the new keys;
//!    hits record their old position at the new index, misses are removed.
//!    No hits at all means wholesale replacement.
//! 4. **LIS**: the longest increasing run of recorded old positions is
//!    already in order. Walking the new window back to front, run members
//!    are updated in place and every other item is created or moved before
//!    the node placed after it.
//!
//! # Invariants
//!
//! 1. Every reused node receives exactly one `update` call.
//! 2. Inside the phase 4 window, `moved == reused - |LIS|`. Over the whole
//!    call, moves are at least `shared - |LIS|` and at most `shared`.
//! 3. The host ends holding exactly the returned nodes, in order.
//!
//! # Failure Modes
//!
//! | Condition | Behavior |
//! |-----------|----------|
//! | Two next items share a key | `DuplicateKey`, host untouched |
//! | `prev.len() != prev_nodes.len()` | `NodeCountMismatch`, host untouched |

use std::hash::Hash;

use ahash::AHashMap;
use tracing::{debug, trace};

use crate::host::Host;
use crate::lis::longest_increasing_subsequence;

/// Reconciliation failure. Checked before any host mutation.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ReconcileError {
    #[error("duplicate key at index {index} of the next sequence")]
    DuplicateKey { index: usize },

    #[error("{items} previous items but {nodes} previous nodes")]
    NodeCountMismatch { items: usize, nodes: usize },
}

/// Work done by one reconciliation.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ReconcileStats {
    pub created: usize,
    pub moved: usize,
    pub removed: usize,
    pub updated: usize,
}

impl ReconcileStats {
    /// Host mutations issued (`update` calls excluded).
    #[must_use]
    pub const fn mutations(&self) -> usize {
        self.created + self.moved + self.removed
    }

    pub(crate) fn absorb(&mut self, other: Self) {
        self.created += other.created;
        self.moved += other.moved;
        self.removed += other.removed;
        self.updated += other.updated;
    }
}

/// Nodes for the next sequence, index-aligned with it, plus stats.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Reconciled<N> {
    pub nodes: Vec<N>,
    pub stats: ReconcileStats,
}

/// Reconcile by item identity (`Eq + Hash` on the item itself).
///
/// # Errors
///
/// See [`reconcile_by_key`].
pub fn reconcile<T, H, C, U>(
    host: &mut H,
    prev: &[T],
    prev_nodes: &[H::Node],
    next: &[T],
    create: C,
    update: U,
) -> Result<Reconciled<H::Node>, ReconcileError>
where
    T: Eq + Hash,
    H: Host,
    C: FnMut(&T) -> H::Node,
    U: FnMut(&H::Node, &T),
{
    reconcile_by_key(host, prev, prev_nodes, next, |item| item, create, update)
}

/// Reconcile with an explicit key function.
///
/// `prev_nodes[i]` must be the node currently rendering `prev[i]`, and the
/// host must hold exactly `prev_nodes` in order.
///
/// # Errors
///
/// [`ReconcileError::DuplicateKey`] if two items of `next` share a key;
/// [`ReconcileError::NodeCountMismatch`] if `prev` and `prev_nodes` differ
/// in length. The host is not touched in either case.
pub fn reconcile_by_key<'a, T, Q, H, K, C, U>(
    host: &mut H,
    prev: &'a [T],
    prev_nodes: &[H::Node],
    next: &'a [T],
    key: K,
    mut create: C,
    mut update: U,
) -> Result<Reconciled<H::Node>, ReconcileError>
where
    Q: Eq + Hash,
    H: Host,
    K: Fn(&'a T) -> Q,
    C: FnMut(&T) -> H::Node,
    U: FnMut(&H::Node, &T),
{
    if prev.len() != prev_nodes.len() {
        return Err(ReconcileError::NodeCountMismatch {
            items: prev.len(),
            nodes: prev_nodes.len(),
        });
    }
    let next_keys: Vec<Q> = next.iter().map(&key).collect();
    let next_index = index_unique(&next_keys)?;
    let prev_keys: Vec<Q> = prev.iter().map(&key).collect();

    let mut stats = ReconcileStats::default();
    let mut placed: Vec<Option<H::Node>> = vec![None; next.len()];

    let (mut a0, mut a1) = (0, prev.len());
    let (mut b0, mut b1) = (0, next.len());

    // Phase 1: ends.
    loop {
        let mut progressed = false;
        while a0 < a1 && b0 < b1 && prev_keys[a0] == next_keys[b0] {
            update(&prev_nodes[a0], &next[b0]);
            placed[b0] = Some(prev_nodes[a0].clone());
            stats.updated += 1;
            a0 += 1;
            b0 += 1;
            progressed = true;
        }
        while a0 < a1 && b0 < b1 && prev_keys[a1 - 1] == next_keys[b1 - 1] {
            update(&prev_nodes[a1 - 1], &next[b1 - 1]);
            placed[b1 - 1] = Some(prev_nodes[a1 - 1].clone());
            stats.updated += 1;
            a1 -= 1;
            b1 -= 1;
            progressed = true;
        }
        if a0 < a1 && b0 < b1 && prev_keys[a0] == next_keys[b1 - 1] {
            let node = &prev_nodes[a0];
            update(node, &next[b1 - 1]);
            host.insert(node, anchor(&placed, b1));
            placed[b1 - 1] = Some(node.clone());
            stats.updated += 1;
            stats.moved += 1;
            a0 += 1;
            b1 -= 1;
            continue;
        }
        if a0 < a1 && b0 < b1 && prev_keys[a1 - 1] == next_keys[b0] {
            let node = &prev_nodes[a1 - 1];
            update(node, &next[b0]);
            host.insert(node, Some(&prev_nodes[a0]));
            placed[b0] = Some(node.clone());
            stats.updated += 1;
            stats.moved += 1;
            a1 -= 1;
            b0 += 1;
            continue;
        }
        if !progressed {
            break;
        }
    }

    // Phase 2: one side exhausted.
    if b0 >= b1 {
        stats.removed += remove_window(host, prev_nodes, a0, a1);
    } else if a0 >= a1 {
        let before = anchor(&placed, b1).cloned();
        for j in b0..b1 {
            let node = create(&next[j]);
            host.insert(&node, before.as_ref());
            placed[j] = Some(node);
            stats.created += 1;
        }
    } else {
        // Phase 3: index map over the window.
        let mut sources: Vec<Option<usize>> = vec![None; b1 - b0];
        let mut removals = Vec::new();
        let mut reused = 0;
        for i in a0..a1 {
            match next_index.get(&prev_keys[i]) {
                Some(&j) if (b0..b1).contains(&j) && sources[j - b0].is_none() => {
                    sources[j - b0] = Some(i);
                    reused += 1;
                }
                _ => removals.push(i),
            }
        }

        if reused == 0 {
            debug!(
                removed = a1 - a0,
                created = b1 - b0,
                "no reusable nodes; replacing window"
            );
            stats.removed += remove_window(host, prev_nodes, a0, a1);
            let before = anchor(&placed, b1).cloned();
            for j in b0..b1 {
                let node = create(&next[j]);
                host.insert(&node, before.as_ref());
                placed[j] = Some(node);
                stats.created += 1;
            }
        } else {
            for &i in &removals {
                host.remove(&prev_nodes[i]);
            }
            stats.removed += removals.len();

            // Phase 4: keep the LIS, move or create the rest back to front.
            let stable = longest_increasing_subsequence(&sources);
            let mut stable_left = stable.len();
            for j in (b0..b1).rev() {
                let node = match sources[j - b0] {
                    Some(i) => {
                        let node = prev_nodes[i].clone();
                        update(&node, &next[j]);
                        stats.updated += 1;
                        if stable_left > 0 && stable[stable_left - 1] == j - b0 {
                            stable_left -= 1;
                        } else {
                            host.insert(&node, anchor(&placed, j + 1));
                            stats.moved += 1;
                        }
                        node
                    }
                    None => {
                        let node = create(&next[j]);
                        host.insert(&node, anchor(&placed, j + 1));
                        stats.created += 1;
                        node
                    }
                };
                placed[j] = Some(node);
            }
        }
    }

    let nodes: Vec<H::Node> = placed.into_iter().flatten().collect();
    debug_assert_eq!(nodes.len(), next.len());
    trace!(
        created = stats.created,
        moved = stats.moved,
        removed = stats.removed,
        updated = stats.updated,
        "reconciled"
    );
    Ok(Reconciled { nodes, stats })
}

/// Map every key to its index, rejecting the first repeat.
pub(crate) fn index_unique<Q: Eq + Hash>(keys: &[Q]) -> Result<AHashMap<&Q, usize>, ReconcileError> {
    let mut index = AHashMap::with_capacity(keys.len());
    for (i, k) in keys.iter().enumerate() {
        if index.insert(k, i).is_some() {
            return Err(ReconcileError::DuplicateKey { index: i });
        }
    }
    Ok(index)
}

/// Remove old nodes `[a0, a1)`, clearing the host when that is all of them.
fn remove_window<H: Host>(host: &mut H, prev_nodes: &[H::Node], a0: usize, a1: usize) -> usize {
    if a0 >= a1 {
        return 0;
    }
    if a0 == 0 && a1 == prev_nodes.len() {
        host.clear(prev_nodes);
    } else {
        for node in &prev_nodes[a0..a1] {
            host.remove(node);
        }
    }
    a1 - a0
}

/// Node currently placed at new index `at`, if any.
fn anchor<N>(placed: &[Option<N>], at: usize) -> Option<&N> {
    placed.get(at).and_then(Option::as_ref)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::host::{HostOp, VecHost};
    use std::cell::RefCell;

    /// Render `items` from scratch; nodes are `"<item>#<serial>"`.
    fn mount(host: &mut VecHost<String>, items: &[&'static str]) -> Vec<String> {
        reconcile(host, &[], &[], items, |s| format!("{s}#0"), |_, _| {})
            .expect("mount")
            .nodes
    }

    struct Run {
        stats: ReconcileStats,
        nodes: Vec<String>,
        created: Vec<&'static str>,
        updated: Vec<(String, &'static str)>,
    }

    fn run(
        host: &mut VecHost<String>,
        prev: &[&'static str],
        prev_nodes: &[String],
        next: &[&'static str],
    ) -> Run {
        let created = RefCell::new(Vec::new());
        let updated = RefCell::new(Vec::new());
        let out = reconcile(
            host,
            prev,
            prev_nodes,
            next,
            |s| {
                created.borrow_mut().push(*s);
                format!("{s}#1")
            },
            |n, s| updated.borrow_mut().push((n.clone(), *s)),
        )
        .expect("reconcile");
        Run {
            stats: out.stats,
            nodes: out.nodes,
            created: created.into_inner(),
            updated: updated.into_inner(),
        }
    }

    fn labels(host: &VecHost<String>) -> Vec<String> {
        host.children()
            .iter()
            .map(|n| n.split('#').next().unwrap_or_default().to_owned())
            .collect()
    }

    #[test]
    fn rotate_last_to_front_is_one_move() {
        let mut host = VecHost::new();
        let prev = ["A", "B", "C", "D"];
        let nodes = mount(&mut host, &prev);
        host.take_log();

        let out = run(&mut host, &prev, &nodes, &["D", "A", "B", "C"]);
        assert_eq!(out.stats.moved, 1);
        assert_eq!(out.stats.created, 0);
        assert_eq!(out.stats.removed, 0);
        assert_eq!(labels(&host), ["D", "A", "B", "C"]);
        assert_eq!(host.log(), &[HostOp::Move("D#0".to_owned())]);
    }

    #[test]
    fn clearing_removes_without_callbacks() {
        let mut host = VecHost::new();
        let prev = ["A", "B", "C"];
        let nodes = mount(&mut host, &prev);
        let out = run(&mut host, &prev, &nodes, &[]);
        assert_eq!(out.stats.removed, 3);
        assert!(out.created.is_empty());
        assert!(out.updated.is_empty());
        assert!(host.children().is_empty());
    }

    #[test]
    fn mounting_creates_in_order() {
        let mut host = VecHost::new();
        let out = run(&mut host, &[], &[], &["X", "Y"]);
        assert_eq!(out.created, vec!["X", "Y"]);
        assert!(out.updated.is_empty());
        assert_eq!(host.children(), &["X#1".to_owned(), "Y#1".to_owned()]);
        assert_eq!(out.nodes, host.children());
    }

    #[test]
    fn append_and_prepend_create_without_moves() {
        let mut host = VecHost::new();
        let prev = ["B", "C"];
        let nodes = mount(&mut host, &prev);
        let out = run(&mut host, &prev, &nodes, &["A", "B", "C", "D"]);
        assert_eq!(out.stats.created, 2);
        assert_eq!(out.stats.moved, 0);
        assert_eq!(out.stats.updated, 2);
        assert_eq!(labels(&host), ["A", "B", "C", "D"]);
    }

    #[test]
    fn reversal_reuses_every_node() {
        let mut host = VecHost::new();
        let prev = ["A", "B", "C", "D", "E"];
        let nodes = mount(&mut host, &prev);
        let out = run(&mut host, &prev, &nodes, &["E", "D", "C", "B", "A"]);
        assert_eq!(out.stats.created, 0);
        assert_eq!(out.stats.removed, 0);
        assert_eq!(out.stats.updated, 5);
        assert_eq!(labels(&host), ["E", "D", "C", "B", "A"]);
    }

    #[test]
    fn shuffle_moves_only_outside_lis() {
        let mut host = VecHost::new();
        let prev = ["A", "B", "C", "D", "E", "F"];
        let nodes = mount(&mut host, &prev);
        // Middle window B..E becomes [D, B, X, C]; E removed, X created.
        let out = run(&mut host, &prev, &nodes, &["A", "D", "B", "X", "C", "F"]);
        assert_eq!(labels(&host), ["A", "D", "B", "X", "C", "F"]);
        assert_eq!(out.stats.created, 1);
        assert_eq!(out.stats.removed, 1);
        assert_eq!(out.stats.moved, 1, "B, C stay; D moves");
        assert_eq!(out.stats.updated, 5);
        assert_eq!(out.nodes, host.children());
    }

    #[test]
    fn end_swap_is_taken_greedily() {
        let mut host = VecHost::new();
        let prev = ["A", "B"];
        let nodes = mount(&mut host, &prev);
        let out = run(&mut host, &prev, &nodes, &["X", "A"]);
        assert_eq!(labels(&host), ["X", "A"]);
        assert_eq!(out.stats.moved, 1, "A moved across by the end check");
        assert_eq!(out.stats.created, 1);
        assert_eq!(out.stats.removed, 1);
    }

    #[test]
    fn disjoint_sets_replace_wholesale() {
        let mut host = VecHost::new();
        let prev = ["A", "B"];
        let nodes = mount(&mut host, &prev);
        host.take_log();
        let out = run(&mut host, &prev, &nodes, &["X", "Y", "Z"]);
        assert_eq!(out.stats.removed, 2);
        assert_eq!(out.stats.created, 3);
        assert!(out.updated.is_empty());
        assert_eq!(host.log().first(), Some(&HostOp::Clear));
        assert_eq!(labels(&host), ["X", "Y", "Z"]);
    }

    #[test]
    fn every_reused_node_is_updated_once() {
        let mut host = VecHost::new();
        let prev = ["A", "B", "C"];
        let nodes = mount(&mut host, &prev);
        let out = run(&mut host, &prev, &nodes, &["C", "A", "B"]);
        let mut updated: Vec<_> = out.updated.iter().map(|(_, s)| *s).collect();
        updated.sort_unstable();
        assert_eq!(updated, vec!["A", "B", "C"]);
    }

    #[test]
    fn duplicate_keys_leave_host_untouched() {
        let mut host = VecHost::new();
        let prev = ["A", "B"];
        let nodes = mount(&mut host, &prev);
        host.take_log();
        let err = reconcile(&mut host, &prev, &nodes, &["A", "C", "A"], |s| (*s).to_owned(), |_, _| {})
            .expect_err("duplicates");
        assert_eq!(err, ReconcileError::DuplicateKey { index: 2 });
        assert!(host.log().is_empty());
    }

    #[test]
    fn mismatched_node_count_is_rejected() {
        let mut host: VecHost<String> = VecHost::new();
        let err = reconcile(&mut host, &["A"], &[], &["A"], |s| (*s).to_owned(), |_, _| {})
            .expect_err("mismatch");
        assert_eq!(err, ReconcileError::NodeCountMismatch { items: 1, nodes: 0 });
    }

    #[test]
    fn explicit_key_function() {
        #[derive(Debug)]
        struct Row {
            id: u32,
            label: &'static str,
        }
        let prev = [Row { id: 1, label: "one" }, Row { id: 2, label: "two" }];
        let next = [Row { id: 2, label: "TWO" }, Row { id: 1, label: "one" }];
        let mut host = VecHost::new();
        let nodes = reconcile_by_key(&mut host, &[], &[], &prev, |r| r.id, |r| r.id, |_, _| {})
            .expect("mount")
            .nodes;
        let labels = RefCell::new(Vec::new());
        let out = reconcile_by_key(
            &mut host,
            &prev,
            &nodes,
            &next,
            |r| r.id,
            |r| r.id,
            |_, r| labels.borrow_mut().push(r.label),
        )
        .expect("reconcile");
        assert_eq!(host.children(), &[2, 1]);
        assert_eq!(out.stats.moved, 1);
        assert!(labels.borrow().contains(&"TWO"));
    }
}
