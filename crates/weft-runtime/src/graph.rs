//! Dependency installer and per-instance dependency graph.
//!
//! Installation runs each derivation once against a recording [`Scope`] over
//! a table of declared names, then orders the computed properties
//! depth-first so every property follows its dependencies. A dependency that
//! reappears on the active visit stack is a cycle; the error carries the full
//! path. O(V+E).

use std::cell::RefCell;
use std::collections::BTreeMap;
use std::rc::Rc;

use ahash::{AHashMap, AHashSet};
use tracing::trace;
use weft_core::Value;

use crate::computed::{ComputedProperty, DeriveError, Derivation, Lookup, Scope};
use crate::error::{ReactiveError, Result};

thread_local! {
    static INSTALLING: RefCell<Option<String>> = const { RefCell::new(None) };
}

/// Name of the computed property whose derivation is currently being
/// dry-run, if any.
#[must_use]
pub fn installing() -> Option<String> {
    INSTALLING.with(|slot| slot.borrow().clone())
}

/// Marks `name` as installing until dropped; restores the previous marker
/// on drop, including during unwinding.
struct InstallGuard {
    previous: Option<String>,
}

impl InstallGuard {
    fn enter(name: &str) -> Self {
        let previous = INSTALLING.with(|slot| slot.borrow_mut().replace(name.to_owned()));
        Self { previous }
    }
}

impl Drop for InstallGuard {
    fn drop(&mut self) {
        let previous = self.previous.take();
        INSTALLING.with(|slot| *slot.borrow_mut() = previous);
    }
}

struct Table<'a>(&'a BTreeMap<String, Value>);

impl Lookup for Table<'_> {
    fn lookup(&self, key: &str) -> Option<Value> {
        self.0.get(key).cloned()
    }
}

/// Result of installing a blueprint's computed properties.
#[derive(Debug, Default)]
pub(crate) struct Installation {
    /// Computed names, dependencies first.
    pub(crate) order: Vec<String>,
    /// Computed name → names it reads.
    pub(crate) deps: AHashMap<String, Vec<String>>,
    /// Name → computed names reading it directly.
    pub(crate) dependents: AHashMap<String, Vec<String>>,
}

#[derive(Clone, Copy, PartialEq, Eq)]
enum Mark {
    Active,
    Done,
}

/// Discover dependencies and produce an acyclic install order.
///
/// `table` holds every readable name with a representative value; computed
/// names must be present (any value, typically `Null`).
pub(crate) fn install(
    table: &BTreeMap<String, Value>,
    computed: &[(String, Derivation)],
) -> Result<Installation> {
    let lookup = Table(table);
    let mut deps: AHashMap<String, Vec<String>> = AHashMap::with_capacity(computed.len());

    for (name, derive) in computed {
        let reads = RefCell::new(Vec::new());
        {
            let _guard = InstallGuard::enter(name);
            let scope = Scope::recording(&lookup, &reads);
            if let Err(DeriveError::UnknownKey(key)) = derive(&scope, None) {
                return Err(ReactiveError::UnknownDependency {
                    computed: name.clone(),
                    key,
                });
            }
        }
        let mut seen = AHashSet::new();
        let mut names = Vec::new();
        for key in reads.into_inner() {
            if !table.contains_key(&key) {
                return Err(ReactiveError::UnknownDependency {
                    computed: name.clone(),
                    key,
                });
            }
            if seen.insert(key.clone()) {
                names.push(key);
            }
        }
        trace!(computed = %name, deps = ?names, "dependencies discovered");
        deps.insert(name.clone(), names);
    }

    let mut marks: AHashMap<&str, Mark> = AHashMap::with_capacity(computed.len());
    let mut stack: Vec<&str> = Vec::new();
    let mut order = Vec::with_capacity(computed.len());
    for (name, _) in computed {
        visit(name, &deps, &mut marks, &mut stack, &mut order)?;
    }

    let mut dependents: AHashMap<String, Vec<String>> = AHashMap::new();
    for name in &order {
        for dep in deps.get(name).into_iter().flatten() {
            dependents.entry(dep.clone()).or_default().push(name.clone());
        }
    }

    Ok(Installation {
        order,
        deps,
        dependents,
    })
}

fn visit<'a>(
    name: &'a str,
    deps: &'a AHashMap<String, Vec<String>>,
    marks: &mut AHashMap<&'a str, Mark>,
    stack: &mut Vec<&'a str>,
    order: &mut Vec<String>,
) -> Result<()> {
    match marks.get(name) {
        Some(Mark::Done) => return Ok(()),
        Some(Mark::Active) => {
            let start = stack.iter().position(|n| *n == name).unwrap_or(0);
            let mut path: Vec<String> = stack[start..].iter().map(|n| (*n).to_owned()).collect();
            path.push(name.to_owned());
            return Err(ReactiveError::CircularDependency { path });
        }
        None => {}
    }
    // Plain data: nothing to order.
    let Some(reads) = deps.get(name) else {
        return Ok(());
    };
    marks.insert(name, Mark::Active);
    stack.push(name);
    for dep in reads {
        visit(dep, deps, marks, stack, order)?;
    }
    stack.pop();
    marks.insert(name, Mark::Done);
    order.push(name.to_owned());
    Ok(())
}

// ─── Per-instance graph ─────────────────────────────────────────────────

/// Reverse adjacency from a property name to the computed properties of one
/// container instance that read it.
#[derive(Debug, Default)]
pub struct DependencyGraph {
    edges: AHashMap<String, Vec<Rc<ComputedProperty>>>,
}

impl DependencyGraph {
    pub(crate) fn build(
        dependents: &AHashMap<String, Vec<String>>,
        computed: &AHashMap<String, Rc<ComputedProperty>>,
    ) -> Self {
        let edges = dependents
            .iter()
            .map(|(key, names)| {
                let list = names
                    .iter()
                    .filter_map(|n| computed.get(n).cloned())
                    .collect();
                (key.clone(), list)
            })
            .collect();
        Self { edges }
    }

    /// Computed properties reading `key` directly.
    #[must_use]
    pub fn dependents(&self, key: &str) -> &[Rc<ComputedProperty>] {
        self.edges.get(key).map(Vec::as_slice).unwrap_or(&[])
    }

    /// Every computed property reading `key` directly or transitively.
    #[must_use]
    pub fn closure(&self, key: &str) -> Vec<Rc<ComputedProperty>> {
        let mut seen: AHashSet<&str> = AHashSet::new();
        let mut out = Vec::new();
        let mut frontier = vec![key];
        while let Some(next) = frontier.pop() {
            for dependent in self.dependents(next) {
                if seen.insert(dependent.name()) {
                    frontier.push(dependent.name());
                    out.push(Rc::clone(dependent));
                }
            }
        }
        out
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.edges.is_empty()
    }
}
