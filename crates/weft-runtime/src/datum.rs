//! Slot contents of reactive containers and the child-to-parent back-link.

use std::cell::RefCell;
use std::fmt;
use std::hash::{Hash, Hasher};
use std::rc::{Rc, Weak};

use weft_core::Value;

use crate::array::{Array, ArrayState};
use crate::object::{Object, ObjectState};

/// Which keys an export includes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Projection {
    /// Every key, private and computed included.
    All,
    /// Non-private keys, computed and bound included. Payload of wildcard
    /// observers.
    Public,
    /// Non-private plain data only: what `snapshot()` persists.
    Writable,
}

/// A value held by a container slot or an array item: plain data, or a
/// nested reactive container.
///
/// Equality is identity: plain values compare by value, containers by
/// pointer. This is the identity the array mutators and the reconciler use.
#[derive(Clone)]
pub enum Datum {
    Value(Value),
    Object(Object),
    Array(Array),
}

impl Datum {
    /// Export as a plain value. Nested containers are projected recursively.
    #[must_use]
    pub fn export(&self, writable_only: bool) -> Value {
        self.project(if writable_only {
            Projection::Writable
        } else {
            Projection::All
        })
    }

    pub(crate) fn project(&self, projection: Projection) -> Value {
        match self {
            Self::Value(value) => value.clone(),
            Self::Object(object) => object.project(projection),
            Self::Array(array) => array.project(projection),
        }
    }

    #[must_use]
    pub fn as_value(&self) -> Option<&Value> {
        match self {
            Self::Value(value) => Some(value),
            _ => None,
        }
    }

    #[must_use]
    pub fn as_object(&self) -> Option<&Object> {
        match self {
            Self::Object(object) => Some(object),
            _ => None,
        }
    }

    #[must_use]
    pub fn as_array(&self) -> Option<&Array> {
        match self {
            Self::Array(array) => Some(array),
            _ => None,
        }
    }

    #[must_use]
    pub fn is_container(&self) -> bool {
        !matches!(self, Self::Value(_))
    }

    pub(crate) fn parent(&self) -> Option<ParentLink> {
        match self {
            Self::Value(_) => None,
            Self::Object(object) => object.parent(),
            Self::Array(array) => array.parent(),
        }
    }

    pub(crate) fn set_parent(&self, link: Option<ParentLink>) {
        match self {
            Self::Value(_) => {}
            Self::Object(object) => object.set_parent(link),
            Self::Array(array) => array.set_parent(link),
        }
    }

    pub(crate) fn dispose(&self) {
        match self {
            Self::Value(_) => {}
            Self::Object(object) => object.dispose(),
            Self::Array(array) => array.dispose(),
        }
    }

    /// Whether placing `self` under `host` would make a container its own
    /// ancestor.
    pub(crate) fn would_cycle(&self, host: &Datum) -> bool {
        if !self.is_container() {
            return false;
        }
        let mut cursor = Some(host.clone());
        while let Some(node) = cursor {
            if node == *self {
                return true;
            }
            cursor = node.parent().and_then(|link| link.node.upgrade());
        }
        false
    }
}

impl PartialEq for Datum {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Self::Value(a), Self::Value(b)) => a == b,
            (Self::Object(a), Self::Object(b)) => a.ptr_eq(b),
            (Self::Array(a), Self::Array(b)) => a.ptr_eq(b),
            _ => false,
        }
    }
}

impl Eq for Datum {}

impl Hash for Datum {
    fn hash<H: Hasher>(&self, state: &mut H) {
        std::mem::discriminant(self).hash(state);
        match self {
            Self::Value(value) => value.hash(state),
            Self::Object(object) => object.addr().hash(state),
            Self::Array(array) => array.addr().hash(state),
        }
    }
}

impl fmt::Debug for Datum {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Value(value) => write!(f, "Value({value})"),
            Self::Object(object) => fmt::Debug::fmt(object, f),
            Self::Array(array) => fmt::Debug::fmt(array, f),
        }
    }
}

impl From<Value> for Datum {
    fn from(value: Value) -> Self {
        Self::Value(value)
    }
}

impl From<Object> for Datum {
    fn from(object: Object) -> Self {
        Self::Object(object)
    }
}

impl From<Array> for Datum {
    fn from(array: Array) -> Self {
        Self::Array(array)
    }
}

macro_rules! datum_from_primitive {
    ($($ty:ty),*) => {
        $(impl From<$ty> for Datum {
            fn from(value: $ty) -> Self {
                Self::Value(Value::from(value))
            }
        })*
    };
}

datum_from_primitive!(bool, f64, i32, i64, u32, usize, &str, String);

// ─── Parent link ────────────────────────────────────────────────────────

#[derive(Clone)]
pub(crate) enum WeakNode {
    Object(Weak<RefCell<ObjectState>>),
    Array(Weak<RefCell<ArrayState>>),
}

impl WeakNode {
    pub(crate) fn upgrade(&self) -> Option<Datum> {
        match self {
            Self::Object(weak) => weak.upgrade().map(|rc| Datum::Object(Object::from_inner(rc))),
            Self::Array(weak) => weak.upgrade().map(|rc| Datum::Array(Array::from_inner(rc))),
        }
    }
}

/// Non-owning back-reference from a nested container to the slot holding it.
#[derive(Clone)]
pub(crate) struct ParentLink {
    pub(crate) node: WeakNode,
    /// Slot name in an object parent; unused for array parents.
    pub(crate) key: String,
}

impl ParentLink {
    pub(crate) fn object(parent: &Rc<RefCell<ObjectState>>, key: &str) -> Self {
        Self {
            node: WeakNode::Object(Rc::downgrade(parent)),
            key: key.to_owned(),
        }
    }

    pub(crate) fn array(parent: &Rc<RefCell<ArrayState>>) -> Self {
        Self {
            node: WeakNode::Array(Rc::downgrade(parent)),
            key: String::new(),
        }
    }

    /// Whether this link points at `node`.
    pub(crate) fn is(&self, node: &Datum) -> bool {
        self.node.upgrade().is_some_and(|parent| parent == *node)
    }

    /// Propagate a child change to the parent. Must be called with no
    /// container borrow held.
    pub(crate) fn bubble(&self) {
        match self.node.upgrade() {
            Some(Datum::Object(parent)) => parent.resolve(&self.key),
            Some(Datum::Array(parent)) => parent.child_changed(),
            Some(Datum::Value(_)) | None => {}
        }
    }
}

impl fmt::Debug for ParentLink {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let kind = match self.node {
            WeakNode::Object(_) => "object",
            WeakNode::Array(_) => "array",
        };
        f.debug_struct("ParentLink")
            .field("node", &kind)
            .field("key", &self.key)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::blueprint::Blueprint;

    #[test]
    fn values_compare_by_value() {
        assert_eq!(Datum::from(1), Datum::from(1));
        assert_ne!(Datum::from(1), Datum::from("1"));
    }

    #[test]
    fn containers_compare_by_identity() {
        let bp = Blueprint::builder().data("a", 1).build().expect("blueprint");
        let a = Object::new(&bp).expect("object");
        let b = Object::new(&bp).expect("object");
        assert_eq!(Datum::from(a.clone()), Datum::from(a.clone()));
        assert_ne!(Datum::from(a), Datum::from(b));
        let list = Array::new();
        assert_eq!(Datum::from(list.clone()), Datum::from(list));
    }

    #[test]
    fn export_projects_nested_containers() {
        let list = Array::from_values([Value::from(1), Value::from(2)]);
        assert_eq!(Datum::from(list).export(true), Value::list([1, 2]));
    }
}
