//! Immutable container descriptions.
//!
//! A [`Blueprint`] is built once per declared shape and instantiated many
//! times with [`Object::new`](crate::Object::new). Building installs the
//! computed properties, so cycles and undeclared reads fail here rather than
//! on first use.

use std::collections::BTreeMap;
use std::fmt;
use std::rc::Rc;

use ahash::AHashMap;
use weft_core::{Value, is_private};

use crate::binding::Binding;
use crate::computed::{ComputedDef, DeriveError, Derivation, Scope};
use crate::error::{ReactiveError, Result};
use crate::graph;

/// Declared kind of a non-computed property.
#[derive(Clone)]
pub enum Field {
    /// Plain data with its initial value.
    Data(Value),
    /// Nested object container.
    Object(Blueprint),
    /// Nested array container with its initial items.
    Array(Vec<Value>),
    /// Property forwarded to another container through a binding.
    Bound(Binding),
}

impl fmt::Debug for Field {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Data(value) => write!(f, "Data({value})"),
            Self::Object(bp) => f.debug_tuple("Object").field(bp).finish(),
            Self::Array(items) => f.debug_tuple("Array").field(&items.len()).finish(),
            Self::Bound(binding) => f.debug_tuple("Bound").field(&binding.key()).finish(),
        }
    }
}

struct BlueprintInner {
    fields: BTreeMap<String, Field>,
    computed: BTreeMap<String, Rc<ComputedDef>>,
    order: Vec<String>,
    dependents: AHashMap<String, Vec<String>>,
}

/// Shared, immutable description of a container's shape.
///
/// Cloning is cheap: clones share the same description.
#[derive(Clone)]
pub struct Blueprint {
    inner: Rc<BlueprintInner>,
}

impl Blueprint {
    #[must_use]
    pub fn builder() -> BlueprintBuilder {
        BlueprintBuilder::default()
    }

    /// Blueprint whose plain-data fields are the entries of `map`.
    ///
    /// # Errors
    ///
    /// Never fails for a mapping; a non-mapping yields an empty blueprint.
    pub fn from_value(map: &Value) -> Result<Self> {
        let mut builder = Self::builder();
        for (key, value) in map.as_map().into_iter().flatten() {
            builder = builder.data(key, value.clone());
        }
        builder.build()
    }

    pub(crate) fn fields(&self) -> &BTreeMap<String, Field> {
        &self.inner.fields
    }

    pub(crate) fn computed_defs(&self) -> &BTreeMap<String, Rc<ComputedDef>> {
        &self.inner.computed
    }

    /// Computed property names, each after its dependencies.
    #[must_use]
    pub fn install_order(&self) -> &[String] {
        &self.inner.order
    }

    /// Computed properties reading `key` directly.
    #[must_use]
    pub fn dependents(&self, key: &str) -> &[String] {
        self.inner
            .dependents
            .get(key)
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    pub(crate) fn dependents_map(&self) -> &AHashMap<String, Vec<String>> {
        &self.inner.dependents
    }

    #[must_use]
    pub fn is_computed(&self, key: &str) -> bool {
        self.inner.computed.contains_key(key)
    }

    #[must_use]
    pub fn contains(&self, key: &str) -> bool {
        self.inner.fields.contains_key(key) || self.is_computed(key)
    }

    /// Every declared name, plain fields first.
    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.inner
            .fields
            .keys()
            .chain(self.inner.computed.keys())
            .map(String::as_str)
    }

    /// Initial writable values: public plain data and nested containers,
    /// without computed or bound properties.
    #[must_use]
    pub fn defaults(&self) -> Value {
        let map = self
            .inner
            .fields
            .iter()
            .filter(|(key, _)| !is_private(key))
            .filter_map(|(key, field)| {
                let value = match field {
                    Field::Data(value) => value.clone(),
                    Field::Object(bp) => bp.defaults(),
                    Field::Array(items) => Value::List(items.clone()),
                    Field::Bound(_) => return None,
                };
                Some((key.clone(), value))
            })
            .collect();
        Value::Map(map)
    }

    /// Representative value of every readable name, used for the install
    /// dry run. Computed names read as `Null`.
    fn install_table(
        fields: &BTreeMap<String, Field>,
        computed: &[(String, Derivation)],
    ) -> BTreeMap<String, Value> {
        let mut table: BTreeMap<String, Value> = fields
            .iter()
            .map(|(key, field)| {
                let value = match field {
                    Field::Data(value) => value.clone(),
                    Field::Object(bp) => bp.defaults(),
                    Field::Array(items) => Value::List(items.clone()),
                    Field::Bound(binding) => binding.read().unwrap_or_default(),
                };
                (key.clone(), value)
            })
            .collect();
        for (name, _) in computed {
            table.insert(name.clone(), Value::Null);
        }
        table
    }
}

impl fmt::Debug for Blueprint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Blueprint")
            .field("fields", &self.inner.fields.keys().collect::<Vec<_>>())
            .field("computed", &self.inner.order)
            .finish()
    }
}

/// Builder for [`Blueprint`].
#[derive(Default)]
pub struct BlueprintBuilder {
    fields: Vec<(String, Field)>,
    computed: Vec<(String, Derivation)>,
}

impl BlueprintBuilder {
    #[must_use]
    pub fn data(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.fields.push((key.into(), Field::Data(value.into())));
        self
    }

    #[must_use]
    pub fn object(mut self, key: impl Into<String>, blueprint: Blueprint) -> Self {
        self.fields.push((key.into(), Field::Object(blueprint)));
        self
    }

    #[must_use]
    pub fn array<V: Into<Value>>(
        mut self,
        key: impl Into<String>,
        items: impl IntoIterator<Item = V>,
    ) -> Self {
        let items = items.into_iter().map(Into::into).collect();
        self.fields.push((key.into(), Field::Array(items)));
        self
    }

    /// Declare a property forwarded through `binding`.
    #[must_use]
    pub fn bound(mut self, key: impl Into<String>, binding: &Binding) -> Self {
        self.fields.push((key.into(), Field::Bound(binding.clone())));
        self
    }

    /// Declare a computed property.
    #[must_use]
    pub fn computed<F>(mut self, key: impl Into<String>, derive: F) -> Self
    where
        F: Fn(&Scope<'_>, Option<&Value>) -> std::result::Result<Value, DeriveError> + 'static,
    {
        self.computed.push((key.into(), Rc::new(derive)));
        self
    }

    /// Validate names and install computed properties.
    ///
    /// # Errors
    ///
    /// [`ReactiveError::DuplicateKey`], [`ReactiveError::UnknownDependency`],
    /// or [`ReactiveError::CircularDependency`].
    pub fn build(self) -> Result<Blueprint> {
        let mut fields = BTreeMap::new();
        for (key, field) in self.fields {
            if fields.insert(key.clone(), field).is_some() {
                return Err(ReactiveError::DuplicateKey { key });
            }
        }
        let mut seen = ahash::AHashSet::new();
        for (key, _) in &self.computed {
            if fields.contains_key(key) || !seen.insert(key.as_str()) {
                return Err(ReactiveError::DuplicateKey { key: key.clone() });
            }
        }

        let table = Blueprint::install_table(&fields, &self.computed);
        let installation = graph::install(&table, &self.computed)?;
        let mut deps = installation.deps;
        let computed = self
            .computed
            .into_iter()
            .map(|(name, derive)| {
                let def = ComputedDef {
                    deps: deps.remove(&name).unwrap_or_default(),
                    name: name.clone(),
                    derive,
                };
                (name, Rc::new(def))
            })
            .collect();

        Ok(Blueprint {
            inner: Rc::new(BlueprintInner {
                fields,
                computed,
                order: installation.order,
                dependents: installation.dependents,
            }),
        })
    }
}
