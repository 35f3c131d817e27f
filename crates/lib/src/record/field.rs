//! Typed configuration fields and their version tokens.

use std::{
    any::Any,
    fmt,
    marker::PhantomData,
    sync::{Arc, RwLock},
};

use serde::{Deserialize, Serialize};

use crate::Path;

/// The value type of a registered field.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FieldKind {
    String,
    Int,
    Bool,
}

impl fmt::Display for FieldKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FieldKind::String => write!(f, "string"),
            FieldKind::Int => write!(f, "int"),
            FieldKind::Bool => write!(f, "bool"),
        }
    }
}

/// A resolved value, type-erased so cells of every kind share one map.
pub(crate) type Value = Arc<dyn Any + Send + Sync>;

/// Opaque change-detection token.
///
/// A field's version is the record generation at which its raw stored value
/// was last seen to change. It is only meaningful when compared with another
/// version of the same field.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default)]
pub struct Version(pub(crate) u64);

impl fmt::Display for Version {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "v{}", self.0)
    }
}

/// A type that can be stored in a configuration field.
///
/// Implemented for `String`, `i64` and `bool`.
pub trait FieldValue: Clone + Send + Sync + 'static {
    const KIND: FieldKind;

    /// Parses raw stored content. `None` means the content is malformed.
    fn parse(raw: &str) -> Option<Self>;

    /// The raw string form written to the store.
    fn render(&self) -> String;
}

impl FieldValue for String {
    const KIND: FieldKind = FieldKind::String;

    fn parse(raw: &str) -> Option<Self> {
        Some(raw.to_string())
    }

    fn render(&self) -> String {
        self.clone()
    }
}

impl FieldValue for i64 {
    const KIND: FieldKind = FieldKind::Int;

    fn parse(raw: &str) -> Option<Self> {
        raw.trim().parse().ok()
    }

    fn render(&self) -> String {
        self.to_string()
    }
}

impl FieldValue for bool {
    const KIND: FieldKind = FieldKind::Bool;

    fn parse(raw: &str) -> Option<Self> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "true" | "t" | "1" | "yes" | "on" => Some(true),
            "false" | "f" | "0" | "no" | "off" => Some(false),
            _ => None,
        }
    }

    fn render(&self) -> String {
        self.to_string()
    }
}

/// What a field last resolved to. Value and version change together.
#[derive(Debug, Clone)]
pub(crate) struct Observed {
    /// Raw content found in the store, `None` when no branch held a value
    pub(crate) raw: Option<String>,
    pub(crate) value: Value,
    pub(crate) version: Version,
}

/// Type-erased storage behind a [`Field`].
#[derive(Debug)]
pub(crate) struct FieldCell {
    pub(crate) name: String,
    pub(crate) path: Path,
    pub(crate) kind: FieldKind,
    pub(crate) default: Value,
    parse: fn(&str) -> Option<Value>,
    observed: RwLock<Observed>,
}

impl FieldCell {
    /// Creates a cell whose first observation is `raw` at `version`.
    pub(crate) fn new<T: FieldValue>(
        name: String,
        path: Path,
        default: T,
        raw: Option<String>,
        version: Version,
    ) -> Self {
        let default: Value = Arc::new(default);
        let mut cell = Self {
            name,
            path,
            kind: T::KIND,
            default: default.clone(),
            parse: |raw| T::parse(raw).map(|value| Arc::new(value) as Value),
            observed: RwLock::new(Observed {
                raw: None,
                value: default,
                version,
            }),
        };
        let value = cell.interpret(raw.as_deref());
        *cell.observed.get_mut().unwrap() = Observed {
            raw,
            value,
            version,
        };
        cell
    }

    /// Converts raw content into a value, falling back to the default.
    pub(crate) fn interpret(&self, raw: Option<&str>) -> Value {
        let Some(raw) = raw else {
            return self.default.clone();
        };
        match (self.parse)(raw) {
            Some(value) => value,
            None => {
                tracing::warn!(
                    field = %self.name,
                    kind = %self.kind,
                    raw,
                    "Malformed configuration value, using default"
                );
                self.default.clone()
            }
        }
    }

    pub(crate) fn raw(&self) -> Option<String> {
        self.observed.read().unwrap().raw.clone()
    }

    pub(crate) fn version(&self) -> Version {
        self.observed.read().unwrap().version
    }

    pub(crate) fn publish(&self, observed: Observed) {
        *self.observed.write().unwrap() = observed;
    }
}

/// A typed handle to one registered configuration value.
///
/// `Field` is cheap to clone; all clones observe the same value. Reading
/// never touches the store: values are refreshed by [`Record::wait`] and
/// [`Record::upgrade`].
///
/// [`Record::wait`]: super::Record::wait
/// [`Record::upgrade`]: super::Record::upgrade
pub struct Field<T: FieldValue> {
    cell: Arc<FieldCell>,
    _marker: PhantomData<fn() -> T>,
}

impl<T: FieldValue> Field<T> {
    pub(crate) fn new(cell: Arc<FieldCell>) -> Self {
        Self {
            cell,
            _marker: PhantomData,
        }
    }

    pub fn name(&self) -> &str {
        &self.cell.name
    }

    /// Full store path of this field, base path included.
    pub fn path(&self) -> &Path {
        &self.cell.path
    }

    pub fn default_value(&self) -> T {
        downcast(&self.cell, &self.cell.default)
    }

    /// Returns the current value together with its version token.
    pub fn get(&self) -> (T, Version) {
        let observed = self.cell.observed.read().unwrap();
        (downcast(&self.cell, &observed.value), observed.version)
    }

    /// Returns the current value.
    pub fn value(&self) -> T {
        self.get().0
    }

    pub fn version(&self) -> Version {
        self.cell.version()
    }

    /// Returns whether the value changed since `previous` was handed out.
    pub fn has_changed(&self, previous: Version) -> bool {
        self.cell.version() != previous
    }

    /// Raw stored content, `None` when the default applied because no
    /// branch held a value.
    pub fn raw(&self) -> Option<String> {
        self.cell.raw()
    }
}

// Cells are only ever wrapped in a Field of the kind they were created with.
fn downcast<T: FieldValue>(cell: &FieldCell, value: &Value) -> T {
    match value.downcast_ref::<T>() {
        Some(value) => value.clone(),
        None => unreachable!(
            "field '{}' holds {} but was read as {}",
            cell.name,
            cell.kind,
            T::KIND
        ),
    }
}

impl<T: FieldValue> Clone for Field<T> {
    fn clone(&self) -> Self {
        Self::new(Arc::clone(&self.cell))
    }
}

impl<T: FieldValue + fmt::Debug> fmt::Debug for Field<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let (value, version) = self.get();
        f.debug_struct("Field")
            .field("name", &self.cell.name)
            .field("value", &value)
            .field("version", &version)
            .finish()
    }
}
