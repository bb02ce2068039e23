//! Front matter value model.

use indexmap::IndexMap;
use serde::Serialize;

/// Iterator bindings recorded by value expansion: variable name to the
/// scalar element that produced an evaluated value.
pub type Iterators = IndexMap<String, Value>;

/// One concrete outcome of expanding a front matter field.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ExpandedValue {
    /// The fully substituted text
    pub evaluated: String,

    /// Which variable was bound to which element to produce `evaluated`
    pub iterators: Iterators,
}

impl ExpandedValue {
    /// An expanded value that did not iterate over anything.
    pub fn literal(evaluated: impl Into<String>) -> Self {
        Self {
            evaluated: evaluated.into(),
            iterators: Iterators::new(),
        }
    }
}

/// A front matter value.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum Value {
    Null,
    Bool(bool),
    Integer(i64),
    Float(f64),
    String(String),
    List(Vec<Value>),
    Block(FrontMatter),
    /// Result of expanding an expandable field
    Expanded(Vec<ExpandedValue>),
}

impl Value {
    /// The text substituted for a `%variable` token referencing this value.
    ///
    /// Booleans and containers have no interpolated form.
    pub fn interpolated(&self) -> Option<String> {
        match self {
            Value::Null => Some(String::new()),
            Value::Integer(i) => Some(i.to_string()),
            Value::Float(f) => Some(f.to_string()),
            Value::String(s) => Some(s.clone()),
            _ => None,
        }
    }

    /// Get as string slice if this is a string value.
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::String(s) => Some(s),
            _ => None,
        }
    }

    /// Get as nested block if this is a block value.
    pub fn as_block(&self) -> Option<&FrontMatter> {
        match self {
            Value::Block(block) => Some(block),
            _ => None,
        }
    }

    /// Get the expansion results if this field has been expanded.
    pub fn as_expanded(&self) -> Option<&[ExpandedValue]> {
        match self {
            Value::Expanded(values) => Some(values),
            _ => None,
        }
    }

    /// Short type name used in diagnostics.
    pub fn type_name(&self) -> &'static str {
        match self {
            Value::Null => "null",
            Value::Bool(_) => "boolean",
            Value::Integer(_) => "integer",
            Value::Float(_) => "float",
            Value::String(_) => "string",
            Value::List(_) => "array",
            Value::Block(_) => "map",
            Value::Expanded(_) => "expanded value",
        }
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Value::String(s.to_string())
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Value::String(s)
    }
}

impl From<i64> for Value {
    fn from(i: i64) -> Self {
        Value::Integer(i)
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Value::Bool(b)
    }
}

impl<T: Into<Value>> From<Vec<T>> for Value {
    fn from(items: Vec<T>) -> Self {
        Value::List(items.into_iter().map(Into::into).collect())
    }
}

impl From<FrontMatter> for Value {
    fn from(block: FrontMatter) -> Self {
        Value::Block(block)
    }
}

impl From<serde_yaml::Value> for Value {
    fn from(value: serde_yaml::Value) -> Self {
        match value {
            serde_yaml::Value::Null => Value::Null,
            serde_yaml::Value::Bool(b) => Value::Bool(b),
            serde_yaml::Value::Number(n) => {
                if let Some(i) = n.as_i64() {
                    Value::Integer(i)
                } else {
                    Value::Float(n.as_f64().unwrap_or_default())
                }
            }
            serde_yaml::Value::String(s) => Value::String(s),
            serde_yaml::Value::Sequence(items) => {
                Value::List(items.into_iter().map(Value::from).collect())
            }
            serde_yaml::Value::Mapping(mapping) => Value::Block(FrontMatter::from_mapping(mapping)),
            serde_yaml::Value::Tagged(tagged) => Value::from(tagged.value),
        }
    }
}

/// An ordered front matter block.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(transparent)]
pub struct FrontMatter {
    entries: IndexMap<String, Value>,
}

impl FrontMatter {
    /// Create an empty block.
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a block from a parsed YAML mapping.
    ///
    /// Scalar keys are stringified; keys that are themselves containers are skipped.
    pub fn from_mapping(mapping: serde_yaml::Mapping) -> Self {
        let mut block = Self::new();
        for (key, value) in mapping {
            let key = match key {
                serde_yaml::Value::String(s) => s,
                serde_yaml::Value::Number(n) => n.to_string(),
                serde_yaml::Value::Bool(b) => b.to_string(),
                other => {
                    tracing::debug!("Skipping non-scalar front matter key: {:?}", other);
                    continue;
                }
            };
            block.insert(key, Value::from(value));
        }
        block
    }

    /// Look up a key in this block only.
    pub fn get(&self, key: &str) -> Option<&Value> {
        self.entries.get(key)
    }

    /// Look up a string value.
    pub fn get_str(&self, key: &str) -> Option<&str> {
        self.get(key).and_then(Value::as_str)
    }

    /// Whether the key is present in this block.
    pub fn contains_key(&self, key: &str) -> bool {
        self.entries.contains_key(key)
    }

    /// Insert or replace a value, keeping the original position on replace.
    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<Value>) -> Option<Value> {
        self.entries.insert(key.into(), value.into())
    }

    /// Insert a value only if the key is absent.
    pub fn insert_if_absent(&mut self, key: impl Into<String>, value: impl Into<Value>) {
        self.entries.entry(key.into()).or_insert_with(|| value.into());
    }

    /// Remove a key, preserving the order of the remaining entries.
    pub fn remove(&mut self, key: &str) -> Option<Value> {
        self.entries.shift_remove(key)
    }

    /// Iterate over entries in declaration order.
    pub fn iter(&self) -> impl Iterator<Item = (&String, &Value)> {
        self.entries.iter()
    }

    /// Iterate over keys in declaration order.
    pub fn keys(&self) -> impl Iterator<Item = &String> {
        self.entries.keys()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Overlay `other` on top of this block; keys in `other` win.
    pub fn merged_with(&self, other: &FrontMatter) -> FrontMatter {
        let mut merged = self.clone();
        for (key, value) in other.iter() {
            merged.insert(key.clone(), value.clone());
        }
        merged
    }
}

impl FromIterator<(String, Value)> for FrontMatter {
    fn from_iter<I: IntoIterator<Item = (String, Value)>>(iter: I) -> Self {
        Self {
            entries: iter.into_iter().collect(),
        }
    }
}

impl<'a> IntoIterator for &'a FrontMatter {
    type Item = (&'a String, &'a Value);
    type IntoIter = indexmap::map::Iter<'a, String, Value>;

    fn into_iter(self) -> Self::IntoIter {
        self.entries.iter()
    }
}
