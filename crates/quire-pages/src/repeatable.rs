//! Collection and dataset items bound to dynamic pages.

use std::fmt;
use std::path::{Path, PathBuf};

use indexmap::IndexMap;
use serde::Serialize;

use quire_frontmatter::{FrontMatter, Value};
use quire_graph::{path_key, Trackable};

use crate::page_view::PageId;

/// Stable identity of a repeatable item (its normalised source path).
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(transparent)]
pub struct ItemId(String);

impl ItemId {
    pub fn from_source(source: &Path) -> Self {
        Self(path_key(source))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ItemId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// The namespace a dynamic page repeats over.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "lowercase", tag = "kind", content = "name")]
pub enum Namespace {
    Collection(String),
    Dataset(String),
}

impl Namespace {
    /// Read the namespace declared by a page's front matter.
    ///
    /// `collection` takes precedence over `dataset`.
    pub fn from_front_matter(front_matter: &FrontMatter) -> Option<Self> {
        if let Some(name) = front_matter.get_str("collection") {
            return Some(Namespace::Collection(name.to_string()));
        }
        front_matter
            .get_str("dataset")
            .map(|name| Namespace::Dataset(name.to_string()))
    }

    /// The collection or dataset name.
    pub fn name(&self) -> &str {
        match self {
            Namespace::Collection(name) | Namespace::Dataset(name) => name,
        }
    }

    /// Metadata key used in the dependency graph, e.g. `collection.posts`.
    pub fn metadata_key(&self) -> String {
        match self {
            Namespace::Collection(name) => format!("collection.{}", name),
            Namespace::Dataset(name) => format!("dataset.{}", name),
        }
    }
}

impl fmt::Display for Namespace {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Namespace::Collection(name) => write!(f, "collection '{}'", name),
            Namespace::Dataset(name) => write!(f, "dataset '{}'", name),
        }
    }
}

/// A content or data item that a dynamic page renders once per item.
#[derive(Debug, Clone, PartialEq)]
pub struct RepeatableItem {
    id: ItemId,
    name: String,
    source: PathBuf,
    front_matter: FrontMatter,
    body: String,
    namespace: Option<Namespace>,
    owner: Option<PageId>,
}

impl RepeatableItem {
    /// Create an unbound item from its source path (relative to the site root).
    pub fn new(source: impl Into<PathBuf>, front_matter: FrontMatter, body: impl Into<String>) -> Self {
        let source = source.into();
        let name = source
            .file_name()
            .and_then(|f| f.to_str())
            .map(|f| f.split('.').next().unwrap_or(f).to_string())
            .unwrap_or_default();

        Self {
            id: ItemId::from_source(&source),
            name,
            source,
            front_matter,
            body: body.into(),
            namespace: None,
            owner: None,
        }
    }

    pub fn id(&self) -> &ItemId {
        &self.id
    }

    /// Object name: the file name without extensions.
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn source(&self) -> &Path {
        &self.source
    }

    pub fn front_matter(&self) -> &FrontMatter {
        &self.front_matter
    }

    pub fn body(&self) -> &str {
        &self.body
    }

    /// Namespace of the page the item is bound to.
    pub fn namespace(&self) -> Option<&Namespace> {
        self.namespace.as_ref()
    }

    /// Id of the dynamic page owning this item.
    pub fn owner(&self) -> Option<&PageId> {
        self.owner.as_ref()
    }

    /// Whether the item is marked `draft: true`.
    pub fn is_draft(&self) -> bool {
        self.front_matter.get("draft") == Some(&Value::Bool(true))
    }
}

impl Trackable for RepeatableItem {
    fn source_path(&self) -> &Path {
        &self.source
    }

    fn produced_ids(&self) -> Vec<String> {
        vec![self.id.to_string()]
    }
}

/// Capability of a dynamic page: the items it repeats over.
#[derive(Debug, Clone, PartialEq)]
pub struct Repeatable {
    namespace: Namespace,
    /// Raw permalink field, evaluated per item
    permalink_pattern: Option<Value>,
    /// Unevaluated page front matter that item variables are layered on
    scope: FrontMatter,
    items: IndexMap<ItemId, RepeatableItem>,
}

impl Repeatable {
    pub fn new(namespace: Namespace, permalink_pattern: Option<Value>, scope: FrontMatter) -> Self {
        Self {
            namespace,
            permalink_pattern,
            scope,
            items: IndexMap::new(),
        }
    }

    pub fn namespace(&self) -> &Namespace {
        &self.namespace
    }

    /// The collection or dataset name.
    pub fn object_name(&self) -> &str {
        self.namespace.name()
    }

    pub fn permalink_pattern(&self) -> Option<&Value> {
        self.permalink_pattern.as_ref()
    }

    /// Front matter scope for evaluating an item: the page's keys overlaid
    /// with the item's, plus the pattern as `permalink` unless the item
    /// declares its own.
    pub fn item_scope(&self, item_front_matter: &FrontMatter) -> FrontMatter {
        let mut scope = self.scope.merged_with(item_front_matter);
        if let Some(pattern) = &self.permalink_pattern {
            scope.insert_if_absent("permalink", pattern.clone());
        }
        scope
    }

    /// Bind an item to `owner`, replacing any item with the same id.
    pub fn add(&mut self, owner: &PageId, mut item: RepeatableItem) {
        item.namespace = Some(self.namespace.clone());
        item.owner = Some(owner.clone());
        self.items.insert(item.id.clone(), item);
    }

    /// Unbind an item, returning it without its owner.
    pub fn remove(&mut self, id: &ItemId) -> Option<RepeatableItem> {
        let mut item = self.items.shift_remove(id)?;
        item.namespace = None;
        item.owner = None;
        Some(item)
    }

    pub fn get(&self, id: &ItemId) -> Option<&RepeatableItem> {
        self.items.get(id)
    }

    /// Items in insertion order.
    pub fn items(&self) -> impl Iterator<Item = &RepeatableItem> {
        self.items.values()
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }
}
