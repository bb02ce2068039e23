//! The page view model.
//!
//! A page view is one compiled unit read from a pages folder. It comes in
//! three shapes:
//!
//! - **Static**: one source file, one output.
//! - **Dynamic**: repeats over the items of a collection or dataset; its
//!   permalink is a pattern evaluated once per item.
//! - **Repeater**: its permalink expands over an array in its own front
//!   matter, producing one child page per expanded value.

use std::fmt;
use std::path::{Path, PathBuf};

use serde::Serialize;

use quire_frontmatter::{
    insert_date_variables, insert_file_variables, ExpandedValue, FrontMatter, FrontMatterError,
    Iterators, Value,
};
use quire_graph::{path_key, Trackable};

use crate::context::SiteContext;
use crate::permalink::{Output, Permalink, PermalinkError, Resolution};
use crate::repeatable::{ItemId, Namespace, Repeatable, RepeatableItem};

/// Front matter key selecting the page kind explicitly.
pub const KIND_KEY: &str = "kind";

/// Stable identity of a page view.
///
/// Derived from the source path; Repeater children append `#<index>`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(transparent)]
pub struct PageId(String);

impl PageId {
    pub fn from_source(source: &Path) -> Self {
        Self(path_key(source))
    }

    /// Id of the child at `index` of a Repeater.
    pub fn child(&self, index: usize) -> Self {
        Self(format!("{}#{}", self.0, index))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for PageId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Kind tag of a page view.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum PageKind {
    Static,
    Dynamic,
    Repeater,
}

impl PageKind {
    /// Parse a `kind` front matter value.
    pub fn parse(raw: &str) -> Option<Self> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "static" => Some(PageKind::Static),
            "dynamic" => Some(PageKind::Dynamic),
            "repeater" => Some(PageKind::Repeater),
            _ => None,
        }
    }
}

impl fmt::Display for PageKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PageKind::Static => write!(f, "static"),
            PageKind::Dynamic => write!(f, "dynamic"),
            PageKind::Repeater => write!(f, "repeater"),
        }
    }
}

/// Errors that can occur while constructing a page view.
///
/// `path` is the source file relative to the site root.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum PageError {
    #[error("{path}: {source}")]
    FrontMatter {
        path: String,
        #[source]
        source: FrontMatterError,
    },

    #[error("{path}: {source}")]
    Permalink {
        path: String,
        #[source]
        source: PermalinkError,
    },

    #[error("{path}: missing required front matter key '{key}'")]
    MissingRequiredKey { path: String, key: &'static str },

    #[error("{path}: unknown page kind '{kind}'")]
    UnknownKind { path: String, kind: String },
}

impl PageError {
    /// The source file the error belongs to.
    pub fn path(&self) -> &str {
        match self {
            Self::FrontMatter { path, .. }
            | Self::Permalink { path, .. }
            | Self::MissingRequiredKey { path, .. }
            | Self::UnknownKind { path, .. } => path,
        }
    }

    /// The front matter key the error originated from, if any.
    pub fn key_path(&self) -> Option<&str> {
        match self {
            Self::FrontMatter { source, .. } => Some(source.key_path()),
            Self::Permalink { .. } => Some("permalink"),
            Self::MissingRequiredKey { key, .. } => Some(key),
            Self::UnknownKind { .. } => Some(KIND_KEY),
        }
    }
}

/// Shape-specific state of a page view.
#[derive(Debug, Clone, PartialEq)]
pub(crate) enum PageVariant {
    Static(Output),
    Dynamic(Repeatable),
    Repeater(Vec<PageView>),
}

/// An output produced for one item of a Dynamic page.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ItemOutput {
    pub item: ItemId,
    pub output: Output,
}

/// One compiled unit.
#[derive(Debug, Clone, PartialEq)]
pub struct PageView {
    id: PageId,
    source: PathBuf,
    front_matter: FrontMatter,
    body: String,
    parent: Option<PageId>,
    variant: PageVariant,
}

impl PageView {
    /// Construct a page view, detecting its kind.
    ///
    /// An explicit `kind` key wins. Otherwise a `collection` or `dataset`
    /// key makes a Dynamic page, a permalink that expands makes a Repeater,
    /// and anything else is Static.
    pub fn construct(
        source: impl Into<PathBuf>,
        front_matter: &FrontMatter,
        body: impl Into<String>,
        ctx: &SiteContext,
    ) -> Result<Self, PageError> {
        let source = source.into();

        if let Some(raw) = front_matter.get(KIND_KEY) {
            let raw = raw.interpolated().unwrap_or_default();
            let kind = PageKind::parse(&raw).ok_or_else(|| PageError::UnknownKind {
                path: display(&source),
                kind: raw.clone(),
            })?;
            return Self::construct_as(kind, source, front_matter, body, ctx);
        }

        if Namespace::from_front_matter(front_matter).is_some() {
            return Self::construct_as(PageKind::Dynamic, source, front_matter, body, ctx);
        }

        let prepared = prepare(&source, front_matter)?;
        let mut expander = ctx.expander();
        let evaluated = expander
            .expand(&prepared)
            .map_err(|e| frontmatter_error(&source, e))?;

        if expander.has_expansion() {
            Self::build_repeater(source, evaluated, body.into(), ctx)
        } else {
            Self::build_static(source, evaluated, body.into(), ctx)
        }
    }

    /// Construct a page view of a given kind.
    pub fn construct_as(
        kind: PageKind,
        source: impl Into<PathBuf>,
        front_matter: &FrontMatter,
        body: impl Into<String>,
        ctx: &SiteContext,
    ) -> Result<Self, PageError> {
        let source = source.into();
        let body = body.into();
        let prepared = prepare(&source, front_matter)?;

        match kind {
            PageKind::Dynamic => Self::build_dynamic(source, prepared, body, ctx),
            PageKind::Static | PageKind::Repeater => {
                let mut expander = ctx.expander();
                let evaluated = expander
                    .expand(&prepared)
                    .map_err(|e| frontmatter_error(&source, e))?;

                match (kind, expander.has_expansion()) {
                    (PageKind::Repeater, false) => Err(PageError::MissingRequiredKey {
                        path: display(&source),
                        key: "permalink",
                    }),
                    (PageKind::Static, true) => {
                        tracing::warn!(
                            "{} is declared static but its permalink expands; building it as a repeater",
                            source.display()
                        );
                        Self::build_repeater(source, evaluated, body, ctx)
                    }
                    (PageKind::Repeater, true) => Self::build_repeater(source, evaluated, body, ctx),
                    _ => Self::build_static(source, evaluated, body, ctx),
                }
            }
        }
    }

    fn build_static(
        source: PathBuf,
        mut front_matter: FrontMatter,
        body: String,
        ctx: &SiteContext,
    ) -> Result<Self, PageError> {
        let resolution = resolve_permalink(&source, &front_matter, ctx)?;
        let output = resolution
            .items
            .into_iter()
            .next()
            .ok_or_else(|| permalink_error(&source, PermalinkError::Empty))?;

        front_matter.insert("permalink", output.permalink.canonical.as_str());

        Ok(Self {
            id: PageId::from_source(&source),
            source,
            front_matter,
            body,
            parent: None,
            variant: PageVariant::Static(output),
        })
    }

    fn build_repeater(
        source: PathBuf,
        front_matter: FrontMatter,
        body: String,
        ctx: &SiteContext,
    ) -> Result<Self, PageError> {
        let id = PageId::from_source(&source);
        let resolution = resolve_permalink(&source, &front_matter, ctx)?;

        let children = resolution
            .items
            .into_iter()
            .enumerate()
            .map(|(index, output)| {
                let mut child_front_matter = front_matter.clone();
                child_front_matter.insert("permalink", output.permalink.canonical.as_str());

                PageView {
                    id: id.child(index),
                    source: source.clone(),
                    front_matter: child_front_matter,
                    body: body.clone(),
                    parent: Some(id.clone()),
                    variant: PageVariant::Static(output),
                }
            })
            .collect::<Vec<_>>();

        tracing::debug!("{} repeats into {} pages", source.display(), children.len());

        Ok(Self {
            id,
            source,
            front_matter,
            body,
            parent: None,
            variant: PageVariant::Repeater(children),
        })
    }

    fn build_dynamic(
        source: PathBuf,
        mut prepared: FrontMatter,
        body: String,
        ctx: &SiteContext,
    ) -> Result<Self, PageError> {
        let namespace =
            Namespace::from_front_matter(&prepared).ok_or_else(|| PageError::MissingRequiredKey {
                path: display(&source),
                key: "collection|dataset",
            })?;

        // The permalink belongs to the items, not the page
        let pattern = prepared.remove("permalink");

        let evaluated = ctx
            .expander()
            .expand(&prepared)
            .map_err(|e| frontmatter_error(&source, e))?;

        Ok(Self {
            id: PageId::from_source(&source),
            source,
            front_matter: evaluated,
            body,
            parent: None,
            variant: PageVariant::Dynamic(Repeatable::new(namespace, pattern, prepared)),
        })
    }

    pub fn id(&self) -> &PageId {
        &self.id
    }

    pub fn source(&self) -> &Path {
        &self.source
    }

    /// Evaluated front matter.
    pub fn front_matter(&self) -> &FrontMatter {
        &self.front_matter
    }

    pub fn body(&self) -> &str {
        &self.body
    }

    /// The Repeater this page was materialised from, if any.
    pub fn parent(&self) -> Option<&PageId> {
        self.parent.as_ref()
    }

    pub fn kind(&self) -> PageKind {
        match self.variant {
            PageVariant::Static(_) => PageKind::Static,
            PageVariant::Dynamic(_) => PageKind::Dynamic,
            PageVariant::Repeater(_) => PageKind::Repeater,
        }
    }

    /// Whether the page is marked `draft: true`.
    pub fn is_draft(&self) -> bool {
        self.front_matter.get("draft") == Some(&Value::Bool(true))
    }

    /// The page's own permalink. A Repeater reports its first child's;
    /// Dynamic pages have none of their own.
    pub fn permalink(&self) -> Option<&Permalink> {
        self.outputs().into_iter().next().map(|o| &o.permalink)
    }

    /// Target path of [`PageView::permalink`].
    pub fn target_path(&self) -> Option<&Path> {
        self.outputs().into_iter().next().map(|o| o.target.as_path())
    }

    /// Outputs produced by the page itself, excluding Dynamic items.
    pub fn outputs(&self) -> Vec<&Output> {
        match &self.variant {
            PageVariant::Static(output) => vec![output],
            PageVariant::Dynamic(_) => Vec::new(),
            PageVariant::Repeater(children) => {
                children.iter().flat_map(|child| child.outputs()).collect()
            }
        }
    }

    /// Materialised children of a Repeater, in expansion order.
    pub fn children(&self) -> &[PageView] {
        match &self.variant {
            PageVariant::Repeater(children) => children,
            _ => &[],
        }
    }

    /// Iterator bindings of each child, index-aligned with [`PageView::children`].
    pub fn child_iterators(&self) -> Vec<&Iterators> {
        self.children()
            .iter()
            .flat_map(|child| child.outputs())
            .map(|output| &output.iterators)
            .collect()
    }

    /// Redirects of each child, index-aligned with [`PageView::children`].
    pub fn child_redirects(&self) -> Vec<&[String]> {
        self.children()
            .iter()
            .flat_map(|child| child.outputs())
            .map(|output| output.permalink.redirects.as_slice())
            .collect()
    }

    /// The repeatable capability of a Dynamic page.
    pub fn repeatable(&self) -> Option<&Repeatable> {
        match &self.variant {
            PageVariant::Dynamic(repeatable) => Some(repeatable),
            _ => None,
        }
    }

    /// Collection or dataset a Dynamic page repeats over.
    pub fn namespace(&self) -> Option<&Namespace> {
        self.repeatable().map(Repeatable::namespace)
    }

    /// Name of the collection or dataset a Dynamic page repeats over.
    pub fn object_name(&self) -> Option<&str> {
        self.repeatable().map(Repeatable::object_name)
    }

    /// Bind an item to this page.
    ///
    /// Hands the item back if the page is not Dynamic.
    pub fn add_repeatable_item(&mut self, item: RepeatableItem) -> Result<(), RepeatableItem> {
        match &mut self.variant {
            PageVariant::Dynamic(repeatable) => {
                repeatable.add(&self.id, item);
                Ok(())
            }
            _ => Err(item),
        }
    }

    /// Unbind an item from this page.
    pub fn del_repeatable_item(&mut self, id: &ItemId) -> Option<RepeatableItem> {
        match &mut self.variant {
            PageVariant::Dynamic(repeatable) => repeatable.remove(id),
            _ => None,
        }
    }

    /// Items bound to a Dynamic page, in insertion order.
    pub fn repeatable_items(&self) -> Vec<&RepeatableItem> {
        self.repeatable()
            .map(|repeatable| repeatable.items().collect())
            .unwrap_or_default()
    }

    /// Resolve the outputs of every item bound to a Dynamic page.
    ///
    /// Each item is evaluated in the page's scope overlaid with its own front
    /// matter. Items without a permalink of their own or a page pattern get
    /// `/<object name>/<item name>/`. An item that fails is left out and its
    /// error, reported against the item's source file, is returned alongside
    /// the outputs of the others.
    pub fn item_outputs(&self, ctx: &SiteContext) -> (Vec<ItemOutput>, Vec<PageError>) {
        let Some(repeatable) = self.repeatable() else {
            return (Vec::new(), Vec::new());
        };

        let mut outputs = Vec::new();
        let mut errors = Vec::new();

        for item in repeatable.items() {
            match item_resolution(repeatable, item, ctx) {
                Ok(resolution) => outputs.extend(resolution.items.into_iter().map(|output| ItemOutput {
                    item: item.id().clone(),
                    output,
                })),
                Err(e) => errors.push(e),
            }
        }

        (outputs, errors)
    }
}

fn item_resolution(
    repeatable: &Repeatable,
    item: &RepeatableItem,
    ctx: &SiteContext,
) -> Result<Resolution, PageError> {
    let prepared = prepare(item.source(), item.front_matter())?;
    let mut scope = repeatable.item_scope(&prepared);
    scope.insert_if_absent(
        "permalink",
        format!("/{}/{}/", repeatable.object_name(), item.name()),
    );

    let evaluated = ctx
        .expander()
        .expand(&scope)
        .map_err(|e| frontmatter_error(item.source(), e))?;

    resolve_permalink(item.source(), &evaluated, ctx)
}

impl Trackable for PageView {
    fn source_path(&self) -> &Path {
        &self.source
    }

    fn produced_ids(&self) -> Vec<String> {
        let mut ids = vec![self.id.to_string()];
        ids.extend(self.children().iter().map(|child| child.id.to_string()));
        ids
    }
}

/// Copy the front matter and add the variables derived from the file.
fn prepare(source: &Path, front_matter: &FrontMatter) -> Result<FrontMatter, PageError> {
    let mut prepared = front_matter.clone();
    insert_file_variables(&mut prepared, source);
    insert_date_variables(&mut prepared).map_err(|e| frontmatter_error(source, e))?;
    Ok(prepared)
}

/// Resolve the evaluated `permalink` field, falling back to the default
/// permalink, and attach `redirect_from` values.
fn resolve_permalink(
    source: &Path,
    evaluated: &FrontMatter,
    ctx: &SiteContext,
) -> Result<Resolution, PageError> {
    let values = match evaluated.get("permalink") {
        Some(Value::Expanded(values)) => values.clone(),
        Some(other) => other
            .interpolated()
            .map(ExpandedValue::literal)
            .into_iter()
            .collect(),
        None => vec![ExpandedValue::literal(ctx.default_permalink(source))],
    };

    let resolver = ctx.resolver();
    let mut resolution = resolver
        .resolve(&values)
        .map_err(|e| permalink_error(source, e))?;

    let redirects = redirect_values(evaluated);
    if !redirects.is_empty() {
        resolver
            .add_redirects(&mut resolution, &redirects)
            .map_err(|e| permalink_error(source, e))?;
    }

    Ok(resolution)
}

fn redirect_values(evaluated: &FrontMatter) -> Vec<ExpandedValue> {
    match evaluated.get("redirect_from") {
        Some(Value::Expanded(values)) => values.clone(),
        Some(Value::List(list)) => list
            .iter()
            .filter_map(Value::interpolated)
            .filter(|link| !link.is_empty())
            .map(ExpandedValue::literal)
            .collect(),
        Some(other) => other
            .interpolated()
            .filter(|link| !link.is_empty())
            .map(ExpandedValue::literal)
            .into_iter()
            .collect(),
        None => Vec::new(),
    }
}

fn display(source: &Path) -> String {
    path_key(source)
}

fn frontmatter_error(source: &Path, source_error: FrontMatterError) -> PageError {
    PageError::FrontMatter {
        path: display(source),
        source: source_error,
    }
}

fn permalink_error(source: &Path, source_error: PermalinkError) -> PageError {
    PageError::Permalink {
        path: display(source),
        source: source_error,
    }
}
