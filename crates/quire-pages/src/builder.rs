//! Site compiler.
//!
//! Discovers pages, collection items and dataset items, constructs page views
//! and records everything in the dependency graph so later changes can be
//! applied incrementally.

use std::collections::{BTreeMap, HashMap};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Instant;

use rayon::prelude::*;
use serde::Serialize;
use walkdir::WalkDir;

use quire_frontmatter::{parse_document, FrontMatter};
use quire_graph::{
    path_key, register_references, scan_templates, site_relative, DependencyGraph, ItemKind,
};

use crate::context::SiteContext;
use crate::page_view::{PageError, PageId, PageView};
use crate::render::{render_contexts, RenderContext};
use crate::repeatable::{ItemId, Namespace, RepeatableItem};

/// A named folder: a collection of content files or a dataset of data files.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NamedFolder {
    pub name: String,

    /// Folder relative to the site root
    pub folder: PathBuf,
}

/// Configuration for compiling a site.
#[derive(Debug, Clone)]
pub struct SiteConfig {
    /// Site root; every other path is relative to it
    pub root: PathBuf,

    /// Folders holding page view definitions
    pub pages: Vec<PathBuf>,

    /// Folders holding shared templates
    pub templates: Vec<PathBuf>,

    pub collections: Vec<NamedFolder>,

    pub datasets: Vec<NamedFolder>,

    /// Front matter fields that may expand, in addition to `permalink`
    pub expandable: Vec<String>,

    /// Clean up permalinks before deriving target paths
    pub sanitize_permalinks: bool,

    /// Include pages and items marked `draft: true`
    pub drafts: bool,

    /// Stop at the first failing file instead of collecting errors
    pub fail_fast: bool,
}

impl Default for SiteConfig {
    fn default() -> Self {
        Self {
            root: PathBuf::from("."),
            pages: vec![PathBuf::from("_pages")],
            templates: vec![PathBuf::from("_layouts")],
            collections: vec![],
            datasets: vec![],
            expandable: vec!["permalink".to_string()],
            sanitize_permalinks: true,
            drafts: false,
            fail_fast: false,
        }
    }
}

impl SiteConfig {
    /// The per-page evaluation context for this configuration.
    pub fn context(&self) -> SiteContext {
        SiteContext {
            expandable_fields: self.expandable.clone(),
            sanitize_permalinks: self.sanitize_permalinks,
            page_folders: self.pages.clone(),
        }
    }
}

/// Errors that can occur while compiling a site.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum BuildError {
    #[error("Failed to read {path}: {message}")]
    ReadError { path: String, message: String },

    #[error("Failed to parse {path}: {message}")]
    ParseError { path: String, message: String },

    #[error(transparent)]
    Page(#[from] PageError),

    #[error("Folder not found: {0}")]
    MissingFolder(String),
}

impl BuildError {
    /// The file the error belongs to.
    pub fn path(&self) -> &str {
        match self {
            Self::ReadError { path, .. } | Self::ParseError { path, .. } => path,
            Self::Page(e) => e.path(),
            Self::MissingFolder(path) => path,
        }
    }
}

/// Several outputs claiming the same target path.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Collision {
    pub target: PathBuf,

    /// Pages producing the target, in discovery order
    pub pages: Vec<PageId>,
}

/// A compiled site.
#[derive(Debug, Default)]
pub struct Site {
    /// Page views by id
    pub pages: BTreeMap<PageId, PageView>,

    /// Loaded repeatable items, unbound, per namespace
    pub items: BTreeMap<Namespace, BTreeMap<ItemId, RepeatableItem>>,

    pub graph: DependencyGraph,

    /// One render context per output, ordered by page id
    pub contexts: Vec<RenderContext>,

    pub collisions: Vec<Collision>,

    /// Files that failed to load, keyed by path
    load_errors: BTreeMap<String, BuildError>,

    /// Pages or items whose outputs failed to resolve
    render_errors: Vec<BuildError>,
}

impl Site {
    /// Every error recorded for the last compile or refresh.
    pub fn errors(&self) -> impl Iterator<Item = &BuildError> {
        self.load_errors.values().chain(self.render_errors.iter())
    }

    pub fn has_errors(&self) -> bool {
        !self.load_errors.is_empty() || !self.render_errors.is_empty()
    }

    /// Number of output pages.
    pub fn output_count(&self) -> usize {
        self.contexts.len()
    }
}

/// Compiles a site described by a [`SiteConfig`].
pub struct SiteCompiler {
    config: SiteConfig,
    ctx: SiteContext,
}

impl SiteCompiler {
    /// Create a new compiler.
    pub fn new(config: SiteConfig) -> Self {
        let ctx = config.context();
        Self { config, ctx }
    }

    pub fn config(&self) -> &SiteConfig {
        &self.config
    }

    pub fn context(&self) -> &SiteContext {
        &self.ctx
    }

    /// Compile the whole site from scratch.
    pub fn compile(&self) -> Result<Site, BuildError> {
        let start = Instant::now();
        let mut site = Site::default();

        self.register_folders(&mut site.graph);

        for collection in &self.config.collections {
            let namespace = Namespace::Collection(collection.name.clone());
            self.load_items(&mut site, &namespace, &collection.folder)?;
        }
        for dataset in &self.config.datasets {
            let namespace = Namespace::Dataset(dataset.name.clone());
            self.load_items(&mut site, &namespace, &dataset.folder)?;
        }

        let mut sources = Vec::new();
        for folder in &self.config.pages {
            if !self.config.root.join(folder).exists() {
                return Err(BuildError::MissingFolder(
                    self.config.root.join(folder).display().to_string(),
                ));
            }
            sources.extend(self.discover(folder));
        }

        // Construct in parallel, merge into the graph on this thread
        let results: Vec<(PathBuf, Result<Option<PageView>, BuildError>)> = sources
            .par_iter()
            .map(|source| (source.clone(), self.load_page(source)))
            .collect();

        for (source, result) in results {
            match result {
                Ok(Some(page)) => self.insert_page(&mut site, page),
                Ok(None) => {}
                Err(e) => self.record(&mut site, &source, e)?,
            }
        }

        self.finalize(&mut site)?;

        tracing::info!(
            "Compiled {} pages into {} outputs in {}ms",
            site.pages.len(),
            site.output_count(),
            start.elapsed().as_millis()
        );

        Ok(site)
    }

    /// Recompile the contribution of changed paths.
    ///
    /// Paths may be absolute or relative to the site root. Deleted files are
    /// removed from the site; everything else is reloaded.
    pub fn refresh(&self, site: &mut Site, changed: &[PathBuf]) -> Result<(), BuildError> {
        let start = Instant::now();

        for path in changed {
            let relative = site_relative(&self.config.root, path);
            let relative = relative.as_path();
            let kind = site.graph.item_kind(relative).cloned();
            site.load_errors.remove(&path_key(relative));

            match kind {
                Some(ItemKind::PageView) => self.refresh_page(site, relative)?,
                Some(ItemKind::Content(name)) => {
                    self.refresh_item(site, &Namespace::Collection(name), relative)?
                }
                Some(ItemKind::Data(name)) => {
                    self.refresh_item(site, &Namespace::Dataset(name), relative)?
                }
                Some(ItemKind::Template) => self.refresh_template(site, relative),
                None => tracing::debug!("Ignoring change outside site folders: {}", relative.display()),
            }
        }

        self.finalize(site)?;

        tracing::info!(
            "Refreshed {} paths in {}ms",
            changed.len(),
            start.elapsed().as_millis()
        );

        Ok(())
    }

    fn register_folders(&self, graph: &mut DependencyGraph) {
        for folder in &self.config.pages {
            graph.register_folder(folder, ItemKind::PageView);
        }
        for collection in &self.config.collections {
            graph.register_folder(&collection.folder, ItemKind::Content(collection.name.clone()));
            graph.register_metadata(
                &Namespace::Collection(collection.name.clone()).metadata_key(),
                &path_key(&collection.folder),
            );
        }
        for dataset in &self.config.datasets {
            graph.register_folder(&dataset.folder, ItemKind::Data(dataset.name.clone()));
            graph.register_metadata(
                &Namespace::Dataset(dataset.name.clone()).metadata_key(),
                &path_key(&dataset.folder),
            );
        }
        for folder in &self.config.templates {
            graph.register_folder(folder, ItemKind::Template);
            match scan_templates(&self.config.root, folder, graph) {
                Ok(count) => tracing::debug!("Registered {} templates from {}", count, folder.display()),
                Err(e) => tracing::warn!("Failed to scan templates: {}", e),
            }
        }
    }

    /// Files under `folder`, relative to the site root, in a stable order.
    fn discover(&self, folder: &Path) -> Vec<PathBuf> {
        let full = self.config.root.join(folder);
        let mut files = Vec::new();

        for entry in WalkDir::new(&full)
            .follow_links(true)
            .sort_by_file_name()
            .into_iter()
            .filter_map(|e| e.ok())
        {
            let path = entry.path();

            if !path.is_file() {
                continue;
            }

            let filename = path.file_name().and_then(|n| n.to_str()).unwrap_or("");
            if filename.starts_with('.') {
                continue;
            }

            files.push(path.strip_prefix(&self.config.root).unwrap_or(path).to_path_buf());
        }

        files
    }

    fn read(&self, source: &Path) -> Result<String, BuildError> {
        fs::read_to_string(self.config.root.join(source)).map_err(|e| BuildError::ReadError {
            path: path_key(source),
            message: e.to_string(),
        })
    }

    /// Load and construct one page. Drafts yield `None` unless enabled.
    fn load_page(&self, source: &Path) -> Result<Option<PageView>, BuildError> {
        let content = self.read(source)?;
        let doc = parse_document(&content).map_err(|e| BuildError::ParseError {
            path: path_key(source),
            message: e.to_string(),
        })?;

        let page = PageView::construct(source, &doc.front_matter, doc.body, &self.ctx)?;

        if page.is_draft() && !self.config.drafts {
            tracing::debug!("Skipping draft page {}", source.display());
            return Ok(None);
        }

        tracing::debug!("Loaded {} page {}", page.kind(), source.display());
        Ok(Some(page))
    }

    /// Load one collection or dataset item.
    fn load_item(&self, source: &Path, namespace: &Namespace) -> Result<Option<RepeatableItem>, BuildError> {
        let content = self.read(source)?;

        let item = match namespace {
            Namespace::Collection(_) => {
                let doc = parse_document(&content).map_err(|e| BuildError::ParseError {
                    path: path_key(source),
                    message: e.to_string(),
                })?;
                RepeatableItem::new(source, doc.front_matter, doc.body)
            }
            Namespace::Dataset(_) => RepeatableItem::new(source, parse_data(source, &content)?, ""),
        };

        if item.is_draft() && !self.config.drafts {
            tracing::debug!("Skipping draft item {}", source.display());
            return Ok(None);
        }

        Ok(Some(item))
    }

    fn load_items(&self, site: &mut Site, namespace: &Namespace, folder: &Path) -> Result<(), BuildError> {
        if !self.config.root.join(folder).exists() {
            tracing::warn!("Folder for {} not found: {}", namespace, folder.display());
            return Ok(());
        }

        let sources = self.discover(folder);
        let results: Vec<_> = sources
            .par_iter()
            .map(|source| (source.clone(), self.load_item(source, namespace)))
            .collect();

        for (source, result) in results {
            match result {
                Ok(Some(item)) => {
                    site.graph.register_file(&item);
                    site.items
                        .entry(namespace.clone())
                        .or_default()
                        .insert(item.id().clone(), item);
                }
                Ok(None) => {}
                Err(e) => self.record(site, &source, e)?,
            }
        }

        tracing::debug!(
            "Loaded {} items for {}",
            site.items.get(namespace).map_or(0, BTreeMap::len),
            namespace
        );

        Ok(())
    }

    /// Register a page's edges and bind the items it repeats over.
    fn insert_page(&self, site: &mut Site, mut page: PageView) {
        let source = page.source().to_path_buf();

        site.graph.register_file(&page);
        register_references(&mut site.graph, &source, page.body());

        if let Some(namespace) = page.namespace().cloned() {
            match site.graph.metadata(&namespace.metadata_key()).map(PathBuf::from) {
                Some(folder) => site.graph.register_folder_consumer(&folder, &source),
                None => tracing::warn!("{} repeats over unknown {}", source.display(), namespace),
            }

            if let Some(items) = site.items.get(&namespace) {
                for item in items.values() {
                    // Only Dynamic pages have a namespace
                    let _ = page.add_repeatable_item(item.clone());
                }
            }
        }

        site.pages.insert(page.id().clone(), page);
    }

    fn refresh_page(&self, site: &mut Site, source: &Path) -> Result<(), BuildError> {
        site.pages.remove(&PageId::from_source(source));
        site.graph.remove_file(source);
        site.graph.forget_consumer(source);

        let full = self.config.root.join(source);
        if !full.exists() {
            tracing::info!("Removed page {}", source.display());
            return Ok(());
        }
        if !full.is_file() {
            tracing::debug!("Ignoring non-file page path {}", source.display());
            return Ok(());
        }

        match self.load_page(source) {
            Ok(Some(page)) => self.insert_page(site, page),
            Ok(None) => {}
            Err(e) => self.record(site, source, e)?,
        }

        Ok(())
    }

    fn refresh_item(&self, site: &mut Site, namespace: &Namespace, source: &Path) -> Result<(), BuildError> {
        let id = ItemId::from_source(source);

        if let Some(items) = site.items.get_mut(namespace) {
            items.remove(&id);
        }
        for page in site.pages.values_mut() {
            page.del_repeatable_item(&id);
        }
        site.graph.remove_file(source);

        let full = self.config.root.join(source);
        if !full.exists() {
            tracing::info!("Removed item {}", source.display());
            return Ok(());
        }
        if !full.is_file() {
            tracing::debug!("Ignoring non-file item path {}", source.display());
            return Ok(());
        }

        let item = match self.load_item(source, namespace) {
            Ok(Some(item)) => item,
            Ok(None) => return Ok(()),
            Err(e) => return self.record(site, source, e),
        };

        site.graph.register_file(&item);
        for page in site.pages.values_mut() {
            if page.namespace() == Some(namespace) {
                let _ = page.add_repeatable_item(item.clone());
            }
        }
        site.items
            .entry(namespace.clone())
            .or_default()
            .insert(id, item);

        Ok(())
    }

    fn refresh_template(&self, site: &mut Site, template: &Path) {
        site.graph.forget_consumer(template);

        match fs::read_to_string(self.config.root.join(template)) {
            Ok(source) => {
                site.graph.register_template(template);
                register_references(&mut site.graph, template, &source);
            }
            Err(e) => tracing::debug!("Template {} not readable: {}", template.display(), e),
        }
    }

    /// Rebuild render contexts and detect target collisions.
    fn finalize(&self, site: &mut Site) -> Result<(), BuildError> {
        site.contexts.clear();
        site.render_errors.clear();

        for page in site.pages.values() {
            let (contexts, errors) = render_contexts(page, &self.ctx);
            site.contexts.extend(contexts);

            for e in errors {
                tracing::error!("{}", e);
                if self.config.fail_fast {
                    return Err(e.into());
                }
                site.render_errors.push(e.into());
            }
        }

        let mut claims: HashMap<&Path, Vec<PageId>> = HashMap::new();
        let mut order: Vec<&Path> = Vec::new();
        for context in &site.contexts {
            let pages = claims.entry(context.target.as_path()).or_insert_with(|| {
                order.push(context.target.as_path());
                Vec::new()
            });
            if !pages.contains(&context.page) {
                pages.push(context.page.clone());
            }
        }

        let collisions: Vec<Collision> = order
            .into_iter()
            .filter_map(|target| {
                let pages = claims.remove(target)?;
                (pages.len() > 1).then(|| Collision {
                    target: target.to_path_buf(),
                    pages,
                })
            })
            .collect();

        for collision in &collisions {
            tracing::warn!(
                "{} is produced by {} pages: {}",
                collision.target.display(),
                collision.pages.len(),
                collision
                    .pages
                    .iter()
                    .map(PageId::as_str)
                    .collect::<Vec<_>>()
                    .join(", ")
            );
        }
        site.collisions = collisions;

        Ok(())
    }

    /// Record a per-file error, or return it when failing fast.
    fn record(&self, site: &mut Site, source: &Path, error: BuildError) -> Result<(), BuildError> {
        tracing::error!("{}", error);

        if self.config.fail_fast {
            return Err(error);
        }

        site.load_errors.insert(path_key(source), error);
        Ok(())
    }
}

/// Parse a YAML or JSON data file into an item's front matter.
fn parse_data(source: &Path, content: &str) -> Result<FrontMatter, BuildError> {
    let ext = source.extension().and_then(|e| e.to_str()).unwrap_or("");

    let value: serde_yaml::Value = match ext {
        "json" => serde_json::from_str(content).map_err(|e| BuildError::ParseError {
            path: path_key(source),
            message: e.to_string(),
        })?,
        _ => serde_yaml::from_str(content).map_err(|e| BuildError::ParseError {
            path: path_key(source),
            message: e.to_string(),
        })?,
    };

    match value {
        serde_yaml::Value::Mapping(mapping) => Ok(FrontMatter::from_mapping(mapping)),
        serde_yaml::Value::Null => Ok(FrontMatter::new()),
        other => Err(BuildError::ParseError {
            path: path_key(source),
            message: format!("expected a mapping at the top level, found {:?}", other),
        }),
    }
}
