//! Dependency graph between source artifacts and compiled entities.
//!
//! The graph only stores edges. Deciding what to recompile when a path
//! changes, and walking the edges transitively, is left to the watch layer.

use std::collections::{BTreeSet, HashMap};
use std::env;
use std::fmt;
use std::fs;
use std::path::{Component, Path, PathBuf};

use serde::Serialize;

/// Kind of a node in the dependency graph.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum NodeKind {
    Folder,
    File,
    Template,
    Metadata,
}

/// What kind of item a registered folder holds.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase", tag = "kind", content = "name")]
pub enum ItemKind {
    /// Page view definitions
    PageView,
    /// Content items of the named collection
    Content(String),
    /// Data items of the named dataset
    Data(String),
    /// Shared templates (layouts, partials)
    Template,
}

impl fmt::Display for ItemKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ItemKind::PageView => write!(f, "pages"),
            ItemKind::Content(name) => write!(f, "collection '{}'", name),
            ItemKind::Data(name) => write!(f, "dataset '{}'", name),
            ItemKind::Template => write!(f, "templates"),
        }
    }
}

/// A node and the keys that depend on it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DependencyNode {
    pub kind: NodeKind,
    pub key: String,
    pub dependents: BTreeSet<String>,
}

impl DependencyNode {
    fn new(kind: NodeKind, key: String) -> Self {
        Self {
            kind,
            key,
            dependents: BTreeSet::new(),
        }
    }
}

/// An entity compiled from a single source file.
pub trait Trackable {
    /// The source file, relative to the site root.
    fn source_path(&self) -> &Path;

    /// Identities of every entity produced from that file.
    fn produced_ids(&self) -> Vec<String>;
}

/// Normalise a path into a graph key: `/`-separated, no `.` segments, no
/// leading `./` or trailing separator.
pub fn path_key(path: &Path) -> String {
    let mut parts: Vec<String> = Vec::new();

    for component in path.components() {
        match component {
            Component::Normal(part) => parts.push(part.to_string_lossy().into_owned()),
            Component::ParentDir => parts.push("..".to_string()),
            Component::CurDir | Component::RootDir | Component::Prefix(_) => {}
        }
    }

    parts.join("/")
}

/// Express `path` relative to the site `root`.
///
/// Watchers report absolute paths even when the root was given relative to
/// the working directory, and either side may go through a symlink. The root
/// is tried as given, joined onto the working directory and canonicalized.
/// Relative paths, and paths outside the root, come back unchanged.
pub fn site_relative(root: &Path, path: &Path) -> PathBuf {
    if path.is_relative() {
        return path.to_path_buf();
    }

    let mut roots = vec![root.to_path_buf()];
    if root.is_relative() {
        if let Ok(cwd) = env::current_dir() {
            roots.push(cwd.join(root));
        }
    }
    if let Ok(canonical) = fs::canonicalize(root) {
        roots.push(canonical);
    }

    for candidate in &roots {
        if let Ok(relative) = path.strip_prefix(candidate) {
            return relative.to_path_buf();
        }
    }

    // Removed files cannot be canonicalized; their parent usually can
    let canonical = fs::canonicalize(path).ok().or_else(|| {
        let parent = fs::canonicalize(path.parent()?).ok()?;
        Some(parent.join(path.file_name()?))
    });
    if let Some(canonical) = canonical {
        for candidate in &roots {
            if let Ok(relative) = canonical.strip_prefix(candidate) {
                return relative.to_path_buf();
            }
        }
    }

    path.to_path_buf()
}

/// Whether `key` equals `folder` or lies beneath it.
fn is_within(key: &str, folder: &str) -> bool {
    if folder.is_empty() {
        return true;
    }
    key == folder
        || key
            .strip_prefix(folder)
            .is_some_and(|rest| rest.starts_with('/'))
}

/// Bidirectional record of which sources produce or influence which entities.
///
/// Nodes are unique per `(kind, key)`; registering the same pair again
/// replaces its edges.
#[derive(Debug, Default)]
pub struct DependencyGraph {
    nodes: HashMap<(NodeKind, String), DependencyNode>,
    folder_kinds: HashMap<String, ItemKind>,
    metadata: HashMap<String, String>,
    metadata_reverse: HashMap<String, String>,
    /// consumer -> the template it extends
    parents: HashMap<String, String>,
}

impl DependencyGraph {
    /// Create an empty graph.
    pub fn new() -> Self {
        Self::default()
    }

    /// Attribute files discovered under `path` to `kind`.
    pub fn register_folder(&mut self, path: &Path, kind: ItemKind) {
        let key = path_key(path);
        tracing::debug!("Registering folder {} for {}", key, kind);

        self.nodes.insert(
            (NodeKind::Folder, key.clone()),
            DependencyNode::new(NodeKind::Folder, key.clone()),
        );
        self.folder_kinds.insert(key, kind);
    }

    /// Record that `consumer` must be recompiled when anything under `folder` changes.
    pub fn register_folder_consumer(&mut self, folder: &Path, consumer: &Path) {
        let key = path_key(folder);
        self.nodes
            .entry((NodeKind::Folder, key.clone()))
            .or_insert_with(|| DependencyNode::new(NodeKind::Folder, key))
            .dependents
            .insert(path_key(consumer));
    }

    /// Register a free-form tag such as `collection.posts -> _posts`.
    pub fn register_metadata(&mut self, key: &str, value: &str) {
        if let Some(previous) = self.metadata.insert(key.to_string(), value.to_string()) {
            // Another key may have claimed the old value since
            if self.metadata_reverse.get(&previous).map(String::as_str) == Some(key) {
                self.metadata_reverse.remove(&previous);
            }
        }
        self.metadata_reverse
            .insert(value.to_string(), key.to_string());

        let mut node = DependencyNode::new(NodeKind::Metadata, key.to_string());
        node.dependents.insert(value.to_string());
        self.nodes.insert((NodeKind::Metadata, key.to_string()), node);
    }

    /// Record the entities a source file produced, replacing any previous record.
    pub fn register_file<T: Trackable + ?Sized>(&mut self, entity: &T) {
        let key = path_key(entity.source_path());
        let mut node = DependencyNode::new(NodeKind::File, key.clone());
        node.dependents.extend(entity.produced_ids());

        tracing::debug!("Registering {} -> {} entities", key, node.dependents.len());
        self.nodes.insert((NodeKind::File, key), node);
    }

    /// Make sure a template node exists, even before anything uses it.
    pub fn register_template(&mut self, template: &Path) {
        let key = path_key(template);
        self.nodes
            .entry((NodeKind::Template, key.clone()))
            .or_insert_with(|| DependencyNode::new(NodeKind::Template, key));
    }

    /// Record that `consumer` includes `template`.
    pub fn register_template_include(&mut self, template: &Path, consumer: &Path) {
        self.add_template_edge(path_key(template), path_key(consumer));
    }

    /// Record that `consumer` extends `template`.
    ///
    /// A consumer has a single parent; extending a new parent drops the old edge.
    pub fn register_template_extend(&mut self, template: &Path, consumer: &Path) {
        let template = path_key(template);
        let consumer = path_key(consumer);

        if let Some(previous) = self.parents.insert(consumer.clone(), template.clone()) {
            if previous != template {
                if let Some(node) = self.nodes.get_mut(&(NodeKind::Template, previous)) {
                    node.dependents.remove(&consumer);
                }
            }
        }

        self.add_template_edge(template, consumer);
    }

    fn add_template_edge(&mut self, template: String, consumer: String) {
        tracing::debug!("Template edge {} -> {}", template, consumer);
        self.nodes
            .entry((NodeKind::Template, template.clone()))
            .or_insert_with(|| DependencyNode::new(NodeKind::Template, template))
            .dependents
            .insert(consumer);
    }

    /// Look up a node.
    pub fn node(&self, kind: NodeKind, key: &str) -> Option<&DependencyNode> {
        self.nodes.get(&(kind, key.to_string()))
    }

    /// Item kind of the innermost registered folder containing `path`.
    pub fn item_kind(&self, path: &Path) -> Option<&ItemKind> {
        let key = path_key(path);

        self.folder_kinds
            .iter()
            .filter(|(folder, _)| is_within(&key, folder))
            .max_by_key(|(folder, _)| folder.len())
            .map(|(_, kind)| kind)
    }

    /// Innermost registered folder containing `path`.
    pub fn folder_of(&self, path: &Path) -> Option<&str> {
        let key = path_key(path);

        self.folder_kinds
            .keys()
            .filter(|folder| is_within(&key, folder))
            .max_by_key(|folder| folder.len())
            .map(String::as_str)
    }

    /// Value registered for a metadata key.
    pub fn metadata(&self, key: &str) -> Option<&str> {
        self.metadata.get(key).map(String::as_str)
    }

    /// Metadata key registered for a value (reverse lookup).
    pub fn metadata_key(&self, value: &str) -> Option<&str> {
        self.metadata_reverse.get(value).map(String::as_str)
    }

    /// Entities produced by a source file.
    pub fn produced_by(&self, path: &Path) -> Option<&BTreeSet<String>> {
        self.node(NodeKind::File, &path_key(path))
            .map(|node| &node.dependents)
    }

    /// Direct consumers of a template.
    pub fn template_dependents(&self, path: &Path) -> Option<&BTreeSet<String>> {
        self.node(NodeKind::Template, &path_key(path))
            .map(|node| &node.dependents)
    }

    /// Consumers of a folder's items.
    pub fn folder_consumers(&self, path: &Path) -> Option<&BTreeSet<String>> {
        self.node(NodeKind::Folder, &path_key(path))
            .map(|node| &node.dependents)
    }

    /// The template `consumer` extends, if any.
    pub fn parent_template(&self, consumer: &Path) -> Option<&str> {
        self.parents.get(&path_key(consumer)).map(String::as_str)
    }

    /// Whether `path` is a known template.
    pub fn is_template(&self, path: &Path) -> bool {
        self.nodes
            .contains_key(&(NodeKind::Template, path_key(path)))
            || self.item_kind(path) == Some(&ItemKind::Template)
    }

    /// Drop a file's produced-entity record, returning it.
    pub fn remove_file(&mut self, path: &Path) -> Option<BTreeSet<String>> {
        self.nodes
            .remove(&(NodeKind::File, path_key(path)))
            .map(|node| node.dependents)
    }

    /// Remove every template and folder edge pointing at `consumer`.
    pub fn forget_consumer(&mut self, consumer: &Path) {
        let consumer = path_key(consumer);
        self.parents.remove(&consumer);

        for ((kind, _), node) in self.nodes.iter_mut() {
            if matches!(kind, NodeKind::Template | NodeKind::Folder) {
                node.dependents.remove(&consumer);
            }
        }
    }

    /// Registered folders and their item kinds.
    pub fn folders(&self) -> impl Iterator<Item = (&str, &ItemKind)> {
        self.folder_kinds
            .iter()
            .map(|(folder, kind)| (folder.as_str(), kind))
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Forget everything, ahead of a full rebuild.
    pub fn clear(&mut self) {
        self.nodes.clear();
        self.folder_kinds.clear();
        self.metadata.clear();
        self.metadata_reverse.clear();
        self.parents.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use std::path::PathBuf;

    struct Page {
        source: PathBuf,
        ids: Vec<String>,
    }

    impl Trackable for Page {
        fn source_path(&self) -> &Path {
            &self.source
        }

        fn produced_ids(&self) -> Vec<String> {
            self.ids.clone()
        }
    }

    fn page(source: &str, ids: &[&str]) -> Page {
        Page {
            source: PathBuf::from(source),
            ids: ids.iter().map(|id| id.to_string()).collect(),
        }
    }

    #[test]
    fn normalises_path_keys() {
        assert_eq!(path_key(Path::new("./_posts/hello.md")), "_posts/hello.md");
        assert_eq!(path_key(Path::new("_posts/")), "_posts");
        assert_eq!(path_key(Path::new("a/./b")), "a/b");
    }

    #[test]
    fn absolute_paths_are_made_relative_to_a_relative_root() {
        let cwd = env::current_dir().unwrap();

        assert_eq!(
            site_relative(Path::new("."), &cwd.join("./_pages/about.html")),
            PathBuf::from("_pages/about.html")
        );
        assert_eq!(
            site_relative(Path::new("site"), &cwd.join("site/_posts/a.md")),
            PathBuf::from("_posts/a.md")
        );
        assert_eq!(
            site_relative(Path::new("."), Path::new("_pages/about.html")),
            PathBuf::from("_pages/about.html")
        );
    }

    #[test]
    fn symlinked_root_matches_canonical_paths() {
        let temp = tempfile::tempdir().unwrap();
        let root = temp.path().canonicalize().unwrap();
        fs::create_dir_all(root.join("_pages")).unwrap();
        fs::write(root.join("_pages/about.html"), "").unwrap();

        assert_eq!(
            site_relative(temp.path(), &root.join("_pages/about.html")),
            PathBuf::from("_pages/about.html")
        );
        assert_eq!(
            site_relative(&root, &temp.path().join("_pages/removed.html")),
            PathBuf::from("_pages/removed.html")
        );
    }

    #[test]
    fn file_under_folder_reports_folder_kind() {
        let mut graph = DependencyGraph::new();
        graph.register_folder(Path::new("_posts"), ItemKind::Content("posts".into()));
        graph.register_file(&page("_posts/hello.md", &["_posts/hello.md"]));

        assert_eq!(
            graph.item_kind(Path::new("_posts/hello.md")),
            Some(&ItemKind::Content("posts".into()))
        );
        assert_eq!(graph.folder_of(Path::new("_posts/hello.md")), Some("_posts"));
        assert_eq!(graph.item_kind(Path::new("_postsx/hello.md")), None);
    }

    #[test]
    fn innermost_folder_wins() {
        let mut graph = DependencyGraph::new();
        graph.register_folder(Path::new("_data"), ItemKind::Data("all".into()));
        graph.register_folder(Path::new("_data/meals"), ItemKind::Data("meals".into()));

        assert_eq!(
            graph.item_kind(Path::new("_data/meals/lunch.yml")),
            Some(&ItemKind::Data("meals".into()))
        );
    }

    #[test]
    fn metadata_lookup_both_directions() {
        let mut graph = DependencyGraph::new();
        graph.register_metadata("collection.posts", "_posts");

        assert_eq!(graph.metadata("collection.posts"), Some("_posts"));
        assert_eq!(graph.metadata_key("_posts"), Some("collection.posts"));

        graph.register_metadata("collection.posts", "_articles");

        assert_eq!(graph.metadata_key("_posts"), None);
        assert_eq!(graph.metadata_key("_articles"), Some("collection.posts"));
    }

    #[test]
    fn reregistering_metadata_keeps_other_keys_reverse_entry() {
        let mut graph = DependencyGraph::new();
        graph.register_metadata("collection.posts", "_posts");
        graph.register_metadata("collection.news", "_posts");

        graph.register_metadata("collection.posts", "_articles");

        assert_eq!(graph.metadata_key("_posts"), Some("collection.news"));
        assert_eq!(graph.metadata_key("_articles"), Some("collection.posts"));
    }

    #[test]
    fn reregistering_a_file_overwrites() {
        let mut graph = DependencyGraph::new();
        graph.register_file(&page("_pages/menu.html", &["menu#0", "menu#1"]));
        graph.register_file(&page("_pages/menu.html", &["menu#0"]));

        let produced = graph.produced_by(Path::new("_pages/menu.html")).unwrap();
        assert_eq!(produced.iter().collect::<Vec<_>>(), vec!["menu#0"]);
        assert_eq!(graph.len(), 1);
    }

    #[test]
    fn records_template_edges() {
        let mut graph = DependencyGraph::new();
        graph.register_template_extend(Path::new("_layouts/base.html"), Path::new("_layouts/post.html"));
        graph.register_template_extend(Path::new("_layouts/post.html"), Path::new("_pages/blog.html"));
        graph.register_template_include(Path::new("_includes/nav.html"), Path::new("_layouts/base.html"));

        assert_eq!(
            graph.parent_template(Path::new("_pages/blog.html")),
            Some("_layouts/post.html")
        );
        assert!(graph
            .template_dependents(Path::new("_includes/nav.html"))
            .unwrap()
            .contains("_layouts/base.html"));
        assert!(graph.is_template(Path::new("_layouts/base.html")));
    }

    #[test]
    fn changing_parent_drops_old_edge() {
        let mut graph = DependencyGraph::new();
        graph.register_template_extend(Path::new("a.html"), Path::new("page.html"));
        graph.register_template_extend(Path::new("b.html"), Path::new("page.html"));

        assert!(graph.template_dependents(Path::new("a.html")).unwrap().is_empty());
        assert!(graph
            .template_dependents(Path::new("b.html"))
            .unwrap()
            .contains("page.html"));
    }

    #[test]
    fn forget_consumer_removes_edges() {
        let mut graph = DependencyGraph::new();
        graph.register_folder(Path::new("_posts"), ItemKind::Content("posts".into()));
        graph.register_folder_consumer(Path::new("_posts"), Path::new("_pages/blog.html"));
        graph.register_template_include(Path::new("nav.html"), Path::new("_pages/blog.html"));

        graph.forget_consumer(Path::new("_pages/blog.html"));

        assert!(graph.folder_consumers(Path::new("_posts")).unwrap().is_empty());
        assert!(graph.template_dependents(Path::new("nav.html")).unwrap().is_empty());
    }

    #[test]
    fn registering_folder_again_resets_consumers() {
        let mut graph = DependencyGraph::new();
        graph.register_folder(Path::new("_posts"), ItemKind::Content("posts".into()));
        graph.register_folder_consumer(Path::new("_posts"), Path::new("_pages/blog.html"));

        graph.register_folder(Path::new("_posts"), ItemKind::Content("posts".into()));

        assert!(graph.folder_consumers(Path::new("_posts")).unwrap().is_empty());
    }

    #[test]
    fn clear_empties_graph() {
        let mut graph = DependencyGraph::new();
        graph.register_folder(Path::new("_posts"), ItemKind::Content("posts".into()));
        graph.register_metadata("collection.posts", "_posts");

        graph.clear();

        assert!(graph.is_empty());
        assert_eq!(graph.metadata("collection.posts"), None);
        assert_eq!(graph.folders().count(), 0);
    }
}
