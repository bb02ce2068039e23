//! Deciding what to recompile after a batch of changes.
//!
//! The dependency graph only stores direct edges. This module walks them:
//! a template change reaches every page extending or including it, directly
//! or through other templates, and an item change reaches the dynamic pages
//! consuming its folder.

use std::collections::{BTreeSet, HashSet, VecDeque};
use std::path::{Path, PathBuf};

use quire_graph::{site_relative, DependencyGraph, ItemKind};

use crate::watcher::{Change, ChangeKind};

/// Settings for rebuild planning.
#[derive(Debug, Clone)]
pub struct WatchConfig {
    /// Site root; changes are matched against the graph relative to it
    pub root: PathBuf,

    /// Files whose change invalidates everything (e.g. `quire.toml`)
    pub config_files: Vec<PathBuf>,
}

impl Default for WatchConfig {
    fn default() -> Self {
        Self {
            root: PathBuf::from("."),
            config_files: vec![PathBuf::from("quire.toml")],
        }
    }
}

/// What a batch of changes requires.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RebuildPlan {
    /// Throw the graph away and compile from scratch
    Full { reason: String },

    /// Reload `sources`; `outputs` lists the entity ids affected
    Incremental {
        sources: BTreeSet<PathBuf>,
        outputs: BTreeSet<String>,
    },

    /// None of the changes touch the site
    Nothing,
}

/// Plan the rebuild for a batch of changes.
pub fn plan_rebuild(
    graph: &DependencyGraph,
    changes: &[Change],
    config: &WatchConfig,
) -> RebuildPlan {
    let mut sources = BTreeSet::new();
    let mut outputs = BTreeSet::new();

    for change in changes {
        let relative = site_relative(&config.root, &change.path);
        let relative = relative.as_path();

        if config.config_files.iter().any(|file| file == relative) {
            return RebuildPlan::Full {
                reason: format!("{} changed", relative.display()),
            };
        }

        match graph.item_kind(relative) {
            Some(ItemKind::Template) => {
                let has_dependents = graph
                    .template_dependents(relative)
                    .is_some_and(|dependents| !dependents.is_empty());

                // Without recorded edges there is no telling who uses it
                if !has_dependents && change.kind != ChangeKind::Removed {
                    return RebuildPlan::Full {
                        reason: format!("{} has no recorded dependents", relative.display()),
                    };
                }

                sources.insert(relative.to_path_buf());
                for consumer in template_closure(graph, relative) {
                    outputs.extend(produced_ids(graph, Path::new(&consumer)));
                    sources.insert(PathBuf::from(consumer));
                }
            }
            Some(ItemKind::PageView) => {
                sources.insert(relative.to_path_buf());
                outputs.extend(produced_ids(graph, relative));
            }
            Some(ItemKind::Content(_)) | Some(ItemKind::Data(_)) => {
                sources.insert(relative.to_path_buf());
                outputs.extend(produced_ids(graph, relative));

                let consumers = graph
                    .folder_of(relative)
                    .and_then(|folder| graph.folder_consumers(Path::new(folder)));
                for consumer in consumers.into_iter().flatten() {
                    outputs.extend(produced_ids(graph, Path::new(consumer)));
                }
            }
            None => {
                tracing::debug!("Change outside the site: {}", relative.display());
            }
        }
    }

    if sources.is_empty() {
        RebuildPlan::Nothing
    } else {
        RebuildPlan::Incremental { sources, outputs }
    }
}

/// Every non-template consumer reachable from `template`.
///
/// Templates are followed transitively; a visited set keeps extend or
/// include cycles from looping.
pub fn template_closure(graph: &DependencyGraph, template: &Path) -> BTreeSet<String> {
    let mut visited: HashSet<String> = HashSet::new();
    let mut queue: VecDeque<String> = VecDeque::new();
    let mut consumers = BTreeSet::new();

    queue.push_back(quire_graph::path_key(template));

    while let Some(current) = queue.pop_front() {
        if !visited.insert(current.clone()) {
            continue;
        }

        let Some(dependents) = graph.template_dependents(Path::new(&current)) else {
            continue;
        };

        for dependent in dependents {
            if graph.is_template(Path::new(dependent)) {
                queue.push_back(dependent.clone());
            } else {
                consumers.insert(dependent.clone());
            }
        }
    }

    consumers
}

fn produced_ids(graph: &DependencyGraph, path: &Path) -> Vec<String> {
    graph
        .produced_by(path)
        .map(|ids| ids.iter().cloned().collect())
        .unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use quire_graph::Trackable;

    struct Produced {
        source: PathBuf,
        ids: Vec<String>,
    }

    impl Trackable for Produced {
        fn source_path(&self) -> &Path {
            &self.source
        }

        fn produced_ids(&self) -> Vec<String> {
            self.ids.clone()
        }
    }

    fn file(graph: &mut DependencyGraph, source: &str, ids: &[&str]) {
        graph.register_file(&Produced {
            source: PathBuf::from(source),
            ids: ids.iter().map(|id| id.to_string()).collect(),
        });
    }

    fn site_graph() -> DependencyGraph {
        let mut graph = DependencyGraph::new();
        graph.register_folder(Path::new("_pages"), ItemKind::PageView);
        graph.register_folder(Path::new("_posts"), ItemKind::Content("posts".into()));
        graph.register_folder(Path::new("_layouts"), ItemKind::Template);

        file(&mut graph, "_pages/about.html", &["_pages/about.html"]);
        file(&mut graph, "_pages/post.html", &["_pages/post.html"]);
        file(&mut graph, "_posts/a.md", &["_posts/a.md"]);
        graph.register_folder_consumer(Path::new("_posts"), Path::new("_pages/post.html"));

        graph.register_template(Path::new("_layouts/base.html"));
        graph.register_template_extend(Path::new("_layouts/base.html"), Path::new("_layouts/post.html"));
        graph.register_template_extend(Path::new("_layouts/post.html"), Path::new("_pages/post.html"));
        graph.register_template_extend(Path::new("_layouts/base.html"), Path::new("_pages/about.html"));
        graph.register_template(Path::new("_layouts/unused.html"));

        graph
    }

    fn config() -> WatchConfig {
        WatchConfig {
            root: PathBuf::from("/site"),
            ..Default::default()
        }
    }

    #[test]
    fn base_template_reaches_every_page() {
        let graph = site_graph();

        let plan = plan_rebuild(
            &graph,
            &[Change::new("/site/_layouts/base.html", ChangeKind::Modified)],
            &config(),
        );

        let RebuildPlan::Incremental { sources, outputs } = plan else {
            panic!("expected an incremental plan, got {:?}", plan);
        };
        assert_eq!(
            sources,
            BTreeSet::from([
                PathBuf::from("_layouts/base.html"),
                PathBuf::from("_pages/about.html"),
                PathBuf::from("_pages/post.html"),
            ])
        );
        assert_eq!(
            outputs,
            BTreeSet::from(["_pages/about.html".to_string(), "_pages/post.html".to_string()])
        );
    }

    #[test]
    fn item_change_reaches_folder_consumers() {
        let graph = site_graph();

        let plan = plan_rebuild(
            &graph,
            &[Change::new("/site/_posts/a.md", ChangeKind::Modified)],
            &config(),
        );

        assert_eq!(
            plan,
            RebuildPlan::Incremental {
                sources: BTreeSet::from([PathBuf::from("_posts/a.md")]),
                outputs: BTreeSet::from(["_posts/a.md".to_string(), "_pages/post.html".to_string()]),
            }
        );
    }

    #[test]
    fn config_change_is_a_full_rebuild() {
        let graph = site_graph();

        let plan = plan_rebuild(
            &graph,
            &[
                Change::new("/site/_posts/a.md", ChangeKind::Modified),
                Change::new("/site/quire.toml", ChangeKind::Modified),
            ],
            &config(),
        );

        assert!(matches!(plan, RebuildPlan::Full { .. }));
    }

    #[test]
    fn template_without_dependents_is_a_full_rebuild() {
        let graph = site_graph();

        let plan = plan_rebuild(
            &graph,
            &[Change::new("/site/_layouts/unused.html", ChangeKind::Modified)],
            &config(),
        );

        assert!(matches!(plan, RebuildPlan::Full { .. }));
    }

    #[test]
    fn unrelated_changes_do_nothing() {
        let graph = site_graph();

        let plan = plan_rebuild(
            &graph,
            &[Change::new("/site/README.md", ChangeKind::Modified)],
            &config(),
        );

        assert_eq!(plan, RebuildPlan::Nothing);
    }

    #[test]
    fn absolute_event_paths_match_a_relative_root() {
        let graph = site_graph();
        let cwd = std::env::current_dir().unwrap();
        let config = WatchConfig::default();

        let plan = plan_rebuild(
            &graph,
            &[Change::new(cwd.join("./_pages/about.html"), ChangeKind::Created)],
            &config,
        );
        assert_eq!(
            plan,
            RebuildPlan::Incremental {
                sources: BTreeSet::from([PathBuf::from("_pages/about.html")]),
                outputs: BTreeSet::from(["_pages/about.html".to_string()]),
            }
        );

        let plan = plan_rebuild(
            &graph,
            &[Change::new(cwd.join("quire.toml"), ChangeKind::Modified)],
            &config,
        );
        assert!(matches!(plan, RebuildPlan::Full { .. }));
    }

    #[test]
    fn template_cycles_terminate() {
        let mut graph = DependencyGraph::new();
        graph.register_folder(Path::new("_layouts"), ItemKind::Template);
        graph.register_template_include(Path::new("_layouts/a.html"), Path::new("_layouts/b.html"));
        graph.register_template_include(Path::new("_layouts/b.html"), Path::new("_layouts/a.html"));
        graph.register_template_include(Path::new("_layouts/b.html"), Path::new("_pages/x.html"));

        let consumers = template_closure(&graph, Path::new("_layouts/a.html"));

        assert_eq!(consumers, BTreeSet::from(["_pages/x.html".to_string()]));
    }
}
