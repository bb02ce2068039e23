//! Dependency tracking for incremental site builds.
//!
//! Records which folders, files and templates produce or influence which
//! compiled entities, so a watcher can recompile only what a change affects.

pub mod graph;
pub mod templates;

pub use graph::{
    path_key, site_relative, DependencyGraph, DependencyNode, ItemKind, NodeKind, Trackable,
};
pub use templates::{
    register_references, scan_source, scan_templates, ScanError, TemplateRef, TemplateRelation,
};
