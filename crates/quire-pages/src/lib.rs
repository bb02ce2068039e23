//! Page views for quire sites.
//!
//! Turns front matter into addressable output pages: resolves permalinks and
//! target paths, models static, dynamic and repeating pages, and compiles a
//! whole site while recording its dependency graph.

pub mod builder;
pub mod context;
pub mod page_view;
pub mod permalink;
pub mod render;
pub mod repeatable;

pub use builder::{BuildError, Collision, NamedFolder, Site, SiteCompiler, SiteConfig};
pub use context::SiteContext;
pub use page_view::{ItemOutput, PageError, PageId, PageKind, PageView, KIND_KEY};
pub use permalink::{
    default_permalink, resolve, sanitize, target_path, Output, Permalink, PermalinkError,
    Resolution, Resolver, INDEX_FILE,
};
pub use render::{render_contexts, ItemContext, RenderContext};
pub use repeatable::{ItemId, Namespace, Repeatable, RepeatableItem};
