//! Watch mode for quire sites.
//!
//! Turns file system events into debounced batches of changes and plans the
//! smallest rebuild that covers them using the site's dependency graph.

pub mod invalidation;
pub mod watcher;

pub use invalidation::{plan_rebuild, template_closure, RebuildPlan, WatchConfig};
pub use watcher::{Change, ChangeKind, FileWatcher, WatchError, DEFAULT_DEBOUNCE};
