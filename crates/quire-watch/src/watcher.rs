//! File watching.
//!
//! notify delivers raw events on its own thread; a forwarding thread batches
//! them until the tree has been quiet for the debounce window, then hands the
//! batch to async code through a tokio channel.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::mpsc;
use std::time::{Duration, Instant};

use notify::{RecommendedWatcher, RecursiveMode, Watcher};
use serde::Serialize;
use tokio::sync::mpsc as async_mpsc;

/// Default quiet period before a batch of changes is emitted.
pub const DEFAULT_DEBOUNCE: Duration = Duration::from_millis(300);

/// What happened to a path.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ChangeKind {
    Created,
    Modified,
    Removed,
}

/// A single changed path.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Change {
    pub path: PathBuf,
    pub kind: ChangeKind,
}

impl Change {
    pub fn new(path: impl Into<PathBuf>, kind: ChangeKind) -> Self {
        Self {
            path: path.into(),
            kind,
        }
    }
}

/// Errors that can occur while setting up a watcher.
#[derive(Debug, thiserror::Error)]
pub enum WatchError {
    #[error("Failed to start file watcher: {0}")]
    Notify(#[from] notify::Error),

    #[error("Nothing to watch: none of the configured paths exist")]
    NothingToWatch,
}

/// File watcher emitting debounced batches of changes.
pub struct FileWatcher {
    _watcher: RecommendedWatcher,
}

impl FileWatcher {
    /// Watch `paths` recursively.
    ///
    /// Returns the watcher (keep it alive) and a channel of change batches.
    pub fn new(
        paths: &[PathBuf],
        debounce: Duration,
    ) -> Result<(Self, async_mpsc::Receiver<Vec<Change>>), WatchError> {
        let (sync_tx, sync_rx) = mpsc::channel();
        let (async_tx, async_rx) = async_mpsc::channel(16);

        let mut watcher = notify::recommended_watcher(move |res: Result<notify::Event, _>| {
            if let Ok(event) = res {
                let _ = sync_tx.send(event);
            }
        })?;

        let mut watched = 0;
        for path in paths {
            if path.exists() {
                watcher.watch(path, RecursiveMode::Recursive)?;
                watched += 1;
            } else {
                tracing::debug!("Not watching missing path {}", path.display());
            }
        }
        if watched == 0 {
            return Err(WatchError::NothingToWatch);
        }

        std::thread::spawn(move || {
            let mut debouncer = Debouncer::new(debounce);

            loop {
                match sync_rx.recv_timeout(debouncer.timeout()) {
                    Ok(event) => debouncer.add(event),
                    Err(mpsc::RecvTimeoutError::Timeout) => {}
                    Err(mpsc::RecvTimeoutError::Disconnected) => break,
                }

                if debouncer.ready() && async_tx.blocking_send(debouncer.take()).is_err() {
                    break;
                }
            }

            tracing::debug!("File watcher stopped");
        });

        Ok((Self { _watcher: watcher }, async_rx))
    }
}

/// Collects changes until no new event arrived for the debounce window.
struct Debouncer {
    window: Duration,
    pending: BTreeMap<PathBuf, ChangeKind>,
    last_event: Option<Instant>,
}

impl Debouncer {
    fn new(window: Duration) -> Self {
        Self {
            window,
            pending: BTreeMap::new(),
            last_event: None,
        }
    }

    fn add(&mut self, event: notify::Event) {
        let Some(kind) = classify_event(&event.kind) else {
            return;
        };

        for path in event.paths {
            if is_temp_file(&path) {
                continue;
            }

            // A file created within the window is still new to consumers
            let kind = match (self.pending.get(&path), kind) {
                (Some(ChangeKind::Created), ChangeKind::Modified) => ChangeKind::Created,
                _ => kind,
            };
            self.pending.insert(path, kind);
        }

        self.last_event = Some(Instant::now());
    }

    fn ready(&self) -> bool {
        !self.pending.is_empty()
            && self
                .last_event
                .is_some_and(|t| t.elapsed() >= self.window)
    }

    fn take(&mut self) -> Vec<Change> {
        self.last_event = None;
        std::mem::take(&mut self.pending)
            .into_iter()
            .map(|(path, kind)| Change { path, kind })
            .collect()
    }

    fn timeout(&self) -> Duration {
        if self.pending.is_empty() {
            Duration::from_secs(60)
        } else {
            self.window
        }
    }
}

/// Map a notify event kind onto a change kind.
fn classify_event(kind: &notify::EventKind) -> Option<ChangeKind> {
    use notify::event::ModifyKind;
    use notify::EventKind;

    match kind {
        EventKind::Create(_) => Some(ChangeKind::Created),
        EventKind::Remove(_) => Some(ChangeKind::Removed),
        EventKind::Modify(ModifyKind::Metadata(_)) => None,
        EventKind::Modify(_) => Some(ChangeKind::Modified),
        _ => None,
    }
}

/// Editor swap and backup files.
fn is_temp_file(path: &Path) -> bool {
    let name = path.file_name().and_then(|n| n.to_str()).unwrap_or("");
    let ext = path.extension().and_then(|e| e.to_str()).unwrap_or("");

    matches!(ext, "bak" | "swp" | "swo" | "tmp") || name.ends_with('~') || name.starts_with('.')
}

#[cfg(test)]
mod tests {
    use super::*;
    use notify::event::{CreateKind, DataChange, EventKind, MetadataKind, ModifyKind};
    use pretty_assertions::assert_eq;
    use std::fs;
    use tempfile::tempdir;

    fn event(kind: EventKind, path: &str) -> notify::Event {
        notify::Event::new(kind).add_path(PathBuf::from(path))
    }

    #[test]
    fn classifies_events() {
        assert_eq!(
            classify_event(&EventKind::Create(CreateKind::File)),
            Some(ChangeKind::Created)
        );
        assert_eq!(
            classify_event(&EventKind::Modify(ModifyKind::Data(DataChange::Content))),
            Some(ChangeKind::Modified)
        );
        assert_eq!(
            classify_event(&EventKind::Modify(ModifyKind::Metadata(MetadataKind::AccessTime))),
            None
        );
    }

    #[test]
    fn debouncer_batches_and_skips_temp_files() {
        let mut debouncer = Debouncer::new(Duration::ZERO);

        debouncer.add(event(EventKind::Create(CreateKind::File), "site/_posts/a.md"));
        debouncer.add(event(
            EventKind::Modify(ModifyKind::Data(DataChange::Content)),
            "site/_posts/a.md",
        ));
        debouncer.add(event(
            EventKind::Modify(ModifyKind::Data(DataChange::Content)),
            "site/_posts/.a.md.swp",
        ));

        assert!(debouncer.ready());
        assert_eq!(
            debouncer.take(),
            vec![Change::new("site/_posts/a.md", ChangeKind::Created)]
        );
        assert!(!debouncer.ready());
    }

    #[test]
    fn debouncer_waits_for_quiet_window() {
        let mut debouncer = Debouncer::new(Duration::from_secs(60));

        debouncer.add(event(EventKind::Create(CreateKind::File), "a.md"));

        assert!(!debouncer.ready());
        assert_eq!(debouncer.timeout(), Duration::from_secs(60));
    }

    #[test]
    fn missing_paths_are_an_error() {
        let temp = tempdir().unwrap();

        let result = FileWatcher::new(&[temp.path().join("nope")], DEFAULT_DEBOUNCE);

        assert!(matches!(result, Err(WatchError::NothingToWatch)));
    }

    #[tokio::test]
    async fn watches_file_changes() {
        let temp = tempdir().unwrap();
        let test_file = temp.path().join("post.md");

        let (watcher, mut rx) =
            FileWatcher::new(&[temp.path().to_path_buf()], Duration::from_millis(50)).unwrap();

        // Give inotify time to set up
        tokio::time::sleep(Duration::from_millis(100)).await;

        fs::write(&test_file, "# Created").unwrap();

        let batch = tokio::time::timeout(Duration::from_secs(3), rx.recv()).await;

        drop(watcher);

        let batch = batch
            .expect("timeout waiting for file watch event")
            .expect("channel should not be closed");
        assert!(batch.iter().any(|change| change.path.ends_with("post.md")));
    }
}
