use notify::{Event as NotifyEvent, EventKind, RecursiveMode, Watcher};
use parking_lot::RwLock;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{info, warn};

use guidepost_core::Result;

use crate::index::CorpusIndex;

/// Shared handle to the current corpus generation.
///
/// Readers take cheap `Arc` snapshots and keep them for the duration of a
/// turn; `reload` builds and validates a complete new index before swapping
/// the pointer, so a half-built index is never observable.
#[derive(Clone)]
pub struct CorpusStore {
    current: Arc<RwLock<Arc<CorpusIndex>>>,
    root: PathBuf,
}

impl CorpusStore {
    /// Load the corpus at `root` and wrap it for shared access.
    pub fn open(root: &Path) -> Result<Self> {
        let index = CorpusIndex::load(root)?;
        Ok(Self {
            current: Arc::new(RwLock::new(Arc::new(index))),
            root: root.to_path_buf(),
        })
    }

    /// Wrap an already-built index. Reload and watch are unavailable in
    /// any useful sense without a root directory; used by fixtures and
    /// programmatic corpora.
    pub fn from_index(index: CorpusIndex) -> Self {
        let root = index.root().to_path_buf();
        Self {
            current: Arc::new(RwLock::new(Arc::new(index))),
            root,
        }
    }

    /// The current generation. Callers hold this for a whole turn so the
    /// corpus cannot change under their feet.
    pub fn snapshot(&self) -> Arc<CorpusIndex> {
        Arc::clone(&self.current.read())
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Rebuild the index from disk and swap it in atomically. A corpus
    /// that fails to load keeps the previous generation serving.
    pub fn reload(&self) -> Result<()> {
        let index = CorpusIndex::load(&self.root)?;
        let nodes = index.len();
        *self.current.write() = Arc::new(index);
        info!(nodes, "corpus hot-reloaded");
        Ok(())
    }

    /// Start a background file watcher that triggers `reload()` when any
    /// node file changes. Returns the watcher handle, which must be kept
    /// alive for watching to continue.
    pub fn watch(&self) -> Result<notify::RecommendedWatcher> {
        let store = self.clone();
        info!(root = %self.root.display(), "starting corpus file watcher");

        let mut watcher =
            notify::recommended_watcher(move |res: std::result::Result<NotifyEvent, notify::Error>| {
                match res {
                    Ok(event) => {
                        let relevant = matches!(
                            event.kind,
                            EventKind::Modify(_) | EventKind::Create(_) | EventKind::Remove(_)
                        ) && event
                            .paths
                            .iter()
                            .any(|p| p.extension().is_some_and(|e| e == "md"));
                        if !relevant {
                            return;
                        }
                        match store.reload() {
                            Ok(()) => {}
                            Err(e) => {
                                warn!(error = %e, "corpus has errors, keeping current generation")
                            }
                        }
                    }
                    Err(e) => warn!(error = %e, "corpus watcher error"),
                }
            })
            .map_err(|e| {
                guidepost_core::GuidepostError::CorpusUnreadable(format!(
                    "failed to create corpus watcher: {e}"
                ))
            })?;

        watcher
            .watch(&self.root, RecursiveMode::Recursive)
            .map_err(|e| {
                guidepost_core::GuidepostError::CorpusUnreadable(format!(
                    "failed to watch {}: {}",
                    self.root.display(),
                    e
                ))
            })?;

        Ok(watcher)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use guidepost_core::NodeId;

    #[test]
    fn snapshot_survives_reload() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(
            dir.path().join("start.md"),
            "---\nid: start\ntier: core\nhalting: true\n---\nEntry.",
        )
        .unwrap();

        let store = CorpusStore::open(dir.path()).unwrap();
        let before = store.snapshot();
        assert_eq!(before.len(), 1);

        std::fs::write(
            dir.path().join("extra.md"),
            "---\nid: extra\ntier: primary\ntriggers: [extra]\nhalting: true\n---\nMore.",
        )
        .unwrap();
        store.reload().unwrap();

        // Old snapshot is unchanged; new snapshot sees the new node.
        assert_eq!(before.len(), 1);
        let after = store.snapshot();
        assert_eq!(after.len(), 2);
        assert!(after.get(&NodeId::from("extra")).is_some());
    }

    #[test]
    fn failed_reload_keeps_old_generation() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(
            dir.path().join("start.md"),
            "---\nid: start\ntier: core\nhalting: true\n---\nEntry.",
        )
        .unwrap();

        let store = CorpusStore::open(dir.path()).unwrap();
        std::fs::write(dir.path().join("broken.md"), "not a node file").unwrap();

        assert!(store.reload().is_err());
        assert_eq!(store.snapshot().len(), 1);
    }
}
