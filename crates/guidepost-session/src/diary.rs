use parking_lot::RwLock;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::debug;

use guidepost_core::{DiaryEntry, Result, SessionId};

use crate::store::SessionStore;

/// Append-only log of hypotheses and evidence for long investigations.
///
/// One diary per session, opened lazily by the executor once a complexity
/// threshold is crossed, and reused across turns until the session closes.
/// Prior entries are never mutated or deleted — the integrity of the
/// investigative trail matters more than storage economy.
#[derive(Clone)]
pub struct InvestigationDiary {
    entries: Arc<RwLock<HashMap<SessionId, Vec<DiaryEntry>>>>,
    store: Option<Arc<SessionStore>>,
}

impl InvestigationDiary {
    pub fn new() -> Self {
        Self {
            entries: Arc::new(RwLock::new(HashMap::new())),
            store: None,
        }
    }

    pub fn with_store(store: Arc<SessionStore>) -> Self {
        Self {
            entries: Arc::new(RwLock::new(HashMap::new())),
            store: Some(store),
        }
    }

    /// Ensure a diary exists for the session, restoring persisted entries
    /// on first open.
    pub fn open(&self, session: SessionId) -> Result<()> {
        let mut entries = self.entries.write();
        if entries.contains_key(&session) {
            return Ok(());
        }
        let restored = match self.store {
            Some(ref store) => store.read_diary(session)?,
            None => Vec::new(),
        };
        debug!(session = %session, restored = restored.len(), "diary opened");
        entries.insert(session, restored);
        Ok(())
    }

    pub fn is_open(&self, session: SessionId) -> bool {
        self.entries.read().contains_key(&session)
    }

    pub fn append(&self, session: SessionId, entry: DiaryEntry) -> Result<()> {
        if let Some(ref store) = self.store {
            store.append_diary(session, &entry)?;
        }
        self.entries
            .write()
            .entry(session)
            .or_default()
            .push(entry);
        Ok(())
    }

    /// All entries in append order. The executor re-injects these when a
    /// long investigation resumes after an idle gap.
    pub fn read(&self, session: SessionId) -> Vec<DiaryEntry> {
        self.entries
            .read()
            .get(&session)
            .cloned()
            .unwrap_or_default()
    }
}

impl Default for InvestigationDiary {
    fn default() -> Self {
        Self::new()
    }
}
