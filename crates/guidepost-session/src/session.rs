use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::{Mutex as TokioMutex, RwLock};
use tracing::{debug, info};
use uuid::Uuid;

use guidepost_core::{GuidepostError, NodeId, Result, SessionId, Tier};

use crate::store::SessionStore;

/// One frame of the workflow stack: an active node plus the index of the
/// next step to execute when control returns to it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Frame {
    pub node: NodeId,
    pub step: usize,
}

impl Frame {
    pub fn new(node: NodeId) -> Self {
        Self { node, step: 0 }
    }
}

/// A memoized discovery result with explicit expiry. Expired entries are
/// treated as absent on read; there is no background sweep.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheEntry {
    pub value: String,
    pub expires_at: DateTime<Utc>,
}

/// One active conversation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Session {
    pub id: SessionId,
    pub created_at: DateTime<Utc>,
    pub last_active: DateTime<Utc>,
    /// Resolved execution context. Set-once: a second bind fails until an
    /// explicit reset, so a workflow cannot silently switch context.
    pub profile: Option<HashMap<String, String>>,
    pub cache: HashMap<String, CacheEntry>,
    /// Nested Load calls, innermost last.
    pub stack: Vec<Frame>,
    /// Last resolved tier; a tie-break hint for the matcher, never a filter.
    pub tier_bias: Option<Tier>,
    /// An Advanced-tier match awaiting user confirmation.
    pub pending_confirmation: Option<NodeId>,
    pub diary_open: bool,
    pub active: bool,
    pub turn_count: usize,
}

impl Session {
    pub fn new() -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            created_at: now,
            last_active: now,
            profile: None,
            cache: HashMap::new(),
            stack: Vec::new(),
            tier_bias: None,
            pending_confirmation: None,
            diary_open: false,
            active: true,
            turn_count: 0,
        }
    }
}

impl Default for Session {
    fn default() -> Self {
        Self::new()
    }
}

/// Manages all active sessions.
///
/// Different sessions are fully independent; within one session, turns are
/// serialized by the per-session run lock the executor holds end to end.
#[derive(Clone)]
pub struct SessionManager {
    sessions: Arc<RwLock<HashMap<SessionId, Session>>>,
    /// Per-session run locks — one executing turn per session at a time.
    run_locks: Arc<RwLock<HashMap<SessionId, Arc<TokioMutex<()>>>>>,
    store: Option<Arc<SessionStore>>,
}

impl Default for SessionManager {
    fn default() -> Self {
        Self::new()
    }
}

impl SessionManager {
    pub fn new() -> Self {
        Self {
            sessions: Arc::new(RwLock::new(HashMap::new())),
            run_locks: Arc::new(RwLock::new(HashMap::new())),
            store: None,
        }
    }

    /// Attach a persistence store and restore the sessions it holds.
    pub async fn with_store(store: Arc<SessionStore>) -> Result<Self> {
        let manager = Self {
            sessions: Arc::new(RwLock::new(HashMap::new())),
            run_locks: Arc::new(RwLock::new(HashMap::new())),
            store: Some(Arc::clone(&store)),
        };
        let restored = store.load_all()?;
        let count = restored.len();
        {
            let mut sessions = manager.sessions.write().await;
            for session in restored {
                sessions.insert(session.id, session);
            }
        }
        if count > 0 {
            info!(count, "restored sessions from store");
        }
        Ok(manager)
    }

    pub async fn create(&self) -> Result<SessionId> {
        let session = Session::new();
        let id = session.id;
        self.sessions.write().await.insert(id, session);
        debug!(session = %id, "session created");
        self.checkpoint(id).await?;
        Ok(id)
    }

    pub async fn get(&self, id: SessionId) -> Option<Session> {
        self.sessions.read().await.get(&id).cloned()
    }

    pub async fn list(&self) -> Vec<Session> {
        let mut sessions: Vec<_> = self.sessions.read().await.values().cloned().collect();
        sessions.sort_by_key(|s| s.created_at);
        sessions
    }

    pub async fn close(&self, id: SessionId) -> Result<()> {
        self.mutate(id, |s| {
            s.active = false;
            Ok(())
        })
        .await?;
        self.checkpoint(id).await
    }

    /// Remove sessions idle longer than `max_idle`. Returns how many.
    pub async fn expire_idle(&self, max_idle: Duration) -> usize {
        let cutoff = Utc::now() - max_idle;
        let mut sessions = self.sessions.write().await;
        let before = sessions.len();
        sessions.retain(|_, s| s.active && s.last_active > cutoff);
        before - sessions.len()
    }

    // ── Profile ────────────────────────────────────────────────

    /// Bind the execution profile. Fails with `ProfileLocked` if already
    /// bound; call [`reset_profile`](Self::reset_profile) first to rebind.
    pub async fn set_profile(
        &self,
        id: SessionId,
        profile: HashMap<String, String>,
    ) -> Result<()> {
        self.mutate(id, |s| {
            if s.profile.is_some() {
                return Err(GuidepostError::ProfileLocked(id.to_string()));
            }
            s.profile = Some(profile);
            Ok(())
        })
        .await
    }

    pub async fn reset_profile(&self, id: SessionId) -> Result<()> {
        self.mutate(id, |s| {
            s.profile = None;
            Ok(())
        })
        .await
    }

    pub async fn profile(&self, id: SessionId) -> Option<HashMap<String, String>> {
        self.sessions
            .read()
            .await
            .get(&id)
            .and_then(|s| s.profile.clone())
    }

    // ── Fact cache ─────────────────────────────────────────────

    /// Read a cached fact. Entries past their TTL are absent (and dropped).
    pub async fn cache_get(&self, id: SessionId, key: &str) -> Option<String> {
        let mut sessions = self.sessions.write().await;
        let session = sessions.get_mut(&id)?;
        match session.cache.get(key) {
            Some(entry) if entry.expires_at > Utc::now() => Some(entry.value.clone()),
            Some(_) => {
                session.cache.remove(key);
                None
            }
            None => None,
        }
    }

    pub async fn cache_put(
        &self,
        id: SessionId,
        key: &str,
        value: &str,
        ttl: Duration,
    ) -> Result<()> {
        self.mutate(id, |s| {
            s.cache.insert(
                key.to_string(),
                CacheEntry {
                    value: value.to_string(),
                    expires_at: Utc::now() + ttl,
                },
            );
            Ok(())
        })
        .await
    }

    // ── Workflow stack ─────────────────────────────────────────

    pub async fn push_frame(&self, id: SessionId, frame: Frame) -> Result<()> {
        self.mutate(id, |s| {
            s.stack.push(frame);
            Ok(())
        })
        .await
    }

    pub async fn pop_frame(&self, id: SessionId) -> Result<Option<Frame>> {
        let mut popped = None;
        self.mutate(id, |s| {
            popped = s.stack.pop();
            Ok(())
        })
        .await?;
        Ok(popped)
    }

    /// Tail transfer: replace the top frame without preserving the caller.
    pub async fn replace_top(&self, id: SessionId, frame: Frame) -> Result<()> {
        self.mutate(id, |s| {
            s.stack.pop();
            s.stack.push(frame);
            Ok(())
        })
        .await
    }

    /// Advance the top frame past its current step.
    pub async fn advance_top(&self, id: SessionId) -> Result<()> {
        self.mutate(id, |s| {
            if let Some(top) = s.stack.last_mut() {
                top.step += 1;
            }
            Ok(())
        })
        .await
    }

    /// Call transfer: advance the caller past its current step and push the
    /// callee in one mutation. A dropped turn future can then never leave
    /// the caller advanced with no callee on the stack.
    pub async fn advance_and_push(&self, id: SessionId, frame: Frame) -> Result<()> {
        self.mutate(id, |s| {
            if let Some(top) = s.stack.last_mut() {
                top.step += 1;
            }
            s.stack.push(frame);
            Ok(())
        })
        .await
    }

    pub async fn clear_stack(&self, id: SessionId) -> Result<()> {
        self.mutate(id, |s| {
            s.stack.clear();
            Ok(())
        })
        .await
    }

    pub async fn stack(&self, id: SessionId) -> Vec<Frame> {
        self.sessions
            .read()
            .await
            .get(&id)
            .map(|s| s.stack.clone())
            .unwrap_or_default()
    }

    // ── Turn bookkeeping ───────────────────────────────────────

    pub async fn set_tier_bias(&self, id: SessionId, tier: Tier) -> Result<()> {
        self.mutate(id, |s| {
            s.tier_bias = Some(tier);
            Ok(())
        })
        .await
    }

    pub async fn set_pending_confirmation(
        &self,
        id: SessionId,
        node: Option<NodeId>,
    ) -> Result<()> {
        self.mutate(id, |s| {
            s.pending_confirmation = node;
            Ok(())
        })
        .await
    }

    pub async fn take_pending_confirmation(&self, id: SessionId) -> Result<Option<NodeId>> {
        let mut pending = None;
        self.mutate(id, |s| {
            pending = s.pending_confirmation.take();
            Ok(())
        })
        .await?;
        Ok(pending)
    }

    pub async fn mark_diary_open(&self, id: SessionId) -> Result<()> {
        self.mutate(id, |s| {
            s.diary_open = true;
            Ok(())
        })
        .await
    }

    pub async fn record_turn(&self, id: SessionId) -> Result<()> {
        self.mutate(id, |s| {
            s.turn_count += 1;
            s.last_active = Utc::now();
            Ok(())
        })
        .await
    }

    // ── Locking & persistence ──────────────────────────────────

    /// Get the per-session run lock. The executor holds the guard for the
    /// whole turn, so stack and cache mutations are never concurrent.
    pub async fn run_lock(&self, id: SessionId) -> Arc<TokioMutex<()>> {
        {
            let locks = self.run_locks.read().await;
            if let Some(lock) = locks.get(&id) {
                return Arc::clone(lock);
            }
        }
        let mut locks = self.run_locks.write().await;
        Arc::clone(
            locks
                .entry(id)
                .or_insert_with(|| Arc::new(TokioMutex::new(()))),
        )
    }

    /// Persist the session if a store is attached. Called at turn
    /// boundaries, after the last fully-completed step.
    pub async fn checkpoint(&self, id: SessionId) -> Result<()> {
        let Some(ref store) = self.store else {
            return Ok(());
        };
        let session = self
            .get(id)
            .await
            .ok_or_else(|| GuidepostError::SessionNotFound(id.to_string()))?;
        store.save(&session)
    }

    async fn mutate<F>(&self, id: SessionId, f: F) -> Result<()>
    where
        F: FnOnce(&mut Session) -> Result<()>,
    {
        let mut sessions = self.sessions.write().await;
        let session = sessions
            .get_mut(&id)
            .ok_or_else(|| GuidepostError::SessionNotFound(id.to_string()))?;
        f(session)
    }
}
