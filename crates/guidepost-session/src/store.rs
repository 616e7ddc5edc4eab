use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use rusqlite::Connection;
use std::path::Path;
use std::sync::Arc;
use tracing::info;
use uuid::Uuid;

use guidepost_core::{DiaryEntry, GuidepostError, Result, SessionId};

use crate::session::Session;

/// SQLite-backed durability for sessions and diaries.
///
/// Sessions serialize their profile, cache, and stack as JSON columns;
/// diary entries get their own append-only table. Persistence is optional
/// — without a store, everything lives in memory only.
pub struct SessionStore {
    db: Arc<Mutex<Connection>>,
}

impl SessionStore {
    /// Open or create the session database at the given path.
    pub fn open(path: &Path) -> Result<Self> {
        info!(?path, "opening session store");

        let conn =
            Connection::open(path).map_err(|e| GuidepostError::Storage(e.to_string()))?;

        // WAL for concurrent readers.
        conn.execute_batch("PRAGMA journal_mode=WAL; PRAGMA synchronous=NORMAL;")
            .map_err(|e| GuidepostError::Storage(e.to_string()))?;

        conn.execute_batch(
            "
            CREATE TABLE IF NOT EXISTS sessions (
                id TEXT PRIMARY KEY,
                created_at TEXT NOT NULL,
                last_active TEXT NOT NULL,
                profile TEXT,
                cache TEXT NOT NULL DEFAULT '{}',
                stack TEXT NOT NULL DEFAULT '[]',
                tier_bias TEXT,
                pending_confirmation TEXT,
                diary_open INTEGER NOT NULL DEFAULT 0,
                active INTEGER NOT NULL DEFAULT 1,
                turn_count INTEGER NOT NULL DEFAULT 0
            );

            CREATE TABLE IF NOT EXISTS diary_entries (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                session_id TEXT NOT NULL,
                timestamp TEXT NOT NULL,
                hypothesis TEXT NOT NULL,
                evidence TEXT NOT NULL,
                outcome TEXT
            );

            CREATE INDEX IF NOT EXISTS idx_diary_session ON diary_entries(session_id);
            CREATE INDEX IF NOT EXISTS idx_sessions_active ON sessions(active);
            ",
        )
        .map_err(|e| GuidepostError::Storage(e.to_string()))?;

        Ok(Self {
            db: Arc::new(Mutex::new(conn)),
        })
    }

    /// Upsert one session snapshot.
    pub fn save(&self, session: &Session) -> Result<()> {
        let db = self.db.lock();
        let profile = session
            .profile
            .as_ref()
            .map(serde_json::to_string)
            .transpose()?;
        let cache = serde_json::to_string(&session.cache)?;
        let stack = serde_json::to_string(&session.stack)?;
        let tier_bias = session
            .tier_bias
            .map(|t| serde_json::to_string(&t))
            .transpose()?;

        db.execute(
            "INSERT OR REPLACE INTO sessions
             (id, created_at, last_active, profile, cache, stack, tier_bias,
              pending_confirmation, diary_open, active, turn_count)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11)",
            rusqlite::params![
                session.id.to_string(),
                session.created_at.to_rfc3339(),
                session.last_active.to_rfc3339(),
                profile,
                cache,
                stack,
                tier_bias,
                session.pending_confirmation.as_ref().map(|n| n.to_string()),
                session.diary_open as i64,
                session.active as i64,
                session.turn_count as i64,
            ],
        )
        .map_err(|e| GuidepostError::Storage(e.to_string()))?;
        Ok(())
    }

    /// Load every persisted session.
    pub fn load_all(&self) -> Result<Vec<Session>> {
        let db = self.db.lock();
        let mut stmt = db
            .prepare(
                "SELECT id, created_at, last_active, profile, cache, stack, tier_bias,
                        pending_confirmation, diary_open, active, turn_count
                 FROM sessions",
            )
            .map_err(|e| GuidepostError::Storage(e.to_string()))?;

        let rows = stmt
            .query_map([], |row| {
                Ok((
                    row.get::<_, String>(0)?,
                    row.get::<_, String>(1)?,
                    row.get::<_, String>(2)?,
                    row.get::<_, Option<String>>(3)?,
                    row.get::<_, String>(4)?,
                    row.get::<_, String>(5)?,
                    row.get::<_, Option<String>>(6)?,
                    row.get::<_, Option<String>>(7)?,
                    row.get::<_, i64>(8)?,
                    row.get::<_, i64>(9)?,
                    row.get::<_, i64>(10)?,
                ))
            })
            .map_err(|e| GuidepostError::Storage(e.to_string()))?;

        let mut sessions = Vec::new();
        for row in rows {
            let (
                id,
                created_at,
                last_active,
                profile,
                cache,
                stack,
                tier_bias,
                pending,
                diary_open,
                active,
                turn_count,
            ) = row.map_err(|e| GuidepostError::Storage(e.to_string()))?;

            let id: SessionId = id
                .parse::<Uuid>()
                .map_err(|e| GuidepostError::Storage(format!("bad session id: {e}")))?;

            sessions.push(Session {
                id,
                created_at: parse_ts(&created_at)?,
                last_active: parse_ts(&last_active)?,
                profile: profile.as_deref().map(serde_json::from_str).transpose()?,
                cache: serde_json::from_str(&cache)?,
                stack: serde_json::from_str(&stack)?,
                tier_bias: tier_bias.as_deref().map(serde_json::from_str).transpose()?,
                pending_confirmation: pending.map(guidepost_core::NodeId::new),
                diary_open: diary_open != 0,
                active: active != 0,
                turn_count: turn_count as usize,
            });
        }
        Ok(sessions)
    }

    /// Append one diary entry. Rows are never updated or deleted.
    pub fn append_diary(&self, session: SessionId, entry: &DiaryEntry) -> Result<()> {
        let db = self.db.lock();
        db.execute(
            "INSERT INTO diary_entries (session_id, timestamp, hypothesis, evidence, outcome)
             VALUES (?1, ?2, ?3, ?4, ?5)",
            rusqlite::params![
                session.to_string(),
                entry.timestamp.to_rfc3339(),
                entry.hypothesis,
                entry.evidence,
                entry.outcome,
            ],
        )
        .map_err(|e| GuidepostError::Storage(e.to_string()))?;
        Ok(())
    }

    /// All diary entries for a session, in append order.
    pub fn read_diary(&self, session: SessionId) -> Result<Vec<DiaryEntry>> {
        let db = self.db.lock();
        let mut stmt = db
            .prepare(
                "SELECT timestamp, hypothesis, evidence, outcome
                 FROM diary_entries WHERE session_id = ?1 ORDER BY id ASC",
            )
            .map_err(|e| GuidepostError::Storage(e.to_string()))?;

        let rows = stmt
            .query_map([session.to_string()], |row| {
                Ok((
                    row.get::<_, String>(0)?,
                    row.get::<_, String>(1)?,
                    row.get::<_, String>(2)?,
                    row.get::<_, Option<String>>(3)?,
                ))
            })
            .map_err(|e| GuidepostError::Storage(e.to_string()))?;

        let mut entries = Vec::new();
        for row in rows {
            let (timestamp, hypothesis, evidence, outcome) =
                row.map_err(|e| GuidepostError::Storage(e.to_string()))?;
            entries.push(DiaryEntry {
                timestamp: parse_ts(&timestamp)?,
                hypothesis,
                evidence,
                outcome,
            });
        }
        Ok(entries)
    }
}

fn parse_ts(raw: &str) -> Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(raw)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| GuidepostError::Storage(format!("bad timestamp '{raw}': {e}")))
}
