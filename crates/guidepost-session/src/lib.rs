//! # guidepost-session
//!
//! Per-conversation state: the set-once execution profile, the TTL fact
//! cache, the workflow stack, and the append-only Investigation Diary.
//! All mutation goes through [`SessionManager`], serialized per session by
//! the run locks the executor holds for the duration of a turn.

pub mod diary;
pub mod session;
pub mod store;

pub use diary::InvestigationDiary;
pub use session::{CacheEntry, Frame, Session, SessionManager};
pub use store::SessionStore;
