use thiserror::Error;

/// Unified error type for the entire Guidepost workspace.
#[derive(Error, Debug)]
pub enum GuidepostError {
    // ── Corpus errors ──────────────────────────────────────────
    #[error("corpus load failed: {node}: {reason}")]
    CorpusLoad { node: String, reason: String },

    #[error("corpus root unreadable: {0}")]
    CorpusUnreadable(String),

    #[error("node not found: {0}")]
    NodeNotFound(String),

    // ── Session errors ─────────────────────────────────────────
    #[error("session not found: {0}")]
    SessionNotFound(String),

    #[error("profile already bound for session {0}; call reset_profile first")]
    ProfileLocked(String),

    // ── Execution errors ───────────────────────────────────────
    #[error("execution failed at {node} step {step}: {message}")]
    Execution {
        node: String,
        step: usize,
        message: String,
    },

    #[error("discovery failed for fact '{key}': {reason}")]
    Discovery { key: String, reason: String },

    // ── Engine invariant violations ────────────────────────────
    #[error("internal error: {0}")]
    Internal(String),

    // ── Config errors ──────────────────────────────────────────
    #[error("config error: {0}")]
    Config(String),

    // ── Storage errors ─────────────────────────────────────────
    #[error("storage error: {0}")]
    Storage(String),

    // ── Generic wrappers ───────────────────────────────────────
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("{0}")]
    Other(#[from] anyhow::Error),
}

pub type Result<T> = std::result::Result<T, GuidepostError>;
