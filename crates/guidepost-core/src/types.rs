use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

/// Unique identifier for a session.
pub type SessionId = Uuid;

/// Unique identifier for a corpus node. Stable and path-like,
/// e.g. `"postgres/indexes/create"`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct NodeId(pub String);

impl NodeId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for NodeId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

/// Priority class of a node. Lower precedence value wins tie-breaks.
///
/// `Core` nodes (session bootstrap, safety rules) are always eligible for
/// matching and outrank everything else on a near-tie.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Tier {
    Core,
    Primary,
    Secondary,
    Advanced,
}

impl Tier {
    /// Precedence rank: lower wins ties.
    pub fn precedence(&self) -> u8 {
        match self {
            Tier::Core => 0,
            Tier::Primary => 1,
            Tier::Secondary => 2,
            Tier::Advanced => 3,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Tier::Core => "core",
            Tier::Primary => "primary",
            Tier::Secondary => "secondary",
            Tier::Advanced => "advanced",
        }
    }
}

impl fmt::Display for Tier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A trigger pattern on a node. Patterns marked `requires_explicit` gate
/// Advanced-tier eligibility: an Advanced node is only a candidate when
/// the utterance contains at least one such pattern in full.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Trigger {
    pub pattern: String,
    #[serde(default)]
    pub requires_explicit: bool,
}

impl Trigger {
    pub fn new(pattern: impl Into<String>) -> Self {
        Self {
            pattern: pattern.into(),
            requires_explicit: false,
        }
    }

    pub fn explicit(pattern: impl Into<String>) -> Self {
        Self {
            pattern: pattern.into(),
            requires_explicit: true,
        }
    }
}

/// Edge type between nodes.
///
/// `Load` is call-and-return, `Continue` is tail transfer, `SeeAlso` is
/// informational only and never traversed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EdgeKind {
    Load,
    Continue,
    SeeAlso,
}

/// One declared step of a node's workflow. The engine interprets only the
/// routing directives; instructional text stays opaque.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Step {
    /// Emit instructional text to the transcript; no routing effect.
    Note(String),
    /// Call-and-return transfer to another node.
    Load(NodeId),
    /// Tail transfer to another node; the caller is never resumed.
    Continue(NodeId),
    /// Consult the session fact cache; on miss, invoke the fact provider
    /// and cache the result.
    Discover(String),
    /// Hypothesis/evidence pair recorded in the diary when open.
    Hypothesis { hypothesis: String, evidence: String },
    /// Halt the turn awaiting user clarification.
    Prompt(String),
    /// Halt the workflow successfully.
    Done(String),
    /// Halt the workflow with a domain failure.
    Fail { kind: String, message: String },
}

impl Step {
    /// The navigable edge this step declares, if any.
    pub fn edge(&self) -> Option<(&NodeId, EdgeKind)> {
        match self {
            Step::Load(id) => Some((id, EdgeKind::Load)),
            Step::Continue(id) => Some((id, EdgeKind::Continue)),
            _ => None,
        }
    }
}

/// Terminal outcome of one turn. Every halt carries a message and maps to
/// an explicit exit code; there is no silent termination.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "halt", rename_all = "lowercase")]
pub enum HaltResult {
    Success { message: String },
    Choice { prompt: String },
    Error { kind: String, message: String },
}

impl HaltResult {
    pub fn success(message: impl Into<String>) -> Self {
        HaltResult::Success {
            message: message.into(),
        }
    }

    pub fn choice(prompt: impl Into<String>) -> Self {
        HaltResult::Choice {
            prompt: prompt.into(),
        }
    }

    pub fn internal_error(message: impl Into<String>) -> Self {
        HaltResult::Error {
            kind: "internal".into(),
            message: message.into(),
        }
    }

    /// Process exit code: 0 success, 1 error, 2 awaiting clarification.
    pub fn exit_code(&self) -> i32 {
        match self {
            HaltResult::Success { .. } => 0,
            HaltResult::Error { .. } => 1,
            HaltResult::Choice { .. } => 2,
        }
    }

    pub fn message(&self) -> &str {
        match self {
            HaltResult::Success { message } => message,
            HaltResult::Choice { prompt } => prompt,
            HaltResult::Error { message, .. } => message,
        }
    }
}

/// One entry in a session's Investigation Diary. Append-only.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DiaryEntry {
    pub timestamp: chrono::DateTime<chrono::Utc>,
    pub hypothesis: String,
    pub evidence: String,
    pub outcome: Option<String>,
}

impl DiaryEntry {
    pub fn new(hypothesis: impl Into<String>, evidence: impl Into<String>) -> Self {
        Self {
            timestamp: chrono::Utc::now(),
            hypothesis: hypothesis.into(),
            evidence: evidence.into(),
            outcome: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tier_precedence_order() {
        assert!(Tier::Core.precedence() < Tier::Primary.precedence());
        assert!(Tier::Primary.precedence() < Tier::Secondary.precedence());
        assert!(Tier::Secondary.precedence() < Tier::Advanced.precedence());
    }

    #[test]
    fn halt_exit_codes() {
        assert_eq!(HaltResult::success("ok").exit_code(), 0);
        assert_eq!(
            HaltResult::Error {
                kind: "domain".into(),
                message: "bad".into()
            }
            .exit_code(),
            1
        );
        assert_eq!(HaltResult::choice("which one?").exit_code(), 2);
    }

    #[test]
    fn step_edges() {
        let load = Step::Load(NodeId::from("a/b"));
        assert_eq!(load.edge(), Some((&NodeId::from("a/b"), EdgeKind::Load)));
        assert_eq!(Step::Note("hi".into()).edge(), None);
        assert_eq!(
            Step::Continue(NodeId::from("c")).edge(),
            Some((&NodeId::from("c"), EdgeKind::Continue))
        );
    }

    #[test]
    fn tier_serde_lowercase() {
        assert_eq!(serde_json::to_string(&Tier::Advanced).unwrap(), "\"advanced\"");
        let t: Tier = serde_json::from_str("\"primary\"").unwrap();
        assert_eq!(t, Tier::Primary);
    }
}
