use serde::Deserialize;
use std::path::{Path, PathBuf};

use guidepost_core::{EdgeKind, GuidepostError, NodeId, Result, Step, Tier, Trigger};

/// A corpus node parsed from a NODE.md file.
///
/// Nodes are Markdown documents with YAML front-matter carrying routing
/// metadata. The body is instructional content for whoever consumes the
/// workflow — the engine never interprets it.
#[derive(Debug, Clone)]
pub struct Node {
    /// Stable, path-like identifier, unique across the corpus.
    pub id: NodeId,
    /// Priority class used by the matcher's precedence and tie-break rules.
    pub tier: Tier,
    /// Phrase/keyword patterns the matcher scores against.
    pub triggers: Vec<Trigger>,
    /// Domain operations this node's instructions govern.
    pub operation_tags: Vec<String>,
    /// Authority relation: this node replaces the listed nodes.
    pub supersedes: Vec<NodeId>,
    /// Authority relation: known, intentional disagreement with the listed nodes.
    pub conflicts_with: Vec<NodeId>,
    /// Declared workflow steps, executed in order.
    pub steps: Vec<Step>,
    /// Router nodes fan out to children on sub-intent instead of stepping.
    pub router: bool,
    /// Router children (>= 2 when `router` is set).
    pub children: Vec<NodeId>,
    /// Informational cross-references, never traversed.
    pub see_also: Vec<NodeId>,
    /// Whether this node may terminate a workflow.
    pub halting: bool,
    /// Opaque instructional payload.
    pub body: String,
    /// Absolute path to the source file.
    pub file_path: PathBuf,
}

/// Raw front-matter shape. Triggers accept either a bare pattern string or
/// a `{ pattern, requires_explicit }` map; steps are directive lines parsed
/// by [`parse_step`].
#[derive(Debug, Deserialize)]
struct NodeHeader {
    id: String,
    tier: Tier,
    #[serde(default)]
    triggers: Vec<TriggerSpec>,
    #[serde(default)]
    operation_tags: Vec<String>,
    #[serde(default)]
    supersedes: Vec<String>,
    #[serde(default)]
    conflicts_with: Vec<String>,
    #[serde(default)]
    steps: Vec<String>,
    #[serde(default)]
    router: bool,
    #[serde(default)]
    children: Vec<String>,
    #[serde(default)]
    see_also: Vec<String>,
    #[serde(default)]
    halting: bool,
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum TriggerSpec {
    Plain(String),
    Full {
        pattern: String,
        #[serde(default)]
        requires_explicit: bool,
    },
}

impl From<TriggerSpec> for Trigger {
    fn from(spec: TriggerSpec) -> Self {
        match spec {
            TriggerSpec::Plain(pattern) => Trigger::new(pattern),
            TriggerSpec::Full {
                pattern,
                requires_explicit,
            } => Trigger {
                pattern,
                requires_explicit,
            },
        }
    }
}

impl Node {
    /// Create an empty non-halting node. Fixtures and programmatic corpora
    /// fill it in with the chainable setters below.
    pub fn new(id: impl Into<String>, tier: Tier) -> Self {
        Self {
            id: NodeId::new(id),
            tier,
            triggers: Vec::new(),
            operation_tags: Vec::new(),
            supersedes: Vec::new(),
            conflicts_with: Vec::new(),
            steps: Vec::new(),
            router: false,
            children: Vec::new(),
            see_also: Vec::new(),
            halting: false,
            body: String::new(),
            file_path: PathBuf::new(),
        }
    }

    pub fn with_trigger(mut self, trigger: Trigger) -> Self {
        self.triggers.push(trigger);
        self
    }

    pub fn with_tag(mut self, tag: impl Into<String>) -> Self {
        self.operation_tags.push(tag.into());
        self
    }

    pub fn with_steps(mut self, steps: Vec<Step>) -> Self {
        self.steps = steps;
        self
    }

    pub fn halting(mut self, halting: bool) -> Self {
        self.halting = halting;
        self
    }

    pub fn as_router(mut self, children: Vec<NodeId>) -> Self {
        self.router = true;
        self.children = children;
        self
    }

    /// Parse a NODE.md file. The file format is:
    ///
    /// ```text
    /// ---
    /// id: postgres/deploy
    /// tier: primary
    /// triggers:
    ///   - deploy connector
    /// operation_tags: [deploy]
    /// steps:
    ///   - note Verify connectivity before anything else
    ///   - load postgres/inventory
    ///   - done Deployment guidance delivered
    /// halting: true
    /// ---
    ///
    /// # Deploying a connector
    ///
    /// Instructional prose...
    /// ```
    pub fn from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| GuidepostError::CorpusLoad {
            node: path.display().to_string(),
            reason: format!("failed to read: {e}"),
        })?;
        Self::parse(&content, path.to_path_buf())
    }

    /// Parse NODE.md content with a known source path.
    pub fn parse(content: &str, file_path: PathBuf) -> Result<Self> {
        let origin = file_path.display().to_string();
        let (front_matter, body) = split_front_matter(content).map_err(|reason| {
            GuidepostError::CorpusLoad {
                node: origin.clone(),
                reason,
            }
        })?;

        let header: NodeHeader =
            serde_yaml::from_str(&front_matter).map_err(|e| GuidepostError::CorpusLoad {
                node: origin.clone(),
                reason: format!("front-matter: {e}"),
            })?;

        if header.id.trim().is_empty() {
            return Err(GuidepostError::CorpusLoad {
                node: origin,
                reason: "node id is empty".into(),
            });
        }
        let id = NodeId::new(header.id.trim());

        let mut steps = Vec::with_capacity(header.steps.len());
        for (i, raw) in header.steps.iter().enumerate() {
            let step = parse_step(raw).map_err(|reason| GuidepostError::CorpusLoad {
                node: id.to_string(),
                reason: format!("step {}: {}", i + 1, reason),
            })?;
            steps.push(step);
        }

        let node = Node {
            id: id.clone(),
            tier: header.tier,
            triggers: header.triggers.into_iter().map(Trigger::from).collect(),
            operation_tags: header.operation_tags,
            supersedes: header.supersedes.iter().map(|s| NodeId::new(s)).collect(),
            conflicts_with: header
                .conflicts_with
                .iter()
                .map(|s| NodeId::new(s))
                .collect(),
            steps,
            router: header.router,
            children: header.children.iter().map(|s| NodeId::new(s)).collect(),
            see_also: header.see_also.iter().map(|s| NodeId::new(s)).collect(),
            halting: header.halting,
            body,
            file_path,
        };

        node.check_shape()?;
        Ok(node)
    }

    /// Structural invariants that hold per node, before cross-node
    /// referential checks.
    pub(crate) fn check_shape(&self) -> Result<()> {
        if self.router && self.children.len() < 2 {
            return Err(GuidepostError::CorpusLoad {
                node: self.id.to_string(),
                reason: format!(
                    "router nodes need at least 2 children, found {}",
                    self.children.len()
                ),
            });
        }
        if !self.router && !self.halting && self.nav_targets().is_empty() {
            return Err(GuidepostError::CorpusLoad {
                node: self.id.to_string(),
                reason: "non-halting node has no load/continue step and is not a router".into(),
            });
        }
        Ok(())
    }

    /// All navigable outgoing edges: load/continue steps plus router
    /// children (treated as load edges). `see_also` is excluded.
    pub fn nav_targets(&self) -> Vec<(&NodeId, EdgeKind)> {
        let mut targets: Vec<(&NodeId, EdgeKind)> =
            self.steps.iter().filter_map(|s| s.edge()).collect();
        for child in &self.children {
            targets.push((child, EdgeKind::Load));
        }
        targets
    }

    /// The opaque instructional payload.
    pub fn instructions(&self) -> &str {
        &self.body
    }
}

/// Split a NODE.md file into YAML front-matter and Markdown body.
fn split_front_matter(content: &str) -> std::result::Result<(String, String), String> {
    let trimmed = content.trim_start();
    if !trimmed.starts_with("---") {
        return Err("NODE.md must start with YAML front-matter (---)".into());
    }

    let after_first = &trimmed[3..];
    let end_pos = after_first
        .find("\n---")
        .ok_or_else(|| "missing closing --- for front-matter".to_string())?;

    let front_matter = after_first[..end_pos].trim().to_string();
    let body = after_first[end_pos + 4..].trim().to_string();
    Ok((front_matter, body))
}

/// Parse one step directive line.
///
/// Grammar: `note <text>`, `load <node-id>`, `continue <node-id>`,
/// `discover <fact-key>`, `hypothesis <text> -> <evidence>`,
/// `prompt <text>`, `done <text>`, `fail [<kind>:] <text>`.
fn parse_step(raw: &str) -> std::result::Result<Step, String> {
    let raw = raw.trim();
    let (directive, rest) = match raw.split_once(char::is_whitespace) {
        Some((d, r)) => (d, r.trim()),
        None => (raw, ""),
    };

    let require_arg = |what: &str| -> std::result::Result<String, String> {
        if rest.is_empty() {
            Err(format!("'{directive}' requires {what}"))
        } else {
            Ok(rest.to_string())
        }
    };

    match directive {
        "note" => Ok(Step::Note(require_arg("text")?)),
        "load" => Ok(Step::Load(NodeId::new(require_arg("a node id")?))),
        "continue" => Ok(Step::Continue(NodeId::new(require_arg("a node id")?))),
        "discover" => Ok(Step::Discover(require_arg("a fact key")?)),
        "prompt" => Ok(Step::Prompt(require_arg("text")?)),
        "done" => Ok(Step::Done(require_arg("text")?)),
        "hypothesis" => {
            let arg = require_arg("'<hypothesis> -> <evidence>'")?;
            let (hypothesis, evidence) = arg
                .split_once("->")
                .ok_or_else(|| "hypothesis step needs '<hypothesis> -> <evidence>'".to_string())?;
            Ok(Step::Hypothesis {
                hypothesis: hypothesis.trim().to_string(),
                evidence: evidence.trim().to_string(),
            })
        }
        "fail" => {
            let arg = require_arg("a message")?;
            // Optional "<kind>: <message>" prefix; single-word kinds only.
            if let Some((kind, message)) = arg.split_once(':') {
                let kind = kind.trim();
                if !kind.is_empty() && !kind.contains(char::is_whitespace) {
                    return Ok(Step::Fail {
                        kind: kind.to_string(),
                        message: message.trim().to_string(),
                    });
                }
            }
            Ok(Step::Fail {
                kind: "domain".into(),
                message: arg,
            })
        }
        other => Err(format!("unknown step directive '{other}'")),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(content: &str) -> Result<Node> {
        Node::parse(content, PathBuf::from("/corpus/test.md"))
    }

    #[test]
    fn parse_full_node() {
        let content = r#"---
id: postgres/deploy
tier: primary
triggers:
  - deploy connector
  - pattern: recordpath transform
    requires_explicit: true
operation_tags: [deploy]
see_also: [postgres/teardown]
steps:
  - note Verify connectivity before anything else
  - load postgres/inventory
  - done Deployment guidance delivered
halting: true
---

# Deploying a connector

Step-by-step prose lives here.
"#;
        let node = parse(content).unwrap();
        assert_eq!(node.id, NodeId::from("postgres/deploy"));
        assert_eq!(node.tier, Tier::Primary);
        assert_eq!(node.triggers.len(), 2);
        assert!(!node.triggers[0].requires_explicit);
        assert!(node.triggers[1].requires_explicit);
        assert_eq!(node.operation_tags, vec!["deploy"]);
        assert_eq!(node.steps.len(), 3);
        assert!(node.halting);
        assert!(node.body.contains("# Deploying a connector"));
        assert_eq!(
            node.nav_targets(),
            vec![(&NodeId::from("postgres/inventory"), EdgeKind::Load)]
        );
    }

    #[test]
    fn parse_minimal_halting_node() {
        let content = "---\nid: start\ntier: core\nhalting: true\n---\n\nWelcome.";
        let node = parse(content).unwrap();
        assert_eq!(node.tier, Tier::Core);
        assert!(node.steps.is_empty());
        assert_eq!(node.body, "Welcome.");
    }

    #[test]
    fn missing_front_matter_errors() {
        assert!(parse("# Just markdown\nno metadata").is_err());
    }

    #[test]
    fn missing_tier_errors() {
        let content = "---\nid: x\nhalting: true\n---\nBody.";
        let err = parse(content).unwrap_err();
        assert!(err.to_string().contains("front-matter"));
    }

    #[test]
    fn empty_id_errors() {
        let content = "---\nid: \"\"\ntier: primary\nhalting: true\n---\nBody.";
        assert!(parse(content).is_err());
    }

    #[test]
    fn unknown_directive_errors() {
        let content =
            "---\nid: x\ntier: primary\nhalting: true\nsteps:\n  - teleport elsewhere\n---\nBody.";
        let err = parse(content).unwrap_err().to_string();
        assert!(err.contains("unknown step directive"), "{err}");
    }

    #[test]
    fn non_halting_without_edges_errors() {
        let content = "---\nid: x\ntier: primary\nsteps:\n  - note stuck here\n---\nBody.";
        let err = parse(content).unwrap_err().to_string();
        assert!(err.contains("non-halting"), "{err}");
    }

    #[test]
    fn router_needs_two_children() {
        let content = "---\nid: r\ntier: primary\nrouter: true\nchildren: [only-one]\n---\nBody.";
        assert!(parse(content).is_err());

        let content = "---\nid: r\ntier: primary\nrouter: true\nchildren: [a, b]\n---\nBody.";
        let node = parse(content).unwrap();
        assert_eq!(node.nav_targets().len(), 2);
    }

    #[test]
    fn step_grammar_variants() {
        assert_eq!(
            parse_step("hypothesis bloat slows scans -> check pg_stat").unwrap(),
            Step::Hypothesis {
                hypothesis: "bloat slows scans".into(),
                evidence: "check pg_stat".into()
            }
        );
        assert_eq!(
            parse_step("fail timeout: connection lost").unwrap(),
            Step::Fail {
                kind: "timeout".into(),
                message: "connection lost".into()
            }
        );
        assert_eq!(
            parse_step("fail everything is on fire").unwrap(),
            Step::Fail {
                kind: "domain".into(),
                message: "everything is on fire".into()
            }
        );
        assert_eq!(parse_step("discover inventory").unwrap(), Step::Discover("inventory".into()));
        assert!(parse_step("load").is_err());
        assert!(parse_step("hypothesis missing separator").is_err());
    }
}
