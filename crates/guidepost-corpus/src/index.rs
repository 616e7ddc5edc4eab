use std::collections::HashMap;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

use guidepost_core::{GuidepostError, NodeId, Result, Tier};

use crate::node::Node;

/// An immutable, validated snapshot of the whole corpus.
///
/// Loading is all-or-nothing: a corpus that fails front-matter parsing or
/// referential integrity is never served partially.
#[derive(Debug)]
pub struct CorpusIndex {
    nodes: HashMap<NodeId, Node>,
    root: PathBuf,
}

impl CorpusIndex {
    /// Load every `.md` node under `root` (recursively) and validate the
    /// result as a whole.
    pub fn load(root: &Path) -> Result<Self> {
        if !root.is_dir() {
            return Err(GuidepostError::CorpusUnreadable(format!(
                "{} is not a directory",
                root.display()
            )));
        }

        let mut files = Vec::new();
        collect_node_files(root, &mut files)?;
        files.sort();

        let mut nodes: HashMap<NodeId, Node> = HashMap::with_capacity(files.len());
        for path in &files {
            let node = Node::from_file(path)?;
            if let Some(existing) = nodes.get(&node.id) {
                return Err(GuidepostError::CorpusLoad {
                    node: node.id.to_string(),
                    reason: format!(
                        "duplicate id: declared in both {} and {}",
                        existing.file_path.display(),
                        path.display()
                    ),
                });
            }
            debug!(node = %node.id, tier = %node.tier, "parsed node");
            nodes.insert(node.id.clone(), node);
        }

        let index = Self {
            nodes,
            root: root.to_path_buf(),
        };
        index.check_references()?;

        info!(nodes = index.len(), root = %root.display(), "corpus loaded");
        Ok(index)
    }

    /// Build an index from already-parsed nodes. Used by fixtures and by
    /// callers that assemble corpora programmatically; the same duplicate
    /// and referential checks apply.
    pub fn from_nodes(nodes: Vec<Node>) -> Result<Self> {
        let mut map: HashMap<NodeId, Node> = HashMap::with_capacity(nodes.len());
        for node in nodes {
            node.check_shape()?;
            if map.contains_key(&node.id) {
                return Err(GuidepostError::CorpusLoad {
                    node: node.id.to_string(),
                    reason: "duplicate id".into(),
                });
            }
            map.insert(node.id.clone(), node);
        }
        let index = Self {
            nodes: map,
            root: PathBuf::new(),
        };
        index.check_references()?;
        Ok(index)
    }

    /// Referential integrity: every navigable edge and authority relation
    /// must point at an existing node. Dangling `see_also` references are
    /// informational and only warned about.
    fn check_references(&self) -> Result<()> {
        for node in self.nodes.values() {
            for (target, kind) in node.nav_targets() {
                if !self.nodes.contains_key(target) {
                    return Err(GuidepostError::CorpusLoad {
                        node: node.id.to_string(),
                        reason: format!("dangling {kind:?} edge to unknown node '{target}'"),
                    });
                }
            }
            for target in node.supersedes.iter().chain(&node.conflicts_with) {
                if !self.nodes.contains_key(target) {
                    return Err(GuidepostError::CorpusLoad {
                        node: node.id.to_string(),
                        reason: format!("authority relation names unknown node '{target}'"),
                    });
                }
            }
            for target in &node.see_also {
                if !self.nodes.contains_key(target) {
                    warn!(node = %node.id, target = %target, "see_also points at unknown node");
                }
            }
        }
        Ok(())
    }

    pub fn get(&self, id: &NodeId) -> Option<&Node> {
        self.nodes.get(id)
    }

    pub fn nodes(&self) -> impl Iterator<Item = &Node> {
        self.nodes.values()
    }

    /// Node ids in deterministic order.
    pub fn ids(&self) -> Vec<&NodeId> {
        let mut ids: Vec<_> = self.nodes.keys().collect();
        ids.sort();
        ids
    }

    pub fn by_tier(&self, tier: Tier) -> Vec<&Node> {
        let mut nodes: Vec<_> = self.nodes.values().filter(|n| n.tier == tier).collect();
        nodes.sort_by(|a, b| a.id.cmp(&b.id));
        nodes
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    pub fn root(&self) -> &Path {
        &self.root
    }
}

fn collect_node_files(dir: &Path, out: &mut Vec<PathBuf>) -> Result<()> {
    let entries = std::fs::read_dir(dir)
        .map_err(|e| GuidepostError::CorpusUnreadable(format!("{}: {}", dir.display(), e)))?;

    for entry in entries {
        let entry =
            entry.map_err(|e| GuidepostError::CorpusUnreadable(format!("{}: {}", dir.display(), e)))?;
        let path = entry.path();
        if path.is_dir() {
            collect_node_files(&path, out)?;
        } else if path.extension().is_some_and(|e| e == "md") {
            out.push(path);
        }
    }
    Ok(())
}
