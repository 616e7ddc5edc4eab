//! # guidepost-validator
//!
//! Static analyzer for a loaded corpus: proves every node is reachable
//! from the declared entry points, every path can terminate, and no two
//! nodes claim the same operation without a declared authority relation.
//! Runs entirely offline against the index, never against a live session.
//! The result is a lint report, not a runtime gate — the caller decides
//! whether a dirty corpus may serve.

use serde::Serialize;
use std::collections::{HashMap, HashSet, VecDeque};
use tracing::debug;

use guidepost_core::NodeId;
use guidepost_corpus::CorpusIndex;

/// Validator knobs.
#[derive(Debug, Clone)]
pub struct ValidatorConfig {
    /// Roots of the traversal.
    pub entry_points: Vec<NodeId>,
    /// Every reachable node must have a halting node within this many
    /// navigable edges.
    pub max_depth: usize,
    /// Nodes allowed to be unreachable (scaffolding, templates).
    pub orphan_allowlist: Vec<NodeId>,
}

impl Default for ValidatorConfig {
    fn default() -> Self {
        Self {
            entry_points: vec![NodeId::from("start")],
            max_depth: 50,
            orphan_allowlist: Vec::new(),
        }
    }
}

/// One lint finding.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Violation {
    /// Declared entry point does not exist in the corpus.
    MissingEntryPoint { node: NodeId },
    /// Node unreachable from every entry point and not on the allow-list.
    Orphan { node: NodeId },
    /// Structural cycle none of whose members can reach a halting node.
    NonTerminating { cycle: Vec<NodeId> },
    /// Nearest halting node is further than the configured max depth.
    DepthExceeded { node: NodeId, nearest_halt: usize },
    /// Operation tag shared by nodes with no declared authority relation.
    AmbiguousAuthority { tag: String, nodes: Vec<NodeId> },
}

/// Structured lint result.
#[derive(Debug, Clone, Serialize, Default)]
pub struct ValidationReport {
    pub reachable: usize,
    pub violations: Vec<Violation>,
}

impl ValidationReport {
    pub fn is_clean(&self) -> bool {
        self.violations.is_empty()
    }
}

/// Walk the corpus graph and produce the full report.
pub fn validate(index: &CorpusIndex, config: &ValidatorConfig) -> ValidationReport {
    let mut violations = Vec::new();

    // Adjacency over navigable edges only; see_also is informational.
    let mut adjacency: HashMap<&NodeId, Vec<&NodeId>> = HashMap::new();
    for node in index.nodes() {
        let targets: Vec<&NodeId> = node.nav_targets().into_iter().map(|(id, _)| id).collect();
        adjacency.insert(&node.id, targets);
    }

    // ── Reachability ───────────────────────────────────────────
    let mut reachable: HashSet<&NodeId> = HashSet::new();
    let mut queue: VecDeque<&NodeId> = VecDeque::new();
    for entry in &config.entry_points {
        match index.get(entry) {
            Some(node) => {
                if reachable.insert(&node.id) {
                    queue.push_back(&node.id);
                }
            }
            None => violations.push(Violation::MissingEntryPoint {
                node: entry.clone(),
            }),
        }
    }
    while let Some(id) = queue.pop_front() {
        for &target in adjacency.get(id).into_iter().flatten() {
            if reachable.insert(target) {
                queue.push_back(target);
            }
        }
    }
    debug!(reachable = reachable.len(), total = index.len(), "traversal complete");

    let mut orphans: Vec<NodeId> = index
        .nodes()
        .filter(|n| !reachable.contains(&n.id) && !config.orphan_allowlist.contains(&n.id))
        .map(|n| n.id.clone())
        .collect();
    orphans.sort();
    violations.extend(orphans.into_iter().map(|node| Violation::Orphan { node }));

    // ── Termination ────────────────────────────────────────────
    // Distance from each node to its nearest halting node, via reverse BFS
    // from all halting nodes at once.
    let mut reverse: HashMap<&NodeId, Vec<&NodeId>> = HashMap::new();
    for (&from, targets) in &adjacency {
        for &target in targets {
            reverse.entry(target).or_default().push(from);
        }
    }
    let mut halt_distance: HashMap<&NodeId, usize> = HashMap::new();
    let mut queue: VecDeque<&NodeId> = VecDeque::new();
    for node in index.nodes().filter(|n| n.halting) {
        halt_distance.insert(&node.id, 0);
        queue.push_back(&node.id);
    }
    while let Some(id) = queue.pop_front() {
        let dist = halt_distance[id];
        for &pred in reverse.get(id).into_iter().flatten() {
            if !halt_distance.contains_key(pred) {
                halt_distance.insert(pred, dist + 1);
                queue.push_back(pred);
            }
        }
    }

    let mut depth_exceeded: Vec<(NodeId, usize)> = reachable
        .iter()
        .filter_map(|id| match halt_distance.get(*id) {
            Some(&dist) if dist > config.max_depth => Some(((*id).clone(), dist)),
            _ => None,
        })
        .collect();
    depth_exceeded.sort();
    violations.extend(
        depth_exceeded
            .into_iter()
            .map(|(node, nearest_halt)| Violation::DepthExceeded { node, nearest_halt }),
    );

    // Cycles with no escape to a halting node: strongly connected
    // components of the reachable dead region.
    let dead: HashSet<&NodeId> = reachable
        .iter()
        .copied()
        .filter(|id| !halt_distance.contains_key(*id))
        .collect();
    let mut cycles = Vec::new();
    for component in strongly_connected(&dead, &adjacency) {
        let is_cycle = component.len() > 1
            || adjacency
                .get(component[0])
                .is_some_and(|ts| ts.contains(&component[0]));
        if is_cycle {
            let mut members: Vec<NodeId> = component.into_iter().cloned().collect();
            members.sort();
            cycles.push(members);
        }
    }
    cycles.sort();
    violations.extend(cycles.into_iter().map(|cycle| Violation::NonTerminating { cycle }));

    // ── Authority ──────────────────────────────────────────────
    // Grouping by operation tag; the engine never diffs prose, so shared
    // tags must carry an explicit supersedes/conflicts_with relation.
    let mut by_tag: HashMap<&str, Vec<&NodeId>> = HashMap::new();
    for node in index.nodes() {
        for tag in &node.operation_tags {
            by_tag.entry(tag).or_default().push(&node.id);
        }
    }
    let mut ambiguous: Vec<(String, Vec<NodeId>)> = Vec::new();
    for (tag, mut members) in by_tag {
        if members.len() < 2 {
            continue;
        }
        members.sort();
        let related = |a: &NodeId, b: &NodeId| {
            let na = index.get(a).expect("member exists");
            let nb = index.get(b).expect("member exists");
            na.supersedes.contains(b)
                || na.conflicts_with.contains(b)
                || nb.supersedes.contains(a)
                || nb.conflicts_with.contains(a)
        };
        let all_related = members
            .iter()
            .enumerate()
            .all(|(i, &a)| members[i + 1..].iter().all(|&b| related(a, b)));
        if !all_related {
            ambiguous.push((tag.to_string(), members.into_iter().cloned().collect()));
        }
    }
    ambiguous.sort();
    violations.extend(
        ambiguous
            .into_iter()
            .map(|(tag, nodes)| Violation::AmbiguousAuthority { tag, nodes }),
    );

    ValidationReport {
        reachable: reachable.len(),
        violations,
    }
}

/// Kosaraju's algorithm restricted to `scope`. Returns components in a
/// deterministic order.
fn strongly_connected<'a>(
    scope: &HashSet<&'a NodeId>,
    adjacency: &HashMap<&'a NodeId, Vec<&'a NodeId>>,
) -> Vec<Vec<&'a NodeId>> {
    let mut order: Vec<&NodeId> = Vec::with_capacity(scope.len());
    let mut visited: HashSet<&NodeId> = HashSet::new();

    let mut roots: Vec<&NodeId> = scope.iter().copied().collect();
    roots.sort();

    // First pass: DFS finish order on the forward graph.
    for &root in &roots {
        if visited.contains(root) {
            continue;
        }
        // Iterative DFS with an explicit "children remaining" cursor.
        let mut stack: Vec<(&NodeId, usize)> = vec![(root, 0)];
        visited.insert(root);
        while let Some((id, cursor)) = stack.pop() {
            let targets = adjacency.get(id).map(Vec::as_slice).unwrap_or(&[]);
            let next = targets[cursor..]
                .iter()
                .enumerate()
                .find(|(_, t)| scope.contains(*t) && !visited.contains(*t));
            match next {
                Some((offset, &target)) => {
                    stack.push((id, cursor + offset + 1));
                    visited.insert(target);
                    stack.push((target, 0));
                }
                None => order.push(id),
            }
        }
    }

    // Reverse adjacency within scope.
    let mut reverse: HashMap<&NodeId, Vec<&NodeId>> = HashMap::new();
    for (&from, targets) in adjacency {
        if !scope.contains(from) {
            continue;
        }
        for &target in targets {
            if scope.contains(target) {
                reverse.entry(target).or_default().push(from);
            }
        }
    }

    // Second pass: collect components on the reversed graph.
    let mut assigned: HashSet<&NodeId> = HashSet::new();
    let mut components = Vec::new();
    for &id in order.iter().rev() {
        if assigned.contains(id) {
            continue;
        }
        let mut component = Vec::new();
        let mut stack = vec![id];
        assigned.insert(id);
        while let Some(current) = stack.pop() {
            component.push(current);
            for &pred in reverse.get(current).into_iter().flatten() {
                if assigned.insert(pred) {
                    stack.push(pred);
                }
            }
        }
        components.push(component);
    }
    components
}

#[cfg(test)]
mod tests {
    use super::*;
    use guidepost_core::{NodeId, Step, Tier, Trigger};
    use guidepost_corpus::Node;

    fn config(entries: &[&str]) -> ValidatorConfig {
        ValidatorConfig {
            entry_points: entries.iter().map(|e| NodeId::from(*e)).collect(),
            ..Default::default()
        }
    }

    /// A small three-tier corpus with no defects.
    fn clean_corpus() -> CorpusIndex {
        CorpusIndex::from_nodes(vec![
            Node::new("start", Tier::Core)
                .with_steps(vec![
                    Step::Load(NodeId::from("pg/tune")),
                    Step::Load(NodeId::from("pg/diagnose")),
                ])
                .halting(true),
            Node::new("pg/tune", Tier::Primary)
                .with_trigger(Trigger::new("tune database"))
                .with_steps(vec![Step::Done("tuned".into())])
                .halting(true),
            Node::new("pg/diagnose", Tier::Secondary)
                .with_trigger(Trigger::new("diagnose slowness"))
                .with_steps(vec![
                    Step::Load(NodeId::from("pg/internals")),
                    Step::Done("diagnosed".into()),
                ])
                .halting(true),
            Node::new("pg/internals", Tier::Advanced)
                .with_trigger(Trigger::explicit("page layout"))
                .with_steps(vec![Step::Done("explained".into())])
                .halting(true),
        ])
        .unwrap()
    }

    #[test]
    fn clean_corpus_has_zero_violations() {
        let report = validate(&clean_corpus(), &config(&["start"]));
        assert!(report.is_clean(), "{:?}", report.violations);
        assert_eq!(report.reachable, 4);
    }

    #[test]
    fn unreached_node_is_an_orphan_unless_allowed() {
        let index = CorpusIndex::from_nodes(vec![
            Node::new("start", Tier::Core).halting(true),
            Node::new("island", Tier::Primary)
                .with_trigger(Trigger::new("island"))
                .halting(true),
        ])
        .unwrap();

        let report = validate(&index, &config(&["start"]));
        assert_eq!(report.violations.len(), 1);
        assert!(matches!(
            &report.violations[0],
            Violation::Orphan { node } if node == &NodeId::from("island")
        ));

        let mut cfg = config(&["start"]);
        cfg.orphan_allowlist = vec![NodeId::from("island")];
        assert!(validate(&index, &cfg).is_clean());
    }

    #[test]
    fn two_node_cycle_without_halt_is_exactly_one_violation() {
        let index = CorpusIndex::from_nodes(vec![
            Node::new("start", Tier::Core)
                .with_steps(vec![Step::Load(NodeId::from("a"))])
                .halting(true),
            Node::new("a", Tier::Primary)
                .with_steps(vec![Step::Continue(NodeId::from("b"))]),
            Node::new("b", Tier::Primary)
                .with_steps(vec![Step::Continue(NodeId::from("a"))]),
        ])
        .unwrap();

        let report = validate(&index, &config(&["start"]));
        assert_eq!(report.violations.len(), 1, "{:?}", report.violations);
        match &report.violations[0] {
            Violation::NonTerminating { cycle } => {
                assert_eq!(cycle, &vec![NodeId::from("a"), NodeId::from("b")]);
            }
            other => panic!("expected NonTerminating, got {other:?}"),
        }
    }

    #[test]
    fn cycle_with_an_escape_to_halt_is_fine() {
        let index = CorpusIndex::from_nodes(vec![
            Node::new("start", Tier::Core)
                .with_steps(vec![Step::Load(NodeId::from("a"))])
                .halting(true),
            Node::new("a", Tier::Primary).with_steps(vec![
                Step::Continue(NodeId::from("b")),
            ]),
            Node::new("b", Tier::Primary).with_steps(vec![
                Step::Continue(NodeId::from("a")),
                Step::Load(NodeId::from("exit")),
            ]),
            Node::new("exit", Tier::Primary)
                .with_steps(vec![Step::Done("out".into())])
                .halting(true),
        ])
        .unwrap();

        let report = validate(&index, &config(&["start"]));
        assert!(report.is_clean(), "{:?}", report.violations);
    }

    #[test]
    fn long_chain_exceeds_max_depth() {
        let mut nodes = vec![Node::new("start", Tier::Core)
            .with_steps(vec![Step::Load(NodeId::from("n0"))])
            .halting(true)];
        for i in 0..5 {
            let next = if i == 4 {
                Step::Done("end".into())
            } else {
                Step::Continue(NodeId::from(format!("n{}", i + 1).as_str()))
            };
            let node = Node::new(format!("n{i}"), Tier::Primary).with_steps(vec![next]);
            nodes.push(if i == 4 { node.halting(true) } else { node });
        }
        let index = CorpusIndex::from_nodes(nodes).unwrap();

        let mut cfg = config(&["start"]);
        cfg.max_depth = 2;
        let report = validate(&index, &cfg);
        assert!(report
            .violations
            .iter()
            .any(|v| matches!(v, Violation::DepthExceeded { node, .. } if node == &NodeId::from("n0"))));

        cfg.max_depth = 50;
        assert!(validate(&index, &cfg).is_clean());
    }

    #[test]
    fn shared_tag_without_relation_is_ambiguous() {
        let make = |id: &str| {
            Node::new(id, Tier::Primary)
                .with_trigger(Trigger::new(id))
                .with_tag("create-index")
                .halting(true)
        };
        let index = CorpusIndex::from_nodes(vec![
            Node::new("start", Tier::Core)
                .with_steps(vec![
                    Step::Load(NodeId::from("old")),
                    Step::Load(NodeId::from("new")),
                ])
                .halting(true),
            make("old"),
            make("new"),
        ])
        .unwrap();

        let report = validate(&index, &config(&["start"]));
        assert_eq!(report.violations.len(), 1);
        assert!(matches!(
            &report.violations[0],
            Violation::AmbiguousAuthority { tag, nodes }
                if tag == "create-index" && nodes.len() == 2
        ));

        // Declaring the relation resolves it.
        let mut newer = make("new");
        newer.supersedes = vec![NodeId::from("old")];
        let index = CorpusIndex::from_nodes(vec![
            Node::new("start", Tier::Core)
                .with_steps(vec![
                    Step::Load(NodeId::from("old")),
                    Step::Load(NodeId::from("new")),
                ])
                .halting(true),
            make("old"),
            newer,
        ])
        .unwrap();
        assert!(validate(&index, &config(&["start"])).is_clean());
    }

    #[test]
    fn missing_entry_point_is_reported() {
        let index =
            CorpusIndex::from_nodes(vec![Node::new("start", Tier::Core).halting(true)]).unwrap();
        let report = validate(&index, &config(&["nowhere"]));
        assert!(report
            .violations
            .iter()
            .any(|v| matches!(v, Violation::MissingEntryPoint { node } if node == &NodeId::from("nowhere"))));
    }
}
