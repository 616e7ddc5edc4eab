//! # guidepost-matcher
//!
//! Maps free-text utterances onto candidate corpus nodes. Scoring is
//! pluggable behind [`IntentMatcher`]; tier precedence, the epsilon
//! tie-break, Advanced gating, and the confidence floor live in
//! [`resolve`] so every matcher implementation inherits the same policy.

use serde::{Deserialize, Serialize};
use tracing::debug;

use guidepost_core::{NodeId, Tier};
use guidepost_corpus::CorpusIndex;

/// Raw per-node score from a matcher implementation, before policy.
#[derive(Debug, Clone)]
pub struct RawScore {
    pub node: NodeId,
    pub score: f32,
    pub matched_pattern: String,
}

/// The output of intent resolution. Ephemeral, never persisted.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Match {
    pub node: NodeId,
    pub tier: Tier,
    pub confidence: f32,
    pub matched_pattern: String,
}

/// Knobs for the resolution policy.
#[derive(Debug, Clone, Copy)]
pub struct MatchPolicy {
    /// Candidates below this confidence are dropped; an empty result is
    /// not an error, it means "ask the user".
    pub min_confidence: f32,
    /// Two candidates within this band are a tie; the lower tier wins
    /// outright, never probabilistically.
    pub tie_epsilon: f32,
}

impl Default for MatchPolicy {
    fn default() -> Self {
        Self {
            min_confidence: 0.25,
            tie_epsilon: 0.1,
        }
    }
}

/// A scoring strategy. The default is keyword overlap; an
/// embedding-similarity scorer can be substituted behind the same
/// contract. Implementations must be pure functions of their inputs.
pub trait IntentMatcher: Send + Sync {
    fn score(&self, utterance: &str, index: &CorpusIndex) -> Vec<RawScore>;
}

/// Surface-level normalization: lowercase, strip punctuation, tokenize on
/// whitespace. Deliberately not semantic.
pub fn normalize(utterance: &str) -> Vec<String> {
    utterance
        .to_lowercase()
        .split(|c: char| !c.is_alphanumeric())
        .filter(|t| !t.is_empty())
        .map(|t| t.to_string())
        .collect()
}

/// Default keyword matcher: per node, confidence is the best trigger's
/// fraction of matched tokens.
pub struct KeywordMatcher;

impl IntentMatcher for KeywordMatcher {
    fn score(&self, utterance: &str, index: &CorpusIndex) -> Vec<RawScore> {
        let tokens = normalize(utterance);
        let mut scores = Vec::new();

        for node in index.nodes() {
            let mut best: Option<(f32, &str)> = None;
            for trigger in &node.triggers {
                let pattern_tokens = normalize(&trigger.pattern);
                if pattern_tokens.is_empty() {
                    continue;
                }
                let matched = pattern_tokens
                    .iter()
                    .filter(|t| tokens.contains(t))
                    .count();
                if matched == 0 {
                    continue;
                }
                let score = matched as f32 / pattern_tokens.len() as f32;
                if best.map(|(s, _)| score > s).unwrap_or(true) {
                    best = Some((score, trigger.pattern.as_str()));
                }
            }
            if let Some((score, pattern)) = best {
                scores.push(RawScore {
                    node: node.id.clone(),
                    score,
                    matched_pattern: pattern.to_string(),
                });
            }
        }

        scores
    }
}

/// Whether the utterance contains, in full, at least one trigger pattern
/// marked `requires_explicit` on the node. Gate for Advanced eligibility:
/// Advanced must never be guessed into.
fn explicit_marker_present(utterance_tokens: &[String], node: &guidepost_corpus::Node) -> bool {
    node.triggers
        .iter()
        .filter(|t| t.requires_explicit)
        .any(|t| {
            let pattern_tokens = normalize(&t.pattern);
            !pattern_tokens.is_empty()
                && pattern_tokens.iter().all(|p| utterance_tokens.contains(p))
        })
}

/// Resolve an utterance to an ordered candidate list.
///
/// Policy, applied on top of any [`IntentMatcher`]:
/// 1. Advanced nodes are dropped unless an explicit marker pattern is
///    present in the utterance.
/// 2. Candidates below `min_confidence` are dropped; no candidates at all
///    yields an empty vector (caller asks for clarification).
/// 3. Ordering: higher confidence wins, except that candidates within
///    `tie_epsilon` of each other tie, and a tie goes to the lower tier
///    (Core before Primary before Secondary before Advanced). `tier_bias`
///    flips only a Secondary/Advanced tie toward Advanced when the session
///    is already in Advanced context.
///
/// Pure function of its arguments: same inputs, same ordered output.
pub fn resolve(
    utterance: &str,
    tier_bias: Option<Tier>,
    index: &CorpusIndex,
    matcher: &dyn IntentMatcher,
    policy: &MatchPolicy,
) -> Vec<Match> {
    let tokens = normalize(utterance);
    let mut candidates: Vec<Match> = Vec::new();

    for raw in matcher.score(utterance, index) {
        let Some(node) = index.get(&raw.node) else {
            continue;
        };
        if node.tier == Tier::Advanced && !explicit_marker_present(&tokens, node) {
            debug!(node = %node.id, "advanced candidate dropped: no explicit marker");
            continue;
        }
        if raw.score < policy.min_confidence {
            continue;
        }
        candidates.push(Match {
            node: raw.node,
            tier: node.tier,
            confidence: raw.score,
            matched_pattern: raw.matched_pattern,
        });
    }

    // Deterministic base order before the tie-break comparison.
    candidates.sort_by(|a, b| {
        b.confidence
            .total_cmp(&a.confidence)
            .then(a.tier.precedence().cmp(&b.tier.precedence()))
            .then(a.node.cmp(&b.node))
    });

    // Selection by pairwise "beats": the epsilon band is not transitive,
    // so ordering is fixed by repeatedly extracting the strongest
    // remaining candidate from the already-deterministic base order.
    let mut ordered = Vec::with_capacity(candidates.len());
    while !candidates.is_empty() {
        let mut best = 0;
        for i in 1..candidates.len() {
            if beats(&candidates[i], &candidates[best], tier_bias, policy) {
                best = i;
            }
        }
        ordered.push(candidates.remove(best));
    }
    ordered
}

/// True if `a` outranks `b` under the tie-break policy.
fn beats(a: &Match, b: &Match, tier_bias: Option<Tier>, policy: &MatchPolicy) -> bool {
    if a.confidence > b.confidence + policy.tie_epsilon {
        return true;
    }
    if b.confidence > a.confidence + policy.tie_epsilon {
        return false;
    }
    // Within the tie band. Bias only flips a Secondary/Advanced tie.
    if tier_bias == Some(Tier::Advanced)
        && a.tier == Tier::Advanced
        && b.tier == Tier::Secondary
    {
        return true;
    }
    if tier_bias == Some(Tier::Advanced)
        && a.tier == Tier::Secondary
        && b.tier == Tier::Advanced
    {
        return false;
    }
    match a.tier.precedence().cmp(&b.tier.precedence()) {
        std::cmp::Ordering::Less => true,
        std::cmp::Ordering::Greater => false,
        std::cmp::Ordering::Equal => match a.confidence.total_cmp(&b.confidence) {
            std::cmp::Ordering::Greater => true,
            std::cmp::Ordering::Less => false,
            std::cmp::Ordering::Equal => a.node < b.node,
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use guidepost_core::Trigger;
    use guidepost_corpus::Node;

    fn index(nodes: Vec<Node>) -> CorpusIndex {
        CorpusIndex::from_nodes(nodes.into_iter().map(|n| n.halting(true)).collect()).unwrap()
    }

    fn top<'a>(matches: &'a [Match]) -> &'a NodeId {
        &matches.first().expect("expected at least one match").node
    }

    #[test]
    fn normalization_strips_case_and_punctuation() {
        assert_eq!(
            normalize("Deploy, the CONNECTOR!"),
            vec!["deploy", "the", "connector"]
        );
        assert!(normalize("?!").is_empty());
    }

    #[test]
    fn keyword_scoring_is_fraction_of_trigger_tokens() {
        let idx = index(vec![Node::new("a", Tier::Primary)
            .with_trigger(Trigger::new("deploy postgres connector"))]);
        let scores = KeywordMatcher.score("deploy the connector", &idx);
        assert_eq!(scores.len(), 1);
        assert!((scores[0].score - 2.0 / 3.0).abs() < 1e-6);
        assert_eq!(scores[0].matched_pattern, "deploy postgres connector");
    }

    #[test]
    fn tie_break_primary_wins_over_secondary() {
        let idx = index(vec![
            Node::new("sec", Tier::Secondary).with_trigger(Trigger::new("tune index")),
            Node::new("pri", Tier::Primary).with_trigger(Trigger::new("tune query")),
        ]);
        // "tune" alone matches half of each trigger: equal raw scores.
        let matches = resolve("tune", None, &idx, &KeywordMatcher, &MatchPolicy::default());
        assert_eq!(matches.len(), 2);
        assert_eq!(top(&matches), &NodeId::from("pri"));
    }

    #[test]
    fn decisive_secondary_outranks_weak_primary() {
        let idx = index(vec![
            Node::new("pri", Tier::Primary).with_trigger(Trigger::new("check one two three")),
            Node::new("sec", Tier::Secondary).with_trigger(Trigger::new("vacuum")),
        ]);
        // Primary matches 1/4 tokens, Secondary matches 1/1: well past epsilon.
        let matches = resolve(
            "vacuum check",
            None,
            &idx,
            &KeywordMatcher,
            &MatchPolicy::default(),
        );
        assert_eq!(top(&matches), &NodeId::from("sec"));
    }

    #[test]
    fn core_wins_ties_against_everything() {
        let idx = index(vec![
            Node::new("pri", Tier::Primary).with_trigger(Trigger::new("reset context")),
            Node::new("safety", Tier::Core).with_trigger(Trigger::new("reset session")),
        ]);
        let matches = resolve("reset", None, &idx, &KeywordMatcher, &MatchPolicy::default());
        assert_eq!(top(&matches), &NodeId::from("safety"));
    }

    #[test]
    fn advanced_requires_explicit_marker() {
        let idx = index(vec![Node::new("adv", Tier::Advanced)
            .with_trigger(Trigger::new("connector"))
            .with_trigger(Trigger::explicit("recordpath transform"))]);

        // Shared vocabulary alone must not make Advanced eligible.
        let matches = resolve(
            "connector",
            None,
            &idx,
            &KeywordMatcher,
            &MatchPolicy::default(),
        );
        assert!(matches.is_empty());

        // The explicit marker in full makes it eligible.
        let matches = resolve(
            "apply a RecordPath transform",
            None,
            &idx,
            &KeywordMatcher,
            &MatchPolicy::default(),
        );
        assert_eq!(top(&matches), &NodeId::from("adv"));
    }

    #[test]
    fn confidence_floor_yields_empty_not_error() {
        let idx = index(vec![Node::new("a", Tier::Primary)
            .with_trigger(Trigger::new("one two three four five"))]);
        let matches = resolve("one", None, &idx, &KeywordMatcher, &MatchPolicy::default());
        // 1/5 = 0.2 is under the 0.25 floor.
        assert!(matches.is_empty());
    }

    #[test]
    fn bias_flips_secondary_advanced_tie_only() {
        let idx = index(vec![
            Node::new("sec", Tier::Secondary).with_trigger(Trigger::new("partition pruning")),
            Node::new("adv", Tier::Advanced)
                .with_trigger(Trigger::explicit("partition splitting")),
        ]);
        // The explicit marker must be present for "adv" to be eligible.
        let utterance_explicit = "partition splitting pruning";

        let neutral = resolve(
            utterance_explicit,
            None,
            &idx,
            &KeywordMatcher,
            &MatchPolicy::default(),
        );
        assert_eq!(top(&neutral), &NodeId::from("sec"));

        let biased = resolve(
            utterance_explicit,
            Some(Tier::Advanced),
            &idx,
            &KeywordMatcher,
            &MatchPolicy::default(),
        );
        assert_eq!(top(&biased), &NodeId::from("adv"));

        // Bias never overrides the Primary rule.
        let idx2 = index(vec![
            Node::new("pri", Tier::Primary).with_trigger(Trigger::new("partition pruning")),
            Node::new("adv", Tier::Advanced)
                .with_trigger(Trigger::explicit("partition splitting")),
        ]);
        let biased = resolve(
            "partition splitting pruning",
            Some(Tier::Advanced),
            &idx2,
            &KeywordMatcher,
            &MatchPolicy::default(),
        );
        assert_eq!(top(&biased), &NodeId::from("pri"));
    }

    #[test]
    fn resolution_is_deterministic() {
        let idx = index(vec![
            Node::new("a", Tier::Primary).with_trigger(Trigger::new("deploy connector")),
            Node::new("b", Tier::Primary).with_trigger(Trigger::new("deploy pipeline")),
            Node::new("c", Tier::Secondary).with_trigger(Trigger::new("deploy cluster")),
        ]);
        let first = resolve("deploy", None, &idx, &KeywordMatcher, &MatchPolicy::default());
        for _ in 0..5 {
            let again = resolve("deploy", None, &idx, &KeywordMatcher, &MatchPolicy::default());
            let ids: Vec<_> = again.iter().map(|m| m.node.clone()).collect();
            let expected: Vec<_> = first.iter().map(|m| m.node.clone()).collect();
            assert_eq!(ids, expected);
        }
    }
}
