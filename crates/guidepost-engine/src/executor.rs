use chrono::Duration;
use std::sync::Arc;
use tracing::{debug, error, info, warn};

use guidepost_core::{GuidepostError, HaltResult, NodeId, Result, SessionId, Step, Tier};
use guidepost_corpus::{CorpusIndex, CorpusStore, Node};
use guidepost_matcher::{resolve, IntentMatcher, MatchPolicy};
use guidepost_session::{Frame, InvestigationDiary, SessionManager};

use crate::provider::FactProvider;

/// Executor knobs.
#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// Step count or stack depth after which, inside a Secondary/Advanced
    /// node, the Investigation Diary is opened.
    pub complexity_threshold: usize,
    /// Hard ceiling on steps (and router transitions) per turn; exceeding
    /// it is an internal error.
    pub max_steps_per_turn: usize,
    /// TTL for facts cached by `discover` steps.
    pub cache_ttl_secs: i64,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            complexity_threshold: 8,
            max_steps_per_turn: 64,
            cache_ttl_secs: 300,
        }
    }
}

/// What one turn produced: the halt plus the instructional transcript
/// emitted along the way.
#[derive(Debug, Clone)]
pub struct TurnOutcome {
    pub halt: HaltResult,
    pub transcript: Vec<String>,
}

/// The workflow executor.
///
/// Per turn: `AwaitingInput → Matching → Dispatching → Executing →
/// Halted(Success | Choice | Error)`. A `Choice` halt is a suspension
/// boundary, not a failure — the stack survives and the next utterance
/// resumes it.
pub struct Executor {
    corpus: CorpusStore,
    sessions: SessionManager,
    diary: InvestigationDiary,
    matcher: Arc<dyn IntentMatcher>,
    provider: Arc<dyn FactProvider>,
    policy: MatchPolicy,
    config: EngineConfig,
}

impl Executor {
    pub fn new(
        corpus: CorpusStore,
        sessions: SessionManager,
        diary: InvestigationDiary,
        matcher: Arc<dyn IntentMatcher>,
        provider: Arc<dyn FactProvider>,
        policy: MatchPolicy,
        config: EngineConfig,
    ) -> Self {
        Self {
            corpus,
            sessions,
            diary,
            matcher,
            provider,
            policy,
            config,
        }
    }

    pub fn sessions(&self) -> &SessionManager {
        &self.sessions
    }

    pub fn diary(&self) -> &InvestigationDiary {
        &self.diary
    }

    pub fn corpus(&self) -> &CorpusStore {
        &self.corpus
    }

    /// Process one user turn. Turns on the same session are strictly
    /// sequential; the run lock is held until the halt is decided and the
    /// session checkpointed.
    pub async fn run_turn(&self, session_id: SessionId, utterance: &str) -> Result<TurnOutcome> {
        let lock = self.sessions.run_lock(session_id).await;
        let _guard = lock.lock().await;

        if self.sessions.get(session_id).await.is_none() {
            return Err(GuidepostError::SessionNotFound(session_id.to_string()));
        }

        // Hold one corpus generation for the whole turn.
        let index = self.corpus.snapshot();
        let mut transcript = Vec::new();

        let halt = self
            .turn_inner(session_id, utterance, &index, &mut transcript)
            .await?;

        self.sessions.record_turn(session_id).await?;
        self.sessions.checkpoint(session_id).await?;

        info!(session = %session_id, halt = ?halt.exit_code(), "turn halted");
        Ok(TurnOutcome { halt, transcript })
    }

    async fn turn_inner(
        &self,
        session_id: SessionId,
        utterance: &str,
        index: &CorpusIndex,
        transcript: &mut Vec<String>,
    ) -> Result<HaltResult> {
        let session = self
            .sessions
            .get(session_id)
            .await
            .ok_or_else(|| GuidepostError::SessionNotFound(session_id.to_string()))?;

        // Re-inject prior hypotheses when a long investigation resumes.
        if session.diary_open && !session.stack.is_empty() {
            for entry in self.diary.read(session_id) {
                transcript.push(format!(
                    "prior hypothesis: {} (evidence: {})",
                    entry.hypothesis, entry.evidence
                ));
            }
        }

        // An Advanced match from last turn awaiting acknowledgement.
        if let Some(pending) = self.sessions.take_pending_confirmation(session_id).await? {
            if is_affirmative(utterance) {
                debug!(session = %session_id, node = %pending, "advanced intent confirmed");
                return self.dispatch(session_id, &pending, utterance, index, transcript).await;
            }
            debug!(session = %session_id, node = %pending, "advanced intent declined");
        }

        // A suspended workflow resumes before any new matching happens.
        if !session.stack.is_empty() {
            return self.execute(session_id, utterance, index, transcript).await;
        }

        // Matching.
        let matches = resolve(
            utterance,
            session.tier_bias,
            index,
            self.matcher.as_ref(),
            &self.policy,
        );
        let Some(best) = matches.first() else {
            // Asking the user is a valid, expected halting state.
            return Ok(HaltResult::choice(
                "I couldn't match that to a workflow. Could you say more about what you need?",
            ));
        };
        debug!(
            session = %session_id,
            node = %best.node,
            tier = %best.tier,
            confidence = best.confidence,
            pattern = %best.matched_pattern,
            "intent matched"
        );

        // Advanced is never silently entered: require a confirmation
        // round-trip before dispatch.
        if best.tier == Tier::Advanced {
            self.sessions
                .set_pending_confirmation(session_id, Some(best.node.clone()))
                .await?;
            return Ok(HaltResult::choice(format!(
                "That looks like the advanced workflow '{}'. Proceed? (yes/no)",
                best.node
            )));
        }

        let node_id = best.node.clone();
        self.dispatch(session_id, &node_id, utterance, index, transcript)
            .await
    }

    /// Dispatching: push the node and start executing its steps.
    async fn dispatch(
        &self,
        session_id: SessionId,
        node_id: &NodeId,
        utterance: &str,
        index: &CorpusIndex,
        transcript: &mut Vec<String>,
    ) -> Result<HaltResult> {
        let Some(node) = index.get(node_id) else {
            // Should be impossible after validation; a corpus bug, not a
            // user error.
            error!(session = %session_id, node = %node_id, "dispatch target missing from index");
            return Ok(HaltResult::internal_error(format!(
                "node '{node_id}' missing from corpus"
            )));
        };
        self.sessions.set_tier_bias(session_id, node.tier).await?;
        self.sessions
            .push_frame(session_id, Frame::new(node_id.clone()))
            .await?;
        self.execute(session_id, utterance, index, transcript).await
    }

    /// Executing: drive the stack until a halt.
    async fn execute(
        &self,
        session_id: SessionId,
        utterance: &str,
        index: &CorpusIndex,
        transcript: &mut Vec<String>,
    ) -> Result<HaltResult> {
        let mut steps_executed = 0usize;

        loop {
            let stack = self.sessions.stack(session_id).await;
            let Some(frame) = stack.last().cloned() else {
                error!(session = %session_id, "executing with an empty stack");
                return Ok(HaltResult::internal_error("workflow stack underflow"));
            };
            let Some(node) = index.get(&frame.node) else {
                error!(session = %session_id, node = %frame.node, "active node missing from index");
                self.sessions.clear_stack(session_id).await?;
                return Ok(HaltResult::internal_error(format!(
                    "node '{}' missing from corpus",
                    frame.node
                )));
            };

            // Router nodes fan out on sub-intent instead of stepping.
            // Each transition consumes the step budget; two routers naming
            // each other as children would otherwise bounce forever.
            if node.router {
                match self.route(node, utterance, index) {
                    Some(child) => {
                        debug!(session = %session_id, router = %node.id, child = %child, "routed");
                        steps_executed += 1;
                        if steps_executed > self.config.max_steps_per_turn {
                            return self.budget_exhausted(session_id, &node.id).await;
                        }
                        self.sessions
                            .replace_top(session_id, Frame::new(child))
                            .await?;
                        continue;
                    }
                    None => {
                        let options: Vec<String> =
                            node.children.iter().map(|c| c.to_string()).collect();
                        return Ok(HaltResult::choice(format!(
                            "Which of these did you mean: {}?",
                            options.join(", ")
                        )));
                    }
                }
            }

            if frame.step >= node.steps.len() {
                // Steps exhausted: return to the caller, or finish.
                self.sessions.pop_frame(session_id).await?;
                if self.sessions.stack(session_id).await.is_empty() {
                    if node.halting {
                        return Ok(HaltResult::success(format!("'{}' complete", node.id)));
                    }
                    error!(session = %session_id, node = %node.id, "non-halting node ran out of steps");
                    return Ok(HaltResult::internal_error(format!(
                        "node '{}' exhausted its steps without halting",
                        node.id
                    )));
                }
                continue;
            }

            steps_executed += 1;
            if steps_executed > self.config.max_steps_per_turn {
                return self.budget_exhausted(session_id, &node.id).await;
            }

            // Complexity: long excursions inside Secondary/Advanced
            // content open the diary. Depth counts as much as step count;
            // a deep stack built up across suspended turns qualifies even
            // when the resuming turn itself is short.
            let session = self
                .sessions
                .get(session_id)
                .await
                .ok_or_else(|| GuidepostError::SessionNotFound(session_id.to_string()))?;
            if !session.diary_open
                && (steps_executed > self.config.complexity_threshold
                    || stack.len() > self.config.complexity_threshold)
                && matches!(node.tier, Tier::Secondary | Tier::Advanced)
            {
                self.diary.open(session_id)?;
                self.sessions.mark_diary_open(session_id).await?;
                transcript.push("investigation diary opened".into());
            }

            let step = node.steps[frame.step].clone();
            debug!(session = %session_id, node = %node.id, step = frame.step, "executing step");

            // Each arm applies its full effect, then advances the frame —
            // a cancelled turn leaves the last step either fully applied
            // or not started.
            match step {
                Step::Note(text) => {
                    transcript.push(text);
                    self.sessions.advance_top(session_id).await?;
                }
                Step::Load(target) => {
                    self.sessions
                        .advance_and_push(session_id, Frame::new(target))
                        .await?;
                }
                Step::Continue(target) => {
                    self.sessions
                        .replace_top(session_id, Frame::new(target))
                        .await?;
                }
                Step::Discover(key) => {
                    match self.sessions.cache_get(session_id, &key).await {
                        Some(value) => {
                            transcript.push(format!("{key}: {value} (cached)"));
                        }
                        None => {
                            let profile = self.sessions.profile(session_id).await;
                            match self.provider.discover(&key, profile.as_ref()).await {
                                Ok(value) => {
                                    self.sessions
                                        .cache_put(
                                            session_id,
                                            &key,
                                            &value,
                                            Duration::seconds(self.config.cache_ttl_secs),
                                        )
                                        .await?;
                                    transcript.push(format!("{key}: {value}"));
                                }
                                Err(e) => {
                                    warn!(session = %session_id, key = %key, error = %e, "discovery failed");
                                    self.sessions.clear_stack(session_id).await?;
                                    return Ok(HaltResult::Error {
                                        kind: "discovery".into(),
                                        message: e.to_string(),
                                    });
                                }
                            }
                        }
                    }
                    self.sessions.advance_top(session_id).await?;
                }
                Step::Hypothesis {
                    hypothesis,
                    evidence,
                } => {
                    if self.diary.is_open(session_id) {
                        self.diary.append(
                            session_id,
                            guidepost_core::DiaryEntry::new(&hypothesis, &evidence),
                        )?;
                    }
                    transcript.push(format!("hypothesis: {hypothesis} (evidence: {evidence})"));
                    self.sessions.advance_top(session_id).await?;
                }
                Step::Prompt(prompt) => {
                    // Advance first so resumption continues past the prompt.
                    self.sessions.advance_top(session_id).await?;
                    return Ok(HaltResult::choice(prompt));
                }
                Step::Done(message) => {
                    self.sessions.clear_stack(session_id).await?;
                    return Ok(HaltResult::success(message));
                }
                Step::Fail { kind, message } => {
                    self.sessions.clear_stack(session_id).await?;
                    return Ok(HaltResult::Error { kind, message });
                }
            }
        }
    }

    async fn budget_exhausted(&self, session_id: SessionId, node: &NodeId) -> Result<HaltResult> {
        error!(session = %session_id, node = %node, "step budget exhausted");
        self.sessions.clear_stack(session_id).await?;
        Ok(HaltResult::internal_error(
            "step budget exhausted; corpus likely loops without halting",
        ))
    }

    /// Pick a router child by sub-intent: resolve against the whole index
    /// (so tier policy applies), then take the best candidate that is a
    /// child of this router.
    fn route(&self, router: &Node, utterance: &str, index: &CorpusIndex) -> Option<NodeId> {
        let matches = resolve(utterance, None, index, self.matcher.as_ref(), &self.policy);
        matches
            .into_iter()
            .find(|m| router.children.contains(&m.node))
            .map(|m| m.node)
    }
}

/// Surface check for "yes, go ahead" on an Advanced confirmation.
fn is_affirmative(utterance: &str) -> bool {
    matches!(
        guidepost_matcher::normalize(utterance).join(" ").as_str(),
        "y" | "yes" | "yeah" | "yep" | "ok" | "okay" | "confirm" | "proceed" | "do it" | "go ahead"
    )
}
