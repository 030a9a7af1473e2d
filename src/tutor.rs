//! Tutor facade: the one-call public entry point.
//!
//! Owns the knowledge base, the NLP preprocessor, the rule engine, and the
//! user profile, and drives one reasoning cycle per `process_query` call:
//! profile snapshot → NLP extraction → topic selection → clarification check
//! → engine run → CF aggregation → response assembly → trace. The cycle
//! never returns an error to the host; every failure becomes a response
//! variant or a trace annotation.

use std::sync::Arc;

use serde::Serialize;

use crate::cf::{self, ConfidenceBands, ConfidenceLevel};
use crate::clarify::{ClarificationMachine, Verdict};
use crate::engine::{EngineConfig, EngineRun, FiredRule, RuleEngine};
use crate::enrich::{EnrichConfig, EnrichMode, EnrichRequest, Enricher, enrich_with_timeout};
use crate::error::{EnrichError, TutorResult};
use crate::fact::{Fact, FactOrigin, FactValue, QUERY_TOPIC, WorkingMemory};
use crate::kb::{ClarifyNode, KnowledgeBase, Rule};
use crate::nlp::{NlpConfig, Preprocessor};
use crate::profile::UserProfile;
use crate::trace::{
    ChainPosition, ClarificationNote, EnrichmentStatus, ErroredNote, FiredNote, Outcome,
    ReasoningTrace,
};

/// Configuration for the tutor.
#[derive(Debug, Clone, Default)]
pub struct TutorConfig {
    pub bands: ConfidenceBands,
    pub nlp: NlpConfig,
    pub engine: EngineConfig,
    pub enrich: EnrichConfig,
    /// When set, a clarification turn first tries the engine on the facts it
    /// already has and answers outright if the trial aggregate meets this
    /// threshold. `None` always clarifies.
    pub answer_without_clarify_cf: Option<f32>,
}

/// The tutor's reply to one query.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Response {
    Answer {
        concept: String,
        explanation: String,
        topic: String,
        subject: String,
        subtopic: String,
        examples: Vec<String>,
        aggregate_cf: f32,
        confidence_level: ConfidenceLevel,
        /// Fired rule ids in firing order.
        fired_rule_ids: Vec<String>,
        inferred_facts: Vec<Fact>,
    },
    Clarify {
        prompt: String,
        allowed_values: Vec<String>,
        fact_name: String,
    },
    NoMatch {
        reason: String,
    },
}

/// Multi-turn state while a clarification chain is being walked.
struct DialogueState {
    topic: String,
    /// Facts accumulated across clarification turns, replayed into each
    /// new cycle of the same dialogue.
    facts: Vec<Fact>,
    pending: Option<ClarifyNode>,
}

/// The study-guide tutor.
pub struct Tutor {
    kb: Arc<KnowledgeBase>,
    nlp: Preprocessor,
    engine: RuleEngine,
    profile: UserProfile,
    config: TutorConfig,
    enricher: Option<Arc<dyn Enricher>>,
    dialogue: Option<DialogueState>,
    last_trace: Option<ReasoningTrace>,
}

impl Default for Tutor {
    fn default() -> Self {
        Self::new()
    }
}

impl Tutor {
    /// A tutor over the bundled curricular packs with default configuration.
    pub fn new() -> Self {
        Self::with_kb(KnowledgeBase::bundled(), TutorConfig::default())
    }

    pub fn with_config(config: TutorConfig) -> Self {
        Self::with_kb(KnowledgeBase::bundled(), config)
    }

    pub fn with_kb(kb: KnowledgeBase, config: TutorConfig) -> Self {
        let nlp = Preprocessor::from_kb(&kb, config.nlp);
        tracing::info!(
            rules = kb.rule_count(),
            topics = kb.all_topics().len(),
            "tutor initialized"
        );
        Self {
            kb: Arc::new(kb),
            nlp,
            engine: RuleEngine::new(config.engine.clone()),
            profile: UserProfile::new(),
            config,
            enricher: None,
            dialogue: None,
            last_trace: None,
        }
    }

    /// Install an enrichment hook. Enrichment still needs
    /// `config.enrich.enabled` to run.
    pub fn with_enricher(mut self, enricher: Arc<dyn Enricher>) -> Self {
        self.enricher = Some(enricher);
        self
    }

    pub fn kb(&self) -> &KnowledgeBase {
        &self.kb
    }

    // -----------------------------------------------------------------------
    // Host-application API
    // -----------------------------------------------------------------------

    /// Run one reasoning cycle over an utterance.
    pub fn process_query(&mut self, utterance: &str) -> Response {
        let profile_facts = self.profile.snapshot();
        self.cycle(utterance, profile_facts)
    }

    /// Like [`process_query`](Self::process_query), with one-shot profile
    /// overrides taking precedence over the stored profile for this cycle.
    pub fn process_query_with(&mut self, utterance: &str, overrides: &UserProfile) -> Response {
        // Overrides first: working memory keeps the first fact on equal
        // confidence, so override values win ties against stored ones.
        let mut facts = overrides.snapshot();
        facts.extend(self.profile.snapshot());
        self.cycle(utterance, facts)
    }

    pub fn update_profile(
        &mut self,
        name: impl Into<String>,
        value: impl Into<FactValue>,
    ) -> TutorResult<()> {
        self.profile.set(name, value)?;
        Ok(())
    }

    pub fn get_profile(&self) -> &UserProfile {
        &self.profile
    }

    pub fn clear_profile(&mut self) {
        self.profile.clear();
    }

    /// Append a rule to the knowledge base at runtime.
    pub fn add_rule_to_kb(&self, subject: &str, rule: Rule) -> TutorResult<()> {
        self.kb.add(subject, rule)?;
        Ok(())
    }

    /// Render the trace of the most recent cycle.
    pub fn get_explanation(&self) -> String {
        match &self.last_trace {
            Some(trace) => trace.render(),
            None => "no reasoning cycle has run yet".into(),
        }
    }

    pub fn last_trace(&self) -> Option<&ReasoningTrace> {
        self.last_trace.as_ref()
    }

    /// Drop any in-progress clarification dialogue.
    pub fn reset_dialogue(&mut self) {
        self.dialogue = None;
    }

    // -----------------------------------------------------------------------
    // The reasoning cycle
    // -----------------------------------------------------------------------

    fn cycle(&mut self, utterance: &str, profile_facts: Vec<Fact>) -> Response {
        let mut trace = ReasoningTrace::new(utterance);
        let extraction = self.nlp.extract(utterance);
        trace.normalized = extraction.normalized.clone();
        trace.profile_facts = profile_facts.clone();
        trace.extracted_facts = extraction.facts.clone();
        trace.topic_candidates = extraction.topic_candidates.clone();

        // Candidates arrive confidence-descending, tag-ascending, so the
        // first entry is already the lexicographic tie-break winner.
        let detected_topic = extraction.topic_candidates.first().cloned();

        // --- Dialogue continuation and topic selection ---
        let mut clarify_attempt: Option<String> = None;
        let active_topic: Option<(String, f32)> = match (&self.dialogue, &detected_topic) {
            // Follow-up turn inside a clarification dialogue.
            (Some(dialogue), None) => {
                if dialogue.pending.is_some() {
                    clarify_attempt = Some(extraction.normalized.clone());
                }
                Some((dialogue.topic.clone(), 1.0))
            }
            // Same topic re-triggered: continue the dialogue.
            (Some(dialogue), Some((tag, conf))) if *tag == dialogue.topic => {
                Some((tag.clone(), *conf))
            }
            // A different topic resets the dialogue.
            (_, Some((tag, conf))) => {
                self.dialogue = None;
                Some((tag.clone(), *conf))
            }
            (None, None) => None,
        };

        let Some((topic, topic_confidence)) = active_topic else {
            let reason =
                "no curricular topic recognised; please rephrase using subject vocabulary"
                    .to_string();
            trace.no_match_reason = Some(reason.clone());
            self.last_trace = Some(trace);
            return Response::NoMatch { reason };
        };
        trace.active_topic = Some(topic.clone());

        // --- Working memory assembly ---
        let mut wm = WorkingMemory::new();
        for fact in profile_facts {
            wm.insert(fact);
        }
        if let Some(dialogue) = &self.dialogue {
            for fact in &dialogue.facts {
                wm.insert(fact.clone());
            }
        }
        for fact in &extraction.facts {
            wm.insert(fact.clone());
        }
        // A bare follow-up answer ("epithelial") that names an allowed value
        // for the pending node becomes a clarification-answer fact.
        if let (Some(dialogue), Some(attempt)) = (&self.dialogue, &clarify_attempt) {
            if let Some(pending) = &dialogue.pending {
                if pending
                    .values
                    .iter()
                    .any(|v| v.eq_ignore_ascii_case(attempt))
                {
                    wm.insert(
                        Fact::new(pending.fact.clone(), FactValue::Text(attempt.clone()))
                            .with_origin(FactOrigin::ClarifyAnswer),
                    );
                }
            }
        }
        wm.insert(Fact::new(QUERY_TOPIC, topic.clone()).with_confidence(topic_confidence));

        // --- Clarification check ---
        let chain: Option<Vec<ClarifyNode>> =
            self.kb.clarification_chain(&topic).map(|c| c.to_vec());
        let machine = ClarificationMachine::new(chain.as_deref());
        trace.chain_position = (machine.chain_len() > 0).then(|| ChainPosition {
            satisfied: machine.position(&wm),
            total: machine.chain_len(),
        });

        match machine.consult(&wm) {
            Verdict::Clarify {
                fact_name,
                allowed_values,
                prompt,
                out_of_domain,
            } => {
                // Optional escape hatch: answer anyway if a trial run is
                // already confident enough.
                if let Some(threshold) = self.config.answer_without_clarify_cf {
                    let mut trial_wm = wm.clone();
                    let rules = self.kb.lookup(&topic);
                    let run = self.engine.run(&mut trial_wm, &rules);
                    let aggregate =
                        cf::aggregate(run.fired.iter().map(|f| (f.rule_id.as_str(), f.cf)));
                    if !run.fired.is_empty() && aggregate >= threshold {
                        tracing::debug!(
                            %topic,
                            aggregate = %aggregate,
                            threshold = %threshold,
                            "answering without clarifying"
                        );
                        self.dialogue = None;
                        return self.answer(utterance, trace, run);
                    }
                }

                // An unexpected follow-up answer re-emits the same prompt.
                let out_of_domain = out_of_domain.or_else(|| {
                    clarify_attempt.filter(|a| {
                        !a.is_empty()
                            && self
                                .dialogue
                                .as_ref()
                                .and_then(|d| d.pending.as_ref())
                                .is_some_and(|p| p.fact == fact_name)
                    })
                });
                if let Some(value) = &out_of_domain {
                    tracing::debug!(fact = %fact_name, %value, "out-of-domain clarification answer");
                }
                trace.clarification = Some(ClarificationNote {
                    fact_name: fact_name.clone(),
                    prompt: prompt.clone(),
                    out_of_domain,
                });
                trace.outcome = Outcome::Clarify;

                // Remember the turn for the follow-up.
                let pending = chain
                    .as_deref()
                    .and_then(|c| c.iter().find(|n| n.fact == fact_name))
                    .cloned();
                let mut facts: Vec<Fact> =
                    self.dialogue.take().map(|d| d.facts).unwrap_or_default();
                facts.extend(extraction.facts.iter().cloned());
                facts.extend(
                    wm.iter()
                        .filter(|f| f.origin == FactOrigin::ClarifyAnswer)
                        .cloned(),
                );
                self.dialogue = Some(DialogueState {
                    topic,
                    facts,
                    pending,
                });

                self.last_trace = Some(trace);
                Response::Clarify {
                    prompt,
                    allowed_values,
                    fact_name,
                }
            }
            Verdict::Answer => {
                let rules = self.kb.lookup(&topic);
                let run = self.engine.run(&mut wm, &rules);
                self.dialogue = None;
                self.answer(utterance, trace, run)
            }
        }
    }

    /// Compose the answer response from an engine run.
    fn answer(&mut self, utterance: &str, mut trace: ReasoningTrace, run: EngineRun) -> Response {
        trace.engine_state = Some(run.state.to_string());
        trace.errored = run
            .failures
            .iter()
            .map(|f| ErroredNote {
                rule_id: f.rule_id.clone(),
                message: f.error.to_string(),
            })
            .collect();
        trace.inferred = run.inferred.clone();

        if run.fired.is_empty() {
            let topic = trace.active_topic.clone().unwrap_or_default();
            let reason = format!("no authored rule matched the question for topic \"{topic}\"");
            trace.no_match_reason = Some(reason.clone());
            self.last_trace = Some(trace);
            return Response::NoMatch { reason };
        }

        // Canonical aggregation order: rule id ascending, so the aggregate
        // is independent of firing order.
        let mut contributions: Vec<(&str, f32)> = run
            .fired
            .iter()
            .map(|f| (f.rule_id.as_str(), f.cf))
            .collect();
        contributions.sort_by(|a, b| a.0.cmp(b.0));
        let mut running = 0.0_f32;
        for (rule_id, rule_cf) in &contributions {
            running = cf::combine(running, *rule_cf);
            trace.fired.push(FiredNote {
                rule_id: rule_id.to_string(),
                cf: *rule_cf,
                running_aggregate: running,
            });
        }
        let aggregate_cf = running;
        let confidence_level = self.config.bands.classify(aggregate_cf);
        trace.aggregate_cf = aggregate_cf;
        trace.confidence_level = confidence_level;

        // Most specific fired rule: highest CF, then priority, then id.
        let mut ranked: Vec<&FiredRule> = run.fired.iter().collect();
        ranked.sort_by(|a, b| {
            b.cf.partial_cmp(&a.cf)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then_with(|| b.priority.cmp(&a.priority))
                .then_with(|| a.rule_id.cmp(&b.rule_id))
        });
        let response = ranked[0].response.clone();

        let mut explanation = response.explanation.clone();
        trace.enrichment = self.maybe_enrich(
            utterance,
            &response.concept,
            &mut explanation,
            &response.examples,
            aggregate_cf,
        );
        trace.outcome = Outcome::Answer;

        let answer = Response::Answer {
            concept: response.concept,
            explanation,
            topic: response.topic,
            subject: response.subject,
            subtopic: response.subtopic,
            examples: response.examples,
            aggregate_cf,
            confidence_level,
            fired_rule_ids: run.fired.iter().map(|f| f.rule_id.clone()).collect(),
            inferred_facts: run.inferred,
        };
        self.last_trace = Some(trace);
        answer
    }

    /// Run the enrichment hook, if configured. The concept, CF, and fired
    /// rules are already fixed; only the explanation text may change.
    fn maybe_enrich(
        &self,
        utterance: &str,
        concept: &str,
        explanation: &mut String,
        examples: &[String],
        aggregate_cf: f32,
    ) -> EnrichmentStatus {
        if !self.config.enrich.enabled {
            return EnrichmentStatus::NotAttempted;
        }
        let Some(enricher) = &self.enricher else {
            return EnrichmentStatus::NotAttempted;
        };

        let request = EnrichRequest {
            prompt: utterance.to_string(),
            concept: concept.to_string(),
            explanation: explanation.clone(),
            examples: examples.to_vec(),
            aggregate_cf,
        };
        let timeout = self.config.enrich.timeout;
        match enrich_with_timeout(Arc::clone(enricher), request, timeout) {
            Ok(text) => {
                match self.config.enrich.mode {
                    EnrichMode::Replace => *explanation = text,
                    EnrichMode::Append => {
                        explanation.push_str("\n\n");
                        explanation.push_str(&text);
                    }
                }
                EnrichmentStatus::Applied
            }
            Err(EnrichError::Timeout { .. }) => {
                tracing::warn!(timeout_ms = timeout.as_millis() as u64, "enrichment timed out");
                EnrichmentStatus::TimedOut
            }
            Err(e) => {
                tracing::warn!(error = %e, "enrichment failed; using authored explanation");
                EnrichmentStatus::Failed(e.to_string())
            }
        }
    }
}
