//! Reasoning trace: the explanation facility's raw material.
//!
//! The orchestrator records every step of one reasoning cycle — extracted
//! facts, the active topic, clarification position, each fired rule with its
//! running CF contribution, inferred facts, errored rules, and the enrichment
//! outcome — and `render` turns the record into a human-readable report.

use serde::Serialize;

use crate::cf::ConfidenceLevel;
use crate::fact::{Fact, FactOrigin};

/// How one cycle ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Outcome {
    Answer,
    Clarify,
    NoMatch,
}

impl std::fmt::Display for Outcome {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::Answer => "answer",
            Self::Clarify => "clarify",
            Self::NoMatch => "no_match",
        };
        write!(f, "{s}")
    }
}

/// What happened at the enrichment boundary.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case", tag = "status", content = "detail")]
pub enum EnrichmentStatus {
    /// Enrichment disabled, no hook installed, or the cycle did not answer.
    NotAttempted,
    Applied,
    /// The hook failed; the un-enriched response was returned.
    Failed(String),
    /// The hook exceeded the configured timeout.
    TimedOut,
}

impl std::fmt::Display for EnrichmentStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::NotAttempted => write!(f, "not attempted"),
            Self::Applied => write!(f, "applied"),
            Self::Failed(reason) => write!(f, "failed ({reason})"),
            Self::TimedOut => write!(f, "timed out"),
        }
    }
}

/// One fired rule with its running contribution to the aggregate.
#[derive(Debug, Clone, Serialize)]
pub struct FiredNote {
    pub rule_id: String,
    pub cf: f32,
    /// Aggregate after folding this rule in, in canonical (id-sorted) order.
    pub running_aggregate: f32,
}

/// The clarification the cycle emitted, if any.
#[derive(Debug, Clone, Serialize)]
pub struct ClarificationNote {
    pub fact_name: String,
    pub prompt: String,
    /// Supplied value outside the allowed set; the prompt was re-emitted.
    pub out_of_domain: Option<String>,
}

/// Chain progress for the active topic.
#[derive(Debug, Clone, Copy, Serialize)]
pub struct ChainPosition {
    pub satisfied: usize,
    pub total: usize,
}

/// An errored rule, recorded without sinking the cycle.
#[derive(Debug, Clone, Serialize)]
pub struct ErroredNote {
    pub rule_id: String,
    pub message: String,
}

/// The ordered record of one reasoning cycle.
#[derive(Debug, Clone, Serialize)]
pub struct ReasoningTrace {
    pub utterance: String,
    pub normalized: String,
    pub profile_facts: Vec<Fact>,
    pub extracted_facts: Vec<Fact>,
    pub topic_candidates: Vec<(String, f32)>,
    pub active_topic: Option<String>,
    pub chain_position: Option<ChainPosition>,
    pub clarification: Option<ClarificationNote>,
    pub fired: Vec<FiredNote>,
    pub inferred: Vec<Fact>,
    pub errored: Vec<ErroredNote>,
    pub engine_state: Option<String>,
    pub aggregate_cf: f32,
    pub confidence_level: ConfidenceLevel,
    pub enrichment: EnrichmentStatus,
    pub outcome: Outcome,
    pub no_match_reason: Option<String>,
}

impl ReasoningTrace {
    pub fn new(utterance: impl Into<String>) -> Self {
        Self {
            utterance: utterance.into(),
            normalized: String::new(),
            profile_facts: Vec::new(),
            extracted_facts: Vec::new(),
            topic_candidates: Vec::new(),
            active_topic: None,
            chain_position: None,
            clarification: None,
            fired: Vec::new(),
            inferred: Vec::new(),
            errored: Vec::new(),
            engine_state: None,
            aggregate_cf: 0.0,
            confidence_level: ConfidenceLevel::VeryLow,
            enrichment: EnrichmentStatus::NotAttempted,
            outcome: Outcome::NoMatch,
            no_match_reason: None,
        }
    }

    /// Render the cycle as an indented human-readable report.
    pub fn render(&self) -> String {
        let mut lines: Vec<String> = Vec::new();
        lines.push(format!("utterance: \"{}\"", self.utterance));
        lines.push(format!("normalized: \"{}\"", self.normalized));

        lines.push("profile facts:".into());
        if self.profile_facts.is_empty() {
            lines.push("  (none)".into());
        }
        for fact in &self.profile_facts {
            lines.push(format!("  {fact}"));
        }

        lines.push("extracted facts:".into());
        if self.extracted_facts.is_empty() {
            lines.push("  (none)".into());
        }
        for fact in &self.extracted_facts {
            lines.push(format!("  {fact} (confidence {:.2})", fact.confidence));
        }

        if !self.topic_candidates.is_empty() {
            lines.push("topic candidates:".into());
            for (tag, conf) in &self.topic_candidates {
                lines.push(format!("  {tag} ({conf:.2})"));
            }
        }

        match &self.active_topic {
            Some(topic) => lines.push(format!("active topic: {topic}")),
            None => lines.push("active topic: (none)".into()),
        }

        if let Some(pos) = self.chain_position {
            lines.push(format!(
                "clarification chain: {}/{} nodes satisfied",
                pos.satisfied, pos.total
            ));
        }

        if let Some(note) = &self.clarification {
            match &note.out_of_domain {
                Some(value) => lines.push(format!(
                    "clarification re-asked for {}: \"{}\" (out-of-domain answer \"{}\")",
                    note.fact_name, note.prompt, value
                )),
                None => lines.push(format!(
                    "clarification asked for {}: \"{}\"",
                    note.fact_name, note.prompt
                )),
            }
        }

        if !self.fired.is_empty() {
            lines.push("fired rules:".into());
            for note in &self.fired {
                lines.push(format!(
                    "  {} (cf {:.2}) → aggregate {:.2}",
                    note.rule_id, note.cf, note.running_aggregate
                ));
            }
        }

        if !self.inferred.is_empty() {
            lines.push("inferred facts:".into());
            for fact in &self.inferred {
                if let FactOrigin::Inferred { rule_id } = &fact.origin {
                    lines.push(format!("  {fact} (by {rule_id})"));
                } else {
                    lines.push(format!("  {fact}"));
                }
            }
        }

        if !self.errored.is_empty() {
            lines.push("errored rules:".into());
            for note in &self.errored {
                lines.push(format!("  {}: {}", note.rule_id, note.message));
            }
        }

        if let Some(state) = &self.engine_state {
            lines.push(format!("engine state: {state}"));
        }

        lines.push(format!(
            "aggregate CF: {:.2} ({})",
            self.aggregate_cf, self.confidence_level
        ));
        lines.push(format!("enrichment: {}", self.enrichment));
        match &self.no_match_reason {
            Some(reason) => lines.push(format!("outcome: {} — {}", self.outcome, reason)),
            None => lines.push(format!("outcome: {}", self.outcome)),
        }

        lines.join("\n")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn render_lists_cycle_steps_in_order() {
        let mut trace = ReasoningTrace::new("How can I remember more?");
        trace.normalized = "how can i remember more".into();
        trace.profile_facts = vec![Fact::new("sleep_hours", 5i64)];
        trace.extracted_facts = vec![Fact::new("intent", "seek_procedure").with_confidence(1.0)];
        trace.topic_candidates = vec![("memory_techniques".into(), 0.6)];
        trace.active_topic = Some("memory_techniques".into());
        trace.fired = vec![FiredNote {
            rule_id: "ss-mem-overview".into(),
            cf: 0.85,
            running_aggregate: 0.85,
        }];
        trace.inferred = vec![
            Fact::new("memory_state", "sleep_impaired").with_origin(FactOrigin::Inferred {
                rule_id: "ss-mem-sleep-flag".into(),
            }),
        ];
        trace.aggregate_cf = 0.85;
        trace.confidence_level = ConfidenceLevel::High;
        trace.outcome = Outcome::Answer;

        let report = trace.render();
        let positions: Vec<usize> = [
            "utterance:",
            "profile facts:",
            "extracted facts:",
            "active topic:",
            "fired rules:",
            "inferred facts:",
            "aggregate CF:",
            "outcome: answer",
        ]
        .iter()
        .map(|needle| report.find(needle).unwrap_or_else(|| panic!("missing {needle}")))
        .collect();
        assert!(
            positions.windows(2).all(|w| w[0] < w[1]),
            "report sections must appear in cycle order"
        );
        assert!(report.contains("(by ss-mem-sleep-flag)"));
    }

    #[test]
    fn render_notes_out_of_domain_reprompt() {
        let mut trace = ReasoningTrace::new("cartilage");
        trace.outcome = Outcome::Clarify;
        trace.clarification = Some(ClarificationNote {
            fact_name: "tissue_type".into(),
            prompt: "Which tissue type?".into(),
            out_of_domain: Some("cartilage".into()),
        });
        let report = trace.render();
        assert!(report.contains("re-asked"));
        assert!(report.contains("out-of-domain answer \"cartilage\""));
    }

    #[test]
    fn trace_serializes_to_json() {
        let trace = ReasoningTrace::new("hello");
        let json = serde_json::to_string(&trace).unwrap();
        assert!(json.contains("\"outcome\":\"no_match\""));
        assert!(json.contains("\"confidence_level\":\"very_low\""));
    }
}
