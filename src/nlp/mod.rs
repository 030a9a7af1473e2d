//! NLP preprocessor: deterministic utterance → candidate facts.
//!
//! No training, no network calls. The preprocessor normalizes the utterance,
//! tags candidate topics from authored trigger phrases, extracts quantities
//! with authored regexes, detects intents, and maps self-report phrases to
//! condition facts. All lexicons come from the knowledge packs; extraction
//! confidences are derived from match specificity (exact phrase vs single
//! keyword). Malformed input never panics — it just extracts nothing.

use regex::Regex;
use unicode_normalization::UnicodeNormalization;

use crate::fact::{Fact, FactValue};
use crate::kb::KnowledgeBase;

/// Authored extraction constants.
#[derive(Debug, Clone, Copy)]
pub struct NlpConfig {
    /// Confidence for a multi-word trigger phrase match.
    pub phrase_confidence: f32,
    /// Confidence for a single-keyword trigger match.
    pub keyword_confidence: f32,
    /// Confidence for a regex quantity capture.
    pub entity_confidence: f32,
    /// How many detected intents to return.
    pub top_n_intents: usize,
}

impl Default for NlpConfig {
    fn default() -> Self {
        Self {
            phrase_confidence: 1.0,
            keyword_confidence: 0.6,
            entity_confidence: 0.9,
            top_n_intents: 2,
        }
    }
}

/// What the preprocessor extracted from one utterance.
#[derive(Debug, Clone, Default)]
pub struct Extraction {
    pub normalized: String,
    /// Candidate topics, confidence-descending then tag-ascending. Ranking
    /// between candidates is the orchestrator's job.
    pub topic_candidates: Vec<(String, f32)>,
    /// Entity, condition, and intent facts.
    pub facts: Vec<Fact>,
    /// Detected intents, top-N by specificity.
    pub intents: Vec<(String, f32)>,
}

struct TriggerSet {
    key: String,
    value: Option<String>,
    /// (normalized trigger, is multi-word phrase)
    triggers: Vec<(String, bool)>,
}

/// The compiled preprocessor. Rebuild via [`Preprocessor::from_kb`] if the
/// KB's lexicons change (runtime `add` only appends rules, so in practice
/// one build per process).
pub struct Preprocessor {
    config: NlpConfig,
    topics: Vec<TriggerSet>,
    intents: Vec<TriggerSet>,
    conditions: Vec<TriggerSet>,
    entities: Vec<(String, Regex)>,
}

impl Preprocessor {
    pub fn from_kb(kb: &KnowledgeBase, config: NlpConfig) -> Self {
        let compile = |key: &str, value: Option<&str>, triggers: &[String]| TriggerSet {
            key: key.to_string(),
            value: value.map(str::to_string),
            triggers: triggers
                .iter()
                .map(|t| {
                    let normalized = normalize(t);
                    let is_phrase = normalized.contains(' ');
                    (normalized, is_phrase)
                })
                .filter(|(t, _)| !t.is_empty())
                .collect(),
        };

        Self {
            config,
            topics: kb
                .topic_entries()
                .iter()
                .map(|t| compile(&t.tag, None, &t.triggers))
                .collect(),
            intents: kb
                .intents()
                .iter()
                .map(|i| compile(&i.name, None, &i.triggers))
                .collect(),
            conditions: kb
                .conditions()
                .iter()
                .map(|c| compile(&c.fact, Some(&c.value), &c.triggers))
                .collect(),
            entities: kb
                .entities()
                .iter()
                .map(|e| (e.fact.clone(), e.regex.clone()))
                .collect(),
        }
    }

    /// Run the full extraction pipeline over one utterance.
    pub fn extract(&self, utterance: &str) -> Extraction {
        let normalized = normalize(utterance);
        if normalized.is_empty() {
            return Extraction::default();
        }
        // Pad with spaces so triggers match on word boundaries.
        let padded = format!(" {normalized} ");

        let mut extraction = Extraction {
            normalized,
            ..Default::default()
        };

        // --- Topic tagging ---
        for topic in &self.topics {
            if let Some(conf) = self.best_trigger(&padded, topic) {
                extraction.topic_candidates.push((topic.key.clone(), conf));
            }
        }
        extraction.topic_candidates.sort_by(|a, b| {
            b.1.partial_cmp(&a.1)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then_with(|| a.0.cmp(&b.0))
        });

        // --- Entity extraction ---
        for (fact, regex) in &self.entities {
            if let Some(caps) = regex.captures(&extraction.normalized) {
                if let Some(m) = caps.get(1) {
                    if let Ok(n) = m.as_str().parse::<f64>() {
                        extraction.facts.push(
                            Fact::new(fact.clone(), n)
                                .with_confidence(self.config.entity_confidence),
                        );
                    }
                }
            }
        }

        // --- Intent detection ---
        let mut intents: Vec<(String, f32)> = Vec::new();
        for intent in &self.intents {
            if let Some(conf) = self.best_trigger(&padded, intent) {
                intents.push((intent.key.clone(), conf));
            }
        }
        intents.sort_by(|a, b| {
            b.1.partial_cmp(&a.1)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then_with(|| a.0.cmp(&b.0))
        });
        intents.truncate(self.config.top_n_intents);
        for (rank, (name, conf)) in intents.iter().enumerate() {
            let fact_name = if rank == 0 { "intent" } else { "intent_secondary" };
            extraction.facts.push(
                Fact::new(fact_name, FactValue::Text(name.clone())).with_confidence(*conf),
            );
        }
        extraction.intents = intents;

        // --- Condition detection ---
        for condition in &self.conditions {
            if let Some(conf) = self.best_trigger(&padded, condition) {
                let value = condition.value.clone().unwrap_or_default();
                extraction
                    .facts
                    .push(Fact::new(condition.key.clone(), value).with_confidence(conf));
            }
        }

        extraction
    }

    /// Best match confidence for a trigger set against the padded utterance.
    fn best_trigger(&self, padded: &str, set: &TriggerSet) -> Option<f32> {
        let mut best: Option<f32> = None;
        for (trigger, is_phrase) in &set.triggers {
            if padded.contains(&format!(" {trigger} ")) {
                let conf = if *is_phrase {
                    self.config.phrase_confidence
                } else {
                    self.config.keyword_confidence
                };
                best = Some(best.map_or(conf, |b: f32| b.max(conf)));
            }
        }
        best
    }
}

/// Normalize an utterance: NFKC, lowercase, strip punctuation except decimal
/// points inside numbers, collapse whitespace.
pub fn normalize(input: &str) -> String {
    let chars: Vec<char> = input.nfkc().flat_map(|c| c.to_lowercase()).collect();
    let mut out = String::with_capacity(chars.len());
    for (i, &c) in chars.iter().enumerate() {
        if c.is_alphanumeric() {
            out.push(c);
        } else if c == '.'
            && i > 0
            && i + 1 < chars.len()
            && chars[i - 1].is_ascii_digit()
            && chars[i + 1].is_ascii_digit()
        {
            // Keep decimal points inside quantities ("4.5 hours").
            out.push(c);
        } else {
            out.push(' ');
        }
    }
    out.split_whitespace().collect::<Vec<_>>().join(" ")
}
