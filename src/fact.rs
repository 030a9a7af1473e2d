//! Facts and working memory.
//!
//! A fact is a name/value pair with an extraction confidence — the atomic
//! evidence unit the rule engine matches against. Working memory holds the
//! fact set for one reasoning cycle and is rebuilt between cycles.

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};

/// The fact name that carries the active curricular topic.
///
/// Rule actions may not overwrite this name; the orchestrator owns it.
pub const QUERY_TOPIC: &str = "query_topic";

// ---------------------------------------------------------------------------
// Fact value
// ---------------------------------------------------------------------------

/// A scalar fact value: text or number.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum FactValue {
    Text(String),
    Number(f64),
}

impl FactValue {
    /// Parse a token: numeric if it parses as `f64`, text otherwise.
    pub fn parse(token: &str) -> Self {
        let token = token.trim();
        match token.parse::<f64>() {
            Ok(n) if n.is_finite() => Self::Number(n),
            _ => Self::Text(token.to_string()),
        }
    }

    /// Numeric view of this value, if it is a number.
    pub fn as_number(&self) -> Option<f64> {
        match self {
            Self::Number(n) => Some(*n),
            Self::Text(_) => None,
        }
    }

    /// Text view of this value, if it is text.
    pub fn as_text(&self) -> Option<&str> {
        match self {
            Self::Text(s) => Some(s.as_str()),
            Self::Number(_) => None,
        }
    }
}

impl fmt::Display for FactValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Text(s) => write!(f, "{s}"),
            Self::Number(n) => {
                if n.fract() == 0.0 && n.abs() < 1e15 {
                    write!(f, "{}", *n as i64)
                } else {
                    write!(f, "{n}")
                }
            }
        }
    }
}

impl From<&str> for FactValue {
    fn from(s: &str) -> Self {
        Self::Text(s.to_string())
    }
}

impl From<String> for FactValue {
    fn from(s: String) -> Self {
        Self::Text(s)
    }
}

impl From<f64> for FactValue {
    fn from(n: f64) -> Self {
        Self::Number(n)
    }
}

impl From<i64> for FactValue {
    fn from(n: i64) -> Self {
        Self::Number(n as f64)
    }
}

// ---------------------------------------------------------------------------
// Fact
// ---------------------------------------------------------------------------

/// Where a fact entered working memory.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FactOrigin {
    /// Extracted from the learner's utterance by the NLP preprocessor.
    Utterance,
    /// Materialised from the user profile before the engine ran.
    Profile,
    /// Asserted by a fired rule during the engine run.
    Inferred { rule_id: String },
    /// Supplied by the learner in answer to a clarification prompt.
    ClarifyAnswer,
}

/// A name/value pair with extraction confidence in `[0, 1]`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Fact {
    pub name: String,
    pub value: FactValue,
    pub confidence: f32,
    pub origin: FactOrigin,
}

impl Fact {
    /// Create a fact with confidence 1.0 and utterance origin.
    pub fn new(name: impl Into<String>, value: impl Into<FactValue>) -> Self {
        Self {
            name: name.into(),
            value: value.into(),
            confidence: 1.0,
            origin: FactOrigin::Utterance,
        }
    }

    pub fn with_confidence(mut self, confidence: f32) -> Self {
        self.confidence = confidence;
        self
    }

    pub fn with_origin(mut self, origin: FactOrigin) -> Self {
        self.origin = origin;
        self
    }
}

impl fmt::Display for Fact {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} = {}", self.name, self.value)
    }
}

// ---------------------------------------------------------------------------
// Working memory
// ---------------------------------------------------------------------------

/// The fact set consulted by the rule engine within one reasoning cycle.
///
/// Facts are keyed by name. Inserting a name that is already present keeps
/// whichever fact has the higher confidence; on equal confidence the existing
/// fact wins, so insertion order never changes an outcome. Iteration is
/// name-sorted for deterministic matching and trace output.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct WorkingMemory {
    facts: BTreeMap<String, Fact>,
}

impl WorkingMemory {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a fact, resolving a duplicate name by higher confidence.
    ///
    /// Returns `true` if the fact was stored (new name, or it displaced a
    /// lower-confidence fact with the same name).
    pub fn insert(&mut self, fact: Fact) -> bool {
        match self.facts.get(&fact.name) {
            Some(existing) if existing.confidence >= fact.confidence => false,
            _ => {
                self.facts.insert(fact.name.clone(), fact);
                true
            }
        }
    }

    pub fn get(&self, name: &str) -> Option<&Fact> {
        self.facts.get(name)
    }

    pub fn value(&self, name: &str) -> Option<&FactValue> {
        self.facts.get(name).map(|f| &f.value)
    }

    /// Numeric value of a fact, if present and a number.
    pub fn number(&self, name: &str) -> Option<f64> {
        self.facts.get(name).and_then(|f| f.value.as_number())
    }

    pub fn contains(&self, name: &str) -> bool {
        self.facts.contains_key(name)
    }

    /// Facts in name-sorted order.
    pub fn iter(&self) -> impl Iterator<Item = &Fact> {
        self.facts.values()
    }

    pub fn len(&self) -> usize {
        self.facts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.facts.is_empty()
    }
}
