//! Knowledge base: authored concepts and rules, indexed by topic.
//!
//! Rules are data, not code. Each rule carries an implicit
//! `query_topic = <topic>` constraint plus authored extra constraints, an
//! intrinsic certainty factor, a priority, and a response template. The KB
//! validates records at load time, refusing malformed ones individually so
//! the rest of the pack stays usable, and emits authoring warnings for
//! duplicated rules (which are legal: duplicates both fire and combine).

pub mod pack;

use std::collections::BTreeSet;
use std::fmt;
use std::path::Path;
use std::sync::Arc;

use dashmap::DashMap;
use serde::{Deserialize, Serialize};

use crate::error::AuthoringError;
use crate::fact::{Fact, FactValue, QUERY_TOPIC, WorkingMemory};
use pack::{Pack, RuleDoc};

// ---------------------------------------------------------------------------
// Constraints
// ---------------------------------------------------------------------------

/// Comparison operator for numeric predicate constraints.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CmpOp {
    Lt,
    Le,
    Gt,
    Ge,
}

impl CmpOp {
    fn holds(self, lhs: f64, rhs: f64) -> bool {
        match self {
            Self::Lt => lhs < rhs,
            Self::Le => lhs <= rhs,
            Self::Gt => lhs > rhs,
            Self::Ge => lhs >= rhs,
        }
    }

    fn symbol(self) -> &'static str {
        match self {
            Self::Lt => "<",
            Self::Le => "<=",
            Self::Gt => ">",
            Self::Ge => ">=",
        }
    }
}

/// One fact constraint in a rule pattern.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Constraint {
    /// `name = literal` equality. Text comparison is case-insensitive.
    Eq { fact: String, value: FactValue },
    /// `name <op> number` predicate over a numeric fact.
    Cmp {
        fact: String,
        op: CmpOp,
        threshold: f64,
    },
}

impl Constraint {
    /// Parse an authored constraint string such as `"tissue_type = epithelial"`
    /// or `"sleep_hours < 6"`.
    pub fn parse(s: &str) -> Result<Self, String> {
        // Two-character operators first so "<=" never parses as "<".
        for (token, op) in [
            ("<=", CmpOp::Le),
            (">=", CmpOp::Ge),
            ("<", CmpOp::Lt),
            (">", CmpOp::Gt),
        ] {
            if let Some((lhs, rhs)) = s.split_once(token) {
                return Self::cmp_from(lhs, rhs, op);
            }
        }
        if let Some((lhs, rhs)) = s.split_once('=') {
            let fact = lhs.trim();
            let value = rhs.trim();
            if fact.is_empty() || value.is_empty() {
                return Err("empty fact name or value".into());
            }
            return Ok(Self::Eq {
                fact: fact.to_string(),
                value: FactValue::parse(value),
            });
        }
        Err("no operator found (expected = < <= > >=)".into())
    }

    fn cmp_from(lhs: &str, rhs: &str, op: CmpOp) -> Result<Self, String> {
        let fact = lhs.trim();
        if fact.is_empty() {
            return Err("empty fact name".into());
        }
        let threshold: f64 = rhs
            .trim()
            .parse()
            .map_err(|_| format!("comparison needs a numeric right-hand side, got \"{}\"", rhs.trim()))?;
        Ok(Self::Cmp {
            fact: fact.to_string(),
            op,
            threshold,
        })
    }

    /// The fact name this constraint examines.
    pub fn fact(&self) -> &str {
        match self {
            Self::Eq { fact, .. } | Self::Cmp { fact, .. } => fact,
        }
    }

    /// Whether working memory satisfies this constraint.
    pub fn satisfied_by(&self, wm: &WorkingMemory) -> bool {
        match self {
            Self::Eq { fact, value } => match (wm.value(fact), value) {
                (Some(FactValue::Text(have)), FactValue::Text(want)) => {
                    have.eq_ignore_ascii_case(want)
                }
                (Some(FactValue::Number(have)), FactValue::Number(want)) => have == want,
                _ => false,
            },
            Self::Cmp {
                fact,
                op,
                threshold,
            } => wm.number(fact).is_some_and(|n| op.holds(n, *threshold)),
        }
    }
}

impl fmt::Display for Constraint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Eq { fact, value } => write!(f, "{fact} = {value}"),
            Self::Cmp {
                fact,
                op,
                threshold,
            } => write!(f, "{fact} {} {threshold}", op.symbol()),
        }
    }
}

// ---------------------------------------------------------------------------
// Rules and concept entries
// ---------------------------------------------------------------------------

/// The response payload a fired rule contributes: the concept entry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResponseTemplate {
    pub concept: String,
    pub explanation: String,
    pub subject: String,
    pub topic: String,
    #[serde(default)]
    pub subtopic: String,
    #[serde(default)]
    pub examples: Vec<String>,
}

/// A fact assertion performed when a rule fires.
///
/// The value is a template; `{name}` interpolates the named fact's value
/// from working memory at fire time.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Assertion {
    pub fact: String,
    pub value: String,
}

/// An authored rule: pattern, intrinsic CF, priority, response, actions.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Rule {
    pub id: String,
    pub topic: String,
    /// Extra constraints beyond the implicit `query_topic = topic` match.
    #[serde(default)]
    pub constraints: Vec<Constraint>,
    /// Intrinsic certainty factor in `[0, 1]`.
    pub cf: f32,
    #[serde(default)]
    pub priority: i32,
    pub response: ResponseTemplate,
    #[serde(default)]
    pub asserts: Vec<Assertion>,
    #[serde(default)]
    pub halt: bool,
}

impl Rule {
    /// Whether working memory satisfies this rule's full pattern.
    ///
    /// On a match, returns a snapshot of the facts the pattern examined.
    pub fn matches(&self, wm: &WorkingMemory) -> Option<Vec<Fact>> {
        let topic_constraint = Constraint::Eq {
            fact: QUERY_TOPIC.to_string(),
            value: FactValue::Text(self.topic.clone()),
        };
        if !topic_constraint.satisfied_by(wm) {
            return None;
        }
        if !self.constraints.iter().all(|c| c.satisfied_by(wm)) {
            return None;
        }

        let mut names: BTreeSet<&str> = BTreeSet::new();
        names.insert(QUERY_TOPIC);
        for c in &self.constraints {
            names.insert(c.fact());
        }
        Some(
            names
                .iter()
                .filter_map(|name| wm.get(name).cloned())
                .collect(),
        )
    }

    /// Canonical rendering of the pattern, used for duplicate detection.
    fn pattern_key(&self) -> String {
        let mut parts: Vec<String> = self.constraints.iter().map(|c| c.to_string()).collect();
        parts.sort();
        format!("{}|{}", self.topic, parts.join("&"))
    }
}

// ---------------------------------------------------------------------------
// Lexicon views (consumed by the NLP preprocessor)
// ---------------------------------------------------------------------------

/// An authored topic with its trigger phrases and clarification chain.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TopicEntry {
    pub tag: String,
    pub triggers: Vec<String>,
    pub clarify: Vec<ClarifyNode>,
}

/// One node of a topic's clarification chain.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClarifyNode {
    pub fact: String,
    pub values: Vec<String>,
    pub prompt: String,
}

/// Intent lexicon entry.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IntentEntry {
    pub name: String,
    pub triggers: Vec<String>,
}

/// Condition lexicon entry: self-report phrases mapping to a fact.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConditionEntry {
    pub fact: String,
    pub value: String,
    pub triggers: Vec<String>,
}

/// Compiled entity pattern: one capture group yields a numeric fact.
#[derive(Debug, Clone)]
pub struct EntityPattern {
    pub fact: String,
    pub regex: regex::Regex,
}

// ---------------------------------------------------------------------------
// Load report
// ---------------------------------------------------------------------------

/// What happened while loading packs into the KB.
#[derive(Debug, Default)]
pub struct LoadReport {
    pub packs_loaded: usize,
    pub rules_loaded: usize,
    /// Records refused individually; the rest of their pack stays usable.
    pub refused: Vec<AuthoringError>,
    /// Authoring warnings (duplicate rules, unreachable topics).
    pub warnings: Vec<String>,
}

// ---------------------------------------------------------------------------
// Knowledge base
// ---------------------------------------------------------------------------

/// The read-mostly knowledge base: rules indexed by topic, plus the authored
/// lexicons. `add` works through `&self` so reasoning cycles can keep reading
/// concurrently.
pub struct KnowledgeBase {
    /// Topic tag → rules in priority-descending, id-ascending order.
    rules: DashMap<String, Vec<Arc<Rule>>>,
    /// Subject → rule ids, for uniqueness validation.
    rule_ids: DashMap<String, BTreeSet<String>>,
    topics: Vec<TopicEntry>,
    intents: Vec<IntentEntry>,
    conditions: Vec<ConditionEntry>,
    entities: Vec<EntityPattern>,
    report: LoadReport,
}

impl KnowledgeBase {
    /// Build a KB from the packs bundled into the binary.
    pub fn bundled() -> Self {
        Self::from_packs(pack::bundled_packs())
    }

    /// Build a KB from the bundled packs plus every pack in `dir`.
    pub fn bundled_with_dir(dir: &Path) -> Result<Self, AuthoringError> {
        let mut packs = pack::bundled_packs();
        packs.extend(Pack::load_dir(dir)?);
        Ok(Self::from_packs(packs))
    }

    /// Build a KB from parsed packs, validating record by record.
    pub fn from_packs(packs: Vec<Pack>) -> Self {
        let mut kb = Self {
            rules: DashMap::new(),
            rule_ids: DashMap::new(),
            topics: Vec::new(),
            intents: Vec::new(),
            conditions: Vec::new(),
            entities: Vec::new(),
            report: LoadReport::default(),
        };

        for pack in packs {
            kb.absorb(pack);
        }
        kb.finish_load();
        kb
    }

    fn absorb(&mut self, pack: Pack) {
        let subject = pack.doc.pack.subject.clone();
        self.report.packs_loaded += 1;

        for topic in pack.doc.topics {
            self.topics.push(TopicEntry {
                tag: topic.tag,
                triggers: topic.triggers,
                clarify: topic
                    .clarify
                    .into_iter()
                    .map(|c| ClarifyNode {
                        fact: c.fact,
                        values: c.values,
                        prompt: c.prompt,
                    })
                    .collect(),
            });
        }

        for intent in pack.doc.intents {
            self.intents.push(IntentEntry {
                name: intent.name,
                triggers: intent.triggers,
            });
        }

        for condition in pack.doc.conditions {
            self.conditions.push(ConditionEntry {
                fact: condition.fact,
                value: condition.value,
                triggers: condition.triggers,
            });
        }

        for entity in pack.doc.entities {
            match regex::Regex::new(&entity.pattern) {
                Ok(regex) => self.entities.push(EntityPattern {
                    fact: entity.fact,
                    regex,
                }),
                Err(e) => self.report.refused.push(AuthoringError::BadEntityPattern {
                    fact: entity.fact,
                    message: e.to_string(),
                }),
            }
        }

        for doc in pack.doc.rules {
            match compile_rule(&subject, doc) {
                Ok(rule) => {
                    if let Err(e) = self.insert_rule(&subject, rule) {
                        self.report.refused.push(e);
                    } else {
                        self.report.rules_loaded += 1;
                    }
                }
                Err(e) => self.report.refused.push(e),
            }
        }
    }

    /// Post-load pass: duplicate-rule warnings and load logging.
    fn finish_load(&mut self) {
        let mut seen: BTreeSet<(String, String)> = BTreeSet::new();
        for entry in self.rules.iter() {
            for rule in entry.value() {
                let key = (rule.pattern_key(), rule.response.concept.clone());
                if !seen.insert(key) {
                    let warning = format!(
                        "rule \"{}\" duplicates an earlier rule for topic \"{}\" \
                         (same pattern and concept); both will fire and combine",
                        rule.id, rule.topic
                    );
                    tracing::warn!(rule = %rule.id, topic = %rule.topic, "duplicate authored rule");
                    self.report.warnings.push(warning);
                }
            }
        }

        for entry in self.rules.iter() {
            if !self.topics.iter().any(|t| t.tag == *entry.key()) {
                let warning = format!(
                    "topic \"{}\" has rules but no trigger phrases; its rules are unreachable",
                    entry.key()
                );
                tracing::warn!(topic = %entry.key(), "topic without triggers");
                self.report.warnings.push(warning);
            }
        }

        tracing::info!(
            packs = self.report.packs_loaded,
            rules = self.report.rules_loaded,
            topics = self.topics.len(),
            refused = self.report.refused.len(),
            warnings = self.report.warnings.len(),
            "knowledge base loaded"
        );
    }

    fn insert_rule(&self, subject: &str, rule: Rule) -> Result<(), AuthoringError> {
        validate_rule(&rule)?;

        let mut ids = self.rule_ids.entry(subject.to_string()).or_default();
        if !ids.insert(rule.id.clone()) {
            return Err(AuthoringError::DuplicateRuleId {
                subject: subject.to_string(),
                id: rule.id,
            });
        }
        drop(ids);

        let mut rules = self.rules.entry(rule.topic.clone()).or_default();
        rules.push(Arc::new(rule));
        rules.sort_by(|a, b| b.priority.cmp(&a.priority).then_with(|| a.id.cmp(&b.id)));
        Ok(())
    }

    /// Every rule authored for `topic`, priority-descending then id-ascending.
    pub fn lookup(&self, topic: &str) -> Vec<Arc<Rule>> {
        self.rules
            .get(topic)
            .map(|r| r.value().clone())
            .unwrap_or_default()
    }

    /// Append a rule at runtime. Validates id uniqueness within the subject
    /// and the CF range; rejects with a structured error otherwise.
    pub fn add(&self, subject: &str, rule: Rule) -> Result<(), AuthoringError> {
        self.insert_rule(subject, rule)?;
        tracing::info!(subject, "rule added to knowledge base");
        Ok(())
    }

    /// The sorted set of authored topic tags.
    pub fn all_topics(&self) -> Vec<String> {
        let mut tags: BTreeSet<String> = self.topics.iter().map(|t| t.tag.clone()).collect();
        for entry in self.rules.iter() {
            tags.insert(entry.key().clone());
        }
        tags.into_iter().collect()
    }

    /// Authored topics with their trigger phrases.
    pub fn topic_entries(&self) -> &[TopicEntry] {
        &self.topics
    }

    /// The clarification chain for a topic, if one is authored.
    pub fn clarification_chain(&self, topic: &str) -> Option<&[ClarifyNode]> {
        self.topics
            .iter()
            .find(|t| t.tag == topic && !t.clarify.is_empty())
            .map(|t| t.clarify.as_slice())
    }

    pub fn intents(&self) -> &[IntentEntry] {
        &self.intents
    }

    pub fn conditions(&self) -> &[ConditionEntry] {
        &self.conditions
    }

    pub fn entities(&self) -> &[EntityPattern] {
        &self.entities
    }

    /// Load-time report: refused records and authoring warnings.
    pub fn load_report(&self) -> &LoadReport {
        &self.report
    }

    /// Total rule count across all topics.
    pub fn rule_count(&self) -> usize {
        self.rules.iter().map(|e| e.value().len()).sum()
    }
}

/// Compile a raw rule record, parsing its constraint strings.
fn compile_rule(subject: &str, doc: RuleDoc) -> Result<Rule, AuthoringError> {
    let mut constraints = Vec::with_capacity(doc.when.len());
    for s in &doc.when {
        match Constraint::parse(s) {
            Ok(c) => constraints.push(c),
            Err(message) => {
                return Err(AuthoringError::BadConstraint {
                    id: doc.id.clone(),
                    constraint: s.clone(),
                    message,
                });
            }
        }
    }

    Ok(Rule {
        response: ResponseTemplate {
            concept: doc.concept,
            explanation: doc.explanation,
            subject: subject.to_string(),
            topic: doc.topic.clone(),
            subtopic: doc.subtopic,
            examples: doc.examples,
        },
        id: doc.id,
        topic: doc.topic,
        constraints,
        cf: doc.cf as f32,
        priority: doc.priority,
        asserts: doc
            .asserts
            .into_iter()
            .map(|(fact, value)| Assertion { fact, value })
            .collect(),
        halt: doc.halt,
    })
}

fn validate_rule(rule: &Rule) -> Result<(), AuthoringError> {
    if rule.id.trim().is_empty() || rule.topic.trim().is_empty() {
        return Err(AuthoringError::EmptyField {
            id: rule.id.clone(),
        });
    }
    if !(0.0..=1.0).contains(&rule.cf) {
        return Err(AuthoringError::CfOutOfRange {
            id: rule.id.clone(),
            cf: rule.cf as f64,
        });
    }
    Ok(())
}
