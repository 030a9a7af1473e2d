//! Forward-chaining rule engine.
//!
//! Matches every rule whose pattern the working memory satisfies, fires in
//! priority-descending / id-ascending order, and loops while fired rules
//! assert new facts, until a fixed point or an explicit halt. A rule fires at
//! most once per run and a failing rule action is recorded and skipped, so a
//! single authoring bug never sinks the whole inference.

use std::collections::HashSet;
use std::sync::Arc;

use serde::Serialize;

use crate::error::EngineError;
use crate::fact::{Fact, FactOrigin, FactValue, QUERY_TOPIC, WorkingMemory};
use crate::kb::{ResponseTemplate, Rule};

// ---------------------------------------------------------------------------
// Configuration
// ---------------------------------------------------------------------------

/// Configuration for the rule engine.
#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// Safety cap on match/fire iterations. Termination is already
    /// guaranteed by fire-once over a finite rule set; the cap bounds
    /// pathological rule sets added at runtime.
    pub max_iterations: usize,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self { max_iterations: 25 }
    }
}

// ---------------------------------------------------------------------------
// Run report
// ---------------------------------------------------------------------------

/// Engine lifecycle state. `FixedPoint` and `Halted` are terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum EngineState {
    Idle,
    Matching,
    Firing,
    FixedPoint,
    Halted,
}

impl Default for EngineState {
    fn default() -> Self {
        Self::Idle
    }
}

impl std::fmt::Display for EngineState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::Idle => "idle",
            Self::Matching => "matching",
            Self::Firing => "firing",
            Self::FixedPoint => "fixed_point",
            Self::Halted => "halted",
        };
        write!(f, "{s}")
    }
}

/// Record of one successful firing.
#[derive(Debug, Clone)]
pub struct FiredRule {
    pub rule_id: String,
    /// Intrinsic CF of the rule at fire time.
    pub cf: f32,
    pub priority: i32,
    /// Snapshot of the rule's response template.
    pub response: ResponseTemplate,
    /// Snapshot of the facts the pattern matched.
    pub matched_facts: Vec<Fact>,
}

/// A rule whose action failed; the rule is skipped, not retried.
#[derive(Debug)]
pub struct RuleFailure {
    pub rule_id: String,
    pub error: EngineError,
}

/// Result of one engine run.
#[derive(Debug, Default)]
pub struct EngineRun {
    /// Fired rules in firing order.
    pub fired: Vec<FiredRule>,
    /// Facts asserted into working memory by fired rules.
    pub inferred: Vec<Fact>,
    pub failures: Vec<RuleFailure>,
    pub iterations: usize,
    pub state: EngineState,
}

// ---------------------------------------------------------------------------
// Engine
// ---------------------------------------------------------------------------

/// Stateless forward-chaining engine; per-run state lives in the working
/// memory and the [`EngineRun`] report.
pub struct RuleEngine {
    config: EngineConfig,
}

impl RuleEngine {
    pub fn new(config: EngineConfig) -> Self {
        Self { config }
    }

    /// Run the match/fire loop to a fixed point or halt.
    pub fn run(&self, wm: &mut WorkingMemory, rules: &[Arc<Rule>]) -> EngineRun {
        let mut run = EngineRun::default();
        // Rules that fired or failed; neither is tried again.
        let mut attempted: HashSet<String> = HashSet::new();

        for iteration in 1..=self.config.max_iterations {
            run.iterations = iteration;
            run.state = EngineState::Matching;

            let mut candidates: Vec<Arc<Rule>> = rules
                .iter()
                .filter(|r| !attempted.contains(&r.id) && r.matches(wm).is_some())
                .cloned()
                .collect();
            candidates.sort_by(|a, b| b.priority.cmp(&a.priority).then_with(|| a.id.cmp(&b.id)));

            if candidates.is_empty() {
                run.state = EngineState::FixedPoint;
                return run;
            }

            run.state = EngineState::Firing;
            for rule in &candidates {
                // Revalidate: an earlier firing this round may have displaced
                // a fact this pattern depends on.
                let Some(matched) = rule.matches(wm) else {
                    continue;
                };
                attempted.insert(rule.id.clone());

                match prepare_asserts(rule, &matched, wm) {
                    Err(error) => {
                        tracing::warn!(rule = %rule.id, %error, "rule action failed; skipping rule");
                        run.failures.push(RuleFailure {
                            rule_id: rule.id.clone(),
                            error,
                        });
                        continue;
                    }
                    Ok(new_facts) => {
                        tracing::debug!(rule = %rule.id, cf = %rule.cf, "rule fired");
                        run.fired.push(FiredRule {
                            rule_id: rule.id.clone(),
                            cf: rule.cf,
                            priority: rule.priority,
                            response: rule.response.clone(),
                            matched_facts: matched,
                        });
                        for fact in new_facts {
                            if wm.insert(fact.clone()) {
                                run.inferred.push(fact);
                            }
                        }
                        if rule.halt {
                            run.state = EngineState::Halted;
                            return run;
                        }
                    }
                }
            }
        }

        tracing::warn!(
            max_iterations = self.config.max_iterations,
            "engine hit the iteration cap before a natural fixed point"
        );
        run.state = EngineState::FixedPoint;
        run
    }
}

/// Build the facts a rule will assert, validating its actions first so a
/// failing rule leaves working memory untouched.
fn prepare_asserts(
    rule: &Rule,
    matched: &[Fact],
    wm: &WorkingMemory,
) -> Result<Vec<Fact>, EngineError> {
    let confidence = rule.cf * avg_confidence(matched);
    let mut facts = Vec::with_capacity(rule.asserts.len());
    for assertion in &rule.asserts {
        if assertion.fact == QUERY_TOPIC {
            return Err(EngineError::ReservedFact {
                rule_id: rule.id.clone(),
                fact: assertion.fact.clone(),
            });
        }
        let value = interpolate(&assertion.value, wm, &rule.id)?;
        facts.push(
            Fact::new(assertion.fact.clone(), FactValue::parse(&value))
                .with_confidence(confidence)
                .with_origin(FactOrigin::Inferred {
                    rule_id: rule.id.clone(),
                }),
        );
    }
    Ok(facts)
}

/// Substitute `{fact_name}` placeholders with working-memory values.
fn interpolate(template: &str, wm: &WorkingMemory, rule_id: &str) -> Result<String, EngineError> {
    let mut out = String::with_capacity(template.len());
    let mut rest = template;
    while let Some(start) = rest.find('{') {
        out.push_str(&rest[..start]);
        let after = &rest[start + 1..];
        let Some(end) = after.find('}') else {
            // Unbalanced brace: keep it literal.
            out.push('{');
            rest = after;
            continue;
        };
        let name = &after[..end];
        match wm.value(name) {
            Some(value) => out.push_str(&value.to_string()),
            None => {
                return Err(EngineError::MissingTemplateFact {
                    rule_id: rule_id.to_string(),
                    fact: name.to_string(),
                });
            }
        }
        rest = &after[end + 1..];
    }
    out.push_str(rest);
    Ok(out)
}

/// Average confidence of the matched facts; the asserted fact inherits it,
/// scaled by the rule's own CF.
fn avg_confidence(facts: &[Fact]) -> f32 {
    if facts.is_empty() {
        return 1.0;
    }
    facts.iter().map(|f| f.confidence).sum::<f32>() / facts.len() as f32
}
