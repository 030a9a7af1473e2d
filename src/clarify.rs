//! Clarification state machine: decide whether to answer or to ask.
//!
//! A topic may author a chain of clarification nodes, each naming the fact it
//! expects, the allowed values, and the follow-up prompt. The machine walks
//! the chain against working memory; the first unsatisfied node produces a
//! `Clarify` verdict for the host to render. Chains are flat ordered lists,
//! so they are acyclic and finite by construction. Topics without a chain
//! always answer.

use serde::Serialize;

use crate::fact::WorkingMemory;
use crate::kb::ClarifyNode;

/// The machine's decision for the current working memory.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "snake_case", tag = "verdict")]
pub enum Verdict {
    /// The chain is satisfied (or absent): answer from the fired rules.
    Answer,
    /// Ask the learner for the named fact before answering.
    Clarify {
        fact_name: String,
        allowed_values: Vec<String>,
        prompt: String,
        /// Value present in working memory but outside the allowed set; the
        /// same prompt is re-emitted and the value is recorded in the trace.
        out_of_domain: Option<String>,
    },
}

/// Walk state for one topic's chain.
pub struct ClarificationMachine<'a> {
    chain: &'a [ClarifyNode],
}

impl<'a> ClarificationMachine<'a> {
    /// A machine over a topic's authored chain; `None` chains are empty.
    pub fn new(chain: Option<&'a [ClarifyNode]>) -> Self {
        Self {
            chain: chain.unwrap_or_default(),
        }
    }

    /// How many leading nodes working memory already satisfies.
    pub fn position(&self, wm: &WorkingMemory) -> usize {
        self.chain
            .iter()
            .take_while(|node| node_satisfied(node, wm))
            .count()
    }

    pub fn chain_len(&self) -> usize {
        self.chain.len()
    }

    /// Walk the chain and decide.
    pub fn consult(&self, wm: &WorkingMemory) -> Verdict {
        for node in self.chain {
            if node_satisfied(node, wm) {
                continue;
            }
            // Missing fact, or a value outside the allowed set: same prompt
            // either way, so a repeated unexpected answer re-prompts
            // idempotently.
            let out_of_domain = wm
                .value(&node.fact)
                .map(|v| v.to_string())
                .filter(|v| !allowed(node, v));
            return Verdict::Clarify {
                fact_name: node.fact.clone(),
                allowed_values: node.values.clone(),
                prompt: node.prompt.clone(),
                out_of_domain,
            };
        }
        Verdict::Answer
    }
}

fn node_satisfied(node: &ClarifyNode, wm: &WorkingMemory) -> bool {
    wm.value(&node.fact)
        .map(|v| v.to_string())
        .is_some_and(|v| allowed(node, &v))
}

fn allowed(node: &ClarifyNode, value: &str) -> bool {
    node.values.iter().any(|v| v.eq_ignore_ascii_case(value))
}
