//! # paideia
//!
//! A rule-based study-guide tutor for secondary-school science. A learner's
//! question is diagnosed against a curricular knowledge base, answered with a
//! certainty factor, and — when the topic is authored as multi-step —
//! narrowed through progressive clarification questions.
//!
//! ## Architecture
//!
//! - **Knowledge base** (`kb`): TOML-authored packs of topics, rules, and
//!   NLP lexicons, indexed by topic
//! - **NLP preprocessor** (`nlp`): deterministic utterance → candidate facts
//! - **Rule engine** (`engine`): forward chaining to a fixed point with
//!   deterministic priority/id firing order
//! - **CF calculus** (`cf`): `a + b·(1 − a)` evidence combination with
//!   qualitative bands
//! - **Clarification** (`clarify`): answer-or-ask state machine per topic
//! - **Orchestrator** (`tutor`): the one-call public entry point
//! - **Explanation** (`trace`): the per-cycle reasoning record
//!
//! ## Library usage
//!
//! ```
//! use paideia::tutor::{Response, Tutor};
//!
//! let mut tutor = Tutor::new();
//! tutor.update_profile("sleep_hours", 5i64).unwrap();
//! match tutor.process_query("How can I remember more information?") {
//!     Response::Answer { concept, aggregate_cf, .. } => {
//!         println!("{concept} (cf {aggregate_cf:.2})");
//!     }
//!     Response::Clarify { prompt, .. } => println!("{prompt}"),
//!     Response::NoMatch { reason } => println!("{reason}"),
//! }
//! ```

pub mod cf;
pub mod clarify;
pub mod engine;
pub mod enrich;
pub mod error;
pub mod fact;
pub mod kb;
pub mod nlp;
pub mod profile;
pub mod trace;
pub mod tutor;
