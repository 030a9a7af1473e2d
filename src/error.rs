//! Rich diagnostic error types for the paideia tutor core.
//!
//! Each subsystem defines its own error type with miette `#[diagnostic]`
//! derives, providing error codes and help text. During normal operation the
//! core never raises to the host: authoring errors surface at KB load time,
//! rule-action failures are recorded in the run report, and enrichment
//! failures degrade silently. These types cover the remaining explicit
//! contracts (loading, authoring, profile mutation, the enrichment client).

use miette::Diagnostic;
use thiserror::Error;

/// Top-level error type for the tutor core.
#[derive(Debug, Error, Diagnostic)]
pub enum TutorError {
    #[error(transparent)]
    #[diagnostic(transparent)]
    Authoring(#[from] AuthoringError),

    #[error(transparent)]
    #[diagnostic(transparent)]
    Engine(#[from] EngineError),

    #[error(transparent)]
    #[diagnostic(transparent)]
    Profile(#[from] ProfileError),

    #[error(transparent)]
    #[diagnostic(transparent)]
    Enrich(#[from] EnrichError),
}

// ---------------------------------------------------------------------------
// Authoring errors (KB load time and runtime `add`)
// ---------------------------------------------------------------------------

#[derive(Debug, Error, Diagnostic)]
pub enum AuthoringError {
    #[error("duplicate rule id \"{id}\" in subject \"{subject}\"")]
    #[diagnostic(
        code(paideia::kb::duplicate_id),
        help(
            "Rule ids must be unique within a subject. Rename the new rule, \
             or remove the existing one from its pack."
        )
    )]
    DuplicateRuleId { subject: String, id: String },

    #[error("rule \"{id}\" has certainty factor {cf} outside [0, 1]")]
    #[diagnostic(
        code(paideia::kb::cf_range),
        help("Intrinsic certainty factors express author confidence and must lie in [0, 1].")
    )]
    CfOutOfRange { id: String, cf: f64 },

    #[error("rule \"{id}\" has an empty id or topic")]
    #[diagnostic(
        code(paideia::kb::empty_field),
        help("Every rule needs a non-empty id and a topic tag to be retrievable.")
    )]
    EmptyField { id: String },

    #[error("rule \"{id}\" has malformed constraint \"{constraint}\": {message}")]
    #[diagnostic(
        code(paideia::kb::bad_constraint),
        help(
            "Constraints are written as \"name = value\" or \"name < number\" \
             (operators: < <= > >=)."
        )
    )]
    BadConstraint {
        id: String,
        constraint: String,
        message: String,
    },

    #[error("entity pattern for fact \"{fact}\" does not compile: {message}")]
    #[diagnostic(
        code(paideia::kb::bad_entity_pattern),
        help(
            "Entity patterns are regular expressions with exactly one capture \
             group for the extracted value."
        )
    )]
    BadEntityPattern { fact: String, message: String },

    #[error("failed to parse pack \"{id}\": {message}")]
    #[diagnostic(
        code(paideia::kb::pack_parse),
        help("Check the pack's TOML syntax against the bundled packs in src/kb/packs/.")
    )]
    PackParse { id: String, message: String },

    #[error("failed to read pack file: {path}")]
    #[diagnostic(
        code(paideia::kb::pack_io),
        help("Ensure the file exists and is readable.")
    )]
    PackIo {
        path: String,
        #[source]
        source: std::io::Error,
    },
}

// ---------------------------------------------------------------------------
// Engine errors (rule-action failures, recorded per rule)
// ---------------------------------------------------------------------------

#[derive(Debug, Error, Diagnostic)]
pub enum EngineError {
    #[error("rule \"{rule_id}\" asserts a template referencing missing fact \"{fact}\"")]
    #[diagnostic(
        code(paideia::engine::missing_template_fact),
        help(
            "The assertion value interpolates a fact that is not in working \
             memory when the rule fires. Add the fact to the rule's pattern so \
             the rule only fires when it is present."
        )
    )]
    MissingTemplateFact { rule_id: String, fact: String },

    #[error("rule \"{rule_id}\" attempts to assert reserved fact \"{fact}\"")]
    #[diagnostic(
        code(paideia::engine::reserved_fact),
        help("The query_topic fact is owned by the orchestrator; rules may not reassign it.")
    )]
    ReservedFact { rule_id: String, fact: String },
}

// ---------------------------------------------------------------------------
// Profile errors
// ---------------------------------------------------------------------------

#[derive(Debug, Error, Diagnostic)]
pub enum ProfileError {
    #[error("profile attribute \"{name}\" rejected: value is not a finite scalar")]
    #[diagnostic(
        code(paideia::profile::non_scalar),
        help("Profile attributes hold text or finite numbers; NaN and infinities are rejected.")
    )]
    NonFiniteNumber { name: String },

    #[error("profile attribute name is empty")]
    #[diagnostic(
        code(paideia::profile::empty_name),
        help("Attribute names are symbolic fact names such as sleep_hours or stress_level.")
    )]
    EmptyName,
}

// ---------------------------------------------------------------------------
// Enrichment errors
// ---------------------------------------------------------------------------

#[derive(Debug, Error, Diagnostic)]
pub enum EnrichError {
    #[error("enrichment endpoint is not available at {url}")]
    #[diagnostic(
        code(paideia::enrich::unavailable),
        help("Start the model server, or disable enrichment in TutorConfig.")
    )]
    Unavailable { url: String },

    #[error("enrichment request failed: {message}")]
    #[diagnostic(
        code(paideia::enrich::request_failed),
        help("Check that the model server is running and the model is pulled.")
    )]
    RequestFailed { message: String },

    #[error("failed to parse enrichment response: {message}")]
    #[diagnostic(
        code(paideia::enrich::parse_error),
        help("The model returned an unexpected response format.")
    )]
    ParseError { message: String },

    #[error("enrichment timed out after {timeout_ms}ms")]
    #[diagnostic(
        code(paideia::enrich::timeout),
        help("Increase the enrichment timeout or use a smaller model.")
    )]
    Timeout { timeout_ms: u64 },
}

/// Convenience alias for functions returning tutor results.
pub type TutorResult<T> = std::result::Result<T, TutorError>;
