//! Optional enrichment hook: polish the final explanation with an LLM.
//!
//! Enrichment is pure augmentation. The concept identity, the aggregate CF,
//! and the fired-rule list are computed before the hook runs and are never
//! altered by it; a timeout or failure degrades silently to the un-enriched
//! explanation. The hook is injectable — any `Fn(&EnrichRequest)` works — and
//! a reference client for an Ollama-compatible endpoint is provided.

use std::sync::Arc;
use std::sync::mpsc;
use std::time::Duration;

use crate::error::EnrichError;

/// Context handed to the enrichment hook.
#[derive(Debug, Clone)]
pub struct EnrichRequest {
    /// The learner's original utterance.
    pub prompt: String,
    pub concept: String,
    pub explanation: String,
    pub examples: Vec<String>,
    pub aggregate_cf: f32,
}

/// An injectable enrichment callable.
pub trait Enricher: Send + Sync {
    fn enrich(&self, request: &EnrichRequest) -> Result<String, EnrichError>;
}

impl<F> Enricher for F
where
    F: Fn(&EnrichRequest) -> Result<String, EnrichError> + Send + Sync,
{
    fn enrich(&self, request: &EnrichRequest) -> Result<String, EnrichError> {
        self(request)
    }
}

/// How enriched text combines with the authored explanation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EnrichMode {
    /// Enriched text replaces the authored explanation.
    Replace,
    /// Enriched text is appended after the authored explanation.
    Append,
}

/// Enrichment configuration.
#[derive(Debug, Clone)]
pub struct EnrichConfig {
    pub enabled: bool,
    /// Hard bound on one hook invocation.
    pub timeout: Duration,
    pub mode: EnrichMode,
}

impl Default for EnrichConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            timeout: Duration::from_secs(10),
            mode: EnrichMode::Replace,
        }
    }
}

/// Invoke the hook on a helper thread, bounded by `timeout`.
///
/// The hook may outlive the timeout on its thread; its late result is
/// discarded. A hook that panics surfaces as a request failure.
pub fn enrich_with_timeout(
    enricher: Arc<dyn Enricher>,
    request: EnrichRequest,
    timeout: Duration,
) -> Result<String, EnrichError> {
    let (tx, rx) = mpsc::channel();
    std::thread::spawn(move || {
        let result = enricher.enrich(&request);
        let _ = tx.send(result);
    });

    match rx.recv_timeout(timeout) {
        Ok(result) => result,
        Err(mpsc::RecvTimeoutError::Timeout) => Err(EnrichError::Timeout {
            timeout_ms: timeout.as_millis() as u64,
        }),
        Err(mpsc::RecvTimeoutError::Disconnected) => Err(EnrichError::RequestFailed {
            message: "enrichment hook panicked".into(),
        }),
    }
}

// ---------------------------------------------------------------------------
// Ollama reference client
// ---------------------------------------------------------------------------

/// Configuration for the Ollama reference client.
#[derive(Debug, Clone)]
pub struct OllamaConfig {
    pub base_url: String,
    pub model: String,
    /// HTTP timeout in seconds; the orchestrator's own timeout still applies.
    pub timeout_secs: u64,
}

impl Default for OllamaConfig {
    fn default() -> Self {
        Self {
            base_url: "http://localhost:11434".into(),
            model: "llama3.2".into(),
            timeout_secs: 30,
        }
    }
}

/// Enricher backed by an Ollama-compatible `/api/generate` endpoint.
pub struct OllamaEnricher {
    config: OllamaConfig,
}

impl OllamaEnricher {
    pub fn new(config: OllamaConfig) -> Self {
        Self { config }
    }

    /// Probe the server with a lightweight request to `/api/tags`.
    pub fn probe(&self) -> bool {
        let url = format!("{}/api/tags", self.config.base_url);
        let agent = ureq::AgentBuilder::new()
            .timeout(Duration::from_secs(5))
            .build();
        matches!(agent.get(&url).call(), Ok(resp) if resp.status() == 200)
    }

    fn build_prompt(request: &EnrichRequest) -> String {
        let mut prompt = format!(
            "Rewrite this study-guide explanation for a secondary-school \
             student. Keep every fact; do not add new claims.\n\n\
             Question: {}\nConcept: {}\nExplanation: {}\n",
            request.prompt, request.concept, request.explanation
        );
        if !request.examples.is_empty() {
            prompt.push_str(&format!("Examples: {}\n", request.examples.join("; ")));
        }
        prompt
    }
}

impl Enricher for OllamaEnricher {
    fn enrich(&self, request: &EnrichRequest) -> Result<String, EnrichError> {
        let url = format!("{}/api/generate", self.config.base_url);
        let agent = ureq::AgentBuilder::new()
            .timeout(Duration::from_secs(self.config.timeout_secs))
            .build();

        let body = serde_json::json!({
            "model": self.config.model,
            "prompt": Self::build_prompt(request),
            "stream": false,
        });
        let body_str = serde_json::to_string(&body).map_err(|e| EnrichError::RequestFailed {
            message: format!("JSON serialize error: {e}"),
        })?;

        let resp = agent
            .post(&url)
            .set("Content-Type", "application/json")
            .send_string(&body_str)
            .map_err(|e: ureq::Error| EnrichError::RequestFailed {
                message: e.to_string(),
            })?;

        let resp_str = resp.into_string().map_err(|e| EnrichError::ParseError {
            message: e.to_string(),
        })?;
        let json: serde_json::Value =
            serde_json::from_str(&resp_str).map_err(|e| EnrichError::ParseError {
                message: e.to_string(),
            })?;

        json["response"]
            .as_str()
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
            .ok_or_else(|| EnrichError::ParseError {
                message: "missing \"response\" field".into(),
            })
    }
}
