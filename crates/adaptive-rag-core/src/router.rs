//! Query router: decides whether a turn needs retrieval.
//!
//! The model is asked for a structured [`RouteDecision`]. Its output
//! crosses an explicit parse-and-validate boundary
//! ([`parse_route_decision`]); anything that does not parse into one of
//! the two labels is treated as ambiguous. Ambiguity earns one bounded
//! re-ask, after which the router fails closed to [`Route::Retrieval`].
//! A model that cannot be reached fails closed immediately.

use std::sync::Arc;

use serde::Deserialize;
use tracing::{debug, warn};

use crate::error::{llm_error_label, PipelineError};
use crate::llm::{ChatMessage, CompletionRequest, LanguageModel, Task};
use crate::models::{recent_turns, Route, RouteDecision, Turn};
use crate::prompts;

#[derive(Debug, Clone)]
pub struct RouterConfig {
    /// A general verdict below this confidence is promoted to retrieval.
    pub min_confidence: f64,
    /// Number of prior turns shown to the classifier.
    pub history_turns: usize,
}

impl Default for RouterConfig {
    fn default() -> Self {
        Self {
            min_confidence: 0.0,
            history_turns: 2,
        }
    }
}

pub struct Router {
    llm: Arc<dyn LanguageModel>,
    config: RouterConfig,
}

impl Router {
    pub fn new(llm: Arc<dyn LanguageModel>, config: RouterConfig) -> Self {
        Self { llm, config }
    }

    /// Classify `query` given the conversation so far. Never fails.
    pub async fn classify(&self, query: &str, context: &[Turn]) -> RouteDecision {
        let mut messages = vec![ChatMessage::system(prompts::ROUTER_SYSTEM)];
        messages.extend(prompts::history_messages(recent_turns(
            context,
            self.config.history_turns,
        )));
        messages.push(ChatMessage::user(format!("Question:\n\n{}", query)));
        let mut request = CompletionRequest::new(Task::Route, messages)
            .with_schema(prompts::route_schema())
            .with_temperature(0.0);

        let mut last_ambiguity = String::new();
        for attempt in 0..2 {
            let raw = match self.llm.complete(&request).await {
                Ok(raw) => raw,
                Err(err) => {
                    warn!(
                        error = %err,
                        kind = llm_error_label(&err),
                        "router call failed; failing closed to retrieval"
                    );
                    return RouteDecision::fail_closed(format!("classifier unavailable: {}", err));
                }
            };

            match parse_route_decision(&raw) {
                Ok(decision) => {
                    let decision = self.apply_confidence_bar(decision);
                    debug!(route = %decision.label, confidence = ?decision.confidence, "routed");
                    return decision;
                }
                Err(err) => {
                    warn!(attempt, error = %err, "router output ambiguous");
                    last_ambiguity = err.to_string();
                    if attempt == 0 {
                        request.messages.push(ChatMessage::assistant(raw));
                        request.messages.push(ChatMessage::user(prompts::ROUTER_REASK));
                    }
                }
            }
        }

        RouteDecision::fail_closed(format!(
            "classifier output unusable after re-ask ({})",
            last_ambiguity
        ))
    }

    fn apply_confidence_bar(&self, decision: RouteDecision) -> RouteDecision {
        match (decision.label, decision.confidence) {
            (Route::General, Some(c)) if c < self.config.min_confidence => RouteDecision {
                label: Route::Retrieval,
                confidence: decision.confidence,
                rationale: Some(format!(
                    "general confidence {:.2} below {:.2}; retrieving instead",
                    c, self.config.min_confidence
                )),
            },
            _ => decision,
        }
    }
}

#[derive(Deserialize)]
struct RawDecision {
    #[serde(alias = "category", alias = "route")]
    label: String,
    #[serde(default)]
    confidence: Option<f64>,
    #[serde(default)]
    rationale: Option<String>,
}

/// Parse raw classifier output into a validated decision.
///
/// Accepts a JSON object (`label`, `category`, or `route` key) or a bare
/// label, optionally wrapped in a Markdown code fence or quotes.
/// Out-of-range confidences are discarded.
pub fn parse_route_decision(raw: &str) -> Result<RouteDecision, PipelineError> {
    let text = strip_code_fence(raw.trim());
    if text.is_empty() {
        return Err(PipelineError::RoutingAmbiguous("empty output".to_string()));
    }

    if text.starts_with('{') {
        let parsed: RawDecision = serde_json::from_str(text)
            .map_err(|e| PipelineError::RoutingAmbiguous(format!("invalid JSON: {}", e)))?;
        let label = Route::parse(&parsed.label).ok_or_else(|| {
            PipelineError::RoutingAmbiguous(format!("unknown label '{}'", parsed.label))
        })?;
        return Ok(RouteDecision {
            label,
            confidence: parsed.confidence.filter(|c| (0.0..=1.0).contains(c)),
            rationale: parsed.rationale.filter(|r| !r.trim().is_empty()),
        });
    }

    let bare = text.trim_matches(|c: char| c == '"' || c == '\'' || c == '.' || c.is_whitespace());
    Route::parse(bare)
        .map(RouteDecision::new)
        .ok_or_else(|| PipelineError::RoutingAmbiguous(format!("unknown label '{}'", bare)))
}

fn strip_code_fence(text: &str) -> &str {
    let Some(rest) = text.strip_prefix("```") else {
        return text;
    };
    let rest = rest.trim_start_matches(|c: char| c.is_ascii_alphabetic());
    rest.strip_suffix("```").unwrap_or(rest).trim()
}
