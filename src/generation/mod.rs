//! Generation client: backend abstraction + explicit outcome variants.
//!
//! Nothing in here raises. Transport problems, timeouts and bad statuses come
//! back as [`GenerationOutcome::Failed`]; a backend that is switched off comes
//! back as [`GenerationOutcome::Unavailable`].

pub mod ollama;

use async_trait::async_trait;
use metrics::counter;
use serde::Serialize;
use std::sync::Arc;
use thiserror::Error;
use tracing::{debug, warn};

use crate::config::{GenerationMode, GenerationSettings};

pub use ollama::OllamaBackend;

/// Why a generation call produced no text.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum GenerationError {
    #[error("generation request timed out")]
    Timeout,
    #[error("generation transport error: {0}")]
    Transport(String),
    #[error("generation service answered with HTTP {0}")]
    Status(u16),
    #[error("could not decode generation response: {0}")]
    Decode(String),
    #[error("generation service returned an empty completion")]
    Empty,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GenerationOutcome {
    Completed(String),
    /// The backend is switched off or was never configured.
    Unavailable,
    Failed(GenerationError),
}

impl GenerationOutcome {
    fn label(&self) -> &'static str {
        match self {
            GenerationOutcome::Completed(_) => "completed",
            GenerationOutcome::Unavailable => "unavailable",
            GenerationOutcome::Failed(_) => "failed",
        }
    }
}

/// Extra grounding passed along with the user message.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct GenerationContext {
    /// Answer text of a weak knowledge-base match.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub similar_solution: Option<String>,
}

impl GenerationContext {
    pub fn similar_solution(answer: impl Into<String>) -> Self {
        Self {
            similar_solution: Some(answer.into()),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.similar_solution.is_none()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    User,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ChatMessage {
    pub role: Role,
    pub content: String,
}

/// Fully assembled request handed to a backend.
#[derive(Debug, Clone, PartialEq)]
pub struct CompletionRequest {
    pub messages: Vec<ChatMessage>,
    pub temperature: f32,
}

/// Low-level backend: does the actual remote call (or pretends to).
#[async_trait]
pub trait GenerationBackend: Send + Sync {
    /// Liveness probe. Must return within the backend's probe timeout.
    async fn probe(&self) -> bool;
    async fn complete(&self, request: &CompletionRequest) -> GenerationOutcome;
    /// Backend name for diagnostics.
    fn name(&self) -> &'static str;
}

/// Never available; `complete` always answers `Unavailable`.
pub struct DisabledBackend;

#[async_trait]
impl GenerationBackend for DisabledBackend {
    async fn probe(&self) -> bool {
        false
    }
    async fn complete(&self, _request: &CompletionRequest) -> GenerationOutcome {
        GenerationOutcome::Unavailable
    }
    fn name(&self) -> &'static str {
        "disabled"
    }
}

/// Deterministic backend for local runs and tests.
#[derive(Debug, Clone)]
pub struct MockBackend {
    pub fixed: String,
}

impl Default for MockBackend {
    fn default() -> Self {
        Self {
            fixed: "Попробуйте перезапустить приложение. Если не поможет, обратитесь к оператору (mock)."
                .to_string(),
        }
    }
}

#[async_trait]
impl GenerationBackend for MockBackend {
    async fn probe(&self) -> bool {
        true
    }
    async fn complete(&self, _request: &CompletionRequest) -> GenerationOutcome {
        GenerationOutcome::Completed(self.fixed.clone())
    }
    fn name(&self) -> &'static str {
        "mock"
    }
}

pub type DynBackend = Arc<dyn GenerationBackend>;

/// Builds prompts and delegates to a backend.
#[derive(Clone)]
pub struct GenerationClient {
    backend: DynBackend,
    system_prompt: String,
    temperature: f32,
}

impl GenerationClient {
    pub fn new(backend: DynBackend, system_prompt: impl Into<String>, temperature: f32) -> Self {
        Self {
            backend,
            system_prompt: system_prompt.into(),
            temperature,
        }
    }

    /// Factory: pick the backend from settings.
    pub fn from_settings(
        settings: &GenerationSettings,
        system_prompt: impl Into<String>,
    ) -> anyhow::Result<Self> {
        let backend: DynBackend = match settings.mode {
            GenerationMode::Ollama => Arc::new(OllamaBackend::new(settings)?),
            GenerationMode::Mock => Arc::new(MockBackend::default()),
            GenerationMode::Disabled => Arc::new(DisabledBackend),
        };
        Ok(Self::new(backend, system_prompt, settings.temperature))
    }

    pub fn backend_name(&self) -> &'static str {
        self.backend.name()
    }

    pub async fn is_available(&self) -> bool {
        let up = self.backend.probe().await;
        if !up {
            warn!(backend = self.backend.name(), "generation service unavailable");
        }
        up
    }

    pub async fn generate(
        &self,
        message: &str,
        context: Option<&GenerationContext>,
    ) -> GenerationOutcome {
        let request = self.build_request(message, context);
        let outcome = self.backend.complete(&request).await;

        counter!("triage_generation_calls_total", "outcome" => outcome.label()).increment(1);
        match &outcome {
            GenerationOutcome::Completed(text) => {
                debug!(backend = self.backend.name(), chars = text.chars().count(), "completion received");
            }
            GenerationOutcome::Unavailable => {
                warn!(backend = self.backend.name(), "generation backend unavailable");
            }
            GenerationOutcome::Failed(err) => {
                warn!(backend = self.backend.name(), error = %err, "generation call failed");
            }
        }
        outcome
    }

    /// System instruction (plus serialized context when present), then the user message.
    pub fn build_request(&self, message: &str, context: Option<&GenerationContext>) -> CompletionRequest {
        let mut system = self.system_prompt.clone();
        if let Some(ctx) = context.filter(|c| !c.is_empty()) {
            if let Ok(json) = serde_json::to_string(ctx) {
                system.push_str("\nКонтекст: ");
                system.push_str(&json);
            }
        }
        CompletionRequest {
            messages: vec![
                ChatMessage {
                    role: Role::System,
                    content: system,
                },
                ChatMessage {
                    role: Role::User,
                    content: message.to_string(),
                },
            ],
            temperature: self.temperature,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn client(backend: DynBackend) -> GenerationClient {
        GenerationClient::new(backend, "You are a support assistant.", 0.3)
    }

    #[test]
    fn request_without_context_has_plain_system_prompt() {
        let req = client(Arc::new(DisabledBackend)).build_request("vpn down", None);
        assert_eq!(req.messages.len(), 2);
        assert_eq!(req.messages[0].role, Role::System);
        assert_eq!(req.messages[0].content, "You are a support assistant.");
        assert_eq!(req.messages[1].content, "vpn down");
        assert!((req.temperature - 0.3).abs() < f32::EPSILON);
    }

    #[test]
    fn context_is_serialized_into_system_prompt() {
        let ctx = GenerationContext::similar_solution("Reboot the router");
        let req = client(Arc::new(DisabledBackend)).build_request("vpn down", Some(&ctx));
        assert!(req.messages[0]
            .content
            .contains(r#"{"similar_solution":"Reboot the router"}"#));

        let empty = GenerationContext::default();
        let req = client(Arc::new(DisabledBackend)).build_request("vpn down", Some(&empty));
        assert!(!req.messages[0].content.contains("similar_solution"));
    }

    #[tokio::test]
    async fn disabled_backend_is_never_available() {
        let c = client(Arc::new(DisabledBackend));
        assert!(!c.is_available().await);
        assert_eq!(c.generate("hi", None).await, GenerationOutcome::Unavailable);
    }

    #[tokio::test]
    async fn mock_backend_completes() {
        let c = client(Arc::new(MockBackend {
            fixed: "canned".into(),
        }));
        assert!(c.is_available().await);
        let out = c.generate("anything", None).await;
        assert_eq!(out, GenerationOutcome::Completed("canned".into()));
    }

    #[test]
    fn outcome_labels_are_stable() {
        assert_eq!(GenerationOutcome::Completed("x".into()).label(), "completed");
        assert_eq!(GenerationOutcome::Unavailable.label(), "unavailable");
        assert_eq!(GenerationOutcome::Failed(GenerationError::Status(500)).label(), "failed");
    }
}
