//! Ollama-compatible chat backend.
//!
//! Endpoints used:
//! - GET  /api/tags - liveness probe
//! - POST /api/chat - non-streaming chat completion

use anyhow::Context;
use async_trait::async_trait;
use reqwest::StatusCode;
use serde::{Deserialize, Serialize};
use std::time::Duration;

use super::{ChatMessage, CompletionRequest, GenerationBackend, GenerationError, GenerationOutcome};
use crate::config::GenerationSettings;

pub struct OllamaBackend {
    http: reqwest::Client,
    base_url: String,
    model: String,
    probe_timeout: Duration,
    request_timeout: Duration,
}

#[derive(Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: &'a [ChatMessage],
    stream: bool,
    options: ChatOptions,
}

#[derive(Serialize)]
struct ChatOptions {
    temperature: f32,
}

#[derive(Deserialize)]
struct ChatResponse {
    message: ChatResponseMessage,
}

#[derive(Deserialize)]
struct ChatResponseMessage {
    #[serde(default)]
    content: String,
}

impl OllamaBackend {
    pub fn new(settings: &GenerationSettings) -> anyhow::Result<Self> {
        let http = reqwest::Client::builder()
            .user_agent(concat!("support-triage/", env!("CARGO_PKG_VERSION")))
            .connect_timeout(settings.probe_timeout)
            .build()
            .context("building generation HTTP client")?;
        Ok(Self {
            http,
            base_url: settings.base_url.trim_end_matches('/').to_string(),
            model: settings.model.clone(),
            probe_timeout: settings.probe_timeout,
            request_timeout: settings.request_timeout,
        })
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }
}

fn classify_transport_error(e: reqwest::Error) -> GenerationError {
    if e.is_timeout() {
        GenerationError::Timeout
    } else {
        GenerationError::Transport(e.to_string())
    }
}

#[async_trait]
impl GenerationBackend for OllamaBackend {
    async fn probe(&self) -> bool {
        match self
            .http
            .get(self.url("/api/tags"))
            .timeout(self.probe_timeout)
            .send()
            .await
        {
            Ok(resp) => resp.status() == StatusCode::OK,
            Err(_) => false,
        }
    }

    async fn complete(&self, request: &CompletionRequest) -> GenerationOutcome {
        let body = ChatRequest {
            model: &self.model,
            messages: &request.messages,
            stream: false,
            options: ChatOptions {
                temperature: request.temperature,
            },
        };

        let resp = match self
            .http
            .post(self.url("/api/chat"))
            .timeout(self.request_timeout)
            .json(&body)
            .send()
            .await
        {
            Ok(r) => r,
            Err(e) => return GenerationOutcome::Failed(classify_transport_error(e)),
        };

        if resp.status() != StatusCode::OK {
            return GenerationOutcome::Failed(GenerationError::Status(resp.status().as_u16()));
        }

        let parsed: ChatResponse = match resp.json().await {
            Ok(p) => p,
            Err(e) if e.is_timeout() => return GenerationOutcome::Failed(GenerationError::Timeout),
            Err(e) => return GenerationOutcome::Failed(GenerationError::Decode(e.to_string())),
        };

        let text = parsed.message.content.trim();
        if text.is_empty() {
            GenerationOutcome::Failed(GenerationError::Empty)
        } else {
            GenerationOutcome::Completed(text.to_string())
        }
    }

    fn name(&self) -> &'static str {
        "ollama"
    }
}
