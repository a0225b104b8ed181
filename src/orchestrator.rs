//! # Orchestrator
//! Classify → Retrieve → Resolve → Escalate → Emit, once per message.
//!
//! Resolve policy: a strong knowledge-base match short-circuits generation;
//! otherwise the generation service is tried (grounded on any weak match),
//! and when it is unreachable the weak match or the fallback template is used.
//! Internal invariant violations and panics in any stage never reach the
//! caller: they become a degraded, escalated decision.

use futures::FutureExt;
use serde::Serialize;
use std::any::Any;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Instant;
use thiserror::Error;
use tracing::{debug, error, info};
use uuid::Uuid;

use crate::audit::{AuditLog, AuditRecord};
use crate::classifier::Classifier;
use crate::config::{GenerationSettings, SolutionRecord, Taxonomy};
use crate::decision::{Decision, Provenance};
use crate::escalation::EscalationPolicy;
use crate::generation::{GenerationClient, GenerationContext, GenerationOutcome};
use crate::knowledge_base::KnowledgeBase;
use crate::metrics::record_decision;
use crate::telemetry::anon_hash;

/// Unexpected internal state caught at the orchestrator boundary.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum PipelineFault {
    #[error("{stage}: confidence {value} is outside [0,1]")]
    InvalidConfidence { stage: &'static str, value: f32 },
    #[error("{stage}: resolved response text is empty")]
    EmptyResponse { stage: &'static str },
    #[error("pipeline panicked: {0}")]
    Panicked(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct HealthReport {
    pub generation_service_available: bool,
    pub processed_count: usize,
}

/// Outcome of the Resolve stage before escalation.
#[derive(Debug, Clone)]
struct Resolution {
    stage: &'static str,
    text: String,
    steps: Vec<String>,
    confidence: f32,
    provenance: Provenance,
}

pub struct Orchestrator {
    taxonomy: Arc<Taxonomy>,
    classifier: Classifier,
    knowledge_base: KnowledgeBase,
    generation: GenerationClient,
    escalation: EscalationPolicy,
    audit: Arc<AuditLog>,
}

impl Orchestrator {
    pub fn new(taxonomy: Arc<Taxonomy>, generation: GenerationClient, audit: Arc<AuditLog>) -> Self {
        Self {
            classifier: Classifier::new(Arc::clone(&taxonomy)),
            knowledge_base: KnowledgeBase::new(Arc::clone(&taxonomy)),
            escalation: EscalationPolicy::from_policy(&taxonomy.policy),
            taxonomy,
            generation,
            audit,
        }
    }

    /// Wire everything from the process environment (taxonomy path,
    /// generation settings, audit mirror).
    pub fn from_env() -> anyhow::Result<Self> {
        let taxonomy = Taxonomy::load_default()?;
        let settings = GenerationSettings::from_env();
        let generation =
            GenerationClient::from_settings(&settings, taxonomy.templates.system_prompt.clone())?;
        let audit = Arc::new(AuditLog::from_env()?);
        info!(
            backend = generation.backend_name(),
            base_url = %settings.base_url,
            model = %settings.model,
            solutions = taxonomy.solutions().len(),
            "triage pipeline ready"
        );
        Ok(Self::new(taxonomy, generation, audit))
    }

    pub fn taxonomy(&self) -> &Taxonomy {
        &self.taxonomy
    }

    /// Single entry point per request; the ticket id is generated here.
    pub async fn handle(&self, user_id: &str, message: &str) -> Decision {
        let ticket_id = new_ticket_id();
        self.handle_ticket(&ticket_id, user_id, message).await
    }

    /// Same as [`handle`](Self::handle) with a caller-supplied ticket id.
    pub async fn handle_ticket(&self, ticket_id: &str, user_id: &str, message: &str) -> Decision {
        let started = Instant::now();
        let msg_id = anon_hash(message);

        let outcome = AssertUnwindSafe(self.decide(message))
            .catch_unwind()
            .await
            .unwrap_or_else(|payload| Err(PipelineFault::Panicked(panic_message(&*payload))));

        let decision = match outcome {
            Ok(d) => d,
            Err(fault) => {
                error!(
                    %ticket_id, %user_id, %msg_id,
                    chars = message.chars().count(),
                    error = %fault,
                    "pipeline fault; returning degraded decision"
                );
                Decision::degraded(self.taxonomy.templates.apology.clone())
            }
        };

        self.audit
            .append(AuditRecord::from_decision(ticket_id, user_id, message, &decision))
            .await;
        record_decision(&decision, started.elapsed(), self.audit.len());

        info!(
            %ticket_id, %msg_id,
            source = %decision.provenance,
            category = decision.category.map(|c| c.as_str()).unwrap_or("-"),
            needs_human = decision.needs_human,
            "processed ticket"
        );
        decision
    }

    /// Ordered copy of every audit record, oldest first.
    pub fn audit_log(&self) -> Vec<AuditRecord> {
        self.audit.snapshot()
    }

    /// The last `n` audit records, oldest first.
    pub fn recent_audit(&self, n: usize) -> Vec<AuditRecord> {
        self.audit.snapshot_last_n(n)
    }

    pub async fn health_check(&self) -> HealthReport {
        HealthReport {
            generation_service_available: self.generation.is_available().await,
            processed_count: self.audit.len(),
        }
    }

    async fn decide(&self, message: &str) -> Result<Decision, PipelineFault> {
        // 1) Classify
        let classification = self.classifier.classify(message);
        debug!(
            category = %classification.category,
            confidence = classification.confidence,
            keywords = ?classification.matched_keywords,
            overrides = ?classification.overrides,
            "classified"
        );

        // 2) Retrieve
        let record = self.knowledge_base.search(message, classification.category);

        // 3) Resolve
        let resolved = self.resolve(message, record).await;
        check_resolution(&resolved)?;

        // 4) Escalate
        let message_len = message.trim().chars().count();
        let needs_human =
            self.escalation
                .needs_human(resolved.confidence, message_len, classification.category);

        Ok(Decision::new(
            resolved.text,
            classification.category,
            resolved.confidence,
            resolved.provenance,
        )
        .with_steps(resolved.steps)
        .escalated(needs_human))
    }

    async fn resolve(&self, message: &str, record: Option<&SolutionRecord>) -> Resolution {
        let policy = &self.taxonomy.policy;

        if let Some(rec) = record.filter(|r| r.base_confidence > policy.kb_accept_threshold) {
            return Resolution {
                stage: "knowledge_base",
                text: rec.answer_text.clone(),
                steps: rec.steps.clone(),
                confidence: rec.base_confidence,
                provenance: Provenance::KnowledgeBase,
            };
        }

        if self.generation.is_available().await {
            let context = record.map(|r| GenerationContext::similar_solution(r.answer_text.clone()));
            return match self.generation.generate(message, context.as_ref()).await {
                GenerationOutcome::Completed(text) => Resolution {
                    stage: "generation",
                    text,
                    steps: Vec::new(),
                    confidence: policy.generated_confidence,
                    provenance: Provenance::Generated,
                },
                GenerationOutcome::Unavailable | GenerationOutcome::Failed(_) => Resolution {
                    stage: "generation_fallback",
                    text: self
                        .taxonomy
                        .templates
                        .render_generation_unavailable(message),
                    steps: Vec::new(),
                    confidence: policy.generation_error_confidence,
                    provenance: Provenance::Error,
                },
            };
        }

        match record {
            Some(rec) => Resolution {
                stage: "offline_knowledge_base",
                text: rec.answer_text.clone(),
                steps: rec.steps.clone(),
                confidence: rec.base_confidence,
                provenance: Provenance::KnowledgeBase,
            },
            None => Resolution {
                stage: "offline_fallback",
                text: self.taxonomy.templates.fallback.clone(),
                steps: Vec::new(),
                confidence: policy.offline_default_confidence,
                provenance: Provenance::KnowledgeBase,
            },
        }
    }
}

fn check_resolution(r: &Resolution) -> Result<(), PipelineFault> {
    if !r.confidence.is_finite() || !(0.0..=1.0).contains(&r.confidence) {
        return Err(PipelineFault::InvalidConfidence {
            stage: r.stage,
            value: r.confidence,
        });
    }
    if r.text.trim().is_empty() {
        return Err(PipelineFault::EmptyResponse { stage: r.stage });
    }
    Ok(())
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "non-string panic payload".to_string()
    }
}

/// `TKT-` + 8 upper-case hex characters.
pub fn new_ticket_id() -> String {
    let hex = Uuid::new_v4().simple().to_string();
    format!("TKT-{}", hex[..8].to_uppercase())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ticket_ids_have_expected_shape() {
        let id = new_ticket_id();
        assert!(id.starts_with("TKT-"));
        let hex = &id[4..];
        assert_eq!(hex.len(), 8);
        assert!(hex.chars().all(|c| c.is_ascii_hexdigit() && !c.is_ascii_lowercase()));
        assert_ne!(id, new_ticket_id());
    }

    #[test]
    fn resolution_checks_catch_bad_state() {
        let ok = Resolution {
            stage: "t",
            text: "x".into(),
            steps: vec![],
            confidence: 0.5,
            provenance: Provenance::KnowledgeBase,
        };
        assert!(check_resolution(&ok).is_ok());

        let nan = Resolution {
            confidence: f32::NAN,
            ..ok.clone()
        };
        assert!(matches!(
            check_resolution(&nan),
            Err(PipelineFault::InvalidConfidence { .. })
        ));

        let blank = Resolution {
            text: "  ".into(),
            ..ok
        };
        assert_eq!(
            check_resolution(&blank),
            Err(PipelineFault::EmptyResponse { stage: "t" })
        );
    }

    #[test]
    fn panic_payloads_become_messages() {
        let p = std::panic::catch_unwind(|| panic!("backend exploded")).unwrap_err();
        assert_eq!(panic_message(&*p), "backend exploded");
        let p = std::panic::catch_unwind(|| panic!("code {}", 7)).unwrap_err();
        assert_eq!(panic_message(&*p), "code 7");
    }
}
