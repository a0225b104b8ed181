// src/lib.rs
// Public library surface for the binary and integration tests.

pub mod api;
pub mod audit;
pub mod classifier;
pub mod config;
pub mod decision;
pub mod escalation;
pub mod generation;
pub mod knowledge_base;
pub mod metrics;
pub mod orchestrator;
pub mod telemetry;

// ---- Re-exports for stable public API ----
pub use crate::api::{router, AppState};
pub use crate::classifier::{Classification, Classifier};
pub use crate::decision::{Category, Decision, Provenance};
pub use crate::knowledge_base::KnowledgeBase;
pub use crate::orchestrator::{HealthReport, Orchestrator};
