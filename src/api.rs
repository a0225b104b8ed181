use std::sync::Arc;

use axum::{
    extract::{Query, State},
    routing::{get, post},
    Json, Router,
};
use chrono::Utc;
use serde::{Deserialize, Serialize};
use tower_http::cors::CorsLayer;

use crate::audit::AuditRecord;
use crate::decision::{Category, Provenance};
use crate::orchestrator::{new_ticket_id, Orchestrator};

pub const SERVICE_BANNER: &str = "AI TechSupport triage service";

#[derive(Clone)]
pub struct AppState {
    pub orchestrator: Arc<Orchestrator>,
}

impl AppState {
    pub fn new(orchestrator: Orchestrator) -> Self {
        Self {
            orchestrator: Arc::new(orchestrator),
        }
    }

    /// State wired from environment variables (see `Orchestrator::from_env`).
    pub fn from_env() -> anyhow::Result<Self> {
        Ok(Self::new(Orchestrator::from_env()?))
    }
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/", get(root))
        .route("/health", get(health))
        .route("/tickets", post(create_ticket))
        .route("/tickets/", post(create_ticket))
        .route("/tickets/history", get(history))
        .layer(CorsLayer::very_permissive())
        .with_state(state)
}

#[derive(Debug, Deserialize)]
pub struct TicketRequest {
    pub user_id: String,
    pub message: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct TicketResponse {
    pub ticket_id: String,
    pub response: String,
    pub category: Option<Category>,
    pub confidence: Option<f32>,
    pub source: Provenance,
    pub needs_human: bool,
    pub solution_steps: Vec<String>,
}

async fn create_ticket(
    State(state): State<AppState>,
    Json(body): Json<TicketRequest>,
) -> Json<TicketResponse> {
    let ticket_id = new_ticket_id();
    let d = state
        .orchestrator
        .handle_ticket(&ticket_id, &body.user_id, &body.message)
        .await;
    Json(TicketResponse {
        ticket_id,
        response: d.response_text,
        category: d.category,
        confidence: d.confidence,
        source: d.provenance,
        needs_human: d.needs_human,
        solution_steps: d.solution_steps,
    })
}

#[derive(Debug, Default, Deserialize)]
pub struct HistoryParams {
    /// Only the most recent `limit` records.
    pub limit: Option<usize>,
}

async fn history(
    State(state): State<AppState>,
    Query(params): Query<HistoryParams>,
) -> Json<Vec<AuditRecord>> {
    Json(match params.limit {
        Some(n) => state.orchestrator.recent_audit(n),
        None => state.orchestrator.audit_log(),
    })
}

#[derive(Debug, Serialize)]
struct HealthOut {
    status: &'static str,
    generation_service: &'static str,
    tickets_processed: usize,
    timestamp: String,
}

async fn health(State(state): State<AppState>) -> Json<HealthOut> {
    let report = state.orchestrator.health_check().await;
    Json(HealthOut {
        status: "healthy",
        generation_service: if report.generation_service_available {
            "available"
        } else {
            "unavailable"
        },
        tickets_processed: report.processed_count,
        timestamp: Utc::now().to_rfc3339(),
    })
}

#[derive(Debug, Serialize)]
struct RootOut {
    message: &'static str,
}

async fn root() -> Json<RootOut> {
    Json(RootOut {
        message: SERVICE_BANNER,
    })
}
