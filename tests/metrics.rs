// tests/metrics.rs
// One test per binary: the Prometheus recorder is process-global.

use std::sync::Arc;

use axum::body::{self, Body};
use axum::http::{Request, StatusCode};
use tower::ServiceExt;

use support_triage::api::{self, AppState};
use support_triage::audit::AuditLog;
use support_triage::config::Taxonomy;
use support_triage::generation::{GenerationClient, MockBackend};
use support_triage::metrics::Metrics;
use support_triage::Orchestrator;

#[tokio::test]
async fn metrics_endpoint_exposes_triage_series() {
    let metrics = Metrics::init().expect("install recorder");
    // A second recorder cannot be installed in the same process.
    assert!(Metrics::init().is_err());

    let taxonomy = Taxonomy::builtin().unwrap();
    let client = GenerationClient::new(
        Arc::new(MockBackend::default()),
        taxonomy.templates.system_prompt.clone(),
        0.3,
    );
    let orch = Orchestrator::new(taxonomy, client, Arc::new(AuditLog::new()));
    let app = api::router(AppState::new(orch)).merge(metrics.router());

    for msg in ["забыл пароль", "xyzzy random gibberish"] {
        let resp = app
            .clone()
            .oneshot(
                Request::post("/tickets/")
                    .header("content-type", "application/json")
                    .body(Body::from(
                        serde_json::json!({ "user_id": "m", "message": msg }).to_string(),
                    ))
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::OK);
    }

    let resp = app
        .oneshot(Request::get("/metrics").body(Body::empty()).unwrap())
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::OK);
    let body = body::to_bytes(resp.into_body(), 1_048_576).await.unwrap();
    let text = String::from_utf8(body.to_vec()).unwrap();

    for needle in [
        "triage_decisions_total",
        "provenance=\"knowledge_base\"",
        "provenance=\"generated\"",
        "triage_escalations_total",
        "triage_generation_calls_total",
        "outcome=\"completed\"",
        "triage_decision_duration_ms",
        "triage_audit_records 2",
    ] {
        assert!(
            text.contains(needle),
            "metrics exposition missing '{needle}'\n{text}"
        );
    }
}
