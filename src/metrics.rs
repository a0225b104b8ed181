use axum::{routing::get, Router};
use metrics::{counter, describe_counter, describe_gauge, describe_histogram, gauge, histogram};
use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};
use once_cell::sync::OnceCell;
use std::time::Duration;

use crate::decision::Decision;

pub struct Metrics {
    pub handle: PrometheusHandle,
}

impl Metrics {
    /// Install the process-wide Prometheus recorder. Fails if another recorder
    /// is already installed.
    pub fn init() -> anyhow::Result<Self> {
        let handle = PrometheusBuilder::new()
            .install_recorder()
            .map_err(|e| anyhow::anyhow!("prometheus: install recorder: {e}"))?;
        ensure_described();
        Ok(Self { handle })
    }

    /// Returns a router exposing `/metrics` with the Prometheus exposition format.
    pub fn router(&self) -> Router {
        let handle = self.handle.clone();
        Router::new().route(
            "/metrics",
            get(move || {
                let h = handle.clone();
                async move { h.render() }
            }),
        )
    }
}

/// One-time metrics registration (so series show up on /metrics).
fn ensure_described() {
    static ONCE: OnceCell<()> = OnceCell::new();
    ONCE.get_or_init(|| {
        describe_counter!(
            "triage_decisions_total",
            "Decisions emitted, labelled by provenance."
        );
        describe_counter!(
            "triage_escalations_total",
            "Decisions flagged for a human operator."
        );
        describe_counter!(
            "triage_pipeline_faults_total",
            "Pipeline faults converted into degraded decisions."
        );
        describe_counter!(
            "triage_generation_calls_total",
            "Generation calls, labelled by outcome."
        );
        describe_histogram!(
            "triage_decision_duration_ms",
            "End-to-end pipeline time in milliseconds."
        );
        describe_gauge!("triage_audit_records", "Audit records held in memory.");
    });
}

/// Record one emitted decision.
pub fn record_decision(d: &Decision, elapsed: Duration, audit_len: usize) {
    counter!("triage_decisions_total", "provenance" => d.provenance.as_str()).increment(1);
    if d.needs_human {
        counter!("triage_escalations_total").increment(1);
    }
    if d.is_degraded() {
        counter!("triage_pipeline_faults_total").increment(1);
    }
    histogram!("triage_decision_duration_ms").record(elapsed.as_secs_f64() * 1000.0);
    gauge!("triage_audit_records").set(audit_len as f64);
}
