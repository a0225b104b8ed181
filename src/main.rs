//! Support triage service: binary entrypoint.
//! Boots the Axum HTTP server, wiring the decision pipeline and middleware.

use shuttle_axum::ShuttleAxum;
use support_triage::{api, metrics::Metrics, telemetry};
use tracing::warn;

#[shuttle_runtime::main]
async fn axum() -> ShuttleAxum {
    // Load .env in local/dev; no-op in prod environments.
    let _ = dotenvy::dotenv();

    telemetry::init_tracing();

    // Fail fast on a broken taxonomy or audit path.
    let state = api::AppState::from_env()?;
    let mut router = api::router(state);

    match Metrics::init() {
        Ok(m) => router = router.merge(m.router()),
        Err(e) => warn!(error = %e, "metrics disabled"),
    }

    Ok(router.into())
}
