//! Prometheus exporter wiring (spec §6 "Audit + Metrics"). The engine crates
//! only call the `metrics` facade (see `soar_core::metrics`); this is the
//! one place in the workspace that installs a recorder and renders it.

use axum::response::IntoResponse;
use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};

pub fn install_recorder() -> anyhow::Result<PrometheusHandle> {
    let handle = PrometheusBuilder::new().install_recorder()?;
    Ok(handle)
}

pub async fn metrics_handler(
    axum::extract::State(handle): axum::extract::State<PrometheusHandle>,
) -> impl IntoResponse {
    handle.render()
}
