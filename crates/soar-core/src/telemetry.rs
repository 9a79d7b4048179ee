//! Structured logging init (spec §7 ambient observability).
//!
//! Simplified from the teacher's `TelemetryConfig`/`init_telemetry`: this
//! core has no OTLP exporter to configure, so initialization is just a
//! `tracing_subscriber` registry with an `EnvFilter` console layer.

use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

#[derive(Debug, Clone)]
pub struct TelemetryConfig {
    pub service_name: String,
    pub log_filter: Option<String>,
}

impl Default for TelemetryConfig {
    fn default() -> Self {
        Self {
            service_name: "soar-core".to_string(),
            log_filter: None,
        }
    }
}

impl TelemetryConfig {
    /// `RUST_LOG` takes precedence; falls back to `info` for this crate's
    /// modules and `warn` for everything else.
    pub fn from_env() -> Self {
        Self {
            service_name: std::env::var("OTEL_SERVICE_NAME")
                .unwrap_or_else(|_| "soar-core".to_string()),
            log_filter: std::env::var("RUST_LOG").ok(),
        }
    }
}

/// Initialize the global tracing subscriber. Idempotent within a process —
/// a second call is a no-op rather than a panic, so tests can call it freely.
pub fn init_telemetry(config: TelemetryConfig) {
    let filter = config
        .log_filter
        .as_deref()
        .and_then(|f| EnvFilter::try_new(f).ok())
        .unwrap_or_else(|| EnvFilter::new("info,soar=info"));

    let _ = tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer().with_target(true))
        .with(filter)
        .try_init();
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_service_name_is_soar_core() {
        assert_eq!(TelemetryConfig::default().service_name, "soar-core");
    }
}
