use anyhow::Result;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};
use uuid::Uuid;

use crate::config::ObservabilityConfig;

/// Variable consulted before `RUST_LOG` for the log filter.
pub const LOG_ENV: &str = "TEAM_AI_LOG";

/// Build the log filter: `TEAM_AI_LOG`, then `RUST_LOG`, then `fallback`.
pub fn log_filter(fallback: &str) -> EnvFilter {
    EnvFilter::try_from_env(LOG_ENV)
        .or_else(|_| EnvFilter::try_from_default_env())
        .unwrap_or_else(|_| EnvFilter::new(fallback))
}

/// Initialize structured logging on stderr.
///
/// Stdout is reserved for command output (ids, listings), so every log line
/// goes to stderr, as JSON when `json_logs` is set.
pub fn init_telemetry(settings: &ObservabilityConfig) -> Result<()> {
    let filter = log_filter(&settings.log_level);
    let registry = tracing_subscriber::registry().with(filter);

    if settings.json_logs {
        registry
            .with(
                fmt::layer()
                    .json()
                    .with_current_span(true)
                    .with_span_list(true)
                    .with_writer(std::io::stderr),
            )
            .try_init()?;
    } else {
        registry
            .with(fmt::layer().with_target(false).with_writer(std::io::stderr))
            .try_init()?;
    }

    tracing::debug!("team-ai telemetry initialized");
    Ok(())
}

/// Generate a correlation ID for linking related operations
pub fn generate_correlation_id() -> String {
    Uuid::new_v4().to_string()
}

/// Create a span with common coordination attributes
pub fn create_coordination_span(
    operation: &str,
    agent_id: Option<&str>,
    entity_id: Option<&str>,
    correlation_id: Option<&str>,
) -> tracing::Span {
    tracing::info_span!(
        "agent_coordination",
        operation = operation,
        agent.id = agent_id,
        entity.id = entity_id,
        correlation.id = correlation_id,
    )
}
