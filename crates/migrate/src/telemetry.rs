//! Structured JSON logging for the migration binary.

use anyhow::Result;
use tracing_subscriber::{fmt::format::FmtSpan, EnvFilter};

/// Initialise the tracing subscriber.
///
/// Writes flattened JSON events to stderr so stdout stays free for whatever
/// drives the run. Each `migrate_type` span logs one closing event carrying
/// its busy and idle time. `RUST_LOG`, when set, overrides `log_level`.
///
/// # Errors
///
/// Returns an error if the subscriber has already been set.
pub fn init(log_level: &str) -> Result<()> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(log_level));

    tracing_subscriber::fmt()
        .json()
        .flatten_event(true)
        .with_current_span(true)
        .with_span_list(false)
        .with_span_events(FmtSpan::CLOSE)
        .with_writer(std::io::stderr)
        .with_env_filter(filter)
        .try_init()
        .map_err(|e| anyhow::anyhow!("failed to initialise tracing subscriber: {e}"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn second_init_is_refused() {
        assert!(init("debug").is_ok());
        assert!(init("info").is_err());
    }
}
