//! Logging setup and processing counters.

use std::sync::Once;

use serde::{Deserialize, Serialize};
use tracing::Span;
use tracing_subscriber::EnvFilter;

static INIT: Once = Once::new();

/// Installs the fmt subscriber.
///
/// `RUST_LOG` wins over `default_level` when set. Safe to call more than
/// once; later calls are no-ops.
pub fn init_tracing(default_level: &str) {
    INIT.call_once(|| {
        let filter =
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
        // a subscriber installed by the host process (or a test harness) stays
        let _ = tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_target(false)
            .try_init();
    });
}

/// Span wrapping the processing of one inbound message.
#[must_use]
pub fn event_span(routing_key: &str) -> Span {
    tracing::info_span!("event", routing_key = routing_key)
}

/// Running totals kept by the consumer loop.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct EventCounts {
    pub received: usize,
    pub skipped: usize,
    pub failed: usize,
    pub graphs_submitted: usize,
    pub chunks_failed: usize,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn init_is_idempotent() {
        init_tracing("debug");
        init_tracing("info");
    }

    #[test]
    fn counts_serialize_for_status_output() {
        let counts = EventCounts {
            received: 3,
            skipped: 1,
            ..Default::default()
        };
        let json = serde_json::to_value(&counts).unwrap();
        assert_eq!(json["received"], 3);
        assert_eq!(json["graphs_submitted"], 0);
    }
}
