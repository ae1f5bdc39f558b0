use std::sync::Once;

use metrics::{Unit, describe_counter, describe_histogram};
use tracing_error::ErrorLayer;
use tracing_subscriber::{
    EnvFilter, fmt,
    layer::{Layer, SubscriberExt},
    util::SubscriberInitExt,
};

use crate::config::{LogFormat, LoggingSettings};

use super::error::InfraError;

static METRIC_DESCRIPTIONS: Once = Once::new();

/// Install a global tracing subscriber using the provided logging settings.
pub fn init(logging: &LoggingSettings) -> Result<(), InfraError> {
    describe_metrics();

    let env_filter = EnvFilter::builder()
        .with_default_directive(logging.level.into())
        .from_env_lossy();

    let fmt_layer = match logging.format {
        LogFormat::Json => fmt::layer()
            .json()
            .with_current_span(true)
            .with_span_list(true)
            .with_target(true)
            .boxed(),
        LogFormat::Compact => fmt::layer().compact().with_target(true).boxed(),
    };

    tracing_subscriber::registry()
        .with(env_filter)
        .with(ErrorLayer::default())
        .with(fmt_layer)
        .try_init()
        .map_err(|err| {
            InfraError::telemetry(format!("failed to install tracing subscriber: {err}"))
        })
}

const COUNTERS: [(&str, &str); 6] = [
    (
        "quizcache_cache_hit_total",
        "Lookups answered from a cached level list.",
    ),
    (
        "quizcache_cache_miss_total",
        "Lookups that found no entry or an exhausted list, labelled by reason.",
    ),
    (
        "quizcache_refill_total",
        "Level lists seeded from the question store, labelled by level.",
    ),
    (
        "quizcache_flush_write_total",
        "Last-shown timestamps written back to the question store.",
    ),
    (
        "quizcache_flush_failure_total",
        "Individual write-backs that failed during a flush.",
    ),
    (
        "quizcache_sweep_evicted_total",
        "Entries flushed and evicted by the expiry sweep.",
    ),
];

/// Register units and help text for every metric the cache emits.
pub fn describe_metrics() {
    METRIC_DESCRIPTIONS.call_once(|| {
        for (name, help) in COUNTERS {
            describe_counter!(name, Unit::Count, help);
        }
        describe_histogram!(
            "quizcache_sweep_ms",
            Unit::Milliseconds,
            "Expiry sweep tick latency in milliseconds."
        );
    });
}
