//! Process-wide tracing subscriber and metric descriptions.

use std::sync::Once;

use metrics::{Unit, describe_counter, describe_histogram};
use tracing::Subscriber;
use tracing_error::ErrorLayer;
use tracing_subscriber::{
    EnvFilter, Layer, fmt, layer::SubscriberExt, registry::LookupSpan, util::SubscriberInitExt,
};

use crate::application::tree::METRIC_TREE_BUILD_MS;
use crate::cache::{
    METRIC_TREE_CACHE_DEGRADED, METRIC_TREE_CACHE_HIT, METRIC_TREE_CACHE_INVALIDATE,
    METRIC_TREE_CACHE_MISS,
};
use crate::config::{LogFormat, LoggingSettings};

use super::error::InfraError;

/// Install the global subscriber. `RUST_LOG` directives refine the configured level.
pub fn init(logging: &LoggingSettings) -> Result<(), InfraError> {
    describe_metrics();

    let filter = EnvFilter::builder()
        .with_default_directive(logging.level.into())
        .from_env_lossy();

    tracing_subscriber::registry()
        .with(filter)
        .with(ErrorLayer::default())
        .with(output_layer(logging.format))
        .try_init()
        .map_err(|err| InfraError::Telemetry(err.to_string()))
}

fn output_layer<S>(format: LogFormat) -> Box<dyn Layer<S> + Send + Sync>
where
    S: Subscriber + for<'span> LookupSpan<'span> + 'static,
{
    match format {
        LogFormat::Json => fmt::layer()
            .json()
            .flatten_event(true)
            .with_current_span(true)
            .boxed(),
        LogFormat::Compact => fmt::layer().compact().boxed(),
    }
}

/// Register metric descriptions with whichever recorder is installed. Runs once.
pub fn describe_metrics() {
    static ONCE: Once = Once::new();
    ONCE.call_once(|| {
        describe_counter!(
            METRIC_TREE_CACHE_HIT,
            Unit::Count,
            "Tree pages served from the cache."
        );
        describe_counter!(
            METRIC_TREE_CACHE_MISS,
            Unit::Count,
            "Tree pages rebuilt from the node store."
        );
        describe_counter!(
            METRIC_TREE_CACHE_INVALIDATE,
            Unit::Count,
            "Cache flushes after a node mutation."
        );
        describe_counter!(
            METRIC_TREE_CACHE_DEGRADED,
            Unit::Count,
            "Cache calls skipped because the backend was unreachable."
        );
        describe_histogram!(
            METRIC_TREE_BUILD_MS,
            Unit::Milliseconds,
            "Time spent assembling one page of the forest."
        );
    });
}
