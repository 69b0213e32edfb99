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

fn describe_metrics() {
    METRIC_DESCRIPTIONS.call_once(|| {
        describe_counter!(
            "magpie_bookmarks_saved_total",
            Unit::Count,
            "Total number of bookmarks saved (including re-saves of the same tweet)."
        );
        describe_counter!(
            "magpie_bookmarks_updated_total",
            Unit::Count,
            "Total number of bookmark patches applied."
        );
        describe_counter!(
            "magpie_bookmarks_deleted_total",
            Unit::Count,
            "Total number of bookmarks deleted."
        );
        describe_histogram!(
            "magpie_bookmark_list_ms",
            Unit::Milliseconds,
            "Bookmark listing latency in milliseconds."
        );
    });
}
