use std::sync::Once;

use metrics::{Unit, describe_counter, describe_histogram};
use tracing_error::ErrorLayer;
use tracing_subscriber::{
    EnvFilter, fmt,
    layer::{Layer, SubscriberExt},
    util::SubscriberInitExt,
};

use crate::cache::{METRIC_REGION_CLEAR, METRIC_REGION_HIT, METRIC_REGION_MISS};
use crate::cluster::{METRIC_DELIVERY, METRIC_DUPLICATE};
use crate::config::{LogFormat, LoggingSettings};
use crate::refresher::{METRIC_REFRESH_MS, METRIC_STEP_FAILED};

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

pub(crate) fn describe_metrics() {
    METRIC_DESCRIPTIONS.call_once(|| {
        describe_histogram!(
            METRIC_REFRESH_MS,
            Unit::Milliseconds,
            "Refresher operation latency in milliseconds."
        );
        describe_counter!(
            METRIC_STEP_FAILED,
            Unit::Count,
            "Total number of refresh steps that failed and were skipped."
        );
        describe_counter!(
            METRIC_REGION_HIT,
            Unit::Count,
            "Total number of isolated region hits."
        );
        describe_counter!(
            METRIC_REGION_MISS,
            Unit::Count,
            "Total number of isolated region misses."
        );
        describe_counter!(
            METRIC_REGION_CLEAR,
            Unit::Count,
            "Total number of isolated region clears, by scope."
        );
        describe_counter!(
            METRIC_DELIVERY,
            Unit::Count,
            "Envelope deliveries to peers, by outcome."
        );
        describe_counter!(
            METRIC_DUPLICATE,
            Unit::Count,
            "Inbound envelopes ignored as duplicates."
        );
    });
}
