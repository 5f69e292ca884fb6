//! Prometheus metrics for the Uplink agent.
//!
//! All metrics follow the naming convention: `uplink_<area>_<metric>_<unit>`

use lazy_static::lazy_static;
use prometheus::{
    exponential_buckets, Counter, CounterVec, Encoder, Gauge, Histogram, HistogramOpts, Opts,
    Registry, TextEncoder,
};
use std::sync::Arc;

use crate::TelemetryError;

lazy_static! {
    /// Global metrics registry
    pub static ref REGISTRY: Registry = Registry::new();

    // =========================================================================
    // CHANNEL METRICS
    // =========================================================================

    /// Handshake outcomes: started / trusted / rejected / failed
    pub static ref HANDSHAKES: CounterVec = CounterVec::new(
        Opts::new("uplink_handshakes_total", "Handshake attempts by outcome"),
        &["outcome"]
    ).expect("metric creation failed");

    /// Reconnection attempts after a transport failure
    pub static ref RECONNECT_ATTEMPTS: Counter = Counter::new(
        "uplink_reconnect_attempts_total",
        "Total reconnection attempts to the control plane"
    ).expect("metric creation failed");

    /// 1 while a transport connection is up
    pub static ref LINK_CONNECTED: Gauge = Gauge::new(
        "uplink_link_connected",
        "Whether the control-plane link is connected"
    ).expect("metric creation failed");

    // =========================================================================
    // COMMAND METRICS
    // =========================================================================

    /// Commands handled, by action and outcome
    pub static ref COMMANDS: CounterVec = CounterVec::new(
        Opts::new("uplink_commands_total", "Commands handled by action and outcome"),
        &["action", "outcome"]
    ).expect("metric creation failed");

    /// Archive transfers by outcome
    pub static ref FILE_TRANSFERS: CounterVec = CounterVec::new(
        Opts::new("uplink_file_transfers_total", "Archive transfers by outcome"),
        &["outcome"]
    ).expect("metric creation failed");

    /// Download + extract duration
    pub static ref FILE_TRANSFER_DURATION: Histogram = Histogram::with_opts(
        HistogramOpts::new(
            "uplink_file_transfer_duration_seconds",
            "Time spent downloading and extracting one archive"
        ).buckets(exponential_buckets(0.01, 2.0, 12).expect("bucket creation failed"))
    ).expect("metric creation failed");
}

/// Handle returned by [`register_metrics`].
pub struct MetricsHandle {
    _registry: Arc<Registry>,
}

/// Register all metrics with the global registry.
pub fn register_metrics() -> Result<MetricsHandle, TelemetryError> {
    let metrics: Vec<Box<dyn prometheus::core::Collector>> = vec![
        Box::new(HANDSHAKES.clone()),
        Box::new(RECONNECT_ATTEMPTS.clone()),
        Box::new(LINK_CONNECTED.clone()),
        Box::new(COMMANDS.clone()),
        Box::new(FILE_TRANSFERS.clone()),
        Box::new(FILE_TRANSFER_DURATION.clone()),
    ];

    for metric in metrics {
        REGISTRY
            .register(metric)
            .map_err(|e| TelemetryError::MetricsInit(e.to_string()))?;
    }

    Ok(MetricsHandle {
        _registry: Arc::new(REGISTRY.clone()),
    })
}

/// Encode all metrics as Prometheus text format.
pub fn encode_metrics() -> Result<String, TelemetryError> {
    let encoder = TextEncoder::new();
    let metric_families = REGISTRY.gather();
    let mut buffer = Vec::new();
    encoder
        .encode(&metric_families, &mut buffer)
        .map_err(|e| TelemetryError::MetricsInit(e.to_string()))?;
    String::from_utf8(buffer).map_err(|e| TelemetryError::MetricsInit(e.to_string()))
}
