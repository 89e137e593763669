use std::sync::Arc;
use std::time::Duration;

use once_cell::sync::Lazy;
use vmetrics::{labels, Counter, Histogram, Set};

// Exported alongside the default registry.
static PUSH_METRICS: Lazy<Arc<Set>> = Lazy::new(|| {
    let set = Arc::new(Set::new());
    vmetrics::register_set(Arc::clone(&set));
    set
});

/// Exporter telemetry for one push endpoint.
///
/// Every metric carries a `url` label with the redacted endpoint. Telemetry for the same endpoint
/// is shared between exporters.
pub(crate) struct PushTelemetry {
    pushes: Arc<Counter>,
    pub(crate) errors: Arc<Counter>,
    bytes_pushed: Arc<Counter>,
    pub(crate) duration: Arc<Histogram>,
    block_size: Arc<Histogram>,
}

impl PushTelemetry {
    pub(crate) fn new(url: &str, interval: Duration) -> Self {
        let set = &*PUSH_METRICS;
        let url = labels().add("url", url);

        set.get_or_create_float_counter(&url.compose("metrics_push_interval_seconds"))
            .set(interval.as_secs_f64());

        Self {
            pushes: set.get_or_create_counter(&url.compose("metrics_push_total")),
            errors: set.get_or_create_counter(&url.compose("metrics_push_errors_total")),
            bytes_pushed: set
                .get_or_create_counter(&url.compose("metrics_push_bytes_pushed_total")),
            duration: set.get_or_create_histogram(&url.compose("metrics_push_duration_seconds")),
            block_size: set.get_or_create_histogram(&url.compose("metrics_push_block_size_bytes")),
        }
    }

    /// Records an attempted push of `len` bytes.
    pub(crate) fn record_block(&self, len: usize) {
        self.pushes.inc();
        self.bytes_pushed.add(len as u64);
        self.block_size.update(len as f64);
    }
}
