use std::fmt;
use std::panic::{catch_unwind, AssertUnwindSafe};

use tracing::error;

use crate::atomics::AtomicF64;
use crate::formatting::{write_sample, Value};

/// A callback producing the current value of a computed [`Gauge`].
pub type GaugeFn = Box<dyn Fn() -> f64 + Send + Sync + 'static>;

/// A gauge: a value that can go up and down.
///
/// A gauge is created in one of two modes and keeps it for its whole lifetime:
///
/// - **computed**: the value is produced by a callback on every read and every scrape. The
///   callback must be cheap and safe to call from any thread.
/// - **settable**: the gauge stores its own value, mutated with [`set`](Gauge::set),
///   [`add`](Gauge::add), [`inc`](Gauge::inc) and [`dec`](Gauge::dec).
///
/// Mutating a computed gauge is a programmer error and panics immediately.
pub struct Gauge {
    source: GaugeSource,
}

enum GaugeSource {
    Computed(GaugeFn),
    Settable(AtomicF64),
}

impl Gauge {
    pub(crate) fn computed(f: GaugeFn) -> Self {
        Self { source: GaugeSource::Computed(f) }
    }

    pub(crate) fn settable() -> Self {
        Self { source: GaugeSource::Settable(AtomicF64::default()) }
    }

    /// Returns `true` if the value is produced by a callback.
    pub fn is_computed(&self) -> bool {
        matches!(self.source, GaugeSource::Computed(_))
    }

    /// Gets the current value, invoking the callback for computed gauges.
    pub fn get(&self) -> f64 {
        match &self.source {
            GaugeSource::Computed(f) => f(),
            GaugeSource::Settable(value) => value.get(),
        }
    }

    /// Overwrites the current value.
    ///
    /// # Panics
    ///
    /// Panics if the gauge is computed.
    pub fn set(&self, v: f64) {
        self.settable_value("set").set(v);
    }

    /// Adds `delta` to the current value.
    ///
    /// # Panics
    ///
    /// Panics if the gauge is computed.
    pub fn add(&self, delta: f64) {
        self.settable_value("add").add(delta);
    }

    /// Increments the current value by one.
    ///
    /// # Panics
    ///
    /// Panics if the gauge is computed.
    pub fn inc(&self) {
        self.settable_value("inc").add(1.0);
    }

    /// Decrements the current value by one.
    ///
    /// # Panics
    ///
    /// Panics if the gauge is computed.
    pub fn dec(&self) {
        self.settable_value("dec").add(-1.0);
    }

    fn settable_value(&self, op: &str) -> &AtomicF64 {
        match &self.source {
            GaugeSource::Settable(value) => value,
            GaugeSource::Computed(_) => {
                panic!("BUG: cannot call {op}() on a gauge whose value is computed by a callback")
            }
        }
    }

    pub(crate) fn marshal_to(&self, prefix: &str, buffer: &mut String) {
        // A panicking callback must not take the rest of the scrape down with it.
        match catch_unwind(AssertUnwindSafe(|| self.get())) {
            Ok(v) => write_sample(buffer, prefix, Value::Float(v)),
            Err(_) => error!(metric = prefix, "gauge callback panicked; skipping sample"),
        }
    }
}

impl fmt::Debug for Gauge {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mode = if self.is_computed() { "computed" } else { "settable" };
        f.debug_struct("Gauge").field("mode", &mode).finish()
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicU64, Ordering};
    use std::sync::Arc;

    use super::Gauge;

    #[test]
    fn test_settable_gauge() {
        let g = Gauge::settable();
        assert_eq!(g.get(), 0.0);
        g.set(1.234);
        assert_eq!(g.get(), 1.234);

        g.set(0.0);
        for i in 1..=100 {
            g.inc();
            assert_eq!(g.get(), f64::from(i));
        }
        for i in (0..100).rev() {
            g.dec();
            assert_eq!(g.get(), f64::from(i));
        }

        g.add(-2.5);
        assert_eq!(g.get(), -2.5);
    }

    #[test]
    fn test_computed_gauge_reads_callback() {
        let calls = Arc::new(AtomicU64::new(0));
        let calls2 = Arc::clone(&calls);
        let g = Gauge::computed(Box::new(move || {
            calls2.fetch_add(1, Ordering::Relaxed);
            1234.0
        }));

        assert!(g.is_computed());
        assert_eq!(g.get(), 1234.0);

        let mut buffer = String::new();
        g.marshal_to("foobar", &mut buffer);
        assert_eq!(buffer, "foobar 1234\n");
        assert_eq!(calls.load(Ordering::Relaxed), 2);
    }

    #[test]
    #[should_panic(expected = "cannot call set()")]
    fn test_set_on_computed_gauge_panics() {
        Gauge::computed(Box::new(|| 123.0)).set(12.35);
    }

    #[test]
    #[should_panic(expected = "cannot call add()")]
    fn test_add_on_computed_gauge_panics() {
        Gauge::computed(Box::new(|| 123.0)).add(42.0);
    }

    #[test]
    #[should_panic(expected = "cannot call inc()")]
    fn test_inc_on_computed_gauge_panics() {
        Gauge::computed(Box::new(|| 123.0)).inc();
    }

    #[test]
    #[should_panic(expected = "cannot call dec()")]
    fn test_dec_on_computed_gauge_panics() {
        Gauge::computed(Box::new(|| 123.0)).dec();
    }

    #[test]
    fn test_panicking_callback_is_skipped() {
        let subscriber = tracing_subscriber::fmt().with_test_writer().finish();
        tracing::subscriber::with_default(subscriber, || {
            let g = Gauge::computed(Box::new(|| panic!("boom")));
            let mut buffer = String::new();
            g.marshal_to("broken", &mut buffer);
            assert!(buffer.is_empty());
        });
    }

    #[test]
    fn test_concurrent_updates() {
        let g = Gauge::settable();
        std::thread::scope(|s| {
            for _ in 0..5 {
                s.spawn(|| {
                    for _ in 0..100 {
                        g.inc();
                    }
                });
            }
        });
        assert_eq!(g.get(), 500.0);
    }
}
