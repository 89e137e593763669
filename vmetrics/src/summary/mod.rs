//! Sliding-window quantile summaries.
//!
//! A summary feeds every observation into two reservoirs, `current` and `next`. Every half window
//! the shared scheduler discards `current`, promotes `next`, and starts a fresh `next`, so
//! quantiles always describe roughly the last `window` worth of observations while `_sum` and
//! `_count` cover everything ever observed.
//!
//! Each configured quantile is exported by its own [`QuantileView`], registered next to the
//! summary as `<name>{quantile="<q>"}`.

use std::sync::Arc;
use std::time::{Duration, Instant};

use parking_lot::Mutex;

use crate::formatting::{add_tag, split_metric_name, write_metric_line, write_sample, Value};
use crate::validator::canonical_name;

mod reservoir;
use self::reservoir::Reservoir;

mod scheduler;
pub(crate) use self::scheduler::scheduler;

/// Default window for summaries.
pub const DEFAULT_SUMMARY_WINDOW: Duration = Duration::from_secs(5 * 60);

/// Default quantiles for summaries.
pub const DEFAULT_SUMMARY_QUANTILES: [f64; 5] = [0.5, 0.9, 0.97, 0.99, 1.0];

/// A summary estimating configured quantiles over a sliding time window.
///
/// Obtained from [`Set::new_summary`](crate::Set::new_summary) and friends. `NaN` observations are
/// ignored.
#[derive(Debug)]
pub struct Summary {
    state: Mutex<State>,
    quantiles: Box<[f64]>,
    window: Duration,
}

#[derive(Debug)]
struct State {
    current: Reservoir,
    next: Reservoir,
    quantile_values: Vec<f64>,
    sum: f64,
    count: u64,
}

impl Summary {
    /// # Panics
    ///
    /// Panics if `window` is zero or any quantile is outside `[0, 1]`.
    pub(crate) fn new(window: Duration, quantiles: &[f64]) -> Self {
        if window.is_zero() {
            panic!("BUG: summary window must be positive");
        }
        if let Some(q) = quantiles.iter().find(|q| !(0.0..=1.0).contains(*q)) {
            panic!("BUG: quantile must be in the range [0..1]; got {q}");
        }

        Self {
            state: Mutex::new(State {
                current: Reservoir::new(),
                next: Reservoir::new(),
                quantile_values: vec![f64::NAN; quantiles.len()],
                sum: 0.0,
                count: 0,
            }),
            quantiles: quantiles.into(),
            window,
        }
    }

    /// Records an observation.
    pub fn update(&self, v: f64) {
        if v.is_nan() {
            return;
        }

        let mut state = self.state.lock();
        state.current.update(v);
        state.next.update(v);
        state.sum += v;
        state.count += 1;
    }

    /// Records the number of seconds elapsed since `start`.
    pub fn update_duration(&self, start: Instant) {
        self.update(start.elapsed().as_secs_f64());
    }

    /// The window quantiles are computed over.
    pub fn window(&self) -> Duration {
        self.window
    }

    /// The configured quantiles.
    pub fn quantiles(&self) -> &[f64] {
        &self.quantiles
    }

    /// Number of observations since creation.
    pub fn count(&self) -> u64 {
        self.state.lock().count
    }

    /// Sum of observations since creation.
    pub fn sum(&self) -> f64 {
        self.state.lock().sum
    }

    /// Computes the configured quantiles over the current window.
    ///
    /// Estimates are `NaN` when the current window holds no observations.
    pub fn quantile_values(&self) -> Vec<f64> {
        self.refresh_quantiles();
        self.state.lock().quantile_values.clone()
    }

    pub(crate) fn swap(&self) {
        let mut state = self.state.lock();
        let state = &mut *state;
        std::mem::swap(&mut state.current, &mut state.next);
        state.next.reset();
    }

    /// Recomputes every configured quantile in one pass over the current window.
    pub(crate) fn refresh_quantiles(&self) {
        let mut state = self.state.lock();
        let state = &mut *state;
        state.current.quantiles(&mut state.quantile_values, &self.quantiles);
    }

    fn cached_quantile(&self, idx: usize) -> f64 {
        self.state.lock().quantile_values[idx]
    }

    /// Writes `_sum` and `_count`. Quantile lines come from the registered views.
    pub(crate) fn marshal_to(&self, prefix: &str, buffer: &mut String) {
        let (sum, count) = {
            let state = self.state.lock();
            (state.sum, state.count)
        };
        if count == 0 {
            return;
        }

        let (base, labels) = split_metric_name(prefix);
        write_metric_line(buffer, base, "_sum", labels, Value::Float(sum));
        write_metric_line(buffer, base, "_count", labels, Value::Unsigned(count));
    }
}

/// Name under which quantile `q` of the summary `name` is exported.
pub(crate) fn quantile_name(name: &str, q: f64) -> String {
    let tagged = add_tag(name, &format!("quantile=\"{q}\""));
    canonical_name(&tagged).into_owned()
}

/// A read-only view of one configured quantile of a [`Summary`].
#[derive(Clone, Debug)]
pub(crate) struct QuantileView {
    summary: Arc<Summary>,
    idx: usize,
}

impl QuantileView {
    /// Creates one view per configured quantile, paired with its exported name.
    pub(crate) fn for_summary(name: &str, summary: &Arc<Summary>) -> Vec<(String, QuantileView)> {
        summary
            .quantiles
            .iter()
            .enumerate()
            .map(|(idx, q)| {
                (quantile_name(name, *q), QuantileView { summary: Arc::clone(summary), idx })
            })
            .collect()
    }

    pub(crate) fn index(&self) -> usize {
        self.idx
    }

    pub(crate) fn marshal_to(&self, prefix: &str, buffer: &mut String) {
        let v = self.summary.cached_quantile(self.idx);
        if v.is_nan() {
            return;
        }
        write_sample(buffer, prefix, Value::Float(v));
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::time::Duration;

    use super::{QuantileView, Summary, DEFAULT_SUMMARY_QUANTILES, DEFAULT_SUMMARY_WINDOW};

    fn render(summary: &Arc<Summary>, name: &str) -> String {
        let mut buffer = String::new();
        summary.refresh_quantiles();
        for (view_name, view) in QuantileView::for_summary(name, summary) {
            view.marshal_to(&view_name, &mut buffer);
        }
        summary.marshal_to(name, &mut buffer);
        buffer
    }

    #[test]
    fn test_serial_quantiles() {
        let summary = Summary::new(DEFAULT_SUMMARY_WINDOW, &DEFAULT_SUMMARY_QUANTILES);
        for i in 0..2000 {
            summary.update(f64::from(i));
        }

        let values = summary.quantile_values();
        assert_eq!(values.len(), 5);
        assert_eq!(values[4], 1999.0);
        assert_eq!(summary.count(), 2000);
        assert_eq!(summary.sum(), 1999.0 * 1000.0);
        for pair in values.windows(2) {
            assert!(pair[0] <= pair[1], "quantiles must be non-decreasing: {values:?}");
        }
    }

    #[test]
    fn test_min_quantile_tracks_current_window() {
        let summary = Summary::new(DEFAULT_SUMMARY_WINDOW, &[0.0, 1.0]);
        for i in 0..2000 {
            summary.update(f64::from(i));
        }
        assert_eq!(summary.quantile_values(), vec![0.0, 1999.0]);

        // After one rotation `current` still holds everything seen so far; after the second it
        // only holds what arrived since the first.
        summary.swap();
        summary.update(5000.0);
        summary.swap();
        assert_eq!(summary.quantile_values(), vec![5000.0, 5000.0]);

        summary.swap();
        assert!(summary.quantile_values().iter().all(|v| v.is_nan()));
        assert_eq!(summary.count(), 2001);
    }

    #[test]
    fn test_render_golden_output() {
        let summary = Arc::new(Summary::new(DEFAULT_SUMMARY_WINDOW, &[0.5, 1.0]));
        for i in 0..=100 {
            summary.update(f64::from(i));
        }

        let expected = "foo{bar=\"baz\",quantile=\"0.5\"} 50\n\
foo{bar=\"baz\",quantile=\"1\"} 100\n\
foo_sum{bar=\"baz\"} 5050\n\
foo_count{bar=\"baz\"} 101\n";
        assert_eq!(render(&summary, r#"foo{bar="baz"}"#), expected);
    }

    #[test]
    fn test_empty_summary_renders_nothing() {
        let summary = Arc::new(Summary::new(DEFAULT_SUMMARY_WINDOW, &DEFAULT_SUMMARY_QUANTILES));
        summary.update(f64::NAN);
        assert_eq!(render(&summary, "foo"), "");
    }

    #[test]
    fn test_expired_window_keeps_sum_and_count() {
        let summary = Arc::new(Summary::new(DEFAULT_SUMMARY_WINDOW, &[0.5]));
        summary.update(42.0);
        summary.swap();
        summary.swap();
        assert_eq!(render(&summary, "foo"), "foo_sum 42\nfoo_count 1\n");
    }

    #[test]
    #[should_panic(expected = "quantile must be in the range")]
    fn test_quantile_above_one_panics() {
        Summary::new(DEFAULT_SUMMARY_WINDOW, &[0.5, 1.1]);
    }

    #[test]
    #[should_panic(expected = "quantile must be in the range")]
    fn test_negative_quantile_panics() {
        Summary::new(DEFAULT_SUMMARY_WINDOW, &[-0.1]);
    }

    #[test]
    #[should_panic(expected = "window must be positive")]
    fn test_zero_window_panics() {
        Summary::new(Duration::ZERO, &[0.5]);
    }

    #[test]
    fn test_concurrent_updates() {
        let summary = Summary::new(DEFAULT_SUMMARY_WINDOW, &DEFAULT_SUMMARY_QUANTILES);
        std::thread::scope(|s| {
            for _ in 0..5 {
                s.spawn(|| {
                    for i in 0..1000 {
                        summary.update(f64::from(i));
                    }
                });
            }
        });
        assert_eq!(summary.count(), 5000);
        assert_eq!(summary.quantile_values()[4], 999.0);
    }
}
