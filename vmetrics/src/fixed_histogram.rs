//! Classic Prometheus histogram with caller-supplied upper bounds.

use std::fmt::Write;
use std::time::Instant;

use parking_lot::Mutex;

use crate::formatting::{add_tag, split_metric_name, write_metric_line, Value};

/// Default upper bounds, tuned for request latencies in seconds.
pub const DEFAULT_BUCKETS: [f64; 11] =
    [0.005, 0.01, 0.025, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0];

/// Returns `count` upper bounds starting at `start` and spaced `width` apart.
///
/// # Panics
///
/// Panics if `count` is zero or `width` is not positive.
pub fn linear_buckets(start: f64, width: f64, count: usize) -> Vec<f64> {
    if count < 1 {
        panic!("BUG: linear_buckets needs a positive count");
    }
    if !(width > 0.0) {
        panic!("BUG: linear_buckets needs a positive width, got {width}");
    }

    let mut buckets = Vec::with_capacity(count);
    let mut bound = start;
    for _ in 0..count {
        buckets.push(bound);
        bound += width;
    }
    buckets
}

/// Returns `count` upper bounds starting at `start`, each `factor` times the previous one.
///
/// # Panics
///
/// Panics if `count` is zero, `start` is not positive, or `factor` is not greater than one.
pub fn exponential_buckets(start: f64, factor: f64, count: usize) -> Vec<f64> {
    if count < 1 {
        panic!("BUG: exponential_buckets needs a positive count");
    }
    if !(start > 0.0) {
        panic!("BUG: exponential_buckets needs a positive start, got {start}");
    }
    if !(factor > 1.0) {
        panic!("BUG: exponential_buckets needs a factor greater than 1, got {factor}");
    }

    let mut buckets = Vec::with_capacity(count);
    let mut bound = start;
    for _ in 0..count {
        buckets.push(bound);
        bound *= factor;
    }
    buckets
}

/// A histogram with fixed, cumulative `le` buckets.
///
/// Every observation increments exactly one bucket, and the bucket counts, sum and count are
/// updated together under one lock, so a scrape always sees a consistent snapshot. Negative values
/// and `NaN` are ignored. A histogram without observations is not exported.
#[derive(Debug)]
pub struct FixedBucketHistogram {
    upper_bounds: Box<[f64]>,
    state: Mutex<State>,
}

#[derive(Debug)]
struct State {
    // One slot per upper bound; observations above the last bound only show up in `count`.
    buckets: Vec<u64>,
    sum: f64,
    count: u64,
}

impl FixedBucketHistogram {
    /// Creates an unregistered histogram with the given upper bounds.
    ///
    /// A trailing `+Inf` bound is redundant and dropped.
    ///
    /// # Panics
    ///
    /// Panics if `upper_bounds` is empty, not strictly increasing, contains `NaN`, or contains
    /// `+Inf` anywhere but at the end.
    pub fn new(upper_bounds: &[f64]) -> Self {
        let upper_bounds = match upper_bounds.split_last() {
            Some((last, rest)) if *last == f64::INFINITY => rest,
            _ => upper_bounds,
        };
        validate_buckets(upper_bounds);

        Self {
            upper_bounds: upper_bounds.into(),
            state: Mutex::new(State { buckets: vec![0; upper_bounds.len()], sum: 0.0, count: 0 }),
        }
    }

    /// Returns the configured upper bounds, without `+Inf`.
    pub fn upper_bounds(&self) -> &[f64] {
        &self.upper_bounds
    }

    /// Records an observation.
    pub fn update(&self, v: f64) {
        if v.is_nan() || v < 0.0 {
            return;
        }

        let idx = self.upper_bounds.iter().position(|ub| v <= *ub);
        let mut state = self.state.lock();
        state.sum += v;
        state.count += 1;
        if let Some(idx) = idx {
            state.buckets[idx] += 1;
        }
    }

    /// Records the number of seconds elapsed since `start`.
    pub fn update_duration(&self, start: Instant) {
        self.update(start.elapsed().as_secs_f64());
    }

    /// Adds every observation of `src` to this histogram.
    ///
    /// # Panics
    ///
    /// Panics if the two histograms have different upper bounds.
    pub fn merge(&self, src: &FixedBucketHistogram) {
        if self.upper_bounds != src.upper_bounds {
            panic!("BUG: cannot merge fixed-bucket histograms with different upper bounds");
        }
        if std::ptr::eq(self, src) {
            return;
        }

        let (buckets, sum, count) = {
            let src = src.state.lock();
            (src.buckets.clone(), src.sum, src.count)
        };
        let mut state = self.state.lock();
        for (dst, n) in state.buckets.iter_mut().zip(buckets) {
            *dst += n;
        }
        state.sum += sum;
        state.count += count;
    }

    /// Clears all buckets, the sum, and the count.
    pub fn reset(&self) {
        let mut state = self.state.lock();
        state.buckets.iter_mut().for_each(|b| *b = 0);
        state.sum = 0.0;
        state.count = 0;
    }

    /// Number of accepted observations.
    pub fn count(&self) -> u64 {
        self.state.lock().count
    }

    /// Sum of accepted observations.
    pub fn sum(&self) -> f64 {
        self.state.lock().sum
    }

    pub(crate) fn marshal_to(&self, prefix: &str, buffer: &mut String) {
        let state = self.state.lock();
        if state.count == 0 {
            return;
        }

        let (base, labels) = split_metric_name(prefix);
        let mut tag = String::new();
        let mut cumulative = 0;
        for (ub, n) in self.upper_bounds.iter().zip(state.buckets.iter()) {
            cumulative += n;
            tag.clear();
            let _ = write!(tag, "le=\"{ub}\"");
            let labels = add_tag(labels, &tag);
            write_metric_line(buffer, base, "_bucket", &labels, Value::Unsigned(cumulative));
        }

        let labels_inf = add_tag(labels, "le=\"+Inf\"");
        write_metric_line(buffer, base, "_bucket", &labels_inf, Value::Unsigned(state.count));
        write_metric_line(buffer, base, "_sum", labels, Value::Float(state.sum));
        write_metric_line(buffer, base, "_count", labels, Value::Unsigned(state.count));
    }
}

impl Default for FixedBucketHistogram {
    fn default() -> Self {
        Self::new(&DEFAULT_BUCKETS)
    }
}

fn validate_buckets(upper_bounds: &[f64]) {
    if upper_bounds.is_empty() {
        panic!("BUG: no upper bounds were given for the buckets");
    }
    if upper_bounds.iter().any(|ub| ub.is_nan()) {
        panic!("BUG: upper bounds for the buckets cannot be NaN");
    }
    if upper_bounds.contains(&f64::INFINITY) {
        panic!("BUG: +Inf is only allowed as the last upper bound");
    }
    if upper_bounds.windows(2).any(|pair| pair[0] >= pair[1]) {
        panic!("BUG: upper bounds for the buckets must be strictly increasing");
    }
}
