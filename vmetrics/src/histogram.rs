//! Log-bucket histogram.
//!
//! Values in `[1e-9, 1e18)` are grouped into decades `[10^e, 10^(e+1))`, and every decade is split
//! into 18 linear sub-buckets of width `10^e / 2`. This bounds the relative error of any bucket to
//! roughly 5% across 27 orders of magnitude with a fixed amount of memory.
//!
//! Three extra buckets hold exact zeros, values below the lowest decade, and values at or above the
//! highest decade (including `+Inf`).
//!
//! Buckets are exported as `<name>_bucket{vmrange="<low>...<high>"} <count>` lines. Only buckets
//! with observations are exported.

use std::sync::atomic::Ordering;
use std::time::Instant;

use once_cell::sync::Lazy;
use parking_lot::RwLock;

use crate::atomics::{AtomicF64, AtomicU64};
use crate::formatting::{add_tag, split_metric_name, write_metric_line, Value};

const E10_MIN: i32 = -9;
const E10_MAX: i32 = 18;
const DECIMAL_MULTIPLIER: usize = 2;
const BUCKETS_PER_DECIMAL: usize = 9 * DECIMAL_MULTIPLIER;
const DECIMAL_BUCKETS_COUNT: usize = (E10_MAX - E10_MIN) as usize;
// Distance from a sub-bucket boundary under which a value is assigned to the lower bucket.
const DECIMAL_PRECISION: f64 = 1e-12;

const ZERO_BUCKET: usize = 0;
const LOWER_BUCKET: usize = 1;
const FIRST_DECIMAL_BUCKET: usize = 2;
const UPPER_BUCKET: usize = FIRST_DECIMAL_BUCKET + DECIMAL_BUCKETS_COUNT * BUCKETS_PER_DECIMAL;
const BUCKETS_COUNT: usize = UPPER_BUCKET + 1;

const POW10: [f64; DECIMAL_BUCKETS_COUNT + 1] = [
    1e-9, 1e-8, 1e-7, 1e-6, 1e-5, 1e-4, 1e-3, 1e-2, 1e-1, 1e0, 1e1, 1e2, 1e3, 1e4, 1e5, 1e6, 1e7,
    1e8, 1e9, 1e10, 1e11, 1e12, 1e13, 1e14, 1e15, 1e16, 1e17, 1e18,
];

static BUCKET_RANGES: Lazy<Vec<String>> =
    Lazy::new(|| (0..BUCKETS_COUNT).map(Bucket::from_index).map(Bucket::range).collect());

/// Classification of an observation into one of the histogram buckets.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum Bucket {
    Zero,
    Lower,
    Decimal { decade: usize, offset: usize },
    Upper,
}

impl Bucket {
    /// Classifies a non-negative, non-NaN value.
    fn classify(v: f64) -> Self {
        if v == 0.0 {
            return Bucket::Zero;
        }
        if v.is_infinite() {
            return Bucket::Upper;
        }

        let e10 = v.log10().floor() as i32;
        let decade = e10 - E10_MIN;
        if decade < 0 {
            return Bucket::Lower;
        }
        if decade >= DECIMAL_BUCKETS_COUNT as i32 {
            if decade == DECIMAL_BUCKETS_COUNT as i32
                && (POW10[DECIMAL_BUCKETS_COUNT] - v).abs() < DECIMAL_PRECISION
            {
                // `log10` may round exactly 1e18 up to the next decade.
                return Bucket::Decimal {
                    decade: DECIMAL_BUCKETS_COUNT - 1,
                    offset: BUCKETS_PER_DECIMAL - 1,
                };
            }
            return Bucket::Upper;
        }

        let m = (v / POW10[decade as usize] - 1.0) * DECIMAL_MULTIPLIER as f64;
        let mut offset = (m as i64).clamp(0, BUCKETS_PER_DECIMAL as i64 - 1);
        let mut decade = decade;
        if (offset as f64 - m).abs() < DECIMAL_PRECISION {
            // Boundary values belong to the lower bucket.
            offset -= 1;
            if offset < 0 {
                decade -= 1;
                offset = BUCKETS_PER_DECIMAL as i64 - 1;
                if decade < 0 {
                    return Bucket::Lower;
                }
            }
        }

        Bucket::Decimal { decade: decade as usize, offset: offset as usize }
    }

    fn index(self) -> usize {
        match self {
            Bucket::Zero => ZERO_BUCKET,
            Bucket::Lower => LOWER_BUCKET,
            Bucket::Decimal { decade, offset } => {
                FIRST_DECIMAL_BUCKET + decade * BUCKETS_PER_DECIMAL + offset
            }
            Bucket::Upper => UPPER_BUCKET,
        }
    }

    fn from_index(idx: usize) -> Self {
        match idx {
            ZERO_BUCKET => Bucket::Zero,
            LOWER_BUCKET => Bucket::Lower,
            idx if idx >= UPPER_BUCKET => Bucket::Upper,
            idx => {
                let n = idx - FIRST_DECIMAL_BUCKET;
                Bucket::Decimal { decade: n / BUCKETS_PER_DECIMAL, offset: n % BUCKETS_PER_DECIMAL }
            }
        }
    }

    fn range(self) -> String {
        match self {
            Bucket::Zero => "0...0".to_string(),
            Bucket::Lower => format!("0...{}", format_bound(1.0, E10_MIN)),
            Bucket::Upper => format!("{}...+Inf", format_bound(1.0, E10_MAX)),
            Bucket::Decimal { decade, offset } => {
                let e10 = E10_MIN + decade as i32;
                let start = 1.0 + offset as f64 / DECIMAL_MULTIPLIER as f64;
                let end = 1.0 + (offset + 1) as f64 / DECIMAL_MULTIPLIER as f64;
                format!("{}...{}", format_bound(start, e10), format_bound(end, e10))
            }
        }
    }
}

// Renders `mantissa * 10^e10` as `<m>.<d>e<e10>`; a mantissa of 10 rolls over into the next decade.
fn format_bound(mantissa: f64, e10: i32) -> String {
    if mantissa >= 10.0 {
        format!("{:.1}e{}", mantissa / 10.0, e10 + 1)
    } else {
        format!("{mantissa:.1}e{e10}")
    }
}

/// A histogram with logarithmically spaced buckets.
///
/// Covers values from `1e-9` to `1e18` with a bounded relative error and no configuration. Negative
/// values and `NaN` are ignored.
///
/// Bucket updates are independent atomic increments. [`reset`](Histogram::reset) excludes
/// concurrent updates and readers so that a scrape never observes a half-cleared histogram.
#[derive(Debug)]
pub struct Histogram {
    buckets: Box<[AtomicU64]>,
    sum: AtomicF64,
    count: AtomicU64,
    // Shared by updates and readers, exclusive for `reset`.
    guard: RwLock<()>,
}

impl Histogram {
    /// Creates an empty, unregistered histogram.
    ///
    /// Use [`Set::new_histogram`](crate::Set::new_histogram) to create one that is exported.
    pub fn new() -> Self {
        let buckets = (0..BUCKETS_COUNT).map(|_| AtomicU64::new(0)).collect();
        Self {
            buckets,
            sum: AtomicF64::default(),
            count: AtomicU64::new(0),
            guard: RwLock::new(()),
        }
    }

    /// Records an observation.
    pub fn update(&self, v: f64) {
        if v.is_nan() || v < 0.0 {
            return;
        }

        let idx = Bucket::classify(v).index();
        let _guard = self.guard.read();
        self.buckets[idx].fetch_add(1, Ordering::Relaxed);
        self.sum.add(v);
        self.count.fetch_add(1, Ordering::Release);
    }

    /// Records the number of seconds elapsed since `start`.
    pub fn update_duration(&self, start: Instant) {
        self.update(start.elapsed().as_secs_f64());
    }

    /// Adds every observation of `src` to this histogram.
    ///
    /// Merging a histogram into itself does nothing.
    pub fn merge(&self, src: &Histogram) {
        if std::ptr::eq(self, src) {
            return;
        }

        // Snapshot first so that only one guard is held at a time.
        let (counts, sum, count) = {
            let _guard = src.guard.read();
            let counts = src.buckets.iter().map(|b| b.load(Ordering::Relaxed)).collect::<Vec<_>>();
            (counts, src.sum.get(), src.count.load(Ordering::Acquire))
        };

        let _guard = self.guard.read();
        for (dst, n) in self.buckets.iter().zip(counts) {
            if n > 0 {
                dst.fetch_add(n, Ordering::Relaxed);
            }
        }
        self.sum.add(sum);
        self.count.fetch_add(count, Ordering::Release);
    }

    /// Clears all buckets, the sum, and the count.
    pub fn reset(&self) {
        let _guard = self.guard.write();
        for bucket in self.buckets.iter() {
            bucket.store(0, Ordering::Relaxed);
        }
        self.sum.set(0.0);
        self.count.store(0, Ordering::Release);
    }

    /// Number of accepted observations.
    pub fn count(&self) -> u64 {
        self.count.load(Ordering::Acquire)
    }

    /// Sum of accepted observations.
    pub fn sum(&self) -> f64 {
        self.sum.get()
    }

    /// Calls `f` with the `vmrange` label and count of every non-empty bucket, in ascending order.
    pub fn visit_non_zero_buckets<F>(&self, mut f: F)
    where
        F: FnMut(&str, u64),
    {
        let _guard = self.guard.read();
        for (idx, bucket) in self.buckets.iter().enumerate() {
            let count = bucket.load(Ordering::Relaxed);
            if count > 0 {
                f(&BUCKET_RANGES[idx], count);
            }
        }
    }

    pub(crate) fn marshal_to(&self, prefix: &str, buffer: &mut String) {
        let _guard = self.guard.read();
        let count = self.count.load(Ordering::Acquire);
        if count == 0 {
            return;
        }

        let (base, labels) = split_metric_name(prefix);
        for (idx, bucket) in self.buckets.iter().enumerate() {
            let n = bucket.load(Ordering::Relaxed);
            if n == 0 {
                continue;
            }
            let tag = format!("vmrange=\"{}\"", BUCKET_RANGES[idx]);
            let labels = add_tag(labels, &tag);
            write_metric_line(buffer, base, "_bucket", &labels, Value::Unsigned(n));
        }
        write_metric_line(buffer, base, "_sum", labels, Value::Float(self.sum.get()));
        write_metric_line(buffer, base, "_count", labels, Value::Unsigned(count));
    }
}

impl Default for Histogram {
    fn default() -> Self {
        Self::new()
    }
}
