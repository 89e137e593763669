use std::fmt;
use std::io;
use std::sync::Arc;
use std::time::Duration;

use indexmap::{map::Entry, IndexMap};
use parking_lot::{RwLock, RwLockWriteGuard};

use crate::counter::Counter;
use crate::fixed_histogram::FixedBucketHistogram;
use crate::float_counter::FloatCounter;
use crate::formatting::write_metadata;
use crate::gauge::Gauge;
use crate::histogram::Histogram;
use crate::metric::{Metric, MetricKind, NamedMetric};
use crate::summary::{
    quantile_name, scheduler, QuantileView, Summary, DEFAULT_SUMMARY_QUANTILES,
    DEFAULT_SUMMARY_WINDOW,
};
use crate::validator::{canonical_name, validate_metric_name};

/// A callback appending exposition text to a buffer.
pub type WriteMetricsFn = Arc<dyn Fn(&mut String) + Send + Sync + 'static>;

/// A set of named metrics.
///
/// `Set` owns the mapping from metric names to metrics and renders them in the Prometheus text
/// exposition format. Each name is registered at most once:
///
/// - `new_*` registers a fresh metric and panics if the name is already taken.
/// - `get_or_create_*` returns the existing metric for the name, or registers a new one.
///   Concurrent callers racing on the same name all receive the same instance. Asking for a
///   different kind than the one registered panics.
///
/// Both panic on names that do not pass [`validate_metric_name`]. Names may carry labels, e.g.
/// `requests_total{path="/foo",code="200"}`. Names are registered in canonical form: an empty
/// label list is dropped and labels are ordered by key, so `foo{}` is `foo`, and
/// `foo{b="2",a="1"}` is `foo{a="1",b="2"}`.
///
/// Rendering holds the set's lock for the whole pass, so a scrape and a registration never
/// interleave. Metric updates themselves never touch the set.
pub struct Set {
    inner: RwLock<Inner>,
}

#[derive(Default)]
struct Inner {
    metrics: IndexMap<String, NamedMetric>,
    sorted: bool,
    summaries: Vec<Arc<Summary>>,
    writers: Vec<WriteMetricsFn>,
}

impl Inner {
    fn assert_vacant(&self, name: &str) {
        if self.metrics.contains_key(name) {
            panic!("BUG: metric {name:?} is already registered");
        }
    }

    fn insert(&mut self, name: String, metric: NamedMetric) {
        self.metrics.insert(name, metric);
        self.sorted = false;
    }

    fn register_summary(&mut self, name: &str, summary: &Arc<Summary>) {
        let views = QuantileView::for_summary(name, summary);
        self.assert_vacant(name);
        for (view_name, _) in &views {
            self.assert_vacant(view_name);
        }

        self.insert(name.to_string(), NamedMetric::new(name, Metric::Summary(Arc::clone(summary))));
        for (view_name, view) in views {
            self.insert(view_name, NamedMetric::new_quantile(name, view));
        }
        self.summaries.push(Arc::clone(summary));
    }
}

impl Set {
    /// Creates an empty set.
    pub fn new() -> Self {
        Self { inner: RwLock::new(Inner::default()) }
    }

    /// Registers a new counter.
    ///
    /// # Panics
    ///
    /// Panics if `name` is invalid or already registered.
    pub fn new_counter(&self, name: &str) -> Arc<Counter> {
        let counter = Arc::new(Counter::new());
        self.register(name, Metric::Counter(Arc::clone(&counter)));
        counter
    }

    /// Returns the counter registered under `name`, registering a new one if needed.
    ///
    /// # Panics
    ///
    /// Panics if `name` is invalid or registered as another kind.
    pub fn get_or_create_counter(&self, name: &str) -> Arc<Counter> {
        match self.get_or_create(name, MetricKind::Counter, || {
            Metric::Counter(Arc::new(Counter::new()))
        }) {
            Metric::Counter(counter) => counter,
            other => kind_mismatch(name, MetricKind::Counter, &other),
        }
    }

    /// Registers a new floating-point counter.
    ///
    /// # Panics
    ///
    /// Panics if `name` is invalid or already registered.
    pub fn new_float_counter(&self, name: &str) -> Arc<FloatCounter> {
        let counter = Arc::new(FloatCounter::new());
        self.register(name, Metric::FloatCounter(Arc::clone(&counter)));
        counter
    }

    /// Returns the floating-point counter registered under `name`, registering a new one if needed.
    ///
    /// # Panics
    ///
    /// Panics if `name` is invalid or registered as another kind.
    pub fn get_or_create_float_counter(&self, name: &str) -> Arc<FloatCounter> {
        match self.get_or_create(name, MetricKind::FloatCounter, || {
            Metric::FloatCounter(Arc::new(FloatCounter::new()))
        }) {
            Metric::FloatCounter(counter) => counter,
            other => kind_mismatch(name, MetricKind::FloatCounter, &other),
        }
    }

    /// Registers a new gauge whose value is computed by `f` on every read.
    ///
    /// # Panics
    ///
    /// Panics if `name` is invalid or already registered.
    pub fn new_gauge<F>(&self, name: &str, f: F) -> Arc<Gauge>
    where
        F: Fn() -> f64 + Send + Sync + 'static,
    {
        let gauge = Arc::new(Gauge::computed(Box::new(f)));
        self.register(name, Metric::Gauge(Arc::clone(&gauge)));
        gauge
    }

    /// Returns the gauge registered under `name`, registering a computed gauge backed by `f` if
    /// needed.
    ///
    /// When the gauge already exists, `f` is dropped.
    ///
    /// # Panics
    ///
    /// Panics if `name` is invalid or registered as another kind.
    pub fn get_or_create_gauge<F>(&self, name: &str, f: F) -> Arc<Gauge>
    where
        F: Fn() -> f64 + Send + Sync + 'static,
    {
        match self.get_or_create(name, MetricKind::Gauge, || {
            Metric::Gauge(Arc::new(Gauge::computed(Box::new(f))))
        }) {
            Metric::Gauge(gauge) => gauge,
            other => kind_mismatch(name, MetricKind::Gauge, &other),
        }
    }

    /// Registers a new settable gauge starting at zero.
    ///
    /// # Panics
    ///
    /// Panics if `name` is invalid or already registered.
    pub fn new_settable_gauge(&self, name: &str) -> Arc<Gauge> {
        let gauge = Arc::new(Gauge::settable());
        self.register(name, Metric::Gauge(Arc::clone(&gauge)));
        gauge
    }

    /// Returns the gauge registered under `name`, registering a settable gauge if needed.
    ///
    /// # Panics
    ///
    /// Panics if `name` is invalid or registered as another kind.
    pub fn get_or_create_settable_gauge(&self, name: &str) -> Arc<Gauge> {
        match self.get_or_create(name, MetricKind::Gauge, || {
            Metric::Gauge(Arc::new(Gauge::settable()))
        }) {
            Metric::Gauge(gauge) => gauge,
            other => kind_mismatch(name, MetricKind::Gauge, &other),
        }
    }

    /// Registers a new log-bucket histogram.
    ///
    /// # Panics
    ///
    /// Panics if `name` is invalid or already registered.
    pub fn new_histogram(&self, name: &str) -> Arc<Histogram> {
        let histogram = Arc::new(Histogram::new());
        self.register(name, Metric::Histogram(Arc::clone(&histogram)));
        histogram
    }

    /// Returns the log-bucket histogram registered under `name`, registering a new one if needed.
    ///
    /// # Panics
    ///
    /// Panics if `name` is invalid or registered as another kind.
    pub fn get_or_create_histogram(&self, name: &str) -> Arc<Histogram> {
        match self.get_or_create(name, MetricKind::Histogram, || {
            Metric::Histogram(Arc::new(Histogram::new()))
        }) {
            Metric::Histogram(histogram) => histogram,
            other => kind_mismatch(name, MetricKind::Histogram, &other),
        }
    }

    /// Registers a new histogram with the given upper bounds.
    ///
    /// # Panics
    ///
    /// Panics if `name` is invalid or already registered, or if `upper_bounds` is rejected by
    /// [`FixedBucketHistogram::new`].
    pub fn new_fixed_bucket_histogram(
        &self,
        name: &str,
        upper_bounds: &[f64],
    ) -> Arc<FixedBucketHistogram> {
        validate_or_panic(name);
        let histogram = Arc::new(FixedBucketHistogram::new(upper_bounds));
        self.register(name, Metric::FixedBucketHistogram(Arc::clone(&histogram)));
        histogram
    }

    /// Returns the fixed-bucket histogram registered under `name`, registering one with
    /// `upper_bounds` if needed.
    ///
    /// # Panics
    ///
    /// Panics if `name` is invalid or registered as another kind, if `upper_bounds` is rejected
    /// by [`FixedBucketHistogram::new`], or if the existing histogram has different bounds.
    pub fn get_or_create_fixed_bucket_histogram(
        &self,
        name: &str,
        upper_bounds: &[f64],
    ) -> Arc<FixedBucketHistogram> {
        let histogram = match self.get_or_create(name, MetricKind::FixedBucketHistogram, || {
            Metric::FixedBucketHistogram(Arc::new(FixedBucketHistogram::new(upper_bounds)))
        }) {
            Metric::FixedBucketHistogram(histogram) => histogram,
            other => kind_mismatch(name, MetricKind::FixedBucketHistogram, &other),
        };

        let requested = match upper_bounds.split_last() {
            Some((last, rest)) if *last == f64::INFINITY => rest,
            _ => upper_bounds,
        };
        if histogram.upper_bounds() != requested {
            panic!(
                "BUG: histogram {name:?} is registered with upper bounds {:?}, not {requested:?}",
                histogram.upper_bounds()
            );
        }
        histogram
    }

    /// Registers a new summary with the default window and quantiles.
    ///
    /// # Panics
    ///
    /// Panics if `name` or any of its quantile names is invalid or already registered.
    pub fn new_summary(&self, name: &str) -> Arc<Summary> {
        self.new_summary_ext(name, DEFAULT_SUMMARY_WINDOW, &DEFAULT_SUMMARY_QUANTILES)
    }

    /// Registers a new summary with the given window and quantiles.
    ///
    /// # Panics
    ///
    /// Panics if `name` or any of its quantile names is invalid or already registered, if `window`
    /// is zero, or if a quantile is outside `[0, 1]`.
    pub fn new_summary_ext(&self, name: &str, window: Duration, quantiles: &[f64]) -> Arc<Summary> {
        validate_or_panic(name);
        let name = canonical_name(name);
        let summary = Arc::new(Summary::new(window, quantiles));
        self.inner.write().register_summary(&name, &summary);
        scheduler().register(&summary);
        summary
    }

    /// Returns the summary registered under `name`, registering one with the default window and
    /// quantiles if needed.
    ///
    /// # Panics
    ///
    /// See [`get_or_create_summary_ext`](Set::get_or_create_summary_ext).
    pub fn get_or_create_summary(&self, name: &str) -> Arc<Summary> {
        self.get_or_create_summary_ext(name, DEFAULT_SUMMARY_WINDOW, &DEFAULT_SUMMARY_QUANTILES)
    }

    /// Returns the summary registered under `name`, registering one with the given window and
    /// quantiles if needed.
    ///
    /// # Panics
    ///
    /// Panics if `name` is invalid or registered as another kind, or if the existing summary has a
    /// different window or different quantiles.
    pub fn get_or_create_summary_ext(
        &self,
        name: &str,
        window: Duration,
        quantiles: &[f64],
    ) -> Arc<Summary> {
        let name = canonical_name(name);
        let name = &*name;
        let existing = self.inner.read().metrics.get(name).map(|nm| nm.metric.clone());
        let metric = match existing {
            Some(metric) => metric,
            None => {
                validate_or_panic(name);
                let summary = Arc::new(Summary::new(window, quantiles));

                let mut inner = self.inner.write();
                let raced = inner.metrics.get(name).map(|nm| nm.metric.clone());
                match raced {
                    Some(metric) => metric,
                    None => {
                        inner.register_summary(name, &summary);
                        drop(inner);
                        scheduler().register(&summary);
                        return summary;
                    }
                }
            }
        };

        let summary = match metric {
            Metric::Summary(summary) => summary,
            other => kind_mismatch(name, MetricKind::Summary, &other),
        };
        if summary.window() != window {
            panic!(
                "BUG: summary {name:?} is registered with window {:?}, not {window:?}",
                summary.window()
            );
        }
        if summary.quantiles() != quantiles {
            panic!(
                "BUG: summary {name:?} is registered with quantiles {:?}, not {quantiles:?}",
                summary.quantiles()
            );
        }
        summary
    }

    /// Removes the metric registered under `name`, returning whether it was present.
    ///
    /// Removing a summary also removes its quantiles and stops its window rotation.
    pub fn unregister_metric(&self, name: &str) -> bool {
        let name = canonical_name(name);
        let name = &*name;
        let mut inner = self.inner.write();
        let Some(nm) = inner.metrics.shift_remove(name) else {
            return false;
        };

        if let Metric::Summary(summary) = nm.metric {
            for q in summary.quantiles() {
                inner.metrics.shift_remove(&quantile_name(name, *q));
            }
            inner.summaries.retain(|s| !Arc::ptr_eq(s, &summary));
            drop(inner);
            scheduler().unregister(&summary);
        }
        true
    }

    /// Removes every registered metric. Registered metrics writers are kept.
    pub fn unregister_all_metrics(&self) {
        let summaries = {
            let mut inner = self.inner.write();
            inner.metrics.clear();
            inner.sorted = true;
            std::mem::take(&mut inner.summaries)
        };
        for summary in &summaries {
            scheduler().unregister(summary);
        }
    }

    /// Returns the names of all registered metrics.
    ///
    /// Summary quantiles are not listed separately.
    pub fn list_metric_names(&self) -> Vec<String> {
        let inner = self.inner.read();
        inner
            .metrics
            .iter()
            .filter(|(_, nm)| !nm.is_auxiliary())
            .map(|(name, _)| name.clone())
            .collect()
    }

    /// Registers a callback whose output is appended after this set's metrics on every render.
    ///
    /// The callback must write complete exposition lines.
    pub fn register_metrics_writer<F>(&self, f: F)
    where
        F: Fn(&mut String) + Send + Sync + 'static,
    {
        self.inner.write().writers.push(Arc::new(f));
    }

    /// Renders every metric in the Prometheus text exposition format into `buffer`.
    ///
    /// When `expose_metadata` is set, each metric family is preceded by `# HELP` and `# TYPE`
    /// lines.
    /// Histograms and summaries without observations produce no lines at all.
    pub fn write_into(&self, buffer: &mut String, expose_metadata: bool) {
        let mut inner = self.inner.write();
        if !inner.sorted {
            inner.metrics.sort_by(|_, a, _, b| a.sort_key.cmp(&b.sort_key));
            inner.sorted = true;
        }
        let inner = RwLockWriteGuard::downgrade(inner);

        for summary in &inner.summaries {
            summary.refresh_quantiles();
        }

        let mut scratch = String::new();
        let mut last_family: Option<&str> = None;
        for (name, nm) in &inner.metrics {
            if !expose_metadata {
                nm.metric.marshal_to(name, buffer);
                continue;
            }

            scratch.clear();
            nm.metric.marshal_to(name, &mut scratch);
            if scratch.is_empty() {
                continue;
            }
            if last_family != Some(nm.family()) {
                write_metadata(buffer, nm.family(), nm.metric.kind().as_type_str());
                last_family = Some(nm.family());
            }
            buffer.push_str(&scratch);
        }

        let writers = inner.writers.clone();
        drop(inner);
        for writer in &writers {
            writer(buffer);
        }
    }

    /// Renders every metric into a new string. See [`write_into`](Set::write_into).
    pub fn render(&self, expose_metadata: bool) -> String {
        let mut buffer = String::new();
        self.write_into(&mut buffer, expose_metadata);
        buffer
    }

    /// Renders every metric into `w`. See [`write_into`](Set::write_into).
    ///
    /// ## Errors
    ///
    /// Returns any error produced by `w`.
    pub fn write_prometheus<W: io::Write>(
        &self,
        w: &mut W,
        expose_metadata: bool,
    ) -> io::Result<()> {
        w.write_all(self.render(expose_metadata).as_bytes())
    }

    fn register(&self, name: &str, metric: Metric) {
        validate_or_panic(name);
        let name = canonical_name(name);
        let name = &*name;
        let mut inner = self.inner.write();
        inner.assert_vacant(name);
        inner.insert(name.to_string(), NamedMetric::new(name, metric));
    }

    fn get_or_create<F>(&self, name: &str, kind: MetricKind, create: F) -> Metric
    where
        F: FnOnce() -> Metric,
    {
        let name = canonical_name(name);
        let name = &*name;
        if let Some(nm) = self.inner.read().metrics.get(name) {
            return nm.metric.clone();
        }

        validate_or_panic(name);
        let metric = create();
        debug_assert_eq!(metric.kind(), kind);

        let mut guard = self.inner.write();
        let inner = &mut *guard;
        match inner.metrics.entry(name.to_string()) {
            // Lost the race: hand out the winner's instance.
            Entry::Occupied(entry) => entry.get().metric.clone(),
            Entry::Vacant(entry) => {
                entry.insert(NamedMetric::new(name, metric.clone()));
                inner.sorted = false;
                metric
            }
        }
    }
}

impl Default for Set {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for Set {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let inner = self.inner.read();
        f.debug_struct("Set")
            .field("metrics", &inner.metrics.len())
            .field("summaries", &inner.summaries.len())
            .field("writers", &inner.writers.len())
            .finish()
    }
}

fn validate_or_panic(name: &str) {
    if let Err(e) = validate_metric_name(name) {
        panic!("BUG: invalid metric name {name:?}: {e}");
    }
}

fn kind_mismatch(name: &str, expected: MetricKind, actual: &Metric) -> ! {
    panic!("BUG: metric {name:?} isn't a {expected}; it is a {}", actual.kind())
}
