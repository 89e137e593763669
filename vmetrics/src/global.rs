//! The process-wide default [`Set`] and helpers built on top of it.
//!
//! The default set lives for the whole process. Every free function in this module is a thin
//! wrapper over the same method on [`default_set`], so code that needs isolation (tests, libraries
//! embedding their own metrics) can use an explicit [`Set`] instead.

use std::io;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use once_cell::sync::Lazy;
use parking_lot::RwLock;

use crate::counter::Counter;
use crate::fixed_histogram::FixedBucketHistogram;
use crate::float_counter::FloatCounter;
use crate::formatting::{split_metric_name, write_metadata, write_sample, Value};
use crate::gauge::Gauge;
use crate::histogram::Histogram;
use crate::set::Set;
use crate::summary::Summary;

static DEFAULT_SET: Lazy<Arc<Set>> = Lazy::new(|| Arc::new(Set::new()));
static REGISTERED_SETS: Lazy<RwLock<Vec<Arc<Set>>>> = Lazy::new(|| RwLock::new(Vec::new()));
static EXPOSE_METADATA: AtomicBool = AtomicBool::new(false);

/// Returns the process-wide default set.
pub fn default_set() -> Arc<Set> {
    Arc::clone(&DEFAULT_SET)
}

/// Enables or disables `# HELP` and `# TYPE` lines in [`write_prometheus`] and the `write_*`
/// sample helpers.
///
/// Disabled by default.
pub fn expose_metadata(enabled: bool) {
    EXPOSE_METADATA.store(enabled, Ordering::Relaxed);
}

/// Returns whether metadata lines are currently exposed.
pub fn is_metadata_exposed() -> bool {
    EXPOSE_METADATA.load(Ordering::Relaxed)
}

/// Includes `set` in the output of [`write_prometheus`], after the default set.
///
/// Registering the same set twice has no effect.
pub fn register_set(set: Arc<Set>) {
    let mut sets = REGISTERED_SETS.write();
    if !sets.iter().any(|s| Arc::ptr_eq(s, &set)) {
        sets.push(set);
    }
}

/// Stops including `set` in the output of [`write_prometheus`].
///
/// When `destroy` is set, every metric in `set` is unregistered as well.
pub fn unregister_set(set: &Arc<Set>, destroy: bool) {
    REGISTERED_SETS.write().retain(|s| !Arc::ptr_eq(s, set));
    if destroy {
        set.unregister_all_metrics();
    }
}

/// Renders the default set, every registered set and, optionally, process metrics into `buffer`.
pub fn write_prometheus_into(buffer: &mut String, expose_process_metrics: bool) {
    let expose = is_metadata_exposed();
    DEFAULT_SET.write_into(buffer, expose);

    let sets = REGISTERED_SETS.read().clone();
    for set in &sets {
        set.write_into(buffer, expose);
    }

    if expose_process_metrics {
        crate::process::write_process_metrics_into(buffer);
    }
}

/// Renders the default set, every registered set and, optionally, process metrics into `w`.
///
/// ## Errors
///
/// Returns any error produced by `w`.
pub fn write_prometheus<W: io::Write>(w: &mut W, expose_process_metrics: bool) -> io::Result<()> {
    let mut buffer = String::new();
    write_prometheus_into(&mut buffer, expose_process_metrics);
    w.write_all(buffer.as_bytes())
}

/// Writes a single gauge sample with an integer value, preceded by metadata when exposed.
pub fn write_gauge_u64(buffer: &mut String, name: &str, value: u64) {
    write_single(buffer, name, "gauge", Value::Unsigned(value));
}

/// Writes a single gauge sample, preceded by metadata when exposed.
pub fn write_gauge_f64(buffer: &mut String, name: &str, value: f64) {
    write_single(buffer, name, "gauge", Value::Float(value));
}

/// Writes a single counter sample with an integer value, preceded by metadata when exposed.
pub fn write_counter_u64(buffer: &mut String, name: &str, value: u64) {
    write_single(buffer, name, "counter", Value::Unsigned(value));
}

/// Writes a single counter sample, preceded by metadata when exposed.
pub fn write_counter_f64(buffer: &mut String, name: &str, value: f64) {
    write_single(buffer, name, "counter", Value::Float(value));
}

fn write_single(buffer: &mut String, name: &str, metric_type: &str, value: Value) {
    if is_metadata_exposed() {
        write_metadata(buffer, split_metric_name(name).0, metric_type);
    }
    write_sample(buffer, name, value);
}

/// Registers a new counter in the default set. See [`Set::new_counter`].
pub fn new_counter(name: &str) -> Arc<Counter> {
    DEFAULT_SET.new_counter(name)
}

/// See [`Set::get_or_create_counter`].
pub fn get_or_create_counter(name: &str) -> Arc<Counter> {
    DEFAULT_SET.get_or_create_counter(name)
}

/// See [`Set::new_float_counter`].
pub fn new_float_counter(name: &str) -> Arc<FloatCounter> {
    DEFAULT_SET.new_float_counter(name)
}

/// See [`Set::get_or_create_float_counter`].
pub fn get_or_create_float_counter(name: &str) -> Arc<FloatCounter> {
    DEFAULT_SET.get_or_create_float_counter(name)
}

/// See [`Set::new_gauge`].
pub fn new_gauge<F>(name: &str, f: F) -> Arc<Gauge>
where
    F: Fn() -> f64 + Send + Sync + 'static,
{
    DEFAULT_SET.new_gauge(name, f)
}

/// See [`Set::get_or_create_gauge`].
pub fn get_or_create_gauge<F>(name: &str, f: F) -> Arc<Gauge>
where
    F: Fn() -> f64 + Send + Sync + 'static,
{
    DEFAULT_SET.get_or_create_gauge(name, f)
}

/// See [`Set::new_settable_gauge`].
pub fn new_settable_gauge(name: &str) -> Arc<Gauge> {
    DEFAULT_SET.new_settable_gauge(name)
}

/// See [`Set::get_or_create_settable_gauge`].
pub fn get_or_create_settable_gauge(name: &str) -> Arc<Gauge> {
    DEFAULT_SET.get_or_create_settable_gauge(name)
}

/// See [`Set::new_histogram`].
pub fn new_histogram(name: &str) -> Arc<Histogram> {
    DEFAULT_SET.new_histogram(name)
}

/// See [`Set::get_or_create_histogram`].
pub fn get_or_create_histogram(name: &str) -> Arc<Histogram> {
    DEFAULT_SET.get_or_create_histogram(name)
}

/// See [`Set::new_fixed_bucket_histogram`].
pub fn new_fixed_bucket_histogram(name: &str, upper_bounds: &[f64]) -> Arc<FixedBucketHistogram> {
    DEFAULT_SET.new_fixed_bucket_histogram(name, upper_bounds)
}

/// See [`Set::get_or_create_fixed_bucket_histogram`].
pub fn get_or_create_fixed_bucket_histogram(
    name: &str,
    upper_bounds: &[f64],
) -> Arc<FixedBucketHistogram> {
    DEFAULT_SET.get_or_create_fixed_bucket_histogram(name, upper_bounds)
}

/// See [`Set::new_summary`].
pub fn new_summary(name: &str) -> Arc<Summary> {
    DEFAULT_SET.new_summary(name)
}

/// See [`Set::new_summary_ext`].
pub fn new_summary_ext(name: &str, window: Duration, quantiles: &[f64]) -> Arc<Summary> {
    DEFAULT_SET.new_summary_ext(name, window, quantiles)
}

/// See [`Set::get_or_create_summary`].
pub fn get_or_create_summary(name: &str) -> Arc<Summary> {
    DEFAULT_SET.get_or_create_summary(name)
}

/// See [`Set::get_or_create_summary_ext`].
pub fn get_or_create_summary_ext(name: &str, window: Duration, quantiles: &[f64]) -> Arc<Summary> {
    DEFAULT_SET.get_or_create_summary_ext(name, window, quantiles)
}

/// See [`Set::unregister_metric`].
pub fn unregister_metric(name: &str) -> bool {
    DEFAULT_SET.unregister_metric(name)
}

/// See [`Set::unregister_all_metrics`].
pub fn unregister_all_metrics() {
    DEFAULT_SET.unregister_all_metrics();
}

/// See [`Set::list_metric_names`].
pub fn list_metric_names() -> Vec<String> {
    DEFAULT_SET.list_metric_names()
}

/// See [`Set::register_metrics_writer`].
pub fn register_metrics_writer<F>(f: F)
where
    F: Fn(&mut String) + Send + Sync + 'static,
{
    DEFAULT_SET.register_metrics_writer(f);
}
