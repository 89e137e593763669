//! Lightweight, Prometheus-compatible application metrics.
//!
//! `vmetrics` provides a small set of metric types that are cheap to update from hot paths and a
//! registry, [`Set`], that renders them in the Prometheus text exposition format:
//!
//! - [`Counter`] and [`FloatCounter`] for totals,
//! - [`Gauge`], either computed by a callback at render time or set explicitly,
//! - [`Histogram`], which needs no bucket configuration: observations land in logarithmic buckets
//!   spanning `1e-9` to `1e18` and are exported as `vmrange` buckets,
//! - [`FixedBucketHistogram`], for classic cumulative `le` buckets,
//! - [`Summary`], which estimates quantiles over a sliding time window.
//!
//! # Names
//!
//! Metrics are identified by their full name, labels included, e.g.
//! `http_requests_total{path="/foo",code="200"}`. Names are validated on registration. Registering
//! an invalid name, or registering a name twice with [`Set::new_counter`] and friends, is a
//! programming error and panics. The `get_or_create_*` family returns the existing metric instead,
//! and only panics when the existing metric is of a different kind.
//!
//! Label order does not matter and an empty label list is the same as none: `foo{}` names the
//! same metric as `foo`, and `foo{b="2",a="1"}` the same as `foo{a="1",b="2"}`. Metrics are
//! rendered with their labels ordered by key.
//!
//! # Usage
//!
//! ```
//! use vmetrics::Set;
//!
//! let set = Set::new();
//! let requests = set.new_counter(r#"requests_total{path="/foo"}"#);
//! let latency = set.get_or_create_histogram(r#"request_duration_seconds{path="/foo"}"#);
//!
//! requests.inc();
//! latency.update(0.25);
//!
//! let output = set.render(false);
//! assert!(output.contains("requests_total{path=\"/foo\"} 1\n"));
//! assert!(output.contains("request_duration_seconds_count{path=\"/foo\"} 1\n"));
//! ```
//!
//! Most applications use the process-wide default set through the free functions in this crate,
//! such as [`get_or_create_counter`] and [`write_prometheus`].
#![deny(missing_docs)]
#![cfg_attr(docsrs, feature(doc_cfg), deny(rustdoc::broken_intra_doc_links))]

mod atomics;

mod counter;
pub use self::counter::Counter;

mod float_counter;
pub use self::float_counter::FloatCounter;

mod gauge;
pub use self::gauge::{Gauge, GaugeFn};

mod histogram;
pub use self::histogram::Histogram;

mod fixed_histogram;
pub use self::fixed_histogram::{
    exponential_buckets, linear_buckets, FixedBucketHistogram, DEFAULT_BUCKETS,
};

mod summary;
pub use self::summary::{Summary, DEFAULT_SUMMARY_QUANTILES, DEFAULT_SUMMARY_WINDOW};

mod metric;
pub use self::metric::MetricKind;

mod set;
pub use self::set::{Set, WriteMetricsFn};

mod formatting;
pub use self::formatting::{add_extra_labels, add_tag, split_metric_name};

mod validator;
pub use self::validator::{validate_labels, validate_metric_name, ValidationError};

mod labels;
pub use self::labels::{compose_name, labels, LabelComposer, LabelsBuilder};

mod global;
pub use self::global::*;

mod process;
pub use self::process::write_process_metrics_into;
