use std::fmt;
use std::sync::Arc;

use crate::counter::Counter;
use crate::fixed_histogram::FixedBucketHistogram;
use crate::float_counter::FloatCounter;
use crate::formatting::split_metric_name;
use crate::gauge::Gauge;
use crate::histogram::Histogram;
use crate::summary::{QuantileView, Summary};

/// Metric kind.
///
/// Used in registration panics and to pick the `# TYPE` of exported families.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum MetricKind {
    /// Counter.
    Counter,
    /// Floating-point counter.
    FloatCounter,
    /// Gauge, either computed or settable.
    Gauge,
    /// Log-bucket histogram.
    Histogram,
    /// Histogram with fixed upper bounds.
    FixedBucketHistogram,
    /// Sliding-window summary.
    Summary,
    /// One quantile of a summary.
    QuantileView,
}

impl MetricKind {
    /// The Prometheus metric type this kind is exported as.
    pub fn as_type_str(&self) -> &'static str {
        match self {
            Self::Counter | Self::FloatCounter => "counter",
            Self::Gauge => "gauge",
            Self::Histogram | Self::FixedBucketHistogram => "histogram",
            Self::Summary | Self::QuantileView => "summary",
        }
    }
}

impl fmt::Display for MetricKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Counter => "Counter",
            Self::FloatCounter => "FloatCounter",
            Self::Gauge => "Gauge",
            Self::Histogram => "Histogram",
            Self::FixedBucketHistogram => "FixedBucketHistogram",
            Self::Summary => "Summary",
            Self::QuantileView => "QuantileView",
        };
        f.write_str(s)
    }
}

#[derive(Clone, Debug)]
pub(crate) enum Metric {
    Counter(Arc<Counter>),
    FloatCounter(Arc<FloatCounter>),
    Gauge(Arc<Gauge>),
    Histogram(Arc<Histogram>),
    FixedBucketHistogram(Arc<FixedBucketHistogram>),
    Summary(Arc<Summary>),
    QuantileView(QuantileView),
}

impl Metric {
    pub(crate) fn kind(&self) -> MetricKind {
        match self {
            Self::Counter(_) => MetricKind::Counter,
            Self::FloatCounter(_) => MetricKind::FloatCounter,
            Self::Gauge(_) => MetricKind::Gauge,
            Self::Histogram(_) => MetricKind::Histogram,
            Self::FixedBucketHistogram(_) => MetricKind::FixedBucketHistogram,
            Self::Summary(_) => MetricKind::Summary,
            Self::QuantileView(_) => MetricKind::QuantileView,
        }
    }

    pub(crate) fn marshal_to(&self, prefix: &str, buffer: &mut String) {
        match self {
            Self::Counter(m) => m.marshal_to(prefix, buffer),
            Self::FloatCounter(m) => m.marshal_to(prefix, buffer),
            Self::Gauge(m) => m.marshal_to(prefix, buffer),
            Self::Histogram(m) => m.marshal_to(prefix, buffer),
            Self::FixedBucketHistogram(m) => m.marshal_to(prefix, buffer),
            Self::Summary(m) => m.marshal_to(prefix, buffer),
            Self::QuantileView(m) => m.marshal_to(prefix, buffer),
        }
    }
}

/// Output position of a registered metric.
///
/// Entries are grouped by family (base name) so that metadata is written once per family, then
/// ordered by full name. Quantile views sort under their parent summary, in configured order,
/// followed by the summary's own `_sum` and `_count`.
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord)]
pub(crate) struct SortKey {
    family: String,
    series: String,
    rank: usize,
}

#[derive(Debug)]
pub(crate) struct NamedMetric {
    pub(crate) metric: Metric,
    pub(crate) sort_key: SortKey,
}

impl NamedMetric {
    pub(crate) fn new(name: &str, metric: Metric) -> Self {
        // A summary's own lines come after all of its quantiles.
        let rank = if matches!(metric, Metric::Summary(_)) { usize::MAX } else { 0 };
        let sort_key = SortKey {
            family: split_metric_name(name).0.to_string(),
            series: name.to_string(),
            rank,
        };
        Self { metric, sort_key }
    }

    pub(crate) fn new_quantile(parent: &str, view: QuantileView) -> Self {
        let sort_key = SortKey {
            family: split_metric_name(parent).0.to_string(),
            series: parent.to_string(),
            rank: view.index(),
        };
        Self { metric: Metric::QuantileView(view), sort_key }
    }

    pub(crate) fn family(&self) -> &str {
        &self.sort_key.family
    }

    pub(crate) fn is_auxiliary(&self) -> bool {
        matches!(self.metric, Metric::QuantileView(_))
    }
}
