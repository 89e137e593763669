//! Pushes [`vmetrics`] to a remote endpoint in the Prometheus text exposition format.
//!
//! The exporter renders metrics every interval, optionally adds extra labels to every sample,
//! gzips the payload and sends it over HTTP(S). It is meant for endpoints that accept the text
//! format directly, such as VictoriaMetrics' `/api/v1/import/prometheus`.
//!
//! ```no_run
//! use std::time::Duration;
//! use vmetrics_exporter_push::PushBuilder;
//!
//! vmetrics::get_or_create_counter("jobs_processed_total").inc();
//!
//! let endpoint = "http://localhost:8428/api/v1/import/prometheus";
//! let handle = PushBuilder::new(endpoint, Duration::from_secs(10))
//!     .expect("valid endpoint")
//!     .with_extra_labels(r#"instance="worker-1""#)
//!     .expect("valid labels")
//!     .install_default(true)
//!     .expect("failed to install push exporter");
//!
//! // ... run the application ...
//!
//! // Push once more and stop.
//! handle.shutdown();
//! ```
//!
//! The exporter reports on itself through `metrics_push_*` metrics, labelled with the redacted
//! endpoint, in a set that is exported together with the default registry.
#![deny(missing_docs)]
#![cfg_attr(docsrs, feature(doc_cfg), deny(rustdoc::broken_intra_doc_links))]

mod builder;
pub use self::builder::{BuildError, ExporterFuture, PushBuilder, PushHandle};

mod push;
pub use self::push::PushError;

mod telemetry;

pub use hyper::Method;
