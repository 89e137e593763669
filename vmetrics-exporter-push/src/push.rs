use std::future::Future;
use std::io::Write as _;
use std::time::{Duration, Instant};

use flate2::write::GzEncoder;
use flate2::Compression;
use http_body_util::{BodyExt, Collected, Full};
use hyper::body::Bytes;
use hyper::header::{HeaderMap, HeaderValue, AUTHORIZATION, CONTENT_ENCODING, CONTENT_TYPE};
use hyper::{Method, Request, StatusCode, Uri};
use hyper_rustls::HttpsConnector;
use hyper_util::client::legacy::{connect::HttpConnector, Client};
use hyper_util::rt::TokioExecutor;
use tracing::{debug, error};
use vmetrics::{add_extra_labels, WriteMetricsFn};

use crate::builder::BuildError;
use crate::telemetry::PushTelemetry;

/// Errors that can occur while pushing metrics.
#[derive(Debug, thiserror::Error)]
pub enum PushError {
    /// The exporter could not be set up.
    #[error(transparent)]
    Build(#[from] BuildError),

    /// The request could not be constructed.
    #[error("cannot initialize request for metrics push to {url}: {reason}")]
    Request {
        /// Redacted endpoint.
        url: String,
        /// Details about the failure.
        reason: String,
    },

    /// Compressing the payload failed.
    #[error("cannot compress metrics: {0}")]
    Compress(#[source] std::io::Error),

    /// The request could not be sent, or no response was received.
    #[error("cannot push metrics to {url}: {reason}")]
    Transport {
        /// Redacted endpoint.
        url: String,
        /// Details about the failure.
        reason: String,
    },

    /// No response was received within the push interval.
    #[error("timed out after {timeout:?} pushing metrics to {url}")]
    Timeout {
        /// Redacted endpoint.
        url: String,
        /// The request timeout.
        timeout: Duration,
    },

    /// The endpoint answered with a non-2xx status.
    #[error(
        "unexpected status code in response from {url}: {status}; expecting 2xx; \
         response body: {body:?}"
    )]
    Status {
        /// Redacted endpoint.
        url: String,
        /// Response status.
        status: StatusCode,
        /// Response body, or a placeholder if it couldn't be read.
        body: String,
    },
}

/// A parsed push endpoint.
#[derive(Clone, Debug)]
pub(crate) struct Target {
    /// Endpoint with any userinfo removed.
    pub(crate) endpoint: Uri,
    /// Endpoint as it may appear in logs and labels, with the password replaced.
    pub(crate) redacted: String,
    pub(crate) auth: Option<HeaderValue>,
}

impl Target {
    pub(crate) fn parse(endpoint: &str) -> Result<Self, BuildError> {
        let invalid = |reason: &str| BuildError::InvalidEndpoint {
            endpoint: endpoint.to_string(),
            reason: reason.to_string(),
        };

        let uri = endpoint.parse::<Uri>().map_err(|e| invalid(&e.to_string()))?;
        match uri.scheme_str() {
            Some("http" | "https") => {}
            Some(_) => return Err(invalid("unsupported scheme; expecting 'http' or 'https'")),
            None => return Err(invalid("missing scheme; expecting 'http' or 'https'")),
        }
        if uri.host().map_or(true, str::is_empty) {
            return Err(invalid("missing host"));
        }

        let authority = uri.authority().map(|a| a.as_str()).unwrap_or_default();
        let Some((userinfo, _)) = authority.rsplit_once('@') else {
            return Ok(Self { endpoint: uri, redacted: endpoint.to_string(), auth: None });
        };

        let (username, password) = match userinfo.split_once(':') {
            Some((username, password)) => (username, Some(password)),
            None => (userinfo, None),
        };
        let redacted_userinfo = match password {
            Some(_) => format!("{username}:xxxxx"),
            None => username.to_string(),
        };

        let stripped = endpoint.replacen(&format!("{userinfo}@"), "", 1);
        let endpoint_uri = stripped.parse::<Uri>().map_err(|e| invalid(&e.to_string()))?;

        Ok(Self {
            endpoint: endpoint_uri,
            redacted: endpoint.replacen(userinfo, &redacted_userinfo, 1),
            auth: Some(basic_auth(username, password).map_err(|e| invalid(&e))?),
        })
    }
}

/// Settings shared by every push to one endpoint.
pub(crate) struct PushConfig {
    pub(crate) target: Target,
    pub(crate) interval: Duration,
    pub(crate) method: Method,
    pub(crate) headers: HeaderMap,
    pub(crate) extra_labels: Option<String>,
    pub(crate) compress: bool,
}

pub(crate) struct Pusher {
    client: Client<HttpsConnector<HttpConnector>, Full<Bytes>>,
    config: PushConfig,
    telemetry: PushTelemetry,
}

impl Pusher {
    pub(crate) fn new(config: PushConfig) -> Result<Self, BuildError> {
        let https = hyper_rustls::HttpsConnectorBuilder::new()
            .with_native_roots()
            .map_err(|e| BuildError::NativeRoots(e.to_string()))?
            .https_or_http()
            .enable_http1()
            .build();
        let client = Client::builder(TokioExecutor::new())
            .pool_idle_timeout(Duration::from_secs(30))
            .build(https);
        let telemetry = PushTelemetry::new(&config.target.redacted, config.interval);

        Ok(Self { client, config, telemetry })
    }

    /// Pushes every `interval` until `shutdown` resolves, then pushes one last time.
    pub(crate) async fn run<S>(self, write_metrics: WriteMetricsFn, shutdown: S)
    where
        S: Future<Output = ()> + Send,
    {
        let url = &self.config.target.redacted;
        let interval = self.config.interval;
        debug!(%url, ?interval, "starting metrics push");

        let mut ticker = tokio::time::interval_at(tokio::time::Instant::now() + interval, interval);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        tokio::pin!(shutdown);

        loop {
            tokio::select! {
                _ = ticker.tick() => self.push_and_log(&write_metrics).await,
                () = &mut shutdown => break,
            }
        }

        // Flush whatever was recorded since the last tick.
        self.push_and_log(&write_metrics).await;
        debug!(%url, "stopped metrics push");
    }

    async fn push_and_log(&self, write_metrics: &WriteMetricsFn) {
        if let Err(e) = self.push(write_metrics).await {
            error!(error = %e, "failed to push metrics");
        }
    }

    pub(crate) async fn push(&self, write_metrics: &WriteMetricsFn) -> Result<(), PushError> {
        let result = self.try_push(write_metrics).await;
        if result.is_err() {
            self.telemetry.errors.inc();
        }
        result
    }

    async fn try_push(&self, write_metrics: &WriteMetricsFn) -> Result<(), PushError> {
        let config = &self.config;
        let url = &config.target.redacted;

        let mut text = String::new();
        write_metrics(&mut text);
        if let Some(extra_labels) = &config.extra_labels {
            text = add_extra_labels(&text, extra_labels);
        }

        let body = if config.compress { gzip(text.as_bytes())? } else { text.into_bytes() };
        self.telemetry.record_block(body.len());

        let mut req = Request::builder()
            .method(config.method.clone())
            .uri(config.target.endpoint.clone())
            .body(Full::new(Bytes::from(body)))
            .map_err(|e| PushError::Request { url: url.clone(), reason: e.to_string() })?;
        let headers = req.headers_mut();
        headers.extend(config.headers.clone());
        if let Some(auth) = &config.target.auth {
            headers.insert(AUTHORIZATION, auth.clone());
        }
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("text/plain"));
        if config.compress {
            headers.insert(CONTENT_ENCODING, HeaderValue::from_static("gzip"));
        }

        let start = Instant::now();
        let result = tokio::time::timeout(config.interval, self.client.request(req)).await;
        self.telemetry.duration.update_duration(start);

        let response = match result {
            Err(_) => return Err(PushError::Timeout { url: url.clone(), timeout: config.interval }),
            Ok(Err(e)) => {
                return Err(PushError::Transport { url: url.clone(), reason: e.to_string() });
            }
            Ok(Ok(response)) => response,
        };

        let status = response.status();
        if !status.is_success() {
            let body = response
                .into_body()
                .collect()
                .await
                .map(Collected::to_bytes)
                .map_err(|_| ())
                .and_then(|b| String::from_utf8(b[..].to_vec()).map_err(|_| ()))
                .unwrap_or_else(|()| String::from("<failed to read response body>"));
            return Err(PushError::Status { url: url.clone(), status, body });
        }

        Ok(())
    }
}

fn gzip(data: &[u8]) -> Result<Vec<u8>, PushError> {
    let mut encoder = GzEncoder::new(Vec::with_capacity(data.len() / 4), Compression::default());
    encoder.write_all(data).map_err(PushError::Compress)?;
    encoder.finish().map_err(PushError::Compress)
}

fn basic_auth(username: &str, password: Option<&str>) -> Result<HeaderValue, String> {
    use base64::prelude::BASE64_STANDARD;
    use base64::write::EncoderWriter;

    let mut buf = b"Basic ".to_vec();
    {
        let mut encoder = EncoderWriter::new(&mut buf, &BASE64_STANDARD);
        write!(encoder, "{username}:").map_err(|e| e.to_string())?;
        if let Some(password) = password {
            write!(encoder, "{password}").map_err(|e| e.to_string())?;
        }
        encoder.finish().map_err(|e| e.to_string())?;
    }
    let mut header = HeaderValue::from_bytes(&buf).map_err(|e| e.to_string())?;
    header.set_sensitive(true);
    Ok(header)
}
