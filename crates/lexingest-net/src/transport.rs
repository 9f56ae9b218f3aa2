//! Paced, retrying transport shared by source adapters and the destination API.
//!
//! Every request is preceded by a pacing sleep measured from the *start* of
//! the previous request, so time spent processing a response counts toward
//! the next window. `429` and `503` responses and connection failures are
//! retried with exponential backoff (1s, 2s, 4s, ...) or the server's
//! `Retry-After` hint (never below one second). Any other non-success status
//! is returned immediately for the caller to classify.

use std::cell::Cell;
use std::time::{Duration, Instant};

use serde::Serialize;
use serde::de::DeserializeOwned;
use thiserror::Error;
use tracing::{debug, warn};

use crate::clock::{Clock, SystemClock};
use crate::http::{Backend, ConnectionError, Credentials, HttpRequest, HttpResponse, ReqwestBackend};

/// Identifying `User-Agent` attached to every outbound request.
pub const USER_AGENT: &str = concat!(
    "lexingest/",
    env!("CARGO_PKG_VERSION"),
    " (+https://github.com/fractalaw/lexingest)"
);

const RETRYABLE_STATUS: [u16; 2] = [429, 503];

/// Pacing and retry settings, fixed for the lifetime of a transport.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransportConfig {
    /// Minimum spacing between the starts of consecutive requests.
    pub request_delay: Duration,
    /// Retries after the first attempt.
    pub max_retries: u32,
    /// Backoff before the first retry; doubles on each further retry.
    pub initial_backoff: Duration,
    /// Per-request timeout.
    pub timeout: Duration,
    pub user_agent: String,
}

impl Default for TransportConfig {
    fn default() -> Self {
        Self {
            request_delay: Duration::from_millis(200),
            max_retries: 5,
            initial_backoff: Duration::from_secs(1),
            timeout: Duration::from_secs(30),
            user_agent: USER_AGENT.to_string(),
        }
    }
}

impl TransportConfig {
    pub fn with_request_delay(mut self, delay: Duration) -> Self {
        self.request_delay = delay;
        self
    }

    /// Backoff before retry number `attempt + 1`.
    pub fn backoff(&self, attempt: u32) -> Duration {
        self.initial_backoff
            .saturating_mul(2u32.saturating_pow(attempt))
    }
}

#[derive(Error, Debug)]
pub enum TransportError {
    #[error("connection to {url} failed: {message}")]
    Connection { url: String, message: String },

    #[error("server returned {status} for {url}: {body}")]
    Http {
        status: u16,
        url: String,
        body: String,
    },

    #[error("JSON parse error: {0}")]
    Json(#[from] serde_json::Error),
}

impl TransportError {
    /// HTTP status of the failed response, if there was one.
    pub fn status(&self) -> Option<u16> {
        match self {
            Self::Http { status, .. } => Some(*status),
            _ => None,
        }
    }
}

/// Longest wait a server hint can impose on a single retry.
pub const MAX_RETRY_AFTER: Duration = Duration::from_secs(600);

/// Server-provided retry hint, clamped to `1s..=MAX_RETRY_AFTER`.
///
/// Only the delay-seconds form is understood; anything else is ignored.
pub fn retry_after(resp: &HttpResponse) -> Option<Duration> {
    let secs: f64 = resp.header("Retry-After")?.trim().parse().ok()?;
    if !secs.is_finite() || secs < 0.0 {
        return None;
    }
    let hint = Duration::try_from_secs_f64(secs).unwrap_or(MAX_RETRY_AFTER);
    Some(hint.clamp(Duration::from_secs(1), MAX_RETRY_AFTER))
}

/// HTTP transport applying fixed pacing and bounded retries to every request.
///
/// Single-threaded by construction: the pacing state lives in a [`Cell`].
pub struct PacedTransport<B = ReqwestBackend, C = SystemClock> {
    backend: B,
    clock: C,
    config: TransportConfig,
    base_url: String,
    last_started: Cell<Option<Instant>>,
}

impl PacedTransport {
    /// Transport over a fresh reqwest client.
    ///
    /// `base_url` should be like `https://example.org` (no trailing slash).
    pub fn new(base_url: &str, config: TransportConfig) -> Result<Self, TransportError> {
        Self::with_credentials(base_url, config, Credentials::default())
    }

    pub fn with_credentials(
        base_url: &str,
        config: TransportConfig,
        credentials: Credentials,
    ) -> Result<Self, TransportError> {
        let backend = ReqwestBackend::new(config.timeout, credentials).map_err(
            |ConnectionError(message)| TransportError::Connection {
                url: base_url.to_string(),
                message,
            },
        )?;
        Ok(Self::with_backend(base_url, config, backend, SystemClock))
    }
}

impl<B: Backend, C: Clock> PacedTransport<B, C> {
    pub fn with_backend(base_url: &str, config: TransportConfig, backend: B, clock: C) -> Self {
        Self {
            backend,
            clock,
            config,
            base_url: base_url.trim_end_matches('/').to_string(),
            last_started: Cell::new(None),
        }
    }

    pub fn config(&self) -> &TransportConfig {
        &self.config
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    pub fn backend(&self) -> &B {
        &self.backend
    }

    pub fn clock(&self) -> &C {
        &self.clock
    }

    /// Absolute URL for a path, or the input unchanged if already absolute.
    pub fn url(&self, path_or_url: &str) -> String {
        if path_or_url.starts_with("http://") || path_or_url.starts_with("https://") {
            path_or_url.to_string()
        } else {
            format!("{}{}", self.base_url, path_or_url)
        }
    }

    /// Send `request`, pacing first and retrying transient failures.
    ///
    /// Returns the first success response. A non-retryable error status is
    /// returned as [`TransportError::Http`] without retrying; exhausted
    /// retries surface the last failure.
    pub fn send(&self, mut request: HttpRequest) -> Result<HttpResponse, TransportError> {
        request.set_header("User-Agent", &self.config.user_agent);
        let max = self.config.max_retries;
        let mut attempt = 0;

        loop {
            self.pace();
            debug!(method = request.method.as_str(), url = %request.url, attempt, "sending request");

            let delay = match self.backend.execute(&request) {
                Ok(resp) if resp.is_success() => return Ok(resp),
                Ok(resp) if RETRYABLE_STATUS.contains(&resp.status) && attempt < max => {
                    let delay = retry_after(&resp).unwrap_or_else(|| self.config.backoff(attempt));
                    warn!(
                        status = resp.status,
                        url = %request.url,
                        delay_secs = delay.as_secs_f64(),
                        attempt = attempt + 1,
                        max,
                        "retryable status, backing off"
                    );
                    delay
                }
                Ok(resp) => {
                    return Err(TransportError::Http {
                        status: resp.status,
                        url: request.url,
                        body: resp.text(),
                    });
                }
                Err(ConnectionError(message)) if attempt < max => {
                    let delay = self.config.backoff(attempt);
                    warn!(
                        url = %request.url,
                        error = %message,
                        delay_secs = delay.as_secs_f64(),
                        attempt = attempt + 1,
                        max,
                        "connection failed, backing off"
                    );
                    delay
                }
                Err(ConnectionError(message)) => {
                    return Err(TransportError::Connection {
                        url: request.url,
                        message,
                    });
                }
            };

            self.clock.sleep(delay);
            attempt += 1;
        }
    }

    fn pace(&self) {
        let delay = self.config.request_delay;
        if let Some(prev) = self.last_started.get() {
            let elapsed = self.clock.now().saturating_duration_since(prev);
            if elapsed < delay {
                self.clock.sleep(delay - elapsed);
            }
        }
        self.last_started.set(Some(self.clock.now()));
    }

    pub fn get(&self, path_or_url: &str) -> Result<HttpResponse, TransportError> {
        self.send(HttpRequest::get(self.url(path_or_url)))
    }

    pub fn get_json<T: DeserializeOwned>(&self, path_or_url: &str) -> Result<T, TransportError> {
        Ok(self.get(path_or_url)?.json()?)
    }

    pub fn get_text(&self, path_or_url: &str) -> Result<String, TransportError> {
        Ok(self.get(path_or_url)?.text())
    }

    pub fn get_bytes(&self, path_or_url: &str) -> Result<Vec<u8>, TransportError> {
        Ok(self.get(path_or_url)?.body)
    }

    pub fn post_json<T: Serialize + ?Sized>(
        &self,
        path_or_url: &str,
        body: &T,
    ) -> Result<HttpResponse, TransportError> {
        let body = serde_json::to_value(body)?;
        self.send(HttpRequest::post_json(self.url(path_or_url), body))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::http::Method;
    use crate::mock::{ManualClock, MockBackend};

    fn transport(backend: MockBackend) -> PacedTransport<MockBackend, ManualClock> {
        PacedTransport::with_backend(
            "https://api.example.org/",
            TransportConfig::default(),
            backend,
            ManualClock::new(),
        )
    }

    fn secs(s: u64) -> Duration {
        Duration::from_secs(s)
    }

    #[test]
    fn retries_429_with_backoff_schedule() {
        let backend = MockBackend::new()
            .reply(Method::Get, "/v1/x", Ok(HttpResponse::new(429, "slow down")))
            .reply(Method::Get, "/v1/x", Ok(HttpResponse::new(429, "slow down")))
            .reply(Method::Get, "/v1/x", Ok(HttpResponse::new(200, "done")));
        let t = transport(backend);

        let resp = t.get("/v1/x").unwrap();
        assert_eq!(resp.text(), "done");
        assert_eq!(t.backend().request_count(), 3);
        assert_eq!(t.clock().sleeps(), vec![secs(1), secs(2)]);
    }

    #[test]
    fn retry_after_hint_overrides_backoff() {
        let backend = MockBackend::new()
            .reply(
                Method::Get,
                "/v1/x",
                Ok(HttpResponse::new(503, "").with_header("Retry-After", "7")),
            )
            .reply(
                Method::Get,
                "/v1/x",
                Ok(HttpResponse::new(429, "").with_header("Retry-After", "0")),
            )
            .reply(Method::Get, "/v1/x", Ok(HttpResponse::new(200, "ok")));
        let t = transport(backend);

        t.get("/v1/x").unwrap();
        assert_eq!(t.clock().sleeps(), vec![secs(7), secs(1)]);
    }

    #[test]
    fn unparsable_retry_after_falls_back_to_backoff() {
        let resp = HttpResponse::new(503, "").with_header("Retry-After", "Wed, 21 Oct 2015");
        assert_eq!(retry_after(&resp), None);
        let resp = HttpResponse::new(503, "").with_header("Retry-After", "2.5");
        assert_eq!(retry_after(&resp), Some(Duration::from_millis(2500)));
    }

    #[test]
    fn oversized_retry_after_is_capped() {
        let backend = MockBackend::new()
            .reply(
                Method::Get,
                "/v1/x",
                Ok(HttpResponse::new(503, "").with_header("Retry-After", "1e30")),
            )
            .reply(
                Method::Get,
                "/v1/x",
                Ok(HttpResponse::new(429, "").with_header("Retry-After", "86400")),
            )
            .reply(Method::Get, "/v1/x", Ok(HttpResponse::new(200, "ok")));
        let t = transport(backend);

        assert_eq!(t.get("/v1/x").unwrap().text(), "ok");
        assert_eq!(t.clock().sleeps(), vec![MAX_RETRY_AFTER, MAX_RETRY_AFTER]);
    }

    #[test]
    fn exhausted_retries_surface_last_failure() {
        let backend =
            MockBackend::new().reply(Method::Get, "/v1/x", Ok(HttpResponse::new(503, "down")));
        let t = transport(backend);

        let err = t.get("/v1/x").unwrap_err();
        assert_eq!(err.status(), Some(503));
        assert_eq!(t.backend().request_count(), 6);
        assert_eq!(
            t.clock().sleeps(),
            vec![secs(1), secs(2), secs(4), secs(8), secs(16)]
        );
    }

    #[test]
    fn connection_failures_are_retried() {
        let backend = MockBackend::new()
            .reply(Method::Get, "/v1/x", Err(ConnectionError("reset".into())))
            .reply(Method::Get, "/v1/x", Ok(HttpResponse::new(200, "ok")));
        let t = transport(backend);

        assert_eq!(t.get_text("/v1/x").unwrap(), "ok");
        assert_eq!(t.clock().sleeps(), vec![secs(1)]);
    }

    #[test]
    fn connection_failure_after_retries() {
        let backend =
            MockBackend::new().reply(Method::Get, "/v1/x", Err(ConnectionError("refused".into())));
        let t = transport(backend);

        let err = t.get("/v1/x").unwrap_err();
        assert!(matches!(err, TransportError::Connection { .. }));
        assert_eq!(t.backend().request_count(), 6);
    }

    #[test]
    fn other_statuses_are_not_retried() {
        let backend = MockBackend::new()
            .reply(Method::Post, "/api/cases/", Ok(HttpResponse::new(409, "exists")));
        let t = transport(backend);

        let err = t.post_json("/api/cases/", &serde_json::json!({"a": 1})).unwrap_err();
        assert_eq!(err.status(), Some(409));
        assert_eq!(t.backend().request_count(), 1);
        assert!(t.clock().sleeps().is_empty());
    }

    #[test]
    fn pacing_is_measured_from_request_start() {
        let backend = MockBackend::new().reply(Method::Get, "/", Ok(HttpResponse::new(200, "")));
        let t = transport(backend);

        t.get("/a").unwrap();
        assert!(t.clock().sleeps().is_empty());

        t.clock().advance(Duration::from_millis(50));
        t.get("/b").unwrap();
        assert_eq!(t.clock().sleeps(), vec![Duration::from_millis(150)]);

        t.clock().advance(Duration::from_millis(500));
        t.get("/c").unwrap();
        assert_eq!(t.clock().sleeps().len(), 1);
    }

    #[test]
    fn attaches_user_agent_and_resolves_urls() {
        let backend = MockBackend::new().reply(Method::Get, "", Ok(HttpResponse::new(200, "")));
        let t = transport(backend);

        t.get("/v1/case-law?pageIndex=1").unwrap();
        t.get("https://other.example.org/doc.html").unwrap();

        let requests = t.backend().requests();
        assert_eq!(requests[0].url, "https://api.example.org/v1/case-law?pageIndex=1");
        assert_eq!(requests[1].url, "https://other.example.org/doc.html");
        assert!(requests.iter().all(|r| r.header("user-agent") == Some(USER_AGENT)));
    }

    #[test]
    fn get_json_reports_decode_errors() {
        let backend =
            MockBackend::new().reply(Method::Get, "/x", Ok(HttpResponse::new(200, "<html>")));
        let t = transport(backend);
        let err = t.get_json::<serde_json::Value>("/x").unwrap_err();
        assert!(matches!(err, TransportError::Json(_)));
    }

    #[test]
    fn backoff_doubles() {
        let config = TransportConfig::default();
        let schedule: Vec<_> = (0..5).map(|a| config.backoff(a)).collect();
        assert_eq!(schedule, vec![secs(1), secs(2), secs(4), secs(8), secs(16)]);
    }
}
