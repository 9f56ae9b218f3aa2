use lexingest_core::{CanonicalRecord, FetchOutcome, RecordKind};
use lexingest_net::{Backend, Clock, ReqwestBackend, SystemClock, TransportError};
use serde_json::Value;
use tracing::debug;

use crate::Sink;
use crate::client::DestinationClient;

/// Longest slice of a non-JSON error body kept in an outcome detail.
const ERROR_BODY_MAX: usize = 200;

/// Collection endpoint for each record kind.
pub fn endpoint(kind: RecordKind) -> &'static str {
    match kind {
        RecordKind::LawBook => "/api/law_books/",
        RecordKind::Law => "/api/laws/",
        RecordKind::Case => "/api/cases/",
    }
}

/// Human-readable failure detail: the status line plus the response body,
/// re-serialised when it is JSON, else truncated.
pub fn error_detail(err: &TransportError) -> String {
    match err {
        TransportError::Http { status, url, body } => {
            let body = match serde_json::from_str::<Value>(body) {
                Ok(json) => json.to_string(),
                Err(_) => body.chars().take(ERROR_BODY_MAX).collect(),
            };
            format!("HTTP {status} for {url} - {body}")
        }
        other => other.to_string(),
    }
}

/// Posts each record to the destination API, one request per record.
pub struct ApiSink<B = ReqwestBackend, C = SystemClock> {
    client: DestinationClient<B, C>,
}

impl<B: Backend, C: Clock> ApiSink<B, C> {
    pub fn new(client: DestinationClient<B, C>) -> Self {
        Self { client }
    }

    pub fn client(&self) -> &DestinationClient<B, C> {
        &self.client
    }
}

impl<B: Backend, C: Clock> Sink for ApiSink<B, C> {
    fn name(&self) -> &'static str {
        "api"
    }

    fn write(&mut self, record: &CanonicalRecord) -> FetchOutcome {
        let kind = record.kind();
        match self.client.post(endpoint(kind), &record.to_json()) {
            Ok(_) => {
                debug!(kind = kind.as_str(), record = %record.label(), "created");
                FetchOutcome::Created
            }
            Err(e) if e.status() == Some(409) => {
                debug!(kind = kind.as_str(), record = %record.label(), "already exists");
                FetchOutcome::SkippedDuplicate
            }
            Err(e) => {
                let detail = error_detail(&e);
                debug!(kind = kind.as_str(), record = %record.label(), %detail, "delivery failed");
                FetchOutcome::Error(detail)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use chrono::NaiveDate;
    use lexingest_core::{Case, Source};
    use lexingest_net::mock::{ManualClock, MockBackend};
    use lexingest_net::{HttpResponse, Method};

    use super::*;

    fn case() -> CanonicalRecord {
        CanonicalRecord::Case(Case {
            court_name: "Bundesgerichtshof".into(),
            file_number: "I ZR 1/21".into(),
            date: NaiveDate::from_ymd_opt(2021, 3, 4).unwrap(),
            content: "<p>Tenor und Gründe</p>".into(),
            case_type: Some("Urteil".into()),
            ecli: None,
            title: None,
            summary: None,
            source: Some(Source::new("Dummy", "")),
        })
    }

    fn sink(backend: MockBackend) -> ApiSink<MockBackend, ManualClock> {
        ApiSink::new(DestinationClient::with_backend(
            "https://oldp.example",
            backend,
            ManualClock::new(),
        ))
    }

    fn post(status: u16, body: &str) -> Result<HttpResponse, lexingest_net::ConnectionError> {
        Ok(HttpResponse::new(status, body))
    }

    #[test]
    fn created_posts_canonical_json() {
        let mut sink = sink(MockBackend::new().reply(Method::Post, "/api/cases/", post(201, "{}")));
        assert_eq!(sink.write(&case()), FetchOutcome::Created);

        let requests = sink.client().transport().backend().requests();
        assert_eq!(requests.len(), 1);
        assert_eq!(requests[0].url, "https://oldp.example/api/cases/");
        let body = requests[0].json.as_ref().unwrap();
        assert_eq!(body["file_number"], "I ZR 1/21");
        assert_eq!(body["type"], "Urteil");
        assert!(body.get("ecli").is_none());
    }

    #[test]
    fn conflict_is_a_duplicate_and_not_retried() {
        let mut sink = sink(MockBackend::new().reply(
            Method::Post,
            "/api/cases/",
            post(409, r#"{"detail": "exists"}"#),
        ));
        assert_eq!(sink.write(&case()), FetchOutcome::SkippedDuplicate);
        assert_eq!(sink.client().transport().backend().request_count(), 1);
    }

    #[test]
    fn rejection_carries_detail() {
        let mut sink = sink(MockBackend::new().reply(
            Method::Post,
            "/api/cases/",
            post(400, r#"{"court_name": ["Court not found"]}"#),
        ));
        let FetchOutcome::Error(detail) = sink.write(&case()) else {
            panic!("expected an error outcome");
        };
        assert!(detail.starts_with("HTTP 400 for https://oldp.example/api/cases/"));
        assert!(detail.contains("Court not found"));
    }

    #[test]
    fn plain_text_detail_is_truncated() {
        let err = TransportError::Http {
            status: 500,
            url: "https://oldp.example/api/laws/".into(),
            body: "x".repeat(1000),
        };
        let detail = error_detail(&err);
        assert!(detail.ends_with(&"x".repeat(200)));
        assert!(!detail.contains(&"x".repeat(201)));
    }

    #[test]
    fn endpoints_by_kind() {
        assert_eq!(endpoint(RecordKind::LawBook), "/api/law_books/");
        assert_eq!(endpoint(RecordKind::Law), "/api/laws/");
        assert_eq!(endpoint(RecordKind::Case), "/api/cases/");
    }
}
