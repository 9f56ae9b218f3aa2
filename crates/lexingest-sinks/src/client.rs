//! Client for the destination platform's REST API.

use std::time::Duration;

use lexingest_net::{
    Backend, Clock, Credentials, HttpResponse, PacedTransport, Page, PageCursor, PageToken,
    Paginated, ReqwestBackend, SystemClock, TransportConfig, TransportError,
};
use serde_json::Value;
use tracing::debug;

use crate::SinkError;

/// Connection settings for the destination API.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ApiSettings {
    /// e.g. `https://de.openlegaldata.io`; a trailing slash is ignored.
    pub url: String,
    pub token: Option<String>,
    /// `user:password` for HTTP basic auth in front of the API.
    pub http_auth: Option<String>,
}

impl ApiSettings {
    fn credentials(&self) -> Credentials {
        let credentials = Credentials {
            token: self.token.clone().filter(|t| !t.is_empty()),
            basic: None,
        };
        match &self.http_auth {
            Some(pair) => credentials.with_basic_auth(pair),
            None => credentials,
        }
    }
}

/// Authenticated session with the destination, created once per run.
///
/// Requests go through the same retry contract as source traffic, but
/// without pacing.
pub struct DestinationClient<B = ReqwestBackend, C = SystemClock> {
    transport: PacedTransport<B, C>,
}

impl DestinationClient {
    pub fn connect(settings: &ApiSettings) -> Result<Self, SinkError> {
        if settings.url.trim().is_empty() {
            return Err(SinkError::Config(
                "destination API URL is not set (OLDP_API_URL)".into(),
            ));
        }
        let transport = PacedTransport::with_credentials(
            settings.url.trim_end_matches('/'),
            transport_config(),
            settings.credentials(),
        )?;
        debug!(url = %settings.url, "initialised destination client");
        Ok(Self { transport })
    }
}

fn transport_config() -> TransportConfig {
    TransportConfig::default().with_request_delay(Duration::ZERO)
}

impl<B: Backend, C: Clock> DestinationClient<B, C> {
    pub fn with_backend(url: &str, backend: B, clock: C) -> Self {
        Self {
            transport: PacedTransport::with_backend(
                url.trim_end_matches('/'),
                transport_config(),
                backend,
                clock,
            ),
        }
    }

    pub fn transport(&self) -> &PacedTransport<B, C> {
        &self.transport
    }

    pub fn get(&self, path: &str) -> Result<Value, TransportError> {
        self.transport.get_json(path)
    }

    pub fn post(&self, path: &str, body: &Value) -> Result<HttpResponse, TransportError> {
        debug!(path, "POST");
        self.transport.post_json(path, body)
    }

    /// API root document, used to verify connectivity and credentials.
    pub fn info(&self) -> Result<Value, TransportError> {
        self.get("/api/?format=json")
    }

    /// Every `results` entry of a paginated list endpoint, following the
    /// `next` links until the server stops sending one.
    pub fn list_all(&self, path: &str) -> Result<Vec<Value>, TransportError> {
        let pages = Paginated::new(
            PageCursor::link_driven(path),
            |token: &PageToken| -> Result<Page<Value>, TransportError> {
                let PageToken::Link(url) = token else {
                    return Ok(Page::new(Vec::new()));
                };
                let mut data = self.get(url)?;
                let items = match data.get_mut("results").map(Value::take) {
                    Some(Value::Array(items)) => items,
                    _ => Vec::new(),
                };
                let next = data
                    .get("next")
                    .and_then(Value::as_str)
                    .filter(|n| !n.is_empty())
                    .map(str::to_string);
                Ok(Page::new(items).with_next(next))
            },
        );
        pages.collect()
    }
}

#[cfg(test)]
mod tests {
    use lexingest_net::mock::{ManualClock, MockBackend};
    use serde_json::json;

    use super::*;

    #[test]
    fn info_fetches_api_root() {
        let backend = MockBackend::new().get_json("/api/?format=json", json!({"cases": "/api/cases/"}));
        let client = DestinationClient::with_backend("https://oldp.example/", backend, ManualClock::new());
        assert_eq!(client.info().unwrap()["cases"], "/api/cases/");
        assert_eq!(
            client.transport().backend().urls(),
            vec!["https://oldp.example/api/?format=json"]
        );
        // No pacing against the destination.
        assert!(client.transport().clock().sleeps().is_empty());
    }

    #[test]
    fn list_all_follows_next_links() {
        let backend = MockBackend::new()
            .get_json(
                "/api/courts/?format=json",
                json!({
                    "count": 3,
                    "next": "https://oldp.example/api/courts/?format=json&page=2",
                    "results": [{"id": 1}, {"id": 2}],
                }),
            )
            .get_json(
                "/api/courts/?format=json&page=2",
                json!({"count": 3, "next": null, "results": [{"id": 3}]}),
            );
        let client = DestinationClient::with_backend("https://oldp.example", backend, ManualClock::new());
        let ids: Vec<_> = client
            .list_all("/api/courts/?format=json")
            .unwrap()
            .iter()
            .map(|c| c["id"].as_i64().unwrap())
            .collect();
        assert_eq!(ids, vec![1, 2, 3]);
        assert_eq!(
            client.transport().backend().urls(),
            vec![
                "https://oldp.example/api/courts/?format=json",
                "https://oldp.example/api/courts/?format=json&page=2",
            ]
        );
    }

    #[test]
    fn list_all_stops_on_a_repeated_link() {
        let backend = MockBackend::new().get_json(
            "/api/states/",
            json!({"next": "https://oldp.example/api/states/", "results": [{"id": 1}]}),
        );
        let client = DestinationClient::with_backend("https://oldp.example", backend, ManualClock::new());
        let states = client.list_all("https://oldp.example/api/states/").unwrap();
        assert_eq!(states.len(), 1);
        assert_eq!(client.transport().backend().request_count(), 1);
    }

    #[test]
    fn list_all_surfaces_http_errors() {
        let client = DestinationClient::with_backend("https://oldp.example", MockBackend::new(), ManualClock::new());
        let err = client.list_all("/api/courts/?format=json").unwrap_err();
        assert_eq!(err.status(), Some(404));
    }

    #[test]
    fn credentials_from_settings() {
        let settings = ApiSettings {
            url: "https://oldp.example".into(),
            token: Some("secret".into()),
            http_auth: Some("staging:pw".into()),
        };
        let creds = settings.credentials();
        assert_eq!(creds.token.as_deref(), Some("secret"));
        assert_eq!(creds.basic, Some(("staging".into(), "pw".into())));

        let anonymous = ApiSettings {
            token: Some(String::new()),
            ..settings
        };
        assert_eq!(anonymous.credentials().token, None);
    }

    #[test]
    fn missing_url_is_a_config_error() {
        let Err(err) = DestinationClient::connect(&ApiSettings::default()) else {
            panic!("expected an error");
        };
        assert!(matches!(err, SinkError::Config(_)));
    }
}
