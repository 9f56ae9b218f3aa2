//! Single-attempt HTTP exchange: request/response values and the backend seam.

use std::time::Duration;

use serde::de::DeserializeOwned;
use serde_json::Value;
use thiserror::Error;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Method {
    Get,
    Post,
}

impl Method {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Get => "GET",
            Self::Post => "POST",
        }
    }
}

/// One outbound request. URLs are absolute by the time a backend sees them.
#[derive(Debug, Clone, PartialEq)]
pub struct HttpRequest {
    pub method: Method,
    pub url: String,
    pub headers: Vec<(String, String)>,
    pub json: Option<Value>,
}

impl HttpRequest {
    pub fn get(url: impl Into<String>) -> Self {
        Self {
            method: Method::Get,
            url: url.into(),
            headers: Vec::new(),
            json: None,
        }
    }

    pub fn post_json(url: impl Into<String>, body: Value) -> Self {
        Self {
            method: Method::Post,
            url: url.into(),
            headers: Vec::new(),
            json: Some(body),
        }
    }

    /// Case-insensitive header lookup.
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }

    /// Set `name`, replacing any existing value.
    pub fn set_header(&mut self, name: &str, value: &str) {
        self.headers.retain(|(k, _)| !k.eq_ignore_ascii_case(name));
        self.headers.push((name.to_string(), value.to_string()));
    }
}

/// A received response, whatever its status.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HttpResponse {
    pub status: u16,
    pub headers: Vec<(String, String)>,
    pub body: Vec<u8>,
}

impl HttpResponse {
    pub fn new(status: u16, body: impl Into<Vec<u8>>) -> Self {
        Self {
            status,
            headers: Vec::new(),
            body: body.into(),
        }
    }

    pub fn with_header(mut self, name: &str, value: &str) -> Self {
        self.headers.push((name.to_string(), value.to_string()));
        self
    }

    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }

    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }

    pub fn text(&self) -> String {
        String::from_utf8_lossy(&self.body).into_owned()
    }

    pub fn json<T: DeserializeOwned>(&self) -> Result<T, serde_json::Error> {
        serde_json::from_slice(&self.body)
    }
}

/// The request never produced a response (DNS, connect, timeout, reset).
#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error("{0}")]
pub struct ConnectionError(pub String);

/// Performs exactly one HTTP exchange. Retrying and pacing live above this seam.
pub trait Backend {
    fn execute(&self, request: &HttpRequest) -> Result<HttpResponse, ConnectionError>;
}

/// Credentials presented to every request (used for the destination API).
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Credentials {
    /// Sent as `Authorization: Token <token>`.
    pub token: Option<String>,
    /// HTTP basic auth; takes precedence over the token header.
    pub basic: Option<(String, String)>,
}

impl Credentials {
    /// Parse `user:password`; input without a colon is ignored.
    pub fn with_basic_auth(mut self, pair: &str) -> Self {
        if let Some((user, password)) = pair.split_once(':') {
            self.basic = Some((user.to_string(), password.to_string()));
        }
        self
    }
}

/// Blocking reqwest client.
pub struct ReqwestBackend {
    client: reqwest::blocking::Client,
    credentials: Credentials,
}

impl ReqwestBackend {
    /// Build a client with a per-request `timeout`.
    pub fn new(timeout: Duration, credentials: Credentials) -> Result<Self, ConnectionError> {
        let client = reqwest::blocking::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| ConnectionError(e.to_string()))?;
        Ok(Self {
            client,
            credentials,
        })
    }
}

impl Backend for ReqwestBackend {
    fn execute(&self, request: &HttpRequest) -> Result<HttpResponse, ConnectionError> {
        let mut builder = match request.method {
            Method::Get => self.client.get(&request.url),
            Method::Post => self.client.post(&request.url),
        };
        for (name, value) in &request.headers {
            builder = builder.header(name.as_str(), value.as_str());
        }
        if let Some((user, password)) = &self.credentials.basic {
            builder = builder.basic_auth(user, Some(password));
        } else if let Some(token) = &self.credentials.token {
            builder = builder.header("Authorization", format!("Token {token}"));
        }
        if let Some(body) = &request.json {
            builder = builder.json(body);
        }

        let resp = builder
            .send()
            .map_err(|e| ConnectionError(e.to_string()))?;
        let status = resp.status().as_u16();
        let headers = resp
            .headers()
            .iter()
            .filter_map(|(k, v)| Some((k.as_str().to_string(), v.to_str().ok()?.to_string())))
            .collect();
        let body = resp
            .bytes()
            .map_err(|e| ConnectionError(e.to_string()))?
            .to_vec();
        Ok(HttpResponse {
            status,
            headers,
            body,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn header_lookup_is_case_insensitive() {
        let resp = HttpResponse::new(503, "busy").with_header("Retry-After", "3");
        assert_eq!(resp.header("retry-after"), Some("3"));
        assert!(!resp.is_success());
        assert_eq!(resp.text(), "busy");
    }

    #[test]
    fn set_header_replaces() {
        let mut req = HttpRequest::get("http://localhost/");
        req.set_header("User-Agent", "a");
        req.set_header("user-agent", "b");
        assert_eq!(req.headers.len(), 1);
        assert_eq!(req.header("USER-AGENT"), Some("b"));
    }

    #[test]
    fn response_json() {
        let resp = HttpResponse::new(200, r#"{"member": []}"#);
        let value: Value = resp.json().unwrap();
        assert!(value["member"].as_array().unwrap().is_empty());
    }

    #[test]
    fn basic_auth_needs_colon() {
        let creds = Credentials::default().with_basic_auth("user:pa:ss");
        assert_eq!(creds.basic, Some(("user".into(), "pa:ss".into())));
        let creds = Credentials::default().with_basic_auth("nocolon");
        assert!(creds.basic.is_none());
    }
}
