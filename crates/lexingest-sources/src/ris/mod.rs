//! Adapters for the federal legal information portal (RIS) API.
//!
//! Both collections are paginated as hydra collections: `member[]` entries
//! wrapping an `item`, and a `view.next` link that is present until the
//! last page. Pagination follows that link rather than counting pages.

use std::sync::LazyLock;

use lexingest_core::Source;
use lexingest_net::{Backend, Clock, Page, PacedTransport, PageToken, Url};
use regex::Regex;
use serde_json::Value;
use tracing::info;

use crate::SourceError;

mod cases;
mod laws;

pub use cases::RisCaseSource;
pub use laws::RisLawSource;

pub const BASE_URL: &str = "https://testphase.rechtsinformationen.bund.de";

/// Largest page the list endpoints accept.
pub const MAX_PAGE_SIZE: u32 = 300;

static BODY: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?s)<body[^>]*>(.*)</body>").expect("body pattern is valid")
});

pub(crate) fn ris_source() -> Source {
    Source::new("Rechtsinformationssystem des Bundes (RIS)", BASE_URL)
}

/// Inner content of a full HTML page's `<body>`, or the input unchanged
/// when it has none.
pub fn extract_body(html: &str) -> String {
    match BODY.captures(html).and_then(|c| c.get(1)) {
        Some(body) => body.as_str().trim().to_string(),
        None => html.to_string(),
    }
}

/// First-page URL of a list endpoint with the given query parameters.
pub(crate) fn list_url<B: Backend, C: Clock>(
    transport: &PacedTransport<B, C>,
    path: &str,
    params: &[(&str, String)],
) -> Result<String, SourceError> {
    Url::parse_with_params(&transport.url(path), params)
        .map(String::from)
        .map_err(|e| SourceError::Config(format!("invalid list URL for {path}: {e}")))
}

/// Fetch one page of a hydra collection and unwrap its member items.
pub(crate) fn fetch_collection_page<B: Backend, C: Clock>(
    transport: &PacedTransport<B, C>,
    token: &PageToken,
    what: &str,
) -> Result<Page<Value>, SourceError> {
    let PageToken::Link(url) = token else {
        return Err(SourceError::Config(format!(
            "unexpected page token {token:?} for a link-driven collection"
        )));
    };
    let data: Value = transport.get_json(url)?;
    let items: Vec<Value> = data
        .get("member")
        .and_then(Value::as_array)
        .map(|members| {
            members
                .iter()
                .map(|m| m.get("item").cloned().unwrap_or_else(|| m.clone()))
                .collect()
        })
        .unwrap_or_default();
    let next = data
        .pointer("/view/next")
        .and_then(Value::as_str)
        .filter(|s| !s.is_empty())
        .map(str::to_string);
    let total = data.get("totalItems").cloned().unwrap_or_default();
    info!(
        what,
        items = items.len(),
        %total,
        more = next.is_some(),
        "fetched page"
    );
    Ok(Page::new(items).with_next(next))
}

/// Non-empty string at `key`.
pub(crate) fn str_field<'a>(item: &'a Value, key: &str) -> Option<&'a str> {
    item.get(key)
        .and_then(Value::as_str)
        .filter(|s| !s.trim().is_empty())
}
