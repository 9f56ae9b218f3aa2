use std::cell::RefCell;
use std::collections::HashMap;
use std::sync::LazyLock;

use chrono::NaiveDate;
use lexingest_core::normalize::parse_date;
use lexingest_core::{FieldMap, LawBook, RawRecord, Source};
use lexingest_net::{
    Backend, Clock, PacedTransport, PageCursor, PageToken, Paginated, ReqwestBackend, SystemClock,
};
use regex::Regex;
use serde_json::Value;
use tracing::{debug, info, warn};

use super::{
    BASE_URL, MAX_PAGE_SIZE, extract_body, fetch_collection_page, list_url, ris_source, str_field,
};
use crate::{LegislationSource, RecordStream, SourceError, SourceOptions, failed_stream};

static ARTICLE_NAME: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^((?:§|Artikel|Art\.)\s*\S+)\s*(.*)").expect("article pattern is valid")
});
static NON_SLUG: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"[^a-z0-9_-]").expect("slug pattern is valid"));
static DASHES: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"-{2,}").expect("dash pattern is valid"));

/// Split an article name like `"§ 1 Beginn der Rechtsfähigkeit"` into
/// section label and title. Names without a recognised prefix become the
/// section, with an empty title.
pub fn parse_article_name(name: &str) -> (String, String) {
    match ARTICLE_NAME.captures(name) {
        Some(caps) => (caps[1].trim().to_string(), caps[2].trim().to_string()),
        None => (name.to_string(), String::new()),
    }
}

pub fn slugify(text: &str) -> String {
    let lowered = text.to_lowercase();
    let replaced = NON_SLUG.replace_all(&lowered, "-");
    DASHES.replace_all(&replaced, "-").trim_matches('-').to_string()
}

/// Legislation from `GET /v1/legislation`.
///
/// Listing works fetches each work's expression detail and keeps it, so that
/// [`list_articles`](LegislationSource::list_articles) can enumerate a
/// book's parts without re-fetching. Article bodies are fetched one request
/// per article from the expression's HTML manifestation.
pub struct RisLawSource<B = ReqwestBackend, C = SystemClock> {
    transport: PacedTransport<B, C>,
    source: Source,
    search_term: Option<String>,
    date_from: Option<NaiveDate>,
    date_to: Option<NaiveDate>,
    /// Expression details of listed works not yet expanded into articles,
    /// keyed by trimmed code and revision date.
    expressions: RefCell<HashMap<(String, NaiveDate), Value>>,
}

impl RisLawSource {
    pub fn new(options: &SourceOptions) -> Result<Self, SourceError> {
        let transport = PacedTransport::new(BASE_URL, options.transport.clone())?;
        Ok(Self::with_transport(transport, options))
    }
}

impl<B: Backend, C: Clock> RisLawSource<B, C> {
    pub fn with_transport(transport: PacedTransport<B, C>, options: &SourceOptions) -> Self {
        Self {
            transport,
            source: ris_source(),
            search_term: options.search_term.clone(),
            date_from: options.date_from,
            date_to: options.date_to,
            expressions: RefCell::new(HashMap::new()),
        }
    }

    pub fn transport(&self) -> &PacedTransport<B, C> {
        &self.transport
    }

    fn first_page_url(&self) -> Result<String, SourceError> {
        let mut params = vec![
            ("size", MAX_PAGE_SIZE.to_string()),
            ("pageIndex", "0".to_string()),
        ];
        if let Some(term) = &self.search_term {
            params.push(("searchTerm", term.clone()));
        }
        if let Some(from) = self.date_from {
            params.push(("dateFrom", from.to_string()));
        }
        if let Some(to) = self.date_to {
            params.push(("dateTo", to.to_string()));
        }
        if self.date_from.is_some() || self.date_to.is_some() {
            params.push(("sort", "-date".to_string()));
        }
        list_url(&self.transport, "/v1/legislation", &params)
    }

    fn build_work(&self, item: &Value) -> Option<RawRecord> {
        let (Some(code), Some(date)) = (
            str_field(item, "abbreviation"),
            str_field(item, "legislationDate"),
        ) else {
            debug!("skipping work with missing abbreviation or date");
            return None;
        };
        let Some(revision_date) = parse_date(date) else {
            debug!(code, date, "skipping work with unparseable legislationDate");
            return None;
        };
        let Some(expression_id) = item.pointer("/workExample/@id").and_then(Value::as_str) else {
            debug!(code, "skipping work without expression id");
            return None;
        };

        let detail: Value = match self.transport.get_json(expression_id) {
            Ok(detail) => detail,
            Err(e) => {
                warn!(code, expression_id, error = %e, "failed to fetch expression detail");
                return None;
            }
        };
        let expression = detail.get("workExample").cloned().unwrap_or(Value::Null);
        self.expressions
            .borrow_mut()
            .insert((code.trim().to_string(), revision_date), expression);

        let mut raw = RawRecord::new()
            .with("abbreviation", code)
            .with("legislationDate", date);
        if let Some(name) = item.get("name") {
            raw.insert("name", name.clone());
        }
        Some(raw.with_source(&self.source))
    }

    fn article_content(&self, html_url: Option<&str>, e_id: &str) -> String {
        let Some(html_url) = html_url.filter(|_| !e_id.is_empty()) else {
            return String::new();
        };
        let base = html_url.strip_suffix(".html").unwrap_or(html_url);
        let url = format!("{base}/{e_id}.html");
        match self.transport.get_text(&url) {
            Ok(html) => extract_body(&html),
            Err(e) => {
                warn!(e_id, error = %e, "failed to fetch article HTML");
                String::new()
            }
        }
    }
}

/// `contentUrl` of the expression's HTML manifestation.
fn html_content_url(expression: &Value) -> Option<String> {
    expression
        .get("encoding")?
        .as_array()?
        .iter()
        .find(|enc| enc.get("encodingFormat").and_then(Value::as_str) == Some("text/html"))?
        .get("contentUrl")?
        .as_str()
        .map(str::to_string)
}

impl<B: Backend, C: Clock> LegislationSource for RisLawSource<B, C> {
    fn source(&self) -> &Source {
        &self.source
    }

    fn work_fields(&self) -> FieldMap {
        FieldMap::new()
            .field("code", &["abbreviation"])
            .field("title", &["name"])
            .field("revision_date", &["legislationDate"])
    }

    fn list_works(&self) -> RecordStream<'_> {
        let first = match self.first_page_url() {
            Ok(url) => url,
            Err(e) => return failed_stream(e),
        };
        let pages = Paginated::new(PageCursor::link_driven(first), move |token: &PageToken| {
            fetch_collection_page(&self.transport, token, "law books")
        });
        Box::new(pages.filter_map(move |item| match item {
            Ok(item) => self.build_work(&item).map(Ok),
            Err(e) => Some(Err(e)),
        }))
    }

    /// Consumes the book's cached expression; a second call yields nothing.
    fn list_articles(&self, book: &LawBook) -> RecordStream<'_> {
        let key = (book.code.clone(), book.revision_date);
        let Some(expression) = self.expressions.borrow_mut().remove(&key) else {
            warn!(code = %book.code, revision = %book.revision_date, "no expression cached for book");
            return Box::new(std::iter::empty());
        };
        let html_url = html_content_url(&expression);
        let parts = expression
            .get("hasPart")
            .and_then(Value::as_array)
            .cloned()
            .unwrap_or_default();
        info!(code = %book.code, articles = parts.len(), "listing articles");

        let (book_code, revision_date) = (book.code.clone(), book.revision_date.to_string());
        Box::new(parts.into_iter().enumerate().map(move |(i, part)| {
            let e_id = str_field(&part, "eId").unwrap_or_default();
            let name = part.get("name").and_then(Value::as_str).unwrap_or_default();
            let (section, title) = parse_article_name(name);
            let slug = match slugify(&section) {
                s if s.is_empty() => slugify(e_id),
                s => s,
            };
            let content = self.article_content(html_url.as_deref(), e_id);
            Ok(RawRecord::new()
                .with("book_code", book_code.as_str())
                .with("revision_date", revision_date.as_str())
                .with("section", section)
                .with("title", title)
                .with("content", content)
                .with("slug", slug)
                .with("order", i as i64 + 1)
                .with_source(&self.source))
        }))
    }
}
