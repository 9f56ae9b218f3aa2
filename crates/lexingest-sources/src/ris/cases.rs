use std::cell::RefCell;
use std::collections::HashMap;

use chrono::NaiveDate;
use lexingest_core::{FieldMap, RawRecord, Source};
use lexingest_net::{
    Backend, Clock, PacedTransport, PageCursor, PageToken, Paginated, ReqwestBackend, SystemClock,
    TransportError,
};
use serde_json::Value;
use tracing::{debug, warn};

use super::{
    BASE_URL, MAX_PAGE_SIZE, extract_body, fetch_collection_page, list_url, ris_source, str_field,
};
use crate::{CaseLawSource, RecordStream, SourceError, SourceOptions, failed_stream};

/// Detail fields tried in order for a decision's abstract.
const ABSTRACT_FIELDS: &[&str] = &["guidingPrinciple", "headnote", "otherHeadnote", "tenor"];

/// Court decisions from `GET /v1/case-law`.
///
/// Each listed decision costs two further requests: the HTML body (required;
/// the decision is dropped when it cannot be fetched) and the JSON detail
/// (optional; only used for the abstract).
pub struct RisCaseSource<B = ReqwestBackend, C = SystemClock> {
    transport: PacedTransport<B, C>,
    source: Source,
    court: Option<String>,
    date_from: Option<NaiveDate>,
    date_to: Option<NaiveDate>,
    /// Court code -> label. Loaded on first use and kept for the adapter's
    /// lifetime; empty when the lookup failed.
    court_labels: RefCell<Option<HashMap<String, String>>>,
}

impl RisCaseSource {
    pub fn new(options: &SourceOptions) -> Result<Self, SourceError> {
        let transport = PacedTransport::new(BASE_URL, options.transport.clone())?;
        Ok(Self::with_transport(transport, options))
    }
}

impl<B: Backend, C: Clock> RisCaseSource<B, C> {
    pub fn with_transport(transport: PacedTransport<B, C>, options: &SourceOptions) -> Self {
        Self {
            transport,
            source: ris_source(),
            court: options.court.clone(),
            date_from: options.date_from,
            date_to: options.date_to,
            court_labels: RefCell::new(None),
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
        if let Some(court) = &self.court {
            params.push(("courtType", court.clone()));
        }
        if let Some(from) = self.date_from {
            params.push(("decisionDateFrom", from.to_string()));
        }
        if let Some(to) = self.date_to {
            params.push(("decisionDateTo", to.to_string()));
        }
        list_url(&self.transport, "/v1/case-law", &params)
    }

    fn fetch_court_labels(&self) -> Result<HashMap<String, String>, TransportError> {
        let data: Value = self.transport.get_json("/v1/case-law/courts")?;
        // A plain list, or a hydra collection on some deployments.
        let courts = match &data {
            Value::Array(list) => list.as_slice(),
            other => other
                .get("member")
                .and_then(Value::as_array)
                .map(Vec::as_slice)
                .unwrap_or(&[]),
        };
        Ok(courts
            .iter()
            .filter_map(|c| {
                let id = c.get("id")?.as_str()?;
                let label = c.get("label")?.as_str()?;
                Some((id.to_string(), label.to_string()))
            })
            .collect())
    }

    /// Display label for a court code, falling back to the code itself.
    fn court_label(&self, code: &str) -> String {
        let mut cache = self.court_labels.borrow_mut();
        let labels = cache.get_or_insert_with(|| match self.fetch_court_labels() {
            Ok(labels) => {
                debug!(courts = labels.len(), "loaded court labels");
                labels
            }
            Err(e) => {
                warn!(error = %e, "failed to fetch court labels, using raw court codes");
                HashMap::new()
            }
        });
        labels.get(code).cloned().unwrap_or_else(|| code.to_string())
    }

    fn case_html(&self, document_number: &str) -> Option<String> {
        match self
            .transport
            .get_text(&format!("/v1/case-law/{document_number}.html"))
        {
            Ok(html) => Some(extract_body(&html)),
            Err(e) => {
                warn!(document_number, error = %e, "failed to fetch case HTML");
                None
            }
        }
    }

    fn case_detail(&self, document_number: &str) -> Option<Value> {
        self.transport
            .get_json(&format!("/v1/case-law/{document_number}"))
            .inspect_err(|e| debug!(document_number, error = %e, "failed to fetch case detail"))
            .ok()
    }

    /// Assemble the raw record for one listed decision, or `None` to drop it.
    fn build_case(&self, item: &Value) -> Option<RawRecord> {
        let Some(document_number) = str_field(item, "documentNumber") else {
            debug!("skipping case with missing documentNumber");
            return None;
        };
        let content = self.case_html(document_number)?;

        let mut raw = RawRecord::new()
            .with("documentNumber", document_number)
            .with("content", content);
        if let Some(code) = str_field(item, "courtName") {
            raw.insert("courtName", self.court_label(code));
        }
        if let Some(file_number) = item.pointer("/fileNumbers/0") {
            raw.insert("fileNumber", file_number.clone());
        }
        for key in ["decisionDate", "documentType", "ecli", "headline"] {
            if let Some(value) = item.get(key) {
                raw.insert(key, value.clone());
            }
        }
        if let Some(detail) = self.case_detail(document_number) {
            for &key in ABSTRACT_FIELDS {
                if let Some(value) = detail.get(key) {
                    raw.insert(key, value.clone());
                }
            }
        }
        Some(raw.with_source(&self.source))
    }
}

impl<B: Backend, C: Clock> CaseLawSource for RisCaseSource<B, C> {
    fn source(&self) -> &Source {
        &self.source
    }

    fn case_fields(&self) -> FieldMap {
        FieldMap::new()
            .field("court_name", &["courtName"])
            .field("file_number", &["fileNumber"])
            .field("date", &["decisionDate"])
            .field("type", &["documentType"])
            .field("title", &["headline"])
            .field("abstract", ABSTRACT_FIELDS)
    }

    fn list_cases(&self) -> RecordStream<'_> {
        let first = match self.first_page_url() {
            Ok(url) => url,
            Err(e) => return failed_stream(e),
        };
        let pages = Paginated::new(PageCursor::link_driven(first), move |token: &PageToken| {
            fetch_collection_page(&self.transport, token, "cases")
        });
        Box::new(pages.filter_map(move |item| match item {
            Ok(item) => self.build_case(&item).map(Ok),
            Err(e) => Some(Err(e)),
        }))
    }
}
