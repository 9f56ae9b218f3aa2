//! Normalization pipeline: raw adapter maps → canonical records.
//!
//! Field naming is declared per source with a [`FieldMap`]; the pipeline
//! itself enforces the policies every sink relies on:
//!
//! - **Fallback selection**: a canonical field may be satisfied by several
//!   source keys; the first non-empty candidate in declared order wins.
//! - **Truncation**: over-long strings are cut to the destination bound,
//!   never rejected.
//! - **Null-stripping**: empty values become `None` and are omitted on
//!   serialisation.
//! - **Content gate**: a primary text body shorter than
//!   [`NormalizeConfig::min_content_len`] rejects the record.
//!
//! The pass is pure. Feeding a normalized record back through it (via
//! [`CanonicalRecord::to_raw`]) yields the same record.

use std::collections::HashMap;

use chrono::NaiveDate;
use serde_json::Value;
use thiserror::Error;

use crate::record::{Case, CanonicalRecord, Law, LawBook, RawRecord, RecordKind, Source};

/// Destination-defined bounds applied during normalization.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NormalizeConfig {
    /// Minimum length (in characters) of a record's primary text body.
    pub min_content_len: usize,
    /// Bound for long-text fields (abstracts, footnotes, changelogs).
    pub long_text_max: usize,
    /// Bound for title-class fields (titles, court names, identifiers).
    pub title_max: usize,
    /// Bound for law section labels and law titles.
    pub law_title_max: usize,
    /// Bound for case file numbers.
    pub file_number_max: usize,
}

impl Default for NormalizeConfig {
    fn default() -> Self {
        Self {
            min_content_len: 10,
            long_text_max: 50_000,
            title_max: 255,
            law_title_max: 200,
            file_number_max: 100,
        }
    }
}

/// Why a raw record could not become a canonical one.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum Rejection {
    #[error("missing required field `{0}`")]
    MissingField(&'static str),

    #[error("field `{field}` is not a date: {value:?}")]
    InvalidDate { field: &'static str, value: String },

    #[error("content too short ({len} < {min} chars)")]
    ContentTooShort { len: usize, min: usize },
}

/// Per-source declaration of which raw keys feed which canonical field.
///
/// Undeclared fields are read from the raw key of the same name, and a
/// declared field still falls back to its canonical name last, so an
/// already-normalized record passes through any map unchanged.
#[derive(Debug, Clone, Default)]
pub struct FieldMap {
    fields: HashMap<&'static str, Vec<String>>,
}

impl FieldMap {
    pub fn new() -> Self {
        Self::default()
    }

    /// Declare the candidate raw keys for `canonical`, highest priority first.
    pub fn field(mut self, canonical: &'static str, candidates: &[&str]) -> Self {
        self.fields
            .insert(canonical, candidates.iter().map(|c| (*c).to_string()).collect());
        self
    }

    /// Raw keys consulted for `canonical`, in priority order.
    pub fn candidates<'a>(&'a self, canonical: &'a str) -> impl Iterator<Item = &'a str> {
        let declared: &[String] = self.fields.get(canonical).map(Vec::as_slice).unwrap_or(&[]);
        let implicit = (!declared.iter().any(|c| c == canonical)).then_some(canonical);
        declared.iter().map(String::as_str).chain(implicit)
    }

    /// First non-empty candidate value for `canonical`.
    pub fn select(&self, raw: &RawRecord, canonical: &str) -> Option<String> {
        first_non_empty(self.candidates(canonical).map(|key| raw.get(key)))
    }

    fn select_value<'r>(&self, raw: &'r RawRecord, canonical: &str) -> Option<&'r Value> {
        self.candidates(canonical)
            .filter_map(|key| raw.get(key))
            .find(|v| text_value(v).is_some())
    }
}

/// Select the first candidate that carries a non-empty value.
///
/// `None`, JSON `null`, and blank strings are skipped.
pub fn first_non_empty<'a, I>(candidates: I) -> Option<String>
where
    I: IntoIterator<Item = Option<&'a Value>>,
{
    candidates.into_iter().flatten().find_map(text_value)
}

/// Render a JSON value as trimmed text, or `None` when it carries nothing.
pub fn text_value(value: &Value) -> Option<String> {
    let text = match value {
        Value::Null => return None,
        Value::String(s) => s.trim().to_string(),
        Value::Number(n) => n.to_string(),
        Value::Bool(b) => b.to_string(),
        Value::Array(a) if a.is_empty() => return None,
        Value::Object(o) if o.is_empty() => return None,
        other => other.to_string(),
    };
    (!text.is_empty()).then_some(text)
}

/// Cut `s` to at most `max` characters, dropping whitespace left dangling at the cut.
pub fn truncate_chars(s: String, max: usize) -> String {
    match s.char_indices().nth(max) {
        Some((byte_idx, _)) => s[..byte_idx].trim_end().to_string(),
        None => s,
    }
}

/// Parse `YYYY-MM-DD` (optionally followed by a time part) or German `DD.MM.YYYY`.
pub fn parse_date(s: &str) -> Option<NaiveDate> {
    let s = s.trim();
    let iso = s.get(..10).filter(|_| s.len() == 10 || s[10..].starts_with('T'));
    if let Some(date) = iso.and_then(|d| NaiveDate::parse_from_str(d, "%Y-%m-%d").ok()) {
        return Some(date);
    }
    NaiveDate::parse_from_str(s, "%d.%m.%Y").ok()
}

/// Stateless normalization pass parameterised by destination bounds.
#[derive(Debug, Clone, Default)]
pub struct Normalizer {
    config: NormalizeConfig,
}

impl Normalizer {
    pub fn new(config: NormalizeConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &NormalizeConfig {
        &self.config
    }

    /// Normalize `raw` into the canonical shape selected by `kind`.
    pub fn normalize(
        &self,
        kind: RecordKind,
        raw: &RawRecord,
        map: &FieldMap,
    ) -> Result<CanonicalRecord, Rejection> {
        Ok(match kind {
            RecordKind::LawBook => self.law_book(raw, map)?.into(),
            RecordKind::Law => self.law(raw, map)?.into(),
            RecordKind::Case => self.case(raw, map)?.into(),
        })
    }

    pub fn law_book(&self, raw: &RawRecord, map: &FieldMap) -> Result<LawBook, Rejection> {
        let c = &self.config;
        Ok(LawBook {
            code: self.required(raw, map, "code", c.title_max)?,
            revision_date: self.date(raw, map, "revision_date")?,
            title: self.text(raw, map, "title", c.title_max),
            order: integer(map.select_value(raw, "order")),
            changelog: self.text(raw, map, "changelog", c.long_text_max),
            footnotes: self.text(raw, map, "footnotes", c.long_text_max),
            sections: self.text(raw, map, "sections", c.long_text_max),
            source: source(raw),
        })
    }

    pub fn law(&self, raw: &RawRecord, map: &FieldMap) -> Result<Law, Rejection> {
        let c = &self.config;
        let section = self.text(raw, map, "section", c.law_title_max);
        let title = self
            .text(raw, map, "title", c.law_title_max)
            .or_else(|| section.clone())
            .unwrap_or_else(|| "Untitled".to_string());
        Ok(Law {
            book_code: self.required(raw, map, "book_code", c.title_max)?,
            revision_date: self.date(raw, map, "revision_date")?,
            title,
            section,
            content: self.content(raw, map)?,
            slug: self.text(raw, map, "slug", c.title_max),
            order: integer(map.select_value(raw, "order")),
            amtabk: self.text(raw, map, "amtabk", c.title_max),
            kurzue: self.text(raw, map, "kurzue", c.long_text_max),
            doknr: self.text(raw, map, "doknr", c.title_max),
            footnotes: self.text(raw, map, "footnotes", c.long_text_max),
            source: source(raw),
        })
    }

    pub fn case(&self, raw: &RawRecord, map: &FieldMap) -> Result<Case, Rejection> {
        let c = &self.config;
        Ok(Case {
            court_name: self.required(raw, map, "court_name", c.title_max)?,
            file_number: self.required(raw, map, "file_number", c.file_number_max)?,
            date: self.date(raw, map, "date")?,
            content: self.content(raw, map)?.ok_or(Rejection::MissingField("content"))?,
            case_type: self.text(raw, map, "type", c.title_max),
            ecli: self.text(raw, map, "ecli", c.title_max),
            title: self.text(raw, map, "title", c.title_max),
            summary: self.text(raw, map, "abstract", c.long_text_max),
            source: source(raw),
        })
    }

    fn text(&self, raw: &RawRecord, map: &FieldMap, field: &str, max: usize) -> Option<String> {
        map.select(raw, field).map(|s| truncate_chars(s, max))
    }

    fn required(
        &self,
        raw: &RawRecord,
        map: &FieldMap,
        field: &'static str,
        max: usize,
    ) -> Result<String, Rejection> {
        self.text(raw, map, field, max)
            .ok_or(Rejection::MissingField(field))
    }

    fn date(
        &self,
        raw: &RawRecord,
        map: &FieldMap,
        field: &'static str,
    ) -> Result<NaiveDate, Rejection> {
        let value = map.select(raw, field).ok_or(Rejection::MissingField(field))?;
        parse_date(&value).ok_or(Rejection::InvalidDate { field, value })
    }

    /// Content is unbounded but gated on a minimum length when present.
    fn content(&self, raw: &RawRecord, map: &FieldMap) -> Result<Option<String>, Rejection> {
        let Some(content) = map.select(raw, "content") else {
            return Ok(None);
        };
        let len = content.chars().count();
        let min = self.config.min_content_len;
        if len < min {
            return Err(Rejection::ContentTooShort { len, min });
        }
        Ok(Some(content))
    }
}

fn integer(value: Option<&Value>) -> Option<i64> {
    match value? {
        Value::Number(n) => n
            .as_i64()
            .or_else(|| n.as_f64().filter(|f| f.fract() == 0.0).map(|f| f as i64)),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

fn source(raw: &RawRecord) -> Option<Source> {
    let obj = raw.get("source")?.as_object()?;
    let name = obj.get("name").and_then(text_value)?;
    let homepage = obj.get("homepage").and_then(text_value).unwrap_or_default();
    Some(Source { name, homepage })
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use serde_json::json;

    fn raw(value: Value) -> RawRecord {
        match value {
            Value::Object(map) => map.into(),
            _ => panic!("expected object"),
        }
    }

    fn ris_map() -> FieldMap {
        FieldMap::new()
            .field("court_name", &["courtName"])
            .field("date", &["decisionDate"])
            .field(
                "abstract",
                &["guidingPrinciple", "headnote", "otherHeadnote", "tenor"],
            )
    }

    #[test]
    fn fallback_picks_first_non_empty() {
        let empty = json!("");
        let b = json!("B");
        let c = json!("C");
        let picked = first_non_empty([Some(&empty), None, Some(&b), Some(&c)]);
        assert_eq!(picked.as_deref(), Some("B"));
    }

    #[test]
    fn fallback_skips_blank_and_null() {
        let blank = json!("   ");
        let null = Value::Null;
        assert_eq!(first_non_empty([Some(&blank), Some(&null)]), None);
    }

    #[test]
    fn abstract_candidates_follow_declared_order() {
        let record = raw(json!({
            "courtName": "BGH",
            "file_number": "I ZR 1/21",
            "decisionDate": "2021-05-04",
            "content": "<p>Volltext der Entscheidung</p>",
            "guidingPrinciple": "",
            "headnote": null,
            "otherHeadnote": "Orientierungssatz",
            "tenor": "Die Revision wird zurückgewiesen.",
        }));
        let case = Normalizer::default().case(&record, &ris_map()).unwrap();
        assert_eq!(case.summary.as_deref(), Some("Orientierungssatz"));
        assert_eq!(case.court_name, "BGH");
    }

    #[test]
    fn content_gate_boundary() {
        let n = Normalizer::default();
        let base = json!({"court_name": "AG", "file_number": "1", "date": "2020-01-01"});
        let mut short = raw(base.clone());
        short.insert("content", "123456789");
        assert_eq!(
            n.case(&short, &FieldMap::new()),
            Err(Rejection::ContentTooShort { len: 9, min: 10 })
        );
        let mut ok = raw(base);
        ok.insert("content", "1234567890");
        assert!(n.case(&ok, &FieldMap::new()).is_ok());
    }

    #[test]
    fn case_without_content_is_rejected() {
        let record = raw(json!({"court_name": "AG", "file_number": "1", "date": "2020-01-01"}));
        assert_eq!(
            Normalizer::default().case(&record, &FieldMap::new()),
            Err(Rejection::MissingField("content"))
        );
    }

    #[test]
    fn truncates_title_class_fields() {
        let record = raw(json!({
            "court_name": "x".repeat(300),
            "file_number": "y".repeat(150),
            "date": "04.05.2021",
            "content": "long enough content",
            "abstract": "z".repeat(60_000),
        }));
        let case = Normalizer::default().case(&record, &FieldMap::new()).unwrap();
        assert_eq!(case.court_name.chars().count(), 255);
        assert_eq!(case.file_number.chars().count(), 100);
        assert_eq!(case.summary.unwrap().chars().count(), 50_000);
        assert_eq!(case.date, NaiveDate::from_ymd_opt(2021, 5, 4).unwrap());
    }

    #[test]
    fn truncation_counts_characters_not_bytes() {
        assert_eq!(truncate_chars("Ürteil über".into(), 3), "Ürt");
        assert_eq!(truncate_chars("ab cd".into(), 3), "ab");
        assert_eq!(truncate_chars("abc".into(), 10), "abc");
    }

    #[test]
    fn nulls_are_stripped() {
        let record = raw(json!({
            "book_code": "BGB",
            "revision_date": "2024-01-01",
            "section": "§ 1",
            "title": null,
            "content": null,
            "slug": "",
        }));
        let law = Normalizer::default().law(&record, &FieldMap::new()).unwrap();
        assert_eq!(law.title, "§ 1");
        assert!(law.content.is_none());
        assert!(law.slug.is_none());
        let json = CanonicalRecord::from(law).to_json();
        assert!(!json.as_object().unwrap().contains_key("content"));
    }

    #[test]
    fn law_title_defaults_to_untitled() {
        let record = raw(json!({"book_code": "BGB", "revision_date": "2024-01-01"}));
        let law = Normalizer::default().law(&record, &FieldMap::new()).unwrap();
        assert_eq!(law.title, "Untitled");
    }

    #[test]
    fn invalid_date_is_rejected() {
        let record = raw(json!({"code": "BGB", "revision_date": "gestern"}));
        assert!(matches!(
            Normalizer::default().law_book(&record, &FieldMap::new()),
            Err(Rejection::InvalidDate { field: "revision_date", .. })
        ));
    }

    #[test]
    fn source_with_empty_name_is_omitted() {
        let record = raw(json!({"code": "BGB", "revision_date": "2024-01-01"}))
            .with_source(&Source::new("", ""));
        let book = Normalizer::default().law_book(&record, &FieldMap::new()).unwrap();
        assert!(book.source.is_none());
    }

    #[test]
    fn order_accepts_numeric_strings() {
        let record = raw(json!({"code": "BGB", "revision_date": "2024-01-01", "order": "7"}));
        let book = Normalizer::default().law_book(&record, &FieldMap::new()).unwrap();
        assert_eq!(book.order, Some(7));
    }

    #[test]
    fn parse_date_formats() {
        let expected = NaiveDate::from_ymd_opt(2024, 3, 1);
        assert_eq!(parse_date("2024-03-01"), expected);
        assert_eq!(parse_date("01.03.2024"), expected);
        assert_eq!(parse_date("2024-03-01T12:00:00Z"), expected);
        assert_eq!(parse_date("2024-03-01x"), None);
        assert_eq!(parse_date(""), None);
    }

    fn opt_text() -> impl Strategy<Value = Value> {
        prop_oneof![
            Just(Value::Null),
            "[ a-zA-ZäöüÜ0-9§./-]{0,40}".prop_map(Value::String),
        ]
    }

    proptest! {
        #[test]
        fn normalization_is_idempotent(
            court in opt_text(),
            file_number in opt_text(),
            content in "[ a-z<>/]{0,30}",
            headnote in opt_text(),
            tenor in opt_text(),
            title in "[ a-z]{0,300}",
            day in 1u32..28,
        ) {
            let record = raw(json!({
                "courtName": court,
                "file_number": file_number,
                "decisionDate": format!("{day:02}.02.2022"),
                "content": content,
                "headnote": headnote,
                "tenor": tenor,
                "title": title,
            }))
            .with_source(&Source::new("RIS", "https://example.org"));

            let n = Normalizer::default();
            let map = ris_map();
            if let Ok(first) = n.normalize(RecordKind::Case, &record, &map) {
                let again = n.normalize(RecordKind::Case, &first.to_raw(), &map);
                prop_assert_eq!(again, Ok(first.clone()));
                let plain = n.normalize(RecordKind::Case, &first.to_raw(), &FieldMap::new());
                prop_assert_eq!(plain, Ok(first));
            }
        }
    }
}
