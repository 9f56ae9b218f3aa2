//! Raw adapter output and the canonical record shapes delivered to sinks.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Attribution attached to every record an adapter emits.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Source {
    pub name: String,
    pub homepage: String,
}

impl Source {
    pub fn new(name: impl Into<String>, homepage: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            homepage: homepage.into(),
        }
    }
}

/// Loosely-typed record as yielded by a source adapter.
///
/// Keys are source-specific; the normalization pipeline maps them onto
/// canonical fields through a [`FieldMap`](crate::FieldMap).
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RawRecord(Map<String, Value>);

impl RawRecord {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.0.get(key)
    }

    /// String value of `key`, if it is present and a JSON string.
    pub fn get_str(&self, key: &str) -> Option<&str> {
        self.0.get(key).and_then(Value::as_str)
    }

    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<Value>) {
        self.0.insert(key.into(), value.into());
    }

    /// Builder-style [`insert`](Self::insert).
    pub fn with(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.insert(key, value);
        self
    }

    /// Attach the adapter's source attribution under the `source` key.
    pub fn with_source(mut self, source: &Source) -> Self {
        let mut map = Map::new();
        map.insert("name".into(), source.name.clone().into());
        map.insert("homepage".into(), source.homepage.clone().into());
        self.0.insert("source".into(), Value::Object(map));
        self
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn into_inner(self) -> Map<String, Value> {
        self.0
    }
}

impl From<Map<String, Value>> for RawRecord {
    fn from(map: Map<String, Value>) -> Self {
        Self(map)
    }
}

impl<K: Into<String>, V: Into<Value>> FromIterator<(K, V)> for RawRecord {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        Self(iter.into_iter().map(|(k, v)| (k.into(), v.into())).collect())
    }
}

/// Which canonical shape a record takes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RecordKind {
    LawBook,
    Law,
    Case,
}

impl RecordKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::LawBook => "law_book",
            Self::Law => "law",
            Self::Case => "case",
        }
    }
}

/// A consolidated code of law at one revision (e.g. BGB as of a given date).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LawBook {
    pub code: String,
    pub revision_date: NaiveDate,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub order: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub changelog: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub footnotes: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sections: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source: Option<Source>,
}

/// A single article or section of a [`LawBook`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Law {
    pub book_code: String,
    pub revision_date: NaiveDate,
    /// Never blank: falls back to the section label, then `"Untitled"`.
    pub title: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub section: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub slug: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub order: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub amtabk: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub kurzue: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub doknr: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub footnotes: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source: Option<Source>,
}

/// A court decision.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Case {
    pub court_name: String,
    pub file_number: String,
    pub date: NaiveDate,
    pub content: String,
    #[serde(rename = "type", default, skip_serializing_if = "Option::is_none")]
    pub case_type: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ecli: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(rename = "abstract", default, skip_serializing_if = "Option::is_none")]
    pub summary: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source: Option<Source>,
}

/// The unified, sink-agnostic representation of one law book, law, or case.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CanonicalRecord {
    LawBook(LawBook),
    Law(Law),
    Case(Case),
}

impl CanonicalRecord {
    pub fn kind(&self) -> RecordKind {
        match self {
            Self::LawBook(_) => RecordKind::LawBook,
            Self::Law(_) => RecordKind::Law,
            Self::Case(_) => RecordKind::Case,
        }
    }

    /// Short human-readable identifier for log lines.
    pub fn label(&self) -> String {
        match self {
            Self::LawBook(b) => format!("{} ({})", b.code, b.revision_date),
            Self::Law(l) => format!("{} {}", l.book_code, l.section.as_deref().unwrap_or(&l.title)),
            Self::Case(c) => c.file_number.clone(),
        }
    }

    /// The record's fields as a JSON object, exactly as sinks receive it.
    pub fn to_json(&self) -> Value {
        let value = match self {
            Self::LawBook(b) => serde_json::to_value(b),
            Self::Law(l) => serde_json::to_value(l),
            Self::Case(c) => serde_json::to_value(c),
        };
        // Plain structs of strings, integers and dates always serialise.
        value.unwrap_or(Value::Null)
    }

    /// Re-express the record as a raw map keyed by canonical field names.
    pub fn to_raw(&self) -> RawRecord {
        match self.to_json() {
            Value::Object(map) => RawRecord::from(map),
            _ => RawRecord::new(),
        }
    }
}

impl From<LawBook> for CanonicalRecord {
    fn from(book: LawBook) -> Self {
        Self::LawBook(book)
    }
}

impl From<Law> for CanonicalRecord {
    fn from(law: Law) -> Self {
        Self::Law(law)
    }
}

impl From<Case> for CanonicalRecord {
    fn from(case: Case) -> Self {
        Self::Case(case)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_case() -> Case {
        Case {
            court_name: "Bundesgerichtshof".into(),
            file_number: "I ZR 1/21".into(),
            date: NaiveDate::from_ymd_opt(2021, 5, 4).unwrap(),
            content: "<p>Tenor ...</p>".into(),
            case_type: Some("Urteil".into()),
            ecli: None,
            title: None,
            summary: Some("Leitsatz".into()),
            source: None,
        }
    }

    #[test]
    fn case_json_omits_absent_fields() {
        let json = CanonicalRecord::from(sample_case()).to_json();
        let obj = json.as_object().unwrap();
        assert_eq!(obj["type"], "Urteil");
        assert_eq!(obj["abstract"], "Leitsatz");
        assert_eq!(obj["date"], "2021-05-04");
        assert!(!obj.contains_key("ecli"));
        assert!(!obj.contains_key("title"));
        assert!(!obj.contains_key("source"));
    }

    #[test]
    fn to_raw_uses_canonical_keys() {
        let raw = CanonicalRecord::from(sample_case()).to_raw();
        assert_eq!(raw.get_str("court_name"), Some("Bundesgerichtshof"));
        assert_eq!(raw.get_str("file_number"), Some("I ZR 1/21"));
        assert_eq!(raw.len(), 6);
    }

    #[test]
    fn raw_record_with_source() {
        let raw = RawRecord::new()
            .with("code", "BGB")
            .with_source(&Source::new("RIS", "https://example.org"));
        assert_eq!(raw.get("source").unwrap()["name"], "RIS");
        assert_eq!(raw.get_str("code"), Some("BGB"));
    }

    #[test]
    fn label_per_kind() {
        let case = CanonicalRecord::from(sample_case());
        assert_eq!(case.kind(), RecordKind::Case);
        assert_eq!(case.label(), "I ZR 1/21");
    }
}
