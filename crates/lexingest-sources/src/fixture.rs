//! Adapters over a local fixture file: a JSON array of `{model, pk, fields}`
//! entries as dumped by the destination platform.

use std::collections::{HashMap, HashSet};
use std::path::Path;

use lexingest_core::normalize::{parse_date, text_value};
use lexingest_core::{LawBook, RawRecord, Source};
use serde::Deserialize;
use serde_json::{Map, Value};
use tracing::info;

use crate::{CaseLawSource, LegislationSource, RecordStream, SourceError};

const LAW_BOOK_MODEL: &str = "laws.lawbook";
const LAW_MODEL: &str = "laws.law";
const CASE_MODEL: &str = "cases.case";
const COURT_MODEL: &str = "courts.court";

const LAW_BOOK_FIELDS: &[&str] = &[
    "code",
    "title",
    "revision_date",
    "order",
    "changelog",
    "footnotes",
    "sections",
];
const LAW_FIELDS: &[&str] = &[
    "section", "title", "content", "slug", "order", "amtabk", "kurzue", "doknr", "footnotes",
];
const CASE_FIELDS: &[&str] = &[
    "file_number",
    "date",
    "content",
    "type",
    "ecli",
    "abstract",
    "title",
];

#[derive(Debug, Clone, Deserialize)]
struct Entry {
    model: String,
    #[serde(default)]
    pk: Value,
    #[serde(default)]
    fields: Map<String, Value>,
}

impl Entry {
    fn is(&self, model: &str) -> bool {
        self.model == model
    }

    fn pick(&self, keys: &[&str]) -> RawRecord {
        keys.iter()
            .filter_map(|&k| self.fields.get(k).map(|v| (k.to_string(), v.clone())))
            .collect()
    }

    /// Like [`pick`](Self::pick), but absent keys come through as `null`.
    fn pick_all(&self, keys: &[&str]) -> RawRecord {
        keys.iter()
            .map(|&k| (k.to_string(), self.fields.get(k).cloned().unwrap_or(Value::Null)))
            .collect()
    }
}

/// Parsed fixture file.
#[derive(Debug, Clone)]
pub struct Fixture {
    entries: Vec<Entry>,
}

impl Fixture {
    pub fn load(path: &Path) -> Result<Self, SourceError> {
        let text = std::fs::read_to_string(path).map_err(|source| SourceError::Fixture {
            path: path.to_path_buf(),
            source,
        })?;
        let fixture = Self::from_json(&text)?;
        info!(path = %path.display(), entries = fixture.entries.len(), "loaded fixture");
        Ok(fixture)
    }

    pub fn from_json(text: &str) -> Result<Self, SourceError> {
        Ok(Self {
            entries: serde_json::from_str(text)?,
        })
    }

    fn models<'a>(&'a self, model: &'a str) -> impl Iterator<Item = &'a Entry> + 'a {
        self.entries.iter().filter(move |e| e.is(model))
    }
}

/// Lookup key for a primary key or foreign key reference, so that `1` and
/// `"1"` refer to the same entry.
fn pk_key(pk: &Value) -> Option<String> {
    match pk {
        Value::String(_) | Value::Number(_) => text_value(pk),
        _ => None,
    }
}

fn fixture_source() -> Source {
    Source::new("Dummy", "")
}

/// Law books and articles from a fixture file.
pub struct FixtureLawSource {
    fixture: Fixture,
    source: Source,
    /// Book pk -> (code, revision date as written).
    books: HashMap<String, (String, String)>,
}

impl FixtureLawSource {
    pub fn new(fixture: Fixture) -> Self {
        let books = fixture
            .models(LAW_BOOK_MODEL)
            .filter_map(|e| {
                let code = e.fields.get("code").and_then(text_value)?;
                let rev = e.fields.get("revision_date").and_then(text_value)?;
                Some((pk_key(&e.pk)?, (code, rev)))
            })
            .collect();
        Self {
            fixture,
            source: fixture_source(),
            books,
        }
    }

    pub fn open(path: &Path) -> Result<Self, SourceError> {
        Fixture::load(path).map(Self::new)
    }
}

impl LegislationSource for FixtureLawSource {
    fn source(&self) -> &Source {
        &self.source
    }

    fn list_works(&self) -> RecordStream<'_> {
        Box::new(
            self.fixture
                .models(LAW_BOOK_MODEL)
                .map(move |e| Ok(e.pick(LAW_BOOK_FIELDS).with_source(&self.source))),
        )
    }

    fn list_articles(&self, book: &LawBook) -> RecordStream<'_> {
        // Books are matched on code and parsed revision date, so "2020-01-01"
        // and "01.01.2020" in the fixture refer to the same book.
        let pks: HashSet<String> = self
            .books
            .iter()
            .filter(|(_, (code, rev))| {
                *code == book.code && parse_date(rev) == Some(book.revision_date)
            })
            .map(|(pk, _)| pk.clone())
            .collect();
        let book_code = book.code.clone();
        let revision_date = book.revision_date.to_string();

        Box::new(
            self.fixture
                .models(LAW_MODEL)
                .filter(move |e| {
                    e.fields
                        .get("book")
                        .and_then(pk_key)
                        .is_some_and(|pk| pks.contains(&pk))
                })
                .map(move |e| {
                    let mut raw = e.pick_all(LAW_FIELDS);
                    raw.insert("book_code", book_code.as_str());
                    raw.insert("revision_date", revision_date.as_str());
                    Ok(raw.with_source(&self.source))
                }),
        )
    }
}

/// Court decisions from a fixture file; court names resolved through the
/// fixture's court entries.
pub struct FixtureCaseSource {
    fixture: Fixture,
    source: Source,
    courts: HashMap<String, String>,
}

impl FixtureCaseSource {
    pub fn new(fixture: Fixture) -> Self {
        let courts = fixture
            .models(COURT_MODEL)
            .filter_map(|e| {
                let name = e.fields.get("name").and_then(text_value)?;
                Some((pk_key(&e.pk)?, name))
            })
            .collect();
        Self {
            fixture,
            source: fixture_source(),
            courts,
        }
    }

    pub fn open(path: &Path) -> Result<Self, SourceError> {
        Fixture::load(path).map(Self::new)
    }

    fn court_name(&self, pk: Option<&Value>) -> String {
        let Some(key) = pk.and_then(pk_key) else {
            return format!("Unknown court (pk={})", pk.unwrap_or(&Value::Null));
        };
        self.courts
            .get(&key)
            .cloned()
            .unwrap_or_else(|| format!("Unknown court (pk={key})"))
    }
}

impl CaseLawSource for FixtureCaseSource {
    fn source(&self) -> &Source {
        &self.source
    }

    fn list_cases(&self) -> RecordStream<'_> {
        Box::new(self.fixture.models(CASE_MODEL).map(move |e| {
            let mut raw = e.pick(CASE_FIELDS);
            raw.insert("court_name", self.court_name(e.fields.get("court")));
            Ok(raw.with_source(&self.source))
        }))
    }
}

#[cfg(test)]
mod tests {
    use std::io::Write;

    use chrono::NaiveDate;
    use serde_json::json;

    use super::*;

    fn fixture() -> Fixture {
        let data = json!([
            {"model": "courts.court", "pk": 1, "fields": {"name": "Bundesgerichtshof"}},
            {"model": "cases.case", "pk": 10, "fields": {
                "court": 1, "file_number": "I ZR 1/21", "date": "2021-03-04",
                "content": "<p>Tenor und Gründe</p>", "type": "Urteil", "private": true
            }},
            {"model": "cases.case", "pk": 11, "fields": {
                "court": 99, "file_number": "2 BvR 5/20", "date": "2020-01-01",
                "content": "<p>Beschluss ...</p>"
            }},
            {"model": "laws.lawbook", "pk": 5, "fields": {
                "code": "BGB", "title": "Bürgerliches Gesetzbuch", "revision_date": "2024-01-01",
                "order": 1, "latest": true
            }},
            {"model": "laws.lawbook", "pk": 6, "fields": {
                "code": "BGB", "title": "Bürgerliches Gesetzbuch", "revision_date": "2020-01-01"
            }},
            {"model": "laws.law", "pk": 100, "fields": {
                "book": 5, "section": "§ 1", "title": "Beginn der Rechtsfähigkeit",
                "content": "<p>Die Rechtsfähigkeit des Menschen beginnt ...</p>", "order": 1
            }},
            {"model": "laws.law", "pk": 101, "fields": {
                "book": 6, "section": "§ 1", "content": "<p>old revision</p>"
            }}
        ]);
        Fixture::from_json(&data.to_string()).unwrap()
    }

    fn book(code: &str, date: &str) -> LawBook {
        LawBook {
            code: code.into(),
            revision_date: date.parse::<NaiveDate>().unwrap(),
            title: None,
            order: None,
            changelog: None,
            footnotes: None,
            sections: None,
            source: None,
        }
    }

    #[test]
    fn cases_resolve_court_names() {
        let source = FixtureCaseSource::new(fixture());
        let cases: Vec<_> = source.list_cases().map(Result::unwrap).collect();
        assert_eq!(cases.len(), 2);
        assert_eq!(cases[0].get_str("court_name"), Some("Bundesgerichtshof"));
        assert_eq!(cases[0].get_str("file_number"), Some("I ZR 1/21"));
        assert!(cases[0].get("private").is_none());
        assert_eq!(cases[1].get_str("court_name"), Some("Unknown court (pk=99)"));
        assert_eq!(cases[0].get("source").unwrap()["name"], "Dummy");
    }

    #[test]
    fn works_keep_known_fields_only() {
        let source = FixtureLawSource::new(fixture());
        let works: Vec<_> = source.list_works().map(Result::unwrap).collect();
        assert_eq!(works.len(), 2);
        assert_eq!(works[0].get_str("code"), Some("BGB"));
        assert!(works[0].get("latest").is_none());
    }

    #[test]
    fn articles_match_code_and_revision() {
        let source = FixtureLawSource::new(fixture());
        let laws: Vec<_> = source
            .list_articles(&book("BGB", "2024-01-01"))
            .map(Result::unwrap)
            .collect();
        assert_eq!(laws.len(), 1);
        assert_eq!(laws[0].get_str("section"), Some("§ 1"));
        assert_eq!(laws[0].get_str("book_code"), Some("BGB"));
        assert_eq!(laws[0].get_str("revision_date"), Some("2024-01-01"));
        // Absent article fields come through as null.
        assert_eq!(laws[0].get("slug"), Some(&Value::Null));

        assert_eq!(source.list_articles(&book("StGB", "2024-01-01")).count(), 0);
    }

    #[test]
    fn numeric_and_string_keys_match() {
        let data = json!([
            {"model": "courts.court", "pk": "7", "fields": {"name": "Oberlandesgericht Köln"}},
            {"model": "cases.case", "pk": 1, "fields": {"court": 7, "file_number": "6 U 1/22"}},
            {"model": "laws.lawbook", "pk": 5, "fields": {"code": "GG", "revision_date": "2024-01-01"}},
            {"model": "laws.law", "pk": 1, "fields": {"book": "5", "section": "Art. 1"}},
            {"model": "laws.law", "pk": 2, "fields": {"book": 5, "section": "Art. 2"}}
        ]);
        let fixture = || Fixture::from_json(&data.to_string()).unwrap();

        let cases: Vec<_> = FixtureCaseSource::new(fixture()).list_cases().map(Result::unwrap).collect();
        assert_eq!(cases[0].get_str("court_name"), Some("Oberlandesgericht Köln"));

        let laws = FixtureLawSource::new(fixture());
        assert_eq!(laws.list_articles(&book("GG", "2024-01-01")).count(), 2);
    }

    #[test]
    fn load_reports_missing_file() {
        let dir = tempfile::tempdir().unwrap();
        let err = Fixture::load(&dir.path().join("absent.json")).unwrap_err();
        assert!(matches!(err, SourceError::Fixture { .. }));
    }

    #[test]
    fn load_reads_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, r#"[{{"model": "courts.court", "pk": 1, "fields": {{"name": "AG"}}}}]"#).unwrap();
        let source = FixtureCaseSource::open(file.path()).unwrap();
        assert_eq!(source.list_cases().count(), 0);
    }
}
