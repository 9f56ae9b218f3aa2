//! One pretty-printed JSON file per record under a directory tree:
//! `law_books/{code}.json`, `laws/{book_code}/{slug}.json`,
//! `cases/{file_number}.json`.

use std::path::{Path, PathBuf};
use std::sync::LazyLock;

use lexingest_core::{CanonicalRecord, FetchOutcome};
use regex::Regex;
use tracing::debug;

use crate::{Sink, SinkError};

static UNSAFE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r#"[/\\<>:"|?*\s]"#).expect("unsafe-char pattern is valid"));
static UNDERSCORES: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"_+").expect("underscore pattern is valid"));

/// Longest file stem in bytes; leaves room for `.json` within the common
/// 255-byte file name limit.
pub const MAX_STEM_BYTES: usize = 250;

/// Make `name` safe as a single path component.
///
/// Separators, shell metacharacters and whitespace become `_`, runs of `_`
/// collapse, and leading/trailing `_` and `.` are dropped so the result can
/// never be hidden or escape its directory. The result is cut to
/// [`MAX_STEM_BYTES`] on a character boundary. Empty results become `unnamed`.
pub fn sanitize_filename(name: &str) -> String {
    let replaced = UNSAFE.replace_all(name, "_");
    let collapsed = UNDERSCORES.replace_all(&replaced, "_");
    let is_edge = |c: char| c == '_' || c == '.';
    let mut trimmed = collapsed.trim_matches(is_edge);
    if trimmed.len() > MAX_STEM_BYTES {
        let mut cut = MAX_STEM_BYTES;
        while !trimmed.is_char_boundary(cut) {
            cut -= 1;
        }
        trimmed = trimmed[..cut].trim_end_matches(is_edge);
    }
    if trimmed.is_empty() {
        "unnamed".to_string()
    } else {
        trimmed.to_string()
    }
}

pub struct JsonFileSink {
    root: PathBuf,
}

impl JsonFileSink {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Deterministic location of `record` under the root.
    pub fn path_for(&self, record: &CanonicalRecord) -> PathBuf {
        match record {
            CanonicalRecord::LawBook(book) => self
                .root
                .join("law_books")
                .join(format!("{}.json", sanitize_filename(&book.code))),
            CanonicalRecord::Law(law) => {
                let name = law
                    .slug
                    .as_deref()
                    .or(law.section.as_deref())
                    .unwrap_or("unknown");
                self.root
                    .join("laws")
                    .join(sanitize_filename(&law.book_code))
                    .join(format!("{}.json", sanitize_filename(name)))
            }
            CanonicalRecord::Case(case) => self
                .root
                .join("cases")
                .join(format!("{}.json", sanitize_filename(&case.file_number))),
        }
    }

    fn write_file(&self, record: &CanonicalRecord) -> Result<PathBuf, SinkError> {
        let path = self.path_for(record);
        let io_err = |source| SinkError::Io {
            path: path.clone(),
            source,
        };
        if let Some(dir) = path.parent() {
            std::fs::create_dir_all(dir).map_err(io_err)?;
        }
        let mut text = serde_json::to_string_pretty(&record.to_json())?;
        text.push('\n');
        std::fs::write(&path, text).map_err(io_err)?;
        Ok(path)
    }
}

impl Sink for JsonFileSink {
    fn name(&self) -> &'static str {
        "json-file"
    }

    /// Always overwrites; there is no duplicate concept for files.
    fn write(&mut self, record: &CanonicalRecord) -> FetchOutcome {
        match self.write_file(record) {
            Ok(path) => {
                debug!(path = %path.display(), "wrote record");
                FetchOutcome::Created
            }
            Err(e) => {
                debug!(record = %record.label(), error = %e, "failed to write record");
                FetchOutcome::Error(e.to_string())
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use chrono::NaiveDate;
    use lexingest_core::{Case, Law, LawBook};
    use serde_json::Value;

    use super::*;

    fn date() -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 1, 1).unwrap()
    }

    fn law(slug: Option<&str>, section: Option<&str>) -> CanonicalRecord {
        CanonicalRecord::Law(Law {
            book_code: "BGB".into(),
            revision_date: date(),
            title: "Beginn der Rechtsfähigkeit".into(),
            section: section.map(Into::into),
            content: Some("<p>Die Rechtsfähigkeit ...</p>".into()),
            slug: slug.map(Into::into),
            order: Some(1),
            amtabk: None,
            kurzue: None,
            doknr: None,
            footnotes: None,
            source: None,
        })
    }

    #[test]
    fn sanitize() {
        assert_eq!(sanitize_filename("I ZR 1/21"), "I_ZR_1_21");
        assert_eq!(sanitize_filename("a///b"), "a_b");
        assert_eq!(sanitize_filename(".hidden"), "hidden");
        assert_eq!(sanitize_filename("///"), "unnamed");
        assert_eq!(sanitize_filename(""), "unnamed");
        assert_eq!(sanitize_filename("../../etc/passwd"), "etc_passwd");
        assert_eq!(sanitize_filename("Urteil-über"), "Urteil-über");
    }

    #[test]
    fn long_names_fit_the_file_name_limit() {
        let stem = sanitize_filename(&"a".repeat(300));
        assert_eq!(stem.len(), MAX_STEM_BYTES);

        // Multi-byte characters are never split.
        let stem = sanitize_filename(&"ü".repeat(200));
        assert!(stem.len() <= MAX_STEM_BYTES);
        assert!(stem.chars().all(|c| c == 'ü'));

        let sink = JsonFileSink::new("/out");
        let path = sink.path_for(&law(Some(&"x".repeat(255)), None));
        let file_name = path.file_name().unwrap().to_str().unwrap();
        assert_eq!(file_name.len(), MAX_STEM_BYTES + ".json".len());
    }

    #[test]
    fn layout_by_kind() {
        let sink = JsonFileSink::new("/out");
        let book = CanonicalRecord::LawBook(LawBook {
            code: "BGB".into(),
            revision_date: date(),
            title: None,
            order: None,
            changelog: None,
            footnotes: None,
            sections: None,
            source: None,
        });
        assert_eq!(sink.path_for(&book), Path::new("/out/law_books/BGB.json"));
        assert_eq!(
            sink.path_for(&law(Some("1"), Some("§ 1"))),
            Path::new("/out/laws/BGB/1.json")
        );
        assert_eq!(
            sink.path_for(&law(None, Some("§ 1"))),
            Path::new("/out/laws/BGB/§_1.json")
        );
        assert_eq!(sink.path_for(&law(None, None)), Path::new("/out/laws/BGB/unknown.json"));
    }

    #[test]
    fn writes_and_overwrites() {
        let dir = tempfile::tempdir().unwrap();
        let mut sink = JsonFileSink::new(dir.path());
        let mut case = Case {
            court_name: "Bundesgerichtshof".into(),
            file_number: "I ZR 1/21".into(),
            date: NaiveDate::from_ymd_opt(2021, 3, 4).unwrap(),
            content: "<p>Tenor und Gründe</p>".into(),
            case_type: None,
            ecli: None,
            title: None,
            summary: None,
            source: None,
        };

        assert_eq!(sink.write(&case.clone().into()), FetchOutcome::Created);
        case.title = Some("Neuer Titel".into());
        assert_eq!(sink.write(&case.into()), FetchOutcome::Created);

        let path = dir.path().join("cases/I_ZR_1_21.json");
        let text = std::fs::read_to_string(path).unwrap();
        let json: Value = serde_json::from_str(&text).unwrap();
        assert_eq!(json["title"], "Neuer Titel");
        assert_eq!(json["date"], "2021-03-04");
        // Non-ASCII is written as-is, not escaped.
        assert!(text.contains("Gründe"));
    }

    #[test]
    fn unwritable_root_is_an_error_outcome() {
        let dir = tempfile::tempdir().unwrap();
        let blocker = dir.path().join("file");
        std::fs::write(&blocker, "x").unwrap();
        let mut sink = JsonFileSink::new(&blocker);
        assert!(matches!(sink.write(&law(Some("1"), None)), FetchOutcome::Error(_)));
    }
}
