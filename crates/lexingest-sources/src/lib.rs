//! Source adapters: everything that turns a remote (or local) legal-data
//! provider into a lazy stream of [`RawRecord`]s.
//!
//! Adapters own a [`PacedTransport`](lexingest_net::PacedTransport) rather
//! than inheriting from a shared base; the registry in [`registry`] maps
//! provider names to constructors.

use std::path::PathBuf;

use chrono::NaiveDate;
use lexingest_core::{FieldMap, LawBook, RawRecord, Source};
use lexingest_net::{TransportConfig, TransportError};

pub mod fixture;
pub mod registry;
pub mod ris;

pub use fixture::{Fixture, FixtureCaseSource, FixtureLawSource};
pub use registry::SourceRegistry;
pub use ris::{RisCaseSource, RisLawSource};

/// Errors raised while enumerating a source.
#[derive(Debug, thiserror::Error)]
pub enum SourceError {
    #[error(transparent)]
    Transport(#[from] TransportError),

    #[error("cannot read fixture {path}: {source}")]
    Fixture {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("invalid JSON: {0}")]
    Json(#[from] serde_json::Error),

    #[error("unknown {command} provider '{name}' (available: {available})")]
    UnknownProvider {
        command: &'static str,
        name: String,
        available: String,
    },

    #[error("configuration error: {0}")]
    Config(String),
}

/// Lazy stream of raw records. An `Err` item is fatal for the run.
pub type RecordStream<'a> = Box<dyn Iterator<Item = Result<RawRecord, SourceError>> + 'a>;

/// Provider of law books and their articles.
pub trait LegislationSource {
    /// Attribution stamped onto every emitted record.
    fn source(&self) -> &Source;

    /// Field map for law-book records. Defaults to canonical names only.
    fn work_fields(&self) -> FieldMap {
        FieldMap::new()
    }

    /// Field map for article records.
    fn article_fields(&self) -> FieldMap {
        FieldMap::new()
    }

    fn list_works(&self) -> RecordStream<'_>;

    /// Articles of a book previously yielded by [`list_works`](Self::list_works).
    fn list_articles(&self, book: &LawBook) -> RecordStream<'_>;
}

/// Provider of court decisions.
pub trait CaseLawSource {
    fn source(&self) -> &Source;

    fn case_fields(&self) -> FieldMap {
        FieldMap::new()
    }

    fn list_cases(&self) -> RecordStream<'_>;
}

/// Options shared by every adapter constructor. Adapters ignore what they
/// do not understand.
#[derive(Debug, Clone, Default)]
pub struct SourceOptions {
    /// Local fixture file (fixture providers).
    pub path: Option<PathBuf>,
    /// Court type filter (case providers).
    pub court: Option<String>,
    /// Free-text filter (legislation providers).
    pub search_term: Option<String>,
    pub date_from: Option<NaiveDate>,
    pub date_to: Option<NaiveDate>,
    pub transport: TransportConfig,
}

/// Stream yielding a single error, for adapters that fail before the first page.
pub(crate) fn failed_stream<'a>(err: SourceError) -> RecordStream<'a> {
    Box::new(std::iter::once(Err(err)))
}
