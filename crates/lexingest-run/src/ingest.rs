//! Drivers moving records from a source through normalization into a sink.

use lexingest_core::{
    CanonicalRecord, FetchOutcome, FieldMap, Normalizer, RawRecord, RecordKind,
};
use lexingest_sinks::Sink;
use lexingest_sources::{CaseLawSource, LegislationSource, SourceError};
use tracing::{debug, info};

use crate::recorder::RunRecorder;

/// Normalize one raw record and hand it to the sink. Invalid records are
/// tallied as skipped and never reach the sink.
fn deliver(
    kind: RecordKind,
    raw: &RawRecord,
    map: &FieldMap,
    normalizer: &Normalizer,
    sink: &mut dyn Sink,
    recorder: &mut RunRecorder,
) -> FetchOutcome {
    match normalizer.normalize(kind, raw, map) {
        Ok(record) => {
            let outcome = sink.write(&record);
            recorder.record(&record.label(), &outcome);
            outcome
        }
        Err(rejection) => {
            debug!(kind = kind.as_str(), %rejection, "skipping invalid record");
            recorder.record(kind.as_str(), &FetchOutcome::SkippedInvalid);
            FetchOutcome::SkippedInvalid
        }
    }
}

/// Deliver up to `limit` cases. A failed page fetch aborts with an error;
/// per-record failures are only tallied.
pub fn ingest_cases(
    source: &dyn CaseLawSource,
    normalizer: &Normalizer,
    sink: &mut dyn Sink,
    limit: Option<usize>,
    recorder: &mut RunRecorder,
) -> Result<(), SourceError> {
    let map = source.case_fields();
    info!(source = %source.source().name, sink = sink.name(), ?limit, "ingesting cases");
    for raw in source.list_cases().take(limit.unwrap_or(usize::MAX)) {
        deliver(RecordKind::Case, &raw?, &map, normalizer, sink, recorder);
    }
    Ok(())
}

/// Deliver up to `limit` law books, each followed by its articles.
///
/// A book that is not newly created (duplicate, invalid or failed) is not
/// descended into: its articles are neither fetched nor tallied.
pub fn ingest_laws(
    source: &dyn LegislationSource,
    normalizer: &Normalizer,
    sink: &mut dyn Sink,
    limit: Option<usize>,
    recorder: &mut RunRecorder,
) -> Result<(), SourceError> {
    let work_map = source.work_fields();
    let article_map = source.article_fields();
    info!(source = %source.source().name, sink = sink.name(), ?limit, "ingesting law books");

    for raw in source.list_works().take(limit.unwrap_or(usize::MAX)) {
        let raw = raw?;
        let book = match normalizer.law_book(&raw, &work_map) {
            Ok(book) => book,
            Err(rejection) => {
                debug!(%rejection, "skipping invalid law book");
                recorder.record("law_book", &FetchOutcome::SkippedInvalid);
                continue;
            }
        };
        let record = CanonicalRecord::LawBook(book.clone());
        let label = record.label();
        let outcome = sink.write(&record);
        recorder.record(&label, &outcome);
        if outcome != FetchOutcome::Created {
            info!(book = %label, outcome = outcome.as_str(), "not ingesting articles");
            continue;
        }

        let before = recorder.tally();
        for article in source.list_articles(&book) {
            deliver(RecordKind::Law, &article?, &article_map, normalizer, sink, recorder);
        }
        let after = recorder.tally();
        info!(
            book = %label,
            created = after.created - before.created,
            skipped = after.skipped - before.skipped,
            errors = after.errors - before.errors,
            "ingested articles"
        );
    }
    Ok(())
}
