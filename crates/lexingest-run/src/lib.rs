//! Run orchestration: record outcomes of one ingestion run, persist the
//! result, report source health across runs, and analyse court names the
//! destination could not resolve.

pub mod courts;
pub mod ingest;
pub mod recorder;
pub mod results;
pub mod status;

pub use courts::{
    CourtRecord, MissingCourt, StateRecord, analyze_missing_courts, extract_location,
    extract_type_code, fetch_court_data, parse_missing_courts,
};
pub use ingest::{ingest_cases, ingest_laws};
pub use recorder::{RunRecorder, execute};
pub use results::{ResultStore, ResultStoreError};
pub use status::{
    DEFAULT_STALE_HOURS, SourceHealth, StatusReport, StatusReporter, format_duration,
};
