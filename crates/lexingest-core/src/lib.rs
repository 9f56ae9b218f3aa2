//! Core types shared across lexingest: canonical records, normalization, run results.

pub mod normalize;
pub mod record;
pub mod run;

pub use normalize::{FieldMap, NormalizeConfig, Normalizer, Rejection};
pub use record::{Case, CanonicalRecord, Law, LawBook, RawRecord, RecordKind, Source};
pub use run::{Command, FetchOutcome, RunResult, RunStatus, Tally};
