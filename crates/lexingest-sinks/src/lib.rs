//! Delivery sinks: where canonical records end up.
//!
//! A sink never fails a run by itself. Every write resolves to a
//! [`FetchOutcome`], with destination conflicts reported as
//! [`FetchOutcome::SkippedDuplicate`] rather than as errors.

use std::path::PathBuf;

use lexingest_core::{CanonicalRecord, FetchOutcome};

mod api;
mod client;
mod error;
mod json_file;

pub use api::{ApiSink, endpoint, error_detail};
pub use client::{ApiSettings, DestinationClient};
pub use error::SinkError;
pub use json_file::{JsonFileSink, MAX_STEM_BYTES, sanitize_filename};

pub trait Sink {
    /// Short identifier for logs.
    fn name(&self) -> &'static str;

    fn write(&mut self, record: &CanonicalRecord) -> FetchOutcome;
}

impl<S: Sink + ?Sized> Sink for Box<S> {
    fn name(&self) -> &'static str {
        (**self).name()
    }

    fn write(&mut self, record: &CanonicalRecord) -> FetchOutcome {
        (**self).write(record)
    }
}

/// Which sink a run delivers to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SinkTarget {
    Api(ApiSettings),
    JsonFile { output_dir: Option<PathBuf> },
}

/// Build the sink for `target`. The API sink opens its session here, once
/// per run.
pub fn open_sink(target: &SinkTarget) -> Result<Box<dyn Sink>, SinkError> {
    match target {
        SinkTarget::Api(settings) => {
            let client = DestinationClient::connect(settings)?;
            Ok(Box::new(ApiSink::new(client)))
        }
        SinkTarget::JsonFile { output_dir } => match output_dir {
            Some(dir) => Ok(Box::new(JsonFileSink::new(dir))),
            None => Err(SinkError::Config(
                "--output-dir is required when using --sink json-file".into(),
            )),
        },
    }
}
