use std::path::PathBuf;

use lexingest_net::TransportError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum SinkError {
    #[error(transparent)]
    Transport(#[from] TransportError),

    #[error("cannot write {path}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("JSON serialisation error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("{0}")]
    Config(String),
}
