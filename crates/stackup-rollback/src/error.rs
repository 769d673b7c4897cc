use std::path::PathBuf;

use thiserror::Error;

/// Error type returned by compensating operations.
pub type BoxError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// Error from a decision provider that could not produce a decision.
#[derive(Debug, Error)]
pub enum DecisionError {
    #[error("failed to prompt the operator")]
    Prompt(#[source] std::io::Error),

    #[error("decision prompt requires a terminal")]
    NotATty,
}

/// Error reading or writing the registration journal.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum JournalError {
    #[error("failed to open journal at '{path}'")]
    Open {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to write journal at '{path}'")]
    Write {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to read journal at '{path}'")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to serialize journal entry")]
    Serialize(#[source] serde_json::Error),

    #[error("malformed journal entry at '{path}' line {line}")]
    Parse {
        path: PathBuf,
        line: usize,
        #[source]
        source: serde_json::Error,
    },
}
