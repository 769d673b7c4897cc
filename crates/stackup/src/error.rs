use std::path::PathBuf;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum CliError {
    #[error("failed to read config file '{path}'")]
    ConfigRead {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid config file '{path}'")]
    ConfigParse {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },

    #[error("plan error")]
    Plan(#[from] stackup_plan::PlanError),

    #[error("journal error")]
    Journal(#[from] stackup_rollback::JournalError),

    #[error(
        "journal '{path}' still has {count} outstanding undo action(s) from an earlier run; \
         run `stackup rollback` first"
    )]
    OutstandingJournal { path: PathBuf, count: usize },

    #[error("failed to install interrupt handler")]
    InterruptHandler(#[from] ctrlc::Error),
}

pub type Result<T> = std::result::Result<T, CliError>;
