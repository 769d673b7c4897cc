use std::path::PathBuf;
use std::process::ExitStatus;

use thiserror::Error;

/// A forward or compensating action failed.
#[derive(Debug, Error)]
pub enum StepError {
    #[error("failed to start `{program}`")]
    Spawn {
        program: String,
        #[source]
        source: std::io::Error,
    },

    #[error("`{program}` exited unsuccessfully ({status}){}", stderr_suffix(.stderr))]
    CommandFailed {
        program: String,
        status: ExitStatus,
        stderr: String,
    },

    #[error("failed to {operation} '{path}'")]
    Io {
        operation: &'static str,
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("interrupted by operator")]
    Interrupted,
}

fn stderr_suffix(stderr: &str) -> String {
    let last = stderr.lines().rev().find(|line| !line.trim().is_empty());
    match last {
        Some(line) => format!(": {}", line.trim()),
        None => String::new(),
    }
}

/// A plan file could not be loaded.
#[derive(Debug, Error)]
pub enum PlanError {
    #[error("failed to read plan at '{path}'")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse plan at '{path}'")]
    Parse {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },

    #[error("plan '{0}' has no steps")]
    Empty(String),

    #[error("step {index} has an empty name")]
    EmptyStepName { index: usize },

    #[error("step name '{0}' is used more than once")]
    DuplicateStep(String),

    #[error("step '{0}' has a command with an empty program")]
    EmptyProgram(String),
}
