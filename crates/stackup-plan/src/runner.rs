use std::fs;
use std::io::ErrorKind;
use std::path::Path;
use std::process::Command;
use std::thread;
use std::time::Duration;

use tracing::{debug, info, warn};

use crate::error::StepError;
use crate::plan::{CommandSpec, ForwardAction, UndoAction, backup_path};

/// Performs system-mutating actions on behalf of the installer.
pub trait StepRunner {
    /// # Errors
    ///
    /// Returns an error if the forward action failed.
    fn perform(&self, action: &ForwardAction) -> Result<(), StepError>;

    /// # Errors
    ///
    /// Returns an error if the compensating action failed.
    fn undo(&self, action: &UndoAction) -> Result<(), StepError>;
}

/// Runs actions against the local system.
#[derive(Debug, Default)]
pub struct SystemRunner;

impl SystemRunner {
    #[must_use]
    pub fn new() -> Self {
        Self
    }
}

impl StepRunner for SystemRunner {
    fn perform(&self, action: &ForwardAction) -> Result<(), StepError> {
        match action {
            ForwardAction::Command(spec) => run_with_retries(spec),
            ForwardAction::WriteFile {
                path,
                contents,
                backup,
            } => write_file(path, contents, *backup),
            ForwardAction::CreateDir { path } => {
                debug!(path = %path.display(), "creating directory");
                fs::create_dir_all(path).map_err(|source| io_error("create", path, source))
            }
        }
    }

    fn undo(&self, action: &UndoAction) -> Result<(), StepError> {
        match action {
            UndoAction::Command(spec) => run_with_retries(spec),
            UndoAction::RemoveFile { path } => remove_file_if_present(path),
            UndoAction::RemoveDir { path } => match fs::remove_dir_all(path) {
                Err(e) if e.kind() != ErrorKind::NotFound => Err(io_error("remove", path, e)),
                _ => Ok(()),
            },
            UndoAction::RestoreFile { backup, path } => {
                if backup.exists() {
                    fs::rename(backup, path).map_err(|source| io_error("restore", path, source))
                } else {
                    remove_file_if_present(path)
                }
            }
        }
    }
}

fn run_with_retries(spec: &CommandSpec) -> Result<(), StepError> {
    let mut attempt = 0;
    loop {
        match run_once(spec) {
            Ok(()) => return Ok(()),
            Err(e) if attempt < spec.retries => {
                attempt += 1;
                warn!(
                    command = %spec.display(),
                    attempt,
                    retries = spec.retries,
                    error = %e,
                    "command failed, retrying in {}s",
                    spec.retry_delay_secs
                );
                thread::sleep(Duration::from_secs(spec.retry_delay_secs));
            }
            Err(e) => return Err(e),
        }
    }
}

fn run_once(spec: &CommandSpec) -> Result<(), StepError> {
    debug!(command = %spec.display(), "running command");

    let output = Command::new(&spec.program)
        .args(&spec.args)
        .envs(&spec.env)
        .output()
        .map_err(|source| StepError::Spawn {
            program: spec.program.clone(),
            source,
        })?;

    if output.status.success() {
        return Ok(());
    }
    Err(StepError::CommandFailed {
        program: spec.program.clone(),
        status: output.status,
        stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
    })
}

fn write_file(path: &Path, contents: &str, backup: bool) -> Result<(), StepError> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent).map_err(|source| io_error("create", parent, source))?;
    }

    if backup {
        let copy = backup_path(path);
        if path.exists() {
            fs::copy(path, &copy).map_err(|source| io_error("back up", path, source))?;
            info!(path = %path.display(), backup = %copy.display(), "saved backup");
        } else {
            // a stale copy from an earlier run must not be restored over a new file
            remove_file_if_present(&copy)?;
        }
    }

    debug!(path = %path.display(), bytes = contents.len(), "writing file");
    fs::write(path, contents).map_err(|source| io_error("write", path, source))
}

fn remove_file_if_present(path: &Path) -> Result<(), StepError> {
    match fs::remove_file(path) {
        Err(e) if e.kind() != ErrorKind::NotFound => Err(io_error("remove", path, e)),
        _ => Ok(()),
    }
}

fn io_error(operation: &'static str, path: &Path, source: std::io::Error) -> StepError {
    StepError::Io {
        operation,
        path: path.to_path_buf(),
        source,
    }
}
