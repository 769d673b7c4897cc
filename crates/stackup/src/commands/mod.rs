mod install;
mod rollback;
mod status;
mod uninstall;

use std::path::{Path, PathBuf};
use std::process::ExitCode;

use clap::{Args, Subcommand};
use stackup_rollback::{Journal, UnwindReport};

use crate::config::{OnFailure, Settings};
use crate::error::{CliError, Result};

#[derive(Subcommand)]
pub(crate) enum Commands {
    /// Run an installation plan, rolling back on failure
    Install(InstallArgs),
    /// Undo every step of an installation plan
    Uninstall(UninstallArgs),
    /// Run the undo actions still outstanding in the journal
    Rollback(JournalArgs),
    /// List the undo actions still outstanding in the journal
    Status(JournalArgs),
}

#[derive(Args)]
pub(crate) struct JournalArgs {
    /// Registration journal (default: from config, then /var/lib/stackup/journal.jsonl)
    #[arg(long)]
    journal: Option<PathBuf>,
}

#[derive(Args)]
pub(crate) struct InstallArgs {
    /// Plan file to run
    plan: PathBuf,

    /// Never prompt; apply --on-failure when a step fails
    #[arg(long)]
    unattended: bool,

    /// What to do when a step fails in unattended mode
    #[arg(long, value_enum)]
    on_failure: Option<OnFailure>,

    #[command(flatten)]
    journal: JournalArgs,
}

#[derive(Args)]
pub(crate) struct UninstallArgs {
    /// Plan file whose steps are undone
    plan: PathBuf,

    #[command(flatten)]
    journal: JournalArgs,
}

/// How a command that ran to the end finished.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Completion {
    Clean,
    Incomplete,
}

impl Completion {
    pub(crate) fn from_report(report: &UnwindReport) -> Self {
        if report.failure_count() == 0 {
            Self::Clean
        } else {
            Self::Incomplete
        }
    }

    pub(crate) fn exit_code(self) -> ExitCode {
        match self {
            Self::Clean => ExitCode::SUCCESS,
            Self::Incomplete => ExitCode::FAILURE,
        }
    }
}

/// Start a fresh journal for a new run.
///
/// Refuses while an earlier run still has outstanding undo actions, since
/// starting over would discard them.
fn start_journal(path: &Path) -> Result<Journal> {
    let outstanding = Journal::outstanding_at(path)?;
    if !outstanding.is_empty() {
        return Err(CliError::OutstandingJournal {
            path: path.to_path_buf(),
            count: outstanding.len(),
        });
    }
    Ok(Journal::create(path)?)
}

impl Commands {
    pub(crate) fn execute(self, settings: &Settings) -> Result<Completion> {
        match self {
            Self::Install(args) => {
                let settings = settings.clone().with_overrides(
                    args.journal.journal,
                    args.on_failure,
                    args.unattended,
                );
                install::run(&args.plan, &settings)
            }
            Self::Uninstall(args) => {
                let settings = settings.clone().with_overrides(args.journal.journal, None, false);
                uninstall::run(&args.plan, &settings)
            }
            Self::Rollback(args) => {
                let settings = settings.clone().with_overrides(args.journal, None, false);
                rollback::run(&settings)
            }
            Self::Status(args) => {
                let settings = settings.clone().with_overrides(args.journal, None, false);
                status::run(&settings)
            }
        }
    }
}
