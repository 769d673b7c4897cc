use std::path::Path;
use std::rc::Rc;

use stackup_rollback::{
    BoxError, Journal, JournalError, PendingAction, RollbackRegistry, UnwindReport,
};
use tracing::{info, warn};

use crate::plan::UndoAction;
use crate::runner::StepRunner;

/// Result of replaying a journal.
#[derive(Debug)]
pub struct ReplayOutcome {
    pub report: UnwindReport,
    /// Outstanding entries that could not be rebuilt and need manual cleanup.
    pub manual: Vec<PendingAction>,
}

/// Unwind every outstanding registration recorded in the journal at `path`.
///
/// Entries whose recipe is missing or unreadable are not executed; they are
/// returned in [`ReplayOutcome::manual`].
///
/// # Errors
///
/// Returns an error if the journal cannot be read or reopened.
pub fn replay_journal<R>(path: &Path, runner: R) -> Result<ReplayOutcome, JournalError>
where
    R: StepRunner + 'static,
{
    let outstanding = Journal::outstanding_at(path)?;
    info!(path = %path.display(), outstanding = outstanding.len(), "replaying rollback journal");

    let mut registry = RollbackRegistry::with_journal(Journal::append_to(path)?);
    let runner = Rc::new(runner);
    let mut manual = Vec::new();

    for entry in outstanding {
        let Some(recipe) = entry.recipe else {
            manual.push(entry.action);
            continue;
        };
        match serde_json::from_value::<UndoAction>(recipe) {
            Ok(action) => {
                let runner = Rc::clone(&runner);
                registry.reinstate(entry.action, move || {
                    runner.undo(&action).map_err(BoxError::from)
                });
            }
            Err(e) => {
                warn!(sequence = entry.action.sequence, error = %e, "unreadable replay recipe");
                manual.push(entry.action);
            }
        }
    }

    for action in &manual {
        warn!(sequence = action.sequence, "needs manual cleanup: {action}");
    }

    let report = registry.unwind("journal replay");
    Ok(ReplayOutcome { report, manual })
}
