use std::cmp::Reverse;

use stackup_rollback::{Journal, PendingAction};

use super::Completion;
use crate::config::Settings;
use crate::error::Result;
use crate::output::{PlainTextFormatter, ReportFormatter};

pub(super) fn run(settings: &Settings) -> Result<Completion> {
    let entries = Journal::outstanding_at(&settings.journal_path)?;
    let manual = entries.iter().filter(|e| e.recipe.is_none()).count();

    let mut pending: Vec<PendingAction> = entries.into_iter().map(|e| e.action).collect();
    sort_in_unwind_order(&mut pending);

    println!("Journal: {}", settings.journal_path.display());
    print!(
        "{}",
        PlainTextFormatter.format_pending("Outstanding undo actions", &pending)
    );
    if manual > 0 {
        println!("{manual} of them cannot be replayed and need manual cleanup.");
    }
    Ok(Completion::Clean)
}

fn sort_in_unwind_order(pending: &mut [PendingAction]) {
    pending.sort_by_key(|action| (action.priority, Reverse(action.sequence)));
}
