use stackup_plan::{SystemRunner, replay_journal};

use super::Completion;
use crate::config::Settings;
use crate::error::Result;
use crate::output::{PlainTextFormatter, ReportFormatter};

pub(super) fn run(settings: &Settings) -> Result<Completion> {
    let outcome = replay_journal(&settings.journal_path, SystemRunner::new())?;

    let formatter = PlainTextFormatter;
    print!("{}", formatter.format_report(&outcome.report));
    if !outcome.manual.is_empty() {
        print!(
            "{}",
            formatter.format_pending("Needs manual cleanup", &outcome.manual)
        );
        return Ok(Completion::Incomplete);
    }
    Ok(Completion::from_report(&outcome.report))
}
