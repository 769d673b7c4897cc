use std::path::Path;

use stackup_plan::{InstallPlan, Installer, SystemRunner};
use stackup_rollback::{FixedDecision, RollbackCoordinator, RollbackRegistry};

use super::{Completion, start_journal};
use crate::config::Settings;
use crate::error::Result;
use crate::output::{PlainTextFormatter, ReportFormatter};

pub(super) fn run(plan_path: &Path, settings: &Settings) -> Result<Completion> {
    let plan = InstallPlan::load(plan_path)?;
    let journal = start_journal(&settings.journal_path)?;

    let coordinator = RollbackCoordinator::with_registry(
        RollbackRegistry::with_journal(journal),
        FixedDecision::default(),
    );
    let mut installer = Installer::new(SystemRunner::new(), coordinator);

    let report = installer.uninstall(&plan);
    print!("{}", PlainTextFormatter.format_report(&report));
    Ok(Completion::from_report(&report))
}
