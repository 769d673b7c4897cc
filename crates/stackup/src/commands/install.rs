use std::path::Path;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use stackup_plan::{InstallOutcome, InstallPlan, Installer, StepError, SystemRunner};
use stackup_rollback::{InstallationPhase, RollbackCoordinator, RollbackRegistry};
use tracing::warn;

use super::{Completion, start_journal};
use crate::config::Settings;
use crate::error::Result;
use crate::output::{PlainTextFormatter, ReportFormatter};
use crate::unattended::{Environment, decision_provider};

pub(super) fn run(plan_path: &Path, settings: &Settings) -> Result<Completion> {
    let plan = InstallPlan::load(plan_path)?;
    let journal = start_journal(&settings.journal_path)?;

    let interrupted = Arc::new(AtomicBool::new(false));
    let flag = Arc::clone(&interrupted);
    ctrlc::set_handler(move || {
        warn!("interrupt received, stopping after the current step");
        flag.store(true, Ordering::SeqCst);
    })?;

    let coordinator = RollbackCoordinator::with_registry(
        RollbackRegistry::with_journal(journal),
        decision_provider(settings, &Environment::detect()),
    );
    let mut installer =
        Installer::new(SystemRunner::new(), coordinator).with_interrupt_flag(interrupted);

    let formatter = PlainTextFormatter;
    match installer.run(&plan) {
        InstallOutcome::Completed { steps } => {
            println!("Installed '{}' ({steps} steps).", plan.name);
            Ok(Completion::Clean)
        }
        InstallOutcome::RolledBack {
            phase,
            error,
            report,
        } => {
            print_failure(&phase, &error);
            print!("{}", formatter.format_report(&report));
            Ok(Completion::Incomplete)
        }
        InstallOutcome::LeftAsIs {
            phase,
            error,
            pending,
        } => {
            print_failure(&phase, &error);
            print!(
                "{}",
                formatter.format_pending("Left in place, not rolled back", &pending)
            );
            println!(
                "Run `stackup rollback --journal {}` to undo them later.",
                settings.journal_path.display()
            );
            Ok(Completion::Incomplete)
        }
    }
}

fn print_failure(phase: &InstallationPhase, error: &StepError) {
    println!("Step '{phase}' failed: {error}");
}
