use std::rc::Rc;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use stackup_rollback::{
    BoxError, DecisionProvider, FailureOutcome, InstallationPhase, PendingAction,
    RollbackCoordinator, UnwindReport,
};
use tracing::{info, warn};

use crate::error::StepError;
use crate::plan::{InstallPlan, StepSpec, UndoSpec};
use crate::runner::StepRunner;

/// Result of running a plan.
#[derive(Debug)]
pub enum InstallOutcome {
    /// Every step succeeded.
    Completed { steps: usize },
    /// A step failed and the registered actions were unwound.
    RolledBack {
        phase: InstallationPhase,
        error: StepError,
        report: UnwindReport,
    },
    /// A step failed and the operator kept the partial installation.
    LeftAsIs {
        phase: InstallationPhase,
        error: StepError,
        pending: Vec<PendingAction>,
    },
}

impl InstallOutcome {
    #[must_use]
    pub fn is_completed(&self) -> bool {
        matches!(self, Self::Completed { .. })
    }
}

/// Runs plan steps one at a time, registering each step's compensation.
pub struct Installer<R, D> {
    runner: Rc<R>,
    coordinator: RollbackCoordinator<D>,
    interrupted: Arc<AtomicBool>,
}

impl<R, D> Installer<R, D>
where
    R: StepRunner + 'static,
    D: DecisionProvider,
{
    #[must_use]
    pub fn new(runner: R, coordinator: RollbackCoordinator<D>) -> Self {
        Self {
            runner: Rc::new(runner),
            coordinator,
            interrupted: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Share an interrupt flag with a signal handler.
    ///
    /// A set flag fails the running step with [`StepError::Interrupted`].
    #[must_use]
    pub fn with_interrupt_flag(mut self, flag: Arc<AtomicBool>) -> Self {
        self.interrupted = flag;
        self
    }

    #[must_use]
    pub fn coordinator(&self) -> &RollbackCoordinator<D> {
        &self.coordinator
    }

    /// Run every step in order.
    ///
    /// The interrupt flag is checked before and after each step. An
    /// interrupt after a step succeeded fails that step's phase once its
    /// compensation is registered, so the step is covered by the unwind.
    pub fn run(&mut self, plan: &InstallPlan) -> InstallOutcome {
        let total = plan.steps.len();
        info!(plan = %plan.name, steps = total, "starting installation");

        for (index, step) in plan.steps.iter().enumerate() {
            let phase = InstallationPhase::new(&step.name);
            info!(step = index + 1, total, "{phase}");

            let result = if self.is_interrupted() {
                Err(StepError::Interrupted)
            } else {
                self.runner.perform(&step.action)
            };
            if let Err(error) = result {
                return self.fail(phase, error);
            }

            if let Some(undo) = step.compensation() {
                self.register(step, undo);
            }

            if self.is_interrupted() {
                warn!(phase = %phase, "interrupted while the step was running");
                return self.fail(phase, StepError::Interrupted);
            }
        }

        self.coordinator.commit();
        info!(plan = %plan.name, steps = total, "installation complete");
        InstallOutcome::Completed { steps: total }
    }

    fn is_interrupted(&self) -> bool {
        self.interrupted.load(Ordering::SeqCst)
    }

    fn fail(&mut self, phase: InstallationPhase, error: StepError) -> InstallOutcome {
        match self.coordinator.handle_failure(&phase, &error) {
            FailureOutcome::Unwound(report) => InstallOutcome::RolledBack {
                phase,
                error,
                report,
            },
            FailureOutcome::Abandoned(pending) => InstallOutcome::LeftAsIs {
                phase,
                error,
                pending,
            },
        }
    }

    /// Register every step's compensation and unwind them all.
    pub fn uninstall(&mut self, plan: &InstallPlan) -> UnwindReport {
        info!(plan = %plan.name, "uninstalling");
        for step in &plan.steps {
            if let Some(undo) = step.compensation() {
                self.register(step, undo);
            }
        }
        self.coordinator.unwind("uninstall")
    }

    fn register(&mut self, step: &StepSpec, undo: UndoSpec) {
        let description = step.compensation_description(&undo);
        let runner = Rc::clone(&self.runner);
        let action = undo.action.clone();
        let operation = move || runner.undo(&action).map_err(BoxError::from);

        match serde_json::to_value(&undo.action) {
            Ok(recipe) => {
                self.coordinator
                    .register_with_recipe(description, undo.priority, recipe, operation);
            }
            Err(e) => {
                warn!(step = %step.name, error = %e, "undo action cannot be journaled for replay");
                self.coordinator
                    .register(description, undo.priority, operation);
            }
        }
    }
}
