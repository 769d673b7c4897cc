use tracing::{error, warn};

use crate::action::{PendingAction, Priority};
use crate::decision::{Decision, DecisionProvider, InstallationPhase};
use crate::error::BoxError;
use crate::registry::RollbackRegistry;
use crate::report::UnwindReport;

/// Lifecycle of a coordinator within one installation run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CoordinatorState {
    Idle,
    Registering,
    AwaitingDecision,
    Unwinding,
    Drained,
    Abandoned,
}

impl CoordinatorState {
    #[must_use]
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Drained | Self::Abandoned)
    }
}

/// What happened after a fatal error was handled.
#[derive(Debug)]
pub enum FailureOutcome {
    /// The registry was unwound.
    Unwound(UnwindReport),
    /// The operator chose to leave the system as-is; these were not undone.
    Abandoned(Vec<PendingAction>),
}

/// Owns the registry and the decision provider for one installation run.
pub struct RollbackCoordinator<D> {
    registry: RollbackRegistry,
    decider: D,
    state: CoordinatorState,
}

impl<D: DecisionProvider> RollbackCoordinator<D> {
    #[must_use]
    pub fn new(decider: D) -> Self {
        Self::with_registry(RollbackRegistry::new(), decider)
    }

    #[must_use]
    pub fn with_registry(registry: RollbackRegistry, decider: D) -> Self {
        let state = if registry.is_empty() {
            CoordinatorState::Idle
        } else {
            CoordinatorState::Registering
        };
        Self {
            registry,
            decider,
            state,
        }
    }

    #[must_use]
    pub fn state(&self) -> CoordinatorState {
        self.state
    }

    #[must_use]
    pub fn registry(&self) -> &RollbackRegistry {
        &self.registry
    }

    /// Record a compensating action. See [`RollbackRegistry::register`].
    pub fn register<F>(
        &mut self,
        description: impl Into<String>,
        priority: Priority,
        operation: F,
    ) -> u64
    where
        F: FnOnce() -> Result<(), BoxError> + 'static,
    {
        self.before_register();
        self.registry.register(description, priority, operation)
    }

    /// Record a compensating action with a journal replay recipe.
    pub fn register_with_recipe<F>(
        &mut self,
        description: impl Into<String>,
        priority: Priority,
        recipe: serde_json::Value,
        operation: F,
    ) -> u64
    where
        F: FnOnce() -> Result<(), BoxError> + 'static,
    {
        self.before_register();
        self.registry
            .register_with_recipe(description, priority, recipe, operation)
    }

    fn before_register(&mut self) {
        match self.state {
            CoordinatorState::Idle => self.state = CoordinatorState::Registering,
            state if state.is_terminal() => {
                warn!(?state, "registering after the run finished; action only runs on an explicit unwind");
            }
            _ => {}
        }
    }

    /// Ask the decision provider whether to unwind after `error` in `phase`.
    ///
    /// Does not unwind. A provider failure falls back to [`Decision::Unwind`].
    pub fn decide_on_failure(
        &mut self,
        phase: &InstallationPhase,
        error: &(dyn std::error::Error + 'static),
    ) -> Decision {
        self.state = CoordinatorState::AwaitingDecision;
        error!(phase = %phase, error = %error, "installation step failed");

        match self.decider.decide(phase, error) {
            Ok(decision) => decision,
            Err(e) => {
                warn!(error = %e, "could not obtain a decision, rolling back");
                Decision::Unwind
            }
        }
    }

    /// Run every registered action. See [`RollbackRegistry::unwind`].
    pub fn unwind(&mut self, reason: &str) -> UnwindReport {
        self.state = CoordinatorState::Unwinding;
        let report = self.registry.unwind(reason);
        self.state = CoordinatorState::Drained;
        report
    }

    /// Leave everything in place. See [`RollbackRegistry::abandon`].
    pub fn abandon(&mut self) -> Vec<PendingAction> {
        let left = self.registry.abandon();
        self.state = CoordinatorState::Abandoned;
        left
    }

    /// Record that the run finished. See [`RollbackRegistry::commit`].
    pub fn commit(&mut self) {
        self.registry.commit();
    }

    /// Decide and then either unwind or abandon.
    pub fn handle_failure(
        &mut self,
        phase: &InstallationPhase,
        error: &(dyn std::error::Error + 'static),
    ) -> FailureOutcome {
        match self.decide_on_failure(phase, error) {
            Decision::Unwind => {
                let reason = format!("{phase} failed");
                FailureOutcome::Unwound(self.unwind(&reason))
            }
            Decision::LeaveAsIs => FailureOutcome::Abandoned(self.abandon()),
        }
    }
}

impl<D> std::fmt::Debug for RollbackCoordinator<D> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RollbackCoordinator")
            .field("registry", &self.registry)
            .field("state", &self.state)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use std::cell::Cell;
    use std::rc::Rc;

    use super::*;
    use crate::decision::FixedDecision;
    use crate::error::DecisionError;

    struct BrokenPrompt;

    impl DecisionProvider for BrokenPrompt {
        fn decide(
            &self,
            _phase: &InstallationPhase,
            _error: &(dyn std::error::Error + 'static),
        ) -> Result<Decision, DecisionError> {
            Err(DecisionError::NotATty)
        }
    }

    fn step_error() -> std::io::Error {
        std::io::Error::other("apt-get exited with status 100")
    }

    #[test]
    fn starts_idle_and_moves_to_registering() {
        let mut coordinator = RollbackCoordinator::new(FixedDecision::default());
        assert_eq!(coordinator.state(), CoordinatorState::Idle);

        coordinator.register("remove temp", Priority::Cleanup, || Ok(()));

        assert_eq!(coordinator.state(), CoordinatorState::Registering);
    }

    #[test]
    fn decide_on_failure_does_not_unwind() {
        let ran = Rc::new(Cell::new(false));
        let mut coordinator = RollbackCoordinator::new(FixedDecision(Decision::Unwind));
        let flag = Rc::clone(&ran);
        coordinator.register("undo", Priority::Normal, move || {
            flag.set(true);
            Ok(())
        });

        let decision = coordinator.decide_on_failure(&"Docker Installation".into(), &step_error());

        assert_eq!(decision, Decision::Unwind);
        assert!(!ran.get());
        assert_eq!(coordinator.state(), CoordinatorState::AwaitingDecision);
        assert_eq!(coordinator.registry().len(), 1);
    }

    #[test]
    fn provider_failure_falls_back_to_unwind() {
        let mut coordinator = RollbackCoordinator::new(BrokenPrompt);

        let decision = coordinator.decide_on_failure(&"Nginx Setup".into(), &step_error());

        assert_eq!(decision, Decision::Unwind);
    }

    #[test]
    fn handle_failure_unwinds_to_drained() {
        let mut coordinator = RollbackCoordinator::new(FixedDecision(Decision::Unwind));
        coordinator.register("undo", Priority::Critical, || Ok(()));

        let outcome = coordinator.handle_failure(&"Firewall".into(), &step_error());

        match outcome {
            FailureOutcome::Unwound(report) => {
                assert_eq!(report.attempted(), 1);
                assert_eq!(report.reason(), "Firewall failed");
            }
            FailureOutcome::Abandoned(_) => panic!("expected unwind"),
        }
        assert_eq!(coordinator.state(), CoordinatorState::Drained);
    }

    #[test]
    fn handle_failure_leave_as_is_abandons() {
        let mut coordinator = RollbackCoordinator::new(FixedDecision(Decision::LeaveAsIs));
        coordinator.register("stop xray", Priority::Normal, || Ok(()));

        let outcome = coordinator.handle_failure(&"Xray".into(), &step_error());

        match outcome {
            FailureOutcome::Abandoned(left) => {
                assert_eq!(left.len(), 1);
                assert_eq!(left[0].description, "stop xray");
            }
            FailureOutcome::Unwound(_) => panic!("expected abandonment"),
        }
        assert_eq!(coordinator.state(), CoordinatorState::Abandoned);
        assert!(coordinator.registry().is_empty());
    }

    #[test]
    fn registration_after_terminal_state_is_kept() {
        let mut coordinator = RollbackCoordinator::new(FixedDecision::default());
        coordinator.unwind("uninstall");

        coordinator.register("late", Priority::Normal, || Ok(()));

        assert_eq!(coordinator.state(), CoordinatorState::Drained);
        assert_eq!(coordinator.registry().len(), 1);
    }
}
