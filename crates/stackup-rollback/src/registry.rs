use std::any::Any;
use std::panic::{self, AssertUnwindSafe};
use std::time::Instant;

use chrono::Utc;
use tracing::{debug, error, info, warn};

use crate::action::{CompensatingAction, Operation, PendingAction, Priority};
use crate::error::BoxError;
use crate::journal::{Journal, JournalEntry};
use crate::report::{ActionRecord, UnwindReport};

/// Registered compensating actions for one installation run.
///
/// Actions are kept in one list per priority class. [`unwind`](Self::unwind)
/// runs `Cleanup`, then `Normal`, then `Critical`, each class in reverse
/// registration order, and leaves the registry empty.
#[derive(Default)]
pub struct RollbackRegistry {
    cleanup: Vec<CompensatingAction>,
    normal: Vec<CompensatingAction>,
    critical: Vec<CompensatingAction>,
    next_sequence: u64,
    journal: Option<Journal>,
}

impl RollbackRegistry {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a registry that mirrors every registration to `journal`.
    #[must_use]
    pub fn with_journal(journal: Journal) -> Self {
        Self {
            next_sequence: journal.next_sequence(),
            journal: Some(journal),
            ..Self::default()
        }
    }

    #[must_use]
    pub fn journal(&self) -> Option<&Journal> {
        self.journal.as_ref()
    }

    /// Record a compensating action. The operation is not invoked.
    ///
    /// Returns the sequence number assigned to the action.
    pub fn register<F>(
        &mut self,
        description: impl Into<String>,
        priority: Priority,
        operation: F,
    ) -> u64
    where
        F: FnOnce() -> Result<(), BoxError> + 'static,
    {
        self.insert(description.into(), priority, None, Box::new(operation))
    }

    /// Record a compensating action together with a replay recipe.
    ///
    /// The recipe is opaque to the registry and only written to the journal.
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
        self.insert(
            description.into(),
            priority,
            Some(recipe),
            Box::new(operation),
        )
    }

    /// Re-register an action read back from a journal, keeping its sequence.
    ///
    /// Callers must reinstate actions in ascending sequence order.
    pub fn reinstate<F>(&mut self, pending: PendingAction, operation: F)
    where
        F: FnOnce() -> Result<(), BoxError> + 'static,
    {
        self.next_sequence = self.next_sequence.max(pending.sequence + 1);
        debug!(
            sequence = pending.sequence,
            priority = %pending.priority,
            description = %pending.description,
            "reinstated compensating action"
        );
        let action = CompensatingAction::new(
            pending.description,
            pending.priority,
            pending.sequence,
            Box::new(operation),
        );
        self.class_mut(action.priority()).push(action);
    }

    fn insert(
        &mut self,
        description: String,
        priority: Priority,
        recipe: Option<serde_json::Value>,
        operation: Operation,
    ) -> u64 {
        let sequence = self.next_sequence;
        self.next_sequence += 1;

        self.record(&JournalEntry::Registered {
            sequence,
            priority,
            description: description.clone(),
            recipe,
            at: Utc::now(),
        });
        debug!(sequence, priority = %priority, description = %description, "registered compensating action");

        self.class_mut(priority).push(CompensatingAction::new(
            description,
            priority,
            sequence,
            operation,
        ));
        sequence
    }

    fn class_mut(&mut self, priority: Priority) -> &mut Vec<CompensatingAction> {
        match priority {
            Priority::Cleanup => &mut self.cleanup,
            Priority::Normal => &mut self.normal,
            Priority::Critical => &mut self.critical,
        }
    }

    fn class(&self, priority: Priority) -> &[CompensatingAction] {
        match priority {
            Priority::Cleanup => &self.cleanup,
            Priority::Normal => &self.normal,
            Priority::Critical => &self.critical,
        }
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.cleanup.len() + self.normal.len() + self.critical.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Registered actions in the order an unwind would execute them.
    #[must_use]
    pub fn pending(&self) -> Vec<PendingAction> {
        Priority::UNWIND_ORDER
            .iter()
            .flat_map(|&priority| self.class(priority).iter().rev())
            .map(CompensatingAction::to_pending)
            .collect()
    }

    fn drain_in_unwind_order(&mut self) -> Vec<CompensatingAction> {
        let mut drained = Vec::with_capacity(self.len());
        for priority in Priority::UNWIND_ORDER {
            let class = std::mem::take(self.class_mut(priority));
            drained.extend(class.into_iter().rev());
        }
        drained
    }

    /// Execute every registered action and clear the registry.
    ///
    /// Failures (errors or panics) of individual actions are logged and
    /// recorded in the report; the remaining actions still run.
    ///
    /// A panicking action still goes through the process panic hook before
    /// it is caught, so binaries should install a hook that suits their
    /// output.
    pub fn unwind(&mut self, reason: &str) -> UnwindReport {
        let actions = self.drain_in_unwind_order();
        let mut report = UnwindReport::new(reason);

        if actions.is_empty() {
            info!(reason, "nothing to unwind");
            self.record(&JournalEntry::Drained {
                reason: reason.to_string(),
                at: Utc::now(),
            });
            return report;
        }

        info!(reason, count = actions.len(), "unwinding registered actions");

        for action in actions {
            let (pending, operation) = action.into_parts();
            let sequence = pending.sequence;
            let priority = pending.priority;

            let started = Instant::now();
            let outcome = run_guarded(operation);
            let elapsed = started.elapsed();

            let record = match outcome {
                Ok(()) => {
                    info!(sequence, priority = %priority, "undone: {}", pending.description);
                    ActionRecord::succeeded(pending, elapsed)
                }
                Err(message) => {
                    if priority == Priority::Critical {
                        error!(
                            sequence,
                            "CRITICAL undo failed: {}: {message}; SSH/firewall access may be lost, restore it manually from the provider console",
                            pending.description
                        );
                    } else {
                        warn!(sequence, priority = %priority, "undo failed: {}: {message}", pending.description);
                    }
                    ActionRecord::failed(pending, message, elapsed)
                }
            };

            self.record(&JournalEntry::Completed {
                sequence,
                succeeded: record.is_success(),
                at: Utc::now(),
            });
            report.push(record);
        }

        let failures = report.failure_count();
        if failures == 0 {
            info!(attempted = report.attempted(), "unwind complete");
        } else {
            warn!(
                attempted = report.attempted(),
                failures, "unwind finished with failures"
            );
        }

        self.record(&JournalEntry::Drained {
            reason: reason.to_string(),
            at: Utc::now(),
        });
        report
    }

    /// Mark the run as finished in the journal.
    ///
    /// Actions stay registered for an explicit unwind, but the journal no
    /// longer reports them as outstanding.
    pub fn commit(&mut self) {
        debug!(registered = self.len(), "committing rollback journal");
        self.record(&JournalEntry::Committed { at: Utc::now() });
    }

    /// Discard every registered action without running it.
    ///
    /// The discarded actions are logged and returned in unwind order so the
    /// operator can reverse them manually. The journal keeps them.
    pub fn abandon(&mut self) -> Vec<PendingAction> {
        let left: Vec<PendingAction> = self
            .drain_in_unwind_order()
            .into_iter()
            .map(|action| action.into_parts().0)
            .collect();

        if left.is_empty() {
            info!("leaving installation as-is; no registered actions");
        } else {
            warn!(
                count = left.len(),
                "leaving installation as-is; the following actions were NOT undone"
            );
            for action in &left {
                warn!(sequence = action.sequence, "not undone: {action}");
            }
        }

        self.record(&JournalEntry::Abandoned { at: Utc::now() });
        left
    }

    fn record(&mut self, entry: &JournalEntry) {
        let Some(journal) = self.journal.as_mut() else {
            return;
        };
        if let Err(e) = journal.record(entry) {
            warn!(error = %e, path = %journal.path().display(), "failed to write rollback journal");
        }
    }
}

fn run_guarded(operation: Operation) -> Result<(), String> {
    match panic::catch_unwind(AssertUnwindSafe(operation)) {
        Ok(Ok(())) => Ok(()),
        Ok(Err(error)) => Err(error_chain(&*error)),
        Err(payload) => Err(format!("panicked: {}", panic_message(payload.as_ref()))),
    }
}

fn error_chain(error: &(dyn std::error::Error + 'static)) -> String {
    let mut message = error.to_string();
    let mut source = error.source();
    while let Some(cause) = source {
        message.push_str(": ");
        message.push_str(&cause.to_string());
        source = cause.source();
    }
    message
}

fn panic_message(payload: &(dyn Any + Send)) -> &str {
    if let Some(message) = payload.downcast_ref::<&'static str>() {
        message
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message
    } else {
        "non-string panic payload"
    }
}

impl std::fmt::Debug for RollbackRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RollbackRegistry")
            .field("cleanup", &self.cleanup)
            .field("normal", &self.normal)
            .field("critical", &self.critical)
            .field("next_sequence", &self.next_sequence)
            .field("journal", &self.journal.as_ref().map(Journal::path))
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use std::cell::RefCell;
    use std::rc::Rc;

    use super::*;

    type Log = Rc<RefCell<Vec<&'static str>>>;

    fn recording(log: &Log, name: &'static str) -> impl FnOnce() -> Result<(), BoxError> + 'static {
        let log = Rc::clone(log);
        move || {
            log.borrow_mut().push(name);
            Ok(())
        }
    }

    #[test]
    fn register_does_not_invoke_operation() {
        let log: Log = Rc::default();
        let mut registry = RollbackRegistry::new();

        registry.register("a", Priority::Normal, recording(&log, "a"));

        assert!(log.borrow().is_empty());
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn sequences_increase_across_classes() {
        let mut registry = RollbackRegistry::new();

        let first = registry.register("a", Priority::Critical, || Ok(()));
        let second = registry.register("b", Priority::Cleanup, || Ok(()));

        assert_eq!(first, 0);
        assert_eq!(second, 1);
    }

    #[test]
    fn pending_lists_actions_in_unwind_order() {
        let mut registry = RollbackRegistry::new();
        registry.register("A", Priority::Normal, || Ok(()));
        registry.register("B", Priority::Critical, || Ok(()));
        registry.register("C", Priority::Cleanup, || Ok(()));
        registry.register("D", Priority::Normal, || Ok(()));

        let order: Vec<String> = registry
            .pending()
            .into_iter()
            .map(|p| p.description)
            .collect();

        assert_eq!(order, ["C", "D", "A", "B"]);
    }

    #[test]
    fn unwind_reports_error_chain() {
        let mut registry = RollbackRegistry::new();
        registry.register("remove config", Priority::Normal, || {
            Err(Box::new(std::io::Error::other("permission denied")) as BoxError)
        });

        let report = registry.unwind("test");

        assert_eq!(report.failure_count(), 1);
        assert_eq!(
            report.records()[0].error.as_deref(),
            Some("permission denied")
        );
    }

    #[test]
    fn panicking_operation_is_recorded_as_failure() {
        let log: Log = Rc::default();
        let mut registry = RollbackRegistry::new();
        registry.register("first", Priority::Normal, recording(&log, "first"));
        registry.register("explodes", Priority::Normal, || panic!("boom"));

        let report = registry.unwind("test");

        assert_eq!(*log.borrow(), ["first"]);
        assert_eq!(report.failure_count(), 1);
        assert_eq!(report.records()[0].error.as_deref(), Some("panicked: boom"));
    }

    #[test]
    fn abandon_returns_pending_without_running() {
        let log: Log = Rc::default();
        let mut registry = RollbackRegistry::new();
        registry.register("a", Priority::Critical, recording(&log, "a"));
        registry.register("b", Priority::Cleanup, recording(&log, "b"));

        let left = registry.abandon();

        assert!(log.borrow().is_empty());
        assert!(registry.is_empty());
        let order: Vec<&str> = left.iter().map(|p| p.description.as_str()).collect();
        assert_eq!(order, ["b", "a"]);
    }

    #[test]
    fn reinstate_keeps_sequence_and_advances_counter() {
        let mut registry = RollbackRegistry::new();
        registry.reinstate(
            PendingAction {
                sequence: 9,
                priority: Priority::Normal,
                description: "restored".to_string(),
            },
            || Ok(()),
        );

        let next = registry.register("fresh", Priority::Normal, || Ok(()));

        assert_eq!(registry.pending()[1].sequence, 9);
        assert_eq!(next, 10);
    }

    #[test]
    fn panic_message_handles_owned_strings() {
        let payload: Box<dyn Any + Send> = Box::new(String::from("owned"));

        assert_eq!(panic_message(payload.as_ref()), "owned");
    }
}
