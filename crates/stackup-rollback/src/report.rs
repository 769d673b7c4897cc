use std::time::Duration;

use crate::action::{PendingAction, Priority};

/// Outcome of a single compensating action.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ActionStatus {
    /// The operation returned successfully.
    Succeeded,
    /// The operation returned an error or panicked.
    Failed,
}

/// Record of one attempted compensating action.
#[derive(Debug, Clone)]
pub struct ActionRecord {
    /// Registration index of the action.
    pub sequence: u64,
    /// Priority class the action was registered under.
    pub priority: Priority,
    /// Human-readable label.
    pub description: String,
    /// Whether the action succeeded.
    pub status: ActionStatus,
    /// Error text when the action failed.
    pub error: Option<String>,
    /// Wall-clock time spent in the operation.
    pub elapsed: Duration,
}

impl ActionRecord {
    pub(crate) fn succeeded(pending: PendingAction, elapsed: Duration) -> Self {
        Self {
            sequence: pending.sequence,
            priority: pending.priority,
            description: pending.description,
            status: ActionStatus::Succeeded,
            error: None,
            elapsed,
        }
    }

    pub(crate) fn failed(pending: PendingAction, error: String, elapsed: Duration) -> Self {
        Self {
            sequence: pending.sequence,
            priority: pending.priority,
            description: pending.description,
            status: ActionStatus::Failed,
            error: Some(error),
            elapsed,
        }
    }

    #[must_use]
    pub fn is_success(&self) -> bool {
        self.status == ActionStatus::Succeeded
    }
}

/// Result of draining the registry, in execution order.
#[derive(Debug, Clone, Default)]
pub struct UnwindReport {
    reason: String,
    records: Vec<ActionRecord>,
}

impl UnwindReport {
    pub(crate) fn new(reason: impl Into<String>) -> Self {
        Self {
            reason: reason.into(),
            records: Vec::new(),
        }
    }

    pub(crate) fn push(&mut self, record: ActionRecord) {
        self.records.push(record);
    }

    /// Why the unwind was triggered.
    #[must_use]
    pub fn reason(&self) -> &str {
        &self.reason
    }

    /// All records in the order the actions were executed.
    #[must_use]
    pub fn records(&self) -> &[ActionRecord] {
        &self.records
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    #[must_use]
    pub fn attempted(&self) -> usize {
        self.records.len()
    }

    #[must_use]
    pub fn failure_count(&self) -> usize {
        self.records.iter().filter(|r| !r.is_success()).count()
    }

    #[must_use]
    pub fn success_count(&self) -> usize {
        self.attempted() - self.failure_count()
    }

    /// Failed actions from the `Critical` class.
    ///
    /// A non-empty result means access restoration could not be confirmed.
    #[must_use]
    pub fn critical_failures(&self) -> Vec<&ActionRecord> {
        self.records
            .iter()
            .filter(|r| r.priority == Priority::Critical && !r.is_success())
            .collect()
    }
}
