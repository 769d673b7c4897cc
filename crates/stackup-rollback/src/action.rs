use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::BoxError;

/// Priority class of a compensating action.
///
/// Classes are unwound in ascending order: `Cleanup` first, `Critical` last.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Priority {
    /// Transient artifacts such as downloads and temp files.
    Cleanup,
    /// Services, containers and generated configuration.
    Normal,
    /// Access-critical state such as SSH and firewall rules.
    Critical,
}

impl Priority {
    /// All classes in the order an unwind processes them.
    pub const UNWIND_ORDER: [Priority; 3] = [Priority::Cleanup, Priority::Normal, Priority::Critical];

    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Cleanup => "cleanup",
            Self::Normal => "normal",
            Self::Critical => "critical",
        }
    }
}

impl fmt::Display for Priority {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

pub(crate) type Operation = Box<dyn FnOnce() -> Result<(), BoxError>>;

/// One registered undo step.
pub struct CompensatingAction {
    description: String,
    priority: Priority,
    sequence: u64,
    operation: Operation,
}

impl CompensatingAction {
    pub(crate) fn new(
        description: String,
        priority: Priority,
        sequence: u64,
        operation: Operation,
    ) -> Self {
        Self {
            description,
            priority,
            sequence,
            operation,
        }
    }

    #[must_use]
    pub fn description(&self) -> &str {
        &self.description
    }

    #[must_use]
    pub fn priority(&self) -> Priority {
        self.priority
    }

    #[must_use]
    pub fn sequence(&self) -> u64 {
        self.sequence
    }

    #[must_use]
    pub fn to_pending(&self) -> PendingAction {
        PendingAction {
            sequence: self.sequence,
            priority: self.priority,
            description: self.description.clone(),
        }
    }

    pub(crate) fn into_parts(self) -> (PendingAction, Operation) {
        let pending = PendingAction {
            sequence: self.sequence,
            priority: self.priority,
            description: self.description,
        };
        (pending, self.operation)
    }
}

impl fmt::Debug for CompensatingAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CompensatingAction")
            .field("description", &self.description)
            .field("priority", &self.priority)
            .field("sequence", &self.sequence)
            .finish_non_exhaustive()
    }
}

/// A registered action that has not been executed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PendingAction {
    pub sequence: u64,
    pub priority: Priority,
    pub description: String,
}

impl fmt::Display for PendingAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}] {}", self.priority, self.description)
    }
}
