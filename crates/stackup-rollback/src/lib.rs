//! Rollback coordination for partially applied provisioning runs.
//!
//! Forward steps register compensating actions tagged with a priority class.
//! When a step fails the coordinator asks a [`DecisionProvider`] whether to
//! unwind; an unwind runs `Cleanup`, `Normal` and finally `Critical` actions,
//! each class most-recent first, so access-restoring actions always run last
//! and are never skipped.

mod action;
mod coordinator;
mod decision;
mod error;
mod journal;
mod registry;
mod report;

pub use action::{CompensatingAction, PendingAction, Priority};
pub use coordinator::{CoordinatorState, FailureOutcome, RollbackCoordinator};
pub use decision::{Decision, DecisionProvider, FixedDecision, InstallationPhase};
pub use error::{BoxError, DecisionError, JournalError};
pub use journal::{Journal, JournalEntry, OutstandingEntry, outstanding};
pub use registry::RollbackRegistry;
pub use report::{ActionRecord, ActionStatus, UnwindReport};
