//! Plan files, the step runner and the rollback-aware installer.
//!
//! A plan is an ordered list of forward steps, each with an optional undo.
//! The [`Installer`] performs steps through a [`StepRunner`] and registers
//! each step's undo with a rollback coordinator as soon as the step
//! succeeds.

mod error;
mod installer;
mod plan;
mod replay;
mod runner;

pub use error::{PlanError, StepError};
pub use installer::{InstallOutcome, Installer};
pub use plan::{
    CommandSpec, ForwardAction, InstallPlan, StepSpec, UndoAction, UndoSpec, backup_path,
};
pub use replay::{ReplayOutcome, replay_journal};
pub use runner::{StepRunner, SystemRunner};
