use std::fmt;

use crate::error::DecisionError;

/// Label of the forward step that was executing when a failure occurred.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct InstallationPhase(String);

impl InstallationPhase {
    #[must_use]
    pub fn new(label: impl Into<String>) -> Self {
        Self(label.into())
    }

    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for InstallationPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for InstallationPhase {
    fn from(label: &str) -> Self {
        Self::new(label)
    }
}

/// What to do with partially applied state after a fatal error.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Decision {
    /// Run every registered compensating action.
    #[default]
    Unwind,
    /// Keep the system as it is and report what was not undone.
    LeaveAsIs,
}

/// Source of the unwind/leave decision.
pub trait DecisionProvider {
    /// # Errors
    ///
    /// Returns an error if no decision could be obtained.
    fn decide(
        &self,
        phase: &InstallationPhase,
        error: &(dyn std::error::Error + 'static),
    ) -> Result<Decision, DecisionError>;
}

/// Decision provider for unattended runs. Never blocks.
#[derive(Debug, Clone, Copy, Default)]
pub struct FixedDecision(pub Decision);

impl DecisionProvider for FixedDecision {
    fn decide(
        &self,
        _phase: &InstallationPhase,
        _error: &(dyn std::error::Error + 'static),
    ) -> Result<Decision, DecisionError> {
        Ok(self.0)
    }
}

impl<D: DecisionProvider + ?Sized> DecisionProvider for &D {
    fn decide(
        &self,
        phase: &InstallationPhase,
        error: &(dyn std::error::Error + 'static),
    ) -> Result<Decision, DecisionError> {
        (**self).decide(phase, error)
    }
}

impl<D: DecisionProvider + ?Sized> DecisionProvider for Box<D> {
    fn decide(
        &self,
        phase: &InstallationPhase,
        error: &(dyn std::error::Error + 'static),
    ) -> Result<Decision, DecisionError> {
        (**self).decide(phase, error)
    }
}
