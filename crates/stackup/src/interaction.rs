use dialoguer::Confirm;
use stackup_rollback::{Decision, DecisionError, DecisionProvider, InstallationPhase};

/// Asks the operator on the terminal whether to roll back.
///
/// Defaults to rolling back; dismissing the prompt also rolls back.
pub struct TerminalDecisionProvider;

impl DecisionProvider for TerminalDecisionProvider {
    fn decide(
        &self,
        phase: &InstallationPhase,
        error: &(dyn std::error::Error + 'static),
    ) -> Result<Decision, DecisionError> {
        let answer = Confirm::new()
            .with_prompt(format!(
                "'{phase}' failed: {error}\nRoll back the changes made so far?"
            ))
            .default(true)
            .interact_opt()
            .map_err(|e| match e {
                dialoguer::Error::IO(io_err) => DecisionError::Prompt(io_err),
            })?;

        Ok(match answer {
            Some(false) => Decision::LeaveAsIs,
            Some(true) | None => Decision::Unwind,
        })
    }
}
