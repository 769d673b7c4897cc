use std::fmt;
use std::io::IsTerminal;

use stackup_rollback::{DecisionProvider, FixedDecision};
use tracing::info;

use crate::config::Settings;
use crate::interaction::TerminalDecisionProvider;

const CI_ENV_VARS: &[&str] = &[
    "CI",
    "GITHUB_ACTIONS",
    "GITLAB_CI",
    "CIRCLECI",
    "TRAVIS",
    "JENKINS_URL",
    "BUILDKITE",
    "TF_BUILD",
];

/// The parts of the process environment that decide whether to prompt.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Environment {
    no_tty: bool,
    force_tty: bool,
    ci_var: Option<&'static str>,
    stdin_is_terminal: bool,
}

impl Environment {
    pub fn detect() -> Self {
        Self::from_lookup(
            |name| std::env::var_os(name).is_some(),
            std::io::stdin().is_terminal(),
        )
    }

    fn from_lookup(is_set: impl Fn(&str) -> bool, stdin_is_terminal: bool) -> Self {
        Self {
            no_tty: is_set("STACKUP_NO_TTY"),
            force_tty: is_set("STACKUP_FORCE_TTY"),
            ci_var: CI_ENV_VARS.iter().copied().find(|name| is_set(name)),
            stdin_is_terminal,
        }
    }
}

/// Why a failed install is resolved without asking the operator.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UnattendedReason {
    /// `--unattended` or `unattended = true` in the config file.
    Requested,
    NoTtyVariable,
    Ci(&'static str),
    NoTerminal,
}

impl fmt::Display for UnattendedReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Requested => f.write_str("unattended mode requested"),
            Self::NoTtyVariable => f.write_str("STACKUP_NO_TTY is set"),
            Self::Ci(var) => write!(f, "CI detected via {var}"),
            Self::NoTerminal => f.write_str("stdin is not a terminal"),
        }
    }
}

/// Settings win over the environment; `STACKUP_FORCE_TTY` only overrides
/// CI and terminal detection.
pub fn unattended_reason(settings: &Settings, env: &Environment) -> Option<UnattendedReason> {
    if settings.unattended {
        return Some(UnattendedReason::Requested);
    }
    if env.no_tty {
        return Some(UnattendedReason::NoTtyVariable);
    }
    if env.force_tty {
        return None;
    }
    if let Some(var) = env.ci_var {
        return Some(UnattendedReason::Ci(var));
    }
    if !env.stdin_is_terminal {
        return Some(UnattendedReason::NoTerminal);
    }
    None
}

/// Prompt on the terminal, or apply `on_failure` when running unattended.
pub fn decision_provider(settings: &Settings, env: &Environment) -> Box<dyn DecisionProvider> {
    match unattended_reason(settings, env) {
        Some(reason) => {
            info!(on_failure = ?settings.on_failure, "running unattended: {reason}");
            Box::new(FixedDecision(settings.on_failure.into()))
        }
        None => Box::new(TerminalDecisionProvider),
    }
}
