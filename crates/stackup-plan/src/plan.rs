use std::collections::HashSet;
use std::fs;
use std::path::{Path, PathBuf};

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use stackup_rollback::Priority;

use crate::error::PlanError;

const BACKUP_SUFFIX: &str = ".stackup.bak";

/// An ordered list of forward steps, loaded from a TOML plan file.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InstallPlan {
    pub name: String,
    #[serde(default)]
    pub steps: Vec<StepSpec>,
}

/// One forward step and how to undo it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StepSpec {
    pub name: String,
    pub action: ForwardAction,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub undo: Option<UndoSpec>,
}

/// A process to spawn. Arguments are passed directly, never through a shell.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CommandSpec {
    pub program: String,
    #[serde(default)]
    pub args: Vec<String>,
    #[serde(default, skip_serializing_if = "IndexMap::is_empty")]
    pub env: IndexMap<String, String>,
    /// Extra attempts after the first failure.
    #[serde(default)]
    pub retries: u32,
    #[serde(default = "default_retry_delay")]
    pub retry_delay_secs: u64,
}

fn default_retry_delay() -> u64 {
    5
}

impl CommandSpec {
    #[must_use]
    pub fn new(program: impl Into<String>, args: &[&str]) -> Self {
        Self {
            program: program.into(),
            args: args.iter().map(ToString::to_string).collect(),
            env: IndexMap::new(),
            retries: 0,
            retry_delay_secs: default_retry_delay(),
        }
    }

    /// The command line as it would be typed, for logs.
    #[must_use]
    pub fn display(&self) -> String {
        std::iter::once(self.program.as_str())
            .chain(self.args.iter().map(String::as_str))
            .collect::<Vec<_>>()
            .join(" ")
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ForwardAction {
    Command(CommandSpec),
    WriteFile {
        path: PathBuf,
        contents: String,
        /// Keep a copy of an existing file so the write can be undone.
        #[serde(default)]
        backup: bool,
    },
    CreateDir {
        path: PathBuf,
    },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UndoSpec {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default = "default_priority")]
    pub priority: Priority,
    pub action: UndoAction,
}

fn default_priority() -> Priority {
    Priority::Normal
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum UndoAction {
    Command(CommandSpec),
    RemoveFile {
        path: PathBuf,
    },
    RemoveDir {
        path: PathBuf,
    },
    /// Move `backup` back over `path`, or remove `path` if no backup exists.
    RestoreFile {
        backup: PathBuf,
        path: PathBuf,
    },
}

/// Location of the copy kept by a `write_file` step with `backup = true`.
#[must_use]
pub fn backup_path(path: &Path) -> PathBuf {
    let mut name = path.as_os_str().to_os_string();
    name.push(BACKUP_SUFFIX);
    PathBuf::from(name)
}

impl StepSpec {
    /// The compensating action to register once this step succeeds.
    ///
    /// An explicit `undo` wins. A `write_file` step with `backup = true`
    /// and no explicit undo restores the backup.
    #[must_use]
    pub fn compensation(&self) -> Option<UndoSpec> {
        if let Some(undo) = &self.undo {
            return Some(undo.clone());
        }
        match &self.action {
            ForwardAction::WriteFile {
                path, backup: true, ..
            } => Some(UndoSpec {
                description: Some(format!("restore {}", path.display())),
                priority: Priority::Normal,
                action: UndoAction::RestoreFile {
                    backup: backup_path(path),
                    path: path.clone(),
                },
            }),
            _ => None,
        }
    }

    #[must_use]
    pub fn compensation_description(&self, undo: &UndoSpec) -> String {
        undo.description
            .clone()
            .unwrap_or_else(|| format!("undo {}", self.name))
    }
}

impl InstallPlan {
    /// Read, parse and validate a plan file.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read, is not valid TOML, or
    /// fails validation.
    pub fn load(path: &Path) -> Result<Self, PlanError> {
        let content = fs::read_to_string(path).map_err(|source| PlanError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        Self::parse(&content, path)
    }

    /// Parse and validate plan text. `origin` is only used in errors.
    ///
    /// # Errors
    ///
    /// Returns an error if the text is not a valid plan.
    pub fn parse(content: &str, origin: &Path) -> Result<Self, PlanError> {
        let plan: Self = toml::from_str(content).map_err(|source| PlanError::Parse {
            path: origin.to_path_buf(),
            source,
        })?;
        plan.validate()?;
        Ok(plan)
    }

    /// # Errors
    ///
    /// Returns an error if the plan has no steps, a step has an empty or
    /// duplicate name, or a command has an empty program.
    pub fn validate(&self) -> Result<(), PlanError> {
        if self.steps.is_empty() {
            return Err(PlanError::Empty(self.name.clone()));
        }

        let mut seen = HashSet::new();
        for (index, step) in self.steps.iter().enumerate() {
            if step.name.trim().is_empty() {
                return Err(PlanError::EmptyStepName { index: index + 1 });
            }
            if !seen.insert(step.name.as_str()) {
                return Err(PlanError::DuplicateStep(step.name.clone()));
            }

            let forward_program = match &step.action {
                ForwardAction::Command(spec) => Some(spec.program.as_str()),
                _ => None,
            };
            let undo_program = match step.undo.as_ref().map(|u| &u.action) {
                Some(UndoAction::Command(spec)) => Some(spec.program.as_str()),
                _ => None,
            };
            if [forward_program, undo_program]
                .into_iter()
                .flatten()
                .any(|program| program.trim().is_empty())
            {
                return Err(PlanError::EmptyProgram(step.name.clone()));
            }
        }
        Ok(())
    }
}
