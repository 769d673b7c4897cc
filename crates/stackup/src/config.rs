use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use clap::ValueEnum;
use serde::Deserialize;
use stackup_rollback::Decision;
use tracing::debug;

use crate::error::{CliError, Result};

pub const DEFAULT_CONFIG_PATH: &str = "/etc/stackup/config.toml";
pub const DEFAULT_JOURNAL_PATH: &str = "/var/lib/stackup/journal.jsonl";

/// What an unattended install does when a step fails.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize, ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum OnFailure {
    #[default]
    Unwind,
    Leave,
}

impl From<OnFailure> for Decision {
    fn from(value: OnFailure) -> Self {
        match value {
            OnFailure::Unwind => Decision::Unwind,
            OnFailure::Leave => Decision::LeaveAsIs,
        }
    }
}

#[derive(Debug, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
struct ConfigFile {
    journal_path: Option<PathBuf>,
    on_failure: Option<OnFailure>,
    unattended: Option<bool>,
}

/// Effective settings after merging the config file over built-in defaults.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Settings {
    pub journal_path: PathBuf,
    pub on_failure: OnFailure,
    pub unattended: bool,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            journal_path: PathBuf::from(DEFAULT_JOURNAL_PATH),
            on_failure: OnFailure::default(),
            unattended: false,
        }
    }
}

impl Settings {
    /// Load settings from `explicit`, or from the default location.
    ///
    /// A missing default file yields the built-in defaults; a missing
    /// explicit file is an error.
    pub fn load(explicit: Option<&Path>) -> Result<Self> {
        let (path, required) = match explicit {
            Some(path) => (path, true),
            None => (Path::new(DEFAULT_CONFIG_PATH), false),
        };

        let content = match fs::read_to_string(path) {
            Ok(content) => content,
            Err(e) if e.kind() == ErrorKind::NotFound && !required => {
                debug!(path = %path.display(), "no config file, using defaults");
                return Ok(Self::default());
            }
            Err(source) => {
                return Err(CliError::ConfigRead {
                    path: path.to_path_buf(),
                    source,
                });
            }
        };

        Self::parse(&content, path)
    }

    fn parse(content: &str, path: &Path) -> Result<Self> {
        let file: ConfigFile = toml::from_str(content).map_err(|source| CliError::ConfigParse {
            path: path.to_path_buf(),
            source,
        })?;
        debug!(path = %path.display(), "loaded config file");

        let defaults = Self::default();
        Ok(Self {
            journal_path: file.journal_path.unwrap_or(defaults.journal_path),
            on_failure: file.on_failure.unwrap_or(defaults.on_failure),
            unattended: file.unattended.unwrap_or(defaults.unattended),
        })
    }

    /// Apply command-line flags, which take precedence over the file.
    #[must_use]
    pub fn with_overrides(
        mut self,
        journal_path: Option<PathBuf>,
        on_failure: Option<OnFailure>,
        unattended: bool,
    ) -> Self {
        if let Some(path) = journal_path {
            self.journal_path = path;
        }
        if let Some(on_failure) = on_failure {
            self.on_failure = on_failure;
        }
        self.unattended |= unattended;
        self
    }
}

#[cfg(test)]
mod tests {
    use tempfile::TempDir;

    use super::*;

    #[test]
    fn missing_explicit_file_is_an_error() -> anyhow::Result<()> {
        let dir = TempDir::new()?;

        let err = Settings::load(Some(&dir.path().join("absent.toml"))).expect_err("missing file");

        assert!(matches!(err, CliError::ConfigRead { .. }));
        Ok(())
    }

    #[test]
    fn file_values_override_defaults() -> anyhow::Result<()> {
        let dir = TempDir::new()?;
        let path = dir.path().join("config.toml");
        fs::write(
            &path,
            "journal_path = \"/tmp/journal.jsonl\"\non_failure = \"leave\"\n",
        )?;

        let settings = Settings::load(Some(&path))?;

        assert_eq!(settings.journal_path, PathBuf::from("/tmp/journal.jsonl"));
        assert_eq!(settings.on_failure, OnFailure::Leave);
        assert!(!settings.unattended);
        Ok(())
    }

    #[test]
    fn flags_override_file_values() {
        let settings = Settings {
            journal_path: PathBuf::from("/from/file.jsonl"),
            on_failure: OnFailure::Leave,
            unattended: false,
        };

        let settings = settings.with_overrides(
            Some(PathBuf::from("/from/flag.jsonl")),
            Some(OnFailure::Unwind),
            true,
        );

        assert_eq!(settings.journal_path, PathBuf::from("/from/flag.jsonl"));
        assert_eq!(settings.on_failure, OnFailure::Unwind);
        assert!(settings.unattended);
    }

    #[test]
    fn absent_flags_keep_file_values() {
        let settings = Settings {
            journal_path: PathBuf::from("/from/file.jsonl"),
            on_failure: OnFailure::Leave,
            unattended: true,
        };

        let merged = settings.clone().with_overrides(None, None, false);

        assert_eq!(merged, settings);
    }

    #[test]
    fn unknown_keys_are_rejected() {
        let err = Settings::parse("journal = \"/tmp/x\"", Path::new("config.toml"))
            .expect_err("unknown key");

        assert!(matches!(err, CliError::ConfigParse { .. }));
    }

    #[test]
    fn on_failure_maps_to_decision() {
        assert_eq!(Decision::from(OnFailure::Unwind), Decision::Unwind);
        assert_eq!(Decision::from(OnFailure::Leave), Decision::LeaveAsIs);
    }
}
