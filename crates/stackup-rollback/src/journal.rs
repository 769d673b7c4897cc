use std::collections::HashSet;
use std::fs::{self, File, OpenOptions};
use std::io::Write as _;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::action::{PendingAction, Priority};
use crate::error::JournalError;

/// One line of the registration journal.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum JournalEntry {
    Registered {
        sequence: u64,
        priority: Priority,
        description: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        recipe: Option<serde_json::Value>,
        at: DateTime<Utc>,
    },
    Completed {
        sequence: u64,
        succeeded: bool,
        at: DateTime<Utc>,
    },
    Drained {
        reason: String,
        at: DateTime<Utc>,
    },
    Abandoned {
        at: DateTime<Utc>,
    },
    /// The run finished; nothing registered before this is outstanding.
    Committed {
        at: DateTime<Utc>,
    },
}

#[derive(Debug, Default)]
struct JournalContents {
    entries: Vec<JournalEntry>,
    /// Byte offset of a trailing partial line, if any.
    torn_at: Option<u64>,
    /// The last entry parsed but its newline was never written.
    needs_newline: bool,
}

/// A registration with no completion record after the last drain.
#[derive(Debug, Clone, PartialEq)]
pub struct OutstandingEntry {
    pub action: PendingAction,
    pub recipe: Option<serde_json::Value>,
}

/// Append-only JSON-lines log of registrations and their outcomes.
///
/// Registrations survive a hard crash so a later run can replay them.
#[derive(Debug)]
pub struct Journal {
    path: PathBuf,
    file: File,
    next_sequence: u64,
}

impl Journal {
    /// Start a fresh journal, discarding any previous content.
    ///
    /// # Errors
    ///
    /// Returns an error if the file or its parent directory cannot be created.
    pub fn create(path: &Path) -> Result<Self, JournalError> {
        ensure_parent(path)?;
        let file = OpenOptions::new()
            .create(true)
            .write(true)
            .truncate(true)
            .open(path)
            .map_err(|source| JournalError::Open {
                path: path.to_path_buf(),
                source,
            })?;

        Ok(Self {
            path: path.to_path_buf(),
            file,
            next_sequence: 0,
        })
    }

    /// Open an existing journal for appending, continuing its sequence numbers.
    ///
    /// # Errors
    ///
    /// Returns an error if the journal cannot be read or opened.
    pub fn append_to(path: &Path) -> Result<Self, JournalError> {
        let contents = Self::read(path)?;
        let next_sequence = contents
            .entries
            .iter()
            .filter_map(|entry| match entry {
                JournalEntry::Registered { sequence, .. } => Some(sequence + 1),
                _ => None,
            })
            .max()
            .unwrap_or(0);

        ensure_parent(path)?;
        let open_err = |source: std::io::Error| JournalError::Open {
            path: path.to_path_buf(),
            source,
        };
        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(path)
            .map_err(open_err)?;
        // new records must not be glued onto a partial line
        if let Some(valid_len) = contents.torn_at {
            file.set_len(valid_len).map_err(open_err)?;
        } else if contents.needs_newline {
            file.write_all(b"\n").map_err(open_err)?;
        }

        Ok(Self {
            path: path.to_path_buf(),
            file,
            next_sequence,
        })
    }

    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// First sequence number not yet used in this journal.
    #[must_use]
    pub fn next_sequence(&self) -> u64 {
        self.next_sequence
    }

    /// Append one entry and flush it to disk.
    ///
    /// # Errors
    ///
    /// Returns an error if the entry cannot be serialized or written.
    pub fn record(&mut self, entry: &JournalEntry) -> Result<(), JournalError> {
        let mut line = serde_json::to_string(entry).map_err(JournalError::Serialize)?;
        line.push('\n');

        let path = &self.path;
        let write_err = |source: std::io::Error| JournalError::Write {
            path: path.clone(),
            source,
        };
        self.file.write_all(line.as_bytes()).map_err(write_err)?;
        self.file.sync_data().map_err(write_err)?;

        if let JournalEntry::Registered { sequence, .. } = entry {
            self.next_sequence = self.next_sequence.max(sequence + 1);
        }
        Ok(())
    }

    /// Read every entry. A missing journal reads as empty.
    ///
    /// A final line without a trailing newline that does not parse is the
    /// remains of an interrupted write; it is skipped with a warning.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or a complete line is
    /// malformed.
    pub fn load(path: &Path) -> Result<Vec<JournalEntry>, JournalError> {
        Ok(Self::read(path)?.entries)
    }

    fn read(path: &Path) -> Result<JournalContents, JournalError> {
        let content = match fs::read_to_string(path) {
            Ok(content) => content,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Ok(JournalContents::default());
            }
            Err(source) => {
                return Err(JournalError::Read {
                    path: path.to_path_buf(),
                    source,
                });
            }
        };

        let mut contents = JournalContents::default();
        let mut offset = 0;
        for (index, line) in content.split_inclusive('\n').enumerate() {
            let start = offset;
            offset += line.len();
            if line.trim().is_empty() {
                continue;
            }
            match serde_json::from_str(line) {
                Ok(entry) => contents.entries.push(entry),
                Err(source) if !line.ends_with('\n') => {
                    warn!(
                        path = %path.display(),
                        line = index + 1,
                        error = %source,
                        "ignoring partially written journal entry"
                    );
                    contents.torn_at = Some(start as u64);
                }
                Err(source) => {
                    return Err(JournalError::Parse {
                        path: path.to_path_buf(),
                        line: index + 1,
                        source,
                    });
                }
            }
        }
        contents.needs_newline =
            contents.torn_at.is_none() && !content.is_empty() && !content.ends_with('\n');
        Ok(contents)
    }

    /// Load the journal and compute its outstanding registrations.
    ///
    /// # Errors
    ///
    /// Returns an error if the journal cannot be loaded.
    pub fn outstanding_at(path: &Path) -> Result<Vec<OutstandingEntry>, JournalError> {
        Ok(outstanding(&Self::load(path)?))
    }
}

/// Registrations after the last drain or commit that have no completion
/// record, in registration order.
#[must_use]
pub fn outstanding(entries: &[JournalEntry]) -> Vec<OutstandingEntry> {
    let start = entries
        .iter()
        .rposition(|entry| {
            matches!(
                entry,
                JournalEntry::Drained { .. } | JournalEntry::Committed { .. }
            )
        })
        .map_or(0, |index| index + 1);
    let tail = &entries[start..];

    let completed: HashSet<u64> = tail
        .iter()
        .filter_map(|entry| match entry {
            JournalEntry::Completed { sequence, .. } => Some(*sequence),
            _ => None,
        })
        .collect();

    let mut outstanding: Vec<OutstandingEntry> = tail
        .iter()
        .filter_map(|entry| match entry {
            JournalEntry::Registered {
                sequence,
                priority,
                description,
                recipe,
                ..
            } if !completed.contains(sequence) => Some(OutstandingEntry {
                action: PendingAction {
                    sequence: *sequence,
                    priority: *priority,
                    description: description.clone(),
                },
                recipe: recipe.clone(),
            }),
            _ => None,
        })
        .collect();
    outstanding.sort_by_key(|entry| entry.action.sequence);
    outstanding
}

fn ensure_parent(path: &Path) -> Result<(), JournalError> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent).map_err(|source| JournalError::Open {
            path: path.to_path_buf(),
            source,
        })?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use tempfile::TempDir;

    use super::*;

    fn registered(sequence: u64, priority: Priority, description: &str) -> JournalEntry {
        JournalEntry::Registered {
            sequence,
            priority,
            description: description.to_string(),
            recipe: None,
            at: Utc::now(),
        }
    }

    fn completed(sequence: u64) -> JournalEntry {
        JournalEntry::Completed {
            sequence,
            succeeded: true,
            at: Utc::now(),
        }
    }

    #[test]
    fn missing_journal_loads_empty() -> anyhow::Result<()> {
        let dir = TempDir::new()?;

        let entries = Journal::load(&dir.path().join("absent.jsonl"))?;

        assert!(entries.is_empty());
        Ok(())
    }

    #[test]
    fn create_truncates_previous_content() -> anyhow::Result<()> {
        let dir = TempDir::new()?;
        let path = dir.path().join("journal.jsonl");
        fs::write(&path, "garbage\n")?;

        let mut journal = Journal::create(&path)?;
        journal.record(&registered(0, Priority::Normal, "stop nginx"))?;

        let entries = Journal::load(&path)?;
        assert_eq!(entries.len(), 1);
        Ok(())
    }

    #[test]
    fn create_makes_parent_directories() -> anyhow::Result<()> {
        let dir = TempDir::new()?;
        let path = dir.path().join("var/lib/stackup/journal.jsonl");

        Journal::create(&path)?;

        assert!(path.exists());
        Ok(())
    }

    #[test]
    fn append_to_continues_sequence_numbers() -> anyhow::Result<()> {
        let dir = TempDir::new()?;
        let path = dir.path().join("journal.jsonl");
        let mut journal = Journal::create(&path)?;
        journal.record(&registered(0, Priority::Normal, "a"))?;
        journal.record(&registered(4, Priority::Critical, "b"))?;
        drop(journal);

        let reopened = Journal::append_to(&path)?;

        assert_eq!(reopened.next_sequence(), 5);
        Ok(())
    }

    #[test]
    fn malformed_line_reports_line_number() -> anyhow::Result<()> {
        let dir = TempDir::new()?;
        let path = dir.path().join("journal.jsonl");
        let good = serde_json::to_string(&registered(0, Priority::Normal, "a"))?;
        fs::write(&path, format!("{good}\n{{not json\n"))?;

        let err = Journal::load(&path).expect_err("second line is malformed");

        assert!(matches!(err, JournalError::Parse { line: 2, .. }));
        Ok(())
    }

    #[test]
    fn outstanding_excludes_completed_registrations() {
        let entries = vec![
            registered(0, Priority::Normal, "a"),
            registered(1, Priority::Critical, "b"),
            completed(1),
        ];

        let outstanding = outstanding(&entries);

        assert_eq!(outstanding.len(), 1);
        assert_eq!(outstanding[0].action.description, "a");
    }

    #[test]
    fn outstanding_ignores_entries_before_last_drain() {
        let entries = vec![
            registered(0, Priority::Normal, "old"),
            JournalEntry::Drained {
                reason: "step failed".to_string(),
                at: Utc::now(),
            },
            registered(1, Priority::Cleanup, "new"),
        ];

        let outstanding = outstanding(&entries);

        assert_eq!(outstanding.len(), 1);
        assert_eq!(outstanding[0].action.description, "new");
    }

    #[test]
    fn abandoned_entries_remain_outstanding() {
        let entries = vec![
            registered(0, Priority::Normal, "a"),
            JournalEntry::Abandoned { at: Utc::now() },
        ];

        assert_eq!(outstanding(&entries).len(), 1);
    }

    #[test]
    fn recipe_round_trips_through_json() -> anyhow::Result<()> {
        let entry = JournalEntry::Registered {
            sequence: 2,
            priority: Priority::Critical,
            description: "reset firewall".to_string(),
            recipe: Some(serde_json::json!({"kind": "command", "program": "ufw"})),
            at: Utc::now(),
        };

        let line = serde_json::to_string(&entry)?;
        assert!(line.contains("\"event\":\"registered\""));

        let parsed: JournalEntry = serde_json::from_str(&line)?;
        assert_eq!(parsed, entry);
        Ok(())
    }

    #[test]
    fn commit_clears_outstanding_entries() {
        let entries = vec![
            registered(0, Priority::Critical, "disable ufw"),
            JournalEntry::Committed { at: Utc::now() },
        ];

        assert!(outstanding(&entries).is_empty());
    }

    #[test]
    fn torn_final_line_is_skipped() -> anyhow::Result<()> {
        let dir = TempDir::new()?;
        let path = dir.path().join("journal.jsonl");
        let good = serde_json::to_string(&registered(0, Priority::Critical, "disable ufw"))?;
        fs::write(&path, format!("{good}\n{{\"event\":\"registered\",\"sequ"))?;

        let entries = Journal::load(&path)?;

        assert_eq!(entries.len(), 1);
        assert_eq!(Journal::outstanding_at(&path)?.len(), 1);
        Ok(())
    }

    #[test]
    fn torn_line_in_the_middle_is_an_error() -> anyhow::Result<()> {
        let dir = TempDir::new()?;
        let path = dir.path().join("journal.jsonl");
        let good = serde_json::to_string(&registered(0, Priority::Normal, "a"))?;
        fs::write(&path, format!("{{\"event\":\"regis\n{good}\n"))?;

        let err = Journal::load(&path).expect_err("first line is malformed");

        assert!(matches!(err, JournalError::Parse { line: 1, .. }));
        Ok(())
    }

    #[test]
    fn append_to_drops_torn_tail_before_writing() -> anyhow::Result<()> {
        let dir = TempDir::new()?;
        let path = dir.path().join("journal.jsonl");
        let good = serde_json::to_string(&registered(0, Priority::Normal, "a"))?;
        fs::write(&path, format!("{good}\n{{\"event\":\"comp"))?;

        let mut journal = Journal::append_to(&path)?;
        journal.record(&completed(0))?;

        let entries = Journal::load(&path)?;
        assert_eq!(entries.len(), 2);
        assert!(Journal::outstanding_at(&path)?.is_empty());
        Ok(())
    }

    #[test]
    fn append_to_terminates_complete_unterminated_line() -> anyhow::Result<()> {
        let dir = TempDir::new()?;
        let path = dir.path().join("journal.jsonl");
        let good = serde_json::to_string(&registered(0, Priority::Normal, "a"))?;
        fs::write(&path, good)?;

        let mut journal = Journal::append_to(&path)?;
        journal.record(&completed(0))?;

        assert_eq!(Journal::load(&path)?.len(), 2);
        Ok(())
    }
}
