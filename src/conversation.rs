//! # Conversation Module
//!
//! The audit trail of every model exchange.
//!
//! - [`ConversationLog`] keeps the entries in memory and rewrites the JSON
//!   file after every append, so a crash mid-pipeline still leaves a valid,
//!   loadable log on disk.
//! - [`ConversationStore`] owns the debug directory: it picks the
//!   timestamped, collision-free file names and loads saved logs back.

use chrono::{DateTime, Local};
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::fs::{self, OpenOptions};
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::sync::{LazyLock, Mutex, PoisonError};
use tracing::{debug, info};

use crate::error::PersistenceError;

/// Characters dropped from the topic before it becomes part of a file name.
static UNSAFE_SLUG_CHARS: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"[^\w\s-]").expect("valid slug regex"));

/// Number of topic words kept in a conversation file name.
const SLUG_WORDS: usize = 4;

// =============================================================================
// CONVERSATION ENTRIES
// =============================================================================
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Assistant,
    System,
}

/// One line of the conversation log.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConversationEntry {
    pub timestamp: DateTime<Local>,
    pub role: Role,
    pub content: String,
}

// =============================================================================
// CONVERSATION LOG
// =============================================================================
/// Append-only conversation log backed by a JSON file.
///
/// # Rust Concept: Interior Mutability
///
/// `append` takes `&self`, yet it pushes onto the entry list. The `Mutex`
/// makes that safe when the log is shared through an `Arc` between the
/// pipeline and the recording model client. Holding the lock across the
/// file write also keeps writes in entry order.
#[derive(Debug)]
pub struct ConversationLog {
    path: PathBuf,
    entries: Mutex<Vec<ConversationEntry>>,
}

impl ConversationLog {
    /// Create a log that persists to `path`. Nothing is written until the
    /// first append (or an explicit flush).
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            entries: Mutex::new(Vec::new()),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Append an entry and persist the whole log.
    ///
    /// Timestamps never go backwards: if the clock steps back, the entry
    /// reuses the previous timestamp.
    pub fn append(&self, role: Role, content: impl Into<String>) -> Result<(), PersistenceError> {
        let mut entries = self.entries.lock().unwrap_or_else(PoisonError::into_inner);

        let now = Local::now();
        let timestamp = entries
            .last()
            .map_or(now, |last| last.timestamp.max(now));

        entries.push(ConversationEntry {
            timestamp,
            role,
            content: content.into(),
        });

        write_json_atomic(&self.path, entries.as_slice())
    }

    /// Snapshot of the entries recorded so far.
    pub fn entries(&self) -> Vec<ConversationEntry> {
        self.entries
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Rewrite the file from memory. Used at the end of the pipeline so a
    /// failed disk write surfaces as an error instead of a warning.
    pub fn flush(&self) -> Result<(), PersistenceError> {
        let entries = self.entries.lock().unwrap_or_else(PoisonError::into_inner);
        write_json_atomic(&self.path, entries.as_slice())
    }
}

/// Write pretty JSON to a sibling temp file, then rename it over `path`.
fn write_json_atomic<T: Serialize + ?Sized>(path: &Path, value: &T) -> Result<(), PersistenceError> {
    let json = serde_json::to_vec_pretty(value)?;
    let tmp = path.with_extension("json.tmp");

    fs::write(&tmp, json).map_err(|e| PersistenceError::io(&tmp, e))?;
    fs::rename(&tmp, path).map_err(|e| PersistenceError::io(path, e))?;

    debug!(path = %path.display(), "Conversation log persisted");
    Ok(())
}

// =============================================================================
// CONVERSATION STORE
// =============================================================================
/// Names, creates and loads conversation files inside the debug directory.
#[derive(Debug, Clone)]
pub struct ConversationStore {
    dir: PathBuf,
}

impl ConversationStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    /// Claim a fresh `YYYYMMDD_HHMMSS_<slug>.json` file for `topic`.
    ///
    /// The file is created with `create_new`, so two runs in the same second
    /// can never pick the same name: the loser of the race moves on to
    /// `_1`, `_2`, ... The reserved file starts as an empty JSON array.
    pub fn reserve(&self, topic: &str, now: DateTime<Local>) -> Result<PathBuf, PersistenceError> {
        fs::create_dir_all(&self.dir).map_err(|e| PersistenceError::io(&self.dir, e))?;

        let stem = conversation_stem(topic, now);
        let mut counter = 0usize;

        loop {
            let name = match counter {
                0 => format!("{stem}.json"),
                n => format!("{stem}_{n}.json"),
            };
            let path = self.dir.join(name);

            match OpenOptions::new().write(true).create_new(true).open(&path) {
                Ok(_) => {
                    write_json_atomic(&path, &[] as &[ConversationEntry])?;
                    return Ok(path);
                }
                Err(e) if e.kind() == ErrorKind::AlreadyExists => counter += 1,
                Err(e) => return Err(PersistenceError::io(&path, e)),
            }
        }
    }

    /// Reserve a file for `topic` and return a log that writes into it.
    pub fn open_log(&self, topic: &str) -> Result<ConversationLog, PersistenceError> {
        let path = self.reserve(topic, Local::now())?;
        info!(path = %path.display(), "Conversation log created");
        Ok(ConversationLog::new(path))
    }

    /// Save a finished conversation in one go.
    #[allow(dead_code)] // May be used in future enhancements
    pub fn save(
        &self,
        topic: &str,
        entries: &[ConversationEntry],
    ) -> Result<PathBuf, PersistenceError> {
        info!(topic = %topic, "Saving conversation");
        let path = self.reserve(topic, Local::now())?;
        write_json_atomic(&path, entries)?;
        info!(path = %path.display(), "Conversation saved");
        Ok(path)
    }

    /// Load a conversation previously written by a log or by [`save`](Self::save).
    pub fn load(path: &Path) -> Result<Vec<ConversationEntry>, PersistenceError> {
        let raw = fs::read_to_string(path).map_err(|e| PersistenceError::io(path, e))?;
        let entries = serde_json::from_str(&raw)?;
        info!(path = %path.display(), "Conversation loaded");
        Ok(entries)
    }
}

/// `YYYYMMDD_HHMMSS_<first four lowercase topic words>`
pub fn conversation_stem(topic: &str, now: DateTime<Local>) -> String {
    let lowered = topic.to_lowercase();
    let cleaned = UNSAFE_SLUG_CHARS.replace_all(&lowered, "");
    let slug = cleaned
        .split_whitespace()
        .take(SLUG_WORDS)
        .collect::<Vec<_>>()
        .join("_");

    format!("{}_{}", now.format("%Y%m%d_%H%M%S"), slug)
}

// =============================================================================
// UNIT TESTS
// =============================================================================
#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use tempfile::TempDir;

    fn fixed_time() -> DateTime<Local> {
        Local.with_ymd_and_hms(2024, 3, 9, 14, 5, 7).unwrap()
    }

    #[test]
    fn test_conversation_stem() {
        let stem = conversation_stem("AI in Healthcare: Trends, Risks & Outlook", fixed_time());
        assert_eq!(stem, "20240309_140507_ai_in_healthcare_trends");
    }

    #[test]
    fn test_conversation_stem_keeps_hyphens() {
        let stem = conversation_stem("Self-driving cars", fixed_time());
        assert_eq!(stem, "20240309_140507_self-driving_cars");
    }

    #[test]
    fn test_reserve_avoids_collisions() {
        let dir = TempDir::new().unwrap();
        let store = ConversationStore::new(dir.path());

        let first = store.reserve("Test Topic", fixed_time()).unwrap();
        let second = store.reserve("Test Topic", fixed_time()).unwrap();
        let third = store.reserve("Test Topic", fixed_time()).unwrap();

        assert_eq!(first.file_name().unwrap(), "20240309_140507_test_topic.json");
        assert_eq!(second.file_name().unwrap(), "20240309_140507_test_topic_1.json");
        assert_eq!(third.file_name().unwrap(), "20240309_140507_test_topic_2.json");
    }

    #[test]
    fn test_save_twice_gives_distinct_files() {
        let dir = TempDir::new().unwrap();
        let store = ConversationStore::new(dir.path());
        let log = ConversationLog::new(dir.path().join("scratch.json"));
        log.append(Role::User, "hello").unwrap();

        let a = store.save("Same Topic", &log.entries()).unwrap();
        let b = store.save("Same Topic", &log.entries()).unwrap();

        assert_ne!(a, b);
        assert_eq!(ConversationStore::load(&a).unwrap().len(), 1);
        assert_eq!(ConversationStore::load(&b).unwrap().len(), 1);
    }

    #[test]
    fn test_reserved_file_is_loadable() {
        let dir = TempDir::new().unwrap();
        let store = ConversationStore::new(dir.path().join("nested"));

        let path = store.reserve("Empty", fixed_time()).unwrap();
        assert!(ConversationStore::load(&path).unwrap().is_empty());
    }

    #[test]
    fn test_log_persists_after_every_append() {
        let dir = TempDir::new().unwrap();
        let log = ConversationLog::new(dir.path().join("log.json"));

        log.append(Role::User, "Research topic: Rust").unwrap();
        let on_disk = ConversationStore::load(log.path()).unwrap();
        assert_eq!(on_disk.len(), 1);
        assert_eq!(on_disk[0].role, Role::User);

        log.append(Role::Assistant, "Here is a report").unwrap();
        let on_disk = ConversationStore::load(log.path()).unwrap();
        assert_eq!(on_disk.len(), 2);
        assert_eq!(on_disk[1].content, "Here is a report");
        assert!(!dir.path().join("log.json.tmp").exists());
    }

    #[test]
    fn test_log_timestamps_are_monotonic() {
        let dir = TempDir::new().unwrap();
        let log = ConversationLog::new(dir.path().join("log.json"));
        for i in 0..5 {
            log.append(Role::System, format!("entry {i}")).unwrap();
        }

        let entries = log.entries();
        assert!(entries.windows(2).all(|w| w[0].timestamp <= w[1].timestamp));
    }

    #[test]
    fn test_role_serializes_lowercase() {
        let json = serde_json::to_string(&Role::Assistant).unwrap();
        assert_eq!(json, "\"assistant\"");
    }

    #[test]
    fn test_load_missing_file_is_error() {
        let dir = TempDir::new().unwrap();
        let err = ConversationStore::load(&dir.path().join("missing.json")).unwrap_err();
        assert!(matches!(err, PersistenceError::Io { .. }));
    }
}
