//! Durable key-value storage backing the session token.
//!
//! `FileStore` keeps a flat JSON object in `<home>/session.json` with
//! restricted permissions (0600). Every write replaces the whole file through
//! a temp file + rename, so a reader sees either the old pair or the new one.
//! Values are never logged.

use std::collections::BTreeMap;
use std::fmt;
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard, PoisonError};

use anyhow::{Context, Result};
use tracing::warn;

/// String key-value store with multi-key writes.
///
/// `get_many`, `set_many` and `remove_many` must see or apply all entries in
/// one step.
pub trait KeyValueStore: Send + Sync + fmt::Debug {
    /// Returns the value stored under `key`, if any.
    ///
    /// # Errors
    /// Returns an error if the underlying storage cannot be read.
    fn get(&self, key: &str) -> Result<Option<String>>;

    /// Returns the values of all `keys`, in order, from one snapshot.
    ///
    /// # Errors
    /// Returns an error if the underlying storage cannot be read.
    fn get_many(&self, keys: &[&str]) -> Result<Vec<Option<String>>>;

    /// Writes all entries, overwriting existing values.
    ///
    /// # Errors
    /// Returns an error if the underlying storage cannot be written.
    fn set_many(&self, entries: &[(&str, &str)]) -> Result<()>;

    /// Removes all keys. Missing keys are not an error.
    ///
    /// # Errors
    /// Returns an error if the underlying storage cannot be written.
    fn remove_many(&self, keys: &[&str]) -> Result<()>;
}

type Entries = BTreeMap<String, String>;

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

/// JSON-file storage.
#[derive(Debug)]
pub struct FileStore {
    path: PathBuf,
    // Serializes read-modify-write cycles within this process.
    write_lock: Mutex<()>,
}

impl FileStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            write_lock: Mutex::new(()),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn read_contents(&self) -> Result<Option<String>> {
        if !self.path.exists() {
            return Ok(None);
        }
        let contents = fs::read_to_string(&self.path)
            .with_context(|| format!("Failed to read session storage {}", self.path.display()))?;
        Ok(Some(contents).filter(|c| !c.trim().is_empty()))
    }

    fn load(&self) -> Result<Entries> {
        let Some(contents) = self.read_contents()? else {
            return Ok(Entries::new());
        };
        serde_json::from_str(&contents)
            .with_context(|| format!("Failed to parse session storage {}", self.path.display()))
    }

    /// Loads entries for a read-modify-write cycle. An unparseable file is
    /// replaced rather than blocking every later write; the flag reports it.
    fn load_for_write(&self) -> Result<(Entries, bool)> {
        let Some(contents) = self.read_contents()? else {
            return Ok((Entries::new(), false));
        };
        match serde_json::from_str(&contents) {
            Ok(entries) => Ok((entries, false)),
            Err(e) => {
                warn!(
                    path = %self.path.display(),
                    error = %e,
                    "Session storage is corrupt; replacing it"
                );
                Ok((Entries::new(), true))
            }
        }
    }

    fn store(&self, entries: &Entries) -> Result<()> {
        let parent = match self.path.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => parent,
            _ => Path::new("."),
        };
        fs::create_dir_all(parent)
            .with_context(|| format!("Failed to create directory {}", parent.display()))?;

        let contents =
            serde_json::to_string_pretty(entries).context("Failed to serialize session storage")?;

        // NamedTempFile is created with 0600 on unix.
        let mut file = tempfile::NamedTempFile::new_in(parent)
            .with_context(|| format!("Failed to create temp file in {}", parent.display()))?;
        file.write_all(contents.as_bytes())
            .context("Failed to write session storage")?;
        file.as_file()
            .sync_all()
            .context("Failed to flush session storage")?;
        file.persist(&self.path)
            .with_context(|| format!("Failed to replace {}", self.path.display()))?;

        Ok(())
    }
}

impl KeyValueStore for FileStore {
    fn get(&self, key: &str) -> Result<Option<String>> {
        Ok(self.load()?.remove(key))
    }

    fn get_many(&self, keys: &[&str]) -> Result<Vec<Option<String>>> {
        let mut entries = self.load()?;
        Ok(keys.iter().map(|key| entries.remove(*key)).collect())
    }

    fn set_many(&self, entries: &[(&str, &str)]) -> Result<()> {
        let _guard = lock(&self.write_lock);
        let (mut current, _) = self.load_for_write()?;
        for (key, value) in entries {
            current.insert((*key).to_string(), (*value).to_string());
        }
        self.store(&current)
    }

    fn remove_many(&self, keys: &[&str]) -> Result<()> {
        let _guard = lock(&self.write_lock);
        if !self.path.exists() {
            return Ok(());
        }
        let (mut current, reset) = self.load_for_write()?;
        let before = current.len();
        for key in keys {
            current.remove(*key);
        }
        if current.len() == before && !reset {
            return Ok(());
        }
        self.store(&current)
    }
}

/// In-memory storage for tests and throwaway sessions.
#[derive(Debug, Default)]
pub struct MemoryStore {
    entries: Mutex<Entries>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored keys.
    pub fn len(&self) -> usize {
        lock(&self.entries).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl KeyValueStore for MemoryStore {
    fn get(&self, key: &str) -> Result<Option<String>> {
        Ok(lock(&self.entries).get(key).cloned())
    }

    fn get_many(&self, keys: &[&str]) -> Result<Vec<Option<String>>> {
        let entries = lock(&self.entries);
        Ok(keys.iter().map(|key| entries.get(*key).cloned()).collect())
    }

    fn set_many(&self, entries: &[(&str, &str)]) -> Result<()> {
        let mut current = lock(&self.entries);
        for (key, value) in entries {
            current.insert((*key).to_string(), (*value).to_string());
        }
        Ok(())
    }

    fn remove_many(&self, keys: &[&str]) -> Result<()> {
        let mut current = lock(&self.entries);
        for key in keys {
            current.remove(*key);
        }
        Ok(())
    }
}
