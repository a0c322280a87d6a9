//! Persisted index of features keel installed
//!
//! The index lives at `lib/.keel/installed.json` under the install
//! directory. Readers take a shared lock and writers an exclusive one on a
//! sibling lock file, so concurrent invocations against one installation
//! serialize their mutations. Writes go through a temp file and a rename.

use std::fs::{self, File, OpenOptions};
use std::path::{Path, PathBuf};

use fs2::FileExt;
use keel_core::error::KeelError;
use keel_core::types::InstalledFeatureRecord;
use tracing::debug;

use crate::InstallResult;

const STATE_FILE: &str = "installed.json";
const LOCK_FILE: &str = "installed.lock";

/// Location of the persisted index
#[derive(Debug, Clone)]
pub struct InstalledStateStore {
    path: PathBuf,
    lock_path: PathBuf,
}

/// Exclusive access to the index for the duration of a mutation
#[derive(Debug)]
pub struct StateGuard {
    path: PathBuf,
    records: Vec<InstalledFeatureRecord>,
    // Held until the guard drops
    _lock: File,
}

impl InstalledStateStore {
    /// Store inside the given state directory (`<install>/lib/.keel`)
    pub fn new(state_dir: impl AsRef<Path>) -> Self {
        let dir = state_dir.as_ref();
        Self {
            path: dir.join(STATE_FILE),
            lock_path: dir.join(LOCK_FILE),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Read the current records under a shared lock.
    ///
    /// A missing index is an empty installation; an unreadable or
    /// unparseable one is corruption and fatal.
    pub fn load(&self) -> InstallResult<Vec<InstalledFeatureRecord>> {
        if !self.path.exists() {
            return Ok(Vec::new());
        }
        let lock = self.open_lock()?;
        lock.lock_shared()
            .map_err(|e| KeelError::io(format!("Failed to lock {}", self.lock_path.display()), e))?;
        let records = read_records(&self.path);
        let _ = lock.unlock();
        records
    }

    /// Take the exclusive lock and read the records for mutation
    pub fn lock(&self) -> InstallResult<StateGuard> {
        let lock = self.open_lock()?;
        lock.lock_exclusive()
            .map_err(|e| KeelError::io(format!("Failed to lock {}", self.lock_path.display()), e))?;

        let records = if self.path.exists() {
            read_records(&self.path)?
        } else {
            Vec::new()
        };
        debug!(path = %self.path.display(), records = records.len(), "installed state locked");

        Ok(StateGuard {
            path: self.path.clone(),
            records,
            _lock: lock,
        })
    }

    fn open_lock(&self) -> InstallResult<File> {
        if let Some(parent) = self.lock_path.parent() {
            fs::create_dir_all(parent)
                .map_err(|e| KeelError::io(format!("Failed to create {}", parent.display()), e))?;
        }
        OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(false)
            .open(&self.lock_path)
            .map_err(|e| KeelError::io(format!("Failed to open {}", self.lock_path.display()), e))
    }
}

impl StateGuard {
    pub fn records(&self) -> &[InstalledFeatureRecord] {
        &self.records
    }

    /// Find a record by symbolic or short name
    pub fn find(&self, name: &str) -> Option<&InstalledFeatureRecord> {
        self.records.iter().find(|record| {
            record.symbolic_name.eq_ignore_ascii_case(name) || record.short_name.eq_ignore_ascii_case(name)
        })
    }

    /// Add a record, replacing any record for the same symbolic name
    pub fn upsert(&mut self, record: InstalledFeatureRecord) {
        match self
            .records
            .iter_mut()
            .find(|r| r.symbolic_name.eq_ignore_ascii_case(&record.symbolic_name))
        {
            Some(existing) => *existing = record,
            None => self.records.push(record),
        }
    }

    /// Remove and return the record for a symbolic name
    pub fn remove(&mut self, symbolic_name: &str) -> Option<InstalledFeatureRecord> {
        let index = self
            .records
            .iter()
            .position(|r| r.symbolic_name.eq_ignore_ascii_case(symbolic_name))?;
        Some(self.records.remove(index))
    }

    /// Write the records back to disk
    pub fn save(&self) -> InstallResult<()> {
        let content = serde_json::to_string_pretty(&self.records).map_err(|e| {
            KeelError::io(
                format!("Failed to serialize {}", self.path.display()),
                std::io::Error::new(std::io::ErrorKind::Other, e),
            )
        })?;

        let temp = self.path.with_extension("json.tmp");
        fs::write(&temp, content)
            .map_err(|e| KeelError::io(format!("Failed to write {}", temp.display()), e))?;
        fs::rename(&temp, &self.path)
            .map_err(|e| KeelError::io(format!("Failed to replace {}", self.path.display()), e))?;

        debug!(path = %self.path.display(), records = self.records.len(), "installed state saved");
        Ok(())
    }
}

fn read_records(path: &Path) -> InstallResult<Vec<InstalledFeatureRecord>> {
    let corrupt = |reason: String| KeelError::StateCorruption {
        path: path.display().to_string(),
        reason,
    };
    let content = fs::read_to_string(path).map_err(|e| corrupt(e.to_string()))?;
    serde_json::from_str(&content).map_err(|e| corrupt(e.to_string()))
}
