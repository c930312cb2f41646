// File: ./src/storage.rs
// Local file storage for reminder lists and records.
//
// ⚠️ VERSION BUMP REQUIRED:
// Changes to ReminderRecord or ListDescriptor serialization require
// incrementing LOCAL_STORAGE_VERSION below.
use crate::model::{ListDescriptor, NewReminder, ReminderRecord};
use crate::scanner::scheduler::{EventSender, WatchEvent};
use crate::store::{ReminderStore, Subscription};
use anyhow::{Context, Result};
use chrono::Utc;
use fs2::FileExt;
use notify::{EventKind, RecursiveMode, Watcher};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

// Version history:
// - v1: lists + records with notes/priority/completion_date/alarm
const LOCAL_STORAGE_VERSION: u32 = 1;

/// On-disk layout of the store file.
#[derive(Serialize, Deserialize, Default)]
struct LocalStorageData {
    #[serde(default)]
    version: u32,
    #[serde(default)]
    lists: Vec<ListDescriptor>,
    #[serde(default)]
    records: Vec<ReminderRecord>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum LoadState {
    /// Never attempted to load
    Uninitialized,
    /// Last load succeeded
    Success,
    /// Last load failed (deserialization error, corruption, etc.)
    Failed,
}

/// A reminders store persisted as one JSON file.
///
/// Every operation re-reads the file under an exclusive lock, so several
/// processes (or a human with an editor) can share it. When a load fails the
/// instance refuses to save, so an unreadable file is never overwritten with
/// partial data.
#[derive(Debug)]
pub struct LocalStorage {
    path: PathBuf,
    load_state: Mutex<LoadState>,
}

impl LocalStorage {
    /// Opens (without creating) the store at `path`, creating its directory.
    pub fn open(path: impl Into<PathBuf>) -> Result<Self> {
        let path = path.into();
        if let Some(parent) = path.parent()
            && !parent.as_os_str().is_empty()
        {
            fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create directory: {:?}", parent))?;
        }
        Ok(Self {
            path,
            load_state: Mutex::new(LoadState::Uninitialized),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Helper to get a sidecar lock file path
    fn get_lock_path(file_path: &Path) -> PathBuf {
        let mut lock_path = file_path.to_path_buf();
        if let Some(ext) = lock_path.extension() {
            let mut new_ext = ext.to_os_string();
            new_ext.push(".lock");
            lock_path.set_extension(new_ext);
        } else {
            lock_path.set_extension("lock");
        }
        lock_path
    }

    /// Runs `f` while holding an exclusive lock on a sidecar `.lock` file.
    pub fn with_lock<F, T>(file_path: &Path, f: F) -> Result<T>
    where
        F: FnOnce() -> Result<T>,
    {
        let lock_path = Self::get_lock_path(file_path);
        let file = fs::OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(false)
            .open(&lock_path)
            .with_context(|| format!("Failed to open lock file {:?}", lock_path))?;

        file.lock_exclusive()?;
        let result = f();
        file.unlock()?;
        result
    }

    /// Atomic write: Write to .tmp file then rename
    pub fn atomic_write<P: AsRef<Path>, C: AsRef<[u8]>>(path: P, contents: C) -> Result<()> {
        let path = path.as_ref();
        let tmp_path = path.with_extension("tmp");
        fs::write(&tmp_path, contents)?;
        fs::rename(tmp_path, path)?;
        Ok(())
    }

    fn set_load_state(&self, state: LoadState) {
        *self.load_state.lock().unwrap_or_else(|e| e.into_inner()) = state;
    }

    /// Check if saving is allowed: false after a failed load.
    pub fn can_save(&self) -> bool {
        match *self.load_state.lock().unwrap_or_else(|e| e.into_inner()) {
            LoadState::Uninitialized => true,
            LoadState::Success => true,
            LoadState::Failed => false,
        }
    }

    /// Reads the file. Caller must hold the lock.
    fn load_unlocked(&self) -> Result<LocalStorageData> {
        if !self.path.exists() {
            return Ok(LocalStorageData {
                version: LOCAL_STORAGE_VERSION,
                ..LocalStorageData::default()
            });
        }
        let json = fs::read_to_string(&self.path)
            .with_context(|| format!("Failed to read store {:?}", self.path))?;
        if json.trim().is_empty() {
            return Ok(LocalStorageData::default());
        }
        let data: LocalStorageData = serde_json::from_str(&json)
            .with_context(|| format!("Failed to parse store {:?}", self.path))?;
        if data.version > LOCAL_STORAGE_VERSION {
            anyhow::bail!(
                "Store {:?} was written by a newer version (v{}, this build reads v{})",
                self.path,
                data.version,
                LOCAL_STORAGE_VERSION
            );
        }
        Ok(data)
    }

    /// Writes the file. Caller must hold the lock.
    fn save_unlocked(&self, data: &mut LocalStorageData) -> Result<()> {
        if !self.can_save() {
            return Err(anyhow::anyhow!(
                "Cannot save {:?}: previous load failed. This prevents overwriting data that couldn't be read.",
                self.path
            ));
        }
        data.version = LOCAL_STORAGE_VERSION;
        let json = serde_json::to_string_pretty(data)?;
        Self::atomic_write(&self.path, json)
    }

    fn read<T, F>(&self, f: F) -> Result<T>
    where
        F: FnOnce(&LocalStorageData) -> Result<T>,
    {
        let result = Self::with_lock(&self.path, || self.load_unlocked());
        match &result {
            Ok(_) => self.set_load_state(LoadState::Success),
            Err(_) => self.set_load_state(LoadState::Failed),
        }
        f(&result?)
    }

    fn modify<T, F>(&self, f: F) -> Result<T>
    where
        F: FnOnce(&mut LocalStorageData) -> Result<T>,
    {
        Self::with_lock(&self.path, || {
            let mut data = match self.load_unlocked() {
                Ok(data) => {
                    self.set_load_state(LoadState::Success);
                    data
                }
                Err(e) => {
                    self.set_load_state(LoadState::Failed);
                    return Err(e);
                }
            };
            let out = f(&mut data)?;
            self.save_unlocked(&mut data)?;
            Ok(out)
        })
    }

    fn require_list(data: &LocalStorageData, list: &ListDescriptor) -> Result<()> {
        if data.lists.iter().any(|l| l.id == list.id) {
            Ok(())
        } else {
            Err(anyhow::anyhow!("Unknown list '{}'", list.name))
        }
    }
}

impl ReminderStore for LocalStorage {
    async fn list_calendars(&self) -> Result<Vec<ListDescriptor>> {
        self.read(|data| Ok(data.lists.clone()))
    }

    async fn create_list(&self, name: &str) -> Result<ListDescriptor> {
        self.modify(|data| {
            if data.lists.iter().any(|l| l.matches_name(name)) {
                anyhow::bail!("A list named '{}' already exists", name);
            }
            let list = ListDescriptor {
                id: uuid::Uuid::new_v4().to_string(),
                name: name.to_string(),
            };
            data.lists.push(list.clone());
            Ok(list)
        })
    }

    async fn fetch_records(&self, list: &ListDescriptor) -> Result<Vec<ReminderRecord>> {
        self.read(|data| {
            Self::require_list(data, list)?;
            Ok(data
                .records
                .iter()
                .filter(|r| r.list_name == list.name)
                .cloned()
                .collect())
        })
    }

    async fn create_record(
        &self,
        list: &ListDescriptor,
        draft: NewReminder,
    ) -> Result<ReminderRecord> {
        self.modify(|data| {
            Self::require_list(data, list)?;
            let record = draft.into_record(list, Utc::now());
            data.records.push(record.clone());
            Ok(record)
        })
    }

    async fn update_record(&self, record: &ReminderRecord) -> Result<ReminderRecord> {
        self.modify(|data| {
            let slot = data
                .records
                .iter_mut()
                .find(|r| r.id == record.id)
                .ok_or_else(|| anyhow::anyhow!("Reminder '{}' no longer exists", record.title))?;
            *slot = record.clone();
            slot.last_modified = Utc::now();
            Ok(slot.clone())
        })
    }

    async fn delete_record(&self, record: &ReminderRecord) -> Result<()> {
        self.modify(|data| {
            let before = data.records.len();
            data.records.retain(|r| r.id != record.id);
            if data.records.len() == before {
                anyhow::bail!("Reminder '{}' no longer exists", record.title);
            }
            Ok(())
        })
    }

    /// Watches the store's directory and reports writes to the store file.
    fn subscribe(&self, events: EventSender) -> Result<Subscription> {
        let dir = self
            .path
            .parent()
            .filter(|p| !p.as_os_str().is_empty())
            .map(Path::to_path_buf)
            .unwrap_or_else(|| PathBuf::from("."));
        let file_name = self.path.file_name().map(|n| n.to_os_string());

        let mut watcher = notify::recommended_watcher(move |res: notify::Result<notify::Event>| {
            match res {
                Ok(event) => {
                    if matches!(event.kind, EventKind::Access(_)) {
                        return;
                    }
                    let touches_store = event
                        .paths
                        .iter()
                        .any(|p| p.file_name().map(|n| n.to_os_string()) == file_name);
                    if touches_store {
                        let _ = events.send(WatchEvent::StoreChanged);
                    }
                }
                Err(e) => log::warn!("Store watcher error: {}", e),
            }
        })
        .context("Failed to create store watcher")?;
        watcher
            .watch(&dir, RecursiveMode::NonRecursive)
            .with_context(|| format!("Failed to watch store directory {:?}", dir))?;

        Ok(Subscription::new(watcher))
    }
}
