// File: src/store.rs
//! The reminders store capability the scanner talks to, plus an in-memory
//! implementation used by tests and dry runs.
use crate::model::{ListDescriptor, NewReminder, ReminderRecord};
use crate::scanner::scheduler::{EventSender, WatchEvent};
use anyhow::Result;
use chrono::{DateTime, Utc};
use std::sync::{Mutex, MutexGuard};

/// Keeps a change subscription alive. Dropping it stops notifications
/// where the store supports that.
#[derive(Default)]
pub struct Subscription {
    _guard: Option<Box<dyn std::any::Any + Send>>,
}

impl Subscription {
    pub fn new<T: Send + 'static>(guard: T) -> Self {
        Self {
            _guard: Some(Box::new(guard)),
        }
    }

    pub fn none() -> Self {
        Self::default()
    }
}

impl std::fmt::Debug for Subscription {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Subscription")
            .field("active", &self._guard.is_some())
            .finish()
    }
}

/// Capability interface over a reminders store.
///
/// Methods are async because real stores fetch asynchronously; callers
/// await each call before moving on.
#[allow(async_fn_in_trait)]
pub trait ReminderStore {
    async fn list_calendars(&self) -> Result<Vec<ListDescriptor>>;

    /// Fails if a list with that name (case-insensitive) already exists.
    async fn create_list(&self, name: &str) -> Result<ListDescriptor>;

    /// All records of the list, completed and open.
    async fn fetch_records(&self, list: &ListDescriptor) -> Result<Vec<ReminderRecord>>;

    async fn create_record(
        &self,
        list: &ListDescriptor,
        draft: NewReminder,
    ) -> Result<ReminderRecord>;

    /// Persists the mutable fields of `record` and stamps `last_modified`.
    async fn update_record(&self, record: &ReminderRecord) -> Result<ReminderRecord>;

    async fn delete_record(&self, record: &ReminderRecord) -> Result<()>;

    /// Sends [`WatchEvent::StoreChanged`] into `events` whenever any record changes.
    fn subscribe(&self, events: EventSender) -> Result<Subscription>;

    async fn find_list(&self, name: &str) -> Result<Option<ListDescriptor>> {
        Ok(self
            .list_calendars()
            .await?
            .into_iter()
            .find(|l| l.matches_name(name)))
    }

    async fn find_or_create_list(&self, name: &str) -> Result<ListDescriptor> {
        match self.find_list(name).await? {
            Some(list) => Ok(list),
            None => {
                log::info!("Creating list '{}'", name);
                self.create_list(name).await
            }
        }
    }
}

#[derive(Debug, Default)]
struct MemoryInner {
    lists: Vec<ListDescriptor>,
    records: Vec<ReminderRecord>,
    writes: usize,
    events: Option<EventSender>,
}

impl MemoryInner {
    fn notify(&self) {
        if let Some(tx) = &self.events {
            let _ = tx.send(WatchEvent::StoreChanged);
        }
    }

    fn ensure_list(&mut self, name: &str) -> ListDescriptor {
        if let Some(list) = self.lists.iter().find(|l| l.matches_name(name)) {
            return list.clone();
        }
        let list = ListDescriptor {
            id: uuid::Uuid::new_v4().to_string(),
            name: name.to_string(),
        };
        self.lists.push(list.clone());
        list
    }
}

/// Store kept entirely in memory.
///
/// `write_count` counts the mutating trait calls, which is how tests tell
/// an idle pass from a busy one. The `*_external` helpers change data the
/// way another client would: they do not count as writes but do notify.
#[derive(Debug, Default)]
pub struct MemoryStore {
    inner: Mutex<MemoryInner>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn inner(&self) -> MutexGuard<'_, MemoryInner> {
        self.inner.lock().unwrap_or_else(|e| e.into_inner())
    }

    pub fn write_count(&self) -> usize {
        self.inner().writes
    }

    pub fn reset_write_count(&self) {
        self.inner().writes = 0;
    }

    /// Records on `list_name`, in store order.
    pub fn records(&self, list_name: &str) -> Vec<ReminderRecord> {
        let inner = self.inner();
        let Some(list) = inner.lists.iter().find(|l| l.matches_name(list_name)) else {
            return Vec::new();
        };
        inner
            .records
            .iter()
            .filter(|r| r.list_name == list.name)
            .cloned()
            .collect()
    }

    pub fn find_record(&self, list_name: &str, title: &str) -> Option<ReminderRecord> {
        self.records(list_name).into_iter().find(|r| r.title == title)
    }

    /// Adds a record as if another client created it, with an explicit timestamp.
    pub fn insert_external(
        &self,
        list_name: &str,
        draft: NewReminder,
        last_modified: DateTime<Utc>,
    ) -> ReminderRecord {
        let mut inner = self.inner();
        let list = inner.ensure_list(list_name);
        let record = draft.into_record(&list, last_modified);
        inner.records.push(record.clone());
        inner.notify();
        record
    }

    /// Applies `f` to the record with `id` as another client would.
    pub fn modify_external<F>(&self, id: &str, f: F) -> Option<ReminderRecord>
    where
        F: FnOnce(&mut ReminderRecord),
    {
        let mut inner = self.inner();
        let record = inner.records.iter_mut().find(|r| r.id == id)?;
        f(record);
        let updated = record.clone();
        inner.notify();
        Some(updated)
    }

    pub fn remove_external(&self, id: &str) -> bool {
        let mut inner = self.inner();
        let before = inner.records.len();
        inner.records.retain(|r| r.id != id);
        let removed = inner.records.len() != before;
        if removed {
            inner.notify();
        }
        removed
    }
}

impl ReminderStore for MemoryStore {
    async fn list_calendars(&self) -> Result<Vec<ListDescriptor>> {
        Ok(self.inner().lists.clone())
    }

    async fn create_list(&self, name: &str) -> Result<ListDescriptor> {
        let mut inner = self.inner();
        if inner.lists.iter().any(|l| l.matches_name(name)) {
            anyhow::bail!("A list named '{}' already exists", name);
        }
        inner.writes += 1;
        let list = inner.ensure_list(name);
        inner.notify();
        Ok(list)
    }

    async fn fetch_records(&self, list: &ListDescriptor) -> Result<Vec<ReminderRecord>> {
        let inner = self.inner();
        if !inner.lists.iter().any(|l| l.id == list.id) {
            anyhow::bail!("Unknown list '{}'", list.name);
        }
        Ok(inner
            .records
            .iter()
            .filter(|r| r.list_name == list.name)
            .cloned()
            .collect())
    }

    async fn create_record(
        &self,
        list: &ListDescriptor,
        draft: NewReminder,
    ) -> Result<ReminderRecord> {
        let mut inner = self.inner();
        if !inner.lists.iter().any(|l| l.id == list.id) {
            anyhow::bail!("Unknown list '{}'", list.name);
        }
        let record = draft.into_record(list, Utc::now());
        inner.records.push(record.clone());
        inner.writes += 1;
        inner.notify();
        Ok(record)
    }

    async fn update_record(&self, record: &ReminderRecord) -> Result<ReminderRecord> {
        let mut inner = self.inner();
        let Some(slot) = inner.records.iter_mut().find(|r| r.id == record.id) else {
            anyhow::bail!("Reminder '{}' no longer exists", record.title);
        };
        *slot = record.clone();
        slot.last_modified = Utc::now();
        let updated = slot.clone();
        inner.writes += 1;
        inner.notify();
        Ok(updated)
    }

    async fn delete_record(&self, record: &ReminderRecord) -> Result<()> {
        let mut inner = self.inner();
        let before = inner.records.len();
        inner.records.retain(|r| r.id != record.id);
        if inner.records.len() == before {
            anyhow::bail!("Reminder '{}' no longer exists", record.title);
        }
        inner.writes += 1;
        inner.notify();
        Ok(())
    }

    fn subscribe(&self, events: EventSender) -> Result<Subscription> {
        self.inner().events = Some(events);
        Ok(Subscription::none())
    }
}
