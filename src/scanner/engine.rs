// File: ./src/scanner/engine.rs
// The reconciliation pass: converges every watched file with its reminder list.
use crate::config::WatchSettings;
use crate::model::checklist::decode_document;
use crate::model::due::dates_differ;
use crate::model::{ChecklistLine, NewReminder, ReminderRecord, title_key};
use crate::scanner::patcher;
use crate::scanner::snapshot::{Side, Snapshot, was_present};
use crate::scanner::vault::{self, WatchedFile};
use crate::store::ReminderStore;
use anyhow::{Context, Result};
use chrono::{Local, NaiveDate};
use std::collections::{HashMap, HashSet};
use std::fmt;
use std::path::{Path, PathBuf};

/// What one pass did to one (file, list) pair.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FileReport {
    pub path: PathBuf,
    pub list_name: String,
    pub created_in_store: usize,
    pub updated_in_store: usize,
    pub deleted_from_store: usize,
    pub toggled_in_file: usize,
    pub redated_in_file: usize,
    pub removed_from_file: usize,
    pub appended_to_file: usize,
    /// Set when the pair was abandoned for this pass.
    pub error: Option<String>,
}

impl FileReport {
    fn new(file: &WatchedFile) -> Self {
        Self {
            path: file.path.clone(),
            list_name: file.list_name.clone(),
            ..Self::default()
        }
    }

    pub fn store_writes(&self) -> usize {
        self.created_in_store + self.updated_in_store + self.deleted_from_store
    }

    pub fn file_writes(&self) -> usize {
        self.toggled_in_file + self.redated_in_file + self.removed_from_file + self.appended_to_file
    }

    pub fn writes(&self) -> usize {
        self.store_writes() + self.file_writes()
    }

    pub fn is_ok(&self) -> bool {
        self.error.is_none()
    }
}

impl fmt::Display for FileReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if let Some(err) = &self.error {
            return write!(f, "{}: failed: {}", self.list_name, err);
        }
        if self.writes() == 0 {
            return write!(f, "{}: in sync", self.list_name);
        }
        write!(
            f,
            "{}: store +{} ~{} -{}, file ~{} date {} -{} +{}",
            self.list_name,
            self.created_in_store,
            self.updated_in_store,
            self.deleted_from_store,
            self.toggled_in_file,
            self.redated_in_file,
            self.removed_from_file,
            self.appended_to_file
        )
    }
}

/// Outcome of one pass over all watched files.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PassReport {
    pub files: Vec<FileReport>,
    /// Files skipped because another file already claimed their list name.
    pub skipped: Vec<PathBuf>,
}

impl PassReport {
    pub fn writes(&self) -> usize {
        self.files.iter().map(FileReport::writes).sum()
    }

    pub fn failed(&self) -> usize {
        self.files.iter().filter(|f| !f.is_ok()).count()
    }

    pub fn file(&self, list_name: &str) -> Option<&FileReport> {
        self.files
            .iter()
            .find(|f| f.list_name.eq_ignore_ascii_case(list_name))
    }
}

/// Keeps the first item per normalized title and warns about the rest.
fn first_by_title<T, F>(items: Vec<T>, key: F, origin: &str) -> Vec<T>
where
    F: Fn(&T) -> String,
{
    let mut seen = HashSet::new();
    items
        .into_iter()
        .filter(|item| {
            let k = key(item);
            if seen.insert(k.clone()) {
                true
            } else {
                log::warn!(
                    "Duplicate title '{}' in {}; only the first occurrence is synced",
                    k,
                    origin
                );
                false
            }
        })
        .collect()
}

/// Whether `line`, once written, decodes to the same title and due date as
/// `record`. A title ending in something like ` – Saturday 12 Jul` does not.
fn reads_back_as(line: &ChecklistLine, record: &ReminderRecord, today: NaiveDate) -> bool {
    ChecklistLine::decode(&line.raw, 0, today).is_some_and(|decoded| {
        decoded.key() == record.key() && !dates_differ(decoded.due.as_ref(), record.due.as_ref())
    })
}

fn read_file(path: &Path) -> Result<String> {
    std::fs::read_to_string(path).with_context(|| format!("Failed to read {:?}", path))
}

/// Runs reconciliation passes against one store and one watch root.
#[derive(Debug)]
pub struct Reconciler<S> {
    store: S,
    settings: WatchSettings,
    reference_date: Option<NaiveDate>,
}

impl<S: ReminderStore> Reconciler<S> {
    pub fn new(store: S, settings: WatchSettings) -> Self {
        Self {
            store,
            settings,
            reference_date: None,
        }
    }

    /// Pins the date used to resolve the year of date suffixes.
    /// Without it, today's local date is used on every pass.
    pub fn with_reference_date(mut self, date: NaiveDate) -> Self {
        self.reference_date = Some(date);
        self
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    pub fn settings(&self) -> &WatchSettings {
        &self.settings
    }

    fn today(&self) -> NaiveDate {
        self.reference_date
            .unwrap_or_else(|| Local::now().date_naive())
    }

    /// Reconciles every watched file with its list.
    ///
    /// `prior` is the snapshot returned by the previous pass; `None` on the
    /// first pass, which then never infers deletions. Failures of a single
    /// file are recorded in its [`FileReport`] and the pass moves on. Only a
    /// watch root that cannot be listed fails the whole pass.
    pub async fn run_pass(&self, prior: Option<&Snapshot>) -> Result<(Snapshot, PassReport)> {
        let files = vault::discover(&self.settings.root, &self.settings.file_suffix)?;
        let today = self.today();
        let mut next = Snapshot::new();
        let mut report = PassReport::default();
        let mut claimed: HashMap<String, PathBuf> = HashMap::new();

        for file in files {
            let name_key = file.list_name.to_lowercase();
            if let Some(owner) = claimed.get(&name_key) {
                log::warn!(
                    "Skipping {:?}: list '{}' is already synced with {:?}",
                    file.path,
                    file.list_name,
                    owner
                );
                report.skipped.push(file.path);
                continue;
            }
            claimed.insert(name_key, file.path.clone());

            let mut file_report = FileReport::new(&file);
            let path = file.path.clone();
            let list_name = file.list_name.clone();
            if let Err(e) = self
                .reconcile_file(file, prior, today, &mut next, &mut file_report)
                .await
            {
                log::error!("Failed to sync {:?} with list '{}': {:#}", path, list_name, e);
                file_report.error = Some(format!("{:#}", e));
                next.carry_over(prior, &path, &list_name);
            } else if file_report.writes() > 0 {
                log::info!("{}", file_report);
            } else {
                log::debug!("{}", file_report);
            }
            report.files.push(file_report);
        }

        log::info!(
            "Pass finished: {} file(s), {} write(s), {} failure(s)",
            report.files.len(),
            report.writes(),
            report.failed()
        );
        Ok((next, report))
    }

    async fn reconcile_file(
        &self,
        mut file: WatchedFile,
        prior: Option<&Snapshot>,
        today: NaiveDate,
        next: &mut Snapshot,
        report: &mut FileReport,
    ) -> Result<()> {
        let path = file.path.clone();
        let file_key = path.to_string_lossy().to_string();
        let origin = format!("{:?}", path);

        let content = read_file(&path)?;
        let lines = first_by_title(decode_document(&content, today), ChecklistLine::key, &origin);

        let list = self.store.find_or_create_list(&file.list_name).await?;
        let records = first_by_title(
            self.store.fetch_records(&list).await?,
            ReminderRecord::key,
            &format!("list '{}'", list.name),
        );
        let by_title: HashMap<String, &ReminderRecord> =
            records.iter().map(|r| (r.key(), r)).collect();
        let line_titles: HashSet<String> = lines.iter().map(ChecklistLine::key).collect();

        for line in &lines {
            let title = line.key();
            match by_title.get(&title) {
                Some(record) => self.reconcile_pair(&file, line, record, report).await?,
                None if was_present(prior, Side::Store, &file.list_name, &title) => {
                    log::info!("'{}' was deleted from list '{}'; removing it from {:?}", title, list.name, path);
                    patcher::remove_line(&path, line)?;
                    report.removed_from_file += 1;
                }
                None => {
                    log::info!("Creating '{}' in list '{}'", title, list.name);
                    self.store
                        .create_record(&list, NewReminder::from_line(line))
                        .await?;
                    report.created_in_store += 1;
                }
            }
        }

        for record in &records {
            let title = record.key();
            if title.is_empty() {
                log::debug!("Ignoring untitled reminder {} in list '{}'", record.id, list.name);
                continue;
            }
            if line_titles.contains(&title) {
                continue;
            }
            if was_present(prior, Side::File, &file_key, &title) {
                log::info!("'{}' was deleted from {:?}; deleting it from list '{}'", title, path, list.name);
                self.store.delete_record(record).await?;
                report.deleted_from_store += 1;
            } else {
                let line = record.to_checklist_line();
                if !reads_back_as(&line, record, today) {
                    log::warn!(
                        "'{}' in list '{}' would read back as a different item; not adding it to {:?}",
                        title,
                        list.name,
                        path
                    );
                    continue;
                }
                log::info!("Appending '{}' from list '{}' to {:?}", title, list.name, path);
                patcher::append_under_section(&path, &self.settings.section_header, &line.raw)?;
                report.appended_to_file += 1;
            }
        }

        let file_titles: Vec<String> = decode_document(&read_file(&path)?, today)
            .iter()
            .map(ChecklistLine::key)
            .collect();
        let store_titles: Vec<String> = self
            .store
            .fetch_records(&list)
            .await?
            .iter()
            .map(ReminderRecord::key)
            .collect();
        file.refresh()?;

        next.capture(&path, file.modified_at, &file.list_name, file_titles, store_titles);
        Ok(())
    }

    /// Converges one line with its record. The newer side wins; on equal
    /// timestamps the store wins.
    async fn reconcile_pair(
        &self,
        file: &WatchedFile,
        line: &ChecklistLine,
        record: &ReminderRecord,
        report: &mut FileReport,
    ) -> Result<()> {
        let date_different = dates_differ(line.due.as_ref(), record.due.as_ref());

        if record.last_modified < file.modified_at {
            let mut updated = record.clone();
            updated.set_completed(line.completed);
            if date_different {
                updated.due = line.due;
                updated.alarm = None;
            }
            updated.ensure_alarm();

            if updated.completed != record.completed
                || date_different
                || updated.alarm != record.alarm
            {
                log::info!(
                    "Updating '{}' in list '{}' from {:?}",
                    title_key(&record.title),
                    record.list_name,
                    file.path
                );
                self.store.update_record(&updated).await?;
                report.updated_in_store += 1;
            }
            return Ok(());
        }

        let mut current = line.clone();
        if record.completed != line.completed {
            log::info!(
                "Marking '{}' as {} in {:?}",
                line.key(),
                if record.completed { "done" } else { "open" },
                file.path
            );
            current = patcher::toggle_completion(&file.path, &current, record.completed)?;
            report.toggled_in_file += 1;
        }
        if date_different {
            log::info!("Updating the due date of '{}' in {:?}", line.key(), file.path);
            patcher::replace_date_suffix(&file.path, &current, record.due.as_ref())?;
            report.redated_in_file += 1;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::TestContext;
    use crate::store::MemoryStore;
    use std::time::Duration;

    fn settings(ctx: &TestContext) -> WatchSettings {
        WatchSettings {
            root: ctx.notes_dir(),
            file_suffix: ".todo.md".to_string(),
            section_header: "## Added in Reminders".to_string(),
            scan_interval: Duration::from_secs(60),
            debounce: Duration::from_millis(10),
        }
    }

    fn reconciler(ctx: &TestContext) -> Reconciler<MemoryStore> {
        Reconciler::new(MemoryStore::new(), settings(ctx))
            .with_reference_date(NaiveDate::from_ymd_opt(2025, 7, 1).unwrap())
    }

    #[test]
    fn test_first_by_title_keeps_first() {
        let items = vec!["A", "b", " A ", "c"];
        let kept = first_by_title(items, |s| title_key(s), "test");
        assert_eq!(kept, vec!["A", "b", "c"]);
    }

    #[test]
    fn test_reads_back_as_rejects_date_like_titles() {
        let rec = MemoryStore::new().insert_external(
            "Home",
            crate::model::NewReminder::new("Party – Saturday 12 Jul", false, None),
            chrono::Utc::now(),
        );
        let today = NaiveDate::from_ymd_opt(2025, 7, 1).unwrap();
        assert!(!reads_back_as(&rec.to_checklist_line(), &rec, today));

        let mut dated = rec.clone();
        let party_day = NaiveDate::from_ymd_opt(2025, 7, 19).unwrap();
        dated.due = Some(crate::model::DueDate::Day(party_day));
        assert!(reads_back_as(&dated.to_checklist_line(), &dated, today));
    }

    #[tokio::test]
    async fn test_duplicate_lines_create_one_record() {
        let ctx = TestContext::new();
        std::fs::write(
            ctx.notes_dir().join("Home.todo.md"),
            "- [ ] Paint\n- [x] Paint\n",
        )
        .unwrap();
        let rec = reconciler(&ctx);
        let (_, report) = rec.run_pass(None).await.unwrap();
        assert_eq!(report.files[0].created_in_store, 1);
        let records = rec.store().records("Home");
        assert_eq!(records.len(), 1);
        assert!(!records[0].completed);
    }

    #[tokio::test]
    async fn test_colliding_list_names_sync_once() {
        let ctx = TestContext::new();
        let root = ctx.notes_dir();
        std::fs::create_dir_all(root.join("b")).unwrap();
        std::fs::write(root.join("Home.todo.md"), "- [ ] Paint\n").unwrap();
        std::fs::write(root.join("b/home.todo.md"), "- [ ] Sweep\n").unwrap();

        let rec = reconciler(&ctx);
        let (_, report) = rec.run_pass(None).await.unwrap();
        assert_eq!(report.files.len(), 1);
        assert_eq!(report.skipped, vec![root.join("b/home.todo.md")]);
        assert!(rec.store().find_record("Home", "Sweep").is_none());
    }

    #[test]
    fn test_report_display() {
        let mut report = FileReport {
            list_name: "Home".to_string(),
            ..FileReport::default()
        };
        assert_eq!(report.to_string(), "Home: in sync");
        report.created_in_store = 2;
        report.appended_to_file = 1;
        assert_eq!(report.to_string(), "Home: store +2 ~0 -0, file ~0 date 0 -0 +1");
        report.error = Some("boom".to_string());
        assert_eq!(report.to_string(), "Home: failed: boom");
    }
}
