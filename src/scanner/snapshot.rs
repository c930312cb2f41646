// File: ./src/scanner/snapshot.rs
// Titles observed on each side at the end of a pass, used to tell a deletion
// from an item that never existed.
use chrono::{DateTime, Utc};
use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};
use strum::Display;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Display)]
#[strum(serialize_all = "lowercase")]
pub enum Side {
    File,
    Store,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileSnapshot {
    pub path: PathBuf,
    /// File modification time when the titles were read.
    pub observed_at: DateTime<Utc>,
    pub titles: HashSet<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ListSnapshot {
    pub list_name: String,
    pub titles: HashSet<String>,
}

/// State observed after one pass. Produced by a pass and handed to the next;
/// never mutated while a pass is reading it.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Snapshot {
    files: HashMap<PathBuf, FileSnapshot>,
    // keyed by lowercased list name
    lists: HashMap<String, ListSnapshot>,
}

impl Snapshot {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builds the entries for one (file, list) pair from the converged titles.
    pub fn capture<F, S>(
        &mut self,
        path: &Path,
        observed_at: DateTime<Utc>,
        list_name: &str,
        file_titles: F,
        store_titles: S,
    ) where
        F: IntoIterator<Item = String>,
        S: IntoIterator<Item = String>,
    {
        self.record_file(FileSnapshot {
            path: path.to_path_buf(),
            observed_at,
            titles: file_titles.into_iter().collect(),
        });
        self.record_list(ListSnapshot {
            list_name: list_name.to_string(),
            titles: store_titles.into_iter().collect(),
        });
    }

    pub fn record_file(&mut self, file: FileSnapshot) {
        self.files.insert(file.path.clone(), file);
    }

    pub fn record_list(&mut self, list: ListSnapshot) {
        self.lists.insert(list.list_name.to_lowercase(), list);
    }

    /// Copies the entries for `path` and `list_name` from `prior`, so a file
    /// whose pass failed keeps the state it had before.
    pub fn carry_over(&mut self, prior: Option<&Snapshot>, path: &Path, list_name: &str) {
        let Some(prior) = prior else { return };
        if let Some(file) = prior.file(path) {
            self.record_file(file.clone());
        }
        if let Some(list) = prior.list(list_name) {
            self.record_list(list.clone());
        }
    }

    pub fn file(&self, path: &Path) -> Option<&FileSnapshot> {
        self.files.get(path)
    }

    pub fn list(&self, list_name: &str) -> Option<&ListSnapshot> {
        self.lists.get(&list_name.to_lowercase())
    }

    /// Whether `title` was seen on `side`. `key` is the file path for
    /// [`Side::File`] and the list name for [`Side::Store`].
    pub fn was_present(&self, side: Side, key: &str, title: &str) -> bool {
        match side {
            Side::File => self
                .file(Path::new(key))
                .is_some_and(|f| f.titles.contains(title)),
            Side::Store => self.list(key).is_some_and(|l| l.titles.contains(title)),
        }
    }

    pub fn file_count(&self) -> usize {
        self.files.len()
    }

    pub fn is_empty(&self) -> bool {
        self.files.is_empty() && self.lists.is_empty()
    }
}

/// Deletion inference helper: without a prior snapshot nothing was present.
pub fn was_present(prior: Option<&Snapshot>, side: Side, key: &str, title: &str) -> bool {
    prior.is_some_and(|s| s.was_present(side, key, title))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn snapshot() -> Snapshot {
        let mut snap = Snapshot::new();
        snap.capture(
            Path::new("/n/Home.todo.md"),
            Utc::now(),
            "Home",
            vec!["Paint".to_string()],
            vec!["Paint".to_string(), "Sweep".to_string()],
        );
        snap
    }

    #[test]
    fn test_first_pass_never_reports_presence() {
        assert!(!was_present(None, Side::Store, "Home", "Paint"));
        assert!(was_present(Some(&snapshot()), Side::Store, "Home", "Paint"));
    }

    #[test]
    fn test_sides_are_separate() {
        let snap = snapshot();
        assert!(snap.was_present(Side::Store, "home", "Sweep"));
        assert!(!snap.was_present(Side::File, "/n/Home.todo.md", "Sweep"));
        assert!(snap.was_present(Side::File, "/n/Home.todo.md", "Paint"));
        assert!(!snap.was_present(Side::File, "/n/Other.todo.md", "Paint"));
    }

    #[test]
    fn test_carry_over_copies_only_named_entries() {
        let prior = snapshot();
        let mut next = Snapshot::new();
        next.carry_over(Some(&prior), Path::new("/n/Home.todo.md"), "Home");
        assert_eq!(next, prior);

        let mut other = Snapshot::new();
        other.carry_over(Some(&prior), Path::new("/n/Work.todo.md"), "Work");
        assert!(other.is_empty());
        other.carry_over(None, Path::new("/n/Home.todo.md"), "Home");
        assert!(other.is_empty());
    }

    #[test]
    fn test_side_display() {
        assert_eq!(Side::File.to_string(), "file");
        assert_eq!(Side::Store.to_string(), "store");
    }
}
