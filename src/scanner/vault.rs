// File: ./src/scanner/vault.rs
// Discovery of the Markdown files under the watch root.
use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use std::path::{Path, PathBuf};
use walkdir::{DirEntry, WalkDir};

/// A checklist file under the watch root. Its list is named after the file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WatchedFile {
    pub path: PathBuf,
    pub list_name: String,
    pub modified_at: DateTime<Utc>,
}

impl WatchedFile {
    pub fn from_path(path: &Path, suffix: &str) -> Result<Self> {
        let list_name = list_name_for(path, suffix)
            .ok_or_else(|| anyhow::anyhow!("{:?} does not end with '{}'", path, suffix))?;
        Ok(Self {
            path: path.to_path_buf(),
            list_name,
            modified_at: modified_at(path)?,
        })
    }

    /// Re-reads the modification time after the file may have been patched.
    pub fn refresh(&mut self) -> Result<()> {
        self.modified_at = modified_at(&self.path)?;
        Ok(())
    }
}

fn is_hidden(entry: &DirEntry) -> bool {
    entry.depth() > 0
        && entry
            .file_name()
            .to_str()
            .map(|s| s.starts_with('.'))
            .unwrap_or(false)
}

/// The list name for `path`: its file name without `suffix`.
/// `None` when the name does not end with the suffix or nothing is left.
pub fn list_name_for(path: &Path, suffix: &str) -> Option<String> {
    let name = path.file_name()?.to_str()?;
    let stem = name.strip_suffix(suffix)?;
    if stem.trim().is_empty() {
        return None;
    }
    Some(stem.to_string())
}

/// True when `path` is a visible file under `root` carrying the suffix.
/// Used to filter raw filesystem notifications.
pub fn is_watched_path(root: &Path, suffix: &str, path: &Path) -> bool {
    let Ok(relative) = path.strip_prefix(root) else {
        return false;
    };
    let hidden = relative.components().any(|c| {
        c.as_os_str()
            .to_str()
            .map(|s| s.starts_with('.'))
            .unwrap_or(false)
    });
    !hidden && list_name_for(path, suffix).is_some()
}

pub fn modified_at(path: &Path) -> Result<DateTime<Utc>> {
    let meta = std::fs::metadata(path).with_context(|| format!("Failed to stat {:?}", path))?;
    let modified = meta
        .modified()
        .with_context(|| format!("No modification time for {:?}", path))?;
    Ok(DateTime::<Utc>::from(modified))
}

/// Lists the watched files under `root`, sorted by path.
///
/// Hidden files and directories are skipped. Entries that vanish or cannot
/// be read while walking are logged and skipped.
pub fn discover(root: &Path, suffix: &str) -> Result<Vec<WatchedFile>> {
    if !root.is_dir() {
        anyhow::bail!("Watch root {:?} is not a directory", root);
    }

    let mut files = Vec::new();
    for entry in WalkDir::new(root)
        .follow_links(false)
        .into_iter()
        .filter_entry(|e| !is_hidden(e))
    {
        let entry = match entry {
            Ok(entry) => entry,
            Err(e) => {
                log::warn!("Skipping unreadable entry under {:?}: {}", root, e);
                continue;
            }
        };
        if !entry.file_type().is_file() || list_name_for(entry.path(), suffix).is_none() {
            continue;
        }
        match WatchedFile::from_path(entry.path(), suffix) {
            Ok(file) => files.push(file),
            Err(e) => log::warn!("Skipping {:?}: {:#}", entry.path(), e),
        }
    }

    files.sort_by(|a, b| a.path.cmp(&b.path));
    Ok(files)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::TestContext;
    use std::fs;

    #[test]
    fn test_list_name_for() {
        assert_eq!(
            list_name_for(Path::new("/n/Groceries.todo.md"), ".todo.md").as_deref(),
            Some("Groceries")
        );
        assert_eq!(list_name_for(Path::new("/n/notes.md"), ".todo.md"), None);
        assert_eq!(list_name_for(Path::new("/n/.todo.md"), ".todo.md"), None);
    }

    #[test]
    fn test_discover_filters_and_sorts() {
        let ctx = TestContext::new();
        let root = ctx.notes_dir();
        fs::create_dir_all(root.join("work")).unwrap();
        fs::create_dir_all(root.join(".trash")).unwrap();
        fs::write(root.join("Home.todo.md"), "").unwrap();
        fs::write(root.join("work/Office.todo.md"), "").unwrap();
        fs::write(root.join("readme.md"), "").unwrap();
        fs::write(root.join(".trash/Old.todo.md"), "").unwrap();
        fs::write(root.join(".Hidden.todo.md"), "").unwrap();

        let files = discover(&root, ".todo.md").unwrap();
        let names: Vec<_> = files.iter().map(|f| f.list_name.as_str()).collect();
        assert_eq!(names, vec!["Home", "Office"]);
    }

    #[test]
    fn test_is_watched_path() {
        let root = Path::new("/notes");
        assert!(is_watched_path(root, ".todo.md", Path::new("/notes/a/Home.todo.md")));
        assert!(!is_watched_path(root, ".todo.md", Path::new("/notes/.git/Home.todo.md")));
        assert!(!is_watched_path(root, ".todo.md", Path::new("/other/Home.todo.md")));
        assert!(!is_watched_path(root, ".todo.md", Path::new("/notes/Home.md")));
    }

    #[test]
    fn test_missing_root_is_error() {
        let ctx = TestContext::new();
        assert!(discover(&ctx.root.join("absent"), ".todo.md").is_err());
    }
}
