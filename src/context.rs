// File: ./src/context.rs
/*! Application context abstraction for filesystem paths.

`AppContext` encapsulates how mdsync finds its config and data directories.
Two implementations are provided:

- `StandardContext`: uses `directories::ProjectDirs`, or an override root
  given with `--root`.
- `TestContext`: a unique temporary directory, removed when dropped.

Nothing here reads globals or environment variables; callers pass a
`&dyn AppContext` to anything that touches the filesystem.
*/

use anyhow::{Context, Result};
use directories::ProjectDirs;
use std::path::PathBuf;

/// Defines the file system context for the application.
///
/// The trait is object-safe so callers can hold `Arc<dyn AppContext>`.
pub trait AppContext: Send + Sync + std::fmt::Debug {
    fn get_data_dir(&self) -> Result<PathBuf>;
    fn get_config_dir(&self) -> Result<PathBuf>;

    fn get_config_file_path(&self) -> Result<PathBuf> {
        Ok(self.get_config_dir()?.join("config.toml"))
    }

    /// Default location of the on-disk reminders store.
    fn get_store_path(&self) -> Result<PathBuf> {
        Ok(self.get_data_dir()?.join("reminders.json"))
    }

    fn get_log_path(&self) -> Result<PathBuf> {
        Ok(self.get_data_dir()?.join("mdsync.log"))
    }
}

// --- Production Implementation ---

#[derive(Clone, Debug)]
pub struct StandardContext {
    override_root: Option<PathBuf>,
}

impl StandardContext {
    /// When `override_root` is `Some(path)`, directories are created under
    /// that root as `data` and `config`.
    pub fn new(override_root: Option<PathBuf>) -> Self {
        Self { override_root }
    }

    fn ensure_exists(path: PathBuf) -> Result<PathBuf> {
        if !path.exists() {
            std::fs::create_dir_all(&path)
                .with_context(|| format!("Failed to create directory: {:?}", path))?;
        }
        Ok(path)
    }

    fn get_proj_dirs() -> Option<ProjectDirs> {
        ProjectDirs::from("org", "mdsync", "mdsync")
    }
}

impl AppContext for StandardContext {
    fn get_data_dir(&self) -> Result<PathBuf> {
        if let Some(root) = &self.override_root {
            return Self::ensure_exists(root.join("data"));
        }
        let proj = Self::get_proj_dirs().ok_or_else(|| anyhow::anyhow!("No home directory"))?;
        Self::ensure_exists(proj.data_dir().to_path_buf())
    }

    fn get_config_dir(&self) -> Result<PathBuf> {
        if let Some(root) = &self.override_root {
            return Self::ensure_exists(root.join("config"));
        }
        let proj = Self::get_proj_dirs().ok_or_else(|| anyhow::anyhow!("No home directory"))?;
        Self::ensure_exists(proj.config_dir().to_path_buf())
    }
}

// --- Test Implementation ---

#[derive(Clone, Debug)]
pub struct TestContext {
    pub root: PathBuf,
}

impl TestContext {
    /// Creates a new TestContext backed by a unique temporary directory.
    pub fn new() -> Self {
        let uuid = uuid::Uuid::new_v4();
        let root = std::env::temp_dir().join(format!("mdsync_test_{}", uuid));
        // Tests cannot do anything useful without it.
        std::fs::create_dir_all(&root).expect("failed to create TestContext temp dir");
        Self { root }
    }

    /// A directory under the test root for Markdown files, created on demand.
    pub fn notes_dir(&self) -> PathBuf {
        let p = self.root.join("notes");
        let _ = std::fs::create_dir_all(&p);
        p
    }
}

impl Default for TestContext {
    fn default() -> Self {
        Self::new()
    }
}

impl AppContext for TestContext {
    fn get_data_dir(&self) -> Result<PathBuf> {
        let p = self.root.join("data");
        std::fs::create_dir_all(&p)?;
        Ok(p)
    }

    fn get_config_dir(&self) -> Result<PathBuf> {
        let p = self.root.join("config");
        std::fs::create_dir_all(&p)?;
        Ok(p)
    }
}

impl Drop for TestContext {
    fn drop(&mut self) {
        let _ = std::fs::remove_dir_all(&self.root);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_override_root_layout() {
        let tmp = TestContext::new();
        let ctx = StandardContext::new(Some(tmp.root.join("override")));
        let data = ctx.get_data_dir().unwrap();
        assert!(data.ends_with("override/data"));
        assert!(data.is_dir());
        assert_eq!(
            ctx.get_store_path().unwrap(),
            tmp.root.join("override/data/reminders.json")
        );
        assert_eq!(
            ctx.get_config_file_path().unwrap(),
            tmp.root.join("override/config/config.toml")
        );
    }

    #[test]
    fn test_test_context_cleans_up() {
        let root = {
            let ctx = TestContext::new();
            ctx.notes_dir();
            ctx.root.clone()
        };
        assert!(!root.exists());
    }
}
