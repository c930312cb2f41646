// File: ./src/scanner/mod.rs
//! Synchronization of Markdown checklists with the reminders store.
//!
//! [`vault`] finds the files, [`engine`] reconciles each one with its list,
//! [`patcher`] applies the file edits, [`snapshot`] remembers what each pass
//! saw and [`scheduler`] decides when passes run.
pub mod engine;
pub mod patcher;
pub mod scheduler;
pub mod snapshot;
pub mod vault;

pub use engine::{FileReport, PassReport, Reconciler};
pub use scheduler::{WatchEvent, WatchScheduler};
pub use snapshot::Snapshot;
