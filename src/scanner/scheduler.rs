// File: ./src/scanner/scheduler.rs
// Funnels timer ticks and change notifications into one pass at a time.
use crate::scanner::engine::{PassReport, Reconciler};
use crate::scanner::snapshot::Snapshot;
use crate::scanner::vault;
use crate::store::ReminderStore;
use anyhow::{Context, Result};
use notify::{EventKind, RecommendedWatcher, RecursiveMode, Watcher};
use std::path::{Path, PathBuf};
use strum::Display;
use tokio::sync::mpsc;
use tokio::time::MissedTickBehavior;

/// Everything that can wake the scheduler.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WatchEvent {
    Tick,
    StoreChanged,
    FileChanged(PathBuf),
    Shutdown,
}

pub type EventSender = mpsc::UnboundedSender<WatchEvent>;
pub type EventReceiver = mpsc::UnboundedReceiver<WatchEvent>;

pub fn channel() -> (EventSender, EventReceiver) {
    mpsc::unbounded_channel()
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Display)]
pub enum SchedulerState {
    Idle,
    Scanning,
}

/// Owns the reconciler and the snapshot carried from pass to pass.
pub struct WatchScheduler<S> {
    reconciler: Reconciler<S>,
    snapshot: Option<Snapshot>,
    state: SchedulerState,
    passes: usize,
    coalesced: usize,
}

impl<S: ReminderStore> WatchScheduler<S> {
    pub fn new(reconciler: Reconciler<S>) -> Self {
        Self {
            reconciler,
            snapshot: None,
            state: SchedulerState::Idle,
            passes: 0,
            coalesced: 0,
        }
    }

    pub fn reconciler(&self) -> &Reconciler<S> {
        &self.reconciler
    }

    pub fn snapshot(&self) -> Option<&Snapshot> {
        self.snapshot.as_ref()
    }

    pub fn state(&self) -> SchedulerState {
        self.state
    }

    /// Number of passes completed so far.
    pub fn passes(&self) -> usize {
        self.passes
    }

    /// Number of triggers folded into another pass instead of firing their own.
    pub fn coalesced(&self) -> usize {
        self.coalesced
    }

    /// Runs one pass unless one is already running.
    ///
    /// A pass that fails as a whole (watch root unreadable) keeps the previous
    /// snapshot so the next pass still has something to infer deletions from.
    pub async fn fire(&mut self, trigger: &WatchEvent) -> Option<PassReport> {
        if self.state == SchedulerState::Scanning {
            self.coalesced += 1;
            return None;
        }
        self.state = SchedulerState::Scanning;
        log::debug!("Pass triggered by {:?}", trigger);

        let outcome = self.reconciler.run_pass(self.snapshot.as_ref()).await;
        self.state = SchedulerState::Idle;
        self.passes += 1;

        match outcome {
            Ok((snapshot, report)) => {
                self.snapshot = Some(snapshot);
                Some(report)
            }
            Err(e) => {
                log::error!("Pass failed: {:#}", e);
                None
            }
        }
    }

    /// Takes every pending event off the channel. Returns true if one of
    /// them asked for shutdown.
    fn drain(&mut self, events: &mut EventReceiver) -> bool {
        let mut shutdown = false;
        while let Ok(event) = events.try_recv() {
            if event == WatchEvent::Shutdown {
                shutdown = true;
            } else {
                self.coalesced += 1;
            }
        }
        shutdown
    }

    /// Main loop. The first tick fires immediately, so a pass runs at startup.
    ///
    /// Change events wait out the debounce window first so bursts (an editor
    /// saving, a sync client writing several records) become one pass. Events
    /// that arrive during a pass are dropped: the next pass sees their effect
    /// anyway, and the periodic tick bounds how long that can take.
    pub async fn run(&mut self, mut events: EventReceiver) -> Result<()> {
        let settings = self.reconciler.settings();
        let debounce = settings.debounce;
        let mut ticker = tokio::time::interval(settings.scan_interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        log::info!(
            "Watching {:?} for '*{}' every {}s",
            settings.root,
            settings.file_suffix,
            settings.scan_interval.as_secs()
        );

        loop {
            let trigger = tokio::select! {
                _ = ticker.tick() => WatchEvent::Tick,
                event = events.recv() => match event {
                    Some(event) => event,
                    None => {
                        log::info!("Event channel closed, stopping");
                        break;
                    }
                },
            };

            if trigger == WatchEvent::Shutdown {
                break;
            }

            let event_driven = trigger != WatchEvent::Tick;
            let mut shutdown = false;
            if event_driven && !debounce.is_zero() {
                tokio::time::sleep(debounce).await;
                shutdown = self.drain(&mut events);
            }

            self.fire(&trigger).await;
            shutdown |= self.drain(&mut events);
            if shutdown {
                break;
            }
            if event_driven {
                ticker.reset();
            }
        }

        log::info!("Stopped after {} pass(es)", self.passes);
        Ok(())
    }
}

/// Starts a recursive watcher on `root` that reports changes to watched files.
///
/// The watcher stops when the returned value is dropped.
pub fn watch_files(root: &Path, suffix: &str, events: EventSender) -> Result<RecommendedWatcher> {
    let filter_root = root.to_path_buf();
    let suffix = suffix.to_string();

    let mut watcher = notify::recommended_watcher(move |res: notify::Result<notify::Event>| {
        let event = match res {
            Ok(event) => event,
            Err(e) => {
                log::warn!("File watcher error: {}", e);
                return;
            }
        };
        if matches!(event.kind, EventKind::Access(_)) {
            return;
        }
        for path in event.paths {
            if vault::is_watched_path(&filter_root, &suffix, &path) {
                let _ = events.send(WatchEvent::FileChanged(path));
            }
        }
    })
    .context("Failed to create file watcher")?;

    watcher
        .watch(root, RecursiveMode::Recursive)
        .with_context(|| format!("Failed to watch {:?}", root))?;
    Ok(watcher)
}
