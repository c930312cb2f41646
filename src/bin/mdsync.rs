// File: ./src/bin/mdsync.rs
use anyhow::Result;
use mdsync::cli::{self, Command};
use mdsync::config::Config;
use mdsync::context::{AppContext, StandardContext};
use mdsync::logging;
use mdsync::model::DueDate;
use mdsync::scanner::{Reconciler, WatchEvent, WatchScheduler, scheduler};
use mdsync::storage::LocalStorage;
use mdsync::store::ReminderStore;
use std::env;
use std::path::PathBuf;

#[tokio::main]
async fn main() -> Result<()> {
    let args: Vec<String> = env::args().skip(1).collect();
    let invocation = cli::parse_args(&args)?;

    if invocation.command == Command::Help {
        cli::print_help("mdsync");
        return Ok(());
    }

    let ctx = StandardContext::new(invocation.override_root.clone());
    let config = Config::load_or_default(&ctx)?;
    logging::init(&config, &ctx)?;

    match invocation.command {
        Command::Watch { root } => watch(&config, &ctx, root).await,
        Command::Scan { root } => scan(&config, &ctx, root).await,
        Command::Lists => lists(&config, &ctx).await,
        Command::Show { list } => show(&config, &ctx, &list).await,
        Command::Init { root } => init(config, &ctx, root),
        Command::Help => Ok(()),
    }
}

fn open_store(config: &Config, ctx: &dyn AppContext) -> Result<LocalStorage> {
    let path = config.store_path(ctx)?;
    log::debug!("Using reminders store at {:?}", path);
    LocalStorage::open(path)
}

async fn watch(config: &Config, ctx: &dyn AppContext, root: Option<PathBuf>) -> Result<()> {
    let settings = config.watch_settings(root)?;
    let store = open_store(config, ctx)?;

    let (tx, rx) = scheduler::channel();
    let _store_subscription = store.subscribe(tx.clone())?;
    let _file_watcher =
        scheduler::watch_files(&settings.root, &settings.file_suffix, tx.clone())?;

    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            log::info!("Interrupted, stopping after the current pass");
            let _ = tx.send(WatchEvent::Shutdown);
        }
    });

    let mut scheduler = WatchScheduler::new(Reconciler::new(store, settings));
    scheduler.run(rx).await
}

async fn scan(config: &Config, ctx: &dyn AppContext, root: Option<PathBuf>) -> Result<()> {
    let settings = config.watch_settings(root)?;
    let reconciler = Reconciler::new(open_store(config, ctx)?, settings);
    let (_, report) = reconciler.run_pass(None).await?;

    for file in &report.files {
        println!("{}", file);
    }
    for path in &report.skipped {
        println!("skipped {} (list name already in use)", path.display());
    }
    if report.failed() > 0 {
        anyhow::bail!("{} file(s) could not be synced", report.failed());
    }
    Ok(())
}

async fn lists(config: &Config, ctx: &dyn AppContext) -> Result<()> {
    let store = open_store(config, ctx)?;
    let lists = store.list_calendars().await?;
    if lists.is_empty() {
        println!("No lists yet.");
    }
    for list in lists {
        let records = store.fetch_records(&list).await?;
        let open = records.iter().filter(|r| !r.completed).count();
        println!("{} ({} open, {} total)", list.name, open, records.len());
    }
    Ok(())
}

async fn show(config: &Config, ctx: &dyn AppContext, name: &str) -> Result<()> {
    let store = open_store(config, ctx)?;
    let list = store
        .find_list(name)
        .await?
        .ok_or_else(|| anyhow::anyhow!("No list named '{}'", name))?;

    for record in store.fetch_records(&list).await? {
        let mark = if record.completed { "x" } else { " " };
        let due = record.due.as_ref().map(DueDate::to_suffix).unwrap_or_default();
        println!("[{}] {}{}", mark, record.title, due);
    }
    Ok(())
}

fn init(mut config: Config, ctx: &dyn AppContext, root: PathBuf) -> Result<()> {
    let settings = config.watch_settings(Some(root))?;
    config.watch_root = Some(settings.root);
    config.save(ctx)?;
    println!("Wrote {}", Config::get_path_string(ctx)?);
    Ok(())
}
