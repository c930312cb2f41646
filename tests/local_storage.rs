// File: ./tests/local_storage.rs
/*
 The on-disk store used by the binary: passes against it, data surviving a
 reopen, and change notifications when another process writes the file.
*/

use chrono::NaiveDate;
use mdsync::config::Config;
use mdsync::context::{AppContext, TestContext};
use mdsync::model::NewReminder;
use mdsync::scanner::Reconciler;
use mdsync::scanner::scheduler::{self, WatchEvent};
use mdsync::storage::LocalStorage;
use mdsync::store::ReminderStore;
use serial_test::serial;
use std::fs;
use std::time::Duration;

fn reconciler(ctx: &TestContext) -> Reconciler<LocalStorage> {
    let config = Config {
        watch_root: Some(ctx.notes_dir()),
        ..Config::default()
    };
    let settings = config.watch_settings(None).unwrap();
    let store = LocalStorage::open(config.store_path(ctx).unwrap()).unwrap();
    Reconciler::new(store, settings)
        .with_reference_date(NaiveDate::from_ymd_opt(2025, 7, 1).unwrap())
}

#[tokio::test]
async fn test_pass_persists_records_to_disk() {
    let ctx = TestContext::new();
    fs::write(
        ctx.notes_dir().join("Groceries.todo.md"),
        "- [ ] Buy milk\n- [x] Eggs – Saturday 12 Jul\n",
    )
    .unwrap();

    let (snapshot, report) = reconciler(&ctx).run_pass(None).await.unwrap();
    assert_eq!(report.writes(), 2);

    // A fresh reconciler reads the same file.
    let rec = reconciler(&ctx);
    let list = rec.store().find_list("Groceries").await.unwrap().unwrap();
    let records = rec.store().fetch_records(&list).await.unwrap();
    assert_eq!(records.len(), 2);
    assert!(records.iter().any(|r| r.title == "Eggs" && r.completed && r.due.is_some()));

    let (_, again) = rec.run_pass(Some(&snapshot)).await.unwrap();
    assert_eq!(again.writes(), 0);
}

#[tokio::test]
async fn test_corrupt_store_fails_files_but_keeps_data() {
    let ctx = TestContext::new();
    fs::write(ctx.notes_dir().join("Home.todo.md"), "- [ ] Paint\n").unwrap();
    let store_path = ctx.get_store_path().unwrap();
    fs::write(&store_path, "not json").unwrap();

    let (_, report) = reconciler(&ctx).run_pass(None).await.unwrap();
    assert_eq!(report.failed(), 1);
    assert!(
        report.files[0]
            .error
            .as_deref()
            .unwrap()
            .contains("Failed to parse store")
    );
    assert_eq!(fs::read_to_string(&store_path).unwrap(), "not json");
}

#[tokio::test]
#[serial]
async fn test_subscription_reports_external_writes() {
    let ctx = TestContext::new();
    let path = ctx.get_store_path().unwrap();
    let watched = LocalStorage::open(&path).unwrap();
    let (tx, mut rx) = scheduler::channel();
    let _sub = watched.subscribe(tx).unwrap();

    let other = LocalStorage::open(&path).unwrap();
    let list = other.create_list("Home").await.unwrap();
    other
        .create_record(&list, NewReminder::new("Paint", false, None))
        .await
        .unwrap();

    let event = tokio::time::timeout(Duration::from_secs(5), rx.recv())
        .await
        .expect("no store event within 5s")
        .unwrap();
    assert_eq!(event, WatchEvent::StoreChanged);
}
