//! End-to-end ingestion runs against an in-memory source, store, and cache.

mod helpers;

use helpers::{MemoryFactStore, ScriptedSource, make_record, memory_cache, orchestrator, pipeline};
use rozgar::cache::CacheCategory;
use rozgar::cache::keys;
use rozgar::ingest::scheduler::Scheduler;
use rozgar::ingest::{Orchestrator, RunOutcome, TriggerSource};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{Semaphore, broadcast};
use tokio::time::timeout;

const WAIT: Duration = Duration::from_secs(5);

/// 139 districts for October, with district 007 published twice.
fn october_records() -> Vec<rozgar::ogd::RawRecord> {
    let mut records: Vec<_> = (1..=139)
        .map(|i| {
            let total = if i == 7 { "98.0" } else { "500" };
            make_record(&format!("{i:03}"), "2024-2025", "October", total)
        })
        .collect();
    records.push(make_record("007", "2024-2025", "Oct", "120.5"));
    records
}

#[tokio::test]
async fn run_dedups_writes_and_invalidates() {
    let source = Arc::new(ScriptedSource::new(october_records()));
    let store = Arc::new(MemoryFactStore::default());
    let orch = orchestrator(source.clone(), store.clone(), &["2024-2025/October"]);

    let summary_key = keys::district_summary("007", "2024-2025", 10);
    let cache = orch.cache().clone();
    cache
        .write(&summary_key, &serde_json::json!({"stale": true}), CacheCategory::Budget)
        .await;
    cache
        .write(&keys::districts_all("HARYANA"), &vec!["stale"], CacheCategory::Districts)
        .await;
    cache
        .write("unrelated_key", &1, CacheCategory::Location)
        .await;

    let summary = orch.run_now(TriggerSource::Manual).await.unwrap();

    assert_eq!(summary.outcome, RunOutcome::Succeeded);
    assert_eq!(summary.error, None);
    assert_eq!(summary.report.periods_completed, 1);
    assert_eq!(summary.report.records_fetched, 140);
    assert_eq!(summary.report.duplicates_dropped, 1);
    assert_eq!(summary.report.rows_written, 139);
    assert_eq!(summary.report.rows_failed, 0);
    assert_eq!(summary.report.cache_keys_invalidated, 2);

    let offsets: Vec<u32> = source.requests().into_iter().map(|(_, o)| o).collect();
    assert_eq!(offsets, vec![0, 100], "short second page ends pagination");

    assert_eq!(store.len(), 139);
    let row = store.get("007", "2024-2025", 10).unwrap();
    assert_eq!(row.metrics.total_expenditure, 120.5);
    assert_eq!(row.state_code, "12");

    assert_eq!(cache.read::<serde_json::Value>(&summary_key).await, None);
    assert_eq!(
        cache
            .read::<Vec<String>>(&keys::districts_all("HARYANA"))
            .await,
        None
    );
    assert_eq!(cache.read::<i32>("unrelated_key").await, Some(1));
}

#[tokio::test]
async fn rerunning_is_idempotent() {
    let source = Arc::new(ScriptedSource::new(october_records()));
    let store = Arc::new(MemoryFactStore::default());
    let orch = orchestrator(source, store.clone(), &["2024-2025/October"]);

    orch.run_now(TriggerSource::Manual).await.unwrap();
    let first = store.get("007", "2024-2025", 10).unwrap();
    orch.run_now(TriggerSource::Scheduled).await.unwrap();

    assert_eq!(store.len(), 139);
    assert_eq!(store.get("007", "2024-2025", 10).unwrap(), first);
    assert_eq!(orch.status().total_runs, 2);
}

#[tokio::test]
async fn concurrent_trigger_is_rejected() {
    let gate = Arc::new(Semaphore::new(0));
    let source = Arc::new(ScriptedSource::new(vec![]).gated(gate.clone()));
    let store = Arc::new(MemoryFactStore::default());
    let orch = orchestrator(source.clone(), store, &["2024-2025"]);

    let run_id = orch.trigger(TriggerSource::Manual).unwrap();
    timeout(WAIT, source.started.notified()).await.unwrap();

    let rejected = orch.trigger(TriggerSource::Manual).unwrap_err();
    assert_eq!(rejected.running, Some(run_id));
    assert!(orch.run_now(TriggerSource::Scheduled).await.is_err());

    let status = orch.status();
    assert!(status.is_running);
    assert_eq!(status.current_run_id, Some(run_id));
    assert_eq!(status.current_trigger, Some(TriggerSource::Manual));

    gate.add_permits(1);
    timeout(WAIT, orch.wait_idle()).await.unwrap();

    let status = orch.status();
    assert!(!status.is_running);
    assert_eq!(status.current_run_id, None);
    assert_eq!(status.total_runs, 1);
    assert_eq!(status.last_run_status, Some(RunOutcome::Succeeded));
}

#[tokio::test]
async fn failing_period_stops_the_run() {
    let records = vec![
        make_record("001", "2023-2024", "April", "10"),
        make_record("002", "2023-2024", "April", "20"),
        make_record("003", "2023-2024", "April", "30"),
    ];
    let source = Arc::new(ScriptedSource::new(records).failing_for("2024-2025"));
    let store = Arc::new(MemoryFactStore::default());
    let orch = orchestrator(
        source.clone(),
        store.clone(),
        &["2023-2024", "2024-2025", "2025-2026"],
    );
    let summary_key = keys::district_summary("001", "2023-2024", 4);
    orch.cache()
        .write(&summary_key, &"stale", CacheCategory::Budget)
        .await;

    let summary = orch.run_now(TriggerSource::Scheduled).await.unwrap();

    assert_eq!(summary.outcome, RunOutcome::Failed);
    assert_eq!(summary.report.periods_completed, 1);
    assert_eq!(summary.report.rows_written, 3);
    assert!(summary.error.as_deref().unwrap().contains("2024-2025"));
    assert!(
        source.requests().iter().all(|(period, _)| period != "2025-2026"),
        "periods after the failure are not fetched"
    );

    // Rows from the first period stay written, so the cache must not serve stale data.
    assert_eq!(store.len(), 3);
    assert_eq!(orch.cache().read::<String>(&summary_key).await, None);

    let status = orch.status();
    assert_eq!(status.failed_runs, 1);
    assert_eq!(status.last_run_status, Some(RunOutcome::Failed));
    assert!(status.last_error.is_some());
}

#[tokio::test]
async fn failed_run_without_writes_keeps_cache() {
    let source = Arc::new(ScriptedSource::new(vec![]).failing_for("2024-2025"));
    let store = Arc::new(MemoryFactStore::default());
    let orch = orchestrator(source, store, &["2024-2025"]);
    let key = keys::rankings("2024-2025", 10);
    orch.cache().write(&key, &3, CacheCategory::Rankings).await;

    let summary = orch.run_now(TriggerSource::Manual).await.unwrap();

    assert_eq!(summary.outcome, RunOutcome::Failed);
    assert_eq!(summary.report.cache_keys_invalidated, 0);
    assert_eq!(orch.cache().read::<i32>(&key).await, Some(3));
}

#[tokio::test]
async fn panicking_run_releases_the_slot() {
    let source = Arc::new(ScriptedSource::new(vec![]).panicking_once());
    let store = Arc::new(MemoryFactStore::default());
    let orch = orchestrator(source, store, &["2024-2025"]);

    orch.trigger(TriggerSource::Manual).unwrap();
    timeout(WAIT, orch.wait_idle()).await.unwrap();

    let status = orch.status();
    assert!(!status.is_running);
    assert_eq!(status.last_run_status, Some(RunOutcome::Failed));
    assert_eq!(status.last_error.as_deref(), Some("run aborted"));
    assert_eq!(status.failed_runs, 1);

    let summary = orch.run_now(TriggerSource::Manual).await.unwrap();
    assert_eq!(summary.outcome, RunOutcome::Succeeded);
    assert_eq!(orch.status().total_runs, 2);
}

#[tokio::test]
async fn request_spacing_holds_across_periods_and_runs() {
    let interval = Duration::from_millis(100);
    let source = Arc::new(ScriptedSource::new(vec![]));
    let mut config = pipeline(&["2024-2025", "2025-2026"]);
    config.fetch.request_interval = interval;
    let orch = Orchestrator::new(
        source.clone(),
        Arc::new(MemoryFactStore::default()),
        memory_cache(),
        config,
    );

    orch.run_now(TriggerSource::Manual).await.unwrap();
    orch.run_now(TriggerSource::Manual).await.unwrap();

    let times = source.request_times();
    assert_eq!(times.len(), 4, "one empty page per period per run");
    for pair in times.windows(2) {
        let gap = pair[1].duration_since(pair[0]);
        assert!(
            gap + Duration::from_millis(1) >= interval,
            "requests {gap:?} apart, expected at least {interval:?}"
        );
    }
}

async fn wait_for_next_run(orch: &Orchestrator) {
    timeout(WAIT, async {
        while orch.status().next_run_at.is_none() {
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    })
    .await
    .unwrap();
}

#[tokio::test]
async fn scheduler_shutdown_waits_for_in_flight_run() {
    let gate = Arc::new(Semaphore::new(0));
    let source = Arc::new(ScriptedSource::new(vec![]).gated(gate.clone()));
    let store = Arc::new(MemoryFactStore::default());
    let orch = orchestrator(source.clone(), store, &["2024-2025"]);

    // New Year's midnight only, so the timer never fires during the test.
    let scheduler = Scheduler::new(
        orch.clone(),
        "0 0 1 1 *".parse().unwrap(),
        chrono_tz::Asia::Kolkata,
        WAIT,
    );
    let (shutdown_tx, shutdown_rx) = broadcast::channel(1);
    let handle = tokio::spawn(async move { scheduler.run(shutdown_rx).await });
    wait_for_next_run(&orch).await;

    orch.trigger(TriggerSource::Manual).unwrap();
    timeout(WAIT, source.started.notified()).await.unwrap();
    shutdown_tx.send(()).unwrap();

    tokio::time::sleep(Duration::from_millis(50)).await;
    assert!(!handle.is_finished(), "scheduler waits while the run is in flight");

    gate.add_permits(1);
    timeout(WAIT, handle).await.unwrap().unwrap();

    let status = orch.status();
    assert!(!status.is_running);
    assert_eq!(status.last_run_status, Some(RunOutcome::Succeeded));
    assert_eq!(status.next_run_at, None);
}

#[tokio::test]
async fn scheduler_abandons_run_after_grace() {
    let gate = Arc::new(Semaphore::new(0));
    let source = Arc::new(ScriptedSource::new(vec![]).gated(gate.clone()));
    let store = Arc::new(MemoryFactStore::default());
    let orch = orchestrator(source.clone(), store, &["2024-2025"]);

    let scheduler = Scheduler::new(
        orch.clone(),
        "0 0 1 1 *".parse().unwrap(),
        chrono_tz::UTC,
        Duration::from_millis(100),
    );
    let (shutdown_tx, shutdown_rx) = broadcast::channel(1);
    let handle = tokio::spawn(async move { scheduler.run(shutdown_rx).await });
    wait_for_next_run(&orch).await;

    orch.trigger(TriggerSource::Manual).unwrap();
    timeout(WAIT, source.started.notified()).await.unwrap();
    shutdown_tx.send(()).unwrap();

    timeout(WAIT, handle).await.unwrap().unwrap();
    assert!(orch.is_running(), "the run outlives the scheduler");

    gate.add_permits(1);
    timeout(WAIT, orch.wait_idle()).await.unwrap();
}

#[tokio::test(start_paused = true)]
async fn scheduler_fires_a_scheduled_run() {
    let source = Arc::new(ScriptedSource::new(october_records()));
    let store = Arc::new(MemoryFactStore::default());
    let orch = orchestrator(source, store.clone(), &["2024-2025/October"]);

    let scheduler = Scheduler::new(
        orch.clone(),
        "* * * * *".parse().unwrap(),
        chrono_tz::UTC,
        WAIT,
    );
    let (shutdown_tx, shutdown_rx) = broadcast::channel(1);
    let handle = tokio::spawn(async move { scheduler.run(shutdown_rx).await });

    // The paused clock jumps straight to the next minute boundary.
    timeout(Duration::from_secs(180), async {
        while orch.status().total_runs == 0 || orch.is_running() {
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    })
    .await
    .unwrap();

    let status = orch.status();
    assert!(status.total_runs >= 1);
    assert_eq!(status.failed_runs, 0);
    assert_eq!(status.last_run_status, Some(RunOutcome::Succeeded));
    assert!(status.next_run_at.is_some());
    assert_eq!(store.len(), 139);

    shutdown_tx.send(()).unwrap();
    timeout(WAIT, handle).await.unwrap().unwrap();
    assert_eq!(orch.status().next_run_at, None);
}
