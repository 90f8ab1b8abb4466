//! End-to-end sync runs against in-memory bridges and a temp data directory.

mod common;

use common::*;
use bridge_traits::upstream::{DownloadEntry, DownloadedFile};
use core_runtime::config::TaskLimits;
use core_runtime::events::{CoreEvent, EventBus, SyncEvent};
use core_sync::{SyncError, SyncRequest, SyncRunStatus, SyncWorkflowTask, NO_NEW_DATA_MESSAGE};
use core_tasks::{ErrorKind, RetryPolicy, TaskError, TaskRunner};
use std::collections::HashSet;
use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::time::Duration;

#[tokio::test]
async fn known_item_is_skipped_and_new_activities_processed() {
    let mut h = Harness::new(
        FakeStorage::with_existing(&["100"]),
        StubCredentials::known(),
        Default::default(),
    );
    let dir = h.user_dir();
    h.replay(vec![
        activity_entry(&dir, "100"),
        activity_entry(&dir, "101"),
        activity_entry(&dir, "102"),
    ]);

    let result = h.orchestrator().run(USER, 30).await.unwrap();

    assert_eq!(result.status, SyncRunStatus::Completed);
    assert_eq!(result.existing_items_skipped, 1);
    assert_eq!(result.activities_processed, 2);
    assert_eq!(result.total_files_downloaded, 3);
    assert!(result.errors.is_empty(), "{:?}", result.errors);
    assert_eq!(h.activity_calls(), vec!["101", "102"]);
}

#[tokio::test]
async fn storage_failure_aborts_before_any_downstream_call() {
    let h = Harness::new(
        FakeStorage {
            fail_initialize: true,
            ..Default::default()
        },
        StubCredentials::known(),
        Default::default(),
    );

    let err = h.orchestrator().run(USER, 30).await.unwrap_err();

    assert!(matches!(err, SyncError::Workflow { .. }));
    let message = err.to_string();
    assert!(message.contains("Garmin sync workflow failed"));
    assert!(message.contains("Elasticsearch connection refused"));
    assert_eq!(err.kind(), ErrorKind::Transient);

    assert_eq!(h.credentials.calls.load(Ordering::SeqCst), 0);
    assert_eq!(h.connector.connects.load(Ordering::SeqCst), 0);
    assert!(h.storage.queries.lock().unwrap().is_empty());
    assert!(h.activity_calls().is_empty());
}

#[tokio::test]
async fn repeated_runs_without_new_data_are_no_ops() {
    let h = Harness::new(
        FakeStorage::default(),
        StubCredentials::known(),
        Default::default(),
    );
    write_fit(&h.user_dir().join("sleep").join("sleep_1.fit"));
    let orchestrator = h.orchestrator();

    for _ in 0..2 {
        let result = orchestrator.run(USER, 30).await.unwrap();
        assert_eq!(result.status, SyncRunStatus::Completed);
        assert_eq!(result.message.as_deref(), Some(NO_NEW_DATA_MESSAGE));
        assert_eq!(result.activities_processed, 0);
        assert_eq!(result.health_files_processed, 0);
        assert_eq!(result.existing_items_skipped, 0);
    }

    assert!(h.health_calls().is_empty());
}

#[tokio::test]
async fn skipped_and_dispatched_partition_the_download() {
    let cases: Vec<(Vec<&str>, Vec<&str>)> = vec![
        (vec![], vec!["1", "2"]),
        (vec!["1", "2"], vec!["1", "2"]),
        (vec!["1", "9"], vec!["1", "2", "3"]),
        (vec!["7"], vec!["1"]),
    ];

    for (existing, downloaded) in cases {
        let mut h = Harness::new(
            FakeStorage::with_existing(&existing),
            StubCredentials::known(),
            Default::default(),
        );
        let dir = h.user_dir();
        h.replay(downloaded.iter().map(|id| activity_entry(&dir, id)).collect());

        let result = h.orchestrator().run(USER, 14).await.unwrap();

        let e: HashSet<&str> = existing.iter().copied().collect();
        let d: HashSet<&str> = downloaded.iter().copied().collect();
        assert_eq!(result.existing_items_skipped as usize, d.intersection(&e).count());
        assert_eq!(h.activity_calls().len(), d.difference(&e).count());
        assert_eq!(result.activities_processed as usize, d.difference(&e).count());
    }
}

#[tokio::test]
async fn per_item_failures_are_reported_not_raised() {
    let mut h = Harness::new(
        FakeStorage::default(),
        StubCredentials::known(),
        Default::default(),
    );
    let dir = h.user_dir();
    h.replay(vec![
        error_entry("Rate limited by Garmin Connect"),
        activity_entry(&dir, "1"),
        activity_entry(&dir, "fail-2"),
        activity_entry(&dir, "empty-3"),
        DownloadEntry::File(DownloadedFile::new(
            dir.join("activities").join("4_ACTIVITY.fit"),
            Some("4".to_string()),
        )),
    ]);

    let result = h.orchestrator().run(USER, 30).await.unwrap();

    assert_eq!(result.status, SyncRunStatus::Completed);
    assert_eq!(result.activities_processed, 1);
    assert_eq!(result.total_files_downloaded, 5);
    assert!(result
        .errors
        .contains(&"Download error: Rate limited by Garmin Connect".to_string()));
    assert!(result.errors.iter().any(|e| e.starts_with("Processing failed:")));
    assert!(result.errors.contains(&"No records decoded".to_string()));
    assert!(result.errors.iter().any(|e| e.contains("FIT file not found")));
    assert_eq!(h.activity_calls(), vec!["1", "fail-2", "empty-3"]);
}

#[tokio::test]
async fn health_files_are_scanned_and_processed_once() {
    let mut h = Harness::new(
        FakeStorage::default(),
        StubCredentials::known(),
        Default::default(),
    );
    let dir = h.user_dir();
    let sleep = write_fit(&dir.join("sleep").join("sleep_2024-03-01.fit"));
    write_fit(&dir.join("monitoring").join("2024").join("hrv_1.fit"));
    write_fit(&dir.join("monitoring").join("2024").join("MONITORING_broken.fit"));
    h.replay(vec![
        activity_entry(&dir, "1"),
        DownloadEntry::File(DownloadedFile::new(sleep.clone(), None)),
    ]);

    let result = h.orchestrator().run(USER, 30).await.unwrap();

    assert_eq!(result.activities_processed, 1);
    assert_eq!(result.health_files_processed, 2);
    assert_eq!(result.errors.len(), 1);
    assert!(result.errors[0].starts_with("Health processing failed: "));
    assert!(result.errors[0].contains("MONITORING_broken.fit"));

    let calls = h.health_calls();
    assert_eq!(calls.len(), 3);
    assert_eq!(calls.iter().filter(|p| **p == sleep).count(), 1);
}

#[tokio::test]
async fn missing_credentials_fail_the_run() {
    let h = Harness::new(
        FakeStorage::default(),
        StubCredentials::missing(),
        Default::default(),
    );

    let err = h.orchestrator().run(USER, 30).await.unwrap_err();

    assert_eq!(
        err.to_string(),
        format!(
            "Garmin sync workflow failed for {user}: Failed to create Garmin client: \
             No Garmin credentials found for user {user}",
            user = USER
        )
    );
    assert_eq!(err.kind(), ErrorKind::NonRetryable);
    assert_eq!(h.connector.connects.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn rejected_login_fails_the_run() {
    let h = Harness::new(
        FakeStorage::default(),
        StubCredentials::known(),
        common::FakeConnector {
            reject: true,
            ..Default::default()
        },
    );

    let err = h.orchestrator().run(USER, 30).await.unwrap_err();
    assert!(err.to_string().contains("Can't login to Garmin Connect"));
    assert_eq!(err.kind(), ErrorKind::NonRetryable);
}

#[tokio::test]
async fn existing_ids_failure_degrades_to_reprocessing() {
    let mut h = Harness::new(
        FakeStorage {
            fail_query: true,
            existing: HashSet::from(["1".to_string()]),
            ..Default::default()
        },
        StubCredentials::known(),
        Default::default(),
    );
    let dir = h.user_dir();
    h.replay(vec![activity_entry(&dir, "1")]);

    let result = h.orchestrator().run(USER, 30).await.unwrap();

    assert_eq!(result.existing_items_skipped, 0);
    assert_eq!(result.activities_processed, 1);
    let requests = h.connector.requests.lock().unwrap();
    assert!(requests[0].exclude_ids.is_empty());
}

#[tokio::test]
async fn download_request_carries_window_and_known_ids() {
    let mut h = Harness::new(
        FakeStorage::with_existing(&["5", "6"]),
        StubCredentials::known(),
        Default::default(),
    );
    let dir = h.user_dir();
    h.replay(vec![activity_entry(&dir, "7")]);

    let result = h.orchestrator().run(USER, 7).await.unwrap();

    let query = h.storage.queries.lock().unwrap()[0].clone();
    assert_eq!(query.end - query.start, chrono::Duration::days(7));
    assert_eq!(query.limit, 10_000);
    assert_eq!(query.user_id, USER);

    let requests = h.connector.requests.lock().unwrap();
    assert_eq!(requests.len(), 1);
    assert_eq!(requests[0].output_dir, h.garmin.data_dir);
    assert_eq!(requests[0].days, 7);
    assert_eq!(requests[0].start_date, result.start_date);
    assert!(!requests[0].overwrite);
    assert_eq!(
        requests[0].exclude_ids,
        HashSet::from(["5".to_string(), "6".to_string()])
    );
    assert_eq!(h.connector.closed.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn sync_events_follow_stage_order() {
    let bus = EventBus::new(64);
    let mut rx = bus.subscribe();
    let mut h = Harness::new(
        FakeStorage::default(),
        StubCredentials::known(),
        Default::default(),
    );
    let dir = h.user_dir();
    h.replay(vec![activity_entry(&dir, "1")]);

    h.orchestrator()
        .with_event_bus(bus.clone())
        .run_with_id("run-1", USER, 30)
        .await
        .unwrap();

    let mut stages = Vec::new();
    while let Ok(CoreEvent::Sync(event)) = rx.try_recv() {
        stages.push(match event {
            SyncEvent::Started { run_id, .. } => format!("started:{}", run_id),
            SyncEvent::Progress { stage, percent, .. } => format!("{}:{}", stage, percent),
            SyncEvent::Completed {
                activities_processed,
                ..
            } => format!("completed:{}", activities_processed),
            SyncEvent::Failed { .. } => "failed".to_string(),
        });
    }

    assert_eq!(
        stages,
        vec![
            "started:run-1",
            "initializing:10",
            "downloading:20",
            "processing:50",
            "completing:90",
            "completed:1",
        ]
    );
}

#[tokio::test]
async fn workflow_task_retries_transient_failures_once() {
    let h = Harness::new(
        FakeStorage {
            fail_initialize: true,
            ..Default::default()
        },
        StubCredentials::known(),
        Default::default(),
    );
    let task = SyncWorkflowTask::new(Arc::new(h.orchestrator()));
    let runner = TaskRunner::new(TaskLimits::new(60, 50, 0, 1)).with_retry_policy(
        RetryPolicy::default()
            .with_base_delay(Duration::from_millis(1))
            .with_jitter(false),
    );

    let err = runner
        .run(&task, SyncRequest::new(USER, 30))
        .await
        .unwrap_err();

    assert!(matches!(err, TaskError::Workflow { .. }));
    assert_eq!(err.name(), "WorkflowError");
    assert_eq!(h.storage.initialize_calls.load(Ordering::SeqCst), 2);
}

#[tokio::test]
async fn workflow_task_rejects_empty_window() {
    let h = Harness::new(
        FakeStorage::default(),
        StubCredentials::known(),
        Default::default(),
    );
    let task = SyncWorkflowTask::new(Arc::new(h.orchestrator()));
    let runner = TaskRunner::new(TaskLimits::new(60, 50, 0, 3));

    let err = runner.run(&task, SyncRequest::new(USER, 0)).await.unwrap_err();

    assert!(matches!(err, TaskError::Validation(_)));
    assert_eq!(h.storage.initialize_calls.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn each_user_connects_with_own_session_dir() {
    const OTHER: &str = "a1b2c3d4-e5f6-4a7b-8c9d-0e1f2a3b4c5d";
    let h = Harness::new(
        FakeStorage::default(),
        StubCredentials::known(),
        Default::default(),
    );
    let orchestrator = h.orchestrator();

    orchestrator.run(USER, 7).await.unwrap();
    orchestrator.run(OTHER, 7).await.unwrap();

    let config_root = h.dir.path().join("config");
    let sessions = h.session_dirs();
    assert_eq!(
        sessions,
        vec![
            (USER.to_string(), config_root.join(USER)),
            (OTHER.to_string(), config_root.join(OTHER)),
        ]
    );
    assert!(config_root.join(USER).is_dir());
    assert!(config_root.join(OTHER).is_dir());
}
