//! Job actor lifecycle tests.

mod common;

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use actors::{ActorError, JobScheduler, MemoryStore};
use chrono::Utc;
use common::{Gate, memory_registry, registry_with, test_config, wait_for_status};
use jobs_core::{
    JobDefinition, JobState, RunState, StateStore, TimerRegistration, load_json,
    status_timer_name, trigger_timer_name,
};

const LONG_PERIOD: Duration = Duration::from_secs(3600);

#[tokio::test]
async fn test_new_job_is_inactive() {
    let gate = Gate::new();
    let registry = memory_registry(&gate).await;

    let status = registry.job("fresh").await.unwrap().status().await.unwrap();
    assert_eq!(status.job_name, "fresh");
    assert_eq!(status.current_status, RunState::InActive);
    assert!(status.current_run_id.is_none());
    assert!(status.last_status.is_none());
    assert!(status.next_run.is_none());

    registry.shutdown().await;
}

#[tokio::test]
async fn test_activate_twice_keeps_first_definition() {
    let gate = Gate::new();
    let registry = memory_registry(&gate).await;
    let handle = registry.job("nightly").await.unwrap();

    let first = JobDefinition::new("gate", "nightly").with_parameter("region", "eu");
    let second = JobDefinition::new("fail", "nightly");

    assert!(handle.activate(first.clone()).await.unwrap());
    assert!(!handle.activate(second).await.unwrap());
    assert_eq!(handle.definition().await.unwrap(), Some(first));
    assert_eq!(handle.status().await.unwrap().current_status, RunState::Active);

    registry.shutdown().await;
}

#[tokio::test]
async fn test_complete_and_fail_when_idle_are_noops() {
    let gate = Gate::new();
    let registry = memory_registry(&gate).await;
    let scheduler = JobScheduler::new(registry.clone());

    let (handle, activated) = scheduler
        .start_job("gate", "idle", BTreeMap::new())
        .await
        .unwrap();
    assert!(activated);

    assert!(!handle.complete().await.unwrap());
    assert!(!handle.fail("nothing to fail").await.unwrap());

    let status = handle.status().await.unwrap();
    assert_eq!(status.current_status, RunState::Active);
    assert!(status.last_status.is_none());
    assert!(status.last_run_id.is_none());
    assert!(status.last_run_started_at.is_none());

    registry.shutdown().await;
}

#[tokio::test]
async fn test_daily_report_lifecycle() {
    let gate = Gate::new();
    let registry = memory_registry(&gate).await;
    let scheduler = JobScheduler::new(registry.clone());

    let handle = scheduler
        .schedule_recurring("gate", "daily-report", LONG_PERIOD)
        .await
        .unwrap();

    // The first tick fires immediately.
    let running = wait_for_status(&handle, |s| s.is_running()).await;
    let first_run = running.current_run_id.unwrap();
    assert!(running.current_run_started_at.is_some());
    assert!(running.next_run.is_some());
    assert!(
        registry
            .timers()
            .is_armed("daily-report", &status_timer_name("daily-report"))
    );

    // A second tick while running must not start another run.
    handle
        .tick(&trigger_timer_name("daily-report"), Utc::now(), LONG_PERIOD)
        .unwrap();
    let still_running = handle.status().await.unwrap();
    assert_eq!(still_running.current_run_id, Some(first_run));

    gate.release();
    let done = wait_for_status(&handle, |s| s.current_status == RunState::Active).await;
    assert_eq!(done.last_status, Some(RunState::Completed));
    assert_eq!(done.last_run_id, Some(first_run));
    assert!(done.last_run_duration_ms.is_some());
    assert!(done.current_run_id.is_none());
    assert!(done.current_run_started_at.is_none());
    assert_eq!(gate.started(), 1);
    assert!(
        !registry
            .timers()
            .is_armed("daily-report", &status_timer_name("daily-report"))
    );

    // The next tick starts a fresh run.
    handle
        .tick(&trigger_timer_name("daily-report"), Utc::now(), LONG_PERIOD)
        .unwrap();
    let second = wait_for_status(&handle, |s| s.is_running()).await;
    assert_ne!(second.current_run_id, Some(first_run));
    assert_eq!(second.last_run_id, Some(first_run));

    gate.release();
    wait_for_status(&handle, |s| s.current_status == RunState::Active).await;
    assert_eq!(gate.started(), 2);

    registry.shutdown().await;
}

#[tokio::test]
async fn test_manual_complete_ends_current_run() {
    let gate = Gate::new();
    let registry = memory_registry(&gate).await;
    let scheduler = JobScheduler::new(registry.clone());

    let handle = scheduler
        .schedule_recurring("gate", "manual", LONG_PERIOD)
        .await
        .unwrap();
    let running = wait_for_status(&handle, |s| s.is_running()).await;

    assert!(handle.complete().await.unwrap());
    let status = handle.status().await.unwrap();
    assert_eq!(status.current_status, RunState::Active);
    assert_eq!(status.last_status, Some(RunState::Completed));
    assert_eq!(status.last_run_id, running.current_run_id);

    // The detached run reports later with a stale run id and is ignored.
    gate.release();
    tokio::time::sleep(Duration::from_millis(50)).await;
    let after = handle.status().await.unwrap();
    assert_eq!(after.last_run_id, running.current_run_id);
    assert_eq!(after.last_status, Some(RunState::Completed));

    registry.shutdown().await;
}

#[tokio::test]
async fn test_failing_job_records_failure() {
    let gate = Gate::new();
    let registry = memory_registry(&gate).await;
    let scheduler = JobScheduler::new(registry.clone());

    let handle = scheduler
        .schedule_recurring("fail", "flaky", LONG_PERIOD)
        .await
        .unwrap();

    let status = wait_for_status(&handle, |s| s.last_status.is_some()).await;
    assert_eq!(status.last_status, Some(RunState::Failed));
    assert_eq!(status.current_status, RunState::Active);

    registry.shutdown().await;
}

#[tokio::test]
async fn test_panicking_job_records_failure() {
    let gate = Gate::new();
    let registry = memory_registry(&gate).await;
    let scheduler = JobScheduler::new(registry.clone());

    let handle = scheduler
        .schedule_recurring("panic", "explosive", LONG_PERIOD)
        .await
        .unwrap();

    let status = wait_for_status(&handle, |s| s.last_status.is_some()).await;
    assert_eq!(status.last_status, Some(RunState::Failed));
    assert_eq!(status.current_status, RunState::Active);

    registry.shutdown().await;
}

#[tokio::test]
async fn test_cancel_running_job() {
    let gate = Gate::new();
    let registry = memory_registry(&gate).await;
    let scheduler = JobScheduler::new(registry.clone());

    assert!(!scheduler.cancel("cancellable").await.unwrap());

    let handle = scheduler
        .schedule_recurring("gate", "cancellable", LONG_PERIOD)
        .await
        .unwrap();
    let running = wait_for_status(&handle, |s| s.is_running()).await;

    assert!(scheduler.cancel("cancellable").await.unwrap());
    let status = wait_for_status(&handle, |s| s.current_status == RunState::Active).await;
    assert_eq!(status.last_status, Some(RunState::Failed));
    assert_eq!(status.last_run_id, running.current_run_id);

    registry.shutdown().await;
}

#[tokio::test]
async fn test_run_timeout_fails_run() {
    let gate = Gate::new();
    let config = test_config().with_run_timeout(Duration::from_millis(50));
    let registry = registry_with(Arc::new(MemoryStore::new()), &gate, config).await;
    let scheduler = JobScheduler::new(registry.clone());

    let handle = scheduler
        .schedule_recurring("gate", "slow", LONG_PERIOD)
        .await
        .unwrap();

    let status = wait_for_status(&handle, |s| s.last_status.is_some()).await;
    assert_eq!(status.last_status, Some(RunState::Failed));
    assert_eq!(status.current_status, RunState::Active);

    registry.shutdown().await;
}

#[tokio::test]
async fn test_start_unknown_job_type_is_rejected() {
    let gate = Gate::new();
    let registry = memory_registry(&gate).await;
    let scheduler = JobScheduler::new(registry.clone());

    let result = scheduler
        .start_job("does-not-exist", "orphan", BTreeMap::new())
        .await;
    assert!(matches!(result, Err(ActorError::UnknownJobType(t)) if t == "does-not-exist"));

    registry.shutdown().await;
}

#[tokio::test]
async fn test_unregistered_type_fails_run_on_trigger() {
    let gate = Gate::new();
    let registry = memory_registry(&gate).await;
    let handle = registry.job("ghostly").await.unwrap();

    assert!(
        handle
            .activate(JobDefinition::new("ghost", "ghostly"))
            .await
            .unwrap()
    );
    handle.schedule_recurring(LONG_PERIOD).await.unwrap();

    let status = wait_for_status(&handle, |s| s.last_status.is_some()).await;
    assert_eq!(status.last_status, Some(RunState::Failed));
    assert_eq!(status.current_status, RunState::Active);

    registry.shutdown().await;
}

#[tokio::test]
async fn test_inactive_job_ignores_trigger() {
    let gate = Gate::new();
    let registry = memory_registry(&gate).await;
    let handle = registry.job("dormant").await.unwrap();

    handle
        .tick(&trigger_timer_name("dormant"), Utc::now(), LONG_PERIOD)
        .unwrap();
    let status = handle.status().await.unwrap();
    assert_eq!(status.current_status, RunState::InActive);
    assert!(status.current_run_id.is_none());
    assert_eq!(gate.started(), 0);

    registry.shutdown().await;
}

#[tokio::test]
async fn test_unknown_timer_is_ignored() {
    let gate = Gate::new();
    let registry = memory_registry(&gate).await;
    let scheduler = JobScheduler::new(registry.clone());

    let (handle, _) = scheduler
        .start_job("gate", "steady", BTreeMap::new())
        .await
        .unwrap();
    let active = handle.status().await.unwrap();
    handle.tick("bogus", Utc::now(), LONG_PERIOD).unwrap();
    assert_eq!(handle.status().await.unwrap(), active);
    assert_eq!(gate.started(), 0);

    handle.schedule_recurring(LONG_PERIOD).await.unwrap();
    let running = wait_for_status(&handle, |s| s.is_running()).await;
    handle.tick("bogus", Utc::now(), LONG_PERIOD).unwrap();
    let after = handle.status().await.unwrap();
    assert_eq!(after.current_status, RunState::Running);
    assert_eq!(after.current_run_id, running.current_run_id);
    assert_eq!(after.last_status, running.last_status);
    assert_eq!(after.last_run_id, running.last_run_id);
    assert_eq!(after.last_run_started_at, running.last_run_started_at);
    assert_eq!(gate.started(), 1);

    gate.release();
    wait_for_status(&handle, |s| s.current_status == RunState::Active).await;
    registry.shutdown().await;
}

#[tokio::test]
async fn test_reschedule_replaces_trigger() {
    let gate = Gate::new();
    let store: Arc<dyn StateStore> = Arc::new(MemoryStore::new());
    let registry = registry_with(store.clone(), &gate, test_config()).await;
    let scheduler = JobScheduler::new(registry.clone());

    let before = Utc::now();
    scheduler
        .schedule_recurring("gate", "rescheduled", LONG_PERIOD)
        .await
        .unwrap();
    let handle = scheduler
        .schedule_recurring("gate", "rescheduled", 2 * LONG_PERIOD)
        .await
        .unwrap();

    let trigger_key = TimerRegistration::key_for("rescheduled", &trigger_timer_name("rescheduled"));
    let keys = store.list(&trigger_key).await.unwrap();
    assert_eq!(keys, vec![trigger_key.clone()]);
    let registration: TimerRegistration = load_json(&*store, &trigger_key).await.unwrap().unwrap();
    assert_eq!(registration.period_ms, 7_200_000);

    // Arming sets the next run to the arming time; the first tick has no delay.
    let status = scheduler.status("rescheduled").await.unwrap();
    assert!(status.next_run.is_some_and(|next| next >= before));

    wait_for_status(&handle, |s| s.is_running()).await;
    gate.release();
    wait_for_status(&handle, |s| s.current_status == RunState::Active).await;
    assert!(
        registry
            .timers()
            .is_armed("rescheduled", &trigger_timer_name("rescheduled"))
    );
    registry.shutdown().await;
}

#[tokio::test]
async fn test_registry_lists_resolved_jobs() {
    let gate = Gate::new();
    let registry = memory_registry(&gate).await;
    let scheduler = JobScheduler::new(registry.clone());

    assert!(registry.job_keys().await.is_empty());
    scheduler
        .start_job("gate", "beta", BTreeMap::new())
        .await
        .unwrap();
    registry.job("alpha").await.unwrap();

    let mut keys = registry.job_keys().await;
    keys.sort();
    assert_eq!(keys, vec!["alpha", "beta"]);

    assert_eq!(
        scheduler.status("beta").await.unwrap().current_status,
        RunState::Active
    );
    assert_eq!(
        scheduler.status("alpha").await.unwrap().current_status,
        RunState::InActive
    );

    registry.shutdown().await;
}

#[tokio::test]
async fn test_heartbeat_persists_run_duration() {
    let gate = Gate::new();
    let store: Arc<dyn StateStore> = Arc::new(MemoryStore::new());
    let config = test_config().with_heartbeat_period(Duration::from_millis(20));
    let registry = registry_with(store.clone(), &gate, config).await;
    let scheduler = JobScheduler::new(registry.clone());

    let handle = scheduler
        .schedule_recurring("gate", "beating", LONG_PERIOD)
        .await
        .unwrap();
    wait_for_status(&handle, |s| s.is_running()).await;

    let mut persisted_duration = 0;
    let deadline = tokio::time::Instant::now() + Duration::from_secs(5);
    while persisted_duration < 20 {
        assert!(tokio::time::Instant::now() < deadline, "heartbeat never persisted");
        tokio::time::sleep(Duration::from_millis(10)).await;
        let state: JobState = load_json(&*store, &JobState::store_key("beating"))
            .await
            .unwrap()
            .unwrap();
        persisted_duration = state.status.current_run_duration_ms.unwrap_or_default();
    }

    gate.release();
    wait_for_status(&handle, |s| s.current_status == RunState::Active).await;
    registry.shutdown().await;
}

#[tokio::test]
async fn test_state_survives_restart() {
    let gate = Gate::new();
    let store: Arc<dyn StateStore> = Arc::new(MemoryStore::new());

    let first = registry_with(store.clone(), &gate, test_config()).await;
    let scheduler = JobScheduler::new(first.clone());
    let handle = scheduler
        .schedule_recurring("gate", "persistent", LONG_PERIOD)
        .await
        .unwrap();
    wait_for_status(&handle, |s| s.is_running()).await;
    gate.release();
    let before = wait_for_status(&handle, |s| s.current_status == RunState::Active).await;
    first.shutdown().await;

    let second = registry_with(store, &gate, test_config()).await;
    let handle = second.job("persistent").await.unwrap();
    let after = handle.status().await.unwrap();

    assert_eq!(after.current_status, RunState::Active);
    assert_eq!(after.last_status, Some(RunState::Completed));
    assert_eq!(after.last_run_id, before.last_run_id);
    assert_eq!(
        handle.definition().await.unwrap().map(|d| d.job_type),
        Some("gate".to_string())
    );

    second.shutdown().await;
    assert!(matches!(
        second.job("resumable").await,
        Err(ActorError::Unavailable(_))
    ));
}

#[tokio::test]
async fn test_interrupted_run_recovers_and_trigger_resumes() {
    let gate = Gate::new();
    let store: Arc<dyn StateStore> = Arc::new(MemoryStore::new());
    let period = Duration::from_millis(100);

    let first = registry_with(store.clone(), &gate, test_config()).await;
    let handle = JobScheduler::new(first.clone())
        .schedule_recurring("gate", "resumable", period)
        .await
        .unwrap();
    let interrupted = wait_for_status(&handle, |s| s.is_running()).await;
    let interrupted_run = interrupted.current_run_id.unwrap();
    first.shutdown().await;

    // The restored trigger re-activates the job in the new registry.
    let second = registry_with(store, &gate, test_config()).await;
    let handle = second.job("resumable").await.unwrap();
    let recovered = wait_for_status(&handle, |s| s.is_running()).await;
    assert_ne!(recovered.current_run_id, Some(interrupted_run));
    assert_eq!(recovered.last_run_id, Some(interrupted_run));
    assert_eq!(recovered.last_status, Some(RunState::Failed));

    assert!(handle.cancel().await.unwrap());
    wait_for_status(&handle, |s| s.last_run_id != Some(interrupted_run)).await;

    second.shutdown().await;
    assert!(matches!(
        second.job("resumable").await,
        Err(ActorError::Unavailable(_))
    ));
}
