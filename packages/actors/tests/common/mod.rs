#![allow(dead_code)]

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use actors::{
    EntityRegistry, FnJob, JobContext, JobFuture, JobHandle, JobTypeRegistry, MemoryStore,
    RuntimeConfig,
};
use jobs_core::{JobStatus, RunState, StateStore};
use tokio::sync::Semaphore;
use tokio::time::Instant;

/// A job body that blocks each run until the test releases it.
#[derive(Clone)]
pub struct Gate {
    permits: Arc<Semaphore>,
    started: Arc<AtomicUsize>,
}

impl Gate {
    pub fn new() -> Self {
        Self {
            permits: Arc::new(Semaphore::new(0)),
            started: Arc::new(AtomicUsize::new(0)),
        }
    }

    /// Let one blocked run finish successfully.
    pub fn release(&self) {
        self.permits.add_permits(1);
    }

    /// Number of runs that have entered the body.
    pub fn started(&self) -> usize {
        self.started.load(Ordering::SeqCst)
    }

    pub fn job(&self) -> FnJob<impl Fn(JobContext) -> JobFuture + Send + Sync + 'static> {
        let permits = self.permits.clone();
        let started = self.started.clone();
        FnJob::new("gate", move |ctx: JobContext| -> JobFuture {
            let permits = permits.clone();
            let started = started.clone();
            Box::pin(async move {
                started.fetch_add(1, Ordering::SeqCst);
                tokio::select! {
                    permit = permits.acquire() => {
                        permit.map(|permit| permit.forget()).map_err(|e| e.to_string())
                    }
                    _ = ctx.cancellation.cancelled() => Err("cancelled".to_string()),
                }
            })
        })
    }
}

/// Job types used across tests: `gate`, `fail` and `panic`.
pub fn job_types(gate: &Gate) -> JobTypeRegistry {
    let mut job_types = JobTypeRegistry::new();
    job_types.register(gate.job());
    job_types.register(FnJob::new("fail", |_ctx: JobContext| -> JobFuture {
        Box::pin(async { Err("Intentional failure".to_string()) })
    }));
    job_types.register(FnJob::new("panic", |_ctx: JobContext| -> JobFuture {
        Box::pin(async { panic!("job body panicked") })
    }));
    job_types
}

pub fn test_config() -> RuntimeConfig {
    RuntimeConfig::default()
        .with_poll_interval(Duration::from_millis(10))
        .with_heartbeat_period(Duration::from_secs(60))
}

pub async fn registry_with(
    store: Arc<dyn StateStore>,
    gate: &Gate,
    config: RuntimeConfig,
) -> EntityRegistry {
    EntityRegistry::with_store(store, job_types(gate), config)
        .await
        .expect("registry")
}

pub async fn memory_registry(gate: &Gate) -> EntityRegistry {
    registry_with(Arc::new(MemoryStore::new()), gate, test_config()).await
}

/// Poll the job's status until `pred` holds, checking the run-id invariant
/// on every observation.
pub async fn wait_for_status<F>(handle: &JobHandle, pred: F) -> JobStatus
where
    F: Fn(&JobStatus) -> bool,
{
    let deadline = Instant::now() + Duration::from_secs(5);
    loop {
        let status = handle.status().await.expect("status");
        assert_eq!(
            status.current_run_id.is_some(),
            status.current_status == RunState::Running,
            "current run id must be set iff running: {:?}",
            status
        );
        if pred(&status) {
            return status;
        }
        assert!(
            Instant::now() < deadline,
            "timed out waiting for status, last: {:?}",
            status
        );
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
}
