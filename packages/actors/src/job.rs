//! Job body trait and job type registry.

use std::collections::{BTreeMap, HashMap};
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use jobs_core::RunId;
use tokio_util::sync::CancellationToken;

/// Result type for job bodies.
pub type JobResult = Result<(), String>;

/// Future type for async job bodies.
pub type JobFuture = Pin<Box<dyn Future<Output = JobResult> + Send>>;

/// Context handed to a job body for one run.
#[derive(Debug, Clone)]
pub struct JobContext {
    pub job_name: String,
    pub run_id: RunId,
    pub parameters: BTreeMap<String, String>,
    /// Cancelled when the run is cancelled or times out. Bodies should
    /// observe it and return early.
    pub cancellation: CancellationToken,
}

impl JobContext {
    /// Check whether the run has been asked to stop.
    pub fn is_cancelled(&self) -> bool {
        self.cancellation.is_cancelled()
    }
}

/// Trait for job bodies.
///
/// Implement this trait to define what a job type does on each run.
pub trait Job: Send + Sync + 'static {
    /// The job type identifier this body is registered under.
    fn job_type(&self) -> &str;

    /// Execute one run.
    fn execute(&self, ctx: JobContext) -> JobFuture;

    /// Undo partial work after a failed or cancelled run.
    fn compensate(&self, _ctx: JobContext) -> JobFuture {
        Box::pin(async { Ok(()) })
    }
}

/// Registry mapping job type identifiers to job bodies.
///
/// Built once at startup and shared read-only with every job actor.
#[derive(Default)]
pub struct JobTypeRegistry {
    jobs: HashMap<String, Arc<dyn Job>>,
}

impl JobTypeRegistry {
    /// Create a new empty registry.
    pub fn new() -> Self {
        Self {
            jobs: HashMap::new(),
        }
    }

    /// Register a job body under its job type.
    pub fn register<J: Job>(&mut self, job: J) {
        let job_type = job.job_type().to_string();
        self.jobs.insert(job_type, Arc::new(job));
    }

    /// Get the job body for a job type.
    pub fn get(&self, job_type: &str) -> Option<Arc<dyn Job>> {
        self.jobs.get(job_type).cloned()
    }

    /// Check if a job type is registered.
    pub fn contains(&self, job_type: &str) -> bool {
        self.jobs.contains_key(job_type)
    }

    /// List all registered job types.
    pub fn job_types(&self) -> Vec<&str> {
        self.jobs.keys().map(|s| s.as_str()).collect()
    }
}

/// A simple function-based job body.
pub struct FnJob<F>
where
    F: Fn(JobContext) -> JobFuture + Send + Sync + 'static,
{
    job_type: String,
    body: F,
}

impl<F> FnJob<F>
where
    F: Fn(JobContext) -> JobFuture + Send + Sync + 'static,
{
    /// Create a new function-based job.
    pub fn new(job_type: impl Into<String>, body: F) -> Self {
        Self {
            job_type: job_type.into(),
            body,
        }
    }
}

impl<F> Job for FnJob<F>
where
    F: Fn(JobContext) -> JobFuture + Send + Sync + 'static,
{
    fn job_type(&self) -> &str {
        &self.job_type
    }

    fn execute(&self, ctx: JobContext) -> JobFuture {
        (self.body)(ctx)
    }
}

/// Helper macro for creating job bodies from async blocks.
#[macro_export]
macro_rules! job_fn {
    ($job_type:expr, |$ctx:ident| $body:expr) => {
        $crate::FnJob::new($job_type, |$ctx: $crate::JobContext| Box::pin(async move { $body }))
    };
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_registry_lookup() {
        let mut registry = JobTypeRegistry::new();
        registry.register(FnJob::new("noop", |_ctx| Box::pin(async { Ok(()) })));

        assert!(registry.contains("noop"));
        assert!(!registry.contains("missing"));
        assert_eq!(registry.job_types(), vec!["noop"]);

        let job = registry.get("noop").unwrap();
        let ctx = JobContext {
            job_name: "noop-1".into(),
            run_id: RunId::new(),
            parameters: BTreeMap::new(),
            cancellation: CancellationToken::new(),
        };
        assert_eq!(job.execute(ctx.clone()).await, Ok(()));
        assert_eq!(job.compensate(ctx).await, Ok(()));
    }

    #[tokio::test]
    async fn test_job_fn_macro() {
        let job = crate::job_fn!("echo", |ctx| {
            if ctx.parameters.contains_key("fail") {
                Err("asked to fail".to_string())
            } else {
                Ok(())
            }
        });
        let mut parameters = BTreeMap::new();
        parameters.insert("fail".to_string(), "yes".to_string());
        let ctx = JobContext {
            job_name: "echo".into(),
            run_id: RunId::new(),
            parameters,
            cancellation: CancellationToken::new(),
        };
        assert!(job.execute(ctx).await.is_err());
    }
}
