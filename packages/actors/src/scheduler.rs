//! Registration glue: activating job instances and arming their schedules.

use std::collections::BTreeMap;
use std::time::Duration;

use jobs_core::{JobDefinition, JobStatus};

use crate::job_actor::JobHandle;
use crate::messages::{ActorError, ActorResult};
use crate::registry::EntityRegistry;

/// Starts job instances by name and schedules recurring runs.
#[derive(Clone)]
pub struct JobScheduler {
    registry: EntityRegistry,
}

impl JobScheduler {
    pub fn new(registry: EntityRegistry) -> Self {
        Self { registry }
    }

    /// Resolve and activate a job instance.
    ///
    /// Returns the handle and whether this call performed the activation.
    /// Fails if `job_type` has no registered body.
    pub async fn start_job(
        &self,
        job_type: &str,
        job_name: &str,
        parameters: BTreeMap<String, String>,
    ) -> ActorResult<(JobHandle, bool)> {
        if !self.registry.job_types().contains(job_type) {
            tracing::error!(job = job_name, job_type, "Cannot start job with unregistered type");
            return Err(ActorError::UnknownJobType(job_type.to_string()));
        }

        let definition = JobDefinition {
            job_type: job_type.to_string(),
            job_name: job_name.to_string(),
            parameters,
        };

        let handle = self.registry.job(job_name).await?;
        let activated = handle.activate(definition).await?;
        if !activated {
            tracing::debug!(job = job_name, "Job already activated");
        }
        Ok((handle, activated))
    }

    /// Activate a job instance and arm its recurring trigger.
    pub async fn schedule_recurring(
        &self,
        job_type: &str,
        job_name: &str,
        period: Duration,
    ) -> ActorResult<JobHandle> {
        let (handle, _) = self.start_job(job_type, job_name, BTreeMap::new()).await?;
        tracing::info!(job = job_name, job_type, ?period, "Scheduling recurring job");
        handle.schedule_recurring(period).await?;
        Ok(handle)
    }

    /// Status of a job instance.
    pub async fn status(&self, job_name: &str) -> ActorResult<JobStatus> {
        self.registry.job(job_name).await?.status().await
    }

    /// Cancel the current run of a job instance.
    pub async fn cancel(&self, job_name: &str) -> ActorResult<bool> {
        self.registry.job(job_name).await?.cancel().await
    }
}
