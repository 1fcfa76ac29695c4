//! Job actor: owns one job's persisted state and drives its run lifecycle.
//!
//! State machine: `InActive -> Active -> Running -> Active`. A run is started
//! by the trigger timer, executed as a detached task off the actor's turn,
//! and finished by that task calling back into the same-keyed actor through
//! the registry with `Complete` or `Fail`.

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use jobs_core::{
    JobDefinition, JobState, JobStatus, PersistenceError, RunId, RunState, load_json, save_json,
    status_timer_name, trigger_timer_name,
};
use ractor::{Actor, ActorProcessingErr, ActorRef};
use tokio_util::sync::CancellationToken;

use crate::job::{Job, JobContext, JobResult};
use crate::messages::{ActorError, ActorResult, JobMessage, call};
use crate::registry::EntityRegistry;

/// The in-memory marker of a run executing in this process.
struct InFlight {
    run_id: RunId,
    cancellation: CancellationToken,
}

/// State for the job actor.
pub struct JobActorState {
    key: String,
    registry: EntityRegistry,
    state: JobState,
    in_flight: Option<InFlight>,
}

impl JobActorState {
    fn store_key(&self) -> String {
        JobState::store_key(&self.key)
    }

    async fn persist(&self) -> Result<(), PersistenceError> {
        save_json(&**self.registry.store(), &self.store_key(), &self.state).await
    }

    async fn persist_or_warn(&self) {
        if let Err(e) = self.persist().await {
            tracing::warn!(job = %self.key, "Failed to persist job state: {}", e);
        }
    }

    async fn cancel_heartbeat(&self) {
        if let Err(e) = self
            .registry
            .timers()
            .cancel(&self.key, &status_timer_name(&self.key))
            .await
        {
            tracing::warn!(job = %self.key, "Failed to cancel heartbeat timer: {}", e);
        }
    }

    /// Archive the current run with `outcome`. Returns false for stale reports.
    async fn finish_run(&mut self, run_id: Option<RunId>, outcome: RunState) -> bool {
        if !self.state.status.is_running() {
            return false;
        }
        if run_id.is_some() && run_id != self.state.status.current_run_id {
            tracing::debug!(job = %self.key, "Ignoring report for stale run {:?}", run_id);
            return false;
        }

        self.in_flight = None;
        self.state.status.finish_run(outcome, Utc::now());
        self.persist_or_warn().await;
        self.cancel_heartbeat().await;
        true
    }

    /// Begin a run if the job is armed and idle.
    async fn start_run(&mut self) {
        if self.state.status.current_status == RunState::InActive || self.in_flight.is_some() {
            return;
        }

        let Some(definition) = self.state.definition.clone() else {
            tracing::warn!(job = %self.key, "Active job has no definition, ignoring trigger");
            return;
        };

        let now = Utc::now();
        let run_id = self.state.status.begin_run(now);

        let Some(job) = self.registry.job_types().get(&definition.job_type) else {
            tracing::error!(
                job = %self.key,
                job_type = %definition.job_type,
                "Job type not registered, failing run"
            );
            self.state.status.finish_run(RunState::Failed, now);
            self.persist_or_warn().await;
            return;
        };

        self.persist_or_warn().await;

        let cancellation = CancellationToken::new();
        self.in_flight = Some(InFlight {
            run_id,
            cancellation: cancellation.clone(),
        });

        tracing::info!(job = %self.key, run_id = %run_id, "Starting job run");

        let heartbeat = self.registry.config().heartbeat_period;
        let first_beat = now
            .checked_add_signed(chrono::Duration::from_std(heartbeat).unwrap_or_default())
            .unwrap_or(now);
        if let Err(e) = self
            .registry
            .timers()
            .arm(&self.key, &status_timer_name(&self.key), first_beat, heartbeat)
            .await
        {
            tracing::warn!(job = %self.key, "Failed to arm heartbeat timer: {}", e);
        }

        let ctx = JobContext {
            job_name: definition.job_name.clone(),
            run_id,
            parameters: definition.parameters.clone(),
            cancellation,
        };
        tokio::spawn(run_detached(
            self.registry.clone(),
            self.key.clone(),
            job,
            ctx,
            self.registry.config().run_timeout,
        ));
    }
}

/// Execute the body off the actor's turn, then report back through the registry.
async fn run_detached(
    registry: EntityRegistry,
    key: String,
    job: Arc<dyn Job>,
    ctx: JobContext,
    timeout: Option<Duration>,
) {
    let run_id = ctx.run_id;
    let outcome = execute_body(job.clone(), ctx.clone(), timeout).await;

    let handle = match registry.job(&key).await {
        Ok(handle) => handle,
        Err(e) => {
            tracing::warn!(job = %key, run_id = %run_id, "Cannot report run outcome: {}", e);
            return;
        }
    };

    let reported = match outcome {
        Ok(()) => {
            tracing::info!(job = %key, run_id = %run_id, "Job run completed");
            handle.complete_run(run_id).await
        }
        Err(error) => {
            tracing::warn!(job = %key, run_id = %run_id, "Job run failed: {}", error);
            if let Err(e) = job.compensate(ctx).await {
                tracing::warn!(job = %key, run_id = %run_id, "Compensation failed: {}", e);
            }
            handle.fail_run(run_id, error).await
        }
    };

    if let Err(e) = reported {
        tracing::warn!(job = %key, run_id = %run_id, "Cannot report run outcome: {}", e);
    }
}

/// Run the body in its own task so panics and timeouts become failures.
async fn execute_body(job: Arc<dyn Job>, ctx: JobContext, timeout: Option<Duration>) -> JobResult {
    let cancellation = ctx.cancellation.clone();
    let task = tokio::spawn(job.execute(ctx));
    let abort = task.abort_handle();

    let joined = match timeout {
        Some(limit) => match tokio::time::timeout(limit, task).await {
            Ok(joined) => joined,
            Err(_) => {
                cancellation.cancel();
                abort.abort();
                return Err(format!("Job timed out after {:?}", limit));
            }
        },
        None => task.await,
    };

    match joined {
        Ok(_) if cancellation.is_cancelled() => Err("Job cancelled".to_string()),
        Ok(result) => result,
        Err(e) if e.is_panic() => Err("Job panicked".to_string()),
        Err(e) => Err(format!("Job task failed: {}", e)),
    }
}

/// Job actor arguments.
pub struct JobActorArgs {
    pub key: String,
    pub registry: EntityRegistry,
}

/// Job actor that owns one job instance.
pub struct JobActor;

impl Actor for JobActor {
    type Msg = JobMessage;
    type State = JobActorState;
    type Arguments = JobActorArgs;

    async fn pre_start(
        &self,
        _myself: ActorRef<Self::Msg>,
        args: Self::Arguments,
    ) -> Result<Self::State, ActorProcessingErr> {
        let store_key = JobState::store_key(&args.key);
        let loaded: Option<JobState> = load_json(&**args.registry.store(), &store_key)
            .await
            .map_err(|e| ActorProcessingErr::from(format!("Failed to load job {}: {}", args.key, e)))?;

        let mut state = JobActorState {
            state: loaded.unwrap_or_else(|| JobState::new(&args.key)),
            key: args.key,
            registry: args.registry,
            in_flight: None,
        };

        // A persisted run cannot still be executing in a freshly started actor.
        if state.state.status.is_running() {
            tracing::warn!(
                job = %state.key,
                run_id = ?state.state.status.current_run_id,
                "Recovering interrupted run as failed"
            );
            state.finish_run(None, RunState::Failed).await;
        }

        tracing::info!(job = %state.key, status = %state.state.status.current_status, "Starting job actor");
        Ok(state)
    }

    async fn handle(
        &self,
        _myself: ActorRef<Self::Msg>,
        message: Self::Msg,
        state: &mut Self::State,
    ) -> Result<(), ActorProcessingErr> {
        match message {
            JobMessage::Activate { definition, reply } => {
                if state.in_flight.is_some() || state.state.definition.is_some() {
                    let _ = reply.send(Ok(false));
                    return Ok(());
                }

                let previous = state.state.status.current_status;
                state.state.definition = Some(*definition);
                state.state.status.current_status = RunState::Active;

                match state.persist().await {
                    Ok(()) => {
                        tracing::info!(job = %state.key, "Job activated");
                        let _ = reply.send(Ok(true));
                    }
                    Err(e) => {
                        state.state.definition = None;
                        state.state.status.current_status = previous;
                        let _ = reply.send(Err(format!("Failed to persist activation: {}", e)));
                    }
                }
            }

            JobMessage::ScheduleRecurring { period, reply } => {
                let now = Utc::now();
                let result = state
                    .registry
                    .timers()
                    .arm(&state.key, &trigger_timer_name(&state.key), now, period)
                    .await;

                match result {
                    Ok(()) => {
                        state.state.status.next_run = Some(now);
                        state.persist_or_warn().await;
                        tracing::info!(job = %state.key, ?period, "Scheduled recurring trigger");
                        let _ = reply.send(Ok(()));
                    }
                    Err(e) => {
                        let _ = reply.send(Err(format!("Failed to arm trigger: {}", e)));
                    }
                }
            }

            JobMessage::Status { reply } => {
                state.state.status.refresh_duration(Utc::now());
                let _ = reply.send(state.state.status.clone());
            }

            JobMessage::Definition { reply } => {
                let _ = reply.send(state.state.definition.clone());
            }

            JobMessage::Complete { run_id, reply } => {
                let finished = state.finish_run(run_id, RunState::Completed).await;
                let _ = reply.send(finished);
            }

            JobMessage::Fail {
                run_id,
                error,
                reply,
            } => {
                let finished = state.finish_run(run_id, RunState::Failed).await;
                if finished {
                    tracing::warn!(job = %state.key, "Run marked failed: {}", error);
                }
                let _ = reply.send(finished);
            }

            JobMessage::Cancel { reply } => match &state.in_flight {
                Some(run) => {
                    tracing::info!(job = %state.key, run_id = %run.run_id, "Cancelling job run");
                    run.cancellation.cancel();
                    let _ = reply.send(true);
                }
                None => {
                    let _ = reply.send(false);
                }
            },

            JobMessage::Tick {
                timer_name,
                scheduled_at,
                period,
            } => {
                if timer_name == trigger_timer_name(&state.key) {
                    state.state.status.next_run = scheduled_at
                        .checked_add_signed(chrono::Duration::from_std(period).unwrap_or_default());

                    if state.state.status.current_status == RunState::Active {
                        state.start_run().await;
                    } else {
                        tracing::debug!(
                            job = %state.key,
                            status = %state.state.status.current_status,
                            "Ignoring trigger"
                        );
                    }
                } else if timer_name == status_timer_name(&state.key) {
                    if state.state.status.is_running() {
                        state.state.status.refresh_duration(Utc::now());
                        state.persist_or_warn().await;
                    }
                } else {
                    tracing::debug!(job = %state.key, timer = %timer_name, "Ignoring unknown timer");
                }
            }
        }

        Ok(())
    }
}

/// Typed handle to a job actor.
#[derive(Clone)]
pub struct JobHandle {
    actor: ActorRef<JobMessage>,
    timeout: Duration,
}

impl JobHandle {
    pub(crate) fn new(actor: ActorRef<JobMessage>, timeout: Duration) -> Self {
        Self { actor, timeout }
    }

    /// Set the definition and flip `InActive -> Active`. Returns false if the
    /// job was already activated or a run is in flight.
    pub async fn activate(&self, definition: JobDefinition) -> ActorResult<bool> {
        call(
            &self.actor,
            |reply| JobMessage::Activate {
                definition: Box::new(definition),
                reply,
            },
            self.timeout,
        )
        .await?
        .map_err(ActorError::Rejected)
    }

    /// Arm the recurring trigger with zero initial delay.
    pub async fn schedule_recurring(&self, period: Duration) -> ActorResult<()> {
        call(
            &self.actor,
            |reply| JobMessage::ScheduleRecurring { period, reply },
            self.timeout,
        )
        .await?
        .map_err(ActorError::Rejected)
    }

    /// Current status with a freshly computed run duration.
    pub async fn status(&self) -> ActorResult<JobStatus> {
        call(&self.actor, |reply| JobMessage::Status { reply }, self.timeout).await
    }

    pub async fn definition(&self) -> ActorResult<Option<JobDefinition>> {
        call(&self.actor, |reply| JobMessage::Definition { reply }, self.timeout).await
    }

    /// Complete the current run. Returns false if no run was current.
    pub async fn complete(&self) -> ActorResult<bool> {
        call(
            &self.actor,
            |reply| JobMessage::Complete { run_id: None, reply },
            self.timeout,
        )
        .await
    }

    /// Fail the current run. Returns false if no run was current.
    pub async fn fail(&self, error: impl Into<String>) -> ActorResult<bool> {
        let error = error.into();
        call(
            &self.actor,
            |reply| JobMessage::Fail {
                run_id: None,
                error,
                reply,
            },
            self.timeout,
        )
        .await
    }

    /// Ask the current run to stop. Returns false if nothing was running.
    pub async fn cancel(&self) -> ActorResult<bool> {
        call(&self.actor, |reply| JobMessage::Cancel { reply }, self.timeout).await
    }

    pub(crate) async fn complete_run(&self, run_id: RunId) -> ActorResult<bool> {
        call(
            &self.actor,
            |reply| JobMessage::Complete {
                run_id: Some(run_id),
                reply,
            },
            self.timeout,
        )
        .await
    }

    pub(crate) async fn fail_run(&self, run_id: RunId, error: String) -> ActorResult<bool> {
        call(
            &self.actor,
            |reply| JobMessage::Fail {
                run_id: Some(run_id),
                error,
                reply,
            },
            self.timeout,
        )
        .await
    }

    /// Deliver a durable timer tick.
    pub fn tick(&self, timer_name: &str, scheduled_at: DateTime<Utc>, period: Duration) -> ActorResult<()> {
        self.actor
            .send_message(JobMessage::Tick {
                timer_name: timer_name.to_string(),
                scheduled_at,
                period,
            })
            .map_err(|_| ActorError::Unavailable("job mailbox closed".into()))
    }
}
