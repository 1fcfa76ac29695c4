//! Entity registry: one live actor per key.

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use jobs_core::StateStore;
use ractor::{Actor, ActorRef, ActorStatus};
use tokio::sync::Mutex;

use crate::config::RuntimeConfig;
use crate::job::JobTypeRegistry;
use crate::job_actor::{JobActor, JobActorArgs, JobHandle};
use crate::messages::{ActorError, ActorResult, JobMessage, QueueActorMessage};
use crate::queue_actor::{QueueActor, QueueHandle};
use crate::queue_client::HandlerSlots;
use crate::timers::TimerService;

pub(crate) struct RegistryInner {
    pub(crate) store: Arc<dyn StateStore>,
    pub(crate) job_types: Arc<JobTypeRegistry>,
    pub(crate) config: RuntimeConfig,
    pub(crate) timers: TimerService,
    /// Queue handler slots, one per queue name across every client.
    pub(crate) handlers: HandlerSlots,
    jobs: Mutex<HashMap<String, ActorRef<JobMessage>>>,
    queues: Mutex<HashMap<String, ActorRef<QueueActorMessage>>>,
    closed: AtomicBool,
}

/// Resolves entity keys to actors.
///
/// The same key always resolves to the same live actor; an actor is spawned
/// on first use and respawned (reloading its persisted state) if it stopped.
/// Cloning is cheap and every clone shares the same actors.
#[derive(Clone)]
pub struct EntityRegistry {
    inner: Arc<RegistryInner>,
}

impl EntityRegistry {
    /// Open the configured store, build the registry and restore durable timers.
    pub async fn open(config: RuntimeConfig, job_types: JobTypeRegistry) -> ActorResult<Self> {
        let store = config.open_store().await?;
        Self::with_store(store, job_types, config).await
    }

    /// Build the registry on an existing store and restore durable timers.
    pub async fn with_store(
        store: Arc<dyn StateStore>,
        job_types: JobTypeRegistry,
        config: RuntimeConfig,
    ) -> ActorResult<Self> {
        let inner = Arc::new_cyclic(|weak| RegistryInner {
            timers: TimerService::new(store.clone(), weak.clone()),
            store,
            job_types: Arc::new(job_types),
            config,
            handlers: HandlerSlots::default(),
            jobs: Mutex::new(HashMap::new()),
            queues: Mutex::new(HashMap::new()),
            closed: AtomicBool::new(false),
        });

        let registry = Self { inner };
        registry.inner.timers.restore().await?;
        Ok(registry)
    }

    pub(crate) fn from_inner(inner: Arc<RegistryInner>) -> Self {
        Self { inner }
    }

    /// Resolve the job actor for a key.
    pub async fn job(&self, key: &str) -> ActorResult<JobHandle> {
        self.ensure_open()?;
        let mut jobs = self.inner.jobs.lock().await;

        if let Some(actor) = jobs.get(key)
            && is_alive(actor)
        {
            return Ok(JobHandle::new(actor.clone(), self.inner.config.rpc_timeout));
        }

        let args = JobActorArgs {
            key: key.to_string(),
            registry: self.clone(),
        };
        let (actor, _handle) = Actor::spawn(None, JobActor, args)
            .await
            .map_err(|e| ActorError::Spawn(format!("job {}: {}", key, e)))?;

        jobs.insert(key.to_string(), actor.clone());
        Ok(JobHandle::new(actor, self.inner.config.rpc_timeout))
    }

    /// Resolve the queue actor for a queue name.
    pub async fn queue(&self, name: &str) -> ActorResult<QueueHandle> {
        self.ensure_open()?;
        let mut queues = self.inner.queues.lock().await;

        if let Some(actor) = queues.get(name)
            && is_alive(actor)
        {
            return Ok(QueueHandle::new(actor.clone(), self.inner.config.rpc_timeout));
        }

        let (actor, _handle) = Actor::spawn(None, QueueActor, name.to_string())
            .await
            .map_err(|e| ActorError::Spawn(format!("queue {}: {}", name, e)))?;

        queues.insert(name.to_string(), actor.clone());
        Ok(QueueHandle::new(actor, self.inner.config.rpc_timeout))
    }

    /// List the keys of live job actors.
    pub async fn job_keys(&self) -> Vec<String> {
        self.inner.jobs.lock().await.keys().cloned().collect()
    }

    /// List the names of live queue actors.
    pub async fn queue_names(&self) -> Vec<String> {
        self.inner.queues.lock().await.keys().cloned().collect()
    }

    /// The durable timer facility.
    pub fn timers(&self) -> &TimerService {
        &self.inner.timers
    }

    /// The shared state store.
    pub fn store(&self) -> &Arc<dyn StateStore> {
        &self.inner.store
    }

    /// The registered job bodies.
    pub fn job_types(&self) -> &JobTypeRegistry {
        &self.inner.job_types
    }

    pub fn config(&self) -> &RuntimeConfig {
        &self.inner.config
    }

    fn ensure_open(&self) -> ActorResult<()> {
        if self.inner.closed.load(Ordering::SeqCst) {
            return Err(ActorError::Unavailable("entity registry is shut down".into()));
        }
        Ok(())
    }

    pub(crate) fn handlers(&self) -> &HandlerSlots {
        &self.inner.handlers
    }

    /// Stop all timers, queue handlers and actors. Persisted state is kept
    /// and later resolutions fail with [`ActorError::Unavailable`].
    pub async fn shutdown(&self) {
        tracing::info!("Shutting down entity registry");
        self.inner.closed.store(true, Ordering::SeqCst);
        self.inner.timers.shutdown();
        self.inner.handlers.cancel_all().await;

        for (_, actor) in self.inner.jobs.lock().await.drain() {
            actor.stop(None);
        }
        for (_, actor) in self.inner.queues.lock().await.drain() {
            actor.stop(None);
        }
    }
}

fn is_alive<M: ractor::Message>(actor: &ActorRef<M>) -> bool {
    !matches!(
        actor.get_status(),
        ActorStatus::Stopping | ActorStatus::Stopped
    )
}
