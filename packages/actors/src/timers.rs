//! Durable timers.
//!
//! A timer is persisted as a [`TimerRegistration`] before its task is spawned,
//! so [`TimerService::restore`] can re-arm every timer after a restart. Ticks
//! are delivered to the owning job actor through the entity registry, at
//! least once per period.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};
use std::time::Duration;

use chrono::{DateTime, Utc};
use jobs_core::{PersistenceError, StateStore, TimerRegistration, load_json, save_json};
use tokio::task::AbortHandle;
use tokio::time::{Instant, MissedTickBehavior};

use crate::registry::{EntityRegistry, RegistryInner};

type TimerKey = (String, String);

/// Durable timer facility for job actors.
pub struct TimerService {
    store: Arc<dyn StateStore>,
    registry: Weak<RegistryInner>,
    live: Mutex<HashMap<TimerKey, AbortHandle>>,
}

impl TimerService {
    pub(crate) fn new(store: Arc<dyn StateStore>, registry: Weak<RegistryInner>) -> Self {
        Self {
            store,
            registry,
            live: Mutex::new(HashMap::new()),
        }
    }

    fn live(&self) -> MutexGuard<'_, HashMap<TimerKey, AbortHandle>> {
        self.live.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Arm a timer, replacing any timer with the same owner and name.
    pub async fn arm(
        &self,
        actor_key: &str,
        timer_name: &str,
        due_at: DateTime<Utc>,
        period: Duration,
    ) -> Result<(), PersistenceError> {
        let registration = TimerRegistration::new(actor_key, timer_name, due_at, period);
        save_json(&*self.store, &registration.store_key(), &registration).await?;

        tracing::debug!(
            actor = actor_key,
            timer = timer_name,
            period_ms = registration.period_ms,
            "Armed timer"
        );
        self.spawn(registration);
        Ok(())
    }

    /// Cancel a timer. Unknown timers are ignored.
    pub async fn cancel(&self, actor_key: &str, timer_name: &str) -> Result<(), PersistenceError> {
        if let Some(handle) = self
            .live()
            .remove(&(actor_key.to_string(), timer_name.to_string()))
        {
            handle.abort();
        }
        self.store
            .delete(&TimerRegistration::key_for(actor_key, timer_name))
            .await?;

        tracing::debug!(actor = actor_key, timer = timer_name, "Cancelled timer");
        Ok(())
    }

    /// Check whether a timer is armed in this process.
    pub fn is_armed(&self, actor_key: &str, timer_name: &str) -> bool {
        self.live()
            .get(&(actor_key.to_string(), timer_name.to_string()))
            .is_some_and(|handle| !handle.is_finished())
    }

    /// Re-arm every persisted timer. Returns how many were restored.
    pub async fn restore(&self) -> Result<usize, PersistenceError> {
        let names = self.store.list(TimerRegistration::STORE_PREFIX).await?;
        let mut restored = 0;

        for name in names {
            match load_json::<TimerRegistration>(&*self.store, &name).await {
                Ok(Some(registration)) => {
                    self.spawn(registration);
                    restored += 1;
                }
                Ok(None) => {}
                Err(e) => tracing::warn!("Skipping unreadable timer {}: {}", name, e),
            }
        }

        if restored > 0 {
            tracing::info!("Restored {} durable timers", restored);
        }
        Ok(restored)
    }

    /// Stop every timer task. Registrations stay persisted.
    pub fn shutdown(&self) {
        for (_, handle) in self.live().drain() {
            handle.abort();
        }
    }

    fn spawn(&self, registration: TimerRegistration) {
        let key = (
            registration.actor_key.clone(),
            registration.timer_name.clone(),
        );
        let task = tokio::spawn(run_timer(self.registry.clone(), registration));
        if let Some(previous) = self.live().insert(key, task.abort_handle()) {
            previous.abort();
        }
    }
}

async fn run_timer(registry: Weak<RegistryInner>, registration: TimerRegistration) {
    let period = registration.period();
    let now = Utc::now();
    let mut scheduled_at = registration.next_due(now);
    let delay = (scheduled_at - now).to_std().unwrap_or_default();

    let step = chrono::Duration::from_std(period).unwrap_or_else(|_| chrono::Duration::zero());

    let mut interval = tokio::time::interval_at(Instant::now() + delay, period);
    interval.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        interval.tick().await;

        // The registry going away means the runtime shut down.
        let Some(inner) = registry.upgrade() else {
            break;
        };
        // Delivered from its own task so cancelling this timer from inside the
        // actor's startup cannot abort a spawn in progress.
        tokio::spawn(deliver(
            EntityRegistry::from_inner(inner),
            registration.clone(),
            scheduled_at,
            period,
        ));

        scheduled_at = scheduled_at
            .checked_add_signed(step)
            .unwrap_or(scheduled_at);
    }
}

async fn deliver(
    entities: EntityRegistry,
    registration: TimerRegistration,
    scheduled_at: DateTime<Utc>,
    period: Duration,
) {
    match entities.job(&registration.actor_key).await {
        Ok(job) => {
            if let Err(e) = job.tick(&registration.timer_name, scheduled_at, period) {
                tracing::warn!(
                    "Failed to deliver {} to {}: {}",
                    registration.timer_name,
                    registration.actor_key,
                    e
                );
            }
        }
        Err(e) => tracing::warn!(
            "Failed to resolve {} for timer {}: {}",
            registration.actor_key,
            registration.timer_name,
            e
        ),
    }
}
