//! Persisted registration of a durable timer.

use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A durable timer owned by one actor.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TimerRegistration {
    /// Entity key of the owning actor.
    pub actor_key: String,
    pub timer_name: String,
    /// First due time.
    pub due_at: DateTime<Utc>,
    pub period_ms: i64,
}

impl TimerRegistration {
    pub fn new(
        actor_key: impl Into<String>,
        timer_name: impl Into<String>,
        due_at: DateTime<Utc>,
        period: Duration,
    ) -> Self {
        Self {
            actor_key: actor_key.into(),
            timer_name: timer_name.into(),
            due_at,
            period_ms: i64::try_from(period.as_millis()).unwrap_or(i64::MAX).max(1),
        }
    }

    pub fn period(&self) -> Duration {
        Duration::from_millis(self.period_ms.max(1) as u64)
    }

    /// When the timer should next fire.
    ///
    /// A timer that is not yet due keeps its due time. An overdue timer fires
    /// once for the latest boundary it missed, so a timer armed with
    /// `due_at = now` fires immediately and missed periods collapse into one.
    pub fn next_due(&self, now: DateTime<Utc>) -> DateTime<Utc> {
        if self.due_at >= now {
            return self.due_at;
        }
        let period_ms = self.period_ms.max(1);
        let elapsed = (now - self.due_at).num_milliseconds();
        let periods = elapsed / period_ms;
        self.due_at + chrono::Duration::milliseconds(periods.saturating_mul(period_ms))
    }

    /// Store key for this registration.
    pub fn store_key(&self) -> String {
        Self::key_for(&self.actor_key, &self.timer_name)
    }

    pub fn key_for(actor_key: &str, timer_name: &str) -> String {
        format!("{}{}:{}", Self::STORE_PREFIX, actor_key, timer_name)
    }

    pub const STORE_PREFIX: &'static str = "timer:";
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration as ChronoDuration;

    #[test]
    fn test_next_due_in_future_is_unchanged() {
        let now = Utc::now();
        let reg = TimerRegistration::new("job", "job_trigger", now + ChronoDuration::seconds(5), Duration::from_secs(60));
        assert_eq!(reg.next_due(now), reg.due_at);
    }

    #[test]
    fn test_next_due_fires_latest_missed_boundary() {
        let now = Utc::now();
        let due = now - ChronoDuration::seconds(150);
        let reg = TimerRegistration::new("job", "job_trigger", due, Duration::from_secs(60));
        assert_eq!(reg.next_due(now), due + ChronoDuration::seconds(120));
    }

    #[test]
    fn test_next_due_just_armed_fires_now() {
        let due = Utc::now();
        let now = due + ChronoDuration::milliseconds(3);
        let reg = TimerRegistration::new("job", "job_trigger", due, Duration::from_secs(3600));
        assert_eq!(reg.next_due(now), due);
    }

    #[test]
    fn test_next_due_with_zero_period_from_store() {
        let due = Utc::now() - ChronoDuration::seconds(10);
        let json = serde_json::json!({
            "actor_key": "job",
            "timer_name": "job_trigger",
            "due_at": due,
            "period_ms": 0,
        });
        let reg: TimerRegistration = serde_json::from_value(json).unwrap();
        assert_eq!(reg.period(), Duration::from_millis(1));

        let now = due + ChronoDuration::milliseconds(2500);
        assert_eq!(reg.next_due(now), now);
    }

    #[test]
    fn test_store_key() {
        let reg = TimerRegistration::new("a", "a_trigger", Utc::now(), Duration::from_secs(1));
        assert_eq!(reg.store_key(), "timer:a:a_trigger");
    }
}
