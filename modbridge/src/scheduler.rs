//! Periodic poll scheduler.

use std::time::Duration;

use tokio::time::MissedTickBehavior;
use tracing::{debug, info};

use modbridge_common::current_timestamp_millis;

use crate::cache::{PollOutcome, RegisterCache};
use crate::config::CacheConfig;

/// Drives one poll cycle per tick.
///
/// A cycle is awaited to completion before the next tick is taken, so at
/// most one poll transaction is in flight. Ticks missed while a slow
/// transaction runs are delayed, not bunched.
pub struct PollScheduler {
    cache: RegisterCache,
    interval: Duration,
    idle_eviction_ms: Option<i64>,
}

impl PollScheduler {
    pub fn new(cache: RegisterCache, config: &CacheConfig) -> Self {
        Self {
            cache,
            interval: config.poll_interval(),
            idle_eviction_ms: config
                .idle_eviction_ms
                .map(|ms| i64::try_from(ms).unwrap_or(i64::MAX)),
        }
    }

    pub async fn run(self) {
        info!(
            interval_ms = self.interval_ms(),
            eviction = self.idle_eviction_ms.is_some(),
            "Poll scheduler started"
        );

        let mut ticker = tokio::time::interval(self.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            ticker.tick().await;
            self.tick().await;
        }
    }

    fn interval_ms(&self) -> u64 {
        u64::try_from(self.interval.as_millis()).unwrap_or(u64::MAX)
    }

    /// One scheduler cycle: poll, then evict idle cells if enabled.
    pub async fn tick(&self) -> PollOutcome {
        let outcome = self.cache.poll_next_group().await;
        if let PollOutcome::Polled(range) = &outcome {
            debug!(%range, "Poll cycle complete");
        }

        if let Some(idle) = self.idle_eviction_ms {
            // Errors were already broadcast by the cache.
            match self.cache.evict_idle_at(idle, current_timestamp_millis()) {
                Ok(0) | Err(_) => {}
                Ok(removed) => debug!(removed, "Evicted idle cells"),
            }
        }

        outcome
    }
}
