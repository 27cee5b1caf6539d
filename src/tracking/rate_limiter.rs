use dashmap::{DashMap, mapref::entry::Entry};
use std::sync::Mutex;
use std::time::{Duration, Instant};
use tracing::debug;
use uuid::Uuid;

/// How often expired entries are swept from the map.
pub const PRUNE_INTERVAL: Duration = Duration::from_secs(60);

/// Admits at most one ping batch per driver per window.
///
/// The instant is recorded when a batch is admitted, before any other
/// validation, so a batch rejected later still consumes the window.
#[derive(Debug)]
pub struct RateLimiter {
    window: Duration,
    last_accepted: DashMap<Uuid, Instant>,
    last_pruned: Mutex<Option<Instant>>,
}

impl RateLimiter {
    pub fn new(window: Duration) -> Self {
        Self {
            window,
            last_accepted: DashMap::new(),
            last_pruned: Mutex::new(None),
        }
    }

    pub fn window(&self) -> Duration {
        self.window
    }

    /// `Err(retry_after)` when the driver is still inside the window. A
    /// rejected call leaves the stored instant untouched.
    pub fn check(&self, driver_id: Uuid) -> Result<(), Duration> {
        self.check_at(driver_id, Instant::now())
    }

    pub fn check_at(&self, driver_id: Uuid, now: Instant) -> Result<(), Duration> {
        self.prune_expired(now);
        match self.last_accepted.entry(driver_id) {
            Entry::Occupied(mut occupied) => {
                let elapsed = now.saturating_duration_since(*occupied.get());
                if elapsed < self.window {
                    return Err(self.window - elapsed);
                }
                occupied.insert(now);
            }
            Entry::Vacant(vacant) => {
                vacant.insert(now);
            }
        }
        Ok(())
    }

    /// Number of drivers currently tracked.
    pub fn tracked_drivers(&self) -> usize {
        self.last_accepted.len()
    }

    /// Drops entries whose window has passed, at most once per
    /// [`PRUNE_INTERVAL`]. An expired entry admits the next batch exactly
    /// like a missing one, so sweeping never changes a decision.
    fn prune_expired(&self, now: Instant) {
        // Another caller is already sweeping.
        let Ok(mut last_pruned) = self.last_pruned.try_lock() else {
            return;
        };
        match *last_pruned {
            Some(at) if now.saturating_duration_since(at) < PRUNE_INTERVAL => return,
            None => {
                *last_pruned = Some(now);
                return;
            }
            _ => {}
        }
        *last_pruned = Some(now);
        let before = self.last_accepted.len();
        self.last_accepted
            .retain(|_, accepted| now.saturating_duration_since(*accepted) < self.window);
        let removed = before.saturating_sub(self.last_accepted.len());
        if removed > 0 {
            debug!(removed, "Pruned expired rate limiter entries.");
        }
    }
}
