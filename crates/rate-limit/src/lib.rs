//! Process-wide rate coordination for upstream chat-completion calls.
//!
//! Combines two independent mechanisms behind one API:
//!
//! - a **proactive** token bucket (`governor`) that paces outbound calls to at
//!   most `capacity` per `window`, so the gateway doesn't trip an upstream's
//!   own limiter in the first place;
//! - a **reactive** cooldown that the provider adapter engages after an
//!   upstream 429, so every caller - not just the one that got rate limited -
//!   backs off until the cooldown clears.

use std::{
    num::NonZeroU32,
    sync::{Arc, OnceLock, RwLock},
    time::Duration,
};

use governor::{Quota, RateLimiter, clock::DefaultClock, state::InMemoryState, state::NotKeyed};
use tokio::sync::Mutex as AsyncMutex;
use tokio::time::Instant;

type Limiter = RateLimiter<NotKeyed, InMemoryState, DefaultClock>;

/// Errors surfaced while constructing a coordinator.
#[derive(Debug, thiserror::Error)]
pub enum RateLimitConfigError {
    /// `capacity` must be at least 1.
    #[error("rate limit capacity must be greater than zero")]
    ZeroCapacity,
}

/// Process-wide proactive throttle plus reactive cooldown for upstream calls.
///
/// All methods are safe to call concurrently; callers never need to hold a
/// lock across an `.await` point themselves - the coordinator owns its
/// synchronization internally.
pub struct RateCoordinator {
    limiter: Limiter,
    blocked_until: AsyncMutex<Option<Instant>>,
}

impl RateCoordinator {
    /// Build a coordinator that permits at most `capacity` acquisitions per
    /// `window`.
    pub fn new(capacity: u32, window: Duration) -> Result<Self, RateLimitConfigError> {
        let capacity = NonZeroU32::new(capacity).ok_or(RateLimitConfigError::ZeroCapacity)?;

        let period = if capacity.get() == 0 {
            window
        } else {
            window / capacity.get()
        };
        let period = if period.is_zero() { Duration::from_nanos(1) } else { period };

        let quota = Quota::with_period(period)
            .expect("non-zero period")
            .allow_burst(capacity);

        Ok(Self {
            limiter: RateLimiter::direct(quota),
            blocked_until: AsyncMutex::new(None),
        })
    }

    /// Wait until it's this caller's turn to make an upstream request.
    ///
    /// First waits out any active reactive cooldown, then acquires one token
    /// from the proactive bucket. Both steps may suspend the caller.
    pub async fn wait_if_blocked(&self) {
        loop {
            let wait = self.remaining_wait().await;

            if wait.is_zero() {
                break;
            }

            log::debug!("rate coordinator: sleeping {wait:?} for reactive cooldown");
            tokio::time::sleep(wait).await;
        }

        self.limiter.until_ready().await;
    }

    /// Engage (or extend) the reactive cooldown. Called after an upstream
    /// 429. `blocked_until` only ever moves forward.
    pub async fn set_blocked(&self, duration: Duration) {
        let candidate = Instant::now() + duration;
        let mut guard = self.blocked_until.lock().await;

        *guard = Some(match *guard {
            Some(existing) if existing > candidate => existing,
            _ => candidate,
        });

        log::warn!("rate coordinator: reactive cooldown engaged for {duration:?}");
    }

    /// Whether a reactive cooldown is currently in effect.
    pub async fn is_blocked(&self) -> bool {
        self.remaining_wait().await > Duration::ZERO
    }

    /// How long until the reactive cooldown clears (zero if not blocked).
    pub async fn remaining_wait(&self) -> Duration {
        let guard = self.blocked_until.lock().await;

        match *guard {
            Some(until) => until.saturating_duration_since(Instant::now()),
            None => Duration::ZERO,
        }
    }
}

static GLOBAL: OnceLock<RwLock<Arc<RateCoordinator>>> = OnceLock::new();

/// Default quota used when no configuration overrides it.
const DEFAULT_CAPACITY: u32 = 30;
const DEFAULT_WINDOW: Duration = Duration::from_secs(60);

/// Return the process-wide coordinator, initializing it with the default
/// quota on first access.
pub fn global() -> Arc<RateCoordinator> {
    GLOBAL
        .get_or_init(|| {
            let coordinator =
                RateCoordinator::new(DEFAULT_CAPACITY, DEFAULT_WINDOW).expect("default quota is always valid");

            RwLock::new(Arc::new(coordinator))
        })
        .read()
        .expect("rate coordinator lock poisoned")
        .clone()
}

/// Replace the process-wide coordinator with one configured for `capacity`
/// acquisitions per `window`. Intended for server startup (to apply the
/// loaded configuration) and for tests that need a clean-slate instance.
pub fn init_global(capacity: u32, window: Duration) -> Result<(), RateLimitConfigError> {
    let coordinator = Arc::new(RateCoordinator::new(capacity, window)?);
    let lock = GLOBAL.get_or_init(|| RwLock::new(coordinator.clone()));
    *lock.write().expect("rate coordinator lock poisoned") = coordinator;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test(start_paused = true)]
    async fn proactive_bucket_throttles_bursts() {
        let coordinator = RateCoordinator::new(2, Duration::from_secs(10)).unwrap();

        let start = Instant::now();
        coordinator.wait_if_blocked().await;
        coordinator.wait_if_blocked().await;
        // Third acquisition must wait for the bucket to refill.
        coordinator.wait_if_blocked().await;

        assert!(Instant::now() - start >= Duration::from_secs(1));
    }

    #[tokio::test(start_paused = true)]
    async fn reactive_cooldown_blocks_until_cleared() {
        let coordinator = RateCoordinator::new(100, Duration::from_secs(1)).unwrap();

        assert!(!coordinator.is_blocked().await);
        coordinator.set_blocked(Duration::from_secs(60)).await;
        assert!(coordinator.is_blocked().await);

        let remaining = coordinator.remaining_wait().await;
        assert!(remaining <= Duration::from_secs(60) && remaining > Duration::from_secs(59));
    }

    #[tokio::test]
    async fn set_blocked_only_moves_forward() {
        let coordinator = RateCoordinator::new(100, Duration::from_secs(1)).unwrap();

        coordinator.set_blocked(Duration::from_secs(60)).await;
        let first = coordinator.remaining_wait().await;

        // A shorter cooldown must not shrink the existing one.
        coordinator.set_blocked(Duration::from_secs(1)).await;
        let second = coordinator.remaining_wait().await;

        assert!(second >= first - Duration::from_millis(50));
    }
}
