use std::num::NonZeroU32;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Duration;

use governor::clock::DefaultClock;
use governor::state::direct::NotKeyed;
use governor::state::InMemoryState;
use governor::{Quota as GovernorQuota, RateLimiter};

use crate::provider_policy::{BackoffPolicy, ProviderPolicy, Quota};

type DirectRateLimiter = RateLimiter<NotKeyed, InMemoryState, DefaultClock>;

/// Request gate in front of a quota-limited upstream.
///
/// A caller waits for budget up to its own deadline. When the wait would run
/// past it the caller gets a backoff hint instead, and the adapter surfaces
/// that as a rate-limit failure.
#[derive(Clone)]
pub struct ThrottlingQueue {
    limiter: Arc<DirectRateLimiter>,
    rejections: Arc<AtomicU32>,
    backoff: BackoffPolicy,
}

impl std::fmt::Debug for ThrottlingQueue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ThrottlingQueue")
            .field("rejections", &self.consecutive_rejections())
            .field("backoff", &self.backoff)
            .finish()
    }
}

impl ThrottlingQueue {
    pub fn new(quota: Quota, backoff: BackoffPolicy) -> Self {
        Self {
            limiter: Arc::new(RateLimiter::direct(governor_quota(quota))),
            rejections: Arc::new(AtomicU32::new(0)),
            backoff,
        }
    }

    /// `None` for providers without a published quota.
    pub fn from_policy(policy: &ProviderPolicy) -> Option<Self> {
        policy
            .quota
            .map(|quota| Self::new(quota, policy.backoff.clone()))
    }

    /// Takes one unit of budget, waiting at most `max_wait` for it.
    pub async fn acquire_within(&self, max_wait: Duration) -> Result<(), Duration> {
        if tokio::time::timeout(max_wait, self.limiter.until_ready())
            .await
            .is_ok()
        {
            self.rejections.store(0, Ordering::Relaxed);
            return Ok(());
        }

        let previous = self.rejections.fetch_add(1, Ordering::Relaxed);
        Err(self.backoff.delay_for(previous))
    }

    pub fn consecutive_rejections(&self) -> u32 {
        self.rejections.load(Ordering::Relaxed)
    }
}

fn governor_quota(quota: Quota) -> GovernorQuota {
    let limit = quota.limit.max(1);
    let burst = NonZeroU32::new(limit).unwrap_or(NonZeroU32::MIN);

    let seconds_per_cell = (quota.window.as_secs_f64() / f64::from(limit)).max(0.001);
    let period = Duration::from_secs_f64(seconds_per_cell);

    GovernorQuota::with_period(period)
        .unwrap_or_else(|| GovernorQuota::per_second(burst))
        .allow_burst(burst)
}
