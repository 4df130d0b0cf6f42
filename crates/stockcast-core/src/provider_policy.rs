use std::time::Duration;

use crate::circuit_breaker::CircuitBreakerConfig;
use crate::ProviderId;

/// Per-provider quota and breaker settings applied by its adapter.
#[derive(Debug, Clone, PartialEq)]
pub struct ProviderPolicy {
    pub provider_id: ProviderId,
    /// `None` when the upstream publishes no quota.
    pub quota: Option<Quota>,
    pub backoff: BackoffPolicy,
    pub breaker: CircuitBreakerConfig,
}

/// Request budget over a rolling window.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Quota {
    pub window: Duration,
    pub limit: u32,
}

/// Wait hint reported to callers after consecutive throttled requests.
#[derive(Debug, Clone, PartialEq)]
pub struct BackoffPolicy {
    pub initial_delay: Duration,
    pub max_delay: Duration,
    pub multiplier: f64,
}

impl Default for BackoffPolicy {
    fn default() -> Self {
        Self {
            initial_delay: Duration::from_secs(1),
            max_delay: Duration::from_secs(60),
            multiplier: 2.0,
        }
    }
}

impl BackoffPolicy {
    /// Delay after `rejections` consecutive throttled attempts (0-based).
    pub fn delay_for(&self, rejections: u32) -> Duration {
        let scale = self.multiplier.powf(f64::from(rejections));
        let seconds = self.initial_delay.as_secs_f64() * scale;
        Duration::from_secs_f64(seconds.min(self.max_delay.as_secs_f64()))
    }
}

impl ProviderPolicy {
    /// The exchange blocks clients that exceed roughly three calls per five seconds.
    pub fn twse_default() -> Self {
        Self {
            provider_id: ProviderId::Twse,
            quota: Some(Quota {
                window: Duration::from_secs(5),
                limit: 3,
            }),
            backoff: BackoffPolicy {
                initial_delay: Duration::from_secs(2),
                max_delay: Duration::from_secs(30),
                multiplier: 2.0,
            },
            breaker: CircuitBreakerConfig::default(),
        }
    }

    /// Anonymous and free-tier FinMind tokens are capped per hour.
    pub fn finmind_default() -> Self {
        Self {
            provider_id: ProviderId::Finmind,
            quota: Some(Quota {
                window: Duration::from_secs(3_600),
                limit: 600,
            }),
            backoff: BackoffPolicy {
                initial_delay: Duration::from_secs(6),
                max_delay: Duration::from_secs(300),
                multiplier: 2.0,
            },
            breaker: CircuitBreakerConfig::default(),
        }
    }

    pub fn yahoo_default() -> Self {
        Self {
            provider_id: ProviderId::Yahoo,
            quota: None,
            backoff: BackoffPolicy::default(),
            breaker: CircuitBreakerConfig::default(),
        }
    }

    pub fn default_for(provider_id: ProviderId) -> Self {
        match provider_id {
            ProviderId::Twse => Self::twse_default(),
            ProviderId::Yahoo => Self::yahoo_default(),
            ProviderId::Finmind => Self::finmind_default(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn twse_policy_matches_exchange_limits() {
        let policy = ProviderPolicy::twse_default();

        assert_eq!(policy.provider_id, ProviderId::Twse);
        assert_eq!(
            policy.quota,
            Some(Quota {
                window: Duration::from_secs(5),
                limit: 3
            })
        );
    }

    #[test]
    fn yahoo_has_no_published_quota() {
        assert_eq!(ProviderPolicy::default_for(ProviderId::Yahoo).quota, None);
    }

    #[test]
    fn backoff_grows_and_caps() {
        let backoff = BackoffPolicy {
            initial_delay: Duration::from_secs(2),
            max_delay: Duration::from_secs(10),
            multiplier: 2.0,
        };

        assert_eq!(backoff.delay_for(0), Duration::from_secs(2));
        assert_eq!(backoff.delay_for(1), Duration::from_secs(4));
        assert_eq!(backoff.delay_for(2), Duration::from_secs(8));
        assert_eq!(backoff.delay_for(3), Duration::from_secs(10));
    }
}
