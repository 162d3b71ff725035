use std::time::Duration;

use crate::ProviderId;

/// One rolling rate-limit window: at most `max_requests` starts per `window`.
///
/// Providers can carry several windows at once (per-second burst cap plus a
/// per-day quota); a request must fit every window to proceed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RateWindow {
    pub max_requests: u32,
    pub window: Duration,
}

impl RateWindow {
    pub const fn new(max_requests: u32, window: Duration) -> Self {
        Self {
            max_requests,
            window,
        }
    }

    pub const fn per_second(max_requests: u32) -> Self {
        Self::new(max_requests, Duration::from_secs(1))
    }

    pub const fn per_minute(max_requests: u32) -> Self {
        Self::new(max_requests, Duration::from_secs(60))
    }

    pub const fn per_day(max_requests: u32) -> Self {
        Self::new(max_requests, Duration::from_secs(86_400))
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct BackoffPolicy {
    pub initial_delay: Duration,
    pub max_delay: Duration,
    pub multiplier: f64,
    pub max_retries: u32,
}

impl Default for BackoffPolicy {
    fn default() -> Self {
        Self {
            initial_delay: Duration::from_millis(500),
            max_delay: Duration::from_secs(30),
            multiplier: 2.0,
            max_retries: 2,
        }
    }
}

/// Per-provider operating policy: merge priority, rate windows, timeouts
/// and retry backoff.
#[derive(Debug, Clone, PartialEq)]
pub struct ProviderPolicy {
    pub provider_id: ProviderId,
    /// Lower value wins field conflicts during quote merges.
    pub priority: u8,
    pub rate_windows: Vec<RateWindow>,
    pub request_timeout: Duration,
    pub retry_backoff: BackoffPolicy,
    pub requires_credentials: bool,
}

impl ProviderPolicy {
    pub fn yahoo_default() -> Self {
        Self {
            provider_id: ProviderId::Yahoo,
            priority: 0,
            rate_windows: vec![RateWindow::per_second(8), RateWindow::per_minute(120)],
            request_timeout: Duration::from_secs(10),
            retry_backoff: BackoffPolicy::default(),
            requires_credentials: false,
        }
    }

    pub fn polygon_default() -> Self {
        Self {
            provider_id: ProviderId::Polygon,
            priority: 1,
            rate_windows: vec![RateWindow::per_minute(5)],
            request_timeout: Duration::from_secs(10),
            retry_backoff: BackoffPolicy::default(),
            requires_credentials: true,
        }
    }

    pub fn alphavantage_default() -> Self {
        // Free tier: 5 requests per minute and 25 per day.
        Self {
            provider_id: ProviderId::Alphavantage,
            priority: 2,
            rate_windows: vec![RateWindow::per_minute(5), RateWindow::per_day(25)],
            request_timeout: Duration::from_secs(15),
            retry_backoff: BackoffPolicy {
                initial_delay: Duration::from_secs(1),
                max_delay: Duration::from_secs(60),
                multiplier: 2.0,
                max_retries: 2,
            },
            requires_credentials: true,
        }
    }

    pub fn default_for(provider_id: ProviderId) -> Self {
        match provider_id {
            ProviderId::Yahoo => Self::yahoo_default(),
            ProviderId::Polygon => Self::polygon_default(),
            ProviderId::Alphavantage => Self::alphavantage_default(),
        }
    }

    /// All provider policies sorted by merge priority.
    pub fn all_by_priority() -> Vec<Self> {
        let mut policies: Vec<Self> = ProviderId::ALL
            .into_iter()
            .map(Self::default_for)
            .collect();
        policies.sort_by_key(|policy| policy.priority);
        policies
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn alphavantage_policy_matches_free_tier() {
        let policy = ProviderPolicy::alphavantage_default();

        assert_eq!(policy.provider_id, ProviderId::Alphavantage);
        assert_eq!(
            policy.rate_windows,
            vec![RateWindow::per_minute(5), RateWindow::per_day(25)]
        );
        assert!(policy.requires_credentials);
    }

    #[test]
    fn priorities_are_distinct_and_yahoo_leads() {
        let policies = ProviderPolicy::all_by_priority();
        assert_eq!(policies[0].provider_id, ProviderId::Yahoo);

        let mut priorities: Vec<u8> = policies.iter().map(|policy| policy.priority).collect();
        priorities.dedup();
        assert_eq!(priorities.len(), ProviderId::ALL.len());
    }
}
