use std::collections::VecDeque;
use std::time::{Duration, Instant};

use tokio::sync::Mutex;

use crate::data_source::ProviderError;
use crate::provider_policy::{BackoffPolicy, ProviderPolicy, RateWindow};
use crate::ProviderId;

/// Sliding-window rate budget over one or more windows.
///
/// Keeps a pruned log of request start times; a request is admitted only
/// when it fits every window. Time is passed in explicitly so behavior is
/// testable against a synthetic clock.
#[derive(Debug)]
pub struct RateBudget {
    windows: Vec<RateWindow>,
    log: VecDeque<Instant>,
    longest_window: Duration,
}

impl RateBudget {
    pub fn new(windows: Vec<RateWindow>) -> Self {
        let longest_window = windows
            .iter()
            .map(|w| w.window)
            .max()
            .unwrap_or(Duration::ZERO);
        Self {
            windows,
            log: VecDeque::new(),
            longest_window,
        }
    }

    pub fn from_policy(policy: &ProviderPolicy) -> Self {
        Self::new(policy.rate_windows.clone())
    }

    /// Try to admit a request at `now`. On success the request is recorded
    /// in the log atomically with the check. On failure, returns the wait
    /// after which the most constrained window frees a slot.
    pub fn try_acquire(&mut self, now: Instant) -> Result<(), Duration> {
        self.prune(now);

        let mut wait = Duration::ZERO;
        for window in &self.windows {
            if let Some(window_wait) = self.window_wait(*window, now) {
                wait = wait.max(window_wait);
            }
        }

        if wait > Duration::ZERO {
            return Err(wait);
        }

        self.log.push_back(now);
        Ok(())
    }

    /// Requests currently counted against the longest window.
    pub fn recorded(&mut self, now: Instant) -> usize {
        self.prune(now);
        self.log.len()
    }

    fn prune(&mut self, now: Instant) {
        while let Some(&oldest) = self.log.front() {
            if now.duration_since(oldest) >= self.longest_window {
                self.log.pop_front();
            } else {
                break;
            }
        }
    }

    /// Wait until `window` frees a slot, or `None` when it has room now.
    fn window_wait(&self, window: RateWindow, now: Instant) -> Option<Duration> {
        let max = window.max_requests as usize;
        let in_window: Vec<Instant> = self
            .log
            .iter()
            .copied()
            .filter(|&ts| now.duration_since(ts) < window.window)
            .collect();

        if in_window.len() < max {
            return None;
        }

        // The log is in insertion order, so the entry that must expire
        // before a slot opens is at a fixed offset from the front.
        let blocking = in_window[in_window.len() - max];
        Some((blocking + window.window).saturating_duration_since(now))
    }
}

struct Lane {
    budget: Mutex<RateBudget>,
    backoff: BackoffPolicy,
}

/// Gateway that serializes admission per provider.
///
/// Each provider has its own lane; the lane mutex is held across the wait
/// loop so budget check and recording are atomic and waiting callers are
/// admitted in FIFO order. Providers never block each other.
pub struct ProviderGateway {
    yahoo: Lane,
    polygon: Lane,
    alphavantage: Lane,
}

impl ProviderGateway {
    pub fn new(policies: &[ProviderPolicy]) -> Self {
        let lane = |provider: ProviderId| {
            let policy = policies
                .iter()
                .find(|p| p.provider_id == provider)
                .cloned()
                .unwrap_or_else(|| ProviderPolicy::default_for(provider));
            Lane {
                budget: Mutex::new(RateBudget::from_policy(&policy)),
                backoff: policy.retry_backoff,
            }
        };

        Self {
            yahoo: lane(ProviderId::Yahoo),
            polygon: lane(ProviderId::Polygon),
            alphavantage: lane(ProviderId::Alphavantage),
        }
    }

    fn lane(&self, provider: ProviderId) -> &Lane {
        match provider {
            ProviderId::Yahoo => &self.yahoo,
            ProviderId::Polygon => &self.polygon,
            ProviderId::Alphavantage => &self.alphavantage,
        }
    }

    /// Wait until the provider's rate budget admits one request.
    pub async fn admit(&self, provider: ProviderId) {
        let lane = self.lane(provider);
        let mut budget = lane.budget.lock().await;
        loop {
            match budget.try_acquire(Instant::now()) {
                Ok(()) => return,
                Err(wait) => tokio::time::sleep(wait).await,
            }
        }
    }

    /// Run `op` under the provider's rate budget, retrying transient
    /// failures with capped exponential backoff and jitter.
    pub async fn execute<T, F, Fut>(
        &self,
        provider: ProviderId,
        mut op: F,
    ) -> Result<T, ProviderError>
    where
        F: FnMut() -> Fut,
        Fut: std::future::Future<Output = Result<T, ProviderError>>,
    {
        let lane = self.lane(provider);
        let mut attempt: u32 = 0;
        loop {
            self.admit(provider).await;
            match op().await {
                Ok(value) => return Ok(value),
                Err(err) if err.is_retryable() && attempt < lane.backoff.max_retries => {
                    let delay = backoff_delay(&lane.backoff, attempt);
                    log::warn!(
                        "provider {provider} attempt {attempt} failed ({err}), retrying in {delay:?}"
                    );
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                }
                Err(err) => return Err(err),
            }
        }
    }
}

/// Exponential delay with cap and +/- 50% jitter.
fn backoff_delay(policy: &BackoffPolicy, attempt: u32) -> Duration {
    let scale = policy.multiplier.powi(attempt as i32);
    let seconds = policy.initial_delay.as_secs_f64() * scale;
    let capped = seconds.min(policy.max_delay.as_secs_f64());

    let jitter = fastrand::f64() - 0.5;
    Duration::from_secs_f64((capped * (1.0 + jitter)).max(0.0))
}
