use std::time::Duration;

use crate::provider_policy::ProviderPolicy;
use crate::{DataKind, ProviderId};

/// Cache lifetimes per data kind. Quotes go stale in seconds; profiles
/// barely move within an hour.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CacheTtls {
    pub quote: Duration,
    pub series: Duration,
    pub fundamentals: Duration,
    pub news: Duration,
}

impl CacheTtls {
    pub const fn for_kind(&self, kind: DataKind) -> Duration {
        match kind {
            DataKind::Quote => self.quote,
            DataKind::Series => self.series,
            DataKind::Fundamentals => self.fundamentals,
            DataKind::News => self.news,
        }
    }
}

impl Default for CacheTtls {
    fn default() -> Self {
        Self {
            quote: Duration::from_secs(30),
            series: Duration::from_secs(15 * 60),
            fundamentals: Duration::from_secs(60 * 60),
            news: Duration::from_secs(15 * 60),
        }
    }
}

/// API credentials for the providers that need one.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Credentials {
    pub polygon_api_key: Option<String>,
    pub alphavantage_api_key: Option<String>,
}

impl Credentials {
    /// Read keys from `POLYGON_API_KEY` and `ALPHAVANTAGE_API_KEY`.
    /// Empty values count as absent.
    pub fn from_env() -> Self {
        let read = |name: &str| {
            std::env::var(name)
                .ok()
                .map(|value| value.trim().to_owned())
                .filter(|value| !value.is_empty())
        };

        Self {
            polygon_api_key: read("POLYGON_API_KEY"),
            alphavantage_api_key: read("ALPHAVANTAGE_API_KEY"),
        }
    }

    pub fn for_provider(&self, provider: ProviderId) -> Option<&str> {
        match provider {
            ProviderId::Yahoo => None,
            ProviderId::Polygon => self.polygon_api_key.as_deref(),
            ProviderId::Alphavantage => self.alphavantage_api_key.as_deref(),
        }
    }
}

/// Top-level aggregator configuration.
#[derive(Debug, Clone)]
pub struct AggregatorConfig {
    pub credentials: Credentials,
    pub cache_ttls: CacheTtls,
    pub policies: Vec<ProviderPolicy>,
    /// Per-provider deadline during a concurrent quote merge; a provider
    /// that misses it is treated as timed out, not awaited further.
    pub merge_timeout: Duration,
    /// Annualized risk-free rate used by the options analytics.
    pub risk_free_rate: f64,
}

impl Default for AggregatorConfig {
    fn default() -> Self {
        Self {
            credentials: Credentials::default(),
            cache_ttls: CacheTtls::default(),
            policies: ProviderPolicy::all_by_priority(),
            merge_timeout: Duration::from_secs(8),
            risk_free_rate: 0.05,
        }
    }
}

impl AggregatorConfig {
    /// Default configuration with credentials pulled from the environment.
    pub fn from_env() -> Self {
        Self {
            credentials: Credentials::from_env(),
            ..Self::default()
        }
    }
}
