use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use serde::de::DeserializeOwned;
use serde::Serialize;
use thiserror::Error;
use tokio::sync::Mutex;

use crate::adapters::build_adapter;
use crate::analytics::{
    compute_greeks, Greeks, GreeksError, GreeksInput, IndicatorReport, OptionType,
};
use crate::cache::{CacheKey, CacheStore};
use crate::config::AggregatorConfig;
use crate::data_source::{DataKind, DataSource, Fundamentals, NewsItem};
use crate::http_client::ReqwestHttpClient;
use crate::resolver::{AggregateFailure, Resolver};
use crate::throttling::ProviderGateway;
use crate::{
    CoreError, Interval, PriceSeries, Range, SecurityIdentifier, UnifiedQuote, ValidationError,
};

#[derive(Debug, Error)]
pub enum AggregatorError {
    #[error(transparent)]
    Validation(#[from] ValidationError),
    #[error(transparent)]
    Resolution(#[from] AggregateFailure),
    #[error(transparent)]
    Analytics(#[from] GreeksError),
    #[error(transparent)]
    Internal(#[from] CoreError),
}

/// Facade over classification, caching, rate limiting and multi-provider
/// resolution.
///
/// Concurrent requests for the same (symbol, kind, shape) are
/// single-flighted: one caller fetches while the rest wait and then read
/// the freshly cached value.
pub struct Aggregator {
    config: AggregatorConfig,
    cache: CacheStore,
    resolver: Resolver,
    inflight: Mutex<HashMap<CacheKey, Arc<Mutex<()>>>>,
}

impl Aggregator {
    /// Production construction: reqwest transport, default adapters wired
    /// with credentials from the config.
    pub fn new(config: AggregatorConfig) -> Self {
        let http: Arc<dyn crate::http_client::HttpClient> = Arc::new(ReqwestHttpClient::new());
        let sources: Vec<Arc<dyn DataSource>> = config
            .policies
            .iter()
            .map(|policy| build_adapter(policy.provider_id, Arc::clone(&http), &config.credentials))
            .collect();
        Self::with_sources(config, sources)
    }

    /// Construction with explicit sources, already sorted by priority.
    pub fn with_sources(config: AggregatorConfig, sources: Vec<Arc<dyn DataSource>>) -> Self {
        let gateway = Arc::new(ProviderGateway::new(&config.policies));
        let resolver = Resolver::new(sources, gateway, config.merge_timeout);
        Self {
            config,
            cache: CacheStore::new(),
            resolver,
            inflight: Mutex::new(HashMap::new()),
        }
    }

    pub fn config(&self) -> &AggregatorConfig {
        &self.config
    }

    /// Classify, then resolve a merged quote.
    pub async fn quote(&self, symbol: &str) -> Result<UnifiedQuote, AggregatorError> {
        let security = SecurityIdentifier::parse(symbol)?;
        let key = CacheKey::new(security.symbol().clone(), DataKind::Quote);
        let ttl = self.config.cache_ttls.quote;

        self.resolve_cached(key, ttl, || self.resolver.resolve_quote(&security))
            .await
    }

    /// Historical series. When `interval` is omitted a sensible default
    /// for the range is used.
    pub async fn series(
        &self,
        symbol: &str,
        interval: Option<Interval>,
        range: Range,
    ) -> Result<PriceSeries, AggregatorError> {
        let security = SecurityIdentifier::parse(symbol)?;
        let interval = interval.unwrap_or_else(|| range.default_interval());
        let key = CacheKey::with_variant(
            security.symbol().clone(),
            DataKind::Series,
            format!("{interval}:{range}"),
        );
        let ttl = self.config.cache_ttls.series;

        self.resolve_cached(key, ttl, || {
            self.resolver.resolve_series(&security, interval, range)
        })
        .await
    }

    pub async fn fundamentals(&self, symbol: &str) -> Result<Fundamentals, AggregatorError> {
        let security = SecurityIdentifier::parse(symbol)?;
        let key = CacheKey::new(security.symbol().clone(), DataKind::Fundamentals);
        let ttl = self.config.cache_ttls.fundamentals;

        self.resolve_cached(key, ttl, || self.resolver.resolve_fundamentals(&security))
            .await
    }

    pub async fn news(&self, symbol: &str, limit: usize) -> Result<Vec<NewsItem>, AggregatorError> {
        let security = SecurityIdentifier::parse(symbol)?;
        let key = CacheKey::with_variant(
            security.symbol().clone(),
            DataKind::News,
            limit.to_string(),
        );
        let ttl = self.config.cache_ttls.news;

        self.resolve_cached(key, ttl, || self.resolver.resolve_news(&security, limit))
            .await
    }

    /// Standard indicator set over the closes of a resolved series. Rides
    /// the series cache; nothing beyond the series itself is cached.
    pub async fn indicators(
        &self,
        symbol: &str,
        interval: Option<Interval>,
        range: Range,
    ) -> Result<IndicatorReport, AggregatorError> {
        let series = self.series(symbol, interval, range).await?;
        Ok(IndicatorReport::from_closes(&series.closes()))
    }

    /// Black-Scholes Greeks using the configured risk-free rate.
    pub fn option_greeks(
        &self,
        spot: f64,
        strike: f64,
        time_to_expiry: f64,
        volatility: f64,
        option_type: OptionType,
    ) -> Result<Greeks, AggregatorError> {
        Ok(compute_greeks(&GreeksInput {
            spot,
            strike,
            time_to_expiry,
            volatility,
            risk_free_rate: self.config.risk_free_rate,
            option_type,
        })?)
    }

    pub async fn clear_cache(&self) {
        self.cache.clear().await;
    }

    pub async fn sweep_cache(&self) {
        self.cache.clear_expired().await;
    }

    /// Cache-or-fetch under a per-key lock so concurrent callers for the
    /// same key produce a single upstream fetch.
    async fn resolve_cached<T, F, Fut>(
        &self,
        key: CacheKey,
        ttl: Duration,
        fetch: F,
    ) -> Result<T, AggregatorError>
    where
        T: Serialize + DeserializeOwned,
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, AggregateFailure>>,
    {
        let lock = {
            let mut inflight = self.inflight.lock().await;
            Arc::clone(
                inflight
                    .entry(key.clone())
                    .or_insert_with(|| Arc::new(Mutex::new(()))),
            )
        };

        let result = {
            let _guard = lock.lock().await;
            if let Some(hit) = self.cache.get::<T>(&key).await {
                log::debug!("cache hit for {key}");
                Ok(hit)
            } else {
                match fetch().await {
                    Ok(value) => {
                        self.cache.put(key.clone(), &value, ttl).await?;
                        Ok(value)
                    }
                    Err(failure) => Err(AggregatorError::from(failure)),
                }
            }
        };

        // Drop the map entry once nobody else holds it.
        let mut inflight = self.inflight.lock().await;
        if inflight
            .get(&key)
            .is_some_and(|entry| Arc::strong_count(entry) == 2)
        {
            inflight.remove(&key);
        }

        result
    }
}
