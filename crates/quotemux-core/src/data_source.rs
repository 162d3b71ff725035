use std::fmt::{Display, Formatter};
use std::future::Future;
use std::pin::Pin;

use serde::{Deserialize, Serialize};

use crate::{
    AssetClass, Interval, PriceSeries, ProviderId, QuoteFields, Range, SecurityIdentifier,
};

pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

/// The categories of data the aggregation layer can resolve.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DataKind {
    Quote,
    Series,
    Fundamentals,
    News,
}

impl DataKind {
    pub const ALL: [Self; 4] = [Self::Quote, Self::Series, Self::Fundamentals, Self::News];

    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Quote => "quote",
            Self::Series => "series",
            Self::Fundamentals => "fundamentals",
            Self::News => "news",
        }
    }
}

impl Display for DataKind {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Failure category of a provider call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProviderErrorKind {
    Timeout,
    RateLimited,
    Unavailable,
    InvalidRequest,
    Unsupported,
    Decode,
    MissingCredentials,
}

impl ProviderErrorKind {
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Timeout => "timeout",
            Self::RateLimited => "rate_limited",
            Self::Unavailable => "unavailable",
            Self::InvalidRequest => "invalid_request",
            Self::Unsupported => "unsupported",
            Self::Decode => "decode",
            Self::MissingCredentials => "missing_credentials",
        }
    }
}

/// Error from a single provider call, tagged with the provider and failure
/// category so merge and retry layers can act on it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProviderError {
    pub provider: ProviderId,
    pub kind: ProviderErrorKind,
    pub message: String,
}

impl ProviderError {
    pub fn new(
        provider: ProviderId,
        kind: ProviderErrorKind,
        message: impl Into<String>,
    ) -> Self {
        Self {
            provider,
            kind,
            message: message.into(),
        }
    }

    pub fn timeout(provider: ProviderId, message: impl Into<String>) -> Self {
        Self::new(provider, ProviderErrorKind::Timeout, message)
    }

    pub fn rate_limited(provider: ProviderId, message: impl Into<String>) -> Self {
        Self::new(provider, ProviderErrorKind::RateLimited, message)
    }

    pub fn unavailable(provider: ProviderId, message: impl Into<String>) -> Self {
        Self::new(provider, ProviderErrorKind::Unavailable, message)
    }

    pub fn invalid_request(provider: ProviderId, message: impl Into<String>) -> Self {
        Self::new(provider, ProviderErrorKind::InvalidRequest, message)
    }

    pub fn unsupported(provider: ProviderId, message: impl Into<String>) -> Self {
        Self::new(provider, ProviderErrorKind::Unsupported, message)
    }

    pub fn decode(provider: ProviderId, message: impl Into<String>) -> Self {
        Self::new(provider, ProviderErrorKind::Decode, message)
    }

    pub fn missing_credentials(provider: ProviderId) -> Self {
        Self::new(
            provider,
            ProviderErrorKind::MissingCredentials,
            "no API key configured",
        )
    }

    /// Transient failures are worth retrying against the same provider;
    /// everything else fails over to the next one immediately.
    pub const fn is_retryable(&self) -> bool {
        matches!(
            self.kind,
            ProviderErrorKind::Timeout
                | ProviderErrorKind::RateLimited
                | ProviderErrorKind::Unavailable
        )
    }
}

impl Display for ProviderError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{} [{}]: {}",
            self.provider,
            self.kind.as_str(),
            self.message
        )
    }
}

impl std::error::Error for ProviderError {}

/// What a provider can serve, per data kind and asset class.
#[derive(Debug, Clone, Copy)]
pub struct CapabilitySet {
    pub quote: &'static [AssetClass],
    pub series: &'static [AssetClass],
    pub fundamentals: &'static [AssetClass],
    pub news: &'static [AssetClass],
}

impl CapabilitySet {
    pub fn supports(&self, kind: DataKind, asset_class: AssetClass) -> bool {
        let classes = match kind {
            DataKind::Quote => self.quote,
            DataKind::Series => self.series,
            DataKind::Fundamentals => self.fundamentals,
            DataKind::News => self.news,
        };
        classes.contains(&asset_class)
    }
}

pub const EQUITY_ONLY: &[AssetClass] = &[AssetClass::Stock, AssetClass::Etf];

pub const ALL_CLASSES: &[AssetClass] = &[
    AssetClass::Stock,
    AssetClass::Etf,
    AssetClass::Crypto,
    AssetClass::Forex,
    AssetClass::Futures,
    AssetClass::Option,
    AssetClass::Bond,
    AssetClass::Index,
];

#[derive(Debug, Clone)]
pub struct QuoteRequest {
    pub security: SecurityIdentifier,
}

#[derive(Debug, Clone)]
pub struct SeriesRequest {
    pub security: SecurityIdentifier,
    pub interval: Interval,
    pub range: Range,
}

#[derive(Debug, Clone)]
pub struct FundamentalsRequest {
    pub security: SecurityIdentifier,
}

#[derive(Debug, Clone)]
pub struct NewsRequest {
    pub security: SecurityIdentifier,
    pub limit: usize,
}

/// Company profile and valuation snapshot. Providers fill what they have.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Fundamentals {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sector: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub industry: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub market_cap: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub pe_ratio: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub eps: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub dividend_yield: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub beta: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub week52_high: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub week52_low: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewsItem {
    pub title: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub publisher: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub link: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub published_at: Option<crate::UtcDateTime>,
}

/// A market data provider adapter.
///
/// Implementations translate canonical requests into provider-native HTTP
/// calls and decode the response into the shared domain types. Methods
/// return boxed futures so the trait stays object safe.
pub trait DataSource: Send + Sync {
    fn provider_id(&self) -> ProviderId;

    fn capabilities(&self) -> CapabilitySet;

    fn fetch_quote<'a>(
        &'a self,
        request: &'a QuoteRequest,
    ) -> BoxFuture<'a, Result<QuoteFields, ProviderError>>;

    fn fetch_series<'a>(
        &'a self,
        request: &'a SeriesRequest,
    ) -> BoxFuture<'a, Result<PriceSeries, ProviderError>>;

    fn fetch_fundamentals<'a>(
        &'a self,
        request: &'a FundamentalsRequest,
    ) -> BoxFuture<'a, Result<Fundamentals, ProviderError>>;

    fn fetch_news<'a>(
        &'a self,
        request: &'a NewsRequest,
    ) -> BoxFuture<'a, Result<Vec<NewsItem>, ProviderError>>;
}
