//! quotemux-core: multi-provider market data aggregation.
//!
//! The crate classifies raw tickers into asset classes, encodes them into
//! provider-native symbols, fetches from Yahoo Finance, Polygon and Alpha
//! Vantage under per-provider rate budgets, merges partial answers into
//! unified quotes with priority fallback, caches results with per-kind
//! TTLs, and ships pure analytics (technical indicators and Black-Scholes
//! Greeks) on top.

pub mod adapters;
pub mod aggregator;
pub mod analytics;
pub mod cache;
pub mod config;
pub mod data_source;
pub mod domain;
pub mod error;
pub mod http_client;
pub mod provider_policy;
pub mod resolver;
pub mod source;
pub mod throttling;

pub use aggregator::{Aggregator, AggregatorError};
pub use cache::{CacheKey, CacheStore};
pub use config::{AggregatorConfig, CacheTtls, Credentials};
pub use data_source::{
    CapabilitySet, DataKind, DataSource, Fundamentals, NewsItem, ProviderError,
    ProviderErrorKind,
};
pub use domain::{
    classify, AssetClass, Interval, PricePoint, PriceSeries, QuoteFields, Range,
    SecurityIdentifier, Symbol, UnifiedQuote, UtcDateTime,
};
pub use error::{CoreError, ValidationError};
pub use provider_policy::{BackoffPolicy, ProviderPolicy, RateWindow};
pub use resolver::{AggregateFailure, Resolver};
pub use source::ProviderId;
pub use throttling::{ProviderGateway, RateBudget};
