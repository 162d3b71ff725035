// Shared fixtures for the behavioral test suites.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::Duration;

pub use quotemux_core::{
    aggregator::{Aggregator, AggregatorError},
    data_source::{
        BoxFuture, CapabilitySet, DataKind, DataSource, Fundamentals, FundamentalsRequest,
        NewsItem, NewsRequest, ProviderError, ProviderErrorKind, QuoteRequest, SeriesRequest,
        ALL_CLASSES, EQUITY_ONLY,
    },
    AggregatorConfig, AssetClass, Interval, PricePoint, PriceSeries, ProviderId, QuoteFields,
    Range, SecurityIdentifier, Symbol, UnifiedQuote, UtcDateTime,
};

/// Configurable provider double: scripted results per data kind, a call
/// counter, and an optional artificial latency.
pub struct FakeProvider {
    pub provider: ProviderId,
    pub capabilities: CapabilitySet,
    pub quote: Mutex<Vec<Result<QuoteFields, ProviderError>>>,
    pub series: Mutex<Vec<Result<PriceSeries, ProviderError>>>,
    pub fundamentals: Mutex<Vec<Result<Fundamentals, ProviderError>>>,
    pub news: Mutex<Vec<Result<Vec<NewsItem>, ProviderError>>>,
    pub latency: Duration,
    pub calls: AtomicUsize,
}

impl FakeProvider {
    pub fn new(provider: ProviderId) -> Self {
        Self {
            provider,
            capabilities: CapabilitySet {
                quote: ALL_CLASSES,
                series: ALL_CLASSES,
                fundamentals: EQUITY_ONLY,
                news: EQUITY_ONLY,
            },
            quote: Mutex::new(Vec::new()),
            series: Mutex::new(Vec::new()),
            fundamentals: Mutex::new(Vec::new()),
            news: Mutex::new(Vec::new()),
            latency: Duration::ZERO,
            calls: AtomicUsize::new(0),
        }
    }

    pub fn with_quote(self, result: Result<QuoteFields, ProviderError>) -> Self {
        self.quote
            .lock()
            .expect("script lock should not be poisoned")
            .push(result);
        self
    }

    pub fn with_series(self, result: Result<PriceSeries, ProviderError>) -> Self {
        self.series
            .lock()
            .expect("script lock should not be poisoned")
            .push(result);
        self
    }

    pub fn with_fundamentals(self, result: Result<Fundamentals, ProviderError>) -> Self {
        self.fundamentals
            .lock()
            .expect("script lock should not be poisoned")
            .push(result);
        self
    }

    pub fn with_news(self, result: Result<Vec<NewsItem>, ProviderError>) -> Self {
        self.news
            .lock()
            .expect("script lock should not be poisoned")
            .push(result);
        self
    }

    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = latency;
        self
    }

    pub fn call_count(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    fn next<T: Clone>(
        &self,
        script: &Mutex<Vec<Result<T, ProviderError>>>,
    ) -> Result<T, ProviderError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let mut script = script.lock().expect("script lock should not be poisoned");
        if script.len() > 1 {
            script.remove(0)
        } else {
            script
                .first()
                .cloned()
                .unwrap_or_else(|| Err(ProviderError::unavailable(self.provider, "not scripted")))
        }
    }
}

impl DataSource for FakeProvider {
    fn provider_id(&self) -> ProviderId {
        self.provider
    }

    fn capabilities(&self) -> CapabilitySet {
        self.capabilities
    }

    fn fetch_quote<'a>(
        &'a self,
        _request: &'a QuoteRequest,
    ) -> BoxFuture<'a, Result<QuoteFields, ProviderError>> {
        let result = self.next(&self.quote);
        let latency = self.latency;
        Box::pin(async move {
            if latency > Duration::ZERO {
                tokio::time::sleep(latency).await;
            }
            result
        })
    }

    fn fetch_series<'a>(
        &'a self,
        _request: &'a SeriesRequest,
    ) -> BoxFuture<'a, Result<PriceSeries, ProviderError>> {
        let result = self.next(&self.series);
        Box::pin(async move { result })
    }

    fn fetch_fundamentals<'a>(
        &'a self,
        _request: &'a FundamentalsRequest,
    ) -> BoxFuture<'a, Result<Fundamentals, ProviderError>> {
        let result = self.next(&self.fundamentals);
        Box::pin(async move { result })
    }

    fn fetch_news<'a>(
        &'a self,
        _request: &'a NewsRequest,
    ) -> BoxFuture<'a, Result<Vec<NewsItem>, ProviderError>> {
        let result = self.next(&self.news);
        Box::pin(async move { result })
    }
}

pub fn security(raw: &str) -> SecurityIdentifier {
    SecurityIdentifier::parse(raw).expect("valid symbol")
}

pub fn quote_fields(price: f64) -> QuoteFields {
    QuoteFields {
        price: Some(price),
        ..QuoteFields::default()
    }
}

pub fn daily_series(symbol: &str, closes: &[f64]) -> PriceSeries {
    let points = closes
        .iter()
        .enumerate()
        .map(|(i, &close)| PricePoint {
            timestamp: UtcDateTime::from_unix_seconds(1_700_000_000 + i as i64 * 86_400)
                .expect("valid timestamp"),
            open: close,
            high: close,
            low: close,
            close,
            volume: Some(1_000),
        })
        .collect();

    PriceSeries::new(
        Symbol::parse(symbol).expect("valid symbol"),
        Interval::OneDay,
        points,
    )
    .expect("ascending series")
}
