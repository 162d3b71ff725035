use std::fmt::{Display, Formatter};
use std::sync::Arc;
use std::time::Duration;

use crate::data_source::{
    DataKind, DataSource, Fundamentals, FundamentalsRequest, NewsItem, NewsRequest,
    ProviderError, QuoteRequest, SeriesRequest,
};
use crate::throttling::ProviderGateway;
use crate::{
    Interval, PriceSeries, ProviderId, QuoteFields, Range, SecurityIdentifier, UnifiedQuote,
    UtcDateTime,
};

/// Every eligible provider failed. Carries each provider's reason so the
/// caller can tell a rate-limit storm from a bad symbol.
#[derive(Debug)]
pub struct AggregateFailure {
    pub kind: DataKind,
    pub symbol: String,
    pub failures: Vec<ProviderError>,
}

impl Display for AggregateFailure {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "all providers failed for {} {}: ", self.kind, self.symbol)?;
        let reasons: Vec<String> = self.failures.iter().map(ToString::to_string).collect();
        f.write_str(&reasons.join("; "))
    }
}

impl std::error::Error for AggregateFailure {}

/// Resolves requests across providers.
///
/// Quotes are fetched from every capable provider concurrently and merged
/// field by field in priority order. Series, fundamentals and news fall
/// back through providers sequentially, stopping at the first success.
pub struct Resolver {
    sources: Vec<Arc<dyn DataSource>>,
    gateway: Arc<ProviderGateway>,
    merge_timeout: Duration,
}

impl Resolver {
    /// `sources` must already be sorted by merge priority, best first.
    pub fn new(
        sources: Vec<Arc<dyn DataSource>>,
        gateway: Arc<ProviderGateway>,
        merge_timeout: Duration,
    ) -> Self {
        Self {
            sources,
            gateway,
            merge_timeout,
        }
    }

    fn eligible(
        &self,
        kind: DataKind,
        security: &SecurityIdentifier,
    ) -> (Vec<Arc<dyn DataSource>>, Vec<ProviderError>) {
        let mut capable = Vec::new();
        let mut skipped = Vec::new();
        for source in &self.sources {
            if source
                .capabilities()
                .supports(kind, security.asset_class())
            {
                capable.push(Arc::clone(source));
            } else {
                skipped.push(ProviderError::unsupported(
                    source.provider_id(),
                    format!(
                        "{} for asset class {} is not served",
                        kind,
                        security.asset_class()
                    ),
                ));
            }
        }
        (capable, skipped)
    }

    /// Fetch from all capable providers concurrently and merge the partial
    /// answers, highest priority first. Succeeds when at least one provider
    /// answers; an empty-but-successful answer yields a quote with `None`
    /// fields rather than a failure.
    pub async fn resolve_quote(
        &self,
        security: &SecurityIdentifier,
    ) -> Result<UnifiedQuote, AggregateFailure> {
        let (capable, mut failures) = self.eligible(DataKind::Quote, security);

        let mut handles = Vec::with_capacity(capable.len());
        for source in capable {
            let provider = source.provider_id();
            let gateway = Arc::clone(&self.gateway);
            let request = QuoteRequest {
                security: security.clone(),
            };
            let deadline = self.merge_timeout;

            handles.push((
                provider,
                tokio::spawn(async move {
                    let attempt = gateway.execute(provider, || source.fetch_quote(&request));
                    match tokio::time::timeout(deadline, attempt).await {
                        Ok(result) => result,
                        Err(_) => Err(ProviderError::timeout(
                            provider,
                            format!("no answer within {deadline:?}"),
                        )),
                    }
                }),
            ));
        }

        // Collection order follows priority order, so the merge does too.
        let mut merged = QuoteFields::default();
        let mut contributors: Vec<ProviderId> = Vec::new();
        for (provider, handle) in handles {
            let outcome = handle.await.unwrap_or_else(|join_error| {
                Err(ProviderError::unavailable(provider, join_error.to_string()))
            });
            match outcome {
                Ok(fields) => {
                    merged.fill_missing_from(&fields);
                    contributors.push(provider);
                }
                Err(err) => {
                    log::warn!("quote fetch failed: {err}");
                    failures.push(err);
                }
            }
        }

        if contributors.is_empty() {
            return Err(AggregateFailure {
                kind: DataKind::Quote,
                symbol: security.symbol().to_string(),
                failures,
            });
        }

        log::debug!(
            "merged quote for {} from {} provider(s)",
            security.symbol(),
            contributors.len()
        );
        Ok(UnifiedQuote {
            symbol: security.symbol().clone(),
            asset_class: security.asset_class(),
            fields: merged,
            sources: contributors,
            fetched_at: UtcDateTime::now(),
        })
    }

    pub async fn resolve_series(
        &self,
        security: &SecurityIdentifier,
        interval: Interval,
        range: Range,
    ) -> Result<PriceSeries, AggregateFailure> {
        let (capable, mut failures) = self.eligible(DataKind::Series, security);
        let request = SeriesRequest {
            security: security.clone(),
            interval,
            range,
        };

        for source in capable {
            let provider = source.provider_id();
            let result = self
                .gateway
                .execute(provider, || source.fetch_series(&request))
                .await;
            match result {
                Ok(series) if !series.is_empty() => return Ok(series),
                Ok(_) => failures.push(ProviderError::unavailable(
                    provider,
                    "returned an empty series",
                )),
                Err(err) => {
                    log::warn!("series fetch failed: {err}");
                    failures.push(err);
                }
            }
        }

        Err(AggregateFailure {
            kind: DataKind::Series,
            symbol: security.symbol().to_string(),
            failures,
        })
    }

    pub async fn resolve_fundamentals(
        &self,
        security: &SecurityIdentifier,
    ) -> Result<Fundamentals, AggregateFailure> {
        let (capable, mut failures) = self.eligible(DataKind::Fundamentals, security);
        let request = FundamentalsRequest {
            security: security.clone(),
        };

        for source in capable {
            let provider = source.provider_id();
            let result = self
                .gateway
                .execute(provider, || source.fetch_fundamentals(&request))
                .await;
            match result {
                Ok(fundamentals) => return Ok(fundamentals),
                Err(err) => {
                    log::warn!("fundamentals fetch failed: {err}");
                    failures.push(err);
                }
            }
        }

        Err(AggregateFailure {
            kind: DataKind::Fundamentals,
            symbol: security.symbol().to_string(),
            failures,
        })
    }

    pub async fn resolve_news(
        &self,
        security: &SecurityIdentifier,
        limit: usize,
    ) -> Result<Vec<NewsItem>, AggregateFailure> {
        let (capable, mut failures) = self.eligible(DataKind::News, security);
        let request = NewsRequest {
            security: security.clone(),
            limit,
        };

        for source in capable {
            let provider = source.provider_id();
            let result = self
                .gateway
                .execute(provider, || source.fetch_news(&request))
                .await;
            match result {
                Ok(items) => return Ok(items),
                Err(err) => {
                    log::warn!("news fetch failed: {err}");
                    failures.push(err);
                }
            }
        }

        Err(AggregateFailure {
            kind: DataKind::News,
            symbol: security.symbol().to_string(),
            failures,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data_source::{BoxFuture, CapabilitySet, ALL_CLASSES, EQUITY_ONLY};
    use crate::provider_policy::ProviderPolicy;

    struct StubSource {
        provider: ProviderId,
        quote: Result<QuoteFields, ProviderError>,
        fundamentals: Result<Fundamentals, ProviderError>,
    }

    impl StubSource {
        fn with_quote(provider: ProviderId, quote: Result<QuoteFields, ProviderError>) -> Self {
            Self {
                provider,
                quote,
                fundamentals: Err(ProviderError::unavailable(provider, "not stubbed")),
            }
        }
    }

    impl DataSource for StubSource {
        fn provider_id(&self) -> ProviderId {
            self.provider
        }

        fn capabilities(&self) -> CapabilitySet {
            CapabilitySet {
                quote: ALL_CLASSES,
                series: ALL_CLASSES,
                fundamentals: EQUITY_ONLY,
                news: if self.provider == ProviderId::Yahoo {
                    EQUITY_ONLY
                } else {
                    &[]
                },
            }
        }

        fn fetch_quote<'a>(
            &'a self,
            _request: &'a QuoteRequest,
        ) -> BoxFuture<'a, Result<QuoteFields, ProviderError>> {
            let result = self.quote.clone();
            Box::pin(async move { result })
        }

        fn fetch_series<'a>(
            &'a self,
            _request: &'a SeriesRequest,
        ) -> BoxFuture<'a, Result<PriceSeries, ProviderError>> {
            let provider = self.provider;
            Box::pin(async move { Err(ProviderError::unavailable(provider, "not stubbed")) })
        }

        fn fetch_fundamentals<'a>(
            &'a self,
            _request: &'a FundamentalsRequest,
        ) -> BoxFuture<'a, Result<Fundamentals, ProviderError>> {
            let result = self.fundamentals.clone();
            Box::pin(async move { result })
        }

        fn fetch_news<'a>(
            &'a self,
            _request: &'a NewsRequest,
        ) -> BoxFuture<'a, Result<Vec<NewsItem>, ProviderError>> {
            let provider = self.provider;
            Box::pin(async move { Err(ProviderError::unavailable(provider, "not stubbed")) })
        }
    }

    fn resolver(sources: Vec<Arc<dyn DataSource>>) -> Resolver {
        Resolver::new(
            sources,
            Arc::new(ProviderGateway::new(&ProviderPolicy::all_by_priority())),
            Duration::from_secs(5),
        )
    }

    fn security(raw: &str) -> SecurityIdentifier {
        SecurityIdentifier::parse(raw).expect("valid symbol")
    }

    #[tokio::test]
    async fn quote_merge_prefers_higher_priority_fields() {
        let primary = QuoteFields {
            price: Some(100.0),
            ..QuoteFields::default()
        };
        let secondary = QuoteFields {
            price: Some(99.5),
            volume: Some(4_000),
            market_cap: Some(1.0e12),
            ..QuoteFields::default()
        };

        let resolver = resolver(vec![
            Arc::new(StubSource::with_quote(ProviderId::Yahoo, Ok(primary))),
            Arc::new(StubSource::with_quote(ProviderId::Polygon, Ok(secondary))),
        ]);

        let quote = resolver
            .resolve_quote(&security("AAPL"))
            .await
            .expect("merge should succeed");

        // Priority holder wins conflicts, gaps are filled from below.
        assert_eq!(quote.fields.price, Some(100.0));
        assert_eq!(quote.fields.volume, Some(4_000));
        assert_eq!(quote.fields.market_cap, Some(1.0e12));
        assert_eq!(
            quote.sources,
            vec![ProviderId::Yahoo, ProviderId::Polygon]
        );
    }

    #[tokio::test]
    async fn partial_failures_still_produce_a_quote() {
        let resolver = resolver(vec![
            Arc::new(StubSource::with_quote(
                ProviderId::Yahoo,
                Err(ProviderError::invalid_request(ProviderId::Yahoo, "down")),
            )),
            Arc::new(StubSource::with_quote(
                ProviderId::Polygon,
                Ok(QuoteFields {
                    price: Some(42.0),
                    ..QuoteFields::default()
                }),
            )),
        ]);

        let quote = resolver
            .resolve_quote(&security("MSFT"))
            .await
            .expect("one provider is enough");

        assert_eq!(quote.fields.price, Some(42.0));
        assert_eq!(quote.sources, vec![ProviderId::Polygon]);
    }

    #[tokio::test]
    async fn priceless_success_is_still_a_quote() {
        let resolver = resolver(vec![Arc::new(StubSource::with_quote(
            ProviderId::Yahoo,
            Ok(QuoteFields::default()),
        ))]);

        let quote = resolver
            .resolve_quote(&security("AAPL"))
            .await
            .expect("an answer with no fields is not a failure");

        assert_eq!(quote.fields.price, None);
        assert_eq!(quote.sources, vec![ProviderId::Yahoo]);
    }

    #[tokio::test]
    async fn total_failure_reports_every_reason() {
        let resolver = resolver(vec![
            Arc::new(StubSource::with_quote(
                ProviderId::Yahoo,
                Err(ProviderError::invalid_request(ProviderId::Yahoo, "nope")),
            )),
            Arc::new(StubSource::with_quote(
                ProviderId::Polygon,
                Err(ProviderError::invalid_request(ProviderId::Polygon, "nope")),
            )),
        ]);

        let err = resolver
            .resolve_quote(&security("ZZZQ"))
            .await
            .expect_err("all providers failed");

        assert_eq!(err.kind, DataKind::Quote);
        assert_eq!(err.failures.len(), 2);
        let providers: Vec<ProviderId> = err.failures.iter().map(|f| f.provider).collect();
        assert!(providers.contains(&ProviderId::Yahoo));
        assert!(providers.contains(&ProviderId::Polygon));
    }

    #[tokio::test]
    async fn fundamentals_fall_back_in_priority_order() {
        let first = StubSource {
            provider: ProviderId::Yahoo,
            quote: Err(ProviderError::unavailable(ProviderId::Yahoo, "unused")),
            fundamentals: Err(ProviderError::unavailable(ProviderId::Yahoo, "down")),
        };
        let second = StubSource {
            provider: ProviderId::Polygon,
            quote: Err(ProviderError::unavailable(ProviderId::Polygon, "unused")),
            fundamentals: Ok(Fundamentals {
                name: Some(String::from("Apple Inc.")),
                ..Fundamentals::default()
            }),
        };

        let resolver = resolver(vec![Arc::new(first), Arc::new(second)]);
        let fundamentals = resolver
            .resolve_fundamentals(&security("AAPL"))
            .await
            .expect("fallback should succeed");

        assert_eq!(fundamentals.name.as_deref(), Some("Apple Inc."));
    }

    #[tokio::test]
    async fn incapable_providers_are_skipped_with_reason() {
        // Forex fundamentals: no provider serves them.
        let resolver = resolver(vec![Arc::new(StubSource::with_quote(
            ProviderId::Yahoo,
            Ok(QuoteFields::default()),
        ))]);

        let err = resolver
            .resolve_fundamentals(&security("EURUSD=X"))
            .await
            .expect_err("nothing can serve this");

        assert_eq!(err.failures.len(), 1);
        assert_eq!(
            err.failures[0].kind,
            crate::data_source::ProviderErrorKind::Unsupported
        );
    }
}
