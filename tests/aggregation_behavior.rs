// End-to-end behavior of the aggregator facade: merging, fallback,
// caching and request coalescing over scripted providers.

use std::sync::Arc;
use std::time::Duration;

use quotemux_tests::*;

fn aggregator(sources: Vec<Arc<dyn DataSource>>) -> Arc<Aggregator> {
    Arc::new(Aggregator::with_sources(AggregatorConfig::default(), sources))
}

#[tokio::test]
async fn quote_merge_keeps_priority_values_and_fills_gaps() {
    let yahoo = Arc::new(FakeProvider::new(ProviderId::Yahoo).with_quote(Ok(QuoteFields {
        price: Some(187.5),
        change: Some(1.2),
        ..QuoteFields::default()
    })));
    let polygon = Arc::new(FakeProvider::new(ProviderId::Polygon).with_quote(Ok(QuoteFields {
        price: Some(187.1),
        volume: Some(52_000_000),
        currency: Some(String::from("USD")),
        ..QuoteFields::default()
    })));

    let aggregator = aggregator(vec![yahoo.clone(), polygon.clone()]);
    let quote = aggregator.quote("AAPL").await.expect("merged quote");

    // The higher-priority provider wins conflicting fields.
    assert_eq!(quote.fields.price, Some(187.5));
    assert_eq!(quote.fields.change, Some(1.2));
    // Gaps are filled from lower-priority answers.
    assert_eq!(quote.fields.volume, Some(52_000_000));
    assert_eq!(quote.fields.currency.as_deref(), Some("USD"));
    // Provenance lists contributors in priority order.
    assert_eq!(quote.sources, vec![ProviderId::Yahoo, ProviderId::Polygon]);
    assert_eq!(quote.asset_class, AssetClass::Stock);
}

#[tokio::test]
async fn quote_survives_a_failing_provider() {
    let yahoo = Arc::new(FakeProvider::new(ProviderId::Yahoo).with_quote(Err(
        ProviderError::unavailable(ProviderId::Yahoo, "upstream 500"),
    )));
    let polygon = Arc::new(
        FakeProvider::new(ProviderId::Polygon).with_quote(Ok(quote_fields(42.0))),
    );

    let aggregator = aggregator(vec![yahoo, polygon]);
    let quote = aggregator.quote("MSFT").await.expect("one provider is enough");

    assert_eq!(quote.fields.price, Some(42.0));
    assert_eq!(quote.sources, vec![ProviderId::Polygon]);
}

#[tokio::test]
async fn priceless_answers_still_count_as_success() {
    let yahoo = Arc::new(
        FakeProvider::new(ProviderId::Yahoo).with_quote(Ok(QuoteFields::default())),
    );

    let aggregator = aggregator(vec![yahoo.clone()]);
    let quote = aggregator
        .quote("AAPL")
        .await
        .expect("no data available is not service unavailable");

    assert_eq!(quote.fields.price, None);
    assert_eq!(quote.sources, vec![ProviderId::Yahoo]);
}

#[tokio::test]
async fn quote_failure_carries_every_provider_reason() {
    let yahoo = Arc::new(FakeProvider::new(ProviderId::Yahoo).with_quote(Err(
        ProviderError::unavailable(ProviderId::Yahoo, "down"),
    )));
    let polygon = Arc::new(FakeProvider::new(ProviderId::Polygon).with_quote(Err(
        ProviderError::rate_limited(ProviderId::Polygon, "throttled"),
    )));

    let aggregator = aggregator(vec![yahoo, polygon]);
    let err = aggregator.quote("ZZZQ").await.expect_err("all failed");

    match err {
        AggregatorError::Resolution(failure) => {
            assert_eq!(failure.kind, DataKind::Quote);
            assert_eq!(failure.symbol, "ZZZQ");
            let providers: Vec<ProviderId> =
                failure.failures.iter().map(|f| f.provider).collect();
            assert!(providers.contains(&ProviderId::Yahoo));
            assert!(providers.contains(&ProviderId::Polygon));
        }
        other => panic!("expected resolution failure, got {other:?}"),
    }
}

#[tokio::test]
async fn series_falls_back_past_empty_answers() {
    let yahoo = Arc::new(
        FakeProvider::new(ProviderId::Yahoo).with_series(Ok(daily_series("AAPL", &[]))),
    );
    let polygon = Arc::new(
        FakeProvider::new(ProviderId::Polygon)
            .with_series(Ok(daily_series("AAPL", &[185.0, 186.0, 187.0]))),
    );

    let aggregator = aggregator(vec![yahoo.clone(), polygon.clone()]);
    let series = aggregator
        .series("AAPL", Some(Interval::OneDay), Range::OneMonth)
        .await
        .expect("fallback should succeed");

    assert_eq!(series.len(), 3);
    assert_eq!(yahoo.call_count(), 1);
    assert_eq!(polygon.call_count(), 1);
}

#[tokio::test]
async fn fundamentals_stop_at_first_success() {
    let yahoo = Arc::new(
        FakeProvider::new(ProviderId::Yahoo).with_fundamentals(Ok(Fundamentals {
            name: Some(String::from("Apple Inc.")),
            ..Fundamentals::default()
        })),
    );
    let polygon = Arc::new(
        FakeProvider::new(ProviderId::Polygon).with_fundamentals(Ok(Fundamentals::default())),
    );

    let aggregator = aggregator(vec![yahoo.clone(), polygon.clone()]);
    let fundamentals = aggregator.fundamentals("AAPL").await.expect("fundamentals");

    assert_eq!(fundamentals.name.as_deref(), Some("Apple Inc."));
    assert_eq!(yahoo.call_count(), 1);
    // The lower-priority provider is never consulted.
    assert_eq!(polygon.call_count(), 0);
}

#[tokio::test]
async fn incapable_providers_are_skipped_without_a_call() {
    let mut provider = FakeProvider::new(ProviderId::Polygon);
    provider.capabilities.news = &[];
    let polygon = Arc::new(provider);

    let aggregator = aggregator(vec![polygon.clone()]);
    let err = aggregator.news("AAPL", 5).await.expect_err("nothing serves news");

    assert_eq!(polygon.call_count(), 0);
    match err {
        AggregatorError::Resolution(failure) => {
            assert_eq!(failure.failures.len(), 1);
            assert_eq!(failure.failures[0].kind, ProviderErrorKind::Unsupported);
        }
        other => panic!("expected resolution failure, got {other:?}"),
    }
}

#[tokio::test]
async fn repeated_requests_are_served_from_cache() {
    let yahoo =
        Arc::new(FakeProvider::new(ProviderId::Yahoo).with_quote(Ok(quote_fields(100.0))));

    let aggregator = aggregator(vec![yahoo.clone()]);
    for _ in 0..3 {
        let quote = aggregator.quote("NVDA").await.expect("quote");
        assert_eq!(quote.fields.price, Some(100.0));
    }

    assert_eq!(yahoo.call_count(), 1);
}

#[tokio::test]
async fn cache_keys_include_series_shape() {
    let yahoo = Arc::new(
        FakeProvider::new(ProviderId::Yahoo)
            .with_series(Ok(daily_series("AAPL", &[185.0, 186.0]))),
    );

    let aggregator = aggregator(vec![yahoo.clone()]);
    aggregator
        .series("AAPL", Some(Interval::OneDay), Range::OneMonth)
        .await
        .expect("series");
    aggregator
        .series("AAPL", Some(Interval::OneWeek), Range::OneYear)
        .await
        .expect("series");
    aggregator
        .series("AAPL", Some(Interval::OneDay), Range::OneMonth)
        .await
        .expect("series");

    // Two distinct shapes, the third request is a cache hit.
    assert_eq!(yahoo.call_count(), 2);
}

#[tokio::test]
async fn indicator_reports_ride_the_cached_series() {
    let closes: Vec<f64> = (0..40).map(|i| 150.0 + (i as f64 * 0.4).sin()).collect();
    let yahoo = Arc::new(
        FakeProvider::new(ProviderId::Yahoo).with_series(Ok(daily_series("AAPL", &closes))),
    );

    let aggregator = aggregator(vec![yahoo.clone()]);
    aggregator
        .series("AAPL", Some(Interval::OneDay), Range::ThreeMonths)
        .await
        .expect("series");
    let report = aggregator
        .indicators("AAPL", Some(Interval::OneDay), Range::ThreeMonths)
        .await
        .expect("report");

    // 40 closes cover the 20-point and MACD windows but not the 50-point one.
    assert!(report.sma_20.is_some());
    assert!(report.rsi_14.is_some());
    assert!(report.macd.is_some());
    assert_eq!(report.sma_50, None);
    // The report reuses the series already in the cache.
    assert_eq!(yahoo.call_count(), 1);
}

#[tokio::test]
async fn clearing_the_cache_forces_a_refetch() {
    let yahoo =
        Arc::new(FakeProvider::new(ProviderId::Yahoo).with_quote(Ok(quote_fields(100.0))));

    let aggregator = aggregator(vec![yahoo.clone()]);
    aggregator.quote("NVDA").await.expect("quote");
    aggregator.clear_cache().await;
    aggregator.quote("NVDA").await.expect("quote");

    assert_eq!(yahoo.call_count(), 2);
}

#[tokio::test]
async fn concurrent_identical_requests_coalesce() {
    let yahoo = Arc::new(
        FakeProvider::new(ProviderId::Yahoo)
            .with_quote(Ok(quote_fields(250.0)))
            .with_latency(Duration::from_millis(20)),
    );

    let aggregator = aggregator(vec![yahoo.clone()]);
    let tasks: Vec<_> = (0..4)
        .map(|_| {
            let aggregator = Arc::clone(&aggregator);
            tokio::spawn(async move { aggregator.quote("TSLA").await })
        })
        .collect();

    for task in tasks {
        let quote = task.await.expect("join").expect("quote");
        assert_eq!(quote.fields.price, Some(250.0));
    }

    assert_eq!(yahoo.call_count(), 1);
}

#[tokio::test]
async fn invalid_symbols_never_reach_providers() {
    let yahoo = Arc::new(FakeProvider::new(ProviderId::Yahoo));
    let aggregator = aggregator(vec![yahoo.clone()]);

    for bad in ["", "   ", "AAPL;DROP TABLE", "A".repeat(40).as_str()] {
        let err = aggregator.quote(bad).await.expect_err("must be rejected");
        assert!(matches!(err, AggregatorError::Validation(_)), "input {bad:?}");
    }

    assert_eq!(yahoo.call_count(), 0);
}
