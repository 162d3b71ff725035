use std::sync::Arc;

use serde::Deserialize;

use crate::data_source::{
    BoxFuture, CapabilitySet, DataSource, Fundamentals, FundamentalsRequest, NewsItem,
    NewsRequest, ProviderError, QuoteRequest, SeriesRequest, EQUITY_ONLY,
};
use crate::http_client::{HttpAuth, HttpClient, HttpError, HttpErrorKind, HttpRequest};
use crate::{
    AssetClass, Interval, PricePoint, PriceSeries, ProviderId, QuoteFields, UtcDateTime,
};

const BASE_URL: &str = "https://api.polygon.io";

const MARKET_CLASSES: &[AssetClass] = &[
    AssetClass::Stock,
    AssetClass::Etf,
    AssetClass::Crypto,
    AssetClass::Forex,
    AssetClass::Index,
    AssetClass::Option,
];

/// Polygon.io adapter. Quotes come from the previous-day aggregate, which
/// is what the free tier exposes.
pub struct PolygonAdapter {
    http: Arc<dyn HttpClient>,
    api_key: Option<String>,
}

impl PolygonAdapter {
    pub fn new(http: Arc<dyn HttpClient>, api_key: Option<String>) -> Self {
        Self { http, api_key }
    }

    fn auth(&self) -> Result<HttpAuth, ProviderError> {
        let key = self
            .api_key
            .as_ref()
            .ok_or_else(|| ProviderError::missing_credentials(ProviderId::Polygon))?;
        Ok(HttpAuth::QueryParam {
            name: String::from("apiKey"),
            value: key.clone(),
        })
    }

    async fn get(&self, request: HttpRequest) -> Result<String, ProviderError> {
        let request = request.with_auth(&self.auth()?);
        let response = self
            .http
            .execute(request)
            .await
            .map_err(map_transport_error)?;

        match response.status {
            status if (200..300).contains(&status) => Ok(response.body),
            429 => Err(ProviderError::rate_limited(
                ProviderId::Polygon,
                "upstream returned 429",
            )),
            401 | 403 => Err(ProviderError::invalid_request(
                ProviderId::Polygon,
                "API key rejected",
            )),
            404 => Err(ProviderError::invalid_request(
                ProviderId::Polygon,
                "ticker not found",
            )),
            status => Err(ProviderError::unavailable(
                ProviderId::Polygon,
                format!("upstream returned status {status}"),
            )),
        }
    }

    fn encode(&self, request_security: &crate::SecurityIdentifier) -> Result<String, ProviderError> {
        request_security
            .encode(ProviderId::Polygon)
            .map_err(|e| ProviderError::unsupported(ProviderId::Polygon, e.to_string()))
    }
}

fn map_transport_error(error: HttpError) -> ProviderError {
    match error.kind {
        HttpErrorKind::Timeout => ProviderError::timeout(ProviderId::Polygon, error.message()),
        HttpErrorKind::Connect | HttpErrorKind::Other => {
            ProviderError::unavailable(ProviderId::Polygon, error.message())
        }
    }
}

fn decode_error(error: serde_json::Error) -> ProviderError {
    ProviderError::decode(ProviderId::Polygon, error.to_string())
}

/// Polygon reports volume as a float; NaN or negative values are dropped
/// instead of being cast through.
fn volume_from_f64(volume: f64) -> Option<u64> {
    (volume.is_finite() && volume >= 0.0).then(|| volume.round() as u64)
}

/// Polygon's aggregate path segments for a candle width.
fn aggregate_span(interval: Interval) -> (u32, &'static str) {
    match interval {
        Interval::OneMinute => (1, "minute"),
        Interval::FiveMinutes => (5, "minute"),
        Interval::FifteenMinutes => (15, "minute"),
        Interval::ThirtyMinutes => (30, "minute"),
        Interval::OneHour => (1, "hour"),
        Interval::OneDay => (1, "day"),
        Interval::OneWeek => (1, "week"),
        Interval::OneMonth => (1, "month"),
    }
}

impl DataSource for PolygonAdapter {
    fn provider_id(&self) -> ProviderId {
        ProviderId::Polygon
    }

    fn capabilities(&self) -> CapabilitySet {
        CapabilitySet {
            quote: MARKET_CLASSES,
            series: MARKET_CLASSES,
            fundamentals: EQUITY_ONLY,
            news: &[],
        }
    }

    fn fetch_quote<'a>(
        &'a self,
        request: &'a QuoteRequest,
    ) -> BoxFuture<'a, Result<QuoteFields, ProviderError>> {
        Box::pin(async move {
            let ticker = self.encode(&request.security)?;
            let url = format!("{BASE_URL}/v2/aggs/ticker/{}/prev", urlencoding::encode(&ticker));

            let body = self
                .get(HttpRequest::get(&url).with_query("adjusted", "true"))
                .await?;
            let parsed: AggsEnvelope = serde_json::from_str(&body).map_err(decode_error)?;

            let bar = parsed.results.into_iter().next().ok_or_else(|| {
                ProviderError::invalid_request(
                    ProviderId::Polygon,
                    format!("no aggregate data for {ticker}"),
                )
            })?;

            let change = match (bar.close, bar.open) {
                (Some(close), Some(open)) => Some(close - open),
                _ => None,
            };
            let change_percent = match (change, bar.open) {
                (Some(change), Some(open)) if open != 0.0 => Some(change / open * 100.0),
                _ => None,
            };

            Ok(QuoteFields {
                price: bar.close,
                change,
                change_percent,
                open: bar.open,
                high: bar.high,
                low: bar.low,
                previous_close: None,
                volume: bar.volume.and_then(volume_from_f64),
                bid: None,
                ask: None,
                market_cap: None,
                currency: None,
            })
        })
    }

    fn fetch_series<'a>(
        &'a self,
        request: &'a SeriesRequest,
    ) -> BoxFuture<'a, Result<PriceSeries, ProviderError>> {
        Box::pin(async move {
            let ticker = self.encode(&request.security)?;
            let (multiplier, timespan) = aggregate_span(request.interval);

            let to = UtcDateTime::now();
            let from = to.saturating_sub(request.range.approximate_duration());
            let url = format!(
                "{BASE_URL}/v2/aggs/ticker/{}/range/{multiplier}/{timespan}/{}/{}",
                urlencoding::encode(&ticker),
                from.unix_seconds() * 1_000,
                to.unix_seconds() * 1_000,
            );

            let body = self
                .get(
                    HttpRequest::get(&url)
                        .with_query("adjusted", "true")
                        .with_query("sort", "asc")
                        .with_query("limit", "5000"),
                )
                .await?;
            let parsed: AggsEnvelope = serde_json::from_str(&body).map_err(decode_error)?;

            let mut points: Vec<PricePoint> = Vec::with_capacity(parsed.results.len());
            for bar in parsed.results {
                let (Some(timestamp_ms), Some(open), Some(high), Some(low), Some(close)) =
                    (bar.timestamp_ms, bar.open, bar.high, bar.low, bar.close)
                else {
                    continue;
                };
                let Ok(timestamp) = UtcDateTime::from_unix_seconds(timestamp_ms / 1_000) else {
                    continue;
                };
                if points
                    .last()
                    .is_some_and(|last: &PricePoint| timestamp <= last.timestamp)
                {
                    continue;
                }

                points.push(PricePoint {
                    timestamp,
                    open,
                    high,
                    low,
                    close,
                    volume: bar.volume.and_then(volume_from_f64),
                });
            }

            PriceSeries::new(request.security.symbol().clone(), request.interval, points)
                .map_err(|e| ProviderError::decode(ProviderId::Polygon, e.to_string()))
        })
    }

    fn fetch_fundamentals<'a>(
        &'a self,
        request: &'a FundamentalsRequest,
    ) -> BoxFuture<'a, Result<Fundamentals, ProviderError>> {
        Box::pin(async move {
            let ticker = self.encode(&request.security)?;
            let url = format!(
                "{BASE_URL}/v3/reference/tickers/{}",
                urlencoding::encode(&ticker)
            );

            let body = self.get(HttpRequest::get(&url)).await?;
            let parsed: TickerEnvelope = serde_json::from_str(&body).map_err(decode_error)?;
            let details = parsed.results.ok_or_else(|| {
                ProviderError::invalid_request(
                    ProviderId::Polygon,
                    format!("no reference data for {ticker}"),
                )
            })?;

            Ok(Fundamentals {
                name: details.name,
                sector: None,
                industry: details.sic_description,
                market_cap: details.market_cap,
                pe_ratio: None,
                eps: None,
                dividend_yield: None,
                beta: None,
                week52_high: None,
                week52_low: None,
                description: details.description,
            })
        })
    }

    fn fetch_news<'a>(
        &'a self,
        request: &'a NewsRequest,
    ) -> BoxFuture<'a, Result<Vec<NewsItem>, ProviderError>> {
        let _ = request;
        Box::pin(async move {
            Err(ProviderError::unsupported(
                ProviderId::Polygon,
                "news is not served by this provider",
            ))
        })
    }
}

// Polygon wire formats.

#[derive(Debug, Deserialize)]
struct AggsEnvelope {
    #[serde(default)]
    results: Vec<AggBar>,
}

#[derive(Debug, Deserialize)]
struct AggBar {
    #[serde(rename = "t")]
    timestamp_ms: Option<i64>,
    #[serde(rename = "o")]
    open: Option<f64>,
    #[serde(rename = "h")]
    high: Option<f64>,
    #[serde(rename = "l")]
    low: Option<f64>,
    #[serde(rename = "c")]
    close: Option<f64>,
    #[serde(rename = "v")]
    volume: Option<f64>,
}

#[derive(Debug, Deserialize)]
struct TickerEnvelope {
    #[serde(default)]
    results: Option<TickerDetails>,
}

#[derive(Debug, Deserialize)]
struct TickerDetails {
    #[serde(default)]
    name: Option<String>,
    #[serde(default)]
    market_cap: Option<f64>,
    #[serde(default)]
    sic_description: Option<String>,
    #[serde(default)]
    description: Option<String>,
}
