use std::sync::Arc;
use std::time::{Duration, Instant};

use serde::Deserialize;
use tokio::sync::Mutex;

use crate::data_source::{
    BoxFuture, CapabilitySet, DataSource, Fundamentals, FundamentalsRequest, NewsItem,
    NewsRequest, ProviderError, QuoteRequest, SeriesRequest, ALL_CLASSES, EQUITY_ONLY,
};
use crate::http_client::{HttpClient, HttpError, HttpErrorKind, HttpRequest, HttpResponse};
use crate::{
    AssetClass, PricePoint, PriceSeries, ProviderId, QuoteFields, UtcDateTime,
};

const QUOTE_URL: &str = "https://query1.finance.yahoo.com/v7/finance/quote";
const CHART_URL: &str = "https://query1.finance.yahoo.com/v8/finance/chart";
const SUMMARY_URL: &str = "https://query1.finance.yahoo.com/v10/finance/quoteSummary";
const SEARCH_URL: &str = "https://query2.finance.yahoo.com/v1/finance/search";
const COOKIE_URL: &str = "https://fc.yahoo.com";
const CRUMB_URLS: [&str; 2] = [
    "https://query1.finance.yahoo.com/v1/test/getcrumb",
    "https://query2.finance.yahoo.com/v1/test/getcrumb",
];
const CRUMB_TTL: Duration = Duration::from_secs(3600);
const REFERER: &str = "https://finance.yahoo.com/";

const NEWS_CLASSES: &[AssetClass] = &[
    AssetClass::Stock,
    AssetClass::Etf,
    AssetClass::Crypto,
    AssetClass::Index,
];

/// Cached crumb token for Yahoo's session-gated endpoints.
///
/// The unofficial API wants a session cookie (picked up by the transport's
/// cookie jar when visiting fc.yahoo.com) and a crumb query parameter.
#[derive(Default)]
struct CrumbCache {
    crumb: Mutex<Option<(String, Instant)>>,
}

impl CrumbCache {
    async fn get(&self, http: &Arc<dyn HttpClient>) -> Result<String, ProviderError> {
        let mut slot = self.crumb.lock().await;
        if let Some((crumb, fetched_at)) = slot.as_ref() {
            if fetched_at.elapsed() < CRUMB_TTL {
                return Ok(crumb.clone());
            }
        }

        let crumb = Self::refresh(http).await?;
        *slot = Some((crumb.clone(), Instant::now()));
        Ok(crumb)
    }

    async fn invalidate(&self) {
        *self.crumb.lock().await = None;
    }

    async fn refresh(http: &Arc<dyn HttpClient>) -> Result<String, ProviderError> {
        // The cookie response body is irrelevant; the jar keeps the session.
        let cookie_request = HttpRequest::get(COOKIE_URL).with_header("referer", REFERER);
        let _ = http.execute(cookie_request).await;

        for url in CRUMB_URLS {
            let request = HttpRequest::get(url).with_header("referer", REFERER);
            let Ok(response) = http.execute(request).await else {
                continue;
            };
            if !response.is_success() {
                continue;
            }

            let body = response.body.trim();
            let looks_like_crumb =
                !body.is_empty() && body.len() < 100 && !body.contains('<') && !body.contains(' ');
            if looks_like_crumb {
                return Ok(body.to_owned());
            }
        }

        Err(ProviderError::unavailable(
            ProviderId::Yahoo,
            "failed to obtain session crumb",
        ))
    }
}

/// Yahoo Finance adapter. Serves every asset class for quotes and series,
/// plus company fundamentals and news for the classes that have them.
pub struct YahooAdapter {
    http: Arc<dyn HttpClient>,
    crumb: CrumbCache,
}

impl YahooAdapter {
    pub fn new(http: Arc<dyn HttpClient>) -> Self {
        Self {
            http,
            crumb: CrumbCache::default(),
        }
    }

    /// Execute a crumb-authenticated GET, refreshing the session once when
    /// Yahoo rejects the current crumb.
    async fn get_with_crumb(
        &self,
        build: impl Fn(&str) -> HttpRequest,
    ) -> Result<HttpResponse, ProviderError> {
        let crumb = self.crumb.get(&self.http).await?;
        let response = self
            .http
            .execute(build(&crumb).with_header("referer", REFERER))
            .await
            .map_err(map_transport_error)?;

        if matches!(response.status, 401 | 403) {
            self.crumb.invalidate().await;
            let crumb = self.crumb.get(&self.http).await?;
            let retry = self
                .http
                .execute(build(&crumb).with_header("referer", REFERER))
                .await
                .map_err(map_transport_error)?;
            return check_status(retry);
        }

        check_status(response)
    }
}

fn map_transport_error(error: HttpError) -> ProviderError {
    match error.kind {
        HttpErrorKind::Timeout => ProviderError::timeout(ProviderId::Yahoo, error.message()),
        HttpErrorKind::Connect | HttpErrorKind::Other => {
            ProviderError::unavailable(ProviderId::Yahoo, error.message())
        }
    }
}

fn check_status(response: HttpResponse) -> Result<HttpResponse, ProviderError> {
    if response.is_success() {
        return Ok(response);
    }
    match response.status {
        429 => Err(ProviderError::rate_limited(
            ProviderId::Yahoo,
            "upstream returned 429",
        )),
        404 => Err(ProviderError::invalid_request(
            ProviderId::Yahoo,
            "symbol not found",
        )),
        status => Err(ProviderError::unavailable(
            ProviderId::Yahoo,
            format!("upstream returned status {status}"),
        )),
    }
}

fn decode_error(error: serde_json::Error) -> ProviderError {
    ProviderError::decode(ProviderId::Yahoo, error.to_string())
}

impl DataSource for YahooAdapter {
    fn provider_id(&self) -> ProviderId {
        ProviderId::Yahoo
    }

    fn capabilities(&self) -> CapabilitySet {
        CapabilitySet {
            quote: ALL_CLASSES,
            series: ALL_CLASSES,
            fundamentals: EQUITY_ONLY,
            news: NEWS_CLASSES,
        }
    }

    fn fetch_quote<'a>(
        &'a self,
        request: &'a QuoteRequest,
    ) -> BoxFuture<'a, Result<QuoteFields, ProviderError>> {
        Box::pin(async move {
            let encoded = request
                .security
                .encode(ProviderId::Yahoo)
                .map_err(|e| ProviderError::unsupported(ProviderId::Yahoo, e.to_string()))?;

            let response = self
                .get_with_crumb(|crumb| {
                    HttpRequest::get(QUOTE_URL)
                        .with_query("symbols", &encoded)
                        .with_query("crumb", crumb)
                })
                .await?;

            let parsed: QuoteEnvelope =
                serde_json::from_str(&response.body).map_err(decode_error)?;
            let quote = parsed
                .quote_response
                .result
                .into_iter()
                .next()
                .ok_or_else(|| {
                    ProviderError::invalid_request(
                        ProviderId::Yahoo,
                        format!("no quote data for {encoded}"),
                    )
                })?;

            Ok(QuoteFields {
                price: quote.regular_market_price,
                change: quote.regular_market_change,
                change_percent: quote.regular_market_change_percent,
                open: quote.regular_market_open,
                high: quote.regular_market_day_high,
                low: quote.regular_market_day_low,
                previous_close: quote.regular_market_previous_close,
                volume: quote.regular_market_volume.and_then(|v| u64::try_from(v).ok()),
                bid: quote.bid,
                ask: quote.ask,
                market_cap: quote.market_cap,
                currency: quote.currency,
            })
        })
    }

    fn fetch_series<'a>(
        &'a self,
        request: &'a SeriesRequest,
    ) -> BoxFuture<'a, Result<PriceSeries, ProviderError>> {
        Box::pin(async move {
            let encoded = request
                .security
                .encode(ProviderId::Yahoo)
                .map_err(|e| ProviderError::unsupported(ProviderId::Yahoo, e.to_string()))?;
            let url = format!("{CHART_URL}/{}", urlencoding::encode(&encoded));

            let response = self
                .get_with_crumb(|crumb| {
                    HttpRequest::get(&url)
                        .with_query("range", request.range.as_str())
                        .with_query("interval", request.interval.as_str())
                        .with_query("crumb", crumb)
                })
                .await?;

            let parsed: ChartEnvelope =
                serde_json::from_str(&response.body).map_err(decode_error)?;
            if let Some(error) = parsed.chart.error {
                return Err(ProviderError::invalid_request(
                    ProviderId::Yahoo,
                    error.description.unwrap_or(error.code),
                ));
            }

            let result = parsed.chart.result.into_iter().next().ok_or_else(|| {
                ProviderError::decode(ProviderId::Yahoo, "chart response has no result")
            })?;
            let timestamps = result.timestamp.unwrap_or_default();
            let candles = result
                .indicators
                .quote
                .into_iter()
                .next()
                .unwrap_or_default();

            let mut points: Vec<PricePoint> = Vec::with_capacity(timestamps.len());
            for (i, &ts) in timestamps.iter().enumerate() {
                // Rows with missing prices are holes in Yahoo's data, skip them.
                let (Some(open), Some(high), Some(low), Some(close)) = (
                    candles.open.get(i).copied().flatten(),
                    candles.high.get(i).copied().flatten(),
                    candles.low.get(i).copied().flatten(),
                    candles.close.get(i).copied().flatten(),
                ) else {
                    continue;
                };

                let Ok(timestamp) = UtcDateTime::from_unix_seconds(ts) else {
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
                    volume: candles
                        .volume
                        .get(i)
                        .copied()
                        .flatten()
                        .and_then(|v| u64::try_from(v).ok()),
                });
            }

            PriceSeries::new(request.security.symbol().clone(), request.interval, points)
                .map_err(|e| ProviderError::decode(ProviderId::Yahoo, e.to_string()))
        })
    }

    fn fetch_fundamentals<'a>(
        &'a self,
        request: &'a FundamentalsRequest,
    ) -> BoxFuture<'a, Result<Fundamentals, ProviderError>> {
        Box::pin(async move {
            let encoded = request
                .security
                .encode(ProviderId::Yahoo)
                .map_err(|e| ProviderError::unsupported(ProviderId::Yahoo, e.to_string()))?;
            let url = format!("{SUMMARY_URL}/{}", urlencoding::encode(&encoded));

            let response = self
                .get_with_crumb(|crumb| {
                    HttpRequest::get(&url)
                        .with_query(
                            "modules",
                            "assetProfile,summaryDetail,defaultKeyStatistics,price",
                        )
                        .with_query("crumb", crumb)
                })
                .await?;

            let parsed: SummaryEnvelope =
                serde_json::from_str(&response.body).map_err(decode_error)?;
            let result = parsed
                .quote_summary
                .result
                .into_iter()
                .next()
                .ok_or_else(|| {
                    ProviderError::invalid_request(
                        ProviderId::Yahoo,
                        format!("no fundamentals for {encoded}"),
                    )
                })?;

            let profile = result.asset_profile.unwrap_or_default();
            let detail = result.summary_detail.unwrap_or_default();
            let stats = result.default_key_statistics.unwrap_or_default();
            let price = result.price.unwrap_or_default();

            Ok(Fundamentals {
                name: price.long_name.or(price.short_name),
                sector: profile.sector,
                industry: profile.industry,
                market_cap: raw(price.market_cap),
                pe_ratio: raw(detail.trailing_pe).or_else(|| raw(detail.forward_pe)),
                eps: raw(stats.trailing_eps),
                dividend_yield: raw(detail.dividend_yield),
                beta: raw(detail.beta),
                week52_high: raw(detail.fifty_two_week_high),
                week52_low: raw(detail.fifty_two_week_low),
                description: profile.long_business_summary,
            })
        })
    }

    fn fetch_news<'a>(
        &'a self,
        request: &'a NewsRequest,
    ) -> BoxFuture<'a, Result<Vec<NewsItem>, ProviderError>> {
        Box::pin(async move {
            let query = request.security.base().to_owned();
            let limit = request.limit.to_string();

            // Search endpoint does not need the crumb.
            let http_request = HttpRequest::get(SEARCH_URL)
                .with_query("q", &query)
                .with_query("newsCount", &limit)
                .with_query("quotesCount", "0")
                .with_header("referer", REFERER);

            let response = self
                .http
                .execute(http_request)
                .await
                .map_err(map_transport_error)?;
            let response = check_status(response)?;

            let parsed: SearchEnvelope =
                serde_json::from_str(&response.body).map_err(decode_error)?;

            Ok(parsed
                .news
                .into_iter()
                .take(request.limit)
                .map(|item| NewsItem {
                    title: item.title,
                    publisher: item.publisher,
                    link: item.link,
                    published_at: item
                        .provider_publish_time
                        .and_then(|ts| UtcDateTime::from_unix_seconds(ts).ok()),
                })
                .collect())
        })
    }
}

fn raw(value: Option<RawValue>) -> Option<f64> {
    value.and_then(|v| v.raw).filter(|v| v.is_finite())
}

// Yahoo wire formats. Numeric fields often arrive as `{raw, fmt}` wrappers.

#[derive(Debug, Default, Deserialize)]
struct RawValue {
    #[serde(default)]
    raw: Option<f64>,
}

#[derive(Debug, Deserialize)]
struct QuoteEnvelope {
    #[serde(rename = "quoteResponse")]
    quote_response: QuoteBody,
}

#[derive(Debug, Deserialize)]
struct QuoteBody {
    #[serde(default)]
    result: Vec<QuoteRow>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct QuoteRow {
    regular_market_price: Option<f64>,
    regular_market_change: Option<f64>,
    regular_market_change_percent: Option<f64>,
    regular_market_open: Option<f64>,
    regular_market_day_high: Option<f64>,
    regular_market_day_low: Option<f64>,
    regular_market_previous_close: Option<f64>,
    regular_market_volume: Option<i64>,
    bid: Option<f64>,
    ask: Option<f64>,
    market_cap: Option<f64>,
    currency: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ChartEnvelope {
    chart: ChartBody,
}

#[derive(Debug, Deserialize)]
struct ChartBody {
    #[serde(default)]
    result: Vec<ChartResult>,
    #[serde(default)]
    error: Option<ChartError>,
}

#[derive(Debug, Deserialize)]
struct ChartError {
    code: String,
    #[serde(default)]
    description: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ChartResult {
    #[serde(default)]
    timestamp: Option<Vec<i64>>,
    indicators: ChartIndicators,
}

#[derive(Debug, Deserialize)]
struct ChartIndicators {
    #[serde(default)]
    quote: Vec<ChartCandles>,
}

#[derive(Debug, Default, Deserialize)]
struct ChartCandles {
    #[serde(default)]
    open: Vec<Option<f64>>,
    #[serde(default)]
    high: Vec<Option<f64>>,
    #[serde(default)]
    low: Vec<Option<f64>>,
    #[serde(default)]
    close: Vec<Option<f64>>,
    #[serde(default)]
    volume: Vec<Option<i64>>,
}

#[derive(Debug, Deserialize)]
struct SummaryEnvelope {
    #[serde(rename = "quoteSummary")]
    quote_summary: SummaryBody,
}

#[derive(Debug, Deserialize)]
struct SummaryBody {
    #[serde(default)]
    result: Vec<SummaryResult>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct SummaryResult {
    #[serde(default)]
    asset_profile: Option<AssetProfile>,
    #[serde(default)]
    summary_detail: Option<SummaryDetail>,
    #[serde(default)]
    default_key_statistics: Option<KeyStatistics>,
    #[serde(default)]
    price: Option<PriceModule>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct AssetProfile {
    sector: Option<String>,
    industry: Option<String>,
    long_business_summary: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct SummaryDetail {
    trailing_pe: Option<RawValue>,
    forward_pe: Option<RawValue>,
    dividend_yield: Option<RawValue>,
    beta: Option<RawValue>,
    fifty_two_week_high: Option<RawValue>,
    fifty_two_week_low: Option<RawValue>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct KeyStatistics {
    trailing_eps: Option<RawValue>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct PriceModule {
    long_name: Option<String>,
    short_name: Option<String>,
    market_cap: Option<RawValue>,
}

#[derive(Debug, Deserialize)]
struct SearchEnvelope {
    #[serde(default)]
    news: Vec<SearchNewsRow>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct SearchNewsRow {
    title: String,
    #[serde(default)]
    publisher: Option<String>,
    #[serde(default)]
    link: Option<String>,
    #[serde(default)]
    provider_publish_time: Option<i64>,
}
