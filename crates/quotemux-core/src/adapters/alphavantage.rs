use std::collections::BTreeMap;
use std::sync::Arc;

use serde::Deserialize;
use time::format_description::FormatItem;
use time::macros::format_description;
use time::{Date, PrimitiveDateTime, Time, UtcOffset};

use crate::data_source::{
    BoxFuture, CapabilitySet, DataSource, Fundamentals, FundamentalsRequest, NewsItem,
    NewsRequest, ProviderError, QuoteRequest, SeriesRequest, EQUITY_ONLY,
};
use crate::http_client::{HttpAuth, HttpClient, HttpError, HttpErrorKind, HttpRequest};
use crate::{
    AssetClass, Interval, PricePoint, PriceSeries, ProviderId, QuoteFields, UtcDateTime,
};

const BASE_URL: &str = "https://www.alphavantage.co/query";

const QUOTE_CLASSES: &[AssetClass] = &[
    AssetClass::Stock,
    AssetClass::Etf,
    AssetClass::Forex,
    AssetClass::Crypto,
];

const DATE_FORMAT: &[FormatItem<'_>] = format_description!("[year]-[month]-[day]");

/// Alpha Vantage adapter. Free tier is heavily throttled, so this sits
/// last in the fallback chain.
pub struct AlphavantageAdapter {
    http: Arc<dyn HttpClient>,
    api_key: Option<String>,
}

impl AlphavantageAdapter {
    pub fn new(http: Arc<dyn HttpClient>, api_key: Option<String>) -> Self {
        Self { http, api_key }
    }

    async fn get(&self, request: HttpRequest) -> Result<String, ProviderError> {
        let key = self
            .api_key
            .as_ref()
            .ok_or_else(|| ProviderError::missing_credentials(ProviderId::Alphavantage))?;
        let request = request.with_auth(&HttpAuth::QueryParam {
            name: String::from("apikey"),
            value: key.clone(),
        });

        let response = self
            .http
            .execute(request)
            .await
            .map_err(map_transport_error)?;

        if response.status == 429 {
            return Err(ProviderError::rate_limited(
                ProviderId::Alphavantage,
                "upstream returned 429",
            ));
        }
        if !response.is_success() {
            return Err(ProviderError::unavailable(
                ProviderId::Alphavantage,
                format!("upstream returned status {}", response.status),
            ));
        }

        // Throttling and request errors come back as 200 with a marker key.
        let probe: ApiNotice = serde_json::from_str(&response.body).unwrap_or_default();
        if let Some(note) = probe.note.or(probe.information) {
            return Err(ProviderError::rate_limited(ProviderId::Alphavantage, note));
        }
        if let Some(message) = probe.error_message {
            return Err(ProviderError::invalid_request(
                ProviderId::Alphavantage,
                message,
            ));
        }

        Ok(response.body)
    }
}

fn map_transport_error(error: HttpError) -> ProviderError {
    match error.kind {
        HttpErrorKind::Timeout => {
            ProviderError::timeout(ProviderId::Alphavantage, error.message())
        }
        HttpErrorKind::Connect | HttpErrorKind::Other => {
            ProviderError::unavailable(ProviderId::Alphavantage, error.message())
        }
    }
}

fn decode_error(error: serde_json::Error) -> ProviderError {
    ProviderError::decode(ProviderId::Alphavantage, error.to_string())
}

fn parse_number(value: &str) -> Option<f64> {
    value.trim().trim_end_matches('%').parse::<f64>().ok()
}

fn series_function(interval: Interval) -> Result<&'static str, ProviderError> {
    match interval {
        Interval::OneDay => Ok("TIME_SERIES_DAILY"),
        Interval::OneWeek => Ok("TIME_SERIES_WEEKLY"),
        Interval::OneMonth => Ok("TIME_SERIES_MONTHLY"),
        _ => Err(ProviderError::unsupported(
            ProviderId::Alphavantage,
            format!("interval {interval} is not served by this provider"),
        )),
    }
}

fn series_key(interval: Interval) -> &'static str {
    match interval {
        Interval::OneWeek => "Weekly Time Series",
        Interval::OneMonth => "Monthly Time Series",
        _ => "Time Series (Daily)",
    }
}

fn parse_date(value: &str) -> Option<UtcDateTime> {
    let date = Date::parse(value, DATE_FORMAT).ok()?;
    let datetime = PrimitiveDateTime::new(date, Time::MIDNIGHT).assume_offset(UtcOffset::UTC);
    UtcDateTime::from_offset_datetime(datetime).ok()
}

impl DataSource for AlphavantageAdapter {
    fn provider_id(&self) -> ProviderId {
        ProviderId::Alphavantage
    }

    fn capabilities(&self) -> CapabilitySet {
        CapabilitySet {
            quote: QUOTE_CLASSES,
            series: EQUITY_ONLY,
            fundamentals: EQUITY_ONLY,
            news: &[],
        }
    }

    fn fetch_quote<'a>(
        &'a self,
        request: &'a QuoteRequest,
    ) -> BoxFuture<'a, Result<QuoteFields, ProviderError>> {
        Box::pin(async move {
            match request.security.asset_class() {
                AssetClass::Forex | AssetClass::Crypto => self.fetch_exchange_rate(request).await,
                _ => self.fetch_global_quote(request).await,
            }
        })
    }

    fn fetch_series<'a>(
        &'a self,
        request: &'a SeriesRequest,
    ) -> BoxFuture<'a, Result<PriceSeries, ProviderError>> {
        Box::pin(async move {
            let symbol = request
                .security
                .encode(ProviderId::Alphavantage)
                .map_err(|e| ProviderError::unsupported(ProviderId::Alphavantage, e.to_string()))?;
            let function = series_function(request.interval)?;

            let body = self
                .get(
                    HttpRequest::get(BASE_URL)
                        .with_query("function", function)
                        .with_query("symbol", &symbol)
                        .with_query("outputsize", "compact"),
                )
                .await?;

            let parsed: serde_json::Value =
                serde_json::from_str(&body).map_err(decode_error)?;
            let rows: BTreeMap<String, SeriesRow> = parsed
                .get(series_key(request.interval))
                .cloned()
                .map(serde_json::from_value)
                .transpose()
                .map_err(decode_error)?
                .ok_or_else(|| {
                    ProviderError::decode(
                        ProviderId::Alphavantage,
                        "response has no time series payload",
                    )
                })?;

            // BTreeMap keys are date strings, so iteration is already
            // chronological.
            let cutoff = UtcDateTime::now().saturating_sub(request.range.approximate_duration());
            let mut points = Vec::with_capacity(rows.len());
            for (date, row) in rows {
                let Some(timestamp) = parse_date(&date) else {
                    continue;
                };
                if timestamp < cutoff {
                    continue;
                }
                let (Some(open), Some(high), Some(low), Some(close)) = (
                    parse_number(&row.open),
                    parse_number(&row.high),
                    parse_number(&row.low),
                    parse_number(&row.close),
                ) else {
                    continue;
                };

                points.push(PricePoint {
                    timestamp,
                    open,
                    high,
                    low,
                    close,
                    volume: row.volume.as_deref().and_then(|v| v.parse().ok()),
                });
            }

            PriceSeries::new(request.security.symbol().clone(), request.interval, points)
                .map_err(|e| ProviderError::decode(ProviderId::Alphavantage, e.to_string()))
        })
    }

    fn fetch_fundamentals<'a>(
        &'a self,
        request: &'a FundamentalsRequest,
    ) -> BoxFuture<'a, Result<Fundamentals, ProviderError>> {
        Box::pin(async move {
            let symbol = request
                .security
                .encode(ProviderId::Alphavantage)
                .map_err(|e| ProviderError::unsupported(ProviderId::Alphavantage, e.to_string()))?;

            let body = self
                .get(
                    HttpRequest::get(BASE_URL)
                        .with_query("function", "OVERVIEW")
                        .with_query("symbol", &symbol),
                )
                .await?;

            let overview: OverviewRow = serde_json::from_str(&body).map_err(decode_error)?;
            if overview.name.is_none() {
                return Err(ProviderError::invalid_request(
                    ProviderId::Alphavantage,
                    format!("no overview data for {symbol}"),
                ));
            }

            let num = |value: &Option<String>| value.as_deref().and_then(parse_number);

            Ok(Fundamentals {
                name: overview.name,
                sector: overview.sector,
                industry: overview.industry,
                market_cap: num(&overview.market_capitalization),
                pe_ratio: num(&overview.pe_ratio),
                eps: num(&overview.eps),
                dividend_yield: num(&overview.dividend_yield),
                beta: num(&overview.beta),
                week52_high: num(&overview.week52_high),
                week52_low: num(&overview.week52_low),
                description: overview.description,
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
                ProviderId::Alphavantage,
                "news is not served by this provider",
            ))
        })
    }
}

impl AlphavantageAdapter {
    async fn fetch_global_quote(
        &self,
        request: &QuoteRequest,
    ) -> Result<QuoteFields, ProviderError> {
        let symbol = request
            .security
            .encode(ProviderId::Alphavantage)
            .map_err(|e| ProviderError::unsupported(ProviderId::Alphavantage, e.to_string()))?;

        let body = self
            .get(
                HttpRequest::get(BASE_URL)
                    .with_query("function", "GLOBAL_QUOTE")
                    .with_query("symbol", &symbol),
            )
            .await?;

        let parsed: GlobalQuoteEnvelope = serde_json::from_str(&body).map_err(decode_error)?;
        let quote = parsed.global_quote.ok_or_else(|| {
            ProviderError::invalid_request(
                ProviderId::Alphavantage,
                format!("no quote data for {symbol}"),
            )
        })?;

        let field = |value: &Option<String>| value.as_deref().and_then(parse_number);

        Ok(QuoteFields {
            price: field(&quote.price),
            change: field(&quote.change),
            change_percent: field(&quote.change_percent),
            open: field(&quote.open),
            high: field(&quote.high),
            low: field(&quote.low),
            previous_close: field(&quote.previous_close),
            volume: quote.volume.as_deref().and_then(|v| v.trim().parse().ok()),
            bid: None,
            ask: None,
            market_cap: None,
            currency: None,
        })
    }

    /// Forex and crypto quotes use the exchange-rate endpoint with the pair
    /// split into from/to currencies.
    async fn fetch_exchange_rate(
        &self,
        request: &QuoteRequest,
    ) -> Result<QuoteFields, ProviderError> {
        let pair = request
            .security
            .encode(ProviderId::Alphavantage)
            .map_err(|e| ProviderError::unsupported(ProviderId::Alphavantage, e.to_string()))?;

        let (from, to) = if request.security.asset_class() == AssetClass::Forex {
            let (from, to) = pair.split_at(3);
            (from.to_owned(), to.to_owned())
        } else {
            (pair, String::from("USD"))
        };

        let body = self
            .get(
                HttpRequest::get(BASE_URL)
                    .with_query("function", "CURRENCY_EXCHANGE_RATE")
                    .with_query("from_currency", &from)
                    .with_query("to_currency", &to),
            )
            .await?;

        let parsed: ExchangeRateEnvelope = serde_json::from_str(&body).map_err(decode_error)?;
        let rate = parsed.rate.ok_or_else(|| {
            ProviderError::invalid_request(
                ProviderId::Alphavantage,
                format!("no exchange rate for {from}/{to}"),
            )
        })?;

        Ok(QuoteFields {
            price: rate.exchange_rate.as_deref().and_then(parse_number),
            bid: rate.bid_price.as_deref().and_then(parse_number),
            ask: rate.ask_price.as_deref().and_then(parse_number),
            currency: Some(to),
            ..QuoteFields::default()
        })
    }
}

// Alpha Vantage wire formats. Everything arrives as strings.

#[derive(Debug, Default, Deserialize)]
struct ApiNotice {
    #[serde(rename = "Note")]
    note: Option<String>,
    #[serde(rename = "Information")]
    information: Option<String>,
    #[serde(rename = "Error Message")]
    error_message: Option<String>,
}

#[derive(Debug, Deserialize)]
struct GlobalQuoteEnvelope {
    #[serde(rename = "Global Quote")]
    global_quote: Option<GlobalQuoteRow>,
}

#[derive(Debug, Deserialize)]
struct GlobalQuoteRow {
    #[serde(rename = "02. open")]
    open: Option<String>,
    #[serde(rename = "03. high")]
    high: Option<String>,
    #[serde(rename = "04. low")]
    low: Option<String>,
    #[serde(rename = "05. price")]
    price: Option<String>,
    #[serde(rename = "06. volume")]
    volume: Option<String>,
    #[serde(rename = "08. previous close")]
    previous_close: Option<String>,
    #[serde(rename = "09. change")]
    change: Option<String>,
    #[serde(rename = "10. change percent")]
    change_percent: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ExchangeRateEnvelope {
    #[serde(rename = "Realtime Currency Exchange Rate")]
    rate: Option<ExchangeRateRow>,
}

#[derive(Debug, Deserialize)]
struct ExchangeRateRow {
    #[serde(rename = "5. Exchange Rate")]
    exchange_rate: Option<String>,
    #[serde(rename = "8. Bid Price")]
    bid_price: Option<String>,
    #[serde(rename = "9. Ask Price")]
    ask_price: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
struct SeriesRow {
    #[serde(rename = "1. open")]
    open: String,
    #[serde(rename = "2. high")]
    high: String,
    #[serde(rename = "3. low")]
    low: String,
    #[serde(rename = "4. close")]
    close: String,
    #[serde(rename = "5. volume")]
    volume: Option<String>,
}

#[derive(Debug, Deserialize)]
struct OverviewRow {
    #[serde(rename = "Name")]
    name: Option<String>,
    #[serde(rename = "Sector")]
    sector: Option<String>,
    #[serde(rename = "Industry")]
    industry: Option<String>,
    #[serde(rename = "MarketCapitalization")]
    market_capitalization: Option<String>,
    #[serde(rename = "PERatio")]
    pe_ratio: Option<String>,
    #[serde(rename = "EPS")]
    eps: Option<String>,
    #[serde(rename = "DividendYield")]
    dividend_yield: Option<String>,
    #[serde(rename = "Beta")]
    beta: Option<String>,
    #[serde(rename = "52WeekHigh")]
    week52_high: Option<String>,
    #[serde(rename = "52WeekLow")]
    week52_low: Option<String>,
    #[serde(rename = "Description")]
    description: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::testing::ScriptedHttpClient;
    use crate::data_source::ProviderErrorKind;
    use crate::{Range, SecurityIdentifier};

    fn security(raw: &str) -> SecurityIdentifier {
        SecurityIdentifier::parse(raw).expect("valid symbol")
    }

    fn adapter_with(client: &ScriptedHttpClient) -> AlphavantageAdapter {
        AlphavantageAdapter::new(client.clone_arc(), Some(String::from("demo")))
    }

    #[tokio::test]
    async fn global_quote_parses_string_numbers() {
        let client = ScriptedHttpClient::new();
        client.push_json(r#"{"Global Quote":{
            "02. open":"188.00","03. high":"190.10","04. low":"187.40",
            "05. price":"189.50","06. volume":"54000000",
            "08. previous close":"188.25","09. change":"1.25",
            "10. change percent":"0.6640%"
        }}"#);
        let adapter = adapter_with(&client);

        let fields = adapter
            .fetch_quote(&QuoteRequest {
                security: security("AAPL"),
            })
            .await
            .expect("quote should parse");

        assert_eq!(fields.price, Some(189.5));
        assert_eq!(fields.change_percent, Some(0.664));
        assert_eq!(fields.volume, Some(54_000_000));
    }

    #[tokio::test]
    async fn throttle_note_maps_to_rate_limited() {
        let client = ScriptedHttpClient::new();
        client.push_json(
            r#"{"Note":"Thank you for using Alpha Vantage! Our standard API rate limit is 25 requests per day."}"#,
        );
        let adapter = adapter_with(&client);

        let err = adapter
            .fetch_quote(&QuoteRequest {
                security: security("AAPL"),
            })
            .await
            .expect_err("must fail");

        assert_eq!(err.kind, ProviderErrorKind::RateLimited);
    }

    #[tokio::test]
    async fn forex_quote_uses_exchange_rate_endpoint() {
        let client = ScriptedHttpClient::new();
        client.push_json(r#"{"Realtime Currency Exchange Rate":{
            "5. Exchange Rate":"1.0850","8. Bid Price":"1.0849","9. Ask Price":"1.0851"
        }}"#);
        let adapter = adapter_with(&client);

        let fields = adapter
            .fetch_quote(&QuoteRequest {
                security: security("EURUSD=X"),
            })
            .await
            .expect("quote should parse");

        assert_eq!(fields.price, Some(1.085));
        assert_eq!(fields.currency.as_deref(), Some("USD"));

        let url = client.request_urls().remove(0);
        assert!(url.contains("from_currency=EUR"), "url: {url}");
        assert!(url.contains("to_currency=USD"), "url: {url}");
    }

    #[tokio::test]
    async fn daily_series_is_chronological_and_filtered_by_range() {
        let client = ScriptedHttpClient::new();
        client.push_json(r#"{"Time Series (Daily)":{
            "2024-01-03":{"1. open":"102.0","2. high":"103.0","3. low":"101.0","4. close":"102.5","5. volume":"1200"},
            "2024-01-02":{"1. open":"100.0","2. high":"101.0","3. low":"99.0","4. close":"100.5","5. volume":"1000"}
        }}"#);
        let adapter = adapter_with(&client);

        let series = adapter
            .fetch_series(&SeriesRequest {
                security: security("AAPL"),
                interval: Interval::OneDay,
                range: Range::Max,
            })
            .await
            .expect("series should parse");

        assert_eq!(series.closes(), vec![100.5, 102.5]);
    }

    #[tokio::test]
    async fn intraday_interval_is_unsupported() {
        let client = ScriptedHttpClient::new();
        let adapter = adapter_with(&client);

        let err = adapter
            .fetch_series(&SeriesRequest {
                security: security("AAPL"),
                interval: Interval::FiveMinutes,
                range: Range::OneDay,
            })
            .await
            .expect_err("must fail");

        assert_eq!(err.kind, ProviderErrorKind::Unsupported);
        assert_eq!(client.request_count(), 0);
    }
}
