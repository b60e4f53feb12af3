//! Market-data fetch adapter
//!
//! Pulls daily history from Yahoo Finance by default, or from an HTTP price
//! service when one is configured, and normalises the answer to
//! `{symbol, prices, company_meta}`. Transport failures are retried with
//! exponential backoff; everything else is reported once.

use crate::config::{Config, DataProvider};
use crate::error::ResearchError;
use crate::models::{PriceBar, ToolFailure, ToolInput, ToolResult};
use crate::tools::Tool;
use crate::Result;
use chrono::{DateTime, Datelike, Days, Months, NaiveDate, Utc};
use reqwest::{Client, StatusCode};
use serde::Deserialize;
use serde_json::{json, Map, Value};
use std::time::Duration;
use time::OffsetDateTime;
use tracing::{debug, warn};
use yahoo_finance_api as yahoo;

#[derive(Debug, Default, Deserialize)]
struct PriceResponse {
    #[serde(default)]
    prices: Vec<PriceBar>,
    #[serde(default)]
    company_meta: Map<String, Value>,
}

/// Inclusive calendar window of a fetch
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct Window {
    start: NaiveDate,
    end: NaiveDate,
}

/// =============================
/// Yahoo Finance
/// =============================

struct YahooSource {
    timeout: Duration,
}

impl YahooSource {
    async fn fetch_prices(
        &self,
        symbol: &str,
        window: Window,
    ) -> std::result::Result<PriceResponse, ToolFailure> {
        let provider = yahoo::YahooConnector::new().map_err(|e| {
            ToolFailure::DataSourceUnavailable(format!("yahoo finance client: {}", e))
        })?;

        let start = to_offset(window.start)?;
        // Yahoo treats the end bound as exclusive
        let end = to_offset(window.end + Days::new(1))?;

        let response = tokio::time::timeout(
            self.timeout,
            provider.get_quote_history(symbol, start, end),
        )
        .await
        .map_err(|_| {
            ToolFailure::DataSourceUnavailable(format!("request for {} timed out", symbol))
        })?
        .map_err(|e| yahoo_failure(symbol, e))?;

        let quotes = response.quotes().map_err(|e| yahoo_failure(symbol, e))?;

        let prices = quotes
            .iter()
            .filter_map(|q| {
                let date = DateTime::from_timestamp(q.timestamp as i64, 0)?.date_naive();
                Some(PriceBar {
                    date,
                    open: q.open,
                    high: q.high,
                    low: q.low,
                    close: q.close,
                    volume: q.volume,
                })
            })
            .collect();

        let mut company_meta = Map::new();
        company_meta.insert("symbol".to_string(), json!(symbol));
        company_meta.insert("source".to_string(), json!("yahoo_finance"));

        Ok(PriceResponse {
            prices,
            company_meta,
        })
    }
}

fn to_offset(date: NaiveDate) -> std::result::Result<OffsetDateTime, ToolFailure> {
    let timestamp = date
        .and_hms_opt(0, 0, 0)
        .map(|dt| dt.and_utc().timestamp())
        .ok_or_else(|| ToolFailure::InvalidInput(format!("invalid date: {}", date)))?;

    OffsetDateTime::from_unix_timestamp(timestamp)
        .map_err(|e| ToolFailure::InvalidInput(format!("invalid date {}: {}", date, e)))
}

fn yahoo_failure(symbol: &str, error: yahoo::YahooError) -> ToolFailure {
    match error {
        yahoo::YahooError::NoQuotes
        | yahoo::YahooError::NoResult => ToolFailure::SymbolNotFound(symbol.to_string()),
        yahoo::YahooError::FetchFailed(status) if status.contains("404") => {
            ToolFailure::SymbolNotFound(symbol.to_string())
        }
        other => ToolFailure::DataSourceUnavailable(format!(
            "yahoo finance request for {} failed: {}",
            symbol, other
        )),
    }
}

/// =============================
/// HTTP price service
/// =============================

struct HttpSource {
    client: Client,
    base_url: String,
    api_key: Option<String>,
}

impl HttpSource {
    fn from_config(config: &Config) -> Result<Self> {
        let base_url = config.market_data_base_url.clone().ok_or_else(|| {
            ResearchError::Configuration("MARKET_DATA_BASE_URL is not configured".to_string())
        })?;

        let client = Client::builder()
            .pool_idle_timeout(Duration::from_secs(60))
            .pool_max_idle_per_host(4)
            .timeout(config.request_timeout)
            .build()?;

        Ok(Self {
            client,
            base_url,
            api_key: config.market_data_api_key.clone(),
        })
    }

    async fn fetch_prices(
        &self,
        symbol: &str,
        query: &[(&str, String)],
    ) -> std::result::Result<PriceResponse, ToolFailure> {
        let url = format!("{}/prices", self.base_url);

        let mut request = self.client.get(&url).query(query);
        if let Some(key) = &self.api_key {
            request = request.bearer_auth(key);
        }

        let response = request.send().await.map_err(|e| {
            ToolFailure::DataSourceUnavailable(format!("request for {} failed: {}", symbol, e))
        })?;

        let status = response.status();
        if status == StatusCode::NOT_FOUND {
            return Err(ToolFailure::SymbolNotFound(symbol.to_string()));
        }
        if status.is_server_error() {
            return Err(ToolFailure::DataSourceUnavailable(format!(
                "market data service returned {}",
                status
            )));
        }
        if !status.is_success() {
            return Err(ToolFailure::Failed(format!(
                "market data service returned {} for {}",
                status, symbol
            )));
        }

        response
            .json::<PriceResponse>()
            .await
            .map_err(|e| ToolFailure::Failed(format!("invalid price payload: {}", e)))
    }
}

enum PriceSource {
    Yahoo(YahooSource),
    Http(HttpSource),
}

impl PriceSource {
    fn name(&self) -> &str {
        match self {
            Self::Yahoo(_) => "yahoo_finance",
            Self::Http(source) => &source.base_url,
        }
    }
}

/// Data-fetch tool: `{symbol, period?, start?, end?}` → `{symbol, prices, company_meta}`
pub struct StockAggregatorTool {
    source: PriceSource,
    max_retries: u32,
    config: Config,
}

impl StockAggregatorTool {
    pub fn from_config(config: &Config) -> Result<Self> {
        let source = match config.market_data_provider {
            DataProvider::Yahoo => PriceSource::Yahoo(YahooSource {
                timeout: config.request_timeout,
            }),
            DataProvider::Http => PriceSource::Http(HttpSource::from_config(config)?),
        };

        Ok(Self {
            source,
            max_retries: config.max_retries,
            config: config.clone(),
        })
    }

    async fn fetch_once(
        &self,
        symbol: &str,
        period: &str,
        input: &ToolInput,
        window: Window,
    ) -> std::result::Result<PriceResponse, ToolFailure> {
        match &self.source {
            PriceSource::Yahoo(source) => source.fetch_prices(symbol, window).await,
            PriceSource::Http(source) => {
                let mut query = vec![
                    ("symbol", symbol.to_string()),
                    ("period", period.to_string()),
                ];
                for key in ["start", "end"] {
                    if let Some(value) = input.get(key).and_then(Value::as_str) {
                        query.push((key, value.to_string()));
                    }
                }
                source.fetch_prices(symbol, &query).await
            }
        }
    }

    async fn fetch(&self, input: &ToolInput) -> std::result::Result<(Value, u32), ToolFailure> {
        let symbol = input.require_str("symbol")?.to_uppercase();
        let period = input.str_or("period", &self.config.default_period).to_string();
        let window = resolve_window(input, &period, Utc::now().date_naive())?;

        let mut attempt = 0;
        let response = loop {
            match self.fetch_once(&symbol, &period, input, window).await {
                Err(ToolFailure::DataSourceUnavailable(reason)) if attempt < self.max_retries => {
                    let backoff = self.config.retry_backoff(attempt);
                    warn!(%symbol, attempt, ?backoff, %reason, "Market data unavailable, retrying");
                    tokio::time::sleep(backoff).await;
                    attempt += 1;
                }
                other => break other?,
            }
        };

        if response.prices.is_empty() {
            return Err(ToolFailure::SymbolNotFound(symbol));
        }

        debug!(%symbol, bars = response.prices.len(), source = self.source.name(), "Fetched price history");

        Ok((
            json!({
                "symbol": symbol,
                "prices": response.prices,
                "company_meta": response.company_meta,
            }),
            attempt + 1,
        ))
    }
}

/// Explicit `start`/`end` win over `period`
fn resolve_window(
    input: &ToolInput,
    period: &str,
    today: NaiveDate,
) -> std::result::Result<Window, ToolFailure> {
    let date = |key: &str| -> std::result::Result<Option<NaiveDate>, ToolFailure> {
        input
            .get(key)
            .and_then(Value::as_str)
            .map(|raw| {
                NaiveDate::parse_from_str(raw, "%Y-%m-%d").map_err(|_| {
                    ToolFailure::InvalidInput(format!("{} is not a YYYY-MM-DD date: {}", key, raw))
                })
            })
            .transpose()
    };

    if let (Some(start), Some(end)) = (date("start")?, date("end")?) {
        return Ok(Window {
            start: start.min(end),
            end: start.max(end),
        });
    }

    let start = period_start(period, today)
        .ok_or_else(|| ToolFailure::InvalidInput(format!("unsupported period: {}", period)))?;
    Ok(Window { start, end: today })
}

/// First day covered by a lookback token such as `5d`, `3wk`, `6mo`, `2y`,
/// `ytd` or `max`
fn period_start(period: &str, today: NaiveDate) -> Option<NaiveDate> {
    match period {
        "ytd" => return NaiveDate::from_ymd_opt(today.year(), 1, 1),
        "max" => return NaiveDate::from_ymd_opt(1970, 1, 1),
        _ => {}
    }

    let split = period.find(|c: char| !c.is_ascii_digit())?;
    let count: u32 = period[..split].parse().ok()?;
    match &period[split..] {
        "d" => today.checked_sub_days(Days::new(count.into())),
        "wk" => today.checked_sub_days(Days::new(u64::from(count) * 7)),
        "mo" => today.checked_sub_months(Months::new(count)),
        "y" => today.checked_sub_months(Months::new(count.checked_mul(12)?)),
        _ => None,
    }
}

#[async_trait::async_trait]
impl Tool for StockAggregatorTool {
    fn description(&self) -> &'static str {
        "Fetch daily OHLCV history and company metadata for a symbol"
    }

    async fn execute(&self, input: &ToolInput) -> ToolResult {
        match self.fetch(input).await {
            Ok((data, attempts)) => ToolResult::success(data)
                .with_metadata("source", self.source.name())
                .with_metadata("period", input.str_or("period", &self.config.default_period))
                .with_metadata("attempts", attempts),
            Err(failure) => ToolResult::failure(failure),
        }
    }
}
