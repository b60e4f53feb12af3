//! Runtime configuration
//!
//! Values come from the environment (a `.env` file is honoured by the
//! binaries). Every key has a default so a bare checkout still starts.

use crate::error::ResearchError;
use crate::Result;
use std::env;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

/// Upper bound for `MARKET_DATA_MAX_RETRIES`
pub const MAX_RETRIES_LIMIT: u32 = 10;

/// Where `stock_aggregator` gets its price history
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DataProvider {
    /// Yahoo Finance chart API
    Yahoo,
    /// A price service at `MARKET_DATA_BASE_URL` answering `GET /prices`
    Http,
}

impl FromStr for DataProvider {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "yahoo" => Ok(Self::Yahoo),
            "http" => Ok(Self::Http),
            other => Err(format!("unknown data provider: {}", other)),
        }
    }
}

#[derive(Debug, Clone)]
pub struct Config {
    pub market_data_provider: DataProvider,
    /// Base URL of the HTTP price service, required by `DataProvider::Http`
    pub market_data_base_url: Option<String>,
    pub market_data_api_key: Option<String>,
    pub request_timeout: Duration,
    pub max_retries: u32,
    pub retry_backoff_base: Duration,

    pub output_dir: PathBuf,

    pub default_period: String,
    pub backtest_period: String,
    pub backtest_initial_capital: f64,
    pub backtest_commission_rate: f64,

    pub max_recent_symbols: usize,
    pub api_port: u16,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            market_data_provider: DataProvider::Yahoo,
            market_data_base_url: None,
            market_data_api_key: None,
            request_timeout: Duration::from_secs(30),
            max_retries: 2,
            retry_backoff_base: Duration::from_millis(500),
            output_dir: PathBuf::from("."),
            default_period: "1y".to_string(),
            backtest_period: "2y".to_string(),
            backtest_initial_capital: 10_000.0,
            backtest_commission_rate: 0.001,
            max_recent_symbols: 50,
            api_port: 8080,
        }
    }
}

impl Config {
    /// Load from process environment on top of the defaults
    pub fn from_env() -> Result<Self> {
        let defaults = Self::default();

        let market_data_base_url = non_empty_var("MARKET_DATA_BASE_URL")
            .map(|url| url.trim_end_matches('/').to_string());

        // A configured base URL selects the HTTP service unless a provider is named
        let market_data_provider = match parse_var("MARKET_DATA_PROVIDER")? {
            Some(provider) => provider,
            None if market_data_base_url.is_some() => DataProvider::Http,
            None => defaults.market_data_provider,
        };

        let config = Self {
            market_data_provider,
            market_data_base_url,
            market_data_api_key: non_empty_var("MARKET_DATA_API_KEY"),
            request_timeout: parse_var("MARKET_DATA_TIMEOUT_SECS")?
                .map(Duration::from_secs)
                .unwrap_or(defaults.request_timeout),
            max_retries: parse_var("MARKET_DATA_MAX_RETRIES")?.unwrap_or(defaults.max_retries),
            retry_backoff_base: defaults.retry_backoff_base,
            output_dir: non_empty_var("RESEARCH_OUTPUT_DIR")
                .map(PathBuf::from)
                .unwrap_or(defaults.output_dir),
            default_period: non_empty_var("DEFAULT_ANALYSIS_PERIOD")
                .unwrap_or(defaults.default_period),
            backtest_period: non_empty_var("BACKTEST_PERIOD").unwrap_or(defaults.backtest_period),
            backtest_initial_capital: parse_var("BACKTEST_INITIAL_CAPITAL")?
                .unwrap_or(defaults.backtest_initial_capital),
            backtest_commission_rate: parse_var("BACKTEST_COMMISSION_RATE")?
                .unwrap_or(defaults.backtest_commission_rate),
            max_recent_symbols: parse_var("MAX_RECENT_SYMBOLS")?
                .unwrap_or(defaults.max_recent_symbols),
            api_port: match parse_var("PORT")? {
                Some(port) => port,
                None => parse_var("API_PORT")?.unwrap_or(defaults.api_port),
            },
        };

        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if self.market_data_provider == DataProvider::Http && self.market_data_base_url.is_none() {
            return Err(ResearchError::Configuration(
                "MARKET_DATA_PROVIDER=http requires MARKET_DATA_BASE_URL".to_string(),
            ));
        }
        if self.max_retries > MAX_RETRIES_LIMIT {
            return Err(ResearchError::Configuration(format!(
                "MARKET_DATA_MAX_RETRIES must be at most {}",
                MAX_RETRIES_LIMIT
            )));
        }
        if self.backtest_initial_capital <= 0.0 {
            return Err(ResearchError::Configuration(
                "BACKTEST_INITIAL_CAPITAL must be positive".to_string(),
            ));
        }
        if self.backtest_commission_rate < 0.0 {
            return Err(ResearchError::Configuration(
                "BACKTEST_COMMISSION_RATE must not be negative".to_string(),
            ));
        }
        if self.max_recent_symbols == 0 {
            return Err(ResearchError::Configuration(
                "MAX_RECENT_SYMBOLS must be greater than 0".to_string(),
            ));
        }
        Ok(())
    }

    pub fn charts_dir(&self) -> PathBuf {
        self.output_dir.join("charts")
    }

    pub fn reports_dir(&self) -> PathBuf {
        self.output_dir.join("reports")
    }

    pub fn presentations_dir(&self) -> PathBuf {
        self.output_dir.join("presentations")
    }

    /// Backoff before retry `attempt` (0-based)
    pub fn retry_backoff(&self, attempt: u32) -> Duration {
        self.retry_backoff_base
            .saturating_mul(2_u32.saturating_pow(attempt))
    }
}

fn non_empty_var(key: &str) -> Option<String> {
    env::var(key).ok().filter(|v| !v.trim().is_empty())
}

fn parse_var<T: FromStr>(key: &str) -> Result<Option<T>> {
    match non_empty_var(key) {
        Some(raw) => raw.trim().parse::<T>().map(Some).map_err(|_| {
            ResearchError::Configuration(format!("{} has an invalid value: {}", key, raw))
        }),
        None => Ok(None),
    }
}
