//! Yahoo Finance price provider.
//!
//! Reads daily bars and the live quote from Yahoo's v8 chart API. Retries with
//! exponential backoff live here, inside the collaborator; the engine never
//! retries a failed lookup.
//!
//! Yahoo Finance has no official API and is subject to unannounced format changes.

use super::provider::{PriceError, PriceProvider, PriceQuote};
use crate::domain::PriceBasis;
use chrono::NaiveDate;
use rust_decimal::Decimal;
use serde::Deserialize;
use std::time::Duration;
use tracing::{debug, warn};

const CHART_BASE_URL: &str = "https://query2.finance.yahoo.com/v8/finance/chart";
const USER_AGENT: &str = "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36";
const PRICE_DECIMALS: u32 = 4;

/// Yahoo Finance v8 chart API response.
#[derive(Debug, Deserialize)]
struct ChartResponse {
    chart: ChartResult,
}

#[derive(Debug, Deserialize)]
struct ChartResult {
    result: Option<Vec<ChartData>>,
    error: Option<ChartError>,
}

#[derive(Debug, Deserialize)]
struct ChartError {
    code: String,
    description: String,
}

#[derive(Debug, Deserialize)]
struct ChartData {
    meta: Option<ChartMeta>,
    timestamp: Option<Vec<i64>>,
    indicators: Indicators,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ChartMeta {
    regular_market_price: Option<f64>,
    regular_market_time: Option<i64>,
}

#[derive(Debug, Deserialize)]
struct Indicators {
    quote: Vec<QuoteData>,
}

#[derive(Debug, Deserialize)]
struct QuoteData {
    open: Vec<Option<f64>>,
    close: Vec<Option<f64>>,
}

/// One parsed daily bar.
#[derive(Debug, Clone, Copy, PartialEq)]
struct DailyBar {
    date: NaiveDate,
    open: Option<f64>,
    close: Option<f64>,
}

/// Connection settings for the Yahoo provider.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct YahooConfig {
    pub timeout_secs: u64,
    pub max_retries: u32,
    /// How far back a close lookup may fall back when the exact session has no bar.
    pub lookback_days: u32,
}

impl Default for YahooConfig {
    fn default() -> Self {
        Self {
            timeout_secs: 30,
            max_retries: 3,
            lookback_days: 7,
        }
    }
}

pub struct YahooProvider {
    client: reqwest::blocking::Client,
    config: YahooConfig,
    base_delay: Duration,
}

impl YahooProvider {
    pub fn new(config: YahooConfig) -> Result<Self, PriceError> {
        let client = reqwest::blocking::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .user_agent(USER_AGENT)
            .build()
            .map_err(|e| PriceError::Other(format!("failed to build HTTP client: {e}")))?;

        Ok(Self {
            client,
            config,
            base_delay: Duration::from_millis(500),
        })
    }

    fn history_url(symbol: &str, start: NaiveDate, end: NaiveDate) -> String {
        let start_ts = start
            .and_hms_opt(0, 0, 0)
            .map(|t| t.and_utc().timestamp())
            .unwrap_or_default();
        let end_ts = end
            .and_hms_opt(23, 59, 59)
            .map(|t| t.and_utc().timestamp())
            .unwrap_or_default();
        format!("{CHART_BASE_URL}/{symbol}?period1={start_ts}&period2={end_ts}&interval=1d")
    }

    fn live_url(symbol: &str) -> String {
        format!("{CHART_BASE_URL}/{symbol}?range=1d&interval=1d")
    }

    fn first_result(symbol: &str, resp: ChartResponse) -> Result<ChartData, PriceError> {
        let result = resp.chart.result.ok_or_else(|| match resp.chart.error {
            Some(err) if err.code == "Not Found" => PriceError::SymbolNotFound {
                symbol: symbol.to_string(),
            },
            Some(err) => {
                PriceError::ResponseFormatChanged(format!("{}: {}", err.code, err.description))
            }
            None => PriceError::ResponseFormatChanged("empty result with no error".into()),
        })?;

        result
            .into_iter()
            .next()
            .ok_or_else(|| PriceError::ResponseFormatChanged("result array is empty".into()))
    }

    fn parse_bars(data: ChartData) -> Result<Vec<DailyBar>, PriceError> {
        let timestamps = data.timestamp.unwrap_or_default();
        let quote = data
            .indicators
            .quote
            .into_iter()
            .next()
            .ok_or_else(|| PriceError::ResponseFormatChanged("no quote data".into()))?;

        let mut bars = Vec::with_capacity(timestamps.len());
        for (i, &ts) in timestamps.iter().enumerate() {
            let date = chrono::DateTime::from_timestamp(ts, 0)
                .map(|dt| dt.naive_utc().date())
                .ok_or_else(|| {
                    PriceError::ResponseFormatChanged(format!("invalid timestamp: {ts}"))
                })?;
            let open = quote.open.get(i).copied().flatten();
            let close = quote.close.get(i).copied().flatten();
            // Holidays come back as all-null rows
            if open.is_none() && close.is_none() {
                continue;
            }
            bars.push(DailyBar { date, open, close });
        }
        Ok(bars)
    }

    /// Pick the bar for a session date. Opens must match the date exactly;
    /// closes fall back to the latest earlier bar.
    fn select(
        symbol: &str,
        bars: &[DailyBar],
        date: NaiveDate,
        basis: PriceBasis,
    ) -> Result<(f64, NaiveDate), PriceError> {
        let missing = || PriceError::NoPriceForDate {
            symbol: symbol.to_string(),
            date,
            basis,
        };

        match basis {
            PriceBasis::TodayOpen => bars
                .iter()
                .find(|b| b.date == date)
                .and_then(|b| b.open.map(|p| (p, b.date)))
                .ok_or_else(missing),
            _ => bars
                .iter()
                .filter(|b| b.date <= date)
                .filter_map(|b| b.close.map(|p| (p, b.date)))
                .max_by_key(|&(_, d)| d)
                .ok_or_else(missing),
        }
    }

    fn to_decimal(symbol: &str, value: f64) -> Result<Decimal, PriceError> {
        Decimal::try_from(value)
            .map(|d| d.round_dp(PRICE_DECIMALS))
            .map_err(|_| {
                PriceError::ResponseFormatChanged(format!("unrepresentable price {value} for {symbol}"))
            })
    }

    /// Execute a request with retry and backoff.
    fn fetch_chart(&self, symbol: &str, url: &str) -> Result<ChartData, PriceError> {
        let mut last_error = None;

        for attempt in 0..=self.config.max_retries {
            if attempt > 0 {
                let delay = self.base_delay * 2u32.pow(attempt - 1);
                debug!(symbol, attempt, ?delay, "retrying quote request");
                std::thread::sleep(delay);
            }

            match self.client.get(url).send() {
                Ok(resp) => {
                    let status = resp.status();

                    if status == reqwest::StatusCode::TOO_MANY_REQUESTS {
                        let retry_after = resp
                            .headers()
                            .get("retry-after")
                            .and_then(|v| v.to_str().ok())
                            .and_then(|v| v.parse::<u64>().ok())
                            .unwrap_or(60);
                        last_error = Some(PriceError::RateLimited {
                            retry_after_secs: retry_after,
                        });
                        continue;
                    }

                    if status == reqwest::StatusCode::NOT_FOUND {
                        return Err(PriceError::SymbolNotFound {
                            symbol: symbol.to_string(),
                        });
                    }

                    if !status.is_success() {
                        last_error = Some(PriceError::Other(format!("HTTP {status} for {symbol}")));
                        continue;
                    }

                    let chart: ChartResponse = resp.json().map_err(|e| {
                        PriceError::ResponseFormatChanged(format!(
                            "failed to parse response for {symbol}: {e}"
                        ))
                    })?;
                    return Self::first_result(symbol, chart);
                }
                Err(e) => {
                    if e.is_connect() || e.is_timeout() {
                        last_error = Some(PriceError::NetworkUnreachable(e.to_string()));
                        continue;
                    }
                    return Err(PriceError::NetworkUnreachable(e.to_string()));
                }
            }
        }

        let err = last_error.unwrap_or_else(|| PriceError::Other("max retries exceeded".into()));
        warn!(symbol, error = %err, "quote request failed");
        Err(err)
    }
}

impl PriceProvider for YahooProvider {
    fn name(&self) -> &str {
        "yahoo_finance"
    }

    fn get_price(
        &self,
        ticker: &str,
        date: NaiveDate,
        basis: PriceBasis,
    ) -> Result<PriceQuote, PriceError> {
        let start = date - chrono::Duration::days(i64::from(self.config.lookback_days));
        let data = self.fetch_chart(ticker, &Self::history_url(ticker, start, date))?;
        let bars = Self::parse_bars(data)?;
        let (value, bar_date) = Self::select(ticker, &bars, date, basis)?;
        Ok(PriceQuote {
            price: Self::to_decimal(ticker, value)?,
            date: bar_date,
            basis,
        })
    }

    fn get_current_price(&self, ticker: &str) -> Result<PriceQuote, PriceError> {
        let data = self.fetch_chart(ticker, &Self::live_url(ticker))?;
        let meta = data
            .meta
            .ok_or_else(|| PriceError::ResponseFormatChanged("no meta block".into()))?;
        let value = meta
            .regular_market_price
            .ok_or_else(|| PriceError::SymbolNotFound {
                symbol: ticker.to_string(),
            })?;
        let date = meta
            .regular_market_time
            .and_then(|ts| chrono::DateTime::from_timestamp(ts, 0))
            .map(|dt| dt.naive_utc().date())
            .unwrap_or_else(|| chrono::Utc::now().date_naive());
        Ok(PriceQuote {
            price: Self::to_decimal(ticker, value)?,
            date,
            basis: PriceBasis::Live,
        })
    }
}
