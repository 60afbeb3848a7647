//! Application configuration, loaded from TOML.
//!
//! Every path and collaborator setting the commands need lives here and is
//! handed to components at construction. Nothing below the CLI reads the
//! process environment.

use chrono::{NaiveDate, NaiveTime};
use scanlab_core::data::YahooConfig;
use scanlab_core::session::UsEquityCalendar;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use thiserror::Error;

const TIME_FORMAT: &str = "%H:%M";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("invalid config: {0}")]
    Invalid(String),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    /// Holds `signatures.json` and the `runs/` archive.
    pub data_dir: PathBuf,
    /// Brokerage cost-basis export (CSV). Optional.
    pub positions_file: Option<PathBuf>,
    pub scanner: ScannerConfig,
    pub market: MarketConfig,
    pub prices: PricesConfig,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ScannerConfig {
    /// Working directory of the external scanner.
    pub dir: PathBuf,
    pub program: String,
    pub args: Vec<String>,
    /// Flag that precedes the tickers-file path.
    pub tickers_flag: String,
    pub timeout_secs: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MarketConfig {
    /// Session open, exchange-local `HH:MM`.
    pub open: String,
    /// Session close, exchange-local `HH:MM`.
    pub close: String,
    pub holidays: Vec<NaiveDate>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PricesConfig {
    pub timeout_secs: u64,
    pub max_retries: u32,
    pub lookback_days: u32,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            data_dir: PathBuf::from("data"),
            positions_file: None,
            scanner: ScannerConfig::default(),
            market: MarketConfig::default(),
            prices: PricesConfig::default(),
        }
    }
}

impl Default for ScannerConfig {
    fn default() -> Self {
        Self {
            dir: PathBuf::from("../market-psar-scanner"),
            program: "python3".into(),
            args: vec![
                "main.py".into(),
                "-mystocks".into(),
                "--no-email".into(),
                "--quiet".into(),
            ],
            tickers_flag: "--tickers-file".into(),
            timeout_secs: 300,
        }
    }
}

impl Default for MarketConfig {
    fn default() -> Self {
        Self {
            open: "09:30".into(),
            close: "16:00".into(),
            holidays: Vec::new(),
        }
    }
}

impl Default for PricesConfig {
    fn default() -> Self {
        let yahoo = YahooConfig::default();
        Self {
            timeout_secs: yahoo.timeout_secs,
            max_retries: yahoo.max_retries,
            lookback_days: yahoo.lookback_days,
        }
    }
}

impl AppConfig {
    /// Load and validate a TOML file.
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_toml(&content)
    }

    /// Parse and validate a TOML string. Missing keys take defaults.
    pub fn from_toml(content: &str) -> Result<Self, ConfigError> {
        let config: Self = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        let (open, close) = self.market.hours()?;
        if open >= close {
            return Err(ConfigError::Invalid(format!(
                "market open {open} must be before close {close}"
            )));
        }
        if self.scanner.timeout_secs == 0 {
            return Err(ConfigError::Invalid("scanner.timeout_secs must be > 0".into()));
        }
        if self.scanner.program.trim().is_empty() {
            return Err(ConfigError::Invalid("scanner.program is empty".into()));
        }
        if self.prices.timeout_secs == 0 {
            return Err(ConfigError::Invalid("prices.timeout_secs must be > 0".into()));
        }
        Ok(())
    }

    pub fn signatures_file(&self) -> PathBuf {
        self.data_dir.join("signatures.json")
    }

    pub fn runs_dir(&self) -> PathBuf {
        self.data_dir.join("runs")
    }

    pub fn calendar(&self) -> Result<UsEquityCalendar, ConfigError> {
        let (open, close) = self.market.hours()?;
        Ok(UsEquityCalendar::new(open, close).with_holidays(self.market.holidays.iter().copied()))
    }

    pub fn yahoo_config(&self) -> YahooConfig {
        YahooConfig {
            timeout_secs: self.prices.timeout_secs,
            max_retries: self.prices.max_retries,
            lookback_days: self.prices.lookback_days,
        }
    }
}

impl MarketConfig {
    pub fn hours(&self) -> Result<(NaiveTime, NaiveTime), ConfigError> {
        Ok((parse_time("market.open", &self.open)?, parse_time("market.close", &self.close)?))
    }
}

fn parse_time(field: &str, raw: &str) -> Result<NaiveTime, ConfigError> {
    NaiveTime::parse_from_str(raw.trim(), TIME_FORMAT)
        .map_err(|e| ConfigError::Invalid(format!("{field} '{raw}' is not HH:MM: {e}")))
}
