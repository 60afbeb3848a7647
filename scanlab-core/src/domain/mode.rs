//! Scan modes and scanner output sections.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// Scanner output section a ticker was listed under.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Section {
    StrongBuy,
    EarlyBuy,
    Dividend,
    Sell,
}

impl Section {
    pub fn label(&self) -> &'static str {
        match self {
            Section::StrongBuy => "strong_buy",
            Section::EarlyBuy => "early_buy",
            Section::Dividend => "dividend",
            Section::Sell => "sell",
        }
    }
}

impl fmt::Display for Section {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// Tracking mode. Part of a signature's identity: the same scan under two
/// modes yields two signatures.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ScanMode {
    Strong,
    Early,
    All,
    Dividend,
}

impl ScanMode {
    pub const ALL_MODES: [ScanMode; 4] = [
        ScanMode::Strong,
        ScanMode::Early,
        ScanMode::All,
        ScanMode::Dividend,
    ];

    /// Tag mixed into the content digest.
    pub fn as_str(&self) -> &'static str {
        match self {
            ScanMode::Strong => "strong",
            ScanMode::Early => "early",
            ScanMode::All => "all",
            ScanMode::Dividend => "dividend",
        }
    }

    /// Sections whose tickers open positions under this mode, in priority order.
    pub fn seed_sections(&self) -> &'static [Section] {
        match self {
            ScanMode::Strong => &[Section::StrongBuy],
            ScanMode::Early => &[Section::EarlyBuy],
            ScanMode::All => &[Section::StrongBuy, Section::EarlyBuy],
            ScanMode::Dividend => &[Section::Dividend],
        }
    }
}

impl fmt::Display for ScanMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error("unknown mode '{0}' (valid: strong, early, all, dividend)")]
pub struct ParseModeError(pub String);

impl FromStr for ScanMode {
    type Err = ParseModeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "strong" => Ok(ScanMode::Strong),
            "early" => Ok(ScanMode::Early),
            "all" => Ok(ScanMode::All),
            "dividend" => Ok(ScanMode::Dividend),
            other => Err(ParseModeError(other.to_string())),
        }
    }
}
