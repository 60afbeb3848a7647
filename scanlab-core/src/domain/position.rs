//! Position — one ticker seeded by a signature.
//!
//! State transitions live in `crate::lifecycle`; this module only holds the
//! shape and the read-side accessors.

use super::mode::Section;
use chrono::NaiveDate;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// Which reference price produced an entry or exit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PriceBasis {
    /// Close of the most recent completed session before today.
    PreviousClose,
    /// Today's opening price.
    TodayOpen,
    /// Today's closing price.
    TodayClose,
    /// Latest traded price (exits during the session only).
    Live,
}

impl PriceBasis {
    pub fn label(&self) -> &'static str {
        match self {
            PriceBasis::PreviousClose => "previous_close",
            PriceBasis::TodayOpen => "open",
            PriceBasis::TodayClose => "close",
            PriceBasis::Live => "live",
        }
    }

    /// Whether the price is a session close.
    pub fn is_close(&self) -> bool {
        matches!(self, PriceBasis::PreviousClose | PriceBasis::TodayClose)
    }
}

/// Why a position was closed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExitReason {
    SellSignal,
    Manual,
}

impl ExitReason {
    pub fn label(&self) -> &'static str {
        match self {
            ExitReason::SellSignal => "sell_signal",
            ExitReason::Manual => "manual",
        }
    }
}

/// Exit fields, frozen at close time.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExitRecord {
    pub price: Decimal,
    pub date: NaiveDate,
    pub basis: PriceBasis,
    pub reason: ExitReason,
    pub realized_pnl_pct: Decimal,
}

/// Open or Closed. Closed is terminal.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum PositionStatus {
    Open,
    Closed(ExitRecord),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Position {
    pub ticker: String,
    pub section: Section,
    pub entry_price: Decimal,
    pub entry_date: NaiveDate,
    pub entry_basis: PriceBasis,
    pub status: PositionStatus,
}

impl Position {
    pub fn is_open(&self) -> bool {
        matches!(self.status, PositionStatus::Open)
    }

    pub fn is_closed(&self) -> bool {
        !self.is_open()
    }

    pub fn exit(&self) -> Option<&ExitRecord> {
        match &self.status {
            PositionStatus::Open => None,
            PositionStatus::Closed(exit) => Some(exit),
        }
    }

    pub fn realized_pnl_pct(&self) -> Option<Decimal> {
        self.exit().map(|e| e.realized_pnl_pct)
    }

    /// A closed position with a strictly positive realized return.
    pub fn is_winner(&self) -> bool {
        self.realized_pnl_pct().is_some_and(|p| p > Decimal::ZERO)
    }
}
