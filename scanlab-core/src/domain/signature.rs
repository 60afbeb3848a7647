//! Signature — one processed (scan content, mode) pair and the positions it seeded.

use super::ids::{ContentHash, SignatureId};
use super::mode::ScanMode;
use super::position::Position;
use crate::session::SessionBucket;
use chrono::{NaiveDate, NaiveDateTime};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Session state captured when the signature was created. Audit only, never
/// recomputed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MarketStatus {
    pub bucket: SessionBucket,
    pub trading_date: NaiveDate,
    pub description: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Signature {
    // ── Identity (immutable) ──
    pub id: SignatureId,
    pub content_hash: ContentHash,
    pub mode: ScanMode,

    // ── Provenance ──
    pub created_at: NaiveDateTime,
    pub source: String,
    pub market_status: MarketStatus,

    /// Ticker → position. One entry per ticker.
    #[serde(default)]
    pub positions: BTreeMap<String, Position>,
}

impl Signature {
    pub fn position(&self, ticker: &str) -> Option<&Position> {
        self.positions.get(ticker)
    }

    pub fn open_positions(&self) -> impl Iterator<Item = &Position> {
        self.positions.values().filter(|p| p.is_open())
    }

    pub fn closed_positions(&self) -> impl Iterator<Item = &Position> {
        self.positions.values().filter(|p| p.is_closed())
    }

    pub fn open_tickers(&self) -> Vec<&str> {
        self.open_positions().map(|p| p.ticker.as_str()).collect()
    }

    pub fn has_open(&self, ticker: &str) -> bool {
        self.position(ticker).is_some_and(|p| p.is_open())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{ExitReason, ExitRecord, PositionStatus, PriceBasis, Section};
    use rust_decimal::Decimal;

    fn position(ticker: &str, closed: bool) -> Position {
        let day = NaiveDate::from_ymd_opt(2025, 6, 10).unwrap();
        Position {
            ticker: ticker.into(),
            section: Section::StrongBuy,
            entry_price: Decimal::from(10),
            entry_date: day,
            entry_basis: PriceBasis::TodayOpen,
            status: if closed {
                PositionStatus::Closed(ExitRecord {
                    price: Decimal::from(11),
                    date: day,
                    basis: PriceBasis::TodayClose,
                    reason: ExitReason::SellSignal,
                    realized_pnl_pct: Decimal::from(10),
                })
            } else {
                PositionStatus::Open
            },
        }
    }

    #[test]
    fn open_and_closed_views() {
        let day = NaiveDate::from_ymd_opt(2025, 6, 10).unwrap();
        let positions = [("AAA", false), ("BBB", true), ("CCC", false)]
            .into_iter()
            .map(|(t, closed)| (t.to_string(), position(t, closed)))
            .collect();
        let sig = Signature {
            id: SignatureId("20250610_100000_0badc0de".into()),
            content_hash: ContentHash::from_hex("0badc0de"),
            mode: ScanMode::All,
            created_at: day.and_hms_opt(10, 0, 0).unwrap(),
            source: "scan.txt".into(),
            market_status: MarketStatus {
                bucket: SessionBucket::Intraday,
                trading_date: day,
                description: String::new(),
            },
            positions,
        };

        assert_eq!(sig.open_tickers(), ["AAA", "CCC"]);
        assert_eq!(sig.closed_positions().count(), 1);
        assert!(sig.has_open("AAA"));
        assert!(!sig.has_open("BBB"));
        assert!(!sig.has_open("ZZZ"));

        let json = serde_json::to_string(&sig).unwrap();
        let back: Signature = serde_json::from_str(&json).unwrap();
        assert_eq!(back, sig);
    }
}
