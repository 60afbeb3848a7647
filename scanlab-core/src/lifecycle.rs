//! Position lifecycle: Open → Closed, and the P&L arithmetic around it.
//!
//! Closing is a one-time terminal event. Aggregates are derived from the
//! position set on every read and never stored on the signature.

use crate::domain::{
    ExitReason, ExitRecord, Position, PositionStatus, PriceBasis, Section, Signature,
};
use crate::error::EngineError;
use chrono::NaiveDate;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

const PNL_DECIMALS: u32 = 4;

/// `(exit - entry) / entry * 100`, rounded to 4 places.
///
/// Callers guarantee `entry > 0`; positions cannot be created otherwise.
/// A ratio too large for `Decimal` saturates at `Decimal::MAX`.
pub fn pnl_pct(entry: Decimal, exit: Decimal) -> Decimal {
    if entry <= Decimal::ZERO {
        return Decimal::ZERO;
    }
    exit.checked_sub(entry)
        .and_then(|diff| diff.checked_div(entry))
        .and_then(|ratio| ratio.checked_mul(Decimal::ONE_HUNDRED))
        .map_or(Decimal::MAX, |pct| pct.round_dp(PNL_DECIMALS))
}

/// Create an open position. A non-positive price is refused.
pub fn open_position(
    ticker: &str,
    section: Section,
    price: Decimal,
    date: NaiveDate,
    basis: PriceBasis,
) -> Result<Position, EngineError> {
    if price <= Decimal::ZERO {
        return Err(EngineError::InvalidState(format!(
            "{ticker}: entry price must be positive, got {price}"
        )));
    }
    Ok(Position {
        ticker: ticker.to_string(),
        section,
        entry_price: price,
        entry_date: date,
        entry_basis: basis,
        status: PositionStatus::Open,
    })
}

/// Exit details supplied by the caller.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExitFill {
    pub price: Decimal,
    pub date: NaiveDate,
    pub basis: PriceBasis,
    pub reason: ExitReason,
}

/// Close an open position and freeze its realized P&L.
///
/// Fails without touching the position when it is already closed or the exit
/// price is not positive.
pub fn close_position(position: &mut Position, fill: ExitFill) -> Result<(), EngineError> {
    if let PositionStatus::Closed(exit) = &position.status {
        return Err(EngineError::InvalidState(format!(
            "{} already closed on {} at {}",
            position.ticker, exit.date, exit.price
        )));
    }
    if fill.price <= Decimal::ZERO {
        return Err(EngineError::InvalidState(format!(
            "{}: exit price must be positive, got {}",
            position.ticker, fill.price
        )));
    }

    let realized_pnl_pct = pnl_pct(position.entry_price, fill.price);
    position.status = PositionStatus::Closed(ExitRecord {
        price: fill.price,
        date: fill.date,
        basis: fill.basis,
        reason: fill.reason,
        realized_pnl_pct,
    });
    Ok(())
}

/// P&L of an open position against a fresh price. Never stored.
pub fn unrealized_pnl_pct(position: &Position, current_price: Decimal) -> Option<Decimal> {
    position
        .is_open()
        .then(|| pnl_pct(position.entry_price, current_price))
}

impl Position {
    pub fn unrealized_pnl_pct(&self, current_price: Decimal) -> Option<Decimal> {
        unrealized_pnl_pct(self, current_price)
    }
}

/// Aggregate view of one signature.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SignatureSummary {
    pub total: usize,
    pub open: usize,
    pub closed: usize,
    pub wins: usize,
    pub losses: usize,
    /// Sum of realized % over closed positions.
    pub realized_pnl_pct: Decimal,
    /// Sum of unrealized % over open positions that had a current price.
    pub unrealized_pnl_pct: Decimal,
    /// Open positions with no current price supplied.
    pub unpriced: usize,
}

impl SignatureSummary {
    pub fn total_pnl_pct(&self) -> Decimal {
        self.realized_pnl_pct.saturating_add(self.unrealized_pnl_pct)
    }

    /// Wins / closed * 100, or `None` before any close.
    pub fn win_rate(&self) -> Option<Decimal> {
        if self.closed == 0 {
            return None;
        }
        Some(
            (Decimal::from(self.wins as u64) / Decimal::from(self.closed as u64)
                * Decimal::ONE_HUNDRED)
                .round_dp(1),
        )
    }
}

impl Signature {
    /// Recompute aggregates. `current_prices` is keyed by ticker.
    pub fn summary(&self, current_prices: &BTreeMap<String, Decimal>) -> SignatureSummary {
        let mut s = SignatureSummary {
            total: self.positions.len(),
            ..SignatureSummary::default()
        };
        for pos in self.positions.values() {
            match &pos.status {
                PositionStatus::Closed(exit) => {
                    s.closed += 1;
                    s.realized_pnl_pct = s.realized_pnl_pct.saturating_add(exit.realized_pnl_pct);
                    if exit.realized_pnl_pct > Decimal::ZERO {
                        s.wins += 1;
                    } else {
                        s.losses += 1;
                    }
                }
                PositionStatus::Open => {
                    s.open += 1;
                    match current_prices.get(&pos.ticker) {
                        Some(&price) => {
                            s.unrealized_pnl_pct =
                                s.unrealized_pnl_pct.saturating_add(pnl_pct(pos.entry_price, price))
                        }
                        None => s.unpriced += 1,
                    }
                }
            }
        }
        s
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn day(d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2025, 6, d).unwrap()
    }

    fn open_at(ticker: &str, entry: i64) -> Position {
        open_position(ticker, Section::StrongBuy, Decimal::from(entry), day(2), PriceBasis::TodayOpen)
            .unwrap()
    }

    fn fill(price: i64) -> ExitFill {
        ExitFill {
            price: Decimal::from(price),
            date: day(9),
            basis: PriceBasis::TodayClose,
            reason: ExitReason::SellSignal,
        }
    }

    #[test]
    fn close_computes_realized_pnl() {
        let mut pos = open_at("AAPL", 100);
        close_position(&mut pos, fill(110)).unwrap();
        assert_eq!(pos.realized_pnl_pct(), Some(Decimal::from(10)));
        let exit = pos.exit().unwrap();
        assert_eq!(exit.price, Decimal::from(110));
        assert_eq!(exit.date, day(9));
    }

    #[test]
    fn second_close_fails_and_keeps_first() {
        let mut pos = open_at("AAPL", 100);
        close_position(&mut pos, fill(110)).unwrap();
        let before = pos.clone();

        let err = close_position(&mut pos, fill(50)).unwrap_err();
        assert!(matches!(err, EngineError::InvalidState(_)));
        assert_eq!(pos, before);
    }

    #[test]
    fn non_positive_prices_are_refused() {
        assert!(matches!(
            open_position("X", Section::EarlyBuy, Decimal::ZERO, day(2), PriceBasis::TodayOpen),
            Err(EngineError::InvalidState(_))
        ));
        let mut pos = open_at("X", 100);
        assert!(close_position(&mut pos, fill(0)).is_err());
        assert!(pos.is_open());
    }

    #[test]
    fn unrealized_only_for_open() {
        let mut pos = open_at("X", 200);
        assert_eq!(pos.unrealized_pnl_pct(Decimal::from(150)), Some(Decimal::from(-25)));
        close_position(&mut pos, fill(210)).unwrap();
        assert_eq!(pos.unrealized_pnl_pct(Decimal::from(150)), None);
    }

    #[test]
    fn pnl_rounds_to_four_places() {
        assert_eq!(pnl_pct(Decimal::from(3), Decimal::from(4)), Decimal::new(333333, 4));
    }

    #[test]
    fn pnl_saturates_instead_of_overflowing() {
        let huge = Decimal::from_str_exact("79228162514264337593543950").unwrap();
        assert_eq!(pnl_pct(Decimal::new(1, 7), huge), Decimal::MAX);

        let mut pos = open_at("X", 1);
        pos.entry_price = Decimal::new(1, 7);
        let prices = BTreeMap::from([("X".to_string(), huge)]);
        let sig = Signature {
            positions: BTreeMap::from([("X".to_string(), pos)]),
            ..summary_signature()
        };
        assert_eq!(sig.summary(&prices).unrealized_pnl_pct, Decimal::MAX);
    }

    fn summary_signature() -> Signature {
        use crate::domain::{ContentHash, MarketStatus, ScanMode, SignatureId};
        use crate::session::SessionBucket;

        Signature {
            id: SignatureId("20250602_100000_abcdef01".into()),
            content_hash: ContentHash::from_hex("abcdef01"),
            mode: ScanMode::All,
            created_at: day(2).and_hms_opt(10, 0, 0).unwrap(),
            source: "scan.txt".into(),
            market_status: MarketStatus {
                bucket: SessionBucket::Intraday,
                trading_date: day(2),
                description: String::new(),
            },
            positions: BTreeMap::new(),
        }
    }

    #[test]
    fn summary_is_derived() {
        let mut positions = BTreeMap::new();
        let mut win = open_at("WIN", 100);
        close_position(&mut win, fill(120)).unwrap();
        let mut flat = open_at("FLAT", 100);
        close_position(&mut flat, fill(100)).unwrap();
        positions.insert("WIN".to_string(), win);
        positions.insert("FLAT".to_string(), flat);
        positions.insert("OPEN".to_string(), open_at("OPEN", 50));
        positions.insert("NOPX".to_string(), open_at("NOPX", 10));

        let sig = Signature {
            positions,
            ..summary_signature()
        };

        let prices: BTreeMap<String, Decimal> = [("OPEN".to_string(), Decimal::from(55))].into();
        let s = sig.summary(&prices);
        assert_eq!((s.total, s.open, s.closed), (4, 2, 2));
        // A flat close counts as a loss
        assert_eq!((s.wins, s.losses), (1, 1));
        assert_eq!(s.win_rate(), Some(Decimal::from(50)));
        assert_eq!(s.realized_pnl_pct, Decimal::from(20));
        assert_eq!(s.unrealized_pnl_pct, Decimal::from(10));
        assert_eq!(s.total_pnl_pct(), Decimal::from(30));
        assert_eq!(s.unpriced, 1);

        assert_eq!(SignatureSummary::default().win_rate(), None);
    }

    proptest! {
        #[test]
        fn close_is_terminal(entry in 1i64..100_000, first in 1i64..100_000, second in 1i64..100_000) {
            let mut pos = open_at("P", entry);
            close_position(&mut pos, fill(first)).unwrap();
            let frozen = pos.clone();
            prop_assert!(close_position(&mut pos, fill(second)).is_err());
            prop_assert_eq!(pos, frozen);
        }

        #[test]
        fn pnl_sign_follows_price_move(entry in 1i64..100_000, exit in 1i64..100_000) {
            let pnl = pnl_pct(Decimal::from(entry), Decimal::from(exit));
            prop_assert_eq!(pnl > Decimal::ZERO, exit > entry);
            prop_assert_eq!(pnl.is_zero(), exit == entry);
        }
    }
}
