//! Sell reconciliation across all signatures.
//!
//! 1. Match every open position whose ticker is in the sell zone.
//! 2. Resolve one exit price per ticker from the session's exit basis.
//! 3. Compute signal P&L per position and, with a cost-basis record, actual P&L.
//! 4. Preview returns the sorted report; Commit also closes every matched position.
//!
//! A ticker may be open in several signatures. Each is closed independently
//! against its own entry price.

use crate::data::{PriceProvider, PriceQuote};
use crate::domain::{
    normalize_ticker, CostBasisRecord, CostBasisTable, ExitReason, Section, SignatureId,
};
use crate::error::EngineError;
use crate::identity::SignatureBook;
use crate::lifecycle::{close_position, pnl_pct, ExitFill};
use crate::session::ResolvedSession;
use chrono::NaiveDate;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::collections::{BTreeMap, BTreeSet};
use tracing::{info, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReconcileMode {
    /// Report only; nothing is mutated.
    Preview,
    /// Close every matched position.
    Commit,
}

/// P&L measured from the trader's own cost basis.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ActualPnl {
    pub current_value: Decimal,
    pub cost_basis: Decimal,
    pub account_count: u32,
    pub pnl_pct: Decimal,
    pub pnl_amount: Decimal,
}

impl ActualPnl {
    /// `None` when the record has no positive cost basis.
    pub fn from_record(record: &CostBasisRecord) -> Option<Self> {
        Some(Self {
            current_value: record.current_value,
            cost_basis: record.cost_basis,
            account_count: record.account_count,
            pnl_pct: record.actual_pnl_pct()?.round_dp(4),
            pnl_amount: record.pnl_amount(),
        })
    }
}

/// One open position matched by the sell zone.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SellCandidate {
    pub signature_id: SignatureId,
    pub ticker: String,
    pub section: Section,
    pub entry_price: Decimal,
    pub entry_date: NaiveDate,
    pub exit: PriceQuote,
    pub signal_pnl_pct: Decimal,
    pub actual: Option<ActualPnl>,
}

impl SellCandidate {
    /// Actual P&L when known, otherwise signal P&L.
    pub fn sort_pnl(&self) -> Decimal {
        self.actual
            .as_ref()
            .map_or(self.signal_pnl_pct, |a| a.pnl_pct)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SellReport {
    pub mode: ReconcileMode,
    /// Largest loss first.
    pub rows: Vec<SellCandidate>,
    /// Matched tickers with no usable exit price. Their positions stay open.
    pub price_failures: Vec<(String, EngineError)>,
    /// Sell-zone tickers not held open anywhere.
    pub untracked: Vec<String>,
    /// Positions actually closed (Commit only).
    pub closed: Vec<(SignatureId, String)>,
    /// Positions that refused to close (Commit only).
    pub close_failures: Vec<(SignatureId, String, EngineError)>,
}

impl SellReport {
    pub fn is_empty(&self) -> bool {
        self.rows.is_empty() && self.price_failures.is_empty()
    }

    /// Distinct tickers across matched rows.
    pub fn tickers(&self) -> BTreeSet<&str> {
        self.rows.iter().map(|r| r.ticker.as_str()).collect()
    }
}

/// Tickers currently open in any signature.
pub fn open_tickers(book: &SignatureBook) -> Vec<String> {
    book.open_index().into_keys().collect()
}

/// Build the report without touching the book.
pub fn plan_sells(
    book: &SignatureBook,
    sell_zone: &BTreeSet<String>,
    cost_basis: Option<&CostBasisTable>,
    session: &ResolvedSession,
    prices: &dyn PriceProvider,
) -> SellReport {
    let zone: BTreeSet<String> = sell_zone.iter().map(|t| normalize_ticker(t)).collect();
    let index = book.open_index();
    let basis = session.exit_basis();

    let mut rows = Vec::new();
    let mut price_failures = Vec::new();
    let mut untracked = Vec::new();

    for ticker in &zone {
        let Some(holders) = index.get(ticker) else {
            untracked.push(ticker.clone());
            continue;
        };

        let exit = match prices.quote(ticker, session, basis) {
            Ok(q) => q,
            Err(e) => {
                let err = e.into_engine(ticker);
                warn!(ticker = %ticker, error = %err, "no exit price; leaving open");
                price_failures.push((ticker.clone(), err));
                continue;
            }
        };
        let actual = cost_basis
            .and_then(|t| t.get(ticker))
            .and_then(ActualPnl::from_record);

        for (sig_id, pos) in holders {
            rows.push(SellCandidate {
                signature_id: (*sig_id).clone(),
                ticker: ticker.clone(),
                section: pos.section,
                entry_price: pos.entry_price,
                entry_date: pos.entry_date,
                exit: exit.clone(),
                signal_pnl_pct: pnl_pct(pos.entry_price, exit.price),
                actual: actual.clone(),
            });
        }
    }

    rows.sort_by(compare_rows);

    SellReport {
        mode: ReconcileMode::Preview,
        rows,
        price_failures,
        untracked,
        closed: Vec::new(),
        close_failures: Vec::new(),
    }
}

fn compare_rows(a: &SellCandidate, b: &SellCandidate) -> Ordering {
    a.sort_pnl()
        .cmp(&b.sort_pnl())
        .then_with(|| a.ticker.cmp(&b.ticker))
        .then_with(|| a.signature_id.cmp(&b.signature_id))
}

/// Close every row of a planned report.
pub fn apply_sells(book: &mut SignatureBook, report: &mut SellReport) {
    report.mode = ReconcileMode::Commit;
    for row in &report.rows {
        let Some(sig) = book.get_mut(&row.signature_id) else {
            report.close_failures.push((
                row.signature_id.clone(),
                row.ticker.clone(),
                EngineError::InvalidState(format!("signature {} vanished", row.signature_id)),
            ));
            continue;
        };
        let Some(pos) = sig.positions.get_mut(&row.ticker) else {
            report.close_failures.push((
                row.signature_id.clone(),
                row.ticker.clone(),
                EngineError::InvalidState(format!("{} not held in {}", row.ticker, row.signature_id)),
            ));
            continue;
        };
        let fill = ExitFill {
            price: row.exit.price,
            date: row.exit.date,
            basis: row.exit.basis,
            reason: ExitReason::SellSignal,
        };
        match close_position(pos, fill) {
            Ok(()) => report
                .closed
                .push((row.signature_id.clone(), row.ticker.clone())),
            Err(e) => report
                .close_failures
                .push((row.signature_id.clone(), row.ticker.clone(), e)),
        }
    }
    info!(
        closed = report.closed.len(),
        failed = report.close_failures.len(),
        "sell signals committed"
    );
}

/// Plan, and in Commit mode apply, sells for the current sell zone.
pub fn reconcile_sells(
    book: &mut SignatureBook,
    sell_zone: &BTreeSet<String>,
    cost_basis: Option<&CostBasisTable>,
    session: &ResolvedSession,
    prices: &dyn PriceProvider,
    mode: ReconcileMode,
) -> SellReport {
    let mut report = plan_sells(book, sell_zone, cost_basis, session, prices);
    if mode == ReconcileMode::Commit {
        apply_sells(book, &mut report);
    }
    report
}

/// Group rows by ticker, preserving report order.
pub fn rows_by_ticker(report: &SellReport) -> BTreeMap<&str, Vec<&SellCandidate>> {
    let mut out: BTreeMap<&str, Vec<&SellCandidate>> = BTreeMap::new();
    for row in &report.rows {
        out.entry(row.ticker.as_str()).or_default().push(row);
    }
    out
}
