//! Seeding positions from scan entries.
//!
//! Each new ticker gets its entry price from the session's entry basis. A
//! ticker whose price cannot be resolved is reported and skipped; the rest of
//! the batch still goes in.

use crate::data::PriceProvider;
use crate::domain::Signature;
use crate::error::EngineError;
use crate::lifecycle::open_position;
use crate::scan::ScanEntry;
use crate::session::ResolvedSession;
use std::collections::HashSet;
use tracing::{debug, warn};

/// Per-ticker outcome of one ingestion.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct IngestReport {
    /// Tickers that received a new open position.
    pub added: Vec<String>,
    /// Tickers already present in the signature (open or closed); untouched.
    pub already_present: Vec<String>,
    /// Tickers whose entry could not be established.
    pub failed: Vec<(String, EngineError)>,
}

impl IngestReport {
    pub fn requested(&self) -> usize {
        self.added.len() + self.already_present.len() + self.failed.len()
    }
}

/// Insert open positions for every entry not yet in `signature`.
///
/// The first occurrence of a ticker wins; later repeats are ignored.
pub fn add_positions(
    signature: &mut Signature,
    entries: &[ScanEntry],
    session: &ResolvedSession,
    prices: &dyn PriceProvider,
) -> IngestReport {
    let basis = session.entry_basis();
    let mut report = IngestReport::default();
    let mut seen = HashSet::new();

    for entry in entries {
        let ticker = crate::domain::normalize_ticker(&entry.ticker);
        if ticker.is_empty() || !seen.insert(ticker.clone()) {
            continue;
        }
        if signature.positions.contains_key(&ticker) {
            report.already_present.push(ticker);
            continue;
        }

        let opened = prices
            .quote(&ticker, session, basis)
            .map_err(|e| e.into_engine(&ticker))
            .and_then(|q| {
                if q.date != session.trading_date {
                    warn!(
                        ticker = %ticker,
                        bar_date = %q.date,
                        session_date = %session.trading_date,
                        basis = basis.label(),
                        "entry price comes from an earlier bar"
                    );
                }
                open_position(&ticker, entry.section, q.price, q.date, basis)
            });

        match opened {
            Ok(position) => {
                debug!(ticker = %ticker, price = %position.entry_price, basis = basis.label(), "opened position");
                signature.positions.insert(ticker.clone(), position);
                report.added.push(ticker);
            }
            Err(err) => {
                warn!(ticker = %ticker, error = %err, "no entry price; skipping");
                report.failed.push((ticker, err));
            }
        }
    }
    report
}
