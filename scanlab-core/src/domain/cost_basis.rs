//! Brokerage cost-basis records. Read-only input to sell reconciliation.

use super::normalize_ticker;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CostBasisRecord {
    pub current_value: Decimal,
    pub cost_basis: Decimal,
    pub account_count: u32,
}

impl CostBasisRecord {
    /// `(current_value - cost_basis) / cost_basis * 100`, or `None` when the
    /// basis is not positive or the ratio does not fit a `Decimal`.
    pub fn actual_pnl_pct(&self) -> Option<Decimal> {
        if self.cost_basis <= Decimal::ZERO {
            return None;
        }
        self.current_value
            .checked_sub(self.cost_basis)?
            .checked_div(self.cost_basis)?
            .checked_mul(Decimal::ONE_HUNDRED)
    }

    pub fn pnl_amount(&self) -> Decimal {
        self.current_value - self.cost_basis
    }
}

/// Ticker → cost-basis record, keyed by normalized ticker.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CostBasisTable {
    records: BTreeMap<String, CostBasisRecord>,
}

impl CostBasisTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, ticker: &str, record: CostBasisRecord) {
        self.records.insert(normalize_ticker(ticker), record);
    }

    /// Case-insensitive lookup.
    pub fn get(&self, ticker: &str) -> Option<&CostBasisRecord> {
        self.records.get(&normalize_ticker(ticker))
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &CostBasisRecord)> {
        self.records.iter()
    }
}

impl FromIterator<(String, CostBasisRecord)> for CostBasisTable {
    fn from_iter<I: IntoIterator<Item = (String, CostBasisRecord)>>(iter: I) -> Self {
        let mut table = Self::new();
        for (ticker, record) in iter {
            table.insert(&ticker, record);
        }
        table
    }
}
