//! In-memory price table.
//!
//! Used for offline runs, manual exit prices, and tests. Historical prices are
//! keyed by (ticker, date); a missing key is `NoPriceForDate`.

use super::provider::{PriceError, PriceProvider, PriceQuote};
use crate::domain::{normalize_ticker, PriceBasis};
use chrono::NaiveDate;
use rust_decimal::Decimal;
use std::collections::HashMap;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct DailyPrice {
    open: Decimal,
    close: Decimal,
}

#[derive(Debug, Clone, Default)]
pub struct FixedPriceProvider {
    daily: HashMap<(String, NaiveDate), DailyPrice>,
    current: HashMap<String, (Decimal, NaiveDate)>,
}

impl FixedPriceProvider {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register one session's open and close.
    pub fn with_daily(mut self, ticker: &str, date: NaiveDate, open: Decimal, close: Decimal) -> Self {
        self.daily
            .insert((normalize_ticker(ticker), date), DailyPrice { open, close });
        self
    }

    /// Register the same price as both open and close.
    pub fn with_flat(self, ticker: &str, date: NaiveDate, price: Decimal) -> Self {
        self.with_daily(ticker, date, price, price)
    }

    pub fn with_current(mut self, ticker: &str, price: Decimal, as_of: NaiveDate) -> Self {
        self.current.insert(normalize_ticker(ticker), (price, as_of));
        self
    }
}

impl PriceProvider for FixedPriceProvider {
    fn name(&self) -> &str {
        "fixed"
    }

    fn get_price(
        &self,
        ticker: &str,
        date: NaiveDate,
        basis: PriceBasis,
    ) -> Result<PriceQuote, PriceError> {
        let key = (normalize_ticker(ticker), date);
        let day = self.daily.get(&key).ok_or_else(|| PriceError::NoPriceForDate {
            symbol: key.0.clone(),
            date,
            basis,
        })?;
        let price = match basis {
            PriceBasis::TodayOpen => day.open,
            _ => day.close,
        };
        Ok(PriceQuote { price, date, basis })
    }

    fn get_current_price(&self, ticker: &str) -> Result<PriceQuote, PriceError> {
        let symbol = normalize_ticker(ticker);
        self.current
            .get(&symbol)
            .map(|&(price, date)| PriceQuote {
                price,
                date,
                basis: PriceBasis::Live,
            })
            .ok_or(PriceError::SymbolNotFound { symbol })
    }
}
