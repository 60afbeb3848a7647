//! Price provider trait and structured error types.
//!
//! The PriceProvider trait abstracts over quote sources (Yahoo Finance, fixed
//! tables for tests and manual overrides) so the engine never knows where a
//! price came from.

use crate::domain::PriceBasis;
use crate::error::EngineError;
use crate::session::ResolvedSession;
use chrono::NaiveDate;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// A resolved price and the session date it belongs to.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PriceQuote {
    pub price: Decimal,
    pub date: NaiveDate,
    pub basis: PriceBasis,
}

/// Structured error types for price lookups.
///
/// All of these are per-ticker: the caller records them and moves on.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum PriceError {
    #[error("network unreachable: {0}")]
    NetworkUnreachable(String),

    #[error("rate limited by provider (retry after {retry_after_secs}s)")]
    RateLimited { retry_after_secs: u64 },

    #[error("response format changed: {0}")]
    ResponseFormatChanged(String),

    #[error("symbol not found: {symbol}")]
    SymbolNotFound { symbol: String },

    #[error("no {} price for {symbol} on {date}", .basis.label())]
    NoPriceForDate {
        symbol: String,
        date: NaiveDate,
        basis: PriceBasis,
    },

    #[error("non-positive price {value} for {symbol}")]
    InvalidPrice { symbol: String, value: String },

    #[error("price error: {0}")]
    Other(String),
}

impl PriceError {
    /// Per-ticker engine error for reporting. A non-positive quote is
    /// `InvalidState`; anything else is `NotFound`.
    pub fn into_engine(self, ticker: &str) -> EngineError {
        let detail = self.to_string();
        match self {
            Self::InvalidPrice { .. } => EngineError::InvalidState(detail),
            _ => EngineError::not_found(ticker, detail),
        }
    }
}

/// Trait for price providers.
pub trait PriceProvider: Send + Sync {
    /// Human-readable name of this provider.
    fn name(&self) -> &str;

    /// Historical open/close for a ticker on a session date.
    fn get_price(
        &self,
        ticker: &str,
        date: NaiveDate,
        basis: PriceBasis,
    ) -> Result<PriceQuote, PriceError>;

    /// Latest traded price.
    fn get_current_price(&self, ticker: &str) -> Result<PriceQuote, PriceError>;

    /// Price for `basis` in the context of a resolved session.
    fn quote(
        &self,
        ticker: &str,
        session: &ResolvedSession,
        basis: PriceBasis,
    ) -> Result<PriceQuote, PriceError> {
        let quote = match basis {
            PriceBasis::Live => self.get_current_price(ticker)?,
            _ => self.get_price(ticker, session.trading_date, basis)?,
        };
        if quote.price <= Decimal::ZERO {
            return Err(PriceError::InvalidPrice {
                symbol: ticker.to_string(),
                value: quote.price.to_string(),
            });
        }
        Ok(quote)
    }
}
