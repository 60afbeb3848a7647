//! Market data and brokerage inputs

pub mod cost_basis;
pub mod fixed;
pub mod provider;
pub mod yahoo;

pub use cost_basis::{CostBasisSource, CsvCostBasis};
pub use fixed::FixedPriceProvider;
pub use provider::{PriceError, PriceProvider, PriceQuote};
pub use yahoo::{YahooConfig, YahooProvider};
