//! Cost-basis loading from a brokerage position export.
//!
//! Expected columns: `Symbol`, `Value`, `CostBasis`, `NumAccounts`. Exports
//! often start with a UTF-8 BOM and carry `$` and thousands separators; both
//! are tolerated. Rows that cannot be read are skipped with a warning.

use crate::domain::{normalize_ticker, CostBasisRecord, CostBasisTable};
use crate::error::EngineError;
use rust_decimal::Decimal;
use serde::Deserialize;
use std::io::Read;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use tracing::{debug, warn};

/// Source of brokerage cost-basis data.
pub trait CostBasisSource {
    fn load_cost_basis(&self) -> Result<CostBasisTable, EngineError>;
}

/// An in-memory table is its own source.
impl CostBasisSource for CostBasisTable {
    fn load_cost_basis(&self) -> Result<CostBasisTable, EngineError> {
        Ok(self.clone())
    }
}

#[derive(Debug, Deserialize)]
struct CsvRow {
    #[serde(rename = "Symbol", default)]
    symbol: String,
    #[serde(rename = "Value", default)]
    value: String,
    #[serde(rename = "CostBasis", default)]
    cost_basis: String,
    #[serde(rename = "NumAccounts", default)]
    num_accounts: String,
}

/// CSV file of current positions.
#[derive(Debug, Clone)]
pub struct CsvCostBasis {
    path: PathBuf,
}

impl CsvCostBasis {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Parse CSV text. Exposed for tests and for callers that already hold the bytes.
    pub fn parse(text: &str) -> Result<CostBasisTable, EngineError> {
        let text = text.strip_prefix('\u{feff}').unwrap_or(text);
        let mut reader = csv::ReaderBuilder::new()
            .trim(csv::Trim::All)
            .flexible(true)
            .from_reader(text.as_bytes());

        let mut table = CostBasisTable::new();
        for (line, row) in reader.deserialize::<CsvRow>().enumerate() {
            let row = match row {
                Ok(row) => row,
                Err(e) => {
                    warn!(line = line + 2, error = %e, "skipping unreadable cost-basis row");
                    continue;
                }
            };
            let symbol = normalize_ticker(&row.symbol);
            if symbol.is_empty() {
                continue;
            }
            let parsed = (
                parse_money(&row.value),
                parse_money(&row.cost_basis),
                parse_count(&row.num_accounts),
            );
            match parsed {
                (Some(current_value), Some(cost_basis), Some(account_count)) => {
                    table.insert(
                        &symbol,
                        CostBasisRecord {
                            current_value,
                            cost_basis,
                            account_count,
                        },
                    );
                }
                _ => warn!(symbol = %symbol, "skipping cost-basis row with unparseable numbers"),
            }
        }
        debug!(records = table.len(), "loaded cost basis");
        Ok(table)
    }
}

impl CostBasisSource for CsvCostBasis {
    fn load_cost_basis(&self) -> Result<CostBasisTable, EngineError> {
        if !self.path.exists() {
            warn!(path = %self.path.display(), "positions file not found; actual P&L unavailable");
            return Ok(CostBasisTable::new());
        }
        let mut text = String::new();
        std::fs::File::open(&self.path)
            .and_then(|mut f| f.read_to_string(&mut text))
            .map_err(|e| {
                EngineError::Collaborator(format!(
                    "cannot read positions file {}: {e}",
                    self.path.display()
                ))
            })?;
        Self::parse(&text)
    }
}

fn parse_money(raw: &str) -> Option<Decimal> {
    let cleaned: String = raw.chars().filter(|c| !matches!(c, '$' | ',' | ' ')).collect();
    if cleaned.is_empty() {
        return Some(Decimal::ZERO);
    }
    Decimal::from_str(&cleaned).ok()
}

fn parse_count(raw: &str) -> Option<u32> {
    if raw.trim().is_empty() {
        return Some(1);
    }
    raw.trim().parse().ok()
}
