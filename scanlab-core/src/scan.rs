//! Scanner collaborator contracts.
//!
//! The engine consumes scanner output through two seams: a `ScanParser` that
//! turns raw scan content into sectioned ticker lists, and a `SellZoneSource`
//! that reports which tracked tickers are currently in the sell zone.

use crate::domain::{normalize_ticker, ScanMode, Section};
use crate::error::EngineError;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet, HashSet};

/// One ticker listed under one section of a scan.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ScanEntry {
    pub ticker: String,
    pub section: Section,
}

impl ScanEntry {
    pub fn new(ticker: &str, section: Section) -> Self {
        Self {
            ticker: normalize_ticker(ticker),
            section,
        }
    }
}

/// Parsed scan: tickers per section, in listing order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ParsedScan {
    sections: BTreeMap<Section, Vec<String>>,
}

impl ParsedScan {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a ticker to a section. Repeats within a section are dropped by
    /// exact text.
    pub fn push(&mut self, section: Section, ticker: &str) {
        let list = self.sections.entry(section).or_default();
        if !list.iter().any(|t| t == ticker) {
            list.push(ticker.to_string());
        }
    }

    pub fn section(&self, section: Section) -> &[String] {
        self.sections.get(&section).map(Vec::as_slice).unwrap_or(&[])
    }

    pub fn is_empty(&self) -> bool {
        self.sections.values().all(Vec::is_empty)
    }

    /// Total tickers across all sections.
    pub fn len(&self) -> usize {
        self.sections.values().map(Vec::len).sum()
    }

    /// Entries that seed positions under `mode`. A ticker listed in more than
    /// one seed section keeps the first.
    pub fn entries_for(&self, mode: ScanMode) -> Vec<ScanEntry> {
        let mut seen = HashSet::new();
        let mut entries = Vec::new();
        for &section in mode.seed_sections() {
            for ticker in self.section(section) {
                let entry = ScanEntry::new(ticker, section);
                if seen.insert(entry.ticker.clone()) {
                    entries.push(entry);
                }
            }
        }
        entries
    }

    pub fn sell_tickers(&self) -> BTreeSet<String> {
        self.section(Section::Sell)
            .iter()
            .map(|t| normalize_ticker(t))
            .collect()
    }
}

/// Turns raw scanner output into sections.
pub trait ScanParser: Send + Sync {
    fn parse(&self, raw: &str) -> Result<ParsedScan, EngineError>;

    /// Parse and select the entries for `mode`.
    fn parse_entries(&self, raw: &str, mode: ScanMode) -> Result<Vec<ScanEntry>, EngineError> {
        Ok(self.parse(raw)?.entries_for(mode))
    }
}

/// Produces the set of tickers currently flagged for exit.
///
/// `candidates` are the tickers held open; implementations may use them to
/// limit the scan. Failures are fatal to the calling command.
pub trait SellZoneSource {
    fn sell_zone(&self, candidates: &[String]) -> Result<BTreeSet<String>, EngineError>;
}

/// Fixed sell-zone set.
#[derive(Debug, Clone, Default)]
pub struct MemorySellZone {
    tickers: BTreeSet<String>,
}

impl MemorySellZone {
    pub fn new<I, S>(tickers: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        Self {
            tickers: tickers.into_iter().map(|t| normalize_ticker(t.as_ref())).collect(),
        }
    }
}

impl SellZoneSource for MemorySellZone {
    fn sell_zone(&self, _candidates: &[String]) -> Result<BTreeSet<String>, EngineError> {
        Ok(self.tickers.clone())
    }
}
