//! Tracker — one method per command.
//!
//! Every command follows the same shape: load the whole store, compute in
//! memory, then write once. Fatal errors return before the write, so a failed
//! command leaves the previous state on disk.

use crate::config::{AppConfig, ConfigError};
use crate::parser::ScanOutputParser;
use crate::scanner::ScannerProcess;
use crate::store::{SignatureStore, StoreError};
use chrono::{DateTime, FixedOffset, Utc};
use rust_decimal::Decimal;
use scanlab_core::data::{CostBasisSource, CsvCostBasis, PriceError, PriceProvider, PriceQuote, YahooProvider};
use scanlab_core::domain::{normalize_ticker, ExitReason, PriceBasis, ScanMode, Signature, SignatureId};
use scanlab_core::identity::{LookupError, SignatureDraft};
use scanlab_core::ingest::{add_positions, IngestReport};
use scanlab_core::lifecycle::{close_position, pnl_pct, ExitFill, SignatureSummary};
use scanlab_core::reconcile::{open_tickers, reconcile_sells, ReconcileMode, SellReport};
use scanlab_core::scan::{ScanParser, SellZoneSource};
use scanlab_core::session::{resolve_session, ExchangeCalendar, ResolvedSession};
use scanlab_core::EngineError;
use std::collections::BTreeMap;
use std::fmt;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::{debug, info, warn};

/// Raw content longer than this is cut for display.
pub const SHOW_LIMIT_CHARS: usize = 8000;

#[derive(Debug, Error)]
pub enum TrackerError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error(transparent)]
    Engine(#[from] EngineError),

    #[error(transparent)]
    Lookup(#[from] LookupError),

    #[error("price provider: {0}")]
    Prices(#[from] PriceError),

    #[error("failed to read {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("no open position in {ticker}")]
    NothingToClose { ticker: String },
}

/// Succeeded / skipped counts for a finished command.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct OutcomeCounts {
    pub succeeded: usize,
    /// Per-ticker failures that were reported and passed over.
    pub skipped: usize,
}

impl fmt::Display for OutcomeCounts {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} succeeded, {} skipped", self.succeeded, self.skipped)
    }
}

/// Commands that touch tickers report how many went through.
pub trait Outcome {
    fn counts(&self) -> OutcomeCounts;
}

impl Outcome for SellReport {
    fn counts(&self) -> OutcomeCounts {
        match self.mode {
            ReconcileMode::Preview => OutcomeCounts {
                succeeded: self.rows.len(),
                skipped: self.price_failures.len(),
            },
            ReconcileMode::Commit => OutcomeCounts {
                succeeded: self.closed.len(),
                skipped: self.price_failures.len() + self.close_failures.len(),
            },
        }
    }
}

#[derive(Debug, Clone)]
pub struct ProcessOutcome {
    pub signature_id: SignatureId,
    /// False when this (content, mode) was processed before; nothing changed.
    pub is_new: bool,
    pub session: ResolvedSession,
    pub ingest: IngestReport,
    pub raw_path: Option<PathBuf>,
}

impl Outcome for ProcessOutcome {
    fn counts(&self) -> OutcomeCounts {
        OutcomeCounts {
            succeeded: self.ingest.added.len(),
            skipped: self.ingest.failed.len(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct CloseOutcome {
    pub ticker: String,
    pub exit: PriceQuote,
    /// Signature and realized % for every position closed.
    pub closed: Vec<(SignatureId, Decimal)>,
    pub failed: Vec<(SignatureId, EngineError)>,
}

impl Outcome for CloseOutcome {
    fn counts(&self) -> OutcomeCounts {
        OutcomeCounts {
            succeeded: self.closed.len(),
            skipped: self.failed.len(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct SignatureListing {
    pub signature: Signature,
    /// Realized figures only; no prices are fetched for a listing.
    pub summary: SignatureSummary,
}

#[derive(Debug, Clone)]
pub struct SignatureReport {
    pub signature: Signature,
    pub session: ResolvedSession,
    pub current: BTreeMap<String, Decimal>,
    pub price_failures: Vec<(String, EngineError)>,
    pub summary: SignatureSummary,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LiveRow {
    pub ticker: String,
    pub current: Option<Decimal>,
    pub open_positions: usize,
    pub avg_entry: Decimal,
    /// Against `avg_entry`; `None` without a current price.
    pub pnl_pct: Option<Decimal>,
}

#[derive(Debug, Clone)]
pub struct LiveView {
    pub session: ResolvedSession,
    pub rows: Vec<LiveRow>,
    pub price_failures: Vec<(String, EngineError)>,
}

impl LiveView {
    /// Position-weighted average P&L over priced rows.
    pub fn weighted_pnl_pct(&self) -> Option<Decimal> {
        let (sum, count) = self
            .rows
            .iter()
            .filter_map(|r| r.pnl_pct.map(|p| (p, r.open_positions)))
            .fold((Decimal::ZERO, 0usize), |(sum, n), (p, c)| {
                (sum + p * Decimal::from(c as u64), n + c)
            });
        (count > 0).then(|| (sum / Decimal::from(count as u64)).round_dp(2))
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ShowOutcome {
    pub signature_id: SignatureId,
    /// `None` when no raw content is archived.
    pub content: Option<String>,
    pub truncated: bool,
}

#[derive(Debug, Clone)]
pub struct DeleteOutcome {
    pub signature: Signature,
    /// False for a preview.
    pub deleted: bool,
    pub raw_removed: bool,
}

pub struct Tracker {
    config: AppConfig,
    store: SignatureStore,
    prices: Box<dyn PriceProvider>,
    calendar: Box<dyn ExchangeCalendar>,
    parser: Box<dyn ScanParser>,
}

impl Tracker {
    /// Build from configuration with the given price source.
    pub fn new(config: AppConfig, prices: Box<dyn PriceProvider>) -> Result<Self, TrackerError> {
        config.validate()?;
        let calendar = config.calendar()?;
        Ok(Self {
            store: SignatureStore::new(&config.data_dir),
            prices,
            calendar: Box::new(calendar),
            parser: Box::new(ScanOutputParser::new()),
            config,
        })
    }

    /// Build with Yahoo Finance as the price source.
    pub fn with_yahoo(config: AppConfig) -> Result<Self, TrackerError> {
        let yahoo = YahooProvider::new(config.yahoo_config())?;
        Self::new(config, Box::new(yahoo))
    }

    pub fn with_calendar(mut self, calendar: Box<dyn ExchangeCalendar>) -> Self {
        self.calendar = calendar;
        self
    }

    pub fn with_parser(mut self, parser: Box<dyn ScanParser>) -> Self {
        self.parser = parser;
        self
    }

    pub fn config(&self) -> &AppConfig {
        &self.config
    }

    pub fn store(&self) -> &SignatureStore {
        &self.store
    }

    /// Scanner subprocess built from `[scanner]`.
    pub fn scanner(&self) -> ScannerProcess {
        ScannerProcess::new(self.config.scanner.clone())
    }

    /// Cost-basis CSV from `positions_file`, if one is configured.
    pub fn configured_cost_basis(&self) -> Option<CsvCostBasis> {
        self.config.positions_file.as_ref().map(CsvCostBasis::new)
    }

    pub fn session(&self, now: DateTime<Utc>) -> ResolvedSession {
        resolve_session(now, self.calendar.as_ref())
    }

    // ── process ──

    pub fn process_file(
        &self,
        path: &Path,
        mode: ScanMode,
        now: DateTime<FixedOffset>,
    ) -> Result<ProcessOutcome, TrackerError> {
        let content = std::fs::read(path).map_err(|source| TrackerError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        let source = path
            .file_name()
            .map_or_else(|| path.display().to_string(), |n| n.to_string_lossy().into_owned());
        self.process_scan(&content, &source, mode, now)
    }

    /// Record a scan: find or create its signature and seed positions.
    ///
    /// Reprocessing content already seen under `mode` changes nothing.
    pub fn process_scan(
        &self,
        content: &[u8],
        source: &str,
        mode: ScanMode,
        now: DateTime<FixedOffset>,
    ) -> Result<ProcessOutcome, TrackerError> {
        let session = self.session(now.with_timezone(&Utc));
        let entries = self
            .parser
            .parse_entries(&String::from_utf8_lossy(content), mode)?;
        if entries.is_empty() {
            warn!(mode = %mode, source, "scan has no tickers for this mode");
        }

        let mut book = self.store.load()?;
        let ensured = book.ensure(SignatureDraft {
            content,
            mode,
            created_at: now.naive_local(),
            source: source.to_string(),
            market_status: session.market_status(),
        })?;

        if !ensured.is_new {
            info!(id = %ensured.id, "scan already processed");
            return Ok(ProcessOutcome {
                signature_id: ensured.id,
                is_new: false,
                session,
                ingest: IngestReport::default(),
                raw_path: None,
            });
        }

        let signature = book.get_mut(&ensured.id).ok_or_else(|| {
            EngineError::Integrity(format!("signature {} missing after insert", ensured.id))
        })?;
        let ingest = add_positions(signature, &entries, &session, self.prices.as_ref());

        let raw_path = self.store.write_raw(&ensured.id, content)?;
        self.store.save(&book, now.naive_local())?;
        info!(
            id = %ensured.id,
            added = ingest.added.len(),
            failed = ingest.failed.len(),
            "signature created"
        );
        Ok(ProcessOutcome {
            signature_id: ensured.id,
            is_new: true,
            session,
            ingest,
            raw_path: Some(raw_path),
        })
    }

    // ── check-sells ──

    /// Match open positions against the sell zone; in Commit mode close them.
    pub fn check_sells(
        &self,
        zone: &dyn SellZoneSource,
        cost_basis: Option<&dyn CostBasisSource>,
        mode: ReconcileMode,
        now: DateTime<FixedOffset>,
    ) -> Result<SellReport, TrackerError> {
        let mut book = self.store.load()?;
        let candidates = open_tickers(&book);
        let session = self.session(now.with_timezone(&Utc));
        if candidates.is_empty() {
            info!("no open positions to check");
            return Ok(reconcile_sells(
                &mut book,
                &Default::default(),
                None,
                &session,
                self.prices.as_ref(),
                mode,
            ));
        }

        let sell_zone = zone.sell_zone(&candidates)?;
        let table = cost_basis.map(|s| s.load_cost_basis()).transpose()?;
        debug!(
            candidates = candidates.len(),
            sell_zone = sell_zone.len(),
            cost_basis = table.as_ref().map_or(0, |t| t.len()),
            "reconciling"
        );

        let report = reconcile_sells(
            &mut book,
            &sell_zone,
            table.as_ref(),
            &session,
            self.prices.as_ref(),
            mode,
        );
        if mode == ReconcileMode::Commit && !report.closed.is_empty() {
            self.store.save(&book, now.naive_local())?;
        }
        Ok(report)
    }

    // ── close ──

    /// Manually close `ticker` in one signature (by ID prefix) or in all that
    /// hold it open. Without `price` the live price is fetched.
    pub fn close_ticker(
        &self,
        ticker: &str,
        signature: Option<&str>,
        price: Option<Decimal>,
        now: DateTime<FixedOffset>,
    ) -> Result<CloseOutcome, TrackerError> {
        let ticker = normalize_ticker(ticker);
        let mut book = self.store.load()?;

        let targets: Vec<SignatureId> = match signature {
            Some(prefix) => {
                let sig = book.resolve(prefix)?;
                if sig.has_open(&ticker) {
                    vec![sig.id.clone()]
                } else {
                    Vec::new()
                }
            }
            None => book
                .open_index()
                .get(&ticker)
                .map(|holders| holders.iter().map(|(id, _)| (*id).clone()).collect())
                .unwrap_or_default(),
        };
        if targets.is_empty() {
            return Err(TrackerError::NothingToClose { ticker });
        }

        let session = self.session(now.with_timezone(&Utc));
        let exit = match price {
            Some(price) => PriceQuote {
                price,
                date: session.trading_date,
                basis: PriceBasis::Live,
            },
            None => self
                .prices
                .quote(&ticker, &session, PriceBasis::Live)
                .map_err(|e| e.into_engine(&ticker))?,
        };

        let mut outcome = CloseOutcome {
            ticker: ticker.clone(),
            exit: exit.clone(),
            closed: Vec::new(),
            failed: Vec::new(),
        };
        for id in targets {
            let Some(pos) = book.get_mut(&id).and_then(|s| s.positions.get_mut(&ticker)) else {
                continue;
            };
            let fill = ExitFill {
                price: exit.price,
                date: exit.date,
                basis: exit.basis,
                reason: ExitReason::Manual,
            };
            match close_position(pos, fill) {
                Ok(()) => {
                    let pnl = pos.realized_pnl_pct().unwrap_or_default();
                    outcome.closed.push((id, pnl));
                }
                Err(e) => outcome.failed.push((id, e)),
            }
        }

        if !outcome.closed.is_empty() {
            self.store.save(&book, now.naive_local())?;
        }
        info!(ticker = %ticker, closed = outcome.closed.len(), "manual close");
        Ok(outcome)
    }

    // ── read-only views ──

    pub fn list(
        &self,
        mode: Option<ScanMode>,
        limit: Option<usize>,
    ) -> Result<Vec<SignatureListing>, TrackerError> {
        let book = self.store.load()?;
        let no_prices = BTreeMap::new();
        Ok(book
            .list(mode, limit)
            .into_iter()
            .map(|sig| SignatureListing {
                summary: sig.summary(&no_prices),
                signature: sig.clone(),
            })
            .collect())
    }

    /// One signature with live prices for its open positions.
    pub fn report(
        &self,
        prefix: &str,
        now: DateTime<FixedOffset>,
    ) -> Result<SignatureReport, TrackerError> {
        let book = self.store.load()?;
        let signature = book.resolve(prefix)?.clone();
        let session = self.session(now.with_timezone(&Utc));

        let tickers: Vec<&str> = signature.open_tickers();
        let (current, price_failures) = self.current_prices(&tickers, &session);
        let summary = signature.summary(&current);
        Ok(SignatureReport {
            signature,
            session,
            current,
            price_failures,
            summary,
        })
    }

    /// Every open ticker across signatures against its current price.
    pub fn live(&self, now: DateTime<FixedOffset>) -> Result<LiveView, TrackerError> {
        let book = self.store.load()?;
        let session = self.session(now.with_timezone(&Utc));
        let index = book.open_index();

        let tickers: Vec<&str> = index.keys().map(String::as_str).collect();
        let (current, price_failures) = self.current_prices(&tickers, &session);

        let rows = index
            .iter()
            .map(|(ticker, holders)| {
                let total: Decimal = holders.iter().map(|(_, p)| p.entry_price).sum();
                let avg_entry = (total / Decimal::from(holders.len() as u64)).round_dp(4);
                let current = current.get(ticker).copied();
                LiveRow {
                    ticker: ticker.clone(),
                    current,
                    open_positions: holders.len(),
                    avg_entry,
                    pnl_pct: current.map(|c| pnl_pct(avg_entry, c)),
                }
            })
            .collect();
        Ok(LiveView {
            session,
            rows,
            price_failures,
        })
    }

    /// Archived raw content of a signature.
    pub fn show(&self, prefix: &str) -> Result<ShowOutcome, TrackerError> {
        let book = self.store.load()?;
        let id = book.resolve(prefix)?.id.clone();
        let (content, truncated) = match self.store.read_raw(&id)? {
            Some(text) => {
                let (shown, truncated) = truncate_chars(&text, SHOW_LIMIT_CHARS);
                (Some(shown.to_string()), truncated)
            }
            None => (None, false),
        };
        Ok(ShowOutcome {
            signature_id: id,
            content,
            truncated,
        })
    }

    // ── destructive ──

    /// Remove a signature and its archive. Without `confirm` only resolves it.
    pub fn delete(
        &self,
        prefix: &str,
        confirm: bool,
        now: DateTime<FixedOffset>,
    ) -> Result<DeleteOutcome, TrackerError> {
        let mut book = self.store.load()?;
        let id = book.resolve(prefix)?.id.clone();
        if !confirm {
            let signature = book.get(&id).cloned().ok_or_else(|| {
                EngineError::Integrity(format!("signature {id} vanished"))
            })?;
            return Ok(DeleteOutcome {
                signature,
                deleted: false,
                raw_removed: false,
            });
        }

        let signature = book
            .remove(&id)
            .ok_or_else(|| EngineError::Integrity(format!("signature {id} vanished")))?;
        self.store.save(&book, now.naive_local())?;
        let raw_removed = self.store.remove_raw(&id)?;
        info!(id = %id, raw_removed, "signature deleted");
        Ok(DeleteOutcome {
            signature,
            deleted: true,
            raw_removed,
        })
    }

    /// Wipe the data directory. Returns whether anything was done.
    pub fn reset(&self, confirm: bool) -> Result<bool, TrackerError> {
        if !confirm {
            return Ok(false);
        }
        self.store.reset()?;
        Ok(true)
    }

    fn current_prices(
        &self,
        tickers: &[&str],
        session: &ResolvedSession,
    ) -> (BTreeMap<String, Decimal>, Vec<(String, EngineError)>) {
        let mut current = BTreeMap::new();
        let mut failures = Vec::new();
        for &ticker in tickers {
            match self.prices.quote(ticker, session, PriceBasis::Live) {
                Ok(q) => {
                    current.insert(ticker.to_string(), q.price);
                }
                Err(e) => {
                    warn!(ticker, error = %e, "no current price");
                    failures.push((ticker.to_string(), e.into_engine(ticker)));
                }
            }
        }
        (current, failures)
    }
}

/// First `limit` chars of `text`, and whether anything was cut.
fn truncate_chars(text: &str, limit: usize) -> (&str, bool) {
    match text.char_indices().nth(limit) {
        Some((at, _)) => (&text[..at], true),
        None => (text, false),
    }
}
