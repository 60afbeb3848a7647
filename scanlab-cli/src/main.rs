//! ScanLab CLI — record scanner runs and track how their signals perform.
//!
//! Commands:
//! - `process` — record a scan file as a signature and open its positions
//! - `signatures` — list signatures, newest first
//! - `report` — one signature with live prices
//! - `check-sells` — match open positions against the scanner's sell zone
//! - `live` — every open ticker against its current price
//! - `close` — close a ticker by hand
//! - `show` — print a signature's archived scan
//! - `delete` / `reset` — remove data (preview unless `--confirm`)

use anyhow::{bail, Context, Result};
use chrono::{DateTime, FixedOffset, Local, Utc};
use clap::{Parser, Subcommand};
use rust_decimal::Decimal;
use scanlab_core::data::{CostBasisSource, CsvCostBasis};
use scanlab_core::domain::{PositionStatus, ScanMode};
use scanlab_core::reconcile::{ReconcileMode, SellReport};
use scanlab_core::scan::SellZoneSource;
use scanlab_runner::{AppConfig, Outcome, SellZoneFile, Tracker, TrackerError};
use std::path::{Path, PathBuf};
use tracing::{debug, info};
use tracing_subscriber::EnvFilter;

const DEFAULT_CONFIG: &str = "scanlab.toml";

#[derive(Parser)]
#[command(
    name = "scanlab",
    about = "ScanLab — signal-batch tracking for scanner output"
)]
struct Cli {
    /// TOML config file. Defaults to ./scanlab.toml when present.
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Log progress to stderr.
    #[arg(long, short, global = true, default_value_t = false)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Record a scanner output file and open positions for its tickers.
    Process {
        /// Scanner output (HTML report or console text).
        file: PathBuf,

        /// Which sections open positions: strong, early, all, dividend.
        #[arg(long, short, default_value = "all")]
        mode: ScanMode,
    },
    /// List signatures, newest first.
    Signatures {
        #[arg(long, short)]
        mode: Option<ScanMode>,

        #[arg(long)]
        limit: Option<usize>,
    },
    /// Show one signature's positions with current prices.
    Report {
        /// Signature ID or unique prefix.
        signature: String,
    },
    /// Match open positions against the scanner's sell zone.
    CheckSells {
        /// Read the sell zone from a saved scanner output instead of running it.
        #[arg(long)]
        from_file: Option<PathBuf>,

        /// Close matched positions (without this flag, only previews).
        #[arg(long, default_value_t = false)]
        commit: bool,

        /// Cost-basis CSV. Overrides `positions_file` from config.
        #[arg(long)]
        positions: Option<PathBuf>,
    },
    /// Every open ticker across signatures against its current price.
    Live,
    /// Close a ticker by hand.
    Close {
        ticker: String,

        /// Only in this signature (ID or unique prefix).
        #[arg(long)]
        signature: Option<String>,

        /// Exit price. Defaults to the live price.
        #[arg(long)]
        price: Option<Decimal>,
    },
    /// Print a signature's archived scan content.
    Show {
        signature: String,
    },
    /// Delete a signature and its archived scan.
    Delete {
        signature: String,

        /// Actually delete (without this flag, only previews).
        #[arg(long, default_value_t = false)]
        confirm: bool,
    },
    /// Remove all signatures and archives.
    Reset {
        /// Actually delete (without this flag, only previews).
        #[arg(long, default_value_t = false)]
        confirm: bool,
    },
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    let config = load_config(cli.config.as_deref())?;
    debug!(data_dir = %config.data_dir.display(), "configuration loaded");
    let tracker = Tracker::with_yahoo(config)?;
    let now = Local::now().fixed_offset();
    debug!(session = %tracker.session(now.with_timezone(&Utc)).description(), "market session");

    match cli.command {
        Commands::Process { file, mode } => run_process(&tracker, &file, mode, now),
        Commands::Signatures { mode, limit } => run_signatures(&tracker, mode, limit),
        Commands::Report { signature } => run_report(&tracker, &signature, now),
        Commands::CheckSells {
            from_file,
            commit,
            positions,
        } => run_check_sells(&tracker, from_file, commit, positions, now),
        Commands::Live => run_live(&tracker, now),
        Commands::Close {
            ticker,
            signature,
            price,
        } => run_close(&tracker, &ticker, signature.as_deref(), price, now),
        Commands::Show { signature } => run_show(&tracker, &signature),
        Commands::Delete { signature, confirm } => run_delete(&tracker, &signature, confirm, now),
        Commands::Reset { confirm } => run_reset(&tracker, confirm),
    }
}

fn init_logging(verbose: bool) {
    let default = if verbose { "info" } else { "warn" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

fn load_config(path: Option<&Path>) -> Result<AppConfig> {
    match path {
        Some(path) => {
            info!(path = %path.display(), "loading config");
            AppConfig::from_file(path)
                .with_context(|| format!("loading config {}", path.display()))
        }
        None if Path::new(DEFAULT_CONFIG).exists() => {
            info!(path = DEFAULT_CONFIG, "loading config");
            AppConfig::from_file(Path::new(DEFAULT_CONFIG))
                .with_context(|| format!("loading config {DEFAULT_CONFIG}"))
        }
        None => {
            debug!("no config file; using defaults");
            Ok(AppConfig::default())
        }
    }
}

fn run_process(tracker: &Tracker, file: &Path, mode: ScanMode, now: DateTime<FixedOffset>) -> Result<()> {
    let outcome = tracker.process_file(file, mode, now)?;

    println!();
    println!("Signature:      {}", outcome.signature_id);
    println!("Mode:           {mode}");
    println!("Session:        {}", outcome.session.description());
    if !outcome.is_new {
        println!("Already processed; nothing changed.");
        return Ok(());
    }
    println!("Positions:      {}", outcome.counts());
    for ticker in &outcome.ingest.added {
        println!("  + {ticker}");
    }
    for (ticker, err) in &outcome.ingest.failed {
        println!("  ! {ticker}: {err}");
    }
    if let Some(path) = &outcome.raw_path {
        println!("Archived to:    {}", path.display());
    }
    Ok(())
}

fn run_signatures(tracker: &Tracker, mode: Option<ScanMode>, limit: Option<usize>) -> Result<()> {
    let listings = tracker.list(mode, limit)?;
    if listings.is_empty() {
        println!("No signatures.");
        return Ok(());
    }
    println!(
        "{:<26} {:<9} {:<20} {:>5} {:>6} {:>10}  {}",
        "ID", "Mode", "Created", "Open", "Closed", "Realized", "Source"
    );
    println!("{}", "-".repeat(100));
    for l in &listings {
        let s = &l.signature;
        println!(
            "{:<26} {:<9} {:<20} {:>5} {:>6} {:>9.2}%  {}",
            s.id.as_str(),
            s.mode.as_str(),
            s.created_at.format("%Y-%m-%d %H:%M:%S").to_string(),
            l.summary.open,
            l.summary.closed,
            l.summary.realized_pnl_pct,
            s.source
        );
    }
    Ok(())
}

fn run_report(tracker: &Tracker, prefix: &str, now: DateTime<FixedOffset>) -> Result<()> {
    let report = tracker.report(prefix, now)?;
    let sig = &report.signature;
    let s = &report.summary;

    println!();
    println!("=== Signature {} ===", sig.id);
    println!("Mode:           {}", sig.mode);
    println!("Created:        {}", sig.created_at);
    println!("Source:         {}", sig.source);
    println!("At creation:    {}", sig.market_status.description);
    println!("Now:            {}", report.session.description());
    println!();
    println!(
        "{:<8} {:<10} {:>10} {:<11} {:>10} {:>9}  {}",
        "Ticker", "Section", "Entry", "Entry Date", "Exit/Now", "P&L", "Status"
    );
    println!("{}", "-".repeat(80));
    for pos in sig.positions.values() {
        let (price, pnl, status) = match &pos.status {
            PositionStatus::Closed(exit) => (
                Some(exit.price),
                Some(exit.realized_pnl_pct),
                format!("closed {} ({})", exit.date, exit.reason.label()),
            ),
            PositionStatus::Open => {
                let current = report.current.get(&pos.ticker).copied();
                (current, current.and_then(|c| pos.unrealized_pnl_pct(c)), "open".to_string())
            }
        };
        println!(
            "{:<8} {:<10} {:>10.2} {:<11} {:>10} {:>9}  {}",
            pos.ticker,
            pos.section.label(),
            pos.entry_price,
            pos.entry_date.to_string(),
            price.map_or_else(|| "-".into(), |p| format!("{p:.2}")),
            pnl.map_or_else(|| "-".into(), |p| format!("{p:.2}%")),
            status
        );
    }
    println!();
    println!("--- Summary ---");
    println!("Positions:      {} ({} open, {} closed)", s.total, s.open, s.closed);
    println!("Wins/Losses:    {}/{}", s.wins, s.losses);
    if let Some(rate) = s.win_rate() {
        println!("Win Rate:       {rate:.1}%");
    }
    println!("Realized:       {:.2}%", s.realized_pnl_pct);
    println!("Unrealized:     {:.2}%", s.unrealized_pnl_pct);
    println!("Total:          {:.2}%", s.total_pnl_pct());
    for (ticker, err) in &report.price_failures {
        println!("WARNING: {ticker}: {err}");
    }
    Ok(())
}

fn run_check_sells(
    tracker: &Tracker,
    from_file: Option<PathBuf>,
    commit: bool,
    positions: Option<PathBuf>,
    now: DateTime<FixedOffset>,
) -> Result<()> {
    let zone: Box<dyn SellZoneSource> = match from_file {
        Some(path) => Box::new(SellZoneFile::new(path)),
        None => Box::new(tracker.scanner()),
    };
    let cost_basis: Option<CsvCostBasis> = positions
        .map(CsvCostBasis::new)
        .or_else(|| tracker.configured_cost_basis());
    let mode = if commit {
        ReconcileMode::Commit
    } else {
        ReconcileMode::Preview
    };

    let report = tracker.check_sells(
        zone.as_ref(),
        cost_basis.as_ref().map(|c| c as &dyn CostBasisSource),
        mode,
        now,
    )?;
    print_sell_report(&report);
    Ok(())
}

fn print_sell_report(report: &SellReport) {
    if report.is_empty() {
        println!("No open positions in the sell zone.");
    } else {
        println!(
            "{:<8} {:<26} {:>10} {:>10} {:>9} {:>9} {:>12}",
            "Ticker", "Signature", "Entry", "Exit", "Signal", "Actual", "Cost Basis"
        );
        println!("{}", "-".repeat(90));
        for row in &report.rows {
            println!(
                "{:<8} {:<26} {:>10.2} {:>10.2} {:>8.2}% {:>9} {:>12}",
                row.ticker,
                row.signature_id.as_str(),
                row.entry_price,
                row.exit.price,
                row.signal_pnl_pct,
                row.actual
                    .as_ref()
                    .map_or_else(|| "-".into(), |a| format!("{:.2}%", a.pnl_pct)),
                row.actual
                    .as_ref()
                    .map_or_else(|| "-".into(), |a| format!("{:.2}", a.cost_basis)),
            );
        }
    }
    for (ticker, err) in &report.price_failures {
        println!("SKIPPED: {ticker}: {err}");
    }
    if !report.untracked.is_empty() {
        println!("Not tracked: {}", report.untracked.join(", "));
    }
    println!();
    match report.mode {
        ReconcileMode::Preview if !report.rows.is_empty() => {
            println!("Preview: {}. Pass --commit to close.", report.counts());
        }
        ReconcileMode::Preview => {}
        ReconcileMode::Commit => {
            for (id, ticker, err) in &report.close_failures {
                println!("FAILED: {ticker} in {id}: {err}");
            }
            println!("Closed: {}", report.counts());
        }
    }
}

fn run_live(tracker: &Tracker, now: DateTime<FixedOffset>) -> Result<()> {
    let view = tracker.live(now)?;
    if view.rows.is_empty() {
        println!("No open positions.");
        return Ok(());
    }
    println!("Session: {}", view.session.description());
    println!();
    println!(
        "{:<8} {:>10} {:>6} {:>10} {:>9}",
        "Ticker", "Current", "Open", "Avg Entry", "P&L"
    );
    println!("{}", "-".repeat(47));
    for row in &view.rows {
        println!(
            "{:<8} {:>10} {:>6} {:>10.2} {:>9}",
            row.ticker,
            row.current.map_or_else(|| "-".into(), |p| format!("{p:.2}")),
            row.open_positions,
            row.avg_entry,
            row.pnl_pct.map_or_else(|| "-".into(), |p| format!("{p:.2}%")),
        );
    }
    if let Some(avg) = view.weighted_pnl_pct() {
        println!();
        println!("Weighted average: {avg:.2}%");
    }
    for (ticker, err) in &view.price_failures {
        println!("WARNING: {ticker}: {err}");
    }
    Ok(())
}

fn run_close(
    tracker: &Tracker,
    ticker: &str,
    signature: Option<&str>,
    price: Option<Decimal>,
    now: DateTime<FixedOffset>,
) -> Result<()> {
    if price.is_some_and(|p| p <= Decimal::ZERO) {
        bail!("--price must be positive");
    }
    let outcome = match tracker.close_ticker(ticker, signature, price, now) {
        Err(TrackerError::NothingToClose { ticker }) => bail!("{ticker} is not open in any matching signature"),
        other => other?,
    };
    println!(
        "Exit {} at {:.2} ({} {})",
        outcome.ticker,
        outcome.exit.price,
        outcome.exit.basis.label(),
        outcome.exit.date
    );
    for (id, pnl) in &outcome.closed {
        println!("  closed in {id}: {pnl:.2}%");
    }
    for (id, err) in &outcome.failed {
        println!("  FAILED in {id}: {err}");
    }
    println!("{}", outcome.counts());
    Ok(())
}

fn run_show(tracker: &Tracker, prefix: &str) -> Result<()> {
    let shown = tracker.show(prefix)?;
    match shown.content {
        Some(content) => {
            println!("{content}");
            if shown.truncated {
                println!();
                println!("... (truncated at {} characters)", scanlab_runner::SHOW_LIMIT_CHARS);
            }
        }
        None => println!("No archived content for {}.", shown.signature_id),
    }
    Ok(())
}

fn run_delete(tracker: &Tracker, prefix: &str, confirm: bool, now: DateTime<FixedOffset>) -> Result<()> {
    let outcome = tracker.delete(prefix, confirm, now)?;
    let sig = &outcome.signature;
    println!(
        "Signature {} ({}, {} positions, created {})",
        sig.id,
        sig.mode,
        sig.positions.len(),
        sig.created_at
    );
    if outcome.deleted {
        println!("Deleted.");
    } else {
        println!("Dry run — pass --confirm to actually delete.");
    }
    Ok(())
}

fn run_reset(tracker: &Tracker, confirm: bool) -> Result<()> {
    let dir = tracker.config().data_dir.display().to_string();
    if tracker.reset(confirm)? {
        println!("Reset {dir}.");
    } else {
        println!("Would remove every signature under {dir}.");
        println!("Dry run — pass --confirm to actually delete.");
    }
    Ok(())
}
