//! Tracker commands against a temp data directory and fixed prices.

use chrono::{DateTime, FixedOffset, NaiveDate, TimeZone};
use rust_decimal::Decimal;
use scanlab_core::data::FixedPriceProvider;
use scanlab_core::domain::{CostBasisRecord, CostBasisTable, ExitReason, ScanMode};
use scanlab_core::reconcile::ReconcileMode;
use scanlab_core::scan::MemorySellZone;
use scanlab_core::EngineError;
use scanlab_runner::{AppConfig, Outcome, SellZoneFile, Tracker, TrackerError};
use tempfile::TempDir;

const SCAN: &str = "\
🟢🟢 STRONG BUY
NVDA
AAPL
BADX
⚡ EARLY BUY
PLTR
🔴 SELL ZONE
TSLA
";

fn day(d: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(2025, 6, d).unwrap()
}

/// Eastern daylight time wall clock.
fn et(d: u32, h: u32) -> DateTime<FixedOffset> {
    FixedOffset::west_opt(4 * 3600)
        .unwrap()
        .with_ymd_and_hms(2025, 6, d, h, 0, 0)
        .unwrap()
}

fn prices() -> FixedPriceProvider {
    FixedPriceProvider::new()
        .with_daily("NVDA", day(10), Decimal::from(100), Decimal::from(101))
        .with_daily("NVDA", day(11), Decimal::from(95), Decimal::from(90))
        .with_daily("AAPL", day(10), Decimal::from(200), Decimal::from(202))
        .with_daily("PLTR", day(10), Decimal::from(50), Decimal::from(51))
        .with_current("AAPL", Decimal::from(205), day(12))
        .with_current("PLTR", Decimal::from(55), day(12))
}

fn tracker(dir: &TempDir) -> Tracker {
    let config = AppConfig {
        data_dir: dir.path().join("data"),
        ..AppConfig::default()
    };
    Tracker::new(config, Box::new(prices())).unwrap()
}

#[test]
fn process_is_idempotent_and_partial() {
    let dir = tempfile::tempdir().unwrap();
    let t = tracker(&dir);

    let first = t.process_scan(SCAN.as_bytes(), "scan.txt", ScanMode::Strong, et(10, 11)).unwrap();
    assert!(first.is_new);
    assert_eq!(first.ingest.added, ["NVDA", "AAPL"]);
    assert_eq!(first.ingest.failed.len(), 1);
    assert_eq!(first.ingest.failed[0].0, "BADX");
    assert_eq!(first.counts().succeeded, 2);
    assert_eq!(first.counts().skipped, 1);
    assert!(first.signature_id.as_str().starts_with("20250610_110000_"));
    assert!(first.raw_path.as_ref().unwrap().exists());

    let before = t.store().load().unwrap();
    let again = t.process_scan(SCAN.as_bytes(), "renamed.txt", ScanMode::Strong, et(10, 15)).unwrap();
    assert!(!again.is_new);
    assert_eq!(again.signature_id, first.signature_id);
    let after = t.store().load().unwrap();
    assert_eq!(after.get(&first.signature_id), before.get(&first.signature_id));

    let all = t.process_scan(SCAN.as_bytes(), "scan.txt", ScanMode::All, et(10, 12)).unwrap();
    assert!(all.is_new);
    assert_ne!(all.signature_id, first.signature_id);
    assert_eq!(all.ingest.added, ["NVDA", "AAPL", "PLTR"]);
    assert_eq!(t.list(None, None).unwrap().len(), 2);
    assert_eq!(t.list(Some(ScanMode::All), None).unwrap().len(), 1);
}

#[test]
fn sells_preview_then_commit() {
    let dir = tempfile::tempdir().unwrap();
    let t = tracker(&dir);
    let strong = t.process_scan(SCAN.as_bytes(), "scan.txt", ScanMode::Strong, et(10, 11)).unwrap();
    let all = t.process_scan(SCAN.as_bytes(), "scan.txt", ScanMode::All, et(10, 12)).unwrap();

    let zone = MemorySellZone::new(["nvda", "MSFT"]);
    let mut basis = CostBasisTable::new();
    basis.insert(
        "NVDA",
        CostBasisRecord {
            current_value: Decimal::from(90),
            cost_basis: Decimal::from(150),
            account_count: 1,
        },
    );

    // Wednesday after the close: exits use that day's close
    let preview = t
        .check_sells(&zone, Some(&basis), ReconcileMode::Preview, et(11, 17))
        .unwrap();
    assert_eq!(preview.rows.len(), 2);
    for row in &preview.rows {
        assert_eq!(row.signal_pnl_pct, Decimal::from(-10));
        assert_eq!(row.actual.as_ref().unwrap().pnl_pct, Decimal::from(-40));
    }
    assert_eq!(preview.untracked, ["MSFT"]);
    let book = t.store().load().unwrap();
    assert!(book.get(&strong.signature_id).unwrap().has_open("NVDA"));

    let commit = t
        .check_sells(&zone, Some(&basis), ReconcileMode::Commit, et(11, 17))
        .unwrap();
    assert_eq!(commit.counts().succeeded, 2);
    let book = t.store().load().unwrap();
    for id in [&strong.signature_id, &all.signature_id] {
        let pos = book.get(id).unwrap().position("NVDA").unwrap();
        assert_eq!(pos.realized_pnl_pct(), Some(Decimal::from(-10)));
        assert_eq!(pos.exit().unwrap().reason, ExitReason::SellSignal);
        assert_eq!(pos.exit().unwrap().date, day(11));
    }
}

#[test]
fn scanner_failure_leaves_store_untouched() {
    let dir = tempfile::tempdir().unwrap();
    let t = tracker(&dir);
    t.process_scan(SCAN.as_bytes(), "scan.txt", ScanMode::Strong, et(10, 11)).unwrap();
    let before = std::fs::read(t.store().signatures_path()).unwrap();

    let zone = SellZoneFile::new(dir.path().join("missing.html"));
    let err = t
        .check_sells(&zone, None, ReconcileMode::Commit, et(11, 17))
        .unwrap_err();
    assert!(matches!(err, TrackerError::Engine(EngineError::Collaborator(_))));
    assert_eq!(std::fs::read(t.store().signatures_path()).unwrap(), before);
}

#[test]
fn manual_close_by_signature_and_everywhere() {
    let dir = tempfile::tempdir().unwrap();
    let t = tracker(&dir);
    let strong = t.process_scan(SCAN.as_bytes(), "scan.txt", ScanMode::Strong, et(10, 11)).unwrap();
    let all = t.process_scan(SCAN.as_bytes(), "scan.txt", ScanMode::All, et(10, 12)).unwrap();

    let prefix = &strong.signature_id.as_str()[..20];
    let one = t
        .close_ticker("aapl", Some(prefix), Some(Decimal::from(210)), et(12, 11))
        .unwrap();
    assert_eq!(one.closed, [(strong.signature_id.clone(), Decimal::from(5))]);

    let again = t.close_ticker("AAPL", Some(prefix), None, et(12, 11));
    assert!(matches!(again, Err(TrackerError::NothingToClose { .. })));

    // Remaining holder closes at the live price
    let rest = t.close_ticker("AAPL", None, None, et(12, 11)).unwrap();
    assert_eq!(rest.closed, [(all.signature_id.clone(), Decimal::new(25, 1))]);

    let book = t.store().load().unwrap();
    let exit = book.get(&all.signature_id).unwrap().position("AAPL").unwrap().exit().unwrap().clone();
    assert_eq!(exit.reason, ExitReason::Manual);
    assert_eq!(exit.price, Decimal::from(205));

    assert!(matches!(
        t.close_ticker("ZZZZ", None, None, et(12, 11)),
        Err(TrackerError::NothingToClose { .. })
    ));
}

#[test]
fn report_and_live_use_current_prices() {
    let dir = tempfile::tempdir().unwrap();
    let t = tracker(&dir);
    let all = t.process_scan(SCAN.as_bytes(), "scan.txt", ScanMode::All, et(10, 12)).unwrap();

    let report = t.report(&all.signature_id.as_str()[..8], et(12, 11)).unwrap();
    assert_eq!(report.summary.open, 3);
    assert_eq!(report.summary.unpriced, 1);
    assert_eq!(report.price_failures.len(), 1);
    assert_eq!(report.price_failures[0].0, "NVDA");
    // AAPL 200 → 205 and PLTR 50 → 55
    assert_eq!(report.summary.unrealized_pnl_pct, Decimal::new(125, 1));

    let live = t.live(et(12, 11)).unwrap();
    assert_eq!(live.rows.len(), 3);
    let pltr = live.rows.iter().find(|r| r.ticker == "PLTR").unwrap();
    assert_eq!(pltr.pnl_pct, Some(Decimal::from(10)));
    assert_eq!(pltr.open_positions, 1);
}

#[test]
fn show_delete_and_reset() {
    let dir = tempfile::tempdir().unwrap();
    let t = tracker(&dir);
    let strong = t.process_scan(SCAN.as_bytes(), "scan.txt", ScanMode::Strong, et(10, 11)).unwrap();
    t.process_scan(SCAN.as_bytes(), "scan.txt", ScanMode::All, et(10, 12)).unwrap();
    let id = strong.signature_id.as_str();

    let shown = t.show(id).unwrap();
    assert_eq!(shown.content.as_deref(), Some(SCAN));
    assert!(!shown.truncated);

    // Both signatures share the date prefix
    assert!(matches!(t.show("20250610"), Err(TrackerError::Lookup(_))));

    let preview = t.delete(id, false, et(10, 13)).unwrap();
    assert!(!preview.deleted);
    assert_eq!(t.list(None, None).unwrap().len(), 2);

    let deleted = t.delete(id, true, et(10, 13)).unwrap();
    assert!(deleted.deleted && deleted.raw_removed);
    assert_eq!(t.list(None, None).unwrap().len(), 1);
    assert!(matches!(t.show(id), Err(TrackerError::Lookup(_))));

    assert!(!t.reset(false).unwrap());
    assert_eq!(t.list(None, None).unwrap().len(), 1);
    assert!(t.reset(true).unwrap());
    assert!(t.list(None, None).unwrap().is_empty());
}

#[test]
fn commit_with_nothing_open_is_still_a_commit() {
    let dir = tempfile::tempdir().unwrap();
    let t = tracker(&dir);
    let zone = MemorySellZone::new(["NVDA"]);

    let report = t
        .check_sells(&zone, None, ReconcileMode::Commit, et(11, 17))
        .unwrap();
    assert_eq!(report.mode, ReconcileMode::Commit);
    assert!(report.rows.is_empty() && report.closed.is_empty());
    assert_eq!(report.counts().succeeded, 0);

    let preview = t
        .check_sells(&zone, None, ReconcileMode::Preview, et(11, 17))
        .unwrap();
    assert_eq!(preview.mode, ReconcileMode::Preview);
}
