//! ScanLab Runner — command orchestration on top of `scanlab-core`.
//!
//! - TOML configuration passed explicitly to every component
//! - Durable signature store (atomic JSON document + raw scan archive)
//! - Scanner-output parser and the scanner bridge (subprocess or saved file)
//! - `Tracker`: one method per command, each a single load → compute → save

pub mod config;
pub mod parser;
pub mod scanner;
pub mod store;
pub mod tracker;

pub use config::{AppConfig, ConfigError, MarketConfig, PricesConfig, ScannerConfig};
pub use parser::ScanOutputParser;
pub use scanner::{ScannerProcess, SellZoneFile};
pub use store::{SignatureStore, StoreError, STORE_VERSION};
pub use tracker::{
    CloseOutcome, DeleteOutcome, LiveRow, LiveView, Outcome, OutcomeCounts, ProcessOutcome,
    ShowOutcome, SignatureListing, SignatureReport, Tracker, TrackerError, SHOW_LIMIT_CHARS,
};
