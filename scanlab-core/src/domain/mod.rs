//! Domain types for ScanLab

pub mod cost_basis;
pub mod ids;
pub mod mode;
pub mod position;
pub mod signature;

pub use cost_basis::{CostBasisRecord, CostBasisTable};
pub use ids::{ContentHash, SignatureId};
pub use mode::{ParseModeError, ScanMode, Section};
pub use position::{ExitReason, ExitRecord, Position, PositionStatus, PriceBasis};
pub use signature::{MarketStatus, Signature};

/// Canonical ticker form: trimmed, uppercase.
pub fn normalize_ticker(raw: &str) -> String {
    raw.trim().to_ascii_uppercase()
}
