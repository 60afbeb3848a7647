//! ScanLab Core — signatures, market sessions, position lifecycle, sell reconciliation.
//!
//! This crate contains the engine that tracks scanner signal batches:
//! - Domain types (signatures, positions, cost-basis records)
//! - Market session resolution against an exchange calendar
//! - Content-addressed signature identity and the in-memory signature book
//! - Open → Closed position state machine and P&L arithmetic
//! - Cross-signature sell reconciliation
//! - Collaborator traits (prices, scan parsing, sell zones, cost basis)

pub mod data;
pub mod domain;
pub mod error;
pub mod identity;
pub mod ingest;
pub mod lifecycle;
pub mod reconcile;
pub mod scan;
pub mod session;

pub use error::EngineError;

#[cfg(test)]
mod tests {
    use super::*;

    /// Compile-time check: all domain types are Send + Sync so the runner can
    /// hold them behind shared references without a retrofit.
    #[allow(dead_code)]
    fn assert_send_sync() {
        fn require_send<T: Send>() {}
        fn require_sync<T: Sync>() {}

        require_send::<domain::Signature>();
        require_sync::<domain::Signature>();
        require_send::<domain::Position>();
        require_sync::<domain::Position>();
        require_send::<domain::SignatureId>();
        require_sync::<domain::SignatureId>();
        require_send::<domain::ContentHash>();
        require_sync::<domain::ContentHash>();
        require_send::<domain::CostBasisRecord>();
        require_sync::<domain::CostBasisRecord>();

        require_send::<identity::SignatureBook>();
        require_sync::<identity::SignatureBook>();
        require_send::<session::ResolvedSession>();
        require_sync::<session::ResolvedSession>();
        require_send::<session::UsEquityCalendar>();
        require_sync::<session::UsEquityCalendar>();
        require_send::<reconcile::SellReport>();
        require_sync::<reconcile::SellReport>();
        require_send::<ingest::IngestReport>();
        require_sync::<ingest::IngestReport>();
    }

    /// Architecture contract: price providers are usable as trait objects.
    #[test]
    fn price_provider_is_object_safe() {
        fn _check(provider: &dyn data::PriceProvider) -> &str {
            provider.name()
        }
    }
}
