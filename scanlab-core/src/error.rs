//! Engine error taxonomy.
//!
//! Per-item failures (`NotFound`) are collected and reported next to the
//! successful results. `Integrity` and `Collaborator` abort the current command
//! before anything is persisted.

use thiserror::Error;

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum EngineError {
    /// No price or quote for a ticker at the requested date/basis.
    #[error("not found: {ticker}: {detail}")]
    NotFound { ticker: String, detail: String },

    /// Illegal lifecycle transition.
    #[error("invalid state: {0}")]
    InvalidState(String),

    /// Identity collision or corrupted store record.
    #[error("integrity error: {0}")]
    Integrity(String),

    /// Scanner invocation or parser failure.
    #[error("collaborator failure: {0}")]
    Collaborator(String),
}

impl EngineError {
    pub fn not_found(ticker: impl Into<String>, detail: impl Into<String>) -> Self {
        Self::NotFound {
            ticker: ticker.into(),
            detail: detail.into(),
        }
    }

    /// Whether this error must abort the whole command.
    pub fn is_fatal(&self) -> bool {
        matches!(self, Self::Integrity(_) | Self::Collaborator(_))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fatality_follows_taxonomy() {
        assert!(!EngineError::not_found("AAPL", "no bar").is_fatal());
        assert!(!EngineError::InvalidState("closed".into()).is_fatal());
        assert!(EngineError::Integrity("dup".into()).is_fatal());
        assert!(EngineError::Collaborator("scanner".into()).is_fatal());
    }

    #[test]
    fn not_found_display_names_ticker() {
        let err = EngineError::not_found("MSFT", "no bar on 2025-01-03");
        assert_eq!(err.to_string(), "not found: MSFT: no bar on 2025-01-03");
    }
}
