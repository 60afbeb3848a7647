//! Content-addressed signature identity and the in-memory signature book.
//!
//! - `content_hash`: BLAKE3 over the raw scan bytes and the mode tag.
//! - `SignatureBook`: every signature keyed by ID, indexed by full digest.
//!
//! The full digest is the identity key. The 8-hex suffix in the ID is for
//! display, so two scans that share a prefix but differ in content stay distinct
//! unless they also land in the same second, which is an integrity error.

use crate::domain::{
    ContentHash, MarketStatus, Position, ScanMode, Signature, SignatureId,
};
use crate::error::EngineError;
use chrono::NaiveDateTime;
use std::collections::{BTreeMap, HashMap};
use thiserror::Error;

/// Digest of (content, mode). Same bytes under two modes give two digests.
pub fn content_hash(content: &[u8], mode: ScanMode) -> ContentHash {
    let mut hasher = blake3::Hasher::new();
    hasher.update(content);
    hasher.update(b":");
    hasher.update(mode.as_str().as_bytes());
    ContentHash::from_hex(hasher.finalize().to_hex().as_str())
}

/// Everything needed to create a signature the first time its content is seen.
#[derive(Debug, Clone)]
pub struct SignatureDraft<'a> {
    pub content: &'a [u8],
    pub mode: ScanMode,
    pub created_at: NaiveDateTime,
    pub source: String,
    pub market_status: MarketStatus,
}

/// Result of `SignatureBook::ensure`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Ensured {
    pub id: SignatureId,
    pub is_new: bool,
}

/// Failure to address a signature by (partial) ID.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum LookupError {
    #[error("no signature matches '{0}'")]
    NoMatch(String),

    #[error("'{prefix}' matches {} signatures", .candidates.len())]
    Ambiguous {
        prefix: String,
        candidates: Vec<SignatureId>,
    },
}

#[derive(Debug, Clone, Default)]
pub struct SignatureBook {
    signatures: BTreeMap<SignatureId, Signature>,
    by_hash: HashMap<ContentHash, SignatureId>,
}

impl SignatureBook {
    pub fn new() -> Self {
        Self::default()
    }

    /// Rebuild a book from stored records, rejecting anything that breaks
    /// identity: duplicate IDs, duplicate digests, or an ID whose suffix was not
    /// derived from its digest.
    pub fn from_signatures(
        signatures: impl IntoIterator<Item = Signature>,
    ) -> Result<Self, EngineError> {
        let mut book = Self::new();
        for sig in signatures {
            if !sig.id.matches_hash(&sig.content_hash) {
                return Err(EngineError::Integrity(format!(
                    "signature {} does not match its content hash {}",
                    sig.id, sig.content_hash
                )));
            }
            book.insert(sig)?;
        }
        Ok(book)
    }

    /// Insert a complete record. Fails on an ID or digest collision.
    pub fn insert(&mut self, sig: Signature) -> Result<(), EngineError> {
        if self.signatures.contains_key(&sig.id) {
            return Err(EngineError::Integrity(format!(
                "duplicate signature id {}",
                sig.id
            )));
        }
        if let Some(existing) = self.by_hash.get(&sig.content_hash) {
            return Err(EngineError::Integrity(format!(
                "signatures {existing} and {} share content hash {}",
                sig.id, sig.content_hash
            )));
        }
        self.by_hash.insert(sig.content_hash.clone(), sig.id.clone());
        self.signatures.insert(sig.id.clone(), sig);
        Ok(())
    }

    /// Look up the signature for a (content, mode) pair, creating an empty one
    /// if the digest has never been seen. An existing signature is returned
    /// untouched.
    pub fn ensure(&mut self, draft: SignatureDraft<'_>) -> Result<Ensured, EngineError> {
        let hash = content_hash(draft.content, draft.mode);
        if let Some(id) = self.by_hash.get(&hash) {
            return Ok(Ensured {
                id: id.clone(),
                is_new: false,
            });
        }

        let id = SignatureId::new(draft.created_at, &hash);
        if let Some(other) = self.signatures.get(&id) {
            return Err(EngineError::Integrity(format!(
                "signature id {id} already belongs to content {}",
                other.content_hash
            )));
        }

        self.insert(Signature {
            id: id.clone(),
            content_hash: hash,
            mode: draft.mode,
            created_at: draft.created_at,
            source: draft.source,
            market_status: draft.market_status,
            positions: BTreeMap::new(),
        })?;
        Ok(Ensured { id, is_new: true })
    }

    pub fn get(&self, id: &SignatureId) -> Option<&Signature> {
        self.signatures.get(id)
    }

    /// Mutable access for position changes. Identity fields must not be edited.
    pub fn get_mut(&mut self, id: &SignatureId) -> Option<&mut Signature> {
        self.signatures.get_mut(id)
    }

    pub fn get_by_hash(&self, hash: &ContentHash) -> Option<&Signature> {
        self.by_hash.get(hash).and_then(|id| self.signatures.get(id))
    }

    /// Exact ID, or the single ID starting with `prefix`.
    pub fn resolve(&self, prefix: &str) -> Result<&Signature, LookupError> {
        if let Some(sig) = self.signatures.get(&SignatureId(prefix.to_string())) {
            return Ok(sig);
        }
        let matches: Vec<&Signature> = self
            .signatures
            .values()
            .filter(|s| s.id.as_str().starts_with(prefix))
            .collect();
        match matches.as_slice() {
            [] => Err(LookupError::NoMatch(prefix.to_string())),
            [one] => Ok(*one),
            many => Err(LookupError::Ambiguous {
                prefix: prefix.to_string(),
                candidates: many.iter().map(|s| s.id.clone()).collect(),
            }),
        }
    }

    pub fn remove(&mut self, id: &SignatureId) -> Option<Signature> {
        let sig = self.signatures.remove(id)?;
        self.by_hash.remove(&sig.content_hash);
        Some(sig)
    }

    /// Newest first, optionally restricted to one mode.
    pub fn list(&self, mode: Option<ScanMode>, limit: Option<usize>) -> Vec<&Signature> {
        let mut out: Vec<&Signature> = self
            .signatures
            .values()
            .filter(|s| mode.map_or(true, |m| s.mode == m))
            .collect();
        out.sort_by(|a, b| b.created_at.cmp(&a.created_at).then_with(|| b.id.cmp(&a.id)));
        if let Some(limit) = limit {
            out.truncate(limit);
        }
        out
    }

    /// Ticker → every open position holding it, with its signature.
    pub fn open_index(&self) -> BTreeMap<String, Vec<(&SignatureId, &Position)>> {
        let mut index: BTreeMap<String, Vec<(&SignatureId, &Position)>> = BTreeMap::new();
        for sig in self.signatures.values() {
            for pos in sig.open_positions() {
                index
                    .entry(pos.ticker.clone())
                    .or_default()
                    .push((&sig.id, pos));
            }
        }
        index
    }

    pub fn iter(&self) -> impl Iterator<Item = &Signature> {
        self.signatures.values()
    }

    pub fn iter_mut(&mut self) -> impl Iterator<Item = &mut Signature> {
        self.signatures.values_mut()
    }

    pub fn len(&self) -> usize {
        self.signatures.len()
    }

    pub fn is_empty(&self) -> bool {
        self.signatures.is_empty()
    }

    pub fn into_signatures(self) -> Vec<Signature> {
        self.signatures.into_values().collect()
    }
}
