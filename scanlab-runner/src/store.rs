//! Durable signature store.
//!
//! Layout under the data directory:
//! - `signatures.json`: every signature in one document
//! - `runs/<YYYYMMDD>/<signature-id>.txt`: raw scan content, verbatim
//!
//! Writes are atomic: write to `.tmp`, then rename into place. A crash leaves
//! the previous document intact.

use chrono::NaiveDateTime;
use scanlab_core::domain::{Signature, SignatureId};
use scanlab_core::identity::SignatureBook;
use scanlab_core::EngineError;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::{debug, info};

pub const STORE_VERSION: u32 = 1;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("store I/O on {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("corrupt store document {path}: {detail}")]
    Corrupt { path: PathBuf, detail: String },

    #[error("unsupported store version {found} (expected {})", STORE_VERSION)]
    UnsupportedVersion { found: u32 },

    #[error(transparent)]
    Integrity(#[from] EngineError),
}

fn io_err(path: &Path) -> impl FnOnce(std::io::Error) -> StoreError + '_ {
    move |source| StoreError::Io {
        path: path.to_path_buf(),
        source,
    }
}

#[derive(Debug, Serialize, Deserialize)]
struct StoreDocument {
    version: u32,
    updated_at: Option<NaiveDateTime>,
    #[serde(default)]
    signatures: Vec<Signature>,
}

#[derive(Debug, Clone)]
pub struct SignatureStore {
    data_dir: PathBuf,
}

impl SignatureStore {
    pub fn new(data_dir: impl Into<PathBuf>) -> Self {
        Self {
            data_dir: data_dir.into(),
        }
    }

    pub fn data_dir(&self) -> &Path {
        &self.data_dir
    }

    pub fn signatures_path(&self) -> PathBuf {
        self.data_dir.join("signatures.json")
    }

    pub fn runs_dir(&self) -> PathBuf {
        self.data_dir.join("runs")
    }

    /// Where the raw content of `id` is archived.
    pub fn raw_path(&self, id: &SignatureId) -> PathBuf {
        self.runs_dir()
            .join(id.date_part())
            .join(format!("{}.txt", id.as_str()))
    }

    /// Read the whole collection. A missing document is an empty book.
    pub fn load(&self) -> Result<SignatureBook, StoreError> {
        let path = self.signatures_path();
        if !path.exists() {
            return Ok(SignatureBook::new());
        }
        let text = fs::read_to_string(&path).map_err(io_err(&path))?;
        let doc: StoreDocument =
            serde_json::from_str(&text).map_err(|e| StoreError::Corrupt {
                path: path.clone(),
                detail: e.to_string(),
            })?;
        if doc.version != STORE_VERSION {
            return Err(StoreError::UnsupportedVersion { found: doc.version });
        }
        let book = SignatureBook::from_signatures(doc.signatures)?;
        debug!(signatures = book.len(), "loaded signature store");
        Ok(book)
    }

    /// Replace the document with `book`.
    pub fn save(&self, book: &SignatureBook, updated_at: NaiveDateTime) -> Result<(), StoreError> {
        let doc = StoreDocument {
            version: STORE_VERSION,
            updated_at: Some(updated_at),
            signatures: book.iter().cloned().collect(),
        };
        let json = serde_json::to_vec_pretty(&doc).map_err(|e| StoreError::Corrupt {
            path: self.signatures_path(),
            detail: format!("serialization: {e}"),
        })?;
        write_atomic(&self.signatures_path(), &json)?;
        debug!(signatures = book.len(), "saved signature store");
        Ok(())
    }

    /// Archive raw scan content for `id`.
    pub fn write_raw(&self, id: &SignatureId, content: &[u8]) -> Result<PathBuf, StoreError> {
        let path = self.raw_path(id);
        write_atomic(&path, content)?;
        Ok(path)
    }

    /// Archived content, or `None` if it was never written or has been removed.
    pub fn read_raw(&self, id: &SignatureId) -> Result<Option<String>, StoreError> {
        let path = self.raw_path(id);
        if !path.exists() {
            return Ok(None);
        }
        let bytes = fs::read(&path).map_err(io_err(&path))?;
        Ok(Some(String::from_utf8_lossy(&bytes).into_owned()))
    }

    pub fn remove_raw(&self, id: &SignatureId) -> Result<bool, StoreError> {
        let path = self.raw_path(id);
        match fs::remove_file(&path) {
            Ok(()) => Ok(true),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(false),
            Err(source) => Err(StoreError::Io { path, source }),
        }
    }

    /// Delete everything under the data directory and recreate it empty.
    pub fn reset(&self) -> Result<(), StoreError> {
        if self.data_dir.exists() {
            fs::remove_dir_all(&self.data_dir).map_err(io_err(&self.data_dir))?;
        }
        let runs = self.runs_dir();
        fs::create_dir_all(&runs).map_err(io_err(&runs))?;
        info!(dir = %self.data_dir.display(), "store reset");
        Ok(())
    }
}

fn write_atomic(path: &Path, bytes: &[u8]) -> Result<(), StoreError> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).map_err(io_err(parent))?;
    }
    let tmp_path = path.with_extension("tmp");
    fs::write(&tmp_path, bytes).map_err(io_err(&tmp_path))?;
    fs::rename(&tmp_path, path).map_err(|source| {
        let _ = fs::remove_file(&tmp_path);
        StoreError::Io {
            path: path.to_path_buf(),
            source,
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;
    use scanlab_core::domain::{MarketStatus, ScanMode};
    use scanlab_core::identity::SignatureDraft;
    use scanlab_core::session::SessionBucket;

    fn at(h: u32) -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2025, 12, 12)
            .unwrap()
            .and_hms_opt(h, 0, 0)
            .unwrap()
    }

    fn book_with(contents: &[&str]) -> SignatureBook {
        let mut book = SignatureBook::new();
        for (i, c) in contents.iter().enumerate() {
            book.ensure(SignatureDraft {
                content: c.as_bytes(),
                mode: ScanMode::All,
                created_at: at(9 + i as u32),
                source: format!("scan{i}.txt"),
                market_status: MarketStatus {
                    bucket: SessionBucket::Intraday,
                    trading_date: at(9).date(),
                    description: "Market open - using today open".into(),
                },
            })
            .unwrap();
        }
        book
    }

    #[test]
    fn missing_document_is_empty() {
        let dir = tempfile::tempdir().unwrap();
        let store = SignatureStore::new(dir.path());
        assert!(store.load().unwrap().is_empty());
    }

    #[test]
    fn save_and_load() {
        let dir = tempfile::tempdir().unwrap();
        let store = SignatureStore::new(dir.path());
        let book = book_with(&["one", "two"]);
        store.save(&book, at(18)).unwrap();

        assert!(!store.signatures_path().with_extension("tmp").exists());
        let loaded = store.load().unwrap();
        assert_eq!(loaded.len(), 2);
        for sig in book.iter() {
            assert_eq!(loaded.get(&sig.id), Some(sig));
        }

        let raw: serde_json::Value =
            serde_json::from_str(&fs::read_to_string(store.signatures_path()).unwrap()).unwrap();
        assert_eq!(raw["version"], 1);
    }

    #[test]
    fn corrupt_and_duplicate_documents_fail() {
        let dir = tempfile::tempdir().unwrap();
        let store = SignatureStore::new(dir.path());
        fs::write(store.signatures_path(), "{not json").unwrap();
        assert!(matches!(store.load(), Err(StoreError::Corrupt { .. })));

        let book = book_with(&["one"]);
        let sig = book.iter().next().unwrap().clone();
        let doc = serde_json::json!({ "version": 1, "updated_at": null, "signatures": [sig, sig] });
        fs::write(store.signatures_path(), doc.to_string()).unwrap();
        assert!(matches!(
            store.load(),
            Err(StoreError::Integrity(EngineError::Integrity(_)))
        ));

        fs::write(store.signatures_path(), r#"{"version": 7, "signatures": []}"#).unwrap();
        assert!(matches!(store.load(), Err(StoreError::UnsupportedVersion { found: 7 })));
    }

    #[test]
    fn raw_archive_roundtrip_and_reset() {
        let dir = tempfile::tempdir().unwrap();
        let store = SignatureStore::new(dir.path().join("data"));
        let id = SignatureId("20251212_163045_a1b2c3d4".into());

        let path = store.write_raw(&id, b"STRONG BUY\nNVDA\n").unwrap();
        assert!(path.ends_with("runs/20251212/20251212_163045_a1b2c3d4.txt"));
        assert_eq!(store.read_raw(&id).unwrap().as_deref(), Some("STRONG BUY\nNVDA\n"));

        assert!(store.remove_raw(&id).unwrap());
        assert!(!store.remove_raw(&id).unwrap());
        assert_eq!(store.read_raw(&id).unwrap(), None);

        store.save(&book_with(&["x"]), at(10)).unwrap();
        store.reset().unwrap();
        assert!(store.load().unwrap().is_empty());
        assert!(store.runs_dir().is_dir());
    }
}
