use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};
use std::fmt;

const HASH_PREFIX: &str = "blake3:";
const SHORT_LEN: usize = 8;

/// Full content digest of (raw scan bytes, mode tag), e.g. `blake3:9f2c…`.
///
/// This is the identity comparison key. The 8-hex suffix in `SignatureId`
/// is display only.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ContentHash(pub String);

impl ContentHash {
    pub fn from_hex(hex: &str) -> Self {
        Self(format!("{HASH_PREFIX}{hex}"))
    }

    /// Hex digest without the algorithm prefix.
    pub fn hex(&self) -> &str {
        self.0.strip_prefix(HASH_PREFIX).unwrap_or(&self.0)
    }

    /// First 8 hex characters, used in the signature ID.
    pub fn short(&self) -> &str {
        let hex = self.hex();
        &hex[..hex.len().min(SHORT_LEN)]
    }
}

impl fmt::Display for ContentHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Signature ID: `<YYYYMMDD>_<HHMMSS>_<8-hex-digest>`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SignatureId(pub String);

impl SignatureId {
    pub fn new(created_at: NaiveDateTime, hash: &ContentHash) -> Self {
        Self(format!(
            "{}_{}",
            created_at.format("%Y%m%d_%H%M%S"),
            hash.short()
        ))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// The `YYYYMMDD` date component.
    pub fn date_part(&self) -> &str {
        self.0.split('_').next().unwrap_or("")
    }

    /// The digest suffix after the second underscore.
    pub fn digest_part(&self) -> &str {
        self.0.splitn(3, '_').nth(2).unwrap_or("")
    }

    /// Whether this ID was derived from the given digest.
    pub fn matches_hash(&self, hash: &ContentHash) -> bool {
        self.digest_part() == hash.short()
    }
}

impl fmt::Display for SignatureId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    fn at(h: u32, m: u32, s: u32) -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2025, 12, 12)
            .unwrap()
            .and_hms_opt(h, m, s)
            .unwrap()
    }

    #[test]
    fn signature_id_format() {
        let hash = ContentHash::from_hex("a1b2c3d4e5f60718293a4b5c6d7e8f90");
        let id = SignatureId::new(at(16, 30, 45), &hash);
        assert_eq!(id.as_str(), "20251212_163045_a1b2c3d4");
        assert_eq!(id.date_part(), "20251212");
        assert_eq!(id.digest_part(), "a1b2c3d4");
        assert!(id.matches_hash(&hash));
    }

    #[test]
    fn content_hash_strips_prefix() {
        let hash = ContentHash::from_hex("deadbeefcafe");
        assert_eq!(hash.0, "blake3:deadbeefcafe");
        assert_eq!(hash.hex(), "deadbeefcafe");
        assert_eq!(hash.short(), "deadbeef");
    }

    #[test]
    fn ids_serialize_as_plain_strings() {
        let id = SignatureId("20250101_000000_00000000".into());
        assert_eq!(
            serde_json::to_string(&id).unwrap(),
            "\"20250101_000000_00000000\""
        );
    }
}
