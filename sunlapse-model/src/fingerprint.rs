use serde::{Deserialize, Deserializer, Serialize, Serializer};
use sha2::{Digest, Sha256};
use std::fmt;

use crate::error::ModelError;

/// 128-bit content fingerprint of a raw upstream body.
///
/// The leading 16 bytes of the SHA-256 digest; wide enough that a collision
/// between distinct frames inside one 56-day window is not a practical
/// concern, narrow enough to keep the manifest compact.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Fingerprint([u8; 16]);

impl Fingerprint {
    pub fn of(bytes: &[u8]) -> Self {
        let digest = Sha256::digest(bytes);
        let mut out = [0u8; 16];
        out.copy_from_slice(&digest[..16]);
        Self(out)
    }

    pub fn as_bytes(&self) -> &[u8; 16] {
        &self.0
    }

    pub fn to_hex(&self) -> String {
        let mut hex = String::with_capacity(32);
        for byte in self.0 {
            use std::fmt::Write;
            let _ = write!(hex, "{byte:02x}");
        }
        hex
    }

    pub fn parse_hex(hex: &str) -> Result<Self, ModelError> {
        if hex.len() != 32 {
            return Err(ModelError::InvalidFingerprint(format!(
                "expected 32 hex chars, got {}",
                hex.len()
            )));
        }
        let mut out = [0u8; 16];
        for (i, chunk) in hex.as_bytes().chunks(2).enumerate() {
            let pair = std::str::from_utf8(chunk).map_err(|_| {
                ModelError::InvalidFingerprint("non-ascii input".into())
            })?;
            out[i] = u8::from_str_radix(pair, 16).map_err(|_| {
                ModelError::InvalidFingerprint(format!("bad hex pair {pair:?}"))
            })?;
        }
        Ok(Self(out))
    }
}

impl fmt::Display for Fingerprint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_hex())
    }
}

impl fmt::Debug for Fingerprint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Fingerprint({})", self.to_hex())
    }
}

impl Serialize for Fingerprint {
    fn serialize<S: Serializer>(
        &self,
        serializer: S,
    ) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_hex())
    }
}

impl<'de> Deserialize<'de> for Fingerprint {
    fn deserialize<D: Deserializer<'de>>(
        deserializer: D,
    ) -> Result<Self, D::Error> {
        let hex = String::deserialize(deserializer)?;
        Fingerprint::parse_hex(&hex).map_err(serde::de::Error::custom)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hex_round_trips() {
        let fp = Fingerprint::of(b"solar wind");
        let parsed = Fingerprint::parse_hex(&fp.to_hex()).unwrap();
        assert_eq!(fp, parsed);
    }

    #[test]
    fn distinct_bodies_distinct_prints() {
        assert_ne!(Fingerprint::of(b"a"), Fingerprint::of(b"b"));
    }

    #[test]
    fn rejects_malformed_hex() {
        assert!(Fingerprint::parse_hex("short").is_err());
        assert!(
            Fingerprint::parse_hex(
                "zzzzzzzzzzzzzzzzzzzzzzzzzzzzzzzz"
            )
            .is_err()
        );
    }
}
