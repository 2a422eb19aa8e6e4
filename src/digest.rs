//! The 160-bit content-address used to key cache entries.
//!
//! This module treats the hash function itself as a black box: anything implementing
//! SHA-1 would do, we just happen to get it from `ring` the way the rest of this crate
//! family gets its hashing from `ring::digest` (see `vocab/artifact_hash.rs` upstream).

use crate::error::{CacheIoError, Result};
use std::fmt;

pub const DIGEST_LEN: usize = 20;

/// A 20-byte content digest, bytewise-comparable, used as the cache's primary key.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Digest([u8; DIGEST_LEN]);

impl Digest {
    pub fn from_bytes(bytes: [u8; DIGEST_LEN]) -> Self {
        Digest(bytes)
    }

    pub fn as_bytes(&self) -> &[u8; DIGEST_LEN] {
        &self.0
    }

    /// Hashes `key` with SHA-1, the primitive this cache format is pinned to.
    pub fn of(key: &[u8]) -> Self {
        let digest = ring::digest::digest(&ring::digest::SHA1_FOR_LEGACY_USE_ONLY, key);
        let mut bytes = [0u8; DIGEST_LEN];
        bytes.copy_from_slice(digest.as_ref());
        Digest(bytes)
    }

    /// Parses a 40-character uppercase hex string into a digest, for the `NOHASH`
    /// open path. Matches `^[0-9A-F]{40}$` exactly; lowercase digits are rejected,
    /// not folded, since this engine never reads or writes any other case.
    pub fn from_hex(hex: &str) -> Result<Self> {
        if hex.len() != DIGEST_LEN * 2 {
            return Err(CacheIoError::InvalidArgument(format!(
                "expected a 40-character hex string, got {:?}",
                hex
            )));
        }
        let decoded = data_encoding::HEXUPPER
            .decode(hex.as_bytes())
            .map_err(|e| CacheIoError::InvalidArgument(e.to_string()))?;
        let mut bytes = [0u8; DIGEST_LEN];
        bytes.copy_from_slice(&decoded);
        Ok(Digest(bytes))
    }

    /// Renders as uppercase hex, the only case this engine ever writes to disk (see
    /// Redesign Flag 3 in SPEC_FULL.md).
    pub fn to_hex(&self) -> String {
        data_encoding::HEXUPPER.encode(&self.0)
    }

    /// A 32-bit index derived from the first four bytes, big-endian. Exposed for
    /// diagnostics and tests; the production registry is a `HashMap` and does not use
    /// this to place buckets.
    pub fn bucket_hint(&self) -> u32 {
        u32::from_be_bytes([self.0[0], self.0[1], self.0[2], self.0[3]])
    }
}

impl fmt::Debug for Digest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Digest({})", self.to_hex())
    }
}

impl fmt::Display for Digest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_hex())
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn hashes_are_stable() {
        let a = Digest::of(b"http://a/");
        let b = Digest::of(b"http://a/");
        assert_eq!(a, b);
        let c = Digest::of(b"http://b/");
        assert_ne!(a, c);
    }

    #[test]
    fn hex_round_trips_and_is_uppercase() {
        let d = Digest::of(b"http://a/");
        let hex = d.to_hex();
        assert_eq!(hex, hex.to_ascii_uppercase());
        let parsed = Digest::from_hex(&hex).unwrap();
        assert_eq!(d, parsed);
    }

    #[test]
    fn hex_parsing_rejects_lowercase() {
        let upper = "0123456789ABCDEF0123456789ABCDEF01234567";
        assert!(Digest::from_hex(upper).is_ok());
        assert!(Digest::from_hex(&upper.to_ascii_lowercase()).is_err());
    }

    #[test]
    fn hex_parsing_rejects_bad_length() {
        assert!(Digest::from_hex("01234").is_err());
        assert!(Digest::from_hex(&"0".repeat(41)).is_err());
    }

    #[test]
    fn bucket_hint_uses_first_four_bytes_big_endian() {
        let d = Digest::from_bytes([
            0x01, 0x02, 0x03, 0x04, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0,
        ]);
        assert_eq!(d.bucket_hint(), 0x01020304);
    }
}
