//! Hex identity keys
//!
//! The container formats address files by fixed-width byte strings in two
//! widths: 16-byte content hashes (MD5 of the logical content) and 9-byte
//! storage keys (leading bytes of the MD5 of the on-disk record). Widths
//! are carried dynamically; mixing them is surfaced, never truncated away.

use std::fmt;
use std::str::FromStr;

use crate::{Error, Result};

/// Width of a content hash in bytes.
pub const CONTENT_KEY_WIDTH: usize = 16;

/// Width of a storage key in bytes.
pub const STORAGE_KEY_WIDTH: usize = 9;

/// An immutable byte-string identifier with a lowercase hex rendering and
/// byte-lexicographic order.
#[derive(Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct CascKey(Vec<u8>);

impl CascKey {
    /// Build a key from raw bytes.
    pub fn from_bytes(bytes: &[u8]) -> Self {
        Self(bytes.to_vec())
    }

    /// Parse an even-length hex string.
    pub fn from_hex(s: &str) -> Result<Self> {
        let bytes = hex::decode(s).map_err(|_| Error::InvalidHex(s.to_string()))?;
        Ok(Self(bytes))
    }

    /// The key bytes.
    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    /// Width of the key in bytes.
    pub fn width(&self) -> usize {
        self.0.len()
    }

    /// `true` for the zero-width key.
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Lowercase hex rendering.
    pub fn to_hex(&self) -> String {
        hex::encode(&self.0)
    }

    /// The leading `width` bytes as a new key.
    pub fn truncated(&self, width: usize) -> Self {
        Self(self.0[..width.min(self.0.len())].to_vec())
    }

    /// The storage-key prefix (leading 9 bytes) of this key.
    pub fn storage_prefix(&self) -> Self {
        self.truncated(STORAGE_KEY_WIDTH)
    }

    /// Width-checked equality. Comparing keys of differing widths is an
    /// error rather than an implicit prefix match.
    pub fn matches(&self, other: &Self) -> Result<bool> {
        if self.width() != other.width() {
            return Err(Error::KeyWidth {
                expected: self.width(),
                actual: other.width(),
            });
        }
        Ok(self == other)
    }

    /// Require this key to have exactly `width` bytes.
    pub fn expect_width(&self, width: usize) -> Result<&Self> {
        if self.width() != width {
            return Err(Error::KeyWidth {
                expected: width,
                actual: self.width(),
            });
        }
        Ok(self)
    }
}

impl fmt::Display for CascKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for byte in &self.0 {
            write!(f, "{byte:02x}")?;
        }
        Ok(())
    }
}

impl fmt::Debug for CascKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "CascKey({self})")
    }
}

impl FromStr for CascKey {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        Self::from_hex(s)
    }
}

impl From<[u8; CONTENT_KEY_WIDTH]> for CascKey {
    fn from(bytes: [u8; CONTENT_KEY_WIDTH]) -> Self {
        Self(bytes.to_vec())
    }
}

impl From<[u8; STORAGE_KEY_WIDTH]> for CascKey {
    fn from(bytes: [u8; STORAGE_KEY_WIDTH]) -> Self {
        Self(bytes.to_vec())
    }
}
