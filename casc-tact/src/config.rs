//! Build and CDN config parsing
//!
//! ```text
//! # Build Configuration
//!
//! root = eee756b2f8307b30bad5fd99393d03c9
//! encoding = 39135a163b3c371c3bb450fd6613f14e 688062e88dea2bf300588519f18bb363
//! build-uid = wow
//! ```
//!
//! Comments and blank lines are skipped. Values are whitespace-split; keys
//! may legitimately carry more than one value (`encoding` lists the content
//! hash and the storage key of the encoding table).

use std::collections::HashMap;
use std::io::BufRead;

use tracing::warn;

use crate::keys::CascKey;
use crate::{Error, Result};

/// A parsed key=value config file.
#[derive(Debug, Default)]
pub struct ConfigFile {
    entries: HashMap<String, Vec<String>>,
}

impl ConfigFile {
    /// Parse a config from a buffered reader.
    pub fn parse<R: BufRead>(reader: R) -> Result<Self> {
        let mut entries = HashMap::new();

        for line in reader.lines() {
            let line = line?;
            let line = line.trim();
            if line.is_empty() || line.starts_with('#') {
                continue;
            }

            let Some((key, value)) = line.split_once('=') else {
                warn!("cannot parse configuration line: {line:?}");
                return Err(Error::ConfigSyntax(line.to_string()));
            };

            entries.insert(
                key.trim().to_string(),
                value.split_whitespace().map(str::to_string).collect(),
            );
        }

        Ok(Self { entries })
    }

    /// Parse a config from a string.
    pub fn parse_str(content: &str) -> Result<Self> {
        Self::parse(content.as_bytes())
    }

    /// All values of `key`, in file order.
    pub fn values(&self, key: &str) -> Option<&[String]> {
        self.entries.get(key).map(Vec::as_slice)
    }

    /// First value of `key`.
    pub fn first(&self, key: &str) -> Option<&str> {
        self.values(key)?.first().map(String::as_str)
    }

    /// Last value of `key`.
    pub fn last(&self, key: &str) -> Option<&str> {
        self.values(key)?.last().map(String::as_str)
    }

    /// First value of `key` parsed as a hex key.
    pub fn key(&self, key: &str) -> Result<CascKey> {
        let value = self
            .first(key)
            .ok_or_else(|| Error::ConfigTypeMismatch(key.to_string()))?;
        CascKey::from_hex(value)
    }

    /// Number of keys present.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// `true` when no keys are present.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// The build config fields the container consumes, parsed eagerly.
#[derive(Debug)]
pub struct BuildConfig {
    /// Content hash of the encoding table.
    pub encoding_hash: Option<CascKey>,

    /// Storage key of the encoding table (second `encoding` value).
    pub encoding_key: Option<CascKey>,

    /// Content hash of the root file.
    pub root: Option<CascKey>,

    /// Program code selecting the filesystem resolver (`wow`, `wowt`, ...).
    pub build_uid: Option<String>,

    /// The underlying document, for fields not modeled here.
    pub raw: ConfigFile,
}

impl BuildConfig {
    /// Parse a build config document.
    pub fn parse<R: BufRead>(reader: R) -> Result<Self> {
        let raw = ConfigFile::parse(reader)?;

        let encoding_hash = match raw.first("encoding") {
            Some(v) => Some(CascKey::from_hex(v)?),
            None => None,
        };
        let encoding_key = match raw.values("encoding").and_then(|v| v.get(1)) {
            Some(v) => Some(CascKey::from_hex(v)?),
            None => None,
        };
        let root = match raw.first("root") {
            Some(v) => Some(CascKey::from_hex(v)?),
            None => None,
        };
        let build_uid = raw.first("build-uid").map(str::to_string);

        Ok(Self {
            encoding_hash,
            encoding_key,
            root,
            build_uid,
            raw,
        })
    }

    /// Parse from a string.
    pub fn parse_str(content: &str) -> Result<Self> {
        Self::parse(content.as_bytes())
    }

    /// The encoding-table storage key, required.
    pub fn require_encoding_key(&self) -> Result<&CascKey> {
        self.encoding_key
            .as_ref()
            .ok_or_else(|| Error::ConfigTypeMismatch("encoding".to_string()))
    }
}
