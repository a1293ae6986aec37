//! Parsers for the text and table formats that surround CASC storage
//!
//! Local archives are described by a handful of small formats: the
//! `.build.info` table at the installation root, key=value build and CDN
//! configs filed under hashed paths, the encoding table mapping content
//! hashes to storage keys, and the encoding-profile strings embedded in
//! that table. This crate parses all of them.

pub mod build_info;
pub mod config;
pub mod encoding;
pub mod espec;
pub mod keys;

mod error;

pub use build_info::BuildInfo;
pub use config::{BuildConfig, ConfigFile};
pub use encoding::{EncodingEntry, EncodingTable};
pub use error::{Error, Result};
pub use keys::CascKey;
