use thiserror::Error;

/// Result type for format parsing operations
pub type Result<T> = std::result::Result<T, Error>;

#[derive(Error, Debug)]
pub enum Error {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Invalid signature: expected {expected:#06x}, got {actual:#06x}")]
    InvalidSignature { expected: u16, actual: u16 },

    #[error("Config parser syntax error: {0}")]
    ConfigSyntax(String),

    #[error("Config parameter type mismatch for {0:?}")]
    ConfigTypeMismatch(String),

    #[error("Invalid hex string: {0:?}")]
    InvalidHex(String),

    #[error("Key width mismatch: expected {expected} bytes, got {actual}")]
    KeyWidth { expected: usize, actual: usize },

    #[error("Checksum mismatch in {context}: expected {expected}, got {actual}")]
    ChecksumMismatch {
        context: &'static str,
        expected: String,
        actual: String,
    },

    #[error("No encoding entry for content hash {0}")]
    HashNotFound(String),

    #[error("Encoding page table {table} is not sorted by first hash")]
    UnsortedPages { table: char },

    #[error("Truncated data: expected {expected} bytes, got {actual}")]
    Truncated { expected: usize, actual: usize },

    #[error("Encoding profile syntax error at offset {position}: {reason}")]
    ProfileSyntax { position: usize, reason: String },
}
