//! Error types for BLTE parsing and decoding

use thiserror::Error;

/// Result type for BLTE operations
pub type Result<T> = std::result::Result<T, Error>;

/// BLTE error types
#[derive(Error, Debug)]
pub enum Error {
    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Invalid BLTE magic bytes
    #[error("Invalid BLTE magic: expected \"BLTE\", got {0:02x?}")]
    InvalidMagic([u8; 4]),

    /// Invalid header size field
    #[error("Invalid header size: {0}")]
    InvalidHeaderSize(u32),

    /// The block table did not start with the `0x0F` marker
    #[error("Invalid block table marker: {0:#04x}")]
    InvalidTableMarker(u8),

    /// Encoding mode byte is not part of the format
    #[error("Unknown encoding mode: {0:#04x}")]
    UnknownMode(u8),

    /// Encoding mode is recognized but has no decoder
    #[error("Unsupported encoding mode: {0:#04x}")]
    UnsupportedMode(u8),

    /// A computed MD5 digest does not match the stored one
    #[error("Checksum mismatch in {context}: expected {expected}, got {actual}")]
    ChecksumMismatch {
        context: &'static str,
        expected: String,
        actual: String,
    },

    /// Fewer bytes available than the format requires
    #[error("Truncated data: expected {expected} bytes, got {actual}")]
    Truncated { expected: usize, actual: usize },

    /// Read offset outside the source window
    #[error("Offset {offset} is out of range, window is {length} bytes")]
    OutOfRange { offset: u64, length: u64 },

    /// Decompression failed
    #[error("Decompression failed: {0}")]
    DecompressionFailed(String),

    /// A chunk plan does not cover its input
    #[error("Chunk plan covers {covered} of {total} bytes")]
    PlanMismatch { covered: u64, total: u64 },
}

impl From<Error> for std::io::Error {
    fn from(e: Error) -> Self {
        match e {
            Error::Io(inner) => inner,
            other => Self::new(std::io::ErrorKind::InvalidData, other),
        }
    }
}
