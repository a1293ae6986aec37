//! Error types for CASC storage operations

use std::io;
use std::path::PathBuf;

use thiserror::Error;

#[derive(Error, Debug)]
pub enum CascError {
    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    #[error("File does not exist: {}", .0.display())]
    FileNotFound(PathBuf),

    #[error("No index entry for storage key {0}")]
    KeyNotFound(String),

    #[error("No encoding entry for content hash {0}")]
    HashNotFound(String),

    #[error("No file named {0:?} in this archive")]
    FilenameNotFound(String),

    #[error("No filesystem resolver registered for product {0:?}")]
    UnsupportedProduct(String),

    #[error("Invalid index format: {0}")]
    InvalidIndexFormat(String),

    #[error("Index {context} hash mismatch: expected {expected:#010x}, got {actual:#010x}")]
    IndexHashMismatch {
        context: &'static str,
        expected: u32,
        actual: u32,
    },

    #[error("Invalid shadow memory format: {0}")]
    InvalidShmemFormat(String),

    #[error("Field value {value} does not fit in {bits} bits")]
    FieldOverflow { value: u64, bits: u8 },

    #[error("No free space for {requested} bytes, largest extent is {available}")]
    NoFreeSpace { requested: u64, available: u64 },

    #[error("BLTE error: {0}")]
    Blte(#[from] casc_blte::Error),

    #[error("Format error: {0}")]
    Tact(#[from] casc_tact::Error),
}

pub type Result<T> = std::result::Result<T, CascError>;
