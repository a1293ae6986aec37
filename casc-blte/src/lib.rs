//! BLTE (Block Table Encoded) chunk codec
//!
//! BLTE is the chunked wrapper format around every file stored in a CASC
//! archive. A frame carries an MD5-verified block table and a sequence of
//! chunks, each with its own encoding mode (plain, zlib, encrypted).
//!
//! This crate parses and verifies frames, decodes chunks on demand behind a
//! small seek-friendly window, and can assemble complete records for the
//! write path.

mod buffer;
mod compress;
mod error;
mod handler;
mod header;
mod source;
mod stream;

pub use buffer::{BlteBuffer, WINDOW_SIZE};
pub use compress::{ChunkPlan, build_record, build_record_planned, build_single_record, encode_chunk};
pub use error::{Error, Result};
pub use handler::{ChunkHandler, EncodingMode, make_handler};
pub use header::{ChunkRecord, DataHeader, FrameHeader, TABLE_MARKER};
pub use source::BlockSource;
pub use stream::BlteStream;

/// BLTE magic bytes (`0x45544C42` as a little-endian u32).
pub const BLTE_MAGIC: [u8; 4] = *b"BLTE";

/// Size of the outer data header in `data.NNN` files.
pub const DATA_HEADER_SIZE: u64 = 30;

pub(crate) const MD5_LENGTH: usize = 16;

/// An MD5 digest.
pub type Md5 = [u8; MD5_LENGTH];
