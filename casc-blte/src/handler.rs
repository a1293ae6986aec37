//! Per-mode chunk decoders
//!
//! Every chunk in a BLTE frame starts with a one-byte encoding mode tag.
//! A handler wraps the chunk's payload window (the bytes after the tag) and
//! serves decoded bytes on demand.

use std::io::Read;

use flate2::read::ZlibDecoder;
use tracing::trace;

use crate::{BlockSource, Error, Result};

/// BLTE chunk encoding modes
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EncodingMode {
    /// Plain bytes (`N`)
    None,
    /// ZLib-compressed (`Z`)
    ZLib,
    /// Encrypted (`E`); recognized but not decodable
    Encrypted,
    /// Nested BLTE frame (`F`); recognized but not decodable
    Frame,
}

impl EncodingMode {
    /// Map a mode tag byte to its mode.
    pub const fn from_byte(byte: u8) -> Option<Self> {
        match byte {
            b'N' => Some(Self::None),
            b'Z' => Some(Self::ZLib),
            b'E' => Some(Self::Encrypted),
            b'F' => Some(Self::Frame),
            _ => None,
        }
    }

    /// The on-disk tag byte for this mode.
    pub const fn as_byte(self) -> u8 {
        match self {
            Self::None => b'N',
            Self::ZLib => b'Z',
            Self::Encrypted => b'E',
            Self::Frame => b'F',
        }
    }
}

/// Decoder for a single chunk.
///
/// `decode` returns up to `count` decoded bytes from decoded offset
/// `offset`, clamped to [`ChunkHandler::logical_size`]. Implementations may
/// cache the decoded chunk; repeated small reads must not repeat expensive
/// decompression.
pub trait ChunkHandler {
    /// The encoding mode this handler decodes.
    fn mode(&self) -> EncodingMode;

    /// Decoded byte count of this chunk.
    fn logical_size(&self) -> u64;

    /// Return decoded bytes `[offset, offset + count)`, clamped to the
    /// logical size.
    fn decode(&mut self, offset: u64, count: usize) -> Result<Vec<u8>>;
}

/// Build the handler for a chunk.
///
/// `payload` is the chunk's byte window excluding the mode tag.
/// `logical_size` comes from the block table, or from the outer data
/// header for single-chunk records; raw single-chunk frames pass `None`
/// and the handler derives it from the payload.
pub fn make_handler(
    mode_byte: u8,
    payload: BlockSource,
    logical_size: Option<u64>,
) -> Result<Box<dyn ChunkHandler>> {
    let mode = EncodingMode::from_byte(mode_byte).ok_or(Error::UnknownMode(mode_byte))?;

    Ok(match mode {
        EncodingMode::None => Box::new(PlainHandler { payload }),
        EncodingMode::ZLib => Box::new(ZLibHandler::new(payload, logical_size)?),
        EncodingMode::Encrypted | EncodingMode::Frame => Box::new(OpaqueHandler {
            mode,
            logical: logical_size.unwrap_or_else(|| payload.len()),
        }),
    })
}

/// Mode `N`: the payload is the decoded data.
struct PlainHandler {
    payload: BlockSource,
}

impl ChunkHandler for PlainHandler {
    fn mode(&self) -> EncodingMode {
        EncodingMode::None
    }

    fn logical_size(&self) -> u64 {
        self.payload.len()
    }

    fn decode(&mut self, offset: u64, count: usize) -> Result<Vec<u8>> {
        if offset >= self.payload.len() {
            return Ok(Vec::new());
        }
        self.payload.get(offset, count)
    }
}

/// Mode `Z`: the payload is a zlib stream, inflated once and cached.
struct ZLibHandler {
    payload: BlockSource,
    logical: u64,
    cache: Option<Vec<u8>>,
}

impl ZLibHandler {
    fn new(payload: BlockSource, logical_size: Option<u64>) -> Result<Self> {
        let mut handler = Self {
            payload,
            logical: 0,
            cache: None,
        };

        match logical_size {
            Some(size) => handler.logical = size,
            None => {
                // Without a block table there is no declared decoded size;
                // inflate up front so the stream length is exact.
                handler.logical = handler.inflate()?.len() as u64;
            }
        }

        Ok(handler)
    }

    fn inflate(&mut self) -> Result<&[u8]> {
        if self.cache.is_none() {
            let compressed = self.payload.get(0, self.payload.len() as usize)?;
            trace!("inflating {} byte chunk", compressed.len());

            let mut decoder = ZlibDecoder::new(compressed.as_slice());
            let mut out = Vec::new();
            decoder
                .read_to_end(&mut out)
                .map_err(|e| Error::DecompressionFailed(format!("zlib inflate failed: {e}")))?;

            self.cache = Some(out);
        }

        Ok(self.cache.as_deref().unwrap_or_default())
    }
}

impl ChunkHandler for ZLibHandler {
    fn mode(&self) -> EncodingMode {
        EncodingMode::ZLib
    }

    fn logical_size(&self) -> u64 {
        self.logical
    }

    fn decode(&mut self, offset: u64, count: usize) -> Result<Vec<u8>> {
        let logical = self.logical;
        let data = self.inflate()?;

        let end = (data.len() as u64).min(logical);
        if offset >= end {
            return Ok(Vec::new());
        }

        let start = offset as usize;
        let stop = (offset + count as u64).min(end) as usize;
        Ok(data[start..stop].to_vec())
    }
}

/// Modes `E` and `F`: presence is tolerated, decoding is not.
struct OpaqueHandler {
    mode: EncodingMode,
    logical: u64,
}

impl ChunkHandler for OpaqueHandler {
    fn mode(&self) -> EncodingMode {
        self.mode
    }

    fn logical_size(&self) -> u64 {
        self.logical
    }

    fn decode(&mut self, _offset: u64, _count: usize) -> Result<Vec<u8>> {
        Err(Error::UnsupportedMode(self.mode.as_byte()))
    }
}
