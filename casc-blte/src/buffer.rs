//! Demand-decoded view over a BLTE frame
//!
//! The buffer parses and verifies the frame once, then serves reads over
//! the *decoded* byte range through a small window so that seek-heavy
//! access patterns do not repeat decompression.

use md5::Context as Md5Hasher;
use tracing::{debug, warn};

use crate::handler::{ChunkHandler, make_handler};
use crate::header::{DataHeader, FrameHeader};
use crate::{BlockSource, DATA_HEADER_SIZE, Error, Result};

/// Decode window size, in bytes.
pub const WINDOW_SIZE: usize = 4096;

const HASH_BLOCK: usize = 8192;

struct Chunk {
    logical_begin: u64,
    logical_end: u64,
    /// `true` when the logical range comes from the outer data header
    /// rather than a block table; such a range is nominal and the decoded
    /// payload may end short of it.
    nominal: bool,
    handler: Box<dyn ChunkHandler>,
}

/// A verified BLTE frame with positioned chunk decoders.
///
/// All offsets in the read API are positions in the decoded output.
pub struct BlteBuffer {
    chunks: Vec<Chunk>,
    length: u64,
    window: Vec<u8>,
    window_begin: u64,
}

impl BlteBuffer {
    /// Open a record stored in a `data.NNN` file: a 30-byte outer data
    /// header followed by the BLTE frame. The source window must span the
    /// whole record.
    pub fn open_record(source: &BlockSource) -> Result<Self> {
        Self::open_with_header(source, None)
    }

    /// Like [`BlteBuffer::open_record`], additionally checking that the MD5
    /// of the full on-disk record starts with `expected_key`.
    pub fn open_record_verified(source: &BlockSource, expected_key: &[u8]) -> Result<Self> {
        Self::open_with_header(source, Some(expected_key))
    }

    /// Open a raw BLTE frame with no outer data header.
    pub fn open_frame(source: &BlockSource) -> Result<Self> {
        let header = FrameHeader::parse(source, 0)?;

        if header.header_size == 0 {
            let source = source.slice(8, source.len())?;
            return Self::assemble_single(&source, None);
        }

        Self::assemble_table(source, u64::from(header.header_size), &header)
    }

    fn open_with_header(source: &BlockSource, expected_key: Option<&[u8]>) -> Result<Self> {
        let data_header = DataHeader::parse(&source.get_exact(0, DATA_HEADER_SIZE as usize)?)?;
        let record_size = u64::from(data_header.size);

        if record_size > source.len() || record_size < DATA_HEADER_SIZE + 8 {
            return Err(Error::Truncated {
                expected: record_size as usize,
                actual: source.len() as usize,
            });
        }
        let source = source.slice(0, record_size)?;

        if let Some(key) = expected_key {
            verify_record_key(&source, key)?;
        }

        let header = FrameHeader::parse(&source, DATA_HEADER_SIZE)?;
        debug!(
            "record: {record_size} bytes, header size {}, {} table entries",
            header.header_size,
            header.chunks.len()
        );

        if header.header_size == 0 {
            // Single chunk: the outer checksum covers the 8-byte prefix and
            // the whole payload, and the logical size is the outer header's
            // record size.
            let payload = source.slice(DATA_HEADER_SIZE + 8, record_size)?;

            let mut hasher = Md5Hasher::new();
            hasher.consume(source.get_exact(DATA_HEADER_SIZE, 8)?);
            hasher.consume(payload.get(0, payload.len() as usize)?);
            check_digest(hasher.finalize().into(), data_header.checksum, "data header")?;

            return Self::assemble_single(&payload, Some(record_size));
        }

        check_digest(header.header_md5, data_header.checksum, "data header")?;

        Self::assemble_table(
            &source,
            DATA_HEADER_SIZE + u64::from(header.header_size),
            &header,
        )
    }

    /// Build the chunk list for a frame with a block table. `payload_base`
    /// is the offset of the first chunk's mode byte within `source`.
    fn assemble_table(
        source: &BlockSource,
        payload_base: u64,
        header: &FrameHeader,
    ) -> Result<Self> {
        let mut chunks = Vec::with_capacity(header.chunks.len());
        let mut physical = payload_base;
        let mut logical = 0u64;

        for record in &header.chunks {
            let size = u64::from(record.compressed_size);
            if size == 0 {
                return Err(Error::Truncated {
                    expected: 1,
                    actual: 0,
                });
            }

            let on_disk = source.get_exact(physical, size as usize)?;
            check_digest(md5::compute(&on_disk).0, record.checksum, "chunk")?;

            let payload = source.slice(physical + 1, physical + size)?;
            let handler = make_handler(
                on_disk[0],
                payload,
                Some(u64::from(record.decompressed_size)),
            )?;

            let logical_end = logical + u64::from(record.decompressed_size);
            chunks.push(Chunk {
                logical_begin: logical,
                logical_end,
                nominal: false,
                handler,
            });

            logical = logical_end;
            physical += size;
        }

        Ok(Self {
            chunks,
            length: logical,
            window: Vec::new(),
            window_begin: 0,
        })
    }

    /// Build the single-chunk fast path. `payload` spans the mode byte and
    /// the chunk body. `declared_size` is the outer header's record size
    /// when one is present; it is the reported logical size, and the
    /// decoded payload may end short of it. Raw frames carry no size
    /// field, so their length is the handler's decoded length.
    fn assemble_single(payload: &BlockSource, declared_size: Option<u64>) -> Result<Self> {
        let mode = payload.get_exact(0, 1)?[0];
        let body = payload.slice(1, payload.len())?;
        let handler = make_handler(mode, body, declared_size)?;

        let length = declared_size.unwrap_or_else(|| handler.logical_size());
        Ok(Self {
            chunks: vec![Chunk {
                logical_begin: 0,
                logical_end: length,
                nominal: declared_size.is_some(),
                handler,
            }],
            length,
            window: Vec::new(),
            window_begin: 0,
        })
    }

    /// Logical length of the frame. For single-chunk records this is the
    /// outer header's record size; reads may end short of it, at the
    /// decoded payload.
    pub fn len(&self) -> u64 {
        self.length
    }

    /// `true` if the frame decodes to nothing.
    pub fn is_empty(&self) -> bool {
        self.length == 0
    }

    /// Read decoded bytes starting at `offset` into `buf`, returning the
    /// number of bytes read. Short reads only happen at the decoded EOF.
    pub fn read_at(&mut self, offset: u64, buf: &mut [u8]) -> Result<usize> {
        if offset >= self.length || buf.is_empty() {
            return Ok(0);
        }

        let mut done = 0;
        let mut pos = offset;

        while done < buf.len() && pos < self.length {
            if !self.window_covers(pos) {
                self.fill_window(pos)?;
                if !self.window_covers(pos) {
                    // Decoded EOF short of the nominal length.
                    break;
                }
            }

            let window_offset = (pos - self.window_begin) as usize;
            let take = (self.window.len() - window_offset).min(buf.len() - done);

            buf[done..done + take]
                .copy_from_slice(&self.window[window_offset..window_offset + take]);
            done += take;
            pos += take as u64;
        }

        Ok(done)
    }

    fn window_covers(&self, offset: u64) -> bool {
        offset >= self.window_begin && offset < self.window_begin + self.window.len() as u64
    }

    /// Refill the decode window to start at `offset`, concatenating decoded
    /// slices across as many chunks as the window spans.
    fn fill_window(&mut self, offset: u64) -> Result<()> {
        let want = WINDOW_SIZE.min((self.length - offset) as usize);
        let mut out = Vec::with_capacity(want);
        let mut pos = offset;

        while out.len() < want {
            let index = self
                .chunks
                .partition_point(|c| c.logical_end <= pos);
            let chunk = self.chunks.get_mut(index).ok_or(Error::OutOfRange {
                offset: pos,
                length: self.length,
            })?;

            let within = pos - chunk.logical_begin;
            let take = ((chunk.logical_end - pos) as usize).min(want - out.len());
            let decoded = chunk.handler.decode(within, take)?;

            if decoded.len() != take {
                // A table-listed chunk must decode to its declared size; a
                // nominal range just ran past the decoded payload.
                if !chunk.nominal {
                    return Err(Error::Truncated {
                        expected: take,
                        actual: decoded.len(),
                    });
                }
                out.extend_from_slice(&decoded);
                break;
            }

            out.extend_from_slice(&decoded);
            pos += take as u64;
        }

        self.window = out;
        self.window_begin = offset;
        Ok(())
    }
}

fn check_digest(actual: [u8; 16], expected: [u8; 16], context: &'static str) -> Result<()> {
    if actual != expected {
        warn!(
            "{context} MD5 mismatch: {} != {}",
            hex::encode(actual),
            hex::encode(expected)
        );
        return Err(Error::ChecksumMismatch {
            context,
            expected: hex::encode(expected),
            actual: hex::encode(actual),
        });
    }
    Ok(())
}

/// Check that MD5 of the whole on-disk record starts with `expected_key`.
fn verify_record_key(source: &BlockSource, expected_key: &[u8]) -> Result<()> {
    let mut hasher = Md5Hasher::new();
    let mut pos = 0u64;

    while pos < source.len() {
        let block = source.get(pos, HASH_BLOCK)?;
        if block.is_empty() {
            break;
        }
        pos += block.len() as u64;
        hasher.consume(&block);
    }

    let digest: [u8; 16] = hasher.finalize().into();
    if !digest.starts_with(expected_key) {
        return Err(Error::ChecksumMismatch {
            context: "record key",
            expected: hex::encode(expected_key),
            actual: hex::encode(&digest[..expected_key.len().min(16)]),
        });
    }

    Ok(())
}
