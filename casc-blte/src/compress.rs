//! BLTE record assembly (write path)
//!
//! Builds complete on-disk records: encoded chunks, block table, inner
//! header and the 30-byte outer data header with its reversed MD5.

use std::io::Write;

use byteorder::{BigEndian, ByteOrder};
use flate2::Compression;
use flate2::write::ZlibEncoder;
use md5::Context as Md5Hasher;

use crate::header::{DataHeader, TABLE_MARKER};
use crate::{BLTE_MAGIC, DATA_HEADER_SIZE, EncodingMode, Error, Result};

/// Encode one chunk to its on-disk form: mode tag followed by the encoded
/// payload.
pub fn encode_chunk(data: &[u8], mode: EncodingMode) -> Result<Vec<u8>> {
    match mode {
        EncodingMode::None => {
            let mut out = Vec::with_capacity(data.len() + 1);
            out.push(mode.as_byte());
            out.extend_from_slice(data);
            Ok(out)
        }
        EncodingMode::ZLib => {
            let mut encoder = ZlibEncoder::new(Vec::new(), Compression::default());
            encoder.write_all(data)?;
            let compressed = encoder.finish()?;

            let mut out = Vec::with_capacity(compressed.len() + 1);
            out.push(mode.as_byte());
            out.extend_from_slice(&compressed);
            Ok(out)
        }
        EncodingMode::Encrypted | EncodingMode::Frame => {
            Err(Error::UnsupportedMode(mode.as_byte()))
        }
    }
}

/// Build a complete data record from `data`, split into logical chunks of
/// `chunk_size` bytes, each encoded with `mode`.
pub fn build_record(data: &[u8], chunk_size: usize, mode: EncodingMode) -> Result<Vec<u8>> {
    if chunk_size == 0 {
        return Err(Error::Truncated {
            expected: 1,
            actual: 0,
        });
    }

    let mut encoded = Vec::new();
    let mut logical_sizes = Vec::new();
    for chunk in data.chunks(chunk_size) {
        encoded.push(encode_chunk(chunk, mode)?);
        logical_sizes.push(chunk.len() as u32);
    }
    if encoded.is_empty() {
        encoded.push(encode_chunk(&[], mode)?);
        logical_sizes.push(0);
    }

    assemble_record(&encoded, &logical_sizes)
}

/// Assemble encoded chunks into a record: block table, inner header and
/// the outer data header.
fn assemble_record(encoded: &[Vec<u8>], logical_sizes: &[u32]) -> Result<Vec<u8>> {
    let header_size = 8 + 4 + 24 * encoded.len() as u32;
    let payload_size: usize = encoded.iter().map(Vec::len).sum();
    let record_size = DATA_HEADER_SIZE as u32 + header_size + payload_size as u32;

    // Inner header: signature, size, table marker, 24-bit count, entries.
    let mut inner = Vec::with_capacity(header_size as usize);
    inner.extend_from_slice(&BLTE_MAGIC);
    inner.extend_from_slice(&header_size.to_be_bytes());
    inner.push(TABLE_MARKER);

    let mut count = [0u8; 4];
    BigEndian::write_u32(&mut count, encoded.len() as u32);
    inner.extend_from_slice(&count[1..4]);

    for (chunk, logical) in encoded.iter().zip(logical_sizes) {
        inner.extend_from_slice(&(chunk.len() as u32).to_be_bytes());
        inner.extend_from_slice(&logical.to_be_bytes());
        inner.extend_from_slice(&md5::compute(chunk).0);
    }

    let data_header = DataHeader {
        checksum: md5::compute(&inner).0,
        size: record_size,
    };

    let mut record = Vec::with_capacity(record_size as usize);
    record.extend_from_slice(&data_header.to_bytes());
    record.extend_from_slice(&inner);
    for chunk in encoded {
        record.extend_from_slice(chunk);
    }

    Ok(record)
}

/// One planned chunk of a record: how many logical bytes it takes and the
/// mode that encodes them.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChunkPlan {
    /// Logical bytes this entry covers.
    pub size: u64,
    /// `true` when the entry repeats until the input is consumed.
    pub wildcard: bool,
    /// Encoding mode for the covered chunks.
    pub mode: EncodingMode,
}

/// Build a complete data record following a chunk plan, the shape an
/// encoding profile prescribes. The plan must cover all of `data`.
pub fn build_record_planned(data: &[u8], plan: &[ChunkPlan]) -> Result<Vec<u8>> {
    let mut encoded = Vec::new();
    let mut logical_sizes = Vec::new();
    let mut rest = data;

    for entry in plan {
        if entry.size == 0 {
            return Err(Error::PlanMismatch {
                covered: (data.len() - rest.len()) as u64,
                total: data.len() as u64,
            });
        }

        loop {
            let take = (entry.size as usize).min(rest.len());
            if take == 0 {
                break;
            }

            encoded.push(encode_chunk(&rest[..take], entry.mode)?);
            logical_sizes.push(take as u32);
            rest = &rest[take..];

            if !entry.wildcard {
                break;
            }
        }
    }

    if !rest.is_empty() {
        return Err(Error::PlanMismatch {
            covered: (data.len() - rest.len()) as u64,
            total: data.len() as u64,
        });
    }
    if encoded.is_empty() {
        encoded.push(encode_chunk(&[], plan.first().map_or(EncodingMode::None, |p| p.mode))?);
        logical_sizes.push(0);
    }

    assemble_record(&encoded, &logical_sizes)
}

/// Build a data record holding `data` as one chunk with no block table
/// (`header_size == 0`).
pub fn build_single_record(data: &[u8], mode: EncodingMode) -> Result<Vec<u8>> {
    let chunk = encode_chunk(data, mode)?;
    let record_size = DATA_HEADER_SIZE as u32 + 8 + chunk.len() as u32;

    let mut inner = Vec::with_capacity(8 + chunk.len());
    inner.extend_from_slice(&BLTE_MAGIC);
    inner.extend_from_slice(&0u32.to_be_bytes());

    // With no block table, the outer checksum covers the prefix and the
    // whole payload.
    let mut hasher = Md5Hasher::new();
    hasher.consume(&inner);
    hasher.consume(&chunk);

    let data_header = DataHeader {
        checksum: hasher.finalize().into(),
        size: record_size,
    };

    let mut record = Vec::with_capacity(record_size as usize);
    record.extend_from_slice(&data_header.to_bytes());
    record.extend_from_slice(&inner);
    record.extend_from_slice(&chunk);

    Ok(record)
}

#[cfg(test)]
mod tests {
    use std::io::Read;

    use super::*;
    use crate::{BlockSource, BlteBuffer, BlteStream};

    #[test]
    fn encode_chunk_prefixes_mode_tag() {
        let chunk = encode_chunk(b"abc", EncodingMode::None).unwrap();
        assert_eq!(chunk, b"Nabc");

        let chunk = encode_chunk(b"abc", EncodingMode::ZLib).unwrap();
        assert_eq!(chunk[0], b'Z');
        assert!(chunk.len() > 1);
    }

    #[test]
    fn encode_rejects_undecodable_modes() {
        assert!(encode_chunk(b"x", EncodingMode::Encrypted).is_err());
        assert!(encode_chunk(b"x", EncodingMode::Frame).is_err());
    }

    #[test]
    fn built_records_parse_back() {
        for mode in [EncodingMode::None, EncodingMode::ZLib] {
            let record = build_record(b"round trip payload", 7, mode).unwrap();
            let mut stream =
                BlteStream::new(BlteBuffer::open_record(&BlockSource::memory(record)).unwrap());

            let mut out = Vec::new();
            stream.read_to_end(&mut out).unwrap();
            assert_eq!(out, b"round trip payload", "mode {mode:?}");
        }
    }

    #[test]
    fn built_single_records_parse_back() {
        for mode in [EncodingMode::None, EncodingMode::ZLib] {
            let record = build_single_record(b"one chunk", mode).unwrap();
            let mut stream =
                BlteStream::new(BlteBuffer::open_record(&BlockSource::memory(record)).unwrap());

            let mut out = Vec::new();
            stream.read_to_end(&mut out).unwrap();
            assert_eq!(out, b"one chunk", "mode {mode:?}");
        }
    }

    #[test]
    fn record_size_field_matches_length() {
        let record = build_record(b"sized", 8, EncodingMode::None).unwrap();
        let size = u32::from_le_bytes([record[16], record[17], record[18], record[19]]);
        assert_eq!(size as usize, record.len());
    }

    #[test]
    fn planned_records_follow_the_plan() {
        // A fixed plain header chunk, then 8-byte zlib chunks to the end.
        let plan = [
            ChunkPlan {
                size: 4,
                wildcard: false,
                mode: EncodingMode::None,
            },
            ChunkPlan {
                size: 8,
                wildcard: true,
                mode: EncodingMode::ZLib,
            },
        ];

        let record = build_record_planned(b"HEADfollowed by the body", &plan).unwrap();
        let mut buffer = BlteBuffer::open_record(&BlockSource::memory(record)).unwrap();
        assert_eq!(buffer.len(), 24);

        let mut out = vec![0u8; 24];
        buffer.read_at(0, &mut out).unwrap();
        assert_eq!(out, b"HEADfollowed by the body");
    }

    #[test]
    fn plan_must_cover_the_input() {
        let plan = [ChunkPlan {
            size: 4,
            wildcard: false,
            mode: EncodingMode::None,
        }];

        let err = build_record_planned(b"more than four", &plan).unwrap_err();
        assert!(matches!(
            err,
            Error::PlanMismatch { covered: 4, total: 14 }
        ));
    }

    #[test]
    fn empty_input_builds_empty_record() {
        let record = build_record(b"", 8, EncodingMode::None).unwrap();
        let buffer = BlteBuffer::open_record(&BlockSource::memory(record)).unwrap();
        assert!(buffer.is_empty());
    }
}
