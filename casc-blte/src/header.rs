//! BLTE frame and data-record header parsing

use byteorder::{BigEndian, ByteOrder, LittleEndian};
use md5::Context as Md5Hasher;
use tracing::debug;

use crate::{BLTE_MAGIC, BlockSource, DATA_HEADER_SIZE, Error, Md5, Result};

/// Marker byte that opens the block table.
pub const TABLE_MARKER: u8 = 0x0F;

/// The 30-byte header in front of every record stored in a `data.NNN` file.
///
/// Raw BLTE files (configs fetched from CDN, test fixtures) do not carry it.
#[derive(Debug, Clone)]
pub struct DataHeader {
    /// MD5 of the BLTE inner header. Stored byte-reversed on disk; this
    /// field holds the digest in natural order.
    pub checksum: Md5,

    /// Total size of the record on disk, headers included.
    pub size: u32,
}

impl DataHeader {
    /// Parse the outer data header from its 30 raw bytes.
    pub fn parse(bytes: &[u8]) -> Result<Self> {
        if bytes.len() < DATA_HEADER_SIZE as usize {
            return Err(Error::Truncated {
                expected: DATA_HEADER_SIZE as usize,
                actual: bytes.len(),
            });
        }

        let mut checksum = [0u8; 16];
        checksum.copy_from_slice(&bytes[..16]);
        checksum.reverse();

        let size = LittleEndian::read_u32(&bytes[16..20]);

        Ok(Self { checksum, size })
    }

    /// Serialize back to the 30-byte on-disk form.
    pub fn to_bytes(&self) -> [u8; DATA_HEADER_SIZE as usize] {
        let mut out = [0u8; DATA_HEADER_SIZE as usize];
        out[..16].copy_from_slice(&self.checksum);
        out[..16].reverse();
        LittleEndian::write_u32(&mut out[16..20], self.size);
        out
    }
}

/// One block-table entry.
#[derive(Debug, Clone)]
pub struct ChunkRecord {
    /// On-disk size of the chunk, mode tag included.
    pub compressed_size: u32,

    /// Decoded size of the chunk.
    pub decompressed_size: u32,

    /// MD5 of the on-disk chunk bytes, mode tag included.
    pub checksum: Md5,
}

/// Parsed BLTE inner header: signature, header size and block table.
#[derive(Debug, Clone)]
pub struct FrameHeader {
    /// Value of the big-endian header-size field. Zero means the frame is a
    /// single chunk with no block table.
    pub header_size: u32,

    /// Block table entries; empty for single-chunk frames.
    pub chunks: Vec<ChunkRecord>,

    /// MD5 over the 8-byte signature+size prefix and the block table bytes.
    /// For single-chunk frames this only covers the prefix; the caller
    /// extends the digest over the payload when an outer header demands it.
    pub header_md5: Md5,
}

impl FrameHeader {
    /// Parse the inner header from `source` starting at `offset`.
    pub fn parse(source: &BlockSource, offset: u64) -> Result<Self> {
        let prefix = source.get_exact(offset, 8)?;

        let mut magic = [0u8; 4];
        magic.copy_from_slice(&prefix[..4]);
        if magic != BLTE_MAGIC {
            return Err(Error::InvalidMagic(magic));
        }

        let header_size = BigEndian::read_u32(&prefix[4..8]);

        let mut hasher = Md5Hasher::new();
        hasher.consume(&prefix);

        if header_size == 0 {
            return Ok(Self {
                header_size,
                chunks: Vec::new(),
                header_md5: hasher.finalize().into(),
            });
        }

        // Header size covers the 8-byte prefix, the 4-byte table prelude and
        // one 24-byte entry per chunk.
        if header_size < 12 {
            return Err(Error::InvalidHeaderSize(header_size));
        }

        let table = source.get_exact(offset + 8, header_size as usize - 8)?;
        hasher.consume(&table);

        if table[0] != TABLE_MARKER {
            return Err(Error::InvalidTableMarker(table[0]));
        }

        let chunk_count = (u32::from(table[1]) << 16) | u32::from(BigEndian::read_u16(&table[2..4]));
        if header_size - 12 != chunk_count * 24 {
            return Err(Error::InvalidHeaderSize(header_size));
        }

        debug!("block table: {chunk_count} chunks");

        let mut chunks = Vec::with_capacity(chunk_count as usize);
        for entry in table[4..].chunks_exact(24) {
            let mut checksum = [0u8; 16];
            checksum.copy_from_slice(&entry[8..24]);

            chunks.push(ChunkRecord {
                compressed_size: BigEndian::read_u32(&entry[0..4]),
                decompressed_size: BigEndian::read_u32(&entry[4..8]),
                checksum,
            });
        }

        Ok(Self {
            header_size,
            chunks,
            header_md5: hasher.finalize().into(),
        })
    }
}
