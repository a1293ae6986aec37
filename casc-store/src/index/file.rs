//! Single `.idx` file read and write
//!
//! Layout, all sections little-endian unless noted:
//!
//! ```text
//! u32 header_len | u32 header_hash            lookup3 over the header
//! header: u16 version, u16 bucket,
//!         u8 length_width, u8 location_width, u8 key_width, u8 segment_bits,
//!         (BE u32 begin, BE u32 end) * N      reserved key-range pairs
//! pad to 16-byte boundary
//! u32 data_len | u32 data_hash                chained lookup3 over records
//! packed records, data_len bytes
//! pad to the 64 KiB segment boundary
//! ```

use std::fs::File;
use std::io::{BufReader, Read, Seek, SeekFrom, Write};
use std::path::Path;

use byteorder::{BigEndian, ByteOrder, LittleEndian, ReadBytesExt};
use tracing::debug;

use crate::jenkins::{hashlittle, hashlittle2};
use crate::reference::{FieldWidths, Reference};
use crate::{CascError, Result};

const SEGMENT_SIZE: u64 = 0x10000;

/// Parsed `.idx` header.
#[derive(Debug, Clone)]
pub struct IdxHeader {
    pub version: u16,
    pub bucket: u16,
    pub widths: FieldWidths,
    /// Reserved key-range pairs; parsed, not enforced.
    pub ranges: Vec<(u32, u32)>,
}

/// One parsed `.idx` file.
#[derive(Debug)]
pub struct IdxFile {
    pub header: IdxHeader,
    pub entries: Vec<Reference>,
}

impl IdxFile {
    /// Parse an `.idx` file from disk.
    pub fn parse_file(path: &Path) -> Result<Self> {
        let file = File::open(path).map_err(|_| CascError::FileNotFound(path.to_path_buf()))?;
        Self::parse(&mut BufReader::new(file))
    }

    /// Parse an `.idx` file from a reader positioned at its start.
    pub fn parse<R: Read + Seek>(reader: &mut R) -> Result<Self> {
        let header_len = reader.read_u32::<LittleEndian>()?;
        let header_hash = reader.read_u32::<LittleEndian>()?;

        let mut header_bytes = vec![0u8; header_len as usize];
        reader.read_exact(&mut header_bytes)?;

        let actual = hashlittle(&header_bytes, 0);
        if actual != header_hash {
            return Err(CascError::IndexHashMismatch {
                context: "header",
                expected: header_hash,
                actual,
            });
        }

        if header_len < 8 || (header_len - 8) % 8 != 0 {
            return Err(CascError::InvalidIndexFormat(format!(
                "header of {header_len} bytes"
            )));
        }

        let widths = FieldWidths {
            length: header_bytes[4] as usize,
            location: header_bytes[5] as usize,
            key: header_bytes[6] as usize,
            segment_bits: header_bytes[7],
        };
        let header = IdxHeader {
            version: LittleEndian::read_u16(&header_bytes[0..2]),
            bucket: LittleEndian::read_u16(&header_bytes[2..4]),
            widths,
            ranges: header_bytes[8..]
                .chunks_exact(8)
                .map(|pair| {
                    (
                        BigEndian::read_u32(&pair[0..4]),
                        BigEndian::read_u32(&pair[4..8]),
                    )
                })
                .collect(),
        };

        if widths.record_size() == 0 {
            return Err(CascError::InvalidIndexFormat("zero-size records".into()));
        }

        // The data section starts on the next 16-byte boundary.
        let pad = (16 - (8 + u64::from(header_len)) % 16) % 16;
        reader.seek(SeekFrom::Current(pad as i64))?;

        let data_len = reader.read_u32::<LittleEndian>()?;
        let data_hash = reader.read_u32::<LittleEndian>()?;

        let record_size = widths.record_size();
        let count = data_len as usize / record_size;
        debug!(
            "idx bucket {:02x}: version {}, {count} records",
            header.bucket, header.version
        );

        let mut entries = Vec::with_capacity(count);
        let mut record = vec![0u8; record_size];
        let (mut pc, mut pb) = (0u32, 0u32);

        for _ in 0..count {
            reader.read_exact(&mut record)?;
            hashlittle2(&record, &mut pc, &mut pb);
            entries.push(Reference::parse(&record, widths)?);
        }

        if pc != data_hash {
            return Err(CascError::IndexHashMismatch {
                context: "data",
                expected: data_hash,
                actual: pc,
            });
        }

        Ok(Self { header, entries })
    }

    /// Write the index in its on-disk form: recomputed hashes, records
    /// sorted by unsigned key bytes, padded out to the segment boundary.
    pub fn write<W: Write>(&self, writer: &mut W) -> Result<()> {
        let widths = self.header.widths;

        let mut header_bytes = Vec::with_capacity(8 + 8 * self.header.ranges.len().max(1));
        let mut word = [0u8; 4];

        LittleEndian::write_u16(&mut word[..2], self.header.version);
        header_bytes.extend_from_slice(&word[..2]);
        LittleEndian::write_u16(&mut word[..2], self.header.bucket);
        header_bytes.extend_from_slice(&word[..2]);
        header_bytes.push(widths.length as u8);
        header_bytes.push(widths.location as u8);
        header_bytes.push(widths.key as u8);
        header_bytes.push(widths.segment_bits);

        let ranges: &[(u32, u32)] = if self.header.ranges.is_empty() {
            // One whole-segment reservation, as the write path has always
            // emitted.
            &[(0, 0x4000_0000)]
        } else {
            &self.header.ranges
        };
        for (begin, end) in ranges {
            BigEndian::write_u32(&mut word, *begin);
            header_bytes.extend_from_slice(&word);
            BigEndian::write_u32(&mut word, *end);
            header_bytes.extend_from_slice(&word);
        }

        let mut out = Vec::new();
        LittleEndian::write_u32(&mut word, header_bytes.len() as u32);
        out.extend_from_slice(&word);
        LittleEndian::write_u32(&mut word, hashlittle(&header_bytes, 0));
        out.extend_from_slice(&word);
        out.extend_from_slice(&header_bytes);

        let pad = (16 - out.len() % 16) % 16;
        out.resize(out.len() + pad, 0);

        let mut sorted: Vec<&Reference> = self.entries.iter().collect();
        sorted.sort_by(|a, b| a.key.as_bytes().cmp(b.key.as_bytes()));

        let mut data = Vec::with_capacity(sorted.len() * widths.record_size());
        let (mut pc, mut pb) = (0u32, 0u32);
        for entry in sorted {
            let record = entry.serialize(widths)?;
            hashlittle2(&record, &mut pc, &mut pb);
            data.extend_from_slice(&record);
        }

        LittleEndian::write_u32(&mut word, data.len() as u32);
        out.extend_from_slice(&word);
        LittleEndian::write_u32(&mut word, pc);
        out.extend_from_slice(&word);
        out.extend_from_slice(&data);

        // Reserve through the end of the current 64 KiB segment.
        let target = (out.len() as u64 / SEGMENT_SIZE + 1) * SEGMENT_SIZE;
        out.resize(target as usize, 0);

        writer.write_all(&out)?;
        Ok(())
    }
}
