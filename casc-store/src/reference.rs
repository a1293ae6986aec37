//! Packed storage references
//!
//! An index record points into the pooled data files: `(key, file, offset,
//! size)`. On disk the file number and offset share one location field:
//! the low `segment_bits` carry the offset, the bits above them the file
//! number. The leading bytes of the location field are the file part in
//! little-endian order, the trailing bytes the offset part in big-endian
//! order, and the boundary bit-shuffle below keeps the two exact.

use byteorder::{BigEndian, ByteOrder, LittleEndian};

use casc_tact::CascKey;

use crate::{CascError, Result};

/// Field widths of a packed reference, taken from an index file header.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FieldWidths {
    /// Bytes of key stored per record.
    pub key: usize,
    /// Bytes of the combined file+offset location field.
    pub location: usize,
    /// Bytes of the length field.
    pub length: usize,
    /// Bits of the location field that carry the offset.
    pub segment_bits: u8,
}

impl FieldWidths {
    /// The widths every production `.idx` file uses.
    pub const STANDARD: Self = Self {
        key: 9,
        location: 5,
        length: 4,
        segment_bits: 30,
    };

    /// Total serialized record size.
    pub fn record_size(&self) -> usize {
        self.key + self.location + self.length
    }

    fn offset_bytes(&self) -> usize {
        (usize::from(self.segment_bits) + 7) / 8
    }

    fn file_bytes(&self) -> usize {
        self.location - self.offset_bytes()
    }
}

/// A pointer to one stored record: which `data.NNN` file, where in it, and
/// how long the on-disk record is.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Reference {
    /// Leading bytes of the record MD5; may be empty for entries that
    /// carry no key (free-space tables).
    pub key: CascKey,
    /// Data file number.
    pub file: u32,
    /// Byte offset of the record within the data file.
    pub offset: u64,
    /// On-disk size of the record.
    pub size: u32,
}

impl Reference {
    /// Parse one packed record.
    pub fn parse(bytes: &[u8], widths: FieldWidths) -> Result<Self> {
        if bytes.len() < widths.record_size() {
            return Err(CascError::InvalidIndexFormat(format!(
                "record of {} bytes, expected {}",
                bytes.len(),
                widths.record_size()
            )));
        }

        let offset_bytes = widths.offset_bytes();
        let file_bytes = widths.file_bytes();
        if widths.location > 8 || widths.length > 8 || offset_bytes > widths.location {
            return Err(CascError::InvalidIndexFormat(format!(
                "location field of {} bytes with {} segment bits",
                widths.location, widths.segment_bits
            )));
        }

        let key = CascKey::from_bytes(&bytes[..widths.key]);
        let mut rest = &bytes[widths.key..];

        let mut file = read_uint_le(&rest[..file_bytes]);
        rest = &rest[file_bytes..];

        let raw_offset = read_uint_be(&rest[..offset_bytes]);
        rest = &rest[offset_bytes..];

        let size = read_uint_le(&rest[..widths.length]) as u32;

        // The location field's high bits are the file number, the low
        // `segment_bits` the offset; the byte split above does not land on
        // the bit boundary, so move the spilled bits over.
        let extra_bits = offset_bytes as u32 * 8 - u32::from(widths.segment_bits);
        file = (file << extra_bits) | (raw_offset >> widths.segment_bits);
        let offset = raw_offset & ((1u64 << widths.segment_bits) - 1);

        Ok(Self {
            key,
            file: file as u32,
            offset,
            size,
        })
    }

    /// Serialize to the packed record form. Fails when a field does not
    /// fit the given widths.
    pub fn serialize(&self, widths: FieldWidths) -> Result<Vec<u8>> {
        let mut out = Vec::with_capacity(widths.record_size());

        out.extend_from_slice(&self.key.as_bytes()[..widths.key.min(self.key.width())]);
        out.resize(widths.key, 0);

        if widths.location > 0 {
            let offset_bytes = widths.offset_bytes();
            let file_bytes = widths.file_bytes();
            let file_bits = widths.location as u8 * 8 - widths.segment_bits;

            if self.offset >= 1u64 << widths.segment_bits {
                return Err(CascError::FieldOverflow {
                    value: self.offset,
                    bits: widths.segment_bits,
                });
            }
            if u64::from(self.file) >= 1u64 << file_bits {
                return Err(CascError::FieldOverflow {
                    value: u64::from(self.file),
                    bits: file_bits,
                });
            }

            let extra_bits = offset_bytes as u32 * 8 - u32::from(widths.segment_bits);
            let file_field = u64::from(self.file) >> extra_bits;
            let spill = u64::from(self.file) & ((1u64 << extra_bits) - 1);
            let offset_field = self.offset | (spill << widths.segment_bits);

            write_uint_le(&mut out, file_field, file_bytes);
            write_uint_be(&mut out, offset_field, offset_bytes);
        }

        write_uint_le(&mut out, u64::from(self.size), widths.length);

        Ok(out)
    }
}

fn read_uint_le(bytes: &[u8]) -> u64 {
    if bytes.is_empty() {
        0
    } else {
        LittleEndian::read_uint(bytes, bytes.len())
    }
}

fn read_uint_be(bytes: &[u8]) -> u64 {
    if bytes.is_empty() {
        0
    } else {
        BigEndian::read_uint(bytes, bytes.len())
    }
}

fn write_uint_le(out: &mut Vec<u8>, value: u64, width: usize) {
    if width > 0 {
        let mut buf = [0u8; 8];
        LittleEndian::write_uint(&mut buf, value, width);
        out.extend_from_slice(&buf[..width]);
    }
}

fn write_uint_be(out: &mut Vec<u8>, value: u64, width: usize) {
    if width > 0 {
        let mut buf = [0u8; 8];
        BigEndian::write_uint(&mut buf, value, width);
        out.extend_from_slice(&buf[..width]);
    }
}
