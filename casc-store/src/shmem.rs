//! Shadow memory (`shmem`) parsing and free-space accounting
//!
//! The `shmem` file is a typed block stream. The header block names the
//! data directory, carries a directory of further blocks and the version
//! stamp of every index bucket. Free-space blocks track reusable extents
//! inside the pooled data files as two parallel 1090-slot tables of packed
//! 5-byte fields: sizes first, then (file, offset) pairs.

use std::collections::BTreeMap;
use std::fs::File;
use std::io::{BufReader, Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};

use byteorder::{LittleEndian, ReadBytesExt, WriteBytesExt};
use tracing::{debug, warn};

use crate::reference::{FieldWidths, Reference};
use casc_tact::CascKey;

use crate::{CascError, Result};

const BLOCK_HEADER: u32 = 4;
const BLOCK_FREE_SPACE: u32 = 1;

const ENTRIES_PER_BLOCK: usize = 1090;
const PATH_FIELD_SIZE: usize = 256;

/// Packing of the 5-byte free-space fields.
const SPAN_WIDTHS: FieldWidths = FieldWidths {
    key: 0,
    location: 5,
    length: 0,
    segment_bits: 30,
};

/// A reusable extent inside one data file.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FreeSpan {
    pub file: u32,
    pub offset: u64,
    pub size: u32,
}

/// Parsed shadow memory: the data directory, per-bucket index versions and
/// the free-space table.
#[derive(Debug)]
pub struct ShadowMemory {
    /// Directory holding the data and index files.
    pub data_path: PathBuf,

    /// Version stamp per index bucket, as recorded in the header block.
    pub versions: BTreeMap<u8, u32>,

    /// Live free-space extents.
    pub free_space: Vec<FreeSpan>,
}

impl ShadowMemory {
    /// Parse a `shmem` file from disk.
    pub fn parse_file(path: &Path) -> Result<Self> {
        let file = File::open(path).map_err(|_| CascError::FileNotFound(path.to_path_buf()))?;
        Self::parse(&mut BufReader::new(file), path)
    }

    /// Parse shadow memory from a reader. `shmem_path` is the location of
    /// the file itself, used to canonicalize the data directory.
    pub fn parse<R: Read + Seek>(reader: &mut R, shmem_path: &Path) -> Result<Self> {
        let block_type = reader.read_u32::<LittleEndian>()?;
        if block_type != BLOCK_HEADER {
            return Err(CascError::InvalidShmemFormat(format!(
                "file starts with block type {block_type}, expected header"
            )));
        }

        let header_size = reader.read_u32::<LittleEndian>()?;

        let mut path_field = [0u8; PATH_FIELD_SIZE];
        reader.read_exact(&mut path_field)?;
        let stored_path = parse_path_field(&path_field);

        // The stored path is written by the game client and is fragile
        // (absolute, sometimes `Global\`-prefixed). The shmem file's own
        // parent directory is the data directory whenever it looks like one.
        let data_path = match shmem_path.parent() {
            Some(parent) if parent.is_dir() => parent.to_path_buf(),
            _ => PathBuf::from(&stored_path),
        };

        let versions = discover_buckets(&data_path)?;

        let minimum = 264 + versions.len() * 4;
        if (header_size as usize) < minimum || (header_size as usize - minimum) % 8 != 0 {
            return Err(CascError::InvalidShmemFormat(format!(
                "header of {header_size} bytes for {} buckets",
                versions.len()
            )));
        }
        let block_count = (header_size as usize - minimum) / 8;

        let mut blocks = Vec::with_capacity(block_count);
        for _ in 0..block_count {
            let size = reader.read_u32::<LittleEndian>()?;
            let offset = reader.read_u32::<LittleEndian>()?;
            blocks.push((size, offset));
        }

        let mut shmem = Self {
            data_path,
            versions,
            free_space: Vec::new(),
        };

        let buckets: Vec<u8> = shmem.versions.keys().copied().collect();
        for bucket in buckets {
            let stamp = reader.read_u32::<LittleEndian>()?;
            shmem.versions.insert(bucket, stamp);
        }

        debug!(
            "shmem: {} buckets, {} directory blocks",
            shmem.versions.len(),
            blocks.len()
        );

        for (size, offset) in blocks {
            if size == 0 {
                continue;
            }

            reader.seek(SeekFrom::Start(u64::from(offset)))?;
            let block_type = reader.read_u32::<LittleEndian>()?;

            match block_type {
                BLOCK_FREE_SPACE => shmem.read_free_space(reader)?,
                BLOCK_HEADER => {}
                other => warn!("skipping unknown shmem block type {other}"),
            }
        }

        Ok(shmem)
    }

    fn read_free_space<R: Read + Seek>(&mut self, reader: &mut R) -> Result<()> {
        let count = reader.read_u32::<LittleEndian>()? as usize;
        if count > ENTRIES_PER_BLOCK {
            return Err(CascError::InvalidShmemFormat(format!(
                "free-space count {count} exceeds table size"
            )));
        }

        reader.seek(SeekFrom::Current(24))?;

        let mut table = vec![0u8; ENTRIES_PER_BLOCK * 5];

        // First table: packed sizes.
        reader.read_exact(&mut table)?;
        let mut sizes = Vec::with_capacity(count);
        for slot in table.chunks_exact(5).take(count) {
            sizes.push(Reference::parse(slot, SPAN_WIDTHS)?.offset as u32);
        }

        // Second table: packed (file, offset) pairs.
        reader.read_exact(&mut table)?;
        for (slot, size) in table.chunks_exact(5).take(count).zip(sizes) {
            let location = Reference::parse(slot, SPAN_WIDTHS)?;
            self.free_space.push(FreeSpan {
                file: location.file,
                offset: location.offset,
                size,
            });
        }

        debug!("shmem: {} free-space extents", self.free_space.len());
        Ok(())
    }

    /// Carve `size` bytes out of the first sufficient free extent.
    pub fn reserve(&mut self, size: u32) -> Result<FreeSpan> {
        let mut available = 0u64;

        for span in &mut self.free_space {
            available = available.max(u64::from(span.size));

            if span.size >= size {
                let reserved = FreeSpan {
                    file: span.file,
                    offset: span.offset,
                    size,
                };
                span.offset += u64::from(size);
                span.size -= size;
                return Ok(reserved);
            }
        }

        Err(CascError::NoFreeSpace {
            requested: u64::from(size),
            available,
        })
    }

    /// Write the shadow memory back out: header block with directory and
    /// versions, then one free-space block.
    pub fn write<W: Write>(&self, writer: &mut W) -> Result<()> {
        let header_size = (264 + self.versions.len() * 4 + 2 * 8) as u32;
        let free_block_size = (4 + 4 + 24 + 2 * ENTRIES_PER_BLOCK * 5) as u32;

        writer.write_u32::<LittleEndian>(BLOCK_HEADER)?;
        writer.write_u32::<LittleEndian>(header_size)?;

        let mut path_field = [0u8; PATH_FIELD_SIZE];
        let path = self.data_path.to_string_lossy();
        let bytes = path.as_bytes();
        path_field[..bytes.len().min(PATH_FIELD_SIZE - 1)]
            .copy_from_slice(&bytes[..bytes.len().min(PATH_FIELD_SIZE - 1)]);
        writer.write_all(&path_field)?;

        // Directory: the header block itself, then the free-space block.
        writer.write_u32::<LittleEndian>(header_size)?;
        writer.write_u32::<LittleEndian>(0)?;
        writer.write_u32::<LittleEndian>(free_block_size)?;
        writer.write_u32::<LittleEndian>(header_size)?;

        for stamp in self.versions.values() {
            writer.write_u32::<LittleEndian>(*stamp)?;
        }

        writer.write_u32::<LittleEndian>(BLOCK_FREE_SPACE)?;
        writer.write_u32::<LittleEndian>(self.free_space.len() as u32)?;
        writer.write_all(&[0u8; 24])?;

        let mut spans = self.free_space.clone();
        spans.truncate(ENTRIES_PER_BLOCK);

        let mut table = Vec::with_capacity(ENTRIES_PER_BLOCK * 5);
        for span in &spans {
            let as_size = Reference {
                key: CascKey::from_bytes(&[]),
                file: 0,
                offset: u64::from(span.size),
                size: 0,
            };
            table.extend_from_slice(&as_size.serialize(SPAN_WIDTHS)?);
        }
        table.resize(ENTRIES_PER_BLOCK * 5, 0);
        writer.write_all(&table)?;

        table.clear();
        for span in &spans {
            let as_location = Reference {
                key: CascKey::from_bytes(&[]),
                file: span.file,
                offset: span.offset,
                size: 0,
            };
            table.extend_from_slice(&as_location.serialize(SPAN_WIDTHS)?);
        }
        table.resize(ENTRIES_PER_BLOCK * 5, 0);
        writer.write_all(&table)?;

        Ok(())
    }

    /// Write to a file on disk.
    pub fn write_file(&self, path: &Path) -> Result<()> {
        let mut file = File::create(path)?;
        self.write(&mut file)
    }
}

/// NUL-trim the 256-byte path field and strip the `Global\` session prefix
/// the game client sometimes records.
fn parse_path_field(field: &[u8]) -> String {
    let end = field
        .iter()
        .position(|&b| b == 0)
        .unwrap_or(field.len());
    let path = String::from_utf8_lossy(&field[..end]);

    match path.split_once('\\') {
        Some(("Global", rest)) => rest.to_string(),
        _ => path.into_owned(),
    }
}

/// List `*.idx` files in the data directory; their first two hex digits
/// name the buckets present. Stamps start at zero and are filled from the
/// header block's version array.
fn discover_buckets(data_path: &Path) -> Result<BTreeMap<u8, u32>> {
    let mut versions = BTreeMap::new();

    let entries = std::fs::read_dir(data_path)
        .map_err(|_| CascError::FileNotFound(data_path.to_path_buf()))?;

    for entry in entries {
        let entry = entry?;
        let name = entry.file_name();
        let name = name.to_string_lossy();

        if let Some(stem) = name.strip_suffix(".idx") {
            if stem.len() >= 2 {
                if let Ok(bucket) = u8::from_str_radix(&stem[..2], 16) {
                    versions.insert(bucket, 0);
                }
            }
        }
    }

    Ok(versions)
}

#[cfg(test)]
mod tests {
    use std::io::Cursor;

    use super::*;

    fn sample() -> ShadowMemory {
        ShadowMemory {
            data_path: PathBuf::from("data"),
            versions: BTreeMap::from([(0u8, 7u32), (3, 9), (15, 2)]),
            free_space: vec![
                FreeSpan {
                    file: 0,
                    offset: 0x1000,
                    size: 0x2000,
                },
                FreeSpan {
                    file: 3,
                    offset: 0x8000,
                    size: 0x100,
                },
            ],
        }
    }

    /// Parse without touching the filesystem: seed the bucket set the way
    /// `parse` would have discovered it, then re-read versions and blocks.
    fn round_trip(shmem: &ShadowMemory, dir: &Path) -> ShadowMemory {
        for bucket in shmem.versions.keys() {
            let name = format!("{bucket:02x}{:08x}.idx", 0);
            std::fs::write(dir.join(name), b"").unwrap();
        }

        let mut bytes = Vec::new();
        shmem.write(&mut bytes).unwrap();

        let shmem_path = dir.join("shmem");
        std::fs::write(&shmem_path, &bytes).unwrap();

        ShadowMemory::parse(&mut Cursor::new(bytes), &shmem_path).unwrap()
    }

    #[test]
    fn write_then_parse_round_trips() {
        let dir = tempfile::tempdir().unwrap();
        let parsed = round_trip(&sample(), dir.path());

        assert_eq!(parsed.versions, sample().versions);
        assert_eq!(parsed.free_space, sample().free_space);
        assert_eq!(parsed.data_path, dir.path());
    }

    #[test]
    fn reserve_carves_first_fitting_extent() {
        let mut shmem = sample();

        let span = shmem.reserve(0x800).unwrap();
        assert_eq!(span.file, 0);
        assert_eq!(span.offset, 0x1000);
        assert_eq!(span.size, 0x800);

        // The donor extent shrank in place.
        assert_eq!(shmem.free_space[0].offset, 0x1800);
        assert_eq!(shmem.free_space[0].size, 0x1800);
    }

    #[test]
    fn reserve_reports_largest_available() {
        let mut shmem = sample();
        let err = shmem.reserve(0x10000).unwrap_err();
        assert!(matches!(
            err,
            CascError::NoFreeSpace {
                requested: 0x10000,
                available: 0x2000,
            }
        ));
    }

    #[test]
    fn global_prefix_is_stripped() {
        let mut field = [0u8; PATH_FIELD_SIZE];
        let path = br"Global\World of Warcraft\Data\data";
        field[..path.len()].copy_from_slice(path);
        assert_eq!(parse_path_field(&field), r"World of Warcraft\Data\data");
    }

    #[test]
    fn wrong_leading_block_type_is_rejected() {
        let mut bytes = Vec::new();
        bytes.extend_from_slice(&1u32.to_le_bytes());
        bytes.extend_from_slice(&[0u8; 64]);

        let err =
            ShadowMemory::parse(&mut Cursor::new(bytes), Path::new("/nonexistent/shmem"))
                .unwrap_err();
        assert!(matches!(err, CascError::InvalidShmemFormat(_)));
    }
}
