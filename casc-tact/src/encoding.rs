//! Encoding table parser
//!
//! The encoding table maps content hashes to the storage keys under which
//! their encoded form is filed. It is itself a stored file: a 22-byte
//! header, a string block of encoding profiles, then two sorted page
//! tables (content→keys, and a reserved reverse table), each a run of
//! page descriptors followed by 4 KiB pages.
//!
//! Multi-byte header fields are big-endian, unlike the rest of the local
//! storage formats.

use byteorder::{BigEndian, ByteOrder};
use tracing::{debug, trace};

use crate::keys::CascKey;
use crate::{Error, Result};

/// Magic bytes opening the table: `EN`.
pub const ENCODING_MAGIC: [u8; 2] = *b"EN";

const HEADER_SIZE: usize = 22;
const PAGE_SIZE: usize = 4096;

/// Fixed-size header of the encoding table.
#[derive(Debug, Clone)]
pub struct EncodingHeader {
    /// Hash width in the content table (A).
    pub hash_size_a: usize,
    /// Hash width in the reverse table (B).
    pub hash_size_b: usize,
    /// Page count of table A.
    pub page_count_a: usize,
    /// Page count of table B.
    pub page_count_b: usize,
    /// Byte length of the profile string block.
    pub string_block_size: usize,
}

/// Descriptor addressing one 4 KiB page.
#[derive(Debug, Clone)]
struct PageDescriptor {
    first_hash: Vec<u8>,
    checksum: [u8; 16],
}

/// One resolved entry of the content table.
#[derive(Debug, Clone)]
pub struct EncodingEntry {
    /// The content hash that was looked up.
    pub content_hash: CascKey,
    /// Storage keys holding encodings of this content; the first is
    /// canonical.
    pub keys: Vec<CascKey>,
    /// Logical (decoded) size of the content.
    pub file_size: u32,
}

/// A parsed encoding table with on-demand, verified page reads.
pub struct EncodingTable {
    header: EncodingHeader,
    profiles: Vec<String>,
    pages_a: Vec<PageDescriptor>,
    pages_a_offset: usize,
    data: Vec<u8>,
}

impl EncodingTable {
    /// Parse the decoded bytes of an encoding file.
    pub fn parse(data: Vec<u8>) -> Result<Self> {
        if data.len() < HEADER_SIZE {
            return Err(Error::Truncated {
                expected: HEADER_SIZE,
                actual: data.len(),
            });
        }

        if data[0..2] != ENCODING_MAGIC {
            return Err(Error::InvalidSignature {
                expected: u16::from(ENCODING_MAGIC[0]) << 8 | u16::from(ENCODING_MAGIC[1]),
                actual: u16::from(data[0]) << 8 | u16::from(data[1]),
            });
        }

        let header = EncodingHeader {
            hash_size_a: data[3] as usize,
            hash_size_b: data[4] as usize,
            page_count_a: BigEndian::read_u32(&data[9..13]) as usize,
            page_count_b: BigEndian::read_u32(&data[13..17]) as usize,
            string_block_size: BigEndian::read_u32(&data[18..22]) as usize,
        };
        debug!(
            "encoding table: {} content pages, {} reverse pages, {} byte string block",
            header.page_count_a, header.page_count_b, header.string_block_size
        );

        let strings_end = HEADER_SIZE + header.string_block_size;
        let heads_a_end = strings_end + header.page_count_a * (header.hash_size_a + 16);
        let pages_a_end = heads_a_end + header.page_count_a * PAGE_SIZE;
        let heads_b_end = pages_a_end + header.page_count_b * (header.hash_size_b + 16);
        let pages_b_end = heads_b_end + header.page_count_b * PAGE_SIZE;

        if data.len() < pages_b_end {
            return Err(Error::Truncated {
                expected: pages_b_end,
                actual: data.len(),
            });
        }

        let profiles = data[HEADER_SIZE..strings_end]
            .split(|&b| b == 0)
            .filter(|s| !s.is_empty())
            .map(|s| String::from_utf8_lossy(s).into_owned())
            .collect();

        let pages_a =
            parse_descriptors(&data[strings_end..heads_a_end], header.hash_size_a, 'A')?;

        // Table B is reserved for reverse lookup; the open path only checks
        // that its descriptors are well formed.
        parse_descriptors(&data[pages_a_end..heads_b_end], header.hash_size_b, 'B')?;

        Ok(Self {
            header,
            profiles,
            pages_a,
            pages_a_offset: heads_a_end,
            data,
        })
    }

    /// The table header.
    pub fn header(&self) -> &EncodingHeader {
        &self.header
    }

    /// Encoding profile strings from the string block, in file order.
    pub fn profiles(&self) -> &[String] {
        &self.profiles
    }

    /// Look up the storage keys for a content hash.
    ///
    /// The chosen page is MD5-verified against its descriptor before it is
    /// scanned.
    pub fn find(&self, hash: &CascKey) -> Result<EncodingEntry> {
        hash.expect_width(self.header.hash_size_a)?;
        let target = hash.as_bytes();

        // Descriptors are sorted ascending by first hash; the last page
        // whose first hash is <= the target can contain it.
        let index = self
            .pages_a
            .partition_point(|d| d.first_hash.as_slice() <= target);
        if index == 0 {
            return Err(Error::HashNotFound(hash.to_hex()));
        }
        let descriptor = &self.pages_a[index - 1];

        let begin = self.pages_a_offset + (index - 1) * PAGE_SIZE;
        let page = &self.data[begin..begin + PAGE_SIZE];

        let digest = md5::compute(page).0;
        if digest != descriptor.checksum {
            return Err(Error::ChecksumMismatch {
                context: "encoding page",
                expected: hex::encode(descriptor.checksum),
                actual: hex::encode(digest),
            });
        }

        self.scan_page(page, hash)
    }

    fn scan_page(&self, page: &[u8], target: &CascKey) -> Result<EncodingEntry> {
        let hash_size = self.header.hash_size_a;
        let mut offset = 0;

        loop {
            if offset + 6 + hash_size > page.len() {
                break;
            }

            let key_count = u16::from(page[offset]) | u16::from(page[offset + 1]) << 8;
            if key_count == 0 {
                break;
            }
            offset += 2;

            let file_size = BigEndian::read_u32(&page[offset..offset + 4]);
            offset += 4;

            let hash = &page[offset..offset + hash_size];
            offset += hash_size;

            let keys_len = key_count as usize * hash_size;
            if offset + keys_len > page.len() {
                break;
            }

            if hash == target.as_bytes() {
                let keys = page[offset..offset + keys_len]
                    .chunks_exact(hash_size)
                    .map(CascKey::from_bytes)
                    .collect();

                trace!("found {key_count} keys for {target}");
                return Ok(EncodingEntry {
                    content_hash: target.clone(),
                    keys,
                    file_size,
                });
            }

            offset += keys_len;
        }

        Err(Error::HashNotFound(target.to_hex()))
    }
}

fn parse_descriptors(data: &[u8], hash_size: usize, table: char) -> Result<Vec<PageDescriptor>> {
    let mut descriptors = Vec::with_capacity(data.len() / (hash_size + 16));

    for entry in data.chunks_exact(hash_size + 16) {
        let mut checksum = [0u8; 16];
        checksum.copy_from_slice(&entry[hash_size..]);

        let descriptor = PageDescriptor {
            first_hash: entry[..hash_size].to_vec(),
            checksum,
        };

        if descriptors
            .last()
            .is_some_and(|previous: &PageDescriptor| previous.first_hash > descriptor.first_hash)
        {
            return Err(Error::UnsortedPages { table });
        }

        descriptors.push(descriptor);
    }

    Ok(descriptors)
}
