//! Bounded byte windows over memory buffers or shared file handles

use std::fs::File;
use std::io::{Read, Seek, SeekFrom};
use std::sync::{Arc, Mutex, PoisonError};

use crate::{Error, Result};

#[derive(Debug, Clone)]
enum Backing {
    Memory(Arc<Vec<u8>>),
    File(Arc<Mutex<File>>),
}

/// A bounded, cheaply cloneable byte window.
///
/// Either an owned in-memory buffer or a `[begin, end)` range of a shared
/// read handle. All offsets passed to [`BlockSource::get`] are relative to
/// the start of the window.
#[derive(Debug, Clone)]
pub struct BlockSource {
    backing: Backing,
    begin: u64,
    end: u64,
}

impl BlockSource {
    /// Create a source over an owned buffer.
    pub fn memory(data: Vec<u8>) -> Self {
        let end = data.len() as u64;
        Self {
            backing: Backing::Memory(Arc::new(data)),
            begin: 0,
            end,
        }
    }

    /// Create a source over `[begin, end)` of a shared file handle.
    pub fn file(handle: Arc<Mutex<File>>, begin: u64, end: u64) -> Self {
        Self {
            backing: Backing::File(handle),
            begin,
            end,
        }
    }

    /// Number of bytes in the window.
    pub fn len(&self) -> u64 {
        self.end - self.begin
    }

    /// `true` if the window is empty.
    pub fn is_empty(&self) -> bool {
        self.begin == self.end
    }

    /// Narrow the window to `[begin, end)`, relative to this window.
    pub fn slice(&self, begin: u64, end: u64) -> Result<Self> {
        if begin > end || end > self.len() {
            return Err(Error::OutOfRange {
                offset: end,
                length: self.len(),
            });
        }

        Ok(Self {
            backing: self.backing.clone(),
            begin: self.begin + begin,
            end: self.begin + end,
        })
    }

    /// Read up to `count` bytes starting at `offset` within the window.
    ///
    /// The count is clamped to the window end; an offset past the end is an
    /// error rather than an empty read.
    pub fn get(&self, offset: u64, count: usize) -> Result<Vec<u8>> {
        if offset > self.len() {
            return Err(Error::OutOfRange {
                offset,
                length: self.len(),
            });
        }

        let count = count.min((self.len() - offset) as usize);

        match &self.backing {
            Backing::Memory(data) => {
                let start = (self.begin + offset) as usize;
                Ok(data[start..start + count].to_vec())
            }
            Backing::File(handle) => {
                let mut f = handle.lock().unwrap_or_else(PoisonError::into_inner);
                f.seek(SeekFrom::Start(self.begin + offset))?;

                let mut buf = vec![0u8; count];
                f.read_exact(&mut buf)?;
                Ok(buf)
            }
        }
    }

    /// Read exactly `count` bytes starting at `offset` within the window.
    pub fn get_exact(&self, offset: u64, count: usize) -> Result<Vec<u8>> {
        let buf = self.get(offset, count)?;
        if buf.len() != count {
            return Err(Error::Truncated {
                expected: count,
                actual: buf.len(),
            });
        }
        Ok(buf)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn memory_get_clamps_count() {
        let source = BlockSource::memory(b"hello world".to_vec());
        assert_eq!(source.get(6, 100).unwrap(), b"world");
        assert_eq!(source.get(11, 4).unwrap(), b"");
    }

    #[test]
    fn memory_get_rejects_out_of_range_offset() {
        let source = BlockSource::memory(b"hi".to_vec());
        assert!(matches!(
            source.get(3, 1),
            Err(Error::OutOfRange { offset: 3, .. })
        ));
    }

    #[test]
    fn slice_narrows_window() {
        let source = BlockSource::memory(b"0123456789".to_vec());
        let inner = source.slice(2, 7).unwrap();
        assert_eq!(inner.len(), 5);
        assert_eq!(inner.get(0, 5).unwrap(), b"23456");

        // Slices compose relative to the current window.
        let nested = inner.slice(1, 3).unwrap();
        assert_eq!(nested.get(0, 10).unwrap(), b"34");
    }

    #[test]
    fn slice_rejects_invalid_bounds() {
        let source = BlockSource::memory(b"abc".to_vec());
        assert!(source.slice(2, 1).is_err());
        assert!(source.slice(0, 4).is_err());
    }

    #[test]
    fn clones_share_backing() {
        let source = BlockSource::memory(b"shared".to_vec());
        let copy = source.clone();
        assert_eq!(source.get(0, 6).unwrap(), copy.get(0, 6).unwrap());
    }
}
