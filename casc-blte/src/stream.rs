//! Seekable reader over a decoded BLTE frame

use std::fs::File;
use std::io::{self, Read, Seek, SeekFrom};
use std::sync::{Arc, Mutex};

use crate::{BlockSource, BlteBuffer, Result};

/// A seekable byte stream yielding the fully decoded content of one BLTE
/// frame.
///
/// Streams are independent handles: each one owns its buffer (and through
/// it a file handle when opened from disk), so dropping the container that
/// produced a stream does not invalidate it. A stream must not be shared
/// across threads without external exclusion; reads mutate the decode
/// window.
pub struct BlteStream {
    buffer: BlteBuffer,
    position: u64,
}

impl BlteStream {
    /// Wrap an already-opened buffer.
    pub fn new(buffer: BlteBuffer) -> Self {
        Self {
            buffer,
            position: 0,
        }
    }

    /// Open a record inside an open `data.NNN` file at `[offset,
    /// offset + size)`, verifying the record MD5 against `key`.
    pub fn open_record_in_file(
        file: File,
        offset: u64,
        size: u64,
        key: Option<&[u8]>,
    ) -> Result<Self> {
        let source = BlockSource::file(Arc::new(Mutex::new(file)), offset, offset + size);
        let buffer = match key {
            Some(key) => BlteBuffer::open_record_verified(&source, key)?,
            None => BlteBuffer::open_record(&source)?,
        };
        Ok(Self::new(buffer))
    }

    /// Open a raw in-memory BLTE frame (no outer data header).
    pub fn open_frame_bytes(data: Vec<u8>) -> Result<Self> {
        Ok(Self::new(BlteBuffer::open_frame(&BlockSource::memory(
            data,
        ))?))
    }

    /// Logical length of the stream; for single-chunk records this is the
    /// outer header's record size and reads may end short of it.
    pub fn len(&self) -> u64 {
        self.buffer.len()
    }

    /// `true` if the stream decodes to nothing.
    pub fn is_empty(&self) -> bool {
        self.buffer.is_empty()
    }

    /// Current read position in decoded bytes.
    pub fn position(&self) -> u64 {
        self.position
    }

    /// Close the stream, releasing its buffer and file handle.
    pub fn close(self) {}
}

impl Read for BlteStream {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        let n = self.buffer.read_at(self.position, buf)?;
        self.position += n as u64;
        Ok(n)
    }
}

impl Seek for BlteStream {
    fn seek(&mut self, pos: SeekFrom) -> io::Result<u64> {
        let target = match pos {
            SeekFrom::Start(offset) => i128::from(offset),
            SeekFrom::Current(delta) => i128::from(self.position) + i128::from(delta),
            SeekFrom::End(delta) => i128::from(self.buffer.len()) + i128::from(delta),
        };

        if target < 0 {
            return Err(io::Error::new(
                io::ErrorKind::InvalidInput,
                "seek before start of stream",
            ));
        }

        self.position = target as u64;
        Ok(self.position)
    }
}
