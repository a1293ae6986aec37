//! Path conventions of the on-disk archive and file opening
//!
//! Relative to the archive's data directory (`<root>/<data_subdir>`):
//!
//! ```text
//! config/<hh>/<hh>/<hash>     hashed config blobs
//! data/data.NNN               pooled data files
//! data/<BB><VVVVVVVV>.idx     bucket index files
//! data/shmem                  shadow memory
//! ```

use std::fs::{File, OpenOptions};
use std::path::{Path, PathBuf};

use crate::{CascError, Result};

/// Resolves the archive's path conventions and opens its files.
#[derive(Debug, Clone)]
pub struct StreamAllocator {
    base: PathBuf,
}

impl StreamAllocator {
    /// Create an allocator over the archive data directory.
    pub fn new(base: impl Into<PathBuf>) -> Self {
        Self { base: base.into() }
    }

    /// The archive data directory.
    pub fn base(&self) -> &Path {
        &self.base
    }

    /// The directory holding data, index and shmem files.
    pub fn data_dir(&self) -> PathBuf {
        self.base.join("data")
    }

    /// Path of a hashed config blob: `config/<hh>/<hh>/<hash>`.
    pub fn config_path(&self, hash: &str) -> PathBuf {
        let mut path = self.base.join("config");
        if hash.len() >= 4 {
            path.push(&hash[0..2]);
            path.push(&hash[2..4]);
        }
        path.push(hash);
        path
    }

    /// Path of a pooled data file: `data/data.NNN`.
    pub fn data_path(&self, file: u32) -> PathBuf {
        self.data_dir().join(format!("data.{file:03}"))
    }

    /// Path of a bucket index file: `data/<BB><VVVVVVVV>.idx`.
    pub fn index_path(&self, bucket: u8, version: u32) -> PathBuf {
        self.data_dir().join(format!("{bucket:02x}{version:08x}.idx"))
    }

    /// Path of the shadow memory file: `data/shmem`.
    pub fn shmem_path(&self) -> PathBuf {
        self.data_dir().join("shmem")
    }

    /// Path of a patch file: `patch/<name>`.
    pub fn patch_path(&self, name: &str) -> PathBuf {
        self.base.join("patch").join(name)
    }

    /// Open a file read-only; a missing file reports the attempted path.
    pub fn open_read(&self, path: &Path) -> Result<File> {
        File::open(path).map_err(|e| match e.kind() {
            std::io::ErrorKind::NotFound => CascError::FileNotFound(path.to_path_buf()),
            _ => CascError::Io(e),
        })
    }

    /// Open a file read-write without truncating it.
    pub fn open_write(&self, path: &Path) -> Result<File> {
        OpenOptions::new()
            .read(true)
            .write(true)
            .open(path)
            .map_err(|e| match e.kind() {
                std::io::ErrorKind::NotFound => CascError::FileNotFound(path.to_path_buf()),
                _ => CascError::Io(e),
            })
    }

    /// Open a file read-write, creating it when absent.
    pub fn open_create(&self, path: &Path) -> Result<File> {
        Ok(OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .open(path)?)
    }

    /// Open a config blob by its hash string.
    pub fn open_config(&self, hash: &str) -> Result<File> {
        self.open_read(&self.config_path(hash))
    }

    /// Open a pooled data file by number.
    pub fn open_data(&self, file: u32) -> Result<File> {
        self.open_read(&self.data_path(file))
    }

    /// Open a bucket index file.
    pub fn open_index(&self, bucket: u8, version: u32) -> Result<File> {
        self.open_read(&self.index_path(bucket, version))
    }

    /// Open the shadow memory file.
    pub fn open_shmem(&self) -> Result<File> {
        self.open_read(&self.shmem_path())
    }
}
