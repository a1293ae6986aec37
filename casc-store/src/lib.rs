//! Read-side access to local CASC archives
//!
//! A CASC archive pools its files into `data.NNN` blobs, addressed through
//! bucketed `.idx` files, tracked by a `shmem` snapshot, and described by
//! config files and an encoding table. This crate joins those pieces into
//! a [`Container`] that opens any stored file by storage key, content hash
//! or logical filename and returns a seekable decoded stream.
//!
//! ```no_run
//! use casc_store::{CascKey, Container};
//! use std::io::Read;
//!
//! # fn main() -> casc_store::Result<()> {
//! let container = Container::open("/games/wow", "Data")?;
//! let mut stream =
//!     container.open_by_hash(&CascKey::from_hex("eee756b2f8307b30bad5fd99393d03c9")?)?;
//!
//! let mut magic = [0u8; 4];
//! stream.read_exact(&mut magic)?;
//! # Ok(())
//! # }
//! ```

pub mod container;
pub mod index;
pub mod jenkins;
pub mod paths;
pub mod reference;
pub mod resolver;
pub mod shmem;

mod error;

pub use container::Container;
pub use error::{CascError, Result};
pub use index::{BUCKET_COUNT, Index, bucket_for_key};
pub use paths::StreamAllocator;
pub use reference::{FieldWidths, Reference};
pub use resolver::{NameResolver, ResolverRegistry};
pub use shmem::{FreeSpan, ShadowMemory};

// The stream type handed out by the container and the key type it is
// addressed with.
pub use casc_blte::BlteStream;
pub use casc_tact::CascKey;
