//! Top-level archive façade
//!
//! Composes the allocator, shadow memory, bucket indices, encoding table
//! and the optional filesystem resolver into the three open APIs:
//! by storage key, by content hash, by logical filename.

use std::io::{BufReader, Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};

use tracing::debug;

use casc_blte::{BlteStream, EncodingMode};
use casc_tact::{BuildConfig, BuildInfo, CascKey, ConfigFile, EncodingTable};

use crate::index::{IDX_FORMAT_VERSION, IdxFile, IdxHeader, Index, bucket_for_key};
use crate::paths::StreamAllocator;
use crate::reference::{FieldWidths, Reference};
use crate::resolver::{NameResolver, ResolverRegistry};
use crate::shmem::ShadowMemory;
use crate::{CascError, Result};

/// An opened CASC archive.
///
/// The parsed tables are immutable after construction. Streams returned by
/// the open APIs own their file handles and stay valid after the container
/// is dropped.
pub struct Container {
    allocator: StreamAllocator,
    build_info: BuildInfo,
    build_config: BuildConfig,
    cdn_config: ConfigFile,
    shmem: ShadowMemory,
    index: Index,
    encoding: EncodingTable,
    resolver: Option<Box<dyn NameResolver>>,
}

impl Container {
    /// Open the archive rooted at `root` with its data under
    /// `root/<data_subdir>`. No filename resolvers are available; use
    /// [`Container::open_with_resolvers`] to supply them.
    pub fn open(root: impl AsRef<Path>, data_subdir: &str) -> Result<Self> {
        Self::open_with_resolvers(root, data_subdir, &ResolverRegistry::new())
    }

    /// Open the archive, building the filename resolver for its program
    /// code from `registry` when one is registered.
    pub fn open_with_resolvers(
        root: impl AsRef<Path>,
        data_subdir: &str,
        registry: &ResolverRegistry,
    ) -> Result<Self> {
        let root = root.as_ref();

        let info_path = root.join(".build.info");
        let info_text = std::fs::read_to_string(&info_path)
            .map_err(|_| CascError::FileNotFound(info_path))?;
        let build_info = BuildInfo::parse(&info_text)?;

        let row = build_info
            .active_row()
            .ok_or_else(|| CascError::InvalidIndexFormat("build info has no rows".into()))?;
        let build_key = row.require("Build Key")?;
        let cdn_key = row.require("CDN Key")?;
        debug!("active build {build_key}, cdn {cdn_key}");

        let allocator = StreamAllocator::new(root.join(data_subdir));

        let build_config =
            BuildConfig::parse(BufReader::new(allocator.open_config(build_key)?))?;
        let cdn_config = ConfigFile::parse(BufReader::new(allocator.open_config(cdn_key)?))?;

        let shmem = ShadowMemory::parse_file(&allocator.shmem_path())?;
        let index = Index::load(&allocator, &shmem.versions)?;

        let encoding_key = build_config.require_encoding_key()?.clone();
        let mut encoding_stream = open_record(&allocator, &index, &encoding_key)?;
        let mut encoding_bytes = Vec::new();
        encoding_stream.read_to_end(&mut encoding_bytes)?;
        let encoding = EncodingTable::parse(encoding_bytes)?;

        let mut container = Self {
            allocator,
            build_info,
            build_config,
            cdn_config,
            shmem,
            index,
            encoding,
            resolver: None,
        };

        container.resolver = container.build_resolver(registry)?;
        Ok(container)
    }

    fn build_resolver(
        &self,
        registry: &ResolverRegistry,
    ) -> Result<Option<Box<dyn NameResolver>>> {
        let (Some(uid), Some(root_hash)) =
            (&self.build_config.build_uid, &self.build_config.root)
        else {
            return Ok(None);
        };

        if !registry.contains(uid) {
            return Ok(None);
        }

        let mut root_stream = self.open_by_hash(root_hash)?;
        registry.build(uid, &mut root_stream).map(Some)
    }

    /// Open a stored file by its storage key.
    pub fn open_by_key(&self, key: &CascKey) -> Result<BlteStream> {
        open_record(&self.allocator, &self.index, key)
    }

    /// Open a stored file by the MD5 of its content.
    pub fn open_by_hash(&self, hash: &CascKey) -> Result<BlteStream> {
        let entry = self.encoding.find(hash).map_err(|e| match e {
            casc_tact::Error::HashNotFound(h) => CascError::HashNotFound(h),
            other => CascError::Tact(other),
        })?;

        // Several alternate encodings may exist; the first key is canonical.
        let key = entry
            .keys
            .first()
            .ok_or_else(|| CascError::HashNotFound(hash.to_hex()))?;
        self.open_by_key(key)
    }

    /// Open a stored file by its game-specific logical filename.
    pub fn open_by_name(&self, path: &str) -> Result<BlteStream> {
        let resolver = self.resolver.as_ref().ok_or_else(|| {
            CascError::UnsupportedProduct(
                self.build_config.build_uid.clone().unwrap_or_default(),
            )
        })?;

        let hash = resolver.find(path)?;
        self.open_by_hash(&hash)
    }

    /// The parsed `.build.info` table.
    pub fn build_info(&self) -> &BuildInfo {
        &self.build_info
    }

    /// The parsed build config.
    pub fn build_config(&self) -> &BuildConfig {
        &self.build_config
    }

    /// The parsed CDN config.
    pub fn cdn_config(&self) -> &ConfigFile {
        &self.cdn_config
    }

    /// The parsed shadow memory snapshot.
    pub fn shmem(&self) -> &ShadowMemory {
        &self.shmem
    }

    /// The merged bucket index.
    pub fn index(&self) -> &Index {
        &self.index
    }

    /// The encoding table.
    pub fn encoding(&self) -> &EncodingTable {
        &self.encoding
    }

    /// The directory holding the archive's data files.
    pub fn data_dir(&self) -> PathBuf {
        self.allocator.data_dir()
    }
}

/// Write-side operations: ingest new records into the pooled data files,
/// updating the touched index bucket and the shadow memory on disk.
impl Container {
    /// Store `content` as a new record, chunked per the encoding profile
    /// (`"z"`, `"16K*=z"`, ...). Returns the record's reference; the new
    /// storage key is immediately openable through
    /// [`Container::open_by_key`].
    ///
    /// The encoding table is not rewritten, so the content hash of a
    /// stored file does not become resolvable.
    pub fn store(&mut self, content: &[u8], profile: &str) -> Result<Reference> {
        let plan = plan_from_profile(profile)?;
        let record = casc_blte::build_record_planned(content, &plan)?;

        let span = self.shmem.reserve(record.len() as u32)?;
        debug!(
            "storing {} byte record in data.{:03} at {:#x}",
            record.len(),
            span.file,
            span.offset
        );

        let path = self.allocator.data_path(span.file);
        let mut data_file = self.allocator.open_create(&path)?;
        data_file.seek(SeekFrom::Start(span.offset))?;
        data_file.write_all(&record)?;

        let key = CascKey::from_bytes(&md5::compute(&record).0[..9]);
        let reference = Reference {
            key: key.clone(),
            file: span.file,
            offset: span.offset,
            size: record.len() as u32,
        };
        self.index.insert(reference.clone());

        self.rewrite_bucket(bucket_for_key(key.as_bytes()))?;
        self.shmem.write_file(&self.allocator.shmem_path())?;

        Ok(reference)
    }

    /// Re-emit the `.idx` file of one bucket from the in-memory index.
    fn rewrite_bucket(&mut self, bucket: u8) -> Result<()> {
        let version = *self.shmem.versions.entry(bucket).or_insert(1);

        let idx = IdxFile {
            header: IdxHeader {
                version: IDX_FORMAT_VERSION,
                bucket: u16::from(bucket),
                widths: FieldWidths::STANDARD,
                ranges: Vec::new(),
            },
            entries: self.index.entries_for_bucket(bucket),
        };

        let path = self.allocator.index_path(bucket, version);
        let mut file = self.allocator.open_create(&path)?;
        idx.write(&mut file)
    }
}

/// Translate a parsed encoding profile into a chunk plan. Only the plain
/// and zlib modes can be produced locally.
fn plan_from_profile(profile: &str) -> Result<Vec<casc_blte::ChunkPlan>> {
    let blocks = casc_tact::espec::parse(profile)?;
    let mut plan = Vec::with_capacity(blocks.len());

    for block in blocks {
        let mode = match block.mode.to_ascii_uppercase() {
            b'N' => EncodingMode::None,
            b'Z' => EncodingMode::ZLib,
            other => return Err(CascError::Blte(casc_blte::Error::UnsupportedMode(other))),
        };

        // A bare mode with no size covers the whole input.
        let (size, wildcard) = match block.size {
            Some(size) => (size.bytes, size.wildcard),
            None => (u64::MAX, false),
        };

        plan.push(casc_blte::ChunkPlan {
            size,
            wildcard,
            mode,
        });
    }

    Ok(plan)
}

/// Resolve `key` through the index and open a verified stream over its
/// record. Every stream gets its own file handle.
fn open_record(
    allocator: &StreamAllocator,
    index: &Index,
    key: &CascKey,
) -> Result<BlteStream> {
    let reference = index.find(key)?.clone();
    let file = allocator.open_data(reference.file)?;

    let stream = BlteStream::open_record_in_file(
        file,
        reference.offset,
        u64::from(reference.size),
        Some(reference.key.as_bytes()),
    )?;

    Ok(stream)
}
