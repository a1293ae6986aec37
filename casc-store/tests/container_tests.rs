//! End-to-end container tests over a synthetic on-disk archive
//!
//! The fixture builds a complete archive the way the write paths would:
//! BLTE records pooled into `data.000`, bucket `.idx` files, a `shmem`
//! snapshot, hashed configs and a `.build.info` table.

use std::collections::HashMap;
use std::io::{Cursor, Read, Seek, SeekFrom};
use std::path::{Path, PathBuf};

use casc_blte::EncodingMode;
use casc_store::index::{IdxFile, IdxHeader};
use casc_store::{
    CascError, CascKey, Container, FieldWidths, FreeSpan, Reference, ResolverRegistry,
    ShadowMemory, StreamAllocator, bucket_for_key,
};
use tempfile::TempDir;

const ROOT_CONTENT: &[u8] = b"MFST root file body";
const ICON_CONTENT: &[u8] = b"BLP2 icon pixels, not really";

struct ArchiveBuilder {
    dir: TempDir,
    data: Vec<u8>,
    references: Vec<Reference>,
    encoding_entries: Vec<(CascKey, CascKey)>,
}

struct Archive {
    dir: TempDir,
    root_hash: CascKey,
    icon_hash: CascKey,
    icon_key: CascKey,
}

impl ArchiveBuilder {
    fn new() -> Self {
        Self {
            dir: TempDir::new().unwrap(),
            data: Vec::new(),
            references: Vec::new(),
            encoding_entries: Vec::new(),
        }
    }

    /// Store `content` as a zlib-chunked record in the pooled data blob
    /// and return its content hash.
    fn store(&mut self, content: &[u8]) -> CascKey {
        let storage_key = self.store_record(content);
        let content_hash = CascKey::from_bytes(&md5::compute(content).0);
        self.encoding_entries
            .push((content_hash.clone(), storage_key));
        content_hash
    }

    /// Store a record without an encoding-table entry; returns the full
    /// 16-byte storage key.
    fn store_record(&mut self, content: &[u8]) -> CascKey {
        let record = casc_blte::build_record(content, 4096, EncodingMode::ZLib).unwrap();
        let storage_key = CascKey::from_bytes(&md5::compute(&record).0);

        self.references.push(Reference {
            key: storage_key.truncated(9),
            file: 0,
            offset: self.data.len() as u64,
            size: record.len() as u32,
        });
        self.data.extend_from_slice(&record);

        storage_key
    }

    fn encoding_table_bytes(&self) -> Vec<u8> {
        let mut entries = self.encoding_entries.clone();
        entries.sort_by(|a, b| a.0.cmp(&b.0));

        let mut page = Vec::new();
        for (hash, key) in &entries {
            page.extend_from_slice(&1u16.to_le_bytes());
            page.extend_from_slice(&0u32.to_be_bytes());
            page.extend_from_slice(hash.as_bytes());
            page.extend_from_slice(key.as_bytes());
        }
        page.resize(4096, 0);

        let mut table = Vec::new();
        table.extend_from_slice(b"EN");
        table.push(1);
        table.push(16);
        table.push(16);
        table.extend_from_slice(&4u16.to_be_bytes());
        table.extend_from_slice(&4u16.to_be_bytes());
        table.extend_from_slice(&1u32.to_be_bytes());
        table.extend_from_slice(&0u32.to_be_bytes());
        table.push(0);
        table.extend_from_slice(&2u32.to_be_bytes());
        table.extend_from_slice(b"z\0");
        table.extend_from_slice(entries[0].0.as_bytes());
        table.extend_from_slice(&md5::compute(&page).0);
        table.extend_from_slice(&page);

        table
    }

    fn finish(mut self) -> Archive {
        let root_hash = self.store(ROOT_CONTENT);
        let icon_hash = self.store(ICON_CONTENT);
        let icon_key = self
            .encoding_entries
            .last()
            .map(|(_, key)| key.clone())
            .unwrap();

        // The encoding table is itself a stored record, addressed directly
        // by storage key from the build config.
        let encoding_bytes = self.encoding_table_bytes();
        let encoding_key = self.store_record(&encoding_bytes);

        let root = self.dir.path();
        let allocator = StreamAllocator::new(root.join("Data"));
        std::fs::create_dir_all(allocator.data_dir()).unwrap();

        std::fs::write(allocator.data_path(0), &self.data).unwrap();

        // One .idx per occupied bucket, version 1.
        let mut buckets: HashMap<u8, Vec<Reference>> = HashMap::new();
        for reference in &self.references {
            buckets
                .entry(bucket_for_key(reference.key.as_bytes()))
                .or_default()
                .push(reference.clone());
        }
        for (bucket, entries) in &buckets {
            let idx = IdxFile {
                header: IdxHeader {
                    version: 7,
                    bucket: u16::from(*bucket),
                    widths: FieldWidths::STANDARD,
                    ranges: Vec::new(),
                },
                entries: entries.clone(),
            };

            let mut bytes = Cursor::new(Vec::new());
            idx.write(&mut bytes).unwrap();
            std::fs::write(allocator.index_path(*bucket, 1), bytes.into_inner()).unwrap();
        }

        let shmem = ShadowMemory {
            data_path: allocator.data_dir(),
            versions: buckets.keys().map(|&b| (b, 1u32)).collect(),
            free_space: vec![FreeSpan {
                file: 0,
                offset: self.data.len() as u64,
                size: 0x8_0000,
            }],
        };
        shmem.write_file(&allocator.shmem_path()).unwrap();

        let build_config = format!(
            "# Build Configuration\n\n\
             root = {root_hash}\n\
             encoding = {} {}\n\
             build-uid = wow\n",
            CascKey::from_bytes(&md5::compute(&encoding_bytes).0),
            encoding_key,
        );
        let build_key = write_config(&allocator, &build_config);

        let cdn_config = "# CDN Configuration\n\narchives = deadbeefdeadbeefdeadbeefdeadbeef\n";
        let cdn_key = write_config(&allocator, cdn_config);

        let build_info = format!(
            "Branch!STRING:0|Active!DEC:1|Build Key!HEX:16|CDN Key!HEX:16|Version!STRING:0\n\
             us|1|{build_key}|{cdn_key}|6.1.0.19678\n"
        );
        std::fs::write(root.join(".build.info"), build_info).unwrap();

        Archive {
            dir: self.dir,
            root_hash,
            icon_hash,
            icon_key,
        }
    }
}

fn write_config(allocator: &StreamAllocator, content: &str) -> String {
    let hash = hex::encode(md5::compute(content.as_bytes()).0);
    let path = allocator.config_path(&hash);
    std::fs::create_dir_all(path.parent().unwrap()).unwrap();
    std::fs::write(path, content).unwrap();
    hash
}

fn build_archive() -> Archive {
    ArchiveBuilder::new().finish()
}

impl Archive {
    fn root(&self) -> &Path {
        self.dir.path()
    }
}

struct RootResolver {
    table: HashMap<String, CascKey>,
}

impl casc_store::NameResolver for RootResolver {
    fn find(&self, path: &str) -> casc_store::Result<CascKey> {
        self.table
            .get(&path.to_lowercase())
            .cloned()
            .ok_or_else(|| CascError::FilenameNotFound(path.to_string()))
    }
}

fn wow_registry(icon_hash: &CascKey) -> ResolverRegistry {
    let icon_hash = icon_hash.clone();
    let mut registry = ResolverRegistry::new();

    registry.register("wow", move |root| {
        // A real resolver parses the root file; here it only proves the
        // stream it was handed is the root record.
        let mut magic = [0u8; 4];
        root.read_exact(&mut magic)?;
        assert_eq!(&magic, b"MFST");

        Ok(Box::new(RootResolver {
            table: HashMap::from([(
                "interface/icons/foo.blp".to_string(),
                icon_hash.clone(),
            )]),
        }))
    });

    registry
}

#[test]
fn open_by_key_returns_decoded_content() {
    let archive = build_archive();
    let container = Container::open(archive.root(), "Data").unwrap();

    let mut stream = container.open_by_key(&archive.icon_key).unwrap();
    assert_eq!(stream.len(), ICON_CONTENT.len() as u64);

    let mut out = Vec::new();
    stream.read_to_end(&mut out).unwrap();
    assert_eq!(out, ICON_CONTENT);
}

#[test]
fn open_by_hash_resolves_through_encoding() {
    let archive = build_archive();
    let container = Container::open(archive.root(), "Data").unwrap();

    let mut stream = container.open_by_hash(&archive.root_hash).unwrap();
    assert!(!stream.is_empty());

    let mut magic = [0u8; 4];
    stream.read_exact(&mut magic).unwrap();
    assert_eq!(&magic, b"MFST");
}

#[test]
fn open_by_name_resolves_through_the_registered_resolver() {
    let archive = build_archive();
    let container = Container::open_with_resolvers(
        archive.root(),
        "Data",
        &wow_registry(&archive.icon_hash),
    )
    .unwrap();

    let mut stream = container.open_by_name("Interface/Icons/FOO.blp").unwrap();
    let mut out = Vec::new();
    stream.read_to_end(&mut out).unwrap();
    assert_eq!(out, ICON_CONTENT);

    assert!(matches!(
        container.open_by_name("no/such/file"),
        Err(CascError::FilenameNotFound(_))
    ));
}

#[test]
fn open_by_name_without_resolver_is_unsupported() {
    let archive = build_archive();
    let container = Container::open(archive.root(), "Data").unwrap();

    assert!(matches!(
        container.open_by_name("Interface/Icons/foo.blp"),
        Err(CascError::UnsupportedProduct(product)) if product == "wow"
    ));
}

#[test]
fn unknown_identifiers_are_not_found() {
    let archive = build_archive();
    let container = Container::open(archive.root(), "Data").unwrap();

    let missing_key = CascKey::from_bytes(&[0x5A; 9]);
    assert!(matches!(
        container.open_by_key(&missing_key),
        Err(CascError::KeyNotFound(_))
    ));

    let missing_hash = CascKey::from_bytes(&[0x5B; 16]);
    assert!(matches!(
        container.open_by_hash(&missing_hash),
        Err(CascError::HashNotFound(_))
    ));
}

#[test]
fn streams_survive_container_drop() {
    let archive = build_archive();

    let mut stream = {
        let container = Container::open(archive.root(), "Data").unwrap();
        container.open_by_hash(&archive.icon_hash).unwrap()
    };

    stream.seek(SeekFrom::Start(5)).unwrap();
    let mut out = Vec::new();
    stream.read_to_end(&mut out).unwrap();
    assert_eq!(out, &ICON_CONTENT[5..]);
}

#[test]
fn shmem_snapshot_is_exposed() {
    let archive = build_archive();
    let container = Container::open(archive.root(), "Data").unwrap();

    assert!(!container.shmem().free_space.is_empty());
    assert!(container.index().len() >= 3);
    assert!(
        container
            .shmem()
            .versions
            .values()
            .all(|&version| version == 1)
    );
}

#[test]
fn stored_records_survive_a_reopen() {
    let archive = build_archive();
    let content = b"freshly ingested file body, long enough to chunk".repeat(40);

    let reference = {
        let mut container = Container::open(archive.root(), "Data").unwrap();
        let before = container.shmem().free_space[0];

        let reference = container.store(&content, "1K*=z").unwrap();

        // The donor extent shrank by the record size.
        let after = container.shmem().free_space[0];
        assert_eq!(
            u64::from(before.size - after.size),
            u64::from(reference.size)
        );

        // Readable through the same container...
        let mut stream = container.open_by_key(&reference.key).unwrap();
        let mut out = Vec::new();
        stream.read_to_end(&mut out).unwrap();
        assert_eq!(out, content);

        reference
    };

    // ...and through a fresh one, proving the idx and shmem rewrites.
    let container = Container::open(archive.root(), "Data").unwrap();
    let mut stream = container.open_by_key(&reference.key).unwrap();
    let mut out = Vec::new();
    stream.read_to_end(&mut out).unwrap();
    assert_eq!(out, content);
}

#[test]
fn store_fails_without_free_space() {
    let archive = build_archive();
    let mut container = Container::open(archive.root(), "Data").unwrap();

    // Larger than the archive's only free extent.
    let oversized = vec![0u8; 0x10_0000];
    let err = container.store(&oversized, "n").unwrap_err();
    assert!(matches!(err, CascError::NoFreeSpace { .. }));

    // Nothing was mutated; a normal store still works.
    let reference = container.store(b"fits fine", "n").unwrap();
    let mut stream = container.open_by_key(&reference.key).unwrap();
    let mut out = Vec::new();
    stream.read_to_end(&mut out).unwrap();
    assert_eq!(out, b"fits fine");
}

#[test]
fn missing_archive_reports_the_path() {
    let missing = PathBuf::from("/definitely/not/an/archive");
    assert!(matches!(
        Container::open(&missing, "Data"),
        Err(CascError::FileNotFound(path)) if path.ends_with(".build.info")
    ));
}
