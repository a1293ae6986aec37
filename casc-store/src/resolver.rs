//! Game-specific filename resolution
//!
//! Mapping a logical path like `Interface/Icons/foo.blp` to a content hash
//! requires the game family's root-file format, which is out of scope for
//! the storage core. The container instead dispatches on the build
//! config's program code (`build-uid`): hosts register one factory per
//! code, and the factory receives the opened root file to build its
//! resolver from.

use std::collections::HashMap;

use casc_blte::BlteStream;
use casc_tact::CascKey;

use crate::{CascError, Result};

/// Maps logical filenames to content hashes for one game family.
pub trait NameResolver {
    /// The content hash of `path`, or a filename-not-found error.
    fn find(&self, path: &str) -> Result<CascKey>;
}

/// Builds a [`NameResolver`] from the archive's opened root file.
pub type ResolverFactory = Box<dyn Fn(&mut BlteStream) -> Result<Box<dyn NameResolver>>>;

/// Registry of resolver factories keyed by program code.
#[derive(Default)]
pub struct ResolverRegistry {
    factories: HashMap<String, ResolverFactory>,
}

impl ResolverRegistry {
    /// An empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Register the factory for a program code (`wow`, `wowt`, ...).
    pub fn register(
        &mut self,
        product: impl Into<String>,
        factory: impl Fn(&mut BlteStream) -> Result<Box<dyn NameResolver>> + 'static,
    ) {
        self.factories.insert(product.into(), Box::new(factory));
    }

    /// `true` if a factory is registered for `product`.
    pub fn contains(&self, product: &str) -> bool {
        self.factories.contains_key(product)
    }

    /// Build the resolver for `product` from its root stream.
    pub fn build(&self, product: &str, root: &mut BlteStream) -> Result<Box<dyn NameResolver>> {
        let factory = self
            .factories
            .get(product)
            .ok_or_else(|| CascError::UnsupportedProduct(product.to_string()))?;
        factory(root)
    }
}

impl std::fmt::Debug for ResolverRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mut products: Vec<&str> = self.factories.keys().map(String::as_str).collect();
        products.sort_unstable();
        f.debug_struct("ResolverRegistry")
            .field("products", &products)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use casc_blte::EncodingMode;

    use super::*;

    struct TableResolver {
        table: HashMap<String, CascKey>,
    }

    impl NameResolver for TableResolver {
        fn find(&self, path: &str) -> Result<CascKey> {
            self.table
                .get(&path.to_lowercase())
                .cloned()
                .ok_or_else(|| CascError::FilenameNotFound(path.to_string()))
        }
    }

    fn root_stream() -> BlteStream {
        let record =
            casc_blte::build_record(b"root-table-bytes", 64, EncodingMode::None).unwrap();
        BlteStream::new(
            casc_blte::BlteBuffer::open_record(&casc_blte::BlockSource::memory(record)).unwrap(),
        )
    }

    #[test]
    fn registered_factory_receives_root() {
        let mut registry = ResolverRegistry::new();
        registry.register("wow", |root| {
            use std::io::Read;

            let mut bytes = Vec::new();
            root.read_to_end(&mut bytes).unwrap();
            assert_eq!(bytes, b"root-table-bytes");

            Ok(Box::new(TableResolver {
                table: HashMap::from([(
                    "interface/icons/foo.blp".to_string(),
                    CascKey::from_bytes(&[1; 16]),
                )]),
            }))
        });

        let resolver = registry.build("wow", &mut root_stream()).unwrap();
        assert_eq!(
            resolver.find("Interface/Icons/FOO.blp").unwrap(),
            CascKey::from_bytes(&[1; 16])
        );
        assert!(matches!(
            resolver.find("missing"),
            Err(CascError::FilenameNotFound(_))
        ));
    }

    #[test]
    fn unknown_product_is_unsupported() {
        let registry = ResolverRegistry::new();
        let err = registry.build("wow_beta", &mut root_stream()).err().unwrap();
        assert!(matches!(err, CascError::UnsupportedProduct(_)));
    }
}
