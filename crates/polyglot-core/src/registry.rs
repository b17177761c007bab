//! Concurrent bundle registry.

use std::path::PathBuf;
use std::sync::Arc;

use dashmap::DashMap;
use tracing::{debug, info, instrument};

use polyglot_common::{Bundle, BundleMetadata, RuntimeError};

/// Name to bundle mapping shared by the upload path and the dispatcher.
///
/// Entries are `Arc<Bundle>`: replacing a name swaps the pointer, so a reader
/// always sees a complete bundle and in-flight invocations keep the bundle
/// they started with.
#[derive(Debug, Default)]
pub struct BundleRegistry {
    bundles: DashMap<String, Arc<Bundle>>,
}

impl BundleRegistry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert `bundle` under `name`, replacing any previous entry.
    ///
    /// Returns the replaced bundle, if any.
    pub fn put(&self, name: impl Into<String>, bundle: Bundle) -> Option<Arc<Bundle>> {
        self.bundles.insert(name.into(), Arc::new(bundle))
    }

    /// Current bundle registered under `name`.
    ///
    /// # Errors
    ///
    /// Returns [`RuntimeError::BundleNotFound`] for an unknown name.
    pub fn get(&self, name: &str) -> Result<Arc<Bundle>, RuntimeError> {
        self.bundles
            .get(name)
            .map(|entry| Arc::clone(entry.value()))
            .ok_or_else(|| RuntimeError::bundle_not_found(name))
    }

    /// Parse `metadata_document`, validate the bundle and register it.
    ///
    /// Nothing is registered unless every check passes: the metadata parses,
    /// the name is valid and the entrypoint file exists in `directory`.
    ///
    /// # Errors
    ///
    /// Returns a registration error describing the first failed check.
    #[instrument(skip(self, metadata_document, directory), fields(bundle = %name))]
    pub fn register(
        &self,
        name: &str,
        metadata_document: &[u8],
        directory: impl Into<PathBuf>,
    ) -> Result<Arc<Bundle>, RuntimeError> {
        let metadata = BundleMetadata::from_slice(metadata_document)?;
        let bundle = Bundle::new(name, metadata, directory)?;

        bundle
            .require_entrypoint()
            .map_err(|e| RuntimeError::invalid_bundle(e.to_string()))?;

        let bundle = Arc::new(bundle);
        let replaced = self.bundles.insert(name.to_string(), Arc::clone(&bundle));

        info!(
            language = %bundle.metadata().language,
            directory = %bundle.directory().display(),
            replaced = replaced.is_some(),
            "Bundle registered"
        );

        Ok(bundle)
    }

    /// Registered names, sorted.
    pub fn list(&self) -> Vec<String> {
        let mut names: Vec<String> = self.bundles.iter().map(|e| e.key().clone()).collect();
        names.sort_unstable();
        debug!(count = names.len(), "Listed bundles");
        names
    }

    /// Snapshot of all registered bundles, sorted by name.
    pub fn bundles(&self) -> Vec<Arc<Bundle>> {
        let mut bundles: Vec<Arc<Bundle>> =
            self.bundles.iter().map(|e| Arc::clone(e.value())).collect();
        bundles.sort_unstable_by(|a, b| a.name().cmp(b.name()));
        bundles
    }

    /// Number of registered bundles.
    pub fn len(&self) -> usize {
        self.bundles.len()
    }

    /// Returns `true` if nothing is registered.
    pub fn is_empty(&self) -> bool {
        self.bundles.is_empty()
    }
}
