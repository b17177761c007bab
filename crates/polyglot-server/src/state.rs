//! Shared application state.
//!
//! This module provides [`AppState`], which holds shared resources
//! across all HTTP request handlers.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use polyglot_common::{BundleEntry, METADATA_FILE, RuntimeConfig, RuntimeError};
use polyglot_core::{BundleRegistry, WasmEngine};
use tracing::info;

use crate::dispatch::Dispatcher;
use crate::upload::Uploader;

/// Shared state across all request handlers.
///
/// This struct is cloned for each request; the registry, sandbox and
/// uploader behind it are shared.
#[derive(Debug, Clone)]
pub struct AppState {
    dispatcher: Dispatcher,
    uploader: Uploader,
}

impl AppState {
    /// Create new application state with an empty registry.
    ///
    /// Uploaded bundles are extracted under `bundle_dir`.
    ///
    /// # Errors
    ///
    /// Returns an error if the engine or sandbox cannot be created.
    pub fn new(config: &RuntimeConfig, bundle_dir: impl Into<PathBuf>) -> Result<Self, RuntimeError> {
        let dispatcher = Dispatcher::from_config(config)?;
        let uploader = Uploader::new(bundle_dir, Arc::clone(dispatcher.registry()));

        Ok(Self {
            dispatcher,
            uploader,
        })
    }

    /// Get the dispatcher.
    pub fn dispatcher(&self) -> &Dispatcher {
        &self.dispatcher
    }

    /// Get the uploader.
    pub fn uploader(&self) -> &Uploader {
        &self.uploader
    }

    /// Get the bundle registry.
    pub fn registry(&self) -> &BundleRegistry {
        self.dispatcher.registry()
    }

    /// Get the Wasmtime engine.
    pub fn engine(&self) -> &WasmEngine {
        self.dispatcher.sandbox().engine()
    }

    /// Register an already extracted bundle directory.
    ///
    /// # Errors
    ///
    /// Returns an error if `metadata.json` cannot be read or the bundle is
    /// invalid.
    pub fn register_directory(&self, name: &str, directory: &Path) -> Result<(), RuntimeError> {
        let document = std::fs::read(directory.join(METADATA_FILE)).map_err(|e| {
            RuntimeError::invalid_bundle(format!(
                "cannot read {} in {}: {e}",
                METADATA_FILE,
                directory.display()
            ))
        })?;

        self.registry().register(name, &document, directory)?;
        Ok(())
    }

    /// Register the bundles listed in the configuration file.
    ///
    /// # Errors
    ///
    /// Stops at the first entry that cannot be registered.
    pub fn preload(&self, entries: &[BundleEntry]) -> Result<usize, RuntimeError> {
        for entry in entries {
            self.register_directory(&entry.name, Path::new(&entry.path))?;
        }

        if !entries.is_empty() {
            info!(count = entries.len(), "Preloaded bundles");
        }
        Ok(entries.len())
    }
}
