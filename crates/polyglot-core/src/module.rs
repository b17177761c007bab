//! WebAssembly module compilation and caching.
//!
//! This module provides [`CompiledModule`], a wrapper around Wasmtime's
//! [`Module`], and [`ModuleCache`], which keeps compiled code keyed by the
//! SHA-256 of the binary.
//!
//! Only compiled machine code is cached. Instances, stores and WASI state are
//! created fresh for every invocation.

use std::sync::Arc;
use std::time::Instant;

use dashmap::DashMap;
use sha2::{Digest, Sha256};
use tracing::{debug, info, instrument};
use wasmtime::{Engine, Module};

use polyglot_common::RuntimeError;

/// A compiled WebAssembly core module.
///
/// `CompiledModule` is thread-safe and can be shared across concurrent
/// invocations; the underlying Wasmtime module is immutable.
#[derive(Clone)]
pub struct CompiledModule {
    /// The compiled Wasmtime module.
    inner: Module,

    /// SHA-256 of the original Wasm bytes, hex encoded.
    content_hash: String,

    /// When this module was compiled.
    compiled_at: Instant,
}

impl CompiledModule {
    /// Compile a core module from WebAssembly bytes.
    ///
    /// # Errors
    ///
    /// Returns an error if the bytes are not a valid Wasm binary.
    #[instrument(skip(engine, bytes), fields(bytes_len = bytes.len()))]
    pub fn from_bytes(engine: &Engine, bytes: &[u8]) -> Result<Self, RuntimeError> {
        Self::validate_wasm_header(bytes)?;
        Self::from_hashed_bytes(engine, bytes, compute_hash(bytes))
    }

    fn from_hashed_bytes(
        engine: &Engine,
        bytes: &[u8],
        content_hash: String,
    ) -> Result<Self, RuntimeError> {
        let start = Instant::now();

        let module = Module::new(engine, bytes).map_err(|e| {
            RuntimeError::compilation_failed(format!("Core module compilation failed: {e}"))
        })?;

        info!(
            content_hash = %content_hash,
            duration_ms = start.elapsed().as_millis(),
            "Core module compiled"
        );

        Ok(Self {
            inner: module,
            content_hash,
            compiled_at: Instant::now(),
        })
    }

    /// Get the content hash of the original Wasm bytes.
    pub fn content_hash(&self) -> &str {
        &self.content_hash
    }

    /// Get when this module was compiled.
    pub fn compiled_at(&self) -> Instant {
        self.compiled_at
    }

    /// Get the inner Wasmtime module.
    pub fn as_module(&self) -> &Module {
        &self.inner
    }

    /// Names of all exports declared by the module.
    pub fn export_names(&self) -> Vec<String> {
        self.inner
            .exports()
            .map(|export| export.name().to_string())
            .collect()
    }

    /// Validate WebAssembly header (magic number).
    fn validate_wasm_header(bytes: &[u8]) -> Result<(), RuntimeError> {
        if bytes.len() < 8 {
            return Err(RuntimeError::compilation_failed(
                "Invalid Wasm: file too small",
            ));
        }

        if &bytes[0..4] != b"\0asm" {
            return Err(RuntimeError::compilation_failed(
                "Invalid Wasm: bad magic number",
            ));
        }

        Ok(())
    }
}

impl std::fmt::Debug for CompiledModule {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CompiledModule")
            .field("content_hash", &self.content_hash)
            .finish_non_exhaustive()
    }
}

/// Compiled-module cache keyed by content hash.
///
/// Re-uploading a bundle with an identical binary reuses the compiled code;
/// a changed binary hashes differently and is compiled on first use.
pub struct ModuleCache {
    modules: DashMap<String, Arc<CompiledModule>>,
    capacity: usize,
    enabled: bool,
}

impl ModuleCache {
    /// Create a cache holding at most `capacity` modules.
    ///
    /// A disabled cache compiles on every call.
    pub fn new(capacity: usize, enabled: bool) -> Self {
        Self {
            modules: DashMap::new(),
            capacity: capacity.max(1),
            enabled,
        }
    }

    /// Return the cached module for `bytes`, compiling it on a miss.
    ///
    /// # Errors
    ///
    /// Returns an error if compilation fails. Failures are not cached.
    pub fn get_or_compile(
        &self,
        engine: &Engine,
        bytes: &[u8],
    ) -> Result<Arc<CompiledModule>, RuntimeError> {
        CompiledModule::validate_wasm_header(bytes)?;
        let hash = compute_hash(bytes);

        if self.enabled {
            if let Some(module) = self.modules.get(&hash) {
                debug!(content_hash = %hash, "Compiled module cache hit");
                return Ok(Arc::clone(module.value()));
            }
        }

        let module = Arc::new(CompiledModule::from_hashed_bytes(engine, bytes, hash.clone())?);

        if self.enabled {
            if self.modules.len() >= self.capacity {
                self.evict_oldest();
            }
            self.modules.insert(hash, Arc::clone(&module));
        }

        Ok(module)
    }

    fn evict_oldest(&self) {
        let oldest = self
            .modules
            .iter()
            .min_by_key(|entry| entry.value().compiled_at())
            .map(|entry| entry.key().clone());

        if let Some(hash) = oldest {
            self.modules.remove(&hash);
            debug!(content_hash = %hash, "Evicted compiled module");
        }
    }

    /// Number of cached modules.
    pub fn len(&self) -> usize {
        self.modules.len()
    }

    /// Returns `true` if nothing is cached.
    pub fn is_empty(&self) -> bool {
        self.modules.is_empty()
    }
}

impl std::fmt::Debug for ModuleCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ModuleCache")
            .field("len", &self.modules.len())
            .field("capacity", &self.capacity)
            .field("enabled", &self.enabled)
            .finish()
    }
}

/// SHA-256 of the given bytes, hex encoded.
fn compute_hash(bytes: &[u8]) -> String {
    hex::encode(Sha256::digest(bytes))
}
