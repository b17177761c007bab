//! Sandboxed execution of WASM/WASI bundles.
//!
//! The request body is written to the module's standard input, the exported
//! entry function is called with no arguments, and whatever the module wrote
//! to standard output before returning is the response.

use std::sync::Arc;

use tracing::{debug, instrument};
use uuid::Uuid;

use crate::instance::InstanceRunner;
use crate::module::{CompiledModule, ModuleCache};
use crate::store::create_store;
use crate::WasmEngine;
use polyglot_common::{Bundle, ExecutionConfig, RuntimeError};

/// Runs sandboxed bundles, one fresh instance per invocation.
///
/// Shared across requests: the engine, linker and compiled-module cache are
/// read-only from an invocation's point of view.
#[derive(Debug)]
pub struct WasmSandbox {
    engine: WasmEngine,
    runner: InstanceRunner,
    cache: ModuleCache,
    config: ExecutionConfig,
}

impl WasmSandbox {
    /// Create a sandbox on top of `engine`.
    ///
    /// # Errors
    ///
    /// Returns an error if host functions cannot be linked.
    pub fn new(engine: WasmEngine, config: ExecutionConfig) -> Result<Self, RuntimeError> {
        let runner = InstanceRunner::new(engine.inner())?;
        let cache = ModuleCache::new(
            engine.config().max_cached_modules,
            engine.config().cache_compiled_modules,
        );

        Ok(Self {
            engine,
            runner,
            cache,
            config,
        })
    }

    /// The engine this sandbox runs on.
    pub fn engine(&self) -> &WasmEngine {
        &self.engine
    }

    /// Compiled-module cache.
    pub fn cache(&self) -> &ModuleCache {
        &self.cache
    }

    /// Execution limits applied to every invocation.
    pub fn config(&self) -> &ExecutionConfig {
        &self.config
    }

    /// Read and compile the bundle's module binary.
    ///
    /// # Errors
    ///
    /// Returns [`RuntimeError::EntrypointMissing`] if the binary does not
    /// exist, or a compilation error if it is not a valid module.
    pub async fn load(&self, bundle: &Bundle) -> Result<Arc<CompiledModule>, RuntimeError> {
        let path = bundle.require_entrypoint()?;
        let bytes = tokio::fs::read(&path).await?;
        debug!(path = %path.display(), bytes = bytes.len(), "Module binary read");

        self.cache.get_or_compile(self.engine.inner(), &bytes)
    }

    /// Invoke `bundle` with `input` on standard input.
    ///
    /// Returns the captured standard output decoded as text. The store and
    /// every WASI resource are released before this returns, on success and
    /// on failure.
    ///
    /// # Errors
    ///
    /// Returns a load error (missing binary, compilation, instantiation,
    /// missing entry function) or an execution error (trap, non-zero exit,
    /// fuel, timeout, output overflow).
    #[instrument(skip(self, bundle, input), fields(bundle = %bundle.name(), input_len = input.len()))]
    pub async fn run(&self, bundle: &Bundle, input: &[u8]) -> Result<String, RuntimeError> {
        let module = self.load(bundle).await?;

        let request_id = Uuid::new_v4().to_string();
        let (mut store, io) = create_store(
            &self.engine,
            &self.config,
            request_id,
            bundle.name(),
            input,
        )?;

        let result = self
            .runner
            .invoke(
                &module,
                &mut store,
                bundle.name(),
                &self.config.entry_point,
                self.config.timeout_ms,
            )
            .await;

        let mut context = store.into_data();
        context.logs.log_stream(&io.stderr.contents());
        debug!(
            fuel_consumed = context.metrics.fuel_consumed,
            duration_ms = context.metrics.duration.map(|d| d.as_millis()),
            guest_logs = context.logs.entries().len(),
            "Sandbox torn down"
        );
        drop(context);

        result?;
        io.stdout_within(self.config.max_output_bytes)
    }
}
