//! Execution dispatcher.
//!
//! Looks a bundle up by name and runs it with the strategy its language
//! calls for: WASM bundles go to the sandbox, everything else to an
//! interpreter.

use std::sync::Arc;
use std::time::Instant;

use tracing::{info, instrument, warn};

use polyglot_common::{
    Bundle, InvocationRequest, InvocationResponse, Language, RuntimeConfig, RuntimeError,
};
use polyglot_core::{BundleRegistry, WasmEngine, WasmSandbox};
use polyglot_script::ScriptRuntime;

/// How a bundle is executed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Strategy {
    /// Compiled module in a fresh WASI sandbox.
    Sandboxed,
    /// Source evaluated by a fresh interpreter process.
    Interpreted,
}

impl Strategy {
    /// Strategy for bundles declaring `language`.
    pub fn for_language(language: Language) -> Self {
        if language.is_sandboxed() {
            Self::Sandboxed
        } else {
            Self::Interpreted
        }
    }
}

/// Routes invocations to the execution strategies.
///
/// Cheap to clone; clones share the registry and the sandbox.
#[derive(Debug, Clone)]
pub struct Dispatcher {
    registry: Arc<BundleRegistry>,
    sandbox: Arc<WasmSandbox>,
    scripts: ScriptRuntime,
}

impl Dispatcher {
    /// Create a dispatcher over existing components.
    pub fn new(
        registry: Arc<BundleRegistry>,
        sandbox: Arc<WasmSandbox>,
        scripts: ScriptRuntime,
    ) -> Self {
        Self {
            registry,
            sandbox,
            scripts,
        }
    }

    /// Build the engine, the sandbox and an empty registry from `config`.
    ///
    /// # Errors
    ///
    /// Returns an error if the Wasmtime engine or linker cannot be created.
    pub fn from_config(config: &RuntimeConfig) -> Result<Self, RuntimeError> {
        let engine = WasmEngine::new(&config.engine)?;
        let sandbox = WasmSandbox::new(engine, config.execution.clone())?;

        Ok(Self::new(
            Arc::new(BundleRegistry::new()),
            Arc::new(sandbox),
            ScriptRuntime::new(config.scripting.clone()),
        ))
    }

    /// The registry bundles are looked up in.
    pub fn registry(&self) -> &Arc<BundleRegistry> {
        &self.registry
    }

    /// The sandbox used for WASM bundles.
    pub fn sandbox(&self) -> &WasmSandbox {
        &self.sandbox
    }

    /// The runtime used for interpreted bundles.
    pub fn scripts(&self) -> &ScriptRuntime {
        &self.scripts
    }

    /// Look up `name` and run it against `request`.
    ///
    /// The lookup happens before anything is executed, so an unknown name
    /// never reaches a strategy.
    ///
    /// # Errors
    ///
    /// Returns [`RuntimeError::BundleNotFound`] for unknown names, otherwise
    /// the load or execution failure of this invocation.
    #[instrument(skip(self, request), fields(method = %request.method, body_len = request.body.len()))]
    pub async fn dispatch(
        &self,
        name: &str,
        request: &InvocationRequest,
    ) -> Result<InvocationResponse, RuntimeError> {
        let bundle = self.registry.get(name)?;
        self.invoke(&bundle, request).await
    }

    /// Run an already resolved bundle.
    ///
    /// # Errors
    ///
    /// Returns the load or execution failure of this invocation.
    pub async fn invoke(
        &self,
        bundle: &Bundle,
        request: &InvocationRequest,
    ) -> Result<InvocationResponse, RuntimeError> {
        let start = Instant::now();
        let strategy = Strategy::for_language(bundle.metadata().language);

        let result = match strategy {
            Strategy::Sandboxed => self
                .sandbox
                .run(bundle, &request.body)
                .await
                .map(|output| InvocationResponse::json(200, output)),
            Strategy::Interpreted => self.scripts.invoke(bundle, request).await,
        };

        match &result {
            Ok(response) => info!(
                bundle = %bundle.name(),
                ?strategy,
                status = response.status,
                duration_ms = start.elapsed().as_millis(),
                "Invocation completed"
            ),
            Err(e) => warn!(
                bundle = %bundle.name(),
                ?strategy,
                category = ?e.category(),
                error = %e,
                duration_ms = start.elapsed().as_millis(),
                "Invocation failed"
            ),
        }

        result
    }
}
