//! Shared Wasmtime engine.
//!
//! One engine serves every sandboxed invocation. Fuel metering is always on;
//! epoch interruption and the pooling allocator follow [`EngineConfig`].

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread::JoinHandle;

use tracing::{debug, info, warn};
use wasmtime::{Config, Engine, InstanceAllocationStrategy, PoolingAllocationConfig};

use polyglot_common::{EngineConfig, RuntimeError};

/// Compilation and execution engine for WASI bundles.
///
/// Cloning is cheap: the inner [`Engine`] is reference counted. The engine
/// holds no per-invocation state; each call gets its own store.
#[derive(Clone)]
pub struct WasmEngine {
    engine: Arc<Engine>,
    config: EngineConfig,
}

impl WasmEngine {
    /// Build an engine from `config`.
    ///
    /// # Errors
    ///
    /// Returns [`RuntimeError::InvalidConfig`] if Wasmtime rejects the
    /// configuration, for example a pool larger than the address space.
    pub fn new(config: &EngineConfig) -> Result<Self, RuntimeError> {
        let mut wasmtime_config = Config::new();

        wasmtime_config.async_support(true);
        wasmtime_config.consume_fuel(true);

        if config.epoch_interruption {
            wasmtime_config.epoch_interruption(true);
        }

        wasmtime_config.cranelift_opt_level(wasmtime::OptLevel::Speed);

        if config.pooling_allocator {
            let pooling_config = Self::create_pooling_config(config);

            wasmtime_config
                .allocation_strategy(InstanceAllocationStrategy::Pooling(pooling_config));

            info!(
                max_instances = config.max_instances,
                instance_memory_mb = config.instance_memory_mb,
                "Pooling allocator enabled"
            );
        }

        let engine = Engine::new(&wasmtime_config).map_err(|e| {
            RuntimeError::invalid_config(format!("Failed to create Wasmtime engine: {e}"))
        })?;

        debug!(
            cache_compiled_modules = config.cache_compiled_modules,
            epoch_interruption = config.epoch_interruption,
            "Wasmtime engine initialized"
        );

        Ok(Self {
            engine: Arc::new(engine),
            config: config.clone(),
        })
    }

    fn create_pooling_config(config: &EngineConfig) -> PoolingAllocationConfig {
        let mut pooling = PoolingAllocationConfig::default();

        pooling.total_core_instances(config.max_instances);
        pooling.total_memories(config.max_instances);
        pooling.total_tables(config.max_instances);

        let max_memory_bytes = (config.instance_memory_mb as usize) * 1024 * 1024;
        pooling.max_memory_size(max_memory_bytes);

        pooling
    }

    /// Get a reference to the inner Wasmtime engine.
    pub fn inner(&self) -> &Engine {
        &self.engine
    }

    /// Get the engine configuration.
    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Start the thread that advances the epoch every `epoch_tick_ms`.
    ///
    /// Guest code runs on the async workers without yielding, so the ticker
    /// gets its own OS thread. Returns `None` when epoch interruption is
    /// disabled. Dropping the [`EpochTicker`] stops the thread.
    ///
    /// # Errors
    ///
    /// Returns [`RuntimeError::Io`] if the thread cannot be spawned.
    pub fn start_epoch_ticker(&self) -> Result<Option<EpochTicker>, RuntimeError> {
        if !self.config.epoch_interruption {
            return Ok(None);
        }

        let engine = Arc::clone(&self.engine);
        let tick = self.config.epoch_tick();
        let stop = Arc::new(AtomicBool::new(false));
        let flag = Arc::clone(&stop);

        let handle = std::thread::Builder::new()
            .name("polyglot-epoch".to_string())
            .spawn(move || {
                while !flag.load(Ordering::Relaxed) {
                    std::thread::sleep(tick);
                    engine.increment_epoch();
                }
            })?;

        debug!(tick_ms = tick.as_millis(), "Epoch ticker started");
        Ok(Some(EpochTicker {
            stop,
            handle: Some(handle),
        }))
    }

    /// Number of epoch ticks that cover `timeout_ms`.
    pub fn deadline_ticks(&self, timeout_ms: u64) -> u64 {
        timeout_ms.div_ceil(self.config.epoch_tick_ms.max(1)).max(1)
    }

    /// Whether instances come from the pooling allocator.
    pub fn is_pooling_enabled(&self) -> bool {
        self.config.pooling_allocator
    }
}

impl std::fmt::Debug for WasmEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WasmEngine")
            .field("pooling_allocator", &self.config.pooling_allocator)
            .field("max_instances", &self.config.max_instances)
            .field("epoch_interruption", &self.config.epoch_interruption)
            .finish_non_exhaustive()
    }
}

/// Handle to the epoch ticker thread.
#[derive(Debug)]
pub struct EpochTicker {
    stop: Arc<AtomicBool>,
    handle: Option<JoinHandle<()>>,
}

impl EpochTicker {
    /// Stop ticking and wait for the thread to exit.
    pub fn stop(mut self) {
        self.shutdown();
    }

    fn shutdown(&mut self) {
        self.stop.store(true, Ordering::Relaxed);
        if let Some(handle) = self.handle.take() {
            if handle.join().is_err() {
                warn!("Epoch ticker thread panicked");
            }
        }
    }
}

impl Drop for EpochTicker {
    fn drop(&mut self) {
        self.shutdown();
    }
}
