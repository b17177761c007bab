//! Per-invocation sandbox state and store management.
//!
//! This module provides:
//! - [`SandboxContext`]: Per-invocation state accessible from host functions
//! - [`SandboxIo`]: The request stream and captured output streams
//! - [`ExecutionMetrics`]: Performance metrics for each execution

use std::time::{Duration, Instant};

use wasmtime::{Store, StoreLimits, StoreLimitsBuilder};
use wasmtime_wasi::WasiCtxBuilder;
use wasmtime_wasi::pipe::{MemoryInputPipe, MemoryOutputPipe};
use wasmtime_wasi::preview1::WasiP1Ctx;

use crate::WasmEngine;
use crate::logging::{LogLevel, LoggingHost};
use polyglot_common::{ExecutionConfig, RuntimeError};

/// Stderr capture is bounded independently of stdout.
const MAX_STDERR_BYTES: usize = 64 * 1024;

/// Per-invocation execution context.
///
/// Holds all state specific to a single module execution. It is created for
/// each invocation and dropped together with its [`Store`] once the entry
/// function returns.
///
/// Host functions reach this context through the [`wasmtime::Caller`] API.
pub struct SandboxContext {
    /// WASI preview 1 context with memory-backed stdio.
    wasi: WasiP1Ctx,

    /// Memory and instance limits for this store.
    limits: StoreLimits,

    /// Unique request identifier for tracing.
    pub request_id: String,

    /// Guest log sink.
    pub logs: LoggingHost,

    /// Execution metrics.
    pub metrics: ExecutionMetrics,

    /// Execution start time.
    start_time: Instant,
}

/// Execution performance metrics.
#[derive(Debug, Clone, Default)]
pub struct ExecutionMetrics {
    /// Fuel consumed during execution.
    pub fuel_consumed: u64,

    /// Total execution duration.
    pub duration: Option<Duration>,
}

/// Host ends of the sandbox's standard streams.
///
/// The pipes share their buffers with the WASI context, so they can be read
/// after the store has been dropped.
#[derive(Debug, Clone)]
pub struct SandboxIo {
    /// Captured standard output, the response message.
    pub stdout: MemoryOutputPipe,

    /// Captured standard error, recorded as guest logs.
    pub stderr: MemoryOutputPipe,
}

impl SandboxIo {
    /// Standard output decoded as text.
    pub fn stdout_text(&self) -> String {
        String::from_utf8_lossy(&self.stdout.contents()).into_owned()
    }

    /// Standard output decoded as text, failing if it exceeds `limit` bytes.
    pub fn stdout_within(&self, limit: usize) -> Result<String, RuntimeError> {
        let contents = self.stdout.contents();
        if contents.len() > limit {
            return Err(RuntimeError::execution_failed(format!(
                "module output exceeds {limit} bytes"
            )));
        }
        Ok(String::from_utf8_lossy(&contents).into_owned())
    }
}

impl SandboxContext {
    /// Add a log entry.
    pub fn log(&mut self, level: LogLevel, message: &str) {
        self.logs.log(level, message);
    }

    /// Get the WASI context.
    pub fn wasi_mut(&mut self) -> &mut WasiP1Ctx {
        &mut self.wasi
    }

    /// Finalize metrics after execution.
    pub fn finalize_metrics(&mut self) {
        self.metrics.duration = Some(self.start_time.elapsed());
    }
}

/// Create a fresh store for one invocation.
///
/// `input` is pre-loaded as the module's standard input; standard output and
/// standard error are captured in memory and returned as [`SandboxIo`].
///
/// # Errors
///
/// Returns an error if fuel cannot be set on the store.
pub fn create_store(
    engine: &WasmEngine,
    config: &ExecutionConfig,
    request_id: String,
    bundle: &str,
    input: &[u8],
) -> Result<(Store<SandboxContext>, SandboxIo), RuntimeError> {
    let io = SandboxIo {
        // One spare byte so an oversized response is detectable.
        stdout: MemoryOutputPipe::new(config.max_output_bytes.saturating_add(1)),
        stderr: MemoryOutputPipe::new(MAX_STDERR_BYTES),
    };

    let wasi = WasiCtxBuilder::new()
        .stdin(MemoryInputPipe::new(input.to_vec()))
        .stdout(io.stdout.clone())
        .stderr(io.stderr.clone())
        .arg(bundle)
        .build_p1();

    let limits = StoreLimitsBuilder::new()
        .memory_size((config.max_memory_mb as usize) * 1024 * 1024)
        .instances(1)
        .build();

    let context = SandboxContext {
        wasi,
        limits,
        logs: LoggingHost::new(bundle, request_id.clone()),
        request_id,
        metrics: ExecutionMetrics::default(),
        start_time: Instant::now(),
    };

    let mut store = Store::new(engine.inner(), context);
    store.limiter(|ctx| &mut ctx.limits);

    // Fuel is always consumed by the engine; without metering the budget is
    // effectively unbounded.
    let fuel = if config.fuel_metering {
        config.max_fuel
    } else {
        u64::MAX
    };
    store
        .set_fuel(fuel)
        .map_err(|e| RuntimeError::invalid_config(format!("Failed to set fuel: {e}")))?;

    if engine.config().epoch_interruption {
        store.set_epoch_deadline(engine.deadline_ticks(config.timeout_ms));
        store.epoch_deadline_trap();
    }

    Ok((store, io))
}

/// Get remaining fuel from a store.
pub fn get_remaining_fuel(store: &Store<SandboxContext>) -> Option<u64> {
    store.get_fuel().ok()
}

/// Calculate fuel consumed.
pub fn calculate_fuel_consumed(initial_fuel: u64, store: &Store<SandboxContext>) -> u64 {
    let remaining = get_remaining_fuel(store).unwrap_or(0);
    initial_fuel.saturating_sub(remaining)
}
