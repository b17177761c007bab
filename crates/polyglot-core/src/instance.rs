//! WebAssembly instance lifecycle management.
//!
//! This module provides [`InstanceRunner`], which handles the complete lifecycle
//! of one sandboxed invocation:
//!
//! 1. Instantiate the module with a fresh store (runs its start function)
//! 2. Call `_initialize` when the module is a WASI reactor
//! 3. Look up the entry function, listing all exports if it is missing
//! 4. Execute it and collect metrics

use std::time::Instant;

use tracing::{debug, error, info, instrument, warn};
use wasmtime::{Engine, Instance, Linker, Store, Trap};
use wasmtime_wasi::I32Exit;

use crate::CompiledModule;
use crate::linker::build_linker;
use crate::store::{SandboxContext, calculate_fuel_consumed, get_remaining_fuel};
use polyglot_common::{RuntimeError, WasiError};

/// Export called before the entry function when present.
const REACTOR_INIT: &str = "_initialize";

/// Instance lifecycle manager.
///
/// # Thread Safety
///
/// `InstanceRunner` is thread-safe and can be shared across multiple tasks.
/// Each execution uses its own [`Store`] for isolation; only the linker is
/// shared.
pub struct InstanceRunner {
    linker: Linker<SandboxContext>,
}

impl InstanceRunner {
    /// Create a new instance runner with WASI and `env.log` linked.
    ///
    /// # Errors
    ///
    /// Returns an error if host functions cannot be registered.
    pub fn new(engine: &Engine) -> Result<Self, RuntimeError> {
        Ok(Self {
            linker: build_linker(engine)?,
        })
    }

    /// Run the module's entry function inside `store`.
    ///
    /// `module_name` is the name the module was loaded under and appears in
    /// the error when the entry function is missing.
    ///
    /// # Errors
    ///
    /// Returns an error if:
    /// - Instantiation or `_initialize` fails
    /// - The entry function is not exported
    /// - The entry function traps, exits non-zero, runs out of fuel or
    ///   exceeds its deadline
    #[instrument(skip(self, module, store), fields(module = %module_name, entry_point = %entry_point))]
    pub async fn invoke(
        &self,
        module: &CompiledModule,
        store: &mut Store<SandboxContext>,
        module_name: &str,
        entry_point: &str,
        timeout_ms: u64,
    ) -> Result<(), RuntimeError> {
        let start = Instant::now();
        let initial_fuel = get_remaining_fuel(store).unwrap_or(0);

        debug!("Instantiating core module");

        let instance = self
            .linker
            .instantiate_async(&mut *store, module.as_module())
            .await
            .map_err(|e| map_guest_error(e, timeout_ms, RuntimeError::instantiation_failed))?;

        run_reactor_init(&instance, store, timeout_ms).await?;

        let Some(func) = instance.get_func(&mut *store, entry_point) else {
            let exports = export_names(&instance, store);
            warn!(exports = ?exports, "Entry function not exported");
            return Err(RuntimeError::HandlerExportMissing {
                module: module_name.to_string(),
                entry_point: entry_point.to_string(),
                exports,
            });
        };

        let func = func.typed::<(), ()>(&*store).map_err(|e| {
            RuntimeError::instantiation_failed(format!(
                "Entry function '{entry_point}' must take no parameters and return nothing: {e}"
            ))
        })?;

        debug!("Executing entry function");

        let result = func.call_async(&mut *store, ()).await;

        let fuel_consumed = calculate_fuel_consumed(initial_fuel, store);
        store.data_mut().metrics.fuel_consumed = fuel_consumed;
        store.data_mut().finalize_metrics();

        let duration = start.elapsed();

        match result.or_else(exit_status) {
            Ok(()) => {
                info!(
                    duration_ms = duration.as_millis(),
                    fuel_consumed,
                    "Execution completed successfully"
                );
                Ok(())
            }
            Err(e) => {
                let err = map_guest_error(e, timeout_ms, RuntimeError::execution_failed);

                if err.is_resource_limit() {
                    warn!(
                        duration_ms = duration.as_millis(),
                        fuel_consumed,
                        error = %err,
                        "Execution terminated by resource limit"
                    );
                } else {
                    error!(
                        duration_ms = duration.as_millis(),
                        fuel_consumed,
                        error = %err,
                        "Execution trapped"
                    );
                }

                Err(err)
            }
        }
    }
}

/// Call the WASI reactor initializer if the module exports one.
async fn run_reactor_init(
    instance: &Instance,
    store: &mut Store<SandboxContext>,
    timeout_ms: u64,
) -> Result<(), RuntimeError> {
    let Ok(init) = instance.get_typed_func::<(), ()>(&mut *store, REACTOR_INIT) else {
        return Ok(());
    };

    debug!("Running reactor initializer");

    init.call_async(&mut *store, ())
        .await
        .or_else(exit_status)
        .map_err(|e| {
            map_guest_error(e, timeout_ms, |reason| {
                RuntimeError::instantiation_failed(format!("{REACTOR_INIT} failed: {reason}"))
            })
        })
}

/// Names of every member the instance exports, in declaration order.
fn export_names(instance: &Instance, store: &mut Store<SandboxContext>) -> Vec<String> {
    instance
        .exports(&mut *store)
        .map(|export| export.name().to_string())
        .collect()
}

/// Treat `proc_exit(0)` as a normal return.
fn exit_status(error: wasmtime::Error) -> Result<(), wasmtime::Error> {
    match error.downcast_ref::<I32Exit>() {
        Some(I32Exit(0)) => Ok(()),
        _ => Err(error),
    }
}

/// Map an error raised while guest code was running.
fn map_guest_error(
    error: wasmtime::Error,
    timeout_ms: u64,
    otherwise: impl FnOnce(String) -> RuntimeError,
) -> RuntimeError {
    if let Some(I32Exit(code)) = error.downcast_ref::<I32Exit>() {
        return WasiError::NonZeroExit { code: *code }.into();
    }

    match error.downcast_ref::<Trap>() {
        Some(Trap::OutOfFuel) => RuntimeError::FuelExhausted,
        Some(Trap::Interrupt) => RuntimeError::ExecutionTimeout {
            duration_ms: timeout_ms,
        },
        _ => otherwise(format!("{error:#}")),
    }
}

impl std::fmt::Debug for InstanceRunner {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("InstanceRunner").finish_non_exhaustive()
    }
}
