//! Host function registration for the sandbox linker.
//!
//! Every module is linked against WASI preview 1 (`wasi_snapshot_preview1`)
//! so it can use standard I/O like a console program, plus `env.log` for
//! leveled guest logs.

use tracing::warn;
use wasmtime::{Caller, Engine, Linker};

use crate::logging::level_from_i32;
use crate::store::SandboxContext;
use polyglot_common::{RuntimeError, WasiError};

/// Build a linker with all host functions registered.
///
/// # Errors
///
/// Returns an error if function registration fails.
pub fn build_linker(engine: &Engine) -> Result<Linker<SandboxContext>, RuntimeError> {
    let mut linker = Linker::new(engine);
    register_all(&mut linker)?;
    Ok(linker)
}

/// Register all standard host functions on a core module linker.
///
/// This registers:
/// - the WASI preview 1 imports
/// - `env::log` for guest logging
///
/// # Errors
///
/// Returns an error if function registration fails.
pub fn register_all(linker: &mut Linker<SandboxContext>) -> Result<(), RuntimeError> {
    register_wasi(linker)?;
    register_logging(linker)?;
    Ok(())
}

/// Register the WASI preview 1 imports.
pub fn register_wasi(linker: &mut Linker<SandboxContext>) -> Result<(), RuntimeError> {
    wasmtime_wasi::preview1::add_to_linker_async(linker, SandboxContext::wasi_mut).map_err(
        |e| WasiError::LinkFailed {
            reason: e.to_string(),
        },
    )?;
    Ok(())
}

/// Register the logging host function.
///
/// Registers `env::log(level: i32, ptr: i32, len: i32)`.
///
/// # Memory Protocol
///
/// The guest passes:
/// - `level`: Log level (0=debug, 1=info, 2=warn, 3=error)
/// - `ptr`: Pointer to the message string in guest memory
/// - `len`: Length of the message in bytes (UTF-8)
pub fn register_logging(linker: &mut Linker<SandboxContext>) -> Result<(), RuntimeError> {
    linker
        .func_wrap(
            "env",
            "log",
            |mut caller: Caller<'_, SandboxContext>, level: i32, ptr: i32, len: i32| {
                if ptr < 0 || len < 0 {
                    warn!(ptr, len, "Invalid pointer or length (negative value)");
                    return;
                }

                let Some(memory) = caller
                    .get_export("memory")
                    .and_then(wasmtime::Extern::into_memory)
                else {
                    warn!("Memory export not found in guest module");
                    return;
                };

                // Owned copy so the context can be borrowed mutably below.
                #[allow(clippy::cast_sign_loss)]
                let message = {
                    let data = memory.data(&caller);
                    let start = ptr as usize;
                    let Some(end) = start.checked_add(len as usize) else {
                        warn!(ptr, len, "Pointer + length overflow");
                        return;
                    };

                    let Some(bytes) = data.get(start..end) else {
                        warn!(start, end, memory_size = data.len(), "Memory access out of bounds");
                        return;
                    };

                    String::from_utf8_lossy(bytes).into_owned()
                };

                caller.data_mut().log(level_from_i32(level), &message);
            },
        )
        .map_err(|e| {
            RuntimeError::invalid_config(format!("Failed to register log function: {e}"))
        })?;

    Ok(())
}
