//! Sandboxed WebAssembly execution and the bundle registry for polyglot-runtime.
//!
//! This crate provides:
//! - [`WasmEngine`]: Configured Wasmtime engine with pooling allocator
//! - [`CompiledModule`] and [`ModuleCache`]: Compiled code keyed by content hash
//! - [`SandboxContext`]: Per-invocation WASI state and guest logs
//! - [`InstanceRunner`]: Instance lifecycle management
//! - [`WasmSandbox`]: The stdin/stdout request protocol for WASI modules
//! - [`BundleRegistry`]: Concurrent name to bundle mapping
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────┐
//! │                     WasmEngine                          │
//! │  (Shared across all requests, thread-safe)              │
//! │  - Pooling Allocator                                    │
//! │  - Epoch ticker                                         │
//! └─────────────────────────────────────────────────────────┘
//!                            │
//!                            ▼
//! ┌─────────────────────────────────────────────────────────┐
//! │                   ModuleCache                           │
//! │  (SHA-256 of the binary -> CompiledModule)              │
//! └─────────────────────────────────────────────────────────┘
//!                            │
//!                            ▼
//! ┌─────────────────────────────────────────────────────────┐
//! │            Store<SandboxContext> + Instance             │
//! │  (Per-invocation, isolated)                             │
//! │  - stdin: request JSON, stdout: response JSON           │
//! │  - Fuel, epoch deadline, memory limit                   │
//! │  - Guest logs and metrics                               │
//! └─────────────────────────────────────────────────────────┘
//! ```

pub mod engine;
pub mod instance;
pub mod linker;
pub mod logging;
pub mod module;
pub mod registry;
pub mod sandbox;
pub mod store;

pub use engine::{EpochTicker, WasmEngine};
pub use instance::InstanceRunner;
pub use logging::{LogEntry, LogLevel, LoggingHost};
pub use module::{CompiledModule, ModuleCache};
pub use registry::BundleRegistry;
pub use sandbox::WasmSandbox;
pub use store::{ExecutionMetrics, SandboxContext, SandboxIo};
