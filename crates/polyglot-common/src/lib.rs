//! Common types, errors, and configuration for polyglot-runtime.
//!
//! This crate provides shared functionality used across the workspace:
//! - Error types using `thiserror` for type-safe error handling
//! - Configuration structures for runtime settings
//! - The bundle metadata model and the [`Bundle`] record
//! - Transport-neutral invocation request/response types

pub mod bundle;
pub mod config;
pub mod config_file;
pub mod error;
pub mod invocation;
pub mod metadata;

pub use bundle::Bundle;
pub use config::{
    EngineConfig, ExecutionConfig, HostAccess, InterpreterConfig, RuntimeConfig, ScriptingConfig,
};
pub use config_file::{BundleEntry, ConfigFile, ConfigFileError, ServerConfigFile, StorageConfig};
pub use error::{ErrorCategory, RuntimeError, WasiError};
pub use invocation::{InvocationRequest, InvocationResponse};
pub use metadata::{BundleMetadata, Language, METADATA_FILE};
