//! Error types for the polyglot-runtime.
//!
//! This module defines a hierarchy of error types using `thiserror`:
//! - [`RuntimeError`]: Top-level errors for registration, lookup and execution
//! - [`WasiError`]: WASI-related errors
//! - [`ErrorCategory`]: Coarse classification used at the HTTP boundary

use std::io;

use thiserror::Error;

/// Top-level runtime errors.
///
/// Every failure that can happen between a bundle upload and the response of
/// an invocation is reported through this type. Failures never escape as
/// panics; the boundary turns them into an error payload.
#[derive(Error, Debug)]
pub enum RuntimeError {
    /// No bundle is registered under the requested name.
    #[error("Handler not found: {name}")]
    BundleNotFound {
        /// The bundle name that was looked up.
        name: String,
    },

    /// The metadata document could not be parsed or is invalid.
    #[error("Invalid bundle metadata: {reason}")]
    InvalidMetadata {
        /// Description of the problem.
        reason: String,
    },

    /// The uploaded bundle archive or bundle name is unusable.
    #[error("Invalid bundle: {reason}")]
    InvalidBundle {
        /// Description of the problem.
        reason: String,
    },

    /// The entrypoint file named by the metadata does not exist.
    #[error("Entrypoint file does not exist: {path}")]
    EntrypointMissing {
        /// Resolved path of the missing file.
        path: String,
    },

    /// WebAssembly compilation failed.
    #[error("Compilation failed: {reason}")]
    CompilationFailed {
        /// Description of the compilation failure.
        reason: String,
    },

    /// Module instantiation (including its start-up code) failed.
    #[error("Instantiation failed: {reason}")]
    InstantiationFailed {
        /// Description of the instantiation failure.
        reason: String,
    },

    /// The module does not export the entry function.
    #[error(
        "No exported function '{entry_point}' found in module '{module}'; the list of exported members is: [{}]",
        .exports.join(", ")
    )]
    HandlerExportMissing {
        /// Name the module was loaded under (the bundle name).
        module: String,
        /// Entry function that was looked up.
        entry_point: String,
        /// All exported member names found in the instance.
        exports: Vec<String>,
    },

    /// A script entrypoint failed to load or did not evaluate to a handler.
    #[error("Failed to load {language} handler: {reason}")]
    HandlerLoadFailed {
        /// Language identifier of the bundle.
        language: String,
        /// Underlying message.
        reason: String,
    },

    /// The interpreter for a scripting language could not be started.
    #[error("Interpreter '{program}' for {language} is not available")]
    InterpreterUnavailable {
        /// Language identifier of the bundle.
        language: String,
        /// Program that was spawned.
        program: String,
    },

    /// The host access policy does not allow scripting bundles.
    #[error("Scripting handlers are disabled by policy ({language})")]
    ScriptingDenied {
        /// Language identifier of the bundle.
        language: String,
    },

    /// The handler or module raised an error while running.
    #[error("Execution failed: {reason}")]
    ExecutionFailed {
        /// Underlying message.
        reason: String,
    },

    /// Execution exceeded the configured timeout.
    #[error("Execution timeout after {duration_ms}ms")]
    ExecutionTimeout {
        /// The timeout duration in milliseconds.
        duration_ms: u64,
    },

    /// Execution exhausted the configured fuel limit.
    #[error("Fuel exhausted: CPU limit exceeded")]
    FuelExhausted,

    /// WASI operation failed.
    #[error("WASI error: {0}")]
    Wasi(#[from] WasiError),

    /// I/O operation failed.
    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    /// Invalid configuration was provided.
    #[error("Invalid configuration: {reason}")]
    InvalidConfig {
        /// Description of the configuration error.
        reason: String,
    },
}

/// WASI-related errors.
#[derive(Error, Debug)]
pub enum WasiError {
    /// Failed to link the WASI imports.
    #[error("WASI linking failed: {reason}")]
    LinkFailed {
        /// Description of the linking failure.
        reason: String,
    },

    /// The guest called `proc_exit` with a non-zero status.
    #[error("module exited with status {code}")]
    NonZeroExit {
        /// Exit status passed to `proc_exit`.
        code: i32,
    },
}

/// Coarse error classification.
///
/// Mirrors the phases a bundle goes through: registration, lookup by name,
/// loading for one invocation, and running.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCategory {
    /// Upload or metadata problems; nothing was registered.
    Registration,
    /// Unknown bundle name.
    Lookup,
    /// The bundle could not be prepared for this invocation.
    Load,
    /// The bundle failed while running.
    Execution,
    /// Host-side failure unrelated to the bundle.
    Internal,
}

impl RuntimeError {
    /// Create a new `BundleNotFound` error.
    pub fn bundle_not_found(name: impl Into<String>) -> Self {
        Self::BundleNotFound { name: name.into() }
    }

    /// Create a new `InvalidMetadata` error.
    pub fn invalid_metadata(reason: impl Into<String>) -> Self {
        Self::InvalidMetadata {
            reason: reason.into(),
        }
    }

    /// Create a new `InvalidBundle` error.
    pub fn invalid_bundle(reason: impl Into<String>) -> Self {
        Self::InvalidBundle {
            reason: reason.into(),
        }
    }

    /// Create a new `CompilationFailed` error.
    pub fn compilation_failed(reason: impl Into<String>) -> Self {
        Self::CompilationFailed {
            reason: reason.into(),
        }
    }

    /// Create a new `InstantiationFailed` error.
    pub fn instantiation_failed(reason: impl Into<String>) -> Self {
        Self::InstantiationFailed {
            reason: reason.into(),
        }
    }

    /// Create a new `ExecutionFailed` error.
    pub fn execution_failed(reason: impl Into<String>) -> Self {
        Self::ExecutionFailed {
            reason: reason.into(),
        }
    }

    /// Create a new `InvalidConfig` error.
    pub fn invalid_config(reason: impl Into<String>) -> Self {
        Self::InvalidConfig {
            reason: reason.into(),
        }
    }

    /// Classify this error.
    pub fn category(&self) -> ErrorCategory {
        match self {
            Self::InvalidMetadata { .. } | Self::InvalidBundle { .. } => {
                ErrorCategory::Registration
            }
            Self::BundleNotFound { .. } => ErrorCategory::Lookup,
            Self::EntrypointMissing { .. }
            | Self::CompilationFailed { .. }
            | Self::InstantiationFailed { .. }
            | Self::HandlerExportMissing { .. }
            | Self::HandlerLoadFailed { .. }
            | Self::InterpreterUnavailable { .. }
            | Self::ScriptingDenied { .. } => ErrorCategory::Load,
            Self::ExecutionFailed { .. }
            | Self::ExecutionTimeout { .. }
            | Self::FuelExhausted
            | Self::Wasi(_) => ErrorCategory::Execution,
            Self::Io(_) | Self::InvalidConfig { .. } => ErrorCategory::Internal,
        }
    }

    /// Returns `true` if this error indicates the bundle was not found.
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::BundleNotFound { .. })
    }

    /// Returns `true` if this error indicates a resource limit was exceeded.
    pub fn is_resource_limit(&self) -> bool {
        matches!(self, Self::FuelExhausted | Self::ExecutionTimeout { .. })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = RuntimeError::bundle_not_found("greeter");
        assert_eq!(err.to_string(), "Handler not found: greeter");

        let err = RuntimeError::FuelExhausted;
        assert_eq!(err.to_string(), "Fuel exhausted: CPU limit exceeded");
    }

    #[test]
    fn test_missing_export_lists_members() {
        let err = RuntimeError::HandlerExportMissing {
            module: "rust-wasm".into(),
            entry_point: "handler".into(),
            exports: vec!["memory".into(), "run".into()],
        };
        let message = err.to_string();

        assert!(message.contains("'handler'"));
        assert!(message.contains("'rust-wasm'"));
        assert!(message.contains("[memory, run]"));
    }

    #[test]
    fn test_error_from_wasi() {
        let err: RuntimeError = WasiError::NonZeroExit { code: 3 }.into();
        assert!(matches!(err, RuntimeError::Wasi(_)));
        assert_eq!(err.category(), ErrorCategory::Execution);
    }

    #[test]
    fn test_categories() {
        assert_eq!(
            RuntimeError::invalid_metadata("bad").category(),
            ErrorCategory::Registration
        );
        assert_eq!(
            RuntimeError::bundle_not_found("x").category(),
            ErrorCategory::Lookup
        );
        assert_eq!(
            RuntimeError::EntrypointMissing {
                path: "/tmp/x.wasm".into()
            }
            .category(),
            ErrorCategory::Load
        );
        assert_eq!(
            RuntimeError::execution_failed("boom").category(),
            ErrorCategory::Execution
        );
        assert_eq!(
            RuntimeError::invalid_config("bad").category(),
            ErrorCategory::Internal
        );
    }

    #[test]
    fn test_is_resource_limit() {
        assert!(RuntimeError::FuelExhausted.is_resource_limit());
        assert!(RuntimeError::ExecutionTimeout { duration_ms: 100 }.is_resource_limit());
        assert!(!RuntimeError::bundle_not_found("test").is_resource_limit());
    }

    #[test]
    fn test_is_not_found() {
        assert!(RuntimeError::bundle_not_found("test").is_not_found());
        assert!(!RuntimeError::FuelExhausted.is_not_found());
    }
}
