//! Configuration structures for the polyglot-runtime.
//!
//! This module defines configuration options for various components:
//! - [`RuntimeConfig`]: Top-level configuration containing all settings
//! - [`EngineConfig`]: Wasmtime engine settings (pooling, caching, epochs)
//! - [`ExecutionConfig`]: Per-invocation limits for sandboxed modules
//! - [`ScriptingConfig`]: Interpreter settings for scripting bundles

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::metadata::Language;

/// Top-level runtime configuration.
///
/// This structure contains all configuration options for the runtime.
/// It can be loaded from files (TOML, JSON) or built in code.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct RuntimeConfig {
    /// Wasmtime engine configuration.
    #[serde(default)]
    pub engine: EngineConfig,

    /// Per-invocation configuration for sandboxed modules.
    #[serde(default)]
    pub execution: ExecutionConfig,

    /// Configuration for interpreted handlers.
    #[serde(default)]
    pub scripting: ScriptingConfig,
}

/// Wasmtime engine configuration.
///
/// These settings affect the global Wasmtime engine behavior,
/// including memory allocation strategy and compilation caching.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct EngineConfig {
    /// Enable pooling allocator for high-performance instance creation.
    ///
    /// When enabled, memory is pre-allocated for a pool of instances,
    /// reducing instantiation time from ~1ms to ~10µs.
    #[serde(default = "defaults::pooling_allocator")]
    pub pooling_allocator: bool,

    /// Maximum concurrent instances in the pool.
    ///
    /// Only effective when `pooling_allocator` is enabled.
    #[serde(default = "defaults::max_instances")]
    pub max_instances: u32,

    /// Memory per instance slot in megabytes.
    #[serde(default = "defaults::instance_memory_mb")]
    pub instance_memory_mb: u32,

    /// Keep compiled modules in memory, keyed by the SHA-256 of the binary.
    ///
    /// Only compiled code is shared. Every invocation still gets a fresh
    /// instance and store.
    #[serde(default = "defaults::cache_compiled_modules")]
    pub cache_compiled_modules: bool,

    /// Upper bound on cached compiled modules.
    #[serde(default = "defaults::max_cached_modules")]
    pub max_cached_modules: usize,

    /// Enable epoch-based interruption.
    ///
    /// This allows interrupting long-running WebAssembly execution
    /// based on time rather than fuel consumption.
    #[serde(default = "defaults::epoch_interruption")]
    pub epoch_interruption: bool,

    /// Interval between epoch increments in milliseconds.
    #[serde(default = "defaults::epoch_tick_ms")]
    pub epoch_tick_ms: u64,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            pooling_allocator: defaults::pooling_allocator(),
            max_instances: defaults::max_instances(),
            instance_memory_mb: defaults::instance_memory_mb(),
            cache_compiled_modules: defaults::cache_compiled_modules(),
            max_cached_modules: defaults::max_cached_modules(),
            epoch_interruption: defaults::epoch_interruption(),
            epoch_tick_ms: defaults::epoch_tick_ms(),
        }
    }
}

impl EngineConfig {
    /// Get the epoch tick interval as a `Duration`.
    pub fn epoch_tick(&self) -> Duration {
        Duration::from_millis(self.epoch_tick_ms.max(1))
    }
}

/// Per-invocation configuration for sandboxed modules.
///
/// These settings control resource limits for individual WebAssembly executions.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ExecutionConfig {
    /// Maximum fuel (CPU instructions) per invocation.
    ///
    /// A typical simple handler consumes ~1,000-10,000 fuel.
    /// Complex operations may consume millions.
    #[serde(default = "defaults::max_fuel")]
    pub max_fuel: u64,

    /// Enable fuel metering.
    #[serde(default = "defaults::fuel_metering")]
    pub fuel_metering: bool,

    /// Execution timeout in milliseconds.
    ///
    /// Enforced through epoch interruption when the engine enables it.
    #[serde(default = "defaults::timeout_ms")]
    pub timeout_ms: u64,

    /// Maximum linear memory in megabytes.
    #[serde(default = "defaults::max_memory_mb")]
    pub max_memory_mb: u32,

    /// Capacity of the captured standard-output stream in bytes.
    #[serde(default = "defaults::max_output_bytes")]
    pub max_output_bytes: usize,

    /// Name of the exported entry function.
    #[serde(default = "defaults::entry_point")]
    pub entry_point: String,
}

impl Default for ExecutionConfig {
    fn default() -> Self {
        Self {
            max_fuel: defaults::max_fuel(),
            fuel_metering: defaults::fuel_metering(),
            timeout_ms: defaults::timeout_ms(),
            max_memory_mb: defaults::max_memory_mb(),
            max_output_bytes: defaults::max_output_bytes(),
            entry_point: defaults::entry_point(),
        }
    }
}

impl ExecutionConfig {
    /// Get the timeout as a `Duration`.
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }
}

/// How much of the host a scripting handler may reach.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum HostAccess {
    /// Same privileges and environment as the host process.
    #[default]
    Full,
    /// Empty environment apart from `PATH`/`LANG`; `HOME` is the bundle root.
    Restricted,
    /// Scripting bundles are refused.
    Denied,
}

/// Interpreter programs per scripting language.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct InterpreterConfig {
    /// JavaScript interpreter.
    #[serde(default = "defaults::node")]
    pub js: String,

    /// Python interpreter.
    #[serde(default = "defaults::python")]
    pub python: String,

    /// Ruby interpreter.
    #[serde(default = "defaults::ruby")]
    pub ruby: String,
}

impl Default for InterpreterConfig {
    fn default() -> Self {
        Self {
            js: defaults::node(),
            python: defaults::python(),
            ruby: defaults::ruby(),
        }
    }
}

impl InterpreterConfig {
    /// Program configured for the language, `None` for sandboxed modules.
    pub fn program_for(&self, language: Language) -> Option<&str> {
        match language {
            Language::JavaScript => Some(&self.js),
            Language::Python => Some(&self.python),
            Language::Ruby => Some(&self.ruby),
            Language::Wasm => None,
        }
    }
}

/// Configuration for interpreted handlers.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ScriptingConfig {
    /// Host access granted to scripting bundles.
    #[serde(default)]
    pub host_access: HostAccess,

    /// Invocation deadline in milliseconds.
    #[serde(default = "defaults::script_timeout_ms")]
    pub timeout_ms: u64,

    /// Maximum size of the handler's response envelope in bytes.
    #[serde(default = "defaults::max_output_bytes")]
    pub max_output_bytes: usize,

    /// Interpreter programs.
    #[serde(default)]
    pub interpreters: InterpreterConfig,
}

impl Default for ScriptingConfig {
    fn default() -> Self {
        Self {
            host_access: HostAccess::default(),
            timeout_ms: defaults::script_timeout_ms(),
            max_output_bytes: defaults::max_output_bytes(),
            interpreters: InterpreterConfig::default(),
        }
    }
}

impl ScriptingConfig {
    /// Get the timeout as a `Duration`.
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }
}

/// Default value functions for serde.
mod defaults {
    pub const fn pooling_allocator() -> bool {
        true
    }

    pub const fn max_instances() -> u32 {
        100
    }

    pub const fn instance_memory_mb() -> u32 {
        128
    }

    pub const fn cache_compiled_modules() -> bool {
        true
    }

    pub const fn max_cached_modules() -> usize {
        256
    }

    pub const fn epoch_interruption() -> bool {
        true
    }

    pub const fn epoch_tick_ms() -> u64 {
        1
    }

    pub const fn max_fuel() -> u64 {
        1_000_000_000
    }

    pub const fn fuel_metering() -> bool {
        true
    }

    pub const fn timeout_ms() -> u64 {
        5_000
    }

    pub const fn max_memory_mb() -> u32 {
        128
    }

    pub const fn max_output_bytes() -> usize {
        4 * 1024 * 1024
    }

    pub fn entry_point() -> String {
        "handler".to_string()
    }

    pub const fn script_timeout_ms() -> u64 {
        30_000
    }

    pub fn node() -> String {
        "node".to_string()
    }

    pub fn python() -> String {
        "python3".to_string()
    }

    pub fn ruby() -> String {
        "ruby".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = RuntimeConfig::default();

        assert!(config.engine.pooling_allocator);
        assert_eq!(config.engine.max_instances, 100);
        assert!(config.engine.cache_compiled_modules);
        assert!(config.engine.epoch_interruption);

        assert_eq!(config.execution.entry_point, "handler");
        assert_eq!(config.execution.timeout_ms, 5_000);
        assert!(config.execution.fuel_metering);

        assert_eq!(config.scripting.host_access, HostAccess::Full);
        assert_eq!(config.scripting.interpreters.python, "python3");
    }

    #[test]
    fn test_config_serialization() {
        let config = RuntimeConfig::default();
        let json = serde_json::to_string(&config).unwrap();
        let deserialized: RuntimeConfig = serde_json::from_str(&json).unwrap();

        assert_eq!(
            config.engine.max_cached_modules,
            deserialized.engine.max_cached_modules
        );
        assert_eq!(config.execution.max_fuel, deserialized.execution.max_fuel);
        assert_eq!(
            config.scripting.host_access,
            deserialized.scripting.host_access
        );
    }

    #[test]
    fn test_timeouts() {
        let execution = ExecutionConfig {
            timeout_ms: 500,
            ..Default::default()
        };
        assert_eq!(execution.timeout(), Duration::from_millis(500));

        let scripting = ScriptingConfig {
            timeout_ms: 250,
            ..Default::default()
        };
        assert_eq!(scripting.timeout(), Duration::from_millis(250));
    }

    #[test]
    fn test_epoch_tick_never_zero() {
        let engine = EngineConfig {
            epoch_tick_ms: 0,
            ..Default::default()
        };
        assert_eq!(engine.epoch_tick(), Duration::from_millis(1));
    }

    #[test]
    fn test_partial_deserialization() {
        let json = r#"{"scripting": {"host_access": "restricted", "interpreters": {"js": "/usr/bin/node"}}}"#;
        let config: RuntimeConfig = serde_json::from_str(json).unwrap();

        assert_eq!(config.scripting.host_access, HostAccess::Restricted);
        assert_eq!(config.scripting.interpreters.js, "/usr/bin/node");
        // Defaults for unspecified fields
        assert_eq!(config.scripting.interpreters.ruby, "ruby");
        assert!(config.engine.pooling_allocator);
    }

    #[test]
    fn test_program_for_language() {
        let interpreters = InterpreterConfig::default();

        assert_eq!(interpreters.program_for(Language::JavaScript), Some("node"));
        assert_eq!(interpreters.program_for(Language::Ruby), Some("ruby"));
        assert_eq!(interpreters.program_for(Language::Wasm), None);
    }
}
