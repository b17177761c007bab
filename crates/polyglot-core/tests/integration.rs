//! Integration tests for polyglot-core.
//!
//! These tests verify the complete sandbox pipeline:
//! - WAT fixtures assembled to binaries inside a bundle directory
//! - Request JSON on stdin, response JSON from stdout
//! - Export discovery and the missing-entry diagnostic
//! - Fuel, deadline and output limits
//! - Guest logging through `env.log`

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use polyglot_common::{
    Bundle, BundleMetadata, EngineConfig, ExecutionConfig, Language, RuntimeError, WasiError,
};
use polyglot_core::logging::MAX_LOG_ENTRIES;
use polyglot_core::store::create_store;
use polyglot_core::{CompiledModule, InstanceRunner, LogLevel, WasmEngine, WasmSandbox};

/// Reads `{"name":"<name>"}` from stdin and writes
/// `{"name_twice":"<name> <name>"}` to stdout.
const NAME_TWICE_WAT: &str = r#"
    (module
        (import "wasi_snapshot_preview1" "fd_read"
            (func $fd_read (param i32 i32 i32 i32) (result i32)))
        (import "wasi_snapshot_preview1" "fd_write"
            (func $fd_write (param i32 i32 i32 i32) (result i32)))
        (memory (export "memory") 1)
        (data (i32.const 0) "{\"name_twice\":\"")
        (data (i32.const 32) " ")
        (data (i32.const 40) "\"}")

        (func (export "handler")
            (local $end i32)
            (local $i i32)
            (local $len i32)

            ;; stdin -> 1024..1536
            (i32.store (i32.const 64) (i32.const 1024))
            (i32.store (i32.const 68) (i32.const 512))
            (drop (call $fd_read (i32.const 0) (i32.const 64) (i32.const 1) (i32.const 72)))
            (local.set $end (i32.add (i32.const 1024) (i32.load (i32.const 72))))

            ;; the name starts after {"name":"
            (local.set $i (i32.const 1033))
            (block $done
                (loop $scan
                    (br_if $done (i32.ge_u (local.get $i) (local.get $end)))
                    (br_if $done (i32.eq (i32.load8_u (local.get $i)) (i32.const 34)))
                    (local.set $i (i32.add (local.get $i) (i32.const 1)))
                    (br $scan)))
            (local.set $len (i32.sub (local.get $i) (i32.const 1033)))

            (i32.store (i32.const 128) (i32.const 0))
            (i32.store (i32.const 132) (i32.const 15))
            (i32.store (i32.const 136) (i32.const 1033))
            (i32.store (i32.const 140) (local.get $len))
            (i32.store (i32.const 144) (i32.const 32))
            (i32.store (i32.const 148) (i32.const 1))
            (i32.store (i32.const 152) (i32.const 1033))
            (i32.store (i32.const 156) (local.get $len))
            (i32.store (i32.const 160) (i32.const 40))
            (i32.store (i32.const 164) (i32.const 2))
            (drop (call $fd_write (i32.const 1) (i32.const 128) (i32.const 5) (i32.const 200)))
        )
    )
"#;

/// Increments a global and writes its value as one digit.
const COUNTER_WAT: &str = r#"
    (module
        (import "wasi_snapshot_preview1" "fd_write"
            (func $fd_write (param i32 i32 i32 i32) (result i32)))
        (memory (export "memory") 1)
        (global $count (mut i32) (i32.const 0))

        (func (export "handler")
            (global.set $count (i32.add (global.get $count) (i32.const 1)))
            (i32.store8 (i32.const 300) (i32.add (i32.const 48) (global.get $count)))
            (i32.store (i32.const 0) (i32.const 300))
            (i32.store (i32.const 4) (i32.const 1))
            (drop (call $fd_write (i32.const 1) (i32.const 0) (i32.const 1) (i32.const 16)))
        )
    )
"#;

fn sandbox_with(engine_config: EngineConfig, exec_config: ExecutionConfig) -> WasmSandbox {
    let engine = WasmEngine::new(&engine_config).unwrap();
    WasmSandbox::new(engine, exec_config).unwrap()
}

fn sandbox() -> WasmSandbox {
    sandbox_with(
        EngineConfig {
            pooling_allocator: false,
            epoch_interruption: false,
            ..Default::default()
        },
        ExecutionConfig::default(),
    )
}

fn wasm_bundle(dir: &Path, name: &str, wat: &str) -> Bundle {
    let wasm = wat::parse_str(wat).unwrap();
    std::fs::write(dir.join("main.wasm"), wasm).unwrap();
    Bundle::new(name, BundleMetadata::new(Language::Wasm, "main.wasm"), dir).unwrap()
}

// ============================================================================
// Test: stdin/stdout protocol
// ============================================================================

#[tokio::test]
async fn test_name_twice_round_trip() {
    let dir = tempfile::tempdir().unwrap();
    let bundle = wasm_bundle(dir.path(), "rust-wasm", NAME_TWICE_WAT);

    let output = sandbox()
        .run(&bundle, br#"{"name":"John"}"#)
        .await
        .unwrap();

    assert_eq!(output, r#"{"name_twice":"John John"}"#);
}

#[tokio::test]
async fn test_each_invocation_gets_a_fresh_instance() {
    let dir = tempfile::tempdir().unwrap();
    let bundle = wasm_bundle(dir.path(), "counter", COUNTER_WAT);
    let sandbox = sandbox();

    for _ in 0..3 {
        let output = sandbox.run(&bundle, b"{}").await.unwrap();
        assert_eq!(output, "1");
    }

    // Compiled code is shared even though instances are not.
    assert_eq!(sandbox.cache().len(), 1);
}

#[tokio::test]
async fn test_reactor_initializer_runs_before_handler() {
    let wat = r#"
        (module
            (import "wasi_snapshot_preview1" "fd_write"
                (func $fd_write (param i32 i32 i32 i32) (result i32)))
            (memory (export "memory") 1)
            (data (i32.const 100) "no")
            (data (i32.const 104) "ok")
            (global $ready (mut i32) (i32.const 0))

            (func (export "_initialize")
                (global.set $ready (i32.const 1)))

            (func (export "handler")
                (i32.store (i32.const 0)
                    (select (i32.const 104) (i32.const 100) (global.get $ready)))
                (i32.store (i32.const 4) (i32.const 2))
                (drop (call $fd_write (i32.const 1) (i32.const 0) (i32.const 1) (i32.const 16))))
        )
    "#;
    let dir = tempfile::tempdir().unwrap();
    let bundle = wasm_bundle(dir.path(), "reactor", wat);

    let output = sandbox().run(&bundle, b"").await.unwrap();
    assert_eq!(output, "ok");
}

// ============================================================================
// Test: Export discovery
// ============================================================================

#[tokio::test]
async fn test_missing_handler_lists_exports() {
    let wat = r#"(module (memory (export "memory") 1) (func (export "run")))"#;
    let dir = tempfile::tempdir().unwrap();
    let bundle = wasm_bundle(dir.path(), "no-handler", wat);

    let err = sandbox().run(&bundle, b"{}").await.unwrap_err();

    match &err {
        RuntimeError::HandlerExportMissing {
            module,
            entry_point,
            exports,
        } => {
            assert_eq!(module, "no-handler");
            assert_eq!(entry_point, "handler");
            assert_eq!(exports, &vec!["memory".to_string(), "run".to_string()]);
        }
        other => panic!("unexpected error: {other:?}"),
    }
    let message = err.to_string();
    assert!(message.contains("memory"));
    assert!(message.contains("run"));
}

#[tokio::test]
async fn test_handler_with_wrong_signature_is_load_error() {
    let wat = r#"(module (func (export "handler") (param i32)))"#;
    let dir = tempfile::tempdir().unwrap();
    let bundle = wasm_bundle(dir.path(), "bad-signature", wat);

    let err = sandbox().run(&bundle, b"{}").await.unwrap_err();
    assert!(matches!(err, RuntimeError::InstantiationFailed { .. }));
}

#[tokio::test]
async fn test_unresolved_import_is_instantiation_error() {
    let wat = r#"
        (module
            (import "host" "secret" (func))
            (func (export "handler")))
    "#;
    let dir = tempfile::tempdir().unwrap();
    let bundle = wasm_bundle(dir.path(), "bad-import", wat);

    let err = sandbox().run(&bundle, b"{}").await.unwrap_err();
    assert!(matches!(err, RuntimeError::InstantiationFailed { .. }));
}

// ============================================================================
// Test: Traps and exits
// ============================================================================

#[tokio::test]
async fn test_trap_is_execution_error() {
    let wat = r#"(module (func (export "handler") unreachable))"#;
    let dir = tempfile::tempdir().unwrap();
    let bundle = wasm_bundle(dir.path(), "trap", wat);

    let err = sandbox().run(&bundle, b"{}").await.unwrap_err();
    assert!(matches!(err, RuntimeError::ExecutionFailed { .. }));
}

#[tokio::test]
async fn test_proc_exit_zero_keeps_output() {
    let wat = r#"
        (module
            (import "wasi_snapshot_preview1" "fd_write"
                (func $fd_write (param i32 i32 i32 i32) (result i32)))
            (import "wasi_snapshot_preview1" "proc_exit" (func $proc_exit (param i32)))
            (memory (export "memory") 1)
            (data (i32.const 100) "{}")

            (func (export "handler")
                (i32.store (i32.const 0) (i32.const 100))
                (i32.store (i32.const 4) (i32.const 2))
                (drop (call $fd_write (i32.const 1) (i32.const 0) (i32.const 1) (i32.const 16)))
                (call $proc_exit (i32.const 0)))
        )
    "#;
    let dir = tempfile::tempdir().unwrap();
    let bundle = wasm_bundle(dir.path(), "exit-zero", wat);

    let output = sandbox().run(&bundle, b"").await.unwrap();
    assert_eq!(output, "{}");
}

#[tokio::test]
async fn test_proc_exit_non_zero_fails() {
    let wat = r#"
        (module
            (import "wasi_snapshot_preview1" "proc_exit" (func $proc_exit (param i32)))
            (func (export "handler")
                (call $proc_exit (i32.const 3)))
        )
    "#;
    let dir = tempfile::tempdir().unwrap();
    let bundle = wasm_bundle(dir.path(), "exit-three", wat);

    let err = sandbox().run(&bundle, b"").await.unwrap_err();
    assert!(matches!(
        err,
        RuntimeError::Wasi(WasiError::NonZeroExit { code: 3 })
    ));
}

// ============================================================================
// Test: Resource limits
// ============================================================================

const SPIN_WAT: &str = r#"
    (module
        (func (export "handler")
            (loop $forever
                (br $forever)
            )
        )
    )
"#;

#[tokio::test]
async fn test_fuel_exhaustion() {
    let dir = tempfile::tempdir().unwrap();
    let bundle = wasm_bundle(dir.path(), "spin", SPIN_WAT);
    let sandbox = sandbox_with(
        EngineConfig {
            pooling_allocator: false,
            epoch_interruption: false,
            ..Default::default()
        },
        ExecutionConfig {
            max_fuel: 1000,
            fuel_metering: true,
            ..Default::default()
        },
    );

    let err = sandbox.run(&bundle, b"").await.unwrap_err();
    assert!(matches!(err, RuntimeError::FuelExhausted));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_epoch_deadline_interrupts_runaway_module() {
    let dir = tempfile::tempdir().unwrap();
    let bundle = wasm_bundle(dir.path(), "spin", SPIN_WAT);
    let sandbox = sandbox_with(
        EngineConfig {
            pooling_allocator: false,
            epoch_interruption: true,
            epoch_tick_ms: 1,
            ..Default::default()
        },
        ExecutionConfig {
            fuel_metering: false,
            timeout_ms: 50,
            ..Default::default()
        },
    );
    let ticker = sandbox.engine().start_epoch_ticker().unwrap().unwrap();

    let err = sandbox.run(&bundle, b"").await.unwrap_err();
    ticker.stop();

    assert!(matches!(err, RuntimeError::ExecutionTimeout { duration_ms: 50 }));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_epoch_deadline_fires_when_every_worker_is_busy() {
    let dir = tempfile::tempdir().unwrap();
    let bundle = Arc::new(wasm_bundle(dir.path(), "spin", SPIN_WAT));
    let sandbox = Arc::new(sandbox_with(
        EngineConfig {
            pooling_allocator: false,
            epoch_interruption: true,
            epoch_tick_ms: 1,
            ..Default::default()
        },
        ExecutionConfig {
            fuel_metering: false,
            timeout_ms: 100,
            ..Default::default()
        },
    ));
    let ticker = sandbox.engine().start_epoch_ticker().unwrap().unwrap();

    // One runaway module per worker thread.
    let tasks: Vec<_> = (0..2)
        .map(|_| {
            let sandbox = Arc::clone(&sandbox);
            let bundle = Arc::clone(&bundle);
            tokio::spawn(async move { sandbox.run(&bundle, b"").await })
        })
        .collect();

    for task in tasks {
        let result = tokio::time::timeout(Duration::from_secs(10), task)
            .await
            .expect("runaway module was never interrupted")
            .unwrap();
        assert!(matches!(
            result,
            Err(RuntimeError::ExecutionTimeout { duration_ms: 100 })
        ));
    }
    ticker.stop();
}

#[tokio::test]
async fn test_output_beyond_capacity_fails() {
    let dir = tempfile::tempdir().unwrap();
    let bundle = wasm_bundle(dir.path(), "chatty", NAME_TWICE_WAT);
    let sandbox = sandbox_with(
        EngineConfig {
            pooling_allocator: false,
            epoch_interruption: false,
            ..Default::default()
        },
        ExecutionConfig {
            max_output_bytes: 4,
            ..Default::default()
        },
    );

    let err = sandbox
        .run(&bundle, br#"{"name":"John"}"#)
        .await
        .unwrap_err();
    assert!(matches!(err, RuntimeError::ExecutionFailed { .. }));
}

// ============================================================================
// Test: Host Function Logging
// ============================================================================

#[tokio::test]
async fn test_host_function_logging() {
    let wat = r#"
        (module
            (import "env" "log" (func $log (param i32 i32 i32)))
            (memory (export "memory") 1)
            (data (i32.const 0) "First message")
            (data (i32.const 20) "Second message")
            (data (i32.const 40) "Error message")

            (func (export "handler")
                ;; Log at Info level (1)
                (call $log (i32.const 1) (i32.const 0) (i32.const 13))
                ;; Log at Debug level (0)
                (call $log (i32.const 0) (i32.const 20) (i32.const 14))
                ;; Log at Error level (3)
                (call $log (i32.const 3) (i32.const 40) (i32.const 13))
            )
        )
    "#;

    let engine = WasmEngine::new(&EngineConfig {
        pooling_allocator: false,
        epoch_interruption: false,
        ..Default::default()
    })
    .unwrap();
    let runner = InstanceRunner::new(engine.inner()).unwrap();
    let compiled =
        CompiledModule::from_bytes(engine.inner(), &wat::parse_str(wat).unwrap()).unwrap();

    let exec_config = ExecutionConfig::default();
    let (mut store, _io) =
        create_store(&engine, &exec_config, "test-multi-log".into(), "logger", b"").unwrap();

    runner
        .invoke(&compiled, &mut store, "logger", "handler", exec_config.timeout_ms)
        .await
        .unwrap();

    let logs = store.data().logs.entries();
    assert_eq!(logs.len(), 3);

    assert_eq!(logs[0].message, "First message");
    assert_eq!(logs[0].level, LogLevel::Info);

    assert_eq!(logs[1].message, "Second message");
    assert_eq!(logs[1].level, LogLevel::Debug);

    assert_eq!(logs[2].message, "Error message");
    assert_eq!(logs[2].level, LogLevel::Error);

    assert!(store.data().metrics.fuel_consumed > 0);
}

#[tokio::test]
async fn test_host_function_logging_is_capped() {
    let wat = r#"
        (module
            (import "env" "log" (func $log (param i32 i32 i32)))
            (memory (export "memory") 1)
            (data (i32.const 0) "tick")

            (func (export "handler")
                (local $i i32)
                (loop $again
                    (call $log (i32.const 0) (i32.const 0) (i32.const 4))
                    (local.set $i (i32.add (local.get $i) (i32.const 1)))
                    (br_if $again (i32.lt_u (local.get $i) (i32.const 5000)))
                )
            )
        )
    "#;

    let engine = WasmEngine::new(&EngineConfig {
        pooling_allocator: false,
        epoch_interruption: false,
        ..Default::default()
    })
    .unwrap();
    let runner = InstanceRunner::new(engine.inner()).unwrap();
    let compiled =
        CompiledModule::from_bytes(engine.inner(), &wat::parse_str(wat).unwrap()).unwrap();

    let exec_config = ExecutionConfig::default();
    let (mut store, _io) =
        create_store(&engine, &exec_config, "test-log-cap".into(), "chatty", b"").unwrap();

    runner
        .invoke(&compiled, &mut store, "chatty", "handler", exec_config.timeout_ms)
        .await
        .unwrap();

    let logs = &store.data().logs;
    assert_eq!(logs.entries().len(), MAX_LOG_ENTRIES);
    assert_eq!(logs.dropped(), 5000 - MAX_LOG_ENTRIES);
}

#[tokio::test]
async fn test_pooling_allocator_runs_handler() {
    let dir = tempfile::tempdir().unwrap();
    let bundle = wasm_bundle(dir.path(), "pooled", NAME_TWICE_WAT);
    let sandbox = sandbox_with(
        EngineConfig {
            pooling_allocator: true,
            max_instances: 4,
            epoch_interruption: false,
            ..Default::default()
        },
        ExecutionConfig::default(),
    );

    let output = sandbox.run(&bundle, br#"{"name":"Ada"}"#).await.unwrap();
    assert_eq!(output, r#"{"name_twice":"Ada Ada"}"#);
}
