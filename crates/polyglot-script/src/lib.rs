//! Interpreted request handlers for polyglot-runtime.
//!
//! Bundles written in JavaScript, Python or Ruby run in a fresh interpreter
//! process per invocation, rooted at the bundle directory:
//!
//! - [`adapter`]: Per-language interpreter invocation and embedded bootstraps
//! - [`handler`]: The [`RequestHandler`] interface and [`ScriptRuntime`]
//! - [`policy`]: Host access policy (full, restricted, denied)
//! - [`process`]: Process lifecycle, deadline and response envelope
//!
//! # Protocol
//!
//! The bootstrap reads a request document from stdin, evaluates the
//! entrypoint, and calls the resulting handler with a `ctx` exposing
//! `request()`, `pathParam(name)` and `response()`. Whatever the handler
//! wrote through `response()` comes back as one JSON envelope on stdout.

pub mod adapter;
pub mod handler;
pub mod policy;
pub mod process;

pub use adapter::ScriptAdapter;
pub use handler::{RequestHandler, ScriptHandler, ScriptRuntime};
pub use policy::HostPolicy;
