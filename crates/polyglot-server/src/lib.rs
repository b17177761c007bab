//! Dispatcher and HTTP server for polyglot-runtime.
//!
//! This crate ties the sandbox and the interpreters together behind an HTTP
//! interface. It handles:
//!
//! - Dispatching invocations to the sandboxed or interpreted strategy
//! - Bundle upload (multipart, zip extraction, registration)
//! - Request/response conversion
//! - Health and readiness checks
//!
//! # Quick Start
//!
//! ```ignore
//! use polyglot_server::{PolyglotServer, ServerConfig};
//! use polyglot_common::RuntimeConfig;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let runtime_config = RuntimeConfig::default();
//!     let server = PolyglotServer::new(&runtime_config, ServerConfig::default(), "/var/lib/polyglot")?;
//!     server.run().await?;
//!
//!     Ok(())
//! }
//! ```

pub mod dispatch;
pub mod handler;
pub mod request;
pub mod response;
pub mod router;
pub mod server;
pub mod state;
pub mod upload;

pub use dispatch::{Dispatcher, Strategy};
pub use router::{RouterLimits, build_router};
pub use server::{PolyglotServer, ServerConfig};
pub use state::AppState;
pub use upload::Uploader;
