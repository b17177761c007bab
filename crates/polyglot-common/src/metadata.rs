//! Bundle metadata model.
//!
//! Every uploaded bundle carries a `metadata.json` document:
//!
//! ```json
//! { "language": "wasm", "entrypointFile": "hello_wasm.wasm" }
//! ```

use std::fmt;
use std::path::{Component, Path};
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::RuntimeError;

/// File name of the metadata document inside a bundle.
pub const METADATA_FILE: &str = "metadata.json";

/// Language a bundle targets.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Deserialize, Serialize)]
pub enum Language {
    /// JavaScript, run by a Node.js-compatible interpreter.
    #[serde(rename = "js")]
    JavaScript,
    /// Python 3.
    #[serde(rename = "python")]
    Python,
    /// Ruby.
    #[serde(rename = "ruby")]
    Ruby,
    /// Pre-compiled WebAssembly module using WASI.
    #[serde(rename = "wasm")]
    Wasm,
}

impl Language {
    /// All supported languages.
    pub const ALL: [Language; 4] = [
        Language::JavaScript,
        Language::Python,
        Language::Ruby,
        Language::Wasm,
    ];

    /// Identifier used in metadata documents.
    pub fn identifier(self) -> &'static str {
        match self {
            Language::JavaScript => "js",
            Language::Python => "python",
            Language::Ruby => "ruby",
            Language::Wasm => "wasm",
        }
    }

    /// Returns `true` for bundles executed in the WebAssembly sandbox.
    pub fn is_sandboxed(self) -> bool {
        matches!(self, Language::Wasm)
    }
}

impl fmt::Display for Language {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.identifier())
    }
}

impl FromStr for Language {
    type Err = RuntimeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Language::ALL
            .into_iter()
            .find(|language| language.identifier() == s)
            .ok_or_else(|| RuntimeError::invalid_metadata(format!("unsupported language '{s}'")))
    }
}

/// Parsed bundle descriptor.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct BundleMetadata {
    /// Target language.
    pub language: Language,

    /// Entrypoint path relative to the bundle directory.
    #[serde(rename = "entrypointFile")]
    pub entrypoint_file: String,
}

impl BundleMetadata {
    /// Create metadata in code.
    pub fn new(language: Language, entrypoint_file: impl Into<String>) -> Self {
        Self {
            language,
            entrypoint_file: entrypoint_file.into(),
        }
    }

    /// Parse and validate a metadata document.
    ///
    /// Whether the entrypoint exists is not checked here; that depends on the
    /// bundle directory.
    pub fn from_slice(document: &[u8]) -> Result<Self, RuntimeError> {
        let metadata: Self = serde_json::from_slice(document)
            .map_err(|e| RuntimeError::invalid_metadata(e.to_string()))?;
        metadata.validate()?;
        Ok(metadata)
    }

    /// Check that the entrypoint is a relative path that stays inside the
    /// bundle directory.
    pub fn validate(&self) -> Result<(), RuntimeError> {
        if self.entrypoint_file.trim().is_empty() {
            return Err(RuntimeError::invalid_metadata(
                "entrypointFile must not be empty",
            ));
        }

        let escapes = Path::new(&self.entrypoint_file)
            .components()
            .any(|c| !matches!(c, Component::Normal(_) | Component::CurDir));
        if escapes {
            return Err(RuntimeError::invalid_metadata(format!(
                "entrypointFile '{}' must be a relative path inside the bundle",
                self.entrypoint_file
            )));
        }

        Ok(())
    }
}
