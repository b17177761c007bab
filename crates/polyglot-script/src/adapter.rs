//! Language adapters for interpreted handlers.
//!
//! Each adapter knows how to start its interpreter with an embedded bootstrap
//! script. The bootstrap evaluates the bundle entrypoint, resolves the
//! request handler and writes a response envelope to stdout.

use polyglot_common::{Language, RuntimeError};

const JS_BOOTSTRAP: &str = include_str!("../bootstrap/handler.js");
const PYTHON_BOOTSTRAP: &str = include_str!("../bootstrap/handler.py");
const RUBY_BOOTSTRAP: &str = include_str!("../bootstrap/handler.rb");

/// Environment variable carrying the absolute entrypoint path.
pub const ENTRYPOINT_ENV: &str = "POLYGLOT_ENTRYPOINT";

/// Environment variable carrying the bundle name.
pub const BUNDLE_ENV: &str = "POLYGLOT_BUNDLE";

/// A scripting language the host can run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScriptAdapter {
    /// JavaScript via Node.js.
    JavaScript,
    /// Python 3.
    Python,
    /// Ruby.
    Ruby,
}

impl ScriptAdapter {
    /// Adapter for `language`.
    ///
    /// # Errors
    ///
    /// Returns an error for languages that are not interpreted.
    pub fn for_language(language: Language) -> Result<Self, RuntimeError> {
        match language {
            Language::JavaScript => Ok(Self::JavaScript),
            Language::Python => Ok(Self::Python),
            Language::Ruby => Ok(Self::Ruby),
            Language::Wasm => Err(RuntimeError::HandlerLoadFailed {
                language: language.to_string(),
                reason: "sandboxed modules are not interpreted".to_string(),
            }),
        }
    }

    /// The language this adapter runs.
    pub fn language(self) -> Language {
        match self {
            Self::JavaScript => Language::JavaScript,
            Self::Python => Language::Python,
            Self::Ruby => Language::Ruby,
        }
    }

    /// Embedded bootstrap source.
    pub fn bootstrap(self) -> &'static str {
        match self {
            Self::JavaScript => JS_BOOTSTRAP,
            Self::Python => PYTHON_BOOTSTRAP,
            Self::Ruby => RUBY_BOOTSTRAP,
        }
    }

    /// Interpreter flag that evaluates the next argument as a program.
    pub fn eval_flag(self) -> &'static str {
        match self {
            Self::JavaScript | Self::Ruby => "-e",
            Self::Python => "-c",
        }
    }

    /// Arguments passed to the interpreter.
    pub fn args(self) -> [&'static str; 2] {
        [self.eval_flag(), self.bootstrap()]
    }
}
