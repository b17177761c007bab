//! Registered function bundles.

use std::path::{Path, PathBuf};

use crate::metadata::BundleMetadata;
use crate::RuntimeError;

/// An uploaded, named unit of code plus metadata.
///
/// A `Bundle` is immutable once built. Re-uploading the same name produces a
/// new `Bundle` with its own directory; the old one is never modified.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Bundle {
    name: String,
    metadata: BundleMetadata,
    directory: PathBuf,
}

impl Bundle {
    /// Create a bundle record.
    ///
    /// The directory is made absolute against the current working directory
    /// when given as a relative path.
    pub fn new(
        name: impl Into<String>,
        metadata: BundleMetadata,
        directory: impl Into<PathBuf>,
    ) -> Result<Self, RuntimeError> {
        let name = name.into();
        validate_name(&name)?;
        metadata.validate()?;

        let directory = directory.into();
        let directory = if directory.is_absolute() {
            directory
        } else {
            std::env::current_dir()?.join(directory)
        };

        Ok(Self {
            name,
            metadata,
            directory,
        })
    }

    /// Bundle name, the routing key.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Parsed metadata.
    pub fn metadata(&self) -> &BundleMetadata {
        &self.metadata
    }

    /// Absolute path of the bundle root.
    pub fn directory(&self) -> &Path {
        &self.directory
    }

    /// Absolute path of the entrypoint file.
    pub fn entrypoint_path(&self) -> PathBuf {
        self.directory.join(&self.metadata.entrypoint_file)
    }

    /// Fail with [`RuntimeError::EntrypointMissing`] unless the entrypoint is
    /// a regular file.
    pub fn require_entrypoint(&self) -> Result<PathBuf, RuntimeError> {
        let path = self.entrypoint_path();
        if path.is_file() {
            Ok(path)
        } else {
            Err(RuntimeError::EntrypointMissing {
                path: path.display().to_string(),
            })
        }
    }
}

/// Bundle names travel in URL paths and directory names, so only a small
/// character set is accepted.
pub fn validate_name(name: &str) -> Result<(), RuntimeError> {
    if name.is_empty() || name.len() > 128 {
        return Err(RuntimeError::invalid_bundle(
            "bundle name must be between 1 and 128 characters",
        ));
    }

    if name.starts_with('.')
        || !name
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.'))
    {
        return Err(RuntimeError::invalid_bundle(format!(
            "bundle name '{name}' may only contain letters, digits, '-', '_' and '.'"
        )));
    }

    Ok(())
}
