//! Bundle upload: archive extraction and registration.
//!
//! An upload is a zip archive with `metadata.json` at its root. Each upload is
//! extracted into its own directory, `<bundle_dir>/<name>-<uuid>`, so a
//! re-upload never touches the files of the bundle it replaces.

use std::io::Cursor;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use bytes::Bytes;
use tracing::{info, instrument, warn};
use uuid::Uuid;
use zip::ZipArchive;

use polyglot_common::bundle::validate_name;
use polyglot_common::{Bundle, METADATA_FILE, RuntimeError};
use polyglot_core::BundleRegistry;

/// Returns `true` if `file_name` names a zip archive.
pub fn is_zip(file_name: &str) -> bool {
    Path::new(file_name)
        .extension()
        .is_some_and(|ext| ext.eq_ignore_ascii_case("zip"))
}

/// Extracts uploaded archives and registers them.
#[derive(Debug, Clone)]
pub struct Uploader {
    bundle_dir: PathBuf,
    registry: Arc<BundleRegistry>,
}

impl Uploader {
    /// Create an uploader that extracts under `bundle_dir`.
    pub fn new(bundle_dir: impl Into<PathBuf>, registry: Arc<BundleRegistry>) -> Self {
        Self {
            bundle_dir: bundle_dir.into(),
            registry,
        }
    }

    /// Root directory for extracted bundles.
    pub fn bundle_dir(&self) -> &Path {
        &self.bundle_dir
    }

    /// Extract `archive` and register it as `name`.
    ///
    /// On failure the extraction directory is removed and the registry is
    /// left unchanged.
    ///
    /// # Errors
    ///
    /// Returns a registration error for an invalid name, a corrupt archive,
    /// missing or invalid metadata, or a missing entrypoint.
    #[instrument(skip(self, archive), fields(bundle = %name, archive_len = archive.len()))]
    pub async fn install(&self, name: &str, archive: Bytes) -> Result<Arc<Bundle>, RuntimeError> {
        validate_name(name)?;

        let target = self.bundle_dir.join(format!("{name}-{}", Uuid::new_v4()));
        tokio::fs::create_dir_all(&target).await?;

        match self.extract_and_register(name, archive, &target).await {
            Ok(bundle) => {
                info!(directory = %target.display(), "Bundle installed");
                Ok(bundle)
            }
            Err(e) => {
                warn!(error = %e, "Bundle upload rejected");
                if let Err(cleanup) = tokio::fs::remove_dir_all(&target).await {
                    warn!(error = %cleanup, directory = %target.display(), "Failed to remove rejected bundle");
                }
                Err(e)
            }
        }
    }

    async fn extract_and_register(
        &self,
        name: &str,
        archive: Bytes,
        target: &Path,
    ) -> Result<Arc<Bundle>, RuntimeError> {
        extract_archive(archive, target.to_path_buf()).await?;

        let document = match tokio::fs::read(target.join(METADATA_FILE)).await {
            Ok(document) => document,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Err(RuntimeError::invalid_bundle(format!(
                    "archive has no {METADATA_FILE} at its root"
                )));
            }
            Err(e) => return Err(e.into()),
        };

        self.registry.register(name, &document, target)
    }
}

/// Extract a zip archive into `target` on the blocking pool.
///
/// Entries that would land outside `target` are rejected by the archive
/// reader.
///
/// # Errors
///
/// Returns [`RuntimeError::InvalidBundle`] if the archive cannot be read.
pub async fn extract_archive(archive: Bytes, target: PathBuf) -> Result<(), RuntimeError> {
    tokio::task::spawn_blocking(move || {
        let mut zip = ZipArchive::new(Cursor::new(archive))
            .map_err(|e| RuntimeError::invalid_bundle(format!("not a zip archive: {e}")))?;
        zip.extract(&target)
            .map_err(|e| RuntimeError::invalid_bundle(format!("failed to extract archive: {e}")))
    })
    .await
    .map_err(|e| RuntimeError::Io(std::io::Error::other(e)))?
}
