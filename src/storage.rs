//! Storage move facility used to relocate staged files
//!
//! On a phone this is the scoped-storage layer that moves a file into a
//! user-chosen folder. [`FsStorageMover`] is the plain file-system version.

use crate::error::{Error, Result};
use async_trait::async_trait;
use std::path::{Path, PathBuf};

/// Moves and renames files inside user-visible storage
#[async_trait]
pub trait StorageMover: Send + Sync {
    /// Move `source` into `dest_folder` as `dest_name`; returns the resulting path
    ///
    /// The resulting name may differ from `dest_name` when the storage layer
    /// adjusts it (for example by appending an extension for the MIME type).
    async fn move_file(&self, source: &Path, dest_folder: &Path, dest_name: &str) -> Result<PathBuf>;

    /// Rename `path` in place to `new_name`; returns the new path
    async fn rename(&self, path: &Path, new_name: &str) -> Result<PathBuf>;
}

/// [`StorageMover`] over the local file system
#[derive(Debug, Default, Clone, Copy)]
pub struct FsStorageMover;

#[async_trait]
impl StorageMover for FsStorageMover {
    async fn move_file(&self, source: &Path, dest_folder: &Path, dest_name: &str) -> Result<PathBuf> {
        tracing::debug!(source = ?source, dest_folder = ?dest_folder, dest_name, "Preparing storage move");

        tokio::fs::create_dir_all(dest_folder).await.map_err(|e| {
            Error::relocation(format!(
                "failed to create folder {}: {}",
                dest_folder.display(),
                e
            ))
        })?;

        let target = dest_folder.join(dest_name);
        move_path(source, &target).await?;
        Ok(target)
    }

    async fn rename(&self, path: &Path, new_name: &str) -> Result<PathBuf> {
        let target = path.with_file_name(new_name);
        move_path(path, &target).await?;
        Ok(target)
    }
}

/// Rename, falling back to copy + remove when the paths are on different file systems
async fn move_path(source: &Path, target: &Path) -> Result<()> {
    match tokio::fs::rename(source, target).await {
        Ok(()) => Ok(()),
        Err(rename_err) => {
            tracing::debug!(
                source = ?source,
                target = ?target,
                error = %rename_err,
                "Rename failed, falling back to copy"
            );
            tokio::fs::copy(source, target).await.map_err(|e| {
                Error::relocation(format!(
                    "failed to move {} to {}: {} (rename: {})",
                    source.display(),
                    target.display(),
                    e,
                    rename_err
                ))
            })?;
            if let Err(e) = tokio::fs::remove_file(source).await {
                tracing::warn!(source = ?source, error = %e, "Failed to remove source after copy");
            }
            Ok(())
        }
    }
}
