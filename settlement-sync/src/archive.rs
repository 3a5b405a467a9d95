//! Archive of processed statements kept as plain files in one directory (typically a
//! synchronised network drive).
//!
//! A file only becomes visible under its final name once it is complete: when a rename is
//! not possible (different filesystem) it is copied to a hidden `.<name>.partial` file
//! first and renamed afterwards. Hidden files are never listed.
//!
//! Once the file is in the archive under its final name, `store` reports success even if
//! the staged copy cannot be removed; the caller discards staging anyway.

use std::collections::BTreeSet;
use std::io;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use settlement_sync_core::contract::ArchiveStore;
use settlement_sync_core::error::ArchiveError;
use tracing::{debug, info, warn};

#[derive(Debug, Clone)]
pub struct DirectoryArchive {
    root: PathBuf,
}

impl DirectoryArchive {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }
}

fn io_err(path: &Path) -> impl FnOnce(io::Error) -> ArchiveError + '_ {
    move |source| ArchiveError::Io {
        path: path.to_path_buf(),
        source,
    }
}

async fn copy_into_place(staged: &Path, dest: &Path, file_name: &str) -> Result<(), ArchiveError> {
    let partial = dest.with_file_name(format!(".{file_name}.partial"));
    if let Err(e) = tokio::fs::copy(staged, &partial).await {
        let _ = tokio::fs::remove_file(&partial).await;
        return Err(io_err(&partial)(e));
    }
    if let Err(e) = tokio::fs::rename(&partial, dest).await {
        let _ = tokio::fs::remove_file(&partial).await;
        return Err(io_err(dest)(e));
    }
    if let Err(e) = tokio::fs::remove_file(staged).await {
        warn!(
            error = %e,
            file = %file_name,
            path = %staged.display(),
            "[SYNC][ARCHIVE] Archived, but the staged copy could not be removed"
        );
    }
    Ok(())
}

impl DirectoryArchive {
    async fn vacant_location(&self, file_name: &str) -> Result<PathBuf, ArchiveError> {
        let dest = self.location(file_name);
        if tokio::fs::try_exists(&dest).await.map_err(io_err(&dest))? {
            return Err(ArchiveError::AlreadyArchived(file_name.to_string()));
        }
        Ok(dest)
    }

    /// Files `staged` by copying it through a hidden partial file, the path `store` takes
    /// when the staging area is on another filesystem.
    pub async fn store_by_copy(&self, file_name: &str, staged: &Path) -> Result<PathBuf, ArchiveError> {
        let dest = self.vacant_location(file_name).await?;
        copy_into_place(staged, &dest, file_name).await?;
        info!(file = %file_name, path = %dest.display(), "[SYNC][ARCHIVE] Stored in archive");
        Ok(dest)
    }
}

#[async_trait]
impl ArchiveStore for DirectoryArchive {
    async fn list(&self) -> Result<BTreeSet<String>, ArchiveError> {
        let mut entries = tokio::fs::read_dir(&self.root)
            .await
            .map_err(io_err(&self.root))?;
        let mut names = BTreeSet::new();
        while let Some(entry) = entries.next_entry().await.map_err(io_err(&self.root))? {
            let file_type = entry.file_type().await.map_err(io_err(&entry.path()))?;
            if !file_type.is_file() {
                continue;
            }
            let Some(name) = entry.file_name().to_str().map(str::to_string) else {
                debug!(path = %entry.path().display(), "[SYNC][ARCHIVE] Skipping non UTF-8 name");
                continue;
            };
            if !name.starts_with('.') {
                names.insert(name);
            }
        }
        Ok(names)
    }

    fn location(&self, file_name: &str) -> PathBuf {
        self.root.join(file_name)
    }

    async fn store(&self, file_name: &str, staged: &Path) -> Result<PathBuf, ArchiveError> {
        let dest = self.vacant_location(file_name).await?;
        if let Err(e) = tokio::fs::rename(staged, &dest).await {
            debug!(
                error = %e,
                file = %file_name,
                "[SYNC][ARCHIVE] Rename failed, copying into the archive instead"
            );
            copy_into_place(staged, &dest, file_name).await?;
        }
        info!(file = %file_name, path = %dest.display(), "[SYNC][ARCHIVE] Stored in archive");
        Ok(dest)
    }
}
