use std::io;
use std::path::{Path, PathBuf};

use tracing::{debug, warn};

/// The local copy of a statement while it moves through the pipeline.
///
/// It either ends up in the archive or is removed with [`StagingFile::discard`]; nothing
/// is left behind on the staging directory between runs.
#[derive(Debug)]
pub struct StagingFile {
    path: PathBuf,
}

impl StagingFile {
    /// Writes `bytes` to `dir/file_name`. A partially written file is removed before the
    /// error is returned.
    pub async fn write(dir: &Path, file_name: &str, bytes: &[u8]) -> io::Result<Self> {
        let path = dir.join(file_name);
        if let Err(e) = tokio::fs::write(&path, bytes).await {
            let _ = tokio::fs::remove_file(&path).await;
            return Err(e);
        }
        debug!(path = %path.display(), size = bytes.len(), "[SYNC][FETCH] Staged file");
        Ok(Self { path })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Removes the staged copy. A file that is already gone is not an error.
    pub async fn discard(self) {
        match tokio::fs::remove_file(&self.path).await {
            Ok(()) => debug!(path = %self.path.display(), "[SYNC][CLEANUP] Removed staged file"),
            Err(e) if e.kind() == io::ErrorKind::NotFound => {}
            Err(e) => warn!(
                path = %self.path.display(),
                error = ?e,
                "[SYNC][CLEANUP] Failed to remove staged file"
            ),
        }
    }
}
