//! Directory operations

use std::path::{Path, PathBuf};

use tokio::fs;
use tracing::debug;

use crate::errors::DeployerError;

/// A directory wrapper with path
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Dir {
    path: PathBuf,
}

/// Counts reported by [`Dir::copy_contents_to`]
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CopyStats {
    pub files: u64,
    pub dirs: u64,
    pub skipped: u64,
}

impl Dir {
    /// Create a new directory reference
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// Get the directory path
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Check if the directory exists
    pub async fn exists(&self) -> bool {
        fs::metadata(&self.path)
            .await
            .map(|m| m.is_dir())
            .unwrap_or(false)
    }

    /// Create the directory (and parents)
    pub async fn create(&self) -> Result<(), DeployerError> {
        fs::create_dir_all(&self.path).await?;
        Ok(())
    }

    /// Delete the directory and all contents
    pub async fn delete(&self) -> Result<(), DeployerError> {
        match fs::remove_dir_all(&self.path).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }

    /// Delete the directory if present and create it empty
    pub async fn recreate(&self) -> Result<(), DeployerError> {
        self.delete().await?;
        self.create().await
    }

    /// Get a file within this directory
    pub fn file(&self, name: &str) -> crate::filesys::file::File {
        crate::filesys::file::File::new(self.path.join(name))
    }

    /// Get a subdirectory
    pub fn subdir(&self, name: impl AsRef<Path>) -> Dir {
        Dir::new(self.path.join(name))
    }

    /// Create a uniquely named directory under `root`
    pub async fn create_temp_dir(root: &Path, prefix: &str) -> Result<Dir, DeployerError> {
        let temp_dir = root.join(format!("{}-{}", prefix, uuid::Uuid::new_v4()));
        fs::create_dir_all(&temp_dir).await?;
        Ok(Dir::new(temp_dir))
    }

    /// Recursively copy every regular file and subdirectory into `dest`,
    /// preserving structure. Symlinks, sockets and other special files are
    /// skipped.
    pub async fn copy_contents_to(&self, dest: &Dir) -> Result<CopyStats, DeployerError> {
        let mut stats = CopyStats::default();
        let mut pending = vec![(self.path.clone(), dest.path.clone())];

        while let Some((from, to)) = pending.pop() {
            fs::create_dir_all(&to).await?;
            let mut entries = fs::read_dir(&from).await?;

            while let Some(entry) = entries.next_entry().await? {
                let file_type = entry.file_type().await?;
                let target = to.join(entry.file_name());

                if file_type.is_dir() {
                    stats.dirs += 1;
                    pending.push((entry.path(), target));
                } else if file_type.is_file() {
                    fs::copy(entry.path(), &target).await?;
                    stats.files += 1;
                } else {
                    debug!("Skipping non-regular file {}", entry.path().display());
                    stats.skipped += 1;
                }
            }
        }

        Ok(stats)
    }
}
