//! LabelSmith archive store adapter.
//!
//! Implements [`reconcile::ports::ArchiveStore`] on a filesystem. Buckets are
//! directories under a configured root and object paths map to nested files,
//! so the layout can be synced to an object store as-is.
//!
//! ## Write Protocol
//!
//! 1. Write the payload to a uniquely named temporary file next to the target
//!    and fsync it.
//! 2. Hard-link the temporary file to the target name. The link fails if the
//!    target exists, which makes writes create-only: the first copy wins and a
//!    redelivery reports [`WriteOutcome::AlreadyPresent`].
//! 3. Remove the temporary file and fsync the directory.
//!
//! Readers never see a partially written object.
//!
//! ## Architectural Layer
//!
//! **Infrastructure.** Path layout is decided by the domain; this crate only
//! checks that each path component is a plain name.

use std::io;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use tokio::io::AsyncWriteExt;
use tracing::warn;
use uuid::Uuid;

use reconcile::ports::{ArchiveStore, WriteOutcome};
use reconcile::ArchiveError;

/// A create-only object store rooted at a directory.
#[derive(Debug, Clone)]
pub struct FsArchiveStore {
    root: PathBuf,
}

impl FsArchiveStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// Maps `bucket` and `path` to a file under the root.
    pub fn resolve(&self, bucket: &str, path: &str) -> Result<PathBuf, ArchiveError> {
        let invalid = |reason: &str| ArchiveError::InvalidPath {
            path: format!("{bucket}/{path}"),
            reason: reason.to_owned(),
        };

        check_component(bucket).map_err(|r| invalid(&format!("bucket: {r}")))?;
        let mut resolved = self.root.join(bucket);
        for component in path.split('/') {
            check_component(component).map_err(|r| invalid(r))?;
            resolved.push(component);
        }
        Ok(resolved)
    }
}

fn check_component(component: &str) -> Result<(), &'static str> {
    match component {
        "" => Err("empty path component"),
        "." | ".." => Err("relative path component"),
        c if c.contains(['\\', '\0']) => Err("path component contains a reserved character"),
        c if c.starts_with('.') => Err("hidden path component"),
        _ => Ok(()),
    }
}

fn write_error(path: &Path, e: io::Error) -> ArchiveError {
    ArchiveError::Write {
        path: path.display().to_string(),
        message: e.to_string(),
    }
}

async fn write_synced(path: &Path, payload: &[u8]) -> io::Result<()> {
    let mut file = tokio::fs::OpenOptions::new()
        .write(true)
        .create_new(true)
        .open(path)
        .await?;
    file.write_all(payload).await?;
    file.sync_all().await
}

async fn sync_dir(dir: &Path) -> io::Result<()> {
    tokio::fs::File::open(dir).await?.sync_all().await
}

#[async_trait]
impl ArchiveStore for FsArchiveStore {
    async fn write(
        &self,
        bucket: &str,
        path: &str,
        payload: &[u8],
    ) -> Result<WriteOutcome, ArchiveError> {
        let target = self.resolve(bucket, path)?;
        let (Some(dir), Some(name)) = (target.parent(), target.file_name()) else {
            return Err(ArchiveError::InvalidPath {
                path: path.to_owned(),
                reason: "path has no file name".into(),
            });
        };

        if tokio::fs::try_exists(&target).await.unwrap_or(false) {
            return Ok(WriteOutcome::AlreadyPresent);
        }

        tokio::fs::create_dir_all(dir)
            .await
            .map_err(|e| write_error(dir, e))?;

        let temp = dir.join(format!(
            ".{}.{}.tmp",
            name.to_string_lossy(),
            Uuid::new_v4().simple()
        ));
        if let Err(e) = write_synced(&temp, payload).await {
            let _ = tokio::fs::remove_file(&temp).await;
            return Err(write_error(&temp, e));
        }

        let linked = tokio::fs::hard_link(&temp, &target).await;
        if let Err(e) = tokio::fs::remove_file(&temp).await {
            warn!(path = %temp.display(), error = %e, "Failed to remove temporary archive file");
        }

        match linked {
            Ok(()) => {
                if let Err(e) = sync_dir(dir).await {
                    warn!(path = %dir.display(), error = %e, "Failed to sync archive directory");
                }
                Ok(WriteOutcome::Created)
            }
            Err(e) if e.kind() == io::ErrorKind::AlreadyExists => {
                Ok(WriteOutcome::AlreadyPresent)
            }
            Err(e) => Err(write_error(&target, e)),
        }
    }
}
