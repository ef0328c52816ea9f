use std::path::{Path, PathBuf};

use bytes::Bytes;
use futures::{Stream, StreamExt};
use tokio::io::AsyncWriteExt;

use crate::{
    error::{CleanupError, EnvironmentError, ValidationError},
    job::JobId,
};

/// Per-job scratch directory. Removed exactly once: by [`ScratchDir::release`]
/// on the normal path, or synchronously on drop on any other exit path.
#[derive(Debug)]
pub struct ScratchDir {
    path: PathBuf,
    job_id: JobId,
    armed: bool,
    staged: usize,
}

impl ScratchDir {
    /// Creates `<root>/<job id>`. Fails if it already exists.
    pub async fn create(root: &Path, job_id: &JobId) -> Result<Self, EnvironmentError> {
        let path = root.join(job_id.to_string());
        tokio::fs::create_dir_all(root)
            .await
            .map_err(|source| EnvironmentError::Scratch {
                path: root.to_path_buf(),
                source,
            })?;
        tokio::fs::create_dir(&path)
            .await
            .map_err(|source| EnvironmentError::Scratch {
                path: path.clone(),
                source,
            })?;
        log::debug!("job {}: scratch {} created", job_id, path.display());

        Ok(Self {
            path,
            job_id: job_id.clone(),
            armed: true,
            staged: 0,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Streams `chunks` into a new scratch file and returns its path and size.
    /// Files are numbered so identical client names never collide on disk.
    pub async fn stage<S, E>(
        &mut self,
        name: &str,
        chunks: S,
        limit: u64,
    ) -> Result<StagedFile, StageError<E>>
    where
        S: Stream<Item = Result<Bytes, E>>,
    {
        let mut chunks = std::pin::pin!(chunks);
        let path = self.path.join(format!("{:04}-{}", self.staged, name));
        self.staged += 1;

        let mut file = tokio::fs::File::create(&path).await.map_err(StageError::Io)?;
        let mut size = 0u64;
        while let Some(chunk) = chunks.next().await {
            let chunk = chunk.map_err(StageError::Source)?;
            size += chunk.len() as u64;
            if size > limit {
                return Err(StageError::Invalid(ValidationError::TooLarge {
                    name: name.to_string(),
                    limit,
                }));
            }
            file.write_all(&chunk).await.map_err(StageError::Io)?;
        }
        file.flush().await.map_err(StageError::Io)?;

        Ok(StagedFile { path, size })
    }

    pub async fn release(mut self) {
        self.armed = false;
        let result = tokio::fs::remove_dir_all(&self.path).await;
        self.report(result);
    }

    fn report(&self, result: std::io::Result<()>) {
        match result {
            Ok(()) => log::info!("job {}: scratch cleanup completed", self.job_id),
            Err(source) => {
                let err = CleanupError {
                    path: self.path.clone(),
                    source,
                };
                log::error!("job {}: {}", self.job_id, err);
            }
        }
    }
}

impl Drop for ScratchDir {
    fn drop(&mut self) {
        if self.armed {
            self.armed = false;
            let result = std::fs::remove_dir_all(&self.path);
            self.report(result);
        }
    }
}

#[derive(Debug)]
pub struct StagedFile {
    pub path: PathBuf,
    pub size: u64,
}

#[derive(Debug)]
pub enum StageError<E> {
    /// The upload itself failed (client side).
    Source(E),
    Invalid(ValidationError),
    Io(std::io::Error),
}
