//! Artifact retrieval: streams a remote video into a temporary file next to
//! its destination and renames it into place only once the transfer is
//! complete. A failed, cancelled, or dropped transfer leaves no file behind
//! and does not touch an existing destination.

use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tokio::fs;
use tokio::io::AsyncWriteExt;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::error::RetrievalError;
use crate::task::ArtifactRef;

/// What to do when the destination file already exists.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CollisionPolicy {
    /// Download again and atomically replace the existing file.
    #[default]
    Overwrite,
    /// Leave the existing file alone and report it as skipped.
    Skip,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Retrieved {
    Written { path: PathBuf, bytes: u64 },
    Skipped { path: PathBuf },
}

impl Retrieved {
    pub fn path(&self) -> &Path {
        match self {
            Retrieved::Written { path, .. } | Retrieved::Skipped { path } => path,
        }
    }
}

/// Result of retrieving one artifact within a batch.
#[derive(Debug)]
pub struct ArtifactReport {
    pub artifact: ArtifactRef,
    pub destination: PathBuf,
    pub result: Result<Retrieved, RetrievalError>,
}

fn io_error(path: &Path) -> impl FnOnce(std::io::Error) -> RetrievalError {
    move |source| RetrievalError::Io {
        path: path.to_path_buf(),
        source,
    }
}

#[derive(Debug, Clone)]
pub struct ArtifactRetriever {
    client: Client,
    collision: CollisionPolicy,
}

impl ArtifactRetriever {
    pub fn new(client: Client, collision: CollisionPolicy) -> Self {
        Self { client, collision }
    }

    /// Downloads `artifact` to `dest`, creating the parent directory if needed.
    pub async fn retrieve(
        &self,
        artifact: &ArtifactRef,
        dest: &Path,
        cancel: &CancellationToken,
    ) -> Result<Retrieved, RetrievalError> {
        if artifact.url.trim().is_empty() {
            return Err(RetrievalError::MissingUrl {
                id: artifact.id.clone(),
            });
        }

        if self.collision == CollisionPolicy::Skip
            && fs::try_exists(dest).await.map_err(io_error(dest))?
        {
            info!(path = %dest.display(), "destination exists, skipping download");
            return Ok(Retrieved::Skipped {
                path: dest.to_path_buf(),
            });
        }

        // Dropping the transfer future removes its temporary file.
        tokio::select! {
            _ = cancel.cancelled() => {
                warn!(url = %artifact.url, "download cancelled");
                Err(RetrievalError::Cancelled { url: artifact.url.clone() })
            }
            result = self.stream_to(artifact, dest) => result,
        }
    }

    async fn stream_to(
        &self,
        artifact: &ArtifactRef,
        dest: &Path,
    ) -> Result<Retrieved, RetrievalError> {
        let dir = match dest.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => parent,
            _ => Path::new("."),
        };
        fs::create_dir_all(dir).await.map_err(io_error(dir))?;

        info!(path = %dest.display(), "downloading video");
        let mut resp = self
            .client
            .get(&artifact.url)
            .send()
            .await
            .map_err(|source| RetrievalError::Transport {
                url: artifact.url.clone(),
                source,
            })?;

        let status = resp.status();
        if !status.is_success() {
            return Err(RetrievalError::Http {
                status: status.as_u16(),
                url: artifact.url.clone(),
            });
        }

        let staging = tempfile::Builder::new()
            .prefix(".kling-")
            .suffix(".part")
            .tempfile_in(dir)
            .map_err(io_error(dir))?;
        let staging_path = staging.path().to_path_buf();
        let handle = staging
            .as_file()
            .try_clone()
            .map_err(io_error(&staging_path))?;
        let mut out = fs::File::from_std(handle);

        let mut written = 0u64;
        while let Some(chunk) = resp
            .chunk()
            .await
            .map_err(|source| RetrievalError::Transport {
                url: artifact.url.clone(),
                source,
            })?
        {
            out.write_all(&chunk)
                .await
                .map_err(io_error(&staging_path))?;
            written += chunk.len() as u64;
        }
        out.flush().await.map_err(io_error(&staging_path))?;
        out.sync_all().await.map_err(io_error(&staging_path))?;
        drop(out);

        staging
            .persist(dest)
            .map_err(|err| RetrievalError::Io {
                path: dest.to_path_buf(),
                source: err.error,
            })?;

        debug!(path = %dest.display(), bytes = written, "download complete");
        Ok(Retrieved::Written {
            path: dest.to_path_buf(),
            bytes: written,
        })
    }

    /// Retrieves every artifact concurrently. One failure does not stop the
    /// others; reports come back in input order.
    pub async fn retrieve_all(
        &self,
        items: Vec<(ArtifactRef, PathBuf)>,
        cancel: &CancellationToken,
    ) -> Vec<ArtifactReport> {
        let mut handles = Vec::with_capacity(items.len());
        for (artifact, destination) in items {
            let retriever = self.clone();
            let cancel = cancel.clone();
            let handle = tokio::spawn({
                let artifact = artifact.clone();
                let destination = destination.clone();
                async move { retriever.retrieve(&artifact, &destination, &cancel).await }
            });
            handles.push((artifact, destination, handle));
        }

        let mut reports = Vec::with_capacity(handles.len());
        for (artifact, destination, handle) in handles {
            let result = match handle.await {
                Ok(result) => result,
                Err(err) => Err(RetrievalError::Aborted(err.to_string())),
            };
            reports.push(ArtifactReport {
                artifact,
                destination,
                result,
            });
        }
        reports
    }
}
