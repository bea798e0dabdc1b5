//! Parallel download of server change batches to disk.
//!
//! Each batch is fetched with its own `GetMoreChanges` request and the raw
//! response body is streamed to `<dir>/<index>.batch` without decoding. Files
//! are read back later with [`load_batch`].

use crate::client::WebSyncClient;
use crate::error::{SyncError, SyncResult};
use crate::protocol::{ContextOnly, GetMoreChangesRequest, SendChangesResponse};
use crate::serializer::{self, Serializer};
use crate::step::HttpStep;
use futures::{StreamExt, stream};
use reqwest::Response;
use rowsync_types::SessionContext;
use std::path::{Path, PathBuf};
use tokio::fs::{self, File, OpenOptions};
use tokio::io::AsyncWriteExt;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// File name a batch is stored under.
pub fn batch_file_name(index: u32) -> String {
    format!("{index}.batch")
}

/// A batch written to disk.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DownloadedBatch {
    pub index: u32,
    pub path: PathBuf,
    pub size: u64,
}

/// Downloads batches for one session into a directory.
#[derive(Debug)]
pub struct BatchDownloader<'a> {
    client: &'a WebSyncClient,
    dir: PathBuf,
}

impl<'a> BatchDownloader<'a> {
    pub fn new(client: &'a WebSyncClient, dir: impl Into<PathBuf>) -> Self {
        Self {
            client,
            dir: dir.into(),
        }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn batch_path(&self, index: u32) -> PathBuf {
        self.dir.join(batch_file_name(index))
    }

    /// Downloads `indices` concurrently, bounded by the client's download
    /// parallelism. Results are ordered by batch index.
    ///
    /// The first failure aborts the remaining downloads and removes every
    /// file this call created, finished or not, so the same download can be
    /// retried. Existing batch files are never overwritten.
    pub async fn download(
        &self,
        context: &SessionContext,
        indices: impl IntoIterator<Item = u32>,
        batch_size: usize,
        cancel: &CancellationToken,
    ) -> SyncResult<Vec<DownloadedBatch>> {
        let indices: Vec<u32> = indices.into_iter().collect();
        if indices.is_empty() {
            return Ok(Vec::new());
        }

        fs::create_dir_all(&self.dir).await?;
        let limit = self.client.download_parallelism().limit(indices.len());
        info!(
            count = indices.len(),
            limit,
            dir = %self.dir.display(),
            "downloading batches"
        );

        // Siblings of a failed batch are cancelled, not dropped, so each one
        // gets to remove its own partial file.
        let abort = cancel.child_token();
        let mut pending = stream::iter(indices)
            .map(|index| self.download_one(context, index, batch_size, &abort))
            .buffer_unordered(limit);

        let mut batches = Vec::new();
        let mut failure = None;
        while let Some(result) = pending.next().await {
            match result {
                Ok(batch) => batches.push(batch),
                Err(e) if failure.is_none() => {
                    abort.cancel();
                    failure = Some(e);
                }
                Err(_) => {}
            }
        }

        if let Some(e) = failure {
            warn!(removed = batches.len(), "batch download failed: {e}");
            for batch in &batches {
                let _ = fs::remove_file(&batch.path).await;
            }
            return Err(e);
        }

        batches.sort_by_key(|b| b.index);
        Ok(batches)
    }

    async fn download_one(
        &self,
        context: &SessionContext,
        index: u32,
        batch_size: usize,
        cancel: &CancellationToken,
    ) -> SyncResult<DownloadedBatch> {
        let request = GetMoreChangesRequest::new(context.clone(), index);
        let response = self
            .client
            .process_request_raw(HttpStep::GetMoreChanges, &request, batch_size, cancel)
            .await?;

        let path = self.batch_path(index);
        let mut file = OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(&path)
            .await?;

        let size = match write_body(response, &mut file, cancel).await {
            Ok(size) => size,
            Err(e) => {
                drop(file);
                let _ = fs::remove_file(&path).await;
                return Err(e);
            }
        };

        debug!(index, size, "batch downloaded");
        Ok(DownloadedBatch { index, path, size })
    }
}

async fn write_body(
    response: Response,
    file: &mut File,
    cancel: &CancellationToken,
) -> SyncResult<u64> {
    let mut body = std::pin::pin!(response.bytes_stream());
    let mut size = 0u64;
    loop {
        let chunk = tokio::select! {
            biased;
            _ = cancel.cancelled() => return Err(SyncError::Cancelled),
            c = body.next() => c,
        };
        let Some(chunk) = chunk else { break };
        let chunk = chunk?;
        size += chunk.len() as u64;
        file.write_all(&chunk).await?;
    }
    file.flush().await?;
    Ok(size)
}

/// Reads and decodes a batch file written by [`BatchDownloader`].
pub async fn load_batch(
    serializer: &dyn Serializer,
    path: impl AsRef<Path>,
) -> SyncResult<SendChangesResponse> {
    let bytes = fs::read(path).await?;
    serializer::decode(serializer, &bytes)
}

/// Reads only the session context of a batch file.
pub async fn peek_context(
    serializer: &dyn Serializer,
    path: impl AsRef<Path>,
) -> SyncResult<SessionContext> {
    let bytes = fs::read(path).await?;
    let only: ContextOnly = serializer::decode(serializer, &bytes)?;
    Ok(only.sync_context)
}
