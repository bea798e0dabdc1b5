//! Step-by-step driving of one sync session.
//!
//! [`SyncSession`] owns the session context and issues the protocol steps in
//! order. After every response the context is replaced wholesale with the
//! one the server returned; it is never edited locally.

use crate::client::WebSyncClient;
use crate::download::{BatchDownloader, DownloadedBatch};
use crate::error::{SyncError, SyncResult};
use crate::protocol::{
    EndSessionRequest, EndSessionResponse, EnsureSchemaResponse, EnsureScopesRequest,
    EnsureScopesResponse, GetMoreChangesRequest, OperationRequest, OperationResponse,
    RemoteTimestampRequest, RemoteTimestampResponse, ScopeMessage, SendChangesRequest,
    SendChangesResponse, SummaryResponse,
};
use crate::step::HttpStep;
use chrono::{DateTime, Utc};
use rowsync_types::{ContainerSet, ScopeInfo, ScopeInfoClient, SessionContext, SyncOperation};
use serde::Serialize;
use serde::de::DeserializeOwned;
use std::path::PathBuf;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

/// One sync session against a [`WebSyncClient`].
#[derive(Debug)]
pub struct SyncSession<'a> {
    client: &'a WebSyncClient,
    context: SessionContext,
    batch_size: usize,
    cancel: CancellationToken,
    start_time: DateTime<Utc>,
}

impl<'a> SyncSession<'a> {
    pub fn new(client: &'a WebSyncClient, context: SessionContext, batch_size: usize) -> Self {
        Self {
            client,
            context,
            batch_size,
            cancel: CancellationToken::new(),
            start_time: Utc::now(),
        }
    }

    /// Uses `cancel` for every request of this session.
    pub fn with_cancellation(mut self, cancel: CancellationToken) -> Self {
        self.cancel = cancel;
        self
    }

    /// The context last returned by the server.
    pub fn context(&self) -> &SessionContext {
        &self.context
    }

    pub fn into_context(self) -> SessionContext {
        self.context
    }

    pub fn cancellation_token(&self) -> &CancellationToken {
        &self.cancel
    }

    pub fn start_time(&self) -> DateTime<Utc> {
        self.start_time
    }

    async fn exchange<R, M>(&mut self, step: HttpStep, message: &M) -> SyncResult<R>
    where
        R: DeserializeOwned + ScopeMessage,
        M: Serialize + ScopeMessage,
    {
        let response: R = self
            .client
            .process_request(step, message, self.batch_size, &self.cancel)
            .await?;
        self.context = response.context().clone();
        debug!(%step, stage = %self.context.stage, "context replaced");
        Ok(response)
    }

    /// Fetches the server scope, creating it server-side if needed.
    pub async fn ensure_scopes(&mut self) -> SyncResult<ScopeInfo> {
        info!(scope = %self.context.scope_name, "ensuring scopes");
        let request = EnsureScopesRequest::new(self.context.clone());
        let response: EnsureScopesResponse =
            self.exchange(HttpStep::EnsureScopes, &request).await?;
        Ok(response.server_scope_info)
    }

    /// Fetches the server scope together with its schema.
    pub async fn ensure_schema(&mut self) -> SyncResult<EnsureSchemaResponse> {
        info!(scope = %self.context.scope_name, "ensuring schema");
        let request = EnsureScopesRequest::new(self.context.clone());
        self.exchange(HttpStep::EnsureSchema, &request).await
    }

    /// Asks the server which operation this client should run.
    pub async fn get_operation(
        &mut self,
        scope_info: Option<ScopeInfo>,
        scope_info_client: Option<ScopeInfoClient>,
    ) -> SyncResult<SyncOperation> {
        let request = OperationRequest {
            sync_context: self.context.clone(),
            scope_info_from_client: scope_info,
            scope_info_client,
        };
        let response: OperationResponse = self.exchange(HttpStep::GetOperation, &request).await?;
        info!(operation = %response.sync_operation, "operation negotiated");
        Ok(response.sync_operation)
    }

    /// Reads the server's current change-tracking timestamp.
    pub async fn get_remote_timestamp(&mut self) -> SyncResult<i64> {
        let request = RemoteTimestampRequest::new(self.context.clone());
        let response: RemoteTimestampResponse = self
            .exchange(HttpStep::GetRemoteClientTimestamp, &request)
            .await?;
        Ok(response.remote_client_timestamp)
    }

    /// Uploads `batches` in order, one request per batch, and returns the
    /// server's reply to the last one. That reply carries the first download
    /// batch.
    ///
    /// With no batches a single empty final batch is sent.
    pub async fn send_changes(
        &mut self,
        scope_info_client: Option<ScopeInfoClient>,
        batches: Vec<ContainerSet>,
        client_last_sync_timestamp: Option<i64>,
    ) -> SyncResult<SendChangesResponse> {
        let batches = if batches.is_empty() {
            vec![ContainerSet::new()]
        } else {
            batches
        };
        let count = u32::try_from(batches.len())
            .map_err(|_| SyncError::Configuration("too many upload batches".into()))?;
        info!(count, "sending changes");

        let mut last = None;
        for (index, changes) in (0..count).zip(batches) {
            let request = SendChangesRequest {
                batch_index: index,
                batch_count: count,
                is_last_batch: index + 1 == count,
                changes,
                client_last_sync_timestamp,
                ..SendChangesRequest::new(self.context.clone(), scope_info_client.clone())
            };
            let response: SendChangesResponse = self
                .exchange(HttpStep::SendChangesInProgress, &request)
                .await?;
            last = Some(response);
        }
        last.ok_or_else(|| SyncError::Transport("no upload batch was sent".into()))
    }

    /// Fetches one download batch.
    pub async fn get_more_changes(&mut self, index: u32) -> SyncResult<SendChangesResponse> {
        let request = GetMoreChangesRequest::new(self.context.clone(), index);
        self.exchange(HttpStep::GetMoreChanges, &request).await
    }

    /// Fetches the batches following `first` one at a time until the server
    /// marks one as last. A batch index that does not advance is a transport
    /// error.
    pub async fn download_changes(
        &mut self,
        first: &SendChangesResponse,
    ) -> SyncResult<Vec<SendChangesResponse>> {
        let mut batches = Vec::new();
        let mut current = first.batch_index;
        let mut is_last = first.is_last_batch;
        while !is_last {
            let next = next_batch_index(current)?;
            let batch = self.get_more_changes(next).await?;
            debug!(index = batch.batch_index, last = batch.is_last_batch, "batch received");
            if batch.batch_index < next {
                return Err(SyncError::Transport(format!(
                    "requested batch {next} but server returned batch {}",
                    batch.batch_index
                )));
            }
            current = batch.batch_index;
            is_last = batch.is_last_batch;
            batches.push(batch);
        }
        Ok(batches)
    }

    /// Downloads the batches following `first` concurrently into `dir`.
    ///
    /// Needs the batch count reported in `first`. The session context is
    /// left as is, since batch bodies are not decoded.
    pub async fn download_changes_to(
        &self,
        first: &SendChangesResponse,
        dir: impl Into<PathBuf>,
    ) -> SyncResult<Vec<DownloadedBatch>> {
        if first.is_last_batch {
            return Ok(Vec::new());
        }
        let start = next_batch_index(first.batch_index)?;
        if first.batch_count <= start {
            return Err(SyncError::Transport(format!(
                "batch {} is not last but server reported {} batches",
                first.batch_index, first.batch_count
            )));
        }
        BatchDownloader::new(self.client, dir)
            .download(&self.context, start..first.batch_count, self.batch_size, &self.cancel)
            .await
    }

    /// Tells the server the client is done downloading.
    pub async fn end_download(&mut self, last_index: u32) -> SyncResult<SendChangesResponse> {
        let request = GetMoreChangesRequest::new(self.context.clone(), last_index);
        self.exchange(HttpStep::SendEndDownloadChanges, &request)
            .await
    }

    /// Fetches a summary of what the server prepared for this session.
    pub async fn get_summary(&mut self) -> SyncResult<SummaryResponse> {
        let request = EnsureScopesRequest::new(self.context.clone());
        self.exchange(HttpStep::GetSummary, &request).await
    }

    /// An end-of-session report for the current context, to be filled in
    /// with counters before [`end_session`](Self::end_session).
    pub fn end_session_request(&self) -> EndSessionRequest {
        EndSessionRequest::new(self.context.clone(), self.start_time)
    }

    /// Closes the session on the server.
    pub async fn end_session(&mut self, report: EndSessionRequest) -> SyncResult<EndSessionResponse> {
        info!(session = %self.context.session_id, "ending session");
        self.exchange(HttpStep::EndSession, &report).await
    }
}

fn next_batch_index(index: u32) -> SyncResult<u32> {
    index
        .checked_add(1)
        .ok_or_else(|| SyncError::Transport(format!("batch index {index} has no successor")))
}
