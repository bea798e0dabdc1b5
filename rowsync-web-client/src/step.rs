//! Protocol steps and their numeric codes.
//!
//! A session walks `EnsureScopes → EnsureSchema → GetOperation →
//! GetRemoteClientTimestamp → SendChangesInProgress* → GetMoreChanges* →
//! EndSession`. The client does not enforce that order; the caller issuing
//! envelopes owns it.

use rowsync_types::wire_enum;

wire_enum! {
    /// A single phase of the sync protocol, sent as `dotmim-sync-step`.
    pub enum HttpStep {
        None = 0,
        EnsureSchema = 1,
        EnsureScopes = 2,
        SendChanges = 3,
        SendChangesInProgress = 4,
        GetChanges = 5,
        GetEstimatedChangesCount = 6,
        GetMoreChanges = 7,
        GetChangesInProgress = 8,
        GetSnapshot = 9,
        GetSummary = 10,
        SendEndDownloadChanges = 11,
        GetRemoteClientTimestamp = 12,
        GetOperation = 13,
        EndSession = 14,
    }
}

impl HttpStep {
    /// Returns true for steps that move change batches.
    #[must_use]
    pub fn is_batch_transfer(self) -> bool {
        matches!(
            self,
            HttpStep::SendChanges
                | HttpStep::SendChangesInProgress
                | HttpStep::GetChanges
                | HttpStep::GetMoreChanges
                | HttpStep::GetChangesInProgress
                | HttpStep::GetSnapshot
        )
    }
}

impl Default for HttpStep {
    fn default() -> Self {
        Self::None
    }
}
