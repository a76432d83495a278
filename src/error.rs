use thiserror::Error;
use uuid::Uuid;

use crate::models::WhisperNode;

/// Errors crossing the store boundary.
///
/// Backend-level faults (I/O, SQL, HTTP transport) are folded into
/// [`StoreError::Backend`] so raw driver errors never leak to callers.
#[derive(Debug, Error)]
pub enum StoreError {
    /// The caller supplied an empty message or continuation. Locally
    /// recoverable; report back for correction.
    #[error("invalid input: {0}")]
    InvalidInput(String),

    /// No whisper with this id exists.
    #[error("whisper {0} not found")]
    NotFound(Uuid),

    /// A whisper with this id already exists. Ids are generated fresh for
    /// every create, so a collision is an integrity fault, not a retry case.
    #[error("whisper {0} already exists")]
    Conflict(Uuid),

    /// The compare-and-swap rounds for an append were exhausted by
    /// concurrent writers. Transient; the caller may retry the remix.
    #[error("append to {parent} contended after {attempts} attempts")]
    Contention { parent: Uuid, attempts: u32 },

    /// The new whisper was durably persisted but linking it into its
    /// parent's children failed. The node is real; only the link is
    /// pending. Retry with `LineageStore::link_child` rather than
    /// re-creating the node.
    #[error("whisper {} persisted but not linked to its parent: {source}", .node.id)]
    PartialFailure {
        node: Box<WhisperNode>,
        source: Box<StoreError>,
    },

    /// Translated backend fault.
    #[error("backend error: {0}")]
    Backend(#[source] anyhow::Error),
}

impl From<anyhow::Error> for StoreError {
    fn from(e: anyhow::Error) -> Self {
        Self::Backend(e)
    }
}

impl From<std::io::Error> for StoreError {
    fn from(e: std::io::Error) -> Self {
        Self::Backend(e.into())
    }
}

impl From<serde_json::Error> for StoreError {
    fn from(e: serde_json::Error) -> Self {
        Self::Backend(e.into())
    }
}

impl From<rusqlite::Error> for StoreError {
    fn from(e: rusqlite::Error) -> Self {
        Self::Backend(e.into())
    }
}

impl From<reqwest::Error> for StoreError {
    fn from(e: reqwest::Error) -> Self {
        Self::Backend(e.into())
    }
}
