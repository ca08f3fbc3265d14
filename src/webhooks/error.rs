//! Per-request webhook errors.

use thiserror::Error;

use super::decoder::DecodeError;
use crate::config::StoreError;

/// Error answering a single admission request
#[derive(Error, Debug)]
pub enum WebhookError {
    /// The request or its object could not be decoded
    #[error(transparent)]
    Decode(#[from] DecodeError),

    /// Configs could not be fetched
    #[error("failed to resolve mutation configs: {0}")]
    Store(#[from] StoreError),

    /// The patch could not be encoded into the response
    #[error("failed to serialize patch: {0}")]
    PatchSerialization(String),
}

impl WebhookError {
    /// Whether this error must be reported as a transport failure rather than as an
    /// admission response. No envelope can be safely built once encoding has failed.
    pub fn is_transport(&self) -> bool {
        matches!(self, WebhookError::PatchSerialization(_))
    }
}
