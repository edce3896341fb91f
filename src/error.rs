use thiserror::Error;

use crate::mail::MessageId;

/// Failures raised by a [`MailStore`](crate::mail::MailStore).
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("connection to {host}:{port} failed: {reason}")]
    Connect { host: String, port: u16, reason: String },
    #[error("login rejected for {login}: {reason}")]
    Auth { login: String, reason: String },
    #[error("cannot select folder {folder}: {reason}")]
    Select { folder: String, reason: String },
    #[error("listing failed: {0}")]
    List(String),
    #[error("fetch failed: {0}")]
    Fetch(String),
    #[error("message {id} could not be parsed: {reason}")]
    Parse { id: MessageId, reason: String },
    #[error("moving message {id} to {folder} failed: {reason}")]
    Move { id: MessageId, folder: String, reason: String },
}

/// Failures raised by a [`Classifier`](crate::classify::Classifier).
#[derive(Debug, Error)]
pub enum ClassifyError {
    #[error("classification request failed: {0}")]
    Request(String),
    #[error("classifier returned status {status}: {body}")]
    Status { status: u16, body: String },
    #[error("classifier response could not be decoded: {0}")]
    Decode(String),
}

/// Reasons a pipeline run stops before every pending message was visited.
#[derive(Debug, Error)]
pub enum PipelineError {
    #[error(transparent)]
    Store(#[from] StoreError),
    #[error("classifying message {id} failed")]
    Classify {
        id: MessageId,
        #[source]
        source: ClassifyError,
    },
    #[error("moving message {id} to {folder} failed")]
    Move {
        id: MessageId,
        folder: String,
        #[source]
        source: StoreError,
    },
}

impl PipelineError {
    /// Identifier of the message being processed when the run stopped, if any.
    pub fn message_id(&self) -> Option<MessageId> {
        match self {
            Self::Store(_) => None,
            Self::Classify { id, .. } | Self::Move { id, .. } => Some(*id),
        }
    }
}
