//! Errors surfaced by the chat core.

use reqwest::StatusCode;
use shared::models::ErrorResponse;
use thiserror::Error;
use tokio_tungstenite::tungstenite;

use crate::reconciler::CorrelationToken;

/// Result alias used throughout the chat core.
pub type ChatResult<T> = Result<T, ChatError>;

/// Errors surfaced by the chat core.
#[derive(Debug, Error)]
pub enum ChatError {
    /// No live push channel.
    #[error("push channel is not connected")]
    NotConnected,

    /// The WebSocket handshake failed.
    #[error("failed to connect push channel: {0}")]
    Connect(String),

    /// The open channel failed.
    #[error("push channel error: {0}")]
    Socket(#[from] Box<tungstenite::Error>),

    /// A REST request could not be completed.
    #[error("request to {endpoint} failed: {source}")]
    Http {
        /// Endpoint path.
        endpoint: String,
        /// Transport error.
        #[source]
        source: reqwest::Error,
    },

    /// The backend answered with a non-success status.
    #[error("{endpoint} rejected the request ({status}): {body}")]
    Rejected {
        /// Endpoint path.
        endpoint: String,
        /// Response status.
        status: StatusCode,
        /// Decoded error body.
        body: ErrorResponse,
    },

    /// An endpoint URL could not be built.
    #[error("invalid URL: {0}")]
    Url(#[from] url::ParseError),

    /// An outbound event could not be serialized.
    #[error("failed to encode event: {0}")]
    Encode(#[from] serde_json::Error),

    /// Message text is empty or whitespace.
    #[error("message is empty")]
    EmptyMessage,

    /// A private send needs an open conversation.
    #[error("no conversation is open")]
    NoConversationOpen,

    /// No pending entry carries the token.
    #[error("no pending message with token {0}")]
    UnknownToken(CorrelationToken),

    /// A room send needs a joined room.
    #[error("not joined to a college room")]
    NotInRoom,
}

impl ChatError {
    pub(crate) fn http(endpoint: impl Into<String>, source: reqwest::Error) -> Self {
        Self::Http {
            endpoint: endpoint.into(),
            source,
        }
    }

    /// True when the error means the channel was unavailable.
    #[must_use]
    pub fn is_disconnected(&self) -> bool {
        matches!(self, Self::NotConnected | Self::Connect(_) | Self::Socket(_))
    }
}
