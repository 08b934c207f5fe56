//! Conversation summaries shown in the sidebar.

use serde::{Deserialize, Serialize};

use super::{
    timestamp::Timestamp,
    user::{User, UserId},
};

/// Sidebar digest of a private conversation, keyed by peer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConversationSummary {
    /// The other participant.
    pub user: User,

    /// Preview of the last message, if any.
    #[serde(rename = "lastMessage", default)]
    pub last_message: Option<String>,

    /// Time of the last message, if any.
    #[serde(rename = "lastMessageAt", default)]
    pub last_message_at: Option<Timestamp>,
}

impl ConversationSummary {
    /// Summary-shaped stub for a user surfaced by search (no preview).
    #[must_use]
    pub fn stub(user: User) -> Self {
        Self {
            user,
            last_message: None,
            last_message_at: None,
        }
    }

    /// Identifier of the peer this summary is keyed by.
    #[must_use]
    pub fn peer_id(&self) -> &UserId {
        &self.user.id
    }
}
