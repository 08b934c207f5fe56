//! Chat messages and their sender and scope.

use serde::{Deserialize, Serialize};
use std::fmt;

use super::{
    timestamp::Timestamp,
    user::{User, UserId},
};

/// Server-assigned message identifier.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct MessageId(String);

impl MessageId {
    /// Wraps an identifier string.
    #[must_use]
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    /// Borrow the raw identifier.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for MessageId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Message sender as delivered on the wire: either a populated user or a bare id.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum SenderRef {
    /// Populated sender (`{_id, username, picture}`).
    User(User),
    /// Unpopulated sender id.
    Id(UserId),
}

impl SenderRef {
    /// Identifier of the sender regardless of representation.
    #[must_use]
    pub fn id(&self) -> &UserId {
        match self {
            Self::User(user) => &user.id,
            Self::Id(id) => id,
        }
    }

    /// Populated user, if the server sent one.
    #[must_use]
    pub fn user(&self) -> Option<&User> {
        match self {
            Self::User(user) => Some(user),
            Self::Id(_) => None,
        }
    }

    /// Sender as a [`User`], stubbing when only the id is known.
    #[must_use]
    pub fn to_user(&self) -> User {
        match self {
            Self::User(user) => user.clone(),
            Self::Id(id) => User::stub(id.clone()),
        }
    }
}

/// Delivery scope of a message.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MessageScope<'a> {
    /// Private message to a single receiver.
    Private(&'a UserId),
    /// Broadcast to a college room.
    College(&'a str),
}

/// A chat message, private or college-scoped.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Message {
    /// Server identifier; absent until the server has persisted the message.
    #[serde(rename = "_id", default, skip_serializing_if = "Option::is_none")]
    pub id: Option<MessageId>,

    /// Author of the message.
    pub sender: SenderRef,

    /// Receiver for private messages.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub receiver: Option<UserId>,

    /// College room for broadcast messages.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub college: Option<String>,

    /// Text content.
    pub content: String,

    /// Creation time (server time once confirmed, local time while pending).
    #[serde(rename = "createdAt")]
    pub created_at: Timestamp,
}

impl Message {
    /// Builds an unconfirmed private message.
    #[must_use]
    pub fn private(
        sender: SenderRef,
        receiver: UserId,
        content: impl Into<String>,
        created_at: Timestamp,
    ) -> Self {
        Self {
            id: None,
            sender,
            receiver: Some(receiver),
            college: None,
            content: content.into(),
            created_at,
        }
    }

    /// Builds an unconfirmed college message.
    #[must_use]
    pub fn college(
        sender: SenderRef,
        college: impl Into<String>,
        content: impl Into<String>,
        created_at: Timestamp,
    ) -> Self {
        Self {
            id: None,
            sender,
            receiver: None,
            college: Some(college.into()),
            content: content.into(),
            created_at,
        }
    }

    /// Attaches a server identifier.
    #[must_use]
    pub fn with_id(mut self, id: impl Into<String>) -> Self {
        self.id = Some(MessageId::new(id));
        self
    }

    /// Identifier of the sender.
    #[must_use]
    pub fn sender_id(&self) -> &UserId {
        self.sender.id()
    }

    /// Scope of the message, or `None` when the exactly-one-of
    /// `{receiver, college}` invariant is violated.
    #[must_use]
    pub fn scope(&self) -> Option<MessageScope<'_>> {
        match (&self.receiver, &self.college) {
            (Some(receiver), None) => Some(MessageScope::Private(receiver)),
            (None, Some(college)) => Some(MessageScope::College(college)),
            _ => None,
        }
    }

    /// True when `user` is the sender or the receiver.
    #[must_use]
    pub fn involves(&self, user: &UserId) -> bool {
        self.sender_id() == user || self.receiver.as_ref() == Some(user)
    }
}
