//! Push-channel events.
//!
//! Every frame on the socket is a JSON object `{"event": <name>, "data": <payload>}`.

use serde::{Deserialize, Serialize};
use std::{fmt, str::FromStr};

use super::{
    conversation::ConversationSummary, message::Message, presence::PresenceMap, user::UserId,
};

/// Payload of `sendPrivateMessage`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PrivateMessagePayload {
    /// Author.
    pub sender: UserId,
    /// Recipient.
    pub receiver: UserId,
    /// Message text as typed.
    pub content: String,
}

/// Payload of `sendCollegeMessage`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CollegeMessagePayload {
    /// Author.
    pub sender: UserId,
    /// Target room.
    pub college: String,
    /// Message text as typed.
    pub content: String,
}

/// Payload of `deleteConversation`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeleteConversationPayload {
    /// User deleting the conversation.
    #[serde(rename = "userId")]
    pub user_id: UserId,
    /// The other party, who is notified.
    #[serde(rename = "otherUserId")]
    pub other_user_id: UserId,
}

/// Notification that the conversation with `user_id` was deleted on the other side.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConversationDeletedPayload {
    /// The user who deleted it.
    #[serde(rename = "userId")]
    pub user_id: UserId,
}

/// Events the client emits.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "event", content = "data")]
pub enum ClientEvent {
    /// Private message to one user.
    #[serde(rename = "sendPrivateMessage")]
    SendPrivateMessage(PrivateMessagePayload),
    /// Broadcast to a college room.
    #[serde(rename = "sendCollegeMessage")]
    SendCollegeMessage(CollegeMessagePayload),
    /// Subscribes the connection to a college room.
    #[serde(rename = "joinCollege")]
    JoinCollege(String),
    /// Announces the identity once connected.
    #[serde(rename = "userOnline")]
    UserOnline(UserId),
    /// Announces departure before closing.
    #[serde(rename = "userOffline")]
    UserOffline(UserId),
    /// Asks the server to notify the other party of a deletion.
    #[serde(rename = "deleteConversation")]
    DeleteConversation(DeleteConversationPayload),
}

impl ClientEvent {
    /// Wire name of the event.
    #[must_use]
    pub const fn name(&self) -> &'static str {
        match self {
            Self::SendPrivateMessage(_) => "sendPrivateMessage",
            Self::SendCollegeMessage(_) => "sendCollegeMessage",
            Self::JoinCollege(_) => "joinCollege",
            Self::UserOnline(_) => "userOnline",
            Self::UserOffline(_) => "userOffline",
            Self::DeleteConversation(_) => "deleteConversation",
        }
    }

    /// Encodes the event as a socket frame.
    ///
    /// # Errors
    /// Returns an error if the payload cannot be serialized.
    pub fn encode(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }
}

/// Events the server pushes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "event", content = "data")]
pub enum ServerEvent {
    /// A persisted private message, sent to both parties.
    #[serde(rename = "receivePrivateMessage")]
    ReceivePrivateMessage(Message),
    /// A persisted room message, broadcast to the room.
    #[serde(rename = "receiveCollegeMessage")]
    ReceiveCollegeMessage(Message),
    /// A conversation someone else started.
    #[serde(rename = "newConversation")]
    NewConversation(ConversationSummary),
    /// The other party deleted the conversation.
    #[serde(rename = "conversationDeleted")]
    ConversationDeleted(ConversationDeletedPayload),
    /// Full presence snapshot.
    #[serde(rename = "updateUserStatus")]
    UpdateUserStatus(PresenceMap),
}

impl ServerEvent {
    /// Kind of the event, used to route it to subscribers.
    #[must_use]
    pub const fn kind(&self) -> EventKind {
        match self {
            Self::ReceivePrivateMessage(_) => EventKind::ReceivePrivateMessage,
            Self::ReceiveCollegeMessage(_) => EventKind::ReceiveCollegeMessage,
            Self::NewConversation(_) => EventKind::NewConversation,
            Self::ConversationDeleted(_) => EventKind::ConversationDeleted,
            Self::UpdateUserStatus(_) => EventKind::UpdateUserStatus,
        }
    }

    /// Decodes a socket frame.
    ///
    /// # Errors
    /// Returns an error for malformed JSON, unknown event names, or payloads
    /// that do not match the event's shape.
    pub fn decode(frame: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(frame)
    }
}

/// Names of inbound events a listener can subscribe to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EventKind {
    /// `receivePrivateMessage`
    ReceivePrivateMessage,
    /// `receiveCollegeMessage`
    ReceiveCollegeMessage,
    /// `newConversation`
    NewConversation,
    /// `conversationDeleted`
    ConversationDeleted,
    /// `updateUserStatus`
    UpdateUserStatus,
}

impl EventKind {
    /// Every inbound kind.
    pub const ALL: [Self; 5] = [
        Self::ReceivePrivateMessage,
        Self::ReceiveCollegeMessage,
        Self::NewConversation,
        Self::ConversationDeleted,
        Self::UpdateUserStatus,
    ];

    /// Wire name of the event.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::ReceivePrivateMessage => "receivePrivateMessage",
            Self::ReceiveCollegeMessage => "receiveCollegeMessage",
            Self::NewConversation => "newConversation",
            Self::ConversationDeleted => "conversationDeleted",
            Self::UpdateUserStatus => "updateUserStatus",
        }
    }
}

impl fmt::Display for EventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for EventKind {
    type Err = &'static str;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|kind| kind.as_str() == value)
            .ok_or("unknown event name")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn client_event_frame_shape() {
        let event = ClientEvent::SendPrivateMessage(PrivateMessagePayload {
            sender: "me".into(),
            receiver: "you".into(),
            content: "hello".into(),
        });
        let value: serde_json::Value = serde_json::from_str(&event.encode().unwrap()).unwrap();

        assert_eq!(value["event"], "sendPrivateMessage");
        assert_eq!(value["data"]["receiver"], "you");
        assert_eq!(value["event"], event.name());
    }

    #[test]
    fn scalar_payload_frames() {
        let frame = ClientEvent::JoinCollege("mit".into()).encode().unwrap();
        assert_eq!(frame, r#"{"event":"joinCollege","data":"mit"}"#);

        let frame = ClientEvent::UserOffline("u1".into()).encode().unwrap();
        assert_eq!(frame, r#"{"event":"userOffline","data":"u1"}"#);
    }

    #[test]
    fn decodes_server_events() {
        let deleted = ServerEvent::decode(r#"{"event":"conversationDeleted","data":{"userId":"u7"}}"#)
            .unwrap();
        assert_eq!(deleted.kind(), EventKind::ConversationDeleted);

        let status =
            ServerEvent::decode(r#"{"event":"updateUserStatus","data":{"u1":true}}"#).unwrap();
        match status {
            ServerEvent::UpdateUserStatus(map) => assert!(map.is_online(&"u1".into())),
            other => panic!("unexpected event {other:?}"),
        }
    }

    #[test]
    fn rejects_unknown_event_names() {
        assert!(ServerEvent::decode(r#"{"event":"typing","data":{}}"#).is_err());
        assert!(ServerEvent::decode("not json").is_err());
    }

    #[test]
    fn event_kind_round_trips_through_names() {
        for kind in EventKind::ALL {
            assert_eq!(kind.as_str().parse::<EventKind>(), Ok(kind));
        }
        assert!("bogus".parse::<EventKind>().is_err());
    }
}
