//! # Room membership
//!
//! A college room is a broadcast channel: joining emits `joinCollege`,
//! history comes from REST, and live messages are appended in arrival order.
//! Room sends are not inserted locally; the broadcast echo is the only copy.

use std::mem;

use shared::models::{ClientEvent, CollegeMessagePayload, Message, MessageScope, UserId};
use tracing::{debug, info, warn};

use crate::{
    error::{ChatError, ChatResult},
    reconciler::{LoadOutcome, ReceiveOutcome},
};

/// Identifies one room history fetch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RoomTicket {
    /// Room whose history to fetch.
    pub college: String,
    generation: u64,
}

/// Membership of a college broadcast room.
///
/// Room messages are appended in arrival order and never merged; the sender
/// receives its own message through the broadcast like everyone else.
#[derive(Debug, Default)]
pub struct RoomMembership {
    college: Option<String>,
    generation: u64,
    loading: bool,
    log: Vec<Message>,
    load_error: Option<String>,
}

impl RoomMembership {
    /// Membership with no room joined.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Joins `college`, replacing any previous room. Returns the join event to
    /// emit and the ticket for the history fetch.
    pub fn join(&mut self, college: impl Into<String>) -> (ClientEvent, RoomTicket) {
        let college = college.into();
        info!(college = %college, "joining college room");
        self.generation += 1;
        self.loading = true;
        self.log.clear();
        self.load_error = None;
        self.college = Some(college.clone());

        let ticket = RoomTicket {
            college: college.clone(),
            generation: self.generation,
        };
        (ClientEvent::JoinCollege(college), ticket)
    }

    /// Leaves the room. Returns the college that was left.
    pub fn leave(&mut self) -> Option<String> {
        self.generation += 1;
        self.loading = false;
        self.log.clear();
        self.load_error = None;
        let left = self.college.take();
        if let Some(college) = &left {
            info!(college = %college, "left college room");
        }
        left
    }

    /// Applies a history fetch. Messages received live while loading follow
    /// the history, minus any the history already contains.
    pub fn complete_load(
        &mut self,
        ticket: &RoomTicket,
        result: ChatResult<Vec<Message>>,
    ) -> LoadOutcome {
        if !self.loading || ticket.generation != self.generation {
            debug!(college = %ticket.college, "ignoring stale room history fetch");
            return LoadOutcome::Stale;
        }
        self.loading = false;

        let live = mem::take(&mut self.log);
        self.log = match result {
            Ok(history) => history,
            Err(err) => {
                warn!(college = %ticket.college, error = %err, "room history load failed");
                self.load_error = Some(err.to_string());
                Vec::new()
            }
        };
        for message in live {
            let seen = message
                .id
                .as_ref()
                .is_some_and(|id| self.log.iter().any(|m| m.id.as_ref() == Some(id)));
            if !seen {
                self.log.push(message);
            }
        }
        LoadOutcome::Applied
    }

    /// Appends a broadcast for the joined room; anything else is ignored.
    pub fn on_receive(&mut self, message: Message) -> ReceiveOutcome {
        match (message.scope(), &self.college) {
            (Some(MessageScope::College(target)), Some(joined)) if target == joined => {
                self.log.push(message);
                ReceiveOutcome::Appended
            }
            _ => {
                debug!("ignoring message for another room");
                ReceiveOutcome::Ignored
            }
        }
    }

    /// Builds the `sendCollegeMessage` event for `text`.
    ///
    /// # Errors
    /// [`ChatError::NotInRoom`] when no room is joined, [`ChatError::EmptyMessage`]
    /// for blank text.
    pub fn compose(&self, me: &UserId, text: &str) -> ChatResult<ClientEvent> {
        let college = self.college.as_ref().ok_or(ChatError::NotInRoom)?;
        if text.trim().is_empty() {
            return Err(ChatError::EmptyMessage);
        }
        Ok(ClientEvent::SendCollegeMessage(CollegeMessagePayload {
            sender: me.clone(),
            college: college.clone(),
            content: text.to_string(),
        }))
    }

    /// Joined room.
    #[must_use]
    pub fn college(&self) -> Option<&str> {
        self.college.as_deref()
    }

    /// True while the history fetch is in flight.
    #[must_use]
    pub fn is_loading(&self) -> bool {
        self.loading
    }

    /// Room log in arrival order.
    #[must_use]
    pub fn messages(&self) -> &[Message] {
        &self.log
    }

    /// Error from the last failed history load.
    #[must_use]
    pub fn load_error(&self) -> Option<&str> {
        self.load_error.as_deref()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};
    use shared::models::{SenderRef, Timestamp};

    fn broadcast(college: &str, content: &str, id: &str) -> Message {
        let at = Timestamp(Utc.with_ymd_and_hms(2024, 5, 1, 12, 0, 0).unwrap());
        Message::college(SenderRef::Id("u1".into()), college, content, at).with_id(id)
    }

    fn joined(college: &str) -> RoomMembership {
        let mut room = RoomMembership::new();
        let (_, ticket) = room.join(college);
        room.complete_load(&ticket, Ok(Vec::new()));
        room
    }

    #[test]
    fn join_emits_join_event() {
        let mut room = RoomMembership::new();
        let (event, ticket) = room.join("mit");
        assert_eq!(event, ClientEvent::JoinCollege("mit".into()));
        assert_eq!(ticket.college, "mit");
        assert!(room.is_loading());
    }

    #[test]
    fn appends_in_order_without_merging() {
        let mut room = joined("mit");
        for i in 0..5 {
            assert_eq!(
                room.on_receive(broadcast("mit", "same", &format!("m{i}"))),
                ReceiveOutcome::Appended
            );
        }
        let ids: Vec<_> = room
            .messages()
            .iter()
            .filter_map(|m| m.id.as_ref().map(|id| id.as_str().to_string()))
            .collect();
        assert_eq!(ids, vec!["m0", "m1", "m2", "m3", "m4"]);
    }

    #[test]
    fn filters_other_colleges() {
        let mut room = joined("mit");
        assert_eq!(room.on_receive(broadcast("cmu", "hi", "m1")), ReceiveOutcome::Ignored);
        assert!(room.messages().is_empty());
    }

    #[test]
    fn live_messages_follow_history_without_duplicates() {
        let mut room = RoomMembership::new();
        let (_, ticket) = room.join("mit");
        room.on_receive(broadcast("mit", "live", "m2"));
        room.on_receive(broadcast("mit", "newer", "m3"));

        room.complete_load(
            &ticket,
            Ok(vec![broadcast("mit", "old", "m1"), broadcast("mit", "live", "m2")]),
        );

        let contents: Vec<&str> = room.messages().iter().map(|m| m.content.as_str()).collect();
        assert_eq!(contents, vec!["old", "live", "newer"]);
    }

    #[test]
    fn stale_history_after_rejoin_is_ignored() {
        let mut room = RoomMembership::new();
        let (_, first) = room.join("mit");
        let (_, second) = room.join("cmu");

        assert_eq!(room.complete_load(&first, Ok(vec![broadcast("mit", "x", "m1")])), LoadOutcome::Stale);
        assert_eq!(room.complete_load(&second, Ok(Vec::new())), LoadOutcome::Applied);
        assert!(room.messages().is_empty());
    }

    #[test]
    fn failed_history_keeps_live_messages() {
        let mut room = RoomMembership::new();
        let (_, ticket) = room.join("mit");
        room.on_receive(broadcast("mit", "live", "m1"));

        room.complete_load(&ticket, Err(ChatError::NotConnected));
        assert_eq!(room.messages().len(), 1);
        assert!(room.load_error().is_some());
    }

    #[test]
    fn compose_validates() {
        let mut room = RoomMembership::new();
        assert!(matches!(room.compose(&"me".into(), "hi"), Err(ChatError::NotInRoom)));

        room.join("mit");
        assert!(matches!(room.compose(&"me".into(), " "), Err(ChatError::EmptyMessage)));
        assert_eq!(
            room.compose(&"me".into(), "hi").unwrap(),
            ClientEvent::SendCollegeMessage(CollegeMessagePayload {
                sender: "me".into(),
                college: "mit".into(),
                content: "hi".into(),
            })
        );
    }

    #[test]
    fn leave_clears_room() {
        let mut room = joined("mit");
        room.on_receive(broadcast("mit", "hi", "m1"));
        assert_eq!(room.leave().as_deref(), Some("mit"));
        assert!(room.messages().is_empty());
        assert_eq!(room.on_receive(broadcast("mit", "hi", "m2")), ReceiveOutcome::Ignored);
    }
}
