//! # Conversation index
//!
//! Ordered conversation summaries, most recently touched first, with at most
//! one summary per peer. Seeded from the REST list and kept live by message
//! and conversation events.
//!
//! User search results are held separately and never merged into the index;
//! a searched user only enters the index once a message is exchanged.

use std::fmt;

use shared::models::{ConversationSummary, Message, MessageScope, Timestamp, User, UserId};
use tracing::{debug, warn};

/// Results of the active user search.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SearchResults {
    /// Trimmed query the results belong to.
    pub query: String,
    /// Matching users wrapped as summaries with no preview.
    pub candidates: Vec<ConversationSummary>,
}

/// Ordered, peer-unique list of conversation summaries.
#[derive(Debug, Default)]
pub struct ConversationIndex {
    entries: Vec<ConversationSummary>,
    search: Option<SearchResults>,
    load_error: Option<String>,
}

impl ConversationIndex {
    /// Empty index.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Replaces the index with a freshly loaded list. Later duplicates of a
    /// peer are dropped so the first (most recent) one wins.
    pub fn replace_all(&mut self, summaries: Vec<ConversationSummary>) {
        let mut entries: Vec<ConversationSummary> = Vec::with_capacity(summaries.len());
        for summary in summaries {
            if entries.iter().any(|e| e.peer_id() == summary.peer_id()) {
                debug!(peer = %summary.peer_id(), "dropping duplicate summary from list");
                continue;
            }
            entries.push(summary);
        }
        self.entries = entries;
        self.load_error = None;
    }

    /// Degrades to an empty list after a failed load.
    pub fn load_failed(&mut self, error: impl fmt::Display) {
        warn!(error = %error, "conversation list load failed");
        self.entries.clear();
        self.load_error = Some(error.to_string());
    }

    /// Error from the last failed load, cleared by the next successful one.
    #[must_use]
    pub fn load_error(&self) -> Option<&str> {
        self.load_error.as_deref()
    }

    /// Creates or overwrites the peer's summary and moves it to the front.
    pub fn upsert(&mut self, peer: User, preview: impl Into<String>, at: Timestamp) {
        self.touch(ConversationSummary {
            user: peer,
            last_message: Some(preview.into()),
            last_message_at: Some(at),
        });
    }

    /// Inserts a server-provided summary (`newConversation`), moving it to the front.
    pub fn insert_summary(&mut self, summary: ConversationSummary) {
        self.touch(summary);
    }

    fn touch(&mut self, mut summary: ConversationSummary) {
        if let Some(pos) = self.position(summary.peer_id()) {
            let previous = self.entries.remove(pos);
            if summary.user.is_stub() {
                summary.user = previous.user;
            }
            if summary.last_message.is_none() {
                summary.last_message = previous.last_message;
                summary.last_message_at = previous.last_message_at;
            }
        }
        self.entries.insert(0, summary);
    }

    /// Updates the index from a private message. The peer is the receiver
    /// when `me` sent it, otherwise the sender.
    ///
    /// Returns `false` for messages that are not private.
    pub fn record_message(&mut self, me: &UserId, message: &Message) -> bool {
        let Some(MessageScope::Private(receiver)) = message.scope() else {
            return false;
        };
        let peer = if message.sender_id() == me {
            User::stub(receiver.clone())
        } else {
            message.sender.to_user()
        };
        self.upsert(peer, message.content.clone(), message.created_at);
        true
    }

    /// Removes the peer's summary.
    pub fn remove(&mut self, peer: &UserId) -> Option<ConversationSummary> {
        self.position(peer).map(|pos| self.entries.remove(pos))
    }

    /// Summary for `peer`, if indexed.
    #[must_use]
    pub fn get(&self, peer: &UserId) -> Option<&ConversationSummary> {
        self.entries.iter().find(|e| e.peer_id() == peer)
    }

    /// Summaries, most recent first.
    #[must_use]
    pub fn entries(&self) -> &[ConversationSummary] {
        &self.entries
    }

    /// Iterates summaries, most recent first.
    pub fn iter(&self) -> impl Iterator<Item = &ConversationSummary> {
        self.entries.iter()
    }

    /// Number of conversations.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// True when there are no conversations.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Returns the trimmed query when it is long enough to search for.
    #[must_use]
    pub fn search_query(query: &str, min_chars: usize) -> Option<&str> {
        let trimmed = query.trim();
        (trimmed.chars().count() >= min_chars.max(1)).then_some(trimmed)
    }

    /// Shows `users` as search results for `query`.
    pub fn set_search_results(&mut self, query: impl Into<String>, users: Vec<User>) {
        self.search = Some(SearchResults {
            query: query.into(),
            candidates: users.into_iter().map(ConversationSummary::stub).collect(),
        });
    }

    /// Leaves the search view.
    pub fn clear_search(&mut self) {
        self.search = None;
    }

    /// Active search, if any.
    #[must_use]
    pub fn search(&self) -> Option<&SearchResults> {
        self.search.as_ref()
    }

    /// What the sidebar shows: search results while a search is active,
    /// otherwise the index.
    #[must_use]
    pub fn visible(&self) -> &[ConversationSummary] {
        match &self.search {
            Some(results) => &results.candidates,
            None => &self.entries,
        }
    }

    fn position(&self, peer: &UserId) -> Option<usize> {
        self.entries.iter().position(|e| e.peer_id() == peer)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};
    use shared::models::SenderRef;

    fn at(secs: u32) -> Timestamp {
        Timestamp(Utc.with_ymd_and_hms(2024, 5, 1, 12, 0, secs).unwrap())
    }

    fn peers(index: &ConversationIndex) -> Vec<&str> {
        index.iter().map(|s| s.peer_id().as_str()).collect()
    }

    #[test]
    fn upsert_keeps_one_entry_per_peer_most_recent_first() {
        let mut index = ConversationIndex::new();
        let touches = ["a", "b", "c", "a", "b", "a", "d"];
        for (i, peer) in touches.iter().enumerate() {
            index.upsert(User::new(*peer, *peer), format!("m{i}"), at(i as u32));
        }

        assert_eq!(index.len(), 4);
        assert_eq!(peers(&index), vec!["d", "a", "b", "c"]);
        assert_eq!(index.get(&"a".into()).unwrap().last_message.as_deref(), Some("m5"));
    }

    #[test]
    fn untouched_entries_keep_relative_order() {
        let mut index = ConversationIndex::new();
        index.replace_all(vec![
            ConversationSummary::stub(User::new("a", "a")),
            ConversationSummary::stub(User::new("b", "b")),
            ConversationSummary::stub(User::new("c", "c")),
        ]);

        index.upsert(User::new("c", "c"), "hi", at(1));
        assert_eq!(peers(&index), vec!["c", "a", "b"]);
    }

    #[test]
    fn replace_all_drops_duplicate_peers() {
        let mut index = ConversationIndex::new();
        index.replace_all(vec![
            ConversationSummary::stub(User::new("a", "first")),
            ConversationSummary::stub(User::new("a", "second")),
        ]);
        assert_eq!(index.len(), 1);
        assert_eq!(index.entries()[0].user.username, "first");
    }

    #[test]
    fn stub_upsert_keeps_known_user_details() {
        let mut index = ConversationIndex::new();
        index.upsert(User::new("a", "ada"), "hi", at(0));
        index.upsert(User::stub("a".into()), "again", at(1));

        let entry = index.get(&"a".into()).unwrap();
        assert_eq!(entry.user.username, "ada");
        assert_eq!(entry.last_message.as_deref(), Some("again"));
    }

    #[test]
    fn record_message_uses_the_other_party() {
        let me = UserId::from("me");
        let mut index = ConversationIndex::new();

        let outbound = Message::private(SenderRef::Id(me.clone()), "bob".into(), "yo", at(0));
        let inbound = Message::private(
            SenderRef::User(User::new("carol", "carol")),
            me.clone(),
            "hey",
            at(1),
        );
        assert!(index.record_message(&me, &outbound));
        assert!(index.record_message(&me, &inbound));

        assert_eq!(peers(&index), vec!["carol", "bob"]);
    }

    #[test]
    fn record_message_ignores_room_messages() {
        let mut index = ConversationIndex::new();
        let room = Message::college(SenderRef::Id("u1".into()), "mit", "hello", at(0));
        assert!(!index.record_message(&"me".into(), &room));
        assert!(index.is_empty());
    }

    #[test]
    fn new_conversation_without_preview_keeps_existing_preview() {
        let mut index = ConversationIndex::new();
        index.upsert(User::new("a", "ada"), "hi", at(0));
        index.insert_summary(ConversationSummary::stub(User::new("a", "ada")));

        assert_eq!(index.get(&"a".into()).unwrap().last_message.as_deref(), Some("hi"));
    }

    #[test]
    fn remove_deletes_summary() {
        let mut index = ConversationIndex::new();
        index.upsert(User::new("a", "ada"), "hi", at(0));
        assert!(index.remove(&"a".into()).is_some());
        assert!(index.remove(&"a".into()).is_none());
        assert!(index.is_empty());
    }

    #[test]
    fn search_results_are_a_separate_view() {
        let mut index = ConversationIndex::new();
        index.upsert(User::new("a", "ada"), "hi", at(0));
        index.set_search_results("gr", vec![User::new("g", "grace")]);

        assert_eq!(index.visible().len(), 1);
        assert_eq!(index.visible()[0].peer_id().as_str(), "g");
        assert!(index.visible()[0].last_message.is_none());
        assert!(index.get(&"g".into()).is_none());

        index.clear_search();
        assert_eq!(index.visible()[0].peer_id().as_str(), "a");
    }

    #[test]
    fn search_query_requires_more_than_one_character() {
        assert_eq!(ConversationIndex::search_query("  a ", 2), None);
        assert_eq!(ConversationIndex::search_query(" ad ", 2), Some("ad"));
        assert_eq!(ConversationIndex::search_query("", 0), None);
    }

    #[test]
    fn load_failure_degrades_to_empty_with_error() {
        let mut index = ConversationIndex::new();
        index.upsert(User::new("a", "ada"), "hi", at(0));
        index.load_failed("connection refused");

        assert!(index.is_empty());
        assert_eq!(index.load_error(), Some("connection refused"));

        index.replace_all(Vec::new());
        assert_eq!(index.load_error(), None);
    }
}
