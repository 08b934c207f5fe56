//! # Chat client
//!
//! Owns the transport handle, the REST client and the stateful components,
//! and applies everything that happens to them in one place.
//!
//! Listener callbacks and background REST fetches never touch state directly:
//! they post an [`Inbound`] item into the client's inbox, and the owner
//! drains it with [`ChatClient::next_update`] or [`ChatClient::drain`].

use std::{fmt, sync::Arc, time::Duration};

use shared::{
    config::ChatSettings,
    models::{
        ClientEvent, ConversationSummary, DeleteConversationPayload, EventKind, Message,
        ServerEvent, User, UserId,
    },
};
use tokio::sync::mpsc;
use tracing::{debug, info, warn};
use url::Url;

use crate::{
    api::ChatApi,
    conversations::ConversationIndex,
    error::{ChatError, ChatResult},
    presence::PresenceTracker,
    reconciler::{
        CorrelationToken, LoadOutcome, LoadTicket, MessageReconciler, OutgoingMessage,
        ReceiveOutcome,
    },
    room::{RoomMembership, RoomTicket},
    socket::SocketTransport,
    transport::{Listener, Subscription, Transport},
};

/// Something that happened outside the owner's control flow.
#[derive(Debug)]
pub enum Inbound {
    /// Event pushed by the server.
    Event(ServerEvent),
    /// Conversation list fetch finished.
    ConversationsLoaded(ChatResult<Vec<ConversationSummary>>),
    /// Private history fetch finished.
    HistoryLoaded {
        /// Ticket issued by the open that started the fetch.
        ticket: LoadTicket,
        /// Fetched history.
        result: ChatResult<Vec<Message>>,
    },
    /// Room history fetch finished.
    RoomHistoryLoaded {
        /// Ticket issued by the join that started the fetch.
        ticket: RoomTicket,
        /// Fetched history.
        result: ChatResult<Vec<Message>>,
    },
    /// User search finished.
    SearchCompleted {
        /// Trimmed query the request was issued for.
        query: String,
        /// Matching users.
        result: ChatResult<Vec<User>>,
    },
    /// Outcome of a send through the REST fallback.
    SendCompleted {
        /// Entry the send belongs to.
        token: CorrelationToken,
        /// Persisted message.
        result: ChatResult<Message>,
    },
}

/// What applying an [`Inbound`] changed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChatUpdate {
    /// Presence snapshot replaced.
    Presence,
    /// Conversation index changed.
    Conversations,
    /// Search results replaced.
    Search,
    /// A private message updated the index and possibly the open log.
    PrivateMessage(ReceiveOutcome),
    /// A room broadcast was applied.
    RoomMessage(ReceiveOutcome),
    /// Private history fetch applied or discarded.
    History(LoadOutcome),
    /// Room history fetch applied or discarded.
    RoomHistory(LoadOutcome),
    /// A fallback send was confirmed or marked failed.
    Delivery {
        /// Entry the send belongs to.
        token: CorrelationToken,
        /// False when the entry was marked failed.
        delivered: bool,
    },
    /// The other party deleted a conversation.
    ConversationDeleted {
        /// Peer of the deleted conversation.
        peer: UserId,
        /// Whether it was the open conversation.
        was_open: bool,
    },
    /// Superseded or irrelevant; nothing changed.
    Ignored,
}

/// Realtime chat session for one signed-in user.
pub struct ChatClient {
    me: User,
    api: Arc<dyn ChatApi>,
    settings: ChatSettings,
    transport: Option<Arc<dyn Transport>>,
    subscriptions: Vec<Subscription>,
    room_subscription: Option<Subscription>,
    inbox_tx: mpsc::UnboundedSender<Inbound>,
    inbox: mpsc::UnboundedReceiver<Inbound>,
    presence: PresenceTracker,
    conversations: ConversationIndex,
    reconciler: MessageReconciler,
    room: RoomMembership,
    pending_search: Option<String>,
}

impl fmt::Debug for ChatClient {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ChatClient")
            .field("me", &self.me.id)
            .field("connected", &self.is_connected())
            .field("conversations", &self.conversations.len())
            .field("reconciler", &self.reconciler.state())
            .field("room", &self.room.college())
            .finish_non_exhaustive()
    }
}

impl ChatClient {
    /// Creates a client with no transport attached.
    #[must_use]
    pub fn new(me: User, api: Arc<dyn ChatApi>, settings: ChatSettings) -> Self {
        let (inbox_tx, inbox) = mpsc::unbounded_channel();
        let window = Duration::from_millis(settings.match_window_ms);
        Self {
            reconciler: MessageReconciler::new(me.clone(), window),
            me,
            api,
            settings,
            transport: None,
            subscriptions: Vec::new(),
            room_subscription: None,
            inbox_tx,
            inbox,
            presence: PresenceTracker::new(),
            conversations: ConversationIndex::new(),
            room: RoomMembership::new(),
            pending_search: None,
        }
    }

    /// Opens the WebSocket push channel and attaches it.
    ///
    /// A failure leaves the client usable over REST; callers should show the
    /// not-connected state.
    ///
    /// # Errors
    /// Returns the connection error.
    pub async fn connect(&mut self, url: &Url, token: Option<&str>) -> ChatResult<()> {
        match SocketTransport::connect(url, self.me.id.clone(), token).await {
            Ok(transport) => {
                self.attach_transport(Arc::new(transport));
                Ok(())
            }
            Err(err) => {
                warn!(error = %err, "push channel unavailable; chat is offline");
                Err(err)
            }
        }
    }

    /// Attaches a transport, replacing (and disconnecting) any previous one.
    pub fn attach_transport(&mut self, transport: Arc<dyn Transport>) {
        self.detach_transport();
        self.presence.reset();

        for kind in [
            EventKind::ReceivePrivateMessage,
            EventKind::NewConversation,
            EventKind::ConversationDeleted,
            EventKind::UpdateUserStatus,
        ] {
            let listener = self.forwarder();
            self.subscriptions.push(transport.on(kind, listener));
        }
        if let Some(college) = self.room.college() {
            info!(college, "re-joining college room on new transport");
            self.room_subscription =
                Some(transport.on(EventKind::ReceiveCollegeMessage, self.forwarder()));
            if let Err(err) = transport.emit(ClientEvent::JoinCollege(college.to_string())) {
                warn!(error = %err, "failed to re-join college room");
            }
        }
        self.transport = Some(transport);
    }

    fn detach_transport(&mut self) {
        self.subscriptions.clear();
        self.room_subscription = None;
        if let Some(transport) = self.transport.take() {
            transport.disconnect();
        }
    }

    fn forwarder(&self) -> Listener {
        let tx = self.inbox_tx.clone();
        Arc::new(move |event: &ServerEvent| {
            // The receiver lives as long as the client; a closed inbox means
            // the client is gone and the event is moot.
            let _ = tx.send(Inbound::Event(event.clone()));
        })
    }

    fn live_transport(&self) -> Option<&Arc<dyn Transport>> {
        self.transport.as_ref().filter(|t| t.is_connected())
    }

    /// True while the push channel is up.
    #[must_use]
    pub fn is_connected(&self) -> bool {
        self.live_transport().is_some()
    }

    /// Signed-in user.
    #[must_use]
    pub fn me(&self) -> &User {
        &self.me
    }

    /// Reconciliation tuning in use.
    #[must_use]
    pub fn settings(&self) -> &ChatSettings {
        &self.settings
    }

    /// Who is online.
    #[must_use]
    pub fn presence(&self) -> &PresenceTracker {
        &self.presence
    }

    /// Sidebar index and search results.
    #[must_use]
    pub fn conversations(&self) -> &ConversationIndex {
        &self.conversations
    }

    /// Open private conversation.
    #[must_use]
    pub fn reconciler(&self) -> &MessageReconciler {
        &self.reconciler
    }

    /// Joined college room.
    #[must_use]
    pub fn room(&self) -> &RoomMembership {
        &self.room
    }

    /// Fetches the conversation list in the background.
    pub fn refresh_conversations(&self) {
        let api = Arc::clone(&self.api);
        let tx = self.inbox_tx.clone();
        tokio::spawn(async move {
            let result = api.conversations().await;
            let _ = tx.send(Inbound::ConversationsLoaded(result));
        });
    }

    /// Opens the conversation with `peer` and fetches its history.
    pub fn open_conversation(&mut self, peer: User) {
        let ticket = self.reconciler.open(peer);
        let api = Arc::clone(&self.api);
        let tx = self.inbox_tx.clone();
        tokio::spawn(async move {
            let result = api.private_messages(&ticket.peer).await;
            let _ = tx.send(Inbound::HistoryLoaded { ticket, result });
        });
    }

    /// Closes the open conversation.
    pub fn close_conversation(&mut self) {
        self.reconciler.close();
    }

    /// Sends `text` to the open conversation.
    ///
    /// The optimistic entry is in the log when this returns. Delivery goes
    /// over the push channel when it is up and through `POST` otherwise; a
    /// failed fallback marks the entry failed.
    ///
    /// # Errors
    /// [`ChatError::EmptyMessage`] or [`ChatError::NoConversationOpen`].
    pub fn send_message(&mut self, text: &str) -> ChatResult<CorrelationToken> {
        let outgoing = self.reconciler.send(text)?;
        self.conversations.upsert(
            outgoing.peer.clone(),
            outgoing.message.content.clone(),
            outgoing.message.created_at,
        );
        let token = outgoing.token;
        self.deliver(outgoing);
        Ok(token)
    }

    /// Re-sends a pending entry.
    ///
    /// # Errors
    /// [`ChatError::UnknownToken`] when the entry is gone.
    pub fn retry_message(&mut self, token: CorrelationToken) -> ChatResult<()> {
        let outgoing = self.reconciler.retry(token)?;
        self.deliver(outgoing);
        Ok(())
    }

    fn deliver(&self, outgoing: OutgoingMessage) {
        let token = outgoing.token;
        if let Some(transport) = self.live_transport() {
            match transport.emit(outgoing.event) {
                Ok(()) => return,
                Err(err) => debug!(error = %err, %token, "emit failed; using REST fallback"),
            }
        }

        let api = Arc::clone(&self.api);
        let tx = self.inbox_tx.clone();
        let peer = outgoing.peer.id;
        let content = outgoing.message.content;
        tokio::spawn(async move {
            let result = api.send_private_message(&peer, &content).await;
            let _ = tx.send(Inbound::SendCompleted { token, result });
        });
    }

    /// Deletes the conversation with `peer` on the server, then locally.
    ///
    /// # Errors
    /// Returns the REST error; local state is left untouched in that case.
    pub async fn delete_conversation(&mut self, peer: &UserId) -> ChatResult<()> {
        self.api.delete_conversation(peer).await?;

        self.conversations.remove(peer);
        self.reconciler.clear_if_peer(peer);
        info!(peer = %peer, "conversation deleted");

        if let Some(transport) = self.live_transport() {
            let event = ClientEvent::DeleteConversation(DeleteConversationPayload {
                user_id: self.me.id.clone(),
                other_user_id: peer.clone(),
            });
            if let Err(err) = transport.emit(event) {
                warn!(error = %err, "failed to notify peer of deletion");
            }
        }
        Ok(())
    }

    /// Starts a user search. Returns whether a request was issued.
    ///
    /// A blank query leaves the search view. A query that is too short keeps
    /// the view open with no results.
    pub fn search(&mut self, query: &str) -> bool {
        let Some(trimmed) = ConversationIndex::search_query(query, self.settings.search_min_chars)
        else {
            let trimmed = query.trim();
            if trimmed.is_empty() {
                self.clear_search();
            } else {
                self.pending_search = None;
                self.conversations.set_search_results(trimmed, Vec::new());
            }
            return false;
        };
        let query = trimmed.to_string();
        self.pending_search = Some(query.clone());

        let api = Arc::clone(&self.api);
        let tx = self.inbox_tx.clone();
        tokio::spawn(async move {
            let result = api.search_users(&query).await;
            let _ = tx.send(Inbound::SearchCompleted { query, result });
        });
        true
    }

    /// Leaves the search view; in-flight results are ignored.
    pub fn clear_search(&mut self) {
        self.pending_search = None;
        self.conversations.clear_search();
    }

    /// Joins a college room and fetches its history.
    pub fn join_room(&mut self, college: &str) {
        self.room_subscription = None;
        let (event, ticket) = self.room.join(college);

        if let Some(transport) = &self.transport {
            self.room_subscription =
                Some(transport.on(EventKind::ReceiveCollegeMessage, self.forwarder()));
        }
        match self.live_transport() {
            Some(transport) => {
                if let Err(err) = transport.emit(event) {
                    warn!(error = %err, "failed to join college room");
                }
            }
            None => warn!(college, "joined room without a live channel"),
        }

        let api = Arc::clone(&self.api);
        let tx = self.inbox_tx.clone();
        tokio::spawn(async move {
            let result = api.college_messages(&ticket.college).await;
            let _ = tx.send(Inbound::RoomHistoryLoaded { ticket, result });
        });
    }

    /// Leaves the room and stops listening for its broadcasts.
    pub fn leave_room(&mut self) {
        self.room_subscription = None;
        self.room.leave();
    }

    /// Broadcasts `text` to the joined room. Room messages are not inserted
    /// locally; they appear when the broadcast arrives.
    ///
    /// # Errors
    /// Validation errors from the room, or [`ChatError::NotConnected`].
    pub fn send_room_message(&mut self, text: &str) -> ChatResult<()> {
        let event = self.room.compose(&self.me.id, text)?;
        self.live_transport()
            .ok_or(ChatError::NotConnected)?
            .emit(event)
    }

    /// Disconnects and drops all session state.
    pub fn sign_out(&mut self) {
        info!(user = %self.me.id, "signing out");
        self.detach_transport();
        self.reconciler.close();
        self.room.leave();
        self.presence.reset();
        self.conversations = ConversationIndex::new();
        self.pending_search = None;
    }

    /// Waits for the next inbound item and applies it.
    pub async fn next_update(&mut self) -> Option<ChatUpdate> {
        let inbound = self.inbox.recv().await?;
        Some(self.apply(inbound))
    }

    /// Applies every inbound item already queued.
    pub fn drain(&mut self) -> Vec<ChatUpdate> {
        let mut updates = Vec::new();
        while let Ok(inbound) = self.inbox.try_recv() {
            updates.push(self.apply(inbound));
        }
        updates
    }

    /// Applies one inbound item.
    pub fn apply(&mut self, inbound: Inbound) -> ChatUpdate {
        match inbound {
            Inbound::Event(event) => self.apply_event(event),
            Inbound::ConversationsLoaded(Ok(summaries)) => {
                self.conversations.replace_all(summaries);
                ChatUpdate::Conversations
            }
            Inbound::ConversationsLoaded(Err(err)) => {
                self.conversations.load_failed(err);
                ChatUpdate::Conversations
            }
            Inbound::HistoryLoaded { ticket, result } => {
                ChatUpdate::History(self.reconciler.complete_load(&ticket, result))
            }
            Inbound::RoomHistoryLoaded { ticket, result } => {
                ChatUpdate::RoomHistory(self.room.complete_load(&ticket, result))
            }
            Inbound::SearchCompleted { query, result } => {
                if self.pending_search.as_deref() != Some(query.as_str()) {
                    debug!(query = %query, "ignoring stale search results");
                    return ChatUpdate::Ignored;
                }
                let users = result.unwrap_or_else(|err| {
                    warn!(query = %query, error = %err, "user search failed");
                    Vec::new()
                });
                self.conversations.set_search_results(query, users);
                ChatUpdate::Search
            }
            Inbound::SendCompleted { token, result } => self.apply_send_result(token, result),
        }
    }

    fn apply_event(&mut self, event: ServerEvent) -> ChatUpdate {
        match event {
            ServerEvent::ReceivePrivateMessage(message) => {
                self.conversations.record_message(&self.me.id, &message);
                ChatUpdate::PrivateMessage(self.reconciler.on_receive(message))
            }
            ServerEvent::ReceiveCollegeMessage(message) => {
                ChatUpdate::RoomMessage(self.room.on_receive(message))
            }
            ServerEvent::NewConversation(summary) => {
                self.conversations.insert_summary(summary);
                ChatUpdate::Conversations
            }
            ServerEvent::ConversationDeleted(payload) => {
                self.conversations.remove(&payload.user_id);
                let was_open = self.reconciler.clear_if_peer(&payload.user_id);
                info!(peer = %payload.user_id, was_open, "conversation deleted by peer");
                ChatUpdate::ConversationDeleted {
                    peer: payload.user_id,
                    was_open,
                }
            }
            ServerEvent::UpdateUserStatus(map) => {
                self.presence.apply(map);
                ChatUpdate::Presence
            }
        }
    }

    fn apply_send_result(
        &mut self,
        token: CorrelationToken,
        result: ChatResult<Message>,
    ) -> ChatUpdate {
        let applied = match result {
            Ok(message) => {
                self.conversations.record_message(&self.me.id, &message);
                self.reconciler.confirm(token, message).map(|()| true)
            }
            Err(err) => self.reconciler.mark_failed(token, err.to_string()).map(|()| false),
        };
        match applied {
            Ok(delivered) => ChatUpdate::Delivery { token, delivered },
            Err(err) => {
                // The conversation was closed or switched while the send was in flight.
                debug!(error = %err, "send result no longer applicable");
                ChatUpdate::Ignored
            }
        }
    }
}

impl Drop for ChatClient {
    fn drop(&mut self) {
        self.detach_transport();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{api::MockChatApi, transport::LoopbackTransport};
    use shared::models::{ConversationDeletedPayload, PresenceMap, SenderRef, Timestamp};

    fn client_with(api: MockChatApi) -> (ChatClient, Arc<LoopbackTransport>) {
        let mut client = ChatClient::new(User::new("me", "me"), Arc::new(api), ChatSettings::default());
        let transport = Arc::new(LoopbackTransport::connect("me".into()));
        client.attach_transport(transport.clone());
        (client, transport)
    }

    #[tokio::test]
    async fn presence_broadcast_replaces_map() {
        let (mut client, transport) = client_with(MockChatApi::new());
        transport.deliver(&ServerEvent::UpdateUserStatus(PresenceMap::from_pairs([("bob", true)])));

        assert_eq!(client.next_update().await, Some(ChatUpdate::Presence));
        assert!(client.presence().is_online(&"bob".into()));
    }

    #[tokio::test]
    async fn delete_failure_leaves_state_unchanged() {
        let mut api = MockChatApi::new();
        api.expect_delete_conversation()
            .returning(|_| Err(ChatError::NotConnected));
        let (mut client, transport) = client_with(api);
        client.conversations.upsert(User::new("bob", "bob"), "hi", Timestamp::now());
        transport.take_emitted();

        let result = client.delete_conversation(&"bob".into()).await;

        assert!(result.is_err());
        assert_eq!(client.conversations().len(), 1);
        assert!(transport.emitted().is_empty());
    }

    #[tokio::test]
    async fn delete_success_notifies_peer() {
        let mut api = MockChatApi::new();
        api.expect_delete_conversation().times(1).returning(|_| Ok(()));
        let (mut client, transport) = client_with(api);
        client.conversations.upsert(User::new("bob", "bob"), "hi", Timestamp::now());
        transport.take_emitted();

        client.delete_conversation(&"bob".into()).await.unwrap();

        assert!(client.conversations().is_empty());
        assert_eq!(
            transport.emitted(),
            vec![ClientEvent::DeleteConversation(DeleteConversationPayload {
                user_id: "me".into(),
                other_user_id: "bob".into(),
            })]
        );
    }

    #[tokio::test]
    async fn send_without_channel_uses_rest_fallback() {
        let mut api = MockChatApi::new();
        api.expect_private_messages().returning(|_| Ok(Vec::new()));
        api.expect_send_private_message().returning(|peer, content| {
            Ok(Message::private(
                SenderRef::Id("me".into()),
                peer.clone(),
                content,
                Timestamp::now(),
            )
            .with_id("srv1"))
        });
        let (mut client, transport) = client_with(api);
        transport.set_connected(false);

        client.open_conversation(User::new("bob", "bob"));
        client.next_update().await;
        let token = client.send_message("hello").unwrap();

        assert_eq!(
            client.next_update().await,
            Some(ChatUpdate::Delivery {
                token,
                delivered: true
            })
        );
        let log = client.reconciler().log();
        assert_eq!(log.len(), 1);
        assert_eq!(log[0].server_id().map(|id| id.as_str()), Some("srv1"));
    }

    #[tokio::test]
    async fn failed_fallback_marks_entry_failed() {
        let mut api = MockChatApi::new();
        api.expect_private_messages().returning(|_| Ok(Vec::new()));
        api.expect_send_private_message()
            .returning(|_, _| Err(ChatError::NotConnected));
        let (mut client, transport) = client_with(api);
        transport.set_connected(false);

        client.open_conversation(User::new("bob", "bob"));
        client.next_update().await;
        let token = client.send_message("hello").unwrap();
        client.next_update().await;

        assert!(matches!(
            client.reconciler().pending(token).map(|p| &p.state),
            Some(crate::reconciler::DeliveryState::Failed { .. })
        ));
    }

    #[tokio::test]
    async fn short_query_shows_empty_results_without_request() {
        let mut api = MockChatApi::new();
        api.expect_search_users().times(0);
        let (mut client, _transport) = client_with(api);
        client.conversations.upsert(User::new("bob", "bob"), "hi", Timestamp::now());

        assert!(!client.search(" a "));
        assert_eq!(client.conversations().search().map(|s| s.query.as_str()), Some("a"));
        assert!(client.conversations().visible().is_empty());

        assert!(!client.search("   "));
        assert!(client.conversations().search().is_none());
        assert_eq!(client.conversations().visible().len(), 1);
    }

    #[tokio::test]
    async fn remote_deletion_clears_open_conversation() {
        let mut api = MockChatApi::new();
        api.expect_private_messages().returning(|_| Ok(Vec::new()));
        let (mut client, transport) = client_with(api);
        client.open_conversation(User::new("bob", "bob"));
        client.next_update().await;

        transport.deliver(&ServerEvent::ConversationDeleted(ConversationDeletedPayload {
            user_id: "bob".into(),
        }));

        assert_eq!(
            client.next_update().await,
            Some(ChatUpdate::ConversationDeleted {
                peer: "bob".into(),
                was_open: true
            })
        );
        assert!(client.reconciler().peer().is_none());
    }

    #[tokio::test]
    async fn sign_out_disconnects_once_and_unsubscribes() {
        let (mut client, transport) = client_with(MockChatApi::new());
        transport.take_emitted();

        client.sign_out();
        drop(client);

        assert_eq!(transport.emitted(), vec![ClientEvent::UserOffline("me".into())]);
        assert_eq!(transport.listener_count(), 0);
    }
}
