//! # Message reconciler
//!
//! Per open conversation, keeps the ordered message log and merges
//! optimistic local sends with their server-confirmed echoes.
//!
//! The reconciler moves through three phases:
//!
//! - `Idle`: no conversation open.
//! - `Loading`: history fetch in flight. Sends and live messages are applied
//!   to a provisional log and replayed onto the history when it lands.
//! - `Ready`: history materialized, live updates applied in place.
//!
//! A failed load still ends in `Ready`, with an empty history and the error
//! recorded. Completions for a conversation that is no longer the open one
//! are discarded by generation.
//!
//! Inbound messages are merged by, in order of precedence:
//!
//! 1. discarding a message whose server id is already in the log;
//! 2. replacing the earliest `Sending` entry with the same sender, receiver
//!    and content whose local timestamp is within the match window;
//! 3. appending.

use std::{fmt, mem, time::Duration as StdDuration};

use chrono::Duration;
use shared::models::{
    ClientEvent, Message, MessageId, MessageScope, PrivateMessagePayload, SenderRef, Timestamp,
    User, UserId,
};
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::error::{ChatError, ChatResult};

/// Local identity of an optimistic entry. Never sent to the server.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct CorrelationToken(Uuid);

impl CorrelationToken {
    fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl fmt::Display for CorrelationToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

/// Delivery progress of a pending entry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DeliveryState {
    /// Handed to the channel or the REST fallback; awaiting confirmation.
    Sending,
    /// Could not be delivered; eligible for [`MessageReconciler::retry`].
    Failed {
        /// Delivery error.
        reason: String,
    },
}

/// A locally authored message that the server has not confirmed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PendingMessage {
    /// Local identity.
    pub token: CorrelationToken,
    /// Optimistic copy, stamped with local time.
    pub message: Message,
    /// Delivery progress.
    pub state: DeliveryState,
}

/// One row of the conversation log.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LogEntry {
    /// Local send awaiting confirmation.
    Pending(PendingMessage),
    /// Server-persisted message.
    Confirmed(Message),
}

impl LogEntry {
    /// Message shown for this row.
    #[must_use]
    pub fn message(&self) -> &Message {
        match self {
            Self::Pending(pending) => &pending.message,
            Self::Confirmed(message) => message,
        }
    }

    /// Server identifier, present only once confirmed.
    #[must_use]
    pub fn server_id(&self) -> Option<&MessageId> {
        match self {
            Self::Pending(_) => None,
            Self::Confirmed(message) => message.id.as_ref(),
        }
    }

    /// Correlation token, present only while pending.
    #[must_use]
    pub fn token(&self) -> Option<CorrelationToken> {
        match self {
            Self::Pending(pending) => Some(pending.token),
            Self::Confirmed(_) => None,
        }
    }

    /// True until the server confirms the entry.
    #[must_use]
    pub fn is_pending(&self) -> bool {
        matches!(self, Self::Pending(_))
    }
}

/// Externally visible phase.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReconcilerState {
    /// No conversation open.
    Idle,
    /// History fetch in flight.
    Loading,
    /// History applied.
    Ready,
}

/// Identifies one history fetch so its completion can be matched to the
/// `open` that issued it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoadTicket {
    /// Peer whose history to fetch.
    pub peer: UserId,
    generation: u64,
}

/// Result of applying a fetch completion.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoadOutcome {
    /// The result was applied.
    Applied,
    /// Superseded by a later open, close or leave; nothing changed.
    Stale,
}

/// Result of applying an inbound live message.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReceiveOutcome {
    /// Not for the open conversation or room, or malformed.
    Ignored,
    /// Server id already present.
    Duplicate,
    /// Replaced the pending entry with this token.
    Reconciled(CorrelationToken),
    /// Added at the tail.
    Appended,
}

/// A send accepted by the reconciler, ready to go out.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutgoingMessage {
    /// Local identity of the inserted entry.
    pub token: CorrelationToken,
    /// The optimistic copy that was inserted into the log.
    pub message: Message,
    /// Conversation peer.
    pub peer: User,
    /// Event to emit over the push channel.
    pub event: ClientEvent,
}

#[derive(Debug)]
enum Phase {
    Idle,
    Loading {
        peer: User,
        generation: u64,
        early: Vec<LogEntry>,
    },
    Ready {
        peer: User,
        log: Vec<LogEntry>,
    },
}

/// State machine for the open private conversation.
#[derive(Debug)]
pub struct MessageReconciler {
    me: User,
    window: Duration,
    phase: Phase,
    generation: u64,
    load_error: Option<String>,
}

impl MessageReconciler {
    /// Creates an idle reconciler for the signed-in user.
    #[must_use]
    pub fn new(me: User, match_window: StdDuration) -> Self {
        Self {
            me,
            window: Duration::from_std(match_window).unwrap_or(Duration::MAX),
            phase: Phase::Idle,
            generation: 0,
            load_error: None,
        }
    }

    /// Current phase.
    #[must_use]
    pub fn state(&self) -> ReconcilerState {
        match self.phase {
            Phase::Idle => ReconcilerState::Idle,
            Phase::Loading { .. } => ReconcilerState::Loading,
            Phase::Ready { .. } => ReconcilerState::Ready,
        }
    }

    /// Peer of the open conversation.
    #[must_use]
    pub fn peer(&self) -> Option<&User> {
        match &self.phase {
            Phase::Idle => None,
            Phase::Loading { peer, .. } | Phase::Ready { peer, .. } => Some(peer),
        }
    }

    /// Current log. While loading this holds only entries that arrived
    /// before the history.
    #[must_use]
    pub fn log(&self) -> &[LogEntry] {
        match &self.phase {
            Phase::Idle => &[],
            Phase::Loading { early, .. } => early,
            Phase::Ready { log, .. } => log,
        }
    }

    /// Error from the last failed history load of the open conversation.
    #[must_use]
    pub fn load_error(&self) -> Option<&str> {
        self.load_error.as_deref()
    }

    /// Pending entry with `token`, if still pending.
    #[must_use]
    pub fn pending(&self, token: CorrelationToken) -> Option<&PendingMessage> {
        self.log().iter().find_map(|entry| match entry {
            LogEntry::Pending(pending) if pending.token == token => Some(pending),
            _ => None,
        })
    }

    /// Opens a conversation with `peer`, superseding any previous one. The
    /// caller fetches history and passes it to [`Self::complete_load`].
    pub fn open(&mut self, peer: User) -> LoadTicket {
        self.generation += 1;
        self.load_error = None;
        info!(peer = %peer.id, "opening conversation");
        let ticket = LoadTicket {
            peer: peer.id.clone(),
            generation: self.generation,
        };
        self.phase = Phase::Loading {
            peer,
            generation: self.generation,
            early: Vec::new(),
        };
        ticket
    }

    /// Applies a history fetch result if `ticket` is still current.
    pub fn complete_load(
        &mut self,
        ticket: &LoadTicket,
        result: ChatResult<Vec<Message>>,
    ) -> LoadOutcome {
        let current = matches!(
            &self.phase,
            Phase::Loading { generation, .. } if *generation == ticket.generation
        );
        if !current {
            debug!(peer = %ticket.peer, "ignoring stale history fetch");
            return LoadOutcome::Stale;
        }
        let Phase::Loading { peer, early, .. } = mem::replace(&mut self.phase, Phase::Idle) else {
            return LoadOutcome::Stale;
        };

        let history = match result {
            Ok(history) => history,
            Err(err) => {
                warn!(peer = %peer.id, error = %err, "history load failed; showing empty log");
                self.load_error = Some(err.to_string());
                Vec::new()
            }
        };

        let window = self.window;
        let mut log: Vec<LogEntry> = history.into_iter().map(LogEntry::Confirmed).collect();
        let mut claimed = vec![false; log.len()];
        for entry in early {
            if let Some(id) = entry.server_id()
                && contains_id(&log, id)
            {
                debug!(message = %id, "early message already in history");
                continue;
            }
            if let LogEntry::Pending(pending) = &entry
                && pending.state == DeliveryState::Sending
                && let Some(pos) = (0..claimed.len()).find(|&i| {
                    !claimed[i] && persisted_as(&pending.message, log[i].message(), window)
                })
            {
                // Each stored copy absorbs at most one send, earliest first.
                claimed[pos] = true;
                debug!(token = %pending.token, "early send already persisted in history");
                continue;
            }
            log.push(entry);
        }
        debug!(peer = %peer.id, entries = log.len(), "conversation ready");
        self.phase = Phase::Ready { peer, log };
        LoadOutcome::Applied
    }

    /// Inserts an optimistic copy of `text` at the tail of the log.
    ///
    /// # Errors
    /// [`ChatError::EmptyMessage`] for blank text, [`ChatError::NoConversationOpen`]
    /// when idle.
    pub fn send(&mut self, text: &str) -> ChatResult<OutgoingMessage> {
        self.send_at(text, Timestamp::now())
    }

    /// [`Self::send`] with an explicit local timestamp.
    ///
    /// # Errors
    /// See [`Self::send`].
    pub fn send_at(&mut self, text: &str, now: Timestamp) -> ChatResult<OutgoingMessage> {
        if text.trim().is_empty() {
            return Err(ChatError::EmptyMessage);
        }
        let me = self.me.clone();
        let (peer, log) = self.open_log_mut().ok_or(ChatError::NoConversationOpen)?;
        let peer = peer.clone();

        let message = Message::private(SenderRef::User(me), peer.id.clone(), text, now);
        let token = CorrelationToken::new();
        log.push(LogEntry::Pending(PendingMessage {
            token,
            message: message.clone(),
            state: DeliveryState::Sending,
        }));
        debug!(peer = %peer.id, %token, "optimistic insert");

        Ok(outgoing(token, message, peer))
    }

    /// Marks a pending entry as undeliverable.
    ///
    /// # Errors
    /// [`ChatError::UnknownToken`] when no pending entry has `token`.
    pub fn mark_failed(&mut self, token: CorrelationToken, reason: impl Into<String>) -> ChatResult<()> {
        let pending = self.pending_mut(token)?;
        let reason = reason.into();
        warn!(%token, reason = %reason, "message delivery failed");
        pending.state = DeliveryState::Failed { reason };
        Ok(())
    }

    /// Re-arms a pending entry for another delivery attempt, refreshing its
    /// local timestamp so the echo can match.
    ///
    /// # Errors
    /// [`ChatError::UnknownToken`] when no pending entry has `token`.
    pub fn retry(&mut self, token: CorrelationToken) -> ChatResult<OutgoingMessage> {
        self.retry_at(token, Timestamp::now())
    }

    /// [`Self::retry`] with an explicit local timestamp.
    ///
    /// # Errors
    /// See [`Self::retry`].
    pub fn retry_at(&mut self, token: CorrelationToken, now: Timestamp) -> ChatResult<OutgoingMessage> {
        let peer = self
            .peer()
            .cloned()
            .ok_or(ChatError::NoConversationOpen)?;
        let pending = self.pending_mut(token)?;
        pending.state = DeliveryState::Sending;
        pending.message.created_at = now;
        let message = pending.message.clone();
        info!(%token, "retrying message");
        Ok(outgoing(token, message, peer))
    }

    /// Replaces a pending entry with the message the server returned for it.
    /// If that message already reached the log through the channel the
    /// pending entry is dropped instead.
    ///
    /// # Errors
    /// [`ChatError::UnknownToken`] when no pending entry has `token`.
    pub fn confirm(&mut self, token: CorrelationToken, message: Message) -> ChatResult<()> {
        let (_, log) = self.open_log_mut().ok_or(ChatError::UnknownToken(token))?;
        let pos = log
            .iter()
            .position(|entry| entry.token() == Some(token))
            .ok_or(ChatError::UnknownToken(token))?;

        if let Some(id) = &message.id
            && contains_id(log, id)
        {
            debug!(%token, message = %id, "confirmation already delivered live");
            log.remove(pos);
        } else {
            log[pos] = LogEntry::Confirmed(message);
        }
        Ok(())
    }

    /// Applies an inbound live private message.
    pub fn on_receive(&mut self, message: Message) -> ReceiveOutcome {
        let window = self.window;
        let Some(MessageScope::Private(receiver)) = message.scope() else {
            debug!("ignoring message without private scope");
            return ReceiveOutcome::Ignored;
        };
        let receiver = receiver.clone();
        let Some((peer, log)) = self.open_log_mut() else {
            return ReceiveOutcome::Ignored;
        };
        if message.sender_id() != &peer.id && receiver != peer.id {
            debug!(peer = %peer.id, "message belongs to another conversation");
            return ReceiveOutcome::Ignored;
        }

        if let Some(id) = &message.id
            && contains_id(log, id)
        {
            debug!(message = %id, "duplicate delivery discarded");
            return ReceiveOutcome::Duplicate;
        }

        let candidate = log.iter().position(|entry| match entry {
            LogEntry::Pending(pending) => {
                pending.state == DeliveryState::Sending
                    && echoes(&pending.message, &message, &receiver, window)
            }
            LogEntry::Confirmed(_) => false,
        });
        if let Some(pos) = candidate
            && let Some(token) = log[pos].token()
        {
            debug!(%token, "optimistic echo reconciled");
            log[pos] = LogEntry::Confirmed(message);
            return ReceiveOutcome::Reconciled(token);
        }

        log.push(LogEntry::Confirmed(message));
        ReceiveOutcome::Appended
    }

    /// Closes the conversation and discards the log.
    pub fn close(&mut self) {
        if let Some(peer) = self.peer() {
            info!(peer = %peer.id, "closing conversation");
        }
        self.generation += 1;
        self.phase = Phase::Idle;
        self.load_error = None;
    }

    /// Closes the conversation if it is with `peer`. Returns whether it was.
    pub fn clear_if_peer(&mut self, peer: &UserId) -> bool {
        if self.peer().is_some_and(|open| &open.id == peer) {
            self.close();
            true
        } else {
            false
        }
    }

    fn open_log_mut(&mut self) -> Option<(&User, &mut Vec<LogEntry>)> {
        match &mut self.phase {
            Phase::Idle => None,
            Phase::Loading { peer, early, .. } => Some((peer, early)),
            Phase::Ready { peer, log } => Some((peer, log)),
        }
    }

    fn pending_mut(&mut self, token: CorrelationToken) -> ChatResult<&mut PendingMessage> {
        self.open_log_mut()
            .and_then(|(_, log)| {
                log.iter_mut().find_map(|entry| match entry {
                    LogEntry::Pending(pending) if pending.token == token => Some(pending),
                    _ => None,
                })
            })
            .ok_or(ChatError::UnknownToken(token))
    }
}

fn contains_id(log: &[LogEntry], id: &MessageId) -> bool {
    log.iter().any(|entry| entry.server_id() == Some(id))
}

fn echoes(local: &Message, inbound: &Message, receiver: &UserId, window: Duration) -> bool {
    local.sender_id() == inbound.sender_id()
        && local.receiver.as_ref() == Some(receiver)
        && local.content == inbound.content
        && local.created_at.distance(&inbound.created_at) <= window
}

fn persisted_as(local: &Message, stored: &Message, window: Duration) -> bool {
    matches!(
        stored.scope(),
        Some(MessageScope::Private(receiver)) if echoes(local, stored, receiver, window)
    )
}

fn outgoing(token: CorrelationToken, message: Message, peer: User) -> OutgoingMessage {
    let event = ClientEvent::SendPrivateMessage(PrivateMessagePayload {
        sender: message.sender_id().clone(),
        receiver: peer.id.clone(),
        content: message.content.clone(),
    });
    OutgoingMessage {
        token,
        message,
        peer,
        event,
    }
}
