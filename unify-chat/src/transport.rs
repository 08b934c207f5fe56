//! # Transport handle
//!
//! One push-channel connection per signed-in session. The [`Transport`]
//! trait is what the rest of the core talks to; [`crate::socket::SocketTransport`]
//! is the WebSocket implementation and [`LoopbackTransport`] is an in-memory
//! one for tests and for running without a server.
//!
//! Listeners are registered per [`EventKind`] and stay registered for as long
//! as the returned [`Subscription`] is alive.

use std::{
    collections::HashMap,
    fmt,
    sync::{
        Arc, Mutex, PoisonError, Weak,
        atomic::{AtomicBool, AtomicU64, Ordering},
    },
};

use shared::models::{ClientEvent, EventKind, ServerEvent, UserId};
use tracing::debug;

use crate::error::{ChatError, ChatResult};

/// Callback invoked for every inbound event of the subscribed kind.
pub type Listener = Arc<dyn Fn(&ServerEvent) + Send + Sync>;

/// Contract every push-channel implementation satisfies.
pub trait Transport: Send + Sync + fmt::Debug {
    /// Identity the connection was opened for.
    fn identity(&self) -> &UserId;

    /// True while the channel can carry outbound events.
    fn is_connected(&self) -> bool;

    /// Sends an event to the server.
    ///
    /// # Errors
    /// Returns [`ChatError::NotConnected`] when the channel is down; sends are
    /// never queued.
    fn emit(&self, event: ClientEvent) -> ChatResult<()>;

    /// Registers `listener` for `kind`. Dropping the subscription unregisters it.
    fn on(&self, kind: EventKind, listener: Listener) -> Subscription;

    /// Announces departure and closes the channel. Safe to call repeatedly.
    fn disconnect(&self);
}

/// Listener table shared between a transport and its subscriptions.
#[derive(Default)]
pub struct ListenerRegistry {
    next_id: AtomicU64,
    listeners: Mutex<HashMap<EventKind, Vec<(u64, Listener)>>>,
}

impl fmt::Debug for ListenerRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ListenerRegistry")
            .field("listeners", &self.len())
            .finish()
    }
}

impl ListenerRegistry {
    /// Adds a listener and returns the guard that removes it.
    pub fn subscribe(self: &Arc<Self>, kind: EventKind, listener: Listener) -> Subscription {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        self.listeners
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .entry(kind)
            .or_default()
            .push((id, listener));

        Subscription {
            id,
            kind,
            registry: Arc::downgrade(self),
        }
    }

    /// Invokes every listener registered for the event's kind and returns how
    /// many ran.
    pub fn dispatch(&self, event: &ServerEvent) -> usize {
        // Listeners run outside the lock so they may subscribe or unsubscribe.
        let targets: Vec<Listener> = self
            .listeners
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(&event.kind())
            .map(|entries| entries.iter().map(|(_, l)| Arc::clone(l)).collect())
            .unwrap_or_default();

        if targets.is_empty() {
            debug!(event = %event.kind(), "no listeners for inbound event");
        }
        for listener in &targets {
            listener(event);
        }
        targets.len()
    }

    /// Number of live listeners across all kinds.
    pub fn len(&self) -> usize {
        self.listeners
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .values()
            .map(Vec::len)
            .sum()
    }

    /// True when no listener is registered.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn remove(&self, kind: EventKind, id: u64) {
        let mut listeners = self.listeners.lock().unwrap_or_else(PoisonError::into_inner);
        if let Some(entries) = listeners.get_mut(&kind) {
            entries.retain(|(entry_id, _)| *entry_id != id);
            if entries.is_empty() {
                listeners.remove(&kind);
            }
        }
    }
}

/// Handle for a registered listener; unsubscribes on drop.
#[must_use = "dropping a subscription unregisters its listener"]
#[derive(Debug)]
pub struct Subscription {
    id: u64,
    kind: EventKind,
    registry: Weak<ListenerRegistry>,
}

impl Subscription {
    /// Event kind this subscription listens to.
    #[must_use]
    pub fn kind(&self) -> EventKind {
        self.kind
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        if let Some(registry) = self.registry.upgrade() {
            registry.remove(self.kind, self.id);
        }
    }
}

/// In-memory transport: records what the client emits and lets the caller
/// inject server events.
#[derive(Debug)]
pub struct LoopbackTransport {
    identity: UserId,
    connected: AtomicBool,
    emitted: Mutex<Vec<ClientEvent>>,
    registry: Arc<ListenerRegistry>,
}

impl LoopbackTransport {
    /// Opens a loopback channel for `identity`, announcing it online.
    #[must_use]
    pub fn connect(identity: UserId) -> Self {
        let online = ClientEvent::UserOnline(identity.clone());
        Self {
            identity,
            connected: AtomicBool::new(true),
            emitted: Mutex::new(vec![online]),
            registry: Arc::new(ListenerRegistry::default()),
        }
    }

    /// Delivers `event` to subscribers as if the server had pushed it.
    pub fn deliver(&self, event: &ServerEvent) -> usize {
        self.registry.dispatch(event)
    }

    /// Snapshot of everything emitted so far, oldest first.
    #[must_use]
    pub fn emitted(&self) -> Vec<ClientEvent> {
        self.emitted
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Drains the emitted-event record.
    pub fn take_emitted(&self) -> Vec<ClientEvent> {
        std::mem::take(&mut *self.emitted.lock().unwrap_or_else(PoisonError::into_inner))
    }

    /// Simulates the channel dropping or recovering without a departure notice.
    pub fn set_connected(&self, connected: bool) {
        self.connected.store(connected, Ordering::SeqCst);
    }

    /// Number of registered listeners.
    #[must_use]
    pub fn listener_count(&self) -> usize {
        self.registry.len()
    }

    fn record(&self, event: ClientEvent) {
        self.emitted
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(event);
    }
}

impl Transport for LoopbackTransport {
    fn identity(&self) -> &UserId {
        &self.identity
    }

    fn is_connected(&self) -> bool {
        self.connected.load(Ordering::SeqCst)
    }

    fn emit(&self, event: ClientEvent) -> ChatResult<()> {
        if !self.is_connected() {
            return Err(ChatError::NotConnected);
        }
        self.record(event);
        Ok(())
    }

    fn on(&self, kind: EventKind, listener: Listener) -> Subscription {
        self.registry.subscribe(kind, listener)
    }

    fn disconnect(&self) {
        if self.connected.swap(false, Ordering::SeqCst) {
            self.record(ClientEvent::UserOffline(self.identity.clone()));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use shared::models::{ConversationDeletedPayload, PresenceMap};
    use std::sync::atomic::AtomicUsize;

    fn counter() -> (Arc<AtomicUsize>, Listener) {
        let count = Arc::new(AtomicUsize::new(0));
        let seen = Arc::clone(&count);
        let listener: Listener = Arc::new(move |_| {
            seen.fetch_add(1, Ordering::SeqCst);
        });
        (count, listener)
    }

    fn deleted(user: &str) -> ServerEvent {
        ServerEvent::ConversationDeleted(ConversationDeletedPayload {
            user_id: user.into(),
        })
    }

    #[test]
    fn dispatch_routes_by_kind() {
        let transport = LoopbackTransport::connect("me".into());
        let (count, listener) = counter();
        let _sub = transport.on(EventKind::ConversationDeleted, listener);

        assert_eq!(transport.deliver(&deleted("u2")), 1);
        assert_eq!(
            transport.deliver(&ServerEvent::UpdateUserStatus(PresenceMap::default())),
            0
        );
        assert_eq!(count.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn dropping_subscription_unsubscribes() {
        let transport = LoopbackTransport::connect("me".into());
        let (count, listener) = counter();
        let sub = transport.on(EventKind::ConversationDeleted, listener);
        assert_eq!(transport.listener_count(), 1);

        drop(sub);
        transport.deliver(&deleted("u2"));

        assert_eq!(transport.listener_count(), 0);
        assert_eq!(count.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn connect_announces_online() {
        let transport = LoopbackTransport::connect("me".into());
        assert_eq!(
            transport.emitted(),
            vec![ClientEvent::UserOnline("me".into())]
        );
    }

    #[test]
    fn disconnect_is_idempotent_and_announces_departure_once() {
        let transport = LoopbackTransport::connect("me".into());
        transport.take_emitted();

        transport.disconnect();
        transport.disconnect();

        assert!(!transport.is_connected());
        assert_eq!(
            transport.emitted(),
            vec![ClientEvent::UserOffline("me".into())]
        );
    }

    #[test]
    fn emit_fails_visibly_when_disconnected() {
        let transport = LoopbackTransport::connect("me".into());
        transport.set_connected(false);

        let result = transport.emit(ClientEvent::JoinCollege("mit".into()));
        assert!(matches!(result, Err(ChatError::NotConnected)));
    }

    #[test]
    fn listener_may_unsubscribe_during_dispatch() {
        let transport = Arc::new(LoopbackTransport::connect("me".into()));
        let slot: Arc<Mutex<Option<Subscription>>> = Arc::new(Mutex::new(None));
        let inner = Arc::clone(&slot);
        let sub = transport.on(
            EventKind::ConversationDeleted,
            Arc::new(move |_| {
                inner.lock().unwrap().take();
            }),
        );
        *slot.lock().unwrap() = Some(sub);

        transport.deliver(&deleted("u2"));
        assert_eq!(transport.listener_count(), 0);
    }
}
