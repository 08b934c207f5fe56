//! Presence tracker: who is online, per the latest server snapshot.

use shared::models::{PresenceMap, UserId};
use tracing::debug;

/// Online/offline state of users, replaced wholesale on every broadcast.
///
/// Before the first broadcast every user is offline.
#[derive(Debug, Default)]
pub struct PresenceTracker {
    map: PresenceMap,
}

impl PresenceTracker {
    /// Tracker with everyone offline.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Replaces the whole map with the server's snapshot.
    pub fn apply(&mut self, snapshot: PresenceMap) {
        debug!(online = snapshot.online_count(), "presence updated");
        self.map = snapshot;
    }

    /// Whether the latest snapshot marks `user` online.
    #[must_use]
    pub fn is_online(&self, user: &UserId) -> bool {
        self.map.is_online(user)
    }

    /// Number of users online.
    #[must_use]
    pub fn online_count(&self) -> usize {
        self.map.online_count()
    }

    /// Current snapshot.
    #[must_use]
    pub fn snapshot(&self) -> &PresenceMap {
        &self.map
    }

    /// Forgets everything; used when the channel is re-established.
    pub fn reset(&mut self) {
        self.map = PresenceMap::default();
    }
}
