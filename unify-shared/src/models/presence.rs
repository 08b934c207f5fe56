//! Online-state snapshots.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

use super::user::UserId;

/// Full online-state mapping broadcast by the server (`updateUserStatus`).
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PresenceMap(HashMap<UserId, bool>);

impl PresenceMap {
    /// Builds a map from `(user, online)` pairs.
    #[must_use]
    pub fn from_pairs<I, U>(pairs: I) -> Self
    where
        I: IntoIterator<Item = (U, bool)>,
        U: Into<UserId>,
    {
        Self(pairs.into_iter().map(|(id, online)| (id.into(), online)).collect())
    }

    /// Online state of `user`; unknown users are offline.
    #[must_use]
    pub fn is_online(&self, user: &UserId) -> bool {
        self.0.get(user).copied().unwrap_or(false)
    }

    /// Users currently marked online.
    pub fn online(&self) -> impl Iterator<Item = &UserId> {
        self.0
            .iter()
            .filter_map(|(id, online)| online.then_some(id))
    }

    /// Number of users currently marked online.
    #[must_use]
    pub fn online_count(&self) -> usize {
        self.0.values().filter(|online| **online).count()
    }

    /// Number of entries, online or not.
    #[must_use]
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// True when the map has no entries.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}
