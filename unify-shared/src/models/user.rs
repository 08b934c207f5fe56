//! User identity and public profile.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Server-assigned user identifier (an opaque document id string).
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct UserId(String);

impl UserId {
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

impl fmt::Display for UserId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for UserId {
    fn from(value: &str) -> Self {
        Self(value.to_string())
    }
}

impl From<String> for UserId {
    fn from(value: String) -> Self {
        Self(value)
    }
}

/// Public profile of a user as seen by the chat core.
///
/// Owned by the profile subsystem; the chat core never mutates it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct User {
    /// Unique identifier for the user.
    #[serde(rename = "_id")]
    pub id: UserId,

    /// Display name. Empty when the server only sent an identifier.
    #[serde(default)]
    pub username: String,

    /// Avatar reference.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub picture: Option<String>,
}

impl User {
    /// Builds a user with a known name.
    #[must_use]
    pub fn new(id: impl Into<UserId>, username: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            username: username.into(),
            picture: None,
        }
    }

    /// Builds a placeholder for a user known only by identifier.
    #[must_use]
    pub fn stub(id: UserId) -> Self {
        Self {
            id,
            username: String::new(),
            picture: None,
        }
    }

    /// True when only the identifier is known.
    #[must_use]
    pub fn is_stub(&self) -> bool {
        self.username.is_empty() && self.picture.is_none()
    }

    /// Name to render, falling back to "Unknown User".
    #[must_use]
    pub fn display_name(&self) -> &str {
        if self.username.is_empty() {
            "Unknown User"
        } else {
            &self.username
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn deserializes_mongo_style_user() {
        let json = r#"{"_id":"u1","username":"ada","picture":"/img/ada.png"}"#;
        let user: User = serde_json::from_str(json).unwrap();

        assert_eq!(user.id, UserId::from("u1"));
        assert_eq!(user.username, "ada");
        assert_eq!(user.picture.as_deref(), Some("/img/ada.png"));
    }

    #[test]
    fn missing_fields_default_to_stub() {
        let user: User = serde_json::from_str(r#"{"_id":"u2"}"#).unwrap();

        assert!(user.is_stub());
        assert_eq!(user.display_name(), "Unknown User");
    }

    #[test]
    fn serializes_id_under_underscore_key() {
        let json = serde_json::to_string(&User::new("u3", "grace")).unwrap();

        assert!(json.contains("\"_id\":\"u3\""));
        assert!(!json.contains("picture"));
    }
}
