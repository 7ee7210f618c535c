//! User identity records.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Opaque key a user is resolved by (a display name or account handle).
///
/// Equal keys always resolve to the same [`User`] once it has been created.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct UserKey(String);

impl UserKey {
    /// Creates a new user key.
    pub fn new(key: impl Into<String>) -> Self {
        Self(key.into())
    }

    /// Returns the key as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for UserKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<String> for UserKey {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl From<&str> for UserKey {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

impl AsRef<str> for UserKey {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

/// Unique identifier assigned to a user when it is created.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct UserId(Uuid);

impl UserId {
    /// Creates a new random user ID.
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for UserId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for UserId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Seed attributes used when a user has to be created.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewUser {
    pub key: UserKey,
    pub display_name: String,
    pub email: String,
}

impl NewUser {
    /// Derives seed attributes from the key alone.
    ///
    /// The display name is the key itself; the email is the lowercased key
    /// with runs of non-alphanumeric characters collapsed to a single dot.
    pub fn from_key(key: &UserKey) -> Self {
        let mut local = String::with_capacity(key.as_str().len());
        for c in key.as_str().chars() {
            if c.is_ascii_alphanumeric() {
                local.push(c.to_ascii_lowercase());
            } else if !local.is_empty() && !local.ends_with('.') {
                local.push('.');
            }
        }
        let local = local.trim_end_matches('.');
        let local = if local.is_empty() { "user" } else { local };

        Self {
            key: key.clone(),
            display_name: key.as_str().to_string(),
            email: format!("{local}@example.com"),
        }
    }
}

/// An immutable user record.
///
/// Created exactly once per distinct [`UserKey`] and shared read-only by the
/// checkout stages.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct User {
    pub id: UserId,
    pub key: UserKey,
    pub display_name: String,
    pub email: String,
    pub created_at: DateTime<Utc>,
}

impl User {
    /// Materializes a user from seed attributes with a fresh id.
    pub fn from_seed(seed: NewUser) -> Self {
        Self {
            id: UserId::new(),
            key: seed.key,
            display_name: seed.display_name,
            email: seed.email,
            created_at: Utc::now(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_user_key_conversions() {
        let key = UserKey::new("Fuller Gonzalez");
        assert_eq!(key.as_str(), "Fuller Gonzalez");

        let key2: UserKey = "Fuller Gonzalez".into();
        assert_eq!(key, key2);
        assert_eq!(key2.to_string(), "Fuller Gonzalez");
    }

    #[test]
    fn test_user_id_new_creates_unique_ids() {
        assert_ne!(UserId::new(), UserId::new());
    }

    #[test]
    fn test_new_user_from_key() {
        let seed = NewUser::from_key(&UserKey::new("Fuller Gonzalez"));
        assert_eq!(seed.display_name, "Fuller Gonzalez");
        assert_eq!(seed.email, "fuller.gonzalez@example.com");
    }

    #[test]
    fn test_new_user_email_collapses_punctuation() {
        let seed = NewUser::from_key(&UserKey::new("  O'Brien -- Jr. "));
        assert_eq!(seed.email, "o.brien.jr@example.com");
    }

    #[test]
    fn test_new_user_email_falls_back_for_symbol_keys() {
        let seed = NewUser::from_key(&UserKey::new("***"));
        assert_eq!(seed.email, "user@example.com");
    }

    #[test]
    fn test_user_from_seed() {
        let key = UserKey::new("alice");
        let user = User::from_seed(NewUser::from_key(&key));
        assert_eq!(user.key, key);
        assert_eq!(user.display_name, "alice");
        assert_eq!(user.email, "alice@example.com");
    }

    #[test]
    fn test_user_serialization() {
        let user = User::from_seed(NewUser::from_key(&UserKey::new("bob")));
        let json = serde_json::to_string(&user).unwrap();
        let deserialized: User = serde_json::from_str(&json).unwrap();
        assert_eq!(user, deserialized);
    }
}
