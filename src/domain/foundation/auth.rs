//! Identity consumed from the authentication layer.
//!
//! The inbox never authenticates anyone itself. It receives an opaque
//! identity (who the user is and a bearer token for the API) and scopes a
//! sync session to it.

use secrecy::{ExposeSecret, Secret};
use std::fmt;

use super::UserId;

/// An authenticated user as seen by the inbox.
#[derive(Clone)]
pub struct Identity {
    /// The user whose inbox is synchronised.
    pub user_id: UserId,

    /// Bearer token for the notification API.
    pub access_token: Secret<String>,
}

impl Identity {
    pub fn new(user_id: UserId, access_token: impl Into<String>) -> Self {
        Self {
            user_id,
            access_token: Secret::new(access_token.into()),
        }
    }

    /// True when both identities refer to the same user with the same token.
    ///
    /// A refreshed token counts as a different identity, so the session is
    /// rebuilt with fresh credentials.
    pub fn same_as(&self, other: &Identity) -> bool {
        self.user_id == other.user_id
            && self.access_token.expose_secret() == other.access_token.expose_secret()
    }
}

impl fmt::Debug for Identity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Identity")
            .field("user_id", &self.user_id)
            .field("access_token", &"[REDACTED]")
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn user(id: &str) -> UserId {
        UserId::new(id).unwrap()
    }

    #[test]
    fn same_user_and_token_is_same_identity() {
        let a = Identity::new(user("1"), "tok");
        let b = Identity::new(user("1"), "tok");
        assert!(a.same_as(&b));
    }

    #[test]
    fn different_user_or_token_is_different_identity() {
        let a = Identity::new(user("1"), "tok");
        assert!(!a.same_as(&Identity::new(user("2"), "tok")));
        assert!(!a.same_as(&Identity::new(user("1"), "other")));
    }

    #[test]
    fn debug_redacts_token() {
        let rendered = format!("{:?}", Identity::new(user("1"), "super-secret"));
        assert!(!rendered.contains("super-secret"));
        assert!(rendered.contains("REDACTED"));
    }
}
