use serde::{Deserialize, Serialize};
use std::fmt;

use crate::error::TaskError;

/// Stable identifier of the signed-in user. Every persisted task is scoped by it.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct UserId(String);

impl UserId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for UserId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Identity {
    pub user_id: UserId,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
}

impl Identity {
    pub fn new(user_id: impl Into<String>) -> Self {
        Self {
            user_id: UserId::new(user_id),
            email: None,
        }
    }

    pub fn with_email(mut self, email: impl Into<String>) -> Self {
        self.email = Some(email.into());
        self
    }
}

/// The current session: either signed in as one identity or anonymous.
#[derive(Debug, Clone, Default)]
pub struct Session {
    identity: Option<Identity>,
}

impl Session {
    pub fn anonymous() -> Self {
        Self { identity: None }
    }

    pub fn signed_in(identity: Identity) -> Self {
        Self { identity: Some(identity) }
    }

    pub fn identity(&self) -> Option<&Identity> {
        self.identity.as_ref()
    }

    /// The identity, or `Unauthenticated` when nobody is signed in.
    pub fn require(&self) -> Result<&Identity, TaskError> {
        self.identity.as_ref().ok_or(TaskError::Unauthenticated)
    }

    pub fn sign_in(&mut self, identity: Identity) {
        tracing::info!(user_id = %identity.user_id, "signed in");
        self.identity = Some(identity);
    }

    pub fn sign_out(&mut self) -> Option<Identity> {
        let previous = self.identity.take();
        if let Some(ref identity) = previous {
            tracing::info!(user_id = %identity.user_id, "signed out");
        }
        previous
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_anonymous_session_is_rejected() {
        let session = Session::anonymous();
        assert!(matches!(session.require(), Err(TaskError::Unauthenticated)));
    }

    #[test]
    fn test_sign_in_and_out() {
        let mut session = Session::anonymous();
        session.sign_in(Identity::new("U1").with_email("u1@example.com"));
        assert_eq!(session.require().unwrap().user_id.as_str(), "U1");

        let previous = session.sign_out().unwrap();
        assert_eq!(previous.email.as_deref(), Some("u1@example.com"));
        assert!(session.identity().is_none());
        assert!(session.sign_out().is_none());
    }
}
