//! Authenticated identity
//!
//! Session management owns login and token storage; this crate only consumes
//! the result as an [`Identity`].

/// Bearer token plus user id required to authorize a chat operation
#[derive(Clone, PartialEq, Eq)]
pub struct Identity {
    /// Bearer token sent in the `Authorization` header
    pub token: String,
    /// Backend user identifier
    pub user_id: String,
}

impl Identity {
    /// Create an identity
    pub fn new(token: impl Into<String>, user_id: impl Into<String>) -> Self {
        Self {
            token: token.into(),
            user_id: user_id.into(),
        }
    }

    /// Build an identity only when both parts are present and non-empty
    #[must_use]
    pub fn from_parts(token: Option<String>, user_id: Option<String>) -> Option<Self> {
        match (token, user_id) {
            (Some(token), Some(user_id)) if !token.is_empty() && !user_id.is_empty() => {
                Some(Self { token, user_id })
            }
            _ => None,
        }
    }
}

// Tokens must never reach the logs.
impl std::fmt::Debug for Identity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Identity")
            .field("token", &"<redacted>")
            .field("user_id", &self.user_id)
            .finish()
    }
}
