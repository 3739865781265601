// Session data model: roles, the session tuple and its stored form

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::session::error::SessionError;

/// Storage key for the bearer token
pub const TOKEN_KEY: &str = "auth_token";
/// Storage key for the user id
pub const USER_ID_KEY: &str = "id";
/// Storage key for the role
pub const ROLE_KEY: &str = "role";

/// Closed set of roles a visitor can hold
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    /// Full back-office access
    Admin,
    /// Dive shop staff
    Staff,
    /// Customer booking trips and courses
    Client,
}

impl Role {
    /// Every role, in privilege order
    pub const ALL: [Role; 3] = [Role::Admin, Role::Staff, Role::Client];

    /// Convert role to its wire representation
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::Admin => "admin",
            Role::Staff => "staff",
            Role::Client => "client",
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl std::str::FromStr for Role {
    type Err = SessionError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "admin" => Ok(Role::Admin),
            "staff" => Ok(Role::Staff),
            "client" => Ok(Role::Client),
            _ => Err(SessionError::InvalidRole(s.to_string())),
        }
    }
}

/// Signed-in visitor: opaque bearer token, user id and role
///
/// The token is never empty; construct through [`Session::new`].
#[derive(Clone, PartialEq, Eq)]
pub struct Session {
    token: String,
    user_id: String,
    role: Role,
}

impl Session {
    /// Create a session, rejecting an empty token
    pub fn new(
        token: impl Into<String>,
        user_id: impl Into<String>,
        role: Role,
    ) -> Result<Self, SessionError> {
        let token = token.into();
        if token.trim().is_empty() {
            return Err(SessionError::EmptyToken);
        }

        Ok(Self {
            token,
            user_id: user_id.into(),
            role,
        })
    }

    pub fn token(&self) -> &str {
        &self.token
    }

    pub fn user_id(&self) -> &str {
        &self.user_id
    }

    pub fn role(&self) -> Role {
        self.role
    }

    /// Same session with the role replaced by a server-confirmed one
    pub fn with_role(&self, role: Role) -> Self {
        Self {
            role,
            ..self.clone()
        }
    }
}

// Keep the credential out of logs and panic messages
impl fmt::Debug for Session {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Session")
            .field("token", &"<redacted>")
            .field("user_id", &self.user_id)
            .field("role", &self.role)
            .finish()
    }
}

/// Persisted key-value document
///
/// Fields are optional so that partially written or hand-edited documents
/// read back as "no session" instead of failing.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct StoredSession {
    #[serde(rename = "auth_token", default, skip_serializing_if = "Option::is_none")]
    pub auth_token: Option<String>,
    #[serde(rename = "id", default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    #[serde(rename = "role", default, skip_serializing_if = "Option::is_none")]
    pub role: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub saved_at: Option<DateTime<Utc>>,
}

impl StoredSession {
    /// Stored form of a session, stamped with the current time
    pub fn from_session(session: &Session) -> Self {
        Self {
            auth_token: Some(session.token.clone()),
            id: Some(session.user_id.clone()),
            role: Some(session.role.to_string()),
            saved_at: Some(Utc::now()),
        }
    }

    /// Rebuild a session; any missing or invalid field yields `None`
    pub fn into_session(self) -> Option<Session> {
        let role = self.role?.parse::<Role>().ok()?;
        Session::new(self.auth_token?, self.id?, role).ok()
    }
}
