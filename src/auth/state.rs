// Auth state derived from the token store

use serde::Serialize;

use crate::session::Role;

/// Phase of the auth state machine
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuthPhase {
    /// Store not read yet, or validation still pending
    Initializing,
    /// Session present and, when validation is on, confirmed by the server
    Authenticated(Role),
    /// No session, or the server rejected it
    Unauthenticated,
}

/// Snapshot consumed by guards and UI: `{ authenticated, loading, role }`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct AuthState {
    pub authenticated: bool,
    pub loading: bool,
    pub role: Option<Role>,
}

impl AuthState {
    pub fn initializing() -> Self {
        AuthPhase::Initializing.into()
    }

    pub fn authenticated(role: Role) -> Self {
        AuthPhase::Authenticated(role).into()
    }

    pub fn unauthenticated() -> Self {
        AuthPhase::Unauthenticated.into()
    }

    pub fn phase(&self) -> AuthPhase {
        match (self.loading, self.authenticated, self.role) {
            (true, _, _) => AuthPhase::Initializing,
            (false, true, Some(role)) => AuthPhase::Authenticated(role),
            // Authenticated without a role cannot be authorized; treat as signed out
            _ => AuthPhase::Unauthenticated,
        }
    }

    pub fn is_settled(&self) -> bool {
        !self.loading
    }
}

impl From<AuthPhase> for AuthState {
    fn from(phase: AuthPhase) -> Self {
        match phase {
            AuthPhase::Initializing => AuthState {
                authenticated: false,
                loading: true,
                role: None,
            },
            AuthPhase::Authenticated(role) => AuthState {
                authenticated: true,
                loading: false,
                role: Some(role),
            },
            AuthPhase::Unauthenticated => AuthState {
                authenticated: false,
                loading: false,
                role: None,
            },
        }
    }
}
