// Route guards
//
// Pure decision functions over an `AuthState`. A guard never fails: it
// renders, shows a loading placeholder, or redirects with history replace.

pub mod navigator;
pub mod redirect;
pub mod routes;

pub use navigator::{Layout, Navigator, Visit};
pub use redirect::{return_destination, sign_in_location, GuardOutcome, Redirect};
pub use routes::{Access, RouteError, RouteRule, RouteTable};

use tracing::{debug, warn};

use crate::auth::{AuthPhase, AuthState};
use crate::config::NavigationConfig;
use crate::session::Role;

/// Authorization guard: the visitor's role must be in a declared set
///
/// An empty set means "no restriction", never "deny all".
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RequireRole {
    allowed: Vec<Role>,
}

impl RequireRole {
    /// Create a guard allowing exactly `roles`
    pub fn new(roles: impl IntoIterator<Item = Role>) -> Self {
        let mut allowed: Vec<Role> = roles.into_iter().collect();
        allowed.sort_by_key(|role| role.as_str());
        allowed.dedup();
        Self { allowed }
    }

    /// Guard that lets every visitor through
    pub fn unrestricted() -> Self {
        Self::default()
    }

    /// Create a guard that requires the Admin role
    pub fn admin() -> Self {
        Self::new([Role::Admin])
    }

    pub fn allowed(&self) -> &[Role] {
        &self.allowed
    }

    pub fn is_unrestricted(&self) -> bool {
        self.allowed.is_empty()
    }

    /// Whether a visitor holding `role` may pass
    pub fn allows(&self, role: Option<Role>) -> bool {
        if self.is_unrestricted() {
            return true;
        }
        match role {
            Some(role) => self.allowed.contains(&role),
            None => false,
        }
    }

    /// Decide for the given state
    pub fn check(&self, state: &AuthState, navigation: &NavigationConfig) -> GuardOutcome {
        if state.loading {
            return GuardOutcome::Loading;
        }

        if self.allows(state.role) {
            return GuardOutcome::Render;
        }

        warn!(
            "Authorization failed: role={:?}, allowed={:?}",
            state.role, self.allowed
        );
        GuardOutcome::Redirect(Redirect::replace(navigation.forbidden_path.clone()))
    }
}

/// Authentication guard, optionally composed with a [`RequireRole`]
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RequireAuth {
    roles: Option<RequireRole>,
}

impl RequireAuth {
    /// Any signed-in visitor
    pub fn new() -> Self {
        Self::default()
    }

    /// Signed-in visitors passing `roles`
    pub fn with_roles(roles: RequireRole) -> Self {
        Self { roles: Some(roles) }
    }

    pub fn roles(&self) -> Option<&RequireRole> {
        self.roles.as_ref()
    }

    /// Decide for a visitor attempting `location` (path plus optional query)
    pub fn check(
        &self,
        state: &AuthState,
        location: &str,
        navigation: &NavigationConfig,
    ) -> GuardOutcome {
        match state.phase() {
            AuthPhase::Initializing => GuardOutcome::Loading,
            AuthPhase::Unauthenticated => {
                debug!("Unauthenticated visit to {}, redirecting to sign-in", location);
                GuardOutcome::Redirect(Redirect::replace(sign_in_location(
                    &navigation.sign_in_path,
                    location,
                )))
            }
            AuthPhase::Authenticated(_) => match &self.roles {
                Some(roles) => roles.check(state, navigation),
                None => GuardOutcome::Render,
            },
        }
    }
}
