// Navigator: applies the route table and guards to a requested location

use serde::Serialize;
use std::fmt;
use std::sync::Arc;

use crate::auth::{AuthResolver, AuthState};
use crate::config::NavigationConfig;
use crate::guard::redirect::{return_destination, GuardOutcome, Redirect};
use crate::guard::routes::{normalize, Access, RouteTable};
use crate::guard::RequireAuth;
use crate::session::Role;

/// Prefix of the role-specific dashboard area
pub const DASHBOARD_PREFIX: &str = "/dashboard";

/// Dashboard shell chosen from the visitor's current role
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Layout {
    AdminLayout,
    StaffLayout,
    ClientLayout,
}

impl Layout {
    pub fn for_role(role: Role) -> Self {
        match role {
            Role::Admin => Layout::AdminLayout,
            Role::Staff => Layout::StaffLayout,
            Role::Client => Layout::ClientLayout,
        }
    }
}

impl fmt::Display for Layout {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Layout::AdminLayout => "admin",
            Layout::StaffLayout => "staff",
            Layout::ClientLayout => "client",
        };
        write!(f, "{}", name)
    }
}

/// Result of visiting a location
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Visit {
    pub location: String,
    #[serde(flatten)]
    pub outcome: GuardOutcome,
    /// Dashboard shell, only for rendered dashboard pages
    #[serde(skip_serializing_if = "Option::is_none")]
    pub layout: Option<Layout>,
}

/// Applies route declarations to the resolver's current state
pub struct Navigator {
    resolver: Arc<AuthResolver>,
    routes: RouteTable,
    navigation: NavigationConfig,
}

impl Navigator {
    pub fn new(resolver: Arc<AuthResolver>, routes: RouteTable, navigation: NavigationConfig) -> Self {
        Self {
            resolver,
            routes,
            navigation,
        }
    }

    pub fn resolver(&self) -> &Arc<AuthResolver> {
        &self.resolver
    }

    pub fn routes(&self) -> &RouteTable {
        &self.routes
    }

    /// Evaluate a location against the latest auth state
    pub fn visit(&self, location: &str) -> Visit {
        self.visit_with(&self.resolver.state(), location)
    }

    /// Evaluate a location once the auth state has settled
    pub async fn visit_settled(&self, location: &str) -> Visit {
        let state = self.resolver.settled().await;
        self.visit_with(&state, location)
    }

    /// Evaluate a location against an explicit state
    ///
    /// The layout is derived from `state` on every call so that a role
    /// change is reflected on the next navigation.
    pub fn visit_with(&self, state: &AuthState, location: &str) -> Visit {
        let outcome = match self.routes.access_for(location) {
            Access::Public => GuardOutcome::Render,
            Access::Protected(roles) => {
                let guard = match roles {
                    Some(roles) => RequireAuth::with_roles(roles.clone()),
                    None => RequireAuth::new(),
                };
                guard.check(state, location, &self.navigation)
            }
        };

        let layout = match (&outcome, state.role) {
            (GuardOutcome::Render, Some(role)) if is_dashboard(location) => Some(Layout::for_role(role)),
            _ => None,
        };

        Visit {
            location: location.to_string(),
            outcome,
            layout,
        }
    }

    /// Redirect after a successful sign-in, consuming the `returnTo` intent
    pub fn after_sign_in(&self, sign_in_query: &str) -> Redirect {
        Redirect::replace(return_destination(
            sign_in_query,
            &self.navigation.sign_in_path,
        ))
    }
}

fn is_dashboard(location: &str) -> bool {
    let path = normalize(location).to_ascii_lowercase();
    path == DASHBOARD_PREFIX || path.starts_with("/dashboard/")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::session::{Session, TokenStore};

    async fn navigator_with(session: Option<Session>) -> Navigator {
        let store = TokenStore::in_memory();
        if let Some(session) = session {
            store.save(session).await.unwrap();
        }
        let resolver = Arc::new(AuthResolver::new(store));
        resolver.resolve().await;
        Navigator::new(
            resolver,
            RouteTable::dive_shop().unwrap(),
            NavigationConfig::default(),
        )
    }

    fn staff() -> Session {
        Session::new("abc", "7", Role::Staff).unwrap()
    }

    #[tokio::test]
    async fn test_public_route_renders_for_anyone() {
        let navigator = navigator_with(None).await;
        let visit = navigator.visit("/courses/open-water");
        assert_eq!(visit.outcome, GuardOutcome::Render);
        assert_eq!(visit.layout, None);
    }

    #[tokio::test]
    async fn test_empty_store_redirects_to_sign_in() {
        let navigator = navigator_with(None).await;
        let visit = navigator.visit("/dashboard/staff/list");
        assert_eq!(
            visit.outcome.redirect_location(),
            Some("/auth/sign-in?returnTo=%2Fdashboard%2Fstaff%2Flist")
        );
    }

    #[tokio::test]
    async fn test_staff_scenarios() {
        let navigator = navigator_with(Some(staff())).await;

        let admin_only = navigator.visit("/dashboard/admin/courses");
        assert_eq!(admin_only.outcome, GuardOutcome::Redirect(Redirect::replace("/forbidden")));
        assert_eq!(admin_only.layout, None);

        let staff_area = navigator.visit("/dashboard/staff/list");
        assert_eq!(staff_area.outcome, GuardOutcome::Render);
        assert_eq!(staff_area.layout, Some(Layout::StaffLayout));

        let booking = navigator.visit("/bookings/31");
        assert_eq!(booking.outcome, GuardOutcome::Render);
        assert_eq!(booking.layout, None);
    }

    #[tokio::test]
    async fn test_layout_follows_role_changes() {
        let navigator = navigator_with(Some(staff())).await;
        assert_eq!(navigator.visit("/dashboard").layout, Some(Layout::StaffLayout));

        let (_, generation) = navigator.resolver().store().snapshot().await;
        navigator
            .resolver()
            .store()
            .confirm_role(generation, Role::Admin)
            .await
            .unwrap();

        assert_eq!(navigator.visit("/dashboard").layout, Some(Layout::AdminLayout));
    }

    #[tokio::test]
    async fn test_visit_before_resolution_is_loading() {
        let store = TokenStore::in_memory();
        store.save(staff()).await.unwrap();
        let navigator = Navigator::new(
            Arc::new(AuthResolver::new(store)),
            RouteTable::dive_shop().unwrap(),
            NavigationConfig::default(),
        );

        assert_eq!(navigator.visit("/dashboard").outcome, GuardOutcome::Loading);
        // Public pages never wait on auth
        assert_eq!(navigator.visit("/gallery").outcome, GuardOutcome::Render);
    }

    #[tokio::test]
    async fn test_path_variants_are_guarded() {
        let navigator = navigator_with(None).await;
        for location in [
            "/Dashboard/admin/users",
            "/dashboard//admin/users",
            "//dashboard/admin",
            "/dashboard/%61dmin/users",
        ] {
            let visit = navigator.visit(location);
            assert!(
                matches!(visit.outcome, GuardOutcome::Redirect(_)),
                "{} rendered for an anonymous visitor",
                location
            );
        }
    }

    #[tokio::test]
    async fn test_invalidation_reaches_guards_immediately() {
        let navigator = navigator_with(Some(staff())).await;
        assert_eq!(navigator.visit("/dashboard/staff/list").outcome, GuardOutcome::Render);

        navigator.resolver().store().invalidate().await.unwrap();
        assert_eq!(
            navigator.visit("/dashboard/staff/list").outcome.redirect_location(),
            Some("/auth/sign-in?returnTo=%2Fdashboard%2Fstaff%2Flist")
        );
    }

    #[tokio::test]
    async fn test_after_sign_in_consumes_return_to() {
        let navigator = navigator_with(None).await;
        assert_eq!(
            navigator.after_sign_in("returnTo=%2Fdashboard%2Fstaff%2Flist"),
            Redirect::replace("/dashboard/staff/list")
        );
        assert_eq!(navigator.after_sign_in(""), Redirect::replace("/"));
    }

    #[test]
    fn test_is_dashboard() {
        assert!(is_dashboard("/dashboard"));
        assert!(is_dashboard("/dashboard/admin?x=1"));
        assert!(is_dashboard("/Dashboard//staff"));
        assert!(!is_dashboard("/dashboards"));
        assert!(!is_dashboard("/profile"));
    }
}
