// Client-side authentication gate for the dive shop booking front end
//
// - session: durable token store shared by everything below
// - api: authenticated request layer; a 401 clears the session
// - auth: resolves { authenticated, loading, role } from the store
// - guard: route table, authentication and authorization guards

pub mod api;
pub mod auth;
pub mod config;
pub mod gate;
pub mod guard;
pub mod session;

pub use api::{ApiClient, ApiError, ApiResponse, Credentials};
pub use auth::{AuthPhase, AuthResolver, AuthState};
pub use config::{AppConfig, NavigationConfig};
pub use gate::{AuthGate, GateError};
pub use guard::{GuardOutcome, Layout, Navigator, Redirect, RequireAuth, RequireRole, RouteTable};
pub use session::{Role, Session, SessionEvent, TokenStore};
