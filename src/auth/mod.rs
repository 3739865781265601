// Authentication state module
// Resolves whether the visitor is signed in, and with which role

pub mod resolver;
pub mod state;

// Re-export commonly used types
pub use resolver::{AuthResolver, SessionValidator, Validation};
pub use state::{AuthPhase, AuthState};
