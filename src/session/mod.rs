// Session module
// Holds the signed-in visitor's bearer token, user id and role

pub mod backend;
pub mod error;
pub mod models;
pub mod store;

pub use backend::{FileBackend, MemoryBackend, SessionBackend};
pub use error::{SessionError, StoreError, StoreResult};
pub use models::{Role, Session, StoredSession};
pub use store::{SessionEvent, SessionView, TokenStore};
