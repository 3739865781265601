// Authenticated request layer

pub mod client;
pub mod error;
pub mod models;

pub use client::ApiClient;
pub use error::{ApiError, ApiResult};
pub use models::{ApiResponse, Credentials, CurrentUser, SignInResponse};
