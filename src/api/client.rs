// Authenticated HTTP client for the booking REST API
//
// Every outbound call goes through `ApiClient::request`, which attaches
// the bearer token and clears the token store on a 401 before handing the
// failure back to the caller

use async_trait::async_trait;
use reqwest::{Client, Method, StatusCode};
use serde::de::DeserializeOwned;
use serde::Serialize;
use sha2::{Digest, Sha256};
use std::sync::Arc;
use tracing::{debug, info, warn};
use uuid::Uuid;
use validator::Validate;

use super::error::{ApiError, ApiResult};
use super::models::{ApiResponse, Credentials, CurrentUser, SignInResponse};
use crate::auth::{SessionValidator, Validation};
use crate::config::AppConfig;
use crate::session::{Session, TokenStore};

/// Header carrying a per-request correlation id
pub const REQUEST_ID_HEADER: &str = "x-request-id";

/// Client for the booking REST API
#[derive(Clone)]
pub struct ApiClient {
    /// HTTP client
    client: Client,
    /// Base URL (e.g., "http://localhost:8080")
    base_url: String,
    /// Sign-in endpoint path
    login_endpoint: String,
    /// Current-user endpoint path
    current_user_endpoint: String,
    /// Shared session store
    store: Arc<TokenStore>,
}

impl ApiClient {
    /// Create a client from configuration
    pub fn new(config: &AppConfig, store: Arc<TokenStore>) -> ApiResult<Self> {
        let client = Client::builder()
            .timeout(config.request_timeout())
            .build()
            .map_err(|e| ApiError::Client(e.to_string()))?;

        Ok(Self {
            client,
            base_url: config.server_url.trim_end_matches('/').to_string(),
            login_endpoint: config.login_endpoint.clone(),
            current_user_endpoint: config.current_user_endpoint.clone(),
            store,
        })
    }

    pub fn store(&self) -> &Arc<TokenStore> {
        &self.store
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Send a request and return the response unchanged unless it is a 401
    ///
    /// A 401 invalidates the session the request was sent with, then yields
    /// [`ApiError::Unauthenticated`]. A session saved while the request was
    /// in flight is kept. Transport failures yield [`ApiError::Network`] and
    /// leave the session alone
    pub async fn request<B>(&self, method: Method, path: &str, body: Option<&B>) -> ApiResult<ApiResponse>
    where
        B: Serialize + ?Sized,
    {
        let url = self.url(path);
        let request_id = Uuid::new_v4();

        let mut builder = self
            .client
            .request(method.clone(), &url)
            .header(REQUEST_ID_HEADER, request_id.to_string());

        let (session, generation) = self.store.snapshot().await;
        match session {
            Some(session) => {
                debug!(
                    "{} {} [{}] as user {} (token {})",
                    method,
                    path,
                    request_id,
                    session.user_id(),
                    fingerprint(session.token())
                );
                builder = builder.bearer_auth(session.token());
            }
            None => debug!("{} {} [{}] without session", method, path, request_id),
        }

        if let Some(body) = body {
            builder = builder.json(body);
        }

        let response = builder.send().await.map_err(|e| {
            warn!("{} {} [{}] failed: {}", method, path, request_id, e);
            ApiError::Network {
                url: url.clone(),
                message: e.to_string(),
            }
        })?;

        let status = response.status();
        if status == StatusCode::UNAUTHORIZED {
            warn!("{} {} [{}] rejected with 401, clearing session", method, path, request_id);
            // The store must be empty before anyone sees the error
            match self.store.invalidate_if(generation).await {
                Ok(true) => {}
                Ok(false) => debug!("[{}] session replaced while in flight, keeping it", request_id),
                Err(e) => warn!("Failed to persist session invalidation: {}", e),
            }
            return Err(ApiError::Unauthenticated);
        }

        let body = response.text().await.map_err(|e| ApiError::Network {
            url: url.clone(),
            message: e.to_string(),
        })?;

        debug!("{} {} [{}] -> {}", method, path, request_id, status);
        Ok(ApiResponse { status, body })
    }

    /// GET a path, returning the raw response
    pub async fn get(&self, path: &str) -> ApiResult<ApiResponse> {
        self.request::<()>(Method::GET, path, None).await
    }

    /// GET a path and decode a successful JSON body
    pub async fn get_json<T: DeserializeOwned>(&self, path: &str) -> ApiResult<T> {
        self.get(path).await?.json()
    }

    /// Send a JSON body and decode a successful JSON response
    pub async fn send_json<B, T>(&self, method: Method, path: &str, body: &B) -> ApiResult<T>
    where
        B: Serialize + ?Sized,
        T: DeserializeOwned,
    {
        self.request(method, path, Some(body)).await?.json()
    }

    /// Sign in and store the resulting session
    pub async fn sign_in(&self, credentials: &Credentials) -> ApiResult<Session> {
        credentials.validate()?;

        let response: SignInResponse = self
            .send_json(Method::POST, &self.login_endpoint, credentials)
            .await?;
        let session = response.into_session()?;

        self.store.save(session.clone()).await?;
        info!("Signed in as user {} ({})", session.user_id(), session.role());
        Ok(session)
    }

    /// Sign out locally. The token is opaque, so there is nothing to revoke
    pub async fn sign_out(&self) -> ApiResult<()> {
        self.store.clear().await?;
        info!("Signed out");
        Ok(())
    }

    /// Fetch the authoritative identity for the current token
    pub async fn current_user(&self) -> ApiResult<CurrentUser> {
        self.get_json(&self.current_user_endpoint).await
    }

    fn url(&self, path: &str) -> String {
        if path.starts_with('/') {
            format!("{}{}", self.base_url, path)
        } else {
            format!("{}/{}", self.base_url, path)
        }
    }
}

#[async_trait]
impl SessionValidator for ApiClient {
    async fn validate(&self) -> Validation {
        match self.current_user().await {
            Ok(user) => Validation::Confirmed(user.role),
            Err(ApiError::Unauthenticated) => Validation::Rejected,
            // 403 on the identity endpoint means the token names nobody usable
            Err(ApiError::Status { status, .. }) if status == StatusCode::FORBIDDEN => {
                Validation::Rejected
            }
            // Unknown role in the response cannot be authorized
            Err(ApiError::Decode(message)) => {
                warn!("Unusable current-user response: {}", message);
                Validation::Rejected
            }
            Err(e) => Validation::Unreachable(e.to_string()),
        }
    }
}

/// Short digest of a token for log correlation without exposing it
pub fn fingerprint(token: &str) -> String {
    let digest = Sha256::digest(token.as_bytes());
    digest[..4].iter().map(|b| format!("{:02x}", b)).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn client_for(url: &str) -> ApiClient {
        ApiClient::new(&AppConfig::new(url), TokenStore::in_memory()).unwrap()
    }

    #[test]
    fn test_fingerprint_is_stable_and_short() {
        let a = fingerprint("abc");
        assert_eq!(a.len(), 8);
        assert_eq!(a, fingerprint("abc"));
        assert_ne!(a, fingerprint("abd"));
    }

    #[test]
    fn test_url_joining() {
        let client = client_for("http://localhost:8080/");
        assert_eq!(client.base_url(), "http://localhost:8080");
        assert_eq!(client.url("/api/trips"), "http://localhost:8080/api/trips");
        assert_eq!(client.url("api/trips"), "http://localhost:8080/api/trips");
    }

    #[tokio::test]
    async fn test_sign_in_validates_locally() {
        let client = client_for("http://127.0.0.1:9");
        let result = client.sign_in(&Credentials::new("nobody", "")).await;
        assert!(matches!(result, Err(ApiError::InvalidRequest(_))));
    }

    #[tokio::test]
    async fn test_network_failure_keeps_session() {
        // Reserve a port, then release it so nothing is listening
        let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);

        let client = client_for(&format!("http://{}", addr));
        client
            .store()
            .save(Session::new("abc", "7", crate::session::Role::Staff).unwrap())
            .await
            .unwrap();

        let result = client.get("/api/courses").await;
        assert!(matches!(result, Err(ApiError::Network { .. })));
        assert!(client.store().read().await.is_some());
    }
}
