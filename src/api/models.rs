// Request and response shapes exchanged with the REST API

use reqwest::StatusCode;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Deserializer, Serialize};
use validator::Validate;

use super::error::{ApiError, ApiResult};
use crate::session::{Role, Session, SessionError};

/// Sign-in request body
#[derive(Debug, Clone, Serialize, Validate)]
pub struct Credentials {
    #[validate(email)]
    pub email: String,
    #[validate(length(min = 1))]
    pub password: String,
}

impl Credentials {
    pub fn new(email: impl Into<String>, password: impl Into<String>) -> Self {
        Self {
            email: email.into(),
            password: password.into(),
        }
    }
}

/// Sign-in response: `{ token, userId, role }`
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SignInResponse {
    pub token: String,
    #[serde(deserialize_with = "id_as_string")]
    pub user_id: String,
    pub role: String,
}

impl SignInResponse {
    /// Convert into a session, rejecting empty tokens and unknown roles
    pub fn into_session(self) -> Result<Session, SessionError> {
        let role = self.role.parse::<Role>()?;
        Session::new(self.token, self.user_id, role)
    }
}

/// Current-user response: `{ id, role }`
#[derive(Debug, Clone, Deserialize)]
pub struct CurrentUser {
    #[serde(deserialize_with = "id_as_string")]
    pub id: String,
    pub role: Role,
}

/// Raw response passed back unchanged for every status except 401
#[derive(Debug, Clone)]
pub struct ApiResponse {
    pub status: StatusCode,
    pub body: String,
}

impl ApiResponse {
    pub fn is_success(&self) -> bool {
        self.status.is_success()
    }

    /// Decode the body of a successful response
    ///
    /// Non-success statuses become [`ApiError::Status`]
    pub fn json<T: DeserializeOwned>(&self) -> ApiResult<T> {
        if !self.is_success() {
            return Err(ApiError::Status {
                status: self.status,
                body: self.body.clone(),
            });
        }
        serde_json::from_str(&self.body).map_err(|e| ApiError::Decode(e.to_string()))
    }
}

/// Ids arrive either as JSON strings or numbers
fn id_as_string<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum RawId {
        Text(String),
        Number(i64),
    }

    Ok(match RawId::deserialize(deserializer)? {
        RawId::Text(text) => text,
        RawId::Number(number) => number.to_string(),
    })
}
