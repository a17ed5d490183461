//! Credential service abstraction.
//!
//! Login and settings retrieval happen over a separate HTTPS surface, not
//! the LOCO socket. The facade only needs the two calls below, so they are
//! behind a trait and the concrete transport is injected by the consumer.
//! Tests substitute a mock.

use async_trait::async_trait;

use crate::error::ClientError;

/// Status code the credential service uses for success.
pub const AUTH_STATUS_OK: i32 = 0;

/// A login request form. `device_uuid` and `client_name` identify this
/// installation; `forced` evicts an existing session on another device.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoginForm {
    pub email: String,
    pub password: String,
    pub device_uuid: String,
    pub client_name: String,
    pub forced: bool,
}

/// Token material returned by a successful credential exchange.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AccessCredential {
    pub access_token: String,
    pub refresh_token: Option<String>,
    pub device_uuid: String,
}

/// Account settings fetched after the credential exchange: the client
/// user's display profile.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClientSettings {
    pub nickname: String,
    pub profile_image_url: Option<String>,
    pub background_image_url: Option<String>,
}

/// An envelope from the credential service: a status code plus, on success,
/// the typed payload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ApiResponse<T> {
    pub status: i32,
    pub payload: Option<T>,
}

impl<T> ApiResponse<T> {
    /// A successful response carrying `payload`.
    pub fn ok(payload: T) -> ApiResponse<T> {
        ApiResponse {
            status: AUTH_STATUS_OK,
            payload: Some(payload),
        }
    }

    /// A failed response with the service's status code and no payload.
    pub fn failure(status: i32) -> ApiResponse<T> {
        ApiResponse {
            status,
            payload: None,
        }
    }

    pub fn is_ok(&self) -> bool {
        self.status == AUTH_STATUS_OK
    }
}

/// The two credential-service calls the login sequence performs.
///
/// Errors from this trait are transport-level failures; a service-level
/// rejection travels as a non-zero [`ApiResponse::status`].
#[cfg_attr(any(test, feature = "test-support"), mockall::automock)]
#[async_trait]
pub trait AuthApi: Send + Sync {
    /// Exchanges account credentials for an access token.
    async fn request_login(
        &self,
        form: LoginForm,
    ) -> Result<ApiResponse<AccessCredential>, ClientError>;

    /// Fetches account settings newer than `since_version`. The login
    /// sequence passes 0 to get the full snapshot.
    async fn request_more_settings(
        &self,
        since_version: i32,
    ) -> Result<ApiResponse<ClientSettings>, ClientError>;
}
