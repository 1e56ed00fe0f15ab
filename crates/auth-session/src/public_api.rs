//! Unauthenticated auth endpoints: OTP login, signup and the refresh
//! exchange. None of these attach a bearer credential or trigger a refresh.

use crate::error::RefreshCause;
use crate::transport::{ApiRequest, ApiResponse, HttpTransport};
use crate::{AuthError, AuthResult};
use credential_storage::UserProfile;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::sync::Arc;
use tracing::{debug, info, warn};

pub const SEND_OTP_PATH: &str = "/auth/send-otp/";
pub const VERIFY_OTP_PATH: &str = "/auth/verify-otp/";
pub const REGISTER_PATH: &str = "/auth/register/";
/// Revokes a refresh credential. Protected: sent through the authenticated client.
pub const LOGOUT_PATH: &str = "/auth/log-out/";

const UNREACHABLE_MESSAGE: &str = "Unable to reach the server.";

#[derive(Debug, Serialize)]
struct SendOtpBody<'a> {
    phone: &'a str,
    #[serde(rename = "recaptchaToken")]
    recaptcha_token: &'a str,
}

#[derive(Debug, Serialize)]
struct VerifyOtpBody<'a> {
    code: &'a str,
    #[serde(rename = "sessionInfo")]
    session_info: &'a str,
}

#[derive(Debug, Serialize)]
struct RefreshBody<'a> {
    refresh: &'a str,
}

/// Handle for an OTP sent to a phone number.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OtpSession {
    #[serde(rename = "sessionInfo")]
    pub session_info: String,
}

/// Credentials and profile returned by a successful OTP verification.
#[derive(Clone, Deserialize)]
pub struct LoginTokens {
    pub access: String,
    pub refresh: String,
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub full_name: Option<String>,
    #[serde(default)]
    pub phone_number: Option<String>,
}

impl LoginTokens {
    pub fn profile(&self) -> UserProfile {
        UserProfile {
            email: self.email.clone(),
            full_name: self.full_name.clone(),
            phone_number: self.phone_number.clone(),
        }
    }
}

impl std::fmt::Debug for LoginTokens {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LoginTokens")
            .field("email", &self.email)
            .field("full_name", &self.full_name)
            .field("phone_number", &self.phone_number)
            .finish_non_exhaustive()
    }
}

/// New account details.
#[derive(Debug, Clone, Serialize)]
pub struct SignupRequest {
    pub full_name: String,
    pub email: String,
    pub phone_number: String,
    pub password: String,
    pub confirm_password: String,
}

/// Refresh exchange result. A missing `refresh` means the old one stays valid.
#[derive(Clone, Deserialize)]
pub struct RefreshedTokens {
    pub access: String,
    #[serde(default)]
    pub refresh: Option<String>,
}

impl std::fmt::Debug for RefreshedTokens {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RefreshedTokens")
            .field("rotated", &self.refresh.is_some())
            .finish_non_exhaustive()
    }
}

/// Client for endpoints that do not require a session.
#[derive(Clone)]
pub struct PublicApi {
    transport: Arc<dyn HttpTransport>,
    refresh_path: String,
}

impl PublicApi {
    pub fn new(transport: Arc<dyn HttpTransport>, refresh_path: impl Into<String>) -> Self {
        Self {
            transport,
            refresh_path: refresh_path.into(),
        }
    }

    pub fn refresh_path(&self) -> &str {
        &self.refresh_path
    }

    async fn post(&self, path: &str, body: Value, fallback: &str) -> AuthResult<ApiResponse> {
        let request = ApiRequest::post(path).with_json(body);
        let response = self.transport.send(&request).await.map_err(|e| {
            warn!(path, error = %e, "Auth endpoint unreachable");
            AuthError::Network(UNREACHABLE_MESSAGE.to_string())
        })?;

        if !response.is_success() {
            let message = response
                .server_message()
                .unwrap_or_else(|| fallback.to_string());
            debug!(path, status = response.status.as_u16(), %message, "Auth endpoint rejected request");
            return Err(AuthError::Api {
                status: response.status.as_u16(),
                message,
            });
        }

        Ok(response)
    }

    /// Ask the server to text a one-time code to `phone`.
    pub async fn send_otp(&self, phone: &str, recaptcha_token: &str) -> AuthResult<OtpSession> {
        let body = serde_json::to_value(SendOtpBody {
            phone,
            recaptcha_token,
        })?;
        let session: OtpSession = self
            .post(SEND_OTP_PATH, body, "Failed to send OTP")
            .await?
            .json()?;

        info!("OTP sent");
        Ok(session)
    }

    /// Exchange a one-time code for a credential pair.
    pub async fn verify_otp(&self, code: &str, session_info: &str) -> AuthResult<LoginTokens> {
        let body = serde_json::to_value(VerifyOtpBody { code, session_info })?;
        let tokens: LoginTokens = self
            .post(VERIFY_OTP_PATH, body, "Invalid OTP")
            .await?
            .json()?;

        info!("OTP verified");
        Ok(tokens)
    }

    /// Create an account. Returns the server's response body.
    pub async fn register(&self, signup: &SignupRequest) -> AuthResult<Value> {
        let body = serde_json::to_value(signup)?;
        let created: Value = self.post(REGISTER_PATH, body, "Signup failed").await?.json()?;

        info!("Account registered");
        Ok(created)
    }

    /// One refresh exchange. Never retries.
    pub async fn refresh_token(&self, refresh_token: &str) -> Result<RefreshedTokens, RefreshCause> {
        let body = serde_json::to_value(RefreshBody {
            refresh: refresh_token,
        })
        .map_err(|e| RefreshCause::MalformedResponse(e.to_string()))?;
        let request = ApiRequest::post(self.refresh_path.as_str()).with_json(body);

        let response = self
            .transport
            .send(&request)
            .await
            .map_err(|e| RefreshCause::Network(e.to_string()))?;

        if !response.is_success() {
            return Err(RefreshCause::Rejected {
                status: response.status.as_u16(),
                message: response.error_message(),
            });
        }

        let tokens: RefreshedTokens = serde_json::from_slice(&response.body)
            .map_err(|e| RefreshCause::MalformedResponse(e.to_string()))?;
        if tokens.access.is_empty() {
            return Err(RefreshCause::MalformedResponse(
                "empty access credential".to_string(),
            ));
        }

        Ok(tokens)
    }
}
