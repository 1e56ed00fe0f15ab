//! Subcommand handlers. Each prints one JSON document to stdout.

use anyhow::Context;
use auth_session::{AuthError, AuthSession, AuthSnapshot, SignupRequest, UserProfile};
use serde_json::{json, Value};
use tracing::info;

fn print_json(value: &Value) -> anyhow::Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

/// Status document. Credential values are never printed.
pub fn status_json(snapshot: &AuthSnapshot) -> Value {
    json!({
        "authenticated": snapshot.is_authenticated,
        "loading": snapshot.is_loading,
        "state": snapshot.phase,
        "has_access_token": snapshot.credentials.access_token.is_some(),
        "has_refresh_token": snapshot.credentials.refresh_token.is_some(),
        "user": snapshot.user,
    })
}

pub fn status(session: &AuthSession) -> anyhow::Result<()> {
    print_json(&status_json(&session.current_auth_state()))
}

pub fn login(
    session: &AuthSession,
    access_token: &str,
    refresh_token: &str,
    email: Option<String>,
    full_name: Option<String>,
    phone_number: Option<String>,
) -> anyhow::Result<()> {
    let user = if email.is_some() || full_name.is_some() || phone_number.is_some() {
        Some(UserProfile {
            email,
            full_name,
            phone_number,
        })
    } else {
        None
    };

    session.login_succeeded(access_token, refresh_token, user);
    print_json(&status_json(&session.current_auth_state()))
}

pub async fn send_otp(session: &AuthSession, phone: &str, recaptcha_token: &str) -> anyhow::Result<()> {
    let otp = session.send_otp(phone, recaptcha_token).await?;
    print_json(&json!({ "session_info": otp.session_info }))
}

pub async fn verify_otp(session: &AuthSession, code: &str, session_info: &str) -> anyhow::Result<()> {
    let snapshot = session.verify_otp(code, session_info).await?;
    print_json(&status_json(&snapshot))
}

pub async fn signup(
    session: &AuthSession,
    full_name: String,
    email: String,
    phone_number: String,
    password: String,
) -> anyhow::Result<()> {
    let request = SignupRequest {
        full_name,
        email,
        phone_number,
        confirm_password: password.clone(),
        password,
    };
    let created = session.register(&request).await?;
    info!("Signup completed");
    print_json(&created)
}

pub async fn get(session: &AuthSession, path: &str) -> anyhow::Result<()> {
    session.require_session()?;
    let body: Value = session.get_json(path).await?;
    print_json(&body)
}

pub async fn post(session: &AuthSession, path: &str, data: &str) -> anyhow::Result<()> {
    session.require_session()?;
    let body: Value = serde_json::from_str(data).context("--data is not valid JSON")?;
    let response: Value = session.post_json(path, &body).await?;
    print_json(&response)
}

pub async fn refresh(session: &AuthSession) -> anyhow::Result<()> {
    session.require_session()?;
    session.refresh().await?;
    print_json(&status_json(&session.current_auth_state()))
}

/// Revoke the session server-side and forget it locally. With `local_only`
/// the server is not contacted.
pub async fn logout(session: &AuthSession, local_only: bool) -> anyhow::Result<()> {
    let message = if local_only {
        session.logout();
        "Logged out locally".to_string()
    } else {
        session.logout_remote().await?
    };

    let mut status = status_json(&session.current_auth_state());
    status["message"] = json!(message);
    print_json(&status)
}

/// Hint for failures worth retrying as-is.
pub fn retry_hint(err: &anyhow::Error) -> Option<&'static str> {
    err.downcast_ref::<AuthError>()
        .filter(|e| e.is_transient())
        .map(|_| "The server is unreachable or failing. Try again shortly.")
}

#[cfg(test)]
mod tests {
    use super::*;
    use auth_session::{AuthPhase, SessionOptions};
    use credential_storage::{CredentialVault, MemoryKv};
    use std::sync::Arc;

    fn offline_session() -> AuthSession {
        let config = client_config::Config::default();
        let session = AuthSession::from_config(
            &config,
            CredentialVault::new(Arc::new(MemoryKv::new())),
            None,
        )
        .unwrap();
        session.hydrate();
        session
    }

    #[test]
    fn test_status_json_hides_credentials() {
        let session = offline_session();
        session.login_succeeded("secret-access", "secret-refresh", None);

        let status = status_json(&session.current_auth_state());
        let rendered = status.to_string();

        assert_eq!(status["authenticated"], true);
        assert_eq!(status["state"], json!(AuthPhase::LoggedIn));
        assert_eq!(status["has_refresh_token"], true);
        assert!(!rendered.contains("secret-access"));
        assert!(!rendered.contains("secret-refresh"));
    }

    #[test]
    fn test_login_with_profile() {
        let session = offline_session();
        login(
            &session,
            "a-1",
            "r-1",
            Some("ada@example.com".to_string()),
            None,
            None,
        )
        .unwrap();

        let state = session.current_auth_state();
        assert!(state.is_authenticated);
        assert_eq!(
            state.user.and_then(|u| u.email).as_deref(),
            Some("ada@example.com")
        );
    }

    #[tokio::test]
    async fn test_logout_clears() {
        let session = offline_session();
        login(&session, "a-1", "r-1", None, None, None).unwrap();
        logout(&session, true).await.unwrap();

        let status = status_json(&session.current_auth_state());
        assert_eq!(status["authenticated"], false);
        assert_eq!(status["user"], Value::Null);
    }

    #[tokio::test]
    async fn test_get_requires_session() {
        let session = offline_session();
        let err = get(&session, "/profile/").await.unwrap_err();
        assert_eq!(err.to_string(), "Not logged in");
    }

    #[test]
    fn test_retry_hint_only_for_transient_failures() {
        let offline: anyhow::Error = AuthError::Network("connection refused".to_string()).into();
        assert!(retry_hint(&offline).is_some());

        let server: anyhow::Error = AuthError::Api {
            status: 503,
            message: "Maintenance".to_string(),
        }
        .into();
        assert!(retry_hint(&server).is_some());

        assert!(retry_hint(&AuthError::NotLoggedIn.into()).is_none());
        assert!(retry_hint(&anyhow::anyhow!("--data is not valid JSON")).is_none());
    }

    #[test]
    fn test_default_options_match_config() {
        let options = SessionOptions::from_config(&client_config::Config::default());
        assert_eq!(options.refresh_path, client_config::DEFAULT_REFRESH_PATH);
    }
}
