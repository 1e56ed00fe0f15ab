//! Session facade.
//!
//! `AuthSession` wires the credential store, refresh coordinator, request
//! client and public auth API together and is the only type UI code needs.

use crate::client::{AuthenticatedClient, LogoutHook};
use crate::credential_store::{AuthSnapshot, CredentialStore, CredentialTtl};
use crate::public_api::{OtpSession, PublicApi, SignupRequest, LOGOUT_PATH};
use crate::refresh::RefreshCoordinator;
use crate::transport::{ApiRequest, ApiResponse, HttpTransport, ReqwestTransport};
use crate::{AuthError, AuthResult};
use client_config::Config;
use credential_storage::{CredentialVault, UserProfile};
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::{json, Value};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tracing::{debug, info, warn};
use uuid::Uuid;

const LOGGED_OUT_MESSAGE: &str = "Logged out successfully";

/// Tunables for a session.
#[derive(Debug, Clone)]
pub struct SessionOptions {
    pub refresh_path: String,
    pub refresh_timeout: Duration,
    pub ttl: CredentialTtl,
}

impl Default for SessionOptions {
    fn default() -> Self {
        Self {
            refresh_path: client_config::DEFAULT_REFRESH_PATH.to_string(),
            refresh_timeout: Duration::from_secs(client_config::DEFAULT_REFRESH_TIMEOUT_SECS),
            ttl: CredentialTtl::default(),
        }
    }
}

impl SessionOptions {
    pub fn from_config(config: &Config) -> Self {
        Self {
            refresh_path: config.refresh_path.clone(),
            refresh_timeout: config.refresh_timeout(),
            ttl: CredentialTtl::from_config(config),
        }
    }
}

pub struct AuthSession {
    store: Arc<CredentialStore>,
    coordinator: Arc<RefreshCoordinator>,
    client: AuthenticatedClient,
    public: PublicApi,
    on_logout: Option<LogoutHook>,
}

impl AuthSession {
    pub fn new(
        vault: CredentialVault,
        transport: Arc<dyn HttpTransport>,
        options: SessionOptions,
        on_logout: Option<LogoutHook>,
    ) -> Self {
        let store = Arc::new(CredentialStore::new(vault, options.ttl));
        let public = PublicApi::new(transport.clone(), options.refresh_path);
        let coordinator = Arc::new(RefreshCoordinator::new(
            store.clone(),
            public.clone(),
            options.refresh_timeout,
        ));

        let mut client = AuthenticatedClient::new(store.clone(), coordinator.clone(), transport);
        if let Some(hook) = &on_logout {
            client = client.with_logout_hook(hook.clone());
        }

        Self {
            store,
            coordinator,
            client,
            public,
            on_logout,
        }
    }

    /// Session talking to `config.api_base_url` over HTTP.
    pub fn from_config(
        config: &Config,
        vault: CredentialVault,
        on_logout: Option<LogoutHook>,
    ) -> AuthResult<Self> {
        let transport = Arc::new(ReqwestTransport::from_config(config)?);
        Ok(Self::new(
            vault,
            transport,
            SessionOptions::from_config(config),
            on_logout,
        ))
    }

    pub fn store(&self) -> &Arc<CredentialStore> {
        &self.store
    }

    /// Restore persisted credentials. Call once at startup.
    pub fn hydrate(&self) -> AuthSnapshot {
        self.store.hydrate()
    }

    pub fn current_auth_state(&self) -> AuthSnapshot {
        self.store.snapshot()
    }

    pub fn subscribe(&self) -> watch::Receiver<AuthSnapshot> {
        self.store.subscribe()
    }

    // ==========================================
    // Protected requests
    // ==========================================

    pub async fn authenticated_request(&self, request: ApiRequest) -> AuthResult<ApiResponse> {
        self.client.send(request).await
    }

    pub async fn execute<T: DeserializeOwned>(&self, request: ApiRequest) -> AuthResult<T> {
        self.client.execute(request).await
    }

    pub async fn get_json<T: DeserializeOwned>(&self, path: &str) -> AuthResult<T> {
        self.client.get_json(path).await
    }

    pub async fn post_json<B: Serialize + ?Sized, T: DeserializeOwned>(
        &self,
        path: &str,
        body: &B,
    ) -> AuthResult<T> {
        self.client.post_json(path, body).await
    }

    /// Refresh now instead of waiting for a 401. Joins an in-flight refresh.
    pub async fn refresh(&self) -> AuthResult<()> {
        if self.store.is_loading() {
            self.store.hydrate();
        }
        let outcome = self.coordinator.refresh_or_wait(Uuid::new_v4()).await;
        match outcome.result {
            Ok(_) => Ok(()),
            Err(err) => {
                if outcome.initiated && err.is_terminal() {
                    self.fire_logout_hook();
                }
                Err(err)
            }
        }
    }

    // ==========================================
    // Login / logout
    // ==========================================

    pub fn login_succeeded(&self, access_token: &str, refresh_token: &str, user: Option<UserProfile>) {
        self.store.set_credentials(access_token, refresh_token);
        if let Some(user) = user {
            self.store.set_user(user);
        }
        info!("Logged in");
    }

    /// Forget the session locally. See [`Self::logout_remote`] to also
    /// revoke the refresh credential.
    pub fn logout(&self) {
        self.store.clear_credentials();
        info!("Logged out");
    }

    /// Revoke the refresh credential on the server, then clear local state.
    ///
    /// Returns the server's message. Local state is cleared even when the
    /// server call fails; the failure is still returned.
    pub async fn logout_remote(&self) -> AuthResult<String> {
        if self.store.is_loading() {
            self.store.hydrate();
        }

        let Some(refresh_token) = self.store.refresh_token() else {
            debug!("No refresh credential, skipping server logout");
            self.logout();
            return Ok(LOGGED_OUT_MESSAGE.to_string());
        };

        let request = ApiRequest::post(LOGOUT_PATH).with_json(json!({ "refresh": refresh_token }));
        let result = self.client.send(request).await;
        self.logout();

        let response = result.inspect_err(|e| warn!(error = %e, "Server logout failed"))?;
        if !response.is_success() {
            let message = response.error_message();
            warn!(status = response.status.as_u16(), %message, "Server rejected logout");
            return Err(AuthError::Api {
                status: response.status.as_u16(),
                message,
            });
        }

        Ok(response
            .server_message()
            .unwrap_or_else(|| LOGGED_OUT_MESSAGE.to_string()))
    }

    pub async fn send_otp(&self, phone: &str, recaptcha_token: &str) -> AuthResult<OtpSession> {
        self.public.send_otp(phone, recaptcha_token).await
    }

    /// Verify a one-time code and start a session with the returned pair.
    pub async fn verify_otp(&self, code: &str, session_info: &str) -> AuthResult<AuthSnapshot> {
        let tokens = self.public.verify_otp(code, session_info).await?;
        self.login_succeeded(&tokens.access, &tokens.refresh, Some(tokens.profile()));
        Ok(self.store.snapshot())
    }

    pub async fn register(&self, signup: &SignupRequest) -> AuthResult<Value> {
        self.public.register(signup).await
    }

    /// Route guard. Fails and fires the logged-out hook when no refresh
    /// credential is available.
    pub fn require_session(&self) -> AuthResult<()> {
        if self.store.is_loading() {
            self.store.hydrate();
        }

        if self.store.refresh_token().is_none() {
            self.fire_logout_hook();
            return Err(AuthError::NotLoggedIn);
        }
        Ok(())
    }

    fn fire_logout_hook(&self) {
        if let Some(hook) = &self.on_logout {
            hook();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth_fsm::AuthPhase;
    use crate::error::RefreshCause;
    use crate::public_api::VERIFY_OTP_PATH;
    use crate::test_support::{FakeBackend, RefreshReply};
    use credential_storage::{FileKv, MemoryKv};
    use serde_json::json;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use tempfile::tempdir;

    fn memory_vault() -> CredentialVault {
        CredentialVault::new(Arc::new(MemoryKv::new()))
    }

    fn session(backend: &Arc<FakeBackend>, vault: CredentialVault) -> (AuthSession, Arc<AtomicUsize>) {
        let logouts = Arc::new(AtomicUsize::new(0));
        let counter = logouts.clone();
        let hook: LogoutHook = Arc::new(move || {
            counter.fetch_add(1, Ordering::SeqCst);
        });
        let session = AuthSession::new(vault, backend.clone(), SessionOptions::default(), Some(hook));
        (session, logouts)
    }

    #[tokio::test]
    async fn test_caller_only_sees_data_after_refresh() {
        let backend = FakeBackend::new("a-1", "r-1");
        backend.set_refresh_reply(RefreshReply::issue("a-2", None));
        let (session, logouts) = session(&backend, memory_vault());
        session.hydrate();
        session.login_succeeded("a-stale", "r-1", None);

        let body: Value = session.get_json("/dashboard/").await.unwrap();

        assert_eq!(body, json!({ "path": "/dashboard/", "token": "a-2" }));
        assert_eq!(backend.refresh_calls(), 1);
        assert_eq!(logouts.load(Ordering::SeqCst), 0);
        assert!(session.current_auth_state().is_authenticated);
    }

    #[tokio::test]
    async fn test_missing_refresh_credential_rejects_without_hanging() {
        let backend = FakeBackend::new("a-1", "r-1");
        let (session, logouts) = session(&backend, memory_vault());
        session.hydrate();

        let result = tokio::time::timeout(
            Duration::from_secs(5),
            session.get_json::<Value>("/dashboard/"),
        )
        .await
        .expect("request must settle");

        assert_eq!(result.unwrap_err(), AuthError::NoRefreshCredential);
        let state = session.current_auth_state();
        assert!(!state.is_authenticated);
        assert_eq!(state.phase, AuthPhase::LoggedOut);
        assert_eq!(logouts.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_subscriber_sees_forced_logout() {
        let backend = FakeBackend::new("a-1", "r-1");
        let (session, _) = session(&backend, memory_vault());
        session.hydrate();
        session.login_succeeded("a-stale", "r-revoked", None);

        let mut rx = session.subscribe();
        let _ = rx.borrow_and_update();

        let err = session.get_json::<Value>("/dashboard/").await.unwrap_err();
        assert!(err.is_terminal());

        assert!(rx.has_changed().unwrap());
        assert!(!rx.borrow_and_update().is_authenticated);
    }

    #[tokio::test]
    async fn test_verify_otp_starts_session() {
        let backend = FakeBackend::new("a-1", "r-1");
        backend.respond(
            VERIFY_OTP_PATH,
            200,
            json!({
                "access": "a-1",
                "refresh": "r-1",
                "email": "ada@example.com",
                "full_name": "Ada",
                "phone_number": "+15550100"
            }),
        );
        let (session, _) = session(&backend, memory_vault());
        session.hydrate();

        let state = session.verify_otp("123456", "sess-1").await.unwrap();

        assert!(state.is_authenticated);
        assert_eq!(state.user.unwrap().email.as_deref(), Some("ada@example.com"));
        assert_eq!(session.store().access_token(), Some("a-1".to_string()));
    }

    #[tokio::test]
    async fn test_session_survives_restart() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("credentials.json");
        let backend = FakeBackend::new("a-1", "r-1");

        {
            let vault = CredentialVault::new(Arc::new(FileKv::open(&path).unwrap()));
            let (session, _) = session(&backend, vault);
            session.hydrate();
            session.login_succeeded(
                "a-1",
                "r-1",
                Some(UserProfile {
                    email: None,
                    full_name: Some("Ada".to_string()),
                    phone_number: None,
                }),
            );
        }

        let vault = CredentialVault::new(Arc::new(FileKv::open(&path).unwrap()));
        let (session, _) = session(&backend, vault);
        let state = session.hydrate();

        assert!(state.is_authenticated);
        assert_eq!(state.user.unwrap().full_name.as_deref(), Some("Ada"));

        let body: Value = session.get_json("/dashboard/").await.unwrap();
        assert_eq!(body["token"], "a-1");
    }

    #[tokio::test]
    async fn test_require_session() {
        let backend = FakeBackend::new("a-1", "r-1");
        let (session, logouts) = session(&backend, memory_vault());

        assert_eq!(session.require_session(), Err(AuthError::NotLoggedIn));
        assert_eq!(logouts.load(Ordering::SeqCst), 1);
        assert!(!session.current_auth_state().is_loading);

        session.login_succeeded("a-1", "r-1", None);
        assert_eq!(session.require_session(), Ok(()));

        session.logout();
        assert_eq!(session.require_session(), Err(AuthError::NotLoggedIn));
        assert_eq!(logouts.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_explicit_refresh() {
        let backend = FakeBackend::new("a-1", "r-1");
        backend.set_refresh_reply(RefreshReply::issue("a-2", Some("r-2")));
        let (session, logouts) = session(&backend, memory_vault());
        session.hydrate();
        session.login_succeeded("a-1", "r-1", None);

        session.refresh().await.unwrap();
        assert_eq!(session.store().refresh_token(), Some("r-2".to_string()));

        session.logout();
        assert_eq!(session.refresh().await, Err(AuthError::NoRefreshCredential));
        assert_eq!(logouts.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_logout_during_refresh_stays_logged_out() {
        let backend = FakeBackend::new("a-1", "r-1");
        backend.set_refresh_reply(RefreshReply::issue("a-2", Some("r-2")));
        backend.set_refresh_delay(Duration::from_millis(100));
        let vault = memory_vault();
        let (session, logouts) = session(&backend, vault.clone());
        session.hydrate();
        session.login_succeeded("a-stale", "r-1", None);

        let (result, _) = tokio::join!(session.get_json::<Value>("/dashboard/"), async {
            tokio::time::sleep(Duration::from_millis(30)).await;
            session.logout();
        });

        assert_eq!(
            result.unwrap_err(),
            AuthError::RefreshFailed(RefreshCause::Cancelled)
        );
        assert_eq!(backend.refresh_calls(), 1);
        assert_eq!(logouts.load(Ordering::SeqCst), 0);

        let state = session.current_auth_state();
        assert!(!state.is_authenticated);
        assert_eq!(state.phase, AuthPhase::LoggedOut);
        assert_eq!(vault.access_token().unwrap(), None);
        assert_eq!(vault.refresh_token().unwrap(), None);
    }

    #[tokio::test]
    async fn test_logout_remote_revokes_refresh_credential() {
        let backend = FakeBackend::new("a-1", "r-1");
        backend.respond(LOGOUT_PATH, 200, json!({ "message": "Signed out everywhere" }));
        let (session, logouts) = session(&backend, memory_vault());
        session.hydrate();
        session.login_succeeded("a-1", "r-1", None);

        let message = session.logout_remote().await.unwrap();

        assert_eq!(message, "Signed out everywhere");
        let sent = backend.requests_to(LOGOUT_PATH);
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].bearer.as_deref(), Some("a-1"));
        assert_eq!(sent[0].body, Some(json!({ "refresh": "r-1" })));
        assert!(!session.current_auth_state().is_authenticated);
        assert_eq!(logouts.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_logout_remote_without_session_skips_server() {
        let backend = FakeBackend::new("a-1", "r-1");
        let (session, _) = session(&backend, memory_vault());
        session.hydrate();

        let message = session.logout_remote().await.unwrap();

        assert_eq!(message, LOGGED_OUT_MESSAGE);
        assert!(backend.requests().is_empty());
    }

    #[tokio::test]
    async fn test_logout_remote_clears_even_when_server_fails() {
        let backend = FakeBackend::new("a-1", "r-1");
        backend.respond(LOGOUT_PATH, 500, json!({ "detail": "Blacklist unavailable" }));
        let (session, _) = session(&backend, memory_vault());
        session.hydrate();
        session.login_succeeded("a-1", "r-1", None);

        let err = session.logout_remote().await.unwrap_err();

        assert_eq!(
            err,
            AuthError::Api {
                status: 500,
                message: "Blacklist unavailable".to_string()
            }
        );
        assert!(err.is_transient());
        assert!(!session.current_auth_state().is_authenticated);
    }

    #[tokio::test]
    async fn test_explicit_refresh_hydrates_first() {
        let backend = FakeBackend::new("a-1", "r-1");
        backend.set_refresh_reply(RefreshReply::issue("a-2", None));
        let vault = memory_vault();
        vault.set_access_token("a-1", Duration::from_secs(60)).unwrap();
        vault.set_refresh_token("r-1", Duration::from_secs(60)).unwrap();
        let (session, logouts) = session(&backend, vault);

        session.refresh().await.unwrap();

        assert_eq!(session.store().access_token(), Some("a-2".to_string()));
        assert_eq!(logouts.load(Ordering::SeqCst), 0);
    }
}
