//! Authenticated request client.
//!
//! Attaches the bearer credential, recognises a 401 as credential expiry,
//! routes the failure through the refresh gate and replays the request once
//! with the new credential.

use crate::credential_store::CredentialStore;
use crate::refresh::RefreshCoordinator;
use crate::transport::{ApiRequest, ApiResponse, HttpTransport};
use crate::{AuthError, AuthResult};
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::sync::Arc;
use tracing::{debug, info, warn};
use uuid::Uuid;

/// Invoked once when a refresh failure ends the session.
pub type LogoutHook = Arc<dyn Fn() + Send + Sync>;

pub struct AuthenticatedClient {
    store: Arc<CredentialStore>,
    coordinator: Arc<RefreshCoordinator>,
    transport: Arc<dyn HttpTransport>,
    on_logout: Option<LogoutHook>,
}

impl AuthenticatedClient {
    pub fn new(
        store: Arc<CredentialStore>,
        coordinator: Arc<RefreshCoordinator>,
        transport: Arc<dyn HttpTransport>,
    ) -> Self {
        Self {
            store,
            coordinator,
            transport,
            on_logout: None,
        }
    }

    pub fn with_logout_hook(mut self, hook: LogoutHook) -> Self {
        self.on_logout = Some(hook);
        self
    }

    /// Attach the access credential unless the caller set `Authorization`
    /// or the store has not been hydrated yet.
    fn attach_credential(&self, request: &mut ApiRequest) -> AuthResult<()> {
        if request.has_authorization() || self.store.is_loading() {
            return Ok(());
        }
        if let Some(token) = self.store.access_token() {
            request.set_bearer(&token)?;
        }
        Ok(())
    }

    /// Send `request`, recovering once from an expired access credential.
    ///
    /// Non-401 responses are returned unchanged, whatever their status.
    pub async fn send(&self, mut request: ApiRequest) -> AuthResult<ApiResponse> {
        let request_id = Uuid::new_v4();
        self.attach_credential(&mut request)?;

        let response = self.transport.send(&request).await?;
        if !response.is_unauthorized() {
            return Ok(response);
        }

        if request.retried {
            debug!(%request_id, path = %request.path, "Replayed request rejected again");
            return Err(AuthError::AuthorizationFailure {
                message: response.error_message(),
            });
        }

        // Before hydration nothing was attached and nothing may be cleared.
        if self.store.is_loading() {
            debug!(%request_id, path = %request.path, "Rejected before hydration, not refreshing");
            return Err(AuthError::AuthorizationFailure {
                message: response.error_message(),
            });
        }

        debug!(%request_id, path = %request.path, "Access credential rejected");
        request.retried = true;

        let outcome = self.coordinator.refresh_or_wait(request_id).await;
        let token = match outcome.result {
            Ok(token) => token,
            Err(err) => {
                if outcome.initiated && err.is_terminal() {
                    self.logged_out();
                }
                return Err(err);
            }
        };

        self.replay(request_id, request, &token).await
    }

    async fn replay(
        &self,
        request_id: Uuid,
        mut request: ApiRequest,
        token: &str,
    ) -> AuthResult<ApiResponse> {
        request.set_bearer(token)?;
        debug!(%request_id, path = %request.path, "Replaying with refreshed credential");

        let response = self.transport.send(&request).await?;
        if response.is_unauthorized() {
            warn!(%request_id, path = %request.path, "Refreshed credential rejected");
            return Err(AuthError::AuthorizationFailure {
                message: response.error_message(),
            });
        }
        Ok(response)
    }

    fn logged_out(&self) {
        info!("Session ended after refresh failure");
        if let Some(hook) = &self.on_logout {
            hook();
        }
    }

    /// Send and decode, mapping non-success statuses to [`AuthError::Api`].
    pub async fn execute<T: DeserializeOwned>(&self, request: ApiRequest) -> AuthResult<T> {
        let response = self.send(request).await?;
        if !response.is_success() {
            return Err(AuthError::Api {
                status: response.status.as_u16(),
                message: response.error_message(),
            });
        }
        response.json()
    }

    pub async fn get_json<T: DeserializeOwned>(&self, path: &str) -> AuthResult<T> {
        self.execute(ApiRequest::get(path)).await
    }

    pub async fn post_json<B: Serialize + ?Sized, T: DeserializeOwned>(
        &self,
        path: &str,
        body: &B,
    ) -> AuthResult<T> {
        let body = serde_json::to_value(body)?;
        self.execute(ApiRequest::post(path).with_json(body)).await
    }
}
