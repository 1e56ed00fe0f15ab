//! Refresh coordination.
//!
//! [`RefreshCoordinator::refresh`] performs one exchange. The single-flight
//! gate in [`RefreshCoordinator::refresh_or_wait`] makes sure concurrent
//! callers share it: the first caller runs the exchange, everyone arriving
//! while it is in flight parks on a oneshot and receives the same outcome.

use crate::credential_store::CredentialStore;
use crate::error::RefreshCause;
use crate::public_api::PublicApi;
use crate::{AuthError, AuthResult};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;
use tokio::sync::oneshot;
use tracing::{debug, info, warn};
use uuid::Uuid;

/// A caller parked behind an in-flight refresh.
pub(crate) struct PendingRequest {
    request_id: Uuid,
    reply: oneshot::Sender<AuthResult<String>>,
}

enum Gate {
    Idle,
    Refreshing { pending: Vec<PendingRequest> },
}

/// What a caller of [`RefreshCoordinator::refresh_or_wait`] got back.
#[derive(Debug)]
pub struct RefreshOutcome {
    /// True for the caller that ran the exchange.
    pub initiated: bool,
    /// New access credential, or the shared failure.
    pub result: AuthResult<String>,
}

/// Owns the refresh exchange and the single-flight gate around it.
pub struct RefreshCoordinator {
    store: Arc<CredentialStore>,
    api: PublicApi,
    timeout: Duration,
    gate: Mutex<Gate>,
}

impl RefreshCoordinator {
    pub fn new(store: Arc<CredentialStore>, api: PublicApi, timeout: Duration) -> Self {
        Self {
            store,
            api,
            timeout,
            gate: Mutex::new(Gate::Idle),
        }
    }

    fn lock_gate(&self) -> MutexGuard<'_, Gate> {
        self.gate.lock().unwrap_or_else(|e| e.into_inner())
    }

    pub fn is_refreshing(&self) -> bool {
        matches!(*self.lock_gate(), Gate::Refreshing { .. })
    }

    /// Callers currently parked behind the in-flight refresh.
    pub fn pending_len(&self) -> usize {
        match &*self.lock_gate() {
            Gate::Idle => 0,
            Gate::Refreshing { pending } => pending.len(),
        }
    }

    /// Exchange the stored refresh credential for a new access credential.
    ///
    /// Any failure clears the store. Does not deduplicate; concurrent
    /// callers should go through [`Self::refresh_or_wait`]. The result is
    /// discarded with [`RefreshCause::Cancelled`] if the session was cleared
    /// or replaced while the exchange was in flight.
    pub async fn refresh(&self) -> AuthResult<String> {
        if self.store.is_loading() {
            debug!("Refresh requested before hydration, leaving store untouched");
            return Err(AuthError::NotLoggedIn);
        }

        let Some(refresh_token) = self.store.refresh_token() else {
            warn!("Refresh needed but no refresh credential is stored, clearing session");
            self.store.clear_credentials();
            return Err(AuthError::NoRefreshCredential);
        };

        self.store.mark_refreshing();
        debug!(path = self.api.refresh_path(), "Refreshing access credential");

        let exchange = tokio::time::timeout(self.timeout, self.api.refresh_token(&refresh_token));
        let cause = match exchange.await {
            Ok(Ok(tokens)) => {
                let refresh = tokens.refresh.unwrap_or(refresh_token);
                if !self.store.commit_refresh(&tokens.access, &refresh) {
                    info!("Session changed during refresh, discarding issued credential");
                    return Err(AuthError::RefreshFailed(RefreshCause::Cancelled));
                }
                info!("Access credential refreshed");
                return Ok(tokens.access);
            }
            Ok(Err(cause)) => cause,
            Err(_) => RefreshCause::Timeout,
        };

        if !self.store.fail_refresh() {
            info!(error = %cause, "Refresh failed after the session changed, keeping current session");
            return Err(AuthError::RefreshFailed(RefreshCause::Cancelled));
        }
        warn!(error = %cause, "Refresh failed, session cleared");
        Err(AuthError::RefreshFailed(cause))
    }

    /// Join the in-flight refresh, or start one if none is running.
    pub async fn refresh_or_wait(&self, request_id: Uuid) -> RefreshOutcome {
        let waiter = {
            let mut gate = self.lock_gate();
            match &mut *gate {
                Gate::Refreshing { pending } => {
                    let (reply, rx) = oneshot::channel();
                    pending.push(PendingRequest { request_id, reply });
                    debug!(%request_id, pending = pending.len(), "Queued behind in-flight refresh");
                    Some(rx)
                }
                Gate::Idle => {
                    *gate = Gate::Refreshing {
                        pending: Vec::new(),
                    };
                    None
                }
            }
        };

        if let Some(rx) = waiter {
            let result = rx
                .await
                .unwrap_or(Err(AuthError::RefreshFailed(RefreshCause::Cancelled)));
            return RefreshOutcome {
                initiated: false,
                result,
            };
        }

        debug!(%request_id, "Initiating refresh");
        let mut settle = SettleGuard {
            coordinator: self,
            armed: true,
        };
        let result = self.refresh().await;
        settle.settle(&result);

        RefreshOutcome {
            initiated: true,
            result,
        }
    }

    /// Return the gate to idle and hand `result` to every parked caller.
    fn settle(&self, result: &AuthResult<String>) {
        let pending = {
            let mut gate = self.lock_gate();
            match std::mem::replace(&mut *gate, Gate::Idle) {
                Gate::Refreshing { pending } => pending,
                Gate::Idle => Vec::new(),
            }
        };

        if !pending.is_empty() {
            debug!(pending = pending.len(), ok = result.is_ok(), "Settling queued requests");
        }
        for entry in pending {
            if entry.reply.send(result.clone()).is_err() {
                debug!(request_id = %entry.request_id, "Queued request went away before settlement");
            }
        }
    }
}

/// Settles the gate if the initiating future is dropped mid-refresh.
struct SettleGuard<'a> {
    coordinator: &'a RefreshCoordinator,
    armed: bool,
}

impl SettleGuard<'_> {
    fn settle(&mut self, result: &AuthResult<String>) {
        self.armed = false;
        self.coordinator.settle(result);
    }
}

impl Drop for SettleGuard<'_> {
    fn drop(&mut self) {
        if self.armed {
            warn!("Refresh initiator cancelled, releasing queued requests");
            self.coordinator.store.abandon_refresh();
            self.coordinator
                .settle(&Err(AuthError::RefreshFailed(RefreshCause::Cancelled)));
        }
    }
}
