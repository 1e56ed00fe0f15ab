//! Single source of truth for the credential pair.
//!
//! Every mutation updates the in-memory state, mirrors it into the
//! [`CredentialVault`] and publishes a fresh [`AuthSnapshot`] on a watch
//! channel, all under one lock so observers never see the steps reordered.

use crate::auth_fsm::{AuthPhase, SessionInput, SessionMachine, SessionState};
use client_config::Config;
use credential_storage::{CredentialVault, MemoryKv, UserProfile};
use serde::Serialize;
use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;
use tokio::sync::watch;
use tracing::{debug, info, warn};

/// The access/refresh credential pair.
#[derive(Clone, Default, PartialEq, Eq)]
pub struct CredentialPair {
    pub access_token: Option<String>,
    pub refresh_token: Option<String>,
}

impl CredentialPair {
    pub fn new(access_token: impl Into<String>, refresh_token: impl Into<String>) -> Self {
        Self {
            access_token: Some(access_token.into()),
            refresh_token: Some(refresh_token.into()),
        }
    }

    /// Both halves present.
    pub fn is_complete(&self) -> bool {
        self.access_token.is_some() && self.refresh_token.is_some()
    }
}

impl fmt::Debug for CredentialPair {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mask = |t: &Option<String>| t.as_ref().map(|_| "<redacted>");
        f.debug_struct("CredentialPair")
            .field("access_token", &mask(&self.access_token))
            .field("refresh_token", &mask(&self.refresh_token))
            .finish()
    }
}

/// Observable authentication state.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AuthSnapshot {
    #[serde(skip)]
    pub credentials: CredentialPair,
    pub is_authenticated: bool,
    /// True until the first hydration completes.
    pub is_loading: bool,
    pub user: Option<UserProfile>,
    pub phase: AuthPhase,
}

/// Persisted lifetimes of the two credentials.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CredentialTtl {
    pub access: Duration,
    pub refresh: Duration,
}

impl Default for CredentialTtl {
    fn default() -> Self {
        Self {
            access: Duration::from_secs(client_config::DEFAULT_ACCESS_TOKEN_TTL_SECS),
            refresh: Duration::from_secs(client_config::DEFAULT_REFRESH_TOKEN_TTL_SECS),
        }
    }
}

impl CredentialTtl {
    pub fn from_config(config: &Config) -> Self {
        Self {
            access: config.access_token_ttl(),
            refresh: config.refresh_token_ttl(),
        }
    }
}

struct StoreInner {
    credentials: CredentialPair,
    user: Option<UserProfile>,
    fsm: SessionMachine,
}

impl StoreInner {
    fn phase(&self) -> AuthPhase {
        AuthPhase::from(self.fsm.state())
    }

    fn snapshot(&self) -> AuthSnapshot {
        let phase = self.phase();
        AuthSnapshot {
            credentials: self.credentials.clone(),
            is_authenticated: self.credentials.is_complete(),
            is_loading: phase.is_loading(),
            user: self.user.clone(),
            phase,
        }
    }

    /// Feed the machine. Inputs that do not apply in the current state are
    /// dropped; the credential pair stays authoritative.
    fn apply(&mut self, input: SessionInput) {
        let old_phase = self.phase();
        if self.fsm.consume(&input).is_err() {
            debug!(state = ?self.fsm.state(), input = ?input, "Ignoring session input");
            return;
        }

        let new_phase = self.phase();
        if old_phase != new_phase {
            debug!(old_phase = ?old_phase, new_phase = ?new_phase, "Auth state transition");
        }
    }
}

/// Holds the current credential pair and user profile.
pub struct CredentialStore {
    vault: CredentialVault,
    ttl: CredentialTtl,
    inner: Mutex<StoreInner>,
    tx: watch::Sender<AuthSnapshot>,
}

impl CredentialStore {
    pub fn new(vault: CredentialVault, ttl: CredentialTtl) -> Self {
        let inner = StoreInner {
            credentials: CredentialPair::default(),
            user: None,
            fsm: SessionMachine::new(),
        };
        let (tx, _rx) = watch::channel(inner.snapshot());

        Self {
            vault,
            ttl,
            inner: Mutex::new(inner),
            tx,
        }
    }

    /// Store backed by process memory only.
    pub fn in_memory() -> Self {
        Self::new(
            CredentialVault::new(Arc::new(MemoryKv::new())),
            CredentialTtl::default(),
        )
    }

    fn lock(&self) -> MutexGuard<'_, StoreInner> {
        self.inner.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn publish(&self, inner: &StoreInner) -> AuthSnapshot {
        let snapshot = inner.snapshot();
        self.tx.send_replace(snapshot.clone());
        snapshot
    }

    /// Replace the credential pair and persist it.
    pub fn set_credentials(&self, access_token: &str, refresh_token: &str) {
        let mut inner = self.lock();
        inner.credentials = CredentialPair::new(access_token, refresh_token);

        let input = match inner.fsm.state() {
            SessionState::Refreshing => SessionInput::RefreshSucceeded,
            _ => SessionInput::LoginSucceeded,
        };
        inner.apply(input);

        if let Err(e) = self.vault.set_access_token(access_token, self.ttl.access) {
            warn!(error = %e, "Failed to persist access credential");
        }
        if let Err(e) = self.vault.set_refresh_token(refresh_token, self.ttl.refresh) {
            warn!(error = %e, "Failed to persist refresh credential");
        }

        self.publish(&inner);
    }

    /// Drop both credentials and the user profile, in memory and on disk.
    /// Safe to call repeatedly.
    pub fn clear_credentials(&self) {
        let mut inner = self.lock();
        inner.credentials = CredentialPair::default();
        inner.user = None;

        let input = match inner.fsm.state() {
            SessionState::Refreshing => SessionInput::RefreshFailed,
            _ => SessionInput::Cleared,
        };
        inner.apply(input);

        if let Err(e) = self.vault.clear_session() {
            warn!(error = %e, "Failed to erase persisted session");
        }

        self.publish(&inner);
    }

    /// Reconstruct state from the durable store.
    ///
    /// A half pair is treated as no session and erased.
    pub fn hydrate(&self) -> AuthSnapshot {
        let mut inner = self.lock();

        let access = self.vault.access_token().unwrap_or_else(|e| {
            warn!(error = %e, "Failed to read persisted access credential");
            None
        });
        let refresh = self.vault.refresh_token().unwrap_or_else(|e| {
            warn!(error = %e, "Failed to read persisted refresh credential");
            None
        });
        let hydrating = *inner.fsm.state() == SessionState::Hydrating;

        match (access, refresh) {
            (Some(access), Some(refresh)) => {
                inner.credentials = CredentialPair::new(access, refresh);
                inner.user = self.vault.user_profile().unwrap_or_else(|e| {
                    warn!(error = %e, "Failed to read persisted user profile");
                    None
                });
                inner.apply(if hydrating {
                    SessionInput::HydratedWithSession
                } else {
                    SessionInput::LoginSucceeded
                });
                info!("Restored persisted session");
            }
            (access, refresh) => {
                if access.is_some() || refresh.is_some() {
                    info!(
                        has_access = access.is_some(),
                        has_refresh = refresh.is_some(),
                        "Discarding incomplete persisted credentials"
                    );
                    if let Err(e) = self.vault.clear_session() {
                        warn!(error = %e, "Failed to erase incomplete credentials");
                    }
                }
                inner.credentials = CredentialPair::default();
                inner.user = None;
                inner.apply(if hydrating {
                    SessionInput::HydratedEmpty
                } else {
                    SessionInput::Cleared
                });
                debug!("No persisted session");
            }
        }

        self.publish(&inner)
    }

    /// Attach a profile. Independent of credential validity.
    pub fn set_user(&self, profile: UserProfile) {
        let mut inner = self.lock();
        if let Err(e) = self.vault.set_user_profile(&profile, self.ttl.refresh) {
            warn!(error = %e, "Failed to persist user profile");
        }
        inner.user = Some(profile);
        self.publish(&inner);
    }

    pub fn snapshot(&self) -> AuthSnapshot {
        self.lock().snapshot()
    }

    /// Receiver that observes every published snapshot.
    pub fn subscribe(&self) -> watch::Receiver<AuthSnapshot> {
        self.tx.subscribe()
    }

    pub fn access_token(&self) -> Option<String> {
        self.lock().credentials.access_token.clone()
    }

    pub fn refresh_token(&self) -> Option<String> {
        self.lock().credentials.refresh_token.clone()
    }

    pub fn is_loading(&self) -> bool {
        self.lock().phase().is_loading()
    }

    pub fn phase(&self) -> AuthPhase {
        self.lock().phase()
    }

    pub(crate) fn mark_refreshing(&self) {
        let mut inner = self.lock();
        inner.apply(SessionInput::TokenRejected);
        self.publish(&inner);
    }

    /// Store the pair issued by a refresh exchange. Only applies while the
    /// store is still `Refreshing`; returns false if the session was cleared
    /// or replaced while the exchange was in flight.
    pub(crate) fn commit_refresh(&self, access_token: &str, refresh_token: &str) -> bool {
        let mut inner = self.lock();
        if *inner.fsm.state() != SessionState::Refreshing {
            debug!(state = ?inner.fsm.state(), "Discarding refresh result, session changed");
            return false;
        }

        inner.credentials = CredentialPair::new(access_token, refresh_token);
        inner.apply(SessionInput::RefreshSucceeded);

        if let Err(e) = self.vault.set_access_token(access_token, self.ttl.access) {
            warn!(error = %e, "Failed to persist access credential");
        }
        if let Err(e) = self.vault.set_refresh_token(refresh_token, self.ttl.refresh) {
            warn!(error = %e, "Failed to persist refresh credential");
        }

        self.publish(&inner);
        true
    }

    /// Clear the session after a failed exchange. Same guard as
    /// [`Self::commit_refresh`]: a session established meanwhile is kept.
    pub(crate) fn fail_refresh(&self) -> bool {
        let mut inner = self.lock();
        if *inner.fsm.state() != SessionState::Refreshing {
            debug!(state = ?inner.fsm.state(), "Ignoring refresh failure, session changed");
            return false;
        }

        inner.credentials = CredentialPair::default();
        inner.user = None;
        inner.apply(SessionInput::RefreshFailed);

        if let Err(e) = self.vault.clear_session() {
            warn!(error = %e, "Failed to erase persisted session");
        }

        self.publish(&inner);
        true
    }

    /// Leave `Refreshing` without touching the credentials.
    pub(crate) fn abandon_refresh(&self) {
        let mut inner = self.lock();
        inner.apply(SessionInput::RefreshAbandoned);
        self.publish(&inner);
    }
}
