//! Typed accessors for persisted session state.

use crate::{DurableKv, StorageError, StorageKeys, StorageResult};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;

/// Profile of the signed-in user, as returned by the login exchange.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserProfile {
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub full_name: Option<String>,
    #[serde(default)]
    pub phone_number: Option<String>,
}

/// High-level API over a [`DurableKv`] for the credential pair and profile.
#[derive(Clone)]
pub struct CredentialVault {
    storage: Arc<dyn DurableKv>,
}

impl CredentialVault {
    pub fn new(storage: Arc<dyn DurableKv>) -> Self {
        Self { storage }
    }

    // ==========================================
    // Credentials
    // ==========================================

    pub fn set_access_token(&self, token: &str, max_age: Duration) -> StorageResult<()> {
        self.storage.set(StorageKeys::ACCESS, token, max_age)
    }

    pub fn access_token(&self) -> StorageResult<Option<String>> {
        self.storage.get(StorageKeys::ACCESS)
    }

    pub fn set_refresh_token(&self, token: &str, max_age: Duration) -> StorageResult<()> {
        self.storage.set(StorageKeys::REFRESH, token, max_age)
    }

    pub fn refresh_token(&self) -> StorageResult<Option<String>> {
        self.storage.get(StorageKeys::REFRESH)
    }

    /// True when a refresh credential is persisted. A missing access
    /// credential alone does not end the session.
    pub fn has_session(&self) -> StorageResult<bool> {
        self.storage.has(StorageKeys::REFRESH)
    }

    // ==========================================
    // User profile
    // ==========================================

    pub fn set_user_profile(&self, profile: &UserProfile, max_age: Duration) -> StorageResult<()> {
        let json =
            serde_json::to_string(profile).map_err(|e| StorageError::Encoding(e.to_string()))?;
        self.storage.set(StorageKeys::USER_PROFILE, &json, max_age)
    }

    /// Stored profile. An undecodable entry is dropped and reads as absent.
    pub fn user_profile(&self) -> StorageResult<Option<UserProfile>> {
        let Some(json) = self.storage.get(StorageKeys::USER_PROFILE)? else {
            return Ok(None);
        };

        match serde_json::from_str(&json) {
            Ok(profile) => Ok(Some(profile)),
            Err(err) => {
                tracing::warn!(error = %err, "Discarding undecodable user profile");
                self.storage.remove(StorageKeys::USER_PROFILE)?;
                Ok(None)
            }
        }
    }

    // ==========================================
    // Cleanup
    // ==========================================

    /// Erase the credential pair and the profile.
    pub fn clear_session(&self) -> StorageResult<()> {
        self.storage.remove(StorageKeys::ACCESS)?;
        self.storage.remove(StorageKeys::REFRESH)?;
        self.storage.remove(StorageKeys::USER_PROFILE)?;
        tracing::debug!("Cleared persisted session");
        Ok(())
    }
}
