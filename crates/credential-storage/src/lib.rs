//! Durable key/value storage for session credentials.
//!
//! Every entry carries a max-age, like a browser cookie. Two backends ship:
//! - [`MemoryKv`]: process-local, used by tests and ephemeral sessions
//! - [`FileKv`]: a single JSON file, so a restart reconstructs the session
//!
//! [`CredentialVault`] layers typed accessors for the access/refresh pair
//! and the user profile on top of any backend.

mod file;
mod keys;
mod memory;
mod traits;
mod vault;

pub use file::FileKv;
pub use keys::StorageKeys;
pub use memory::MemoryKv;
pub use traits::DurableKv;
pub use vault::{CredentialVault, UserProfile};

use std::path::Path;
use std::sync::Arc;
use thiserror::Error;

/// Error type for storage operations.
#[derive(Error, Debug)]
pub enum StorageError {
    /// Backend-specific failure
    #[error("Storage backend error: {0}")]
    Backend(String),

    /// Encoding/decoding error
    #[error("Encoding error: {0}")]
    Encoding(String),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result type for storage operations.
pub type StorageResult<T> = Result<T, StorageError>;

/// Open the file-backed store at `path`.
pub fn create_file_storage(path: impl AsRef<Path>) -> StorageResult<Arc<dyn DurableKv>> {
    Ok(Arc::new(FileKv::open(path)?))
}

/// Create a vault over the file-backed store at `path`.
pub fn create_credential_vault(path: impl AsRef<Path>) -> StorageResult<CredentialVault> {
    Ok(CredentialVault::new(create_file_storage(path)?))
}
