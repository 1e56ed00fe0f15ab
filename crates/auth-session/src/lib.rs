//! Authenticated request layer.
//!
//! This crate provides:
//! - A credential store persisted through `credential-storage`
//! - Single-flight refresh of expired access credentials
//! - A request client that replays 401-rejected calls after a refresh
//! - OTP login, signup and refresh calls against the auth API
//! - An explicit FSM for the session phase

mod auth_fsm;
mod client;
mod credential_store;
mod error;
mod public_api;
mod refresh;
mod session;
mod transport;

#[cfg(test)]
mod test_support;

pub use auth_fsm::session_machine;
pub use auth_fsm::{AuthPhase, SessionInput, SessionMachine, SessionState};
pub use client::{AuthenticatedClient, LogoutHook};
pub use credential_store::{AuthSnapshot, CredentialPair, CredentialStore, CredentialTtl};
pub use error::{AuthError, AuthResult, RefreshCause};
pub use public_api::{
    LoginTokens, OtpSession, PublicApi, RefreshedTokens, SignupRequest, LOGOUT_PATH,
    REGISTER_PATH, SEND_OTP_PATH, VERIFY_OTP_PATH,
};
pub use refresh::{RefreshCoordinator, RefreshOutcome};
pub use session::{AuthSession, SessionOptions};
pub use transport::{
    server_message, ApiRequest, ApiResponse, HttpTransport, ReqwestTransport, TransportError,
};

pub use credential_storage::UserProfile;
