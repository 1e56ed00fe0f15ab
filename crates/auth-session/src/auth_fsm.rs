//! Session phase state machine using rust-fsm.
//!
//! ## State Diagram
//!
//! ```text
//!                 ┌─────────────────┐
//!                 │    Hydrating    │ (initial)
//!                 └────────┬────────┘
//!     HydratedEmpty        │        HydratedWithSession
//!          ┌───────────────┴───────────────┐
//!          ▼                               ▼
//! ┌─────────────────┐  LoginSucceeded  ┌─────────────────┐
//! │    LoggedOut    │ ───────────────► │    LoggedIn     │ ◄─┐
//! └─────────────────┘                  └────────┬────────┘   │
//!          ▲                                    │ TokenRejected
//!          │ RefreshFailed             ┌────────▼────────┐   │
//!          └────────────────────────── │   Refreshing    │ ──┘
//!                                      └─────────────────┘ RefreshSucceeded
//! ```
//!
//! `Cleared` leads to `LoggedOut` from every state.

use rust_fsm::*;
use serde::{Deserialize, Serialize};

state_machine! {
    #[derive(Debug, Clone, PartialEq, Eq)]
    pub session_machine(Hydrating)

    Hydrating => {
        HydratedWithSession => LoggedIn,
        HydratedEmpty => LoggedOut,
        LoginSucceeded => LoggedIn,
        Cleared => LoggedOut
    },
    LoggedOut => {
        LoginSucceeded => LoggedIn,
        Cleared => LoggedOut
    },
    LoggedIn => {
        LoginSucceeded => LoggedIn,
        TokenRejected => Refreshing,
        Cleared => LoggedOut
    },
    Refreshing => {
        RefreshSucceeded => LoggedIn,
        // Initiator went away before the exchange settled
        RefreshAbandoned => LoggedIn,
        RefreshFailed => LoggedOut,
        Cleared => LoggedOut
    }
}

pub use session_machine::Input as SessionInput;
pub use session_machine::State as SessionState;
pub use session_machine::StateMachine as SessionMachine;

/// Serialisable view of the session phase.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AuthPhase {
    /// Persisted credentials have not been read yet.
    Hydrating,
    LoggedOut,
    LoggedIn,
    /// A refresh exchange is in flight.
    Refreshing,
}

impl AuthPhase {
    pub fn is_loading(&self) -> bool {
        matches!(self, AuthPhase::Hydrating)
    }
}

impl From<&SessionState> for AuthPhase {
    fn from(state: &SessionState) -> Self {
        match state {
            SessionState::Hydrating => AuthPhase::Hydrating,
            SessionState::LoggedOut => AuthPhase::LoggedOut,
            SessionState::LoggedIn => AuthPhase::LoggedIn,
            SessionState::Refreshing => AuthPhase::Refreshing,
        }
    }
}
