//! Storage key constants.

/// Keys under which session state is persisted.
pub struct StorageKeys;

impl StorageKeys {
    /// Access credential
    pub const ACCESS: &'static str = "access";

    /// Refresh credential
    pub const REFRESH: &'static str = "refresh";

    /// User profile (JSON)
    pub const USER_PROFILE: &'static str = "user";
}
