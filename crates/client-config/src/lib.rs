//! Configuration, file system paths and logging setup for authctl.

mod config;
mod error;
mod logging;
mod paths;

pub use config::{
    Config, DEFAULT_ACCESS_TOKEN_TTL_SECS, DEFAULT_API_BASE_URL, DEFAULT_LOG_LEVEL,
    DEFAULT_REFRESH_PATH, DEFAULT_REFRESH_TIMEOUT_SECS, DEFAULT_REFRESH_TOKEN_TTL_SECS,
    DEFAULT_REQUEST_TIMEOUT_SECS,
};
pub use error::{CoreError, CoreResult};
pub use logging::init_logging;
pub use paths::Paths;
