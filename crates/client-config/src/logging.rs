//! Logging initialization.
//!
//! Thin wrapper over the observability crate so the binary only needs the
//! configured level and paths.

use crate::Paths;
use observability::LogConfig;

/// Initialize logging: JSONL to `paths.log_file()`, plus compact stderr
/// output when `also_stderr` is set. `RUST_LOG` overrides `level`.
pub fn init_logging(level: &str, paths: &Paths, also_stderr: bool) {
    observability::init_with_config(LogConfig {
        service_name: "authctl".into(),
        default_level: level.into(),
        log_path: Some(paths.log_file()),
        also_stderr,
    });
}
