//! Configuration system for the SLO checker.
//!
//! This module provides:
//! - Environment variable parsing with type safety (`SLO_` prefix)
//! - A TOML service configuration file with defaults for every key
//! - Source tracking so startup logs show where each value came from

pub mod env;
pub mod file;
pub mod source;

pub use env::{EnvError, EnvParser};
pub use file::{
    ConfigError, DiagnosticsConfig, LoggingConfig, ResolvedConfig, ServerConfig, ServiceConfig,
};
pub use source::{ConfigSource, Sourced};

#[cfg(test)]
pub(crate) fn env_test_lock() -> std::sync::MutexGuard<'static, ()> {
    use std::sync::{Mutex, OnceLock};

    static ENV_LOCK: OnceLock<Mutex<()>> = OnceLock::new();
    ENV_LOCK
        .get_or_init(|| Mutex::new(()))
        .lock()
        .unwrap_or_else(|poisoned| poisoned.into_inner())
}
