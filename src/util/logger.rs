//! The built-in logger.
//!
//! The built-in logger uses the `env_logger` crate. It is enabled by the Cargo feature
//! "builtin_env_logger", which is enabled by default. When enabled, it is initialized by
//! [`crate::memory_manager::metaspace_init`], and shows logs of level INFO or more important unless
//! `RUST_LOG` says otherwise. Users who want their own logger should disable the feature, or
//! initialize their logger before calling `metaspace_init`.

use log::SetLoggerError;

/// Attempt to init a env_logger for the metaspace.
/// Does nothing if the "builtin_env_logger" feature is disabled.
pub fn try_init() -> Result<(), SetLoggerError> {
    cfg_if::cfg_if! {
        if #[cfg(feature = "builtin_env_logger")] {
            env_logger::try_init_from_env(
                // By default, use info level logging.
                env_logger::Env::default().filter_or(env_logger::DEFAULT_FILTER_ENV, "info"),
            )
        } else {
            Ok(())
        }
    }
}
