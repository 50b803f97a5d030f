//! Logging macros gated on a per-module `ENABLE_LOGS` constant.
//!
//! Chatty modules (the badge ticker, the idle monitor) declare
//! `const ENABLE_LOGS: bool = ...;` and import the macros from the crate
//! root. Flipping the constant silences the module without touching the
//! global `RUST_LOG` filter.
//!
//! ```ignore
//! const ENABLE_LOGS: bool = true;
//! use crate::{log_debug, log_info};
//!
//! log_info!("badge interval set to {}ms", 1000);
//! ```

#[macro_export]
macro_rules! log_debug {
    ($($arg:tt)*) => {
        if ENABLE_LOGS {
            log::debug!($($arg)*);
        }
    };
}

#[macro_export]
macro_rules! log_info {
    ($($arg:tt)*) => {
        if ENABLE_LOGS {
            log::info!($($arg)*);
        }
    };
}

#[macro_export]
macro_rules! log_warn {
    ($($arg:tt)*) => {
        if ENABLE_LOGS {
            log::warn!($($arg)*);
        }
    };
}

/// Same as [`log_info!`] at error level. Errors that lose data should use
/// `log::error!` directly so they can't be silenced.
#[macro_export]
macro_rules! log_error {
    ($($arg:tt)*) => {
        if ENABLE_LOGS {
            log::error!($($arg)*);
        }
    };
}
