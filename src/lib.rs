use std::sync::atomic::{AtomicBool, Ordering};

/// Macro for prefixed status logging to stderr.
///
/// Usage:
/// ```ignore
/// log_status!("pipeline", "Running aio commands in {}", dir.display());
/// ```
#[macro_export]
macro_rules! log_status {
    ($prefix:expr, $($arg:tt)*) => {
        eprintln!(concat!("[", $prefix, "] {}"), format_args!($($arg)*));
    };
}

/// Like `log_status!`, but only emitted when debug logging is enabled.
#[macro_export]
macro_rules! log_debug {
    ($prefix:expr, $($arg:tt)*) => {
        if $crate::debug_enabled() {
            eprintln!(concat!("[", $prefix, "] ℹ️ {}"), format_args!($($arg)*));
        }
    };
}

static DEBUG: AtomicBool = AtomicBool::new(false);

/// Turn debug logging on or off for the rest of the process.
pub fn set_debug(enabled: bool) {
    DEBUG.store(enabled, Ordering::Relaxed);
}

pub fn debug_enabled() -> bool {
    DEBUG.load(Ordering::Relaxed)
}

pub mod core;
pub mod utils;

// Users can write `aio_pipe::config` instead of `aio_pipe::core::config`
pub use self::core::*;
pub use self::utils::*;
