#![deny(missing_docs)]
//! Shared logging utilities for the tracker workspace.
//!
//! This crate provides the `tracker_*` logging macros used across the codebase,
//! `job_*` variants that tag a line with the job it concerns, and a minimal
//! test initializer for the global logger.

/// Log target used by every macro in this crate.
pub const LOG_TARGET: &str = "tracker";

/// Logs a trace-level message using the global logging facade.
#[macro_export]
macro_rules! tracker_trace {
    ($($arg:tt)*) => {{
        log::trace!(target: $crate::LOG_TARGET, $($arg)*);
    }};
}

/// Logs a debug-level message using the global logging facade.
#[macro_export]
macro_rules! tracker_debug {
    ($($arg:tt)*) => {{
        log::debug!(target: $crate::LOG_TARGET, $($arg)*);
    }};
}

/// Logs an info-level message using the global logging facade.
#[macro_export]
macro_rules! tracker_info {
    ($($arg:tt)*) => {{
        log::info!(target: $crate::LOG_TARGET, $($arg)*);
    }};
}

/// Logs a warn-level message using the global logging facade.
#[macro_export]
macro_rules! tracker_warn {
    ($($arg:tt)*) => {{
        log::warn!(target: $crate::LOG_TARGET, $($arg)*);
    }};
}

/// Logs an error-level message using the global logging facade.
#[macro_export]
macro_rules! tracker_error {
    ($($arg:tt)*) => {{
        log::error!(target: $crate::LOG_TARGET, $($arg)*);
    }};
}

/// Logs a debug-level message prefixed with `[job <id>]`.
#[macro_export]
macro_rules! job_debug {
    ($job:expr, $($arg:tt)*) => {{
        log::debug!(target: $crate::LOG_TARGET, "[job {}] {}", $job, format_args!($($arg)*));
    }};
}

/// Logs an info-level message prefixed with `[job <id>]`.
#[macro_export]
macro_rules! job_info {
    ($job:expr, $($arg:tt)*) => {{
        log::info!(target: $crate::LOG_TARGET, "[job {}] {}", $job, format_args!($($arg)*));
    }};
}

/// Logs a warn-level message prefixed with `[job <id>]`.
#[macro_export]
macro_rules! job_warn {
    ($job:expr, $($arg:tt)*) => {{
        log::warn!(target: $crate::LOG_TARGET, "[job {}] {}", $job, format_args!($($arg)*));
    }};
}

/// Initializes a simple terminal logger for use in unit tests.
///
/// This safely no-ops if another logger has already been initialized.
pub fn initialize_for_tests() {
    use simplelog::{ColorChoice, CombinedLogger, Config, TermLogger, TerminalMode};

    let level = if cfg!(debug_assertions) {
        log::LevelFilter::Debug
    } else {
        log::LevelFilter::Info
    };

    // Another test may have installed the logger already.
    let _ = CombinedLogger::init(vec![TermLogger::new(
        level,
        Config::default(),
        TerminalMode::Mixed,
        ColorChoice::Auto,
    )]);
}
