//! FILENAME: core/data-provider/src/logging.rs
//! PURPOSE: Category-tagged logging macros.
//! CONTEXT: Every line carries a category (PROVIDER, ENGINE, SOURCE, FIELDS,
//! SETTINGS, CONFIG) used as the `log` target, so hosts can filter per
//! subsystem with whatever logger they install.

#[macro_export]
macro_rules! log_debug {
    ($cat:expr, $($arg:tt)*) => {
        $crate::log::debug!(target: $cat, $($arg)*)
    };
}

#[macro_export]
macro_rules! log_info {
    ($cat:expr, $($arg:tt)*) => {
        $crate::log::info!(target: $cat, $($arg)*)
    };
}

#[macro_export]
macro_rules! log_warn {
    ($cat:expr, $($arg:tt)*) => {
        $crate::log::warn!(target: $cat, $($arg)*)
    };
}

#[macro_export]
macro_rules! log_error {
    ($cat:expr, $($arg:tt)*) => {
        $crate::log::error!(target: $cat, $($arg)*)
    };
}

// ENTER/EXIT macros for function tracing

#[macro_export]
macro_rules! log_enter {
    ($cat:expr, $func:expr) => {
        $crate::log::trace!(target: $cat, "ENTER {}", $func)
    };
    ($cat:expr, $func:expr, $($arg:tt)*) => {
        $crate::log::trace!(target: $cat, "ENTER {} {}", $func, format_args!($($arg)*))
    };
}

#[macro_export]
macro_rules! log_exit {
    ($cat:expr, $func:expr) => {
        $crate::log::trace!(target: $cat, "EXIT {}", $func)
    };
    ($cat:expr, $func:expr, $($arg:tt)*) => {
        $crate::log::trace!(target: $cat, "EXIT {} {}", $func, format_args!($($arg)*))
    };
}
