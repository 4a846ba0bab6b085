// Level-checked logging macros forwarding to keyauth_common::Logger.
//
// The level check and the `log` path both go through `$crate`, so callers do
// not need their own `log` dependency.

#[doc(hidden)]
#[macro_export]
macro_rules! __log_at {
    ($level:ident, $method:ident, $logger:expr, $($arg:tt)*) => {{
        if $crate::__log::log_enabled!($crate::__log::Level::$level) {
            ($logger).$method(format_args!($($arg)*));
        }
    }}
}

#[macro_export]
macro_rules! log_debug {
    ($logger:expr, $($arg:tt)*) => {
        $crate::__log_at!(Debug, debug_args, $logger, $($arg)*)
    }
}

#[macro_export]
macro_rules! log_info {
    ($logger:expr, $($arg:tt)*) => {
        $crate::__log_at!(Info, info_args, $logger, $($arg)*)
    }
}

#[macro_export]
macro_rules! log_warn {
    ($logger:expr, $($arg:tt)*) => {
        $crate::__log_at!(Warn, warn_args, $logger, $($arg)*)
    }
}
