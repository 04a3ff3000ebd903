//! Logging helpers for structured predicate events.

/// Single logging target for the crate.
pub(crate) const LOG_TARGET: &str = "predicate";

/// Logs `event=<event> <message>` under [`LOG_TARGET`].
///
/// Arguments are only formatted when the level is enabled, so rendering an
/// expression into a trace record costs nothing on the default path.
macro_rules! predicate_log {
    ($level:expr, $event:expr, $fmt:expr $(, $args:expr)* $(,)?) => {{
        if log::log_enabled!(target: $crate::logging::LOG_TARGET, $level) {
            log::log!(
                target: $crate::logging::LOG_TARGET,
                $level,
                "event={} {}",
                $event,
                format_args!($fmt $(, $args)*)
            );
        }
    }};
}

pub(crate) use predicate_log;
