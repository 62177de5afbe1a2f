// src/macros.rs

//! Leveled logging macros for the fabric.
//!
//! With the `logging` feature enabled every macro forwards to `tracing`
//! under the `ridelink` target, so deployments can filter the fabric's
//! noise independently of the surrounding application
//! (`RUST_LOG=ridelink=debug`). With the feature disabled the macros
//! compile away, with one exception: `log_error!` always reaches stderr.
//! Broker and delivery failures must never be silent just because a
//! downstream build opted out of structured logging.

#![allow(unused_macros)]

#[cfg(feature = "logging")]
macro_rules! log_error {
    ($($arg:tt)*) => {
        tracing::error!(target: "ridelink", $($arg)*)
    };
}

#[cfg(not(feature = "logging"))]
macro_rules! log_error {
    ($($arg:tt)*) => {
        eprintln!($($arg)*)
    };
}

#[cfg(feature = "logging")]
macro_rules! log_warn {
    ($($arg:tt)*) => {
        tracing::warn!(target: "ridelink", $($arg)*)
    };
}

#[cfg(not(feature = "logging"))]
macro_rules! log_warn {
    ($($arg:tt)*) => {};
}

#[cfg(feature = "logging")]
macro_rules! log_info {
    ($($arg:tt)*) => {
        tracing::info!(target: "ridelink", $($arg)*)
    };
}

#[cfg(not(feature = "logging"))]
macro_rules! log_info {
    ($($arg:tt)*) => {};
}

#[cfg(feature = "logging")]
macro_rules! log_debug {
    ($($arg:tt)*) => {
        tracing::debug!(target: "ridelink", $($arg)*)
    };
}

#[cfg(not(feature = "logging"))]
macro_rules! log_debug {
    ($($arg:tt)*) => {};
}

pub(crate) use log_debug;
pub(crate) use log_error;
pub(crate) use log_info;
pub(crate) use log_warn;

#[cfg(test)]
mod tests {
    // ---
    // Expansion-level checks: every level accepts both inline captures and
    // positional formatting under either feature configuration.
    #[test]
    fn test_macros_accept_format_arguments() {
        // ---
        let what = "broker";
        log_error!("failure talking to {what}");
        log_warn!("slow consumer on {}: {} pending", what, 3);
        log_info!("connected to {what}");
        log_debug!("attempt {}/{}", 1, 5);
    }
}
