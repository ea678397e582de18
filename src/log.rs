//! Logging shims.
//!
//! Real `tracing` events when the `tracing` feature is enabled, no-ops
//! otherwise. The hot `access` path never logs in either configuration.

#[cfg(feature = "tracing")]
macro_rules! trace_event {
    ($($arg:tt)*) => { ::tracing::trace!(target: "observation", $($arg)*) };
}

#[cfg(not(feature = "tracing"))]
macro_rules! trace_event {
    ($($arg:tt)*) => {};
}

pub(crate) use trace_event;
