//! Structured logging helpers.
//!
//! Every agent log line carries a `component` field (`link`, `handshake`,
//! `dispatcher`, `file-sync`, `runtime`) so JSON output can be filtered per area.

/// Emit a tracing event tagged with a component.
///
/// ```rust,ignore
/// log_event!(info, "runtime", "Agent started", app_id = %config.app_id);
/// ```
#[macro_export]
macro_rules! log_event {
    (info, $component:expr, $msg:expr $(, $($field:tt)*)?) => {
        tracing::info!(
            component = $component,
            $($($field)*,)?
            $msg
        )
    };

    (warn, $component:expr, $msg:expr $(, $($field:tt)*)?) => {
        tracing::warn!(
            component = $component,
            $($($field)*,)?
            $msg
        )
    };

    (error, $component:expr, $msg:expr $(, $($field:tt)*)?) => {
        tracing::error!(
            component = $component,
            $($($field)*,)?
            $msg
        )
    };

    (debug, $component:expr, $msg:expr $(, $($field:tt)*)?) => {
        tracing::debug!(
            component = $component,
            $($($field)*,)?
            $msg
        )
    };
}
