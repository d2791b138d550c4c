//! Structured logging setup.
//!
//! Logs are either pretty-printed for development or emitted as JSON with
//! consistent fields for log shippers:
//! - `timestamp`, `level`, `target`
//! - `service`: service name from `TelemetryConfig`
//! - `request_id`: present on every line concerning a still request
//! - additional context fields

use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter, Layer};

use crate::{TelemetryConfig, TelemetryError};

/// Marker returned once the global subscriber is installed.
pub struct StructuredLogger {
    _initialized: bool,
}

/// Install the global `tracing` subscriber.
///
/// Fails if a global subscriber is already set.
pub fn init_logging(config: &TelemetryConfig) -> Result<StructuredLogger, TelemetryError> {
    let env_filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(&config.log_level))
        .map_err(|e| TelemetryError::LoggingInit(e.to_string()))?;

    let fmt_layer = if !config.console_output {
        None
    } else if config.json_logs {
        // JSON output for containers/production
        Some(
            tracing_subscriber::fmt::layer()
                .json()
                .with_target(true)
                .with_thread_ids(true)
                .with_file(true)
                .with_line_number(true)
                .boxed(),
        )
    } else {
        // Pretty output for development
        Some(
            tracing_subscriber::fmt::layer()
                .with_target(true)
                .with_thread_ids(false)
                .with_ansi(true)
                .boxed(),
        )
    };

    tracing_subscriber::registry()
        .with(env_filter)
        .with(fmt_layer)
        .try_init()
        .map_err(|e| TelemetryError::LoggingInit(e.to_string()))?;

    tracing::info!(
        service = %config.service_name,
        json_logs = config.json_logs,
        level = %config.log_level,
        "Structured logging initialized"
    );

    Ok(StructuredLogger { _initialized: true })
}

/// Log a still-request event with standard fields.
///
/// ```rust,ignore
/// log_request_event!(info, request_id, "Still captured", bytes = image.len());
/// ```
#[macro_export]
macro_rules! log_request_event {
    ($level:ident, $request_id:expr, $msg:expr $(, $($field:tt)*)?) => {
        tracing::$level!(
            request_id = %$request_id,
            $($($field)*,)?
            $msg
        )
    };
}

