//! Logging and observability
//!
//! Structured logging via `tracing`, in text or JSON form, selected at runtime
//! through environment variables and CLI flags.
//!
//! All logging output is directed to stderr. Stdout belongs to phase output so
//! that a local run and a pipeline run print the same bytes.

use anyhow::Result;
use std::{io, sync::Once};
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

static INIT: Once = Once::new();

/// Initialize the logging system with an optional format specification
///
/// Subsequent calls are no-ops.
///
/// ## Arguments
///
/// * `format` - `None` or `"text"` for human-readable output, `"json"` for
///   one JSON object per line. Unknown values fall back to text.
///
/// ## Environment Variables
///
/// * `CIRUN_LOG_FORMAT` - Format used when `format` is `None`
/// * `CIRUN_LOG` - Filter directive (takes precedence over `RUST_LOG`)
/// * `RUST_LOG` - Standard fallback filter
/// * `CIRUN_LOG_SPAN_EVENTS` - Span lifecycle events to emit (`new,close`, `full`, ...)
///
/// ## Example
///
/// ```rust
/// use cirun_core::logging;
///
/// logging::init(None).expect("Failed to initialize logging");
/// ```
pub fn init(format: Option<&str>) -> Result<()> {
    init_with_filter(format, "info")
}

/// Like [`init`], with `default_directive` applied when neither `CIRUN_LOG`
/// nor `RUST_LOG` is set.
///
/// The process environment is left untouched, so phase commands see the
/// caller's `RUST_LOG` exactly as it was.
pub fn init_with_filter(format: Option<&str>, default_directive: &str) -> Result<()> {
    INIT.call_once(|| {
        let filter = create_env_filter(default_directive);

        let env_format = std::env::var("CIRUN_LOG_FORMAT").ok();
        let effective_format = format.or(env_format.as_deref()).unwrap_or("text");
        let span_events = span_events_for_format(effective_format);

        match effective_format {
            "json" => {
                tracing_subscriber::registry()
                    .with(
                        fmt::layer()
                            .json()
                            .with_target(true)
                            .with_span_events(span_events)
                            .with_writer(io::stderr),
                    )
                    .with(filter)
                    .init();
            }
            _ => {
                tracing_subscriber::registry()
                    .with(
                        fmt::layer()
                            .with_target(true)
                            .with_span_events(span_events)
                            .with_writer(io::stderr),
                    )
                    .with(filter)
                    .init();
            }
        }

        tracing::debug!("Logging initialized with format: {}", effective_format);
    });

    Ok(())
}

/// Create an EnvFilter from `CIRUN_LOG`, then `RUST_LOG`, then `default_directive`
fn create_env_filter(default_directive: &str) -> EnvFilter {
    let fallback = || EnvFilter::try_new(default_directive).unwrap_or_else(|_| EnvFilter::new("info"));

    if let Ok(cirun_log) = std::env::var("CIRUN_LOG") {
        EnvFilter::try_new(&cirun_log).unwrap_or_else(|_| {
            tracing::warn!(
                "Invalid CIRUN_LOG specification '{}', using default '{}'",
                cirun_log,
                default_directive
            );
            fallback()
        })
    } else if std::env::var_os("RUST_LOG").is_some() {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| fallback())
    } else {
        fallback()
    }
}

/// Determine span lifecycle event configuration based on env var and format
fn span_events_for_format(format: &str) -> fmt::format::FmtSpan {
    use fmt::format::FmtSpan;

    if let Ok(raw) = std::env::var("CIRUN_LOG_SPAN_EVENTS") {
        return parse_span_events(&raw);
    }

    match format {
        "json" => FmtSpan::NEW | FmtSpan::CLOSE,
        _ => FmtSpan::NONE,
    }
}

fn parse_span_events(raw: &str) -> fmt::format::FmtSpan {
    use fmt::format::FmtSpan;

    let mut acc = FmtSpan::NONE;
    for token in raw.split(&[',', '|'][..]).map(|t| t.trim().to_lowercase()) {
        acc |= match token.as_str() {
            "new" => FmtSpan::NEW,
            "close" => FmtSpan::CLOSE,
            "enter" => FmtSpan::ENTER,
            "exit" => FmtSpan::EXIT,
            "active" => FmtSpan::ACTIVE,
            "full" => FmtSpan::FULL,
            _ => FmtSpan::NONE,
        };
    }
    acc
}

/// Check if logging has been initialized
pub fn is_initialized() -> bool {
    INIT.is_completed()
}

#[cfg(test)]
mod tests {
    use super::*;
    use fmt::format::FmtSpan;
    use serial_test::serial;

    #[test]
    #[serial]
    fn test_init_multiple_calls_safe() {
        assert!(init(None).is_ok());
        assert!(init(Some("json")).is_ok());
        assert!(init(Some("invalid")).is_ok());
        assert!(is_initialized());
    }

    #[test]
    fn test_parse_span_events() {
        assert_eq!(parse_span_events("none"), FmtSpan::NONE);
        assert_eq!(parse_span_events("new,close"), FmtSpan::NEW | FmtSpan::CLOSE);
        assert_eq!(parse_span_events("NEW | exit"), FmtSpan::NEW | FmtSpan::EXIT);
        assert_eq!(parse_span_events("bogus"), FmtSpan::NONE);
    }

    #[test]
    #[serial]
    fn test_span_events_default_by_format() {
        std::env::remove_var("CIRUN_LOG_SPAN_EVENTS");
        assert_eq!(span_events_for_format("text"), FmtSpan::NONE);
        assert_eq!(
            span_events_for_format("json"),
            FmtSpan::NEW | FmtSpan::CLOSE
        );
    }

    #[test]
    #[serial]
    fn test_env_filter_with_env_vars() {
        std::env::set_var("CIRUN_LOG", "trace");
        let _filter = create_env_filter("info");
        std::env::set_var("CIRUN_LOG", "invalid_spec_@@[");
        let _filter = create_env_filter("info");
        std::env::remove_var("CIRUN_LOG");
    }

    #[test]
    #[serial]
    fn test_default_directive_leaves_rust_log_unset() {
        std::env::remove_var("CIRUN_LOG");
        std::env::remove_var("RUST_LOG");
        let filter = create_env_filter("cirun=debug,cirun_core=debug");
        let rendered = filter.to_string();
        assert!(rendered.contains("cirun=debug"));
        assert!(rendered.contains("cirun_core=debug"));
        assert!(std::env::var_os("RUST_LOG").is_none());
    }
}
