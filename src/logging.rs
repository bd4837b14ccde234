//! Structured logging utilities for Tagstash
//!
//! All logs use structured fields for easy parsing and analysis.
//!
//! # Log Format Conventions
//!
//! - `service`: The component emitting the event ("cache", "loader", "node")
//! - `operation`: The operation being performed (e.g., "get", "put", "load")
//! - `status`: The result status ("success", "miss", "reused", "rejected")
//! - `key`: Cache key
//! - `tag`: Tag (bucket) of the entry
//!
//! # Examples
//!
//! ```rust
//! use tracing::info;
//! use tagstash::logging::{operations, services, status};
//!
//! info!(
//!     service = services::LOADER,
//!     operation = operations::LOAD,
//!     status = status::REUSED,
//!     key = "base model",
//!     "cached ckpt reused, loading skipped"
//! );
//! ```

use std::fmt::{self as std_fmt, Debug};
use std::io::{self, IsTerminal};
use tracing::field::{Field, Visit};
use tracing::{Event, Level, Subscriber};
use tracing_subscriber::fmt::{self, format::Writer, FmtContext, FormatEvent, FormatFields};
use tracing_subscriber::registry::LookupSpan;
use tracing_subscriber::{prelude::*, EnvFilter};

/// Text formatter: `time LEVEL (tagstash) service.operation: message field=value ...`
struct EventFormatter {
    ansi: bool,
}

/// Event fields split into the header pair, the message and the rest
#[derive(Default)]
struct EventFields {
    service: Option<String>,
    operation: Option<String>,
    message: String,
    rest: Vec<(&'static str, String)>,
}

impl Visit for EventFields {
    fn record_str(&mut self, field: &Field, value: &str) {
        match field.name() {
            "service" => self.service = Some(value.to_string()),
            "operation" => self.operation = Some(value.to_string()),
            name => self.rest.push((name, value.to_string())),
        }
    }

    fn record_debug(&mut self, field: &Field, value: &dyn Debug) {
        match field.name() {
            "message" => self.message = format!("{:?}", value),
            name => self.rest.push((name, format!("{:?}", value))),
        }
    }
}

fn level_color(level: &Level) -> &'static str {
    match *level {
        Level::ERROR => "\x1b[31m",
        Level::WARN => "\x1b[33m",
        Level::INFO => "\x1b[32m",
        Level::DEBUG => "\x1b[34m",
        Level::TRACE => "\x1b[35m",
    }
}

impl<S, N> FormatEvent<S, N> for EventFormatter
where
    S: Subscriber + for<'a> LookupSpan<'a>,
    N: for<'a> FormatFields<'a> + 'static,
{
    fn format_event(
        &self,
        _ctx: &FmtContext<'_, S, N>,
        mut writer: Writer<'_>,
        event: &Event<'_>,
    ) -> std_fmt::Result {
        let level = event.metadata().level();
        let mut fields = EventFields::default();
        event.record(&mut fields);

        write!(writer, "{} ", chrono::Local::now().format("%H:%M:%S%.3f"))?;
        if self.ansi {
            write!(writer, "{}{:5}\x1b[0m ", level_color(level), level)?;
        } else {
            write!(writer, "{:5} ", level)?;
        }
        write!(writer, "(tagstash)")?;
        match (&fields.service, &fields.operation) {
            (Some(service), Some(operation)) => write!(writer, " {}.{}", service, operation)?,
            (Some(service), None) => write!(writer, " {}", service)?,
            _ => {}
        }
        write!(writer, ": {}", fields.message)?;
        for (name, value) in &fields.rest {
            write!(writer, " {}={}", name, value)?;
        }
        writeln!(writer)
    }
}

/// Log format options
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogFormat {
    /// Colored text when stderr is a terminal
    Pretty,
    /// Plain text
    Compact,
    /// One JSON object per event
    Json,
}

impl LogFormat {
    /// Read `TAGSTASH_LOG_FORMAT`, defaulting to compact under `CI`
    pub fn from_env() -> Self {
        match std::env::var("TAGSTASH_LOG_FORMAT")
            .unwrap_or_default()
            .to_lowercase()
            .as_str()
        {
            "json" => Self::Json,
            "compact" => Self::Compact,
            "pretty" => Self::Pretty,
            _ if std::env::var("CI").is_ok() => Self::Compact,
            _ => Self::Pretty,
        }
    }
}

/// Initialize the global tracing subscriber on stderr
///
/// `RUST_LOG` sets the filter (default `info`), `TAGSTASH_LOG_FORMAT` the format.
pub fn init() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let format = LogFormat::from_env();

    let text = (format != LogFormat::Json).then(|| {
        fmt::layer()
            .event_format(EventFormatter {
                ansi: format == LogFormat::Pretty && io::stderr().is_terminal(),
            })
            .with_writer(io::stderr)
    });
    let json = (format == LogFormat::Json).then(|| {
        fmt::layer()
            .with_target(false)
            .with_ansi(false)
            .with_writer(io::stderr)
            .json()
    });

    tracing_subscriber::registry()
        .with(filter)
        .with(text)
        .with(json)
        .init();
}

/// Service names for consistent logging
pub mod services {
    pub const CACHE: &str = "cache";
    pub const SETTINGS: &str = "settings";
    pub const LOADER: &str = "loader";
    pub const NODE: &str = "node";
}

/// Operation names for consistent logging
pub mod operations {
    pub const GET: &str = "get";
    pub const PUT: &str = "put";
    pub const DELETE: &str = "delete";
    pub const CLEAR: &str = "clear";
    pub const EVICT: &str = "evict";
    pub const RECONFIGURE: &str = "reconfigure";
    pub const LOAD: &str = "load";
    pub const SAVE: &str = "save";
}

/// Status values for consistent logging
pub mod status {
    pub const SUCCESS: &str = "success";
    pub const MISS: &str = "miss";
    pub const REUSED: &str = "reused";
    pub const REJECTED: &str = "rejected";
    pub const ERROR: &str = "error";
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;
    use std::sync::{Arc, Mutex};
    use tracing::info;

    #[derive(Clone, Default)]
    struct Captured(Arc<Mutex<Vec<u8>>>);

    impl io::Write for Captured {
        fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
            self.0.lock().unwrap().extend_from_slice(buf);
            Ok(buf.len())
        }

        fn flush(&mut self) -> io::Result<()> {
            Ok(())
        }
    }

    fn capture(emit: impl FnOnce()) -> String {
        let captured = Captured::default();
        let writer = captured.clone();
        let subscriber = tracing_subscriber::registry().with(
            fmt::layer()
                .event_format(EventFormatter { ansi: false })
                .with_writer(move || writer.clone()),
        );
        tracing::subscriber::with_default(subscriber, emit);
        let bytes = captured.0.lock().unwrap().clone();
        String::from_utf8(bytes).unwrap()
    }

    #[test]
    fn test_formatter_puts_service_and_operation_in_header() {
        let line = capture(|| {
            info!(
                service = services::LOADER,
                operation = operations::LOAD,
                status = status::REUSED,
                key = "base",
                "Cached 'base' is loaded"
            )
        });

        assert!(line.contains("INFO"));
        assert!(line.contains(
            "(tagstash) loader.load: Cached 'base' is loaded status=reused key=base"
        ));
        assert!(line.ends_with('\n'));
    }

    #[test]
    fn test_formatter_without_service() {
        let line = capture(|| info!(count = 3u64, "plain event"));
        assert!(line.contains("(tagstash): plain event count=3"));
    }

    #[test]
    #[serial]
    fn test_log_format_from_env() {
        std::env::set_var("TAGSTASH_LOG_FORMAT", "json");
        assert_eq!(LogFormat::from_env(), LogFormat::Json);

        std::env::set_var("TAGSTASH_LOG_FORMAT", "Compact");
        assert_eq!(LogFormat::from_env(), LogFormat::Compact);

        std::env::set_var("TAGSTASH_LOG_FORMAT", "pretty");
        assert_eq!(LogFormat::from_env(), LogFormat::Pretty);

        std::env::remove_var("TAGSTASH_LOG_FORMAT");
    }

    #[test]
    #[serial]
    fn test_log_format_defaults_to_compact_in_ci() {
        std::env::remove_var("TAGSTASH_LOG_FORMAT");
        let previous = std::env::var("CI").ok();

        std::env::set_var("CI", "true");
        assert_eq!(LogFormat::from_env(), LogFormat::Compact);

        std::env::remove_var("CI");
        assert_eq!(LogFormat::from_env(), LogFormat::Pretty);

        if let Some(value) = previous {
            std::env::set_var("CI", value);
        }
    }
}
