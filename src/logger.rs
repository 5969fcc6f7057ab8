//! Logging setup for applications and benchmarks using apex-triangulation
//!
//! The library itself only emits `tracing` events (cheirality warnings, workspace
//! allocation debug messages, logged errors). This module installs a subscriber
//! that prints them with a compact bracketed prefix.

use tracing::Level;

/// Install the standard subscriber with INFO as default level.
///
/// Format: `[LEVEL YYYY-MM-DD HH:MM:SS module]` for INFO/WARN/ERROR
///         `[LEVEL YYYY-MM-DD HH:MM:SS file:line]` for DEBUG/TRACE
///
/// Returns `false` if a global subscriber was already installed, in which case
/// nothing changes.
///
/// # Example
/// ```no_run
/// use apex_triangulation::init_logger;
///
/// init_logger();
/// tracing::info!("Triangulating 120 landmarks");
/// ```
///
/// # Environment Variables
/// ```bash
/// RUST_LOG=apex_triangulation=debug cargo bench
/// ```
pub fn init_logger() -> bool {
    init_logger_with_level(Level::INFO)
}

/// Install the standard subscriber with a custom default level (overrideable via RUST_LOG).
pub fn init_logger_with_level(default_level: Level) -> bool {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::builder()
                .with_default_directive(default_level.into())
                .from_env_lossy(),
        )
        .with_target(false)
        .with_level(false)
        .with_thread_ids(false)
        .event_format(BracketFormatter)
        .try_init()
        .is_ok()
}

struct BracketFormatter;

impl<S, N> tracing_subscriber::fmt::FormatEvent<S, N> for BracketFormatter
where
    S: tracing::Subscriber + for<'a> tracing_subscriber::registry::LookupSpan<'a>,
    N: for<'a> tracing_subscriber::fmt::FormatFields<'a> + 'static,
{
    fn format_event(
        &self,
        ctx: &tracing_subscriber::fmt::FmtContext<'_, S, N>,
        mut writer: tracing_subscriber::fmt::format::Writer<'_>,
        event: &tracing::Event<'_>,
    ) -> std::fmt::Result {
        use chrono::Local;

        let metadata = event.metadata();
        let level = *metadata.level();

        let (color, name) = match level {
            Level::ERROR => (31, "ERROR"),
            Level::WARN => (33, "WARN"),
            Level::INFO => (32, "INFO"),
            Level::DEBUG => (34, "DEBUG"),
            Level::TRACE => (35, "TRACE"),
        };
        write!(
            writer,
            "[\x1b[{color}m{name}\x1b[0m {} ",
            Local::now().format("%Y-%m-%d %H:%M:%S")
        )?;

        match (level >= Level::DEBUG, metadata.file()) {
            (true, Some(file)) => {
                let filename = file.rsplit('/').next().unwrap_or(file);
                write!(writer, "{}:{}", filename, metadata.line().unwrap_or(0))?;
            }
            _ => write!(writer, "{}", metadata.target())?,
        }

        write!(writer, "] ")?;
        ctx.field_format().format_fields(writer.by_ref(), event)?;
        writeln!(writer)
    }
}
