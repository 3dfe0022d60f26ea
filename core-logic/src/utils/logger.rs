use anyhow::{Context, Result};
use chrono::Local;
use nu_ansi_term::{Color, Style};
use std::fmt;
use std::fs::File;
use std::io::BufWriter;
use tracing::{Event, Subscriber};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{
    fmt::{format::Writer, FmtContext, FormatEvent, FormatFields},
    prelude::*,
    registry::LookupSpan,
    Layer,
};

/// Target used for the human-readable progress lines of a spam loop.
pub const STATUS_TARGET: &str = "spam_status";

pub fn setup_logger() -> Option<WorkerGuard> {
    // Create logs directory
    std::fs::create_dir_all("logs").ok();

    // HOURLY rotation, one file per hour under logs/
    let file_appender = tracing_appender::rolling::hourly("logs", "spam");
    let (non_blocking, guard) = tracing_appender::non_blocking(file_appender);

    // File layer: DEBUG for the spammer crates, INFO for others
    let file_filter = tracing_subscriber::filter::Targets::new()
        .with_target(STATUS_TARGET, tracing::Level::INFO)
        .with_target("sui_spammer", tracing::Level::DEBUG)
        .with_target("core_logic", tracing::Level::DEBUG)
        .with_default(tracing::Level::INFO);

    let file_layer = tracing_subscriber::fmt::layer()
        .with_writer(non_blocking)
        .with_ansi(false)
        .event_format(FileFormatter)
        .with_filter(file_filter);

    // Console layer: progress lines plus warnings from everything else
    let console_filter = tracing_subscriber::filter::Targets::new()
        .with_target(STATUS_TARGET, tracing::Level::INFO)
        .with_target("sui_spammer", tracing::Level::INFO)
        .with_target("core_logic", tracing::Level::INFO)
        .with_default(tracing::Level::WARN);

    let console_layer = tracing_subscriber::fmt::layer()
        .with_writer(std::io::stdout)
        .with_ansi(true)
        .event_format(TerminalFormatter)
        .with_filter(console_filter);

    // Combine both layers
    tracing_subscriber::registry()
        .with(file_layer)
        .with(console_layer)
        .init();

    // Return guard - MUST be kept alive by caller
    Some(guard)
}

/// File-only logger at full verbosity, for debug runs and tests.
pub fn setup_logger_with_file(log_path: &str) -> Result<WorkerGuard> {
    let file = File::create(log_path).context("Failed to create log file")?;
    let (non_blocking, guard) = tracing_appender::non_blocking(BufWriter::new(file));

    let subscriber = tracing_subscriber::registry().with(
        tracing_subscriber::fmt::layer()
            .with_writer(non_blocking)
            .with_ansi(false)
            .event_format(FileFormatter),
    );

    tracing::subscriber::set_global_default(subscriber)
        .context("Failed to set global subscriber")?;

    Ok(guard)
}

// --- Formatters ---

struct MessageVisitor {
    message: String,
}

impl tracing::field::Visit for MessageVisitor {
    fn record_debug(&mut self, field: &tracing::field::Field, value: &dyn fmt::Debug) {
        if field.name() == "message" {
            self.message = format!("{:?}", value);
        }
    }
    fn record_str(&mut self, field: &tracing::field::Field, value: &str) {
        if field.name() == "message" {
            self.message = value.to_string();
        }
    }
}

pub struct TerminalFormatter;

impl<S, N> FormatEvent<S, N> for TerminalFormatter
where
    S: Subscriber + for<'a> LookupSpan<'a>,
    N: for<'a> FormatFields<'a> + 'static,
{
    fn format_event(
        &self,
        _ctx: &FmtContext<'_, S, N>,
        mut writer: Writer<'_>,
        event: &Event<'_>,
    ) -> fmt::Result {
        // Extract message
        let mut msg_visitor = MessageVisitor {
            message: String::new(),
        };
        event.record(&mut msg_visitor);
        let msg = msg_visitor.message;

        let time = Style::new()
            .fg(Color::DarkGray)
            .paint(Local::now().format("%H:%M:%S").to_string());
        let colored_msg = colorize(event.metadata().level(), &msg);

        writeln!(writer, "{} {}", time, colored_msg)
    }
}

fn colorize(level: &tracing::Level, msg: &str) -> String {
    match *level {
        tracing::Level::ERROR => Style::new().fg(Color::LightRed).bold().paint(msg).to_string(),
        tracing::Level::WARN => Style::new().fg(Color::Yellow).paint(msg).to_string(),
        _ if msg.starts_with("spamming") => Color::LightGreen.paint(msg).to_string(),
        _ => msg.to_string(),
    }
}

pub struct FileFormatter;

impl<S, N> FormatEvent<S, N> for FileFormatter
where
    S: Subscriber + for<'a> LookupSpan<'a>,
    N: for<'a> FormatFields<'a> + 'static,
{
    fn format_event(
        &self,
        _ctx: &FmtContext<'_, S, N>,
        mut writer: Writer<'_>,
        event: &Event<'_>,
    ) -> fmt::Result {
        let timestamp = Local::now().format("%Y-%m-%d %H:%M:%S");
        let level = event.metadata().level();
        let target = event.metadata().target();

        write!(writer, "{} [{}] {}: ", timestamp, level, target)?;

        let mut msg_visitor = MessageVisitor {
            message: String::new(),
        };
        event.record(&mut msg_visitor);
        writeln!(writer, "{}", msg_visitor.message)
    }
}
