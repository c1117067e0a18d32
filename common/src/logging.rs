use std::io::Write;
use std::str::FromStr;

use slog::{o, Drain};

/// How log records are rendered: for people or for log collectors.
#[derive(Debug, Eq, PartialEq, Clone, Copy)]
pub enum LogFormat {
    Human,
    Json,
}

impl FromStr for LogFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "h" | "human" => Ok(LogFormat::Human),
            "j" | "json" => Ok(LogFormat::Json),
            _ => Err("invalid log format".to_string()),
        }
    }
}

fn drain_for<W: Write + Send + 'static>(
    name: &'static str,
    format: LogFormat,
    out: W,
) -> slog_async::Async {
    match format {
        LogFormat::Json => {
            let drain = slog_bunyan::with_name(name, out).build().fuse();
            slog_async::Async::new(drain).chan_size(32768).build()
        }
        LogFormat::Human => {
            let decorator = slog_term::PlainDecorator::new(out);
            let drain = slog_term::FullFormat::new(decorator).build().fuse();
            slog_async::Async::new(drain).chan_size(32768).build()
        }
    }
}

/// Build the root logger, writing to `log_file` if given and stdout
/// otherwise.
pub fn init(
    name: &'static str,
    log_file: &Option<String>,
    format: LogFormat,
) -> anyhow::Result<slog::Logger> {
    let drain = match log_file {
        Some(path) => {
            let file = std::fs::OpenOptions::new()
                .create(true)
                .append(true)
                .open(path)?;
            drain_for(name, format, file)
        }
        None => drain_for(name, format, std::io::stdout()),
    };
    Ok(slog::Logger::root(drain.fuse(), o!()))
}
