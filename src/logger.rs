use std::io;

use chrono::Local;
use fern::Dispatch;
use log::LevelFilter;

pub const ENV_DEBUG: &str = "RMI_DEBUG";

fn parse_level(value: Option<&str>) -> LevelFilter {
    match value {
        Some("trace") => LevelFilter::Trace,
        Some("debug") => LevelFilter::Debug,
        Some("info") => LevelFilter::Info,
        Some("warn") => LevelFilter::Warn,
        Some("error") => LevelFilter::Error,
        Some("off") => LevelFilter::Off,
        _ => LevelFilter::Info, // default if unset or unknown
    }
}

pub fn logging_level() -> LevelFilter {
    parse_level(std::env::var(ENV_DEBUG).ok().as_deref())
}

/// Installs a stdout logger at the level named by `RMI_DEBUG`.
///
/// Safe to call more than once; only the first call installs anything.
pub fn setup_logger() {
    let level_filter = logging_level();

    if let Err(e) = Dispatch::new()
        .format(move |out, message, record| {
            let file = record.file().unwrap_or("unknown_file");
            let line = record.line().map_or(0, |l| l);

            match level_filter {
                LevelFilter::Info => {
                    out.finish(format_args!(
                        "[{}]: {} <{}:{}>",
                        record.level(),
                        message,
                        file,
                        line,
                    ));
                }
                _ => {
                    out.finish(format_args!(
                        "[{}][{}][{}]: {} <{}:{}>",
                        Local::now().format("%b-%d-%Y %H:%M:%S.%f"),
                        record.level(),
                        record.target(),
                        message,
                        file,
                        line,
                    ));
                }
            }
        })
        .level(level_filter)
        .chain(io::stdout())
        .apply()
    {
        log::debug!("Logger already installed: {e}");
    }
}
