// File: ./src/logging.rs
// Installs the process-wide logger: stderr always, a log file on request.
use crate::config::Config;
use crate::context::AppContext;
use anyhow::{Context, Result};
use log::LevelFilter;
use simplelog::{
    ColorChoice, CombinedLogger, ConfigBuilder, SharedLogger, TermLogger, TerminalMode,
    WriteLogger,
};
use std::fs::OpenOptions;

/// Maps a config string to a level. Unknown values fall back to `info`.
pub fn parse_level(value: &str) -> LevelFilter {
    match value.trim().to_lowercase().as_str() {
        "off" => LevelFilter::Off,
        "error" => LevelFilter::Error,
        "warn" | "warning" => LevelFilter::Warn,
        "info" => LevelFilter::Info,
        "debug" => LevelFilter::Debug,
        "trace" => LevelFilter::Trace,
        other => {
            eprintln!("Unknown log level '{}', using info", other);
            LevelFilter::Info
        }
    }
}

/// Must be called once, before anything logs.
pub fn init(config: &Config, ctx: &dyn AppContext) -> Result<()> {
    let level = parse_level(&config.log_level);
    let log_config = ConfigBuilder::new()
        .set_time_format_rfc3339()
        .add_filter_allow_str("mdsync")
        .build();

    let mut loggers: Vec<Box<dyn SharedLogger>> = vec![TermLogger::new(
        level,
        log_config.clone(),
        TerminalMode::Stderr,
        ColorChoice::Auto,
    )];

    if config.log_to_file {
        let path = ctx.get_log_path()?;
        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)
            .with_context(|| format!("Failed to open log file {:?}", path))?;
        loggers.push(WriteLogger::new(level, log_config, file));
    }

    CombinedLogger::init(loggers).context("Logger already initialized")?;
    Ok(())
}
