use std::path::Path;

use anyhow::Result;
use file_rotate::{
    compression::Compression,
    suffix::{AppendTimestamp, FileLimit},
    {ContentLimit, FileRotate},
};
use simplelog::{
    ColorChoice, CombinedLogger, ConfigBuilder, LevelFilter, SharedLogger, TermLogger,
    TerminalMode, WriteLogger,
};

pub const LOG_FILE_NAME: &str = "gpx_tracker.log";

fn rotating_log_file(log_dir: &Path) -> FileRotate<AppendTimestamp> {
    FileRotate::new(
        log_dir.join(LOG_FILE_NAME),
        AppendTimestamp::default(FileLimit::MaxFiles(3)),
        ContentLimit::Lines(1000),
        Compression::None,
        #[cfg(unix)]
        None,
    )
}

/// Installs the global logger: stderr always, plus a rotating file under
/// `log_dir` when one is given. Fails if a logger is already installed.
pub fn init(log_dir: Option<&Path>, level: LevelFilter) -> Result<()> {
    let config = ConfigBuilder::new().set_time_format_rfc3339().build();

    let mut loggers: Vec<Box<dyn SharedLogger>> = Vec::new();
    loggers.push(TermLogger::new(
        level,
        config.clone(),
        TerminalMode::Stderr,
        ColorChoice::Auto,
    ));
    if let Some(log_dir) = log_dir {
        std::fs::create_dir_all(log_dir)?;
        loggers.push(WriteLogger::new(level, config, rotating_log_file(log_dir)));
    }
    CombinedLogger::init(loggers)?;
    Ok(())
}
