use std::fs::File;
use std::io::{self, BufRead, BufReader};
use std::path::PathBuf;
use std::process::ExitCode;

use anyhow::{Context, Result};
use clap::Parser;
use gpx_tracker::config::{HostConfig, TrackerConfig};
use gpx_tracker::logs;
use gpx_tracker::plugin::{GpxTrackerPlugin, MessagePlugin};
use log::{debug, error, info};
use simplelog::LevelFilter;

/// Feeds newline-delimited JSON mesh packets to the GPX tracker plugin, the
/// way the relay host would.
#[derive(Parser)]
#[command(name = "gpx_tracker")]
#[command(about = "Record mesh position reports as GPX tracks")]
struct Cli {
    /// Host config file (YAML) with a `plugins.gpxtracker` section
    #[arg(long)]
    config: Option<PathBuf>,
    /// Packets to process, one JSON object per line (default: stdin)
    #[arg(long)]
    input: Option<PathBuf>,
    /// Also write a rotating log file into this directory
    #[arg(long)]
    log_dir: Option<PathBuf>,
    #[arg(short, long)]
    verbose: bool,
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    let level = if cli.verbose {
        LevelFilter::Debug
    } else {
        LevelFilter::Info
    };
    if let Err(e) = logs::init(cli.log_dir.as_deref(), level) {
        eprintln!("Failed to initialize logging: {e:#}");
        return ExitCode::FAILURE;
    }

    match run(&cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!("{e:#}");
            ExitCode::FAILURE
        }
    }
}

fn run(cli: &Cli) -> Result<()> {
    let config = match &cli.config {
        Some(path) => HostConfig::from_file(path)?.plugins.gpxtracker,
        None => TrackerConfig::default(),
    };
    let plugin = GpxTrackerPlugin::new(config);
    info!(
        "{} writing to {}",
        plugin.plugin_name(),
        plugin.config().gpx_directory.display()
    );

    let input: Box<dyn BufRead> = match &cli.input {
        Some(path) => Box::new(BufReader::new(
            File::open(path).with_context(|| format!("failed to open {}", path.display()))?,
        )),
        None => Box::new(BufReader::new(io::stdin())),
    };

    let mut processed = 0usize;
    for (line_no, line) in input.lines().enumerate() {
        let line = line?;
        if line.trim().is_empty() {
            continue;
        }
        match serde_json::from_str::<serde_json::Value>(&line) {
            Ok(packet) => {
                plugin.handle_meshtastic_message(&packet);
                processed += 1;
            }
            Err(e) => debug!("skipping line {}: {e}", line_no + 1),
        }
    }
    info!("processed {processed} packets");
    Ok(())
}
