//! CLI command implementations

use std::io::{self, Write};
use std::path::Path;

use crate::config::CoordinatorConfig;
use crate::context::LraContext;
use crate::inspect::{record_kinds, render_text, StoreSnapshot};
use crate::observability::{log_event, log_event_with_fields, Event};
use crate::recovery::IntervalScheduler;
use crate::store::{FileStore, RecordKind};

use super::args::Command;
use super::errors::{CliError, CliResult};

/// Parse arguments and run the selected command
pub fn run() -> CliResult<()> {
    let cli = super::args::Cli::parse_args();
    run_command(cli.command)
}

/// Run the appropriate command based on CLI args
pub fn run_command(cmd: Command) -> CliResult<()> {
    match cmd {
        Command::Run { config } => serve(&config),
        Command::Recover { config } => recover(&config),
        Command::Inspect { config, kind, json } => inspect(&config, kind, json),
    }
}

fn load_config(config_path: &Path) -> CliResult<CoordinatorConfig> {
    let config = CoordinatorConfig::load(config_path)?;
    let data_dir = config.data_dir.display().to_string();
    log_event_with_fields(Event::ConfigLoaded, &[("data_dir", data_dir.as_str())]);
    Ok(config)
}

fn runtime() -> CliResult<tokio::runtime::Runtime> {
    tokio::runtime::Runtime::new()
        .map_err(|e| CliError::boot_failed(format!("Failed to create tokio runtime: {}", e)))
}

/// Boot the coordinator and sweep until Ctrl-C, then shut down gracefully
pub fn serve(config_path: &Path) -> CliResult<()> {
    let config = load_config(config_path)?;

    runtime()?.block_on(async {
        log_event(Event::BootStart);
        let interval = config.recovery_interval();
        let ctx = LraContext::open(config)?;
        ctx.start_recovery(&IntervalScheduler::new(interval))?;
        log_event(Event::BootComplete);

        tokio::signal::ctrl_c()
            .await
            .map_err(|e| CliError::io_error(format!("Failed to wait for Ctrl-C: {}", e)))?;

        ctx.shutdown().await;
        Ok::<(), CliError>(())
    })
}

/// Run one sweep over the store and print the report as JSON
pub fn recover(config_path: &Path) -> CliResult<()> {
    let config = load_config(config_path)?;

    let report = runtime()?.block_on(async {
        let ctx = LraContext::open(config)?;
        let report = ctx.run_recovery_sweep().await?;
        ctx.shutdown().await;
        Ok::<_, CliError>(report)
    })?;

    let mut stdout = io::stdout();
    serde_json::to_writer(&mut stdout, &report)?;
    writeln!(stdout)?;
    Ok(())
}

/// Print persisted records without touching them
pub fn inspect(config_path: &Path, kind: Option<RecordKind>, json: bool) -> CliResult<()> {
    let config = load_config(config_path)?;
    let store = FileStore::open(&config.data_dir)?;

    let kinds: Vec<RecordKind> = match kind {
        Some(kind) => vec![kind],
        None => record_kinds().to_vec(),
    };
    let snapshots = kinds
        .into_iter()
        .map(|kind| StoreSnapshot::take(&store, kind))
        .collect::<Result<Vec<_>, _>>()?;

    let mut stdout = io::stdout();
    if json {
        serde_json::to_writer_pretty(&mut stdout, &snapshots)?;
        writeln!(stdout)?;
    } else {
        for snapshot in &snapshots {
            write!(stdout, "{}", render_text(snapshot))?;
        }
    }
    Ok(())
}
