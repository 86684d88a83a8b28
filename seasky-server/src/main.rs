//! seasky: live aircraft and ship track fusion server.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use clap::{Parser, Subcommand, ValueEnum};
use comfy_table::{Cell, Table};
use tokio::sync::watch;
use tracing::info;

use seasky_core::config::{self, Config};
use seasky_core::liveness::LivenessRegistry;
use seasky_core::reference::ReferenceData;
use seasky_core::table::{TableSettings, TrackTable};
use seasky_core::types::now_millis;

mod ingest;
mod logging;
mod maintenance;
mod sources;
mod web;

use ingest::{AisIngest, AvrIngest, BeastIngest, Ingest};
use maintenance::Schedule;

#[derive(Parser)]
#[command(name = "seasky", version, about = "Aircraft and ship track fusion server")]
struct Cli {
    /// Config file (default ~/.seasky/config.yaml)
    #[arg(long, env = "SEASKY_CONFIG", global = true)]
    config: Option<PathBuf>,

    /// Track store path, overrides the config file
    #[arg(long, global = true)]
    store: Option<String>,

    /// Web server port, overrides the config file
    #[arg(long, global = true)]
    port: Option<u16>,

    /// Log filter when RUST_LOG is unset, e.g. "debug" or "seasky=debug"
    #[arg(long, global = true)]
    log_level: Option<String>,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the server: sources, maintenance, backups and the JSON API
    Run,

    /// Feed a captured stream through the pipeline and print the table
    Replay {
        /// Capture file
        file: PathBuf,

        /// Wire format of the capture
        #[arg(long, value_enum, default_value_t = FeedFormat::Beast)]
        format: FeedFormat,
    },

    /// Load a track store and print what it holds
    Inspect {
        /// Track store path
        store: PathBuf,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum FeedFormat {
    /// BEAST binary
    Beast,
    /// AVR hex text, one frame per line
    Avr,
    /// NMEA AIS sentences
    Ais,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    logging::init(cli.log_level.as_deref());

    let mut config = config::load_config(cli.config.as_deref()).context("loading config")?;
    if let Some(store) = cli.store {
        config.tracks.store_path = store;
    }
    if let Some(port) = cli.port {
        config.web.port = port;
    }

    match cli.command.unwrap_or(Commands::Run) {
        Commands::Run => cmd_run(config).await,
        Commands::Replay { file, format } => cmd_replay(&config, &file, format),
        Commands::Inspect { store } => cmd_inspect(&store),
    }
}

fn load_reference(config: &Config) -> anyhow::Result<Option<ReferenceData>> {
    config
        .reference
        .path
        .as_deref()
        .map(|p| ReferenceData::load(Path::new(p)))
        .transpose()
        .context("loading reference data")
}

async fn cmd_run(config: Config) -> anyhow::Result<()> {
    let now = now_millis();
    let table = Arc::new(TrackTable::new(config.table_settings()));
    let report = table.initialise(now);
    info!(
        tracks = table.len(),
        culled = report.points_culled,
        dropped = report.tracks_dropped,
        "track table initialised"
    );

    let reference = load_reference(&config)?;
    if let Some(data) = &reference {
        table.load_fixed_reference_entities(data.fixed_tracks(now));
        table.load_name_cache_seed(data.name_seed());
    }
    let position = reference.as_ref().and_then(ReferenceData::reference_position);

    let registry = Arc::new(LivenessRegistry::new());
    let (shutdown_tx, shutdown_rx) = watch::channel(false);

    let sources = sources::build_sources(&config.sources, &registry, position);
    let source_tasks = sources::spawn_sources(sources, &table, &shutdown_rx);

    let schedule = Schedule {
        maintenance: Duration::from_secs(config.tracks.maintenance_secs.max(1)),
        backup: Duration::from_secs(config.tracks.backup_secs.max(1)),
        print_table: config.tracks.print_table,
    };
    let maintenance = maintenance::spawn_maintenance(
        Arc::clone(&table),
        Arc::clone(&registry),
        schedule,
        shutdown_rx.clone(),
    );
    let backup = maintenance::spawn_backup(Arc::clone(&table), schedule.backup, shutdown_rx.clone());

    let state = Arc::new(web::AppState {
        table: Arc::clone(&table),
        liveness: Arc::clone(&registry),
        version: env!("CARGO_PKG_VERSION").to_string(),
        readable_json: config.web.readable_json,
    });
    let host = config.web.host.clone();
    let port = config.web.port;
    let mut web_task =
        tokio::spawn(async move { web::serve(state, &host, port, shutdown_rx).await });

    let web_finished = tokio::select! {
        signal = shutdown_signal() => {
            signal?;
            None
        }
        result = &mut web_task => Some(result),
    };

    info!("shutting down");
    shutdown_tx.send_replace(true);
    for task in source_tasks {
        task.await.context("source task")?;
    }
    maintenance.await.context("maintenance task")?;
    // Final save happens inside the backup task
    backup.await.context("backup task")?;

    let web_result = match web_finished {
        Some(result) => result,
        None => web_task.await,
    };
    web_result.context("web task")?.context("web server")?;

    info!("stopped");
    Ok(())
}

fn cmd_replay(config: &Config, file: &Path, format: FeedFormat) -> anyhow::Result<()> {
    let data = std::fs::read(file).with_context(|| format!("reading {}", file.display()))?;
    let position = load_reference(config)?
        .as_ref()
        .and_then(ReferenceData::reference_position);

    // Replays never touch the live store
    let table = TrackTable::new(TableSettings {
        store_path: PathBuf::new(),
        ..config.table_settings()
    });

    let mut ingest: Box<dyn Ingest> = match format {
        FeedFormat::Beast => Box::new(BeastIngest::new("replay", position)),
        FeedFormat::Avr => Box::new(AvrIngest::new("replay", position)),
        FeedFormat::Ais => Box::new(AisIngest::new("replay")),
    };

    let now = now_millis();
    ingest.feed(&table, &data, now);
    ingest.finish(&table, now);
    let stats = ingest.stats();

    println!();
    println!("Replay complete: {}", file.display());
    println!(
        "  Messages: {} total, {} merged, {} rejected",
        stats.messages, stats.merged, stats.rejected
    );
    println!("  Tracks: {}", table.summary());
    println!();
    if !table.is_empty() {
        println!("{}", table.render(now));
    }
    Ok(())
}

/// Resolves on Ctrl-C, or SIGTERM on Unix.
async fn shutdown_signal() -> anyhow::Result<()> {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{signal, SignalKind};

        let mut terminate =
            signal(SignalKind::terminate()).context("installing SIGTERM handler")?;
        tokio::select! {
            result = tokio::signal::ctrl_c() => result.context("waiting for ctrl-c"),
            _ = terminate.recv() => {
                info!("received SIGTERM");
                Ok(())
            }
        }
    }
    #[cfg(not(unix))]
    {
        tokio::signal::ctrl_c().await.context("waiting for ctrl-c")
    }
}

fn cmd_inspect(store: &Path) -> anyhow::Result<()> {
    anyhow::ensure!(store.exists(), "no track store at {}", store.display());

    let table = TrackTable::new(TableSettings {
        store_path: store.to_path_buf(),
        ..TableSettings::default()
    });
    let loaded = table
        .read_store_only()
        .with_context(|| format!("reading track store {}", store.display()))?;

    println!();
    println!("Track store: {}", store.display());
    println!("  Tracks:     {loaded}");
    println!("  AIS names:  {}", table.name_cache_len());
    println!();

    let mut counts = Table::new();
    counts.set_header(vec!["Type", "Tracks"]);
    for (track_type, count) in table.counts_by_type() {
        counts.add_row(vec![Cell::new(track_type), Cell::new(count)]);
    }
    println!("{counts}");
    Ok(())
}
