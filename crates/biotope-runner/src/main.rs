//! Command-line driver that advances an ecosystem on a timer.

mod exporter;
mod telemetry;

use anyhow::{bail, Context, Result};
use biotope_core::ConfigurationCatalog;
use biotope_world::{Ecosystem, SharedEcosystem};
use clap::Parser;
use exporter::{Exporter, TimeSlice};
use std::path::PathBuf;
use tokio::signal;
use tokio::time::{interval, Duration, MissedTickBehavior};
use tracing::{debug, error, info, warn};

/// Run a grid ecosystem of producers, prey and predators
#[derive(Parser, Debug)]
#[command(name = "biotope-runner")]
#[command(about = "Advance a grid ecosystem tick by tick")]
struct Args {
    /// Configuration catalog (JSON). Built-in defaults when omitted.
    #[arg(long)]
    config: Option<PathBuf>,

    /// Start from a snapshot file (.json or .bin) instead of a fresh layout
    #[arg(long, conflicts_with = "resume")]
    snapshot: Option<PathBuf>,

    /// Start from the latest snapshot in the export folder
    #[arg(long, requires = "export_dir")]
    resume: bool,

    /// Random seed; drawn from the clock when omitted
    #[arg(long)]
    seed: Option<u64>,

    /// Milliseconds between ticks
    #[arg(long, default_value_t = 100)]
    interval_ms: u64,

    /// Stop after this many ticks
    #[arg(long)]
    ticks: Option<u64>,

    /// Experiment folder for time slices, settings and snapshots
    #[arg(long)]
    export_dir: Option<PathBuf>,

    /// Write a snapshot every N ticks (needs --export-dir)
    #[arg(long, requires = "export_dir")]
    snapshot_every: Option<u64>,

    /// Snapshots kept when pruning
    #[arg(long, default_value_t = 5)]
    keep_snapshots: usize,

    /// Emit logs as JSON lines
    #[arg(long)]
    log_json: bool,

    /// Print the grid to stdout after every tick
    #[arg(long)]
    ascii: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    telemetry::init_telemetry(args.log_json)?;

    let catalog = match &args.config {
        Some(path) => ConfigurationCatalog::from_path(path)
            .with_context(|| format!("loading configuration {:?}", path))?,
        None => ConfigurationCatalog::default(),
    };
    let seed = args
        .seed
        .unwrap_or_else(|| chrono::Utc::now().timestamp_nanos_opt().unwrap_or_default() as u64);

    info!("Starting biotope runner");
    info!(seed = seed, interval_ms = args.interval_ms, "Run parameters");

    let exporter = match &args.export_dir {
        Some(dst) => {
            let exporter = Exporter::create(dst, &catalog).await?;
            info!(experiment = exporter.experiment(), "Exporting to {:?}", dst);
            Some(exporter)
        }
        None => None,
    };

    let snapshot_path = match (&args.snapshot, &exporter) {
        (Some(path), _) => Some(path.clone()),
        (None, Some(exporter)) if args.resume => {
            let latest = exporter::latest_snapshot(exporter.dst()).await?;
            if latest.is_none() {
                warn!("No snapshot to resume from, starting fresh");
            }
            latest
        }
        _ => None,
    };

    let ecosystem = match snapshot_path {
        Some(path) => {
            info!(path = ?path, "Restoring from snapshot");
            let snapshot = exporter::read_snapshot(&path).await?;
            Ecosystem::from_snapshot(catalog, &snapshot, seed)?
        }
        None => Ecosystem::new(catalog, seed)?,
    };

    let shared = SharedEcosystem::new(ecosystem);
    let shutdown = shutdown_signal();
    tokio::pin!(shutdown);

    tokio::select! {
        result = run_loop(&shared, exporter.as_ref(), &args) => result?,
        _ = &mut shutdown => {
            info!("Stopping at tick {}", shared.read().tick());
        }
    }

    if let Some(exporter) = &exporter {
        export_final_state(&shared, exporter).await?;
    }

    let ecosystem = shared.read();
    info!(
        tick = ecosystem.tick(),
        population = ecosystem.population(),
        "Runner finished"
    );
    Ok(())
}

async fn run_loop(
    shared: &SharedEcosystem,
    exporter: Option<&Exporter>,
    args: &Args,
) -> Result<()> {
    if args.snapshot_every == Some(0) {
        bail!("--snapshot-every must be at least 1");
    }

    let mut ticker = interval(Duration::from_millis(args.interval_ms.max(1)));
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    let mut completed = 0u64;

    loop {
        ticker.tick().await;

        if let Some(exporter) = exporter {
            let slice = TimeSlice::capture(&shared.read());
            if let Err(e) = exporter.export_time_slice(&slice).await {
                error!("Failed to export time slice: {}", e);
            }
        }

        let summary = shared.evolve();
        completed += 1;
        debug!(
            tick = summary.tick,
            population = summary.population,
            births = summary.births,
            deaths = summary.deaths(),
            "Tick complete"
        );

        if args.ascii {
            println!("tick {}\n{}\n", summary.tick, shared.read().render());
        }

        if let (Some(exporter), Some(every)) = (exporter, args.snapshot_every) {
            if summary.tick % every == 0 {
                exporter.export_snapshot(&shared.snapshot()).await?;
                exporter.prune_snapshots(args.keep_snapshots).await?;
            }
        }

        if summary.population == 0 {
            info!(tick = summary.tick, "Population extinct");
            return Ok(());
        }
        if args.ticks.is_some_and(|limit| completed >= limit) {
            info!(tick = summary.tick, "Tick limit reached");
            return Ok(());
        }
    }
}

/// The loop exports each slice before stepping, so the state it stopped on
/// still needs its slice, plus a snapshot to resume from.
async fn export_final_state(shared: &SharedEcosystem, exporter: &Exporter) -> Result<()> {
    let slice = TimeSlice::capture(&shared.read());
    exporter.export_time_slice(&slice).await?;
    exporter.export_snapshot(&shared.snapshot()).await?;
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            error!("Failed to listen for Ctrl+C: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
            }
            Err(e) => {
                error!("Failed to install SIGTERM handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }

    info!("Shutdown signal received");
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_args_defaults() {
        let args = Args::parse_from(["biotope-runner"]);
        assert_eq!(args.interval_ms, 100);
        assert!(args.config.is_none());
        assert!(args.ticks.is_none());
        assert_eq!(args.keep_snapshots, 5);
    }

    #[test]
    fn test_snapshot_every_requires_export_dir() {
        let result = Args::try_parse_from(["biotope-runner", "--snapshot-every", "10"]);
        assert!(result.is_err());

        let args = Args::try_parse_from([
            "biotope-runner",
            "--snapshot-every",
            "10",
            "--export-dir",
            "/tmp/run",
        ])
        .unwrap();
        assert_eq!(args.snapshot_every, Some(10));
    }

    #[tokio::test]
    async fn test_loop_stops_at_tick_limit() {
        let dir = tempfile::tempdir().unwrap();
        let mut catalog = ConfigurationCatalog::default();
        catalog.biotope.width = 20;
        catalog.biotope.height = 10;
        for species in &mut catalog.species {
            species.initial_count /= 50;
        }

        let dst = dir.path().join("loop");
        let args = Args::parse_from([
            "biotope-runner",
            "--interval-ms",
            "1",
            "--ticks",
            "3",
            "--export-dir",
            dst.to_str().unwrap(),
            "--snapshot-every",
            "2",
        ]);

        let exporter = Exporter::create(&dst, &catalog).await.unwrap();
        let shared = SharedEcosystem::new(Ecosystem::new(catalog, 4).unwrap());
        run_loop(&shared, Some(&exporter), &args).await.unwrap();

        assert_eq!(shared.read().tick(), 3);
        assert!(dst.join("0_to_999/0.json").exists());
        assert!(dst.join("0_to_999/2.json").exists());
        assert!(dst.join("snapshots/2.json").exists());
        assert!(!dst.join("0_to_999/3.json").exists());

        export_final_state(&shared, &exporter).await.unwrap();
        assert!(dst.join("0_to_999/3.json").exists());
        let latest = exporter::latest_snapshot(&dst).await.unwrap().unwrap();
        assert!(latest.ends_with("snapshots/3.json"));
    }
}
