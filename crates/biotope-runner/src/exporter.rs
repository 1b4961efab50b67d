//! Experiment folder export.
//!
//! Layout under the destination folder:
//!
//! ```text
//! settings/<experiment>.json     configuration catalog
//! 0_to_999/<tick>.json           location -> species, one file per tick
//! 1000_to_1999/...
//! snapshots/<tick>.json          full snapshots for resuming
//! ```

use anyhow::{Context, Result};
use biotope_core::ConfigurationCatalog;
use biotope_world::{Ecosystem, Snapshot};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use tokio::fs;
use tracing::{debug, info};

const SLICES_PER_FOLDER: u64 = 1000;

/// Species occupying each cell at one tick, keyed by `"(x, y)"`
#[derive(Debug, Clone, PartialEq)]
pub struct TimeSlice {
    pub tick: u64,
    pub cells: BTreeMap<String, String>,
}

impl TimeSlice {
    pub fn capture(ecosystem: &Ecosystem) -> Self {
        Self {
            tick: ecosystem.tick(),
            cells: ecosystem
                .organisms()
                .map(|o| (o.location.to_string(), o.species.clone()))
                .collect(),
        }
    }
}

pub struct Exporter {
    dst: PathBuf,
    experiment: String,
}

impl Exporter {
    /// Prepare the folder and write the settings file
    pub async fn create(dst: impl Into<PathBuf>, catalog: &ConfigurationCatalog) -> Result<Self> {
        let dst = dst.into();
        let experiment = dst
            .file_name()
            .and_then(|n| n.to_str())
            .map(str::to_string)
            .unwrap_or_else(|| format!("experiment_{}", chrono::Utc::now().format("%Y%m%d_%H%M%S")));

        let settings = dst.join("settings");
        fs::create_dir_all(&settings)
            .await
            .with_context(|| format!("creating {:?}", settings))?;

        let path = settings.join(format!("{}.json", experiment));
        fs::write(&path, catalog.to_json_pretty()?)
            .await
            .with_context(|| format!("writing {:?}", path))?;

        info!(experiment = %experiment, dst = ?dst, "Exporter ready");
        Ok(Self { dst, experiment })
    }

    pub fn experiment(&self) -> &str {
        &self.experiment
    }

    pub fn dst(&self) -> &Path {
        &self.dst
    }

    /// Path of the time slice file for `tick`
    pub fn slice_path(&self, tick: u64) -> PathBuf {
        let first = tick / SLICES_PER_FOLDER * SLICES_PER_FOLDER;
        self.dst
            .join(format!("{}_to_{}", first, first + SLICES_PER_FOLDER - 1))
            .join(format!("{}.json", tick))
    }

    pub async fn export_time_slice(&self, slice: &TimeSlice) -> Result<PathBuf> {
        let path = self.slice_path(slice.tick);
        if let Some(folder) = path.parent() {
            fs::create_dir_all(folder).await?;
        }
        fs::write(&path, serde_json::to_vec(&slice.cells)?)
            .await
            .with_context(|| format!("writing {:?}", path))?;

        debug!(tick = slice.tick, cells = slice.cells.len(), "Time slice exported");
        Ok(path)
    }

    pub async fn export_snapshot(&self, snapshot: &Snapshot) -> Result<PathBuf> {
        let folder = snapshot_dir(&self.dst);
        fs::create_dir_all(&folder).await?;

        let path = folder.join(format!("{}.json", snapshot.tick));
        fs::write(&path, snapshot.to_json()?)
            .await
            .with_context(|| format!("writing {:?}", path))?;

        info!(tick = snapshot.tick, path = ?path, "Snapshot written");
        Ok(path)
    }

    /// Keep only the `keep` most recent snapshots
    pub async fn prune_snapshots(&self, keep: usize) -> Result<usize> {
        let mut snapshots = list_snapshots(&self.dst).await?;
        if snapshots.len() <= keep {
            return Ok(0);
        }

        snapshots.sort_by_key(|(tick, _)| *tick);
        let stale = snapshots.len() - keep;
        for (_, path) in snapshots.into_iter().take(stale) {
            fs::remove_file(&path)
                .await
                .with_context(|| format!("removing {:?}", path))?;
        }

        debug!(removed = stale, kept = keep, "Pruned snapshots");
        Ok(stale)
    }
}

fn snapshot_dir(dst: &Path) -> PathBuf {
    dst.join("snapshots")
}

async fn list_snapshots(dst: &Path) -> Result<Vec<(u64, PathBuf)>> {
    let folder = snapshot_dir(dst);
    if !fs::try_exists(&folder).await? {
        return Ok(Vec::new());
    }

    let mut found = Vec::new();
    let mut entries = fs::read_dir(&folder).await?;
    while let Some(entry) = entries.next_entry().await? {
        let path = entry.path();
        let tick = path
            .file_name()
            .and_then(|n| n.to_str())
            .and_then(|n| n.strip_suffix(".json"))
            .and_then(|t| t.parse::<u64>().ok());
        if let Some(tick) = tick {
            found.push((tick, path));
        }
    }
    Ok(found)
}

/// Highest-tick snapshot under an experiment folder, if any
pub async fn latest_snapshot(dst: &Path) -> Result<Option<PathBuf>> {
    Ok(list_snapshots(dst)
        .await?
        .into_iter()
        .max_by_key(|(tick, _)| *tick)
        .map(|(_, path)| path))
}

/// Read a snapshot file; `.bin` is bincode, anything else JSON
pub async fn read_snapshot(path: &Path) -> Result<Snapshot> {
    let bytes = fs::read(path)
        .await
        .with_context(|| format!("reading {:?}", path))?;

    let snapshot = if path.extension().and_then(|e| e.to_str()) == Some("bin") {
        Snapshot::from_bytes(&bytes)?
    } else {
        Snapshot::from_json_slice(&bytes)?
    };
    Ok(snapshot)
}
