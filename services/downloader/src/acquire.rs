//! One acquisition cycle: list, diff against the ledger, fetch what is new,
//! record, prune.

use std::collections::BTreeSet;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use futures::stream::{self, StreamExt};
use msm_common::RunId;
use serde::Serialize;
use tracing::{info, instrument, warn};

use crate::catalog::{Catalog, RunDescriptor};
use crate::config::DownloadSettings;
use crate::download::RunFetcher;
use crate::error::DownloadError;
use crate::ledger::{Ledger, RecordOutcome};

/// Outcome of [`acquire`].
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct AcquisitionReport {
    pub listed: usize,
    /// Runs newly recorded or replaced by a re-published version
    pub fetched: Vec<RunId>,
    /// Fetches that failed; these runs stay unrecorded and are retried next cycle
    pub failed: Vec<(RunId, String)>,
    pub pruned: BTreeSet<RunId>,
    /// Run directories removed because no ledger entry refers to them
    pub swept: Vec<PathBuf>,
}

/// Storage directory of one version of a run. The fingerprint prefix keeps
/// a re-published version from overwriting the files it replaces.
pub fn run_dir(data_dir: &Path, run: &RunDescriptor) -> PathBuf {
    let short = &run.fingerprint[..run.fingerprint.len().min(8)];
    data_dir.join(format!("{}-{}", run.run_id, short))
}

/// Runs that are not yet recorded with their current fingerprint.
pub fn to_fetch<'a>(available: &'a [RunDescriptor], ledger: &Ledger) -> Vec<&'a RunDescriptor> {
    available
        .iter()
        .filter(|run| ledger.needs_fetch(&run.run_id, &run.fingerprint))
        .collect()
}

/// Run one acquisition cycle.
///
/// Only an unreachable catalog or a ledger that cannot be written fails the
/// cycle; a failed fetch is logged and left for the next invocation.
#[instrument(skip_all)]
pub async fn acquire(
    catalog: &dyn Catalog,
    fetcher: &dyn RunFetcher,
    ledger: &mut Ledger,
    settings: &DownloadSettings,
    now: DateTime<Utc>,
) -> Result<AcquisitionReport, DownloadError> {
    let available = catalog.list_available_runs().await?;
    let pending = to_fetch(&available, ledger);

    info!(
        listed = available.len(),
        known = ledger.len(),
        to_fetch = pending.len(),
        "Diffed catalog against ledger"
    );

    let mut report = AcquisitionReport {
        listed: available.len(),
        ..AcquisitionReport::default()
    };

    let mut results = stream::iter(pending)
        .map(|run| {
            let dest = run_dir(&settings.data_dir, run);
            async move {
                let result = fetcher.fetch(run, &dest).await;
                (run, dest, result)
            }
        })
        .buffer_unordered(settings.max_concurrent.max(1));

    // failed destinations keep their .partial files for the next cycle
    let mut resumable = Vec::new();
    while let Some((run, dest, result)) = results.next().await {
        match result {
            Ok(path) => match ledger.record(run.run_id, path, &run.fingerprint)? {
                RecordOutcome::Unchanged => {}
                RecordOutcome::Inserted | RecordOutcome::Replaced { .. } => {
                    report.fetched.push(run.run_id)
                }
            },
            Err(e) => {
                warn!(run_id = %run.run_id, error = %e, "Fetch failed, will retry next cycle");
                report.failed.push((run.run_id, e.to_string()));
                resumable.push(dest);
            }
        }
    }
    drop(results);

    report.fetched.sort();
    report.failed.sort_by_key(|(id, _)| *id);
    report.pruned = ledger.prune(now - settings.retention())?;
    report.swept = sweep_orphans(&settings.data_dir, ledger, &resumable);

    info!(
        fetched = report.fetched.len(),
        failed = report.failed.len(),
        pruned = report.pruned.len(),
        swept = report.swept.len(),
        "Acquisition cycle complete"
    );
    Ok(report)
}

/// Remove run directories under `data_dir` that the ledger does not refer
/// to, except those in `keep`. Only names of the `<run_id>-<hex>` form are
/// touched. Returns the removed directories.
pub fn sweep_orphans(data_dir: &Path, ledger: &Ledger, keep: &[PathBuf]) -> Vec<PathBuf> {
    let entries = match std::fs::read_dir(data_dir) {
        Ok(entries) => entries,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Vec::new(),
        Err(e) => {
            warn!(dir = %data_dir.display(), error = %e, "Cannot scan data directory");
            return Vec::new();
        }
    };
    let recorded: Vec<&Path> = ledger.paths().collect();

    let mut swept = Vec::new();
    for entry in entries.flatten() {
        let path = entry.path();
        if !path.is_dir() || !is_run_dir_name(&entry.file_name().to_string_lossy()) {
            continue;
        }
        if recorded.contains(&path.as_path()) || keep.contains(&path) {
            continue;
        }
        match std::fs::remove_dir_all(&path) {
            Ok(()) => {
                info!(path = %path.display(), "Removed unrecorded run directory");
                swept.push(path);
            }
            Err(e) => warn!(path = %path.display(), error = %e, "Failed to remove run directory"),
        }
    }
    swept.sort();
    swept
}

fn is_run_dir_name(name: &str) -> bool {
    match name.split_once('-') {
        Some((id, hex)) => {
            id.parse::<RunId>().is_ok() && !hex.is_empty() && hex.chars().all(|c| c.is_ascii_hexdigit())
        }
        None => false,
    }
}
