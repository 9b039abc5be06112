//! Acquisition ledger: which runs are on disk, where, and in which version.
//!
//! The ledger is a JSON file rewritten atomically (temp file + rename) after
//! every change, so a crash never leaves a half-written record behind.

use std::collections::{BTreeMap, BTreeSet};
use std::io::Write;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use msm_common::RunId;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::error::LedgerError;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LedgerEntry {
    /// Directory holding the run's part files
    pub path: PathBuf,
    pub fetched_at: DateTime<Utc>,
    pub fingerprint: String,
}

/// Effect of [`Ledger::record`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RecordOutcome {
    Inserted,
    /// Same fingerprint already recorded; nothing changed
    Unchanged,
    /// A different version replaced the entry; `stale_path` was removed
    Replaced { stale_path: PathBuf },
}

#[derive(Debug, Default, Serialize, Deserialize)]
struct LedgerFile {
    #[serde(default)]
    runs: BTreeMap<RunId, LedgerEntry>,
}

#[derive(Debug)]
pub struct Ledger {
    path: PathBuf,
    runs: BTreeMap<RunId, LedgerEntry>,
}

impl Ledger {
    /// Open the ledger at `path`; a missing file is an empty ledger.
    pub fn open(path: &Path) -> Result<Self, LedgerError> {
        let runs = match std::fs::read(path) {
            Ok(bytes) => {
                let file: LedgerFile = serde_json::from_slice(&bytes).map_err(|e| LedgerError::Read {
                    path: path.display().to_string(),
                    reason: e.to_string(),
                })?;
                file.runs
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => BTreeMap::new(),
            Err(e) => {
                return Err(LedgerError::Read {
                    path: path.display().to_string(),
                    reason: e.to_string(),
                })
            }
        };

        debug!(path = %path.display(), runs = runs.len(), "Ledger opened");
        Ok(Self {
            path: path.to_path_buf(),
            runs,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn has(&self, run_id: &RunId) -> bool {
        self.runs.contains_key(run_id)
    }

    pub fn get(&self, run_id: &RunId) -> Option<&LedgerEntry> {
        self.runs.get(run_id)
    }

    pub fn len(&self) -> usize {
        self.runs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.runs.is_empty()
    }

    /// Recorded runs with their fingerprints, oldest first.
    pub fn known(&self) -> impl Iterator<Item = (&RunId, &str)> {
        self.runs.iter().map(|(id, e)| (id, e.fingerprint.as_str()))
    }

    /// True unless the run is recorded with exactly this fingerprint.
    pub fn needs_fetch(&self, run_id: &RunId, fingerprint: &str) -> bool {
        self.runs
            .get(run_id)
            .map_or(true, |entry| entry.fingerprint != fingerprint)
    }

    /// Storage locations of every recorded run.
    pub fn paths(&self) -> impl Iterator<Item = &Path> {
        self.runs.values().map(|e| e.path.as_path())
    }

    /// Newest recorded run.
    pub fn latest(&self) -> Option<(&RunId, &LedgerEntry)> {
        self.runs.iter().next_back()
    }

    /// Record a fetched run and persist.
    ///
    /// Recording the same fingerprint again is a no-op. A different
    /// fingerprint replaces the entry and deletes the previous version's
    /// files when they live elsewhere.
    pub fn record(
        &mut self,
        run_id: RunId,
        path: PathBuf,
        fingerprint: &str,
    ) -> Result<RecordOutcome, LedgerError> {
        let outcome = match self.runs.get(&run_id) {
            Some(existing) if existing.fingerprint == fingerprint => return Ok(RecordOutcome::Unchanged),
            Some(existing) => RecordOutcome::Replaced {
                stale_path: existing.path.clone(),
            },
            None => RecordOutcome::Inserted,
        };

        self.runs.insert(
            run_id,
            LedgerEntry {
                path: path.clone(),
                fetched_at: Utc::now(),
                fingerprint: fingerprint.to_string(),
            },
        );
        self.save()?;

        if let RecordOutcome::Replaced { stale_path } = &outcome {
            if *stale_path != path {
                remove_run_files(stale_path);
            }
            info!(run_id = %run_id, stale = %stale_path.display(), "Replaced re-published run");
        } else {
            info!(run_id = %run_id, path = %path.display(), "Recorded run");
        }
        Ok(outcome)
    }

    /// Drop runs issued before `cutoff` and delete their files. The newest
    /// run is always kept, however old it is.
    pub fn prune(&mut self, cutoff: DateTime<Utc>) -> Result<BTreeSet<RunId>, LedgerError> {
        let newest = self.runs.keys().next_back().copied();
        let expired: Vec<RunId> = self
            .runs
            .keys()
            .filter(|id| id.issue_time() < cutoff && Some(**id) != newest)
            .copied()
            .collect();

        if expired.is_empty() {
            return Ok(BTreeSet::new());
        }

        let removed: Vec<(RunId, LedgerEntry)> = expired
            .iter()
            .filter_map(|id| self.runs.remove(id).map(|entry| (*id, entry)))
            .collect();
        self.save()?;

        for (run_id, entry) in &removed {
            remove_run_files(&entry.path);
            info!(run_id = %run_id, path = %entry.path.display(), "Pruned run");
        }

        Ok(removed.into_iter().map(|(id, _)| id).collect())
    }

    fn save(&self) -> Result<(), LedgerError> {
        let write_error = |reason: String| LedgerError::Write {
            path: self.path.display().to_string(),
            reason,
        };

        let parent = match self.path.parent() {
            Some(p) if !p.as_os_str().is_empty() => p.to_path_buf(),
            _ => PathBuf::from("."),
        };
        std::fs::create_dir_all(&parent).map_err(|e| write_error(e.to_string()))?;

        let file = LedgerFile {
            runs: self.runs.clone(),
        };
        let json = serde_json::to_vec_pretty(&file).map_err(|e| write_error(e.to_string()))?;

        let mut tmp = tempfile::NamedTempFile::new_in(&parent).map_err(|e| write_error(e.to_string()))?;
        tmp.write_all(&json).map_err(|e| write_error(e.to_string()))?;
        tmp.as_file().sync_all().map_err(|e| write_error(e.to_string()))?;
        tmp.persist(&self.path).map_err(|e| write_error(e.error.to_string()))?;
        Ok(())
    }
}

fn remove_run_files(path: &Path) {
    let result = if path.is_dir() {
        std::fs::remove_dir_all(path)
    } else {
        std::fs::remove_file(path)
    };
    match result {
        Ok(()) => {}
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
        Err(e) => warn!(path = %path.display(), error = %e, "Failed to remove run files"),
    }
}
