//! Remote catalog: discovery of published runs from the archive's HTML
//! directory listings.
//!
//! The archive is laid out as `YYYY/MM/DD/`. Each day directory lists the
//! part files of the runs issued that day; the parts of one run share the
//! 14-digit issue timestamp in their names.

use std::collections::BTreeMap;
use std::sync::OnceLock;
use std::time::Duration;

use async_trait::async_trait;
use msm_common::RunId;
use regex::Regex;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use tracing::{debug, info, instrument, warn};

use crate::config::CatalogConfig;
use crate::error::DownloadError;

/// One downloadable file of a run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunPart {
    pub file_name: String,
    pub url: String,
    /// Modification time and size text shown next to the link
    pub listing_meta: String,
}

/// A run as published in the catalog.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunDescriptor {
    pub run_id: RunId,
    /// Sorted by file name
    pub parts: Vec<RunPart>,
    /// SHA-256 over the parts' names and listing metadata, hex encoded
    pub fingerprint: String,
}

impl RunDescriptor {
    pub fn new(run_id: RunId, mut parts: Vec<RunPart>) -> Self {
        parts.sort_by(|a, b| a.file_name.cmp(&b.file_name));
        parts.dedup_by(|a, b| a.file_name == b.file_name);
        let fingerprint = fingerprint(&parts);
        Self {
            run_id,
            parts,
            fingerprint,
        }
    }
}

fn fingerprint(parts: &[RunPart]) -> String {
    let mut hasher = Sha256::new();
    for part in parts {
        hasher.update(part.file_name.as_bytes());
        hasher.update([0u8]);
        hasher.update(part.listing_meta.as_bytes());
        hasher.update([b'\n']);
    }
    hasher
        .finalize()
        .iter()
        .map(|b| format!("{:02x}", b))
        .collect()
}

/// Source of the currently published runs.
#[async_trait]
pub trait Catalog: Send + Sync {
    /// Published runs ordered by issue time, oldest first.
    async fn list_available_runs(&self) -> Result<Vec<RunDescriptor>, DownloadError>;
}

fn anchor_regex() -> &'static Regex {
    static ANCHOR: OnceLock<Regex> = OnceLock::new();
    ANCHOR.get_or_init(|| {
        Regex::new(r#"(?i)<a\s+[^>]*href="([^"]+)"[^>]*>[^<]*</a>([^\r\n<]*)"#)
            .expect("anchor pattern is a valid regex")
    })
}

/// `(href, text following the link)` for every anchor of a listing.
fn links<'a>(html: &'a str) -> impl Iterator<Item = (&'a str, &'a str)> + 'a {
    anchor_regex().captures_iter(html).filter_map(|caps| {
        let href = caps.get(1)?.as_str();
        let trailing = caps.get(2).map(|m| m.as_str()).unwrap_or("");
        Some((href, trailing))
    })
}

/// Subdirectory names of a listing matching `^\d{width}/$`, ascending.
pub fn numbered_dirs(html: &str, width: usize) -> Vec<String> {
    let mut dirs: Vec<String> = links(html)
        .map(|(href, _)| href)
        .filter(|href| {
            href.len() == width + 1
                && href.ends_with('/')
                && href[..width].bytes().all(|b| b.is_ascii_digit())
        })
        .map(|href| href.to_string())
        .collect();
    dirs.sort();
    dirs.dedup();
    dirs
}

/// Run descriptors found in one day listing. `dir_url` is the listing's URL
/// with trailing slash; `pattern` must match whole file names with the issue
/// time as its first group.
pub fn parse_day_listing(html: &str, dir_url: &str, pattern: &Regex) -> Vec<RunDescriptor> {
    let mut runs: BTreeMap<RunId, Vec<RunPart>> = BTreeMap::new();

    for (href, trailing) in links(html) {
        let file_name = href.rsplit('/').next().unwrap_or(href);
        let Some(caps) = pattern.captures(file_name) else {
            continue;
        };
        let Some(stamp) = caps.get(1) else {
            continue;
        };
        let run_id: RunId = match stamp.as_str().parse() {
            Ok(id) => id,
            Err(e) => {
                warn!(file = file_name, error = %e, "Skipping file with unparseable issue time");
                continue;
            }
        };

        runs.entry(run_id).or_default().push(RunPart {
            file_name: file_name.to_string(),
            url: format!("{}{}", dir_url, file_name),
            listing_meta: trailing.split_whitespace().collect::<Vec<_>>().join(" "),
        });
    }

    runs.into_iter()
        .map(|(run_id, parts)| RunDescriptor::new(run_id, parts))
        .collect()
}

/// Catalog backed by the HTTP archive.
pub struct HttpCatalog {
    client: Client,
    config: CatalogConfig,
    pattern: Regex,
}

impl HttpCatalog {
    pub fn new(config: CatalogConfig, timeout: Duration) -> Result<Self, DownloadError> {
        let pattern = config.file_regex()?;
        let client = Client::builder()
            .timeout(timeout)
            .connect_timeout(Duration::from_secs(30))
            .build()
            .map_err(|e| DownloadError::Config(format!("HTTP client: {}", e)))?;
        Ok(Self {
            client,
            config,
            pattern,
        })
    }

    async fn get_listing(&self, url: &str) -> Result<String, DownloadError> {
        let unreachable = |e: String| DownloadError::CatalogUnreachable(format!("{}: {}", url, e));
        let response = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|e| unreachable(e.to_string()))?;
        if !response.status().is_success() {
            return Err(unreachable(format!("HTTP {}", response.status())));
        }
        response.text().await.map_err(|e| unreachable(e.to_string()))
    }

    async fn latest_dir(&self, url: &str, width: usize) -> Result<String, DownloadError> {
        let html = self.get_listing(url).await?;
        numbered_dirs(&html, width)
            .pop()
            .ok_or_else(|| DownloadError::CatalogUnreachable(format!("{}: no dated directories", url)))
    }
}

#[async_trait]
impl Catalog for HttpCatalog {
    #[instrument(skip(self), fields(base_url = %self.config.base_url))]
    async fn list_available_runs(&self) -> Result<Vec<RunDescriptor>, DownloadError> {
        let root = self.config.root();
        let year = self.latest_dir(&root, 4).await?;
        let year_url = format!("{}{}", root, year);
        let month = self.latest_dir(&year_url, 2).await?;
        let month_url = format!("{}{}", year_url, month);

        let days = numbered_dirs(&self.get_listing(&month_url).await?, 2);
        let newest = days.len().saturating_sub(self.config.lookback_days);

        let mut runs: BTreeMap<RunId, RunDescriptor> = BTreeMap::new();
        for day in &days[newest..] {
            let day_url = format!("{}{}", month_url, day);
            let html = self.get_listing(&day_url).await?;
            for run in parse_day_listing(&html, &day_url, &self.pattern) {
                debug!(run_id = %run.run_id, parts = run.parts.len(), day = %day, "Listed run");
                runs.insert(run.run_id, run);
            }
        }

        info!(
            year = %year.trim_end_matches('/'),
            month = %month.trim_end_matches('/'),
            days = days.len() - newest,
            runs = runs.len(),
            "Catalog listed"
        );
        Ok(runs.into_values().collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use test_utils::{DAY_LISTING_HTML, YEAR_LISTING_HTML};

    const DAY_URL: &str = "https://example.org/gpv/2025/11/27/";

    fn pattern() -> Regex {
        CatalogConfig::default().file_regex().unwrap()
    }

    #[test]
    fn test_numbered_dirs_ignores_other_links() {
        assert_eq!(numbered_dirs(YEAR_LISTING_HTML, 4), vec!["2024/", "2025/"]);
        assert!(numbered_dirs(YEAR_LISTING_HTML, 2).is_empty());
    }

    #[test]
    fn test_day_listing_groups_parts_by_issue_time() {
        let runs = parse_day_listing(DAY_LISTING_HTML, DAY_URL, &pattern());
        assert_eq!(runs.len(), 2);

        let first = &runs[0];
        assert_eq!(first.run_id.to_string(), "20251127090000");
        // the pressure-level file does not match the surface pattern
        assert_eq!(first.parts.len(), 3);
        assert_eq!(
            first.parts[0].url,
            "https://example.org/gpv/2025/11/27/Z__C_RJTD_20251127090000_MSM_GPV_Rjp_Lsurf_FH00-15_grib2.bin"
        );
        assert_eq!(first.parts[0].listing_meta, "2025-11-27 11:41 31M");

        let second = &runs[1];
        assert_eq!(second.run_id.to_string(), "20251127150000");
        assert_eq!(second.parts.len(), 2);
        assert_eq!(second.fingerprint.len(), 64);
        assert_ne!(first.fingerprint, second.fingerprint);
    }

    #[test]
    fn test_fingerprint_changes_on_republication() {
        let runs = parse_day_listing(DAY_LISTING_HTML, DAY_URL, &pattern());
        let republished = DAY_LISTING_HTML.replace("2025-11-27 17:41   35M", "2025-11-27 18:02   35M");
        let again = parse_day_listing(&republished, DAY_URL, &pattern());

        assert_eq!(runs[0].fingerprint, again[0].fingerprint);
        assert_ne!(runs[1].fingerprint, again[1].fingerprint);
    }

    #[test]
    fn test_fingerprint_ignores_listing_order() {
        let a = RunPart {
            file_name: "a.bin".to_string(),
            url: "u/a.bin".to_string(),
            listing_meta: "1".to_string(),
        };
        let b = RunPart {
            file_name: "b.bin".to_string(),
            url: "u/b.bin".to_string(),
            listing_meta: "2".to_string(),
        };
        let id: RunId = "20251127150000".parse().unwrap();
        assert_eq!(
            RunDescriptor::new(id, vec![a.clone(), b.clone()]).fingerprint,
            RunDescriptor::new(id, vec![b, a]).fingerprint
        );
    }

    #[test]
    fn test_empty_listing_has_no_runs() {
        assert!(parse_day_listing("<html></html>", DAY_URL, &pattern()).is_empty());
    }
}
