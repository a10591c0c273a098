//! Manifest of GeoJSON time slices for the web viewer.
//!
//! The viewer loads slices on demand and cannot list the data directory
//! itself, so the pipeline writes a small JSON index next to the data.

use std::path::{Path, PathBuf};
use std::sync::LazyLock;

use chrono::{SecondsFormat, Utc};
use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::errors::{CoreError, CoreResult};

/// File name of the emitted manifest inside the data directory.
pub const MANIFEST_FILE: &str = "manifest.json";

static SLICE_NAME_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^firEvents-(\d{4}-\d{2}-\d{2})_(\d{4})\.geojson$").expect("valid regex")
});

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ManifestEntry {
    pub file: String,
    /// ISO timestamp with a `Z` suffix, derived from the file name.
    pub timestamp: String,
    /// Human label, `YYYY-MM-DD HH:MM`.
    pub label: String,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Manifest {
    #[serde(rename = "generatedAt")]
    pub generated_at: String,
    pub count: usize,
    pub items: Vec<ManifestEntry>,
}

fn entry_for(file_name: &str) -> Option<ManifestEntry> {
    let caps = SLICE_NAME_RE.captures(file_name)?;
    let date = &caps[1];
    let time = &caps[2];
    let (hours, minutes) = time.split_at(2);
    Some(ManifestEntry {
        file: file_name.to_string(),
        timestamp: format!("{date}T{hours}:{minutes}:00Z"),
        label: format!("{date} {hours}:{minutes}"),
    })
}

/// Scan a data directory and build the manifest. Zero matching slices is an
/// error so an empty viewer never ships silently.
pub fn build_manifest(dir: &Path) -> CoreResult<Manifest> {
    if !dir.is_dir() {
        return Err(CoreError::DataDirNotFound(dir.to_path_buf()));
    }
    let mut names: Vec<String> = std::fs::read_dir(dir)
        .map_err(|e| CoreError::IoError(e, dir.to_path_buf()))?
        .filter_map(Result::ok)
        .filter_map(|entry| entry.file_name().into_string().ok())
        .collect();
    names.sort();

    let items: Vec<ManifestEntry> = names.iter().filter_map(|name| entry_for(name)).collect();
    if items.is_empty() {
        return Err(CoreError::NoSlicesFound(dir.to_path_buf()));
    }

    Ok(Manifest {
        generated_at: Utc::now().to_rfc3339_opts(SecondsFormat::Secs, true),
        count: items.len(),
        items,
    })
}

/// Build the manifest and write it as `manifest.json` into the data
/// directory. Returns the written path and the entry count.
pub fn write_manifest(dir: &Path) -> CoreResult<(PathBuf, usize)> {
    let manifest = build_manifest(dir)?;
    let path = dir.join(MANIFEST_FILE);
    let json = serde_json::to_string_pretty(&manifest)?;
    std::fs::write(&path, json).map_err(|e| CoreError::IoError(e, path.clone()))?;
    Ok((path, manifest.count))
}
