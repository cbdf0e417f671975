use std::collections::BTreeSet;
use std::fs;

use camino::{Utf8Path, Utf8PathBuf};
use serde::Serialize;
use tracing::{debug, info, warn};

use crate::error::KiraError;
use crate::fs_util;

const GIB: f64 = 1024.0 * 1024.0 * 1024.0;

/// One absolute path per line; line order carries no meaning.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Catalog {
    entries: BTreeSet<Utf8PathBuf>,
}

#[derive(Debug, Clone, Serialize)]
pub struct CatalogWrite {
    pub path: Utf8PathBuf,
    pub entries: usize,
    pub dropped: Vec<Utf8PathBuf>,
}

#[derive(Debug, Clone, Serialize)]
pub struct CatalogStats {
    pub path: Utf8PathBuf,
    pub entries: usize,
    pub total_bytes: u64,
    pub total_gib: f64,
    pub missing: Vec<Utf8PathBuf>,
}

impl Catalog {
    pub fn build<'p, P, F>(present: P, fetched: F) -> Self
    where
        P: IntoIterator<Item = &'p Utf8PathBuf>,
        F: IntoIterator<Item = &'p Utf8PathBuf>,
    {
        let entries = present.into_iter().chain(fetched).cloned().collect();
        Self { entries }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn entries(&self) -> impl Iterator<Item = &Utf8PathBuf> {
        self.entries.iter()
    }

    /// Writes entries that still exist, replacing any previous catalog at
    /// `path`. Entries that vanished since they were collected are dropped.
    pub fn write(&self, path: &Utf8Path) -> Result<CatalogWrite, KiraError> {
        let mut kept = BTreeSet::new();
        let mut dropped = Vec::new();
        for entry in &self.entries {
            let absolute = fs_util::absolute_utf8(entry)?;
            if absolute.as_std_path().is_file() {
                kept.insert(absolute);
            } else {
                dropped.push(absolute);
            }
        }
        if !dropped.is_empty() {
            warn!(
                count = dropped.len(),
                "catalog entries vanished before write and were dropped"
            );
        }

        let entries = fs_util::write_lines_atomic(path, kept.iter().map(|entry| entry.as_str()))?;
        info!(catalog = %path, entries, "catalog written");
        Ok(CatalogWrite {
            path: path.to_path_buf(),
            entries,
            dropped,
        })
    }
}

pub fn read_entries(path: &Utf8Path) -> Result<Vec<Utf8PathBuf>, KiraError> {
    let content =
        fs::read_to_string(path.as_std_path()).map_err(|err| KiraError::CatalogRead {
            path: path.to_string(),
            message: err.to_string(),
        })?;
    let entries = content
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .map(Utf8PathBuf::from)
        .collect::<Vec<_>>();
    debug!(catalog = %path, entries = entries.len(), "catalog read");
    Ok(entries)
}

pub fn stats(path: &Utf8Path) -> Result<CatalogStats, KiraError> {
    let entries = read_entries(path)?;
    let mut total_bytes = 0u64;
    let mut missing = Vec::new();
    for entry in &entries {
        match fs::metadata(entry.as_std_path()) {
            Ok(meta) => total_bytes += meta.len(),
            Err(_) => missing.push(entry.clone()),
        }
    }
    Ok(CatalogStats {
        path: path.to_path_buf(),
        entries: entries.len(),
        total_bytes,
        total_gib: total_bytes as f64 / GIB,
        missing,
    })
}
