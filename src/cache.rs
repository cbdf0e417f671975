use std::collections::BTreeMap;
use std::fs;

use camino::{Utf8Path, Utf8PathBuf};
use serde::Serialize;
use tracing::{info, warn};

use crate::catalog;
use crate::error::KiraError;
use crate::fs_util;

#[derive(Debug, Clone, Serialize)]
pub struct CacheCatalogWrite {
    pub path: Utf8PathBuf,
    pub source: Utf8PathBuf,
    pub entries: usize,
}

/// Rewrites `catalog_path` so each entry points at its precomputed artifact
/// in `cache_dir`, keeping line order. Any unmapped entry aborts the
/// rewrite before anything is written.
pub fn rewrite(
    catalog_path: &Utf8Path,
    cache_dir: &Utf8Path,
    output: &Utf8Path,
) -> Result<CacheCatalogWrite, KiraError> {
    let entries = catalog::read_entries(catalog_path)?;
    let mapped = index_artifacts(cache_dir).and_then(|index| map_entries(&entries, &index));
    let mapped = match mapped {
        Ok(mapped) => mapped,
        Err(err) => {
            remove_stale(output);
            return Err(err);
        }
    };

    let written = fs_util::write_lines_atomic(output, mapped.iter().map(|path| path.as_str()))?;
    info!(cache_catalog = %output, entries = written, "cache catalog written");
    Ok(CacheCatalogWrite {
        path: output.to_path_buf(),
        source: catalog_path.to_path_buf(),
        entries: written,
    })
}

/// Artifact file names in `cache_dir`, mapped to absolute paths.
fn index_artifacts(cache_dir: &Utf8Path) -> Result<BTreeMap<String, Utf8PathBuf>, KiraError> {
    let read_err = |message: String| KiraError::CacheDirRead {
        path: cache_dir.to_string(),
        message,
    };
    let cache_dir = fs_util::absolute_utf8(cache_dir)?;
    let entries = fs::read_dir(cache_dir.as_std_path()).map_err(|err| read_err(err.to_string()))?;
    let mut index = BTreeMap::new();
    for entry in entries {
        let entry = entry.map_err(|err| read_err(err.to_string()))?;
        if !entry.path().is_file() {
            continue;
        }
        if let Ok(name) = entry.file_name().into_string() {
            index.insert(name.clone(), cache_dir.join(name));
        }
    }
    Ok(index)
}

fn map_entries(
    entries: &[Utf8PathBuf],
    index: &BTreeMap<String, Utf8PathBuf>,
) -> Result<Vec<Utf8PathBuf>, KiraError> {
    let mut mapped = Vec::with_capacity(entries.len());
    let mut unmapped = Vec::new();
    for entry in entries {
        let Some(key) = entry.file_name() else {
            unmapped.push(entry.to_string());
            continue;
        };
        match lookup(key, index)? {
            Some(path) => mapped.push(path.clone()),
            None => unmapped.push(key.to_string()),
        }
    }
    if !unmapped.is_empty() {
        return Err(KiraError::CacheUnmapped { entries: unmapped });
    }
    Ok(mapped)
}

/// Exact file name match first, then `<key>.<ext>` with a single extra
/// extension. More than one extended candidate is ambiguous.
fn lookup<'a>(
    key: &str,
    index: &'a BTreeMap<String, Utf8PathBuf>,
) -> Result<Option<&'a Utf8PathBuf>, KiraError> {
    if let Some(path) = index.get(key) {
        return Ok(Some(path));
    }
    let prefix = format!("{key}.");
    let candidates = index
        .range(prefix.clone()..)
        .take_while(|(name, _)| name.starts_with(&prefix))
        .filter(|(name, _)| !name[prefix.len()..].is_empty() && !name[prefix.len()..].contains('.'))
        .collect::<Vec<_>>();
    match candidates.as_slice() {
        [] => Ok(None),
        [(_, path)] => Ok(Some(*path)),
        _ => Err(KiraError::CacheAmbiguous {
            entry: key.to_string(),
            candidates: candidates.iter().map(|(name, _)| name.to_string()).collect(),
        }),
    }
}

fn remove_stale(output: &Utf8Path) {
    if !output.as_std_path().is_file() {
        return;
    }
    match fs::remove_file(output.as_std_path()) {
        Ok(()) => warn!(cache_catalog = %output, "removed stale cache catalog"),
        Err(err) => warn!(cache_catalog = %output, error = %err, "failed to remove stale cache catalog"),
    }
}
