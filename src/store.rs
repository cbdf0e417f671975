use std::collections::BTreeSet;
use std::fs;

use camino::{Utf8Path, Utf8PathBuf};
use directories::BaseDirs;
use serde::Serialize;
use tempfile::{Builder, NamedTempFile};

use crate::domain::RunId;
use crate::error::KiraError;
use crate::fs_util;
use crate::sources::IdentifierSet;

pub const PARTIAL_PREFIX: &str = ".kira-ss-";

#[derive(Debug, Clone)]
pub struct SigStore {
    root: Utf8PathBuf,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct Presence {
    pub present: BTreeSet<Utf8PathBuf>,
    pub missing: Vec<RunId>,
}

impl SigStore {
    pub fn new(root: &Utf8Path) -> Result<Self, KiraError> {
        Ok(Self {
            root: fs_util::absolute_utf8(root)?,
        })
    }

    pub fn default_root() -> Result<Utf8PathBuf, KiraError> {
        BaseDirs::new()
            .and_then(|dirs| {
                Utf8PathBuf::from_path_buf(
                    dirs.home_dir()
                        .join(".cache")
                        .join("kira-sigsearch")
                        .join("wort-sigs"),
                )
                .ok()
            })
            .ok_or_else(|| KiraError::Filesystem("unable to resolve cache directory".to_string()))
    }

    pub fn root(&self) -> &Utf8Path {
        &self.root
    }

    pub fn sig_path(&self, id: &RunId) -> Utf8PathBuf {
        self.root.join(id.sig_file_name())
    }

    pub fn ensure_root(&self) -> Result<(), KiraError> {
        fs::create_dir_all(self.root.as_std_path())
            .map_err(|err| KiraError::Filesystem(format!("create {}: {err}", self.root)))
    }

    pub fn contains(&self, id: &RunId) -> bool {
        self.sig_path(id).as_std_path().is_file()
    }

    pub fn partition(&self, ids: &IdentifierSet) -> Presence {
        let mut presence = Presence::default();
        for id in ids.iter() {
            let path = self.sig_path(id);
            if path.as_std_path().is_file() {
                presence.present.insert(path);
            } else {
                presence.missing.push(id.clone());
            }
        }
        presence
    }

    /// Temp file on the same filesystem as the final signature path.
    pub fn partial_file(&self, id: &RunId) -> Result<NamedTempFile, KiraError> {
        Builder::new()
            .prefix(&format!("{PARTIAL_PREFIX}{}", id.as_str()))
            .suffix(".part")
            .tempfile_in(self.root.as_std_path())
            .map_err(|err| KiraError::Filesystem(err.to_string()))
    }

    pub fn publish(&self, partial: NamedTempFile, id: &RunId) -> Result<Utf8PathBuf, KiraError> {
        let path = self.sig_path(id);
        partial
            .persist(path.as_std_path())
            .map_err(|err| KiraError::Filesystem(format!("persist {path}: {}", err.error)))?;
        Ok(path)
    }

    pub fn sweep_partials(&self) -> Result<Vec<Utf8PathBuf>, KiraError> {
        if !self.root.as_std_path().exists() {
            return Ok(Vec::new());
        }
        let entries = fs::read_dir(self.root.as_std_path())
            .map_err(|err| KiraError::Filesystem(format!("read {}: {err}", self.root)))?;
        let mut removed = Vec::new();
        for entry in entries {
            let entry = entry.map_err(|err| KiraError::Filesystem(err.to_string()))?;
            let name = entry.file_name();
            let Some(name) = name.to_str() else {
                continue;
            };
            if !name.starts_with(PARTIAL_PREFIX) || !entry.path().is_file() {
                continue;
            }
            fs::remove_file(entry.path())
                .map_err(|err| KiraError::Filesystem(format!("remove {name}: {err}")))?;
            removed.push(self.root.join(name));
        }
        Ok(removed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn store_in(temp: &tempfile::TempDir) -> SigStore {
        let root = Utf8PathBuf::from_path_buf(temp.path().join("sigs")).unwrap();
        let store = SigStore::new(&root).unwrap();
        store.ensure_root().unwrap();
        store
    }

    #[test]
    fn layout_paths() {
        let temp = tempfile::tempdir().unwrap();
        let store = store_in(&temp);
        let id: RunId = "SRR014966".parse().unwrap();
        assert!(store.sig_path(&id).ends_with("sigs/SRR014966.sig"));
        assert!(store.root().is_absolute());
    }

    #[test]
    fn partition_splits_present_and_missing() {
        let temp = tempfile::tempdir().unwrap();
        let store = store_in(&temp);
        let have: RunId = "SRR1".parse().unwrap();
        fs::write(store.sig_path(&have).as_std_path(), b"sig").unwrap();
        fs::create_dir(store.sig_path(&"SRR3".parse().unwrap()).as_std_path()).unwrap();

        let ids = ["SRR1", "SRR2", "SRR3"]
            .iter()
            .map(|value| value.parse().unwrap())
            .collect::<IdentifierSet>();
        let presence = store.partition(&ids);

        assert_eq!(presence.present.len(), 1);
        assert!(presence.present.contains(&store.sig_path(&have)));
        let missing = presence.missing.iter().map(RunId::as_str).collect::<Vec<_>>();
        assert_eq!(missing, vec!["SRR2", "SRR3"]);
    }

    #[test]
    fn sweep_removes_only_partials() {
        let temp = tempfile::tempdir().unwrap();
        let store = store_in(&temp);
        let id: RunId = "SRR9".parse().unwrap();
        let partial = store.partial_file(&id).unwrap();
        let (_, partial_path) = partial.keep().unwrap();
        fs::write(store.sig_path(&id).as_std_path(), b"sig").unwrap();

        let removed = store.sweep_partials().unwrap();
        assert_eq!(removed.len(), 1);
        assert!(!partial_path.exists());
        assert!(store.contains(&id));
    }
}
