//! Persisted digests for the content-hash staleness policy.

use crate::bundler::error::{ErrorExt, Result};
use chrono::{DateTime, Utc};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

/// Digests recorded after the last successful build of one target.
#[derive(Clone, Debug, Default, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct TargetRecord {
    /// SHA-256 of every resolved input, keyed by path.
    pub inputs: BTreeMap<PathBuf, String>,
    /// SHA-256 of the output when it was produced.
    pub output: String,
    /// When the target was last built.
    pub built_at: Option<DateTime<Utc>>,
}

/// State file contents: one record per target name.
#[derive(Clone, Debug, Default, serde::Serialize, serde::Deserialize)]
pub struct BuildState {
    #[serde(default)]
    targets: BTreeMap<String, TargetRecord>,
}

impl BuildState {
    /// Loads the state file; a missing file is an empty state.
    pub async fn load(path: &Path) -> Result<Self> {
        match tokio::fs::read(path).await {
            Ok(bytes) => match serde_json::from_slice(&bytes) {
                Ok(state) => Ok(state),
                Err(e) => {
                    log::warn!(
                        "Ignoring unreadable build state {}: {}",
                        path.display(),
                        e
                    );
                    Ok(Self::default())
                }
            },
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(Self::default()),
            Err(e) => Err::<Self, _>(e).fs_context("reading build state", path),
        }
    }

    /// Writes the state file atomically.
    pub async fn save(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .fs_context("creating build state directory", parent)?;
        }
        let json = serde_json::to_vec_pretty(self)?;
        let tmp = path.with_extension("json.partial");
        tokio::fs::write(&tmp, json)
            .await
            .fs_context("writing build state", &tmp)?;
        tokio::fs::rename(&tmp, path)
            .await
            .fs_context("replacing build state", path)?;
        Ok(())
    }

    /// Record for `target`, if it was ever built.
    pub fn record(&self, target: &str) -> Option<&TargetRecord> {
        self.targets.get(target)
    }

    /// Replaces the record for `target`.
    pub fn set_record(&mut self, target: &str, record: TargetRecord) {
        self.targets.insert(target.to_string(), record);
    }

    /// Forgets `target`.
    pub fn remove(&mut self, target: &str) {
        self.targets.remove(target);
    }
}
