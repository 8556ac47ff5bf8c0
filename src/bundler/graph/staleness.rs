//! Staleness evaluation for build targets.
//!
//! Two policies are available:
//!
//! - [`StalenessPolicy::Mtime`]: a target is stale when its output is missing
//!   or any input was modified after the output.
//! - [`StalenessPolicy::ContentHash`]: a target is stale when its output is
//!   missing, it was never recorded, its input set changed, or any input (or
//!   the output itself) hashes differently from the last successful build.

use super::{
    Target,
    state::{BuildState, TargetRecord},
};
use crate::bundler::{
    builder::checksum::calculate_sha256,
    error::{ErrorExt, Result},
};
use std::{
    collections::BTreeMap,
    fmt,
    path::{Path, PathBuf},
    time::SystemTime,
};

/// How staleness is decided.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, serde::Deserialize, clap::ValueEnum)]
#[serde(rename_all = "kebab-case")]
pub enum StalenessPolicy {
    /// Compare modification times (make semantics).
    #[default]
    Mtime,
    /// Compare SHA-256 digests recorded at the last successful build.
    ContentHash,
}

/// Why a target must be rebuilt.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum StaleReason {
    /// The output does not exist.
    MissingOutput,
    /// A declared input does not exist (yet).
    MissingInput(PathBuf),
    /// An input is newer than the output.
    NewerInput(PathBuf),
    /// An input's content differs from the recorded digest.
    ChangedInput(PathBuf),
    /// Inputs were added or removed since the last build.
    InputSetChanged,
    /// The output was modified outside the pipeline.
    ChangedOutput,
    /// No successful build was ever recorded.
    NeverBuilt,
    /// A dependency is going to be rebuilt (dry-run prediction).
    Upstream(String),
}

impl fmt::Display for StaleReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StaleReason::MissingOutput => f.write_str("output missing"),
            StaleReason::MissingInput(p) => write!(f, "input {} missing", p.display()),
            StaleReason::NewerInput(p) => write!(f, "{} is newer", p.display()),
            StaleReason::ChangedInput(p) => write!(f, "{} changed", p.display()),
            StaleReason::InputSetChanged => f.write_str("input set changed"),
            StaleReason::ChangedOutput => f.write_str("output modified externally"),
            StaleReason::NeverBuilt => f.write_str("never built"),
            StaleReason::Upstream(name) => write!(f, "`{name}` will be rebuilt"),
        }
    }
}

/// Result of a staleness check.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Freshness {
    /// Output exists and reflects the current inputs.
    UpToDate,
    /// Target must be rebuilt.
    Stale(StaleReason),
}

impl Freshness {
    /// True when the target must be rebuilt.
    pub fn is_stale(&self) -> bool {
        matches!(self, Freshness::Stale(_))
    }
}

/// Evaluates targets against a [`StalenessPolicy`].
///
/// Holds the persisted digests when the content-hash policy is active.
#[derive(Debug)]
pub struct StalenessChecker {
    policy: StalenessPolicy,
    state: BuildState,
    state_path: PathBuf,
}

impl StalenessChecker {
    /// Creates a checker, loading `state_path` for the content-hash policy.
    pub async fn new(policy: StalenessPolicy, state_path: impl Into<PathBuf>) -> Result<Self> {
        let state_path = state_path.into();
        let state = match policy {
            StalenessPolicy::Mtime => BuildState::default(),
            StalenessPolicy::ContentHash => BuildState::load(&state_path).await?,
        };
        Ok(Self {
            policy,
            state,
            state_path,
        })
    }

    /// Active policy.
    pub fn policy(&self) -> StalenessPolicy {
        self.policy
    }

    /// Decides whether `target` must be rebuilt.
    pub async fn check<K: fmt::Display>(&self, target: &Target<K>) -> Result<Freshness> {
        if !exists(target.output()).await {
            return Ok(Freshness::Stale(StaleReason::MissingOutput));
        }

        let inputs = target.resolve_inputs()?;
        for input in &inputs {
            if !exists(input).await {
                return Ok(Freshness::Stale(StaleReason::MissingInput(input.clone())));
            }
        }

        match self.policy {
            StalenessPolicy::Mtime => check_mtime(target.output(), &inputs).await,
            StalenessPolicy::ContentHash => {
                self.check_digests(&target.key().to_string(), target.output(), &inputs)
                    .await
            }
        }
    }

    async fn check_digests(&self, key: &str, output: &Path, inputs: &[PathBuf]) -> Result<Freshness> {
        let Some(record) = self.state.record(key) else {
            return Ok(Freshness::Stale(StaleReason::NeverBuilt));
        };

        if record.inputs.len() != inputs.len()
            || inputs.iter().any(|p| !record.inputs.contains_key(p))
        {
            return Ok(Freshness::Stale(StaleReason::InputSetChanged));
        }

        for input in inputs {
            let digest = calculate_sha256(input).await?;
            if record.inputs.get(input) != Some(&digest) {
                return Ok(Freshness::Stale(StaleReason::ChangedInput(input.clone())));
            }
        }

        if calculate_sha256(output).await? != record.output {
            return Ok(Freshness::Stale(StaleReason::ChangedOutput));
        }

        Ok(Freshness::UpToDate)
    }

    /// Records a successful build of `target`.
    ///
    /// Under the mtime policy this stamps the output with
    /// `max(now, newest input)` so clock skew never leaves it looking older
    /// than its inputs. Under the content-hash policy it also stores digests
    /// and persists the state file.
    pub async fn record<K: fmt::Display>(&mut self, target: &Target<K>) -> Result<()> {
        let inputs = target.resolve_inputs()?;

        let mut stamp = SystemTime::now();
        for input in &inputs {
            if let Ok(mtime) = modified(input).await {
                stamp = stamp.max(mtime);
            }
        }
        set_modified(target.output(), stamp).await?;

        if self.policy == StalenessPolicy::ContentHash {
            let mut digests = BTreeMap::new();
            for input in inputs {
                let digest = calculate_sha256(&input).await?;
                digests.insert(input, digest);
            }
            let record = TargetRecord {
                inputs: digests,
                output: calculate_sha256(target.output()).await?,
                built_at: Some(chrono::Utc::now()),
            };
            self.state.set_record(&target.key().to_string(), record);
            self.state.save(&self.state_path).await?;
        }
        Ok(())
    }

    /// Drops the record of `key` so the next check reports it stale.
    pub async fn forget(&mut self, key: &str) -> Result<()> {
        if self.policy == StalenessPolicy::ContentHash && self.state.record(key).is_some() {
            self.state.remove(key);
            self.state.save(&self.state_path).await?;
        }
        Ok(())
    }
}

async fn check_mtime(output: &Path, inputs: &[PathBuf]) -> Result<Freshness> {
    let output_mtime = modified(output).await?;
    for input in inputs {
        if modified(input).await? > output_mtime {
            return Ok(Freshness::Stale(StaleReason::NewerInput(input.clone())));
        }
    }
    Ok(Freshness::UpToDate)
}

async fn exists(path: &Path) -> bool {
    tokio::fs::symlink_metadata(path).await.is_ok()
}

async fn modified(path: &Path) -> Result<SystemTime> {
    let metadata = tokio::fs::metadata(path)
        .await
        .fs_context("reading modification time", path)?;
    metadata
        .modified()
        .fs_context("reading modification time", path)
}

/// Sets the modification time of a file or directory.
pub(crate) async fn set_modified(path: &Path, time: SystemTime) -> Result<()> {
    let owned = path.to_path_buf();
    tokio::task::spawn_blocking(move || {
        let file = std::fs::File::open(&owned).fs_context("opening output to stamp", &owned)?;
        file.set_modified(time)
            .fs_context("stamping output modification time", &owned)
    })
    .await?
}
