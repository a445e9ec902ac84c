//! Run configuration.
//!
//! A [`RunConfig`] is built once at startup, validated, and then shared
//! read-only with every comparison worker.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::error::{BlessError, Result};
use crate::outcome::Threshold;

/// Default score above which a pair is classified as failing.
pub const DEFAULT_THRESHOLD: f64 = 0.01;

/// Default upper bound on a single comparison.
pub const DEFAULT_TIMEOUT_SECS: u64 = 120;

pub const BLESSED_SUBDIR: &str = "blessed";
pub const CURRENT_SUBDIR: &str = "current";
pub const DIFF_SUBDIR: &str = "diff";

/// Immutable configuration for one comparison run.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RunConfig {
    /// Root holding the blessed, current and diff directories.
    pub base_directory: PathBuf,

    /// Accepted reference images.
    pub blessed_dir: PathBuf,

    /// Freshly generated images under test.
    pub current_dir: PathBuf,

    /// Output location for failure artifacts. Cleared at the start of a run.
    pub diff_dir: PathBuf,

    /// Where `results.txt`, `warnings.txt` and `summary.json` are written.
    pub results_dir: PathBuf,

    /// Scores strictly above this fail.
    pub threshold: Threshold,

    /// Only names starting with this prefix are compared.
    pub name_prefix_filter: Option<String>,

    /// Maximum number of comparisons in flight.
    pub concurrency: usize,

    /// Per-comparison timeout in seconds (0 = unbounded).
    pub timeout_secs: u64,
}

impl RunConfig {
    /// Configuration rooted at `base_directory` with default layout and limits.
    pub fn new(base_directory: impl Into<PathBuf>) -> Self {
        let base_directory = base_directory.into();
        Self {
            blessed_dir: base_directory.join(BLESSED_SUBDIR),
            current_dir: base_directory.join(CURRENT_SUBDIR),
            diff_dir: base_directory.join(DIFF_SUBDIR),
            results_dir: base_directory.clone(),
            base_directory,
            threshold: Threshold::default(),
            name_prefix_filter: None,
            concurrency: default_concurrency(),
            timeout_secs: DEFAULT_TIMEOUT_SECS,
        }
    }

    pub fn with_threshold(mut self, threshold: Threshold) -> Self {
        self.threshold = threshold;
        self
    }

    pub fn with_prefix(mut self, prefix: impl Into<String>) -> Self {
        let prefix = prefix.into();
        self.name_prefix_filter = if prefix.is_empty() { None } else { Some(prefix) };
        self
    }

    pub fn with_concurrency(mut self, concurrency: usize) -> Self {
        self.concurrency = concurrency;
        self
    }

    pub fn with_timeout_secs(mut self, timeout_secs: u64) -> Self {
        self.timeout_secs = timeout_secs;
        self
    }

    pub fn with_blessed_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.blessed_dir = dir.into();
        self
    }

    pub fn with_current_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.current_dir = dir.into();
        self
    }

    pub fn with_diff_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.diff_dir = dir.into();
        self
    }

    pub fn with_results_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.results_dir = dir.into();
        self
    }

    /// Per-comparison timeout, if any.
    pub fn timeout(&self) -> Option<Duration> {
        (self.timeout_secs > 0).then(|| Duration::from_secs(self.timeout_secs))
    }

    pub fn results_path(&self) -> PathBuf {
        self.results_dir.join("results.txt")
    }

    pub fn warnings_path(&self) -> PathBuf {
        self.results_dir.join("warnings.txt")
    }

    pub fn summary_path(&self) -> PathBuf {
        self.results_dir.join("summary.json")
    }

    /// Check the scalar settings. Directory checks happen in
    /// [`crate::discovery::check_inputs`].
    pub fn validate(&self) -> Result<()> {
        Threshold::new(self.threshold.value())?;
        if self.concurrency == 0 {
            return Err(BlessError::Configuration(
                "concurrency must be greater than zero".to_string(),
            ));
        }
        if same_dir(&self.diff_dir, &self.blessed_dir) || same_dir(&self.diff_dir, &self.current_dir)
        {
            return Err(BlessError::Configuration(format!(
                "diff directory {} must differ from the input directories",
                self.diff_dir.display()
            )));
        }
        Ok(())
    }
}

/// Physical core count, never less than one.
pub fn default_concurrency() -> usize {
    num_cpus::get_physical().max(1)
}

fn same_dir(a: &Path, b: &Path) -> bool {
    match (a.canonicalize(), b.canonicalize()) {
        (Ok(a), Ok(b)) => a == b,
        _ => a == b,
    }
}
