//! Single-pair comparison with scoped working files.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use tempfile::TempDir;
use tracing::{debug, warn};

use crate::error::DiffError;
use crate::name::ImageName;
use crate::primitive::{CancelSignal, DiffPrimitive};

/// Scratch directory owned by one comparison.
///
/// Holds the composite diff image until it is either discarded or copied
/// into the artifact directory. Removed from disk when dropped.
#[derive(Debug)]
pub struct DiffWorkspace {
    dir: TempDir,
    diff_image: PathBuf,
}

impl DiffWorkspace {
    fn create(name: &ImageName, scratch_root: Option<&Path>) -> std::io::Result<Self> {
        let mut builder = tempfile::Builder::new();
        let prefix = format!("blessdiff-{}-", name);
        builder.prefix(&prefix);
        let dir = match scratch_root {
            Some(root) => builder.tempdir_in(root)?,
            None => builder.tempdir()?,
        };
        let diff_image = name.png_in(dir.path());
        Ok(Self { dir, diff_image })
    }

    /// Where the primitive writes the composite.
    pub fn diff_image(&self) -> &Path {
        &self.diff_image
    }

    pub fn path(&self) -> &Path {
        self.dir.path()
    }
}

/// What comparing one pair produced.
#[derive(Debug)]
pub enum PairMeasurement {
    /// Both images existed and the primitive produced a score.
    Measured { score: f64, workspace: DiffWorkspace },
    /// The current image is absent; the primitive was not invoked.
    MissingCurrent,
    /// No baseline to compare against; the pair is skipped.
    MissingBlessed,
}

/// Wraps a [`DiffPrimitive`] with existence checks, a timeout and scoped
/// temporary files.
#[derive(Clone)]
pub struct ImageComparator {
    primitive: Arc<dyn DiffPrimitive>,
    timeout: Option<Duration>,
    scratch_root: Option<PathBuf>,
}

impl ImageComparator {
    pub fn new(primitive: Arc<dyn DiffPrimitive>) -> Self {
        Self {
            primitive,
            timeout: None,
            scratch_root: None,
        }
    }

    pub fn with_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.timeout = timeout;
        self
    }

    /// Create per-comparison scratch directories under `root` instead of the
    /// system temp dir.
    pub fn with_scratch_root(mut self, root: impl Into<PathBuf>) -> Self {
        self.scratch_root = Some(root.into());
        self
    }

    pub fn primitive_name(&self) -> &str {
        self.primitive.name()
    }

    /// Compare one pair.
    ///
    /// The scratch directory is released on every error path; on success it
    /// travels with the measurement so a failing pair can persist its diff.
    ///
    /// On timeout the primitive is cancelled and then awaited until it has
    /// actually stopped, so the caller's concurrency slot is never released
    /// while its work is still running.
    pub async fn compare(
        &self,
        name: &ImageName,
        blessed: &Path,
        current: &Path,
    ) -> Result<PairMeasurement, DiffError> {
        if !tokio::fs::try_exists(current).await? {
            return Ok(PairMeasurement::MissingCurrent);
        }
        if !tokio::fs::try_exists(blessed).await? {
            return Ok(PairMeasurement::MissingBlessed);
        }

        let workspace = DiffWorkspace::create(name, self.scratch_root.as_deref())?;
        let score = {
            let cancel = CancelSignal::new();
            let mut call = self
                .primitive
                .diff(blessed, current, workspace.diff_image(), &cancel);

            let score = match self.timeout {
                Some(limit) => match tokio::time::timeout(limit, &mut call).await {
                    Ok(result) => result?,
                    Err(_) => {
                        cancel.cancel();
                        if call.await.is_ok() {
                            warn!(
                                name = %name,
                                primitive = %self.primitive.name(),
                                "primitive finished after its timeout; result discarded"
                            );
                        }
                        return Err(DiffError::Timeout(limit));
                    }
                },
                None => call.await?,
            };
            score
        };

        if !score.is_finite() || score < 0.0 {
            return Err(DiffError::InvalidScore(score));
        }

        debug!(name = %name, score, primitive = %self.primitive.name(), "pair measured");
        Ok(PairMeasurement::Measured { score, workspace })
    }
}
