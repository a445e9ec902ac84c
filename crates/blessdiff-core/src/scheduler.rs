//! Bounded parallel dispatch of pair comparisons.
//!
//! Every name becomes its own task. A counting semaphore caps the number of
//! comparisons in flight; blocking work inside a comparison runs on tokio's
//! blocking pool or in an external process. The scheduler returns only after
//! every task has finished, with outcomes in enumeration order.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tracing::{instrument, warn};

use crate::artifact::{ArtifactFailure, ArtifactSet, ArtifactWriter};
use crate::comparator::{ImageComparator, PairMeasurement};
use crate::discovery::ImagePair;
use crate::name::ImageName;
use crate::obs;
use crate::outcome::{ComparisonOutcome, NamedOutcome, Threshold};

/// Result of processing one name.
#[derive(Debug, Clone, PartialEq)]
pub enum PairResult {
    /// The pair produced an outcome (pass, fail or a per-pair warning).
    Outcome {
        outcome: ComparisonOutcome,
        artifacts: Option<ArtifactSet>,
        /// Why a failing pair has no artifacts.
        artifact_error: Option<String>,
    },
    /// No blessed counterpart; reported later by the set-difference pass.
    Skipped,
}

/// Everything the scheduler learned, in enumeration order.
#[derive(Debug, Clone, Default)]
pub struct ScheduleReport {
    pub outcomes: Vec<NamedOutcome>,
    /// Names skipped because the blessed image is missing.
    pub skipped: Vec<ImageName>,
    pub artifacts: Vec<(ImageName, ArtifactSet)>,
    /// Failing pairs whose artifacts could not be written.
    pub artifact_failures: Vec<ArtifactFailure>,
    /// Highest number of comparisons observed in flight at once.
    pub peak_in_flight: usize,
}

/// Dispatches comparisons across a bounded worker pool.
#[derive(Clone)]
pub struct PairScheduler {
    comparator: ImageComparator,
    artifacts: ArtifactWriter,
    threshold: Threshold,
    concurrency: usize,
}

struct Progress {
    done: AtomicUsize,
    in_flight: AtomicUsize,
    peak: AtomicUsize,
    total: usize,
}

impl PairScheduler {
    pub fn new(
        comparator: ImageComparator,
        artifacts: ArtifactWriter,
        threshold: Threshold,
        concurrency: usize,
    ) -> Self {
        Self {
            comparator,
            artifacts,
            threshold,
            concurrency: concurrency.max(1),
        }
    }

    pub fn concurrency(&self) -> usize {
        self.concurrency
    }

    /// Compare every pair in `pairs`.
    ///
    /// Returns once all comparisons have completed. A panicking or otherwise
    /// lost worker is reported as a `WarnDiffFailed` for its name.
    #[instrument(skip_all, fields(pairs = pairs.len(), concurrency = self.concurrency))]
    pub async fn run(&self, pairs: Vec<ImagePair>) -> ScheduleReport {
        let sem = Arc::new(Semaphore::new(self.concurrency));
        let progress = Arc::new(Progress {
            done: AtomicUsize::new(0),
            in_flight: AtomicUsize::new(0),
            peak: AtomicUsize::new(0),
            total: pairs.len(),
        });

        let mut join_set = JoinSet::new();
        for (ordinal, pair) in pairs.iter().cloned().enumerate() {
            let sem = Arc::clone(&sem);
            let progress = Arc::clone(&progress);
            let this = self.clone();

            join_set.spawn(async move {
                let _permit = sem.acquire_owned().await.ok();

                let now = progress.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
                progress.peak.fetch_max(now, Ordering::SeqCst);

                let result = this.process(&pair).await;

                progress.in_flight.fetch_sub(1, Ordering::SeqCst);
                let done = progress.done.fetch_add(1, Ordering::SeqCst) + 1;
                let score = match &result {
                    PairResult::Outcome { outcome, .. } => outcome.score(),
                    PairResult::Skipped => None,
                };
                obs::emit_pair_compared(&pair.name, done, progress.total, score);

                (ordinal, result)
            });
        }

        let mut slots: Vec<Option<PairResult>> = vec![None; pairs.len()];
        while let Some(joined) = join_set.join_next().await {
            match joined {
                Ok((ordinal, result)) => slots[ordinal] = Some(result),
                Err(e) => warn!(error = %e, "comparison task failed"),
            }
        }

        let mut report = ScheduleReport {
            peak_in_flight: progress.peak.load(Ordering::SeqCst),
            ..ScheduleReport::default()
        };
        for (ordinal, (pair, slot)) in pairs.into_iter().zip(slots).enumerate() {
            let name = pair.name;
            let result = slot.unwrap_or_else(|| PairResult::Outcome {
                outcome: ComparisonOutcome::WarnDiffFailed {
                    reason: "comparison worker did not complete".to_string(),
                },
                artifacts: None,
                artifact_error: None,
            });
            match result {
                PairResult::Outcome {
                    outcome,
                    artifacts,
                    artifact_error,
                } => {
                    if let Some(set) = artifacts {
                        report.artifacts.push((name.clone(), set));
                    }
                    if let Some(reason) = artifact_error {
                        report.artifact_failures.push(ArtifactFailure {
                            name: name.clone(),
                            reason,
                        });
                    }
                    report
                        .outcomes
                        .push(NamedOutcome::new(name, ordinal, outcome));
                }
                PairResult::Skipped => report.skipped.push(name),
            }
        }
        report
    }

    /// Compare one pair and, on failure, hand its files to the artifact
    /// writer while the scratch directory is still alive.
    async fn process(&self, pair: &ImagePair) -> PairResult {
        let name = &pair.name;
        match self.comparator.compare(name, &pair.blessed, &pair.current).await {
            Ok(PairMeasurement::Measured { score, workspace }) => {
                let outcome = ComparisonOutcome::measured(self.threshold, score);
                let mut artifacts = None;
                let mut artifact_error = None;
                if outcome.is_fail() {
                    let writer = self.artifacts.clone();
                    let pair = pair.clone();
                    let persisted = tokio::task::spawn_blocking(move || {
                        let set = writer.persist(
                            &pair.name,
                            &pair.blessed,
                            &pair.current,
                            workspace.diff_image(),
                        );
                        drop(workspace);
                        set
                    })
                    .await;
                    match persisted {
                        Ok(Ok(set)) => {
                            obs::emit_artifact_persisted(name, score);
                            artifacts = Some(set);
                        }
                        Ok(Err(e)) => artifact_error = Some(e.to_string()),
                        Err(e) => artifact_error = Some(format!("artifact task failed: {e}")),
                    }
                    if let Some(reason) = &artifact_error {
                        warn!(name = %name, error = %reason, "failed to persist artifacts");
                    }
                }
                PairResult::Outcome {
                    outcome,
                    artifacts,
                    artifact_error,
                }
            }
            Ok(PairMeasurement::MissingCurrent) => {
                obs::emit_pair_warning(name, "missing in current");
                PairResult::Outcome {
                    outcome: ComparisonOutcome::WarnMissingCurrent,
                    artifacts: None,
                    artifact_error: None,
                }
            }
            Ok(PairMeasurement::MissingBlessed) => PairResult::Skipped,
            Err(e) => {
                let reason = e.to_string();
                obs::emit_pair_warning(name, &reason);
                PairResult::Outcome {
                    outcome: ComparisonOutcome::WarnDiffFailed { reason },
                    artifacts: None,
                    artifact_error: None,
                }
            }
        }
    }
}
