//! Outcome aggregation into a frozen, deterministically ordered [`RunResult`].

use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::artifact::ArtifactFailure;
use crate::outcome::{ComparisonOutcome, NamedOutcome, Threshold};

/// Final result of a run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunResult {
    /// Failing pairs, highest score first.
    pub failed: Vec<NamedOutcome>,
    /// Passing pairs, highest score first.
    pub passed: Vec<NamedOutcome>,
    /// Every warning, per-pair ones first, in enumeration order.
    pub warnings: Vec<NamedOutcome>,
    /// Failing pairs whose artifacts could not be written. These stay
    /// failures; they are not counted in `num_warnings`.
    #[serde(default)]
    pub artifact_failures: Vec<ArtifactFailure>,
    pub num_fails: usize,
    pub num_warnings: usize,
    /// Number of outcomes aggregated.
    pub total: usize,
}

impl RunResult {
    /// `true` when nothing failed. Warnings do not fail a run.
    pub fn success(&self) -> bool {
        self.num_fails == 0
    }

    /// Failures followed by passes, in report order.
    pub fn ordered_results(&self) -> impl Iterator<Item = &NamedOutcome> {
        self.failed.iter().chain(self.passed.iter())
    }

    /// Human-readable verdict line.
    pub fn verdict_line(&self) -> String {
        if self.success() {
            "Success".to_string()
        } else {
            format!("{} fail(s)", self.num_fails)
        }
    }
}

/// Collects outcomes during a run and freezes them once.
#[derive(Debug)]
pub struct ResultAggregator {
    threshold: Threshold,
    outcomes: Vec<NamedOutcome>,
    artifact_failures: Vec<ArtifactFailure>,
    frozen: Option<RunResult>,
}

impl ResultAggregator {
    pub fn new(threshold: Threshold) -> Self {
        Self {
            threshold,
            outcomes: Vec::new(),
            artifact_failures: Vec::new(),
            frozen: None,
        }
    }

    /// Classify a measured score against this run's threshold.
    pub fn classify(&self, score: f64) -> ComparisonOutcome {
        ComparisonOutcome::measured(self.threshold, score)
    }

    /// Append one outcome. Pass/fail entries are re-derived from their score
    /// so the verdict always follows this aggregator's threshold.
    ///
    /// Returns `false` (and drops the outcome) once the result is frozen.
    pub fn add(&mut self, mut outcome: NamedOutcome) -> bool {
        if self.frozen.is_some() {
            warn!(name = %outcome.name, "outcome added after finalize; ignored");
            return false;
        }
        if let Some(score) = outcome.outcome.score() {
            outcome.outcome = self.classify(score);
        }
        self.outcomes.push(outcome);
        true
    }

    /// Record failing pairs whose artifacts are missing. Ignored once frozen.
    pub fn add_artifact_failures(&mut self, failures: impl IntoIterator<Item = ArtifactFailure>) {
        if self.frozen.is_some() {
            warn!("artifact failures added after finalize; ignored");
            return;
        }
        self.artifact_failures.extend(failures);
    }

    pub fn len(&self) -> usize {
        self.outcomes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.outcomes.is_empty()
    }

    /// Sort and freeze. Later calls return the same result.
    pub fn finalize(&mut self) -> RunResult {
        if let Some(result) = &self.frozen {
            return result.clone();
        }

        let mut failed = Vec::new();
        let mut passed = Vec::new();
        let mut warnings = Vec::new();
        for outcome in self.outcomes.drain(..) {
            match outcome.outcome {
                ComparisonOutcome::Fail { .. } => failed.push(outcome),
                ComparisonOutcome::Pass { .. } => passed.push(outcome),
                _ => warnings.push(outcome),
            }
        }

        sort_by_score_desc(&mut failed);
        sort_by_score_desc(&mut passed);
        warnings.sort_by_key(|o| o.ordinal);
        let mut artifact_failures = std::mem::take(&mut self.artifact_failures);
        artifact_failures.sort_by(|a, b| a.name.cmp(&b.name));

        let result = RunResult {
            artifact_failures,
            num_fails: failed.len(),
            num_warnings: warnings.len(),
            total: failed.len() + passed.len() + warnings.len(),
            failed,
            passed,
            warnings,
        };
        self.frozen = Some(result.clone());
        result
    }
}

fn sort_by_score_desc(outcomes: &mut [NamedOutcome]) {
    outcomes.sort_by(|a, b| {
        let sa = a.outcome.score().unwrap_or(0.0);
        let sb = b.outcome.score().unwrap_or(0.0);
        sb.total_cmp(&sa).then(a.ordinal.cmp(&b.ordinal))
    });
}
