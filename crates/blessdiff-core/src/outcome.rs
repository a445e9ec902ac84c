//! Per-pair outcomes and threshold classification.

use serde::{Deserialize, Serialize};

use crate::config::DEFAULT_THRESHOLD;
use crate::error::{BlessError, Result, Side};
use crate::name::ImageName;

/// Score above which a comparison fails. Non-negative and finite.
#[derive(Debug, Clone, Copy, PartialEq, PartialOrd, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Threshold(f64);

impl Threshold {
    pub fn new(value: f64) -> Result<Self> {
        if !value.is_finite() || value < 0.0 {
            return Err(BlessError::Configuration(format!(
                "threshold must be a non-negative number, got {value}"
            )));
        }
        Ok(Self(value))
    }

    pub fn value(&self) -> f64 {
        self.0
    }

    /// `score > threshold` fails; equality passes.
    pub fn classify(&self, score: f64) -> Verdict {
        if score > self.0 {
            Verdict::Fail
        } else {
            Verdict::Pass
        }
    }
}

impl Default for Threshold {
    fn default() -> Self {
        Self(DEFAULT_THRESHOLD)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Verdict {
    Pass,
    Fail,
}

/// Result of processing one image name.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ComparisonOutcome {
    Pass { score: f64 },
    Fail { score: f64 },
    WarnMissingCurrent,
    WarnMissingBlessed,
    WarnDiffFailed { reason: String },
}

impl ComparisonOutcome {
    /// Build the pass/fail outcome for a measured score.
    pub fn measured(threshold: Threshold, score: f64) -> Self {
        match threshold.classify(score) {
            Verdict::Pass => ComparisonOutcome::Pass { score },
            Verdict::Fail => ComparisonOutcome::Fail { score },
        }
    }

    pub fn score(&self) -> Option<f64> {
        match self {
            ComparisonOutcome::Pass { score } | ComparisonOutcome::Fail { score } => Some(*score),
            _ => None,
        }
    }

    pub fn is_fail(&self) -> bool {
        matches!(self, ComparisonOutcome::Fail { .. })
    }

    pub fn is_pass(&self) -> bool {
        matches!(self, ComparisonOutcome::Pass { .. })
    }

    pub fn is_warning(&self) -> bool {
        matches!(
            self,
            ComparisonOutcome::WarnMissingCurrent
                | ComparisonOutcome::WarnMissingBlessed
                | ComparisonOutcome::WarnDiffFailed { .. }
        )
    }

    /// The warning this outcome represents, `None` for pass/fail.
    pub fn to_warning(&self, name: &ImageName) -> Option<BlessError> {
        match self {
            ComparisonOutcome::WarnMissingCurrent => Some(BlessError::MissingCounterpart {
                name: name.clone(),
                side: Side::Current,
            }),
            ComparisonOutcome::WarnMissingBlessed => Some(BlessError::MissingCounterpart {
                name: name.clone(),
                side: Side::Blessed,
            }),
            ComparisonOutcome::WarnDiffFailed { reason } => {
                Some(BlessError::DiffPrimitiveFailure {
                    name: name.clone(),
                    reason: reason.clone(),
                })
            }
            _ => None,
        }
    }
}

/// An outcome tagged with its image name and enumeration position.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NamedOutcome {
    pub name: ImageName,
    /// Position in the enumeration; breaks score ties.
    pub ordinal: usize,
    pub outcome: ComparisonOutcome,
}

impl NamedOutcome {
    pub fn new(name: ImageName, ordinal: usize, outcome: ComparisonOutcome) -> Self {
        Self {
            name,
            ordinal,
            outcome,
        }
    }
}

/// Format a score in plain decimal notation with at least one decimal place
/// (`5.0`, `0.0123`, `0.0000001`).
pub fn format_score(score: f64) -> String {
    let text = score.to_string();
    if score.is_finite() && !text.contains('.') {
        format!("{text}.0")
    } else {
        text
    }
}
