//! Report artifacts for a finished run.
//!
//! Three files land in the results directory:
//! - `results.txt`: `<name> <score>` per compared image, failures first
//! - `warnings.txt`: one line per anomaly, then one per failing image whose
//!   artifacts could not be written
//! - `summary.json`: machine-readable [`RunSummary`]

use std::path::PathBuf;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::aggregator::RunResult;
use crate::config::RunConfig;
use crate::error::Result;
use crate::outcome::format_score;

/// Machine-readable summary of a run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunSummary {
    pub run_at: DateTime<Utc>,
    pub threshold: f64,
    pub concurrency: usize,
    pub name_prefix_filter: Option<String>,
    pub duration_ms: u64,
    pub total: usize,
    pub num_fails: usize,
    pub num_warnings: usize,
    pub success: bool,
    pub result: RunResult,
}

impl RunSummary {
    pub fn new(config: &RunConfig, result: RunResult, duration_ms: u64) -> Self {
        Self {
            run_at: Utc::now(),
            threshold: config.threshold.value(),
            concurrency: config.concurrency,
            name_prefix_filter: config.name_prefix_filter.clone(),
            duration_ms,
            total: result.total,
            num_fails: result.num_fails,
            num_warnings: result.num_warnings,
            success: result.success(),
            result,
        }
    }
}

/// Where the reports were written.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReportPaths {
    pub results: PathBuf,
    pub warnings: PathBuf,
    pub summary: PathBuf,
}

/// One `<name> <score>` line per compared image, in report order.
pub fn render_results(result: &RunResult) -> String {
    let mut out = String::new();
    for entry in result.ordered_results() {
        if let Some(score) = entry.outcome.score() {
            out.push_str(&format!("{} {}\n", entry.name, format_score(score)));
        }
    }
    out
}

/// One `<name>: <anomaly>` line per warning and per artifact failure.
pub fn render_warnings(result: &RunResult) -> String {
    let mut out = String::new();
    for entry in &result.warnings {
        if let Some(warning) = entry.outcome.to_warning(&entry.name) {
            out.push_str(&format!("{warning}\n"));
        }
    }
    for failure in &result.artifact_failures {
        out.push_str(&format!("{}\n", failure.to_warning()));
    }
    out
}

/// Console summary: counts followed by the verdict line.
pub fn render_summary(result: &RunResult) -> String {
    format!(
        "{} compared, {} warning(s), {} failure(s)\n{}\n",
        result.total - result.num_warnings,
        result.num_warnings,
        result.num_fails,
        result.verdict_line()
    )
}

/// Write all three report files, creating the results directory if needed.
pub fn write_reports(config: &RunConfig, summary: &RunSummary) -> Result<ReportPaths> {
    std::fs::create_dir_all(&config.results_dir)?;

    let paths = ReportPaths {
        results: config.results_path(),
        warnings: config.warnings_path(),
        summary: config.summary_path(),
    };
    std::fs::write(&paths.results, render_results(&summary.result))?;
    std::fs::write(&paths.warnings, render_warnings(&summary.result))?;
    std::fs::write(&paths.summary, serde_json::to_string_pretty(summary)?)?;
    Ok(paths)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::aggregator::ResultAggregator;
    use crate::artifact::ArtifactFailure;
    use crate::outcome::{ComparisonOutcome, NamedOutcome, Threshold};
    use serde_json::Value;

    fn sample() -> RunResult {
        let mut agg = ResultAggregator::new(Threshold::default());
        agg.add(NamedOutcome::new("calm".into(), 0, ComparisonOutcome::Pass { score: 0.0 }));
        agg.add(NamedOutcome::new("broken".into(), 1, ComparisonOutcome::Fail { score: 5.0 }));
        agg.add(NamedOutcome::new("gone".into(), 2, ComparisonOutcome::WarnMissingCurrent));
        agg.add(NamedOutcome::new("new".into(), 3, ComparisonOutcome::WarnMissingBlessed));
        agg.finalize()
    }

    #[test]
    fn test_results_lines_fail_first() {
        assert_eq!(render_results(&sample()), "broken 5.0\ncalm 0.0\n");
    }

    #[test]
    fn test_warning_lines() {
        assert_eq!(
            render_warnings(&sample()),
            "gone: missing in current\nnew: missing in blessed\n"
        );
    }

    #[test]
    fn test_artifact_failures_listed_after_warnings() {
        let mut agg = ResultAggregator::new(Threshold::default());
        agg.add(NamedOutcome::new("gone".into(), 0, ComparisonOutcome::WarnMissingCurrent));
        agg.add(NamedOutcome::new("x".into(), 1, ComparisonOutcome::Fail { score: 5.0 }));
        agg.add_artifact_failures([ArtifactFailure {
            name: "x".into(),
            reason: "permission denied".to_string(),
        }]);

        assert_eq!(
            render_warnings(&agg.finalize()),
            "gone: missing in current\nx: artifacts not written: permission denied\n"
        );
    }

    #[test]
    fn test_summary_text() {
        let text = render_summary(&sample());
        assert!(text.starts_with("2 compared, 2 warning(s), 1 failure(s)"));
        assert!(text.trim_end().ends_with("1 fail(s)"));
    }

    #[test]
    fn test_write_reports() {
        let tmp = tempfile::TempDir::new().unwrap();
        let config = RunConfig::new(tmp.path()).with_results_dir(tmp.path().join("out"));
        let summary = RunSummary::new(&config, sample(), 12);

        let paths = write_reports(&config, &summary).unwrap();
        let results = std::fs::read_to_string(&paths.results).unwrap();
        assert_eq!(results.lines().next(), Some("broken 5.0"));

        let v: Value = serde_json::from_str(&std::fs::read_to_string(&paths.summary).unwrap())
            .expect("summary is json");
        for key in &["run_at", "threshold", "total", "num_fails", "num_warnings", "result"] {
            assert!(v.get(*key).is_some(), "missing key: {}", key);
        }
        assert_eq!(v["success"], false);
    }
}
