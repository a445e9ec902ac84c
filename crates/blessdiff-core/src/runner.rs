//! End-to-end orchestration of one comparison run.

use std::sync::Arc;
use std::time::Instant;

use tracing::{info, Instrument};

use crate::aggregator::ResultAggregator;
use crate::artifact::{missing_in_blessed, ArtifactSet, ArtifactWriter};
use crate::comparator::ImageComparator;
use crate::config::RunConfig;
use crate::discovery::check_inputs;
use crate::error::Result;
use crate::name::ImageName;
use crate::obs;
use crate::primitive::DiffPrimitive;
use crate::report::{write_reports, ReportPaths, RunSummary};
use crate::scheduler::PairScheduler;

/// Everything a finished run produced.
#[derive(Debug, Clone)]
pub struct RunOutcome {
    pub summary: RunSummary,
    pub reports: ReportPaths,
    pub artifacts: Vec<(ImageName, ArtifactSet)>,
}

impl RunOutcome {
    pub fn success(&self) -> bool {
        self.summary.success
    }
}

/// Visual regression run orchestrator.
pub struct VisualRun;

impl VisualRun {
    /// Execute a full run.
    ///
    /// Steps:
    /// - validate the configuration and both input directories (fatal)
    /// - clear the diff directory
    /// - compare every current name under the bounded scheduler; a
    ///   comparison that overruns the timeout is cancelled and awaited
    ///   before its slot is reused
    /// - after all comparisons finish, flag current names missing from the
    ///   blessed set
    /// - sort, freeze and write the reports
    pub async fn execute(
        config: &RunConfig,
        primitive: Arc<dyn DiffPrimitive>,
    ) -> Result<RunOutcome> {
        let span = obs::run_span(&config.base_directory.to_string_lossy());
        Self::execute_inner(config, primitive).instrument(span).await
    }

    async fn execute_inner(
        config: &RunConfig,
        primitive: Arc<dyn DiffPrimitive>,
    ) -> Result<RunOutcome> {
        let start = Instant::now();
        config.validate()?;

        let sets = check_inputs(config)?;
        let prefix = config.name_prefix_filter.as_deref();
        let names = sets.names_to_test(prefix);
        let pairs = sets.pairs_to_test(prefix, &config.blessed_dir);
        if names.is_empty() {
            info!(prefix = ?config.name_prefix_filter, "no current images match the prefix filter");
        }

        let writer = ArtifactWriter::new(&config.diff_dir).with_names(&names);
        writer.prepare()?;

        let comparator = ImageComparator::new(primitive).with_timeout(config.timeout());
        obs::emit_run_started(
            names.len(),
            config.concurrency,
            config.threshold.value(),
            comparator.primitive_name(),
        );
        let scheduler =
            PairScheduler::new(comparator, writer, config.threshold, config.concurrency);

        let schedule = scheduler.run(pairs).await;

        let mut aggregator = ResultAggregator::new(config.threshold);
        for outcome in schedule.outcomes {
            aggregator.add(outcome);
        }
        for warning in missing_in_blessed(&names, &sets.blessed, names.len()) {
            obs::emit_pair_warning(&warning.name, "missing in blessed");
            aggregator.add(warning);
        }
        aggregator.add_artifact_failures(schedule.artifact_failures);
        let result = aggregator.finalize();

        let duration_ms = start.elapsed().as_millis() as u64;
        let summary = RunSummary::new(config, result, duration_ms);
        let reports = write_reports(config, &summary)?;

        obs::emit_run_finished(
            duration_ms,
            summary.total,
            summary.num_fails,
            summary.num_warnings,
        );

        Ok(RunOutcome {
            summary,
            reports,
            artifacts: schedule.artifacts,
        })
    }
}
