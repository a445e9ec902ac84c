//! blessdiff - visual regression runner CLI
//!
//! ## Commands
//!
//! - `run`: compare the current image set against the blessed baseline
//! - `compare`: score a single pair of images
//!
//! Exit status of both: 0 when nothing failed, 1 when any image failed,
//! 2 when the comparison could not be carried out.

use std::path::{Path, PathBuf};
use std::time::Duration;
use std::process::ExitCode;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use tracing::{debug, Level};

use blessdiff_core::config::DEFAULT_TIMEOUT_SECS;
use blessdiff_core::outcome::format_score;
use blessdiff_core::report::render_summary;
use blessdiff_core::{
    CommandDiff, DiffPrimitive, ImageComparator, ImageName, PairMeasurement,
    PixelDiff, RunConfig, Threshold, Verdict, VisualRun,
};

const EXIT_FAILURES: u8 = 1;
const EXIT_ABORTED: u8 = 2;

#[derive(Parser)]
#[command(name = "blessdiff")]
#[command(author = "Stevedores Org")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "Visual regression runner: compare rendered images against a blessed baseline", long_about = None)]
struct Cli {
    /// Enable verbose output
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Emit JSON-formatted log lines
    #[arg(long, global = true)]
    json: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Compare every current image against its blessed counterpart
    Run {
        /// Directory holding blessed/, current/ and diff/
        #[arg(long, env = "BLESSDIFF_BASE_DIR", default_value = ".")]
        base_dir: PathBuf,

        /// Blessed image directory (default: <base-dir>/blessed)
        #[arg(long)]
        blessed: Option<PathBuf>,

        /// Current image directory (default: <base-dir>/current)
        #[arg(long)]
        current: Option<PathBuf>,

        /// Failure artifact directory, cleared on every run (default: <base-dir>/diff)
        #[arg(long)]
        diff_dir: Option<PathBuf>,

        /// Report directory (default: <base-dir>)
        #[arg(long)]
        results_dir: Option<PathBuf>,

        #[command(flatten)]
        scoring: ScoringArgs,

        /// Only compare images whose name starts with this prefix
        #[arg(long, env = "BLESSDIFF_PREFIX")]
        prefix: Option<String>,

        /// Maximum comparisons in flight (default: physical CPU cores)
        #[arg(short, long, env = "BLESSDIFF_JOBS")]
        jobs: Option<usize>,
    },

    /// Score one blessed/current pair, useful for calibrating thresholds
    Compare {
        /// Blessed (reference) image
        blessed: PathBuf,

        /// Current (candidate) image
        current: PathBuf,

        /// Keep the composite difference image at this path
        #[arg(long)]
        diff_out: Option<PathBuf>,

        #[command(flatten)]
        scoring: ScoringArgs,
    },
}

/// Options shared by every command that scores images.
#[derive(clap::Args)]
struct ScoringArgs {
    /// Scores strictly above this fail
    #[arg(long, env = "BLESSDIFF_THRESHOLD", default_value_t = blessdiff_core::config::DEFAULT_THRESHOLD)]
    threshold: f64,

    /// External diff tool, e.g. "perceptualdiff {blessed} {current} -output {diff}".
    /// It must print the score; exit codes outside --success-codes are errors
    #[arg(long, env = "BLESSDIFF_DIFF_COMMAND")]
    diff_command: Option<String>,

    /// Exit codes of --diff-command that still carry a score, comma separated
    #[arg(
        long,
        env = "BLESSDIFF_SUCCESS_CODES",
        value_delimiter = ',',
        default_value = "0",
        allow_negative_numbers = true
    )]
    success_codes: Vec<i32>,

    /// Per-comparison timeout in seconds, 0 disables
    #[arg(long, env = "BLESSDIFF_TIMEOUT_SECS", default_value_t = DEFAULT_TIMEOUT_SECS)]
    timeout_secs: u64,
}

impl ScoringArgs {
    fn primitive(&self) -> Result<Arc<dyn DiffPrimitive>> {
        match &self.diff_command {
            Some(template) => {
                let command = CommandDiff::parse(template)
                    .with_context(|| format!("Invalid --diff-command: {:?}", template))?
                    .with_success_codes(self.success_codes.clone());
                debug!(
                    program = command.program(),
                    success_codes = ?self.success_codes,
                    "using external diff tool"
                );
                Ok(Arc::new(command))
            }
            None => Ok(Arc::new(PixelDiff::new())),
        }
    }

    fn threshold(&self) -> Result<Threshold> {
        Threshold::new(self.threshold).context("Invalid --threshold")
    }

    fn timeout(&self) -> Option<Duration> {
        (self.timeout_secs > 0).then(|| Duration::from_secs(self.timeout_secs))
    }
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    // Setup logging
    let level = if cli.verbose {
        Level::DEBUG
    } else {
        Level::INFO
    };
    blessdiff_core::init_tracing(cli.json, level);

    let result = match cli.command {
        Commands::Run {
            base_dir,
            blessed,
            current,
            diff_dir,
            results_dir,
            scoring,
            prefix,
            jobs,
        } => {
            let dirs = RunDirs {
                base_dir,
                blessed,
                current,
                diff_dir,
                results_dir,
            };
            cmd_run(dirs, &scoring, prefix, jobs).await
        }
        Commands::Compare {
            blessed,
            current,
            diff_out,
            scoring,
        } => cmd_compare(&blessed, &current, diff_out.as_deref(), &scoring).await,
    };

    match result {
        Ok(true) => ExitCode::SUCCESS,
        Ok(false) => ExitCode::from(EXIT_FAILURES),
        Err(e) => {
            eprintln!("error: {:#}", e);
            ExitCode::from(EXIT_ABORTED)
        }
    }
}

struct RunDirs {
    base_dir: PathBuf,
    blessed: Option<PathBuf>,
    current: Option<PathBuf>,
    diff_dir: Option<PathBuf>,
    results_dir: Option<PathBuf>,
}

impl RunDirs {
    fn apply(self, mut config: RunConfig) -> RunConfig {
        if let Some(dir) = self.blessed {
            config = config.with_blessed_dir(dir);
        }
        if let Some(dir) = self.current {
            config = config.with_current_dir(dir);
        }
        if let Some(dir) = self.diff_dir {
            config = config.with_diff_dir(dir);
        }
        if let Some(dir) = self.results_dir {
            config = config.with_results_dir(dir);
        }
        config
    }
}

/// Run a full comparison and print the summary. Returns whether the run
/// passed.
async fn cmd_run(
    dirs: RunDirs,
    scoring: &ScoringArgs,
    prefix: Option<String>,
    jobs: Option<usize>,
) -> Result<bool> {
    let mut config = RunConfig::new(&dirs.base_dir)
        .with_threshold(scoring.threshold()?)
        .with_timeout_secs(scoring.timeout_secs);
    config = dirs.apply(config);
    if let Some(prefix) = prefix {
        config = config.with_prefix(prefix);
    }
    if let Some(jobs) = jobs {
        config = config.with_concurrency(jobs);
    }
    config.validate().context("Invalid run configuration")?;

    let primitive = scoring.primitive()?;

    println!("Blessed: {}", config.blessed_dir.display());
    println!("Current: {}", config.current_dir.display());
    println!(
        "Threshold: {}, jobs: {}",
        format_score(config.threshold.value()),
        config.concurrency
    );
    println!();

    let outcome = VisualRun::execute(&config, primitive)
        .await
        .context("Comparison run failed")?;
    let result = &outcome.summary.result;

    for entry in &result.failed {
        if let Some(score) = entry.outcome.score() {
            println!("  ✗ {} {}", entry.name, format_score(score));
        }
    }
    for entry in &result.warnings {
        if let Some(warning) = entry.outcome.to_warning(&entry.name) {
            println!("  ! {}", warning);
        }
    }
    for failure in &result.artifact_failures {
        println!("  ! {}", failure.to_warning());
    }
    if !result.failed.is_empty()
        || !result.warnings.is_empty()
        || !result.artifact_failures.is_empty()
    {
        println!();
    }

    print!("{}", render_summary(result));
    println!("Results: {}", outcome.reports.results.display());
    if !outcome.artifacts.is_empty() {
        println!("Artifacts: {}", config.diff_dir.display());
    }

    Ok(outcome.success())
}

/// Score a single pair of images. Returns whether the pair passed.
async fn cmd_compare(
    blessed: &Path,
    current: &Path,
    diff_out: Option<&Path>,
    scoring: &ScoringArgs,
) -> Result<bool> {
    let threshold = scoring.threshold()?;
    let comparator = ImageComparator::new(scoring.primitive()?).with_timeout(scoring.timeout());

    let name = ImageName::from_path(current).unwrap_or_else(|| ImageName::new("pair"));
    let measurement = comparator
        .compare(&name, blessed, current)
        .await
        .with_context(|| format!("Failed to compare {}", name))?;

    let (score, workspace) = match measurement {
        PairMeasurement::Measured { score, workspace } => (score, workspace),
        PairMeasurement::MissingCurrent => {
            anyhow::bail!("Current image not found: {}", current.display())
        }
        PairMeasurement::MissingBlessed => {
            anyhow::bail!("Blessed image not found: {}", blessed.display())
        }
    };

    if let Some(path) = diff_out {
        if workspace.diff_image().exists() {
            std::fs::copy(workspace.diff_image(), path)
                .with_context(|| format!("Failed to write {}", path.display()))?;
            println!("Diff image: {}", path.display());
        } else {
            println!("Diff image: none produced");
        }
    }

    let verdict = threshold.classify(score);
    let label = match verdict {
        Verdict::Pass => "✓ PASS",
        Verdict::Fail => "✗ FAIL",
    };
    println!(
        "{} {} (threshold {})",
        format_score(score),
        label,
        format_score(threshold.value())
    );
    Ok(verdict == Verdict::Pass)
}
