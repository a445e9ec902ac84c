//! blessdiff core - visual regression comparison
//!
//! Compares a freshly rendered ("current") PNG set against an accepted
//! ("blessed") baseline:
//! - Discovers image pairs by file stem
//! - Scores each pair with a pluggable difference primitive, bounded in
//!   parallel
//! - Classifies scores against a threshold and captures failure artifacts
//! - Emits a deterministically sorted report

pub mod aggregator;
pub mod artifact;
pub mod comparator;
pub mod config;
pub mod discovery;
pub mod error;
pub mod name;
pub mod obs;
pub mod outcome;
pub mod primitive;
pub mod report;
pub mod runner;
pub mod scheduler;
pub mod telemetry;

// Re-export key types
pub use aggregator::{ResultAggregator, RunResult};
pub use artifact::{ArtifactFailure, ArtifactSet, ArtifactWriter};
pub use comparator::{ImageComparator, PairMeasurement};
pub use config::RunConfig;
pub use discovery::{ImagePair, ImageSet, InputSets};
pub use error::{BlessError, DiffError, Result, Side};
pub use name::ImageName;
pub use outcome::{ComparisonOutcome, NamedOutcome, Threshold, Verdict};
pub use primitive::{CancelSignal, CommandDiff, DiffPrimitive, PixelDiff};
pub use report::{ReportPaths, RunSummary};
pub use runner::{RunOutcome, VisualRun};
pub use scheduler::{PairScheduler, ScheduleReport};
pub use telemetry::init_tracing;
