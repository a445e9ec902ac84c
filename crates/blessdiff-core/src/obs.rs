//! Structured observability hooks for run lifecycle events.
//!
//! This module provides:
//! - A run-scoped tracing span
//! - Emission functions for key lifecycle events: run start, per-pair
//!   completion, warnings, artifact capture, run finish
//!
//! Events are emitted at `info!` level unless noted; filter with `RUST_LOG`.

use tracing::{info, warn};

use crate::name::ImageName;

/// Span covering one run, tagged with its base directory.
///
/// Attach it with `tracing::Instrument` so it stays correct across awaits.
///
/// # Example
///
/// ```ignore
/// run(config).instrument(run_span("/work/vr")).await;
/// // every event inside carries base_dir = "/work/vr"
/// ```
pub fn run_span(base_dir: &str) -> tracing::Span {
    tracing::info_span!("blessdiff.run", base_dir = %base_dir)
}

/// Emit event: run started.
pub fn emit_run_started(pairs: usize, concurrency: usize, threshold: f64, primitive: &str) {
    info!(
        event = "run.started",
        pairs = pairs,
        concurrency = concurrency,
        threshold = threshold,
        primitive = %primitive,
    );
}

/// Emit event: one pair finished. Doubles as progress output.
pub fn emit_pair_compared(name: &ImageName, done: usize, total: usize, score: Option<f64>) {
    match score {
        Some(score) => info!(
            event = "pair.compared",
            name = %name,
            score = score,
            "[{done}/{total}] {name}"
        ),
        None => info!(event = "pair.compared", name = %name, "[{done}/{total}] {name}"),
    }
}

/// Emit event: a pair produced a warning instead of a score (warning level).
pub fn emit_pair_warning(name: &ImageName, detail: &str) {
    warn!(event = "pair.warning", name = %name, detail = %detail);
}

/// Emit event: failure artifacts written.
pub fn emit_artifact_persisted(name: &ImageName, score: f64) {
    info!(event = "artifact.persisted", name = %name, score = score);
}

/// Emit event: run finished with counts and duration.
pub fn emit_run_finished(duration_ms: u64, total: usize, fails: usize, warnings: usize) {
    info!(
        event = "run.finished",
        duration_ms = duration_ms,
        total = total,
        fails = fails,
        warnings = warnings,
        success = fails == 0,
    );
}
