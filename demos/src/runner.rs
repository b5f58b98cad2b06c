//! Data-parallel evaluation loop.
//!
//! Batches are dealt round-robin to `world_size` worker threads. Each worker
//! owns its accumulator, folds its shard in, and joins the epoch-end
//! all-reduce so every rank ends up with the same global report.

use std::{
    fs,
    path::Path,
    sync::atomic::{AtomicBool, Ordering},
    thread,
};

use anyhow::{bail, ensure, Context, Result};
use segmetric::{
    collective::{Collective, GroupMember, LocalGroup},
    sink::MetricSink,
    IouReport, MetricError, Phase,
};

use crate::config::EvalConfig;

/// Flattened class-id maps, one entry per batch.
pub type LabelBatches = Vec<Vec<i64>>;

/// Reads a JSON list of batches, e.g. `[[0, 1, 1], [2, 255]]`.
pub fn load_batches(path: impl AsRef<Path>) -> Result<LabelBatches> {
    let path = path.as_ref();
    let text =
        fs::read_to_string(path).with_context(|| format!("failed to read {}", path.display()))?;
    serde_json::from_str(&text).with_context(|| format!("failed to parse {}", path.display()))
}

/// Runs every epoch of one phase and returns the report of the last epoch.
///
/// Each epoch's report is handed to `sink` once, from rank 0.
///
/// # Errors
///
/// Returns the first error raised by any worker. A worker whose batch is
/// rejected still joins the epoch-end reduction so its peers are not left
/// waiting; after that reduction every worker stops. A worker that panics
/// leaves its group, which ends the run with an error naming its rank.
pub fn run_phase(
    config: &EvalConfig,
    phase: Phase,
    predictions: &[Vec<i64>],
    targets: &[Vec<i64>],
    sink: &mut dyn MetricSink,
) -> Result<IouReport> {
    config.validate()?;
    ensure!(
        predictions.len() == targets.len(),
        "{} prediction batches but {} target batches",
        predictions.len(),
        targets.len()
    );

    let members = LocalGroup::new(config.world_size)?;
    tracing::info!(
        %phase,
        world_size = config.world_size,
        batches = predictions.len(),
        epochs = config.epochs,
        "starting evaluation"
    );

    let aborted = AtomicBool::new(false);
    let outcomes: Vec<thread::Result<Result<Vec<IouReport>, MetricError>>> =
        thread::scope(|scope| {
            let aborted = &aborted;
            let handles: Vec<_> = members
                .into_iter()
                .map(|member| {
                    scope.spawn(move || run_worker(config, member, predictions, targets, aborted))
                })
                .collect();
            handles.into_iter().map(|handle| handle.join()).collect()
        });

    // A panicking worker drops its group member, which fails the peers' next
    // reduction, so the panic is reported ahead of their errors.
    if let Some(rank) = outcomes.iter().position(Result::is_err) {
        bail!("worker {rank} panicked");
    }
    let mut per_rank = Vec::with_capacity(outcomes.len());
    for (rank, outcome) in outcomes.into_iter().flatten().enumerate() {
        per_rank.push(outcome.with_context(|| format!("worker {rank} failed"))?);
    }

    let reports = per_rank.swap_remove(0);
    for (epoch, report) in reports.iter().enumerate() {
        sink.record(phase, epoch, report);
    }
    reports
        .into_iter()
        .last()
        .context("evaluation produced no report")
}

fn run_worker(
    config: &EvalConfig,
    mut member: GroupMember,
    predictions: &[Vec<i64>],
    targets: &[Vec<i64>],
    aborted: &AtomicBool,
) -> Result<Vec<IouReport>, MetricError> {
    let rank = member.rank();
    let world_size = member.world_size();
    let _span = tracing::debug_span!("worker", rank).entered();

    let mut acc = config.metric.init()?;
    let mut reports = Vec::with_capacity(config.epochs);

    for epoch in 0..config.epochs {
        let shard = predictions
            .iter()
            .zip(targets)
            .skip(rank)
            .step_by(world_size);

        let mut failure = None;
        for (batch, (batch_predictions, batch_targets)) in shard.enumerate() {
            if let Err(err) = acc.update(batch_predictions, batch_targets) {
                tracing::error!(epoch, batch, error = %err, "batch rejected");
                failure = Some(err);
                break;
            }
        }
        if failure.is_some() {
            aborted.store(true, Ordering::SeqCst);
        }

        // The flag is raised before the reduction, so every rank sees it once
        // the round completes.
        let report = acc.finish(&mut member)?;
        if let Some(err) = failure {
            return Err(err);
        }
        if aborted.load(Ordering::SeqCst) {
            tracing::warn!(epoch, "stopping after a peer rejected a batch");
            break;
        }
        tracing::debug!(epoch, miou = report.mean_or_nan(), "epoch reduced");
        reports.push(report);
    }

    Ok(reports)
}
