//! Destinations for computed IoU reports.
//!
//! The engine only defines the shape of a report. Where it ends up (console,
//! experiment tracker, file) is decided by the [`MetricSink`] the loop is
//! given.

use crate::metrics::{IouReport, Phase};

/// Receives one report per phase per epoch.
pub trait MetricSink {
    fn record(&mut self, phase: Phase, epoch: usize, report: &IouReport);
}

/// Emits reports as structured `tracing` events.
///
/// Undefined values are rendered as `NaN`.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingSink;

impl MetricSink for TracingSink {
    fn record(&mut self, phase: Phase, epoch: usize, report: &IouReport) {
        tracing::info!(
            key = %phase.miou_key(),
            epoch,
            miou = report.mean_or_nan(),
            accuracy = report.accuracy.unwrap_or(f64::NAN),
            defined_classes = report.defined_classes(),
            pixels = report.total_pixels,
            "phase metrics"
        );
        for (class, iou) in report.per_class_or_nan().into_iter().enumerate() {
            tracing::debug!(%phase, epoch, class, iou, "class IoU");
        }
    }
}

/// Keeps every report in memory.
#[derive(Debug, Default, Clone)]
pub struct MemorySink {
    pub records: Vec<(Phase, usize, IouReport)>,
}

impl MemorySink {
    pub fn new() -> Self {
        Self::default()
    }

    /// Most recent report recorded for `phase`.
    pub fn latest(&self, phase: Phase) -> Option<&IouReport> {
        self.records
            .iter()
            .rev()
            .find(|(recorded, _, _)| *recorded == phase)
            .map(|(_, _, report)| report)
    }
}

impl MetricSink for MemorySink {
    fn record(&mut self, phase: Phase, epoch: usize, report: &IouReport) {
        self.records.push((phase, epoch, report.clone()));
    }
}
