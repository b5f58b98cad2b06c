//! Accumulator lifecycle for one evaluation phase.
//!
//! An [`IouAccumulator`] is owned by the loop that drives a phase. It is
//! updated once per mini-batch, synchronized across workers at the end of the
//! phase, turned into an [`IouReport`] and reset for the next epoch.

use core::fmt;

use crate::collective::Collective;
use crate::config::IouMetricConfig;
use crate::error::MetricResult;
use crate::metrics::{
    confusion::{self, ConfusionMatrix},
    iou::{self, IouReport},
};

/// Lifecycle state of an [`IouAccumulator`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Status {
    /// No batch folded in since construction or the last reset.
    Empty,
    /// At least one batch folded in.
    Accumulating,
}

/// Streaming IoU accumulator.
#[derive(Debug, Clone, PartialEq)]
pub struct IouAccumulator {
    matrix: ConfusionMatrix,
    ignore_index: Option<i64>,
    status: Status,
}

impl IouAccumulator {
    /// Creates an empty accumulator.
    ///
    /// # Errors
    ///
    /// Returns [`MetricError::InvalidConfiguration`](crate::MetricError::InvalidConfiguration)
    /// if `num_classes` is zero.
    pub fn new(num_classes: usize, ignore_index: Option<i64>) -> MetricResult<Self> {
        Ok(Self {
            matrix: ConfusionMatrix::new(num_classes)?,
            ignore_index,
            status: Status::Empty,
        })
    }

    pub const fn status(&self) -> Status {
        self.status
    }

    pub const fn ignore_index(&self) -> Option<i64> {
        self.ignore_index
    }

    pub const fn num_classes(&self) -> usize {
        self.matrix.num_classes()
    }

    pub const fn matrix(&self) -> &ConfusionMatrix {
        &self.matrix
    }

    /// Folds one batch of flattened class ids into the accumulator.
    ///
    /// On error the accumulator, including its status, is left unchanged.
    pub fn update(&mut self, predictions: &[i64], targets: &[i64]) -> MetricResult<()> {
        confusion::update(&mut self.matrix, predictions, targets, self.ignore_index)?;
        self.status = Status::Accumulating;
        Ok(())
    }

    /// Adds the counts of another accumulator of the same phase.
    pub fn merge(&mut self, other: &Self) -> MetricResult<()> {
        self.matrix.merge(&other.matrix)?;
        if other.status == Status::Accumulating {
            self.status = Status::Accumulating;
        }
        Ok(())
    }

    /// Replaces the local counts with the sum over every participant of `collective`.
    pub fn sync<C: Collective + ?Sized>(&mut self, collective: &mut C) -> MetricResult<()> {
        collective.all_reduce(&mut self.matrix)?;
        if !self.matrix.is_empty() {
            self.status = Status::Accumulating;
        }
        Ok(())
    }

    /// Derives the report for everything folded in so far. Never mutates.
    pub fn compute(&self) -> IouReport {
        iou::compute(&self.matrix)
    }

    pub fn reset(&mut self) {
        self.matrix.reset();
        self.status = Status::Empty;
    }

    /// Epoch-end sequence: reduce across workers, compute, then reset.
    ///
    /// The accumulator is only reset when the reduction succeeds.
    pub fn finish<C: Collective + ?Sized>(&mut self, collective: &mut C) -> MetricResult<IouReport> {
        self.sync(collective)?;
        let report = self.compute();
        self.reset();
        Ok(report)
    }
}

/// Evaluation phase, used to name the values handed to a sink.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Phase {
    Train,
    Valid,
    Test,
}

impl Phase {
    pub const ALL: [Self; 3] = [Self::Train, Self::Valid, Self::Test];

    /// Prefix of the scalar names logged for this phase.
    pub const fn prefix(self) -> &'static str {
        match self {
            Self::Train => "Train",
            Self::Valid => "Val",
            Self::Test => "Test",
        }
    }

    /// Name of the mean IoU scalar, e.g. `Val/mIoU`.
    pub fn miou_key(self) -> String {
        format!("{}/mIoU", self.prefix())
    }
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.prefix())
    }
}

/// Independent accumulators for the train, validation and test phases.
///
/// The three never share counts; each is driven by its own loop.
#[derive(Debug, Clone, PartialEq)]
pub struct PhaseAccumulators {
    pub train: IouAccumulator,
    pub valid: IouAccumulator,
    pub test: IouAccumulator,
}

impl PhaseAccumulators {
    /// Builds three empty accumulators from one configuration.
    pub fn new(config: &IouMetricConfig) -> MetricResult<Self> {
        Ok(Self {
            train: config.init()?,
            valid: config.init()?,
            test: config.init()?,
        })
    }
}
