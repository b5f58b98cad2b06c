//! Streaming segmentation metrics.
//!
//! The IoU metric is built from a confusion matrix that is updated per batch,
//! reduced across workers and turned into an [`IouReport`] at the end of a
//! phase.

pub mod accumulator;
pub mod confusion;
pub mod input;
pub mod iou;
#[cfg(feature = "train")]
pub mod miou;

pub use accumulator::{IouAccumulator, Phase, PhaseAccumulators, Status};
pub use confusion::{update, ConfusionMatrix};
pub use input::SegmentationInput;
pub use iou::{compute, ClassCounts, IouReport};
#[cfg(feature = "train")]
pub use miou::MeanIouMetric;
