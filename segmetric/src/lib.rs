//! Streaming IoU metrics for semantic segmentation with Burn.
//!
//! Per-pixel outcomes are folded into a confusion matrix batch by batch,
//! summed across data-parallel workers and turned into per-class and mean
//! IoU at the end of each phase. Memory stays at `num_classes²` counters per
//! accumulator, whatever the size of the dataset.
//!
//! ```rust
//! use segmetric::{collective::SingleProcess, IouMetricConfig};
//!
//! let mut acc = IouMetricConfig::new(3).with_ignore_index(Some(255)).init()?;
//! acc.update(&[0, 1, 2, 2], &[0, 1, 1, 255])?;
//! let report = acc.finish(&mut SingleProcess)?;
//! assert_eq!(report.per_class[0], Some(1.0));
//! # Ok::<(), segmetric::MetricError>(())
//! ```

pub mod collective;
mod config;
mod error;
pub mod metrics;
pub mod sink;
#[cfg(feature = "train")]
pub mod training;


pub use config::{IouMetricConfig, LAPA_IGNORE_INDEX, LAPA_NUM_CLASSES};
pub use error::{LabelRole, MetricError, MetricResult};
pub use metrics::{
    ConfusionMatrix, IouAccumulator, IouReport, Phase, PhaseAccumulators, SegmentationInput,
};
#[cfg(feature = "train")]
pub use metrics::MeanIouMetric;
