//! Configuration for the IoU metric.

use burn::prelude::*;

use crate::error::{MetricError, MetricResult};
use crate::metrics::IouAccumulator;

/// Number of classes of the LaPa face-parsing dataset.
pub const LAPA_NUM_CLASSES: usize = 11;

/// Label used by LaPa annotations for pixels without a class.
pub const LAPA_IGNORE_INDEX: i64 = 255;

/// Configuration of a streaming IoU accumulator.
///
/// Both values are fixed for the lifetime of the accumulators built from it.
#[derive(Config, Debug, PartialEq, Eq)]
pub struct IouMetricConfig {
    /// Number of classes predicted by the model.
    pub num_classes: usize,
    /// Target label whose pixels are excluded from accumulation.
    #[config(default = "None")]
    pub ignore_index: Option<i64>,
}

impl IouMetricConfig {
    /// Configuration matching the LaPa dataset.
    pub fn lapa() -> Self {
        Self::new(LAPA_NUM_CLASSES).with_ignore_index(Some(LAPA_IGNORE_INDEX))
    }

    /// Validates the configuration.
    ///
    /// # Errors
    ///
    /// Returns [`MetricError::InvalidConfiguration`] if `num_classes` is zero,
    /// or if `ignore_index` names a valid class and would hide it.
    pub fn validate(&self) -> MetricResult<()> {
        if self.num_classes == 0 {
            return Err(MetricError::InvalidConfiguration {
                reason: "num_classes must be positive, got 0".to_string(),
            });
        }

        if let Some(ignore_index) = self.ignore_index {
            if usize::try_from(ignore_index).is_ok_and(|class| class < self.num_classes) {
                return Err(MetricError::InvalidConfiguration {
                    reason: format!(
                        "ignore_index {ignore_index} collides with a class id in [0, {})",
                        self.num_classes
                    ),
                });
            }
        }

        Ok(())
    }

    /// Builds an empty accumulator.
    pub fn init(&self) -> MetricResult<IouAccumulator> {
        self.validate()?;
        IouAccumulator::new(self.num_classes, self.ignore_index)
    }
}
