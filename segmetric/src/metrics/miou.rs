//! Mean IoU metric for Burn's learner.
//!
//! Wraps an [`IouAccumulator`] so it can be registered as a train, validation
//! or test metric. Tensors are copied to the host as `i64` labels once per
//! batch; only the confusion matrix is kept between batches.

use core::marker::PhantomData;

use burn::{
    prelude::*,
    tensor::backend::Backend,
    train::metric::{Metric, MetricEntry, MetricMetadata, Numeric},
};

use crate::config::IouMetricConfig;
use crate::error::{MetricError, MetricResult};
use crate::metrics::{accumulator::IouAccumulator, input::SegmentationInput, iou::IouReport};

/// Streaming mean IoU over every batch seen since the last clear.
#[derive(Debug, Clone)]
pub struct MeanIouMetric<B: Backend> {
    accumulator: IouAccumulator,
    _b: PhantomData<B>,
}

impl IouMetricConfig {
    /// Builds a Burn metric from this configuration.
    pub fn init_metric<B: Backend>(&self) -> MetricResult<MeanIouMetric<B>> {
        Ok(MeanIouMetric {
            accumulator: self.init()?,
            _b: PhantomData,
        })
    }
}

impl<B: Backend> MeanIouMetric<B> {
    pub fn new(num_classes: usize, ignore_index: Option<i64>) -> MetricResult<Self> {
        IouMetricConfig::new(num_classes)
            .with_ignore_index(ignore_index)
            .init_metric()
    }

    pub const fn accumulator(&self) -> &IouAccumulator {
        &self.accumulator
    }

    /// Mutable access, e.g. to synchronize the counts across workers.
    pub fn accumulator_mut(&mut self) -> &mut IouAccumulator {
        &mut self.accumulator
    }

    pub fn report(&self) -> IouReport {
        self.accumulator.compute()
    }

    /// Folds one batch into the metric, returning any validation error.
    ///
    /// # Errors
    ///
    /// - [`MetricError::ShapeMismatch`] if the two tensors differ in shape.
    /// - [`MetricError::TensorConversion`] if the data cannot be read as integers.
    /// - Any error of [`IouAccumulator::update`].
    pub fn try_update(&mut self, item: &SegmentationInput<B>) -> MetricResult<()> {
        let prediction_dims = item.predictions.dims();
        let target_dims = item.targets.dims();
        if prediction_dims != target_dims {
            return Err(MetricError::ShapeMismatch {
                expected: format!("{target_dims:?}"),
                actual: format!("{prediction_dims:?}"),
            });
        }

        let predictions = host_labels(item.predictions.clone())?;
        let targets = host_labels(item.targets.clone())?;
        self.accumulator.update(&predictions, &targets)
    }

    fn miou_value(&self) -> f64 {
        self.report().mean_or_nan()
    }
}

fn host_labels<B: Backend>(tensor: Tensor<B, 3, Int>) -> MetricResult<Vec<i64>> {
    tensor
        .into_data()
        .convert::<i64>()
        .into_vec::<i64>()
        .map_err(|err| MetricError::TensorConversion {
            reason: format!("{err:?}"),
        })
}

impl<B: Backend> Metric for MeanIouMetric<B> {
    type Input = SegmentationInput<B>;

    fn name(&self) -> String {
        "mIoU".to_string()
    }

    fn update(&mut self, item: &Self::Input, _metadata: &MetricMetadata) -> MetricEntry {
        if let Err(err) = self.try_update(item) {
            tracing::error!(error = %err, "segmentation batch rejected by mIoU metric");
        }
        let value = self.miou_value();
        MetricEntry::new(self.name(), format!("{value:.5}"), format!("{value:.5}"))
    }

    fn clear(&mut self) {
        self.accumulator.reset();
    }
}

impl<B: Backend> Numeric for MeanIouMetric<B> {
    fn value(&self) -> f64 {
        self.miou_value()
    }
}

#[cfg(test)]
mod tests {
    use burn::tensor::TensorData;

    use super::*;
    use crate::metrics::accumulator::Status;
    use crate::tests::TestBackend;

    fn labels(values: [[[i64; 3]; 2]; 1]) -> Tensor<TestBackend, 3, Int> {
        Tensor::from_data(TensorData::from(values), &Default::default())
    }

    #[test]
    fn test_try_update_folds_tensor_batch() {
        let mut metric = MeanIouMetric::<TestBackend>::new(3, Some(255)).unwrap();
        let input = SegmentationInput::new(
            labels([[[0, 1, 2], [2, 2, 0]]]),
            labels([[[0, 1, 2], [255, 2, 1]]]),
        );

        metric.try_update(&input).unwrap();

        let matrix = metric.accumulator().matrix();
        assert_eq!(matrix.total(), 5);
        assert_eq!(matrix.get(1, 0), 1);
        assert_eq!(matrix.get(2, 2), 2);
        let report = metric.report();
        assert_eq!(report.per_class[2], Some(1.0));
        assert_eq!(report.per_class[0], Some(0.5));
    }

    #[test]
    fn test_shape_mismatch_is_rejected() {
        let mut metric = MeanIouMetric::<TestBackend>::new(2, None).unwrap();
        let device = Default::default();
        let input = SegmentationInput::new(
            Tensor::<TestBackend, 3, Int>::zeros([1, 2, 2], &device),
            Tensor::<TestBackend, 3, Int>::zeros([1, 2, 3], &device),
        );

        let result = metric.try_update(&input);

        assert!(matches!(result, Err(MetricError::ShapeMismatch { .. })));
        assert_eq!(metric.accumulator().status(), Status::Empty);
    }

    #[test]
    fn test_out_of_range_tensor_batch_leaves_metric_unchanged() {
        let mut metric = MeanIouMetric::<TestBackend>::new(2, None).unwrap();

        let result = metric.try_update(&SegmentationInput::new(
            labels([[[0, 1, 1], [0, 0, 1]]]),
            labels([[[0, 1, 1], [0, 5, 1]]]),
        ));

        assert!(matches!(
            result,
            Err(MetricError::OutOfRangeLabel { label: 5, .. })
        ));
        assert!(metric.accumulator().matrix().is_empty());
        assert!(metric.value().is_nan());
    }

    #[test]
    fn test_from_logits_takes_argmax_over_classes() {
        let device = Default::default();
        // [batch = 1, classes = 2, height = 1, width = 3]
        let logits = Tensor::<TestBackend, 4>::from_data(
            TensorData::from([[[[0.9_f32, 0.1, 0.3]], [[0.2, 0.8, 0.7]]]]),
            &device,
        );
        let targets = Tensor::<TestBackend, 3, Int>::from_data(
            TensorData::from([[[0_i64, 1, 0]]]),
            &device,
        );

        let input = SegmentationInput::from_logits(logits, targets);

        assert_eq!(input.predictions.dims(), [1, 1, 3]);
        let predictions = host_labels(input.predictions).unwrap();
        assert_eq!(predictions, vec![0, 1, 1]);
    }

    #[test]
    fn test_clear_resets_accumulator() {
        let mut metric = MeanIouMetric::<TestBackend>::new(3, None).unwrap();
        metric
            .try_update(&SegmentationInput::new(
                labels([[[0, 1, 2], [0, 1, 2]]]),
                labels([[[0, 1, 2], [0, 1, 2]]]),
            ))
            .unwrap();
        assert_eq!(metric.value(), 1.0);

        metric.clear();

        assert_eq!(metric.accumulator().status(), Status::Empty);
        assert!(metric.value().is_nan());
    }

    #[test]
    fn test_invalid_config_rejected() {
        let result = IouMetricConfig::new(0).init_metric::<TestBackend>();

        assert!(matches!(
            result,
            Err(MetricError::InvalidConfiguration { .. })
        ));
    }
}
