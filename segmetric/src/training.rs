//! Glue between a segmentation model's step output and the metrics.
//!
//! The step functions of a learner return a [`SegmentationOutput`]; Burn then
//! adapts it to the input of each registered metric.

use burn::{
    prelude::*,
    tensor::backend::Backend,
    train::metric::{Adaptor, ItemLazy, LossInput},
};

use crate::metrics::SegmentationInput;

/// Output of a training, validation or test step.
#[derive(Debug, Clone)]
pub struct SegmentationOutput<B: Backend> {
    /// Per-batch loss.
    pub loss: Tensor<B, 1>,
    /// Raw class scores with shape `[batch_size, num_classes, height, width]`.
    pub logits: Tensor<B, 4>,
    /// Ground truth class ids with shape `[batch_size, height, width]`.
    pub targets: Tensor<B, 3, Int>,
}

impl<B: Backend> SegmentationOutput<B> {
    pub const fn new(loss: Tensor<B, 1>, logits: Tensor<B, 4>, targets: Tensor<B, 3, Int>) -> Self {
        Self {
            loss,
            logits,
            targets,
        }
    }
}

impl<B: Backend> ItemLazy for SegmentationOutput<B> {
    type ItemSync = Self;

    fn sync(self) -> Self::ItemSync {
        self
    }
}

impl<B: Backend> Adaptor<SegmentationInput<B>> for SegmentationOutput<B> {
    fn adapt(&self) -> SegmentationInput<B> {
        SegmentationInput::from_logits(self.logits.clone(), self.targets.clone())
    }
}

impl<B: Backend> Adaptor<LossInput<B>> for SegmentationOutput<B> {
    fn adapt(&self) -> LossInput<B> {
        LossInput::new(self.loss.clone())
    }
}
