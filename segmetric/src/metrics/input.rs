//! Input structures for the segmentation metrics.

use burn::{prelude::*, tensor::backend::Backend};
use derive_new::new;

/// Class-id maps for one batch.
#[derive(new, Debug, Clone)]
pub struct SegmentationInput<B: Backend> {
    /// Predicted class ids with shape `[batch_size, height, width]`.
    pub predictions: Tensor<B, 3, Int>,
    /// Ground truth class ids with shape `[batch_size, height, width]`.
    pub targets: Tensor<B, 3, Int>,
}

impl<B: Backend> SegmentationInput<B> {
    /// Builds the input from raw logits of shape `[batch_size, num_classes, height, width]`,
    /// predicting the highest scoring class of every pixel.
    pub fn from_logits(logits: Tensor<B, 4>, targets: Tensor<B, 3, Int>) -> Self {
        let predictions = logits.argmax(1).squeeze::<3>(1);
        Self::new(predictions, targets)
    }
}
