//! Input structures for segmentation metrics.

use burn::{prelude::*, tensor::backend::Backend};
use derive_new::new;

/// Class probabilities and one-hot targets of a batch.
#[derive(new, Debug, Clone)]
pub struct SegmentationInput<B: Backend> {
    /// Predictions with shape `[batch_size, classes, height, width]`.
    pub predictions: Tensor<B, 4>,
    /// One-hot ground truth with shape `[batch_size, classes, height, width]`.
    pub targets: Tensor<B, 4>,
}

impl<B: Backend> SegmentationInput<B> {
    pub fn batch_size(&self) -> usize {
        self.predictions.dims()[0]
    }

    pub fn num_classes(&self) -> usize {
        self.predictions.dims()[1]
    }

    pub(crate) fn assertions(&self) {
        let pred_dims = self.predictions.dims();
        let target_dims = self.targets.dims();
        assert_eq!(
            pred_dims, target_dims,
            "Shape of predictions ({pred_dims:?}) must match targets ({target_dims:?})"
        );
    }
}
