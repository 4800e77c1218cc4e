//! Multi-class Dice loss.
//!
//! Predictions and targets are flattened to `pixels × classes` over the whole
//! batch. For every class:
//! ```text
//! dice_c = (2 Σ y·p + ε) / (Σ (y + p) + ε)
//! Loss   = 1 - Σ_c w_c · dice_c
//! ```
//! where `w` is the class weight vector normalised to sum to one.

use burn::{
    config::Config,
    module::{Content, DisplaySettings, Module, ModuleDisplay},
    tensor::{backend::Backend, Tensor, TensorData},
};

use crate::weights::{normalized, RECYCLING_CLASS_WEIGHTS};

/// Configuration for creating a [Dice loss](DiceLoss).
#[derive(Config, Debug)]
pub struct DiceLossConfig {
    /// Smoothing term added to numerator and denominator. Default: 1e-15
    #[config(default = 1e-15)]
    pub smooth: f64,

    /// Un-normalised class weights, one per class.
    #[config(default = "RECYCLING_CLASS_WEIGHTS.to_vec()")]
    pub class_weights: Vec<f32>,
}

impl DiceLossConfig {
    /// Initialize [Dice loss](DiceLoss).
    pub fn init(&self) -> DiceLoss {
        self.assertions();
        DiceLoss {
            smooth: self.smooth,
            weights: normalized(&self.class_weights),
        }
    }

    fn assertions(&self) {
        assert!(
            self.smooth > 0.0,
            "Smoothing for DiceLoss must be positive, got {}",
            self.smooth
        );
        assert!(
            !self.class_weights.is_empty(),
            "DiceLoss needs at least one class weight"
        );
    }
}

/// Class-weighted multi-class Dice loss.
#[derive(Module, Clone, Debug)]
#[module(custom_display)]
pub struct DiceLoss {
    pub smooth: f64,
    /// Normalised class weights.
    pub weights: Vec<f32>,
}

impl Default for DiceLoss {
    fn default() -> Self {
        Self::new()
    }
}

impl ModuleDisplay for DiceLoss {
    fn custom_settings(&self) -> Option<DisplaySettings> {
        DisplaySettings::new()
            .with_new_line_after_attribute(false)
            .optional()
    }

    fn custom_content(&self, content: Content) -> Option<Content> {
        content
            .add("smooth", &self.smooth)
            .add("classes", &self.weights.len())
            .optional()
    }
}

impl DiceLoss {
    /// Create a new Dice loss with default configuration.
    pub fn new() -> Self {
        DiceLossConfig::new().init()
    }

    /// Compute the weighted Dice loss over the batch.
    ///
    /// # Shapes
    ///
    /// - predictions: `[batch_size, classes, height, width]`
    /// - targets: `[batch_size, classes, height, width]`
    /// - output: `[1]`
    pub fn forward<B: Backend>(&self, predictions: Tensor<B, 4>, targets: Tensor<B, 4>) -> Tensor<B, 1> {
        self.assertions(&predictions, &targets);
        let device = predictions.device();
        let classes = self.weights.len();

        let dice = dice_per_class(predictions, targets, self.smooth);
        let weights = Tensor::<B, 1>::from_data(TensorData::new(self.weights.clone(), [classes]), &device);

        (dice * weights).sum().neg().add_scalar(1.0)
    }

    /// Unweighted Dice coefficient of every class, shape `[classes]`.
    pub fn forward_per_class<B: Backend>(
        &self,
        predictions: Tensor<B, 4>,
        targets: Tensor<B, 4>,
    ) -> Tensor<B, 1> {
        self.assertions(&predictions, &targets);
        dice_per_class(predictions, targets, self.smooth)
    }

    fn assertions<B: Backend>(&self, predictions: &Tensor<B, 4>, targets: &Tensor<B, 4>) {
        let pred_dims = predictions.dims();
        let target_dims = targets.dims();
        assert_eq!(
            pred_dims, target_dims,
            "Shape of predictions ({pred_dims:?}) must match targets ({target_dims:?})"
        );
        assert_eq!(
            pred_dims[1],
            self.weights.len(),
            "Predictions have {} classes but DiceLoss has {} class weights",
            pred_dims[1],
            self.weights.len()
        );
    }
}

/// Smoothed Dice coefficient per class over batch and spatial dimensions.
///
/// # Shapes
///
/// - predictions: `[batch_size, classes, height, width]`
/// - targets: `[batch_size, classes, height, width]`
/// - output: `[classes]`
pub fn dice_per_class<B: Backend>(predictions: Tensor<B, 4>, targets: Tensor<B, 4>, smooth: f64) -> Tensor<B, 1> {
    let [_, classes, _, _] = predictions.dims();

    let intersection = (predictions.clone() * targets.clone())
        .sum_dim(0)
        .sum_dim(2)
        .sum_dim(3)
        .reshape([classes]);
    let denominator = (predictions + targets)
        .sum_dim(0)
        .sum_dim(2)
        .sum_dim(3)
        .reshape([classes]);

    intersection.mul_scalar(2.0).add_scalar(smooth) / denominator.add_scalar(smooth)
}
