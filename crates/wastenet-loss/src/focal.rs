//! Class-weighted focal loss.
//!
//! Predictions are class probabilities. They are clipped to `[ε, 1 - ε]` and
//! every pixel contributes
//! ```text
//! FL = Σ_c -w_c · (1 - p_c)^γ · y_c · log(p_c)
//! ```
//! Confident correct predictions are down-weighted by the `(1 - p)^γ` factor.

use burn::{
    config::Config,
    module::{Content, DisplaySettings, Module, ModuleDisplay},
    nn::loss::Reduction,
    tensor::{backend::Backend, Tensor, TensorData},
};

use crate::weights::RECYCLING_CLASS_WEIGHTS;

/// Configuration for creating a [focal loss](FocalLoss).
#[derive(Config, Debug)]
pub struct FocalLossConfig {
    /// Focusing parameter. Default: 2.0
    #[config(default = 2.0)]
    pub gamma: f64,

    /// Clipping bound for probabilities. Default: 1e-7
    #[config(default = 1e-7)]
    pub eps: f64,

    /// Per-class weights (alpha), used as given.
    #[config(default = "RECYCLING_CLASS_WEIGHTS.to_vec()")]
    pub class_weights: Vec<f32>,
}

impl FocalLossConfig {
    /// Initialize [focal loss](FocalLoss).
    pub fn init(&self) -> FocalLoss {
        self.assertions();
        FocalLoss {
            gamma: self.gamma,
            eps: self.eps,
            weights: self.class_weights.clone(),
        }
    }

    fn assertions(&self) {
        assert!(
            self.gamma >= 0.0,
            "Gamma for FocalLoss must be non-negative, got {}",
            self.gamma
        );
        assert!(
            self.eps > 0.0 && self.eps < 0.5,
            "Epsilon for FocalLoss must be in (0, 0.5), got {}",
            self.eps
        );
        assert!(
            !self.class_weights.is_empty(),
            "FocalLoss needs at least one class weight"
        );
    }
}

/// Focal loss over one-hot targets.
#[derive(Module, Clone, Debug)]
#[module(custom_display)]
pub struct FocalLoss {
    pub gamma: f64,
    pub eps: f64,
    pub weights: Vec<f32>,
}

impl Default for FocalLoss {
    fn default() -> Self {
        Self::new()
    }
}

impl ModuleDisplay for FocalLoss {
    fn custom_settings(&self) -> Option<DisplaySettings> {
        DisplaySettings::new()
            .with_new_line_after_attribute(false)
            .optional()
    }

    fn custom_content(&self, content: Content) -> Option<Content> {
        content
            .add("gamma", &self.gamma)
            .add("eps", &self.eps)
            .add("classes", &self.weights.len())
            .optional()
    }
}

impl FocalLoss {
    /// Create a new focal loss with default configuration.
    pub fn new() -> Self {
        FocalLossConfig::new().init()
    }

    /// Compute the criterion with reduction over pixels.
    ///
    /// # Shapes
    ///
    /// - predictions: `[batch_size, classes, height, width]`
    /// - targets: `[batch_size, classes, height, width]`
    /// - output: `[1]`
    pub fn forward<B: Backend>(
        &self,
        predictions: Tensor<B, 4>,
        targets: Tensor<B, 4>,
        reduction: Reduction,
    ) -> Tensor<B, 1> {
        let loss = self.forward_no_reduction(predictions, targets);
        match reduction {
            Reduction::Mean | Reduction::Auto => loss.mean(),
            Reduction::Sum => loss.sum(),
        }
    }

    /// Compute the criterion per pixel, summed over classes.
    ///
    /// # Shapes
    ///
    /// - predictions: `[batch_size, classes, height, width]`
    /// - targets: `[batch_size, classes, height, width]`
    /// - output: `[batch_size, height, width]`
    pub fn forward_no_reduction<B: Backend>(
        &self,
        predictions: Tensor<B, 4>,
        targets: Tensor<B, 4>,
    ) -> Tensor<B, 3> {
        self.assertions(&predictions, &targets);
        let device = predictions.device();
        let classes = self.weights.len();

        let probs = predictions.clamp(self.eps, 1.0 - self.eps);
        let cross_entropy = targets * probs.clone().log().neg();
        let focal_weight = probs.neg().add_scalar(1.0).powf_scalar(self.gamma);

        let alpha = Tensor::<B, 1>::from_data(TensorData::new(self.weights.clone(), [classes]), &device)
            .reshape([1, classes, 1, 1]);

        (alpha * focal_weight * cross_entropy).sum_dim(1).squeeze::<3>(1)
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
            "Predictions have {} classes but FocalLoss has {} class weights",
            pred_dims[1],
            self.weights.len()
        );
    }
}
