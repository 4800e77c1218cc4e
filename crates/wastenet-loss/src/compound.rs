//! Focal + Dice compound objective and objective selection.

use std::fmt;

use burn::{
    config::Config,
    module::{Content, DisplaySettings, Module, ModuleDisplay},
    nn::loss::Reduction,
    tensor::{backend::Backend, Tensor},
};

use crate::{
    dice::{DiceLoss, DiceLossConfig},
    focal::{FocalLoss, FocalLossConfig},
};

/// Configuration for the [compound loss](CompoundLoss).
#[derive(Config, Debug)]
pub struct CompoundLossConfig {
    #[config(default = "FocalLossConfig::new()")]
    pub focal: FocalLossConfig,

    #[config(default = "DiceLossConfig::new()")]
    pub dice: DiceLossConfig,
}

impl CompoundLossConfig {
    pub fn init(&self) -> CompoundLoss {
        CompoundLoss {
            focal: self.focal.init(),
            dice: self.dice.init(),
        }
    }
}

/// Sum of the focal loss and the weighted Dice loss.
///
/// The focal term sees clipped probabilities, the Dice term the raw
/// predictions, so a perfect prediction yields a Dice term of exactly zero.
#[derive(Module, Clone, Debug)]
#[module(custom_display)]
pub struct CompoundLoss {
    pub focal: FocalLoss,
    pub dice: DiceLoss,
}

impl Default for CompoundLoss {
    fn default() -> Self {
        Self::new()
    }
}

impl ModuleDisplay for CompoundLoss {
    fn custom_settings(&self) -> Option<DisplaySettings> {
        DisplaySettings::new()
            .with_new_line_after_attribute(false)
            .optional()
    }

    fn custom_content(&self, content: Content) -> Option<Content> {
        content
            .add("focal", &self.focal)
            .add("dice", &self.dice)
            .optional()
    }
}

impl CompoundLoss {
    pub fn new() -> Self {
        CompoundLossConfig::new().init()
    }

    /// # Shapes
    ///
    /// - predictions: `[batch_size, classes, height, width]`
    /// - targets: `[batch_size, classes, height, width]`
    /// - output: `[1]`
    pub fn forward<B: Backend>(&self, predictions: Tensor<B, 4>, targets: Tensor<B, 4>) -> Tensor<B, 1> {
        let focal = self
            .focal
            .forward(predictions.clone(), targets.clone(), Reduction::Mean);
        // Dice sees the unclipped probabilities: a class absent from both
        // prediction and target scores 1 here, where Dice on clipped
        // probabilities would score close to 0.
        let dice = self.dice.forward(predictions, targets);
        focal + dice
    }
}

/// The training objective selected by a run configuration.
#[derive(Clone, Debug)]
pub enum Objective {
    Compound(CompoundLoss),
    Dice(DiceLoss),
}

impl Objective {
    pub fn forward<B: Backend>(&self, predictions: Tensor<B, 4>, targets: Tensor<B, 4>) -> Tensor<B, 1> {
        match self {
            Self::Compound(loss) => loss.forward(predictions, targets),
            Self::Dice(loss) => loss.forward(predictions, targets),
        }
    }
}

impl fmt::Display for Objective {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Compound(loss) => fmt::Display::fmt(loss, f),
            Self::Dice(loss) => fmt::Display::fmt(loss, f),
        }
    }
}
