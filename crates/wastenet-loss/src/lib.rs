//! Segmentation losses for multi-class waste masks.
//!
//! All losses take class probabilities and one-hot targets shaped
//! `[batch_size, classes, height, width]` and work with any Burn backend.
//!
//! - **[`DiceLoss`]**: class-weighted multi-class Dice loss
//! - **[`FocalLoss`]**: class-weighted focal loss
//! - **[`CompoundLoss`]**: focal + Dice, the default training objective
//!
//! ```rust
//! use wastenet_loss::{CompoundLossConfig, DiceLossConfig};
//!
//! let loss = CompoundLossConfig::new()
//!     .with_dice(DiceLossConfig::new().with_smooth(1e-6))
//!     .init();
//! assert_eq!(loss.dice.weights.len(), 6);
//! ```

mod compound;
mod dice;
mod focal;
mod weights;

pub use compound::{CompoundLoss, CompoundLossConfig, Objective};
pub use dice::{dice_per_class, DiceLoss, DiceLossConfig};
pub use focal::{FocalLoss, FocalLossConfig};
pub use weights::{normalized, RECYCLING_CLASS_WEIGHTS};
