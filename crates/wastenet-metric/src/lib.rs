//! # Waste segmentation metrics
//!
//! Evaluation metrics over class probabilities and one-hot targets shaped
//! `[batch, classes, height, width]`, plus the per-image evaluation report.
//!
//! - [`PixelAccuracyMetric`]: fraction of pixels with the correct argmax class
//! - [`PrecisionMetric`]: per-class precision averaged over foreground classes
//! - [`DiceCoefficientMetric`]: unweighted Dice averaged over foreground classes
//! - [`DicePerClassMetric`]: Dice of a single class
//! - [`EvaluationReport`]: F1/Jaccard/Recall/Precision per image and a
//!   confusion matrix over the whole test set
//!
//! The metrics implement Burn's [`Metric`](burn::train::metric::Metric) and
//! [`Numeric`](burn::train::metric::Numeric). [`SegmentationMetrics`] updates
//! all of them at once outside a learner:
//!
//! ```rust,ignore
//! let mut metrics = SegmentationMetrics::<B>::new(&class_names);
//! let metadata = evaluation_metadata(1, total);
//! metrics.update(&SegmentationInput::new(predictions, targets), &metadata);
//! for (name, mean) in metrics.means() {
//!     println!("{name}: {mean:.4}");
//! }
//! ```

pub mod accuracy;
pub mod dice;
pub mod input;
pub mod precision;
pub mod report;
pub mod suite;

pub use accuracy::{pixel_accuracy, PixelAccuracyMetric};
pub use dice::{dice_coef_multi, DiceCoefficientMetric, DicePerClassMetric, DICE_SMOOTH};
pub use input::SegmentationInput;
pub use precision::{foreground_precision, per_class_precision, PrecisionMetric};
pub use report::{
    render_overlay, score_image, ConfusionMatrix, EvaluationReport, ImageScores, ReportError,
    ReportResult,
};
pub use suite::{evaluation_metadata, SegmentationMetrics};
