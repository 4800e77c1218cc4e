//! `wastenet`: data and objective pipeline for recyclable-material segmentation.
//!
//! This crate ties the data, loss and metric crates together behind a YAML run
//! configuration and provides the preprocessing, splitting and evaluation
//! operations driven by the `wastenet` binary.

pub mod backend;
pub mod config;
pub mod evaluation;
pub mod pipeline;
pub mod preprocess;

pub use config::{LossKind, OptimizerKind, RunConfig};
pub use evaluation::{evaluate, objective, EvaluationSummary};
pub use pipeline::{scan_mask_directory, split_dataset, PredictionLoader};
pub use preprocess::{preprocess_coco, preprocess_taco, PreprocessSummary};

// Re-export the workspace crates
#[doc(inline)]
pub use wastenet_data as data;
#[doc(inline)]
pub use wastenet_loss as loss;
#[doc(inline)]
pub use wastenet_metric as metric;
