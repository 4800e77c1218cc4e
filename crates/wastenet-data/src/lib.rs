pub mod augmentation;
pub mod coco;
pub mod dataset;
pub mod error;
pub mod palette;
pub mod rasterize;
pub mod scan;
pub mod split;

// Re-export commonly used types
pub use augmentation::{AugmentationConfig, AugmentationPipeline, FlipMode};
pub use coco::{CategoryMap, CocoDataset};
pub use dataset::{SegmentationBatch, SegmentationBatcher, SegmentationDataset, SegmentationItem};
pub use error::{DataError, DataResult};
pub use palette::{
    class_mask_to_one_hot, classes_to_mask, mask_to_classes, present_classes, Bgr, Palette,
    RecyclingClass,
};
pub use rasterize::{Geometry, Rasterizer, ShapeAnnotation};
pub use scan::scan_colors;
pub use split::{
    collect_samples, oversample, oversample_dataset, partition, DatasetSplit, OversamplingRule,
    Sample,
};
