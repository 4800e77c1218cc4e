//! Error types for the wastenet-data crate.
//!
//! Covers dataset discovery, annotation parsing and mask decoding. Configuration
//! problems (unknown categories, out-of-range class indices) are reported here as
//! well, since they surface while data is being produced or consumed.

use std::path::PathBuf;

use thiserror::Error;

/// Error type for data preparation and loading.
#[derive(Error, Debug)]
pub enum DataError {
    /// Error when reading a directory fails.
    #[error("Failed to read directory: {path}")]
    DirectoryReadFailed {
        /// The directory path that failed to read.
        path: PathBuf,
        /// The underlying IO error.
        #[source]
        source: std::io::Error,
    },

    /// Error when the image directory is not found.
    #[error("Image directory not found: {path}")]
    ImageDirectoryNotFound {
        /// The expected image directory path.
        path: PathBuf,
    },

    /// Error when the mask directory is not found.
    #[error("Mask directory not found: {path}")]
    MaskDirectoryNotFound {
        /// The expected mask directory path.
        path: PathBuf,
    },

    /// Error when no image/mask samples are found in the dataset.
    #[error("No samples found in: {path}")]
    NoSamples {
        /// The dataset directory that was scanned.
        path: PathBuf,
    },

    /// Error when the number of images and masks differ.
    #[error("Found {images} images but {masks} masks in: {path}")]
    CountMismatch {
        /// The dataset directory that was scanned.
        path: PathBuf,
        /// Number of image files.
        images: usize,
        /// Number of mask files.
        masks: usize,
    },

    /// Error when a sorted image and mask do not share a basename.
    #[error("Image {image} has no matching mask (found {mask})")]
    UnpairedSample {
        /// The image path.
        image: PathBuf,
        /// The mask path found at the same position.
        mask: PathBuf,
    },

    /// Error when opening or decoding an image file fails.
    #[error("Failed to open image: {path}")]
    ImageOpenFailed {
        /// The image file path that failed to open.
        path: PathBuf,
        /// The underlying image processing error.
        #[source]
        source: image::ImageError,
    },

    /// Error when writing an image file fails.
    #[error("Failed to save image: {path}")]
    ImageSaveFailed {
        /// The destination path.
        path: PathBuf,
        /// The underlying image processing error.
        #[source]
        source: image::ImageError,
    },

    /// Error when reading an annotation file fails.
    #[error("Failed to read annotations: {path}")]
    AnnotationReadFailed {
        /// The annotation file path.
        path: PathBuf,
        /// The underlying IO error.
        #[source]
        source: std::io::Error,
    },

    /// Error when an annotation file is not valid COCO JSON.
    #[error("Failed to parse annotations: {path}")]
    AnnotationParseFailed {
        /// The annotation file path.
        path: PathBuf,
        /// The underlying JSON error.
        #[source]
        source: serde_json::Error,
    },

    /// Error when an annotation references a category with no class mapping.
    #[error("Category id {category_id} has no class mapping")]
    UnmappedCategory {
        /// The unmapped category id.
        category_id: u64,
    },

    /// Error when a category name is missing from the recycling table.
    #[error("Category '{name}' (id {category_id}) is not in the recycling table")]
    UnknownCategoryName {
        /// The category id.
        category_id: u64,
        /// The category name.
        name: String,
    },

    /// Error when a class mask holds an index outside the palette.
    #[error("Class index {class} at ({x}, {y}) is outside the palette of {num_classes} colours")]
    ClassOutOfRange {
        /// The offending class index.
        class: u8,
        /// Pixel column.
        x: u32,
        /// Pixel row.
        y: u32,
        /// Number of palette entries.
        num_classes: usize,
    },

    /// Error when a flip augmentation value is not recognised.
    #[error("Unknown flip type '{value}', expected \"horizontal\", \"vertical\" or \"horizontal and vertical\"")]
    UnknownFlip {
        /// The rejected value.
        value: String,
    },

    /// Error when an image and its mask have different dimensions.
    #[error("Dimension mismatch: image is {image_width}x{image_height}, mask is {mask_width}x{mask_height}")]
    DimensionMismatch {
        /// Image width.
        image_width: u32,
        /// Image height.
        image_height: u32,
        /// Mask width.
        mask_width: u32,
        /// Mask height.
        mask_height: u32,
    },

    /// Error when an annotated image has a zero width or height.
    #[error("Source image is empty: {width}x{height}")]
    EmptySourceImage {
        /// Annotated width.
        width: u32,
        /// Annotated height.
        height: u32,
    },

    /// Error when a colour scan worker panicked while holding the shared colour set.
    #[error("Colour scan state was poisoned by a panicking worker")]
    ScanStatePoisoned,

    /// Error when the colour scanner thread pool cannot be created.
    #[error("Failed to build thread pool")]
    ThreadPool {
        /// The underlying rayon error.
        #[source]
        source: rayon::ThreadPoolBuildError,
    },
}

/// A specialized `Result` type for data operations.
pub type DataResult<T> = Result<T, DataError>;
