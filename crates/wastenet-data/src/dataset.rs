//! Burn dataset and batcher for image/colour-mask pairs.
//!
//! The dataset decodes colour masks through the palette, resizes both images
//! to the training resolution and runs the augmentation pipeline. Items carry
//! raw data; the batcher builds tensors on the target device.

use std::{
    marker::PhantomData,
    sync::atomic::{AtomicU64, Ordering},
};

use burn::{
    data::{dataloader::batcher::Batcher, dataset::Dataset},
    tensor::{backend::Backend, Int, Tensor, TensorData},
};
use image::{GrayImage, RgbImage};
use rand::{rngs::StdRng, SeedableRng};

use crate::{
    augmentation::{resize_pair, AugmentationPipeline},
    error::{DataError, DataResult},
    palette::{indices_to_one_hot, mask_to_classes, Palette},
    split::Sample,
};

/// A single decoded and augmented sample.
#[derive(Debug, Clone)]
pub struct SegmentationItem {
    /// RGB pixels `[H, W, 3]` scaled to `[0, 1]`.
    pub image: Vec<f32>,
    /// Class index per pixel `[H, W]`.
    pub mask: Vec<u8>,
    pub height: usize,
    pub width: usize,
}

impl SegmentationItem {
    pub fn from_images(image: &RgbImage, mask: &GrayImage) -> Self {
        let (width, height) = image.dimensions();
        Self {
            image: image.pixels().flat_map(|p| p.0).map(|v| f32::from(v) / 255.0).collect(),
            mask: mask.as_raw().clone(),
            height: height as usize,
            width: width as usize,
        }
    }
}

/// Segmentation samples loaded from disk.
pub struct SegmentationDataset {
    samples: Vec<Sample>,
    palette: Palette,
    size: (u32, u32),
    pipeline: AugmentationPipeline,
    seed: u64,
    draws: AtomicU64,
}

impl SegmentationDataset {
    /// Dataset resized to `size` (width, height) with no augmentation.
    pub fn new(samples: Vec<Sample>, palette: Palette, size: (u32, u32)) -> Self {
        Self {
            samples,
            palette,
            size,
            pipeline: AugmentationPipeline::identity(),
            seed: 0,
            draws: AtomicU64::new(0),
        }
    }

    pub fn with_augmentation(mut self, pipeline: AugmentationPipeline, seed: u64) -> Self {
        self.pipeline = pipeline;
        self.seed = seed;
        self
    }

    pub fn samples(&self) -> &[Sample] {
        &self.samples
    }

    pub fn num_classes(&self) -> usize {
        self.palette.len()
    }

    /// Load, decode and resize one pair without augmentation.
    ///
    /// # Errors
    ///
    /// Returns an error if either file cannot be opened.
    pub fn load_pair(&self, sample: &Sample) -> DataResult<(RgbImage, GrayImage)> {
        let image = image::open(&sample.image)
            .map_err(|source| DataError::ImageOpenFailed {
                path: sample.image.clone(),
                source,
            })?
            .to_rgb8();
        let mask = image::open(&sample.mask)
            .map_err(|source| DataError::ImageOpenFailed {
                path: sample.mask.clone(),
                source,
            })?
            .to_rgb8();

        let classes = mask_to_classes(&mask, &self.palette);
        let (image, classes) = resize_pair(image, classes, self.size.0, self.size.1);
        Ok((image, classes))
    }

    fn load(&self, sample: &Sample) -> DataResult<SegmentationItem> {
        let (image, mask) = self.load_pair(sample)?;
        let (image, mask) = if self.pipeline.is_identity() {
            (image, mask)
        } else {
            let draw = self.draws.fetch_add(1, Ordering::Relaxed);
            let mut rng = StdRng::seed_from_u64(self.seed.wrapping_add(draw));
            let (image, mask) = self.pipeline.apply(image, mask, &mut rng)?;
            // zoom may change the resolution
            resize_pair(image, mask, self.size.0, self.size.1)
        };
        Ok(SegmentationItem::from_images(&image, &mask))
    }
}

impl Dataset<SegmentationItem> for SegmentationDataset {
    fn get(&self, index: usize) -> Option<SegmentationItem> {
        let sample = self.samples.get(index)?;
        match self.load(sample) {
            Ok(item) => Some(item),
            Err(e) => {
                tracing::warn!(image = %sample.image.display(), error = %e, "failed to load sample");
                None
            }
        }
    }

    fn len(&self) -> usize {
        self.samples.len()
    }
}

/// Batched images and targets.
#[derive(Debug, Clone)]
pub struct SegmentationBatch<B: Backend> {
    /// `[B, 3, H, W]`
    pub images: Tensor<B, 4>,
    /// One-hot targets `[B, C, H, W]`.
    pub targets: Tensor<B, 4>,
    /// Class indices `[B, H, W]`.
    pub classes: Tensor<B, 3, Int>,
}

impl<B: Backend> SegmentationBatch<B> {
    pub fn batch_size(&self) -> usize {
        self.images.dims()[0]
    }
}

#[derive(Clone, Debug)]
pub struct SegmentationBatcher<B: Backend> {
    num_classes: usize,
    _phantom: PhantomData<B>,
}

impl<B: Backend> SegmentationBatcher<B> {
    pub const fn new(num_classes: usize) -> Self {
        Self {
            num_classes,
            _phantom: PhantomData,
        }
    }
}

impl<B: Backend> Batcher<B, SegmentationItem, SegmentationBatch<B>> for SegmentationBatcher<B> {
    fn batch(&self, items: Vec<SegmentationItem>, device: &B::Device) -> SegmentationBatch<B> {
        let batch_size = items.len();
        let mut images = Vec::with_capacity(batch_size);
        let mut targets = Vec::with_capacity(batch_size);
        let mut classes = Vec::with_capacity(batch_size);

        for item in items {
            let (height, width) = (item.height, item.width);

            let image = Tensor::<B, 3>::from_data(TensorData::new(item.image, [height, width, 3]), device)
                .permute([2, 0, 1]);

            let one_hot = indices_to_one_hot(&item.mask, self.num_classes);
            let target = Tensor::<B, 3>::from_data(
                TensorData::new(one_hot, [self.num_classes, height, width]),
                device,
            );

            let indices: Vec<i64> = item.mask.iter().map(|&c| i64::from(c)).collect();
            let class = Tensor::<B, 2, Int>::from_data(TensorData::new(indices, [height, width]), device);

            images.push(image);
            targets.push(target);
            classes.push(class);
        }

        SegmentationBatch {
            images: Tensor::stack(images, 0),
            targets: Tensor::stack(targets, 0),
            classes: Tensor::stack(classes, 0),
        }
    }
}
