//! Joint image/mask augmentation.
//!
//! The pipeline is built once from an [`AugmentationConfig`] and applied to
//! `(image, mask)` pairs with a caller-supplied random generator, so several
//! pipelines with different configurations can run side by side.
//!
//! Supported transforms:
//! 1. Flip (horizontal, vertical or both) - each axis with 50% probability
//! 2. Rotation - angle uniform in `[-degrees, +degrees]` (50% probability)
//! 3. Zoom - crop around a random foreground pixel (75% probability), then
//!    resize back to the output resolution
//!
//! Every transform samples its parameters once per call and applies them to
//! both image and mask. Masks are always resampled with nearest neighbour so
//! class indices are preserved.

use std::{fmt, str::FromStr};

use image::{
    imageops::{self, FilterType},
    GrayImage, Luma, Rgb, RgbImage,
};
use imageproc::geometric_transformations::{rotate_about_center, Interpolation};
use rand::Rng;
use serde::{Deserialize, Serialize};

use crate::error::{DataError, DataResult};

/// Flip axes selected in the configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum FlipMode {
    Horizontal,
    Vertical,
    HorizontalAndVertical,
}

impl FlipMode {
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Horizontal => "horizontal",
            Self::Vertical => "vertical",
            Self::HorizontalAndVertical => "horizontal and vertical",
        }
    }
}

impl FromStr for FlipMode {
    type Err = DataError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value {
            "horizontal" => Ok(Self::Horizontal),
            "vertical" => Ok(Self::Vertical),
            "horizontal and vertical" => Ok(Self::HorizontalAndVertical),
            other => Err(DataError::UnknownFlip {
                value: other.to_owned(),
            }),
        }
    }
}

impl TryFrom<String> for FlipMode {
    type Error = DataError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<FlipMode> for String {
    fn from(mode: FlipMode) -> Self {
        mode.as_str().to_owned()
    }
}

impl fmt::Display for FlipMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Augmentation options of a run configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AugmentationConfig {
    /// Random flip axes.
    #[serde(default)]
    pub flip: Option<FlipMode>,
    /// Maximum absolute rotation in degrees.
    #[serde(default)]
    pub rotation: Option<f32>,
    /// Crop around mask foreground and resize back.
    #[serde(default)]
    pub zoom: bool,
    /// Side length of the zoom crop window.
    #[serde(default = "default_crop_size")]
    pub crop_size: u32,
    /// Probability of applying the zoom crop.
    #[serde(default = "default_zoom_probability")]
    pub zoom_probability: f64,
    /// Resolution the zoomed pair is resized to.
    #[serde(default = "default_output_size")]
    pub output_size: u32,
}

const fn default_crop_size() -> u32 {
    160
}

const fn default_zoom_probability() -> f64 {
    0.75
}

const fn default_output_size() -> u32 {
    256
}

impl Default for AugmentationConfig {
    fn default() -> Self {
        Self {
            flip: None,
            rotation: None,
            zoom: false,
            crop_size: default_crop_size(),
            zoom_probability: default_zoom_probability(),
            output_size: default_output_size(),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
enum Transform {
    HorizontalFlip,
    VerticalFlip,
    Rotate { max_degrees: f32 },
    CropToMask { size: u32, probability: f64 },
    Resize { size: u32 },
}

/// Ordered sequence of joint transforms.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct AugmentationPipeline {
    steps: Vec<Transform>,
}

impl AugmentationPipeline {
    /// Build the pipeline described by `config`.
    pub fn new(config: &AugmentationConfig) -> Self {
        let mut steps = Vec::new();

        if let Some(flip) = config.flip {
            match flip {
                FlipMode::Horizontal => steps.push(Transform::HorizontalFlip),
                FlipMode::Vertical => steps.push(Transform::VerticalFlip),
                FlipMode::HorizontalAndVertical => {
                    steps.push(Transform::HorizontalFlip);
                    steps.push(Transform::VerticalFlip);
                }
            }
            tracing::info!(%flip, "added flip augmentation");
        }

        if let Some(degrees) = config.rotation {
            let max_degrees = degrees.abs();
            steps.push(Transform::Rotate { max_degrees });
            tracing::info!(max_degrees, "added rotation augmentation");
        }

        if config.zoom {
            steps.push(Transform::CropToMask {
                size: config.crop_size,
                probability: config.zoom_probability,
            });
            steps.push(Transform::Resize {
                size: config.output_size,
            });
            tracing::info!(crop = config.crop_size, "added zoom augmentation");
        }

        Self { steps }
    }

    /// A pipeline that returns its input unchanged.
    pub fn identity() -> Self {
        Self::default()
    }

    pub fn is_identity(&self) -> bool {
        self.steps.is_empty()
    }

    /// Apply every transform to the pair.
    ///
    /// # Errors
    ///
    /// Returns [`DataError::DimensionMismatch`] if image and mask sizes differ.
    pub fn apply<R: Rng + ?Sized>(
        &self,
        mut image: RgbImage,
        mut mask: GrayImage,
        rng: &mut R,
    ) -> DataResult<(RgbImage, GrayImage)> {
        if image.dimensions() != mask.dimensions() {
            return Err(DataError::DimensionMismatch {
                image_width: image.width(),
                image_height: image.height(),
                mask_width: mask.width(),
                mask_height: mask.height(),
            });
        }

        for step in &self.steps {
            (image, mask) = match *step {
                Transform::HorizontalFlip => {
                    if rng.random_bool(0.5) {
                        (imageops::flip_horizontal(&image), imageops::flip_horizontal(&mask))
                    } else {
                        (image, mask)
                    }
                }
                Transform::VerticalFlip => {
                    if rng.random_bool(0.5) {
                        (imageops::flip_vertical(&image), imageops::flip_vertical(&mask))
                    } else {
                        (image, mask)
                    }
                }
                Transform::Rotate { max_degrees } => {
                    if rng.random_bool(0.5) {
                        let degrees: f32 = rng.random_range(-max_degrees..=max_degrees);
                        rotate_pair(&image, &mask, degrees.to_radians())
                    } else {
                        (image, mask)
                    }
                }
                Transform::CropToMask { size, probability } => {
                    if rng.random_bool(probability.clamp(0.0, 1.0)) {
                        crop_to_mask(&image, &mask, size, rng)
                    } else {
                        (image, mask)
                    }
                }
                Transform::Resize { size } => resize_pair(image, mask, size, size),
            };
        }

        Ok((image, mask))
    }
}

fn rotate_pair(image: &RgbImage, mask: &GrayImage, radians: f32) -> (RgbImage, GrayImage) {
    let image = rotate_about_center(image, radians, Interpolation::Bilinear, Rgb([0, 0, 0]));
    let mask = rotate_about_center(mask, radians, Interpolation::Nearest, Luma([0]));
    (image, mask)
}

/// Crop a `size`×`size` window centred on a random foreground pixel, clamped
/// to the image. Falls back to a uniformly random window when the mask has no
/// foreground, and to the top-left window when the image is smaller than the
/// crop.
fn crop_to_mask<R: Rng + ?Sized>(
    image: &RgbImage,
    mask: &GrayImage,
    size: u32,
    rng: &mut R,
) -> (RgbImage, GrayImage) {
    let (width, height) = mask.dimensions();
    if size > width || size > height {
        let crop_w = size.min(width);
        let crop_h = size.min(height);
        return (
            imageops::crop_imm(image, 0, 0, crop_w, crop_h).to_image(),
            imageops::crop_imm(mask, 0, 0, crop_w, crop_h).to_image(),
        );
    }

    let foreground: Vec<(u32, u32)> = mask
        .enumerate_pixels()
        .filter(|(_, _, p)| p.0[0] > 0)
        .map(|(x, y, _)| (x, y))
        .collect();

    let (x_min, y_min) = if foreground.is_empty() {
        (
            rng.random_range(0..=width - size),
            rng.random_range(0..=height - size),
        )
    } else {
        let (x, y) = foreground[rng.random_range(0..foreground.len())];
        let half = i64::from(size / 2);
        let x_min = (i64::from(x) - half).clamp(0, i64::from(width - size)) as u32;
        let y_min = (i64::from(y) - half).clamp(0, i64::from(height - size)) as u32;
        (x_min, y_min)
    };

    (
        imageops::crop_imm(image, x_min, y_min, size, size).to_image(),
        imageops::crop_imm(mask, x_min, y_min, size, size).to_image(),
    )
}

/// Resize an image smoothly and its mask with nearest neighbour.
pub fn resize_pair(image: RgbImage, mask: GrayImage, width: u32, height: u32) -> (RgbImage, GrayImage) {
    if image.dimensions() == (width, height) && mask.dimensions() == (width, height) {
        return (image, mask);
    }
    (
        imageops::resize(&image, width, height, FilterType::Triangle),
        imageops::resize(&mask, width, height, FilterType::Nearest),
    )
}

#[cfg(test)]
mod tests {
    use rand::{rngs::StdRng, SeedableRng};

    use super::*;

    /// Image whose red channel and mask both encode the pixel column.
    fn coordinate_pair(width: u32, height: u32) -> (RgbImage, GrayImage) {
        let image = RgbImage::from_fn(width, height, |x, y| Rgb([x as u8, y as u8, 0]));
        let mask = GrayImage::from_fn(width, height, |x, y| Luma([(x + 2 * y) as u8 % 7]));
        (image, mask)
    }

    #[test]
    fn flip_mode_parses_configuration_values() {
        assert_eq!("horizontal".parse::<FlipMode>().unwrap(), FlipMode::Horizontal);
        assert_eq!("vertical".parse::<FlipMode>().unwrap(), FlipMode::Vertical);
        assert_eq!(
            "horizontal and vertical".parse::<FlipMode>().unwrap(),
            FlipMode::HorizontalAndVertical
        );
    }

    #[test]
    fn unknown_flip_is_rejected() {
        let err = "diagonal".parse::<FlipMode>().unwrap_err();
        assert!(matches!(err, DataError::UnknownFlip { value } if value == "diagonal"));

        let json = r#"{"flip": "sideways"}"#;
        assert!(serde_json::from_str::<AugmentationConfig>(json).is_err());
    }

    #[test]
    fn empty_config_builds_identity_pipeline() {
        let pipeline = AugmentationPipeline::new(&AugmentationConfig::default());
        assert!(pipeline.is_identity());

        let (image, mask) = coordinate_pair(8, 6);
        let mut rng = StdRng::seed_from_u64(0);
        let (out_image, out_mask) = pipeline.apply(image.clone(), mask.clone(), &mut rng).unwrap();

        assert_eq!(out_image, image);
        assert_eq!(out_mask, mask);
    }

    #[test]
    fn flips_are_applied_identically_to_image_and_mask() {
        let config = AugmentationConfig {
            flip: Some(FlipMode::HorizontalAndVertical),
            ..AugmentationConfig::default()
        };
        let pipeline = AugmentationPipeline::new(&config);
        let (image, mask) = coordinate_pair(9, 5);

        for seed in 0..16 {
            let mut rng = StdRng::seed_from_u64(seed);
            let (out_image, out_mask) = pipeline.apply(image.clone(), mask.clone(), &mut rng).unwrap();

            for (x, y, p) in out_image.enumerate_pixels() {
                let (src_x, src_y) = (u32::from(p.0[0]), u32::from(p.0[1]));
                assert_eq!(out_mask.get_pixel(x, y), mask.get_pixel(src_x, src_y));
            }
        }
    }

    #[test]
    fn rotation_preserves_mask_labels() {
        let config = AugmentationConfig {
            rotation: Some(30.0),
            ..AugmentationConfig::default()
        };
        let pipeline = AugmentationPipeline::new(&config);
        let (image, mask) = coordinate_pair(32, 32);
        let mut rng = StdRng::seed_from_u64(7);

        let (out_image, out_mask) = pipeline.apply(image, mask, &mut rng).unwrap();

        assert_eq!(out_image.dimensions(), (32, 32));
        assert!(out_mask.pixels().all(|p| p.0[0] < 7));
    }

    #[test]
    fn rotation_is_applied_to_about_half_the_pairs() {
        let config = AugmentationConfig {
            rotation: Some(45.0),
            ..AugmentationConfig::default()
        };
        let pipeline = AugmentationPipeline::new(&config);
        let (image, mask) = coordinate_pair(16, 16);

        let unchanged = (0..32)
            .filter(|&seed| {
                let mut rng = StdRng::seed_from_u64(seed);
                let (out_image, out_mask) = pipeline.apply(image.clone(), mask.clone(), &mut rng).unwrap();
                out_image == image && out_mask == mask
            })
            .count();

        assert!(unchanged > 0 && unchanged < 32, "{unchanged} of 32 pairs unchanged");
    }

    #[test]
    fn rotated_marker_stays_aligned() {
        let config = AugmentationConfig {
            rotation: Some(45.0),
            ..AugmentationConfig::default()
        };
        let pipeline = AugmentationPipeline::new(&config);
        let inside = |x: u32, y: u32| (13..19).contains(&x) && (13..19).contains(&y);
        let image = RgbImage::from_fn(32, 32, |x, y| if inside(x, y) { Rgb([255; 3]) } else { Rgb([0; 3]) });
        let mask = GrayImage::from_fn(32, 32, |x, y| Luma([if inside(x, y) { 3 } else { 0 }]));

        for seed in 0..16 {
            let mut rng = StdRng::seed_from_u64(seed);
            let (out_image, out_mask) = pipeline.apply(image.clone(), mask.clone(), &mut rng).unwrap();

            assert!(out_mask.pixels().any(|p| p.0[0] == 3));
            for (x, y, p) in out_mask.enumerate_pixels() {
                let brightness = out_image.get_pixel(x, y).0[0];
                // the nearest source pixel carries at least a quarter of the bilinear weight
                if p.0[0] == 3 {
                    assert!(brightness > 0, "seed {seed}: marker at ({x}, {y}) is dark");
                }
                if brightness > 200 {
                    assert_eq!(p.0[0], 3, "seed {seed}: bright pixel ({x}, {y}) outside the marker");
                }
            }
        }
    }

    #[test]
    fn cropped_marker_stays_aligned() {
        let config = AugmentationConfig {
            zoom: true,
            crop_size: 16,
            zoom_probability: 1.0,
            output_size: 16,
            ..AugmentationConfig::default()
        };
        let pipeline = AugmentationPipeline::new(&config);
        let image = RgbImage::from_fn(64, 64, |x, y| Rgb([x as u8, y as u8, 0]));
        let mut mask = GrayImage::new(64, 64);
        mask.put_pixel(40, 20, Luma([5]));

        for seed in 0..8 {
            let mut rng = StdRng::seed_from_u64(seed);
            let (out_image, out_mask) = pipeline.apply(image.clone(), mask.clone(), &mut rng).unwrap();

            let (x, y, _) = out_mask
                .enumerate_pixels()
                .find(|(_, _, p)| p.0[0] == 5)
                .unwrap();
            assert_eq!(out_image.get_pixel(x, y).0[..2], [40, 20]);
            assert_eq!(out_mask.pixels().filter(|p| p.0[0] == 5).count(), 1);
        }
    }

    #[test]
    fn zoom_keeps_foreground_and_restores_resolution() {
        let config = AugmentationConfig {
            zoom: true,
            crop_size: 16,
            zoom_probability: 1.0,
            output_size: 64,
            ..AugmentationConfig::default()
        };
        let pipeline = AugmentationPipeline::new(&config);
        let image = RgbImage::new(64, 64);
        let mut mask = GrayImage::new(64, 64);
        mask.put_pixel(62, 61, Luma([4]));

        for seed in 0..8 {
            let mut rng = StdRng::seed_from_u64(seed);
            let (out_image, out_mask) = pipeline.apply(image.clone(), mask.clone(), &mut rng).unwrap();

            assert_eq!(out_image.dimensions(), (64, 64));
            assert_eq!(out_mask.dimensions(), (64, 64));
            assert!(out_mask.pixels().any(|p| p.0[0] == 4));
        }
    }

    #[test]
    fn crop_window_is_clamped_to_image_bounds() {
        let image = RgbImage::new(40, 30);
        let mut mask = GrayImage::new(40, 30);
        mask.put_pixel(0, 29, Luma([1]));
        let mut rng = StdRng::seed_from_u64(3);

        let (cropped_image, cropped_mask) = crop_to_mask(&image, &mask, 10, &mut rng);

        assert_eq!(cropped_image.dimensions(), (10, 10));
        // window is pinned to the bottom-left corner
        assert_eq!(cropped_mask.get_pixel(0, 9).0[0], 1);
    }

    #[test]
    fn crop_larger_than_image_keeps_whole_image() {
        let (image, mask) = coordinate_pair(8, 8);
        let mut rng = StdRng::seed_from_u64(0);

        let (cropped_image, cropped_mask) = crop_to_mask(&image, &mask, 16, &mut rng);

        assert_eq!(cropped_image, image);
        assert_eq!(cropped_mask, mask);
    }

    #[test]
    fn mismatched_pair_is_rejected() {
        let pipeline = AugmentationPipeline::identity();
        let mut rng = StdRng::seed_from_u64(0);

        let result = pipeline.apply(RgbImage::new(4, 4), GrayImage::new(4, 5), &mut rng);

        assert!(matches!(result, Err(DataError::DimensionMismatch { .. })));
    }
}
