//! Colour palette and the codec between colour masks and class-index masks.
//!
//! Palettes are written in BGR order to match the colour tables used when the
//! masks were produced. Images decoded by the `image` crate are RGB, so every
//! conversion goes through [`Bgr::from_rgb`] / [`Bgr::to_rgb`].

use std::collections::BTreeSet;

use image::{GrayImage, Luma, Rgb, RgbImage};

use crate::error::{DataError, DataResult};

/// A colour in blue-green-red channel order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Bgr(pub [u8; 3]);

impl Bgr {
    pub const fn new(b: u8, g: u8, r: u8) -> Self {
        Self([b, g, r])
    }

    pub const fn from_rgb(pixel: Rgb<u8>) -> Self {
        let [r, g, b] = pixel.0;
        Self([b, g, r])
    }

    pub const fn to_rgb(self) -> Rgb<u8> {
        let [b, g, r] = self.0;
        Rgb([r, g, b])
    }

    /// Squared Euclidean distance in colour space.
    pub fn distance_sq(self, other: Self) -> u32 {
        self.0
            .iter()
            .zip(other.0.iter())
            .map(|(&a, &b)| {
                let d = i32::from(a) - i32::from(b);
                (d * d) as u32
            })
            .sum()
    }
}

/// Recycling classes of the 6-class taxonomy, in palette order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RecyclingClass {
    Background,
    Plastic,
    Paper,
    Bio,
    Metal,
    Other,
}

impl RecyclingClass {
    pub const ALL: [Self; 6] = [
        Self::Background,
        Self::Plastic,
        Self::Paper,
        Self::Bio,
        Self::Metal,
        Self::Other,
    ];

    /// Class index in the class mask.
    pub const fn index(self) -> u8 {
        self as u8
    }

    pub const fn name(self) -> &'static str {
        match self {
            Self::Background => "background",
            Self::Plastic => "plastic",
            Self::Paper => "paper",
            Self::Bio => "bio",
            Self::Metal => "metal",
            Self::Other => "other",
        }
    }

    /// Mask colour of the class in the recycling palette.
    pub const fn color(self) -> Bgr {
        match self {
            Self::Background => Bgr::new(0, 0, 0),
            Self::Plastic => Bgr::new(255, 0, 0),
            Self::Paper => Bgr::new(0, 255, 0),
            Self::Bio => Bgr::new(42, 42, 165),
            Self::Metal => Bgr::new(128, 128, 128),
            Self::Other => Bgr::new(0, 0, 255),
        }
    }
}

/// Ordered class palette. Index 0 is background.
///
/// The order must be identical when masks are rasterized and when they are
/// decoded, otherwise classes are silently swapped.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Palette {
    colors: Vec<Bgr>,
}

impl Palette {
    /// Create a palette from BGR colours.
    ///
    /// # Panics
    ///
    /// Panics if `colors` is empty or holds more than 256 entries, since class
    /// indices are stored as `u8`.
    pub fn new(colors: Vec<Bgr>) -> Self {
        assert!(!colors.is_empty(), "Palette must contain at least one colour");
        assert!(
            colors.len() <= 256,
            "Palette holds {} colours, at most 256 fit in a u8 class mask",
            colors.len()
        );
        Self { colors }
    }

    /// The 6-class recycling palette (background, plastic, paper, bio, metal, other).
    pub fn recycling() -> Self {
        Self::new(RecyclingClass::ALL.iter().map(|c| c.color()).collect())
    }

    /// Palette of the COCO bounding-box masks: black background followed by
    /// six category colours.
    pub fn coco_bbox() -> Self {
        Self::new(vec![
            Bgr::new(0, 0, 0),
            Bgr::new(255, 0, 0),
            Bgr::new(0, 255, 0),
            Bgr::new(0, 0, 255),
            Bgr::new(255, 255, 0),
            Bgr::new(255, 0, 255),
            Bgr::new(0, 255, 255),
        ])
    }

    pub fn len(&self) -> usize {
        self.colors.len()
    }

    pub fn is_empty(&self) -> bool {
        self.colors.is_empty()
    }

    pub fn colors(&self) -> &[Bgr] {
        &self.colors
    }

    pub fn color(&self, class: u8) -> Option<Bgr> {
        self.colors.get(usize::from(class)).copied()
    }

    /// Exact palette lookup.
    pub fn index_of(&self, color: Bgr) -> Option<u8> {
        self.colors.iter().position(|&c| c == color).map(|i| i as u8)
    }

    /// Index of the nearest palette colour. Ties go to the lowest index.
    pub fn nearest(&self, color: Bgr) -> u8 {
        let mut best = 0;
        let mut best_distance = u32::MAX;
        for (i, &candidate) in self.colors.iter().enumerate() {
            let distance = color.distance_sq(candidate);
            // strict comparison keeps the first entry on ties
            if distance < best_distance {
                best = i;
                best_distance = distance;
            }
        }
        best as u8
    }
}

/// Decode a colour mask into a class-index mask by nearest palette colour.
pub fn mask_to_classes(color_mask: &RgbImage, palette: &Palette) -> GrayImage {
    let (width, height) = color_mask.dimensions();
    let mut classes = GrayImage::new(width, height);
    for (src, dst) in color_mask.pixels().zip(classes.pixels_mut()) {
        *dst = Luma([palette.nearest(Bgr::from_rgb(*src))]);
    }
    classes
}

/// Render a class-index mask with the palette colours.
///
/// # Errors
///
/// Returns [`DataError::ClassOutOfRange`] for the first pixel whose class has
/// no palette entry.
pub fn classes_to_mask(class_mask: &GrayImage, palette: &Palette) -> DataResult<RgbImage> {
    let (width, height) = class_mask.dimensions();
    let mut color_mask = RgbImage::new(width, height);
    for (x, y, pixel) in class_mask.enumerate_pixels() {
        let class = pixel.0[0];
        let color = palette.color(class).ok_or(DataError::ClassOutOfRange {
            class,
            x,
            y,
            num_classes: palette.len(),
        })?;
        color_mask.put_pixel(x, y, color.to_rgb());
    }
    Ok(color_mask)
}

/// Expand a class mask into a channels-first one-hot buffer `[C, H, W]`.
///
/// Pixels whose class is `>= num_classes` have no active channel.
pub fn class_mask_to_one_hot(class_mask: &GrayImage, num_classes: usize) -> Vec<f32> {
    indices_to_one_hot(class_mask.as_raw(), num_classes)
}

/// [`class_mask_to_one_hot`] over raw row-major class indices.
pub fn indices_to_one_hot(indices: &[u8], num_classes: usize) -> Vec<f32> {
    let plane = indices.len();
    let mut one_hot = vec![0.0f32; num_classes * plane];
    for (i, &class) in indices.iter().enumerate() {
        let class = usize::from(class);
        if class < num_classes {
            one_hot[class * plane + i] = 1.0;
        }
    }
    one_hot
}

/// Sorted set of class indices present in a class mask.
pub fn present_classes(class_mask: &GrayImage) -> BTreeSet<u8> {
    class_mask.pixels().map(|p| p.0[0]).collect()
}
