//! Conversion of annotated datasets into `images/` + `masks/` pairs.

use std::{
    fs,
    path::{Path, PathBuf},
};

use anyhow::{Context, Result};
use image::imageops::{self, FilterType};
use wastenet_data::{
    classes_to_mask, coco::CocoImage, CategoryMap, CocoDataset, DataError, Palette, Rasterizer,
    ShapeAnnotation,
};

/// Number of images written and skipped by a preprocessing run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PreprocessSummary {
    pub written: usize,
    pub skipped: usize,
}

/// Sub-folders of a COCO bounding-box export.
pub const COCO_SPLITS: [&str; 3] = ["train", "valid", "test"];

/// Annotation file name inside every COCO split folder.
pub const COCO_ANNOTATION_FILE: &str = "_annotations.coco.json";

struct OutputDirs {
    images: PathBuf,
    masks: PathBuf,
}

impl OutputDirs {
    fn create(root: &Path) -> Result<Self> {
        let dirs = Self {
            images: root.join("images"),
            masks: root.join("masks"),
        };
        for dir in [&dirs.images, &dirs.masks] {
            fs::create_dir_all(dir).with_context(|| format!("could not create {}", dir.display()))?;
        }
        Ok(dirs)
    }
}

fn open_rgb(path: &Path) -> Option<image::RgbImage> {
    if !path.exists() {
        tracing::warn!(path = %path.display(), "missing image");
        return None;
    }
    match image::open(path) {
        Ok(image) => Some(image.to_rgb8()),
        Err(e) => {
            tracing::warn!(path = %path.display(), error = %e, "unreadable image");
            None
        }
    }
}

fn save(image: &image::RgbImage, path: PathBuf) -> Result<()> {
    image
        .save(&path)
        .map_err(|source| DataError::ImageSaveFailed { path, source })?;
    Ok(())
}

/// Flattened output stem of a TACO file name, `batch_1/000006.jpg` becomes
/// `batch_1_000006`.
pub fn taco_output_stem(file_name: &str) -> String {
    let path = Path::new(file_name);
    path.with_extension("")
        .to_string_lossy()
        .replace(['/', '\\'], "_")
}

/// Rasterize TACO polygons into recycling-class colour masks.
///
/// Images are resized to `size`×`size` and written as PNG next to their masks.
/// Missing or unreadable images and images annotated with a zero size are
/// skipped.
///
/// # Errors
///
/// Fails if the annotations cannot be loaded, a category is not in the
/// recycling table, or an output file cannot be written.
pub fn preprocess_taco(
    annotations: &Path,
    image_root: &Path,
    output: &Path,
    size: u32,
) -> Result<PreprocessSummary> {
    let dataset = CocoDataset::load(annotations)?;
    let categories = CategoryMap::recycling(&dataset.categories)?;
    let palette = Palette::recycling();
    let by_image = dataset.annotations_by_image();
    let dirs = OutputDirs::create(output)?;

    tracing::info!(
        images = dataset.images.len(),
        annotations = dataset.annotations.len(),
        categories = dataset.categories.len(),
        "loaded TACO annotations"
    );

    let mut summary = PreprocessSummary::default();
    for info in &dataset.images {
        let Some(image) = open_rgb(&image_root.join(&info.file_name)) else {
            summary.skipped += 1;
            continue;
        };
        let rasterizer = match Rasterizer::new(&categories, (info.width, info.height), (size, size)) {
            Ok(rasterizer) => rasterizer,
            Err(e) => {
                tracing::warn!(image = %info.file_name, error = %e, "skipping image");
                summary.skipped += 1;
                continue;
            }
        };
        let image = imageops::resize(&image, size, size, FilterType::Triangle);

        let shapes: Vec<ShapeAnnotation> = by_image
            .get(&info.id)
            .into_iter()
            .flatten()
            .flat_map(|a| ShapeAnnotation::polygons(a))
            .collect();
        let mask = rasterizer.rasterize(&shapes)?;

        let stem = taco_output_stem(&info.file_name);
        save(&image, dirs.images.join(format!("{stem}.png")))?;
        save(&classes_to_mask(&mask, &palette)?, dirs.masks.join(format!("{stem}.png")))?;

        tracing::debug!(image = %info.file_name, shapes = shapes.len(), "rasterized");
        summary.written += 1;
    }

    tracing::info!(written = summary.written, skipped = summary.skipped, "TACO preprocessing done");
    Ok(summary)
}

fn coco_split(
    folder: &Path,
    palette: &Palette,
    dirs: &OutputDirs,
    summary: &mut PreprocessSummary,
) -> Result<()> {
    let annotations = folder.join(COCO_ANNOTATION_FILE);
    if !annotations.exists() {
        tracing::warn!(folder = %folder.display(), "no annotation file, skipping");
        return Ok(());
    }

    let dataset = CocoDataset::load(&annotations)?;
    let foreground = (palette.len() - 1) as u8;
    let categories = CategoryMap::modulo(&dataset.categories, foreground);
    let by_image = dataset.annotations_by_image();

    tracing::info!(
        folder = %folder.display(),
        images = dataset.images.len(),
        categories = dataset.categories.len(),
        "processing COCO split"
    );

    for CocoImage { id, file_name, .. } in &dataset.images {
        let Some(image) = open_rgb(&folder.join(file_name)) else {
            summary.skipped += 1;
            continue;
        };
        let rasterizer = match Rasterizer::new(&categories, image.dimensions(), image.dimensions()) {
            Ok(rasterizer) => rasterizer,
            Err(e) => {
                tracing::warn!(image = %file_name, error = %e, "skipping image");
                summary.skipped += 1;
                continue;
            }
        };

        let shapes: Vec<ShapeAnnotation> = by_image
            .get(id)
            .into_iter()
            .flatten()
            .filter_map(|a| ShapeAnnotation::bounding_box(a))
            .collect();
        let mask = rasterizer.rasterize(&shapes)?;

        let stem = Path::new(file_name).with_extension("");
        let stem = stem.to_string_lossy().replace(['/', '\\'], "_");
        save(&image, dirs.images.join(format!("{stem}.png")))?;
        save(&classes_to_mask(&mask, palette)?, dirs.masks.join(format!("{stem}.png")))?;
        summary.written += 1;
    }
    Ok(())
}

/// Draw COCO bounding boxes into colour masks at the original image size.
///
/// Reads `train/`, `valid/` and `test/` under `input`, each holding images and
/// an annotation file. Missing folders and unreadable images are skipped.
pub fn preprocess_coco(input: &Path, output: &Path) -> Result<PreprocessSummary> {
    let palette = Palette::coco_bbox();
    let dirs = OutputDirs::create(output)?;
    let mut summary = PreprocessSummary::default();

    for split in COCO_SPLITS {
        coco_split(&input.join(split), &palette, &dirs, &mut summary)?;
    }

    tracing::info!(written = summary.written, skipped = summary.skipped, "COCO preprocessing done");
    Ok(summary)
}
