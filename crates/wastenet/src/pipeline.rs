//! Dataset splitting and loading of ground truth against predicted masks.

use std::{
    collections::BTreeSet,
    fs,
    path::{Path, PathBuf},
};

use anyhow::{Context, Result};
use image::{
    imageops::{self, FilterType},
    GrayImage, RgbImage,
};
use wastenet_data::{
    collect_samples, mask_to_classes, oversample_dataset, partition, scan_colors, Bgr, DataError,
    DatasetSplit, OversamplingRule, Palette, Sample, SegmentationDataset,
};

use crate::config::RunConfig;

/// Extensions tried when looking up the prediction for a sample.
const PREDICTION_EXTENSIONS: [&str; 3] = ["png", "jpg", "jpeg"];

/// Collect and partition the configured dataset.
///
/// With `oversample`, the training list is balanced with the default
/// rare-class rule.
///
/// # Errors
///
/// Fails if the dataset directory is not a valid `images/` + `masks/` pair or
/// a training mask cannot be read.
pub fn split_dataset(config: &RunConfig, oversample: bool) -> Result<DatasetSplit> {
    let samples = collect_samples(&config.dataset)?;
    let mut split = partition(&samples, config.split, config.seed);

    if oversample {
        split.train = oversample_dataset(&split.train, &Palette::recycling(), &OversamplingRule::default())?;
    }

    tracing::info!(
        train = split.train.len(),
        valid = split.valid.len(),
        test = split.test.len(),
        "dataset split"
    );
    Ok(split)
}

/// Scan every file in `masks` for the colours of `palette`.
///
/// # Errors
///
/// Fails if the directory cannot be listed or the scan workers fail.
pub fn scan_mask_directory(masks: &Path, palette: &Palette, threads: usize) -> Result<BTreeSet<Bgr>> {
    let mut paths = fs::read_dir(masks)
        .with_context(|| format!("could not list {}", masks.display()))?
        .map(|entry| entry.map(|e| e.path()))
        .collect::<std::io::Result<Vec<_>>>()?;
    paths.retain(|p| p.is_file());
    paths.sort();

    tracing::info!(masks = paths.len(), classes = palette.len(), threads, "scanning mask colours");
    let colors = scan_colors(&paths, palette, threads)?;
    tracing::info!(colors = colors.len(), "distinct palette colours");
    Ok(colors)
}

/// One test sample with its ground truth and prediction at the run resolution.
#[derive(Debug, Clone)]
pub struct EvaluationPair {
    pub name: String,
    pub image: RgbImage,
    pub ground_truth: GrayImage,
    pub prediction: GrayImage,
}

/// Loads test samples and the predicted colour masks that share their name.
pub struct PredictionLoader {
    dataset: SegmentationDataset,
    predictions: PathBuf,
    palette: Palette,
    size: u32,
}

impl PredictionLoader {
    pub fn new(samples: Vec<Sample>, predictions: impl Into<PathBuf>, config: &RunConfig) -> Self {
        let palette = Palette::recycling();
        let size = config.image_size;
        Self {
            dataset: SegmentationDataset::new(samples, palette.clone(), (size, size)),
            predictions: predictions.into(),
            palette,
            size,
        }
    }

    pub fn palette(&self) -> &Palette {
        &self.palette
    }

    pub fn num_classes(&self) -> usize {
        self.palette.len()
    }

    pub fn samples(&self) -> &[Sample] {
        self.dataset.samples()
    }

    fn prediction_path(&self, stem: &str) -> Option<PathBuf> {
        PREDICTION_EXTENSIONS
            .iter()
            .map(|ext| self.predictions.join(format!("{stem}.{ext}")))
            .find(|path| path.is_file())
    }

    /// Load one sample and its prediction. `Ok(None)` when no prediction
    /// exists for the sample.
    ///
    /// # Errors
    ///
    /// Fails if the sample or the prediction cannot be decoded.
    pub fn load(&self, sample: &Sample) -> Result<Option<EvaluationPair>> {
        let name = sample_name(&sample.image);
        let Some(path) = self.prediction_path(&name) else {
            tracing::warn!(sample = %name, "no prediction found, skipping");
            return Ok(None);
        };

        let (image, ground_truth) = self.dataset.load_pair(sample)?;
        let prediction = image::open(&path)
            .map_err(|source| DataError::ImageOpenFailed {
                path: path.clone(),
                source,
            })?
            .to_rgb8();
        let prediction = mask_to_classes(&prediction, &self.palette);
        let prediction = if prediction.dimensions() == (self.size, self.size) {
            prediction
        } else {
            imageops::resize(&prediction, self.size, self.size, FilterType::Nearest)
        };

        tracing::debug!(sample = %name, prediction = %path.display(), "loaded pair");
        Ok(Some(EvaluationPair {
            name,
            image,
            ground_truth,
            prediction,
        }))
    }
}

fn sample_name(path: &Path) -> String {
    path.file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_default()
}

#[cfg(test)]
pub(crate) mod tests {
    use image::Rgb;
    use tempfile::TempDir;
    use wastenet_data::RecyclingClass;

    use super::*;

    /// Color mask with the left `plastic_columns` columns plastic.
    pub fn plastic_mask(size: u32, plastic_columns: u32) -> RgbImage {
        RgbImage::from_fn(size, size, |x, _| {
            if x < plastic_columns {
                RecyclingClass::Plastic.color().to_rgb()
            } else {
                RecyclingClass::Background.color().to_rgb()
            }
        })
    }

    /// Dataset of `count` samples under `root`, returned with its config.
    pub fn synthetic_dataset(root: &Path, count: u32, size: u32) -> RunConfig {
        let dataset = root.join("dataset");
        fs::create_dir_all(dataset.join("images")).unwrap();
        fs::create_dir_all(dataset.join("masks")).unwrap();
        for i in 0..count {
            RgbImage::from_pixel(size, size, Rgb([(i * 20) as u8, 100, 50]))
                .save(dataset.join(format!("images/{i:03}.png")))
                .unwrap();
            plastic_mask(size, 1 + i % (size - 1))
                .save(dataset.join(format!("masks/{i:03}.png")))
                .unwrap();
        }

        let yaml = format!(
            "name: synthetic\nbatch_size: 2\nlr: 0.001\nnum_epochs: 1\noptimizer: Adam\n\
             loss: CompoundLoss\nsplit: 0.2\nimage_size: {size}\ndataset: {}\n",
            dataset.display()
        );
        RunConfig::from_yaml(&yaml).unwrap()
    }

    #[test]
    fn split_dataset_partitions_configured_directory() {
        let dir = TempDir::new().unwrap();
        let config = synthetic_dataset(dir.path(), 10, 8);

        let split = split_dataset(&config, false).unwrap();

        assert_eq!(
            (split.train.len(), split.valid.len(), split.test.len()),
            (6, 2, 2)
        );
        assert_eq!(split_dataset(&config, false).unwrap(), split);
    }

    #[test]
    fn split_dataset_fails_without_dataset() {
        let dir = TempDir::new().unwrap();
        let mut config = synthetic_dataset(dir.path(), 2, 4);
        config.dataset = dir.path().join("missing");

        assert!(split_dataset(&config, false).is_err());
    }

    #[test]
    fn scan_finds_mask_colours() {
        let dir = TempDir::new().unwrap();
        let config = synthetic_dataset(dir.path(), 3, 8);

        let colors = scan_mask_directory(&config.dataset.join("masks"), &Palette::recycling(), 2).unwrap();

        assert_eq!(
            colors,
            BTreeSet::from([
                RecyclingClass::Background.color(),
                RecyclingClass::Plastic.color()
            ])
        );
    }

    #[test]
    fn scan_uses_the_requested_palette() {
        let dir = TempDir::new().unwrap();
        let masks = dir.path().join("masks");
        fs::create_dir_all(&masks).unwrap();
        // black, and two box colours outside the recycling palette
        RgbImage::from_fn(3, 1, |x, _| [Rgb([0, 0, 0]), Rgb([0, 255, 255]), Rgb([255, 0, 255])][x as usize])
            .save(masks.join("boxes.png"))
            .unwrap();

        let coco = scan_mask_directory(&masks, &Palette::coco_bbox(), 1).unwrap();
        let recycling = scan_mask_directory(&masks, &Palette::recycling(), 1).unwrap();

        assert_eq!(
            coco,
            BTreeSet::from([Bgr::new(0, 0, 0), Bgr::new(255, 255, 0), Bgr::new(255, 0, 255)])
        );
        assert_eq!(recycling, BTreeSet::from([Bgr::new(0, 0, 0)]));
    }

    #[test]
    fn loader_skips_samples_without_prediction() {
        let dir = TempDir::new().unwrap();
        let config = synthetic_dataset(dir.path(), 2, 8);
        let samples = collect_samples(&config.dataset).unwrap();
        let predictions = dir.path().join("predictions");
        fs::create_dir_all(&predictions).unwrap();
        plastic_mask(16, 4).save(predictions.join("000.png")).unwrap();

        let loader = PredictionLoader::new(samples.clone(), &predictions, &config);
        let pair = loader.load(&samples[0]).unwrap().unwrap();

        assert_eq!(pair.name, "000");
        assert_eq!(pair.prediction.dimensions(), (8, 8));
        assert_eq!(pair.prediction.get_pixel(1, 3).0[0], RecyclingClass::Plastic.index());
        assert_eq!(pair.prediction.get_pixel(6, 3).0[0], RecyclingClass::Background.index());
        assert!(loader.load(&samples[1]).unwrap().is_none());
    }
}
