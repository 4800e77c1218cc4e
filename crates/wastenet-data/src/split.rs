//! Dataset discovery, train/valid/test partitioning and rare-class
//! oversampling.

use std::{
    collections::BTreeSet,
    ffi::OsStr,
    path::{Path, PathBuf},
};

use rand::{rngs::StdRng, seq::SliceRandom, SeedableRng};
use walkdir::WalkDir;

use crate::{
    error::{DataError, DataResult},
    palette::{mask_to_classes, present_classes, Palette, RecyclingClass},
};

const IMAGE_EXTENSIONS: [&str; 3] = ["jpg", "jpeg", "png"];

/// An image and its colour mask.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Sample {
    pub image: PathBuf,
    pub mask: PathBuf,
}

impl Sample {
    pub fn new(image: impl Into<PathBuf>, mask: impl Into<PathBuf>) -> Self {
        Self {
            image: image.into(),
            mask: mask.into(),
        }
    }
}

/// Three disjoint sample lists.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DatasetSplit {
    pub train: Vec<Sample>,
    pub valid: Vec<Sample>,
    pub test: Vec<Sample>,
}

impl DatasetSplit {
    pub fn len(&self) -> usize {
        self.train.len() + self.valid.len() + self.test.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

fn has_image_extension(path: &Path) -> bool {
    path.extension()
        .and_then(OsStr::to_str)
        .is_some_and(|ext| IMAGE_EXTENSIONS.iter().any(|e| ext.eq_ignore_ascii_case(e)))
}

/// Image files directly under `dir`, sorted by name.
fn list_images(dir: &Path) -> DataResult<Vec<PathBuf>> {
    let mut files = Vec::new();
    for entry in WalkDir::new(dir).min_depth(1).max_depth(1).sort_by_file_name() {
        let entry = entry.map_err(|e| DataError::DirectoryReadFailed {
            path: dir.to_path_buf(),
            source: e.into(),
        })?;
        let path = entry.into_path();
        if path.is_file() && has_image_extension(&path) {
            files.push(path);
        }
    }
    Ok(files)
}

/// Pair `images/*` with `masks/*` under `dataset_dir`, sorted by file name.
///
/// # Errors
///
/// Fails if either directory is missing, no images are found, the counts
/// differ, or a sorted image and mask do not share a basename.
pub fn collect_samples(dataset_dir: impl AsRef<Path>) -> DataResult<Vec<Sample>> {
    let dataset_dir = dataset_dir.as_ref();
    let image_root = dataset_dir.join("images");
    let mask_root = dataset_dir.join("masks");

    if !image_root.is_dir() {
        return Err(DataError::ImageDirectoryNotFound { path: image_root });
    }
    if !mask_root.is_dir() {
        return Err(DataError::MaskDirectoryNotFound { path: mask_root });
    }

    let images = list_images(&image_root)?;
    let masks = list_images(&mask_root)?;

    if images.is_empty() {
        return Err(DataError::NoSamples {
            path: dataset_dir.to_path_buf(),
        });
    }
    if images.len() != masks.len() {
        return Err(DataError::CountMismatch {
            path: dataset_dir.to_path_buf(),
            images: images.len(),
            masks: masks.len(),
        });
    }

    let samples = images
        .into_iter()
        .zip(masks)
        .map(|(image, mask)| {
            if image.file_stem() == mask.file_stem() {
                Ok(Sample { image, mask })
            } else {
                Err(DataError::UnpairedSample { image, mask })
            }
        })
        .collect::<DataResult<Vec<_>>>()?;

    tracing::info!(
        samples = samples.len(),
        path = %dataset_dir.display(),
        "collected image/mask pairs"
    );
    Ok(samples)
}

/// Split samples into train, validation and test lists.
///
/// `split` is clamped to `[0, 0.5]` and `n = floor(len * split)` samples go to
/// both validation and test. The result only depends on the input order and
/// `seed`.
pub fn partition(samples: &[Sample], split: f64, seed: u64) -> DatasetSplit {
    let split = if split.is_nan() { 0.0 } else { split.clamp(0.0, 0.5) };
    let n = (samples.len() as f64 * split).floor() as usize;

    let mut rest = samples.to_vec();
    rest.shuffle(&mut StdRng::seed_from_u64(seed));
    let valid: Vec<Sample> = rest.drain(..n).collect();

    rest.shuffle(&mut StdRng::seed_from_u64(seed));
    let test: Vec<Sample> = rest.drain(..n).collect();

    tracing::info!(
        train = rest.len(),
        valid = valid.len(),
        test = test.len(),
        split,
        seed,
        "partitioned dataset"
    );

    DatasetSplit {
        train: rest,
        valid,
        test,
    }
}

/// Replication factors for samples containing rare classes.
///
/// Tiers are checked in order and the first tier sharing a class with the
/// sample decides its copy count. Samples matching no tier are kept once.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OversamplingRule {
    tiers: Vec<(BTreeSet<u8>, usize)>,
}

impl Default for OversamplingRule {
    /// Bio first, then paper and metal, for the recycling taxonomy.
    fn default() -> Self {
        Self::new(vec![
            (BTreeSet::from([RecyclingClass::Bio.index()]), 20),
            (
                BTreeSet::from([RecyclingClass::Paper.index(), RecyclingClass::Metal.index()]),
                5,
            ),
        ])
    }
}

impl OversamplingRule {
    /// # Panics
    ///
    /// Panics if a tier has a copy count of zero.
    pub fn new(tiers: Vec<(BTreeSet<u8>, usize)>) -> Self {
        assert!(
            tiers.iter().all(|(_, copies)| *copies > 0),
            "Oversampling tiers must keep at least one copy"
        );
        Self { tiers }
    }

    /// A rule that keeps every sample exactly once.
    pub fn none() -> Self {
        Self { tiers: Vec::new() }
    }

    pub fn tiers(&self) -> &[(BTreeSet<u8>, usize)] {
        &self.tiers
    }

    /// Number of copies for a sample whose mask contains `classes`.
    pub fn copies(&self, classes: &BTreeSet<u8>) -> usize {
        self.tiers
            .iter()
            .find(|(tier, _)| !tier.is_disjoint(classes))
            .map_or(1, |(_, copies)| *copies)
    }
}

/// Replicate samples according to `rule`, keeping input order with copies
/// adjacent.
///
/// # Panics
///
/// Panics if `samples` and `classes` have different lengths.
pub fn oversample<T: Clone>(samples: &[T], classes: &[BTreeSet<u8>], rule: &OversamplingRule) -> Vec<T> {
    assert_eq!(
        samples.len(),
        classes.len(),
        "Every sample needs its set of present classes"
    );

    let mut balanced = Vec::with_capacity(samples.len());
    for (sample, present) in samples.iter().zip(classes) {
        let copies = rule.copies(present);
        balanced.extend(std::iter::repeat_n(sample, copies).cloned());
    }
    balanced
}

/// Read and decode every mask, then oversample by the classes they contain.
///
/// # Errors
///
/// Returns an error if a mask cannot be opened.
pub fn oversample_dataset(
    samples: &[Sample],
    palette: &Palette,
    rule: &OversamplingRule,
) -> DataResult<Vec<Sample>> {
    let classes = samples
        .iter()
        .map(|sample| {
            let mask = image::open(&sample.mask).map_err(|source| DataError::ImageOpenFailed {
                path: sample.mask.clone(),
                source,
            })?;
            Ok(present_classes(&mask_to_classes(&mask.to_rgb8(), palette)))
        })
        .collect::<DataResult<Vec<_>>>()?;

    let balanced = oversample(samples, &classes, rule);
    tracing::info!(
        before = samples.len(),
        after = balanced.len(),
        "oversampled training set"
    );
    Ok(balanced)
}

#[cfg(test)]
mod tests {
    use std::fs;

    use image::{Rgb, RgbImage};
    use tempfile::TempDir;

    use super::*;

    fn samples(n: usize) -> Vec<Sample> {
        (0..n)
            .map(|i| Sample::new(format!("images/{i:03}.jpg"), format!("masks/{i:03}.png")))
            .collect()
    }

    fn dataset_dir(names: &[&str], masks: &[&str]) -> TempDir {
        let dir = TempDir::new().unwrap();
        fs::create_dir(dir.path().join("images")).unwrap();
        fs::create_dir(dir.path().join("masks")).unwrap();
        for name in names {
            fs::write(dir.path().join("images").join(name), b"").unwrap();
        }
        for name in masks {
            fs::write(dir.path().join("masks").join(name), b"").unwrap();
        }
        dir
    }

    #[test]
    fn partition_is_disjoint_and_covers_input() {
        let input = samples(37);
        for split in [0.0, 0.1, 0.2, 0.33, 0.5] {
            let parts = partition(&input, split, 42);
            let n = (37.0 * split).floor() as usize;

            assert_eq!(parts.valid.len(), n);
            assert_eq!(parts.test.len(), n);
            assert_eq!(parts.len(), input.len());

            let mut all: Vec<Sample> = parts
                .train
                .iter()
                .chain(&parts.valid)
                .chain(&parts.test)
                .cloned()
                .collect();
            all.sort();
            assert_eq!(all, input);
        }
    }

    #[test]
    fn partition_is_deterministic_per_seed() {
        let input = samples(50);
        assert_eq!(partition(&input, 0.2, 7), partition(&input, 0.2, 7));
        assert_ne!(partition(&input, 0.2, 7), partition(&input, 0.2, 8));
    }

    #[test]
    fn partition_clamps_split_fraction() {
        let input = samples(10);

        let parts = partition(&input, 0.9, 1);
        assert_eq!((parts.valid.len(), parts.test.len(), parts.train.len()), (5, 5, 0));

        let parts = partition(&input, -1.0, 1);
        assert_eq!(parts.train.len(), 10);
    }

    #[test]
    fn default_rule_prefers_the_rarest_tier() {
        let rule = OversamplingRule::default();

        assert_eq!(rule.copies(&BTreeSet::from([0, 3])), 20);
        assert_eq!(rule.copies(&BTreeSet::from([0, 2, 3, 4])), 20);
        assert_eq!(rule.copies(&BTreeSet::from([0, 4])), 5);
        assert_eq!(rule.copies(&BTreeSet::from([0, 1, 2])), 5);
        assert_eq!(rule.copies(&BTreeSet::from([0, 1, 5])), 1);
        assert_eq!(rule.copies(&BTreeSet::new()), 1);
    }

    #[test]
    fn oversampling_keeps_order_and_is_repeatable() {
        let input = vec!["a", "b", "c"];
        let classes = vec![
            BTreeSet::from([0, 1]),
            BTreeSet::from([0, 4]),
            BTreeSet::from([0, 3]),
        ];
        let rule = OversamplingRule::default();

        let first = oversample(&input, &classes, &rule);
        let second = oversample(&input, &classes, &rule);

        assert_eq!(first.len(), 1 + 5 + 20);
        assert_eq!(first, second);
        assert_eq!(first[0], "a");
        assert!(first[1..6].iter().all(|s| *s == "b"));
        assert!(first[6..].iter().all(|s| *s == "c"));
    }

    #[test]
    fn empty_rule_is_identity() {
        let input = vec![1, 2, 3];
        let classes = vec![BTreeSet::from([3]); 3];
        assert_eq!(oversample(&input, &classes, &OversamplingRule::none()), input);
    }

    #[test]
    fn collect_samples_pairs_by_basename() {
        let dir = dataset_dir(&["b.jpg", "a.png", "notes.txt"], &["a.png", "b.png"]);

        let samples = collect_samples(dir.path()).unwrap();

        assert_eq!(samples.len(), 2);
        assert!(samples[0].image.ends_with("images/a.png"));
        assert!(samples[1].mask.ends_with("masks/b.png"));
    }

    #[test]
    fn collect_samples_ignores_stray_mask_files() {
        let dir = dataset_dir(&["a.jpg", "b.jpg"], &[".DS_Store", "a.png", "b.png", "labels.txt"]);

        let samples = collect_samples(dir.path()).unwrap();

        assert_eq!(samples.len(), 2);
        assert!(samples[0].mask.ends_with("masks/a.png"));
        assert!(samples[1].mask.ends_with("masks/b.png"));
    }

    #[test]
    fn collect_samples_rejects_count_mismatch() {
        let dir = dataset_dir(&["a.jpg", "b.jpg"], &["a.png"]);
        let err = collect_samples(dir.path()).unwrap_err();
        assert!(matches!(err, DataError::CountMismatch { images: 2, masks: 1, .. }));
    }

    #[test]
    fn collect_samples_rejects_mismatched_basenames() {
        let dir = dataset_dir(&["a.jpg"], &["z.png"]);
        let err = collect_samples(dir.path()).unwrap_err();
        assert!(matches!(err, DataError::UnpairedSample { .. }));
    }

    #[test]
    fn collect_samples_rejects_empty_dataset() {
        let dir = dataset_dir(&[], &[]);
        let err = collect_samples(dir.path()).unwrap_err();
        assert!(matches!(err, DataError::NoSamples { .. }));
    }

    #[test]
    fn collect_samples_requires_mask_directory() {
        let dir = TempDir::new().unwrap();
        fs::create_dir(dir.path().join("images")).unwrap();
        let err = collect_samples(dir.path()).unwrap_err();
        assert!(matches!(err, DataError::MaskDirectoryNotFound { .. }));
    }

    #[test]
    fn oversample_dataset_decodes_colour_masks() {
        let dir = TempDir::new().unwrap();
        let palette = Palette::recycling();
        let bio = RecyclingClass::Bio.color().to_rgb();

        let plain = dir.path().join("plain.png");
        let with_bio = dir.path().join("bio.png");
        RgbImage::new(4, 4).save(&plain).unwrap();
        RgbImage::from_fn(4, 4, |x, _| if x == 0 { bio } else { Rgb([0, 0, 0]) })
            .save(&with_bio)
            .unwrap();

        let input = vec![Sample::new("p.jpg", plain), Sample::new("b.jpg", with_bio)];
        let balanced = oversample_dataset(&input, &palette, &OversamplingRule::default()).unwrap();

        assert_eq!(balanced.len(), 21);
        assert_eq!(balanced[0], input[0]);
        assert!(balanced[1..].iter().all(|s| *s == input[1]));
    }
}
