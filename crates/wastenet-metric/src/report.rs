//! Evaluation report over predicted and ground-truth class masks.
//!
//! Every image is scored with macro F1, Jaccard, recall and precision over the
//! classes present in its ground truth. A confusion matrix over all classes is
//! accumulated across images (rows are ground truth, columns predictions).

use std::{
    fmt,
    fs::File,
    io::{BufWriter, Write},
    path::{Path, PathBuf},
};

use image::{GrayImage, Rgb, RgbImage};
use thiserror::Error;
use wastenet_data::{classes_to_mask, present_classes, DataError, Palette};

const EPS: f64 = 1e-7;

/// Errors raised while building or writing a report.
#[derive(Error, Debug)]
pub enum ReportError {
    /// Error when ground truth and prediction sizes differ.
    #[error("Prediction is {pred_width}x{pred_height} but ground truth is {gt_width}x{gt_height}")]
    DimensionMismatch {
        gt_width: u32,
        gt_height: u32,
        pred_width: u32,
        pred_height: u32,
    },

    /// Error when a mask holds a class outside the confusion matrix.
    #[error("Class index {class} is outside the {num_classes} evaluated classes")]
    ClassOutOfRange { class: u8, num_classes: usize },

    /// Error when writing a report file fails.
    #[error("Failed to write report file: {path}")]
    WriteFailed {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Error when rendering a mask fails.
    #[error(transparent)]
    Data(#[from] DataError),
}

pub type ReportResult<T> = Result<T, ReportError>;

fn check_dimensions(ground_truth: &GrayImage, prediction: &GrayImage) -> ReportResult<()> {
    if ground_truth.dimensions() == prediction.dimensions() {
        return Ok(());
    }
    Err(ReportError::DimensionMismatch {
        gt_width: ground_truth.width(),
        gt_height: ground_truth.height(),
        pred_width: prediction.width(),
        pred_height: prediction.height(),
    })
}

/// Square pixel-count matrix, rows = ground truth, columns = prediction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConfusionMatrix {
    num_classes: usize,
    counts: Vec<u64>,
}

impl ConfusionMatrix {
    pub fn new(num_classes: usize) -> Self {
        Self {
            num_classes,
            counts: vec![0; num_classes * num_classes],
        }
    }

    pub fn num_classes(&self) -> usize {
        self.num_classes
    }

    /// Add every pixel of one image.
    ///
    /// # Errors
    ///
    /// Fails on mismatched sizes or out-of-range classes, leaving the matrix
    /// untouched.
    pub fn update(&mut self, ground_truth: &GrayImage, prediction: &GrayImage) -> ReportResult<()> {
        check_dimensions(ground_truth, prediction)?;
        let num_classes = self.num_classes;
        let out_of_range = ground_truth
            .as_raw()
            .iter()
            .chain(prediction.as_raw())
            .find(|&&class| usize::from(class) >= num_classes);
        if let Some(&class) = out_of_range {
            return Err(ReportError::ClassOutOfRange { class, num_classes });
        }

        for (&truth, &predicted) in ground_truth.as_raw().iter().zip(prediction.as_raw()) {
            self.counts[usize::from(truth) * num_classes + usize::from(predicted)] += 1;
        }
        Ok(())
    }

    pub fn get(&self, truth: usize, predicted: usize) -> u64 {
        self.counts[truth * self.num_classes + predicted]
    }

    pub fn row(&self, truth: usize) -> &[u64] {
        &self.counts[truth * self.num_classes..(truth + 1) * self.num_classes]
    }

    pub fn total(&self) -> u64 {
        self.counts.iter().sum()
    }

    /// `diag / (row_sum + ε)` for every class.
    pub fn class_accuracy(&self) -> Vec<f64> {
        (0..self.num_classes)
            .map(|c| {
                let row_sum: u64 = self.row(c).iter().sum();
                self.get(c, c) as f64 / (row_sum as f64 + EPS)
            })
            .collect()
    }
}

impl fmt::Display for ConfusionMatrix {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let width = self.counts.iter().max().map_or(1, |m| m.to_string().len());
        for truth in 0..self.num_classes {
            let row: Vec<String> = self
                .row(truth)
                .iter()
                .map(|count| format!("{count:>width$}"))
                .collect();
            writeln!(f, "[{}]", row.join(" "))?;
        }
        Ok(())
    }
}

/// Scores of one evaluated image.
#[derive(Debug, Clone, PartialEq)]
pub struct ImageScores {
    pub name: String,
    pub f1: f64,
    pub jaccard: f64,
    pub recall: f64,
    pub precision: f64,
}

fn ratio(numerator: u64, denominator: u64) -> f64 {
    if denominator == 0 {
        0.0
    } else {
        numerator as f64 / denominator as f64
    }
}

/// Macro-averaged scores over the classes present in `ground_truth`.
///
/// A zero denominator contributes 0 for that class.
///
/// # Errors
///
/// Returns [`ReportError::DimensionMismatch`] if the masks differ in size.
pub fn score_image(
    name: impl Into<String>,
    ground_truth: &GrayImage,
    prediction: &GrayImage,
) -> ReportResult<ImageScores> {
    check_dimensions(ground_truth, prediction)?;
    let labels = present_classes(ground_truth);

    let mut sums = [0.0f64; 4];
    for &label in &labels {
        let (mut tp, mut fp, mut fn_) = (0u64, 0u64, 0u64);
        for (&truth, &predicted) in ground_truth.as_raw().iter().zip(prediction.as_raw()) {
            match (truth == label, predicted == label) {
                (true, true) => tp += 1,
                (false, true) => fp += 1,
                (true, false) => fn_ += 1,
                (false, false) => {}
            }
        }
        sums[0] += ratio(2 * tp, 2 * tp + fp + fn_);
        sums[1] += ratio(tp, tp + fp + fn_);
        sums[2] += ratio(tp, tp + fn_);
        sums[3] += ratio(tp, tp + fp);
    }

    let n = labels.len().max(1) as f64;
    Ok(ImageScores {
        name: name.into(),
        f1: sums[0] / n,
        jaccard: sums[1] / n,
        recall: sums[2] / n,
        precision: sums[3] / n,
    })
}

/// Per-image scores and the run-wide confusion matrix.
#[derive(Debug, Clone)]
pub struct EvaluationReport {
    scores: Vec<ImageScores>,
    confusion: ConfusionMatrix,
}

impl EvaluationReport {
    pub fn new(num_classes: usize) -> Self {
        Self {
            scores: Vec::new(),
            confusion: ConfusionMatrix::new(num_classes),
        }
    }

    /// Score one image and add it to the confusion matrix.
    ///
    /// # Errors
    ///
    /// Fails on mismatched sizes or out-of-range classes. Nothing is recorded
    /// in that case.
    pub fn add(
        &mut self,
        name: impl Into<String>,
        ground_truth: &GrayImage,
        prediction: &GrayImage,
    ) -> ReportResult<&ImageScores> {
        let scores = score_image(name, ground_truth, prediction)?;
        self.confusion.update(ground_truth, prediction)?;
        self.scores.push(scores);
        let index = self.scores.len() - 1;
        Ok(&self.scores[index])
    }

    pub fn scores(&self) -> &[ImageScores] {
        &self.scores
    }

    pub fn confusion(&self) -> &ConfusionMatrix {
        &self.confusion
    }

    pub fn class_accuracy(&self) -> Vec<f64> {
        self.confusion.class_accuracy()
    }

    /// Mean F1, Jaccard, recall and precision over all images. Zero when no
    /// image was added.
    pub fn mean_scores(&self) -> [f64; 4] {
        if self.scores.is_empty() {
            return [0.0; 4];
        }
        let n = self.scores.len() as f64;
        let mut mean = [0.0; 4];
        for s in &self.scores {
            mean[0] += s.f1;
            mean[1] += s.jaccard;
            mean[2] += s.recall;
            mean[3] += s.precision;
        }
        mean.map(|v| v / n)
    }

    /// Write the mean scores as `F1: x` style lines with five decimals.
    pub fn write_final_score(&self, path: impl AsRef<Path>) -> ReportResult<()> {
        let [f1, jaccard, recall, precision] = self.mean_scores();
        write_file(path.as_ref(), |w| {
            writeln!(w, "F1: {f1:.5}")?;
            writeln!(w, "Jaccard: {jaccard:.5}")?;
            writeln!(w, "Recall: {recall:.5}")?;
            writeln!(w, "Precision: {precision:.5}")
        })
    }

    /// Write one CSV row per image.
    pub fn write_testing_csv(&self, path: impl AsRef<Path>) -> ReportResult<()> {
        write_file(path.as_ref(), |w| {
            writeln!(w, "Image,F1,Jaccard,Recall,Precision")?;
            for s in &self.scores {
                writeln!(
                    w,
                    "{},{},{},{},{}",
                    s.name, s.f1, s.jaccard, s.recall, s.precision
                )?;
            }
            Ok(())
        })
    }
}

fn write_file(
    path: &Path,
    body: impl FnOnce(&mut BufWriter<File>) -> std::io::Result<()>,
) -> ReportResult<()> {
    let wrap = |source| ReportError::WriteFailed {
        path: path.to_path_buf(),
        source,
    };
    let mut writer = BufWriter::new(File::create(path).map_err(wrap)?);
    body(&mut writer).map_err(wrap)?;
    writer.flush().map_err(wrap)
}

const SEPARATOR_WIDTH: u32 = 10;

/// Side-by-side visualisation: the image blended with its ground-truth colour
/// mask on the left, a white separator, and the colourised prediction on the
/// right.
///
/// # Errors
///
/// Fails if the inputs differ in size or the prediction holds a class with no
/// palette colour.
pub fn render_overlay(
    image: &RgbImage,
    ground_truth: &RgbImage,
    prediction: &GrayImage,
    palette: &Palette,
) -> ReportResult<RgbImage> {
    let (width, height) = image.dimensions();
    if ground_truth.dimensions() != (width, height) || prediction.dimensions() != (width, height) {
        return Err(ReportError::DimensionMismatch {
            gt_width: ground_truth.width(),
            gt_height: ground_truth.height(),
            pred_width: prediction.width(),
            pred_height: prediction.height(),
        });
    }

    let right = classes_to_mask(prediction, palette)?;
    let mut canvas = RgbImage::from_pixel(width * 2 + SEPARATOR_WIDTH, height, Rgb([255, 255, 255]));

    for (x, y, pixel) in image.enumerate_pixels() {
        let mask = ground_truth.get_pixel(x, y);
        let blended: [u8; 3] = std::array::from_fn(|c| {
            let v = 0.5 * f32::from(pixel.0[c]) + 0.9 * f32::from(mask.0[c]);
            v.round().min(255.0) as u8
        });
        canvas.put_pixel(x, y, Rgb(blended));
        canvas.put_pixel(x + width + SEPARATOR_WIDTH, y, *right.get_pixel(x, y));
    }
    Ok(canvas)
}
