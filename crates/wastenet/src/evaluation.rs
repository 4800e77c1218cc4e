//! Evaluation of predicted masks against the test split.

use std::{
    fs,
    path::{Path, PathBuf},
};

use anyhow::{Context, Result};
use burn::tensor::{backend::Backend, cast::ToElement, Tensor, TensorData};
use image::GrayImage;
use wastenet_data::{class_mask_to_one_hot, classes_to_mask, RecyclingClass};
use wastenet_metric::{
    evaluation_metadata, render_overlay, EvaluationReport, SegmentationInput, SegmentationMetrics,
};

use crate::{
    config::RunConfig,
    pipeline::{split_dataset, PredictionLoader},
};

/// Outcome of an evaluation run.
#[derive(Debug, Clone, PartialEq)]
pub struct EvaluationSummary {
    pub evaluated: usize,
    pub skipped: usize,
    /// Mean F1, Jaccard, recall and precision.
    pub scores: [f64; 4],
    pub class_accuracy: Vec<f64>,
    /// Mean of every tensor metric over the evaluated images, by name.
    pub metrics: Vec<(String, f64)>,
    pub results_dir: PathBuf,
}

/// One-hot `[1, classes, height, width]` tensor of a class mask.
pub fn one_hot_tensor<B: Backend>(mask: &GrayImage, num_classes: usize, device: &B::Device) -> Tensor<B, 4> {
    let (width, height) = mask.dimensions();
    let values = class_mask_to_one_hot(mask, num_classes);
    Tensor::from_data(
        TensorData::new(values, [1, num_classes, height as usize, width as usize]),
        device,
    )
}

/// Score predicted colour masks against the ground truth of the test split.
///
/// Predictions are looked up in `predictions` by sample name. Writes
/// `config.yaml`, `final_score.txt`, `testing_score.csv` and one overlay per
/// image under `results_root/<name>/`.
///
/// # Errors
///
/// Fails if the dataset is invalid, a prediction cannot be decoded or an
/// artifact cannot be written.
pub fn evaluate<B: Backend>(
    config: &RunConfig,
    predictions: &Path,
    results_root: &Path,
    device: &B::Device,
) -> Result<EvaluationSummary> {
    let results_dir = config.results_dir(results_root);
    let overlay_dir = results_dir.join("images");
    fs::create_dir_all(&overlay_dir)
        .with_context(|| format!("could not create {}", overlay_dir.display()))?;
    fs::write(results_dir.join("config.yaml"), config.to_yaml()?)
        .with_context(|| format!("could not write the config copy to {}", results_dir.display()))?;

    let split = split_dataset(config, false)?;
    let loader = PredictionLoader::new(split.test, predictions, config);
    let num_classes = loader.num_classes();

    let mut report = EvaluationReport::new(num_classes);
    let class_names = RecyclingClass::ALL.map(RecyclingClass::name);
    let mut metrics = SegmentationMetrics::<B>::new(&class_names);
    let total = loader.samples().len();
    let mut skipped = 0;

    for (i, sample) in loader.samples().iter().enumerate() {
        let Some(pair) = loader.load(sample)? else {
            skipped += 1;
            continue;
        };

        let scores = report.add(&pair.name, &pair.ground_truth, &pair.prediction)?;
        tracing::debug!(
            image = %scores.name,
            f1 = scores.f1,
            jaccard = scores.jaccard,
            recall = scores.recall,
            precision = scores.precision,
            "scored"
        );

        let ground_truth_rgb = classes_to_mask(&pair.ground_truth, loader.palette())?;
        let overlay = render_overlay(&pair.image, &ground_truth_rgb, &pair.prediction, loader.palette())?;
        let overlay_path = overlay_dir.join(format!("{}.png", pair.name));
        overlay
            .save(&overlay_path)
            .with_context(|| format!("could not save {}", overlay_path.display()))?;

        let input = SegmentationInput::new(
            one_hot_tensor::<B>(&pair.prediction, num_classes, device),
            one_hot_tensor::<B>(&pair.ground_truth, num_classes, device),
        );
        metrics.update(&input, &evaluation_metadata(i + 1, total));
    }

    report.write_final_score(results_dir.join("final_score.txt"))?;
    report.write_testing_csv(results_dir.join("testing_score.csv"))?;

    let scores = report.mean_scores();
    let class_accuracy = report.class_accuracy();
    tracing::info!(
        evaluated = report.scores().len(),
        skipped,
        f1 = scores[0],
        jaccard = scores[1],
        recall = scores[2],
        precision = scores[3],
        "evaluation finished"
    );
    tracing::info!("confusion matrix\n{}", report.confusion());
    for (class, accuracy) in RecyclingClass::ALL.iter().zip(&class_accuracy) {
        tracing::info!(class = class.name(), accuracy, "class accuracy");
    }

    let metrics = metrics.means();
    for (name, value) in &metrics {
        tracing::info!(metric = %name, value, "metric");
    }

    Ok(EvaluationSummary {
        evaluated: report.scores().len(),
        skipped,
        scores,
        class_accuracy,
        metrics,
        results_dir,
    })
}

/// Mean of the configured objective between predicted and ground-truth masks
/// over the test split.
///
/// # Errors
///
/// Fails if the dataset is invalid or a prediction cannot be decoded.
pub fn objective<B: Backend>(config: &RunConfig, predictions: &Path, device: &B::Device) -> Result<f64> {
    let objective = config.objective();
    let split = split_dataset(config, false)?;
    let loader = PredictionLoader::new(split.test, predictions, config);
    let num_classes = loader.num_classes();

    let mut total = 0.0;
    let mut count = 0usize;
    for sample in loader.samples() {
        let Some(pair) = loader.load(sample)? else {
            continue;
        };
        let loss = objective
            .forward(
                one_hot_tensor::<B>(&pair.prediction, num_classes, device),
                one_hot_tensor::<B>(&pair.ground_truth, num_classes, device),
            )
            .into_scalar()
            .to_f64();
        total += loss;
        count += 1;
    }

    let mean = if count == 0 { 0.0 } else { total / count as f64 };
    tracing::info!(objective = %objective, samples = count, loss = mean, "objective computed");
    Ok(mean)
}

#[cfg(test)]
mod tests {
    use burn::backend::NdArray;
    use tempfile::TempDir;

    use super::*;
    use crate::pipeline::tests::{plastic_mask, synthetic_dataset};

    type TestBackend = NdArray;

    /// Copy the masks of the test split into a prediction directory.
    fn perfect_predictions(config: &RunConfig, dir: &Path) -> PathBuf {
        let predictions = dir.join("predictions");
        fs::create_dir_all(&predictions).unwrap();
        for sample in split_dataset(config, false).unwrap().test {
            fs::copy(&sample.mask, predictions.join(sample.mask.file_name().unwrap())).unwrap();
        }
        predictions
    }

    #[test]
    fn perfect_predictions_score_one() {
        let dir = TempDir::new().unwrap();
        let config = synthetic_dataset(dir.path(), 10, 8);
        let predictions = perfect_predictions(&config, dir.path());
        let device = Default::default();

        let summary =
            evaluate::<TestBackend>(&config, &predictions, &dir.path().join("results"), &device).unwrap();

        assert_eq!(summary.evaluated, 2);
        assert_eq!(summary.skipped, 0);
        for score in summary.scores {
            assert!((score - 1.0).abs() < 1e-9);
        }
        assert!((summary.class_accuracy[1] - 1.0).abs() < 1e-6);
        let metric = |wanted: &str| {
            summary
                .metrics
                .iter()
                .find(|(name, _)| name == wanted)
                .map(|(_, v)| *v)
                .unwrap()
        };
        assert!((metric("Pixel Accuracy") - 1.0).abs() < 1e-6);
        assert!((metric("Dice plastic") - 1.0).abs() < 1e-6);
        assert_eq!(summary.metrics.len(), 3 + RecyclingClass::ALL.len() - 1);

        let results = dir.path().join("results/synthetic");
        let final_score = fs::read_to_string(results.join("final_score.txt")).unwrap();
        assert!(final_score.starts_with("F1: 1.00000\n"));
        let csv = fs::read_to_string(results.join("testing_score.csv")).unwrap();
        assert_eq!(csv.lines().count(), 3);
        assert!(results.join("config.yaml").is_file());
        assert_eq!(fs::read_dir(results.join("images")).unwrap().count(), 2);
    }

    #[test]
    fn missing_predictions_are_skipped() {
        let dir = TempDir::new().unwrap();
        let config = synthetic_dataset(dir.path(), 10, 8);
        let predictions = dir.path().join("predictions");
        fs::create_dir_all(&predictions).unwrap();
        let device = Default::default();

        let summary =
            evaluate::<TestBackend>(&config, &predictions, &dir.path().join("results"), &device).unwrap();

        assert_eq!(summary.evaluated, 0);
        assert_eq!(summary.skipped, 2);
        assert_eq!(summary.scores, [0.0; 4]);
    }

    #[test]
    fn objective_is_lower_for_better_predictions() {
        let dir = TempDir::new().unwrap();
        let config = synthetic_dataset(dir.path(), 10, 8);
        let perfect = perfect_predictions(&config, dir.path());
        let device = Default::default();

        let wrong = dir.path().join("wrong");
        fs::create_dir_all(&wrong).unwrap();
        for sample in split_dataset(&config, false).unwrap().test {
            plastic_mask(8, 0)
                .save(wrong.join(sample.mask.file_name().unwrap()))
                .unwrap();
        }

        let good = objective::<TestBackend>(&config, &perfect, &device).unwrap();
        let bad = objective::<TestBackend>(&config, &wrong, &device).unwrap();

        assert!(good < bad);
        assert!(good.abs() < 1e-4);
    }
}
