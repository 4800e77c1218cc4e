//! Pixel accuracy on argmax labels.

use std::marker::PhantomData;

use burn::{
    tensor::{backend::Backend, cast::ToElement, Tensor},
    train::metric::{
        state::{FormatOptions, NumericMetricState},
        Metric, MetricEntry, MetricMetadata, Numeric,
    },
};

use crate::input::SegmentationInput;

const EPS: f64 = 1e-7;

/// Fraction of pixels whose predicted class equals the target class.
///
/// # Shapes
///
/// - predictions: `[batch_size, classes, height, width]`
/// - targets: `[batch_size, classes, height, width]`
pub fn pixel_accuracy<B: Backend>(predictions: Tensor<B, 4>, targets: Tensor<B, 4>) -> f64 {
    let [batch_size, _, height, width] = predictions.dims();
    let total = (batch_size * height * width) as f64;

    let correct = predictions
        .argmax(1)
        .equal(targets.argmax(1))
        .float()
        .sum()
        .into_scalar()
        .to_f64();

    correct / (total + EPS)
}

/// [`pixel_accuracy`] as a Burn metric.
#[derive(Default)]
pub struct PixelAccuracyMetric<B: Backend> {
    state: NumericMetricState,
    _b: PhantomData<B>,
}

impl<B: Backend> PixelAccuracyMetric<B> {
    pub fn new() -> Self {
        Self::default()
    }
}

impl<B: Backend> Metric for PixelAccuracyMetric<B> {
    type Input = SegmentationInput<B>;

    fn name(&self) -> String {
        "Pixel Accuracy".to_owned()
    }

    fn update(&mut self, input: &Self::Input, _metadata: &MetricMetadata) -> MetricEntry {
        input.assertions();
        let value = pixel_accuracy(input.predictions.clone(), input.targets.clone());
        self.state.update(
            value,
            input.batch_size(),
            FormatOptions::new(self.name()).precision(5),
        )
    }

    fn clear(&mut self) {
        self.state.reset();
    }
}

impl<B: Backend> Numeric for PixelAccuracyMetric<B> {
    fn value(&self) -> f64 {
        self.state.value()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        suite::evaluation_metadata,
        tests::{one_hot, TestBackend},
    };

    #[test]
    fn accuracy_counts_matching_argmax() {
        let device = Default::default();
        let targets = one_hot::<TestBackend, _>(&[[0, 1, 2, 3]], [2, 2], 6, &device);
        let predictions = one_hot::<TestBackend, _>(&[[0, 1, 2, 0]], [2, 2], 6, &device);

        let value = pixel_accuracy(predictions, targets);

        assert!((value - 0.75).abs() < 1e-6);
    }

    #[test]
    fn metric_reports_latest_batch_and_weighted_running_mean() {
        let device = Default::default();
        let mut metric = PixelAccuracyMetric::<TestBackend>::new();
        let target = one_hot::<TestBackend, _>(&[[1, 1]], [1, 2], 3, &device);
        let wrong = one_hot::<TestBackend, _>(&[[0, 0], [0, 0], [0, 0]], [1, 2], 3, &device);
        let targets = one_hot::<TestBackend, _>(&[[1, 1], [1, 1], [1, 1]], [1, 2], 3, &device);

        metric.update(
            &SegmentationInput::new(target.clone(), target),
            &evaluation_metadata(1, 2),
        );
        assert!((metric.value() - 1.0).abs() < 1e-6);

        // 1 correct item against 3 wrong ones
        let entry = metric.update(
            &SegmentationInput::new(wrong, targets),
            &evaluation_metadata(2, 2),
        );
        assert!(metric.value().abs() < 1e-6);
        assert_eq!(entry.name, "Pixel Accuracy");
        assert!(entry.formatted.contains("0.25000"), "{}", entry.formatted);

        metric.clear();
        assert_eq!(metric.value(), 0.0);
    }
}
