//! Per-class precision on argmax labels.

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

/// Precision `tp / (predicted + ε)` of every class.
///
/// # Shapes
///
/// - predictions: `[batch_size, classes, height, width]`
/// - targets: `[batch_size, classes, height, width]`
/// - output: one value per class
pub fn per_class_precision<B: Backend>(predictions: Tensor<B, 4>, targets: Tensor<B, 4>) -> Vec<f64> {
    let [_, classes, _, _] = predictions.dims();
    let predicted_labels = predictions.argmax(1);
    let target_labels = targets.argmax(1);

    (0..classes)
        .map(|class| {
            let predicted = predicted_labels.clone().equal_elem(class as i64).float();
            let actual = target_labels.clone().equal_elem(class as i64).float();

            let tp = (predicted.clone() * actual).sum().into_scalar().to_f64();
            let predicted = predicted.sum().into_scalar().to_f64();
            tp / (predicted + EPS)
        })
        .collect()
}

/// Mean precision over the foreground classes (background excluded).
///
/// # Panics
///
/// Panics if there is no foreground class.
pub fn foreground_precision<B: Backend>(predictions: Tensor<B, 4>, targets: Tensor<B, 4>) -> f64 {
    let precision = per_class_precision(predictions, targets);
    assert!(
        precision.len() > 1,
        "Foreground precision needs at least two classes, got {}",
        precision.len()
    );
    let foreground = &precision[1..];
    foreground.iter().sum::<f64>() / foreground.len() as f64
}

/// [`foreground_precision`] as a Burn metric.
#[derive(Default)]
pub struct PrecisionMetric<B: Backend> {
    state: NumericMetricState,
    _b: PhantomData<B>,
}

impl<B: Backend> PrecisionMetric<B> {
    pub fn new() -> Self {
        Self::default()
    }
}

impl<B: Backend> Metric for PrecisionMetric<B> {
    type Input = SegmentationInput<B>;

    fn name(&self) -> String {
        "Per-Class Precision".to_owned()
    }

    fn update(&mut self, input: &Self::Input, _metadata: &MetricMetadata) -> MetricEntry {
        input.assertions();
        let value = foreground_precision(input.predictions.clone(), input.targets.clone());
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

impl<B: Backend> Numeric for PrecisionMetric<B> {
    fn value(&self) -> f64 {
        self.state.value()
    }
}
