//! The evaluation metrics of a run, updated together.

use burn::{
    data::dataloader::Progress,
    tensor::backend::Backend,
    train::metric::{Metric, MetricMetadata, Numeric},
};

use crate::{
    accuracy::PixelAccuracyMetric, dice::DiceCoefficientMetric, dice::DicePerClassMetric,
    input::SegmentationInput, precision::PrecisionMetric,
};

/// Metadata for the `processed`-th of `total` evaluation updates.
///
/// Evaluation runs outside a learner, so it is a single epoch without a
/// learning rate.
pub fn evaluation_metadata(processed: usize, total: usize) -> MetricMetadata {
    MetricMetadata {
        progress: Progress {
            items_processed: processed,
            items_total: total,
        },
        epoch: 1,
        epoch_total: 1,
        iteration: processed,
        lr: None,
    }
}

/// Pixel accuracy, foreground precision, foreground Dice and the Dice of
/// every foreground class.
///
/// Besides the Burn metric state, the suite keeps the mean of every metric
/// over all updates since the last clear.
pub struct SegmentationMetrics<B: Backend> {
    accuracy: PixelAccuracyMetric<B>,
    precision: PrecisionMetric<B>,
    dice: DiceCoefficientMetric<B>,
    per_class: Vec<DicePerClassMetric<B>>,
    sums: Vec<f64>,
    updates: usize,
}

impl<B: Backend> SegmentationMetrics<B> {
    /// `class_names` lists every class in palette order, background first.
    pub fn new(class_names: &[&str]) -> Self {
        let per_class: Vec<_> = class_names
            .iter()
            .enumerate()
            .skip(1)
            .map(|(class, name)| DicePerClassMetric::new(class, name))
            .collect();
        Self {
            accuracy: PixelAccuracyMetric::new(),
            precision: PrecisionMetric::new(),
            dice: DiceCoefficientMetric::new(),
            sums: vec![0.0; 3 + per_class.len()],
            per_class,
            updates: 0,
        }
    }

    pub fn names(&self) -> Vec<String> {
        let mut names = vec![self.accuracy.name(), self.precision.name(), self.dice.name()];
        names.extend(self.per_class.iter().map(Metric::name));
        names
    }

    /// Update every metric and return the values of this input, in
    /// [`names`](Self::names) order.
    pub fn update(&mut self, input: &SegmentationInput<B>, metadata: &MetricMetadata) -> Vec<f64> {
        self.accuracy.update(input, metadata);
        self.precision.update(input, metadata);
        self.dice.update(input, metadata);
        let mut values = vec![self.accuracy.value(), self.precision.value(), self.dice.value()];
        for metric in &mut self.per_class {
            metric.update(input, metadata);
            values.push(metric.value());
        }

        for (sum, value) in self.sums.iter_mut().zip(&values) {
            *sum += value;
        }
        self.updates += 1;
        values
    }

    /// Mean of every metric over the updates, 0 when there were none.
    pub fn means(&self) -> Vec<(String, f64)> {
        let updates = self.updates.max(1) as f64;
        self.names()
            .into_iter()
            .zip(&self.sums)
            .map(|(name, sum)| (name, sum / updates))
            .collect()
    }

    pub fn clear(&mut self) {
        self.accuracy.clear();
        self.precision.clear();
        self.dice.clear();
        for metric in &mut self.per_class {
            metric.clear();
        }
        self.sums.iter_mut().for_each(|sum| *sum = 0.0);
        self.updates = 0;
    }
}
