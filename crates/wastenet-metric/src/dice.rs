//! Dice coefficient metrics.

use std::marker::PhantomData;

use burn::{
    tensor::{backend::Backend, cast::ToElement, Tensor},
    train::metric::{
        state::{FormatOptions, NumericMetricState},
        Metric, MetricEntry, MetricMetadata, Numeric,
    },
};
use wastenet_loss::dice_per_class;

use crate::input::SegmentationInput;

/// Smoothing used by the Dice metrics.
pub const DICE_SMOOTH: f64 = 1e-15;

/// Unweighted Dice coefficient averaged over the foreground classes.
///
/// # Shapes
///
/// - predictions: `[batch_size, classes, height, width]`
/// - targets: `[batch_size, classes, height, width]`
///
/// # Panics
///
/// Panics if there is no foreground class.
pub fn dice_coef_multi<B: Backend>(predictions: Tensor<B, 4>, targets: Tensor<B, 4>) -> f64 {
    let [_, classes, _, _] = predictions.dims();
    assert!(
        classes > 1,
        "Multi-class Dice needs at least two classes, got {classes}"
    );

    dice_per_class(predictions, targets, DICE_SMOOTH)
        .slice([1..classes])
        .mean()
        .into_scalar()
        .to_f64()
}

/// [`dice_coef_multi`] as a Burn metric.
#[derive(Default)]
pub struct DiceCoefficientMetric<B: Backend> {
    state: NumericMetricState,
    _b: PhantomData<B>,
}

impl<B: Backend> DiceCoefficientMetric<B> {
    pub fn new() -> Self {
        Self::default()
    }
}

impl<B: Backend> Metric for DiceCoefficientMetric<B> {
    type Input = SegmentationInput<B>;

    fn name(&self) -> String {
        "Dice Coefficient".to_owned()
    }

    fn update(&mut self, input: &Self::Input, _metadata: &MetricMetadata) -> MetricEntry {
        input.assertions();
        let value = dice_coef_multi(input.predictions.clone(), input.targets.clone());
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

impl<B: Backend> Numeric for DiceCoefficientMetric<B> {
    fn value(&self) -> f64 {
        self.state.value()
    }
}

/// Dice coefficient of a single class.
///
/// Every update counts once in the running value, whatever its batch size.
pub struct DicePerClassMetric<B: Backend> {
    class: usize,
    name: String,
    state: NumericMetricState,
    _b: PhantomData<B>,
}

impl<B: Backend> DicePerClassMetric<B> {
    pub fn new(class: usize, class_name: &str) -> Self {
        Self {
            class,
            name: format!("Dice {class_name}"),
            state: NumericMetricState::default(),
            _b: PhantomData,
        }
    }

    pub fn class(&self) -> usize {
        self.class
    }
}

impl<B: Backend> Metric for DicePerClassMetric<B> {
    type Input = SegmentationInput<B>;

    fn name(&self) -> String {
        self.name.clone()
    }

    fn update(&mut self, input: &Self::Input, _metadata: &MetricMetadata) -> MetricEntry {
        input.assertions();
        let classes = input.num_classes();
        assert!(
            self.class < classes,
            "Class {} is out of range for {classes} classes",
            self.class
        );

        let value = dice_per_class(input.predictions.clone(), input.targets.clone(), DICE_SMOOTH)
            .slice([self.class..self.class + 1])
            .into_scalar()
            .to_f64();
        self.state
            .update(value, 1, FormatOptions::new(self.name()).precision(5))
    }

    fn clear(&mut self) {
        self.state.reset();
    }
}

impl<B: Backend> Numeric for DicePerClassMetric<B> {
    fn value(&self) -> f64 {
        self.state.value()
    }
}
