//! YAML run configuration.

use std::{
    fs,
    path::{Path, PathBuf},
};

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use wastenet_data::AugmentationConfig;
use wastenet_loss::{CompoundLoss, DiceLoss, Objective};

/// Optimizer named in the configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum OptimizerKind {
    Adam,
    #[serde(rename = "SGD")]
    Sgd,
}

/// Training objective named in the configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum LossKind {
    CompoundLoss,
    DiceLoss,
}

impl LossKind {
    pub fn objective(self) -> Objective {
        match self {
            Self::CompoundLoss => Objective::Compound(CompoundLoss::new()),
            Self::DiceLoss => Objective::Dice(DiceLoss::new()),
        }
    }
}

/// One training/evaluation run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunConfig {
    /// Run name, also the results sub-directory.
    pub name: String,
    pub batch_size: usize,
    pub lr: f64,
    pub num_epochs: usize,
    pub optimizer: OptimizerKind,
    pub loss: LossKind,

    #[serde(default)]
    pub augmentation: AugmentationConfig,

    #[serde(default = "default_seed")]
    pub seed: u64,

    /// Fraction of samples used for each of validation and test.
    #[serde(default = "default_split")]
    pub split: f64,

    #[serde(default = "default_dataset")]
    pub dataset: PathBuf,

    /// Side length images and masks are resized to.
    #[serde(default = "default_image_size")]
    pub image_size: u32,
}

const fn default_seed() -> u64 {
    42
}

const fn default_split() -> f64 {
    0.2
}

fn default_dataset() -> PathBuf {
    PathBuf::from("./post_dataset_taco")
}

const fn default_image_size() -> u32 {
    256
}

impl RunConfig {
    /// Read and parse a YAML configuration file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let content = fs::read_to_string(path)
            .with_context(|| format!("could not read the config file {}", path.display()))?;
        Self::from_yaml(&content).with_context(|| format!("invalid config file {}", path.display()))
    }

    pub fn from_yaml(content: &str) -> Result<Self> {
        Ok(serde_yaml::from_str(content)?)
    }

    pub fn to_yaml(&self) -> Result<String> {
        Ok(serde_yaml::to_string(self)?)
    }

    pub fn objective(&self) -> Objective {
        self.loss.objective()
    }

    /// `results_root/<name>`.
    pub fn results_dir(&self, results_root: impl AsRef<Path>) -> PathBuf {
        results_root.as_ref().join(&self.name)
    }
}
