use std::path::PathBuf;

use anyhow::Result;
use clap::{Parser, Subcommand, ValueEnum};
use tracing_subscriber::EnvFilter;
use wastenet::{
    backend::{backend_name, create_device, SelectedBackend},
    evaluate, objective, preprocess_coco, preprocess_taco, scan_mask_directory, split_dataset,
    data::Palette,
    RunConfig,
};

#[derive(Parser)]
#[command(name = "wastenet")]
#[command(about = "Segmentation pipeline for recyclable waste: preprocessing, splitting and evaluation")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

/// Colour palette of a mask directory.
#[derive(Clone, Copy, Debug, ValueEnum)]
enum PaletteChoice {
    /// Recycling-class masks written by preprocess-taco
    Recycling,
    /// Bounding-box masks written by preprocess-coco
    Coco,
}

impl PaletteChoice {
    fn palette(self) -> Palette {
        match self {
            Self::Recycling => Palette::recycling(),
            Self::Coco => Palette::coco_bbox(),
        }
    }
}

#[derive(Subcommand)]
enum Commands {
    /// Rasterize TACO polygon annotations into recycling-class masks
    PreprocessTaco {
        /// TACO annotation file
        #[arg(short, long)]
        annotations: PathBuf,

        /// Directory the annotation file names are relative to
        #[arg(short, long)]
        images: PathBuf,

        /// Output dataset directory
        #[arg(short, long)]
        output: PathBuf,

        /// Side length of the written images and masks
        #[arg(long, default_value_t = 256)]
        size: u32,
    },

    /// Draw COCO bounding boxes from train/valid/test folders into masks
    PreprocessCoco {
        /// Directory holding the train, valid and test folders
        #[arg(short, long)]
        input: PathBuf,

        /// Output dataset directory
        #[arg(short, long)]
        output: PathBuf,
    },

    /// List the palette colours used by a mask directory
    ScanColors {
        /// Mask directory
        #[arg(short, long)]
        masks: PathBuf,

        /// Palette the masks were drawn with
        #[arg(short, long, value_enum, default_value_t = PaletteChoice::Recycling)]
        palette: PaletteChoice,

        /// Worker threads
        #[arg(short, long, default_value_t = 4)]
        threads: usize,
    },

    /// Partition the configured dataset
    Split {
        /// Run configuration file
        #[arg(short, long)]
        config: PathBuf,

        /// Oversample rare classes in the training list
        #[arg(long)]
        oversample: bool,
    },

    /// Score predicted masks against the test split
    Evaluate {
        /// Run configuration file
        #[arg(short, long)]
        config: PathBuf,

        /// Directory of predicted colour masks named like the test images
        #[arg(short, long)]
        predictions: PathBuf,

        /// Root of the results directories
        #[arg(short, long, default_value = "results")]
        results: PathBuf,
    },

    /// Compute the configured loss between predicted and ground-truth masks
    Objective {
        /// Run configuration file
        #[arg(short, long)]
        config: PathBuf,

        /// Directory of predicted colour masks named like the test images
        #[arg(short, long)]
        predictions: PathBuf,
    },

    /// Show backend information
    Info,
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::PreprocessTaco {
            annotations,
            images,
            output,
            size,
        } => {
            preprocess_taco(&annotations, &images, &output, size)?;
            Ok(())
        }

        Commands::PreprocessCoco { input, output } => {
            preprocess_coco(&input, &output)?;
            Ok(())
        }

        Commands::ScanColors {
            masks,
            palette,
            threads,
        } => {
            for color in scan_mask_directory(&masks, &palette.palette(), threads)? {
                println!("{:?}", color.0);
            }
            Ok(())
        }

        Commands::Split { config, oversample } => {
            let config = RunConfig::load(config)?;
            split_dataset(&config, oversample)?;
            Ok(())
        }

        Commands::Evaluate {
            config,
            predictions,
            results,
        } => {
            let config = RunConfig::load(config)?;
            let device = create_device();
            tracing::info!(backend = backend_name(), run = %config.name, "evaluating");
            let summary = evaluate::<SelectedBackend>(&config, &predictions, &results, &device)?;
            let [f1, jaccard, recall, precision] = summary.scores;
            println!("F1: {f1:.5}");
            println!("Jaccard: {jaccard:.5}");
            println!("Recall: {recall:.5}");
            println!("Precision: {precision:.5}");
            Ok(())
        }

        Commands::Objective {
            config,
            predictions,
        } => {
            let config = RunConfig::load(config)?;
            let device = create_device();
            let loss = objective::<SelectedBackend>(&config, &predictions, &device)?;
            println!("{}: {loss:.6}", config.objective());
            Ok(())
        }

        Commands::Info => {
            let device = create_device();
            println!("wastenet information:");
            println!("  Backend: {}", backend_name());
            println!("  Device: {device:?}");
            Ok(())
        }
    }
}
