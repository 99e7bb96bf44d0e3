//! resnet_kfold CLI
//!
//! Entry point for k-fold fine-tuning runs, fold generation and dataset
//! inspection.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use colored::Colorize;
use tracing::info;

use resnet_kfold::backend::{backend_name, default_device, TrainingBackend};
use resnet_kfold::dataset::kfold::summarize_splits;
use resnet_kfold::utils::format_number;
use resnet_kfold::utils::logging::{init_logging, LogConfig};
use resnet_kfold::{run_experiment, write_folds, ExperimentConfig, RunOptions};

/// K-fold fine-tuning of ResNet-18 with Burn
#[derive(Parser, Debug)]
#[command(name = "resnet_kfold")]
#[command(version)]
#[command(about = "K-fold fine-tuning of a ResNet-18 image classifier", long_about = None)]
struct Cli {
    /// Enable verbose logging
    #[arg(short, long, default_value = "false")]
    verbose: bool,

    /// Only log errors
    #[arg(short, long, default_value = "false", conflicts_with = "verbose")]
    quiet: bool,

    /// Subcommand to execute
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Fine-tune on every split of a k-fold dataset
    Train {
        /// TOML experiment configuration (defaults are used if omitted)
        #[arg(short, long)]
        config: Option<PathBuf>,

        /// Root holding split_<k>/{train,val}
        #[arg(short, long)]
        data_dir: Option<PathBuf>,

        /// Directory for progress/ and weights/
        #[arg(short, long)]
        output_dir: Option<PathBuf>,

        /// Epochs per split
        #[arg(short, long)]
        epochs: Option<usize>,

        /// Batch size for both phases
        #[arg(short, long)]
        batch_size: Option<usize>,

        /// SGD learning rate
        #[arg(short, long)]
        learning_rate: Option<f64>,

        /// Number of classes of the new head
        #[arg(long)]
        num_classes: Option<usize>,

        /// Number of splits to train on
        #[arg(long)]
        splits: Option<usize>,

        /// Loader worker threads
        #[arg(long)]
        workers: Option<usize>,

        /// Random seed
        #[arg(long)]
        seed: Option<u64>,

        /// torchvision resnet18 .pth file
        #[arg(long)]
        weights: Option<PathBuf>,

        /// Train from random initialisation
        #[arg(long, default_value = "false")]
        no_pretrained: bool,

        /// Update the whole network instead of only the new head
        #[arg(long, default_value = "false")]
        finetune: bool,

        /// Start every split from a fresh model and optimizer
        #[arg(long, default_value = "false")]
        reset_per_split: bool,

        /// Hide batch progress bars
        #[arg(long, default_value = "false")]
        no_progress: bool,
    },

    /// Write a stratified k-fold layout from a flat ImageFolder tree
    MakeFolds {
        /// ImageFolder root (one directory per class)
        #[arg(short, long)]
        source: PathBuf,

        /// Destination for split_<k>/{train,val}
        #[arg(short, long)]
        dest: PathBuf,

        /// Number of folds
        #[arg(short, long, default_value = "3")]
        k: usize,

        /// Shuffle seed
        #[arg(long, default_value = "42")]
        seed: u64,
    },

    /// Show per-class image counts of every split
    Inspect {
        /// Root holding split_<k>/{train,val}
        #[arg(short, long, default_value = "./data")]
        data_dir: PathBuf,

        /// Number of splits
        #[arg(short, long, default_value = "3")]
        splits: usize,
    },

    /// Write the default configuration as TOML
    InitConfig {
        /// Output file
        #[arg(short, long, default_value = "experiment.toml")]
        output: PathBuf,
    },
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    let log_config = if cli.verbose {
        LogConfig::verbose()
    } else if cli.quiet {
        LogConfig::quiet()
    } else {
        LogConfig::default()
    };

    let _ = init_logging(&log_config);

    match cli.command {
        Commands::Train {
            config,
            data_dir,
            output_dir,
            epochs,
            batch_size,
            learning_rate,
            num_classes,
            splits,
            workers,
            seed,
            weights,
            no_pretrained,
            finetune,
            reset_per_split,
            no_progress,
        } => {
            let mut experiment = match &config {
                Some(path) => ExperimentConfig::load(path)
                    .with_context(|| format!("Failed to load config {}", path.display()))?,
                None => ExperimentConfig::default(),
            };

            // Command line flags win over the file
            if let Some(v) = data_dir {
                experiment.data.data_dir = v;
            }
            if let Some(v) = output_dir {
                experiment.run.output_dir = v;
            }
            if let Some(v) = epochs {
                experiment.run.num_epochs = v;
            }
            if let Some(v) = batch_size {
                experiment.data.batch_size = v;
            }
            if let Some(v) = learning_rate {
                experiment.optimizer.learning_rate = v;
            }
            if let Some(v) = num_classes {
                experiment.model.num_classes = v;
            }
            if let Some(v) = splits {
                experiment.data.num_splits = v;
            }
            if let Some(v) = workers {
                experiment.data.num_workers = v;
            }
            if let Some(v) = seed {
                experiment.run.seed = v;
            }
            if let Some(v) = weights {
                experiment.model.pretrained_weights = Some(v);
            }
            if no_pretrained {
                experiment.model.use_pretrained = false;
            }
            if finetune {
                experiment.model.feature_extract = false;
            }
            if reset_per_split {
                experiment.run.reset_model_per_split = true;
            }

            cmd_train(&experiment, !no_progress)?;
        }

        Commands::MakeFolds {
            source,
            dest,
            k,
            seed,
        } => {
            cmd_make_folds(&source, &dest, k, seed)?;
        }

        Commands::Inspect { data_dir, splits } => {
            cmd_inspect(&data_dir, splits)?;
        }

        Commands::InitConfig { output } => {
            ExperimentConfig::default()
                .save(&output)
                .with_context(|| format!("Failed to write {}", output.display()))?;
            println!(
                "{} Default configuration written to {}",
                "[OK]".green().bold(),
                output.display()
            );
        }
    }

    Ok(())
}

fn cmd_train(config: &ExperimentConfig, show_progress: bool) -> Result<()> {
    config.validate().context("Invalid configuration")?;

    println!("{}", "Training Configuration:".cyan().bold());
    println!("  Backend:          {}", backend_name());
    println!("  Model:            {}", config.model.model_name);
    println!("  Data dir:         {}", config.data.data_dir.display());
    println!("  Splits:           {}", config.data.num_splits);
    println!("  Classes:          {}", config.model.num_classes);
    println!("  Epochs:           {}", config.run.num_epochs);
    println!("  Batch size:       {}", config.data.batch_size);
    println!("  Learning rate:    {}", config.optimizer.learning_rate);
    println!("  Momentum:         {}", config.optimizer.momentum);
    println!("  Pretrained:       {}", config.model.use_pretrained);
    println!("  Feature extract:  {}", config.model.feature_extract);
    println!("  Reset per split:  {}", config.run.reset_model_per_split);
    println!("  Output dir:       {}", config.run.output_dir.display());
    println!();

    let device = default_device();
    info!("Using device {:?}", device);

    let summary = run_experiment::<TrainingBackend>(config, &device, &RunOptions { show_progress })
        .context("Training failed")?;

    println!();
    println!("{}", "Results:".green().bold());
    for split in &summary.splits {
        println!(
            "  split_{}  best val acc {:.4}  ({:.0}s)  -> {}",
            split.split_id,
            split.best_acc,
            split.runtime_secs,
            split.weights.display()
        );
    }
    println!(
        "  {} {:.4}",
        "Mean best val acc:".bold(),
        summary.mean_best_acc()
    );

    Ok(())
}

fn cmd_make_folds(source: &Path, dest: &Path, k: usize, seed: u64) -> Result<()> {
    let stats = write_folds(source, dest, k, seed)
        .with_context(|| format!("Failed to write folds from {}", source.display()))?;

    println!(
        "{} {} images in {} classes split into {} folds under {}",
        "[OK]".green().bold(),
        format_number(stats.total_images),
        stats.num_classes,
        stats.num_splits,
        dest.display()
    );
    for (fold, size) in stats.val_sizes.iter().enumerate() {
        println!(
            "  split_{}: {} train / {} val",
            fold + 1,
            stats.total_images - size,
            size
        );
    }

    Ok(())
}

fn cmd_inspect(data_dir: &Path, splits: usize) -> Result<()> {
    if !data_dir.exists() {
        println!(
            "{} Dataset directory not found: {}",
            "Error:".red(),
            data_dir.display()
        );
        println!("Create one with: resnet_kfold make-folds --source <DIR> --dest {}", data_dir.display());
        return Ok(());
    }

    let summaries = summarize_splits(data_dir, splits)
        .with_context(|| format!("Failed to read splits under {}", data_dir.display()))?;

    for summary in summaries {
        println!("{}", format!("split_{}", summary.split_id).cyan().bold());
        println!("  {:30} {:>8} {:>8}", "class", "train", "val");
        for (idx, class_name) in summary.classes.iter().enumerate() {
            println!(
                "  {:30} {:>8} {:>8}",
                class_name,
                summary.train_counts.get(idx).copied().unwrap_or(0),
                summary.val_counts.get(idx).copied().unwrap_or(0)
            );
        }
        println!();
    }

    Ok(())
}
