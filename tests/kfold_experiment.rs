//! End-to-end k-fold run on a tiny synthetic dataset

use std::fs;
use std::path::Path;

use burn::backend::Autodiff;
use burn_ndarray::NdArray;
use tempfile::TempDir;

use resnet_kfold::model::ResNetConfig;
use resnet_kfold::output::{load_weights, read_progress_csv};
use resnet_kfold::{run_experiment, write_folds, ExperimentConfig, FinetuneError, RunOptions};

type TestBackend = Autodiff<NdArray>;

fn write_image(path: &Path, color: [u8; 3]) {
    fs::create_dir_all(path.parent().unwrap()).unwrap();
    let img = image::ImageBuffer::from_fn(40, 36, |x, y| {
        let shade = ((x + y) % 16) as u8;
        image::Rgb([
            color[0].saturating_sub(shade),
            color[1].saturating_add(shade),
            color[2].saturating_sub(shade),
        ])
    });
    img.save(path).unwrap();
}

fn build_dataset(root: &Path) {
    let flat = root.join("flat");
    for i in 0..6 {
        write_image(&flat.join(format!("ants/{i}.png")), [220, 40, 30]);
        write_image(&flat.join(format!("bees/{i}.png")), [30, 60, 220]);
    }
    write_folds(&flat, &root.join("data"), 2, 11).unwrap();
}

fn tiny_config(root: &Path) -> ExperimentConfig {
    let mut config = ExperimentConfig::default();
    config.data.data_dir = root.join("data");
    config.data.num_splits = 2;
    config.data.batch_size = 4;
    config.data.num_workers = 1;
    config.model.use_pretrained = false;
    config.model.pretrained_weights = None;
    config.model.input_size = Some(32);
    config.model.base_width = 4;
    config.run.num_epochs = 2;
    config.run.output_dir = root.join("output");
    config
}

#[test]
fn test_two_split_experiment_writes_outputs() {
    let dir = TempDir::new().unwrap();
    build_dataset(dir.path());
    let config = tiny_config(dir.path());

    let summary = run_experiment::<TestBackend>(
        &config,
        &Default::default(),
        &RunOptions {
            show_progress: false,
        },
    )
    .unwrap();

    assert_eq!(summary.splits.len(), 2);
    assert!(summary.finished_at.is_some());

    let output = dir.path().join("output");
    for split_id in 1..=2 {
        let csv_path = output.join(format!("progress/split_{split_id}.csv"));
        let content = fs::read_to_string(&csv_path).unwrap();
        assert!(content.starts_with("train_loss,train_acc,val_loss,val_acc,best_acc,runtime(s)"));

        let rows = read_progress_csv(&csv_path).unwrap();
        assert_eq!(rows.len(), 2);

        let report = &summary.splits[split_id - 1];
        assert_eq!(report.split_id, split_id);
        assert_eq!(report.train_size, 6);
        assert_eq!(report.val_size, 6);
        assert!(rows.iter().all(|r| r.best_acc == report.best_acc));
        let max_val = rows.iter().map(|r| r.val_acc).fold(0.0, f64::max);
        assert_eq!(report.best_acc, max_val);

        assert!(output.join(format!("weights/split_{split_id}.mpk")).exists());
    }
    assert!(output.join("summary.json").exists());
}

/// fc and conv1 weights stored in a split's `.mpk`
fn saved_weights(output: &Path, split_id: usize) -> (Vec<f32>, Vec<f32>) {
    let device = Default::default();
    let fresh = ResNetConfig::new()
        .with_num_classes(2)
        .with_base_width(4)
        .init::<NdArray>(&device);
    let model = load_weights::<NdArray, _>(
        fresh,
        &output.join(format!("weights/split_{split_id}")),
        &device,
    )
    .unwrap();
    (
        model.fc.weight.val().into_data().to_vec().unwrap(),
        model.conv1.weight.val().into_data().to_vec().unwrap(),
    )
}

// With zero epochs every split returns the model it started from
fn run_without_training(root: &Path, reset_model_per_split: bool) {
    let mut config = tiny_config(root);
    config.run.num_epochs = 0;
    config.run.reset_model_per_split = reset_model_per_split;

    let summary = run_experiment::<TestBackend>(
        &config,
        &Default::default(),
        &RunOptions {
            show_progress: false,
        },
    )
    .unwrap();
    assert_eq!(summary.splits.len(), 2);
    assert!(summary.splits.iter().all(|s| s.best_epoch.is_none()));
}

#[test]
fn test_carry_over_is_default() {
    assert!(!ExperimentConfig::default().run.reset_model_per_split);
}

#[test]
fn test_second_split_starts_from_first_split_weights() {
    let dir = TempDir::new().unwrap();
    build_dataset(dir.path());
    run_without_training(dir.path(), false);

    let output = dir.path().join("output");
    assert_eq!(saved_weights(&output, 2), saved_weights(&output, 1));
}

#[test]
fn test_reset_starts_every_split_from_scratch() {
    let dir = TempDir::new().unwrap();
    build_dataset(dir.path());
    run_without_training(dir.path(), true);

    let output = dir.path().join("output");
    assert_ne!(saved_weights(&output, 2), saved_weights(&output, 1));
}

#[test]
fn test_carry_over_trains_every_split() {
    let dir = TempDir::new().unwrap();
    build_dataset(dir.path());
    let mut config = tiny_config(dir.path());
    config.run.num_epochs = 1;

    let summary = run_experiment::<TestBackend>(
        &config,
        &Default::default(),
        &RunOptions {
            show_progress: false,
        },
    )
    .unwrap();
    assert_eq!(summary.splits.len(), 2);
    assert!(summary.splits.iter().all(|s| s.epochs == 1));
}

#[test]
fn test_class_count_mismatch_is_rejected() {
    let dir = TempDir::new().unwrap();
    build_dataset(dir.path());
    let mut config = tiny_config(dir.path());
    config.model.num_classes = 5;

    let result = run_experiment::<TestBackend>(
        &config,
        &Default::default(),
        &RunOptions {
            show_progress: false,
        },
    );
    assert!(matches!(result, Err(FinetuneError::Config(_))));
}

#[test]
fn test_missing_split_directory() {
    let dir = TempDir::new().unwrap();
    build_dataset(dir.path());
    let mut config = tiny_config(dir.path());
    config.data.num_splits = 3;

    let result = run_experiment::<TestBackend>(
        &config,
        &Default::default(),
        &RunOptions {
            show_progress: false,
        },
    );
    assert!(matches!(result, Err(FinetuneError::PathNotFound(_))));
}
