//! Built-in `Image_Classification` pipeline.
//!
//! Training data layout:
//!
//! ```text
//! <input_dirpath>/Class Map.txt
//! <input_dirpath>/train/<class_name>/*.png
//! <input_dirpath>/valid/<class_name>/*.png
//! ```
//!
//! The numeric model is supplied by a [`ClassifierBackend`]; the pipeline owns
//! data loading, checkpoint selection and label translation.

pub mod data;
pub mod linear;

pub use data::{ImageFolder, Sample, extract_features};
pub use linear::LinearBackend;

use crate::artifacts::{CLASS_MAP_FILE, ClassMap, Flags, HyperparamRecord};
use crate::error::{TrainingError, TrainingResult};
use crate::layout::{CHECKPOINT_FILE, HPARAMS_FILE, METRICS_FILE};
use crate::pipeline::{ModelConfig, Pipeline, Predictor, RunSetup, from_flags, to_flags};
use crate::progress::ProgressEvent;
use crate::trainer::{FitContext, FitSummary, Trainer};
use clap::Parser;
use rand::SeedableRng;
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use serde::{Deserialize, Serialize};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Arc;

pub const PIPELINE_ID: &str = "Image_Classification";

const DEFAULT_MAX_EPOCHS: u32 = 10;

/// The model half of a classifier: parameters, forward pass, one optimizer step.
pub trait ClassifierModel: Send {
    fn num_classes(&self) -> usize;

    fn logits(&self, features: &[f32]) -> TrainingResult<Vec<f32>>;

    /// One SGD step over `batch`; returns mean loss.
    fn train_batch(&mut self, batch: &[(&[f32], usize)], lr: f32) -> TrainingResult<f32>;

    fn save(&self, path: &Path) -> TrainingResult<()>;
}

pub trait ClassifierBackend: Send + Sync {
    fn id(&self) -> &'static str;

    fn create(&self, num_features: usize, num_classes: usize, seed: u64) -> Box<dyn ClassifierModel>;

    fn load(&self, checkpoint: &Path) -> TrainingResult<Box<dyn ClassifierModel>>;
}

/// Model and data-loading flags.
#[derive(Debug, Clone, PartialEq, Parser, Serialize, Deserialize)]
#[command(name = "model", no_binary_name = true)]
pub struct ClassifierArgs {
    /// Training data root
    #[serde(skip)]
    pub input_dirpath: PathBuf,

    /// Resized image height
    #[arg(long = "length", default_value_t = 32)]
    pub length: u32,

    /// Resized image width
    #[arg(long = "width", default_value_t = 32)]
    pub width: u32,

    #[arg(long = "batch_size", default_value_t = 32)]
    pub batch_size: usize,

    /// Image decoding threads
    #[arg(long = "num_workers", default_value_t = 2)]
    pub num_workers: usize,

    /// Learning rate, typical range [0.1 - 1e-5]
    #[arg(long = "lr", default_value_t = 1e-3)]
    pub lr: f64,
}

impl ClassifierArgs {
    fn validate(&self) -> TrainingResult<()> {
        if self.length == 0 || self.width == 0 {
            return Err(TrainingError::InvalidArguments("--length and --width must be >= 1".to_string()));
        }
        if self.batch_size == 0 {
            return Err(TrainingError::InvalidArguments("--batch_size must be >= 1".to_string()));
        }
        if !self.lr.is_finite() || self.lr <= 0.0 {
            return Err(TrainingError::InvalidArguments("--lr must be > 0".to_string()));
        }
        Ok(())
    }

    fn num_features(&self) -> usize {
        self.length as usize * self.width as usize * 3
    }
}

/// Trainer flags.
#[derive(Debug, Clone, PartialEq, Parser, Serialize, Deserialize)]
#[command(name = "trainer", no_binary_name = true)]
pub struct TrainerArgs {
    #[arg(long = "max_epochs")]
    pub max_epochs: Option<u32>,

    #[arg(long = "seed", default_value_t = 42)]
    pub seed: u64,

    /// Cap on mini-batches per epoch
    #[arg(long = "limit_train_batches")]
    pub limit_train_batches: Option<usize>,
}

#[derive(Clone)]
pub struct ImageClassification {
    backend: Arc<dyn ClassifierBackend>,
}

impl Default for ImageClassification {
    fn default() -> Self {
        Self::with_backend(Arc::new(LinearBackend))
    }
}

impl std::fmt::Debug for ImageClassification {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ImageClassification").field("backend", &self.backend.id()).finish()
    }
}

impl ImageClassification {
    #[must_use]
    pub fn with_backend(backend: Arc<dyn ClassifierBackend>) -> Self {
        Self { backend }
    }
}

impl Pipeline for ImageClassification {
    fn id(&self) -> &str {
        PIPELINE_ID
    }

    fn description(&self) -> &str {
        "Single-label image classification over class-named folders"
    }

    fn parse_model_args(&self, args: &[String]) -> TrainingResult<ModelConfig> {
        let parsed =
            ClassifierArgs::try_parse_from(args).map_err(|e| TrainingError::InvalidArguments(e.to_string()))?;
        parsed.validate()?;
        Ok(ModelConfig { input_dirpath: parsed.input_dirpath.clone(), flags: to_flags(&parsed)? })
    }

    fn parse_trainer_args(&self, args: &[String]) -> TrainingResult<Flags> {
        let mut parsed =
            TrainerArgs::try_parse_from(args).map_err(|e| TrainingError::InvalidArguments(e.to_string()))?;
        match parsed.max_epochs {
            Some(0) => return Err(TrainingError::InvalidArguments("--max_epochs must be >= 1".to_string())),
            Some(_) => {}
            None => parsed.max_epochs = Some(DEFAULT_MAX_EPOCHS),
        }
        to_flags(&parsed)
    }

    fn build_trainable(&self, setup: &RunSetup<'_>) -> TrainingResult<Box<dyn Trainer>> {
        let record = setup.record;
        let mut args: ClassifierArgs = from_flags(&record.model)?;
        args.input_dirpath.clone_from(&record.input_dirpath);
        args.validate()?;
        let trainer_args: TrainerArgs = from_flags(&record.trainer)?;

        let data_root = &record.input_dirpath;
        let class_map = ClassMap::read_from_dir(data_root).map_err(|e| match e {
            TrainingError::MissingArtifact(path) => {
                TrainingError::Dataset(format!("class map not found: {}", path.display()))
            }
            other => other,
        })?;
        for split in ["train", "valid"] {
            if !data_root.join(split).is_dir() {
                return Err(TrainingError::Dataset(format!(
                    "{} has no `{split}` folder",
                    data_root.display()
                )));
            }
        }

        Ok(Box::new(ClassificationTrainer {
            record: record.clone(),
            args,
            trainer_args,
            class_map,
            backend: Arc::clone(&self.backend),
        }))
    }

    fn build_inference(&self, checkpoint_dir: &Path, hparams: &HyperparamRecord) -> TrainingResult<Box<dyn Predictor>> {
        let checkpoint = checkpoint_dir.join(CHECKPOINT_FILE);
        if !checkpoint.is_file() {
            return Err(TrainingError::MissingCheckpoint(format!("no checkpoint in {}", checkpoint_dir.display())));
        }
        let class_map = ClassMap::read_from_dir(checkpoint_dir).map_err(|e| {
            TrainingError::MissingCheckpoint(format!("{}: {e}", checkpoint_dir.display()))
        })?;
        let args: ClassifierArgs = from_flags(&hparams.model)?;
        let model = self.backend.load(&checkpoint)?;
        if model.num_classes() != class_map.len() {
            return Err(TrainingError::MissingCheckpoint(format!(
                "checkpoint has {} outputs but class map has {} classes",
                model.num_classes(),
                class_map.len()
            )));
        }

        Ok(Box::new(ClassificationPredictor { model, class_map, width: args.width, height: args.length }))
    }
}

struct ClassificationTrainer {
    record: HyperparamRecord,
    args: ClassifierArgs,
    trainer_args: TrainerArgs,
    class_map: ClassMap,
    backend: Arc<dyn ClassifierBackend>,
}

impl ClassificationTrainer {
    fn message(&self, ctx: &FitContext<'_>, message: impl Into<String>) {
        ctx.progress.on_event(ProgressEvent::Message { job_id: ctx.job_id.clone(), message: message.into() });
    }
}

impl Trainer for ClassificationTrainer {
    fn id(&self) -> &'static str {
        "image-classification"
    }

    fn describe(&self) -> String {
        format!(
            "{} classes, {}x{} inputs, backend {}, data {}",
            self.class_map.len(),
            self.args.width,
            self.args.length,
            self.backend.id(),
            self.args.input_dirpath.display()
        )
    }

    fn fit(&mut self, ctx: &FitContext<'_>) -> TrainingResult<FitSummary> {
        self.record.write(&ctx.log_dir.join(HPARAMS_FILE))?;
        std::fs::copy(self.args.input_dirpath.join(CLASS_MAP_FILE), ctx.weight_dir.join(CLASS_MAP_FILE))?;

        self.message(ctx, "loading images");
        let (width, height) = (self.args.width, self.args.length);
        let train = ImageFolder::scan(&self.args.input_dirpath.join("train"), &self.class_map)?;
        let valid = ImageFolder::scan(&self.args.input_dirpath.join("valid"), &self.class_map)?;
        if train.is_empty() {
            return Err(TrainingError::Dataset("training split has no images".to_string()));
        }
        let train = train.load(width, height, self.args.num_workers)?;
        let valid = valid.load(width, height, self.args.num_workers)?;
        ctx.cancel.check()?;

        let max_epochs = self.trainer_args.max_epochs.unwrap_or(DEFAULT_MAX_EPOCHS);
        let limit = self.trainer_args.limit_train_batches.unwrap_or(usize::MAX);
        let lr = self.args.lr as f32;
        let mut model = self.backend.create(self.args.num_features(), self.class_map.len(), self.trainer_args.seed);
        let mut rng = StdRng::seed_from_u64(self.trainer_args.seed);
        let mut order: Vec<usize> = (0..train.len()).collect();

        let checkpoint = ctx.weight_dir.join(CHECKPOINT_FILE);
        let mut metrics = std::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(ctx.log_dir.join(METRICS_FILE))?;
        let mut best: Option<f32> = None;
        let mut epochs_run = 0;

        for epoch in 1..=max_epochs {
            ctx.cancel.check()?;
            order.shuffle(&mut rng);

            let mut loss_sum = 0.0;
            let mut batches = 0usize;
            for chunk in order.chunks(self.args.batch_size).take(limit) {
                let batch: Vec<(&[f32], usize)> =
                    chunk.iter().map(|&i| (train[i].features.as_slice(), train[i].label)).collect();
                loss_sum += model.train_batch(&batch, lr)?;
                batches += 1;
            }
            let train_loss = loss_sum / batches.max(1) as f32;
            // Without a validation split, select on training accuracy.
            let val_acc = if valid.is_empty() { accuracy(&*model, &train)? } else { accuracy(&*model, &valid)? };

            // top-1 checkpoint on val_acc, mode max
            if best.is_none_or(|b| val_acc > b) {
                model.save(&checkpoint)?;
                best = Some(val_acc);
            }
            epochs_run = epoch;

            writeln!(
                metrics,
                "{}",
                serde_json::json!({ "epoch": epoch, "train_loss": train_loss, "val_acc": val_acc })
            )?;
            ctx.progress.on_event(ProgressEvent::Epoch {
                job_id: ctx.job_id.clone(),
                epoch,
                total: max_epochs,
                train_loss,
                val_acc,
            });
        }

        Ok(FitSummary { epochs_run, best_val_acc: best, checkpoint })
    }
}

fn accuracy(model: &dyn ClassifierModel, samples: &[Sample]) -> TrainingResult<f32> {
    if samples.is_empty() {
        return Ok(0.0);
    }
    let mut correct = 0usize;
    for sample in samples {
        if argmax(&model.logits(&sample.features)?) == sample.label {
            correct += 1;
        }
    }
    Ok(correct as f32 / samples.len() as f32)
}

struct ClassificationPredictor {
    model: Box<dyn ClassifierModel>,
    class_map: ClassMap,
    width: u32,
    height: u32,
}

impl Predictor for ClassificationPredictor {
    fn predict(&self, images: &[PathBuf]) -> TrainingResult<Vec<String>> {
        images
            .iter()
            .map(|path| {
                let features = extract_features(path, self.width, self.height)
                    .map_err(|e| TrainingError::InferenceInput(format!("{}: {e}", path.display())))?;
                let probs = softmax(&self.model.logits(&features)?);
                let index = argmax(&probs);
                self.class_map.name(index).map(str::to_string).ok_or_else(|| {
                    TrainingError::InferenceInput(format!("predicted class {index} is not in the class map"))
                })
            })
            .collect()
    }
}

/// Numerically stable softmax.
#[must_use]
pub fn softmax(logits: &[f32]) -> Vec<f32> {
    let max = logits.iter().copied().fold(f32::NEG_INFINITY, f32::max);
    let exps: Vec<f32> = logits.iter().map(|z| (z - max).exp()).collect();
    let sum: f32 = exps.iter().sum();
    exps.into_iter().map(|e| e / sum).collect()
}

/// Index of the largest value; ties resolve to the first maximum.
#[must_use]
pub fn argmax(values: &[f32]) -> usize {
    let mut best = 0;
    for (i, v) in values.iter().enumerate() {
        if *v > values[best] {
            best = i;
        }
    }
    best
}
