//! Shared fixtures: a classifier backend with fixed logits and a wired controller.

#![allow(dead_code)]

use image::{Rgb, RgbImage};
use lumen_core::{Config, Controller, EventSource, SignalRegistry, SignalValue, callback, events, updates};
use lumen_training::classification::PIPELINE_ID;
use lumen_training::{
    CHECKPOINT_FILE, CLASS_MAP_FILE, ClassifierBackend, ClassifierModel, Executor, HPARAMS_FILE, HyperparamRecord,
    ImageClassification, InlineExecutor, Pipeline, PipelineRegistry, Task, TrainingLayout, TrainingResult,
};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use tempfile::TempDir;

pub const RED: [u8; 3] = [230, 10, 10];
pub const GREEN: [u8; 3] = [10, 230, 10];
pub const BLUE: [u8; 3] = [10, 10, 230];

/// Red-dominant pixels score `[2, 1]`, blue-dominant `[0, 3]`, anything else `[1, 1]`.
struct FixedModel;

impl ClassifierModel for FixedModel {
    fn num_classes(&self) -> usize {
        2
    }

    fn logits(&self, features: &[f32]) -> TrainingResult<Vec<f32>> {
        let (r, g, b) = (features[0], features[1], features[2]);
        Ok(if r > g && r > b {
            vec![2.0, 1.0]
        } else if b > r && b > g {
            vec![0.0, 3.0]
        } else {
            vec![1.0, 1.0]
        })
    }

    fn train_batch(&mut self, _batch: &[(&[f32], usize)], _lr: f32) -> TrainingResult<f32> {
        Ok(0.5)
    }

    fn save(&self, path: &Path) -> TrainingResult<()> {
        std::fs::write(path, b"fixed")?;
        Ok(())
    }
}

/// Counts checkpoint loads, i.e. predictor constructions.
#[derive(Default)]
pub struct FixedBackend {
    loads: AtomicUsize,
}

impl FixedBackend {
    pub fn loads(&self) -> usize {
        self.loads.load(Ordering::SeqCst)
    }
}

impl ClassifierBackend for FixedBackend {
    fn id(&self) -> &'static str {
        "fixed"
    }

    fn create(&self, _num_features: usize, _num_classes: usize, _seed: u64) -> Box<dyn ClassifierModel> {
        Box::new(FixedModel)
    }

    fn load(&self, _checkpoint: &Path) -> TrainingResult<Box<dyn ClassifierModel>> {
        self.loads.fetch_add(1, Ordering::SeqCst);
        Ok(Box::new(FixedModel))
    }
}

/// Holds submitted tasks until `release`, so a job stays `Running` in between.
#[derive(Default)]
pub struct GatedExecutor {
    tasks: Mutex<Vec<Task>>,
}

impl GatedExecutor {
    pub fn release(&self) {
        let tasks: Vec<Task> = std::mem::take(&mut *self.tasks.lock().unwrap());
        for task in tasks {
            task();
        }
    }
}

impl Executor for GatedExecutor {
    fn execute(&self, task: Task) -> TrainingResult<()> {
        self.tasks.lock().unwrap().push(task);
        Ok(())
    }
}

pub fn registry(backend: &Arc<FixedBackend>) -> Arc<PipelineRegistry> {
    let mut registry = PipelineRegistry::new();
    registry.register(Arc::new(ImageClassification::with_backend(backend.clone()))).unwrap();
    Arc::new(registry)
}

pub fn write_png(path: &Path, color: [u8; 3]) {
    RgbImage::from_pixel(4, 4, Rgb(color)).save(path).unwrap();
}

/// `1.png` red, `2.png` blue, `3.png` green: predicted cat, dog, cat.
pub fn inference_images(dir: &Path) {
    std::fs::create_dir_all(dir).unwrap();
    write_png(&dir.join("1.png"), RED);
    write_png(&dir.join("2.png"), BLUE);
    write_png(&dir.join("3.png"), GREEN);
}

/// A trained-looking weight entry for `Image_Classification` with classes cat and dog.
pub fn weight_entry(layout: &TrainingLayout, name: &str) -> PathBuf {
    let dir = layout.run_weights(PIPELINE_ID, name);
    std::fs::create_dir_all(&dir).unwrap();
    std::fs::write(dir.join(CHECKPOINT_FILE), b"fixed").unwrap();
    std::fs::write(dir.join(CLASS_MAP_FILE), "cat: 0\ndog: 1\n").unwrap();

    let argv: Vec<String> = ["/data/pets", "--length", "2", "--width", "2"].iter().map(|s| (*s).to_string()).collect();
    let model = ImageClassification::default().parse_model_args(&argv).unwrap();
    let record = HyperparamRecord {
        pipeline: PIPELINE_ID.to_string(),
        run_name: name.to_string(),
        input_dirpath: model.input_dirpath,
        model: model.flags,
        trainer: lumen_training::Flags::new(),
        created_at: chrono::Utc::now(),
    };
    record.write(&dir.join(HPARAMS_FILE)).unwrap();
    dir
}

/// Training data with `Class Map.txt` and red (cat) / blue (dog) splits.
pub fn training_data(root: &Path) {
    std::fs::create_dir_all(root).unwrap();
    std::fs::write(root.join(CLASS_MAP_FILE), "cat: 0\ndog: 1\n").unwrap();
    for split in ["train", "valid"] {
        for (class, color) in [("cat", RED), ("dog", BLUE)] {
            let dir = root.join(split).join(class);
            std::fs::create_dir_all(&dir).unwrap();
            for i in 0..2 {
                write_png(&dir.join(format!("{i}.png")), color);
            }
        }
    }
}

pub type UpdateLog = Arc<Mutex<Vec<(String, Vec<SignalValue>)>>>;

/// A controller wired to a registry where every event and update is registered.
pub struct Harness {
    pub temp: TempDir,
    pub signals: Arc<SignalRegistry>,
    pub log: UpdateLog,
    pub backend: Arc<FixedBackend>,
    pub controller: Controller,
}

impl Harness {
    pub fn new() -> Self {
        Self::with_executor(Arc::new(InlineExecutor))
    }

    pub fn with_executor(executor: Arc<dyn Executor>) -> Self {
        let temp = TempDir::new().unwrap();
        let mut config = Config::default();
        config.workspace = temp.path().join("workspace");
        config.set_reports_dir(temp.path().join("reports"));

        let signals = Arc::new(SignalRegistry::new());
        let log: UpdateLog = Arc::default();
        for &name in events::ALL {
            signals.register_event(name, EventSource::new()).unwrap();
        }
        for &name in updates::ALL {
            let log = Arc::clone(&log);
            signals
                .register_update(
                    name,
                    callback(move |args| log.lock().unwrap().push((name.to_string(), args.to_vec()))),
                )
                .unwrap();
        }

        let backend = Arc::new(FixedBackend::default());
        let controller = Controller::new(config, Arc::clone(&signals), registry(&backend), executor);
        assert_eq!(controller.connect_signals().unwrap(), events::ALL.len());
        Self { temp, signals, log, backend, controller }
    }

    pub fn layout(&self) -> TrainingLayout {
        TrainingLayout::new(self.controller.config().workspace.clone())
    }

    /// Fire an event and apply everything it queued.
    pub fn emit(&mut self, name: &str, args: &[SignalValue]) {
        self.signals.emit(name, args).unwrap();
        self.controller.process_pending();
    }

    pub fn updates(&self, name: &str) -> Vec<Vec<SignalValue>> {
        self.log.lock().unwrap().iter().filter(|(n, _)| n == name).map(|(_, args)| args.clone()).collect()
    }

    pub fn texts(&self, name: &str) -> Vec<String> {
        self.updates(name)
            .into_iter()
            .filter_map(|args| args.first().and_then(|v| v.as_text().map(str::to_string)))
            .collect()
    }

    pub fn last_text(&self, name: &str) -> Option<String> {
        self.texts(name).pop()
    }
}
