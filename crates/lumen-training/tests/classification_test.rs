//! End-to-end run of the built-in classification pipeline on synthetic images.

use image::{Rgb, RgbImage};
use lumen_training::classification::{PIPELINE_ID, data::list_files};
use lumen_training::{
    CHECKPOINT_FILE, CLASS_MAP_FILE, HPARAMS_FILE, InlineExecutor, JobManager, JobPhase, JobRequest, METRICS_FILE,
    PipelineRegistry, ProgressEvent, RecordingProgressSink, TrainingLayout,
};
use std::path::Path;
use std::sync::Arc;
use tempfile::TempDir;

const RED: [u8; 3] = [230, 10, 10];
const BLUE: [u8; 3] = [10, 10, 230];

fn write_split(root: &Path, split: &str) {
    for (class, color) in [("red", RED), ("blue", BLUE)] {
        let dir = root.join(split).join(class);
        std::fs::create_dir_all(&dir).unwrap();
        for i in 0..3 {
            RgbImage::from_pixel(8, 8, Rgb(color)).save(dir.join(format!("{i}.png"))).unwrap();
        }
    }
}

fn dataset(root: &Path) {
    std::fs::create_dir_all(root).unwrap();
    std::fs::write(root.join(CLASS_MAP_FILE), "red: 0\nblue: 1\n").unwrap();
    write_split(root, "train");
    write_split(root, "valid");
}

#[test]
fn test_train_then_predict() {
    let temp = TempDir::new().unwrap();
    let data = temp.path().join("data");
    dataset(&data);

    let registry = Arc::new(PipelineRegistry::with_defaults());
    let manager = JobManager::new(
        TrainingLayout::new(temp.path().join("workspace")),
        Arc::clone(&registry),
        Arc::new(InlineExecutor),
    );
    let sink = Arc::new(RecordingProgressSink::default());

    let job = manager
        .submit(&JobRequest {
            pipeline_id: PIPELINE_ID.to_string(),
            run_name: "Experiment 1".to_string(),
            data_path: data.clone(),
            model_args: "--length 4 --width 4 --batch_size 4 --num_workers 2 --lr 0.1".to_string(),
            trainer_args: "--max_epochs 5".to_string(),
        })
        .unwrap();
    manager.start(&job, sink.clone()).unwrap();
    assert_eq!(job.phase(), JobPhase::Finished, "events: {:?}", sink.events());

    let epochs = sink.events().iter().filter(|e| matches!(e, ProgressEvent::Epoch { .. })).count();
    assert_eq!(epochs, 5);
    let metrics = std::fs::read_to_string(job.log_dir().join(METRICS_FILE)).unwrap();
    assert_eq!(metrics.lines().count(), 5);

    let entry = manager.finalize(&job).unwrap();
    for file in [CHECKPOINT_FILE, HPARAMS_FILE, CLASS_MAP_FILE] {
        assert!(entry.dir.join(file).is_file(), "missing {file}");
    }

    let record = entry.hyperparams().unwrap();
    assert_eq!(record.input_dirpath, data);
    assert_eq!(record.model.get("length"), Some(&serde_json::json!(4)));

    let pipeline = registry.get(PIPELINE_ID).unwrap();
    let predictor = pipeline.build_inference(&entry.dir, &record).unwrap();
    let images = list_files(&data.join("valid/red")).unwrap();
    let labels = predictor.predict(&images).unwrap();
    assert_eq!(labels, vec!["red"; images.len()]);

    let images = list_files(&data.join("valid/blue")).unwrap();
    let labels = predictor.predict(&images).unwrap();
    assert_eq!(labels, vec!["blue"; images.len()]);
}

#[test]
fn test_submit_without_class_map_fails() {
    let temp = TempDir::new().unwrap();
    let data = temp.path().join("data");
    write_split(&data, "train");
    write_split(&data, "valid");

    let manager = JobManager::new(
        TrainingLayout::new(temp.path().join("workspace")),
        Arc::new(PipelineRegistry::with_defaults()),
        Arc::new(InlineExecutor),
    );
    let err = manager
        .submit(&JobRequest {
            pipeline_id: PIPELINE_ID.to_string(),
            run_name: "r".to_string(),
            data_path: data,
            model_args: String::new(),
            trainer_args: String::new(),
        })
        .unwrap_err();
    assert!(err.to_string().contains("class map"));
    assert!(!manager.layout().run_weights(PIPELINE_ID, "r").exists());
}

#[test]
fn test_inference_without_checkpoint() {
    let temp = TempDir::new().unwrap();
    let registry = PipelineRegistry::with_defaults();
    let pipeline = registry.get(PIPELINE_ID).unwrap();
    let record = lumen_training::HyperparamRecord {
        pipeline: PIPELINE_ID.to_string(),
        run_name: "r".to_string(),
        input_dirpath: temp.path().to_path_buf(),
        model: pipeline.parse_model_args(&["/data".to_string()]).unwrap().flags,
        trainer: lumen_training::Flags::new(),
        created_at: chrono::Utc::now(),
    };
    let err = pipeline.build_inference(temp.path(), &record).err().unwrap();
    assert!(matches!(err, lumen_training::TrainingError::MissingCheckpoint(_)));
}
