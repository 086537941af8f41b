//! Controller behavior driven through the signal registry.

mod common;

use common::{BLUE, GatedExecutor, Harness, inference_images, training_data, weight_entry, write_png};
use lumen_core::{CoreError, Message, NO_MODELS_FEEDBACK, SignalValue, events, updates};
use lumen_training::classification::PIPELINE_ID;
use lumen_training::{HPARAMS_FILE, JobPhase, TokioExecutor, WeightSelection};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

fn select(h: &mut Harness, index: usize, name: &str) {
    h.emit(events::WEIGHT_SELECTION, &[SignalValue::Weight(WeightSelection::new(PIPELINE_ID, index, name))]);
}

fn select_named(h: &mut Harness, name: &str) {
    let listed = h.controller.jobs().weights().list(PIPELINE_ID).unwrap();
    let index = listed.iter().position(|n| n == name).unwrap();
    select(h, index, name);
}

fn images(h: &Harness) -> PathBuf {
    let dir = h.temp.path().join("images");
    inference_images(&dir);
    dir
}

fn labels(h: &Harness) -> Vec<String> {
    h.controller.inference().predicted_labels().to_vec()
}

#[test]
fn test_recover_without_models() {
    let mut h = Harness::new();
    h.controller.recover_application_state().unwrap();

    assert_eq!(h.last_text(updates::WEIGHT_PANEL_FEEDBACK).as_deref(), Some(NO_MODELS_FEEDBACK));
    assert!(h.updates(updates::WEIGHT_LIST).is_empty());
}

#[test]
fn test_recover_lists_existing_weights() {
    let mut h = Harness::new();
    weight_entry(&h.layout(), "Exp");
    h.controller.recover_application_state().unwrap();

    assert_eq!(
        h.updates(updates::WEIGHT_LIST),
        vec![vec![SignalValue::Text(PIPELINE_ID.to_string()), SignalValue::Texts(vec!["Exp".to_string()])]]
    );
}

#[test]
fn test_inference_and_toggle() {
    let mut h = Harness::new();
    let entry = weight_entry(&h.layout(), "Exp");
    let dir = images(&h);

    select(&mut h, 0, "Exp");
    assert_eq!(h.controller.inference().checkpoint_path.as_ref(), Some(&entry));
    h.emit(events::INFERENCE_DIRPATH, &[SignalValue::Path(dir.clone())]);
    h.emit(events::INFERENCE_BUTTON, &[]);

    assert_eq!(labels(&h), vec!["cat", "dog", "cat"]);
    assert_eq!(
        h.updates(updates::LAUNCH_INFERENCE_DIALOG),
        vec![vec![SignalValue::Path(dir.join("1.png")), SignalValue::Text("cat".to_string()), SignalValue::Index(3)]]
    );
    assert_eq!(h.updates(updates::SLIDER_LENGTH), vec![vec![SignalValue::Index(3)]]);
    assert_eq!(h.last_text(updates::INFERENCE_FEEDBACK).as_deref(), Some(""));

    h.emit(events::TOGGLE_INFERENCE, &[SignalValue::Index(1)]);
    assert_eq!(
        h.updates(updates::TOGGLE_INFERENCE),
        vec![vec![SignalValue::Path(dir.join("2.png")), SignalValue::Text("dog".to_string())]]
    );
    assert_eq!(h.controller.inference().cursor(), 1);

    h.emit(events::TOGGLE_INFERENCE, &[SignalValue::Index(3)]);
    assert!(h.last_text(updates::INFERENCE_FEEDBACK).unwrap().starts_with("Error:"));
    assert_eq!(h.controller.inference().cursor(), 1);
}

#[test]
fn test_repeat_inference_uses_cache() {
    let mut h = Harness::new();
    weight_entry(&h.layout(), "Exp");
    let dir = images(&h);
    select(&mut h, 0, "Exp");
    h.emit(events::INFERENCE_DIRPATH, &[SignalValue::Path(dir.clone())]);

    h.emit(events::INFERENCE_BUTTON, &[]);
    h.emit(events::INFERENCE_BUTTON, &[]);
    assert_eq!(h.backend.loads(), 1);
    assert_eq!(labels(&h), vec!["cat", "dog", "cat"]);

    write_png(&dir.join("3.png"), BLUE);
    h.emit(events::INFERENCE_BUTTON, &[]);
    assert_eq!(h.backend.loads(), 2);
    assert_eq!(labels(&h), vec!["cat", "dog", "dog"]);
}

#[test]
fn test_inference_without_inputs() {
    let mut h = Harness::new();
    h.emit(events::INFERENCE_BUTTON, &[]);
    assert!(h.last_text(updates::INFERENCE_FEEDBACK).unwrap().starts_with("Error:"));
    assert!(h.updates(updates::LAUNCH_INFERENCE_DIALOG).is_empty());
}

#[test]
fn test_superseded_inference_result_is_dropped() {
    let mut h = Harness::new();
    weight_entry(&h.layout(), "Exp");
    let dir = images(&h);
    select(&mut h, 0, "Exp");
    h.emit(events::INFERENCE_DIRPATH, &[SignalValue::Path(dir)]);
    h.emit(events::INFERENCE_BUTTON, &[]);

    h.controller
        .sender()
        .send(Message::Inference { ticket: 0, result: Err(CoreError::MissingInputs("late".to_string())) })
        .unwrap();
    assert_eq!(h.controller.process_pending(), 1);
    assert_eq!(h.last_text(updates::INFERENCE_FEEDBACK).as_deref(), Some(""));
    assert_eq!(labels(&h), vec!["cat", "dog", "cat"]);
}

#[test]
fn test_stale_selection_is_rejected() {
    let mut h = Harness::new();
    weight_entry(&h.layout(), "A");
    weight_entry(&h.layout(), "B");

    let listed = h.controller.jobs().weights().list(PIPELINE_ID).unwrap();
    let index_of_a = listed.iter().position(|n| n == "A").unwrap();
    select(&mut h, index_of_a, "B");

    assert!(h.controller.inference().checkpoint_path.is_none());
    assert!(h.last_text(updates::WEIGHT_PANEL_FEEDBACK).unwrap().starts_with("Error:"));
}

#[test]
fn test_rename_selected_keeps_selection_and_cache() {
    let mut h = Harness::new();
    weight_entry(&h.layout(), "Exp");
    let dir = images(&h);
    select(&mut h, 0, "Exp");
    h.emit(events::INFERENCE_DIRPATH, &[SignalValue::Path(dir)]);
    h.emit(events::INFERENCE_BUTTON, &[]);

    h.emit(
        events::WEIGHT_SELECTION_RENAME,
        &[SignalValue::Weight(WeightSelection::new(PIPELINE_ID, 0, "Exp")), SignalValue::Text("Renamed".to_string())],
    );

    let renamed = h.layout().run_weights(PIPELINE_ID, "Renamed");
    assert_eq!(h.controller.inference().checkpoint_path.as_ref(), Some(&renamed));
    assert!(renamed.join(HPARAMS_FILE).is_file());
    assert_eq!(
        h.updates(updates::WEIGHT_LIST).last().unwrap(),
        &vec![SignalValue::Text(PIPELINE_ID.to_string()), SignalValue::Texts(vec!["Renamed".to_string()])]
    );

    h.emit(events::INFERENCE_BUTTON, &[]);
    assert_eq!(h.backend.loads(), 1);
}

#[test]
fn test_rename_to_taken_name_fails() {
    let mut h = Harness::new();
    weight_entry(&h.layout(), "A");
    weight_entry(&h.layout(), "B");
    let listed = h.controller.jobs().weights().list(PIPELINE_ID).unwrap();
    let index_of_a = listed.iter().position(|n| n == "A").unwrap();

    h.emit(
        events::WEIGHT_SELECTION_RENAME,
        &[SignalValue::Weight(WeightSelection::new(PIPELINE_ID, index_of_a, "A")), SignalValue::Text("B".to_string())],
    );
    assert!(h.last_text(updates::WEIGHT_PANEL_FEEDBACK).unwrap().starts_with("Error:"));
    assert!(h.layout().run_weights(PIPELINE_ID, "A").is_dir());
}

#[test]
fn test_delete_selected_clears_selection() {
    let mut h = Harness::new();
    weight_entry(&h.layout(), "Exp");
    let dir = images(&h);
    select(&mut h, 0, "Exp");
    h.emit(events::INFERENCE_DIRPATH, &[SignalValue::Path(dir)]);
    h.emit(events::INFERENCE_BUTTON, &[]);

    h.emit(events::WEIGHT_SELECTION_DELETION, &[SignalValue::Weight(WeightSelection::new(PIPELINE_ID, 0, "Exp"))]);
    assert!(!h.layout().run_weights(PIPELINE_ID, "Exp").exists());
    assert!(h.controller.inference().checkpoint_path.is_none());
    assert!(h.controller.inference().cache_key.is_none());
    assert_eq!(
        h.updates(updates::WEIGHT_LIST).last().unwrap(),
        &vec![SignalValue::Text(PIPELINE_ID.to_string()), SignalValue::Texts(vec![])]
    );

    h.emit(events::INFERENCE_BUTTON, &[]);
    assert!(h.last_text(updates::INFERENCE_FEEDBACK).unwrap().starts_with("Error:"));
}

#[test]
fn test_report_after_inference() {
    let mut h = Harness::new();
    weight_entry(&h.layout(), "Exp");
    let dir = images(&h);
    select(&mut h, 0, "Exp");
    h.emit(events::INFERENCE_DIRPATH, &[SignalValue::Path(dir)]);
    h.emit(events::INFERENCE_BUTTON, &[]);
    h.emit(events::REPORT_BUTTON, &[]);
    h.emit(events::REPORT_BUTTON, &[]);

    let reports = h.temp.path().join("reports");
    let text = std::fs::read_to_string(reports.join("Exp_Report.txt")).unwrap();
    assert!(text.starts_with("Experiment: Exp\nModel: Image_Classification\n"));
    assert!(text.contains("length: 2"));
    assert!(text.ends_with("1.png cat\n2.png dog\n3.png cat\n"));
    assert!(reports.join("Exp_Report (1).txt").is_file());
    assert!(h.last_text(updates::REPORT_FEEDBACK).unwrap().starts_with("Report Generated! Saved to "));
}

#[test]
fn test_report_describes_weights_that_produced_predictions() {
    let mut h = Harness::new();
    weight_entry(&h.layout(), "A");
    weight_entry(&h.layout(), "B");
    let dir = images(&h);
    select_named(&mut h, "A");
    h.emit(events::INFERENCE_DIRPATH, &[SignalValue::Path(dir)]);
    h.emit(events::INFERENCE_BUTTON, &[]);
    select_named(&mut h, "B");
    h.emit(events::REPORT_BUTTON, &[]);

    let reports = h.temp.path().join("reports");
    let text = std::fs::read_to_string(reports.join("A_Report.txt")).unwrap();
    assert!(text.starts_with("Experiment: A\n"));
    assert!(!reports.join("B_Report.txt").exists());
}

#[test]
fn test_report_without_selection() {
    let mut h = Harness::new();
    h.emit(events::REPORT_BUTTON, &[]);
    assert!(h.last_text(updates::REPORT_FEEDBACK).unwrap().starts_with("Error:"));
}

fn submit_training(h: &mut Harness, data: PathBuf, run_name: &str) {
    h.emit(events::TRAIN_DIRPATH, &[SignalValue::Path(data)]);
    h.emit(events::MODEL_HP, &[SignalValue::Text("--length 2 --width 2 --batch_size 2 --num_workers 1".to_string())]);
    h.emit(events::TRAINER_HP, &[SignalValue::Text("--max_epochs 2".to_string())]);
    h.emit(events::RUN_NAME, &[SignalValue::Text(run_name.to_string())]);
    h.emit(events::TRAIN_BUTTON, &[]);
}

#[test]
fn test_training_round_trip() {
    let mut h = Harness::new();
    let data = h.temp.path().join("data");
    training_data(&data);
    submit_training(&mut h, data.clone(), "Run 1");

    let feedback = h.texts(updates::TRAIN_FEEDBACK);
    assert_eq!(feedback.first().map(String::as_str), Some("Running Training Job: Run 1"));
    assert_eq!(feedback.iter().filter(|t| t.starts_with("Epoch ")).count(), 2);
    assert_eq!(feedback.last().map(String::as_str), Some("Training Job Finished! Saving Trained Model: Run 1"));
    assert_eq!(
        h.updates(updates::TRAIN_BUTTON),
        vec![vec![SignalValue::Flag(false)], vec![SignalValue::Flag(true)]]
    );
    assert!(h.controller.current_job().is_none());
    assert!(h.layout().run_weights(PIPELINE_ID, "Run 1").join(HPARAMS_FILE).is_file());
    assert_eq!(
        h.updates(updates::WEIGHT_LIST).last().unwrap(),
        &vec![SignalValue::Text(PIPELINE_ID.to_string()), SignalValue::Texts(vec!["Run 1".to_string()])]
    );

    // same pipeline, same name
    h.emit(events::TRAIN_BUTTON, &[]);
    assert!(h.last_text(updates::TRAIN_FEEDBACK).unwrap().starts_with("Error:"));
}

#[test]
fn test_training_without_data() {
    let mut h = Harness::new();
    h.emit(events::TRAIN_BUTTON, &[]);
    assert!(h.last_text(updates::TRAIN_FEEDBACK).unwrap().starts_with("Error:"));
    assert!(h.updates(updates::TRAIN_BUTTON).is_empty());
}

#[test]
fn test_training_failure_reenables_button() {
    let mut h = Harness::new();
    let data = h.temp.path().join("data");
    training_data(&data);
    std::fs::remove_dir_all(data.join("train/cat")).unwrap();
    std::fs::remove_dir_all(data.join("train/dog")).unwrap();
    submit_training(&mut h, data.clone(), "Empty");

    assert!(h.last_text(updates::TRAIN_FEEDBACK).unwrap().starts_with("Error: training job Empty failed"));
    assert_eq!(h.updates(updates::TRAIN_BUTTON).last().unwrap(), &vec![SignalValue::Flag(true)]);
    assert!(h.controller.current_job().is_none());

    // a failed run leaves no weight entry and its name stays free
    assert!(h.controller.jobs().weights().list(PIPELINE_ID).unwrap().is_empty());
    assert!(!h.layout().run_logs(PIPELINE_ID, "Empty").exists());

    training_data(&data);
    h.emit(events::TRAIN_BUTTON, &[]);
    assert_eq!(
        h.last_text(updates::TRAIN_FEEDBACK).as_deref(),
        Some("Training Job Finished! Saving Trained Model: Empty")
    );
    assert_eq!(h.controller.jobs().weights().list(PIPELINE_ID).unwrap(), vec!["Empty"]);
}

#[test]
fn test_train_while_job_running_is_rejected() {
    let gate = Arc::new(GatedExecutor::default());
    let mut h = Harness::with_executor(gate.clone());
    let data = h.temp.path().join("data");
    training_data(&data);
    submit_training(&mut h, data, "A");
    assert_eq!(h.last_text(updates::TRAIN_FEEDBACK).as_deref(), Some("Running Training Job: A"));

    h.emit(events::RUN_NAME, &[SignalValue::Text("B".to_string())]);
    h.emit(events::TRAIN_BUTTON, &[]);
    assert_eq!(
        h.last_text(updates::TRAIN_FEEDBACK).as_deref(),
        Some("Error: a training job is already running: A")
    );
    assert!(!h.layout().run_weights(PIPELINE_ID, "B").exists());
    assert!(!h.layout().run_logs(PIPELINE_ID, "B").exists());
    let job = h.controller.current_job().unwrap();
    assert_eq!(job.run_name(), "A");
    assert_eq!(job.phase(), JobPhase::Running);

    gate.release();
    h.controller.process_pending();
    assert_eq!(
        h.last_text(updates::TRAIN_FEEDBACK).as_deref(),
        Some("Training Job Finished! Saving Trained Model: A")
    );
    assert_eq!(h.controller.jobs().weights().list(PIPELINE_ID).unwrap(), vec!["A"]);

    // B is free once A is done
    h.emit(events::TRAIN_BUTTON, &[]);
    gate.release();
    h.controller.process_pending();
    assert_eq!(
        h.last_text(updates::TRAIN_FEEDBACK).as_deref(),
        Some("Training Job Finished! Saving Trained Model: B")
    );
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_background_training_and_inference() {
    let mut h = Harness::with_executor(Arc::new(TokioExecutor::current().unwrap()));
    let data = h.temp.path().join("data");
    training_data(&data);
    submit_training(&mut h, data, "Background");
    tokio::time::timeout(Duration::from_secs(60), h.controller.run_until_idle()).await.unwrap();

    assert_eq!(
        h.last_text(updates::TRAIN_FEEDBACK).as_deref(),
        Some("Training Job Finished! Saving Trained Model: Background")
    );

    let dir = images(&h);
    select(&mut h, 0, "Background");
    h.emit(events::INFERENCE_DIRPATH, &[SignalValue::Path(dir)]);
    h.emit(events::INFERENCE_BUTTON, &[]);
    tokio::time::timeout(Duration::from_secs(30), h.controller.run_until_idle()).await.unwrap();
    assert_eq!(labels(&h), vec!["cat", "dog", "cat"]);
}
