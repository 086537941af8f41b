//! Session controller: owns the state, reacts to signals, pushes updates.
//!
//! Every state write happens on the thread that drains the message queue.
//! Training progress and inference results arrive on the same queue from
//! worker threads, so they are applied in order with user commands.

use crate::cache::{CachedPredictions, InferenceOutcome, InferenceRequest, InferenceRunner};
use crate::config::Config;
use crate::error::{CoreError, CoreResult};
use crate::signals::{SignalRegistry, SignalValue, callback, events, updates};
use crate::state::{InferenceState, TrainingState};
use crate::{dashboard, report, weights};
use lumen_training::{
    Executor, HPARAMS_FILE, HyperparamRecord, JobHandle, JobManager, JobRequest, PipelineRegistry, ProgressEvent,
    ProgressSink, TrainingError, TrainingLayout, WeightSelection,
};
use std::path::PathBuf;
use std::sync::Arc;
use tokio::sync::mpsc::{self, UnboundedReceiver, UnboundedSender};

pub const NO_MODELS_FEEDBACK: &str = "No models trained yet! Visit Model Training to train your first model.";

/// A user action, decoded from an event payload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    SetTrainingData(PathBuf),
    SetTrainingPipeline(String),
    SetModelArgs(String),
    SetTrainerArgs(String),
    SetRunName(String),
    Train,
    Cancel,
    LaunchDashboard,
    SetInferenceData(PathBuf),
    SelectWeights(WeightSelection),
    RunInference,
    ToggleInference(usize),
    Report,
    RenameWeights { selection: WeightSelection, new_name: String },
    DeleteWeights(WeightSelection),
    RefreshWeights,
}

impl Command {
    /// Decode the payload of the event registered under `name`.
    pub fn from_signal(name: &str, args: &[SignalValue]) -> CoreResult<Self> {
        let bad = |expected: &'static str| CoreError::BadPayload { name: name.to_string(), expected };
        let text = |i: usize| args.get(i).and_then(SignalValue::as_text).map(str::to_string);
        let path = |i: usize| match args.get(i) {
            Some(SignalValue::Path(p)) => Some(p.clone()),
            Some(SignalValue::Text(t)) => Some(PathBuf::from(t)),
            _ => None,
        };
        let weight = |i: usize| args.get(i).and_then(SignalValue::as_weight).cloned();

        Ok(match name {
            events::TRAIN_DIRPATH => Self::SetTrainingData(path(0).ok_or_else(|| bad("a path"))?),
            events::TRAIN_PIPELINE => Self::SetTrainingPipeline(text(0).ok_or_else(|| bad("a pipeline id"))?),
            events::MODEL_HP => Self::SetModelArgs(text(0).ok_or_else(|| bad("text"))?),
            events::TRAINER_HP => Self::SetTrainerArgs(text(0).ok_or_else(|| bad("text"))?),
            events::RUN_NAME => Self::SetRunName(text(0).ok_or_else(|| bad("text"))?),
            events::TRAIN_BUTTON => Self::Train,
            events::CANCEL_BUTTON => Self::Cancel,
            events::DASH_BUTTON => Self::LaunchDashboard,
            events::INFERENCE_DIRPATH => Self::SetInferenceData(path(0).ok_or_else(|| bad("a path"))?),
            events::WEIGHT_SELECTION => Self::SelectWeights(weight(0).ok_or_else(|| bad("a weight selection"))?),
            events::INFERENCE_BUTTON => Self::RunInference,
            events::TOGGLE_INFERENCE => {
                Self::ToggleInference(args.first().and_then(SignalValue::as_index).ok_or_else(|| bad("an index"))?)
            }
            events::REPORT_BUTTON => Self::Report,
            events::WEIGHT_SELECTION_RENAME => Self::RenameWeights {
                selection: weight(0).ok_or_else(|| bad("a weight selection and a new name"))?,
                new_name: text(1).ok_or_else(|| bad("a weight selection and a new name"))?,
            },
            events::WEIGHT_SELECTION_DELETION => {
                Self::DeleteWeights(weight(0).ok_or_else(|| bad("a weight selection"))?)
            }
            events::REFRESH_WEIGHTS => Self::RefreshWeights,
            other => return Err(CoreError::UnknownKey(other.to_string())),
        })
    }
}

/// Queue entries drained by the controller.
#[derive(Debug)]
pub enum Message {
    Command(Command),
    Training(ProgressEvent),
    Inference { ticket: u64, result: CoreResult<InferenceOutcome> },
}

/// Forwards training progress into the controller queue.
struct QueueProgressSink {
    tx: UnboundedSender<Message>,
}

impl ProgressSink for QueueProgressSink {
    fn on_event(&self, event: ProgressEvent) {
        let _ = self.tx.send(Message::Training(event));
    }
}

pub struct Controller {
    config: Config,
    signals: Arc<SignalRegistry>,
    training: TrainingState,
    inference: InferenceState,
    jobs: JobManager,
    runner: InferenceRunner,
    executor: Arc<dyn Executor>,
    tx: UnboundedSender<Message>,
    rx: UnboundedReceiver<Message>,
    job: Option<JobHandle>,
    inference_ticket: u64,
    inference_pending: bool,
}

impl Controller {
    #[must_use]
    pub fn new(
        config: Config,
        signals: Arc<SignalRegistry>,
        registry: Arc<PipelineRegistry>,
        executor: Arc<dyn Executor>,
    ) -> Self {
        let layout = TrainingLayout::new(config.workspace.clone());
        let jobs = JobManager::new(layout.clone(), Arc::clone(&registry), Arc::clone(&executor));
        let runner = InferenceRunner::new(registry, layout, config.fingerprint);
        let (tx, rx) = mpsc::unbounded_channel();
        Self {
            training: TrainingState::from_config(&config),
            inference: InferenceState::from_config(&config),
            config,
            signals,
            jobs,
            runner,
            executor,
            tx,
            rx,
            job: None,
            inference_ticket: 0,
            inference_pending: false,
        }
    }

    #[must_use]
    pub fn config(&self) -> &Config {
        &self.config
    }

    #[must_use]
    pub fn training(&self) -> &TrainingState {
        &self.training
    }

    #[must_use]
    pub fn inference(&self) -> &InferenceState {
        &self.inference
    }

    #[must_use]
    pub fn jobs(&self) -> &JobManager {
        &self.jobs
    }

    #[must_use]
    pub fn current_job(&self) -> Option<&JobHandle> {
        self.job.as_ref()
    }

    /// Sender for enqueuing commands from outside the signal registry.
    #[must_use]
    pub fn sender(&self) -> UnboundedSender<Message> {
        self.tx.clone()
    }

    /// True while a training job or an inference pass has results outstanding.
    #[must_use]
    pub fn is_busy(&self) -> bool {
        self.job.is_some() || self.inference_pending
    }

    /// Bind every known event name that the presentation layer registered.
    ///
    /// Names the presentation layer did not register are skipped.
    pub fn connect_signals(&self) -> CoreResult<usize> {
        let mut connected = 0;
        for &name in events::ALL {
            let tx = self.tx.clone();
            let result = self.signals.dispatch(
                name,
                callback(move |args| match Command::from_signal(name, args) {
                    Ok(command) => {
                        let _ = tx.send(Message::Command(command));
                    }
                    Err(e) => tracing::warn!(signal = name, error = %e, "ignoring malformed event"),
                }),
            );
            match result {
                Ok(()) => connected += 1,
                Err(CoreError::UnknownKey(_)) => tracing::debug!(signal = name, "event not registered"),
                Err(e) => return Err(e),
            }
        }
        Ok(connected)
    }

    /// Startup feedback and weight lists.
    pub fn recover_application_state(&mut self) -> CoreResult<()> {
        if self.inference.checkpoint_path.is_none() {
            self.push(updates::WEIGHT_PANEL_FEEDBACK, &[SignalValue::Text(NO_MODELS_FEEDBACK.to_string())]);
        }
        self.refresh_weights()
    }

    /// Apply every queued message without blocking. Returns how many were handled.
    pub fn process_pending(&mut self) -> usize {
        let mut handled = 0;
        while let Ok(message) = self.rx.try_recv() {
            self.handle(message);
            handled += 1;
        }
        handled
    }

    /// Wait for and apply one message.
    pub async fn next_message(&mut self) -> bool {
        match self.rx.recv().await {
            Some(message) => {
                self.handle(message);
                true
            }
            None => false,
        }
    }

    /// Drain the queue until no job or inference pass is outstanding.
    pub async fn run_until_idle(&mut self) {
        loop {
            self.process_pending();
            if !self.is_busy() {
                break;
            }
            if !self.next_message().await {
                break;
            }
        }
    }

    pub fn handle(&mut self, message: Message) {
        match message {
            Message::Command(command) => {
                let _ = self.execute(command);
            }
            Message::Training(event) => self.on_training_event(event),
            Message::Inference { ticket, result } => self.on_inference_result(ticket, result),
        }
    }

    /// Run one command. Failures are pushed to the matching feedback view and returned.
    pub fn execute(&mut self, command: Command) -> CoreResult<()> {
        let feedback = feedback_view(&command);
        let result = self.apply(command);
        if let Err(e) = &result {
            tracing::warn!(error = %e, "command failed");
            if let Some(view) = feedback {
                self.push(view, &[SignalValue::Text(format!("Error: {e}"))]);
            }
        }
        result
    }

    fn apply(&mut self, command: Command) -> CoreResult<()> {
        match command {
            Command::SetTrainingData(path) => self.training.data_path = Some(path),
            Command::SetTrainingPipeline(id) => self.training.pipeline_id = id,
            Command::SetModelArgs(text) => self.training.model_args = text,
            Command::SetTrainerArgs(text) => self.training.trainer_args = text,
            Command::SetRunName(text) => self.training.run_name = text,
            Command::Train => self.start_training()?,
            Command::Cancel => {
                if let Some(job) = &self.job {
                    self.jobs.cancel(job);
                }
            }
            Command::LaunchDashboard => {
                let log_root = self.jobs.layout().pipeline_logs(&self.training.pipeline_id);
                dashboard::launch_metrics_dashboard(&self.config.dashboard, &log_root)?;
            }
            Command::SetInferenceData(path) => self.inference.data_path = Some(path),
            Command::SelectWeights(selection) => self.select_weights(&selection)?,
            Command::RunInference => self.start_inference()?,
            Command::ToggleInference(index) => self.toggle_inference(index)?,
            Command::Report => self.generate_report()?,
            Command::RenameWeights { selection, new_name } => {
                weights::rename_weight(self.jobs.weights(), &mut self.inference, &selection, &new_name)?;
                self.push(
                    updates::WEIGHT_PANEL_FEEDBACK,
                    &[SignalValue::Text(format!("Renamed {} to {new_name}", selection.name))],
                );
                self.refresh_weights()?;
            }
            Command::DeleteWeights(selection) => {
                weights::delete_weight(self.jobs.weights(), &mut self.inference, &selection)?;
                self.push(updates::WEIGHT_PANEL_FEEDBACK, &[SignalValue::Text(format!("Deleted {}", selection.name))]);
                self.refresh_weights()?;
            }
            Command::RefreshWeights => self.refresh_weights()?,
        }
        Ok(())
    }

    fn start_training(&mut self) -> CoreResult<()> {
        if !self.training.inputs_received() {
            return Err(CoreError::MissingInputs("training data and a run name".to_string()));
        }
        let request = JobRequest {
            pipeline_id: self.training.pipeline_id.clone(),
            run_name: self.training.run_name.clone(),
            data_path: self.training.data_path.clone().unwrap_or_default(),
            model_args: self.training.model_args.clone(),
            trainer_args: self.training.trainer_args.clone(),
        };
        if let Some(active) = self.jobs.active() {
            return Err(TrainingError::JobAlreadyActive(active.run_name().to_string()).into());
        }
        let handle = self.jobs.submit(&request)?;
        let sink = Arc::new(QueueProgressSink { tx: self.tx.clone() });
        self.jobs.start(&handle, sink)?;
        self.job = Some(handle);
        Ok(())
    }

    fn on_training_event(&mut self, event: ProgressEvent) {
        let Some(job) = self.job.clone() else {
            tracing::debug!(job_id = %event.job_id(), "progress for unknown job");
            return;
        };
        if job.id() != event.job_id() {
            tracing::debug!(job_id = %event.job_id(), "progress for stale job");
            return;
        }

        match event {
            ProgressEvent::Started { run_name, .. } => {
                self.push(updates::TRAIN_FEEDBACK, &[SignalValue::Text(format!("Running Training Job: {run_name}"))]);
                self.push(updates::TRAIN_BUTTON, &[SignalValue::Flag(false)]);
            }
            ProgressEvent::Message { message, .. } => {
                self.push(updates::TRAIN_FEEDBACK, &[SignalValue::Text(message)]);
            }
            ProgressEvent::Epoch { epoch, total, train_loss, val_acc, .. } => {
                let text = format!("Epoch {epoch}/{total}: train_loss {train_loss:.4}, val_acc {val_acc:.4}");
                self.push(updates::TRAIN_FEEDBACK, &[SignalValue::Text(text)]);
            }
            ProgressEvent::Finished { run_name, .. } => {
                self.job = None;
                let text = match self.jobs.finalize(&job) {
                    Ok(_) => format!("Training Job Finished! Saving Trained Model: {run_name}"),
                    Err(e) => {
                        if let Err(discard) = self.jobs.discard(&job) {
                            tracing::warn!(run_name = %run_name, error = %discard, "failed to discard unsaved run");
                        }
                        format!("Error: training finished but {run_name} could not be saved: {e}")
                    }
                };
                self.push(updates::TRAIN_FEEDBACK, &[SignalValue::Text(text)]);
                self.push(updates::TRAIN_BUTTON, &[SignalValue::Flag(true)]);
                if let Err(e) = self.refresh_weights() {
                    tracing::warn!(error = %e, "failed to refresh weights");
                }
            }
            ProgressEvent::Failed { run_name, error, .. } => {
                self.job = None;
                self.push(
                    updates::TRAIN_FEEDBACK,
                    &[SignalValue::Text(format!("Error: training job {run_name} failed: {error}"))],
                );
                self.push(updates::TRAIN_BUTTON, &[SignalValue::Flag(true)]);
            }
        }
    }

    fn select_weights(&mut self, selection: &WeightSelection) -> CoreResult<()> {
        let dir = self.jobs.weights().resolve(selection)?;
        self.inference.pipeline_id.clone_from(&selection.pipeline_id);
        self.inference.checkpoint_path = Some(dir);
        self.push(
            updates::WEIGHT_PANEL_FEEDBACK,
            &[SignalValue::Text(format!("Selected {}: {}", selection.pipeline_id, selection.name))],
        );
        Ok(())
    }

    fn start_inference(&mut self) -> CoreResult<()> {
        let request = InferenceRequest::from_state(&self.inference)
            .ok_or_else(|| CoreError::MissingInputs("an image directory and a trained model".to_string()))?;
        let cached = CachedPredictions::from_state(&self.inference);

        self.inference_ticket += 1;
        let ticket = self.inference_ticket;
        let runner = self.runner.clone();
        let tx = self.tx.clone();
        self.executor.execute(Box::new(move || {
            let result = runner.run(&request, cached.as_ref());
            let _ = tx.send(Message::Inference { ticket, result });
        }))?;
        self.inference_pending = true;
        self.push(updates::INFERENCE_FEEDBACK, &[SignalValue::Text("Running inference...".to_string())]);
        Ok(())
    }

    fn on_inference_result(&mut self, ticket: u64, result: CoreResult<InferenceOutcome>) {
        if ticket != self.inference_ticket {
            tracing::debug!(ticket, latest = self.inference_ticket, "discarding superseded inference result");
            return;
        }
        self.inference_pending = false;

        let outcome = match result {
            Ok(outcome) => outcome,
            Err(e) => {
                self.push(updates::INFERENCE_FEEDBACK, &[SignalValue::Text(format!("Error: {e}"))]);
                return;
            }
        };
        let still_selected = self.inference.checkpoint_path.as_ref() == Some(&outcome.request.checkpoint_path)
            && self.inference.data_path.as_ref() == Some(&outcome.request.data_path)
            && self.inference.pipeline_id == outcome.request.pipeline_id;
        if !still_selected {
            tracing::debug!(ticket, "discarding inference result for a changed selection");
            self.push(updates::INFERENCE_FEEDBACK, &[SignalValue::Text(String::new())]);
            return;
        }

        if let Err(e) = outcome.apply(&mut self.inference) {
            self.push(updates::INFERENCE_FEEDBACK, &[SignalValue::Text(format!("Error: {e}"))]);
            return;
        }
        let len = self.inference.len();
        if let Some((image, label)) = self.inference.current() {
            let args = [SignalValue::Path(image.clone()), SignalValue::Text(label.to_string()), SignalValue::Index(len)];
            self.push(updates::LAUNCH_INFERENCE_DIALOG, &args);
        }
        self.push(updates::SLIDER_LENGTH, &[SignalValue::Index(len)]);
        self.push(updates::INFERENCE_FEEDBACK, &[SignalValue::Text(String::new())]);
    }

    fn toggle_inference(&mut self, index: usize) -> CoreResult<()> {
        let (image, label) = self.inference.seek(index)?;
        let args = [SignalValue::Path(image.clone()), SignalValue::Text(label.to_string())];
        self.push(updates::TOGGLE_INFERENCE, &args);
        Ok(())
    }

    /// Describe the weights the held predictions came from, falling back to the
    /// current selection before any inference has run.
    fn generate_report(&mut self) -> CoreResult<()> {
        let checkpoint = if self.inference.is_empty() {
            self.inference.checkpoint_path.clone()
        } else {
            self.inference.cache_checkpoint.clone()
        }
        .ok_or_else(|| CoreError::MissingInputs("a selected trained model".to_string()))?;
        let record = HyperparamRecord::read(&checkpoint.join(HPARAMS_FILE))?;
        let name = checkpoint
            .file_name()
            .map_or_else(|| record.run_name.clone(), |n| n.to_string_lossy().into_owned());
        let log_dir = self.jobs.layout().run_logs(&record.pipeline, &record.run_name);
        let path = report::write_report(&self.config.reports_dir(), &name, &record, &log_dir, &self.inference)?;
        self.push(
            updates::REPORT_FEEDBACK,
            &[SignalValue::Text(format!("Report Generated! Saved to {}", path.display()))],
        );
        Ok(())
    }

    /// Push `(pipeline, names)` for every pipeline weight root.
    pub fn refresh_weights(&self) -> CoreResult<()> {
        for (pipeline, names) in weights::list_all(self.jobs.weights())? {
            self.push(updates::WEIGHT_LIST, &[SignalValue::Text(pipeline), SignalValue::Texts(names)]);
        }
        Ok(())
    }

    fn push(&self, name: &str, args: &[SignalValue]) {
        if let Err(e) = self.signals.notify(name, args) {
            tracing::debug!(update = name, error = %e, "update not delivered");
        }
    }
}

/// Which view shows a command's errors.
fn feedback_view(command: &Command) -> Option<&'static str> {
    match command {
        Command::Train | Command::Cancel | Command::LaunchDashboard => Some(updates::TRAIN_FEEDBACK),
        Command::RunInference | Command::ToggleInference(_) => Some(updates::INFERENCE_FEEDBACK),
        Command::SelectWeights(_)
        | Command::RenameWeights { .. }
        | Command::DeleteWeights(_)
        | Command::RefreshWeights => Some(updates::WEIGHT_PANEL_FEEDBACK),
        Command::Report => Some(updates::REPORT_FEEDBACK),
        Command::SetTrainingData(_)
        | Command::SetTrainingPipeline(_)
        | Command::SetModelArgs(_)
        | Command::SetTrainerArgs(_)
        | Command::SetRunName(_)
        | Command::SetInferenceData(_) => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_decode_payloads() {
        let sel = WeightSelection::new("p", 0, "a");
        assert_eq!(
            Command::from_signal(events::TRAIN_DIRPATH, &[SignalValue::Text("/d".into())]).unwrap(),
            Command::SetTrainingData(PathBuf::from("/d"))
        );
        assert_eq!(
            Command::from_signal(
                events::WEIGHT_SELECTION_RENAME,
                &[SignalValue::Weight(sel.clone()), SignalValue::Text("b".into())]
            )
            .unwrap(),
            Command::RenameWeights { selection: sel, new_name: "b".into() }
        );
        assert_eq!(Command::from_signal(events::TRAIN_BUTTON, &[]).unwrap(), Command::Train);
    }

    #[test]
    fn test_decode_rejects_wrong_shape() {
        let err = Command::from_signal(events::TOGGLE_INFERENCE, &[SignalValue::Text("1".into())]).unwrap_err();
        assert!(matches!(err, CoreError::BadPayload { .. }));
        let err = Command::from_signal("nope", &[]).unwrap_err();
        assert!(matches!(err, CoreError::UnknownKey(_)));
    }
}
