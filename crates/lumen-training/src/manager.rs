//! Training job lifecycle: submit, start on a worker, finalize into the weight database.

use crate::artifacts::HyperparamRecord;
use crate::error::{TrainingError, TrainingResult};
use crate::executor::Executor;
use crate::job::{JobHandle, JobPhase};
use crate::layout::{CHECKPOINT_FILE, HPARAMS_FILE, TrainingLayout, validate_run_name};
use crate::pipeline::{PipelineRegistry, RunSetup, split_args};
use crate::progress::{ProgressEvent, ProgressSink};
use crate::trainer::FitContext;
use crate::weights::{WeightDatabase, WeightEntry};
use chrono::Utc;
use std::panic::AssertUnwindSafe;
use std::path::PathBuf;
use std::sync::{Arc, Mutex, MutexGuard};

/// Everything needed to submit one training run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JobRequest {
    pub pipeline_id: String,
    pub run_name: String,
    pub data_path: PathBuf,
    /// Raw model flags, e.g. `--length 64 --lr 0.01`.
    pub model_args: String,
    /// Raw trainer flags, e.g. `--max_epochs 5`.
    pub trainer_args: String,
}

/// Owns the single active training slot for a workspace.
pub struct JobManager {
    layout: TrainingLayout,
    registry: Arc<PipelineRegistry>,
    executor: Arc<dyn Executor>,
    weights: WeightDatabase,
    active: Arc<Mutex<Option<JobHandle>>>,
}

impl std::fmt::Debug for JobManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("JobManager")
            .field("root", &self.layout.root())
            .field("registry", &self.registry)
            .field("active", &self.active())
            .finish_non_exhaustive()
    }
}

impl JobManager {
    #[must_use]
    pub fn new(layout: TrainingLayout, registry: Arc<PipelineRegistry>, executor: Arc<dyn Executor>) -> Self {
        let weights = WeightDatabase::new(layout.clone());
        Self { layout, registry, executor, weights, active: Arc::new(Mutex::new(None)) }
    }

    #[must_use]
    pub fn layout(&self) -> &TrainingLayout {
        &self.layout
    }

    #[must_use]
    pub fn registry(&self) -> &Arc<PipelineRegistry> {
        &self.registry
    }

    #[must_use]
    pub fn weights(&self) -> &WeightDatabase {
        &self.weights
    }

    /// The job currently holding the active slot, if it has not reached a terminal phase.
    #[must_use]
    pub fn active(&self) -> Option<JobHandle> {
        lock_slot(&self.active).as_ref().filter(|h| !h.phase().is_terminal()).cloned()
    }

    /// Validate, parse and construct a job. Nothing runs until [`JobManager::start`].
    pub fn submit(&self, request: &JobRequest) -> TrainingResult<JobHandle> {
        validate_run_name(&request.run_name)?;
        let pipeline = self.registry.get(&request.pipeline_id)?;

        if self.weights.contains(&request.pipeline_id, &request.run_name)? {
            return Err(TrainingError::DuplicateRunName {
                pipeline: request.pipeline_id.clone(),
                run_name: request.run_name.clone(),
            });
        }

        let mut model_argv = vec![request.data_path.to_string_lossy().into_owned()];
        model_argv.extend(split_args(&request.model_args)?);
        let model = pipeline.parse_model_args(&model_argv)?;
        let trainer = pipeline.parse_trainer_args(&split_args(&request.trainer_args)?)?;

        let (log_dir, weight_dir) = self.layout.allocate_run_dirs(&request.pipeline_id, &request.run_name)?;
        let record = HyperparamRecord {
            pipeline: request.pipeline_id.clone(),
            run_name: request.run_name.clone(),
            input_dirpath: model.input_dirpath,
            model: model.flags,
            trainer,
            created_at: Utc::now(),
        };

        let setup = RunSetup { record: &record, log_dir: &log_dir, weight_dir: &weight_dir };
        let trainable = match pipeline.build_trainable(&setup) {
            Ok(t) => t,
            Err(e) => {
                let _ = std::fs::remove_dir_all(&log_dir);
                let _ = std::fs::remove_dir_all(&weight_dir);
                return Err(e);
            }
        };

        let handle = JobHandle::new(
            request.pipeline_id.clone(),
            request.run_name.clone(),
            log_dir,
            weight_dir,
            trainable,
        );
        tracing::info!(
            job_id = %handle.id(),
            pipeline = %handle.pipeline_id(),
            run_name = %handle.run_name(),
            description = %handle.description(),
            "submitted training job"
        );
        Ok(handle)
    }

    /// Move the job to `Running` and fit it on the executor.
    ///
    /// `Started` is delivered before this returns; `Finished` or `Failed`
    /// follows from the worker once the phase has been updated.
    pub fn start(&self, handle: &JobHandle, sink: Arc<dyn ProgressSink>) -> TrainingResult<()> {
        let mut slot = lock_slot(&self.active);
        if let Some(current) = slot.as_ref()
            && !current.phase().is_terminal()
        {
            let err = TrainingError::JobAlreadyActive(current.run_name().to_string());
            if !current.is_same(handle) && handle.phase() == JobPhase::Created {
                handle.set_phase(JobPhase::Cancelled);
                discard_run_dirs(handle);
            }
            return Err(err);
        }
        if handle.phase() != JobPhase::Created {
            return Err(TrainingError::InvalidPhase {
                job_id: handle.id().to_string(),
                action: "start",
                phase: handle.phase().to_string(),
            });
        }
        let trainer = handle.take_trainer()?;
        handle.set_phase(JobPhase::Running);
        *slot = Some(handle.clone());
        drop(slot);

        sink.on_event(ProgressEvent::Started {
            job_id: handle.id().clone(),
            run_name: handle.run_name().to_string(),
        });

        let job = handle.clone();
        let events = Arc::clone(&sink);
        let active = Arc::clone(&self.active);
        let task = Box::new(move || {
            let mut trainer = trainer;
            let ctx = FitContext {
                job_id: job.id(),
                log_dir: job.log_dir(),
                weight_dir: job.weight_dir(),
                progress: events.as_ref(),
                cancel: job.cancel_token(),
            };
            let outcome = std::panic::catch_unwind(AssertUnwindSafe(|| trainer.fit(&ctx)))
                .unwrap_or_else(|_| Err(TrainingError::Trainer("trainer panicked".to_string())));
            complete(&job, &active, events.as_ref(), outcome.map(|_| ()));
        });

        if let Err(e) = self.executor.execute(task) {
            discard_run_dirs(handle);
            handle.set_phase(JobPhase::Failed(e.to_string()));
            clear_slot(&self.active, handle);
            return Err(e);
        }
        Ok(())
    }

    /// Copy the run's hyperparameter record next to its checkpoint.
    pub fn finalize(&self, handle: &JobHandle) -> TrainingResult<WeightEntry> {
        if handle.phase() != JobPhase::Finished {
            return Err(TrainingError::InvalidPhase {
                job_id: handle.id().to_string(),
                action: "finalize",
                phase: handle.phase().to_string(),
            });
        }

        let source = handle.log_dir().join(HPARAMS_FILE);
        if !source.is_file() {
            return Err(TrainingError::MissingArtifact(source));
        }
        let checkpoint = handle.weight_dir().join(CHECKPOINT_FILE);
        if !checkpoint.is_file() {
            return Err(TrainingError::MissingArtifact(checkpoint));
        }
        std::fs::copy(&source, handle.weight_dir().join(HPARAMS_FILE))?;
        clear_slot(&self.active, handle);

        tracing::info!(job_id = %handle.id(), run_name = %handle.run_name(), "finalized weights");
        self.weights.entry(handle.pipeline_id(), handle.run_name())
    }

    /// Ask a job to stop. A job that never started is cancelled immediately
    /// and its run directories are removed.
    pub fn cancel(&self, handle: &JobHandle) {
        handle.cancel();
        if handle.phase() == JobPhase::Created {
            handle.set_phase(JobPhase::Cancelled);
            discard_run_dirs(handle);
        }
        tracing::info!(job_id = %handle.id(), "cancellation requested");
    }

    /// Remove the run directories of a job that will not be finalized,
    /// freeing its run name. The active job is never touched.
    pub fn discard(&self, handle: &JobHandle) -> TrainingResult<()> {
        if self.active().is_some_and(|active| active.is_same(handle)) {
            return Err(TrainingError::InvalidPhase {
                job_id: handle.id().to_string(),
                action: "discard",
                phase: handle.phase().to_string(),
            });
        }
        clear_slot(&self.active, handle);
        discard_run_dirs(handle);
        Ok(())
    }
}

fn complete(
    job: &JobHandle,
    active: &Mutex<Option<JobHandle>>,
    sink: &dyn ProgressSink,
    outcome: TrainingResult<()>,
) {
    let job_id = job.id().clone();
    let run_name = job.run_name().to_string();
    match outcome {
        Ok(()) => {
            job.set_phase(JobPhase::Finished);
            sink.on_event(ProgressEvent::Finished { job_id, run_name });
        }
        Err(e) => {
            discard_run_dirs(job);
            job.set_phase(if matches!(e, TrainingError::Cancelled) {
                JobPhase::Cancelled
            } else {
                JobPhase::Failed(e.to_string())
            });
            clear_slot(active, job);
            sink.on_event(ProgressEvent::Failed { job_id, run_name, error: e.to_string() });
        }
    }
}

/// A run that never produced finalized weights leaves nothing behind, so its
/// name is free for the next submission.
fn discard_run_dirs(job: &JobHandle) {
    for dir in [job.log_dir(), job.weight_dir()] {
        match std::fs::remove_dir_all(dir) {
            Ok(()) => {}
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => {
                tracing::warn!(job_id = %job.id(), dir = %dir.display(), error = %e, "failed to remove run directory");
            }
        }
    }
    tracing::debug!(job_id = %job.id(), run_name = %job.run_name(), "discarded run directories");
}

fn lock_slot(slot: &Mutex<Option<JobHandle>>) -> MutexGuard<'_, Option<JobHandle>> {
    slot.lock().unwrap_or_else(std::sync::PoisonError::into_inner)
}

fn clear_slot(slot: &Mutex<Option<JobHandle>>, handle: &JobHandle) {
    let mut slot = lock_slot(slot);
    if slot.as_ref().is_some_and(|h| h.is_same(handle)) {
        *slot = None;
    }
}
