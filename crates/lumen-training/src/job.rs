use crate::error::{TrainingError, TrainingResult};
use crate::trainer::{CancelToken, Trainer};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use tokio::sync::watch;
use uuid::Uuid;

/// Identifier for a training job.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TrainingJobId(pub String);

impl TrainingJobId {
    #[must_use]
    pub fn new() -> Self {
        Self(Uuid::new_v4().to_string())
    }
}

impl Default for TrainingJobId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for TrainingJobId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        self.0.fmt(f)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "phase", content = "error", rename_all = "snake_case")]
pub enum JobPhase {
    Created,
    Running,
    Finished,
    Failed(String),
    Cancelled,
}

impl JobPhase {
    #[must_use]
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Finished | Self::Failed(_) | Self::Cancelled)
    }
}

impl std::fmt::Display for JobPhase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Created => f.write_str("created"),
            Self::Running => f.write_str("running"),
            Self::Finished => f.write_str("finished"),
            Self::Failed(e) => write!(f, "failed ({e})"),
            Self::Cancelled => f.write_str("cancelled"),
        }
    }
}

struct JobInner {
    id: TrainingJobId,
    pipeline_id: String,
    run_name: String,
    log_dir: PathBuf,
    weight_dir: PathBuf,
    description: String,
    trainer: Mutex<Option<Box<dyn Trainer>>>,
    cancel: CancelToken,
    phase: watch::Sender<JobPhase>,
}

/// Shared handle to one training job.
///
/// The phase can be polled with [`JobHandle::phase`] or awaited with
/// [`JobHandle::wait`]; clones observe the same job.
#[derive(Clone)]
pub struct JobHandle {
    inner: Arc<JobInner>,
}

impl std::fmt::Debug for JobHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("JobHandle")
            .field("id", &self.inner.id)
            .field("pipeline_id", &self.inner.pipeline_id)
            .field("run_name", &self.inner.run_name)
            .field("phase", &self.phase())
            .finish_non_exhaustive()
    }
}

impl JobHandle {
    pub(crate) fn new(
        pipeline_id: String,
        run_name: String,
        log_dir: PathBuf,
        weight_dir: PathBuf,
        trainer: Box<dyn Trainer>,
    ) -> Self {
        let (phase, _) = watch::channel(JobPhase::Created);
        let description = trainer.describe();
        Self {
            inner: Arc::new(JobInner {
                id: TrainingJobId::new(),
                pipeline_id,
                run_name,
                log_dir,
                weight_dir,
                description,
                trainer: Mutex::new(Some(trainer)),
                cancel: CancelToken::default(),
                phase,
            }),
        }
    }

    #[must_use]
    pub fn id(&self) -> &TrainingJobId {
        &self.inner.id
    }

    #[must_use]
    pub fn pipeline_id(&self) -> &str {
        &self.inner.pipeline_id
    }

    #[must_use]
    pub fn run_name(&self) -> &str {
        &self.inner.run_name
    }

    #[must_use]
    pub fn log_dir(&self) -> &Path {
        &self.inner.log_dir
    }

    #[must_use]
    pub fn weight_dir(&self) -> &Path {
        &self.inner.weight_dir
    }

    #[must_use]
    pub fn description(&self) -> &str {
        &self.inner.description
    }

    #[must_use]
    pub fn phase(&self) -> JobPhase {
        self.inner.phase.borrow().clone()
    }

    #[must_use]
    pub fn is_same(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }

    /// Wait until the job reaches a terminal phase.
    pub async fn wait(&self) -> JobPhase {
        let mut rx = self.inner.phase.subscribe();
        match rx.wait_for(JobPhase::is_terminal).await {
            Ok(phase) => phase.clone(),
            Err(_) => self.phase(),
        }
    }

    /// Request a cooperative stop; the trainer observes it between epochs.
    pub fn cancel(&self) {
        self.inner.cancel.cancel();
    }

    pub(crate) fn cancel_token(&self) -> &CancelToken {
        &self.inner.cancel
    }

    pub(crate) fn set_phase(&self, phase: JobPhase) {
        self.inner.phase.send_replace(phase);
    }

    pub(crate) fn take_trainer(&self) -> TrainingResult<Box<dyn Trainer>> {
        let mut slot = self
            .inner
            .trainer
            .lock()
            .map_err(|_| TrainingError::Trainer("trainer slot poisoned".to_string()))?;
        slot.take().ok_or_else(|| TrainingError::InvalidPhase {
            job_id: self.inner.id.to_string(),
            action: "start",
            phase: self.phase().to_string(),
        })
    }
}
