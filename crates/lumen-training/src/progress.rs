use crate::job::TrainingJobId;
use serde::{Deserialize, Serialize};
use std::sync::Mutex;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ProgressEvent {
    Started { job_id: TrainingJobId, run_name: String },
    Message { job_id: TrainingJobId, message: String },
    Epoch { job_id: TrainingJobId, epoch: u32, total: u32, train_loss: f32, val_acc: f32 },
    Finished { job_id: TrainingJobId, run_name: String },
    Failed { job_id: TrainingJobId, run_name: String, error: String },
}

impl ProgressEvent {
    #[must_use]
    pub fn job_id(&self) -> &TrainingJobId {
        match self {
            Self::Started { job_id, .. }
            | Self::Message { job_id, .. }
            | Self::Epoch { job_id, .. }
            | Self::Finished { job_id, .. }
            | Self::Failed { job_id, .. } => job_id,
        }
    }
}

pub trait ProgressSink: Send + Sync {
    fn on_event(&self, event: ProgressEvent);
}

/// Logs every event through `tracing`.
#[derive(Debug, Default)]
pub struct TracingProgressSink;

impl ProgressSink for TracingProgressSink {
    fn on_event(&self, event: ProgressEvent) {
        match event {
            ProgressEvent::Started { job_id, run_name } => tracing::info!(%job_id, %run_name, "training started"),
            ProgressEvent::Message { job_id, message } => tracing::info!(%job_id, "{message}"),
            ProgressEvent::Epoch { job_id, epoch, total, train_loss, val_acc } => {
                tracing::info!(%job_id, epoch, total, train_loss, val_acc, "epoch complete");
            }
            ProgressEvent::Finished { job_id, run_name } => tracing::info!(%job_id, %run_name, "training finished"),
            ProgressEvent::Failed { job_id, run_name, error } => {
                tracing::error!(%job_id, %run_name, %error, "training failed");
            }
        }
    }
}

/// Records events in order; used by tests and by callers that poll.
#[derive(Debug, Default)]
pub struct RecordingProgressSink {
    events: Mutex<Vec<ProgressEvent>>,
}

impl RecordingProgressSink {
    #[must_use]
    pub fn events(&self) -> Vec<ProgressEvent> {
        self.events.lock().map(|e| e.clone()).unwrap_or_default()
    }
}

impl ProgressSink for RecordingProgressSink {
    fn on_event(&self, event: ProgressEvent) {
        if let Ok(mut events) = self.events.lock() {
            events.push(event);
        }
    }
}
