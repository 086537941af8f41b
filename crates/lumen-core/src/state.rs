//! Mutable session state owned by the controller.

use crate::config::Config;
use lumen_training::TrainingError;
use std::path::PathBuf;

/// Inputs for the next training submission.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TrainingState {
    pub data_path: Option<PathBuf>,
    pub pipeline_id: String,
    pub run_name: String,
    pub model_args: String,
    pub trainer_args: String,
}

impl TrainingState {
    #[must_use]
    pub fn new(pipeline_id: impl Into<String>, run_name: impl Into<String>) -> Self {
        Self {
            data_path: None,
            pipeline_id: pipeline_id.into(),
            run_name: run_name.into(),
            model_args: String::new(),
            trainer_args: String::new(),
        }
    }

    #[must_use]
    pub fn from_config(config: &Config) -> Self {
        Self::new(config.default_pipeline.clone(), config.default_run_name.clone())
    }

    /// Whether data, pipeline and run name are all present. Uniqueness is
    /// checked against the weight database at submission.
    #[must_use]
    pub fn inputs_received(&self) -> bool {
        self.data_path.is_some() && !self.pipeline_id.is_empty() && !self.run_name.trim().is_empty()
    }
}

/// Inference selection, last computed predictions and browse cursor.
///
/// `image_list` and `predicted_labels` are always the same length.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InferenceState {
    pub data_path: Option<PathBuf>,
    pub pipeline_id: String,
    /// Selected weight entry directory under `weights/<pipeline_id>/`.
    pub checkpoint_path: Option<PathBuf>,
    pub cache_key: Option<String>,
    /// Checkpoint the cached predictions were computed with.
    pub cache_checkpoint: Option<PathBuf>,
    image_list: Vec<PathBuf>,
    predicted_labels: Vec<String>,
    cursor: usize,
}

impl InferenceState {
    #[must_use]
    pub fn new(pipeline_id: impl Into<String>) -> Self {
        Self {
            data_path: None,
            pipeline_id: pipeline_id.into(),
            checkpoint_path: None,
            cache_key: None,
            cache_checkpoint: None,
            image_list: Vec::new(),
            predicted_labels: Vec::new(),
            cursor: 0,
        }
    }

    #[must_use]
    pub fn from_config(config: &Config) -> Self {
        Self::new(config.default_pipeline.clone())
    }

    #[must_use]
    pub fn inputs_received(&self) -> bool {
        self.data_path.is_some() && !self.pipeline_id.is_empty() && self.checkpoint_path.is_some()
    }

    #[must_use]
    pub fn image_list(&self) -> &[PathBuf] {
        &self.image_list
    }

    #[must_use]
    pub fn predicted_labels(&self) -> &[String] {
        &self.predicted_labels
    }

    #[must_use]
    pub fn cursor(&self) -> usize {
        self.cursor
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.image_list.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.image_list.is_empty()
    }

    /// Replace predictions. The cursor is kept when the new list is the same
    /// length (a cache hit), otherwise it resets to the first image.
    pub fn set_predictions(&mut self, images: Vec<PathBuf>, labels: Vec<String>) -> Result<(), TrainingError> {
        if images.len() != labels.len() {
            return Err(TrainingError::InferenceInput(format!(
                "{} images but {} labels",
                images.len(),
                labels.len()
            )));
        }
        if images.len() != self.image_list.len() {
            self.cursor = 0;
        }
        self.image_list = images;
        self.predicted_labels = labels;
        Ok(())
    }

    /// Move the cursor and return the `(image, label)` now under it.
    pub fn seek(&mut self, index: usize) -> Result<(&PathBuf, &str), TrainingError> {
        if index >= self.image_list.len() {
            return Err(TrainingError::IndexOutOfRange { index, len: self.image_list.len() });
        }
        self.cursor = index;
        Ok((&self.image_list[index], &self.predicted_labels[index]))
    }

    /// `(image, label)` under the cursor, if any predictions are held.
    #[must_use]
    pub fn current(&self) -> Option<(&PathBuf, &str)> {
        self.image_list.get(self.cursor).zip(self.predicted_labels.get(self.cursor).map(String::as_str))
    }

    /// Drop the fingerprint so the next run recomputes.
    pub fn invalidate_cache(&mut self) {
        self.cache_key = None;
        self.cache_checkpoint = None;
    }
}
