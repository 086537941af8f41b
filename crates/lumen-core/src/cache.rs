//! Directory fingerprints and cached batch inference.

use crate::config::FingerprintMode;
use crate::error::CoreResult;
use crate::state::InferenceState;
use lumen_training::classification::data::list_files;
use lumen_training::{HPARAMS_FILE, HyperparamRecord, PipelineRegistry, TrainingError, TrainingLayout};
use sha2::{Digest, Sha256};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::UNIX_EPOCH;
use walkdir::WalkDir;

/// Deterministic digest over a directory tree and the pipeline identifier.
///
/// Entries are visited depth-first, siblings ordered by case-folded name.
/// Each entry contributes its relative path; files also contribute their
/// bytes (or size and mtime in [`FingerprintMode::Metadata`]).
pub fn compute_fingerprint(dir: &Path, pipeline_id: &str, mode: FingerprintMode) -> CoreResult<String> {
    if !dir.is_dir() {
        return Err(TrainingError::InferenceInput(format!("not a directory: {}", dir.display())).into());
    }

    let mut hasher = Sha256::new();
    hasher.update(b"pipeline\0");
    hasher.update(pipeline_id.as_bytes());
    hasher.update([0u8]);

    let walker = WalkDir::new(dir).min_depth(1).sort_by(|a, b| {
        a.file_name()
            .to_ascii_lowercase()
            .cmp(&b.file_name().to_ascii_lowercase())
            .then_with(|| a.file_name().cmp(b.file_name()))
    });

    for entry in walker {
        let entry = entry?;
        let relative = entry.path().strip_prefix(dir).unwrap_or(entry.path());
        let file_type = entry.file_type();
        hasher.update(if file_type.is_dir() { b"d" } else { b"f" });
        hasher.update(relative.to_string_lossy().as_bytes());
        hasher.update([0u8]);

        if !file_type.is_file() {
            continue;
        }
        match mode {
            FingerprintMode::Contents => {
                let mut file = std::fs::File::open(entry.path())?;
                let len = std::io::copy(&mut file, &mut hasher)?;
                hasher.update(len.to_le_bytes());
            }
            FingerprintMode::Metadata => {
                let meta = entry.metadata()?;
                hasher.update(meta.len().to_le_bytes());
                let mtime = meta
                    .modified()
                    .ok()
                    .and_then(|t| t.duration_since(UNIX_EPOCH).ok())
                    .map_or(0, |d| d.as_nanos());
                hasher.update(mtime.to_le_bytes());
            }
        }
    }

    Ok(hex::encode(hasher.finalize()))
}

/// What to predict on, and with which weights.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InferenceRequest {
    pub pipeline_id: String,
    pub data_path: PathBuf,
    /// Weight entry directory.
    pub checkpoint_path: PathBuf,
}

impl InferenceRequest {
    /// Build a request from the state, if every input is present.
    #[must_use]
    pub fn from_state(state: &InferenceState) -> Option<Self> {
        Some(Self {
            pipeline_id: state.pipeline_id.clone(),
            data_path: state.data_path.clone()?,
            checkpoint_path: state.checkpoint_path.clone()?,
        })
    }
}

/// Predictions from an earlier run, keyed by fingerprint and checkpoint.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CachedPredictions {
    pub key: String,
    pub checkpoint_path: PathBuf,
    pub image_list: Vec<PathBuf>,
    pub predicted_labels: Vec<String>,
}

impl CachedPredictions {
    /// Snapshot of the state's cache, if it holds one.
    #[must_use]
    pub fn from_state(state: &InferenceState) -> Option<Self> {
        Some(Self {
            key: state.cache_key.clone()?,
            checkpoint_path: state.cache_checkpoint.clone()?,
            image_list: state.image_list().to_vec(),
            predicted_labels: state.predicted_labels().to_vec(),
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InferenceOutcome {
    pub request: InferenceRequest,
    pub key: String,
    pub image_list: Vec<PathBuf>,
    pub predicted_labels: Vec<String>,
    /// True when the pipeline was not invoked.
    pub reused: bool,
}

impl InferenceOutcome {
    /// Store the outcome in the state, making it the new cache entry.
    pub fn apply(self, state: &mut InferenceState) -> CoreResult<()> {
        state.set_predictions(self.image_list, self.predicted_labels)?;
        state.cache_key = Some(self.key);
        state.cache_checkpoint = Some(self.request.checkpoint_path);
        Ok(())
    }
}

/// Runs a pipeline's predictor over a directory, skipping the pass when the
/// directory and checkpoint are unchanged since the cached run.
#[derive(Debug, Clone)]
pub struct InferenceRunner {
    registry: Arc<PipelineRegistry>,
    layout: TrainingLayout,
    mode: FingerprintMode,
}

impl InferenceRunner {
    #[must_use]
    pub fn new(registry: Arc<PipelineRegistry>, layout: TrainingLayout, mode: FingerprintMode) -> Self {
        Self { registry, layout, mode }
    }

    #[must_use]
    pub fn mode(&self) -> FingerprintMode {
        self.mode
    }

    pub fn run(&self, request: &InferenceRequest, cached: Option<&CachedPredictions>) -> CoreResult<InferenceOutcome> {
        let data = &request.data_path;
        if !data.is_dir() {
            return Err(TrainingError::InferenceInput(format!("{} does not exist", data.display())).into());
        }
        let hparams = self.checkpoint_record(request)?;

        let key = compute_fingerprint(data, &request.pipeline_id, self.mode)?;
        if let Some(cached) = cached
            && cached.key == key
            && cached.checkpoint_path == request.checkpoint_path
        {
            tracing::debug!(fingerprint = %key, "inference cache hit");
            return Ok(InferenceOutcome {
                request: request.clone(),
                key,
                image_list: cached.image_list.clone(),
                predicted_labels: cached.predicted_labels.clone(),
                reused: true,
            });
        }

        let images = list_files(data)?;
        if images.is_empty() {
            return Err(TrainingError::InferenceInput(format!("{} has no images", data.display())).into());
        }

        let pipeline = self.registry.get(&request.pipeline_id)?;
        let predictor = pipeline.build_inference(&request.checkpoint_path, &hparams)?;
        let labels = predictor.predict(&images)?;
        if labels.len() != images.len() {
            return Err(TrainingError::InferenceInput(format!(
                "predictor returned {} labels for {} images",
                labels.len(),
                images.len()
            ))
            .into());
        }

        tracing::info!(
            pipeline = %request.pipeline_id,
            fingerprint = %key,
            images = images.len(),
            "inference complete"
        );
        Ok(InferenceOutcome { request: request.clone(), key, image_list: images, predicted_labels: labels, reused: false })
    }

    /// Run against the state's inputs and cache, storing the outcome back.
    ///
    /// Returns whether the cached predictions were reused.
    pub fn run_with_state(&self, state: &mut InferenceState) -> CoreResult<bool> {
        let request = InferenceRequest::from_state(state).ok_or_else(|| {
            crate::error::CoreError::MissingInputs("an image directory and a trained model".to_string())
        })?;
        let cached = CachedPredictions::from_state(state);
        let outcome = self.run(&request, cached.as_ref())?;
        let reused = outcome.reused;
        outcome.apply(state)?;
        Ok(reused)
    }

    fn checkpoint_record(&self, request: &InferenceRequest) -> CoreResult<HyperparamRecord> {
        let checkpoint = &request.checkpoint_path;
        let missing = |why: &str| TrainingError::MissingCheckpoint(format!("{}: {why}", checkpoint.display()));

        if checkpoint.parent() != Some(self.layout.pipeline_weights(&request.pipeline_id).as_path()) {
            return Err(missing("not a weight entry of this pipeline").into());
        }
        if !checkpoint.is_dir() {
            return Err(missing("no such weight entry").into());
        }
        HyperparamRecord::read(&checkpoint.join(HPARAMS_FILE)).map_err(|e| match e {
            TrainingError::MissingArtifact(_) => missing("no hyperparameter record").into(),
            other => other.into(),
        })
    }
}
