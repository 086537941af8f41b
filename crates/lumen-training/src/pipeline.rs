//! Pipeline capability bundles and the registry that selects them by id.

use crate::artifacts::{Flags, HyperparamRecord};
use crate::classification::ImageClassification;
use crate::error::{TrainingError, TrainingResult};
use crate::trainer::Trainer;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// Parsed model-side arguments. `input_dirpath` is always the first positional.
#[derive(Debug, Clone, PartialEq)]
pub struct ModelConfig {
    pub input_dirpath: PathBuf,
    pub flags: Flags,
}

/// Inputs for constructing a trainable bundle.
#[derive(Debug, Clone)]
pub struct RunSetup<'a> {
    pub record: &'a HyperparamRecord,
    pub log_dir: &'a Path,
    pub weight_dir: &'a Path,
}

/// Batch inference over an ordered list of images.
pub trait Predictor: Send {
    /// Returns one label per input, in input order.
    fn predict(&self, images: &[PathBuf]) -> TrainingResult<Vec<String>>;
}

/// A registered bundle of argument schema, training and inference logic for one task family.
pub trait Pipeline: Send + Sync {
    fn id(&self) -> &str;

    fn description(&self) -> &str;

    fn parse_model_args(&self, args: &[String]) -> TrainingResult<ModelConfig>;

    fn parse_trainer_args(&self, args: &[String]) -> TrainingResult<Flags>;

    /// Pure construction; all I/O happens when the trainer fits.
    fn build_trainable(&self, setup: &RunSetup<'_>) -> TrainingResult<Box<dyn Trainer>>;

    fn build_inference(&self, checkpoint_dir: &Path, hparams: &HyperparamRecord) -> TrainingResult<Box<dyn Predictor>>;
}

/// Identifier-keyed table of pipelines. Iteration order is sorted by id.
#[derive(Clone, Default)]
pub struct PipelineRegistry {
    pipelines: BTreeMap<String, Arc<dyn Pipeline>>,
}

impl std::fmt::Debug for PipelineRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PipelineRegistry").field("pipelines", &self.ids()).finish()
    }
}

impl PipelineRegistry {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry with every built-in pipeline.
    #[must_use]
    pub fn with_defaults() -> Self {
        let mut registry = Self::new();
        registry.pipelines.insert(
            crate::classification::PIPELINE_ID.to_string(),
            Arc::new(ImageClassification::default()),
        );
        registry
    }

    pub fn register(&mut self, pipeline: Arc<dyn Pipeline>) -> TrainingResult<()> {
        let id = pipeline.id().to_string();
        if self.pipelines.contains_key(&id) {
            return Err(TrainingError::InvalidArguments(format!("pipeline {id} is already registered")));
        }
        tracing::debug!(pipeline = %id, "registered pipeline");
        self.pipelines.insert(id, pipeline);
        Ok(())
    }

    pub fn get(&self, pipeline_id: &str) -> TrainingResult<Arc<dyn Pipeline>> {
        self.pipelines
            .get(pipeline_id)
            .cloned()
            .ok_or_else(|| TrainingError::UnknownPipeline(pipeline_id.to_string()))
    }

    #[must_use]
    pub fn ids(&self) -> Vec<String> {
        self.pipelines.keys().cloned().collect()
    }
}

/// Split a raw hyperparameter string into flags, honoring shell quoting.
pub fn split_args(raw: &str) -> TrainingResult<Vec<String>> {
    shlex::split(raw).ok_or_else(|| TrainingError::InvalidArguments(format!("unbalanced quotes in `{raw}`")))
}

/// Convert a parsed argument struct into a flag map.
pub fn to_flags<T: serde::Serialize>(args: &T) -> TrainingResult<Flags> {
    match serde_json::to_value(args)? {
        serde_json::Value::Object(map) => Ok(map.into_iter().collect()),
        other => Err(TrainingError::InvalidArguments(format!("expected flag map, got {other}"))),
    }
}

/// Rebuild an argument struct from a flag map recorded in a hyperparameter record.
pub fn from_flags<T: serde::de::DeserializeOwned>(flags: &Flags) -> TrainingResult<T> {
    let map: serde_json::Map<String, serde_json::Value> = flags.clone().into_iter().collect();
    Ok(serde_json::from_value(serde_json::Value::Object(map))?)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unknown_pipeline() {
        let registry = PipelineRegistry::with_defaults();
        let err = registry.get("Object_Detection").err().unwrap();
        assert!(matches!(err, TrainingError::UnknownPipeline(id) if id == "Object_Detection"));
    }

    #[test]
    fn test_defaults_include_classification() {
        let registry = PipelineRegistry::with_defaults();
        assert_eq!(registry.ids(), vec!["Image_Classification".to_string()]);
        assert_eq!(registry.get("Image_Classification").unwrap().id(), "Image_Classification");
    }

    #[test]
    fn test_register_rejects_duplicate() {
        let mut registry = PipelineRegistry::with_defaults();
        let err = registry.register(Arc::new(ImageClassification::default())).unwrap_err();
        assert!(matches!(err, TrainingError::InvalidArguments(_)));
    }

    #[test]
    fn test_split_args_quotes() {
        assert_eq!(split_args("--lr 0.01 'my dir'").unwrap(), vec!["--lr", "0.01", "my dir"]);
        assert!(split_args("").unwrap().is_empty());
        assert!(split_args("'open").is_err());
    }
}
