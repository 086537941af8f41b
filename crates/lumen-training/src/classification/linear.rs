//! Default classifier backend: multinomial logistic regression on pixel features.

use super::{ClassifierBackend, ClassifierModel, softmax};
use crate::error::{TrainingError, TrainingResult};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::{Deserialize, Serialize};
use std::path::Path;

#[derive(Debug, Clone, Copy, Default)]
pub struct LinearBackend;

impl ClassifierBackend for LinearBackend {
    fn id(&self) -> &'static str {
        "linear-softmax"
    }

    fn create(&self, num_features: usize, num_classes: usize, seed: u64) -> Box<dyn ClassifierModel> {
        let mut rng = StdRng::seed_from_u64(seed);
        let weights = (0..num_features * num_classes).map(|_| rng.gen_range(-0.01f32..0.01)).collect();
        Box::new(LinearModel { num_features, num_classes, weights, bias: vec![0.0; num_classes] })
    }

    fn load(&self, checkpoint: &Path) -> TrainingResult<Box<dyn ClassifierModel>> {
        let bytes = std::fs::read(checkpoint)?;
        let model: LinearModel = serde_json::from_slice(&bytes)?;
        if model.weights.len() != model.num_features * model.num_classes || model.bias.len() != model.num_classes {
            return Err(TrainingError::MissingCheckpoint(format!(
                "{}: parameter shape does not match header",
                checkpoint.display()
            )));
        }
        Ok(Box::new(model))
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct LinearModel {
    num_features: usize,
    num_classes: usize,
    // row-major [class][feature]
    weights: Vec<f32>,
    bias: Vec<f32>,
}

impl ClassifierModel for LinearModel {
    fn num_classes(&self) -> usize {
        self.num_classes
    }

    fn logits(&self, features: &[f32]) -> TrainingResult<Vec<f32>> {
        if features.len() != self.num_features {
            return Err(TrainingError::InferenceInput(format!(
                "expected {} features, got {}",
                self.num_features,
                features.len()
            )));
        }
        Ok(self
            .weights
            .chunks(self.num_features)
            .zip(&self.bias)
            .map(|(row, b)| row.iter().zip(features).map(|(w, x)| w * x).sum::<f32>() + b)
            .collect())
    }

    fn train_batch(&mut self, batch: &[(&[f32], usize)], lr: f32) -> TrainingResult<f32> {
        if batch.is_empty() {
            return Ok(0.0);
        }
        let d = self.num_features;
        let mut grad_w = vec![0.0f32; self.weights.len()];
        let mut grad_b = vec![0.0f32; self.bias.len()];
        let mut loss = 0.0f32;

        for (x, y) in batch {
            let probs = softmax(&self.logits(x)?);
            loss -= probs.get(*y).copied().unwrap_or(0.0).max(1e-12).ln();
            for (c, p) in probs.iter().enumerate() {
                let g = if c == *y { p - 1.0 } else { *p };
                grad_b[c] += g;
                for (gw, xi) in grad_w[c * d..(c + 1) * d].iter_mut().zip(x.iter()) {
                    *gw += g * xi;
                }
            }
        }

        let scale = lr / batch.len() as f32;
        for (w, g) in self.weights.iter_mut().zip(&grad_w) {
            *w -= scale * g;
        }
        for (b, g) in self.bias.iter_mut().zip(&grad_b) {
            *b -= scale * g;
        }
        Ok(loss / batch.len() as f32)
    }

    fn save(&self, path: &Path) -> TrainingResult<()> {
        std::fs::write(path, serde_json::to_vec(self)?)?;
        Ok(())
    }
}
