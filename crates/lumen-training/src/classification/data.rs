//! Image-folder data source and pixel features.

use crate::artifacts::ClassMap;
use crate::error::{TrainingError, TrainingResult};
use image::imageops::FilterType;
use std::path::{Path, PathBuf};

#[derive(Debug, Clone, PartialEq)]
pub struct Sample {
    pub features: Vec<f32>,
    pub label: usize,
}

/// `<root>/<class_name>/<image>` layout; class names must appear in the class map.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImageFolder {
    pub root: PathBuf,
    pub items: Vec<(PathBuf, usize)>,
}

impl ImageFolder {
    pub fn scan(root: &Path, class_map: &ClassMap) -> TrainingResult<Self> {
        if !root.is_dir() {
            return Err(TrainingError::Dataset(format!("missing image folder: {}", root.display())));
        }

        let mut class_dirs = Vec::new();
        for entry in std::fs::read_dir(root)? {
            let entry = entry?;
            if entry.file_type()?.is_dir() {
                class_dirs.push(entry.path());
            }
        }
        class_dirs.sort();

        let mut items = Vec::new();
        for dir in class_dirs {
            let name = dir.file_name().map(|n| n.to_string_lossy().into_owned()).unwrap_or_default();
            let label = class_map.index_of(&name).ok_or_else(|| {
                TrainingError::Dataset(format!("class folder `{name}` is not listed in the class map"))
            })?;
            for image in list_files(&dir)? {
                items.push((image, label));
            }
        }

        Ok(Self { root: root.to_path_buf(), items })
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.items.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    /// Decode every image, spreading work over `workers` threads.
    pub fn load(&self, width: u32, height: u32, workers: usize) -> TrainingResult<Vec<Sample>> {
        if self.items.is_empty() {
            return Ok(Vec::new());
        }
        let chunk = self.items.len().div_ceil(workers.max(1));

        std::thread::scope(|scope| {
            let handles: Vec<_> = self
                .items
                .chunks(chunk)
                .map(|part| {
                    scope.spawn(move || {
                        part.iter()
                            .map(|(path, label)| -> TrainingResult<Sample> {
                                let features = extract_features(path, width, height).map_err(|e| {
                                    TrainingError::Dataset(format!("{}: {e}", path.display()))
                                })?;
                                Ok(Sample { features, label: *label })
                            })
                            .collect::<TrainingResult<Vec<_>>>()
                    })
                })
                .collect();

            let mut samples = Vec::with_capacity(self.items.len());
            for handle in handles {
                let part = handle
                    .join()
                    .map_err(|_| TrainingError::Dataset("image loader thread panicked".to_string()))??;
                samples.extend(part);
            }
            Ok(samples)
        })
    }
}

/// Regular files directly inside `dir`, sorted by name.
pub fn list_files(dir: &Path) -> TrainingResult<Vec<PathBuf>> {
    let mut files = Vec::new();
    for entry in std::fs::read_dir(dir)? {
        let entry = entry?;
        if entry.file_type()?.is_file() {
            files.push(entry.path());
        }
    }
    files.sort();
    Ok(files)
}

/// Resize to `width x height` RGB and normalize each channel to [-1, 1].
pub fn extract_features(path: &Path, width: u32, height: u32) -> TrainingResult<Vec<f32>> {
    let rgb = image::open(path)?.to_rgb8();
    let resized = image::imageops::resize(&rgb, width, height, FilterType::Triangle);
    Ok(resized
        .into_raw()
        .into_iter()
        .map(|v| (f32::from(v) / 255.0 - 0.5) / 0.5)
        .collect())
}
