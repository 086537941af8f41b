//! Lumen Core
//!
//! Session-level orchestration on top of `lumen-training`:
//! - Name-keyed signal wiring between a presentation layer and the controller
//! - Training and inference state, with fingerprint-keyed inference caching
//! - Weight management that keeps the current selection consistent
//! - Reports, the metrics dashboard launcher, and layered configuration

pub mod cache;
pub mod config;
pub mod controller;
pub mod dashboard;
pub mod error;
pub mod report;
pub mod signals;
pub mod state;
pub mod weights;

pub use cache::{CachedPredictions, InferenceOutcome, InferenceRequest, InferenceRunner, compute_fingerprint};
pub use config::{Config, ConfigError, ConfigFile, ConfigResult, DashboardConfig, FingerprintMode};
pub use controller::{Command, Controller, Message, NO_MODELS_FEEDBACK};
pub use dashboard::launch_metrics_dashboard;
pub use error::{CoreError, CoreResult};
pub use report::{render_report, report_path, write_report};
pub use signals::{Callback, EventSource, SignalRegistry, SignalValue, callback, events, updates};
pub use state::{InferenceState, TrainingState};
pub use weights::{delete_weight, list_all, rename_weight};
