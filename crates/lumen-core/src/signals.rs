//! Name-keyed wiring between the presentation layer and the controller.
//!
//! The presentation layer registers an [`EventSource`] for every control it
//! owns and an update sink for every view it can refresh. The controller then
//! binds behavior with [`SignalRegistry::dispatch`] and pushes results with
//! [`SignalRegistry::notify`], knowing only the names.

use crate::error::{CoreError, CoreResult};
use lumen_training::WeightSelection;
use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::{Arc, Mutex, PoisonError, RwLock};

/// Event names (presentation -> controller).
pub mod events {
    pub const TRAIN_DIRPATH: &str = "train_dirpath";
    pub const TRAIN_PIPELINE: &str = "train_pipeline";
    pub const MODEL_HP: &str = "model_hp";
    pub const TRAINER_HP: &str = "trainer_hp";
    pub const RUN_NAME: &str = "run_name";
    pub const TRAIN_BUTTON: &str = "train_button";
    pub const CANCEL_BUTTON: &str = "cancel_button";
    pub const DASH_BUTTON: &str = "dash_button";
    pub const INFERENCE_DIRPATH: &str = "inference_dirpath";
    pub const WEIGHT_SELECTION: &str = "weight_selection";
    pub const INFERENCE_BUTTON: &str = "inference_button";
    pub const TOGGLE_INFERENCE: &str = "toggle_inference";
    pub const REPORT_BUTTON: &str = "report_button";
    pub const WEIGHT_SELECTION_RENAME: &str = "weight_selection_rename";
    pub const WEIGHT_SELECTION_DELETION: &str = "weight_selection_deletion";
    pub const REFRESH_WEIGHTS: &str = "refresh_weights";

    pub const ALL: &[&str] = &[
        TRAIN_DIRPATH,
        TRAIN_PIPELINE,
        MODEL_HP,
        TRAINER_HP,
        RUN_NAME,
        TRAIN_BUTTON,
        CANCEL_BUTTON,
        DASH_BUTTON,
        INFERENCE_DIRPATH,
        WEIGHT_SELECTION,
        INFERENCE_BUTTON,
        TOGGLE_INFERENCE,
        REPORT_BUTTON,
        WEIGHT_SELECTION_RENAME,
        WEIGHT_SELECTION_DELETION,
        REFRESH_WEIGHTS,
    ];
}

/// Update names (controller -> presentation).
pub mod updates {
    /// `[Text]`
    pub const TRAIN_FEEDBACK: &str = "update_train_feedback";
    /// `[Flag]` enabled
    pub const TRAIN_BUTTON: &str = "update_train_button";
    /// `[Text]`
    pub const WEIGHT_PANEL_FEEDBACK: &str = "update_weight_panel_feedback";
    /// `[Text]`
    pub const INFERENCE_FEEDBACK: &str = "update_inference_feedback";
    /// `[Path, Text, Index]` image, label, number of images
    pub const LAUNCH_INFERENCE_DIALOG: &str = "launch_inference_dialog";
    /// `[Path, Text]` image, label
    pub const TOGGLE_INFERENCE: &str = "toggle_inference";
    /// `[Index]`
    pub const SLIDER_LENGTH: &str = "update_slider_length";
    /// `[Text, Texts]` pipeline, weight names
    pub const WEIGHT_LIST: &str = "update_weight_list";
    /// `[Text]`
    pub const REPORT_FEEDBACK: &str = "report_button_feedback";

    pub const ALL: &[&str] = &[
        TRAIN_FEEDBACK,
        TRAIN_BUTTON,
        WEIGHT_PANEL_FEEDBACK,
        INFERENCE_FEEDBACK,
        LAUNCH_INFERENCE_DIALOG,
        TOGGLE_INFERENCE,
        SLIDER_LENGTH,
        WEIGHT_LIST,
        REPORT_FEEDBACK,
    ];
}

/// Payload element carried by events and updates.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SignalValue {
    Text(String),
    Path(PathBuf),
    Index(usize),
    Flag(bool),
    Texts(Vec<String>),
    Weight(WeightSelection),
}

impl SignalValue {
    #[must_use]
    pub fn as_text(&self) -> Option<&str> {
        match self {
            Self::Text(s) => Some(s),
            _ => None,
        }
    }

    #[must_use]
    pub fn as_index(&self) -> Option<usize> {
        match self {
            Self::Index(i) => Some(*i),
            _ => None,
        }
    }

    #[must_use]
    pub fn as_weight(&self) -> Option<&WeightSelection> {
        match self {
            Self::Weight(w) => Some(w),
            _ => None,
        }
    }
}

pub type Callback = Arc<dyn Fn(&[SignalValue]) + Send + Sync>;

/// Box a closure as a [`Callback`].
pub fn callback<F>(f: F) -> Callback
where
    F: Fn(&[SignalValue]) + Send + Sync + 'static,
{
    Arc::new(f)
}

/// A connection point owned by one control; any number of callbacks may be connected.
#[derive(Clone, Default)]
pub struct EventSource {
    callbacks: Arc<Mutex<Vec<Callback>>>,
}

impl std::fmt::Debug for EventSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EventSource").field("callbacks", &self.connected()).finish()
    }
}

impl EventSource {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn connect(&self, callback: Callback) {
        self.callbacks.lock().unwrap_or_else(PoisonError::into_inner).push(callback);
    }

    /// Fire the event. Callbacks run on the calling thread, in connection order.
    pub fn emit(&self, args: &[SignalValue]) {
        let callbacks = self.callbacks.lock().unwrap_or_else(PoisonError::into_inner).clone();
        for callback in callbacks {
            callback(args);
        }
    }

    #[must_use]
    pub fn connected(&self) -> usize {
        self.callbacks.lock().unwrap_or_else(PoisonError::into_inner).len()
    }
}

/// Each name may be claimed exactly once per registry.
#[derive(Default)]
pub struct SignalRegistry {
    events: RwLock<HashMap<String, EventSource>>,
    updates: RwLock<HashMap<String, Callback>>,
}

impl std::fmt::Debug for SignalRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let events = self.events.read().unwrap_or_else(PoisonError::into_inner).len();
        let updates = self.updates.read().unwrap_or_else(PoisonError::into_inner).len();
        f.debug_struct("SignalRegistry").field("events", &events).field("updates", &updates).finish()
    }
}

impl SignalRegistry {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register_event(&self, name: &str, source: EventSource) -> CoreResult<()> {
        let mut events = self.events.write().unwrap_or_else(PoisonError::into_inner);
        if events.contains_key(name) {
            return Err(CoreError::DuplicateKey(name.to_string()));
        }
        events.insert(name.to_string(), source);
        Ok(())
    }

    pub fn register_update(&self, name: &str, sink: Callback) -> CoreResult<()> {
        let mut updates = self.updates.write().unwrap_or_else(PoisonError::into_inner);
        if updates.contains_key(name) {
            return Err(CoreError::DuplicateKey(name.to_string()));
        }
        updates.insert(name.to_string(), sink);
        Ok(())
    }

    /// Run `callback` whenever the event registered under `name` fires.
    pub fn dispatch(&self, name: &str, callback: Callback) -> CoreResult<()> {
        let events = self.events.read().unwrap_or_else(PoisonError::into_inner);
        let source = events.get(name).ok_or_else(|| CoreError::UnknownKey(name.to_string()))?;
        source.connect(callback);
        Ok(())
    }

    /// Invoke the update sink registered under `name`.
    pub fn notify(&self, name: &str, args: &[SignalValue]) -> CoreResult<()> {
        let sink = self
            .updates
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(name)
            .cloned()
            .ok_or_else(|| CoreError::UnknownKey(name.to_string()))?;
        sink(args);
        Ok(())
    }

    /// The event source under `name`, for presentation layers that fire events by name.
    pub fn event(&self, name: &str) -> CoreResult<EventSource> {
        self.events
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(name)
            .cloned()
            .ok_or_else(|| CoreError::UnknownKey(name.to_string()))
    }

    /// Fire the event under `name`.
    pub fn emit(&self, name: &str, args: &[SignalValue]) -> CoreResult<()> {
        self.event(name)?.emit(args);
        Ok(())
    }
}
