//! Terminal front end for the controller.
//!
//! Registers every event and update name, renders feedback updates as
//! terminal lines and remembers the first error so commands can exit non-zero.

use anyhow::{Context, Result, anyhow};
use colored::Colorize;
use lumen_core::{Config, Controller, EventSource, SignalRegistry, SignalValue, callback, events, updates};
use lumen_training::{PipelineRegistry, TokioExecutor, WeightSelection};
use std::sync::{Arc, Mutex, PoisonError};

#[derive(Debug, Default)]
struct TerminalView {
    quiet: bool,
    errors: Mutex<Vec<String>>,
}

impl TerminalView {
    fn render(&self, name: &str, args: &[SignalValue]) {
        match name {
            updates::TRAIN_FEEDBACK
            | updates::WEIGHT_PANEL_FEEDBACK
            | updates::INFERENCE_FEEDBACK
            | updates::REPORT_FEEDBACK => {
                let Some(text) = args.first().and_then(SignalValue::as_text) else {
                    return;
                };
                if text.starts_with("Error:") {
                    eprintln!("{}", text.red());
                    self.errors.lock().unwrap_or_else(PoisonError::into_inner).push(text.to_string());
                } else if !text.is_empty() && !self.quiet {
                    println!("{text}");
                }
            }
            other => tracing::debug!(update = other, ?args, "update"),
        }
    }

    fn take_error(&self) -> Option<String> {
        let mut errors = self.errors.lock().unwrap_or_else(PoisonError::into_inner);
        let first = errors.first().cloned();
        errors.clear();
        first
    }
}

pub struct Session {
    signals: Arc<SignalRegistry>,
    controller: Controller,
    view: Arc<TerminalView>,
}

impl Session {
    /// Wire a controller to the terminal. `quiet` suppresses non-error feedback.
    pub fn open(config: Config, quiet: bool) -> Result<Self> {
        let signals = Arc::new(SignalRegistry::new());
        let view = Arc::new(TerminalView { quiet, ..TerminalView::default() });

        for &name in events::ALL {
            signals.register_event(name, EventSource::new())?;
        }
        for &name in updates::ALL {
            let view = Arc::clone(&view);
            signals.register_update(name, callback(move |args| view.render(name, args)))?;
        }

        let executor = Arc::new(TokioExecutor::current().context("Failed to attach to the async runtime")?);
        let controller =
            Controller::new(config, Arc::clone(&signals), Arc::new(PipelineRegistry::with_defaults()), executor);
        controller.connect_signals().context("Failed to connect controller signals")?;
        Ok(Self { signals, controller, view })
    }

    pub fn controller(&self) -> &Controller {
        &self.controller
    }

    /// Fire an event and apply what it queued.
    pub fn emit(&mut self, name: &str, args: &[SignalValue]) -> Result<()> {
        self.signals.emit(name, args)?;
        self.controller.process_pending();
        self.check()
    }

    /// Wait for background work, cancelling a training job on Ctrl-C.
    pub async fn settle(&mut self) -> Result<()> {
        tokio::select! {
            () = self.controller.run_until_idle() => {}
            _ = tokio::signal::ctrl_c() => {
                eprintln!("{}", "Cancelling...".yellow());
                self.signals.emit(events::CANCEL_BUTTON, &[])?;
                self.controller.run_until_idle().await;
            }
        }
        self.check()
    }

    /// Resolve a weight name to a selection against the current listing.
    pub fn select(&self, pipeline_id: &str, name: &str) -> Result<WeightSelection> {
        let names = self.controller.jobs().weights().list(pipeline_id)?;
        let index = names
            .iter()
            .position(|n| n == name)
            .ok_or_else(|| anyhow!("no trained weights named `{name}` for {pipeline_id}"))?;
        Ok(WeightSelection::new(pipeline_id, index, name))
    }

    fn check(&self) -> Result<()> {
        match self.view.take_error() {
            Some(error) => Err(anyhow!(error)),
            None => Ok(()),
        }
    }
}
