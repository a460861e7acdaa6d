//! One-shot model initialization with observable readiness

use super::TranscriptionEngine;
use chrono::Utc;
use sonic_common::events::{EventBus, ModelReadiness, ScribeEvent};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::watch;
use tracing::{error, info};

/// Owns the process-wide engine and its readiness
///
/// Readiness moves from `Uninitialized` to `Ready` or `Failed` once and
/// never changes again. There is no automatic retry after a failure.
pub struct ModelLoader {
    engine: Arc<dyn TranscriptionEngine>,
    readiness_tx: watch::Sender<ModelReadiness>,
    started: AtomicBool,
    event_bus: EventBus,
}

impl ModelLoader {
    pub fn new(engine: Arc<dyn TranscriptionEngine>, event_bus: EventBus) -> Self {
        let (readiness_tx, _) = watch::channel(ModelReadiness::Uninitialized);
        Self {
            engine,
            readiness_tx,
            started: AtomicBool::new(false),
            event_bus,
        }
    }

    /// Initialize the engine, or wait for the initialization already running
    ///
    /// Only the first call reaches the engine. Every call returns the
    /// settled readiness.
    pub async fn initialize(&self) -> ModelReadiness {
        if self.started.swap(true, Ordering::SeqCst) {
            let mut rx = self.readiness_tx.subscribe();
            return match rx.wait_for(|r| r.is_settled()).await {
                Ok(readiness) => *readiness,
                Err(_) => self.readiness(),
            };
        }

        let engine = self.engine.name();
        info!(engine, "Initializing transcription model");

        let new_state = match self.engine.initialize().await {
            Ok(()) => {
                info!(engine, "Transcription model ready");
                ModelReadiness::Ready
            }
            Err(e) => {
                error!(engine, error = %e, "Transcription model failed to initialize");
                ModelReadiness::Failed
            }
        };

        let old_state = self.readiness_tx.send_replace(new_state);
        self.event_bus.emit_lossy(ScribeEvent::ModelStateChanged {
            engine: engine.to_string(),
            old_state,
            new_state,
            timestamp: Utc::now(),
        });

        new_state
    }

    pub fn readiness(&self) -> ModelReadiness {
        *self.readiness_tx.borrow()
    }

    pub fn is_ready(&self) -> bool {
        self.readiness().is_ready()
    }

    /// Watch readiness changes
    pub fn subscribe(&self) -> watch::Receiver<ModelReadiness> {
        self.readiness_tx.subscribe()
    }

    pub fn engine(&self) -> &Arc<dyn TranscriptionEngine> {
        &self.engine
    }
}
