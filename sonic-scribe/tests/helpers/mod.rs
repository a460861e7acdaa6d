//! Test Helper Utilities
//!
//! Shared fixtures and stub engines for sonic-scribe integration tests

#![allow(dead_code)]

pub mod audio_generator;
pub mod midi_generator;
pub mod stub_engine;

pub use audio_generator::{sine_wav_bytes, AudioConfig};
pub use midi_generator::{held_note_midi, simple_midi};
pub use stub_engine::{stub_pitch, StubEngine};

use sonic_common::config::ExtensionRule;
use sonic_common::events::{EventBus, ScribeEvent};
use sonic_scribe::model::ModelLoader;
use sonic_scribe::producer::Producers;
use sonic_scribe::session::SessionController;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::broadcast;

/// Session wired to `engine`, not yet mounted
pub fn session_with(engine: Arc<StubEngine>, serialize_calls: bool) -> (Arc<SessionController>, EventBus) {
    let bus = EventBus::new(256);
    let loader = Arc::new(ModelLoader::new(engine, bus.clone()));
    let producers = Producers::new(loader, serialize_calls);
    let session = SessionController::new(producers, ExtensionRule::FirstToken, bus.clone());
    (session, bus)
}

/// Session whose producers reject sequences longer than `max_seconds`
pub fn session_with_limit(engine: Arc<StubEngine>, max_seconds: f64) -> (Arc<SessionController>, EventBus) {
    let bus = EventBus::new(256);
    let loader = Arc::new(ModelLoader::new(engine, bus.clone()));
    let producers = Producers::new(loader, false).with_max_duration(max_seconds);
    let session = SessionController::new(producers, ExtensionRule::FirstToken, bus.clone());
    (session, bus)
}

/// `count` sessions sharing one loader and producer set
pub fn sessions_sharing(
    engine: Arc<StubEngine>,
    serialize_calls: bool,
    count: usize,
) -> Vec<Arc<SessionController>> {
    let bus = EventBus::new(256);
    let loader = Arc::new(ModelLoader::new(engine, bus.clone()));
    let producers = Producers::new(loader, serialize_calls);
    (0..count)
        .map(|_| SessionController::new(producers.clone(), ExtensionRule::FirstToken, bus.clone()))
        .collect()
}

/// Wait (bounded) for the first event matching `pred`
pub async fn wait_for_event<F>(rx: &mut broadcast::Receiver<ScribeEvent>, pred: F) -> ScribeEvent
where
    F: Fn(&ScribeEvent) -> bool,
{
    tokio::time::timeout(Duration::from_secs(5), async {
        loop {
            match rx.recv().await {
                Ok(event) if pred(&event) => return event,
                Ok(_) => continue,
                Err(e) => panic!("event stream ended: {}", e),
            }
        }
    })
    .await
    .expect("timed out waiting for event")
}

/// Spin until `cond` holds (bounded)
pub async fn wait_until<F: Fn() -> bool>(cond: F) {
    tokio::time::timeout(Duration::from_secs(5), async {
        while !cond() {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    })
    .await
    .expect("condition not reached in time")
}
