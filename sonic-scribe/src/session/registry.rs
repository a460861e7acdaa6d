//! Live sessions by id
//!
//! Every lookup marks the session active. Pages normally delete their
//! session on unload; the idle sweep closes the ones left behind by tabs
//! that crashed or lost the network.

use super::SessionController;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::RwLock;
use tokio::task::JoinHandle;
use tracing::{debug, info};
use uuid::Uuid;

/// Upper bound on the time between two idle sweeps
const MAX_SWEEP_PERIOD: Duration = Duration::from_secs(60);

struct Entry {
    session: Arc<SessionController>,
    last_active: Instant,
}

/// Shared map of mounted sessions
#[derive(Clone, Default)]
pub struct SessionRegistry {
    sessions: Arc<RwLock<HashMap<Uuid, Entry>>>,
}

impl SessionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn insert(&self, session: Arc<SessionController>) {
        let entry = Entry {
            session: Arc::clone(&session),
            last_active: Instant::now(),
        };
        self.sessions.write().await.insert(session.id(), entry);
    }

    /// Look up a session and mark it active
    pub async fn get(&self, id: &Uuid) -> Option<Arc<SessionController>> {
        let mut sessions = self.sessions.write().await;
        let entry = sessions.get_mut(id)?;
        entry.last_active = Instant::now();
        Some(Arc::clone(&entry.session))
    }

    /// Mark a session active; false if it is gone
    pub async fn touch(&self, id: &Uuid) -> bool {
        match self.sessions.write().await.get_mut(id) {
            Some(entry) => {
                entry.last_active = Instant::now();
                true
            }
            None => false,
        }
    }

    pub async fn remove(&self, id: &Uuid) -> Option<Arc<SessionController>> {
        self.sessions.write().await.remove(id).map(|e| e.session)
    }

    pub async fn len(&self) -> usize {
        self.sessions.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.sessions.read().await.is_empty()
    }

    /// Close and drop sessions not used for `max_idle`; returns their ids
    ///
    /// Sessions with a producer still running are kept.
    pub async fn expire_idle(&self, max_idle: Duration) -> Vec<Uuid> {
        let candidates: Vec<(Uuid, Arc<SessionController>)> = self
            .sessions
            .read()
            .await
            .iter()
            .filter(|(_, e)| e.last_active.elapsed() >= max_idle)
            .map(|(id, e)| (*id, Arc::clone(&e.session)))
            .collect();

        let mut expired = Vec::new();
        for (id, session) in candidates {
            if session.phase().await.is_working() {
                continue;
            }
            let removed = {
                let mut sessions = self.sessions.write().await;
                // Skip sessions touched since the scan
                match sessions.get(&id) {
                    Some(e) if e.last_active.elapsed() >= max_idle => sessions.remove(&id),
                    _ => None,
                }
            };
            if let Some(entry) = removed {
                entry.session.close().await;
                expired.push(id);
            }
        }

        if !expired.is_empty() {
            info!(count = expired.len(), "Closed idle sessions");
        }
        expired
    }

    /// Run [`expire_idle`](Self::expire_idle) periodically until the
    /// returned task is aborted
    pub fn spawn_idle_sweep(&self, max_idle: Duration) -> JoinHandle<()> {
        let registry = self.clone();
        let period = (max_idle / 4).clamp(Duration::from_secs(1), MAX_SWEEP_PERIOD);
        debug!(?max_idle, ?period, "Starting idle session sweep");
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(period);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
            loop {
                ticker.tick().await;
                registry.expire_idle(max_idle).await;
            }
        })
    }

    /// Close and drop every session
    pub async fn close_all(&self) {
        let sessions: Vec<_> = self
            .sessions
            .write()
            .await
            .drain()
            .map(|(_, e)| e.session)
            .collect();
        for session in sessions {
            session.close().await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::intake::UploadedFile;
    use crate::model::{ModelError, ModelLoader, TranscriptionEngine};
    use crate::producer::Producers;
    use async_trait::async_trait;
    use sonic_common::config::ExtensionRule;
    use sonic_common::events::{EventBus, SessionPhase};
    use sonic_common::NoteSequence;

    struct IdleEngine;

    #[async_trait]
    impl TranscriptionEngine for IdleEngine {
        fn name(&self) -> &'static str {
            "idle"
        }

        async fn initialize(&self) -> Result<(), ModelError> {
            Ok(())
        }

        async fn transcribe(&self, _file: &UploadedFile) -> Result<NoteSequence, ModelError> {
            std::future::pending().await
        }
    }

    fn producers() -> (Producers, EventBus) {
        let bus = EventBus::new(64);
        let loader = Arc::new(ModelLoader::new(Arc::new(IdleEngine), bus.clone()));
        (Producers::new(loader, false), bus)
    }

    #[tokio::test]
    async fn test_untouched_sessions_expire() {
        let (producers, bus) = producers();
        let registry = SessionRegistry::new();
        let stale = SessionController::new(producers.clone(), ExtensionRule::FirstToken, bus.clone());
        let fresh = SessionController::new(producers, ExtensionRule::FirstToken, bus);
        registry.insert(Arc::clone(&stale)).await;
        registry.insert(Arc::clone(&fresh)).await;

        tokio::time::sleep(Duration::from_millis(150)).await;
        assert!(registry.get(&fresh.id()).await.is_some());

        let expired = registry.expire_idle(Duration::from_millis(100)).await;
        assert_eq!(expired, vec![stale.id()]);
        assert!(registry.get(&stale.id()).await.is_none());
        assert!(registry.get(&fresh.id()).await.is_some());
        assert_eq!(registry.len().await, 1);
    }

    #[tokio::test]
    async fn test_working_session_is_not_expired() {
        let (producers, bus) = producers();
        let registry = SessionRegistry::new();
        let session = SessionController::new(producers, ExtensionRule::FirstToken, bus);
        session.mount().await.await.unwrap();
        session
            .select_file(UploadedFile::from_bytes("long.wav", Vec::new()))
            .await;
        assert_eq!(session.phase().await, SessionPhase::Transcribing);
        registry.insert(Arc::clone(&session)).await;

        let expired = registry.expire_idle(Duration::ZERO).await;
        assert!(expired.is_empty());
        assert_eq!(registry.len().await, 1);

        session.reset().await;
        let expired = registry.expire_idle(Duration::ZERO).await;
        assert_eq!(expired, vec![session.id()]);
        assert!(registry.is_empty().await);
    }

    #[tokio::test]
    async fn test_touch_reports_missing_sessions() {
        let registry = SessionRegistry::new();
        assert!(!registry.touch(&Uuid::new_v4()).await);
    }
}
