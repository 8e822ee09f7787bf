//! Registry of running engines keyed by channel-group id.
//!
//! Engines are spawned on first use and evicted when their task exits, whether
//! through an idle timeout, an explicit shutdown or a crash.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use crate::actor::{EngineHandle, spawn_engine};
use crate::config::ResolvedConfig;
use crate::events::EventBus;
use crate::transport::VoiceConnector;

#[derive(Clone)]
pub struct EngineRegistry {
    engines: Arc<Mutex<HashMap<String, EngineHandle>>>,
    connector: Arc<dyn VoiceConnector>,
    config: Arc<ResolvedConfig>,
    events: EventBus,
}

impl EngineRegistry {
    pub fn new(
        connector: Arc<dyn VoiceConnector>,
        config: Arc<ResolvedConfig>,
        events: EventBus,
    ) -> Self {
        Self {
            engines: Arc::new(Mutex::new(HashMap::new())),
            connector,
            config,
            events,
        }
    }

    pub fn events(&self) -> &EventBus {
        &self.events
    }

    /// Return the engine for `group`, spawning one if none is running.
    pub fn get_or_spawn(&self, group: &str) -> EngineHandle {
        let mut engines = self.engines.lock().unwrap_or_else(|err| err.into_inner());
        if let Some(handle) = engines.get(group).filter(|h| !h.is_closed()) {
            return handle.clone();
        }
        let (handle, task) = spawn_engine(
            group,
            self.connector.clone(),
            self.config.clone(),
            self.events.clone(),
        );
        engines.insert(group.to_string(), handle.clone());
        tracing::info!(group = %group, id = %handle.id(), "engine created");

        let registry = Arc::downgrade(&self.engines);
        let events = self.events.clone();
        let group = group.to_string();
        let id = handle.id();
        tokio::spawn(async move {
            if let Err(err) = task.await {
                tracing::error!(group = %group, error = %err, "engine task crashed");
            }
            if let Some(engines) = registry.upgrade() {
                let mut engines = engines.lock().unwrap_or_else(|err| err.into_inner());
                if engines.get(&group).map(EngineHandle::id) == Some(id) {
                    engines.remove(&group);
                }
            }
            tracing::info!(group = %group, id = %id, "engine evicted");
            events.engine_evicted(&group);
        });
        handle
    }

    /// Running engine for `group`, if any.
    pub fn get(&self, group: &str) -> Option<EngineHandle> {
        self.engines
            .lock()
            .ok()
            .and_then(|engines| engines.get(group).filter(|h| !h.is_closed()).cloned())
    }

    /// Sorted ids of groups with a registered engine.
    pub fn groups(&self) -> Vec<String> {
        let mut groups: Vec<String> = self
            .engines
            .lock()
            .map(|engines| engines.keys().cloned().collect())
            .unwrap_or_default();
        groups.sort();
        groups
    }

    /// Ask every engine to shut down.
    pub async fn shutdown_all(&self) {
        let handles: Vec<EngineHandle> = self
            .engines
            .lock()
            .map(|engines| engines.values().cloned().collect())
            .unwrap_or_default();
        for handle in handles {
            if let Err(err) = handle.shutdown().await {
                tracing::debug!(group = %handle.group(), error = %err, "engine already stopped");
            }
        }
    }
}
