// src/sink/memory.rs

//! In-memory configuration store
//!
//! Behaves like a configuration admin service: updates stamp the service
//! keys into the stored properties, factory instances get generated pids
//! (`<factoryPid>.<n>`), and every change is broadcast to subscribers.

use super::{ConfigurationHandle, ConfigurationSink};
use crate::error::{Error, Result};
use crate::properties::{PropertySet, SERVICE_FACTORYPID, SERVICE_PID};
use async_trait::async_trait;
use parking_lot::Mutex;
use serde::Serialize;
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use tokio::sync::broadcast;
use tracing::debug;

/// Capacity of the change notification channel
const EVENT_CAPACITY: usize = 256;

/// A configuration as held by the store
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StoredConfiguration {
    pub pid: String,
    pub factory_pid: Option<String>,
    pub location: Option<String>,
    pub properties: Option<PropertySet>,
}

/// Change notification for downstream consumers
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConfigurationEvent {
    Updated { pid: String, factory_pid: Option<String> },
    Deleted { pid: String, factory_pid: Option<String> },
}

#[derive(Default)]
struct Store {
    configs: BTreeMap<String, StoredConfiguration>,
    factory_seq: HashMap<String, u64>,
}

struct Shared {
    store: Mutex<Store>,
    events: broadcast::Sender<ConfigurationEvent>,
    updates: AtomicU64,
    deletes: AtomicU64,
}

/// Thread-safe in-memory configuration sink
#[derive(Clone)]
pub struct MemorySink {
    shared: Arc<Shared>,
}

impl MemorySink {
    pub fn new() -> Self {
        let (events, _) = broadcast::channel(EVENT_CAPACITY);
        Self {
            shared: Arc::new(Shared {
                store: Mutex::new(Store::default()),
                events,
                updates: AtomicU64::new(0),
                deletes: AtomicU64::new(0),
            }),
        }
    }

    /// Subscribe to configuration changes
    pub fn subscribe(&self) -> broadcast::Receiver<ConfigurationEvent> {
        self.shared.events.subscribe()
    }

    /// Copy of a stored configuration
    pub fn get(&self, pid: &str) -> Option<StoredConfiguration> {
        self.shared.store.lock().configs.get(pid).cloned()
    }

    /// Copy of every stored configuration, ordered by pid
    pub fn snapshot(&self) -> Vec<StoredConfiguration> {
        self.shared.store.lock().configs.values().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.shared.store.lock().configs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Number of `update` calls served
    pub fn update_count(&self) -> u64 {
        self.shared.updates.load(Ordering::Relaxed)
    }

    /// Number of `delete` calls served
    pub fn delete_count(&self) -> u64 {
        self.shared.deletes.load(Ordering::Relaxed)
    }

    fn handle(&self, config: &StoredConfiguration) -> Box<dyn ConfigurationHandle> {
        Box::new(MemoryHandle {
            pid: config.pid.clone(),
            factory_pid: config.factory_pid.clone(),
            shared: Arc::clone(&self.shared),
        })
    }
}

impl Default for MemorySink {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl ConfigurationSink for MemorySink {
    async fn get_configuration(
        &self,
        pid: &str,
        _location: Option<&str>,
    ) -> Result<Option<Box<dyn ConfigurationHandle>>> {
        let store = self.shared.store.lock();
        Ok(store.configs.get(pid).map(|c| self.handle(c)))
    }

    async fn create_configuration(
        &self,
        pid: &str,
        location: Option<&str>,
    ) -> Result<Box<dyn ConfigurationHandle>> {
        let mut store = self.shared.store.lock();
        let config = store
            .configs
            .entry(pid.to_string())
            .or_insert_with(|| StoredConfiguration {
                pid: pid.to_string(),
                factory_pid: None,
                location: location.map(str::to_string),
                properties: None,
            });
        Ok(self.handle(config))
    }

    async fn create_factory_configuration(
        &self,
        factory_pid: &str,
        location: Option<&str>,
    ) -> Result<Box<dyn ConfigurationHandle>> {
        let mut store = self.shared.store.lock();
        let seq = store.factory_seq.entry(factory_pid.to_string()).or_insert(0);
        *seq += 1;
        let pid = format!("{}.{}", factory_pid, seq);

        debug!("Created factory configuration {}", pid);
        let config = StoredConfiguration {
            pid: pid.clone(),
            factory_pid: Some(factory_pid.to_string()),
            location: location.map(str::to_string),
            properties: None,
        };
        let handle = self.handle(&config);
        store.configs.insert(pid, config);
        Ok(handle)
    }

    async fn list_factory_configurations(
        &self,
        factory_pid: &str,
    ) -> Result<Vec<Box<dyn ConfigurationHandle>>> {
        let store = self.shared.store.lock();
        Ok(store
            .configs
            .values()
            .filter(|c| c.factory_pid.as_deref() == Some(factory_pid))
            .map(|c| self.handle(c))
            .collect())
    }
}

struct MemoryHandle {
    pid: String,
    factory_pid: Option<String>,
    shared: Arc<Shared>,
}

impl MemoryHandle {
    fn with_config<R>(&self, f: impl FnOnce(&mut StoredConfiguration) -> R) -> Result<R> {
        let mut store = self.shared.store.lock();
        store
            .configs
            .get_mut(&self.pid)
            .map(f)
            .ok_or_else(|| Error::ConfigurationDeleted(self.pid.clone()))
    }
}

#[async_trait]
impl ConfigurationHandle for MemoryHandle {
    fn pid(&self) -> &str {
        &self.pid
    }

    fn factory_pid(&self) -> Option<&str> {
        self.factory_pid.as_deref()
    }

    async fn properties(&self) -> Result<Option<PropertySet>> {
        self.with_config(|c| c.properties.clone())
    }

    async fn set_bundle_location(&self, location: Option<&str>) -> Result<()> {
        self.with_config(|c| c.location = location.map(str::to_string))
    }

    async fn update(&self, mut properties: PropertySet) -> Result<()> {
        properties.insert(SERVICE_PID, self.pid.as_str());
        if let Some(factory_pid) = &self.factory_pid {
            properties.insert(SERVICE_FACTORYPID, factory_pid.as_str());
        }

        self.with_config(|c| c.properties = Some(properties))?;
        self.shared.updates.fetch_add(1, Ordering::Relaxed);

        let _ = self.shared.events.send(ConfigurationEvent::Updated {
            pid: self.pid.clone(),
            factory_pid: self.factory_pid.clone(),
        });
        Ok(())
    }

    async fn delete(&self) -> Result<()> {
        let removed = self.shared.store.lock().configs.remove(&self.pid);
        if removed.is_none() {
            return Err(Error::ConfigurationDeleted(self.pid.clone()));
        }
        self.shared.deletes.fetch_add(1, Ordering::Relaxed);

        let _ = self.shared.events.send(ConfigurationEvent::Deleted {
            pid: self.pid.clone(),
            factory_pid: self.factory_pid.clone(),
        });
        Ok(())
    }
}
