// src/adapter/repository.rs

//! Ordered registry of adapters
//!
//! Registration order is matching priority: the first registered adapter
//! whose specification holds wins. Registering or removing an adapter is
//! announced on a broadcast channel so parked transformations can be
//! retried as soon as a new adapter shows up.

use super::decorate::DecoratorChain;
use super::{Adapter, Source};
use crate::identity::SourceObject;
use crate::properties::PropertySet;
use parking_lot::RwLock;
use std::fmt;
use std::sync::Arc;
use tokio::sync::broadcast;
use tracing::{debug, info};
use uuid::Uuid;

/// Capacity of the adapter event channel
const EVENT_CAPACITY: usize = 64;

/// Handle returned by [`AdapterRepository::register`], used to unregister
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct AdapterHandle(Uuid);

impl fmt::Display for AdapterHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Change in the set of registered adapters
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AdapterEvent {
    Registered { handle: AdapterHandle, name: String },
    Unregistered { handle: AdapterHandle, name: String },
}

/// An adapter together with its post-processing chain
pub struct RegisteredAdapter {
    handle: AdapterHandle,
    adapter: Arc<dyn Adapter>,
    chain: DecoratorChain,
}

impl RegisteredAdapter {
    pub fn handle(&self) -> AdapterHandle {
        self.handle
    }

    pub fn name(&self) -> &str {
        self.adapter.name()
    }

    pub fn is_satisfied_by(&self, metadata: &PropertySet, source: Source<'_>) -> bool {
        self.adapter.is_satisfied_by(metadata, source)
    }

    /// Adapt the source and post-process the result if it is a property set
    pub fn adapt(&self, source: Source<'_>) -> Option<SourceObject> {
        let adapted = self.adapter.adapt(source)?;

        match adapted.downcast_ref::<PropertySet>() {
            Some(props) => {
                let mut props = props.clone();
                self.chain.apply(self.name(), &mut props);
                Some(Arc::new(props))
            }
            None => Some(adapted),
        }
    }
}

impl fmt::Debug for RegisteredAdapter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RegisteredAdapter")
            .field("handle", &self.handle)
            .field("name", &self.name())
            .field("chain", &self.chain)
            .finish()
    }
}

/// Thread-safe, ordered adapter registry
pub struct AdapterRepository {
    adapters: RwLock<Vec<Arc<RegisteredAdapter>>>,
    chain: DecoratorChain,
    events: broadcast::Sender<AdapterEvent>,
}

impl AdapterRepository {
    /// Create a repository wrapping adapters in the standard chain
    pub fn new() -> Self {
        Self::with_chain(DecoratorChain::standard())
    }

    /// Create a repository using a custom post-processing chain
    pub fn with_chain(chain: DecoratorChain) -> Self {
        let (events, _) = broadcast::channel(EVENT_CAPACITY);
        Self {
            adapters: RwLock::new(Vec::new()),
            chain,
            events,
        }
    }

    /// Register an adapter at the lowest priority
    pub fn register(&self, adapter: Arc<dyn Adapter>) -> AdapterHandle {
        let handle = AdapterHandle(Uuid::new_v4());
        let name = adapter.name().to_string();

        self.adapters.write().push(Arc::new(RegisteredAdapter {
            handle,
            adapter,
            chain: self.chain.clone(),
        }));

        info!("Registered adapter '{}' ({})", name, handle);
        // No subscribers is fine
        let _ = self.events.send(AdapterEvent::Registered { handle, name });
        handle
    }

    /// Remove a previously registered adapter
    ///
    /// Returns false if the handle is unknown.
    pub fn unregister(&self, handle: &AdapterHandle) -> bool {
        let removed = {
            let mut adapters = self.adapters.write();
            adapters
                .iter()
                .position(|a| a.handle == *handle)
                .map(|pos| adapters.remove(pos))
        };

        match removed {
            Some(adapter) => {
                let name = adapter.name().to_string();
                info!("Unregistered adapter '{}' ({})", name, handle);
                let _ = self.events.send(AdapterEvent::Unregistered { handle: *handle, name });
                true
            }
            None => {
                debug!("Unregister of unknown adapter handle {}", handle);
                false
            }
        }
    }

    /// Find the first adapter able to handle the source
    ///
    /// The registry lock is released before the caller runs the adapter.
    pub fn find(
        &self,
        metadata: &PropertySet,
        source: Source<'_>,
    ) -> Option<Arc<RegisteredAdapter>> {
        self.adapters
            .read()
            .iter()
            .find(|a| a.is_satisfied_by(metadata, source))
            .cloned()
    }

    /// Subscribe to registration changes
    pub fn subscribe(&self) -> broadcast::Receiver<AdapterEvent> {
        self.events.subscribe()
    }

    /// Names of registered adapters in priority order
    pub fn names(&self) -> Vec<String> {
        self.adapters.read().iter().map(|a| a.name().to_string()).collect()
    }

    pub fn len(&self) -> usize {
        self.adapters.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.adapters.read().is_empty()
    }
}

impl Default for AdapterRepository {
    fn default() -> Self {
        Self::new()
    }
}
