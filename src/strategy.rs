// src/strategy.rs

//! Identity-specific behaviour: pid vs factory configurations
//!
//! A [`ConfigurationStrategy`] knows how to stamp routing metadata for its
//! kind of identity and how to build the commands that apply or remove a
//! configuration. The commands carry a [`ConfigurationLookup`] that locates
//! the existing configuration in the sink.
//!
//! Factory instances are located through the
//! [`INFO_FACTORY_INSTANCE`](crate::properties::INFO_FACTORY_INSTANCE)
//! marker that the factory strategy stamps into the metadata, so factory
//! updates are equality-gated just like plain pid updates.

use crate::command::{DeleteCommand, SinkCommand, UpdateCommand};
use crate::error::Result;
use crate::identity::{ConfigurationSource, ConfigurationTarget, Identity, IdentityKind};
use crate::properties::{INFO_FACTORY_INSTANCE, KeySpec, SERVICE_FACTORYPID, SERVICE_PID};
use crate::sink::{ConfigurationHandle, ConfigurationSink};
use async_trait::async_trait;
use std::sync::Arc;
use tracing::{debug, trace};

/// Locates and creates configurations in a sink for a given identity
#[async_trait]
pub trait ConfigurationLookup: Send + Sync {
    /// Find the existing configuration for the identity
    async fn find(
        &self,
        sink: &dyn ConfigurationSink,
        identity: &Identity,
    ) -> Result<Option<Box<dyn ConfigurationHandle>>>;

    /// Create a fresh configuration for the identity
    async fn create(
        &self,
        sink: &dyn ConfigurationSink,
        identity: &Identity,
    ) -> Result<Box<dyn ConfigurationHandle>>;

    /// Keys left out when comparing stored against desired properties
    fn ignored_keys(&self) -> &KeySpec;
}

/// Lookup by pid and location
pub struct PidLookup {
    ignored: KeySpec,
}

impl PidLookup {
    pub fn new() -> Self {
        Self { ignored: KeySpec::info() }
    }
}

impl Default for PidLookup {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl ConfigurationLookup for PidLookup {
    async fn find(
        &self,
        sink: &dyn ConfigurationSink,
        identity: &Identity,
    ) -> Result<Option<Box<dyn ConfigurationHandle>>> {
        match identity.as_pid() {
            Some(pid) => sink.get_configuration(pid, identity.location()).await,
            None => Ok(None),
        }
    }

    async fn create(
        &self,
        sink: &dyn ConfigurationSink,
        identity: &Identity,
    ) -> Result<Box<dyn ConfigurationHandle>> {
        match identity.kind() {
            IdentityKind::Pid(pid) => sink.create_configuration(pid, identity.location()).await,
            IdentityKind::Factory { factory_pid, .. } => {
                sink.create_factory_configuration(factory_pid, identity.location()).await
            }
        }
    }

    fn ignored_keys(&self) -> &KeySpec {
        &self.ignored
    }
}

/// Lookup of a factory instance by its instance marker
///
/// The identity's location takes no part in the lookup: the same factory pid
/// and instance name always resolve to the same stored instance, and the
/// location is only applied as its binding when the instance is written.
pub struct FactoryLookup {
    ignored: KeySpec,
}

impl FactoryLookup {
    pub fn new() -> Self {
        // The sink assigns the instance pid, so it never matches the desired set
        Self {
            ignored: KeySpec::info().or(KeySpec::literal(SERVICE_PID)),
        }
    }
}

impl Default for FactoryLookup {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl ConfigurationLookup for FactoryLookup {
    async fn find(
        &self,
        sink: &dyn ConfigurationSink,
        identity: &Identity,
    ) -> Result<Option<Box<dyn ConfigurationHandle>>> {
        let Some((factory_pid, instance)) = identity.as_factory() else {
            return Ok(None);
        };

        for handle in sink.list_factory_configurations(factory_pid).await? {
            let properties = handle.properties().await?;
            let marker = properties.as_ref().and_then(|p| p.get_str(INFO_FACTORY_INSTANCE));
            if marker == Some(instance) {
                trace!("Factory instance {} is {}", identity, handle.pid());
                return Ok(Some(handle));
            }
        }
        Ok(None)
    }

    async fn create(
        &self,
        sink: &dyn ConfigurationSink,
        identity: &Identity,
    ) -> Result<Box<dyn ConfigurationHandle>> {
        match identity.kind() {
            IdentityKind::Factory { factory_pid, .. } => {
                sink.create_factory_configuration(factory_pid, identity.location()).await
            }
            IdentityKind::Pid(pid) => sink.create_configuration(pid, identity.location()).await,
        }
    }

    fn ignored_keys(&self) -> &KeySpec {
        &self.ignored
    }
}

/// Per-identity-kind preparation and command construction
pub trait ConfigurationStrategy: Send + Sync {
    /// Stamp routing metadata; called once per transformation
    fn prepare_source(&self, source: &mut ConfigurationSource);

    fn create_update_command(&self, target: ConfigurationTarget) -> SinkCommand;

    fn create_delete_command(&self, identity: Identity) -> SinkCommand;
}

/// Strategy for singleton configurations
pub struct PidStrategy {
    lookup: Arc<dyn ConfigurationLookup>,
}

impl PidStrategy {
    pub fn new() -> Self {
        Self {
            lookup: Arc::new(PidLookup::new()),
        }
    }
}

impl Default for PidStrategy {
    fn default() -> Self {
        Self::new()
    }
}

impl ConfigurationStrategy for PidStrategy {
    fn prepare_source(&self, source: &mut ConfigurationSource) {
        let Some(pid) = source.identity.as_pid() else {
            debug!("Pid strategy given factory identity {}", source.identity);
            return;
        };

        let metadata = &mut source.properties_source.metadata;
        metadata.insert(SERVICE_PID, pid);
        metadata.remove(SERVICE_FACTORYPID);
        metadata.remove(INFO_FACTORY_INSTANCE);
    }

    fn create_update_command(&self, target: ConfigurationTarget) -> SinkCommand {
        Box::new(UpdateCommand::new(target, Arc::clone(&self.lookup)))
    }

    fn create_delete_command(&self, identity: Identity) -> SinkCommand {
        Box::new(DeleteCommand::new(identity, Arc::clone(&self.lookup)))
    }
}

/// Strategy for factory configuration instances
pub struct FactoryPidStrategy {
    lookup: Arc<dyn ConfigurationLookup>,
}

impl FactoryPidStrategy {
    pub fn new() -> Self {
        Self {
            lookup: Arc::new(FactoryLookup::new()),
        }
    }
}

impl Default for FactoryPidStrategy {
    fn default() -> Self {
        Self::new()
    }
}

impl ConfigurationStrategy for FactoryPidStrategy {
    fn prepare_source(&self, source: &mut ConfigurationSource) {
        let Some((factory_pid, instance)) = source.identity.as_factory() else {
            debug!("Factory strategy given pid identity {}", source.identity);
            return;
        };

        let metadata = &mut source.properties_source.metadata;
        metadata.insert(SERVICE_FACTORYPID, factory_pid);
        metadata.insert(INFO_FACTORY_INSTANCE, instance);
        metadata.remove(SERVICE_PID);
    }

    fn create_update_command(&self, target: ConfigurationTarget) -> SinkCommand {
        Box::new(UpdateCommand::new(target, Arc::clone(&self.lookup)))
    }

    fn create_delete_command(&self, identity: Identity) -> SinkCommand {
        Box::new(DeleteCommand::new(identity, Arc::clone(&self.lookup)))
    }
}

/// Pick the strategy matching an identity's kind
pub fn strategy_for(identity: &Identity) -> Arc<dyn ConfigurationStrategy> {
    if identity.is_factory() {
        Arc::new(FactoryPidStrategy::new())
    } else {
        Arc::new(PidStrategy::new())
    }
}
