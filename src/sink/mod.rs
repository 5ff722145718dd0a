// src/sink/mod.rs

//! The configuration sink - where committed configuration lives
//!
//! The sink is the central configuration store that downstream consumers
//! watch. It may come and go at runtime; the command processor holds work
//! until one is available. [`MemorySink`] is an in-process implementation.

mod memory;

pub use memory::{ConfigurationEvent, MemorySink, StoredConfiguration};

use crate::error::Result;
use crate::properties::PropertySet;
use async_trait::async_trait;

/// A configuration store
#[async_trait]
pub trait ConfigurationSink: Send + Sync {
    /// Look up a configuration by pid, `None` if it does not exist
    async fn get_configuration(
        &self,
        pid: &str,
        location: Option<&str>,
    ) -> Result<Option<Box<dyn ConfigurationHandle>>>;

    /// Get or create the configuration for a pid
    async fn create_configuration(
        &self,
        pid: &str,
        location: Option<&str>,
    ) -> Result<Box<dyn ConfigurationHandle>>;

    /// Create a new instance of a factory configuration
    async fn create_factory_configuration(
        &self,
        factory_pid: &str,
        location: Option<&str>,
    ) -> Result<Box<dyn ConfigurationHandle>>;

    /// All existing instances of a factory configuration
    async fn list_factory_configurations(
        &self,
        factory_pid: &str,
    ) -> Result<Vec<Box<dyn ConfigurationHandle>>>;
}

/// Handle on a single stored configuration
#[async_trait]
pub trait ConfigurationHandle: Send + Sync {
    fn pid(&self) -> &str;

    fn factory_pid(&self) -> Option<&str>;

    /// Current properties, `None` if the configuration was never updated
    async fn properties(&self) -> Result<Option<PropertySet>>;

    async fn set_bundle_location(&self, location: Option<&str>) -> Result<()>;

    /// Replace the configuration's properties
    async fn update(&self, properties: PropertySet) -> Result<()>;

    async fn delete(&self) -> Result<()>;
}
