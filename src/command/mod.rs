// src/command/mod.rs

//! Commands applied against a target service
//!
//! A [`Command`] is a unit of work queued on a [`CommandProcessor`] and run
//! once the target is available. The pipeline's commands target a
//! [`ConfigurationSink`]: [`UpdateCommand`] writes a configuration unless the
//! stored content already matches, [`DeleteCommand`] removes one if present.

mod processor;

pub use processor::{CommandEvent, CommandProcessor, ProcessorMetrics, ProcessorState};
pub(crate) use processor::{Counters, Worker};

use crate::error::Result;
use crate::identity::{ConfigurationTarget, Identity};
use crate::properties::equal_ignoring;
use crate::sink::ConfigurationSink;
use crate::strategy::ConfigurationLookup;
use async_trait::async_trait;
use std::fmt;
use std::sync::Arc;
use tracing::{debug, info};

/// Work to run against a target service of type `T`
#[async_trait]
pub trait Command<T: ?Sized + Sync>: Send + Sync + fmt::Display {
    async fn execute(&self, target: &T) -> Result<CommandOutcome>;
}

/// Command aimed at the configuration sink
pub type SinkCommand = Box<dyn Command<dyn ConfigurationSink>>;

/// What a successfully executed command did
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CommandOutcome {
    /// Properties were written
    Applied,
    /// Stored properties already matched, nothing written
    Unchanged,
    /// The configuration was removed
    Deleted,
    /// Nothing to delete
    Missing,
}

impl fmt::Display for CommandOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Applied => "applied",
            Self::Unchanged => "unchanged",
            Self::Deleted => "deleted",
            Self::Missing => "missing",
        };
        write!(f, "{}", s)
    }
}

/// Write a configuration target to the sink
pub struct UpdateCommand {
    target: ConfigurationTarget,
    lookup: Arc<dyn ConfigurationLookup>,
}

impl UpdateCommand {
    pub fn new(target: ConfigurationTarget, lookup: Arc<dyn ConfigurationLookup>) -> Self {
        Self { target, lookup }
    }

    pub fn target(&self) -> &ConfigurationTarget {
        &self.target
    }
}

#[async_trait]
impl Command<dyn ConfigurationSink> for UpdateCommand {
    async fn execute(&self, sink: &dyn ConfigurationSink) -> Result<CommandOutcome> {
        let identity = &self.target.identity;
        let desired = self.target.properties();

        let handle = match self.lookup.find(sink, identity).await? {
            Some(handle) => {
                let current = handle.properties().await?;
                if equal_ignoring(self.lookup.ignored_keys(), current.as_ref(), Some(desired)) {
                    debug!("Configuration {} unchanged, skipping update", identity);
                    return Ok(CommandOutcome::Unchanged);
                }
                handle
            }
            None => self.lookup.create(sink, identity).await?,
        };

        handle.set_bundle_location(identity.location()).await?;
        handle.update(desired.clone()).await?;
        info!("Updated configuration {} ({})", identity, handle.pid());
        Ok(CommandOutcome::Applied)
    }
}

impl fmt::Display for UpdateCommand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "update {}", self.target.identity)
    }
}

/// Remove a configuration from the sink
pub struct DeleteCommand {
    identity: Identity,
    lookup: Arc<dyn ConfigurationLookup>,
}

impl DeleteCommand {
    pub fn new(identity: Identity, lookup: Arc<dyn ConfigurationLookup>) -> Self {
        Self { identity, lookup }
    }

    pub fn identity(&self) -> &Identity {
        &self.identity
    }
}

#[async_trait]
impl Command<dyn ConfigurationSink> for DeleteCommand {
    async fn execute(&self, sink: &dyn ConfigurationSink) -> Result<CommandOutcome> {
        match self.lookup.find(sink, &self.identity).await? {
            Some(handle) => {
                handle.delete().await?;
                info!("Deleted configuration {} ({})", self.identity, handle.pid());
                Ok(CommandOutcome::Deleted)
            }
            None => {
                debug!("Configuration {} already gone", self.identity);
                Ok(CommandOutcome::Missing)
            }
        }
    }
}

impl fmt::Display for DeleteCommand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "delete {}", self.identity)
    }
}
