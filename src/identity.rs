// src/identity.rs

//! Configuration identities and the source/target envelopes built around them
//!
//! An [`Identity`] names the configuration a change is aimed at: either a
//! plain persistent id or a factory pid plus an instance name, optionally
//! bound to a location. Malformed identities are rejected at construction so
//! nothing downstream has to second-guess them.

use crate::error::{Error, Result};
use crate::properties::PropertySet;
use std::any::Any;
use std::fmt;
use std::sync::Arc;

/// A not-yet-adapted payload: file path, raw bytes, a map, anything
pub type SourceObject = Arc<dyn Any + Send + Sync>;

/// What kind of configuration an identity names
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum IdentityKind {
    /// A singleton configuration
    Pid(String),
    /// One instance of a factory configuration
    Factory { factory_pid: String, instance: String },
}

/// Immutable name of a configuration target
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Identity {
    kind: IdentityKind,
    location: Option<String>,
}

impl Identity {
    /// Identity of a plain pid configuration
    pub fn pid(pid: impl Into<String>) -> Result<Self> {
        let pid = non_empty("pid", pid.into())?;
        Ok(Self {
            kind: IdentityKind::Pid(pid),
            location: None,
        })
    }

    /// Identity of a factory configuration instance
    pub fn factory(factory_pid: impl Into<String>, instance: impl Into<String>) -> Result<Self> {
        let factory_pid = non_empty("factory pid", factory_pid.into())?;
        let instance = non_empty("factory instance", instance.into())?;
        Ok(Self {
            kind: IdentityKind::Factory { factory_pid, instance },
            location: None,
        })
    }

    /// Build an identity from loose parts as delivered by scanners
    ///
    /// Exactly one of `pid` or (`factory_pid` and `instance`) must be set.
    pub fn from_parts(
        pid: Option<&str>,
        factory_pid: Option<&str>,
        instance: Option<&str>,
        location: Option<&str>,
    ) -> Result<Self> {
        let identity = match (pid, factory_pid, instance) {
            (Some(pid), None, None) => Self::pid(pid)?,
            (None, Some(factory_pid), Some(instance)) => Self::factory(factory_pid, instance)?,
            (Some(_), Some(_), _) | (Some(_), _, Some(_)) => {
                return Err(Error::InvalidIdentity(
                    "both pid and factory pid/instance given".to_string(),
                ));
            }
            (None, Some(_), None) | (None, None, Some(_)) => {
                return Err(Error::InvalidIdentity(
                    "factory pid and instance must be given together".to_string(),
                ));
            }
            (None, None, None) => {
                return Err(Error::InvalidIdentity(
                    "neither pid nor factory pid given".to_string(),
                ));
            }
        };

        Ok(match location {
            Some(location) => identity.with_location(location),
            None => identity,
        })
    }

    /// Bind the configuration to a location
    pub fn with_location(mut self, location: impl Into<String>) -> Self {
        self.location = Some(location.into());
        self
    }

    pub fn kind(&self) -> &IdentityKind {
        &self.kind
    }

    pub fn location(&self) -> Option<&str> {
        self.location.as_deref()
    }

    /// The plain pid, if this is not a factory identity
    pub fn as_pid(&self) -> Option<&str> {
        match &self.kind {
            IdentityKind::Pid(pid) => Some(pid),
            IdentityKind::Factory { .. } => None,
        }
    }

    /// Factory pid and instance, if this is a factory identity
    pub fn as_factory(&self) -> Option<(&str, &str)> {
        match &self.kind {
            IdentityKind::Pid(_) => None,
            IdentityKind::Factory { factory_pid, instance } => Some((factory_pid, instance)),
        }
    }

    pub fn is_factory(&self) -> bool {
        matches!(self.kind, IdentityKind::Factory { .. })
    }
}

impl fmt::Display for Identity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.kind {
            IdentityKind::Pid(pid) => write!(f, "{}", pid)?,
            IdentityKind::Factory {
                factory_pid,
                instance,
            } => write!(f, "{}-{}", factory_pid, instance)?,
        }
        if let Some(location) = &self.location {
            write!(f, "@{}", location)?;
        }
        Ok(())
    }
}

fn non_empty(what: &str, value: String) -> Result<String> {
    if value.trim().is_empty() {
        return Err(Error::InvalidIdentity(format!("{} must not be empty", what)));
    }
    Ok(value)
}

/// Raw payload plus the routing metadata that travels with it
///
/// Strategies stamp the metadata in place, so every source owns its copy.
pub struct PropertiesSource {
    pub source_object: SourceObject,
    pub metadata: PropertySet,
}

impl PropertiesSource {
    pub fn new(source_object: SourceObject, metadata: PropertySet) -> Self {
        Self {
            source_object,
            metadata,
        }
    }
}

impl fmt::Debug for PropertiesSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PropertiesSource")
            .field("metadata", &self.metadata)
            .finish_non_exhaustive()
    }
}

/// Adapted properties, ready to be committed
#[derive(Debug, Clone, PartialEq)]
pub struct PropertiesTarget {
    pub properties: PropertySet,
}

/// Input to a transformation
#[derive(Debug)]
pub struct ConfigurationSource {
    pub identity: Identity,
    pub properties_source: PropertiesSource,
}

impl ConfigurationSource {
    pub fn new(identity: Identity, source_object: SourceObject, metadata: PropertySet) -> Self {
        Self {
            identity,
            properties_source: PropertiesSource::new(source_object, metadata),
        }
    }
}

/// Output of a transformation, input to an update command
#[derive(Debug, Clone, PartialEq)]
pub struct ConfigurationTarget {
    pub identity: Identity,
    pub properties_target: PropertiesTarget,
}

impl ConfigurationTarget {
    pub fn new(identity: Identity, properties: PropertySet) -> Self {
        Self {
            identity,
            properties_target: PropertiesTarget { properties },
        }
    }

    pub fn properties(&self) -> &PropertySet {
        &self.properties_target.properties
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pid_identity() {
        let id = Identity::pid("org.example.http").unwrap();
        assert_eq!(id.as_pid(), Some("org.example.http"));
        assert!(id.as_factory().is_none());
        assert!(id.location().is_none());
        assert_eq!(id.to_string(), "org.example.http");
    }

    #[test]
    fn test_factory_identity_with_location() {
        let id = Identity::factory("org.example.pool", "primary")
            .unwrap()
            .with_location("bundle:core");
        assert_eq!(id.as_factory(), Some(("org.example.pool", "primary")));
        assert!(id.is_factory());
        assert_eq!(id.location(), Some("bundle:core"));
        assert_eq!(id.to_string(), "org.example.pool-primary@bundle:core");
    }

    #[test]
    fn test_from_parts_rejects_malformed() {
        assert!(Identity::from_parts(None, None, None, None).is_err());
        assert!(Identity::from_parts(Some("a"), Some("f"), Some("i"), None).is_err());
        assert!(Identity::from_parts(None, Some("f"), None, None).is_err());
        assert!(Identity::from_parts(None, None, Some("i"), None).is_err());
        assert!(Identity::from_parts(Some("  "), None, None, None).is_err());
    }

    #[test]
    fn test_from_parts_accepts_valid() {
        let pid = Identity::from_parts(Some("a"), None, None, Some("loc")).unwrap();
        assert_eq!(pid.as_pid(), Some("a"));
        assert_eq!(pid.location(), Some("loc"));

        let factory = Identity::from_parts(None, Some("f"), Some("i"), None).unwrap();
        assert_eq!(factory.as_factory(), Some(("f", "i")));
    }
}
