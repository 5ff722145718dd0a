// src/transform/mod.rs

//! The transformation engine
//!
//! A [`Transformation`] turns one configuration source into an update
//! command. It repeatedly asks the adapter repository for an adapter that
//! accepts the current object and applies it, until the result is a
//! [`PropertySet`]. The attempt is abandoned when no adapter matches, when
//! an adapter declines, or when an adapter hands back an object of the same
//! concrete type it was given (no progress).
//!
//! An abandoned transformation is not an error. It can be executed again
//! later, typically after new adapters have been registered.

mod processor;

pub use processor::{TransformationEvent, TransformationsProcessor};

use crate::adapter::AdapterRepository;
use crate::command::SinkCommand;
use crate::identity::{ConfigurationSource, ConfigurationTarget, Identity, SourceObject};
use crate::properties::{KeySpec, PropertySet, copy};
use crate::strategy::ConfigurationStrategy;
use std::any::Any;
use std::fmt;
use std::sync::Arc;
use tracing::{debug, trace, warn};

/// A configuration source on its way to becoming a command
pub struct Transformation {
    source: ConfigurationSource,
    strategy: Arc<dyn ConfigurationStrategy>,
}

impl Transformation {
    /// Wrap a source, letting the strategy stamp its metadata
    pub fn new(mut source: ConfigurationSource, strategy: Arc<dyn ConfigurationStrategy>) -> Self {
        strategy.prepare_source(&mut source);
        Self { source, strategy }
    }

    pub fn identity(&self) -> &Identity {
        &self.source.identity
    }

    pub fn source(&self) -> &ConfigurationSource {
        &self.source
    }

    /// Run the adapter chain and build the update command
    ///
    /// Returns `None` when the source cannot be adapted (yet).
    pub fn execute(&self, repository: &AdapterRepository) -> Option<SinkCommand> {
        let target = self.target(repository)?;
        Some(self.strategy.create_update_command(target))
    }

    /// Adapt the source and merge in the reserved metadata keys
    pub fn target(&self, repository: &AdapterRepository) -> Option<ConfigurationTarget> {
        let mut properties = self.adapt(repository)?;
        // Reserved keys always come from the metadata
        copy(&KeySpec::reserved(), &self.source.properties_source.metadata, &mut properties);
        Some(ConfigurationTarget::new(self.source.identity.clone(), properties))
    }

    /// Run the adapter chain only, returning the adapted property set
    pub fn adapt(&self, repository: &AdapterRepository) -> Option<PropertySet> {
        let metadata = &self.source.properties_source.metadata;
        let mut current: SourceObject = Arc::clone(&self.source.properties_source.source_object);
        let mut steps = 0usize;

        loop {
            let Some(adapter) = repository.find(metadata, current.as_ref()) else {
                debug!("No adapter for {} after {} step(s)", self.identity(), steps);
                return None;
            };

            steps += 1;
            trace!("Adapting {} with '{}'", self.identity(), adapter.name());
            let Some(next) = adapter.adapt(current.as_ref()) else {
                debug!("Adapter '{}' declined {}", adapter.name(), self.identity());
                return None;
            };

            if let Some(properties) = next.downcast_ref::<PropertySet>() {
                return Some(properties.clone());
            }

            if (*next).type_id() == (*current).type_id() {
                warn!(
                    "Adapter '{}' made no progress on {}, abandoning",
                    adapter.name(),
                    self.identity()
                );
                return None;
            }

            current = next;
        }
    }
}

impl fmt::Debug for Transformation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Transformation")
            .field("source", &self.source)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapter::SpecAdapter;
    use crate::adapter::spec::{Always, MetadataEquals, SourceIs};
    use crate::properties::{INFO_PREFIX, SERVICE_PID};
    use crate::strategy::PidStrategy;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn transformation(source: SourceObject, metadata: PropertySet) -> Transformation {
        let source = ConfigurationSource::new(Identity::pid("svc1").unwrap(), source, metadata);
        Transformation::new(source, Arc::new(PidStrategy::new()))
    }

    #[test]
    fn test_chained_adaptation() {
        let repo = AdapterRepository::new();
        repo.register(SpecAdapter::shared("len", SourceIs::<String>::new(), |s| {
            let s = s.downcast_ref::<String>()?;
            Some(Arc::new(s.len()) as SourceObject)
        }));
        repo.register(SpecAdapter::shared("props", SourceIs::<usize>::new(), |n| {
            let n = n.downcast_ref::<usize>()?;
            Some(Arc::new(PropertySet::new().with("len", *n as u64)) as SourceObject)
        }));

        let t = transformation(Arc::new("abcd".to_string()), PropertySet::new());
        let props = t.adapt(&repo).unwrap();
        assert_eq!(props.get("len"), Some(&serde_json::json!(4)));
    }

    #[test]
    fn test_no_adapter_aborts() {
        let repo = AdapterRepository::new();
        let t = transformation(Arc::new(1u32), PropertySet::new());
        assert!(t.execute(&repo).is_none());
    }

    #[test]
    fn test_no_progress_aborts_after_one_call() {
        let calls = Arc::new(AtomicUsize::new(0));
        let counter = calls.clone();

        let repo = AdapterRepository::new();
        repo.register(SpecAdapter::shared("loop", Always, move |_| {
            counter.fetch_add(1, Ordering::SeqCst);
            Some(Arc::new("same type".to_string()) as SourceObject)
        }));

        let t = transformation(Arc::new("input".to_string()), PropertySet::new());
        assert!(t.execute(&repo).is_none());
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_reserved_metadata_is_merged() {
        let repo = AdapterRepository::new();
        repo.register(SpecAdapter::shared(
            "stream",
            MetadataEquals::new("type", "props-stream"),
            |_| {
                Some(Arc::new(
                    PropertySet::new().with("x", "1").with(SERVICE_PID, "from-adapter"),
                ) as SourceObject)
            },
        ));

        let metadata = PropertySet::new()
            .with("type", "props-stream")
            .with(format!("{}origin", INFO_PREFIX), "scanner");
        let t = transformation(Arc::new(b"x=1".to_vec()), metadata);

        let target = t.target(&repo).unwrap();
        let merged = target.properties();

        assert_eq!(merged.get_str(SERVICE_PID), Some("svc1"));
        assert_eq!(merged.get_str(&format!("{}origin", INFO_PREFIX)), Some("scanner"));
        assert!(!merged.contains_key("type"));
        assert_eq!(
            merged.without_info(),
            PropertySet::new().with("x", "1").with(SERVICE_PID, "svc1")
        );
        assert!(t.execute(&repo).is_some());
    }

    #[test]
    fn test_retry_succeeds_after_registration() {
        let repo = AdapterRepository::new();
        let t = transformation(Arc::new(7u8), PropertySet::new());
        assert!(t.execute(&repo).is_none());

        repo.register(SpecAdapter::shared("byte", SourceIs::<u8>::new(), |_| {
            Some(Arc::new(PropertySet::new()) as SourceObject)
        }));
        assert!(t.execute(&repo).is_some());
    }
}
