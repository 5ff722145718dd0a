// tests/common/mod.rs

//! Shared test utilities and helpers for integration tests.

#![allow(dead_code)]

use async_trait::async_trait;
use conflux::adapter::builtin::parse_properties;
use conflux::adapter::spec::MetadataEquals;
use conflux::{
    Adapter, ConfigurationHandle, ConfigurationSink, Error, MemorySink, PipelineConfig,
    PropertySet, Result, SourceObject, SpecAdapter,
};
use parking_lot::Mutex;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;
use tokio::sync::broadcast;

/// How long a test waits for an asynchronous event
pub const EVENT_TIMEOUT: Duration = Duration::from_secs(5);

/// Receive the next event or fail the test after [`EVENT_TIMEOUT`]
pub async fn next_event<T: Clone>(events: &mut broadcast::Receiver<T>) -> T {
    tokio::time::timeout(EVENT_TIMEOUT, events.recv())
        .await
        .expect("timed out waiting for event")
        .expect("event channel closed")
}

/// Pipeline config without built-in adapters
pub fn bare_config() -> PipelineConfig {
    let mut config = PipelineConfig::default();
    config.adapters.builtin = false;
    config
}

/// An unread byte stream, as a scanner would hand over
#[derive(Debug, Clone)]
pub struct ByteStream(pub Vec<u8>);

/// A [`ByteStream`] ready to hand to the pipeline
pub fn stream(bytes: &[u8]) -> SourceObject {
    Arc::new(ByteStream(bytes.to_vec()))
}

/// Adapter turning a [`ByteStream`] tagged `type=props-stream` into properties
pub fn props_stream_adapter() -> Arc<dyn Adapter> {
    SpecAdapter::shared("props-stream", MetadataEquals::new("type", "props-stream"), |source| {
        let stream = source.downcast_ref::<ByteStream>()?;
        let text = std::str::from_utf8(&stream.0).ok()?;
        Some(Arc::new(parse_properties(text)) as SourceObject)
    })
}

/// Metadata routing a source to [`props_stream_adapter`]
pub fn props_stream_metadata() -> PropertySet {
    PropertySet::new().with("type", "props-stream")
}

/// Sink wrapper recording every call in order
///
/// Calls are recorded as `"<operation> <pid>"`, e.g. `"update svc1"`.
#[derive(Clone)]
pub struct RecordingSink {
    inner: MemorySink,
    calls: Arc<Mutex<Vec<String>>>,
    fail_updates: Arc<AtomicBool>,
}

impl RecordingSink {
    pub fn new() -> Self {
        Self {
            inner: MemorySink::new(),
            calls: Arc::new(Mutex::new(Vec::new())),
            fail_updates: Arc::new(AtomicBool::new(false)),
        }
    }

    /// The wrapped store
    pub fn store(&self) -> &MemorySink {
        &self.inner
    }

    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().clone()
    }

    /// Recorded calls of one operation, e.g. `"update"`
    pub fn calls_of(&self, operation: &str) -> Vec<String> {
        let prefix = format!("{} ", operation);
        self.calls().into_iter().filter(|c| c.starts_with(&prefix)).collect()
    }

    /// Make every `update` fail with a sink error
    pub fn fail_updates(&self, fail: bool) {
        self.fail_updates.store(fail, Ordering::SeqCst);
    }

    fn record(&self, call: String) {
        self.calls.lock().push(call);
    }

    fn wrap(&self, handle: Box<dyn ConfigurationHandle>) -> Box<dyn ConfigurationHandle> {
        Box::new(RecordingHandle {
            inner: handle,
            sink: self.clone(),
        })
    }

    pub fn shared(&self) -> Arc<dyn ConfigurationSink> {
        Arc::new(self.clone())
    }
}

#[async_trait]
impl ConfigurationSink for RecordingSink {
    async fn get_configuration(
        &self,
        pid: &str,
        location: Option<&str>,
    ) -> Result<Option<Box<dyn ConfigurationHandle>>> {
        self.record(format!("get {}", pid));
        Ok(self.inner.get_configuration(pid, location).await?.map(|h| self.wrap(h)))
    }

    async fn create_configuration(
        &self,
        pid: &str,
        location: Option<&str>,
    ) -> Result<Box<dyn ConfigurationHandle>> {
        self.record(format!("create {}", pid));
        Ok(self.wrap(self.inner.create_configuration(pid, location).await?))
    }

    async fn create_factory_configuration(
        &self,
        factory_pid: &str,
        location: Option<&str>,
    ) -> Result<Box<dyn ConfigurationHandle>> {
        self.record(format!("create-factory {}", factory_pid));
        Ok(self.wrap(self.inner.create_factory_configuration(factory_pid, location).await?))
    }

    async fn list_factory_configurations(
        &self,
        factory_pid: &str,
    ) -> Result<Vec<Box<dyn ConfigurationHandle>>> {
        self.record(format!("list {}", factory_pid));
        let handles = self.inner.list_factory_configurations(factory_pid).await?;
        Ok(handles.into_iter().map(|h| self.wrap(h)).collect())
    }
}

struct RecordingHandle {
    inner: Box<dyn ConfigurationHandle>,
    sink: RecordingSink,
}

#[async_trait]
impl ConfigurationHandle for RecordingHandle {
    fn pid(&self) -> &str {
        self.inner.pid()
    }

    fn factory_pid(&self) -> Option<&str> {
        self.inner.factory_pid()
    }

    async fn properties(&self) -> Result<Option<PropertySet>> {
        self.inner.properties().await
    }

    async fn set_bundle_location(&self, location: Option<&str>) -> Result<()> {
        self.inner.set_bundle_location(location).await
    }

    async fn update(&self, properties: PropertySet) -> Result<()> {
        self.sink.record(format!("update {}", self.pid()));
        if self.sink.fail_updates.load(Ordering::SeqCst) {
            return Err(Error::Sink(format!("update of {} rejected", self.pid())));
        }
        self.inner.update(properties).await
    }

    async fn delete(&self) -> Result<()> {
        self.sink.record(format!("delete {}", self.pid()));
        self.inner.delete().await
    }
}
