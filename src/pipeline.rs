// src/pipeline.rs

//! The pipeline context
//!
//! [`Pipeline`] owns the adapter repository and both processors and wires
//! them together: transformations feed the command processor, and adapter
//! registrations trigger a retry of parked transformations. Nothing here is
//! global; every pipeline is an independent instance with its own
//! `start()`/`stop()` lifecycle.

use crate::adapter::builtin::register_builtin;
use crate::adapter::{Adapter, AdapterEvent, AdapterHandle, AdapterRepository, DecoratorChain};
use crate::command::{CommandProcessor, ProcessorState};
use crate::config::PipelineConfig;
use crate::error::{Error, Result};
use crate::identity::{ConfigurationSource, Identity, SourceObject};
use crate::properties::PropertySet;
use crate::sink::ConfigurationSink;
use crate::strategy::strategy_for;
use crate::transform::{Transformation, TransformationsProcessor};
use parking_lot::Mutex;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::broadcast::{self, error::RecvError};
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// Poll interval used by [`Pipeline::wait_idle`]
const IDLE_POLL: Duration = Duration::from_millis(10);

/// Background tasks spawned by `start()`
struct Background {
    cancel: CancellationToken,
    tasks: Vec<JoinHandle<()>>,
}

/// Process-wide configuration pipeline
pub struct Pipeline {
    config: PipelineConfig,
    repository: Arc<AdapterRepository>,
    commands: Arc<CommandProcessor<dyn ConfigurationSink>>,
    transformations: Arc<TransformationsProcessor>,
    background: Mutex<Option<Background>>,
}

impl Pipeline {
    /// Build a stopped pipeline, registering the built-in adapters if
    /// configured
    pub fn new(config: PipelineConfig) -> Self {
        let repository = Arc::new(AdapterRepository::with_chain(DecoratorChain::from_settings(
            &config.adapters,
        )));
        if config.adapters.builtin {
            let handles = register_builtin(&repository);
            debug!("Registered {} built-in adapter(s)", handles.len());
        }

        let commands = Arc::new(CommandProcessor::new(config.commands.name.clone()));
        let transformations = Arc::new(TransformationsProcessor::new(
            Arc::clone(&repository),
            Arc::clone(&commands),
        ));

        Self {
            config,
            repository,
            commands,
            transformations,
            background: Mutex::new(None),
        }
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    pub fn repository(&self) -> &Arc<AdapterRepository> {
        &self.repository
    }

    pub fn commands(&self) -> &Arc<CommandProcessor<dyn ConfigurationSink>> {
        &self.commands
    }

    pub fn transformations(&self) -> &Arc<TransformationsProcessor> {
        &self.transformations
    }

    /// Start both processors and the retry tasks
    ///
    /// Must be called from within a Tokio runtime.
    pub fn start(&self) -> Result<()> {
        let mut background = self.background.lock();
        if background.is_some() {
            return Err(Error::AlreadyRunning("pipeline".to_string()));
        }

        self.commands.start()?;
        self.transformations.start()?;

        let cancel = CancellationToken::new();
        let mut tasks = Vec::new();

        if self.config.transformations.retry_on_adapter_registration {
            // Subscribe now so no registration after start() is missed
            tasks.push(tokio::spawn(retry_on_registration(
                self.repository.subscribe(),
                Arc::clone(&self.transformations),
                cancel.clone(),
            )));
        }
        if let Some(interval) = self.config.transformations.retry_interval() {
            tasks.push(tokio::spawn(retry_periodically(
                interval,
                Arc::clone(&self.transformations),
                cancel.clone(),
            )));
        }

        *background = Some(Background { cancel, tasks });
        info!("Pipeline started");
        Ok(())
    }

    /// Stop retry tasks and both processors
    ///
    /// Queued and parked transformations are discarded; queued commands
    /// are kept for a later `start()`.
    pub async fn stop(&self) {
        let Some(background) = self.background.lock().take() else {
            return;
        };

        background.cancel.cancel();
        for task in background.tasks {
            let _ = task.await;
        }

        self.transformations.stop().await;
        self.commands.stop().await;
        info!("Pipeline stopped");
    }

    pub fn state(&self) -> ProcessorState {
        if self.background.lock().is_some() {
            ProcessorState::Running
        } else {
            ProcessorState::Stopped
        }
    }

    /// Set or clear the configuration sink commands are applied to
    pub fn set_sink(&self, sink: Option<Arc<dyn ConfigurationSink>>) {
        self.commands.set_target_service(sink);
    }

    pub fn register_adapter(&self, adapter: Arc<dyn Adapter>) -> AdapterHandle {
        self.repository.register(adapter)
    }

    pub fn unregister_adapter(&self, handle: &AdapterHandle) -> bool {
        self.repository.unregister(handle)
    }

    /// Queue a source object to be adapted into the identity's configuration
    pub fn update(&self, identity: Identity, source_object: SourceObject, metadata: PropertySet) {
        let strategy = strategy_for(&identity);
        let source = ConfigurationSource::new(identity, source_object, metadata);
        self.transformations.add(Transformation::new(source, strategy));
    }

    /// Queue removal of the identity's configuration
    pub fn delete(&self, identity: Identity) {
        let command = strategy_for(&identity).create_delete_command(identity);
        self.commands.add(command);
    }

    /// Retry every parked transformation now
    pub fn retry_failed(&self) -> usize {
        self.transformations.schedule_failed_transformations()
    }

    /// True when neither processor has queued or executing work
    pub fn is_idle(&self) -> bool {
        // Transformations first: a finished one has already queued its command
        self.transformations.is_idle() && self.commands.is_idle()
    }

    /// Wait until the pipeline is idle, up to `timeout`
    ///
    /// Returns false on timeout, e.g. when commands are held because no
    /// sink is set.
    pub async fn wait_idle(&self, timeout: Duration) -> bool {
        let deadline = Instant::now() + timeout;
        while !self.is_idle() {
            if Instant::now() >= deadline {
                return false;
            }
            tokio::time::sleep(IDLE_POLL).await;
        }
        true
    }
}

impl Drop for Pipeline {
    fn drop(&mut self) {
        if let Some(background) = self.background.get_mut().take() {
            background.cancel.cancel();
        }
    }
}

async fn retry_on_registration(
    mut events: broadcast::Receiver<AdapterEvent>,
    transformations: Arc<TransformationsProcessor>,
    cancel: CancellationToken,
) {
    loop {
        let event = tokio::select! {
            biased;
            _ = cancel.cancelled() => break,
            event = events.recv() => event,
        };

        match event {
            Ok(AdapterEvent::Registered { name, .. }) => {
                debug!("Adapter '{}' registered, retrying parked transformations", name);
                transformations.schedule_failed_transformations();
            }
            Ok(AdapterEvent::Unregistered { .. }) => {}
            Err(RecvError::Lagged(missed)) => {
                warn!("Missed {} adapter event(s), retrying parked transformations", missed);
                transformations.schedule_failed_transformations();
            }
            Err(RecvError::Closed) => break,
        }
    }
}

async fn retry_periodically(
    period: Duration,
    transformations: Arc<TransformationsProcessor>,
    cancel: CancellationToken,
) {
    let mut ticker = tokio::time::interval_at(Instant::now() + period, period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            biased;
            _ = cancel.cancelled() => break,
            _ = ticker.tick() => {
                transformations.schedule_failed_transformations();
            }
        }
    }
}
