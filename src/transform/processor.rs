// src/transform/processor.rs

//! Queue of pending transformations with a single worker
//!
//! Transformations that cannot be adapted yet are parked on a failed list.
//! [`TransformationsProcessor::schedule_failed_transformations`] moves them
//! back onto the queue, which is what the pipeline does whenever an adapter
//! is registered. Successful transformations hand their update command to
//! the downstream [`CommandProcessor`].
//!
//! A reschedule that arrives while a transformation is executing marks it
//! for another attempt, so an adapter registered mid-flight is never missed.
//!
//! Work here is in-memory only: stopping the processor discards whatever is
//! still queued or parked.

use super::Transformation;
use crate::adapter::AdapterRepository;
use crate::command::{CommandProcessor, Counters, ProcessorMetrics, ProcessorState, Worker};
use crate::error::{Error, Result};
use crate::identity::Identity;
use crate::sink::ConfigurationSink;
use parking_lot::Mutex;
use std::collections::VecDeque;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use tokio::sync::{Notify, broadcast};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

/// Capacity of the transformation event channel
const EVENT_CAPACITY: usize = 256;

const NAME: &str = "transformations";

/// What happened to a transformation
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransformationEvent {
    /// Adapted and handed to the command processor
    Transformed { identity: Identity },
    /// Could not be adapted, moved to the failed list
    Parked { identity: Identity },
    /// Failed transformations moved back onto the queue
    Rescheduled { count: usize },
    /// Dropped on stop
    Discarded { identity: Identity },
}

#[derive(Default)]
struct Lists {
    pending: VecDeque<Transformation>,
    failed: Vec<Transformation>,
    /// Set by a reschedule while the current transformation executes
    retry_current: bool,
}

struct Inner {
    repository: Arc<AdapterRepository>,
    commands: Arc<CommandProcessor<dyn ConfigurationSink>>,
    lists: Mutex<Lists>,
    queued: Notify,
    busy: AtomicBool,
    events: broadcast::Sender<TransformationEvent>,
    counters: Counters,
}

impl Inner {
    async fn next_transformation(&self) -> Transformation {
        loop {
            let notified = self.queued.notified();
            {
                let mut lists = self.lists.lock();
                if let Some(transformation) = lists.pending.pop_front() {
                    lists.retry_current = false;
                    self.busy.store(true, Ordering::SeqCst);
                    return transformation;
                }
            }
            notified.await;
        }
    }

    fn emit(&self, event: TransformationEvent) {
        let _ = self.events.send(event);
    }

    async fn run(self: Arc<Self>, cancel: CancellationToken) {
        debug!("{}: worker started", NAME);

        loop {
            let transformation = tokio::select! {
                biased;
                _ = cancel.cancelled() => break,
                transformation = self.next_transformation() => transformation,
            };

            // Adapters are synchronous and may do I/O
            let repository = Arc::clone(&self.repository);
            let joined = tokio::task::spawn_blocking(move || {
                let command = transformation.execute(&repository);
                (transformation, command)
            })
            .await;

            match joined {
                Ok((transformation, Some(command))) => {
                    let identity = transformation.identity().clone();
                    debug!("{}: {} adapted, queuing '{}'", NAME, identity, command);
                    self.commands.add(command);
                    self.counters.record(true);
                    self.busy.store(false, Ordering::SeqCst);
                    self.emit(TransformationEvent::Transformed { identity });
                }
                Ok((transformation, None)) => {
                    let identity = transformation.identity().clone();
                    let requeued = {
                        let mut lists = self.lists.lock();
                        let requeued = lists.retry_current;
                        if requeued {
                            lists.pending.push_back(transformation);
                        } else {
                            lists.failed.push(transformation);
                        }
                        self.busy.store(false, Ordering::SeqCst);
                        requeued
                    };

                    if requeued {
                        debug!("{}: {} rescheduled while executing, requeuing", NAME, identity);
                        self.emit(TransformationEvent::Rescheduled { count: 1 });
                    } else {
                        debug!("{}: {} not adaptable yet, parking", NAME, identity);
                        self.counters.record(false);
                        self.emit(TransformationEvent::Parked { identity });
                    }
                }
                Err(e) => {
                    error!("{}: transformation task failed: {}", NAME, e);
                    self.counters.record(false);
                    self.busy.store(false, Ordering::SeqCst);
                }
            }
        }

        debug!("{}: worker stopped", NAME);
    }
}

/// Single-worker processor turning transformations into commands
pub struct TransformationsProcessor {
    inner: Arc<Inner>,
    worker: Mutex<Option<Worker>>,
}

impl TransformationsProcessor {
    pub fn new(
        repository: Arc<AdapterRepository>,
        commands: Arc<CommandProcessor<dyn ConfigurationSink>>,
    ) -> Self {
        let (events, _) = broadcast::channel(EVENT_CAPACITY);
        Self {
            inner: Arc::new(Inner {
                repository,
                commands,
                lists: Mutex::new(Lists::default()),
                queued: Notify::new(),
                busy: AtomicBool::new(false),
                events,
                counters: Counters::default(),
            }),
            worker: Mutex::new(None),
        }
    }

    /// Queue a transformation; never blocks
    pub fn add(&self, transformation: Transformation) {
        debug!("{}: queued {}", NAME, transformation.identity());
        self.inner.lists.lock().pending.push_back(transformation);
        self.inner.queued.notify_one();
    }

    /// Move every parked transformation back onto the queue
    ///
    /// A transformation executing right now is retried if it fails. Returns
    /// how many parked transformations were rescheduled.
    pub fn schedule_failed_transformations(&self) -> usize {
        let count = {
            let mut lists = self.inner.lists.lock();
            lists.retry_current = self.inner.busy.load(Ordering::SeqCst);
            let failed = std::mem::take(&mut lists.failed);
            let count = failed.len();
            lists.pending.extend(failed);
            count
        };

        if count > 0 {
            info!("{}: rescheduling {} failed transformation(s)", NAME, count);
            self.inner.queued.notify_one();
            self.inner.emit(TransformationEvent::Rescheduled { count });
        }
        count
    }

    /// Spawn the worker task
    ///
    /// Must be called from within a Tokio runtime.
    pub fn start(&self) -> Result<()> {
        let mut worker = self.worker.lock();
        if worker.is_some() {
            return Err(Error::AlreadyRunning(NAME.to_string()));
        }

        let cancel = CancellationToken::new();
        let task = tokio::spawn(Arc::clone(&self.inner).run(cancel.clone()));
        *worker = Some(Worker { cancel, task });
        info!("{}: started", NAME);
        Ok(())
    }

    /// Stop the worker and discard queued and failed transformations
    ///
    /// A transformation being executed is allowed to finish.
    pub async fn stop(&self) {
        let Some(worker) = self.worker.lock().take() else {
            return;
        };

        worker.cancel.cancel();
        if let Err(e) = worker.task.await {
            error!("{}: worker task failed: {}", NAME, e);
        }

        let Lists { pending, failed, .. } = std::mem::take(&mut *self.inner.lists.lock());
        if !pending.is_empty() || !failed.is_empty() {
            warn!(
                "{}: discarding {} queued and {} failed transformation(s)",
                NAME,
                pending.len(),
                failed.len()
            );
        }
        for transformation in pending.into_iter().chain(failed) {
            self.inner.emit(TransformationEvent::Discarded {
                identity: transformation.identity().clone(),
            });
        }
        info!("{}: stopped", NAME);
    }

    pub fn state(&self) -> ProcessorState {
        match self.worker.lock().as_ref() {
            Some(worker) if !worker.task.is_finished() => ProcessorState::Running,
            _ => ProcessorState::Stopped,
        }
    }

    /// Number of queued transformations
    pub fn len(&self) -> usize {
        self.inner.lists.lock().pending.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Number of parked transformations
    pub fn failed_len(&self) -> usize {
        self.inner.lists.lock().failed.len()
    }

    /// True when nothing is queued and nothing is executing
    ///
    /// Parked transformations do not count as work.
    pub fn is_idle(&self) -> bool {
        let lists = self.inner.lists.lock();
        lists.pending.is_empty() && !self.inner.busy.load(Ordering::SeqCst)
    }

    /// Subscribe to transformation events
    pub fn subscribe(&self) -> broadcast::Receiver<TransformationEvent> {
        self.inner.events.subscribe()
    }

    /// Counters: processed, transformed (succeeded), parked (failed)
    pub fn metrics(&self) -> ProcessorMetrics {
        self.inner.counters.snapshot()
    }
}

impl Drop for TransformationsProcessor {
    fn drop(&mut self) {
        if let Some(worker) = self.worker.get_mut().take() {
            worker.cancel.cancel();
        }
    }
}
