// src/command/processor.rs

//! Serial command pump in front of an intermittently available target
//!
//! Producers enqueue commands at any time. A single worker task takes them
//! in FIFO order, waits until a target service is set, and executes them
//! one at a time. A failing command is logged and dropped; it never stalls
//! the rest of the queue.
//!
//! Stopping the processor returns a command that was taken but not yet
//! executed to the front of the queue, so a later `start()` picks up exactly
//! where the worker left off.

use super::{Command, CommandOutcome};
use crate::error::{Error, Result};
use parking_lot::Mutex;
use std::collections::VecDeque;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use tokio::sync::{Notify, broadcast, watch};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, trace};

/// Capacity of the command event channel
const EVENT_CAPACITY: usize = 256;

/// Lifecycle of a processor's worker
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProcessorState {
    Stopped,
    Running,
}

/// Point-in-time processor counters
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ProcessorMetrics {
    /// Items taken off the queue and run
    pub processed: u64,
    /// Items that produced their intended result
    pub succeeded: u64,
    /// Items that errored or could not complete
    pub failed: u64,
}

#[derive(Default)]
pub(crate) struct Counters {
    processed: AtomicU64,
    succeeded: AtomicU64,
    failed: AtomicU64,
}

impl Counters {
    pub(crate) fn record(&self, ok: bool) {
        self.processed.fetch_add(1, Ordering::Relaxed);
        if ok {
            self.succeeded.fetch_add(1, Ordering::Relaxed);
        } else {
            self.failed.fetch_add(1, Ordering::Relaxed);
        }
    }

    pub(crate) fn snapshot(&self) -> ProcessorMetrics {
        ProcessorMetrics {
            processed: self.processed.load(Ordering::Relaxed),
            succeeded: self.succeeded.load(Ordering::Relaxed),
            failed: self.failed.load(Ordering::Relaxed),
        }
    }
}

/// Result of one executed command
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandEvent {
    /// Display form of the command
    pub command: String,
    /// Outcome, or the error message
    pub result: std::result::Result<CommandOutcome, String>,
}

/// Running worker task
pub(crate) struct Worker {
    pub(crate) cancel: CancellationToken,
    pub(crate) task: JoinHandle<()>,
}

struct Inner<T: ?Sized> {
    name: String,
    queue: Mutex<VecDeque<Box<dyn Command<T>>>>,
    queued: Notify,
    busy: AtomicBool,
    target: watch::Sender<Option<Arc<T>>>,
    events: broadcast::Sender<CommandEvent>,
    counters: Counters,
}

impl<T: ?Sized + Send + Sync + 'static> Inner<T> {
    /// Wait for the next command and mark the worker busy
    async fn next_command(&self) -> Box<dyn Command<T>> {
        loop {
            let notified = self.queued.notified();
            {
                let mut queue = self.queue.lock();
                if let Some(command) = queue.pop_front() {
                    self.busy.store(true, Ordering::SeqCst);
                    return command;
                }
            }
            notified.await;
        }
    }

    /// Put a taken command back at the head of the queue
    fn requeue(&self, command: Box<dyn Command<T>>) {
        let mut queue = self.queue.lock();
        queue.push_front(command);
        self.busy.store(false, Ordering::SeqCst);
    }

    async fn run(self: Arc<Self>, cancel: CancellationToken) {
        let mut target_rx = self.target.subscribe();
        debug!("{}: worker started", self.name);

        loop {
            let command = tokio::select! {
                biased;
                _ = cancel.cancelled() => break,
                command = self.next_command() => command,
            };

            let target = tokio::select! {
                biased;
                _ = cancel.cancelled() => {
                    trace!("{}: stopped while holding '{}', requeued", self.name, command);
                    self.requeue(command);
                    break;
                }
                target = wait_for_target(&mut target_rx, &self.name) => target,
            };

            // Not cancelled once started
            let result = command.execute(&*target).await;
            let name = command.to_string();
            match &result {
                Ok(outcome) => {
                    debug!("{}: '{}' {}", self.name, name, outcome);
                    self.counters.record(true);
                }
                Err(e) => {
                    error!("{}: '{}' failed, dropping it: {}", self.name, name, e);
                    self.counters.record(false);
                }
            }
            self.busy.store(false, Ordering::SeqCst);

            let _ = self.events.send(CommandEvent {
                command: name,
                result: result.map_err(|e| e.to_string()),
            });
        }

        debug!("{}: worker stopped", self.name);
    }
}

async fn wait_for_target<T: ?Sized>(
    rx: &mut watch::Receiver<Option<Arc<T>>>,
    name: &str,
) -> Arc<T> {
    loop {
        let current = rx.borrow_and_update().as_ref().map(Arc::clone);
        if let Some(target) = current {
            return target;
        }
        trace!("{}: waiting for target service", name);
        if rx.changed().await.is_err() {
            // Sender lives as long as the processor; nothing more will arrive
            std::future::pending::<()>().await;
        }
    }
}

/// FIFO command executor for a target service of type `T`
pub struct CommandProcessor<T: ?Sized> {
    inner: Arc<Inner<T>>,
    worker: Mutex<Option<Worker>>,
}

impl<T: ?Sized + Send + Sync + 'static> CommandProcessor<T> {
    /// Create a stopped processor with no target
    pub fn new(name: impl Into<String>) -> Self {
        let (target, _) = watch::channel(None);
        let (events, _) = broadcast::channel(EVENT_CAPACITY);
        Self {
            inner: Arc::new(Inner {
                name: name.into(),
                queue: Mutex::new(VecDeque::new()),
                queued: Notify::new(),
                busy: AtomicBool::new(false),
                target,
                events,
                counters: Counters::default(),
            }),
            worker: Mutex::new(None),
        }
    }

    pub fn name(&self) -> &str {
        &self.inner.name
    }

    /// Set or clear the target service
    ///
    /// A waiting worker resumes as soon as a target is set. Clearing the
    /// target holds further commands until a new one shows up.
    pub fn set_target_service(&self, target: Option<Arc<T>>) {
        match &target {
            Some(_) => debug!("{}: target service available", self.inner.name),
            None => debug!("{}: target service gone", self.inner.name),
        }
        self.inner.target.send_replace(target);
    }

    pub fn has_target(&self) -> bool {
        self.inner.target.borrow().is_some()
    }

    /// Queue a command; never blocks and does not need a target
    pub fn add(&self, command: Box<dyn Command<T>>) {
        trace!("{}: queued '{}'", self.inner.name, command);
        self.inner.queue.lock().push_back(command);
        self.inner.queued.notify_one();
    }

    /// Spawn the worker task
    ///
    /// Must be called from within a Tokio runtime.
    pub fn start(&self) -> Result<()> {
        let mut worker = self.worker.lock();
        if worker.is_some() {
            return Err(Error::AlreadyRunning(self.inner.name.clone()));
        }

        let cancel = CancellationToken::new();
        let task = tokio::spawn(Arc::clone(&self.inner).run(cancel.clone()));
        *worker = Some(Worker { cancel, task });
        info!("{}: started with {} queued command(s)", self.inner.name, self.len());
        Ok(())
    }

    /// Stop the worker, letting an executing command finish
    ///
    /// Queued commands are kept for a later `start()`.
    pub async fn stop(&self) {
        let Some(worker) = self.worker.lock().take() else {
            return;
        };

        worker.cancel.cancel();
        if let Err(e) = worker.task.await {
            error!("{}: worker task failed: {}", self.inner.name, e);
        }
        info!("{}: stopped, {} command(s) retained", self.inner.name, self.len());
    }

    pub fn state(&self) -> ProcessorState {
        match self.worker.lock().as_ref() {
            Some(worker) if !worker.task.is_finished() => ProcessorState::Running,
            _ => ProcessorState::Stopped,
        }
    }

    /// Number of queued commands, excluding one being executed
    pub fn len(&self) -> usize {
        self.inner.queue.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// True when nothing is queued and nothing is executing
    pub fn is_idle(&self) -> bool {
        let queue = self.inner.queue.lock();
        queue.is_empty() && !self.inner.busy.load(Ordering::SeqCst)
    }

    /// Subscribe to command results
    pub fn subscribe(&self) -> broadcast::Receiver<CommandEvent> {
        self.inner.events.subscribe()
    }

    pub fn metrics(&self) -> ProcessorMetrics {
        self.inner.counters.snapshot()
    }
}

impl<T: ?Sized> Drop for CommandProcessor<T> {
    fn drop(&mut self) {
        if let Some(worker) = self.worker.get_mut().take() {
            worker.cancel.cancel();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use std::fmt;
    use std::time::Duration;
    use tokio::time::timeout;

    /// Target that records what ran against it
    #[derive(Default)]
    struct Log {
        entries: Mutex<Vec<String>>,
    }

    struct Record(&'static str);

    impl fmt::Display for Record {
        fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
            write!(f, "record {}", self.0)
        }
    }

    #[async_trait]
    impl Command<Log> for Record {
        async fn execute(&self, target: &Log) -> Result<CommandOutcome> {
            target.entries.lock().push(self.0.to_string());
            Ok(CommandOutcome::Applied)
        }
    }

    struct Fail;

    impl fmt::Display for Fail {
        fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
            write!(f, "fail")
        }
    }

    #[async_trait]
    impl Command<Log> for Fail {
        async fn execute(&self, _target: &Log) -> Result<CommandOutcome> {
            Err(Error::Sink("boom".to_string()))
        }
    }

    async fn next(events: &mut broadcast::Receiver<CommandEvent>) -> CommandEvent {
        timeout(Duration::from_secs(5), events.recv()).await.unwrap().unwrap()
    }

    #[tokio::test]
    async fn test_fifo_after_target_appears() {
        let processor = CommandProcessor::<Log>::new("test");
        let mut events = processor.subscribe();
        processor.start().unwrap();

        processor.add(Box::new(Record("c1")));
        processor.add(Box::new(Record("c2")));
        processor.add(Box::new(Record("c3")));

        let log = Arc::new(Log::default());
        processor.set_target_service(Some(log.clone()));

        for _ in 0..3 {
            next(&mut events).await;
        }
        assert_eq!(*log.entries.lock(), vec!["c1", "c2", "c3"]);
        processor.stop().await;
    }

    #[tokio::test]
    async fn test_failure_drops_only_that_command() {
        let processor = CommandProcessor::<Log>::new("test");
        let log = Arc::new(Log::default());
        processor.set_target_service(Some(log.clone()));
        let mut events = processor.subscribe();

        processor.add(Box::new(Record("a")));
        processor.add(Box::new(Fail));
        processor.add(Box::new(Record("b")));
        processor.start().unwrap();

        assert!(next(&mut events).await.result.is_ok());
        let failed = next(&mut events).await;
        assert_eq!(failed.command, "fail");
        assert!(failed.result.unwrap_err().contains("boom"));
        assert!(next(&mut events).await.result.is_ok());

        assert_eq!(*log.entries.lock(), vec!["a", "b"]);
        assert_eq!(
            processor.metrics(),
            ProcessorMetrics { processed: 3, succeeded: 2, failed: 1 }
        );
        processor.stop().await;
    }

    #[tokio::test]
    async fn test_stop_retains_waiting_command() {
        let processor = CommandProcessor::<Log>::new("test");
        processor.start().unwrap();
        assert!(matches!(processor.start(), Err(Error::AlreadyRunning(_))));

        processor.add(Box::new(Record("held")));
        processor.add(Box::new(Record("next")));
        // Let the worker take the first command and block on the missing target
        tokio::time::sleep(Duration::from_millis(50)).await;

        processor.stop().await;
        assert_eq!(processor.state(), ProcessorState::Stopped);
        assert_eq!(processor.len(), 2);
        assert!(!processor.is_idle());

        let log = Arc::new(Log::default());
        processor.set_target_service(Some(log.clone()));
        let mut events = processor.subscribe();
        processor.start().unwrap();

        next(&mut events).await;
        next(&mut events).await;
        assert_eq!(*log.entries.lock(), vec!["held", "next"]);
        assert!(processor.is_idle());
        processor.stop().await;
    }

    #[tokio::test]
    async fn test_stop_when_stopped_is_noop() {
        let processor = CommandProcessor::<Log>::new("test");
        processor.stop().await;
        assert_eq!(processor.state(), ProcessorState::Stopped);
    }
}
