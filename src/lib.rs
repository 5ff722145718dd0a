// src/lib.rs

//! Conflux configuration pipeline
//!
//! Turns heterogeneous configuration sources (files, raw bytes, maps,
//! anything an adapter understands) into property sets and applies them to
//! a configuration store.
//!
//! # Architecture
//!
//! - Adapters: pluggable converters, chained until a property set comes out
//! - Transformations: one source on its way to becoming an update command,
//!   parked and retried when no adapter fits yet
//! - Commands: update/delete operations applied in FIFO order once a sink
//!   is available, skipped when the stored content already matches
//! - Pipeline: explicit context owning the repository and both processors

pub mod adapter;
pub mod command;
pub mod config;
mod error;
pub mod identity;
pub mod logging;
pub mod pipeline;
pub mod properties;
pub mod sink;
pub mod strategy;
pub mod transform;

pub use adapter::{
    Adapter, AdapterEvent, AdapterHandle, AdapterRepository, SpecAdapter, Specification,
};
pub use command::{
    Command, CommandEvent, CommandOutcome, CommandProcessor, DeleteCommand, ProcessorMetrics,
    ProcessorState, SinkCommand, UpdateCommand,
};
pub use config::{DEFAULT_CONFIG_PATH, PipelineConfig};
pub use error::{Error, Result};
pub use identity::{ConfigurationSource, ConfigurationTarget, Identity, IdentityKind, SourceObject};
pub use pipeline::Pipeline;
pub use properties::{KeySpec, PropertySet, PropertyValue};
pub use sink::{ConfigurationEvent, ConfigurationHandle, ConfigurationSink, MemorySink};
pub use strategy::{ConfigurationStrategy, FactoryPidStrategy, PidStrategy, strategy_for};
pub use transform::{Transformation, TransformationEvent, TransformationsProcessor};
