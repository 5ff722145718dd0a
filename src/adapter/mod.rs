// src/adapter/mod.rs

//! Adapters - converting arbitrary sources into property sets
//!
//! An adapter turns one kind of object into another, one step closer to a
//! [`PropertySet`](crate::properties::PropertySet). Adapters are chained by
//! the transformation engine: a file path may become raw content, which in
//! turn becomes a property set. Each adapter declares which sources it
//! handles through [`Adapter::is_satisfied_by`].
//!
//! Adapters are registered with an [`AdapterRepository`], which wraps them in
//! the post-processing chain (adapter stamp, timestamp, cleanup) and keeps
//! them in priority order.

pub mod builtin;
mod decorate;
mod repository;
pub mod spec;

pub use decorate::{Decorator, DecoratorChain};
pub use repository::{AdapterEvent, AdapterHandle, AdapterRepository, RegisteredAdapter};
pub use spec::{Specification, SpecificationExt};

use crate::identity::SourceObject;
use crate::properties::PropertySet;
use std::any::Any;
use std::sync::Arc;

/// Borrowed view of a source object
pub type Source<'a> = &'a (dyn Any + Send + Sync);

/// Converts a source object into something closer to a property set
pub trait Adapter: Send + Sync {
    /// Name recorded in the adapter info property and in logs
    fn name(&self) -> &str;

    /// Whether this adapter can handle `source` given its routing metadata
    fn is_satisfied_by(&self, metadata: &PropertySet, source: Source<'_>) -> bool;

    /// Adapt the source, or decline by returning `None`
    fn adapt(&self, source: Source<'_>) -> Option<SourceObject>;
}

/// Adapter assembled from a specification and a conversion function
pub struct SpecAdapter<S, F> {
    name: String,
    spec: S,
    convert: F,
}

impl<S, F> SpecAdapter<S, F>
where
    S: Specification,
    F: Fn(Source<'_>) -> Option<SourceObject> + Send + Sync,
{
    pub fn new(name: impl Into<String>, spec: S, convert: F) -> Self {
        Self {
            name: name.into(),
            spec,
            convert,
        }
    }

    /// Convenience for wrapping straight into an `Arc<dyn Adapter>`
    pub fn shared(name: impl Into<String>, spec: S, convert: F) -> Arc<dyn Adapter>
    where
        S: 'static,
        F: 'static,
    {
        Arc::new(Self::new(name, spec, convert))
    }
}

impl<S, F> Adapter for SpecAdapter<S, F>
where
    S: Specification,
    F: Fn(Source<'_>) -> Option<SourceObject> + Send + Sync,
{
    fn name(&self) -> &str {
        &self.name
    }

    fn is_satisfied_by(&self, metadata: &PropertySet, source: Source<'_>) -> bool {
        self.spec.is_satisfied_by(metadata, source)
    }

    fn adapt(&self, source: Source<'_>) -> Option<SourceObject> {
        (self.convert)(source)
    }
}
