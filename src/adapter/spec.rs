// src/adapter/spec.rs

//! Specifications deciding which adapter handles a source
//!
//! A specification looks at the routing metadata and the source object and
//! answers yes or no. They compose with [`SpecificationExt`]:
//!
//! ```
//! use conflux::adapter::spec::{MetadataEquals, SourceIs};
//! use conflux::adapter::SpecificationExt;
//!
//! let spec = SourceIs::<Vec<u8>>::new().and(MetadataEquals::new("type", "props-stream"));
//! ```

use super::Source;
use crate::properties::{PropertySet, PropertyValue};
use std::any::Any;
use std::marker::PhantomData;

/// Predicate over (metadata, source object)
pub trait Specification: Send + Sync {
    fn is_satisfied_by(&self, metadata: &PropertySet, source: Source<'_>) -> bool;
}

impl<F> Specification for F
where
    F: Fn(&PropertySet, Source<'_>) -> bool + Send + Sync,
{
    fn is_satisfied_by(&self, metadata: &PropertySet, source: Source<'_>) -> bool {
        self(metadata, source)
    }
}

/// Combinators available on every specification
pub trait SpecificationExt: Specification + Sized {
    fn and<S: Specification>(self, other: S) -> And<Self, S> {
        And(self, other)
    }

    fn or<S: Specification>(self, other: S) -> Or<Self, S> {
        Or(self, other)
    }

    fn negate(self) -> Not<Self> {
        Not(self)
    }
}

impl<T: Specification> SpecificationExt for T {}

/// Satisfied by everything
#[derive(Debug, Clone, Copy, Default)]
pub struct Always;

impl Specification for Always {
    fn is_satisfied_by(&self, _metadata: &PropertySet, _source: Source<'_>) -> bool {
        true
    }
}

/// Satisfied when the source object is a `T`
pub struct SourceIs<T>(PhantomData<fn() -> T>);

impl<T: Any> SourceIs<T> {
    pub fn new() -> Self {
        Self(PhantomData)
    }
}

impl<T: Any> Default for SourceIs<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T: Any> Specification for SourceIs<T> {
    fn is_satisfied_by(&self, _metadata: &PropertySet, source: Source<'_>) -> bool {
        source.is::<T>()
    }
}

/// Satisfied when a metadata key holds the given value
#[derive(Debug, Clone)]
pub struct MetadataEquals {
    key: String,
    value: PropertyValue,
}

impl MetadataEquals {
    pub fn new(key: impl Into<String>, value: impl Into<PropertyValue>) -> Self {
        Self {
            key: key.into(),
            value: value.into(),
        }
    }
}

impl Specification for MetadataEquals {
    fn is_satisfied_by(&self, metadata: &PropertySet, _source: Source<'_>) -> bool {
        metadata.get(&self.key) == Some(&self.value)
    }
}

/// Satisfied when a metadata key is present
#[derive(Debug, Clone)]
pub struct HasMetadata(pub String);

impl Specification for HasMetadata {
    fn is_satisfied_by(&self, metadata: &PropertySet, _source: Source<'_>) -> bool {
        metadata.contains_key(&self.0)
    }
}

pub struct And<A, B>(A, B);

impl<A: Specification, B: Specification> Specification for And<A, B> {
    fn is_satisfied_by(&self, metadata: &PropertySet, source: Source<'_>) -> bool {
        self.0.is_satisfied_by(metadata, source) && self.1.is_satisfied_by(metadata, source)
    }
}

pub struct Or<A, B>(A, B);

impl<A: Specification, B: Specification> Specification for Or<A, B> {
    fn is_satisfied_by(&self, metadata: &PropertySet, source: Source<'_>) -> bool {
        self.0.is_satisfied_by(metadata, source) || self.1.is_satisfied_by(metadata, source)
    }
}

pub struct Not<A>(A);

impl<A: Specification> Specification for Not<A> {
    fn is_satisfied_by(&self, metadata: &PropertySet, source: Source<'_>) -> bool {
        !self.0.is_satisfied_by(metadata, source)
    }
}
