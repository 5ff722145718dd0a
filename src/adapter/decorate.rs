// src/adapter/decorate.rs

//! Post-processing applied to every registered adapter's output
//!
//! Instead of nesting wrapper objects, each registered adapter carries an
//! ordered list of steps that run on its output when that output is a
//! property set. The order is fixed at registration time:
//!
//! 1. adapter stamp - records which adapter produced the set
//! 2. timestamp stamp - records when it was produced
//! 3. cleanup - strips values a configuration cannot hold (always last)

use crate::config::AdapterSettings;
use crate::properties::{INFO_ADAPTER, INFO_TIMESTAMP, PropertySet, is_supported_value};
use tracing::trace;

/// A single post-processing step
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Decorator {
    /// Record the adapter name under the adapter info key
    AdapterStamp,
    /// Record the adaptation time under the timestamp info key
    Timestamp,
    /// Drop null, object and mixed-array values
    Cleanup,
}

impl Decorator {
    fn apply(self, adapter: &str, props: &mut PropertySet) {
        match self {
            Decorator::AdapterStamp => {
                props.insert(INFO_ADAPTER, adapter);
            }
            Decorator::Timestamp => {
                props.insert(INFO_TIMESTAMP, chrono::Utc::now().to_rfc3339());
            }
            Decorator::Cleanup => {
                props.retain(|key, value| {
                    let keep = is_supported_value(value);
                    if !keep {
                        trace!(
                            "Adapter '{}' produced unsupported value for '{}', dropping",
                            adapter, key
                        );
                    }
                    keep
                });
            }
        }
    }
}

/// Ordered list of post-processing steps
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DecoratorChain {
    steps: Vec<Decorator>,
}

impl DecoratorChain {
    /// The full chain: adapter stamp, timestamp, cleanup
    pub fn standard() -> Self {
        Self {
            steps: vec![Decorator::AdapterStamp, Decorator::Timestamp, Decorator::Cleanup],
        }
    }

    /// No post-processing at all
    pub fn empty() -> Self {
        Self { steps: Vec::new() }
    }

    /// Build the chain enabled by the adapter settings, in canonical order
    pub fn from_settings(settings: &AdapterSettings) -> Self {
        let mut steps = Vec::with_capacity(3);
        if settings.record_adapter {
            steps.push(Decorator::AdapterStamp);
        }
        if settings.stamp_timestamp {
            steps.push(Decorator::Timestamp);
        }
        if settings.strip_unsupported_values {
            steps.push(Decorator::Cleanup);
        }
        Self { steps }
    }

    pub fn steps(&self) -> &[Decorator] {
        &self.steps
    }

    /// Run every step over an adapted property set
    pub fn apply(&self, adapter: &str, props: &mut PropertySet) {
        for step in &self.steps {
            step.apply(adapter, props);
        }
    }
}

impl Default for DecoratorChain {
    fn default() -> Self {
        Self::standard()
    }
}
