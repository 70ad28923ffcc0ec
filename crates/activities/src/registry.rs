//! Immutable dispatch table from activity type to handler.

use std::collections::BTreeMap;
use std::fmt;

use thiserror::Error;

use crate::ActivityHandler;
use crate::handlers;

#[derive(Debug, Error)]
pub enum RegistryError {
    #[error("a handler for `{0}` is already registered")]
    Duplicate(&'static str),
}

/// Handlers keyed by their activity type. Built once, then read-only.
pub struct HandlerRegistry {
    handlers: BTreeMap<&'static str, Box<dyn ActivityHandler>>,
}

impl fmt::Debug for HandlerRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_set().entries(self.handlers.keys()).finish()
    }
}

impl Default for HandlerRegistry {
    fn default() -> Self {
        Self::with_default_handlers()
    }
}

impl HandlerRegistry {
    pub fn builder() -> RegistryBuilder {
        RegistryBuilder {
            handlers: BTreeMap::new(),
        }
    }

    /// Registry holding every built-in activity.
    pub fn with_default_handlers() -> Self {
        let mut builder = Self::builder();
        for handler in handlers::defaults() {
            builder.handlers.insert(handler.activity_type(), handler);
        }
        builder.build()
    }

    pub fn get(&self, activity_type: &str) -> Option<&dyn ActivityHandler> {
        self.handlers.get(activity_type).map(|handler| handler.as_ref())
    }

    pub fn contains(&self, activity_type: &str) -> bool {
        self.handlers.contains_key(activity_type)
    }

    pub fn activity_types(&self) -> impl Iterator<Item = &'static str> + '_ {
        self.handlers.keys().copied()
    }

    pub fn len(&self) -> usize {
        self.handlers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.handlers.is_empty()
    }
}

pub struct RegistryBuilder {
    handlers: BTreeMap<&'static str, Box<dyn ActivityHandler>>,
}

impl RegistryBuilder {
    /// Add the built-in handlers.
    pub fn with_defaults(mut self) -> Result<Self, RegistryError> {
        for handler in handlers::defaults() {
            self = self.register_boxed(handler)?;
        }
        Ok(self)
    }

    pub fn register<H: ActivityHandler + 'static>(self, handler: H) -> Result<Self, RegistryError> {
        self.register_boxed(Box::new(handler))
    }

    pub fn register_boxed(mut self, handler: Box<dyn ActivityHandler>) -> Result<Self, RegistryError> {
        let key = handler.activity_type();
        if self.handlers.contains_key(key) {
            return Err(RegistryError::Duplicate(key));
        }
        tracing::debug!(activity_type = key, "registered activity handler");
        self.handlers.insert(key, handler);
        Ok(self)
    }

    pub fn build(self) -> HandlerRegistry {
        HandlerRegistry {
            handlers: self.handlers,
        }
    }
}
