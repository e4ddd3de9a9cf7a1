//! Named callbacks referenced by validation and auto-fill rules.

use crate::error::{ModelError, ModelResult};
use crate::value::Value;
use indexmap::IndexMap;
use std::fmt;
use std::sync::Arc;

/// Callback body: rule arguments in, value out
pub type CallbackFn = Arc<dyn Fn(&[Value]) -> Value + Send + Sync>;

/// Callbacks a model's rules can call by name
#[derive(Clone, Default)]
pub struct CallbackRegistry {
    callbacks: IndexMap<String, CallbackFn>,
}

impl fmt::Debug for CallbackRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_list().entries(self.callbacks.keys()).finish()
    }
}

impl CallbackRegistry {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `callback` under `name`, replacing any previous one
    pub fn register<F>(&mut self, name: impl Into<String>, callback: F)
    where
        F: Fn(&[Value]) -> Value + Send + Sync + 'static,
    {
        self.callbacks.insert(name.into(), Arc::new(callback));
    }

    #[must_use]
    pub fn contains(&self, name: &str) -> bool {
        self.callbacks.contains_key(name)
    }

    /// Call the callback registered as `name`
    ///
    /// # Errors
    ///
    /// Returns `ModelError::UnknownMethod` when nothing is registered under `name`.
    pub fn call(&self, name: &str, args: &[Value]) -> ModelResult<Value> {
        let callback = self
            .callbacks
            .get(name)
            .ok_or_else(|| ModelError::UnknownMethod(name.to_string()))?;
        Ok(callback(args))
    }
}
