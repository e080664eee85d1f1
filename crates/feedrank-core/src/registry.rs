//! Lookup table of named scoring implementations.
//!
//! Persisted algorithms never contain code, only implementation keys. Loading
//! an algorithm resolves each key against a [`FunctionRegistry`]; a key that
//! is not registered fails the load with [`crate::Error::Registration`].

use std::collections::HashMap;
use std::sync::{OnceLock, PoisonError, RwLock};

use tracing::debug;

use crate::function::Computation;
use crate::item::Item;

#[derive(Debug, Default)]
pub struct FunctionRegistry {
    entries: RwLock<HashMap<String, Computation>>,
}

impl FunctionRegistry {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// The process-wide registry.
    pub fn global() -> &'static Self {
        static GLOBAL: OnceLock<FunctionRegistry> = OnceLock::new();
        GLOBAL.get_or_init(Self::new)
    }

    /// Register `computation` under its key, returning the one it replaces.
    pub fn register(&self, computation: Computation) -> Option<Computation> {
        debug!(key = computation.key(), "registering scoring implementation");
        self.entries
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(computation.key().to_string(), computation)
    }

    /// Register a closure under `key` and return the resulting computation.
    pub fn register_fn<F>(&self, key: impl Into<String>, func: F) -> Computation
    where
        F: Fn(&Item) -> anyhow::Result<f64> + Send + Sync + 'static,
    {
        let computation = Computation::new(key, func);
        self.register(computation.clone());
        computation
    }

    #[must_use]
    pub fn resolve(&self, key: &str) -> Option<Computation> {
        self.entries
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(key)
            .cloned()
    }

    #[must_use]
    pub fn contains(&self, key: &str) -> bool {
        self.entries
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .contains_key(key)
    }

    /// Registered keys, sorted.
    #[must_use]
    pub fn keys(&self) -> Vec<String> {
        let mut keys: Vec<String> = self
            .entries
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .keys()
            .cloned()
            .collect();
        keys.sort();
        keys
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.entries
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn resolve_returns_registered_computation() {
        let registry = FunctionRegistry::new();
        registry.register_fn("zero", |_| Ok(0.0));

        let computation = registry.resolve("zero").expect("registered");
        assert_eq!(computation.key(), "zero");
        assert!(registry.resolve("missing").is_none());
        assert!(registry.contains("zero"));
    }

    #[test]
    fn re_registering_replaces_previous_entry() {
        let registry = FunctionRegistry::new();
        assert!(registry.register(Computation::new("k", |_| Ok(1.0))).is_none());
        let previous = registry.register(Computation::new("k", |_| Ok(2.0)));

        assert!(previous.is_some());
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn keys_are_sorted() {
        let registry = FunctionRegistry::new();
        registry.register_fn("b", |_| Ok(0.0));
        registry.register_fn("a", |_| Ok(0.0));
        registry.register_fn("c", |_| Ok(0.0));
        assert_eq!(registry.keys(), vec!["a", "b", "c"]);
    }

    #[test]
    fn global_registry_is_shared() {
        FunctionRegistry::global().register_fn("registry-test-global", |_| Ok(3.0));
        assert!(FunctionRegistry::global().contains("registry-test-global"));
    }
}
