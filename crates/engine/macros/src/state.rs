//! Status providers and the provider registry
//!
//! Machine state is exposed to macros through named providers, each able to
//! produce a snapshot of its current state on demand. The registry is the
//! root of the object graph: scripts reach a provider by name through the
//! state proxy, and everything below that name is resolved against the
//! snapshot the provider returns.

use crate::Value;
use std::collections::HashMap;
use std::sync::{Arc, RwLock};

/// One provider's state snapshot: field name to value
pub type Status = HashMap<String, Value>;

/// The tick passed for "current state" snapshots
///
/// Tick 0 means last-known state, not a historical tick. Providers that
/// track time-series state may interpret other ticks; the macro engine only
/// ever asks for now.
pub const CURRENT_TICK: f64 = 0.0;

/// Capability to produce a status snapshot for a given logical tick
pub trait StatusProvider: Send + Sync {
    /// Produce a snapshot of this provider's state at `tick`
    fn status(&self, tick: f64) -> Status;
}

/// Named lookup table of status providers
///
/// The registry is shared read-only across invocations; providers carry
/// their own interior mutability where their state changes.
#[derive(Default)]
pub struct StateRegistry {
    providers: HashMap<String, Arc<dyn StatusProvider>>,
}

impl StateRegistry {
    /// Create an empty registry
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a provider under a name, replacing any previous entry
    pub fn register(&mut self, name: impl Into<String>, provider: Arc<dyn StatusProvider>) {
        self.providers.insert(name.into(), provider);
    }

    /// Look up a provider by name
    pub fn lookup(&self, name: &str) -> Option<Arc<dyn StatusProvider>> {
        self.providers.get(name).cloned()
    }

    /// Registered provider names, sorted
    pub fn names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.providers.keys().map(|s| s.as_str()).collect();
        names.sort_unstable();
        names
    }
}

impl std::fmt::Debug for StateRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StateRegistry")
            .field("providers", &self.names())
            .finish()
    }
}

/// Map-backed status provider
///
/// Holds a plain field map behind a lock so the host (or a test) can update
/// fields while macros read them. Every `status` call clones the current
/// map, so two reads in one script observe updates made in between.
#[derive(Default)]
pub struct StaticStatus {
    fields: RwLock<Status>,
}

impl StaticStatus {
    /// Create a provider from an initial field map
    pub fn new(fields: Status) -> Self {
        Self {
            fields: RwLock::new(fields),
        }
    }

    /// Set or replace one field
    pub fn set(&self, name: impl Into<String>, value: Value) {
        self.fields.write().unwrap().insert(name.into(), value);
    }
}

impl StatusProvider for StaticStatus {
    fn status(&self, _tick: f64) -> Status {
        self.fields.read().unwrap().clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_registry_lookup() {
        let mut registry = StateRegistry::new();
        registry.register("extruder", Arc::new(StaticStatus::default()));

        assert!(registry.lookup("extruder").is_some());
        assert!(registry.lookup("chamber").is_none());
    }

    #[test]
    fn test_registry_names_sorted() {
        let mut registry = StateRegistry::new();
        registry.register("toolhead", Arc::new(StaticStatus::default()));
        registry.register("bed", Arc::new(StaticStatus::default()));

        assert_eq!(registry.names(), vec!["bed", "toolhead"]);
    }

    #[test]
    fn test_static_status_updates_between_reads() {
        let provider = StaticStatus::new(Status::from([(
            "temperature".to_string(),
            Value::from(24.6),
        )]));

        let first = provider.status(CURRENT_TICK);
        assert_eq!(first["temperature"], Value::from(24.6));

        provider.set("temperature", Value::from(205.0));
        let second = provider.status(CURRENT_TICK);
        assert_eq!(second["temperature"], Value::from(205.0));
    }
}
