use std::collections::HashMap;
use std::sync::Arc;

use futures::future::BoxFuture;

use dagflow_core::error::{FlowError, Result};
use dagflow_core::traits::{UnitError, WorkUnit};
use dagflow_core::types::SlotValues;

type UnitFn = dyn Fn(SlotValues) -> std::result::Result<SlotValues, UnitError> + Send + Sync;

/// Work unit backed by a synchronous closure.
pub struct FnUnit {
    name: String,
    func: Box<UnitFn>,
}

impl FnUnit {
    pub fn new<F>(name: impl Into<String>, func: F) -> Self
    where
        F: Fn(SlotValues) -> std::result::Result<SlotValues, UnitError> + Send + Sync + 'static,
    {
        Self {
            name: name.into(),
            func: Box::new(func),
        }
    }
}

impl WorkUnit for FnUnit {
    fn name(&self) -> &str {
        &self.name
    }

    fn execute(
        &self,
        inputs: SlotValues,
    ) -> BoxFuture<'_, std::result::Result<SlotValues, UnitError>> {
        let result = (self.func)(inputs);
        Box::pin(async move { result })
    }
}

/// Registry of work units, keyed by name.
pub struct UnitRegistry {
    units: HashMap<String, Arc<dyn WorkUnit>>,
}

impl UnitRegistry {
    pub fn new() -> Self {
        Self {
            units: HashMap::new(),
        }
    }

    /// Register a unit, replacing any unit with the same name.
    pub fn register(&mut self, unit: impl WorkUnit) {
        self.register_arc(Arc::new(unit));
    }

    pub fn register_arc(&mut self, unit: Arc<dyn WorkUnit>) {
        self.units.insert(unit.name().to_string(), unit);
    }

    /// Unregister a unit by name.
    pub fn unregister(&mut self, name: &str) -> bool {
        self.units.remove(name).is_some()
    }

    pub fn get(&self, name: &str) -> Option<Arc<dyn WorkUnit>> {
        self.units.get(name).cloned()
    }

    /// Like [`get`](Self::get), failing with `UnknownUnit`.
    pub fn resolve(&self, name: &str) -> Result<Arc<dyn WorkUnit>> {
        self.get(name)
            .ok_or_else(|| FlowError::UnknownUnit(name.to_string()))
    }

    /// Registered unit names, sorted.
    pub fn list(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.units.keys().map(|s| s.as_str()).collect();
        names.sort_unstable();
        names
    }

    /// Create a registry with all built-in units registered.
    pub fn with_builtins() -> Self {
        let mut registry = Self::new();
        registry.register(crate::units::IdentityUnit);
        registry.register(crate::units::SumUnit);
        registry.register(crate::units::ConcatUnit);
        registry.register(crate::units::MergeUnit);
        registry.register(crate::units::FailUnit);
        registry
    }
}

impl Default for UnitRegistry {
    fn default() -> Self {
        Self::with_builtins()
    }
}
