use std::collections::BTreeMap;
use std::sync::Arc;

use tracing::debug;

use dagflow_core::traits::WorkUnit;
use dagflow_core::types::{NodeDefinition, SlotValues, Value};

/// A node in the graph.
///
/// Each node wraps an externally supplied unit of work together with the
/// input slots it declares (optionally with defaults) and the output slots
/// it publishes. Resolved values live in the run's context, never here.
#[derive(Clone)]
pub struct Node {
    /// Unique identifier for this node.
    pub id: String,
    /// The unit of work invoked when this node executes.
    pub unit: Arc<dyn WorkUnit>,
    /// Declared input slots; `None` means no default.
    pub inputs: BTreeMap<String, Option<Value>>,
    /// Declared output slots (empty = publish everything the unit returns).
    pub outputs: Vec<String>,
}

impl Node {
    /// Create a node with no declared slots.
    pub fn new(id: impl Into<String>, unit: Arc<dyn WorkUnit>) -> Self {
        Self {
            id: id.into(),
            unit,
            inputs: BTreeMap::new(),
            outputs: vec![],
        }
    }

    /// Declare an input slot without a default.
    pub fn with_input(mut self, slot: impl Into<String>) -> Self {
        self.inputs.insert(slot.into(), None);
        self
    }

    /// Declare an input slot with a default value.
    pub fn with_default(mut self, slot: impl Into<String>, value: Value) -> Self {
        self.inputs.insert(slot.into(), Some(value));
        self
    }

    /// Declare output slots.
    pub fn with_outputs(mut self, slots: Vec<String>) -> Self {
        self.outputs = slots;
        self
    }

    /// Name of the unit of work.
    pub fn unit_name(&self) -> &str {
        self.unit.name()
    }

    /// Whether `slot` may be the target of an edge.
    pub fn accepts_input(&self, slot: &str) -> bool {
        self.inputs.is_empty() || self.inputs.contains_key(slot)
    }

    /// Whether `slot` may be the source of an edge.
    pub fn provides_output(&self, slot: &str) -> bool {
        self.outputs.is_empty() || self.outputs.iter().any(|s| s == slot)
    }

    pub fn default_for(&self, slot: &str) -> Option<&Value> {
        self.inputs.get(slot).and_then(|d| d.as_ref())
    }

    /// Keep only the declared outputs of a unit's result.
    pub fn publishable(&self, produced: SlotValues) -> SlotValues {
        if self.outputs.is_empty() {
            return produced;
        }
        produced
            .into_iter()
            .filter(|(slot, _)| {
                let declared = self.provides_output(slot);
                if !declared {
                    debug!(node_id = %self.id, slot = %slot, "Dropping undeclared output");
                }
                declared
            })
            .collect()
    }

    pub fn to_definition(&self) -> NodeDefinition {
        NodeDefinition {
            id: self.id.clone(),
            unit: self.unit_name().to_string(),
            inputs: self.inputs.clone(),
            outputs: self.outputs.clone(),
        }
    }
}

impl std::fmt::Debug for Node {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Node")
            .field("id", &self.id)
            .field("unit", &self.unit_name())
            .field("inputs", &self.inputs)
            .field("outputs", &self.outputs)
            .finish()
    }
}
