use std::collections::{BTreeMap, BTreeSet};
use std::path::Path;

use serde::{Deserialize, Serialize};

use dagflow_core::error::{FlowError, Result};
use dagflow_core::types::{SlotValues, Value};

use crate::definition::load_document;
use crate::graph::{Graph, Node};

/// Per-run configuration: seed values, pinned values, and which nodes run.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RunConfig {
    /// Input values for root nodes, keyed by node then slot.
    #[serde(default)]
    pub root_inputs: BTreeMap<String, SlotValues>,
    /// Pinned input values for non-root nodes; they win over every edge write.
    #[serde(default)]
    pub data_overwrites: BTreeMap<String, SlotValues>,
    /// If non-empty, only these nodes run.
    #[serde(default)]
    pub enable_list: Vec<String>,
    /// Nodes that do not run (ignored when `enable_list` is non-empty).
    #[serde(default)]
    pub disable_list: Vec<String>,
}

impl RunConfig {
    pub fn new() -> Self {
        Self::default()
    }

    /// Load a run configuration from a `.json` or `.toml` file.
    pub fn load(path: &Path) -> Result<Self> {
        load_document(path)
    }

    pub fn with_root_input(mut self, node: &str, slot: &str, value: Value) -> Self {
        self.root_inputs
            .entry(node.to_string())
            .or_default()
            .insert(slot.to_string(), value);
        self
    }

    pub fn with_overwrite(mut self, node: &str, slot: &str, value: Value) -> Self {
        self.data_overwrites
            .entry(node.to_string())
            .or_default()
            .insert(slot.to_string(), value);
        self
    }

    pub fn enable(mut self, node: &str) -> Self {
        self.enable_list.push(node.to_string());
        self
    }

    pub fn disable(mut self, node: &str) -> Self {
        self.disable_list.push(node.to_string());
        self
    }

    pub fn is_enabled(&self, node: &str) -> bool {
        if !self.enable_list.is_empty() {
            self.enable_list.iter().any(|n| n == node)
        } else {
            !self.disable_list.iter().any(|n| n == node)
        }
    }

    /// Check this config against a graph.
    pub fn validate(&self, graph: &Graph) -> Result<()> {
        for (id, values) in &self.root_inputs {
            let node = graph
                .node(id)
                .ok_or_else(|| invalid(format!("root_inputs names unknown node '{id}'")))?;
            if graph.in_degree(id)? > 0 {
                return Err(invalid(format!(
                    "node '{id}' in root_inputs must be a root node (no incoming edges)"
                )));
            }
            check_slots("root_inputs", node, values)?;
        }

        for (id, values) in &self.data_overwrites {
            let node = graph
                .node(id)
                .ok_or_else(|| invalid(format!("data_overwrites names unknown node '{id}'")))?;
            if graph.in_degree(id)? == 0 {
                return Err(invalid(format!(
                    "node '{id}' in data_overwrites must be a non-root node (with incoming edges)"
                )));
            }
            check_slots("data_overwrites", node, values)?;
        }

        let enabled: BTreeSet<&str> = self.enable_list.iter().map(String::as_str).collect();
        let both: Vec<&str> = self
            .disable_list
            .iter()
            .map(String::as_str)
            .filter(|id| enabled.contains(id))
            .collect();
        if !both.is_empty() {
            return Err(invalid(format!(
                "nodes cannot appear in both enable_list and disable_list: {}",
                both.join(", ")
            )));
        }

        let unknown: Vec<&str> = self
            .enable_list
            .iter()
            .chain(&self.disable_list)
            .map(String::as_str)
            .filter(|id| !graph.contains_node(id))
            .collect();
        if !unknown.is_empty() {
            return Err(invalid(format!(
                "unknown nodes in enable/disable list: {}",
                unknown.join(", ")
            )));
        }

        Ok(())
    }
}

fn invalid(message: String) -> FlowError {
    FlowError::InvalidRunConfig(message)
}

/// Slots must be declared (when the node declares any), and a value must have
/// the same JSON type as the slot's default, if it has one.
fn check_slots(field: &str, node: &Node, values: &SlotValues) -> Result<()> {
    for (slot, value) in values {
        if !node.accepts_input(slot) {
            return Err(invalid(format!(
                "{field} for node '{}' names undeclared slot '{slot}'",
                node.id
            )));
        }
        if let Some(default) = node.default_for(slot) {
            if !same_type(default, value) {
                return Err(invalid(format!(
                    "data type mismatch in {field} for {}.{slot}: expected {}, got {}",
                    node.id,
                    type_name(default),
                    type_name(value)
                )));
            }
        }
    }
    Ok(())
}

fn same_type(expected: &Value, actual: &Value) -> bool {
    std::mem::discriminant(expected) == std::mem::discriminant(actual)
}

fn type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}
