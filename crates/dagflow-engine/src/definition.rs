use std::path::Path;

use serde::de::DeserializeOwned;
use tracing::info;

use dagflow_core::error::{FlowError, Result};
use dagflow_core::types::{GraphDefinition, NodeDefinition};

use crate::graph::{Edge, Graph, Node};
use crate::registry::UnitRegistry;

impl Node {
    /// Build a node from its definition, resolving the unit by name.
    pub fn from_definition(def: &NodeDefinition, registry: &UnitRegistry) -> Result<Self> {
        let unit = registry.resolve(&def.unit)?;
        let mut node = Node::new(def.id.clone(), unit).with_outputs(def.outputs.clone());
        node.inputs = def.inputs.clone();
        Ok(node)
    }
}

impl Graph {
    /// Build a graph from a definition, resolving unit names through
    /// `registry`. Goes through `add_node`/`add_edge`, so a definition with a
    /// duplicate node, a dangling edge, or a cycle is rejected with the same
    /// error the mutation would raise.
    pub fn from_definition(definition: &GraphDefinition, registry: &UnitRegistry) -> Result<Self> {
        let mut graph = Graph::new();
        for def in &definition.nodes {
            graph.add_node(Node::from_definition(def, registry)?)?;
        }
        for def in &definition.edges {
            graph.add_edge(Edge::from(def.clone()))?;
        }
        Ok(graph)
    }

    /// Nodes and edges, both in insertion order.
    pub fn to_definition(&self) -> GraphDefinition {
        GraphDefinition {
            nodes: self.nodes().map(Node::to_definition).collect(),
            edges: self.edges().map(Edge::to_definition).collect(),
        }
    }
}

/// Load a graph definition from a `.json` or `.toml` file.
pub fn load_definition(path: &Path) -> Result<GraphDefinition> {
    let definition: GraphDefinition = load_document(path)?;
    info!(
        path = %path.display(),
        nodes = definition.nodes.len(),
        edges = definition.edges.len(),
        "Loaded graph definition"
    );
    Ok(definition)
}

/// Deserialize a JSON or TOML document, picking the format by extension.
pub(crate) fn load_document<T: DeserializeOwned>(path: &Path) -> Result<T> {
    let content = std::fs::read_to_string(path)?;
    match path.extension().and_then(|e| e.to_str()) {
        Some("toml") => toml::from_str(&content)
            .map_err(|e| FlowError::Config(format!("{}: {e}", path.display()))),
        Some("json") => Ok(serde_json::from_str(&content)?),
        other => Err(FlowError::Config(format!(
            "unsupported file extension {:?}: {}",
            other.unwrap_or(""),
            path.display()
        ))),
    }
}
