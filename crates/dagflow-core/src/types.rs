use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Values written to and read from slots are plain JSON.
pub type Value = serde_json::Value;

/// Slot name -> value, ordered by slot name so iteration is reproducible.
pub type SlotValues = BTreeMap<String, Value>;

/// Unique graph identifier (assigned by the persistence collaborator).
#[derive(Debug, Clone, Hash, Eq, PartialEq, Ord, PartialOrd, Serialize, Deserialize)]
pub struct GraphId(pub String);

impl GraphId {
    pub fn new() -> Self {
        Self(Uuid::new_v4().to_string())
    }

    pub fn from_string(s: &str) -> Self {
        Self(s.to_string())
    }
}

impl Default for GraphId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for GraphId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Unique run identifier. Every execution gets a fresh one.
#[derive(Debug, Clone, Hash, Eq, PartialEq, Serialize, Deserialize)]
pub struct RunId(pub String);

impl RunId {
    pub fn new() -> Self {
        Self(Uuid::new_v4().to_string())
    }

    pub fn from_string(s: &str) -> Self {
        Self(s.to_string())
    }
}

impl Default for RunId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for RunId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

// ── Graph documents ─────────────────────────────────────────────

/// Serialized form of a node: its id, the name of its unit of work, and
/// its declared slots.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NodeDefinition {
    pub id: String,
    pub unit: String,
    /// Declared input slots. A `null` value means "no default".
    #[serde(default)]
    pub inputs: BTreeMap<String, Option<Value>>,
    /// Declared output slots. Empty means every slot the unit returns is published.
    #[serde(default)]
    pub outputs: Vec<String>,
}

impl NodeDefinition {
    pub fn new(id: impl Into<String>, unit: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            unit: unit.into(),
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

    /// Declare an output slot.
    pub fn with_output(mut self, slot: impl Into<String>) -> Self {
        self.outputs.push(slot.into());
        self
    }
}

/// Serialized form of an edge: `source.source_slot -> target.target_slot`.
#[derive(Debug, Clone, Hash, Eq, PartialEq, Serialize, Deserialize)]
pub struct EdgeDefinition {
    pub source: String,
    pub source_slot: String,
    pub target: String,
    pub target_slot: String,
}

impl EdgeDefinition {
    pub fn new(
        source: impl Into<String>,
        source_slot: impl Into<String>,
        target: impl Into<String>,
        target_slot: impl Into<String>,
    ) -> Self {
        Self {
            source: source.into(),
            source_slot: source_slot.into(),
            target: target.into(),
            target_slot: target_slot.into(),
        }
    }
}

impl std::fmt::Display for EdgeDefinition {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{}.{} -> {}.{}",
            self.source, self.source_slot, self.target, self.target_slot
        )
    }
}

/// A complete graph document. Node and edge order is insertion order.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct GraphDefinition {
    #[serde(default)]
    pub nodes: Vec<NodeDefinition>,
    #[serde(default)]
    pub edges: Vec<EdgeDefinition>,
}

/// A graph document as held by the persistence collaborator.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoredGraph {
    pub id: GraphId,
    pub definition: GraphDefinition,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

// ── Run results ─────────────────────────────────────────────────

/// Lifecycle of a single run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunStatus {
    Pending,
    Running,
    Completed,
    Failed,
}

impl std::fmt::Display for RunStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::Pending => "pending",
            Self::Running => "running",
            Self::Completed => "completed",
            Self::Failed => "failed",
        };
        f.write_str(s)
    }
}

/// Final status of a node within a run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum NodeStatus {
    Pending,
    Succeeded,
    Failed,
    Skipped { reason: SkipReason },
}

impl NodeStatus {
    pub fn is_skipped(&self) -> bool {
        matches!(self, Self::Skipped { .. })
    }
}

/// Why a node did not execute.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "node", rename_all = "snake_case")]
pub enum SkipReason {
    /// An upstream node failed (carries the failed node's id).
    UpstreamFailed(String),
    /// The run halted after a failure under fail-fast.
    Halted,
    /// The caller cancelled the run.
    Cancelled,
    /// Excluded by the run config's enable/disable lists.
    Disabled,
}

/// Where a slot value came from.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ValueSource {
    /// The node's declared default.
    Default,
    /// `root_inputs` of the run config.
    RootInput,
    /// `data_overwrites` of the run config.
    Pinned,
    /// Propagated along an edge from `node.slot`.
    Edge { node: String, slot: String },
}

/// What happened to the incoming write of an overwrite event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OverwriteResolution {
    /// The incoming value replaced the previous one.
    Replaced,
    /// The previous value was kept.
    Kept,
    /// The slot is pinned by the run config; the incoming value was discarded.
    Pinned,
    /// Conflicting writes; the target node will fail.
    Conflict,
}

/// A second (or later) write to an input slot within one run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OverwriteEvent {
    pub node: String,
    pub slot: String,
    pub previous: ValueSource,
    pub incoming: ValueSource,
    pub old_value: Value,
    pub new_value: Value,
    pub resolution: OverwriteResolution,
}

/// A per-node error record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NodeError {
    pub node: String,
    pub kind: crate::ErrorKind,
    pub message: String,
}

/// Per-node section of a run result.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NodeReport {
    #[serde(flatten)]
    pub status: NodeStatus,
    #[serde(default)]
    pub inputs: SlotValues,
    #[serde(default)]
    pub outputs: SlotValues,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(default)]
    pub elapsed_ms: u64,
}

impl NodeReport {
    pub fn pending() -> Self {
        Self {
            status: NodeStatus::Pending,
            inputs: SlotValues::new(),
            outputs: SlotValues::new(),
            error: None,
            elapsed_ms: 0,
        }
    }
}

/// Outcome of one run, independent of every other run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunResult {
    pub run_id: RunId,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub graph_id: Option<GraphId>,
    pub status: RunStatus,
    /// Nodes in the order they were visited.
    pub order: Vec<String>,
    /// Nodes with no outgoing edges.
    pub leaves: Vec<String>,
    pub nodes: BTreeMap<String, NodeReport>,
    pub errors: Vec<NodeError>,
    pub overwrites: Vec<OverwriteEvent>,
    #[serde(default)]
    pub cancelled: bool,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
}

impl RunResult {
    pub fn succeeded(&self) -> bool {
        self.status == RunStatus::Completed
    }

    pub fn node_status(&self, node: &str) -> Option<&NodeStatus> {
        self.nodes.get(node).map(|r| &r.status)
    }

    /// Outputs of one node, if it ran.
    pub fn node_outputs(&self, node: &str) -> Option<&SlotValues> {
        self.nodes.get(node).map(|r| &r.outputs)
    }

    /// Final outputs of every node.
    pub fn outputs(&self) -> BTreeMap<String, SlotValues> {
        self.nodes
            .iter()
            .map(|(id, r)| (id.clone(), r.outputs.clone()))
            .collect()
    }

    /// Outputs of the leaf nodes only.
    pub fn leaf_outputs(&self) -> BTreeMap<String, SlotValues> {
        self.leaves
            .iter()
            .filter_map(|id| self.nodes.get(id).map(|r| (id.clone(), r.outputs.clone())))
            .collect()
    }
}

/// Events emitted while a run progresses.
#[derive(Debug, Clone)]
pub enum RunEvent {
    RunStarted {
        run_id: RunId,
        nodes: usize,
    },
    NodeStarted {
        run_id: RunId,
        node: String,
    },
    NodeFinished {
        run_id: RunId,
        node: String,
        status: NodeStatus,
    },
    InputOverwritten {
        run_id: RunId,
        event: OverwriteEvent,
    },
    RunFinished {
        run_id: RunId,
        status: RunStatus,
    },
}
