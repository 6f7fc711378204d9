use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum FlowError {
    // Structural errors (graph left unchanged)
    #[error("Node already exists: {0}")]
    DuplicateNode(String),

    #[error("Edge already exists: {0}")]
    DuplicateEdge(String),

    #[error("Node not found: {0}")]
    NodeNotFound(String),

    #[error("Edge not found: {0}")]
    EdgeNotFound(String),

    #[error("Slot not found: {node}.{slot}")]
    SlotNotFound { node: String, slot: String },

    #[error("Cycle detected: {}", path.join(" -> "))]
    Cycle { path: Vec<String> },

    #[error("Graph mutation rejected, {active_runs} run(s) in progress: {operation}")]
    NodeInUse { operation: String, active_runs: usize },

    // Scheduling
    #[error("Schedule invariant violated: ordered {ordered} of {total} nodes, unresolved: {}", unresolved.join(", "))]
    Schedule {
        ordered: usize,
        total: usize,
        unresolved: Vec<String>,
    },

    // Per-node run errors
    #[error("Missing input for node {node}: slot '{slot}' has no incoming value and no default")]
    MissingInput { node: String, slot: String },

    #[error("Conflicting writes to input {node}.{slot}")]
    InputConflict { node: String, slot: String },

    #[error("Node {node} failed: {message}")]
    Unit { node: String, message: String },

    #[error("Work unit not registered: {0}")]
    UnknownUnit(String),

    #[error("Invalid run config: {0}")]
    InvalidRunConfig(String),

    // Collaborator lookups
    #[error("Graph not found: {0}")]
    GraphNotFound(String),

    #[error("Run not found: {0}")]
    RunNotFound(String),

    // Config errors
    #[error("Config error: {0}")]
    Config(String),

    #[error("Config file not found: {0}")]
    ConfigNotFound(String),

    // Storage errors
    #[error("Database error: {0}")]
    Database(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Coarse classification of [`FlowError`], used by collaborators to map
/// failures onto their own status codes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    DuplicateNode,
    DuplicateEdge,
    NotFound,
    Cycle,
    Schedule,
    NodeInUse,
    MissingInput,
    /// Failure raised by a node's unit of work (or an input conflict on that node).
    Node,
    InvalidInput,
    Storage,
}

impl FlowError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::DuplicateNode(_) => ErrorKind::DuplicateNode,
            Self::DuplicateEdge(_) => ErrorKind::DuplicateEdge,
            Self::NodeNotFound(_)
            | Self::EdgeNotFound(_)
            | Self::SlotNotFound { .. }
            | Self::GraphNotFound(_)
            | Self::RunNotFound(_) => ErrorKind::NotFound,
            Self::Cycle { .. } => ErrorKind::Cycle,
            Self::Schedule { .. } => ErrorKind::Schedule,
            Self::NodeInUse { .. } => ErrorKind::NodeInUse,
            Self::MissingInput { .. } => ErrorKind::MissingInput,
            Self::Unit { .. } | Self::InputConflict { .. } => ErrorKind::Node,
            Self::UnknownUnit(_)
            | Self::InvalidRunConfig(_)
            | Self::Config(_)
            | Self::ConfigNotFound(_)
            | Self::Json(_) => ErrorKind::InvalidInput,
            Self::Database(_) | Self::Io(_) => ErrorKind::Storage,
        }
    }
}

pub type Result<T> = std::result::Result<T, FlowError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cycle_message_names_path() {
        let err = FlowError::Cycle {
            path: vec!["a".into(), "b".into(), "a".into()],
        };
        assert_eq!(err.to_string(), "Cycle detected: a -> b -> a");
        assert_eq!(err.kind(), ErrorKind::Cycle);
    }

    #[test]
    fn test_kinds() {
        assert_eq!(
            FlowError::SlotNotFound {
                node: "n".into(),
                slot: "s".into()
            }
            .kind(),
            ErrorKind::NotFound
        );
        assert_eq!(
            FlowError::DuplicateEdge("a.out -> b.in".into()).kind(),
            ErrorKind::DuplicateEdge
        );
        assert_eq!(
            FlowError::DuplicateNode("a".into()).kind(),
            ErrorKind::DuplicateNode
        );
        assert_eq!(
            FlowError::Unit {
                node: "n".into(),
                message: "boom".into()
            }
            .kind(),
            ErrorKind::Node
        );
    }

    #[test]
    fn test_schedule_message() {
        let err = FlowError::Schedule {
            ordered: 1,
            total: 3,
            unresolved: vec!["b".into(), "c".into()],
        };
        assert!(err.to_string().contains("ordered 1 of 3"));
        assert!(err.to_string().contains("b, c"));
    }
}
