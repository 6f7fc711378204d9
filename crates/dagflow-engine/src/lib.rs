//! Graph engine: DAG model, cycle detection, deterministic scheduling and
//! overwrite-aware data propagation.
//!
//! A workflow is a directed acyclic graph of [`Node`]s connected by [`Edge`]s
//! that carry values from an output slot of one node to an input slot of
//! another. The [`GraphExecutor`] runs nodes in topological order (ties broken
//! by node insertion order), feeding each node the values its predecessors
//! wrote, and records every superseded write in the run's overwrite log.

pub mod context;
pub mod cycle;
pub mod definition;
pub mod executor;
pub mod graph;
pub mod registry;
pub mod run_config;
pub mod scheduler;
pub mod units;

pub use context::RunContext;
pub use definition::load_definition;
pub use executor::GraphExecutor;
pub use graph::{Edge, EdgeId, Graph, Node, RunLease};
pub use registry::{FnUnit, UnitRegistry};
pub use run_config::RunConfig;
pub use scheduler::Frontier;
