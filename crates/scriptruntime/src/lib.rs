//! Script graph execution runtime
//!
//! Compiles graph definitions against a registry of node types and runs
//! them as tick-driven instances: flow tokens move one node per tick,
//! forks and joins are tracked per activation.

mod activation;
mod compiler;
mod executor;
mod lint;
mod registry;
mod runtime;

pub use activation::{ActivationStore, Slot};
pub use compiler::{CompiledGraph, CompiledNode, DataLink, FlowTarget};
pub use executor::{
    FlowToken, InstanceStatus, ScriptInstance, StalledJoin, TickSummary, TraceEntry,
    TraceOutcome, WaitingJoin,
};
pub use lint::{lint, Diagnostic, Severity};
pub use registry::NodeTypeRegistry;
pub use runtime::{RuntimeConfig, ScriptRuntime};

pub use petgraph::graph::NodeIndex;
