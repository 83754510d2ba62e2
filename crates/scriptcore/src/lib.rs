//! Core abstractions for the script engine
//!
//! Pin model, node type contract, execution context, graph definitions and
//! execution events. Everything here is free of scheduling logic; the engine
//! itself lives in `scriptruntime`.

mod error;
pub mod events;
mod graph;
mod node;
mod pin;
mod value;

pub use error::{DefinitionError, NodeError, ScriptError};
pub use events::{EventBus, EventEmitter, ExecutionEvent, InstanceId, NodeEvent};
pub use graph::{Connection, GraphId, GraphSettings, NodeId, NodeSpec, Position, ScriptGraph};
pub use node::{
    ActivationId, ActivationState, DataSource, ExecutionState, NodeClassification, NodeContext,
    NodeMetadata, NodeResult, NodeType,
};
pub use pin::{flow_output_pins, PinDirection, PinKind, PinSet, PinType, MAX_PINS};
pub use value::Value;

/// Result type for script operations
pub type Result<T> = std::result::Result<T, ScriptError>;
