use crate::{NodeId, PinDirection, PinKind};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ScriptError {
    #[error("Definition error: {0}")]
    Definition(#[from] DefinitionError),

    #[error("Node error: {0}")]
    Node(#[from] NodeError),

    #[error("Graph not found: {0}")]
    GraphNotFound(String),

    #[error("Node {0} is not part of this graph")]
    UnknownNode(NodeId),

    #[error("Node {0} is not an entry node")]
    NotAnEntry(NodeId),

    #[error("Instance was aborted")]
    InstanceAborted,

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Raised by node types while validating their configuration
#[derive(Error, Debug, Clone)]
pub enum NodeError {
    #[error("Missing config: {0}")]
    MissingConfig(String),

    #[error("Invalid config type for '{field}': expected {expected}, got {actual}")]
    InvalidConfigType {
        field: String,
        expected: String,
        actual: String,
    },

    #[error("Configuration error: {0}")]
    Configuration(String),
}

/// Problems found while compiling a graph definition. Any of these rejects
/// the whole graph.
#[derive(Error, Debug)]
pub enum DefinitionError {
    #[error("Duplicate node id: {0}")]
    DuplicateNode(NodeId),

    #[error("Node not found: {0}")]
    NodeNotFound(NodeId),

    #[error("Unknown node type: {0}")]
    UnknownNodeType(String),

    #[error("Node type '{node_type}' declares {count} pins, the limit is {max}")]
    TooManyPins {
        node_type: String,
        count: usize,
        max: usize,
    },

    #[error("Node {node} has no pin {pin}")]
    PinOutOfRange { node: NodeId, pin: u8 },

    #[error(
        "Pin {pin} on node {node} is {actual_kind:?}/{actual_direction:?}, expected {expected_kind:?}/{expected_direction:?}"
    )]
    PinMismatch {
        node: NodeId,
        pin: u8,
        expected_kind: PinKind,
        expected_direction: PinDirection,
        actual_kind: PinKind,
        actual_direction: PinDirection,
    },

    #[error("Connection kinds differ: {from_kind:?} output wired into {to_kind:?} input on node {node}")]
    KindMismatch {
        node: NodeId,
        from_kind: PinKind,
        to_kind: PinKind,
    },

    #[error("Flow output {pin} on node {node} is not wired")]
    UnwiredOutput { node: NodeId, pin: u8 },

    #[error("Data input {pin} on node {node} is wired more than once")]
    DataInputAlreadyWired { node: NodeId, pin: u8 },

    #[error("Cyclic data dependency through node {0}")]
    CyclicDataDependency(NodeId),

    #[error("Invalid configuration on node {node}: {source}")]
    InvalidConfig {
        node: NodeId,
        #[source]
        source: NodeError,
    },
}
