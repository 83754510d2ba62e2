use crate::{events::EventEmitter, NodeError, NodeId, NodeSpec, PinSet, PinType, Value};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::fmt;

/// Behavior shared by every node kind. Implementations are stateless: any
/// memory that must outlive one invocation lives in the [`ActivationState`]
/// handed over through the [`NodeContext`].
pub trait NodeType: Send + Sync {
    /// Unique type identifier (e.g. "flow.branch", "time.wait")
    fn node_type(&self) -> &str;

    /// Ordered pin slots. Must return the same slice for the lifetime of the
    /// process; pin indices used in wiring refer to positions in it.
    fn pin_configuration(&self) -> &[PinType];

    /// Called once per token arrival, and once per tick while the node keeps
    /// returning [`ExecutionState::Executing`].
    fn update(&self, ctx: &mut NodeContext<'_>, time: f64, node: &NodeSpec) -> NodeResult {
        let _ = (ctx, time, node);
        NodeResult::done()
    }

    /// Value of data output `pin`. Only meaningful for node types declaring
    /// data outputs; reads must not mutate anything.
    fn get_data(&self, data: &dyn DataSource, node: &NodeSpec, pin: u8) -> Value {
        let _ = (data, node, pin);
        Value::Null
    }

    fn classification(&self) -> NodeClassification {
        NodeClassification::Action
    }

    /// Optional: reject bad configuration at graph load time
    fn validate_config(&self, _config: &BTreeMap<String, Value>) -> Result<(), NodeError> {
        Ok(())
    }

    fn metadata(&self) -> NodeMetadata {
        NodeMetadata::default()
    }
}

/// Static information for tooling; the engine only cares about `Entry`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum NodeClassification {
    /// Where execution starts when an instance is triggered
    Entry,
    /// Ordinary node with side effects or routing
    Action,
    /// Splits or joins flow
    FlowControl,
    /// Ends a token lineage
    Terminator,
    /// Pure value node without flow pins
    Expression,
}

/// Descriptive metadata about a node type
#[derive(Debug, Clone)]
pub struct NodeMetadata {
    pub name: String,
    pub description: String,
    pub category: String,
}

impl Default for NodeMetadata {
    fn default() -> Self {
        Self {
            name: String::new(),
            description: String::new(),
            category: "general".to_string(),
        }
    }
}

/// Read access to data pins, provided to nodes by the engine. Values are a
/// snapshot: every read during one tick sees the same inputs.
pub trait DataSource {
    /// Resolve whatever is wired into data input `pin` of `node`. Unwired or
    /// unresolvable pins read as [`Value::Null`].
    fn read_data_pin(&self, node: NodeId, pin: u8) -> Value;

    /// Host-provided world/entity property
    fn variable(&self, name: &str) -> Option<Value>;
}

/// Distinguishes separate passes through the same node
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ActivationId(pub u64);

impl fmt::Display for ActivationId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Scratch memory owned by the engine and keyed by (node, activation).
/// Created empty on the first arrival of an activation.
#[derive(Debug, Default, Clone, PartialEq, Serialize, Deserialize)]
pub struct ActivationState {
    /// Input pins that have delivered a token in this activation
    pub arrivals: PinSet,
    /// Seconds spent executing in this activation
    pub elapsed: f64,
    /// Free-form storage for host-defined node types
    pub data: HashMap<String, Value>,
}

/// Everything a node may look at or touch during one invocation
pub struct NodeContext<'a> {
    pin: u8,
    activation: ActivationId,
    connected_inputs: PinSet,
    state: &'a mut ActivationState,
    data: &'a dyn DataSource,
    events: EventEmitter,
}

impl<'a> NodeContext<'a> {
    pub fn new(
        pin: u8,
        activation: ActivationId,
        connected_inputs: PinSet,
        state: &'a mut ActivationState,
        data: &'a dyn DataSource,
        events: EventEmitter,
    ) -> Self {
        Self {
            pin,
            activation,
            connected_inputs,
            state,
            data,
            events,
        }
    }

    /// Pin index the current token arrived on
    pub fn arrival_pin(&self) -> u8 {
        self.pin
    }

    pub fn activation(&self) -> ActivationId {
        self.activation
    }

    /// Flow input pins of this node that have at least one incoming edge
    pub fn connected_inputs(&self) -> PinSet {
        self.connected_inputs
    }

    pub fn state(&self) -> &ActivationState {
        &*self.state
    }

    pub fn state_mut(&mut self) -> &mut ActivationState {
        &mut *self.state
    }

    pub fn read_data_pin(&self, node: &NodeSpec, pin: u8) -> Value {
        self.data.read_data_pin(node.id, pin)
    }

    pub fn variable(&self, name: &str) -> Option<Value> {
        self.data.variable(name)
    }

    pub fn events(&self) -> &EventEmitter {
        &self.events
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ExecutionState {
    /// Token consumed, outputs fire, activation state is retired
    Done,
    /// Like `Done`, but the activation state is kept until the activation
    /// has no live tokens left. Later arrivals of the same activation are
    /// absorbed without invoking the node.
    Latched,
    /// Token stays on the node and is re-invoked next tick
    Executing,
    /// Token absorbed, activation state kept for a later arrival
    Waiting,
}

/// Outcome of a single invocation
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct NodeResult {
    pub state: ExecutionState,
    /// Seconds of the tick's delta consumed by this invocation
    pub time_consumed: f64,
    /// Output ordinals to fire; only honoured for `Done` and `Latched`
    pub outputs: PinSet,
}

impl NodeResult {
    /// Finished without firing anything
    pub fn done() -> Self {
        Self::new(ExecutionState::Done, PinSet::EMPTY)
    }

    /// Finished, firing the given output ordinals
    pub fn fire(outputs: PinSet) -> Self {
        Self::new(ExecutionState::Done, outputs)
    }

    pub fn latched(outputs: PinSet) -> Self {
        Self::new(ExecutionState::Latched, outputs)
    }

    pub fn executing(time_consumed: f64) -> Self {
        Self::new(ExecutionState::Executing, PinSet::EMPTY).with_time(time_consumed)
    }

    pub fn waiting() -> Self {
        Self::new(ExecutionState::Waiting, PinSet::EMPTY)
    }

    pub fn with_time(mut self, time_consumed: f64) -> Self {
        self.time_consumed = time_consumed;
        self
    }

    fn new(state: ExecutionState, outputs: PinSet) -> Self {
        Self {
            state,
            time_consumed: 0.0,
            outputs,
        }
    }

    pub fn fires_outputs(&self) -> bool {
        matches!(self.state, ExecutionState::Done | ExecutionState::Latched)
    }
}
