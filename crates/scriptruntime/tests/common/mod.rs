// Node types used by the runtime tests. They cover the engine contract
// without depending on the standard node library.

#![allow(dead_code)]

use scriptcore::{
    DataSource, ExecutionEvent, NodeClassification, NodeContext, NodeResult, NodeSpec, NodeType,
    PinSet, PinType, Value,
};
use scriptruntime::NodeTypeRegistry;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use tokio::sync::broadcast::Receiver;
use tracing_subscriber::EnvFilter;

pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("debug")),
        )
        .with_test_writer()
        .try_init();
}

/// Everything published so far
pub fn drain_events(events: &mut Receiver<ExecutionEvent>) -> Vec<ExecutionEvent> {
    let mut received = Vec::new();
    while let Ok(event) = events.try_recv() {
        received.push(event);
    }
    received
}

static ENTRY_PINS: [PinType; 1] = [PinType::FLOW_OUT];
static RELAY_PINS: [PinType; 2] = [PinType::FLOW_IN, PinType::FLOW_OUT];
static SPLIT_PINS: [PinType; 3] = [PinType::FLOW_IN, PinType::FLOW_OUT, PinType::FLOW_OUT];
static SINK_PINS: [PinType; 1] = [PinType::FLOW_IN];
static JOIN_PINS: [PinType; 3] = [PinType::FLOW_IN, PinType::FLOW_IN, PinType::FLOW_OUT];
static ECHO_PINS: [PinType; 3] = [PinType::FLOW_IN, PinType::DATA_IN, PinType::FLOW_OUT];
static CONST_PINS: [PinType; 1] = [PinType::DATA_OUT];
static PASS_PINS: [PinType; 2] = [PinType::DATA_IN, PinType::DATA_OUT];
static LOOP_PINS: [PinType; 4] = [
    PinType::FLOW_IN,
    PinType::FLOW_IN,
    PinType::FLOW_OUT,
    PinType::FLOW_OUT,
];
static WIDE_PINS: [PinType; 17] = [PinType::FLOW_OUT; 17];

/// "test.entry": fires its only output
pub struct Entry;

impl NodeType for Entry {
    fn node_type(&self) -> &str {
        "test.entry"
    }

    fn pin_configuration(&self) -> &[PinType] {
        &ENTRY_PINS
    }

    fn update(&self, _ctx: &mut NodeContext<'_>, _time: f64, _node: &NodeSpec) -> NodeResult {
        NodeResult::fire(PinSet::single(0))
    }

    fn classification(&self) -> NodeClassification {
        NodeClassification::Entry
    }
}

/// "test.relay": one in, one out
pub struct Relay;

impl NodeType for Relay {
    fn node_type(&self) -> &str {
        "test.relay"
    }

    fn pin_configuration(&self) -> &[PinType] {
        &RELAY_PINS
    }

    fn update(&self, _ctx: &mut NodeContext<'_>, _time: f64, _node: &NodeSpec) -> NodeResult {
        NodeResult::fire(PinSet::single(0))
    }
}

/// "test.split": fires both outputs
pub struct Split;

impl NodeType for Split {
    fn node_type(&self) -> &str {
        "test.split"
    }

    fn pin_configuration(&self) -> &[PinType] {
        &SPLIT_PINS
    }

    fn update(&self, _ctx: &mut NodeContext<'_>, _time: f64, _node: &NodeSpec) -> NodeResult {
        NodeResult::fire([0, 1].into_iter().collect())
    }
}

/// "test.sink": consumes the token
pub struct Sink;

impl NodeType for Sink {
    fn node_type(&self) -> &str {
        "test.sink"
    }

    fn pin_configuration(&self) -> &[PinType] {
        &SINK_PINS
    }
}

/// "test.spin": stays executing for `config.ticks` invocations, then fires
pub struct Spin;

impl NodeType for Spin {
    fn node_type(&self) -> &str {
        "test.spin"
    }

    fn pin_configuration(&self) -> &[PinType] {
        &RELAY_PINS
    }

    fn update(&self, ctx: &mut NodeContext<'_>, time: f64, node: &NodeSpec) -> NodeResult {
        let target = node.config_value("ticks").and_then(Value::as_i64).unwrap_or(3);
        let state = ctx.state_mut();
        let count = state.data.get("count").and_then(Value::as_i64).unwrap_or(0) + 1;
        state.data.insert("count".to_string(), Value::Int(count));
        if count >= target {
            NodeResult::fire(PinSet::single(0))
        } else {
            NodeResult::executing(time)
        }
    }
}

/// "test.wild": fires a declared output plus one it does not have
pub struct Wild;

impl NodeType for Wild {
    fn node_type(&self) -> &str {
        "test.wild"
    }

    fn pin_configuration(&self) -> &[PinType] {
        &RELAY_PINS
    }

    fn update(&self, _ctx: &mut NodeContext<'_>, _time: f64, _node: &NodeSpec) -> NodeResult {
        NodeResult::fire([0, 5].into_iter().collect())
    }
}

/// "test.join": fires when every connected input arrived in the activation
pub struct Join;

impl NodeType for Join {
    fn node_type(&self) -> &str {
        "test.join"
    }

    fn pin_configuration(&self) -> &[PinType] {
        &JOIN_PINS
    }

    fn update(&self, ctx: &mut NodeContext<'_>, _time: f64, _node: &NodeSpec) -> NodeResult {
        let pin = ctx.arrival_pin();
        let expected = ctx.connected_inputs();
        let arrivals = &mut ctx.state_mut().arrivals;
        arrivals.insert(pin);
        if expected.is_subset(arrivals) {
            NodeResult::fire(PinSet::single(0))
        } else {
            NodeResult::waiting()
        }
    }
}

/// "test.echo": publishes the value on data pin 1 as an info event
pub struct Echo;

impl NodeType for Echo {
    fn node_type(&self) -> &str {
        "test.echo"
    }

    fn pin_configuration(&self) -> &[PinType] {
        &ECHO_PINS
    }

    fn update(&self, ctx: &mut NodeContext<'_>, _time: f64, node: &NodeSpec) -> NodeResult {
        let value = ctx.read_data_pin(node, 1);
        ctx.events().info(value.to_string());
        NodeResult::fire(PinSet::single(0))
    }
}

/// "test.const": data output from `config.value`
pub struct Const;

impl NodeType for Const {
    fn node_type(&self) -> &str {
        "test.const"
    }

    fn pin_configuration(&self) -> &[PinType] {
        &CONST_PINS
    }

    fn get_data(&self, _data: &dyn DataSource, node: &NodeSpec, _pin: u8) -> Value {
        node.config_value("value").cloned().unwrap_or_default()
    }

    fn classification(&self) -> NodeClassification {
        NodeClassification::Expression
    }
}

/// "test.pass": data in to data out
pub struct Pass;

impl NodeType for Pass {
    fn node_type(&self) -> &str {
        "test.pass"
    }

    fn pin_configuration(&self) -> &[PinType] {
        &PASS_PINS
    }

    fn get_data(&self, data: &dyn DataSource, node: &NodeSpec, _pin: u8) -> Value {
        data.read_data_pin(node.id, 0)
    }

    fn classification(&self) -> NodeClassification {
        NodeClassification::Expression
    }
}

/// "test.loop": takes the "again" output (ordinal 0) `rounds` times, then
/// the "exit" output (ordinal 1).
pub struct Loop {
    remaining: AtomicUsize,
}

impl Loop {
    pub fn new(rounds: usize) -> Self {
        Self {
            remaining: AtomicUsize::new(rounds),
        }
    }
}

impl NodeType for Loop {
    fn node_type(&self) -> &str {
        "test.loop"
    }

    fn pin_configuration(&self) -> &[PinType] {
        &LOOP_PINS
    }

    fn update(&self, _ctx: &mut NodeContext<'_>, _time: f64, _node: &NodeSpec) -> NodeResult {
        let again = self
            .remaining
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();
        NodeResult::fire(PinSet::single(if again { 0 } else { 1 }))
    }
}

/// "test.wide": more pins than a node may declare
pub struct Wide;

impl NodeType for Wide {
    fn node_type(&self) -> &str {
        "test.wide"
    }

    fn pin_configuration(&self) -> &[PinType] {
        &WIDE_PINS
    }
}

/// Registry with every test node type; the loop node takes two rounds
pub fn test_registry() -> NodeTypeRegistry {
    let mut registry = NodeTypeRegistry::new();
    registry.register(Arc::new(Entry));
    registry.register(Arc::new(Relay));
    registry.register(Arc::new(Split));
    registry.register(Arc::new(Sink));
    registry.register(Arc::new(Spin));
    registry.register(Arc::new(Wild));
    registry.register(Arc::new(Join));
    registry.register(Arc::new(Echo));
    registry.register(Arc::new(Const));
    registry.register(Arc::new(Pass));
    registry.register(Arc::new(Loop::new(2)));
    registry.register(Arc::new(Wide));
    registry
}
