//! Flow control nodes: entry, branching, fork/join and termination.

use scriptcore::{NodeContext, NodeResult, NodeSpec, PinSet, PinType};

pub const START: &str = "flow.start";
pub const BRANCH: &str = "flow.branch";
pub const FORK: &str = "flow.fork";
pub const MERGE_ONE: &str = "flow.merge_one";
pub const MERGE_ALL: &str = "flow.merge_all";
pub const STOP: &str = "flow.stop";

pub static START_PINS: [PinType; 1] = [PinType::FLOW_OUT];
pub static BRANCH_PINS: [PinType; 4] = [
    PinType::FLOW_IN,
    PinType::DATA_IN,
    PinType::FLOW_OUT,
    PinType::FLOW_OUT,
];
pub static FORK_PINS: [PinType; 4] = [
    PinType::FLOW_IN,
    PinType::FLOW_OUT,
    PinType::FLOW_OUT,
    PinType::FLOW_OUT,
];
pub static MERGE_ONE_PINS: [PinType; 3] = [PinType::FLOW_IN, PinType::FLOW_IN, PinType::FLOW_OUT];
pub static MERGE_ALL_PINS: [PinType; 4] = [
    PinType::FLOW_IN,
    PinType::FLOW_IN,
    PinType::FLOW_IN,
    PinType::FLOW_OUT,
];
pub static STOP_PINS: [PinType; 1] = [PinType::FLOW_IN];

/// Output ordinal of the branch "true" pin (pin index 2)
pub const BRANCH_TRUE: u8 = 0;
/// Output ordinal of the branch "false" pin (pin index 3)
pub const BRANCH_FALSE: u8 = 1;

pub fn start() -> NodeResult {
    NodeResult::fire(PinSet::single(0))
}

/// Pin 1 is the condition; anything but a bool reads as false.
pub fn branch(ctx: &NodeContext<'_>, node: &NodeSpec) -> NodeResult {
    let condition = ctx.read_data_pin(node, 1).as_bool_or(false);
    let output = if condition { BRANCH_TRUE } else { BRANCH_FALSE };
    NodeResult::fire(PinSet::single(output))
}

pub fn fork() -> NodeResult {
    NodeResult::fire([0, 1, 2].into_iter().collect())
}

/// Fires on the first arrival; the engine absorbs the rest of the
/// activation because the result is latched.
pub fn merge_one() -> NodeResult {
    NodeResult::latched(PinSet::single(0))
}

/// Fires once every connected input delivered in this activation. Repeated
/// arrivals on the same pin are ignored.
pub fn merge_all(ctx: &mut NodeContext<'_>) -> NodeResult {
    let pin = ctx.arrival_pin();
    let activation = ctx.activation();
    let expected = ctx.connected_inputs();
    let arrivals = &mut ctx.state_mut().arrivals;

    if !arrivals.insert(pin) {
        tracing::debug!(
            "Merge ignored repeated arrival on pin {} in activation {}",
            pin,
            activation
        );
        return NodeResult::waiting();
    }

    if expected.is_subset(arrivals) {
        NodeResult::fire(PinSet::single(0))
    } else {
        NodeResult::waiting()
    }
}

pub fn stop() -> NodeResult {
    NodeResult::done()
}
