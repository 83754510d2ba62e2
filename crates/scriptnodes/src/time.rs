use scriptcore::{NodeContext, NodeError, NodeResult, NodeSpec, PinSet, PinType, Value};
use std::collections::BTreeMap;

pub const WAIT: &str = "time.wait";
pub static WAIT_PINS: [PinType; 2] = [PinType::FLOW_IN, PinType::FLOW_OUT];

const DEFAULT_SECONDS: f64 = 1.0;

/// Hold the token until `seconds` of tick time has accumulated
pub fn wait(ctx: &mut NodeContext<'_>, time: f64, node: &NodeSpec) -> NodeResult {
    let duration = seconds(node);
    let state = ctx.state_mut();
    let remaining = (duration - state.elapsed).max(0.0);

    if time >= remaining {
        state.elapsed = duration;
        NodeResult::fire(PinSet::single(0)).with_time(remaining)
    } else {
        state.elapsed += time;
        NodeResult::executing(time)
    }
}

pub fn validate(config: &BTreeMap<String, Value>) -> Result<(), NodeError> {
    let Some(value) = config.get("seconds") else {
        return Ok(());
    };
    match value.as_f64() {
        Some(seconds) if seconds.is_finite() && seconds >= 0.0 => Ok(()),
        Some(seconds) => Err(NodeError::Configuration(format!(
            "seconds must be a non-negative number, got {}",
            seconds
        ))),
        None => Err(NodeError::InvalidConfigType {
            field: "seconds".to_string(),
            expected: "number".to_string(),
            actual: value.type_name().to_string(),
        }),
    }
}

fn seconds(node: &NodeSpec) -> f64 {
    node.config_value("seconds")
        .and_then(Value::as_f64)
        .unwrap_or(DEFAULT_SECONDS)
}
