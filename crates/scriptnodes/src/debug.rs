use scriptcore::{NodeContext, NodeResult, NodeSpec, PinSet, PinType, Value};

pub const LOG: &str = "debug.log";
pub static LOG_PINS: [PinType; 3] = [PinType::FLOW_IN, PinType::DATA_IN, PinType::FLOW_OUT];

/// Log the value on pin 1, optionally prefixed by `config.prefix`
pub fn log(ctx: &NodeContext<'_>, node: &NodeSpec) -> NodeResult {
    let value = ctx.read_data_pin(node, 1);
    let message = match node.config_value("prefix").and_then(Value::as_str) {
        Some(prefix) => format!("{}{}", prefix, value),
        None => value.to_string(),
    };

    tracing::info!("[{}] {}", node.label(), message);
    ctx.events().info(message);

    NodeResult::fire(PinSet::single(0))
}
