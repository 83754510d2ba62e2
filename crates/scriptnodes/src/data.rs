//! Pure value nodes. They have no flow pins and are evaluated on demand
//! whenever a connected data input is read.

use scriptcore::{DataSource, NodeError, NodeSpec, PinType, Value};
use std::collections::BTreeMap;

pub const LITERAL: &str = "data.literal";
pub const VARIABLE: &str = "data.variable";
pub const NOT: &str = "data.not";

pub static LITERAL_PINS: [PinType; 1] = [PinType::DATA_OUT];
pub static VARIABLE_PINS: [PinType; 1] = [PinType::DATA_OUT];
pub static NOT_PINS: [PinType; 2] = [PinType::DATA_IN, PinType::DATA_OUT];

pub fn literal(node: &NodeSpec) -> Value {
    node.config_value("value").cloned().unwrap_or_default()
}

pub fn variable(data: &dyn DataSource, node: &NodeSpec) -> Value {
    node.config_value("name")
        .and_then(Value::as_str)
        .and_then(|name| data.variable(name))
        .unwrap_or_default()
}

pub fn not(data: &dyn DataSource, node: &NodeSpec) -> Value {
    Value::Bool(!data.read_data_pin(node.id, 0).as_bool_or(false))
}

pub fn validate_literal(config: &BTreeMap<String, Value>) -> Result<(), NodeError> {
    if config.contains_key("value") {
        Ok(())
    } else {
        Err(NodeError::MissingConfig("value".to_string()))
    }
}

pub fn validate_variable(config: &BTreeMap<String, Value>) -> Result<(), NodeError> {
    match config.get("name") {
        Some(Value::String(_)) => Ok(()),
        Some(other) => Err(NodeError::InvalidConfigType {
            field: "name".to_string(),
            expected: "string".to_string(),
            actual: other.type_name().to_string(),
        }),
        None => Err(NodeError::MissingConfig("name".to_string())),
    }
}
