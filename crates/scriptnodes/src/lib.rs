//! Standard node library
//!
//! The built-in node kinds form a closed set, [`ScriptNode`]; each variant
//! dispatches to the behavior in its module. Hosts can still register their
//! own `NodeType` implementations next to these.

pub mod data;
pub mod debug;
pub mod flow;
pub mod time;

use scriptcore::{
    DataSource, NodeClassification, NodeContext, NodeError, NodeMetadata, NodeResult, NodeSpec,
    NodeType, PinType, Value,
};
use scriptruntime::NodeTypeRegistry;
use std::collections::BTreeMap;
use std::sync::Arc;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ScriptNode {
    Start,
    Branch,
    Fork,
    MergeOne,
    MergeAll,
    Stop,
    Wait,
    Log,
    Literal,
    Variable,
    Not,
}

impl ScriptNode {
    pub const ALL: [ScriptNode; 11] = [
        ScriptNode::Start,
        ScriptNode::Branch,
        ScriptNode::Fork,
        ScriptNode::MergeOne,
        ScriptNode::MergeAll,
        ScriptNode::Stop,
        ScriptNode::Wait,
        ScriptNode::Log,
        ScriptNode::Literal,
        ScriptNode::Variable,
        ScriptNode::Not,
    ];

    pub fn id(&self) -> &'static str {
        match self {
            ScriptNode::Start => flow::START,
            ScriptNode::Branch => flow::BRANCH,
            ScriptNode::Fork => flow::FORK,
            ScriptNode::MergeOne => flow::MERGE_ONE,
            ScriptNode::MergeAll => flow::MERGE_ALL,
            ScriptNode::Stop => flow::STOP,
            ScriptNode::Wait => time::WAIT,
            ScriptNode::Log => debug::LOG,
            ScriptNode::Literal => data::LITERAL,
            ScriptNode::Variable => data::VARIABLE,
            ScriptNode::Not => data::NOT,
        }
    }

    pub fn from_id(id: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|kind| kind.id() == id)
    }
}

impl NodeType for ScriptNode {
    fn node_type(&self) -> &str {
        self.id()
    }

    fn pin_configuration(&self) -> &[PinType] {
        match self {
            ScriptNode::Start => &flow::START_PINS,
            ScriptNode::Branch => &flow::BRANCH_PINS,
            ScriptNode::Fork => &flow::FORK_PINS,
            ScriptNode::MergeOne => &flow::MERGE_ONE_PINS,
            ScriptNode::MergeAll => &flow::MERGE_ALL_PINS,
            ScriptNode::Stop => &flow::STOP_PINS,
            ScriptNode::Wait => &time::WAIT_PINS,
            ScriptNode::Log => &debug::LOG_PINS,
            ScriptNode::Literal => &data::LITERAL_PINS,
            ScriptNode::Variable => &data::VARIABLE_PINS,
            ScriptNode::Not => &data::NOT_PINS,
        }
    }

    fn update(&self, ctx: &mut NodeContext<'_>, time: f64, node: &NodeSpec) -> NodeResult {
        match self {
            ScriptNode::Start => flow::start(),
            ScriptNode::Branch => flow::branch(ctx, node),
            ScriptNode::Fork => flow::fork(),
            ScriptNode::MergeOne => flow::merge_one(),
            ScriptNode::MergeAll => flow::merge_all(ctx),
            ScriptNode::Stop => flow::stop(),
            ScriptNode::Wait => time::wait(ctx, time, node),
            ScriptNode::Log => debug::log(ctx, node),
            ScriptNode::Literal | ScriptNode::Variable | ScriptNode::Not => NodeResult::done(),
        }
    }

    fn get_data(&self, source: &dyn DataSource, node: &NodeSpec, _pin: u8) -> Value {
        match self {
            ScriptNode::Literal => data::literal(node),
            ScriptNode::Variable => data::variable(source, node),
            ScriptNode::Not => data::not(source, node),
            _ => Value::Null,
        }
    }

    fn classification(&self) -> NodeClassification {
        match self {
            ScriptNode::Start => NodeClassification::Entry,
            ScriptNode::Branch
            | ScriptNode::Fork
            | ScriptNode::MergeOne
            | ScriptNode::MergeAll => NodeClassification::FlowControl,
            ScriptNode::Stop => NodeClassification::Terminator,
            ScriptNode::Wait | ScriptNode::Log => NodeClassification::Action,
            ScriptNode::Literal | ScriptNode::Variable | ScriptNode::Not => {
                NodeClassification::Expression
            }
        }
    }

    fn validate_config(&self, config: &BTreeMap<String, Value>) -> Result<(), NodeError> {
        match self {
            ScriptNode::Wait => time::validate(config),
            ScriptNode::Literal => data::validate_literal(config),
            ScriptNode::Variable => data::validate_variable(config),
            _ => Ok(()),
        }
    }

    fn metadata(&self) -> NodeMetadata {
        let (name, description, category) = match self {
            ScriptNode::Start => ("Start", "Entry point, fires when the instance is triggered", "flow"),
            ScriptNode::Branch => ("Branch", "Continues on the true or false output depending on the condition pin", "flow"),
            ScriptNode::Fork => ("Fork", "Splits execution into three concurrent flows", "flow"),
            ScriptNode::MergeOne => ("Merge One", "Proceeds when the first flow arrives", "flow"),
            ScriptNode::MergeAll => ("Merge All", "Proceeds when all connected flows arrive", "flow"),
            ScriptNode::Stop => ("Stop", "Ends the flow", "flow"),
            ScriptNode::Wait => ("Wait", "Holds the flow for config.seconds of tick time", "time"),
            ScriptNode::Log => ("Log", "Logs the value on its data input", "debug"),
            ScriptNode::Literal => ("Literal", "Constant value from config.value", "data"),
            ScriptNode::Variable => ("Variable", "Host property named by config.name", "data"),
            ScriptNode::Not => ("Not", "Boolean negation of its input", "data"),
        };
        NodeMetadata {
            name: name.to_string(),
            description: description.to_string(),
            category: category.to_string(),
        }
    }
}

/// Register all built-in node kinds with a registry
pub fn register_all(registry: &mut NodeTypeRegistry) {
    for kind in ScriptNode::ALL {
        registry.register(Arc::new(kind));
    }
}

/// Registry holding only the built-in node kinds
pub fn standard_registry() -> NodeTypeRegistry {
    let mut registry = NodeTypeRegistry::new();
    register_all(&mut registry);
    registry
}
