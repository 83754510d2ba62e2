use crate::Value;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::Path;
use uuid::Uuid;

pub type GraphId = Uuid;
pub type NodeId = Uuid;

/// Static description of a script graph: nodes plus flow and data wiring.
/// Produced by authoring tools, read-only once handed to the runtime.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScriptGraph {
    pub id: GraphId,
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
    pub nodes: Vec<NodeSpec>,
    #[serde(default)]
    pub connections: Vec<Connection>,
    #[serde(default)]
    pub settings: GraphSettings,
}

impl ScriptGraph {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4(),
            name: name.into(),
            description: None,
            nodes: Vec::new(),
            connections: Vec::new(),
            settings: GraphSettings::default(),
        }
    }

    pub fn add_node(&mut self, node: NodeSpec) -> NodeId {
        let id = node.id;
        self.nodes.push(node);
        id
    }

    /// Wire `from_pin` of `from_node` into `to_pin` of `to_node`. Flow and
    /// data wiring share this list; the pin configuration decides which is
    /// which.
    pub fn connect(&mut self, from_node: NodeId, from_pin: u8, to_node: NodeId, to_pin: u8) {
        self.connections.push(Connection {
            from_node,
            from_pin,
            to_node,
            to_pin,
        });
    }

    pub fn find_node(&self, id: NodeId) -> Option<&NodeSpec> {
        self.nodes.iter().find(|n| n.id == id)
    }

    pub fn from_json(json: &str) -> crate::Result<Self> {
        Ok(serde_json::from_str(json)?)
    }

    pub fn from_json_file(path: impl AsRef<Path>) -> crate::Result<Self> {
        let json = std::fs::read_to_string(path)?;
        Self::from_json(&json)
    }

    pub fn to_json_pretty(&self) -> crate::Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }
}

/// A node instance inside a graph
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NodeSpec {
    pub id: NodeId,
    pub node_type: String,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub config: BTreeMap<String, Value>,
    #[serde(default)]
    pub position: Option<Position>,
}

impl NodeSpec {
    pub fn new(node_type: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4(),
            node_type: node_type.into(),
            name: None,
            config: BTreeMap::new(),
            position: None,
        }
    }

    /// Same as [`NodeSpec::new`] with a caller-chosen id, for reproducible
    /// graphs.
    pub fn with_id(node_type: impl Into<String>, id: NodeId) -> Self {
        Self {
            id,
            ..Self::new(node_type)
        }
    }

    pub fn with_config(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.config.insert(key.into(), value.into());
        self
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    pub fn with_position(mut self, x: f32, y: f32) -> Self {
        self.position = Some(Position { x, y });
        self
    }

    pub fn config_value(&self, key: &str) -> Option<&Value> {
        self.config.get(key)
    }

    /// Human label: the author-supplied name, falling back to the type id
    pub fn label(&self) -> &str {
        self.name.as_deref().unwrap_or(&self.node_type)
    }
}

/// Edge from an output pin to an input pin
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Connection {
    pub from_node: NodeId,
    pub from_pin: u8,
    pub to_node: NodeId,
    pub to_pin: u8,
}

/// Node position in a visual editor. Carried through, never interpreted.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct Position {
    pub x: f32,
    pub y: f32,
}

/// Per-graph execution settings
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct GraphSettings {
    /// A join holding partial arrivals for longer than this many ticks is
    /// reported once as timed out.
    #[serde(default)]
    pub join_timeout_ticks: Option<u64>,
    /// Reject the graph at load when a declared flow output is left unwired
    #[serde(default)]
    pub strict_outputs: bool,
}
