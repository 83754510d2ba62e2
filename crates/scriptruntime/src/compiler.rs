use crate::registry::NodeTypeRegistry;
use petgraph::algo::toposort;
use petgraph::graph::{DiGraph, NodeIndex};
use petgraph::visit::{depth_first_search, DfsEvent};
use scriptcore::{
    flow_output_pins, DefinitionError, GraphId, GraphSettings, NodeClassification, NodeId,
    NodeSpec, NodeType, PinDirection, PinKind, PinSet, PinType, ScriptGraph, MAX_PINS,
};
use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::Arc;

/// Where a token goes when a flow output fires
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FlowTarget {
    pub node: NodeIndex,
    pub pin: u8,
    /// Edge closes a loop; tokens crossing it start a fresh activation
    pub back_edge: bool,
}

/// Data output feeding a data input
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DataLink {
    pub node: NodeIndex,
    pub pin: u8,
}

/// A node with its behavior and wiring resolved
pub struct CompiledNode {
    pub spec: NodeSpec,
    pub behavior: Arc<dyn NodeType>,
    /// Pin indices of flow outputs; position is the output ordinal
    pub flow_outputs: Vec<u8>,
    /// Flow input pins with at least one incoming edge
    pub connected_inputs: PinSet,
    targets: Vec<Vec<FlowTarget>>,
    data_sources: BTreeMap<u8, DataLink>,
}

impl CompiledNode {
    pub fn pins(&self) -> &[PinType] {
        self.behavior.pin_configuration()
    }

    /// Destinations of output ordinal `ordinal`, in wiring order
    pub fn targets(&self, ordinal: u8) -> &[FlowTarget] {
        self.targets
            .get(ordinal as usize)
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    pub fn data_source(&self, pin: u8) -> Option<DataLink> {
        self.data_sources.get(&pin).copied()
    }

    pub fn classification(&self) -> NodeClassification {
        self.behavior.classification()
    }

    pub fn has_flow_pins(&self) -> bool {
        self.pins().iter().any(|p| p.kind == PinKind::Flow)
    }
}

/// Immutable, validated form of a [`ScriptGraph`], shared by all instances
/// created from it.
pub struct CompiledGraph {
    id: GraphId,
    name: String,
    settings: GraphSettings,
    nodes: Vec<CompiledNode>,
    index: HashMap<NodeId, NodeIndex>,
    flow: DiGraph<NodeId, (u8, u8)>,
    entries: Vec<NodeIndex>,
}

impl CompiledGraph {
    /// Validate a graph definition and resolve it against the registry.
    /// Fails on the first definition error; nothing is partially loaded.
    pub fn compile(
        graph: &ScriptGraph,
        registry: &NodeTypeRegistry,
    ) -> Result<Self, DefinitionError> {
        let mut flow = DiGraph::new();
        let mut data = DiGraph::<NodeId, ()>::new();
        let mut index = HashMap::new();
        let mut nodes = Vec::with_capacity(graph.nodes.len());

        for spec in &graph.nodes {
            if index.contains_key(&spec.id) {
                return Err(DefinitionError::DuplicateNode(spec.id));
            }

            let behavior = registry.resolve(&spec.node_type)?;
            let pins = behavior.pin_configuration();
            if pins.len() > MAX_PINS {
                return Err(DefinitionError::TooManyPins {
                    node_type: spec.node_type.clone(),
                    count: pins.len(),
                    max: MAX_PINS,
                });
            }
            behavior
                .validate_config(&spec.config)
                .map_err(|source| DefinitionError::InvalidConfig {
                    node: spec.id,
                    source,
                })?;

            let idx = flow.add_node(spec.id);
            data.add_node(spec.id);
            index.insert(spec.id, idx);

            let flow_outputs = flow_output_pins(pins);
            nodes.push(CompiledNode {
                spec: spec.clone(),
                behavior,
                targets: vec![Vec::new(); flow_outputs.len()],
                flow_outputs,
                connected_inputs: PinSet::EMPTY,
                data_sources: BTreeMap::new(),
            });
        }

        // (source, ordinal, destination, destination pin) in wiring order
        let mut flow_edges = Vec::new();

        for conn in &graph.connections {
            let from = *index
                .get(&conn.from_node)
                .ok_or(DefinitionError::NodeNotFound(conn.from_node))?;
            let to = *index
                .get(&conn.to_node)
                .ok_or(DefinitionError::NodeNotFound(conn.to_node))?;

            let from_pin = pin_at(&nodes[from.index()], conn.from_pin)?;
            let to_pin = pin_at(&nodes[to.index()], conn.to_pin)?;
            expect_direction(conn.from_node, conn.from_pin, from_pin, PinDirection::Output)?;
            expect_direction(conn.to_node, conn.to_pin, to_pin, PinDirection::Input)?;
            if from_pin.kind != to_pin.kind {
                return Err(DefinitionError::KindMismatch {
                    node: conn.to_node,
                    from_kind: from_pin.kind,
                    to_kind: to_pin.kind,
                });
            }

            match from_pin.kind {
                PinKind::Flow => {
                    let ordinal = nodes[from.index()]
                        .flow_outputs
                        .iter()
                        .position(|p| *p == conn.from_pin)
                        .ok_or(DefinitionError::PinOutOfRange {
                            node: conn.from_node,
                            pin: conn.from_pin,
                        })?;
                    flow.add_edge(from, to, (conn.from_pin, conn.to_pin));
                    nodes[to.index()].connected_inputs.insert(conn.to_pin);
                    flow_edges.push((from, ordinal, to, conn.to_pin));
                }
                PinKind::Data => {
                    let link = DataLink {
                        node: from,
                        pin: conn.from_pin,
                    };
                    if nodes[to.index()]
                        .data_sources
                        .insert(conn.to_pin, link)
                        .is_some()
                    {
                        return Err(DefinitionError::DataInputAlreadyWired {
                            node: conn.to_node,
                            pin: conn.to_pin,
                        });
                    }
                    data.add_edge(from, to, ());
                }
            }
        }

        toposort(&data, None)
            .map_err(|cycle| DefinitionError::CyclicDataDependency(data[cycle.node_id()]))?;

        let entries: Vec<NodeIndex> = flow
            .node_indices()
            .filter(|idx| nodes[idx.index()].classification() == NodeClassification::Entry)
            .collect();

        let back_edges = find_back_edges(&flow, &entries);
        for (from, ordinal, to, pin) in flow_edges {
            nodes[from.index()].targets[ordinal].push(FlowTarget {
                node: to,
                pin,
                back_edge: back_edges.contains(&(from, to)),
            });
        }

        if graph.settings.strict_outputs {
            for node in &nodes {
                if let Some(ordinal) = node.targets.iter().position(Vec::is_empty) {
                    return Err(DefinitionError::UnwiredOutput {
                        node: node.spec.id,
                        pin: node.flow_outputs[ordinal],
                    });
                }
            }
        }

        tracing::debug!(
            "Compiled graph {} ({} nodes, {} flow edges, {} loop edges)",
            graph.id,
            nodes.len(),
            flow.edge_count(),
            back_edges.len()
        );

        Ok(Self {
            id: graph.id,
            name: graph.name.clone(),
            settings: graph.settings.clone(),
            nodes,
            index,
            flow,
            entries,
        })
    }

    pub fn id(&self) -> GraphId {
        self.id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn settings(&self) -> &GraphSettings {
        &self.settings
    }

    pub fn node(&self, idx: NodeIndex) -> &CompiledNode {
        &self.nodes[idx.index()]
    }

    pub fn nodes(&self) -> impl Iterator<Item = (NodeIndex, &CompiledNode)> {
        self.nodes
            .iter()
            .enumerate()
            .map(|(i, node)| (NodeIndex::new(i), node))
    }

    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }

    pub fn index_of(&self, id: NodeId) -> Option<NodeIndex> {
        self.index.get(&id).copied()
    }

    /// Entry nodes in definition order
    pub fn entries(&self) -> &[NodeIndex] {
        &self.entries
    }

    /// Flow wiring as a petgraph graph; edge weights are (from pin, to pin)
    pub fn flow_graph(&self) -> &DiGraph<NodeId, (u8, u8)> {
        &self.flow
    }
}

fn pin_at(node: &CompiledNode, pin: u8) -> Result<PinType, DefinitionError> {
    node.pins()
        .get(pin as usize)
        .copied()
        .ok_or(DefinitionError::PinOutOfRange {
            node: node.spec.id,
            pin,
        })
}

fn expect_direction(
    node: NodeId,
    pin: u8,
    actual: PinType,
    expected: PinDirection,
) -> Result<(), DefinitionError> {
    if actual.direction == expected {
        return Ok(());
    }
    Err(DefinitionError::PinMismatch {
        node,
        pin,
        expected_kind: actual.kind,
        expected_direction: expected,
        actual_kind: actual.kind,
        actual_direction: actual.direction,
    })
}

/// Edges closing a cycle, found by depth-first search starting at the entry
/// nodes and then at any node the entries do not reach.
fn find_back_edges(
    flow: &DiGraph<NodeId, (u8, u8)>,
    entries: &[NodeIndex],
) -> HashSet<(NodeIndex, NodeIndex)> {
    let mut back_edges = HashSet::new();
    let starts: Vec<NodeIndex> = entries
        .iter()
        .copied()
        .chain(flow.node_indices())
        .collect();
    depth_first_search(flow, starts, |event| {
        if let DfsEvent::BackEdge(from, to) = event {
            back_edges.insert((from, to));
        }
    });
    back_edges
}
