use crate::CompiledGraph;
use petgraph::visit::Dfs;
use scriptcore::NodeId;
use std::collections::HashSet;
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum Severity {
    Info,
    Warning,
}

/// Authoring problems that do not prevent a graph from loading
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Diagnostic {
    /// Nothing can ever trigger the graph
    NoEntry,
    /// Flow node no entry node can reach
    Unreachable { node: NodeId },
    /// Declared flow output without destination; firing it ends the lineage
    UnwiredOutput { node: NodeId, pin: u8 },
}

impl Diagnostic {
    pub fn severity(&self) -> Severity {
        match self {
            Diagnostic::NoEntry | Diagnostic::Unreachable { .. } => Severity::Warning,
            Diagnostic::UnwiredOutput { .. } => Severity::Info,
        }
    }
}

impl fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Diagnostic::NoEntry => write!(f, "graph has no entry node"),
            Diagnostic::Unreachable { node } => {
                write!(f, "node {} is unreachable from any entry node", node)
            }
            Diagnostic::UnwiredOutput { node, pin } => {
                write!(f, "flow output {} of node {} is not wired", pin, node)
            }
        }
    }
}

/// Inspect a compiled graph for reachability and wiring gaps. Pure data
/// nodes are never reported as unreachable.
pub fn lint(graph: &CompiledGraph) -> Vec<Diagnostic> {
    let mut diagnostics = Vec::new();
    if graph.entries().is_empty() {
        diagnostics.push(Diagnostic::NoEntry);
    }

    let flow = graph.flow_graph();
    let mut reached = HashSet::new();
    for entry in graph.entries() {
        let mut dfs = Dfs::new(flow, *entry);
        while let Some(idx) = dfs.next(flow) {
            reached.insert(idx);
        }
    }

    for (idx, node) in graph.nodes() {
        if node.has_flow_pins() && !reached.contains(&idx) {
            diagnostics.push(Diagnostic::Unreachable { node: node.spec.id });
        }
        for (ordinal, pin) in node.flow_outputs.iter().enumerate() {
            if node.targets(ordinal as u8).is_empty() {
                diagnostics.push(Diagnostic::UnwiredOutput {
                    node: node.spec.id,
                    pin: *pin,
                });
            }
        }
    }
    diagnostics
}
