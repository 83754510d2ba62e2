use scriptcore::{DefinitionError, NodeMetadata, NodeType};
use std::collections::BTreeMap;
use std::sync::Arc;

/// Registry of available node types, keyed by type id
pub struct NodeTypeRegistry {
    types: BTreeMap<String, Arc<dyn NodeType>>,
}

impl NodeTypeRegistry {
    pub fn new() -> Self {
        Self {
            types: BTreeMap::new(),
        }
    }

    /// Register a node type. A later registration with the same id replaces
    /// the earlier one.
    pub fn register(&mut self, node_type: Arc<dyn NodeType>) {
        let id = node_type.node_type().to_string();
        tracing::info!("Registering node type: {}", id);
        if self.types.insert(id.clone(), node_type).is_some() {
            tracing::warn!("Node type {} registered twice, keeping the latest", id);
        }
    }

    /// Look up the behavior for a node type id
    pub fn resolve(&self, node_type: &str) -> Result<Arc<dyn NodeType>, DefinitionError> {
        self.types
            .get(node_type)
            .cloned()
            .ok_or_else(|| DefinitionError::UnknownNodeType(node_type.to_string()))
    }

    pub fn get(&self, node_type: &str) -> Option<&Arc<dyn NodeType>> {
        self.types.get(node_type)
    }

    /// All registered node type ids, sorted
    pub fn list_node_types(&self) -> Vec<String> {
        self.types.keys().cloned().collect()
    }

    pub fn get_metadata(&self, node_type: &str) -> Option<NodeMetadata> {
        self.types.get(node_type).map(|t| t.metadata())
    }

    pub fn len(&self) -> usize {
        self.types.len()
    }

    pub fn is_empty(&self) -> bool {
        self.types.is_empty()
    }
}

impl Default for NodeTypeRegistry {
    fn default() -> Self {
        Self::new()
    }
}
