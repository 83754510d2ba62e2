use crate::{CompiledGraph, NodeTypeRegistry, ScriptInstance};
use scriptcore::{EventBus, ExecutionEvent, GraphId, ScriptError, ScriptGraph};
use std::collections::HashMap;
use std::sync::Arc;

/// Host-facing entry point: node types, loaded graphs and the event bus
pub struct ScriptRuntime {
    registry: Arc<NodeTypeRegistry>,
    event_bus: Arc<EventBus>,
    graphs: HashMap<GraphId, Arc<CompiledGraph>>,
    config: RuntimeConfig,
}

impl ScriptRuntime {
    /// Create a new runtime with default settings and no node types
    pub fn new() -> Self {
        Self::with_config(RuntimeConfig::default())
    }

    pub fn with_config(config: RuntimeConfig) -> Self {
        Self::with_registry(Arc::new(NodeTypeRegistry::new()), config)
    }

    /// Create a new runtime with a pre-populated registry
    pub fn with_registry(registry: Arc<NodeTypeRegistry>, config: RuntimeConfig) -> Self {
        let event_bus = Arc::new(EventBus::new(config.event_buffer_size));
        Self {
            registry,
            event_bus,
            graphs: HashMap::new(),
            config,
        }
    }

    pub fn registry(&self) -> &Arc<NodeTypeRegistry> {
        &self.registry
    }

    pub fn config(&self) -> &RuntimeConfig {
        &self.config
    }

    /// Validate a graph without keeping it
    pub fn compile(&self, graph: &ScriptGraph) -> Result<Arc<CompiledGraph>, ScriptError> {
        let compiled = CompiledGraph::compile(graph, &self.registry)?;
        Ok(Arc::new(compiled))
    }

    /// Compile and keep a graph so instances can be created by id. Loading
    /// a graph with an id already present replaces it for new instances.
    pub fn load_graph(&mut self, graph: &ScriptGraph) -> Result<GraphId, ScriptError> {
        let compiled = self.compile(graph)?;
        tracing::info!("Loaded graph {} ({})", graph.name, graph.id);
        self.graphs.insert(graph.id, compiled);
        Ok(graph.id)
    }

    pub fn unload_graph(&mut self, id: GraphId) -> Option<Arc<CompiledGraph>> {
        self.graphs.remove(&id)
    }

    pub fn graph(&self, id: GraphId) -> Option<&Arc<CompiledGraph>> {
        self.graphs.get(&id)
    }

    /// Create an instance of a loaded graph
    pub fn instantiate(&self, id: GraphId) -> Result<ScriptInstance, ScriptError> {
        let graph = self
            .graphs
            .get(&id)
            .ok_or_else(|| ScriptError::GraphNotFound(id.to_string()))?;
        Ok(self.spawn_instance(Arc::clone(graph)))
    }

    /// Compile a graph and create an instance directly (without loading)
    pub fn instantiate_graph(&self, graph: &ScriptGraph) -> Result<ScriptInstance, ScriptError> {
        let compiled = self.compile(graph)?;
        Ok(self.spawn_instance(compiled))
    }

    /// Subscribe to execution events of every instance
    pub fn subscribe_events(&self) -> tokio::sync::broadcast::Receiver<ExecutionEvent> {
        self.event_bus.subscribe()
    }

    pub fn event_bus(&self) -> &Arc<EventBus> {
        &self.event_bus
    }

    fn spawn_instance(&self, graph: Arc<CompiledGraph>) -> ScriptInstance {
        ScriptInstance::new(graph, Arc::clone(&self.event_bus), self.config.record_trace)
    }
}

impl Default for ScriptRuntime {
    fn default() -> Self {
        Self::new()
    }
}

/// Configuration for the runtime
#[derive(Debug, Clone)]
pub struct RuntimeConfig {
    pub event_buffer_size: usize,
    /// Record a per-delivery trace on every instance
    pub record_trace: bool,
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            event_buffer_size: 1000,
            record_trace: false,
        }
    }
}
