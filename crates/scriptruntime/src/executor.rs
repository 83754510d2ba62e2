use crate::activation::ActivationStore;
use crate::compiler::CompiledGraph;
use chrono::Utc;
use petgraph::graph::NodeIndex;
use scriptcore::{
    ActivationId, DataSource, EventBus, ExecutionEvent, ExecutionState, InstanceId, NodeContext,
    NodeId, PinSet, ScriptError, Value,
};
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, VecDeque};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

/// In-flight control flow signal
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FlowToken {
    /// Creation order; delivery within a tick follows it
    pub seq: u64,
    pub node: NodeIndex,
    /// Pin index the token arrives on
    pub pin: u8,
    pub activation: ActivationId,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum InstanceStatus {
    /// Created, never triggered
    Idle,
    Running,
    /// No live tokens left
    Finished,
    Aborted,
}

/// What happened to one delivered token
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TraceOutcome {
    Done,
    Latched,
    Executing,
    Waiting,
    /// Arrived at a node already latched for its activation
    Absorbed,
}

impl From<ExecutionState> for TraceOutcome {
    fn from(state: ExecutionState) -> Self {
        match state {
            ExecutionState::Done => TraceOutcome::Done,
            ExecutionState::Latched => TraceOutcome::Latched,
            ExecutionState::Executing => TraceOutcome::Executing,
            ExecutionState::Waiting => TraceOutcome::Waiting,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TraceEntry {
    pub tick: u64,
    pub seq: u64,
    pub node: NodeId,
    pub pin: u8,
    pub activation: ActivationId,
    pub outcome: TraceOutcome,
    /// Output ordinals that fired
    pub outputs: PinSet,
    /// Join arrivals recorded for (node, activation) after the invocation
    pub arrivals: PinSet,
}

/// A join whose activation drained before every connected input arrived
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StalledJoin {
    pub node: NodeId,
    pub activation: ActivationId,
    pub arrived: PinSet,
    pub expected: PinSet,
    pub tick: u64,
}

/// A join currently holding partial arrivals
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WaitingJoin {
    pub node: NodeId,
    pub activation: ActivationId,
    pub arrived: PinSet,
    pub expected: PinSet,
    pub waiting_ticks: u64,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TickSummary {
    pub tick: u64,
    pub delivered: usize,
    pub spawned: usize,
    pub live_tokens: usize,
    /// The instance ran out of tokens during this tick
    pub finished: bool,
}

/// Resolves data pins against the compiled wiring and host variables
struct DataResolver<'a> {
    graph: &'a CompiledGraph,
    variables: &'a HashMap<String, Value>,
}

impl DataSource for DataResolver<'_> {
    fn read_data_pin(&self, node: NodeId, pin: u8) -> Value {
        let Some(idx) = self.graph.index_of(node) else {
            return Value::Null;
        };
        match self.graph.node(idx).data_source(pin) {
            Some(link) => {
                let source = self.graph.node(link.node);
                source.behavior.get_data(self, &source.spec, link.pin)
            }
            None => Value::Null,
        }
    }

    fn variable(&self, name: &str) -> Option<Value> {
        self.variables.get(name).cloned()
    }
}

/// One running copy of a compiled graph: live tokens, activation state and
/// host variables. Single-threaded; advanced only by [`ScriptInstance::tick`].
pub struct ScriptInstance {
    id: InstanceId,
    graph: Arc<CompiledGraph>,
    events: Arc<EventBus>,
    variables: HashMap<String, Value>,
    pending: VecDeque<FlowToken>,
    running: Vec<FlowToken>,
    activations: ActivationStore,
    next_seq: u64,
    tick: u64,
    status: InstanceStatus,
    cancellation: CancellationToken,
    trace: Option<Vec<TraceEntry>>,
    stalled: Vec<StalledJoin>,
}

impl ScriptInstance {
    pub fn new(graph: Arc<CompiledGraph>, events: Arc<EventBus>, record_trace: bool) -> Self {
        Self {
            id: Uuid::new_v4(),
            graph,
            events,
            variables: HashMap::new(),
            pending: VecDeque::new(),
            running: Vec::new(),
            activations: ActivationStore::new(),
            next_seq: 0,
            tick: 0,
            status: InstanceStatus::Idle,
            cancellation: CancellationToken::new(),
            trace: record_trace.then(Vec::new),
            stalled: Vec::new(),
        }
    }

    pub fn id(&self) -> InstanceId {
        self.id
    }

    pub fn graph(&self) -> &Arc<CompiledGraph> {
        &self.graph
    }

    pub fn status(&self) -> InstanceStatus {
        self.status
    }

    pub fn is_finished(&self) -> bool {
        self.status == InstanceStatus::Finished
    }

    /// Ticks executed so far
    pub fn ticks(&self) -> u64 {
        self.tick
    }

    /// Pending and executing tokens
    pub fn live_tokens(&self) -> usize {
        self.pending.len() + self.running.len()
    }

    /// Live tokens in delivery order
    pub fn tokens(&self) -> Vec<FlowToken> {
        let mut tokens: Vec<FlowToken> = self
            .running
            .iter()
            .chain(self.pending.iter())
            .copied()
            .collect();
        tokens.sort_by_key(|t| t.seq);
        tokens
    }

    /// Set a host property readable by variable nodes. Takes effect from the
    /// next tick on; values never change in the middle of a tick.
    pub fn set_variable(&mut self, name: impl Into<String>, value: impl Into<Value>) {
        self.variables.insert(name.into(), value.into());
    }

    pub fn variable(&self, name: &str) -> Option<&Value> {
        self.variables.get(name)
    }

    /// Token the host can cancel from elsewhere; the next tick aborts.
    pub fn cancellation_token(&self) -> CancellationToken {
        self.cancellation.clone()
    }

    pub fn trace(&self) -> &[TraceEntry] {
        self.trace.as_deref().unwrap_or(&[])
    }

    pub fn stalled_joins(&self) -> &[StalledJoin] {
        &self.stalled
    }

    /// Joins holding partial arrivals right now, with how long they have
    /// been waiting.
    pub fn waiting_joins(&self) -> Vec<WaitingJoin> {
        self.activations
            .waiting()
            .map(|(activation, idx, slot)| {
                let node = self.graph.node(idx);
                WaitingJoin {
                    node: node.spec.id,
                    activation,
                    arrived: slot.state.arrivals,
                    expected: node.connected_inputs,
                    waiting_ticks: self.tick - slot.waiting_since.unwrap_or(self.tick),
                }
            })
            .collect()
    }

    /// Trigger every entry node, each with its own activation
    pub fn start(&mut self) -> Result<Vec<ActivationId>, ScriptError> {
        let entries: Vec<NodeId> = self
            .graph
            .entries()
            .iter()
            .map(|idx| self.graph.node(*idx).spec.id)
            .collect();
        if entries.is_empty() {
            tracing::warn!("Graph {} has no entry node", self.graph.id());
        }
        entries.into_iter().map(|id| self.trigger(id)).collect()
    }

    /// Queue a token for entry node `node` under a fresh activation
    pub fn trigger(&mut self, node: NodeId) -> Result<ActivationId, ScriptError> {
        if self.status == InstanceStatus::Aborted || self.cancellation.is_cancelled() {
            return Err(ScriptError::InstanceAborted);
        }
        let idx = self
            .graph
            .index_of(node)
            .ok_or(ScriptError::UnknownNode(node))?;
        if !self.graph.entries().contains(&idx) {
            return Err(ScriptError::NotAnEntry(node));
        }

        if self.status != InstanceStatus::Running {
            self.status = InstanceStatus::Running;
            tracing::info!("Starting instance {} of graph {}", self.id, self.graph.id());
            self.events.emit(ExecutionEvent::InstanceStarted {
                instance_id: self.id,
                graph_id: self.graph.id(),
                timestamp: Utc::now(),
            });
        }

        let activation = self.activations.mint();
        self.enqueue(idx, 0, activation);
        Ok(activation)
    }

    /// Advance every live token by one delivery
    pub fn tick(&mut self, time: f64) -> TickSummary {
        if self.cancellation.is_cancelled() {
            self.abort();
        }
        if self.status != InstanceStatus::Running {
            return TickSummary {
                tick: self.tick,
                finished: self.status == InstanceStatus::Finished,
                ..TickSummary::default()
            };
        }

        self.tick += 1;
        let mut batch: Vec<FlowToken> = self
            .running
            .drain(..)
            .chain(self.pending.drain(..))
            .collect();
        batch.sort_by_key(|t| t.seq);

        let mut summary = TickSummary {
            tick: self.tick,
            ..TickSummary::default()
        };
        for token in batch {
            summary.delivered += 1;
            summary.spawned += self.deliver(token, time);
        }

        self.check_join_timeouts();

        summary.live_tokens = self.live_tokens();
        if summary.live_tokens == 0 {
            self.status = InstanceStatus::Finished;
            summary.finished = true;
            tracing::info!("Instance {} finished after {} ticks", self.id, self.tick);
            self.events.emit(ExecutionEvent::InstanceFinished {
                instance_id: self.id,
                ticks: self.tick,
                timestamp: Utc::now(),
            });
        }
        summary
    }

    /// Tick with a fixed delta until no tokens remain or `max_ticks` ran.
    /// Returns the number of ticks executed.
    pub fn run_until_idle(&mut self, time: f64, max_ticks: u64) -> u64 {
        let mut ticks = 0;
        while self.status == InstanceStatus::Running && ticks < max_ticks {
            self.tick(time);
            ticks += 1;
        }
        ticks
    }

    /// Discard every token and all activation state. Effects of nodes that
    /// already completed stay as they are.
    pub fn abort(&mut self) {
        if self.status == InstanceStatus::Aborted {
            return;
        }
        let discarded = self.live_tokens();
        self.pending.clear();
        self.running.clear();
        let released = self.activations.clear();
        self.status = InstanceStatus::Aborted;
        self.cancellation.cancel();

        tracing::info!(
            "Instance {} aborted: {} tokens discarded, {} activation slots released",
            self.id,
            discarded,
            released
        );
        self.events.emit(ExecutionEvent::InstanceAborted {
            instance_id: self.id,
            discarded_tokens: discarded,
            timestamp: Utc::now(),
        });
    }

    /// Deliver one token to its node and apply the result. Returns the
    /// number of tokens spawned.
    fn deliver(&mut self, token: FlowToken, time: f64) -> usize {
        let graph = Arc::clone(&self.graph);
        let node = graph.node(token.node);

        if self.activations.is_latched(token.node, token.activation) {
            tracing::trace!(
                "Token {} absorbed by {} ({}), activation {} already fired",
                token.seq,
                node.spec.label(),
                node.spec.id,
                token.activation
            );
            self.record(&token, node.spec.id, TraceOutcome::Absorbed, PinSet::EMPTY, PinSet::EMPTY);
            self.consume(token.activation);
            return 0;
        }

        tracing::trace!(
            "Delivering token {} to {} ({}) pin {} activation {}",
            token.seq,
            node.spec.label(),
            node.spec.id,
            token.pin,
            token.activation
        );

        let emitter = self.events.create_emitter(self.id, node.spec.id);
        let resolver = DataResolver {
            graph: &graph,
            variables: &self.variables,
        };
        let mut state = match self.activations.resume(token.seq) {
            Some(state) => state,
            None => self.activations.take_state(token.node, token.activation),
        };
        let result = {
            let mut ctx = NodeContext::new(
                token.pin,
                token.activation,
                node.connected_inputs,
                &mut state,
                &resolver,
                emitter,
            );
            node.behavior.update(&mut ctx, time, &node.spec)
        };
        let arrivals = state.arrivals;

        let outputs = if result.fires_outputs() {
            self.checked_outputs(token.node, result.outputs)
        } else {
            if !result.outputs.is_empty() {
                tracing::warn!(
                    "Node {} returned outputs {:?} with state {:?}; ignored",
                    node.spec.id,
                    result.outputs,
                    result.state
                );
            }
            PinSet::EMPTY
        };

        match result.state {
            ExecutionState::Done => self.activations.retire(token.node, token.activation),
            ExecutionState::Latched => {
                self.activations.restore(token.node, token.activation, state);
                self.activations.latch(token.node, token.activation);
            }
            ExecutionState::Waiting => {
                self.activations.restore(token.node, token.activation, state);
                self.activations
                    .mark_waiting(token.node, token.activation, self.tick);
            }
            ExecutionState::Executing => {
                self.activations
                    .hold(token.node, token.activation, token.seq, state)
            }
        }
        self.record(&token, node.spec.id, result.state.into(), outputs, arrivals);

        let mut spawned = 0;
        if result.fires_outputs() {
            tracing::debug!(
                "Node {} ({}) completed activation {}, firing {:?}",
                node.spec.label(),
                node.spec.id,
                token.activation,
                outputs
            );
            self.events.emit(ExecutionEvent::NodeCompleted {
                instance_id: self.id,
                node_id: node.spec.id,
                node_type: node.spec.node_type.clone(),
                activation: token.activation,
                state: result.state,
                outputs,
                tick: self.tick,
                timestamp: Utc::now(),
            });
            spawned = self.spawn(token.node, token.activation, outputs);
        }

        match result.state {
            ExecutionState::Executing => self.running.push(token),
            _ => self.consume(token.activation),
        }
        spawned
    }

    /// Drop output ordinals the node does not declare
    fn checked_outputs(&self, idx: NodeIndex, outputs: PinSet) -> PinSet {
        let node = self.graph.node(idx);
        let declared = node.flow_outputs.len();
        let valid: PinSet = outputs.iter().filter(|o| (*o as usize) < declared).collect();
        if valid != outputs {
            tracing::warn!(
                "Node {} ({}) fired outputs {:?} but declares only {} flow outputs",
                node.spec.label(),
                node.spec.id,
                outputs,
                declared
            );
        }
        valid
    }

    fn spawn(&mut self, from: NodeIndex, activation: ActivationId, outputs: PinSet) -> usize {
        let graph = Arc::clone(&self.graph);
        let node = graph.node(from);
        let mut spawned = 0;
        for ordinal in outputs.iter() {
            let targets = node.targets(ordinal);
            if targets.is_empty() {
                tracing::trace!(
                    "Output {} of {} is not wired, lineage ends",
                    ordinal,
                    node.spec.id
                );
            }
            for target in targets {
                let activation = if target.back_edge {
                    self.activations.mint()
                } else {
                    activation
                };
                self.enqueue(target.node, target.pin, activation);
                spawned += 1;
            }
        }
        spawned
    }

    fn enqueue(&mut self, node: NodeIndex, pin: u8, activation: ActivationId) {
        let seq = self.next_seq;
        self.next_seq += 1;
        self.activations.token_created(activation);
        self.pending.push_back(FlowToken {
            seq,
            node,
            pin,
            activation,
        });
    }

    fn consume(&mut self, activation: ActivationId) {
        if self.activations.token_consumed(activation) {
            self.release_activation(activation);
        }
    }

    /// The activation has no live tokens left: free its state and report
    /// joins that can no longer complete.
    fn release_activation(&mut self, activation: ActivationId) {
        for (idx, slot) in self.activations.release(activation) {
            if !slot.is_waiting() {
                continue;
            }
            let node = self.graph.node(idx);
            let stalled = StalledJoin {
                node: node.spec.id,
                activation,
                arrived: slot.state.arrivals,
                expected: node.connected_inputs,
                tick: self.tick,
            };
            tracing::warn!(
                "Join {} ({}) stalled in activation {}: arrived {:?}, expected {:?}",
                node.spec.label(),
                node.spec.id,
                activation,
                stalled.arrived,
                stalled.expected
            );
            self.events.emit(ExecutionEvent::JoinStalled {
                instance_id: self.id,
                node_id: stalled.node,
                activation,
                arrived: stalled.arrived,
                expected: stalled.expected,
                timestamp: Utc::now(),
            });
            self.stalled.push(stalled);
        }
    }

    fn check_join_timeouts(&mut self) {
        let Some(limit) = self.graph.settings().join_timeout_ticks else {
            return;
        };
        let tick = self.tick;
        let mut timed_out = Vec::new();
        for (activation, idx, slot) in self.activations.waiting_mut() {
            let since = slot.waiting_since.unwrap_or(tick);
            if !slot.timed_out && tick - since > limit {
                slot.timed_out = true;
                timed_out.push((activation, idx, tick - since));
            }
        }

        for (activation, idx, waited_ticks) in timed_out {
            let node = self.graph.node(idx);
            tracing::warn!(
                "Join {} ({}) has waited {} ticks in activation {}",
                node.spec.label(),
                node.spec.id,
                waited_ticks,
                activation
            );
            self.events.emit(ExecutionEvent::JoinTimedOut {
                instance_id: self.id,
                node_id: node.spec.id,
                activation,
                waited_ticks,
                timestamp: Utc::now(),
            });
        }
    }

    fn record(
        &mut self,
        token: &FlowToken,
        node: NodeId,
        outcome: TraceOutcome,
        outputs: PinSet,
        arrivals: PinSet,
    ) {
        if let Some(trace) = &mut self.trace {
            trace.push(TraceEntry {
                tick: self.tick,
                seq: token.seq,
                node,
                pin: token.pin,
                activation: token.activation,
                outcome,
                outputs,
                arrivals,
            });
        }
    }
}
