use crate::{ActivationId, ExecutionState, GraphId, NodeId, PinSet};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;
use uuid::Uuid;

pub type InstanceId = Uuid;

/// Events emitted while a graph instance runs
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum ExecutionEvent {
    InstanceStarted {
        instance_id: InstanceId,
        graph_id: GraphId,
        timestamp: DateTime<Utc>,
    },
    NodeCompleted {
        instance_id: InstanceId,
        node_id: NodeId,
        node_type: String,
        activation: ActivationId,
        state: ExecutionState,
        outputs: PinSet,
        tick: u64,
        timestamp: DateTime<Utc>,
    },
    JoinStalled {
        instance_id: InstanceId,
        node_id: NodeId,
        activation: ActivationId,
        arrived: PinSet,
        expected: PinSet,
        timestamp: DateTime<Utc>,
    },
    JoinTimedOut {
        instance_id: InstanceId,
        node_id: NodeId,
        activation: ActivationId,
        waited_ticks: u64,
        timestamp: DateTime<Utc>,
    },
    InstanceFinished {
        instance_id: InstanceId,
        ticks: u64,
        timestamp: DateTime<Utc>,
    },
    InstanceAborted {
        instance_id: InstanceId,
        discarded_tokens: usize,
        timestamp: DateTime<Utc>,
    },
    NodeEvent {
        instance_id: InstanceId,
        node_id: NodeId,
        event: NodeEvent,
        timestamp: DateTime<Utc>,
    },
}

/// Messages published by node behaviors
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "event_type")]
pub enum NodeEvent {
    Info { message: String },
    Warning { message: String },
}

/// Event emitter scoped to one node of one instance
#[derive(Clone)]
pub struct EventEmitter {
    instance_id: InstanceId,
    node_id: NodeId,
    sender: broadcast::Sender<ExecutionEvent>,
}

impl EventEmitter {
    pub fn new(
        instance_id: InstanceId,
        node_id: NodeId,
        sender: broadcast::Sender<ExecutionEvent>,
    ) -> Self {
        Self {
            instance_id,
            node_id,
            sender,
        }
    }

    pub fn emit(&self, event: NodeEvent) {
        // No subscribers is fine
        let _ = self.sender.send(ExecutionEvent::NodeEvent {
            instance_id: self.instance_id,
            node_id: self.node_id,
            event,
            timestamp: Utc::now(),
        });
    }

    pub fn info(&self, message: impl Into<String>) {
        self.emit(NodeEvent::Info {
            message: message.into(),
        });
    }

    pub fn warn(&self, message: impl Into<String>) {
        self.emit(NodeEvent::Warning {
            message: message.into(),
        });
    }
}

/// Broadcast bus shared by all instances of a runtime
pub struct EventBus {
    sender: broadcast::Sender<ExecutionEvent>,
}

impl EventBus {
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity.max(1));
        Self { sender }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<ExecutionEvent> {
        self.sender.subscribe()
    }

    pub fn emit(&self, event: ExecutionEvent) {
        let _ = self.sender.send(event);
    }

    pub fn create_emitter(&self, instance_id: InstanceId, node_id: NodeId) -> EventEmitter {
        EventEmitter::new(instance_id, node_id, self.sender.clone())
    }
}
