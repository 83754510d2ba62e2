use petgraph::graph::NodeIndex;
use scriptcore::{ActivationId, ActivationState};
use std::collections::BTreeMap;

/// Engine bookkeeping around one node's activation state
#[derive(Debug, Default)]
pub struct Slot {
    pub state: ActivationState,
    /// Node already fired for this activation; later arrivals are absorbed
    pub latched: bool,
    /// Tick of the first arrival the node held back
    pub waiting_since: Option<u64>,
    pub timed_out: bool,
}

impl Slot {
    /// Holding partial arrivals for a join that has not fired yet
    pub fn is_waiting(&self) -> bool {
        self.waiting_since.is_some() && !self.latched
    }
}

/// Arena of activation state keyed by (activation, node), plus live token
/// counts per activation. Owned by exactly one instance.
///
/// A token that keeps executing across ticks carries its own scratch state,
/// keyed by token sequence number, so two tokens of one activation sitting
/// on the same node never share a timer.
#[derive(Debug, Default)]
pub struct ActivationStore {
    slots: BTreeMap<(ActivationId, NodeIndex), Slot>,
    executing: BTreeMap<u64, ActivationState>,
    live: BTreeMap<ActivationId, usize>,
    last_id: u64,
}

impl ActivationStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Allocate an activation id never handed out before by this store
    pub fn mint(&mut self) -> ActivationId {
        self.last_id += 1;
        ActivationId(self.last_id)
    }

    /// Slot for (node, activation), created empty on first use
    pub fn slot_mut(&mut self, node: NodeIndex, activation: ActivationId) -> &mut Slot {
        self.slots.entry((activation, node)).or_default()
    }

    pub fn slot(&self, node: NodeIndex, activation: ActivationId) -> Option<&Slot> {
        self.slots.get(&(activation, node))
    }

    /// Move the shared state of (node, activation) out for one invocation.
    /// Missing slots yield empty state without being created.
    pub fn take_state(&mut self, node: NodeIndex, activation: ActivationId) -> ActivationState {
        self.slots
            .get_mut(&(activation, node))
            .map(|slot| std::mem::take(&mut slot.state))
            .unwrap_or_default()
    }

    /// Put state back into the shared slot. Arrivals recorded meanwhile by
    /// other tokens are kept.
    pub fn restore(&mut self, node: NodeIndex, activation: ActivationId, state: ActivationState) {
        let slot = self.slot_mut(node, activation);
        let arrivals = slot.state.arrivals;
        slot.state = state;
        for pin in arrivals.iter() {
            slot.state.arrivals.insert(pin);
        }
    }

    /// Park the scratch state of an executing token until its next tick.
    /// Join arrivals stay visible on the shared slot.
    pub fn hold(
        &mut self,
        node: NodeIndex,
        activation: ActivationId,
        seq: u64,
        state: ActivationState,
    ) {
        if !state.arrivals.is_empty() {
            let shared = &mut self.slot_mut(node, activation).state.arrivals;
            for pin in state.arrivals.iter() {
                shared.insert(pin);
            }
        }
        self.executing.insert(seq, state);
    }

    /// Scratch state parked for token `seq`, if it is resuming
    pub fn resume(&mut self, seq: u64) -> Option<ActivationState> {
        self.executing.remove(&seq)
    }

    pub fn is_latched(&self, node: NodeIndex, activation: ActivationId) -> bool {
        self.slot(node, activation).is_some_and(|slot| slot.latched)
    }

    pub fn retire(&mut self, node: NodeIndex, activation: ActivationId) {
        self.slots.remove(&(activation, node));
    }

    pub fn latch(&mut self, node: NodeIndex, activation: ActivationId) {
        let slot = self.slot_mut(node, activation);
        slot.latched = true;
        slot.waiting_since = None;
    }

    pub fn mark_waiting(&mut self, node: NodeIndex, activation: ActivationId, tick: u64) {
        let slot = self.slot_mut(node, activation);
        slot.waiting_since.get_or_insert(tick);
    }

    pub fn token_created(&mut self, activation: ActivationId) {
        *self.live.entry(activation).or_insert(0) += 1;
    }

    /// Returns true when this was the activation's last live token
    pub fn token_consumed(&mut self, activation: ActivationId) -> bool {
        match self.live.get_mut(&activation) {
            Some(count) if *count > 1 => {
                *count -= 1;
                false
            }
            Some(_) => {
                self.live.remove(&activation);
                true
            }
            None => {
                tracing::warn!("Token consumed for unknown activation {}", activation);
                false
            }
        }
    }

    pub fn live_tokens(&self, activation: ActivationId) -> usize {
        self.live.get(&activation).copied().unwrap_or(0)
    }

    /// Remove every slot belonging to a drained activation, returning them in
    /// node order.
    pub fn release(&mut self, activation: ActivationId) -> Vec<(NodeIndex, Slot)> {
        let keys: Vec<(ActivationId, NodeIndex)> = self
            .slots
            .range((activation, NodeIndex::new(0))..=(activation, NodeIndex::end()))
            .map(|(key, _)| *key)
            .collect();
        keys.into_iter()
            .filter_map(|key| self.slots.remove(&key).map(|slot| (key.1, slot)))
            .collect()
    }

    /// Slots currently holding partial join arrivals
    pub fn waiting(&self) -> impl Iterator<Item = (ActivationId, NodeIndex, &Slot)> {
        self.slots
            .iter()
            .filter(|(_, slot)| slot.is_waiting())
            .map(|((activation, node), slot)| (*activation, *node, slot))
    }

    pub fn waiting_mut(&mut self) -> impl Iterator<Item = (ActivationId, NodeIndex, &mut Slot)> {
        self.slots
            .iter_mut()
            .filter(|(_, slot)| slot.is_waiting())
            .map(|((activation, node), slot)| (*activation, *node, slot))
    }

    /// Drop everything; returns how many slots and parked states were
    /// released
    pub fn clear(&mut self) -> usize {
        let released = self.slots.len() + self.executing.len();
        self.slots.clear();
        self.executing.clear();
        self.live.clear();
        released
    }

    pub fn len(&self) -> usize {
        self.slots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }
}
