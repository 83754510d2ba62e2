use serde::{Deserialize, Serialize};
use std::fmt;

/// Upper bound on the number of pins a node type may declare. Pin indices
/// and output ordinals always fit in a [`PinSet`].
pub const MAX_PINS: usize = 16;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum PinKind {
    /// Control flow: "execution reached here"
    Flow,
    /// Value read synchronously during an invocation
    Data,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum PinDirection {
    Input,
    Output,
}

/// One slot in a node type's pin configuration
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct PinType {
    pub kind: PinKind,
    pub direction: PinDirection,
}

impl PinType {
    pub const FLOW_IN: PinType = PinType::new(PinKind::Flow, PinDirection::Input);
    pub const FLOW_OUT: PinType = PinType::new(PinKind::Flow, PinDirection::Output);
    pub const DATA_IN: PinType = PinType::new(PinKind::Data, PinDirection::Input);
    pub const DATA_OUT: PinType = PinType::new(PinKind::Data, PinDirection::Output);

    pub const fn new(kind: PinKind, direction: PinDirection) -> Self {
        Self { kind, direction }
    }

    pub fn is_flow_output(&self) -> bool {
        *self == Self::FLOW_OUT
    }

    pub fn is_flow_input(&self) -> bool {
        *self == Self::FLOW_IN
    }
}

/// Pin indices of the flow outputs in a configuration, in declaration order.
/// Position `i` in the returned list is output ordinal `i`.
pub fn flow_output_pins(pins: &[PinType]) -> Vec<u8> {
    pins.iter()
        .enumerate()
        .filter(|(_, pin)| pin.is_flow_output())
        .map(|(idx, _)| idx as u8)
        .collect()
}

/// Small set of pin indices (or output ordinals), bounded by [`MAX_PINS`].
///
/// Node results use it to say which flow outputs fire: ordinal 0 is the first
/// flow output pin in the configuration, ordinal 1 the second, and so on.
/// Join nodes use it to remember which input pins have already delivered.
#[derive(Clone, Copy, Default, PartialEq, Eq, Hash)]
pub struct PinSet(u16);

impl PinSet {
    pub const EMPTY: PinSet = PinSet(0);

    pub fn single(index: u8) -> Self {
        let mut set = Self::EMPTY;
        set.insert(index);
        set
    }

    /// Adds `index`; returns false when it was already present or lies
    /// outside [`MAX_PINS`].
    pub fn insert(&mut self, index: u8) -> bool {
        if index as usize >= MAX_PINS || self.contains(index) {
            return false;
        }
        self.0 |= 1u16 << index;
        true
    }

    pub fn remove(&mut self, index: u8) {
        if (index as usize) < MAX_PINS {
            self.0 &= !(1u16 << index);
        }
    }

    pub fn contains(&self, index: u8) -> bool {
        (index as usize) < MAX_PINS && self.0 & (1u16 << index) != 0
    }

    pub fn is_empty(&self) -> bool {
        self.0 == 0
    }

    pub fn len(&self) -> usize {
        self.0.count_ones() as usize
    }

    pub fn is_subset(&self, other: &PinSet) -> bool {
        self.0 & !other.0 == 0
    }

    /// Indices in ascending order
    pub fn iter(&self) -> impl Iterator<Item = u8> + '_ {
        let bits = self.0;
        (0..MAX_PINS as u8).filter(move |i| bits & (1u16 << *i) != 0)
    }

    pub fn to_vec(&self) -> Vec<u8> {
        self.iter().collect()
    }
}

impl FromIterator<u8> for PinSet {
    fn from_iter<I: IntoIterator<Item = u8>>(iter: I) -> Self {
        let mut set = PinSet::EMPTY;
        for index in iter {
            set.insert(index);
        }
        set
    }
}

impl fmt::Debug for PinSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_set().entries(self.iter()).finish()
    }
}

impl Serialize for PinSet {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_seq(self.iter())
    }
}

impl<'de> Deserialize<'de> for PinSet {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let indices = Vec::<u8>::deserialize(deserializer)?;
        Ok(indices.into_iter().collect())
    }
}
