//! Identity types for the pipeline system.
//!
//! `ConnectorId` is a newtype over `u32` that indexes `Pipeline`'s connector
//! list. A slot is addressed by its connector, direction and index.

use crate::pipeline::mode::SlotDirection;
use std::fmt;

/// Index into the pipeline's connector list.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct ConnectorId(pub u32);

impl ConnectorId {
    pub const INVALID: ConnectorId = ConnectorId(u32::MAX);

    #[inline]
    pub fn is_valid(self) -> bool {
        self != Self::INVALID
    }

    #[inline]
    pub fn index(self) -> usize {
        self.0 as usize
    }
}

impl fmt::Debug for ConnectorId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if *self == Self::INVALID {
            write!(f, "ConnectorId(INVALID)")
        } else {
            write!(f, "ConnectorId({})", self.0)
        }
    }
}

impl fmt::Display for ConnectorId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}

/// Address of a single input or output slot.
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct SlotId {
    pub connector: ConnectorId,
    pub direction: SlotDirection,
    pub index: u16,
}

impl SlotId {
    pub fn input(connector: ConnectorId, index: usize) -> Self {
        Self {
            connector,
            direction: SlotDirection::Input,
            index: index as u16,
        }
    }

    pub fn output(connector: ConnectorId, index: usize) -> Self {
        Self {
            connector,
            direction: SlotDirection::Output,
            index: index as u16,
        }
    }

    #[inline]
    pub fn index(self) -> usize {
        self.index as usize
    }
}

impl fmt::Debug for SlotId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let dir = match self.direction {
            SlotDirection::Input => "in",
            SlotDirection::Output => "out",
        };
        write!(f, "{}:{}{}", self.connector.0, dir, self.index)
    }
}

impl fmt::Display for SlotId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}
