//! The rights bitmask.
//!
//! Every module and control interface holds a `Rights` mask. Privileged
//! operations and event deliveries are checked against it before anything
//! happens; the check itself is a pure predicate, the enforcement point is
//! the broker's authorization gate.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::ops::{BitOr, BitOrAssign};

/// A bitmask of capabilities held by a module or control interface.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Rights(u32);

impl Rights {
    /// No capabilities.
    pub const NONE: Rights = Rights(0);
    /// Register and unregister ports.
    pub const MANAGE_PORTS: Rights = Rights(1 << 0);
    /// Add, remove, and update connections.
    pub const MANAGE_CONNECTIONS: Rights = Rights(1 << 1);
    /// Emit element-change events through a provider port.
    pub const SEND_ELEMENT_EVENTS: Rights = Rights(1 << 2);
    /// Receive element-change events.
    pub const RCV_ELEMENT_EVENTS: Rights = Rights(1 << 3);
    /// Receive module-update, port-update, and connection-update events.
    pub const RCV_MOD_AND_PORT_UPDATE: Rights = Rights(1 << 4);
    /// Receive log and module-activity events.
    pub const RCV_LOG_EVENTS: Rights = Rights(1 << 5);
    /// Receive provider-state events.
    pub const RCV_PROVIDER_STATE: Rights = Rights(1 << 6);
    /// Receive system-state events.
    pub const RCV_SYSTEM_STATE: Rights = Rights(1 << 7);
    /// The holder tolerates event drops under backpressure. Without this
    /// bit the engine must guarantee delivery.
    pub const MAY_MISS_EVENTS: Rights = Rights(1 << 8);
    /// Every capability.
    pub const ALL: Rights = Rights(u32::MAX);

    /// Builds a mask from a raw bit pattern.
    #[must_use]
    pub const fn from_bits(bits: u32) -> Self {
        Self(bits)
    }

    /// The raw bit pattern.
    #[must_use]
    pub const fn bits(&self) -> u32 {
        self.0
    }

    /// Pure predicate: does this mask contain every bit of `required`?
    #[must_use]
    pub const fn contains(&self, required: Rights) -> bool {
        self.0 & required.0 == required.0
    }

    /// Union of two masks.
    #[must_use]
    pub const fn with(self, other: Rights) -> Self {
        Self(self.0 | other.0)
    }

    /// This mask minus the bits of `other`.
    #[must_use]
    pub const fn without(self, other: Rights) -> Self {
        Self(self.0 & !other.0)
    }

    /// Whether no bit is set.
    #[must_use]
    pub const fn is_empty(&self) -> bool {
        self.0 == 0
    }
}

impl Default for Rights {
    fn default() -> Self {
        Self::NONE
    }
}

impl BitOr for Rights {
    type Output = Rights;

    fn bitor(self, rhs: Rights) -> Rights {
        self.with(rhs)
    }
}

impl BitOrAssign for Rights {
    fn bitor_assign(&mut self, rhs: Rights) {
        self.0 |= rhs.0;
    }
}

impl fmt::Display for Rights {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:#010x}", self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn contains_requires_all_bits() {
        let held = Rights::MANAGE_PORTS | Rights::RCV_LOG_EVENTS;
        assert!(held.contains(Rights::MANAGE_PORTS));
        assert!(!held.contains(Rights::MANAGE_CONNECTIONS));
        assert!(!held.contains(Rights::MANAGE_PORTS | Rights::MANAGE_CONNECTIONS));
    }

    #[test]
    fn none_contains_only_none() {
        assert!(Rights::NONE.contains(Rights::NONE));
        assert!(!Rights::NONE.contains(Rights::MAY_MISS_EVENTS));
    }

    #[test]
    fn all_contains_everything() {
        assert!(Rights::ALL.contains(Rights::MANAGE_PORTS | Rights::MAY_MISS_EVENTS));
    }

    #[test]
    fn without_removes_bits() {
        let held = Rights::ALL.without(Rights::MAY_MISS_EVENTS);
        assert!(!held.contains(Rights::MAY_MISS_EVENTS));
        assert!(held.contains(Rights::RCV_ELEMENT_EVENTS));
    }
}
