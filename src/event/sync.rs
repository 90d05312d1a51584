//! Synchronization events. All three are core events with no payload beyond
//! their identity; what differs is how the orchestrator reacts.

use super::meta::{Cycle, EventCore};

/// Barrier arrival. The orchestrator parks the core until every core has
/// emitted its fence, then releases all of them at once.
#[derive(Debug, Clone)]
pub struct Fence {
    pub base: EventCore,
}

impl Fence {
    pub fn new(pc: u64, timestamp: Cycle, core: u16) -> Self {
        Fence {
            base: EventCore::new(pc, timestamp, core),
        }
    }
}

/// The core has executed its last instruction.
#[derive(Debug, Clone)]
pub struct Finish {
    pub base: EventCore,
}

impl Finish {
    pub fn new(pc: u64, timestamp: Cycle, core: u16) -> Self {
        Finish {
            base: EventCore::new(pc, timestamp, core),
        }
    }
}

/// A vector instruction cannot issue until the core's outstanding scalar
/// stores have drained.
#[derive(Debug, Clone)]
pub struct VectorWaiting {
    pub base: EventCore,
}

impl VectorWaiting {
    pub fn new(pc: u64, timestamp: Cycle, core: u16) -> Self {
        VectorWaiting {
            base: EventCore::new(pc, timestamp, core),
        }
    }
}
