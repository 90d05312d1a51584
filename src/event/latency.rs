//! `InsnLatencyEvent`: defers the availability of a destination register by a
//! modelled instruction latency.

use super::meta::{Cycle, EventCore, RegisterInfo, RegKind};

#[derive(Debug, Clone)]
pub struct InsnLatencyEvent {
    pub base: EventCore,
    /// Destination register released when the event is serviced.
    pub reg: RegisterInfo,
    pub src_reg: u16,
    pub src_kind: RegKind,
    pub latency: u64,
    /// Cycle at which the result becomes architecturally visible.
    pub avail_cycle: Cycle,
}

impl InsnLatencyEvent {
    pub fn new(
        pc: u64,
        core: u16,
        src_reg: u16,
        src_kind: RegKind,
        dest_reg: u16,
        latency: u64,
        avail_cycle: Cycle,
    ) -> Self {
        InsnLatencyEvent {
            base: EventCore::new(pc, 0, core),
            reg: RegisterInfo::new(dest_reg, RegKind::DontCare),
            src_reg,
            src_kind,
            latency,
            avail_cycle,
        }
    }

    pub fn is_serviced(&self) -> bool {
        self.reg.is_serviced()
    }

    pub fn set_serviced(&mut self) {
        self.reg.set_serviced();
    }
}
