//! `ScratchpadRequest`: commands the memory tile issues against the
//! software-managed scratchpad that lives in a tile's L2 ways.

use super::meta::{Cycle, EventCore, RegisterInfo, RegKind};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScratchpadCommand {
    Allocate,
    Free,
    Read,
    Write,
}

/// A scratchpad command. The scratchpad performs no checks on sizes or
/// address ranges; the memory-CPU wrapper is responsible for never requesting
/// more space than the L2 provides or touching unallocated regions.
#[derive(Debug, Clone)]
pub struct ScratchpadRequest {
    pub base: EventCore,
    pub reg: RegisterInfo,
    pub address: u64,
    pub size: u32,
    pub command: ScratchpadCommand,
    /// True exactly when servicing this request completes an operand and the
    /// awaiting vector instruction may proceed.
    pub operand_ready: bool,
    /// Bank the access resolved to, stamped by the access director.
    pub cache_bank: u16,
}

impl ScratchpadRequest {
    /// Build a command addressed to a core's tile. `source_mem_tile` is the
    /// memory tile generating the request; replies route back to it.
    pub fn new(
        address: u64,
        command: ScratchpadCommand,
        pc: u64,
        timestamp: Cycle,
        core: u16,
        source_mem_tile: u16,
        dest_reg: u16,
    ) -> Self {
        let mut base = EventCore::new(pc, timestamp, core);
        base.source_tile = source_mem_tile;
        ScratchpadRequest {
            base,
            reg: RegisterInfo::new(dest_reg, RegKind::Vector),
            address,
            size: 0,
            command,
            operand_ready: false,
            cache_bank: 0,
        }
    }

    pub fn is_serviced(&self) -> bool {
        self.reg.is_serviced()
    }

    pub fn set_serviced(&mut self) {
        self.reg.set_serviced();
    }
}
