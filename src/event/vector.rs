//! Vector-memory events: the instruction handed to the memory CPU and the
//! vector-length negotiation.

use super::meta::{Cycle, EventCore, RegisterInfo, RegKind};

/// Width of a vector element in memory. The discriminants are the width in
/// bytes so arithmetic on widths stays free of match statements.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ElementWidth {
    Bit8 = 1,
    Bit16 = 2,
    Bit32 = 4,
    Bit64 = 8,
}

impl ElementWidth {
    pub fn bytes(self) -> u32 {
        self as u32
    }
}

/// Register-grouping setting carried by a VVL request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LmulSetting {
    Eighth,
    Fourth,
    Half,
    One,
    Two,
    Four,
    Eight,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum McpuOp {
    Load,
    Store,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum McpuSubOp {
    Unit,
    NonUnit,
    OrderedIndex,
    UnorderedIndex,
}

/// A vector memory instruction forwarded to the memory CPU for expansion.
#[derive(Debug, Clone)]
pub struct McpuInstruction {
    pub base: EventCore,
    pub reg: RegisterInfo,
    pub base_address: u64,
    pub operation: McpuOp,
    pub sub_operation: McpuSubOp,
    pub width: ElementWidth,
    /// Per-element offsets for indexed accesses, strides for non-unit ones.
    pub indices: Vec<u64>,
    /// Raw instruction bits, kept for the front end's graduation bookkeeping.
    pub insn_bits: u64,
}

impl McpuInstruction {
    pub fn new(
        pc: u64,
        timestamp: Cycle,
        core: u16,
        base_address: u64,
        operation: McpuOp,
        width: ElementWidth,
        insn_bits: u64,
    ) -> Self {
        McpuInstruction {
            base: EventCore::new(pc, timestamp, core),
            reg: RegisterInfo::default(),
            base_address,
            operation,
            sub_operation: McpuSubOp::Unit,
            width,
            indices: Vec::new(),
            insn_bits,
        }
    }

    pub fn set_indexed(&mut self, indices: Vec<u64>) {
        self.indices = indices;
        self.sub_operation = McpuSubOp::UnorderedIndex;
    }

    pub fn set_ordered(&mut self, indices: Vec<u64>) {
        self.indices = indices;
        self.sub_operation = McpuSubOp::OrderedIndex;
    }

    pub fn set_strided(&mut self, offsets: Vec<u64>) {
        self.indices = offsets;
        self.sub_operation = McpuSubOp::NonUnit;
    }

    pub fn is_serviced(&self) -> bool {
        self.reg.is_serviced()
    }
}

/// Vector-length negotiation. The core proposes an application vector length
/// and the memory CPU grants a VVL bounded by its scratchpad capacity.
#[derive(Debug, Clone)]
pub struct McpuSetVvl {
    pub base: EventCore,
    pub reg: RegisterInfo,
    pub avl: u64,
    pub vvl: u64,
    pub lmul: LmulSetting,
    pub width: ElementWidth,
}

impl McpuSetVvl {
    pub fn new(avl: u64, reg: u16, pc: u64, timestamp: Cycle, core: u16) -> Self {
        McpuSetVvl {
            base: EventCore::new(pc, timestamp, core),
            reg: RegisterInfo::new(reg, RegKind::Integer),
            avl,
            vvl: 0,
            lmul: LmulSetting::One,
            width: ElementWidth::Bit64,
        }
    }

    pub fn is_serviced(&self) -> bool {
        self.reg.is_serviced()
    }

    pub fn set_serviced(&mut self) {
        self.reg.set_serviced();
    }
}
