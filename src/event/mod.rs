/*!
Event module: typed event taxonomy and dispatch.

Overview
- Every piece of information that crosses the boundary between the functional
  front end and the timing engine is an `Event`. The taxonomy is a closed set
  of variants layered the same way the conceptual hierarchy is layered:
  every event carries timing (`EventCore`), core-originated events add
  pc/core/source-tile, register events add a destination register and a
  `serviced` flag, requests add an address and a size.

Modules and responsibilities
- meta: shared layers (`EventCore`, `RegisterInfo`, waypoint cycles, `RegKind`).
- cache: `CacheRequest` and its derived memory-side fields.
- scratchpad: `ScratchpadRequest` commands between memory tiles and tiles.
- vector: `McpuInstruction` and `McpuSetVvl`, the vector-memory events.
- latency: `InsnLatencyEvent` for modelled instruction latencies.
- sync: payload-free core events (`Fence`, `Finish`, `VectorWaiting`).
- visitor: `EventVisitor` with fall-through along the parent chain, plus the
  single `dispatch` entry point. Consumers never inspect variant tags outside
  of `dispatch` and their own visitor methods.
- serviced: FIFO of completed events travelling back to the orchestrator.
*/

pub mod cache;
pub mod latency;
pub mod meta;
pub mod scratchpad;
pub mod serviced;
pub mod sync;
pub mod vector;
pub mod visitor;

pub use cache::{AccessType, CacheRequest};
pub use latency::InsnLatencyEvent;
pub use meta::{Cycle, EventCore, RegKind, RegisterInfo};
pub use scratchpad::{ScratchpadCommand, ScratchpadRequest};
pub use serviced::ServicedQueue;
pub use sync::{Fence, Finish, VectorWaiting};
pub use vector::{ElementWidth, LmulSetting, McpuInstruction, McpuOp, McpuSubOp, McpuSetVvl};
pub use visitor::{dispatch, EventVisitor};

/// The closed set of events exchanged between the front end, the orchestrator
/// and the timing components.
#[derive(Debug, Clone)]
pub enum Event {
    Cache(CacheRequest),
    Scratchpad(ScratchpadRequest),
    McpuInstruction(McpuInstruction),
    McpuSetVvl(McpuSetVvl),
    InsnLatency(InsnLatencyEvent),
    Fence(Fence),
    Finish(Finish),
    VectorWaiting(VectorWaiting),
}

impl Event {
    /// Access the layers shared by every event.
    pub fn core(&self) -> &EventCore {
        match self {
            Event::Cache(e) => &e.base,
            Event::Scratchpad(e) => &e.base,
            Event::McpuInstruction(e) => &e.base,
            Event::McpuSetVvl(e) => &e.base,
            Event::InsnLatency(e) => &e.base,
            Event::Fence(e) => &e.base,
            Event::Finish(e) => &e.base,
            Event::VectorWaiting(e) => &e.base,
        }
    }

    pub fn core_mut(&mut self) -> &mut EventCore {
        match self {
            Event::Cache(e) => &mut e.base,
            Event::Scratchpad(e) => &mut e.base,
            Event::McpuInstruction(e) => &mut e.base,
            Event::McpuSetVvl(e) => &mut e.base,
            Event::InsnLatency(e) => &mut e.base,
            Event::Fence(e) => &mut e.base,
            Event::Finish(e) => &mut e.base,
            Event::VectorWaiting(e) => &mut e.base,
        }
    }

    /// Short tag used by diagnostics.
    pub fn kind_name(&self) -> &'static str {
        match self {
            Event::Cache(_) => "cache_request",
            Event::Scratchpad(_) => "scratchpad_request",
            Event::McpuInstruction(_) => "mcpu_instruction",
            Event::McpuSetVvl(_) => "mcpu_set_vvl",
            Event::InsnLatency(_) => "insn_latency",
            Event::Fence(_) => "fence",
            Event::Finish(_) => "finish",
            Event::VectorWaiting(_) => "vector_waiting_for_scalar_store",
        }
    }
}
