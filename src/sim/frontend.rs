/*!
The contract with the functional ISA emulator.

The front end executes instructions and owns the architectural state,
including the L1 caches; the timing engine owns time. The orchestrator calls
`simulate_one` once per runnable core per cycle and gets back the events the
instruction produced; everything else is bookkeeping the timing side needs to
decide when a core may run again.
*/

use crate::event::{CacheRequest, Cycle, Event, RegKind};

pub trait FrontEnd {
    /// Simulate one instruction on `core`. Returns true if the core
    /// advanced, false if it is blocked on a RAW dependency. Produced events
    /// are pushed onto `events`.
    fn simulate_one(&mut self, core: u16, current_cycle: Cycle, events: &mut Vec<Event>) -> bool;

    /// A register became available. Returns true if the core is now eligible
    /// to make progress.
    fn ack_register(&mut self, core: u16, kind: RegKind, reg: u16, current_cycle: Cycle) -> bool;

    /// Whether a deferred latency event has matured and its destination
    /// register can be released.
    #[allow(clippy::too_many_arguments)]
    fn can_resume(
        &mut self,
        core: u16,
        src_reg: u16,
        src_kind: RegKind,
        dst_reg: u16,
        dst_kind: RegKind,
        latency: u64,
        current_cycle: Cycle,
    ) -> bool;

    /// Reload the front end's L1 with a serviced line. May hand back a
    /// writeback request displaced by the reload.
    fn service_cache_request(
        &mut self,
        request: &CacheRequest,
        current_cycle: Cycle,
    ) -> Option<CacheRequest>;

    /// Communicate a granted vector length.
    fn set_vvl(&mut self, core: u16, vvl: u64);

    /// Bookkeeping on a serviced request for in-order graduation.
    fn check_instruction_graduation(&mut self, request: &CacheRequest, current_cycle: Cycle) {
        let _ = (request, current_cycle);
    }

    fn decrement_in_flight_scalar_stores(&mut self, core: u16) {
        let _ = core;
    }

    /// True while the core still has scalar stores in flight.
    fn check_in_flight_scalar_stores(&mut self, core: u16) -> bool {
        let _ = core;
        false
    }

    /// L1 data hits observed by the front end, for the final latency report.
    fn num_l1_data_hits(&self) -> u64 {
        0
    }
}
