/*!
Shared test utilities: a scripted front end and event builders.

The scripted front end plays back a per-core list of steps. Each step is the
set of events one instruction produced; an exhausted script emits a single
`Finish`. Registers named by load-like events are marked pending and released
by `ack_register`, which is how the tests observe completions.
*/

use std::collections::HashSet;
use std::collections::VecDeque;

use crate::event::{AccessType, CacheRequest, Cycle, Event, RegKind};
use crate::sim::FrontEnd;

#[derive(Debug, Default)]
pub struct ScriptedFrontEnd {
    scripts: Vec<VecDeque<Vec<Event>>>,
    finished: Vec<bool>,
    /// (core, reg) pairs still waiting for an ack.
    pending_regs: HashSet<(u16, u16)>,
    pub acked_regs: Vec<(u16, RegKind, u16, Cycle)>,
    pub vvl_per_core: Vec<u64>,
    pub serviced_lines: Vec<u64>,
    /// Writebacks handed back from `service_cache_request`, oldest first.
    pub writebacks_to_emit: VecDeque<CacheRequest>,
    pub scalar_stores_in_flight: Vec<u32>,
    pub l1_data_hits: u64,
}

impl ScriptedFrontEnd {
    pub fn new(num_cores: u16) -> Self {
        ScriptedFrontEnd {
            scripts: vec![VecDeque::new(); num_cores as usize],
            finished: vec![false; num_cores as usize],
            vvl_per_core: vec![0; num_cores as usize],
            scalar_stores_in_flight: vec![0; num_cores as usize],
            ..Default::default()
        }
    }

    /// Append one instruction's worth of events to a core's script.
    pub fn push_step(&mut self, core: u16, events: Vec<Event>) -> &mut Self {
        for ev in &events {
            if let Event::Cache(r) = ev
                && r.ty == AccessType::Load
            {
                self.pending_regs.insert((core, r.reg.reg));
            }
        }
        self.scripts[core as usize].push_back(events);
        self
    }

    pub fn reg_pending(&self, core: u16, reg: u16) -> bool {
        self.pending_regs.contains(&(core, reg))
    }

    pub fn all_regs_acked(&self) -> bool {
        self.pending_regs.is_empty()
    }
}

impl FrontEnd for ScriptedFrontEnd {
    fn simulate_one(&mut self, core: u16, current_cycle: Cycle, events: &mut Vec<Event>) -> bool {
        match self.scripts[core as usize].pop_front() {
            Some(step) => {
                events.extend(step);
                true
            }
            None => {
                if !self.finished[core as usize] {
                    self.finished[core as usize] = true;
                    events.push(Event::Finish(crate::event::Finish::new(0, current_cycle, core)));
                }
                true
            }
        }
    }

    fn ack_register(&mut self, core: u16, kind: RegKind, reg: u16, current_cycle: Cycle) -> bool {
        self.pending_regs.remove(&(core, reg));
        self.acked_regs.push((core, kind, reg, current_cycle));
        true
    }

    fn can_resume(
        &mut self,
        _core: u16,
        _src_reg: u16,
        _src_kind: RegKind,
        _dst_reg: u16,
        _dst_kind: RegKind,
        _latency: u64,
        _current_cycle: Cycle,
    ) -> bool {
        true
    }

    fn service_cache_request(
        &mut self,
        request: &CacheRequest,
        _current_cycle: Cycle,
    ) -> Option<CacheRequest> {
        self.serviced_lines.push(request.address);
        self.writebacks_to_emit.pop_front()
    }

    fn set_vvl(&mut self, core: u16, vvl: u64) {
        self.vvl_per_core[core as usize] = vvl;
    }

    fn decrement_in_flight_scalar_stores(&mut self, core: u16) {
        let c = &mut self.scalar_stores_in_flight[core as usize];
        *c = c.saturating_sub(1);
    }

    fn check_in_flight_scalar_stores(&mut self, core: u16) -> bool {
        self.scalar_stores_in_flight[core as usize] > 0
    }

    fn num_l1_data_hits(&self) -> u64 {
        self.l1_data_hits
    }
}

/// A LOAD that misses the front end's L1 and enters the timing model.
pub fn load(core: u16, addr: u64, reg: u16) -> Event {
    let mut r = CacheRequest::new(addr, AccessType::Load, 0x400, 0, core)
        .with_destination(reg, RegKind::Integer);
    r.size = 8;
    Event::Cache(r)
}

pub fn store(core: u16, addr: u64) -> Event {
    let mut r = CacheRequest::new(addr, AccessType::Store, 0x404, 0, core);
    r.size = 8;
    Event::Cache(r)
}

pub fn fence(core: u16) -> Event {
    Event::Fence(crate::event::Fence::new(0x408, 0, core))
}

pub fn vector_waiting(core: u16) -> Event {
    Event::VectorWaiting(crate::event::VectorWaiting::new(0x40c, 0, core))
}

pub fn insn_latency(core: u16, dest_reg: u16, latency: u64, avail_cycle: Cycle) -> Event {
    Event::InsnLatency(crate::event::InsnLatencyEvent::new(
        0x410,
        core,
        1,
        RegKind::Integer,
        dest_reg,
        latency,
        avail_cycle,
    ))
}
