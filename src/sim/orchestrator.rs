/*!
Execution-driven orchestrator: keeps the functional front end in lockstep
with the discrete-event clock.

One iteration of `run` is one cycle:
  1. step every runnable core through the front end and dispatch the events
     each instruction produced;
  2. drain the engine up to the current cycle and feed serviced events back
     through the same dispatch;
  3. run one arbitration round on every tile, then drain again;
  4. wake cores that were stalled on a full arbiter queue;
  5. run one NoC cycle and eject packets;
  6. refill the runnable list per core group (coarse-grained multithreading);
  7. advance the clock, fast-forwarding when nothing can happen in between.

Cores are tagged state moved between the active, runnable and stalled lists;
nothing suspends. The per-L1 in-flight map enforces the MSHR budget and
coalesces duplicate loads; the map stores compact entries, never the events
themselves.
*/

use std::collections::{BTreeSet, HashMap, VecDeque};

use log::warn;

use crate::event::{
    dispatch, AccessType, CacheRequest, Cycle, Event, EventVisitor, Fence, Finish,
    InsnLatencyEvent, McpuInstruction, McpuSetVvl, RegKind, ScratchpadRequest, VectorWaiting,
};
use crate::sim::chip::Chip;
use crate::sim::frontend::FrontEnd;

/// Why a core left the runnable list.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum StallReason {
    Raw = 0,
    Mshrs = 1,
    FetchMiss = 2,
    VectorWaitingOnScalarStore = 3,
    WaitingOnBarrier = 4,
    CoreFinished = 5,
    MaxReasons = 6,
}

/// Compact record of an in-flight L1 miss; the request itself lives on the
/// timing side.
#[derive(Debug, Clone, Copy)]
struct InFlightEntry {
    core: u16,
    reg: u16,
    kind: RegKind,
    ty: AccessType,
}

pub struct ExecutionDrivenOrchestrator<F: FrontEnd> {
    pub chip: Chip,
    front: F,

    num_cores: u16,
    num_threads_per_core: u16,
    thread_switch_latency: u64,
    l1_writeback: bool,
    max_in_flight_l1_misses: usize,

    active_cores: Vec<u16>,
    stalled_cores: Vec<u16>,
    runnable_cores: Vec<u16>,
    cur_cycle_suspended_threads: Vec<u16>,
    stalled_cores_for_arbiter: BTreeSet<u16>,
    waiting_on_fetch: Vec<bool>,
    waiting_on_mshrs: Vec<bool>,
    waiting_on_scalar_stores: Vec<bool>,
    threads_in_barrier: Vec<bool>,
    /// Earliest cycle each core group may pick a new thread.
    runnable_after: Vec<Cycle>,
    thread_barrier_cnt: u64,

    pending_misses_per_core: Vec<VecDeque<CacheRequest>>,
    pending_get_vec_len: Vec<Option<McpuSetVvl>>,
    pending_mcpu_insn: Vec<Option<McpuInstruction>>,
    pending_simfence: Vec<Option<Fence>>,
    pending_insn_latency: Vec<VecDeque<InsnLatencyEvent>>,

    /// Per-L1 (that is, per core group) in-flight lines keyed by address.
    in_flight_per_l1: Vec<HashMap<u64, Vec<InFlightEntry>>>,
    in_flight_count: Vec<usize>,

    pub current_cycle: Cycle,
    /// Orchestrator loop iterations actually executed; with fast-forward
    /// this is usually far below `current_cycle`.
    pub cycles_executed: u64,
    front_finished: bool,
    noc_has_packets: bool,

    // Scratch state for the core currently being stepped.
    current_core: u16,
    core_active: bool,
    core_finished: bool,
    is_fetch: bool,
    stall_reason: StallReason,
    submitted_cache_requests_this_cycle: u64,

    pub simulated_instructions_per_core: Vec<u64>,
    pub mshr_stalls_per_core: Vec<u64>,
    avg_mem_access_time_l1_miss: f64,
    num_l2_accesses: u64,
}

impl<F: FrontEnd> ExecutionDrivenOrchestrator<F> {
    pub fn new(chip: Chip, front: F) -> Self {
        let num_cores = chip.cfg.num_cores;
        let num_threads_per_core = chip.cfg.num_threads_per_core;
        let groups = (num_cores / num_threads_per_core) as usize;
        let n = num_cores as usize;

        let active_cores = (0..num_cores).collect();
        let runnable_cores = (0..num_cores).step_by(num_threads_per_core as usize).collect();

        ExecutionDrivenOrchestrator {
            num_threads_per_core,
            thread_switch_latency: chip.cfg.thread_switch_latency,
            l1_writeback: chip.cfg.l1_writeback,
            max_in_flight_l1_misses: chip.cfg.num_mshrs_per_core as usize,
            num_cores,
            front,
            active_cores,
            stalled_cores: Vec::new(),
            runnable_cores,
            cur_cycle_suspended_threads: Vec::new(),
            stalled_cores_for_arbiter: BTreeSet::new(),
            waiting_on_fetch: vec![false; n],
            waiting_on_mshrs: vec![false; n],
            waiting_on_scalar_stores: vec![false; n],
            threads_in_barrier: vec![false; n],
            runnable_after: vec![0; groups],
            thread_barrier_cnt: 0,
            pending_misses_per_core: vec![VecDeque::new(); n],
            pending_get_vec_len: vec![None; n],
            pending_mcpu_insn: vec![None; n],
            pending_simfence: vec![None; n],
            pending_insn_latency: vec![VecDeque::new(); n],
            in_flight_per_l1: vec![HashMap::new(); groups],
            in_flight_count: vec![0; groups],
            current_cycle: 1,
            cycles_executed: 0,
            front_finished: false,
            noc_has_packets: false,
            current_core: 0,
            core_active: false,
            core_finished: false,
            is_fetch: false,
            stall_reason: StallReason::MaxReasons,
            submitted_cache_requests_this_cycle: 0,
            simulated_instructions_per_core: vec![0; n],
            mshr_stalls_per_core: vec![0; n],
            avg_mem_access_time_l1_miss: 0.0,
            // Starts at one for the rolling average.
            num_l2_accesses: 1,
            chip,
        }
    }

    fn group(&self, core: u16) -> usize {
        (core / self.num_threads_per_core) as usize
    }

    /// Simulation ends when there are no more engine events, the front end
    /// has retired every core, the NoC is empty and the arbiters drained.
    pub fn run(&mut self) {
        while !self.chip.engine.is_finished()
            || !self.front_finished
            || self.noc_has_packets
            || self.chip.has_msg_in_arbiter()
        {
            self.cycle();
        }
    }

    /// One full orchestrator cycle. `run` loops this until quiescence.
    pub fn cycle(&mut self) {
        self.cycles_executed += 1;
        self.submitted_cache_requests_this_cycle = 0;
        self.simulate_inst_in_active_cores();
        self.handle_engine_events();
        self.chip.schedule_arbiter(self.current_cycle);
        self.handle_engine_events();

        let parked: Vec<u16> = self.stalled_cores_for_arbiter.iter().copied().collect();
        for core in parked {
            if self.chip.has_arbiter_queue_free_slot(core) {
                self.stalled_cores_for_arbiter.remove(&core);
                self.resume_core(core);
            }
        }

        self.chip.noc.run_backend_cycles(1);
        self.noc_has_packets = self.chip.noc_tick(self.current_cycle);

        self.select_runnable_threads();

        let next_event_tick = self.chip.engine.next_event_tick();
        let idle = self.active_cores.is_empty()
            && !self.noc_has_packets
            && !self.chip.has_msg_in_arbiter();
        match next_event_tick {
            // Nothing can happen until the next event: fast-forward the
            // clock and the NoC back end together.
            Some(next) if idle && next > self.current_cycle + 1 => {
                self.chip.noc.run_backend_cycles(next - self.current_cycle - 1);
                self.current_cycle = next;
            }
            _ => self.current_cycle += 1,
        }
    }

    fn simulate_inst_in_active_cores(&mut self) {
        let mut i = 0;
        while i < self.runnable_cores.len() {
            self.core_finished = false;
            self.stall_reason = StallReason::MaxReasons;
            let core = self.runnable_cores[i];
            self.current_core = core;

            self.simulated_instructions_per_core[core as usize] += 1;
            if self.simulated_instructions_per_core[core as usize] % 1000 == 0
                && let Some(t) = self.chip.trace.as_mut()
            {
                t.ki(self.current_cycle, core);
            }

            let mut events = Vec::new();
            self.is_fetch = false;
            let success = self.front.simulate_one(core, self.current_cycle, &mut events);
            self.core_active = success;
            if !success {
                self.stall_reason = StallReason::Raw;
            }

            for ev in events {
                dispatch(ev, self);
            }

            let has_free_slot = self.chip.has_arbiter_queue_free_slot(core);
            if !self.core_active && !has_free_slot {
                warn!(
                    "core {core} stalled with a full arbiter queue at cycle {}",
                    self.current_cycle
                );
            } else if !has_free_slot {
                self.stalled_cores_for_arbiter.insert(core);
            }

            if !self.core_active || !has_free_slot {
                if let Some(pos) = self.active_cores.iter().position(|&c| c == core) {
                    self.active_cores.remove(pos);
                }
                self.runnable_cores.remove(i);
                self.cur_cycle_suspended_threads.push(core);
                let group = self.group(core);
                self.runnable_after[group] = self.current_cycle + self.thread_switch_latency;

                if !self.core_finished {
                    self.stalled_cores.push(core);
                } else if self.active_cores.is_empty() && self.stalled_cores.is_empty() {
                    self.front_finished = true;
                }

                if let Some(t) = self.chip.trace.as_mut() {
                    // MSHR stalls are logged against the cycle of the last
                    // submitted request; kept for trace reproducibility.
                    let cycle = if self.stall_reason == StallReason::Mshrs {
                        self.current_cycle + self.submitted_cache_requests_this_cycle - 1
                    } else {
                        self.current_cycle
                    };
                    t.stall(cycle, core, self.stall_reason as u64);
                }
            } else {
                i += 1;
            }
        }
    }

    /// Bring the engine up to date with the clock and route everything the
    /// timing side finished back through the dispatch.
    fn handle_engine_events(&mut self) {
        if let Some(next) = self.chip.engine.next_event_tick()
            && next <= self.current_cycle
        {
            self.chip.advance_to(self.current_cycle);
        }
        while let Some(ev) = self.chip.serviced.pop() {
            dispatch(ev, self);
        }
    }

    fn select_runnable_threads(&mut self) {
        let threads = self.num_threads_per_core;
        let mut i = 0;
        while i < self.cur_cycle_suspended_threads.len() {
            let core = self.cur_cycle_suspended_threads[i];
            let group = self.group(core);
            if self.current_cycle < self.runnable_after[group] {
                i += 1;
                continue;
            }
            let start = group as u16 * threads;
            let mut replaced = false;
            for cntr in 1..=threads {
                let next_thread = start + ((core + cntr) % threads);
                if self.active_cores.contains(&next_thread) {
                    self.runnable_cores.push(next_thread);
                    self.cur_cycle_suspended_threads.remove(i);
                    replaced = true;
                    break;
                }
            }
            if !replaced {
                i += 1;
            }
        }
    }

    /// A core only becomes active again if the arbiter can take its next
    /// message; otherwise it parks on the arbiter list.
    fn resume_core(&mut self, core: u16) -> bool {
        if self.chip.has_arbiter_queue_free_slot(core) {
            if let Some(pos) = self.stalled_cores.iter().position(|&c| c == core) {
                self.stalled_cores.remove(pos);
                self.active_cores.push(core);
                if let Some(t) = self.chip.trace.as_mut() {
                    t.resume(self.current_cycle, core, 0);
                }
                return true;
            }
        } else {
            self.stalled_cores_for_arbiter.insert(core);
        }
        false
    }

    /// Submit a cache request, honoring the in-flight tracking rules: loads
    /// coalesce onto an existing entry for their line, writebacks (and
    /// stores, under writethrough) are never tracked.
    fn submit_cache_request(&mut self, mut r: CacheRequest) {
        self.submitted_cache_requests_this_cycle += 1;
        r.base.set_timestamp(self.current_cycle);
        let group = self.group(r.base.core);

        let tracked = if self.l1_writeback {
            r.ty != AccessType::Writeback
        } else {
            r.ty != AccessType::Writeback && r.ty != AccessType::Store
        };
        let already_in_flight = self.in_flight_per_l1[group].contains_key(&r.address);
        let submit = !tracked || !already_in_flight;

        if tracked {
            self.in_flight_per_l1[group].entry(r.address).or_default().push(InFlightEntry {
                core: r.base.core,
                reg: r.reg.reg,
                kind: r.reg.kind,
                ty: r.ty,
            });
            self.in_flight_count[group] += 1;
        }
        if submit {
            self.chip.put_event(Event::Cache(r), self.current_cycle);
        }
    }

    fn submit_pending_cache_requests(&mut self, core: u16) {
        let group = self.group(core);
        while !self.pending_misses_per_core[core as usize].is_empty()
            && self.in_flight_count[group] < self.max_in_flight_l1_misses
        {
            let mut miss = self.pending_misses_per_core[core as usize].pop_front().unwrap();
            // The miss actually happens now.
            miss.base.set_timestamp(self.current_cycle);
            self.submit_cache_request(miss);
        }
        if !self.pending_misses_per_core[core as usize].is_empty() {
            self.waiting_on_mshrs[core as usize] = true;
        }
    }

    fn submit_pending_ops(&mut self, core: u16) {
        if self.pending_simfence[core as usize].take().is_some() {
            self.run_pending_simfence(core);
        }
        self.submit_pending_cache_requests(core);
        if let Some(mut v) = self.pending_get_vec_len[core as usize].take() {
            v.base.set_timestamp(self.current_cycle);
            self.chip.put_event(Event::McpuSetVvl(v), self.current_cycle);
        }
        if let Some(mut insn) = self.pending_mcpu_insn[core as usize].take() {
            insn.base.set_timestamp(self.current_cycle);
            self.chip.put_event(Event::McpuInstruction(insn), self.current_cycle);
        }
    }

    fn run_pending_simfence(&mut self, core: u16) {
        if self.thread_barrier_cnt == 0 {
            self.thread_barrier_cnt = self.num_cores as u64 - 1;
            // A single core makes the barrier a no-op.
            if self.thread_barrier_cnt != 0 {
                self.threads_in_barrier[core as usize] = true;
                self.core_active = false;
                self.stall_reason = StallReason::WaitingOnBarrier;
            }
        } else if self.thread_barrier_cnt == 1 {
            // Last arrival: release everyone.
            self.thread_barrier_cnt = 0;
            let mut my_core_gp = self.group(core);
            for i in 0..self.num_cores {
                if self.stalled_cores.contains(&i) {
                    self.resume_core(i);
                    if i == core {
                        my_core_gp = usize::MAX;
                    }
                }
                self.threads_in_barrier[i as usize] = false;
            }
            self.stalled_cores.clear();

            // Refill the runnable list with one thread per group; the group
            // of the last arrival keeps running through the step loop.
            for i in (0..self.num_cores).step_by(self.num_threads_per_core as usize) {
                if self.group(i) != my_core_gp {
                    self.runnable_cores.push(i);
                }
            }
            self.cur_cycle_suspended_threads.clear();
        } else {
            self.thread_barrier_cnt -= 1;
            self.threads_in_barrier[core as usize] = true;
            self.core_active = false;
            self.stall_reason = StallReason::WaitingOnBarrier;
        }
    }

    /// The final report: per-core counts and the memory latency breakdown.
    pub fn save_reports(&self) -> String {
        use std::fmt::Write;
        let mut out = String::new();
        let mut total = 0u64;
        for core in 0..self.num_cores as usize {
            let _ = writeln!(
                out,
                "Core {core}:\n\tsimulated {} instructions\n\tstalled on MSHRs {} times",
                self.simulated_instructions_per_core[core], self.mshr_stalls_per_core[core]
            );
            total += self.simulated_instructions_per_core[core];
        }
        let _ = writeln!(out, "Total simulated instructions {total}");

        let l1_hits = self.front.num_l1_data_hits();
        let accesses = l1_hits + self.num_l2_accesses;
        let avg = (l1_hits as f64 + self.avg_mem_access_time_l1_miss * self.num_l2_accesses as f64)
            / accesses as f64;
        let _ = writeln!(out, "Average memory access time: {avg:.2} cycles");
        let _ = writeln!(out, "Average memory access time breakdown (for accesses that miss all along the memory hierarchy):");
        let arbiter: f64 = self.chip.arbiters.iter().map(|a| a.avg_latency()).sum::<f64>()
            / self.chip.arbiters.len() as f64;
        let _ = writeln!(out, "\tArbiter: {arbiter:.2}");
        let mut l2 = 0.0;
        for tile in 0..self.chip.cfg.num_tiles {
            for bank in 0..self.chip.cfg.num_l2_banks {
                l2 += self.chip.bank(tile, bank).avg_latency();
            }
        }
        l2 /= (self.chip.cfg.num_tiles * self.chip.cfg.num_l2_banks) as f64;
        let _ = writeln!(out, "\tL2: {l2:.2}");
        let _ = writeln!(out, "\tNoC: {:.2}", self.chip.noc.avg_packet_latency());
        let mc: f64 = self.chip.mcs.iter().map(|m| m.avg_latency()).sum::<f64>()
            / self.chip.mcs.len() as f64;
        let _ = writeln!(out, "\tMemory controller: {mc:.2}");

        for tile in &self.chip.tiles {
            let _ = writeln!(
                out,
                "Tile {}: {} requests from local cores, {} from remote cores",
                tile.id, tile.counters.local_requests, tile.counters.remote_requests
            );
        }
        let map = self.chip.noc.message_map();
        for network in 0..map.num_networks() {
            let _ = writeln!(
                out,
                "NoC {}: {} packets",
                map.network_name(network as u8),
                self.chip.noc.rx_packets[network]
            );
        }
        out
    }

    pub fn front_end(&mut self) -> &mut F {
        &mut self.front
    }

    #[cfg(test)]
    pub(crate) fn in_flight_misses(&self, group: usize) -> usize {
        self.in_flight_count[group]
    }

    #[cfg(test)]
    pub(crate) fn is_stalled(&self, core: u16) -> bool {
        self.stalled_cores.contains(&core)
    }
}

impl<F: FrontEnd> EventVisitor for ExecutionDrivenOrchestrator<F> {
    fn visit_cache(&mut self, r: CacheRequest) {
        if !r.is_serviced() {
            let cc = self.current_core;
            let group = self.group(cc);
            if self.in_flight_count[group] >= self.max_in_flight_l1_misses {
                self.core_active = false;
                self.waiting_on_mshrs[cc as usize] = true;
                self.stall_reason = StallReason::Mshrs;
                self.mshr_stalls_per_core[cc as usize] += 1;
                self.pending_misses_per_core[cc as usize].push_back(r);
            } else if r.ty == AccessType::Fetch {
                // Fetch misses are serviced immediately; everything else the
                // instruction produced is submitted after the fetch returns.
                self.submit_cache_request(r);
                self.core_active = false;
                self.stall_reason = StallReason::FetchMiss;
                self.is_fetch = true;
                self.waiting_on_fetch[cc as usize] = true;
            } else if self.core_active {
                self.submit_cache_request(r);
            } else {
                // Instructions are not replayed: misses produced under a
                // fetch stall are parked and submitted later.
                self.pending_misses_per_core[cc as usize].push_back(r);
            }
            return;
        }

        // Serviced ack path.
        let core = r.base.core;
        let group = self.group(core);
        let is_fetch = r.ty == AccessType::Fetch;
        let is_load = r.ty == AccessType::Load;
        let is_store = r.ty == AccessType::Store;
        let mut can_run = false;

        if is_fetch {
            can_run = true;
            self.waiting_on_fetch[core as usize] = false;

            // Latency events deferred under the fetch: mature ones resolve
            // against the front end, the rest are submitted now.
            while let Some(mut latency_evt) = self.pending_insn_latency[core as usize].pop_front() {
                if self.current_cycle < latency_evt.avail_cycle {
                    latency_evt.base.set_timestamp(self.current_cycle);
                    self.chip.put_event(Event::InsnLatency(latency_evt), self.current_cycle);
                    can_run = false;
                } else {
                    self.front.can_resume(
                        latency_evt.base.core,
                        latency_evt.src_reg,
                        latency_evt.src_kind,
                        latency_evt.reg.reg,
                        latency_evt.reg.kind,
                        latency_evt.latency,
                        self.current_cycle,
                    );
                }
            }
        }

        // Stores only bring lines under writeback; under writethrough a
        // store miss is not tracked and a later load must resubmit.
        if is_load || (is_store && self.l1_writeback) {
            let sample = (self.current_cycle - r.base.timestamp) as f64;
            self.avg_mem_access_time_l1_miss +=
                (sample - self.avg_mem_access_time_l1_miss) / self.num_l2_accesses as f64;
            self.num_l2_accesses += 1;

            if let Some(entries) = self.in_flight_per_l1[group].get(&r.address) {
                for entry in entries {
                    if entry.ty == AccessType::Load {
                        can_run = self.front.ack_register(
                            entry.core,
                            entry.kind,
                            entry.reg,
                            self.current_cycle,
                        );
                    }
                }
            }
        }

        let untrack = if self.l1_writeback {
            r.ty != AccessType::Writeback
        } else {
            r.ty != AccessType::Writeback && r.ty != AccessType::Store
        };
        if untrack && let Some(entries) = self.in_flight_per_l1[group].remove(&r.address) {
            self.in_flight_count[group] -= entries.len();
        }

        if self.waiting_on_mshrs[core as usize] {
            self.submit_pending_cache_requests(core);
        }

        can_run = can_run && !self.waiting_on_fetch[core as usize];
        if can_run {
            self.submit_pending_ops(core);
        }

        // Reload the front end's L1 and pick up a displaced writeback.
        let reloads = if self.l1_writeback {
            r.ty != AccessType::Writeback && !r.bypass_l1
        } else {
            r.ty != AccessType::Writeback && !r.bypass_l1 && r.ty != AccessType::Store
        };
        if reloads
            && let Some(wb) = self.front.service_cache_request(&r, self.current_cycle)
        {
            if self.in_flight_count[group] < self.max_in_flight_l1_misses {
                self.visit_cache(wb);
            } else {
                self.pending_misses_per_core[self.current_core as usize].push_back(wb);
            }
        }

        self.front.check_instruction_graduation(&r, self.current_cycle);

        if is_store && !r.bypass_l1 {
            self.front.decrement_in_flight_scalar_stores(core);
            if !self.front.check_in_flight_scalar_stores(core)
                && self.waiting_on_scalar_stores[core as usize]
            {
                self.waiting_on_scalar_stores[core as usize] = false;
                self.resume_core(core);
            }
        }

        if self.waiting_on_mshrs[core as usize]
            && self.pending_misses_per_core[core as usize].is_empty()
        {
            self.waiting_on_mshrs[core as usize] = false;
            self.resume_core(core);
        }

        if can_run && !self.threads_in_barrier[core as usize] && !self.waiting_on_mshrs[core as usize]
        {
            let resumed = self.resume_core(core);
            if resumed && let Some(t) = self.chip.trace.as_mut() {
                t.resume(self.current_cycle, core, r.address);
            }
        }
    }

    fn visit_finish(&mut self, _f: Finish) {
        self.core_active = false;
        self.stall_reason = StallReason::CoreFinished;
        self.core_finished = true;
    }

    fn visit_fence(&mut self, f: Fence) {
        if self.is_fetch {
            self.pending_simfence[self.current_core as usize] = Some(f);
        } else {
            self.run_pending_simfence(self.current_core);
        }
    }

    fn visit_vector_waiting(&mut self, e: VectorWaiting) {
        self.waiting_on_scalar_stores[e.base.core as usize] = true;
        self.core_active = false;
        self.stall_reason = StallReason::VectorWaitingOnScalarStore;
    }

    fn visit_set_vvl(&mut self, r: McpuSetVvl) {
        if !r.is_serviced() {
            if self.is_fetch {
                self.pending_get_vec_len[self.current_core as usize] = Some(r);
            } else {
                self.chip.put_event(Event::McpuSetVvl(r), self.current_cycle);
            }
        } else {
            let core = r.base.core;
            self.front.set_vvl(core, r.vvl);
            let can_run =
                self.front
                    .ack_register(core, RegKind::Integer, r.reg.reg, self.current_cycle);
            if can_run && !self.threads_in_barrier[core as usize] {
                self.resume_core(core);
            }
        }
    }

    fn visit_scratchpad(&mut self, r: ScratchpadRequest) {
        assert!(r.is_serviced(), "scratchpad events reach the orchestrator serviced");
        let core = r.base.core;
        let can_run = self
            .front
            .ack_register(core, r.reg.kind, r.reg.reg, self.current_cycle);
        if can_run && !self.threads_in_barrier[core as usize] {
            self.resume_core(core);
        }
    }

    fn visit_mcpu_instruction(&mut self, i: McpuInstruction) {
        if self.is_fetch {
            self.pending_mcpu_insn[self.current_core as usize] = Some(i);
        } else {
            self.chip.put_event(Event::McpuInstruction(i), self.current_cycle);
        }
    }

    fn visit_insn_latency(&mut self, r: InsnLatencyEvent) {
        if !r.is_serviced() {
            if self.is_fetch {
                self.pending_insn_latency[self.current_core as usize].push_back(r);
            } else {
                let mut r = r;
                r.base.set_timestamp(self.current_cycle);
                self.chip.put_event(Event::InsnLatency(r), self.current_cycle);
            }
        } else if self.front.can_resume(
            r.base.core,
            r.src_reg,
            r.src_kind,
            r.reg.reg,
            r.reg.kind,
            r.latency,
            self.current_cycle,
        ) {
            let core = r.base.core;
            self.submit_pending_ops(core);
            self.resume_core(core);
        }
    }
}
