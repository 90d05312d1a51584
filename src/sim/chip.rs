/*!
Chip: assembly of the timing components and the event manager.

The chip owns every component in flat vectors (tiles, arbiters, banks,
memory CPUs, memory controllers) plus the NoC, the discrete-event engine and
the serviced queue. Components never reference each other; they hand back
action values and the chip turns those into scheduled engine work. This file
is the single place where the action/event tags are matched.

Event-manager duties (the front door of the timing model) live here too:
`put_event` tags a core event with its source tile and hands it to that tile,
`notify_ack` parks completed events for the orchestrator, and the arbiter
helpers answer the orchestrator's admission questions.
*/

use crate::config::{CacheDataMappingPolicy, L2SharingMode, SimConfig};
use crate::error::ConfigError;
use crate::event::{
    CacheRequest, Cycle, Event, InsnLatencyEvent, ServicedQueue,
};
use crate::mem::arbiter::{Arbiter, ArbiterMessage};
use crate::mem::bank::{BankAction, L2Bank};
use crate::mem::controller::MemoryController;
use crate::mem::director::TileAction;
use crate::mem::mcpu::{McpuAction, MemoryCpuWrapper};
use crate::mem::tile::Tile;
use crate::noc::message::{MessageMap, NocMessage, NocMessageType};
use crate::noc::{Delivery, Noc};
use crate::trace::TraceLogger;

use super::engine::Engine;

/// Work items on the discrete-event engine.
#[derive(Debug)]
pub enum Scheduled {
    TileEvent { tile: u16, ev: Event },
    ArbiterSubmit { tile: u16, msg: ArbiterMessage },
    BankAccess { tile: u16, bank: u16, ev: Event },
    BankIssue { tile: u16, bank: u16 },
    BankAckAttempt { tile: u16, bank: u16, ev: Event },
    BankFill { tile: u16, bank: u16, req: CacheRequest },
    InsnLatencyReady { tile: u16, ev: InsnLatencyEvent },
    TileNoc { tile: u16, msg: NocMessage },
    MemNoc { mem: u16, msg: NocMessage },
    McpuIncoming { mem: u16 },
    McpuOutgoing { mem: u16 },
    McpuMemReq { mem: u16 },
    McIssue { mem: u16 },
    McComplete { mem: u16, req: CacheRequest },
}

#[derive(Debug)]
pub struct Chip {
    pub cfg: SimConfig,
    pub tiles: Vec<Tile>,
    pub arbiters: Vec<Arbiter>,
    banks: Vec<L2Bank>,
    pub noc: Noc,
    pub mcpus: Vec<MemoryCpuWrapper>,
    pub mcs: Vec<MemoryController>,
    pub serviced: ServicedQueue,
    pub trace: Option<TraceLogger>,
    pub engine: Engine<Scheduled>,
}

impl Chip {
    pub fn new(cfg: SimConfig, trace: Option<TraceLogger>) -> Result<Self, ConfigError> {
        let map = MessageMap::new(
            &cfg.noc_networks,
            &cfg.message_header_size,
            &cfg.message_to_network_and_class,
        )?;

        // Sets interleave over banks (and tiles when shared) under
        // set-interleaving policies; the tag array skips those address bits.
        let mut interleave = 1u64;
        if cfg.bank_policy == CacheDataMappingPolicy::SetInterleaving {
            interleave *= cfg.num_l2_banks.max(1) as u64;
        }
        if cfg.tile_policy == CacheDataMappingPolicy::SetInterleaving
            && cfg.l2_sharing_mode == L2SharingMode::FullyShared
        {
            interleave *= cfg.num_tiles as u64;
        }
        let interleave_bits = crate::config::log2_ceil(interleave);

        let tiles: Vec<Tile> = (0..cfg.num_tiles)
            .map(|id| Tile::new(id, &cfg, map.clone()))
            .collect();
        let arbiters: Vec<Arbiter> = (0..cfg.num_tiles)
            .map(|id| {
                Arbiter::new(
                    id,
                    cfg.arbiter_q_size,
                    map.num_networks(),
                    cfg.cores_per_tile(),
                    cfg.num_l2_banks,
                )
            })
            .collect();
        let mut banks = Vec::new();
        for tile in 0..cfg.num_tiles {
            for bank in 0..cfg.num_l2_banks {
                banks.push(L2Bank::new(
                    tile,
                    bank,
                    cfg.size_kb,
                    cfg.line_size,
                    cfg.associativity,
                    cfg.lvrf_ways,
                    interleave_bits,
                    cfg.bank_hit_latency,
                    cfg.bank_miss_latency,
                    cfg.bank_max_outstanding_misses,
                    cfg.trace,
                ));
            }
        }
        let mcpus: Vec<MemoryCpuWrapper> = (0..cfg.num_memory_cpus)
            .map(|id| {
                MemoryCpuWrapper::new(
                    id,
                    cfg.mcpu_line_size,
                    cfg.mcpu_latency,
                    cfg.enable_smart_mcpu,
                    map.clone(),
                )
            })
            .collect();
        let mcs: Vec<MemoryController> = (0..cfg.num_memory_cpus)
            .map(|id| MemoryController::new(id, &cfg))
            .collect();
        let noc = Noc::new(&cfg, map)?;

        Ok(Chip {
            cfg,
            tiles,
            arbiters,
            banks,
            noc,
            mcpus,
            mcs,
            serviced: ServicedQueue::new(),
            trace,
            engine: Engine::new(),
        })
    }

    fn bank_index(&self, tile: u16, bank: u16) -> usize {
        tile as usize * self.cfg.num_l2_banks as usize + bank as usize
    }

    pub fn bank(&self, tile: u16, bank: u16) -> &L2Bank {
        &self.banks[self.bank_index(tile, bank)]
    }

    pub fn bank_mut(&mut self, tile: u16, bank: u16) -> &mut L2Bank {
        let idx = self.bank_index(tile, bank);
        &mut self.banks[idx]
    }

    /// Event-manager entry point: tag the source tile and hand the event to
    /// it right away.
    pub fn put_event(&mut self, mut ev: Event, now: Cycle) {
        let source = ev.core().core / self.cfg.cores_per_tile();
        ev.core_mut().source_tile = source;
        let actions = self.tiles[source as usize].put_event(ev, now, &mut self.trace);
        self.exec_tile_actions(source, actions, now);
    }

    pub fn notify_ack(&mut self, ev: Event) {
        self.serviced.push(ev);
    }

    /// Run every engine item due at or before `tick`. Items scheduled while
    /// draining stay in this pass when they are due.
    pub fn advance_to(&mut self, tick: Cycle) {
        while let Some((t, item)) = self.engine.pop_due(tick) {
            self.process(item, t);
        }
    }

    /// One arbitration round on every tile: NoC injection and bank issue.
    pub fn schedule_arbiter(&mut self, now: Cycle) {
        for tile in 0..self.tiles.len() {
            self.arbiters[tile].submit_to_noc(&mut self.noc, now);
            let mut grants = Vec::new();
            self.arbiters[tile].submit_to_l2(&mut grants);
            let latency = self.tiles[tile].latency;
            for (bank, ev) in grants {
                self.engine.schedule(
                    now + latency,
                    Scheduled::BankAccess {
                        tile: tile as u16,
                        bank,
                        ev,
                    },
                );
            }
        }
    }

    /// One NoC ejection round. Returns true while the NoC still holds
    /// packets, so the caller keeps the clock at 1-cycle granularity.
    pub fn noc_tick(&mut self, now: Cycle) -> bool {
        let mut deliveries = Vec::new();
        let mcpus = &self.mcpus;
        let more = self.noc.deliver_one_packet_to_destination(
            now,
            &mut |mem, msg| mcpus[mem as usize].able_to_receive_packet(msg),
            &mut deliveries,
        );
        // Ejection happens one cycle after the packet latency elapses.
        for delivery in deliveries {
            match delivery {
                Delivery::ToTile(tile, msg) => {
                    self.engine.schedule(now + 1, Scheduled::TileNoc { tile, msg })
                }
                Delivery::ToMem(mem, msg) => {
                    self.engine.schedule(now + 1, Scheduled::MemNoc { mem, msg })
                }
            }
        }
        more
    }

    pub fn has_msg_in_arbiter(&self) -> bool {
        self.arbiters
            .iter()
            .any(|a| a.has_noc_msg_in_network() || a.has_cache_request_in_network())
    }

    pub fn has_arbiter_queue_free_slot(&self, core: u16) -> bool {
        self.arbiters
            .iter()
            .zip(&self.tiles)
            .any(|(a, t)| a.has_arbiter_queue_free_slot(t.id, core))
    }

    fn exec_tile_actions(&mut self, tile: u16, actions: Vec<TileAction>, now: Cycle) {
        for action in actions {
            match action {
                TileAction::SubmitArbiter { msg, delay } => {
                    if let ArbiterMessage::Noc { msg, .. } = &msg {
                        self.trace_noc(msg, now);
                    }
                    self.engine
                        .schedule(now + delay, Scheduled::ArbiterSubmit { tile, msg });
                }
                TileAction::BankAck { bank, req } => {
                    self.engine
                        .schedule(now + 1, Scheduled::BankFill { tile, bank, req });
                }
                TileAction::NotifyAck(ev) => self.serviced.push(ev),
                TileAction::ScheduleInsnLatency(ev) => {
                    let due = ev.avail_cycle.max(now);
                    self.engine
                        .schedule(due, Scheduled::InsnLatencyReady { tile, ev });
                }
            }
        }
    }

    fn exec_bank_actions(&mut self, tile: u16, bank: u16, actions: Vec<BankAction>, now: Cycle) {
        for action in actions {
            match action {
                BankAction::Ack { ev, delay } => {
                    self.engine
                        .schedule(now + delay, Scheduled::BankAckAttempt { tile, bank, ev });
                }
                BankAction::McRequest { req, delay } => {
                    let action = self.tiles[tile as usize].bank_memory_request(req, bank);
                    self.exec_tile_actions(tile, vec![action], now + delay);
                }
            }
        }
    }

    fn exec_mcpu_actions(&mut self, mem: u16, actions: Vec<McpuAction>, now: Cycle) {
        for action in actions {
            match action {
                McpuAction::ScheduleIncoming(d) => {
                    self.engine.schedule(now + d, Scheduled::McpuIncoming { mem })
                }
                McpuAction::ScheduleOutgoing(d) => {
                    self.engine.schedule(now + d, Scheduled::McpuOutgoing { mem })
                }
                McpuAction::ScheduleMemReq(d) => {
                    self.engine.schedule(now + d, Scheduled::McpuMemReq { mem })
                }
                McpuAction::ForwardToMc(req) => {
                    if self.mcs[mem as usize].accept(req, now) {
                        self.engine.schedule(now + 1, Scheduled::McIssue { mem });
                    }
                }
                McpuAction::ForwardToNoc(msg) => {
                    self.trace_noc(&msg, now);
                    self.noc.handle_message_from_memory_cpu(msg, now);
                }
            }
        }
    }

    fn trace_noc(&mut self, msg: &NocMessage, now: Cycle) {
        let Some(t) = self.trace.as_mut() else { return };
        // Memory endpoints share the id space after the tiles.
        let offset = match msg.ty {
            NocMessageType::MemoryRequestLoad
            | NocMessageType::MemoryRequestStore
            | NocMessageType::MemoryRequestWb
            | NocMessageType::McpuRequest => self.cfg.num_tiles as u64,
            _ => 0,
        };
        let core = msg.payload.core().core;
        let pc = msg.payload.core().pc;
        t.noc_dst(now, core, pc, msg.dst_port as u64 + offset);
        t.noc_src(now, core, pc, msg.src_port as u64 + offset);
    }

    pub fn process(&mut self, item: Scheduled, now: Cycle) {
        match item {
            Scheduled::TileEvent { tile, ev } => {
                let actions = self.tiles[tile as usize].put_event(ev, now, &mut self.trace);
                self.exec_tile_actions(tile, actions, now);
            }
            Scheduled::ArbiterSubmit { tile, msg } => {
                self.arbiters[tile as usize].submit(msg, now);
            }
            Scheduled::BankAccess { tile, bank, ev } => {
                let idx = self.bank_index(tile, bank);
                if self.banks[idx].get_access(ev, now) {
                    self.engine.schedule(now + 1, Scheduled::BankIssue { tile, bank });
                }
            }
            Scheduled::BankIssue { tile, bank } => {
                // A lookup may need to send something out; hold the issue
                // until the bank's NoC output has room.
                if !self.arbiters[tile as usize].has_l2_noc_queue_free_slot(bank) {
                    self.engine.schedule(now + 1, Scheduled::BankIssue { tile, bank });
                    return;
                }
                let idx = self.bank_index(tile, bank);
                let (actions, reschedule) = self.banks[idx].issue(now, &mut self.trace);
                self.exec_bank_actions(tile, bank, actions, now);
                if reschedule {
                    self.engine.schedule(now + 1, Scheduled::BankIssue { tile, bank });
                }
            }
            Scheduled::BankAckAttempt { tile, bank, ev } => {
                if !self.arbiters[tile as usize].has_l2_noc_queue_free_slot(bank) {
                    self.engine
                        .schedule(now + 1, Scheduled::BankAckAttempt { tile, bank, ev });
                    return;
                }
                let actions = self.tiles[tile as usize].bank_serviced(ev, now, &mut self.trace);
                self.exec_tile_actions(tile, actions, now);
            }
            Scheduled::BankFill { tile, bank, req } => {
                let idx = self.bank_index(tile, bank);
                let actions = self.banks[idx].fill(req, now, &mut self.trace);
                self.exec_bank_actions(tile, bank, actions, now);
            }
            Scheduled::InsnLatencyReady { tile: _, mut ev } => {
                ev.set_serviced();
                self.serviced.push(Event::InsnLatency(ev));
            }
            Scheduled::TileNoc { tile, msg } => {
                let actions = self.tiles[tile as usize].handle_noc_message(msg, now, &mut self.trace);
                self.exec_tile_actions(tile, actions, now);
            }
            Scheduled::MemNoc { mem, msg } => {
                let actions = self.mcpus[mem as usize].receive_noc(msg.payload, now);
                self.exec_mcpu_actions(mem, actions, now);
            }
            Scheduled::McpuIncoming { mem } => {
                let actions = self.mcpus[mem as usize].incoming_tick(now);
                self.exec_mcpu_actions(mem, actions, now);
            }
            Scheduled::McpuOutgoing { mem } => {
                let (msg, next) = self.mcpus[mem as usize].outgoing_tick(now);
                if let Some(msg) = msg {
                    self.trace_noc(&msg, now);
                    self.noc.handle_message_from_memory_cpu(msg, now);
                }
                if let Some(d) = next {
                    self.engine.schedule(now + d, Scheduled::McpuOutgoing { mem });
                }
            }
            Scheduled::McpuMemReq { mem } => {
                let (req, next) = self.mcpus[mem as usize].mem_req_tick(now);
                if let Some(req) = req {
                    if self.mcs[mem as usize].accept(req, now) {
                        self.engine.schedule(now + 1, Scheduled::McIssue { mem });
                    }
                }
                if let Some(d) = next {
                    self.engine.schedule(now + d, Scheduled::McpuMemReq { mem });
                }
            }
            Scheduled::McIssue { mem } => {
                let (issued, reschedule) = self.mcs[mem as usize].issue(now);
                if let Some((req, delay)) = issued {
                    self.engine
                        .schedule(now + delay, Scheduled::McComplete { mem, req });
                }
                if reschedule {
                    self.engine.schedule(now + 1, Scheduled::McIssue { mem });
                }
            }
            Scheduled::McComplete { mem, mut req } => {
                self.mcs[mem as usize].complete(&mut req, now);
                let actions = self.mcpus[mem as usize].receive_mc(req, now);
                self.exec_mcpu_actions(mem, actions, now);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::event::AccessType;

    fn chip(num_tiles: u16, num_cores: u16, banks: u16) -> Chip {
        let mut cfg = SimConfig::for_topology(num_tiles, num_cores, banks);
        cfg.noc_packet_latency = 2;
        Chip::new(cfg, None).unwrap()
    }

    fn drive(chip: &mut Chip, from: Cycle, to: Cycle) {
        for now in from..=to {
            chip.advance_to(now);
            chip.schedule_arbiter(now);
            chip.advance_to(now);
            chip.noc_tick(now);
        }
    }

    #[test]
    fn local_load_round_trip_through_bank_and_memory() {
        let mut chip = chip(1, 1, 1);
        let mut r = CacheRequest::new(0x1000, AccessType::Load, 0x4, 1, 0);
        r.size = 8;
        chip.put_event(Event::Cache(r), 1);

        drive(&mut chip, 1, 400);

        let ev = chip.serviced.pop().expect("the load completes");
        match ev {
            Event::Cache(r) => {
                assert!(r.is_serviced());
                assert_eq!(r.address, 0x1000);
                assert_eq!(r.home_tile, 0);
            }
            other => panic!("unexpected {other:?}"),
        }
        assert_eq!(chip.bank(0, 0).misses, 1);
        assert_eq!(chip.tiles[0].counters.local_requests, 1);
    }

    #[test]
    fn second_load_to_the_same_line_hits() {
        let mut chip = chip(1, 1, 1);
        let r = CacheRequest::new(0x2000, AccessType::Load, 0, 1, 0);
        chip.put_event(Event::Cache(r), 1);
        drive(&mut chip, 1, 400);
        assert!(chip.serviced.pop().is_some());

        let r = CacheRequest::new(0x2008, AccessType::Load, 0, 401, 0);
        chip.put_event(Event::Cache(r), 401);
        drive(&mut chip, 401, 500);
        assert!(chip.serviced.pop().is_some());
        assert_eq!(chip.bank(0, 0).hits, 1);
        assert_eq!(chip.bank(0, 0).misses, 1);
    }

    #[test]
    fn bypass_l2_never_touches_a_bank() {
        let mut chip = chip(1, 1, 1);
        let r = CacheRequest::new(0x3000, AccessType::Load, 0, 1, 0).with_bypass(true, true);
        chip.put_event(Event::Cache(r), 1);
        drive(&mut chip, 1, 400);

        let ev = chip.serviced.pop().expect("the bypass completes");
        assert!(matches!(ev, Event::Cache(r) if r.is_serviced() && r.bypass_l2));
        assert_eq!(chip.bank(0, 0).hits + chip.bank(0, 0).misses, 0);
        assert_eq!(chip.mcs[0].count_requests, 1);
    }

    #[test]
    fn remote_l2_request_and_ack_cross_the_noc() {
        let mut cfg = SimConfig::for_topology(2, 2, 1);
        cfg.l2_sharing_mode = L2SharingMode::FullyShared;
        cfg.noc_packet_latency = 3;
        cfg.x_size = 3;
        let mut chip = Chip::new(cfg, None).unwrap();

        // Bit 6 homes the line at tile 1; core 0 lives on tile 0.
        let r = CacheRequest::new(0x40, AccessType::Load, 0, 1, 0);
        chip.put_event(Event::Cache(r), 1);
        drive(&mut chip, 1, 600);

        let ev = chip.serviced.pop().expect("the remote load completes");
        match ev {
            Event::Cache(r) => {
                assert_eq!(r.home_tile, 1);
                assert_eq!(r.base.source_tile, 0);
                assert!(r.is_serviced());
            }
            other => panic!("unexpected {other:?}"),
        }
        // The miss was counted at the remote tile, not at home.
        assert_eq!(chip.tiles[1].counters.remote_requests, 1);
        assert_eq!(chip.bank(1, 0).misses, 1);
        let ack_net = chip.noc.message_map().network_for(NocMessageType::RemoteL2Ack) as usize;
        assert!(chip.noc.rx_packets[ack_net] > 0);
    }
}
