/*!
Tile: the entry and exit point of the timing model.

A tile groups cores, L2 banks, an access director and an arbiter. The tile
itself is thin: it receives events from the event manager and messages from
the NoC, tags what needs tagging, and routes everything through its access
director. Vector events (MCPU instructions and VVL requests) do not touch the
local memory system; they are wrapped for the tile's corresponding memory CPU
and injected through the arbiter.

The chip owns tiles, arbiters and banks in parallel vectors; a tile never
holds a reference to its siblings, it only emits `TileAction`s.
*/

use crate::config::SimConfig;
use crate::event::{CacheRequest, Cycle, Event};
use crate::noc::message::{MessageMap, NocMessage, NocMessageType};
use crate::trace::TraceLogger;

use super::arbiter::ArbiterMessage;
use super::director::{AccessDirector, TileAction, TileCounters};

#[derive(Debug)]
pub struct Tile {
    pub id: u16,
    pub num_cores: u16,
    pub num_l2_banks: u16,
    pub num_tiles: u16,
    /// Cycles to reach a local cache bank from the arbiter.
    pub latency: u64,
    /// The memory CPU handling this tile's vector traffic.
    pub corresponding_mcpu: u16,
    pub counters: TileCounters,
    pub director: AccessDirector,
}

impl Tile {
    pub fn new(id: u16, cfg: &SimConfig, map: MessageMap) -> Self {
        Tile {
            id,
            num_cores: cfg.cores_per_tile(),
            num_l2_banks: cfg.num_l2_banks,
            num_tiles: cfg.num_tiles,
            latency: cfg.local_bank_latency,
            corresponding_mcpu: cfg.mcpu_for_tile(id),
            counters: TileCounters::default(),
            director: AccessDirector::new(id, cfg, map),
        }
    }

    /// Entry point for events coming from the event manager.
    pub fn put_event(
        &mut self,
        ev: Event,
        now: Cycle,
        trace: &mut Option<TraceLogger>,
    ) -> Vec<TileAction> {
        match ev {
            Event::Cache(_) | Event::Scratchpad(_) => {
                self.director.put_access(ev, &mut self.counters, now, trace)
            }
            Event::McpuSetVvl(_) | Event::McpuInstruction(_) => {
                let core = ev.core().core;
                let msg = self
                    .director
                    .mcpu_request_message(ev, self.corresponding_mcpu);
                vec![TileAction::SubmitArbiter {
                    msg: ArbiterMessage::Noc {
                        msg,
                        is_core: true,
                        id: core,
                    },
                    delay: 0,
                }]
            }
            Event::InsnLatency(l) => vec![TileAction::ScheduleInsnLatency(l)],
            other => panic!("a {} event cannot enter a tile", other.kind_name()),
        }
    }

    /// A message ejected by the NoC for this tile.
    pub fn handle_noc_message(
        &mut self,
        msg: NocMessage,
        now: Cycle,
        trace: &mut Option<TraceLogger>,
    ) -> Vec<TileAction> {
        match msg.ty {
            NocMessageType::RemoteL2Request
            | NocMessageType::RemoteL2Ack
            | NocMessageType::MemoryAck
            | NocMessageType::ScratchpadCommand => {
                self.director
                    .put_access(msg.payload, &mut self.counters, now, trace)
            }
            // The serviced reply to a VVL negotiation.
            NocMessageType::McpuRequest => vec![TileAction::NotifyAck(msg.payload)],
            other => panic!("tile {} cannot handle a {} message", self.id, other.name()),
        }
    }

    /// A bank finished an access; the result flows back through the
    /// director's serviced path.
    pub fn bank_serviced(
        &mut self,
        ev: Event,
        now: Cycle,
        trace: &mut Option<TraceLogger>,
    ) -> Vec<TileAction> {
        self.director.put_access(ev, &mut self.counters, now, trace)
    }

    /// A bank miss travels out to the memory system.
    pub fn bank_memory_request(&mut self, req: CacheRequest, bank: u16) -> TileAction {
        let msg = self.director.memory_request_message(req);
        TileAction::SubmitArbiter {
            msg: ArbiterMessage::Noc {
                msg,
                is_core: false,
                id: bank,
            },
            delay: 0,
        }
    }
}
