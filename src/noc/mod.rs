/*!
NoC module: the interconnect between tiles and memory CPUs.

Overview
- `message`: message types, the (network, class) table, `NocMessage`.
- `mesh`: coordinate assignment and hop-based latency for the simple model.
- `detailed`: the plug-in seam for an external network simulator.
- This module: the `Noc` front end shared by all back ends. It owns the
  per-network, per-destination delivery queues, the rx/tx and per-type
  counters, and the injection/ejection contract:
    * `handle_message_from_tile` / `handle_message_from_memory_cpu` admit a
      packet, pick its delivery cycle via the back end and queue it;
    * `deliver_one_packet_to_destination` ejects at most one eligible packet
      per (network, destination) per call, deferring memory-bound packets the
      wrapper refuses to accept.

Direction checks are hard invariants: a message type that cannot legally be
injected from the given endpoint kind aborts the simulation.
*/

pub mod detailed;
pub mod mesh;
pub mod message;

use std::collections::VecDeque;

use crate::config::{NocModel, SimConfig};
use crate::error::ConfigError;
use crate::event::Cycle;

use detailed::DetailedInterconnect;
use mesh::MeshGeometry;
use message::{MessageMap, NocMessage, NocMessageType, NOC_MESSAGE_TYPE_COUNT};

/// A packet leaving the NoC, addressed to an endpoint.
#[derive(Debug)]
pub enum Delivery {
    ToTile(u16, NocMessage),
    ToMem(u16, NocMessage),
}

#[derive(Debug)]
enum Backend {
    Functional { packet_latency: u64 },
    Mesh(MeshGeometry),
    Detailed(Box<dyn DetailedInterconnect>),
}

#[derive(Debug)]
pub struct Noc {
    map: MessageMap,
    num_tiles: u16,
    num_mcpus: u16,
    backend: Backend,
    /// Delivery queues indexed by [network][destination], ordered by the
    /// cycle each packet becomes deliverable.
    tile_queue: Vec<Vec<VecDeque<(NocMessage, Cycle)>>>,
    mem_queue: Vec<Vec<VecDeque<(NocMessage, Cycle)>>>,
    /// Packets received/sent per network.
    pub rx_packets: Vec<u64>,
    pub tx_packets: Vec<u64>,
    /// Packets per message type.
    pub packets_by_type: [u64; NOC_MESSAGE_TYPE_COUNT],
    total_latency_cycles: u64,
    latency_samples: u64,
}

impl Noc {
    pub fn new(cfg: &SimConfig, map: MessageMap) -> Result<Self, ConfigError> {
        let backend = match cfg.noc_model {
            NocModel::Functional => Backend::Functional {
                packet_latency: cfg.noc_packet_latency,
            },
            NocModel::Simple => Backend::Mesh(MeshGeometry::new(
                cfg.x_size,
                cfg.y_size,
                cfg.num_tiles,
                &cfg.mcpus_indices,
                cfg.noc_latency_per_hop,
                map.num_networks(),
            )?),
            NocModel::Detailed => Backend::Detailed(Box::new(
                detailed::FixedLatencyConduit::new(cfg.noc_packet_latency),
            )),
        };
        Ok(Noc::with_backend(cfg, map, backend))
    }

    /// Replace the detailed back end with an actual external integration.
    pub fn set_detailed_backend(&mut self, backend: Box<dyn DetailedInterconnect>) {
        self.backend = Backend::Detailed(backend);
    }

    fn with_backend(cfg: &SimConfig, map: MessageMap, backend: Backend) -> Self {
        let networks = map.num_networks();
        Noc {
            num_tiles: cfg.num_tiles,
            num_mcpus: cfg.num_memory_cpus,
            backend,
            tile_queue: vec![vec![VecDeque::new(); cfg.num_tiles as usize]; networks],
            mem_queue: vec![vec![VecDeque::new(); cfg.num_memory_cpus as usize]; networks],
            rx_packets: vec![0; networks],
            tx_packets: vec![0; networks],
            packets_by_type: [0; NOC_MESSAGE_TYPE_COUNT],
            total_latency_cycles: 0,
            latency_samples: 0,
            map,
        }
    }

    pub fn avg_packet_latency(&self) -> f64 {
        if self.latency_samples == 0 {
            0.0
        } else {
            self.total_latency_cycles as f64 / self.latency_samples as f64
        }
    }

    pub fn message_map(&self) -> &MessageMap {
        &self.map
    }

    /// Whether the injection queue for this packet's network and class has
    /// space. The queue-less back ends always admit.
    pub fn check_space_for_packet(&self, _injected_by_tile: bool, msg: &NocMessage) -> bool {
        match &self.backend {
            Backend::Functional { .. } | Backend::Mesh(_) => true,
            Backend::Detailed(d) => d.has_space(msg),
        }
    }

    fn count(&mut self, msg: &NocMessage) {
        assert!(
            (msg.network as usize) < self.map.num_networks(),
            "network index {} out of range",
            msg.network
        );
        self.rx_packets[msg.network as usize] += 1;
        self.tx_packets[msg.network as usize] += 1;
        self.packets_by_type[msg.ty as usize] += 1;
    }

    fn latency_tile_to(&mut self, msg: &NocMessage, to_mem: bool) -> u64 {
        match &mut self.backend {
            Backend::Functional { packet_latency } => *packet_latency,
            Backend::Mesh(g) => {
                let src = g.tile_coord(msg.src_port);
                let dst = if to_mem {
                    g.mcpu_coord(msg.dst_port)
                } else {
                    g.tile_coord(msg.dst_port)
                };
                g.packet_latency(src, dst, msg.network)
            }
            Backend::Detailed(_) => unreachable!("detailed back end owns packet timing"),
        }
    }

    fn latency_mem_to(&mut self, msg: &NocMessage, to_mem: bool) -> u64 {
        match &mut self.backend {
            Backend::Functional { packet_latency } => *packet_latency,
            Backend::Mesh(g) => {
                let src = g.mcpu_coord(msg.src_port);
                let dst = if to_mem {
                    g.mcpu_coord(msg.dst_port)
                } else {
                    g.tile_coord(msg.dst_port)
                };
                g.packet_latency(src, dst, msg.network)
            }
            Backend::Detailed(_) => unreachable!("detailed back end owns packet timing"),
        }
    }

    /// Admit a packet injected by a tile.
    pub fn handle_message_from_tile(&mut self, msg: NocMessage, now: Cycle) {
        self.count(&msg);
        let to_mem = match msg.ty {
            NocMessageType::RemoteL2Request | NocMessageType::RemoteL2Ack => false,
            NocMessageType::MemoryRequestLoad
            | NocMessageType::MemoryRequestStore
            | NocMessageType::MemoryRequestWb
            | NocMessageType::McpuRequest
            | NocMessageType::ScratchpadAck
            | NocMessageType::ScratchpadDataReply => true,
            other => panic!("unsupported message type {} received from a tile", other.name()),
        };
        if let Backend::Detailed(d) = &mut self.backend {
            d.inject(msg, now);
            return;
        }
        let latency = self.latency_tile_to(&msg, to_mem);
        self.total_latency_cycles += latency;
        self.latency_samples += 1;
        let queue = if to_mem {
            &mut self.mem_queue[msg.network as usize][msg.dst_port as usize]
        } else {
            &mut self.tile_queue[msg.network as usize][msg.dst_port as usize]
        };
        queue.push_back((msg, now + latency));
    }

    /// Admit a packet injected by a memory CPU.
    pub fn handle_message_from_memory_cpu(&mut self, msg: NocMessage, now: Cycle) {
        self.count(&msg);
        let to_mem = match msg.ty {
            NocMessageType::MemoryAck
            | NocMessageType::McpuRequest
            | NocMessageType::ScratchpadCommand => false,
            NocMessageType::MemTileRequest | NocMessageType::MemTileReply => true,
            other => panic!("unsupported message type {} received from a memory CPU", other.name()),
        };
        if let Backend::Detailed(d) = &mut self.backend {
            d.inject(msg, now);
            return;
        }
        let latency = self.latency_mem_to(&msg, to_mem);
        self.total_latency_cycles += latency;
        self.latency_samples += 1;
        let queue = if to_mem {
            &mut self.mem_queue[msg.network as usize][msg.dst_port as usize]
        } else {
            &mut self.tile_queue[msg.network as usize][msg.dst_port as usize]
        };
        queue.push_back((msg, now + latency));
    }

    /// Advance the back end clock. Only the detailed model has one.
    pub fn run_backend_cycles(&mut self, cycles: u64) {
        if let Backend::Detailed(d) = &mut self.backend {
            d.run_cycles(cycles);
        }
    }

    /// Eject at most one eligible packet per (network, destination) into
    /// `out`. `mem_can_accept` is consulted before delivering to a memory
    /// CPU; a refusal defers that destination to the next cycle. Returns
    /// true if any network still holds pending or future packets, meaning
    /// the clock must keep 1-cycle granularity.
    pub fn deliver_one_packet_to_destination(
        &mut self,
        now: Cycle,
        mem_can_accept: &mut dyn FnMut(u16, &NocMessage) -> bool,
        out: &mut Vec<Delivery>,
    ) -> bool {
        if let Backend::Detailed(d) = &mut self.backend {
            while let Some(msg) = d.retire() {
                let delivery = match msg.ty {
                    NocMessageType::RemoteL2Request | NocMessageType::RemoteL2Ack => {
                        Delivery::ToTile(msg.dst_port, msg)
                    }
                    NocMessageType::MemoryAck | NocMessageType::ScratchpadCommand => {
                        Delivery::ToTile(msg.dst_port, msg)
                    }
                    NocMessageType::McpuRequest => {
                        // Direction is encoded by which endpoint kind the
                        // destination names; replies route to tiles.
                        if matches!(msg.payload, crate::event::Event::McpuSetVvl(ref v) if v.is_serviced())
                        {
                            Delivery::ToTile(msg.dst_port, msg)
                        } else {
                            Delivery::ToMem(msg.dst_port, msg)
                        }
                    }
                    _ => Delivery::ToMem(msg.dst_port, msg),
                };
                out.push(delivery);
            }
            return d.packets_in_flight();
        }

        let mut run_next_cycle = false;
        for network in 0..self.map.num_networks() {
            for tile in 0..self.num_tiles as usize {
                let queue = &mut self.tile_queue[network][tile];
                if let Some((_, ready)) = queue.front()
                    && *ready <= now
                {
                    let (msg, _) = queue.pop_front().unwrap();
                    out.push(Delivery::ToTile(tile as u16, msg));
                }
                run_next_cycle |= !queue.is_empty();
            }
            for mem in 0..self.num_mcpus as usize {
                let queue = &mut self.mem_queue[network][mem];
                if let Some((msg, ready)) = queue.front()
                    && *ready <= now
                {
                    // Memory tiles can refuse their next packet without
                    // receiving it; the packet stays at the queue head.
                    if !mem_can_accept(mem as u16, msg) {
                        run_next_cycle = true;
                        continue;
                    }
                    let (msg, _) = queue.pop_front().unwrap();
                    out.push(Delivery::ToMem(mem as u16, msg));
                }
                run_next_cycle |= !queue.is_empty();
            }
        }
        run_next_cycle
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::SimConfig;
    use crate::event::{AccessType, CacheRequest, Event};

    fn noc_with(cfg: &SimConfig) -> Noc {
        Noc::new(cfg, MessageMap::defaults()).unwrap()
    }

    fn remote_request(src: u16, dst: u16, map: &MessageMap) -> NocMessage {
        let req = CacheRequest::new(0x2000, AccessType::Load, 0x44, 5, 0);
        NocMessage::new(Event::Cache(req), NocMessageType::RemoteL2Request, 8, src, dst, map)
    }

    #[test]
    fn functional_latency_is_constant() {
        let mut cfg = SimConfig::for_topology(2, 2, 1);
        cfg.noc_packet_latency = 10;
        let mut noc = noc_with(&cfg);
        let msg = remote_request(0, 1, &MessageMap::defaults());
        noc.handle_message_from_tile(msg, 5);

        let mut out = Vec::new();
        // Not eligible before cycle 15.
        let more = noc.deliver_one_packet_to_destination(14, &mut |_, _| true, &mut out);
        assert!(more);
        assert!(out.is_empty());
        noc.deliver_one_packet_to_destination(15, &mut |_, _| true, &mut out);
        assert!(matches!(out.as_slice(), [Delivery::ToTile(1, _)]));
    }

    #[test]
    fn one_packet_per_destination_per_cycle() {
        let mut cfg = SimConfig::for_topology(2, 2, 1);
        cfg.noc_packet_latency = 1;
        let map = MessageMap::defaults();
        let mut noc = noc_with(&cfg);
        noc.handle_message_from_tile(remote_request(0, 1, &map), 0);
        noc.handle_message_from_tile(remote_request(0, 1, &map), 0);

        let mut out = Vec::new();
        let more = noc.deliver_one_packet_to_destination(10, &mut |_, _| true, &mut out);
        assert_eq!(out.len(), 1);
        assert!(more, "second packet still queued");
        out.clear();
        let more = noc.deliver_one_packet_to_destination(11, &mut |_, _| true, &mut out);
        assert_eq!(out.len(), 1);
        assert!(!more);
    }

    #[test]
    fn refused_memory_delivery_is_deferred() {
        let mut cfg = SimConfig::for_topology(1, 1, 1);
        cfg.noc_packet_latency = 1;
        let map = MessageMap::defaults();
        let mut noc = noc_with(&cfg);
        let req = CacheRequest::new(0x2000, AccessType::Load, 0, 0, 0);
        let msg = NocMessage::new(
            Event::Cache(req),
            NocMessageType::MemoryRequestLoad,
            8,
            0,
            0,
            &map,
        );
        noc.handle_message_from_tile(msg, 0);

        let mut out = Vec::new();
        let more = noc.deliver_one_packet_to_destination(5, &mut |_, _| false, &mut out);
        assert!(out.is_empty());
        assert!(more);
        noc.deliver_one_packet_to_destination(6, &mut |_, _| true, &mut out);
        assert!(matches!(out.as_slice(), [Delivery::ToMem(0, _)]));
    }

    #[test]
    #[should_panic(expected = "unsupported message type")]
    fn wrong_direction_aborts() {
        let cfg = SimConfig::for_topology(1, 1, 1);
        let map = MessageMap::defaults();
        let mut noc = noc_with(&cfg);
        let req = CacheRequest::new(0, AccessType::Load, 0, 0, 0);
        // MEMORY_ACK can only be injected by a memory CPU.
        let msg = NocMessage::new(Event::Cache(req), NocMessageType::MemoryAck, 8, 0, 0, &map);
        noc.handle_message_from_tile(msg, 0);
    }

    #[test]
    fn per_type_and_per_network_counters_track_injections() {
        let mut cfg = SimConfig::for_topology(2, 2, 1);
        cfg.noc_packet_latency = 1;
        let map = MessageMap::defaults();
        let mut noc = noc_with(&cfg);
        noc.handle_message_from_tile(remote_request(0, 1, &map), 0);
        noc.handle_message_from_tile(remote_request(1, 0, &map), 0);
        let network = map.network_for(NocMessageType::RemoteL2Request) as usize;
        assert_eq!(noc.rx_packets[network], 2);
        assert_eq!(noc.packets_by_type[NocMessageType::RemoteL2Request as usize], 2);
    }
}
