/*!
Memory-CPU wrapper: the smart side of a memory tile.

Translates vector memory instructions into line-granular memory requests and
scratchpad control messages, and tracks each in-flight instruction in a
transaction table keyed by a compact instruction id. Id 0 is reserved for
bypass traffic: when the wrapper is disabled, cache requests pass straight
through to the memory controller and replies pass straight back to the NoC.

Internally the wrapper runs three single-item-per-cycle buses with a
configurable latency, one each for incoming transactions, outgoing NoC
messages and memory requests.
*/

use std::collections::{HashMap, VecDeque};

use log::debug;

use crate::event::{
    AccessType, CacheRequest, Cycle, Event, McpuInstruction, McpuOp, McpuSubOp, RegKind,
    ScratchpadCommand, ScratchpadRequest,
};
use crate::noc::message::{MessageMap, NocMessage, NocMessageType};

/// Each register can hold at most 16KB in the scratchpad; with 8B elements
/// that bounds the grantable vector length.
const MAX_VVL: u64 = 2048;

/// Incoming queue depth the NoC may fill before ejection is deferred.
const RECEIVE_CAPACITY: usize = 16;

/// A FIFO drained one item per cycle, with a latency before the first drain.
#[derive(Debug)]
pub struct LatencyBus<T> {
    queue: VecDeque<T>,
    latency: u64,
    tick_pending: bool,
}

impl<T> LatencyBus<T> {
    fn new(latency: u64) -> Self {
        LatencyBus {
            queue: VecDeque::new(),
            latency,
            tick_pending: false,
        }
    }

    /// Push an item; returns the delay at which to schedule a drain tick if
    /// none is pending.
    fn push(&mut self, item: T) -> Option<u64> {
        self.queue.push_back(item);
        (!std::mem::replace(&mut self.tick_pending, true)).then_some(self.latency)
    }

    /// Pop one item on a drain tick; returns the delay for the next tick if
    /// items remain.
    fn drain_one(&mut self) -> (Option<T>, Option<u64>) {
        let item = self.queue.pop_front();
        if self.queue.is_empty() {
            self.tick_pending = false;
            (item, None)
        } else {
            (item, Some(1))
        }
    }

    pub fn len(&self) -> usize {
        self.queue.len()
    }

    pub fn is_empty(&self) -> bool {
        self.queue.is_empty()
    }
}

/// What the wrapper asks the chip to do.
#[derive(Debug)]
pub enum McpuAction {
    ScheduleIncoming(u64),
    ScheduleOutgoing(u64),
    ScheduleMemReq(u64),
    /// Disabled-wrapper bypass: hand the request to the controller now.
    ForwardToMc(CacheRequest),
    /// Disabled-wrapper bypass: hand the reply to the NoC now.
    ForwardToNoc(NocMessage),
}

#[derive(Debug)]
struct Transaction {
    instruction: McpuInstruction,
    /// Memory replies still owed.
    counter_cache_requests: u32,
    /// Scratchpad replies still owed to the source tile.
    counter_scratchpad_requests: u32,
    /// Memory replies folded into one scratchpad reply.
    elements_per_response: u32,
}

#[derive(Debug)]
pub struct MemoryCpuWrapper {
    pub id: u16,
    line_size: u64,
    enabled: bool,
    vvl: u64,
    instruction_id_counter: u32,
    /// Bit per vector register: already allocated in the source tile's
    /// scratchpad.
    sp_regs: u64,
    transactions: HashMap<u32, Transaction>,
    map: MessageMap,

    sched_incoming: LatencyBus<Event>,
    sched_outgoing: LatencyBus<NocMessage>,
    sched_mem_req: LatencyBus<CacheRequest>,

    pub count_requests_noc: u64,
    pub count_load: u64,
    pub count_store: u64,
    pub count_requests_mc: u64,
}

impl MemoryCpuWrapper {
    pub fn new(id: u16, line_size: u64, latency: u64, enabled: bool, map: MessageMap) -> Self {
        debug!("memory tile {id} is {}", if enabled { "enabled" } else { "disabled" });
        MemoryCpuWrapper {
            id,
            line_size,
            enabled,
            vvl: 0,
            instruction_id_counter: 1,
            sp_regs: 0,
            transactions: HashMap::new(),
            map,
            sched_incoming: LatencyBus::new(latency),
            sched_outgoing: LatencyBus::new(latency),
            sched_mem_req: LatencyBus::new(latency),
            count_requests_noc: 0,
            count_load: 0,
            count_store: 0,
            count_requests_mc: 0,
        }
    }

    pub fn granted_vvl(&self) -> u64 {
        self.vvl
    }

    pub fn has_work(&self) -> bool {
        !self.sched_incoming.is_empty()
            || !self.sched_outgoing.is_empty()
            || !self.sched_mem_req.is_empty()
            || !self.transactions.is_empty()
    }

    /// Admission check the NoC runs before ejecting a packet to this tile.
    /// The wrapper inspects the head packet without receiving it.
    pub fn able_to_receive_packet(&self, msg: &NocMessage) -> bool {
        match msg.payload {
            Event::Cache(_) => self.sched_mem_req.len() < RECEIVE_CAPACITY,
            _ => self.sched_incoming.len() < RECEIVE_CAPACITY,
        }
    }

    /// A packet ejected from the NoC for this memory tile.
    pub fn receive_noc(&mut self, payload: Event, _now: Cycle) -> Vec<McpuAction> {
        let mut actions = Vec::new();
        if self.enabled {
            self.count_requests_noc += 1;
        }
        match payload {
            Event::Cache(r) => {
                if self.enabled {
                    if let Some(d) = self.sched_mem_req.push(r) {
                        actions.push(McpuAction::ScheduleMemReq(d));
                    }
                } else {
                    actions.push(McpuAction::ForwardToMc(r));
                }
            }
            Event::McpuSetVvl(mut v) => {
                assert!(self.enabled, "a disabled memory tile cannot grant a VVL");
                self.vvl = MAX_VVL.min(v.avl);
                v.vvl = self.vvl;
                v.set_serviced();
                let dst = v.base.source_tile;
                let msg = NocMessage::new(
                    Event::McpuSetVvl(v),
                    NocMessageType::McpuRequest,
                    self.line_size as u32,
                    self.id,
                    dst,
                    &self.map,
                );
                if let Some(d) = self.sched_outgoing.push(msg) {
                    actions.push(McpuAction::ScheduleOutgoing(d));
                }
            }
            Event::McpuInstruction(mut i) => {
                assert!(self.enabled, "a disabled memory tile cannot expand instructions");
                match i.operation {
                    McpuOp::Load => self.count_load += 1,
                    McpuOp::Store => self.count_store += 1,
                }
                i.base.id = self.instruction_id_counter;
                self.transactions.insert(
                    i.base.id,
                    Transaction {
                        instruction: i.clone(),
                        counter_cache_requests: 0,
                        counter_scratchpad_requests: 0,
                        elements_per_response: 1,
                    },
                );
                // 0 stays reserved for bypass traffic across the wrap.
                self.instruction_id_counter = self.instruction_id_counter.wrapping_add(1).max(1);
                if let Some(d) = self.sched_incoming.push(Event::McpuInstruction(i)) {
                    actions.push(McpuAction::ScheduleIncoming(d));
                }
            }
            Event::Scratchpad(s) => {
                assert!(self.enabled, "a disabled memory tile cannot track scratchpad replies");
                if let Some(d) = self.sched_incoming.push(Event::Scratchpad(s)) {
                    actions.push(McpuAction::ScheduleIncoming(d));
                }
            }
            other => panic!("memory tile cannot receive a {} event", other.kind_name()),
        }
        actions
    }

    /// Drain one incoming transaction.
    pub fn incoming_tick(&mut self, _now: Cycle) -> Vec<McpuAction> {
        let mut actions = Vec::new();
        let (item, next) = self.sched_incoming.drain_one();
        if let Some(d) = next {
            actions.push(McpuAction::ScheduleIncoming(d));
        }
        match item {
            None => {}
            Some(Event::McpuInstruction(i)) => match i.operation {
                McpuOp::Load => {
                    if self.sp_regs & (1 << i.reg.reg) == 0 {
                        self.sp_regs |= 1 << i.reg.reg;
                        let mut alloc =
                            self.scratchpad_request(&i, ScratchpadCommand::Allocate, i.base.id);
                        alloc.size = (self.vvl * i.width.bytes() as u64) as u32;
                        let dst = i.base.source_tile;
                        let msg = self.scratchpad_command_message(alloc, dst);
                        if let Some(d) = self.sched_outgoing.push(msg) {
                            actions.push(McpuAction::ScheduleOutgoing(d));
                        }
                    }
                    self.compute_mem_req_addresses(&i, &mut actions);
                }
                McpuOp::Store => {
                    // Pull the data out of the vector register file first;
                    // the memory stores go out when it arrives.
                    let mut read = self.scratchpad_request(&i, ScratchpadCommand::Read, i.base.id);
                    read.size = self.line_size as u32;
                    read.operand_ready = true;
                    let dst = i.base.source_tile;
                    let msg = self.scratchpad_command_message(read, dst);
                    if let Some(d) = self.sched_outgoing.push(msg) {
                        actions.push(McpuAction::ScheduleOutgoing(d));
                    }
                }
            },
            Some(Event::Scratchpad(s)) => {
                match s.command {
                    // Management acks may outlive their transaction; nothing
                    // to fan out for them anyway.
                    ScratchpadCommand::Allocate => {}
                    ScratchpadCommand::Free => {
                        // Freeing an unallocated register is a no-op.
                        self.sp_regs &= !(1 << s.reg.reg);
                    }
                    ScratchpadCommand::Read | ScratchpadCommand::Write => {
                        let instruction = self
                            .transactions
                            .get(&s.base.id)
                            .expect("scratchpad reply without a parent instruction")
                            .instruction
                            .clone();
                        self.compute_mem_req_addresses(&instruction, &mut actions);
                    }
                }
            }
            Some(other) => panic!("unexpected {} on the incoming bus", other.kind_name()),
        }
        actions
    }

    /// Drain one outgoing NoC message. The chip injects it.
    pub fn outgoing_tick(&mut self, _now: Cycle) -> (Option<NocMessage>, Option<u64>) {
        self.sched_outgoing.drain_one()
    }

    /// Drain one memory request towards the controller.
    pub fn mem_req_tick(&mut self, _now: Cycle) -> (Option<CacheRequest>, Option<u64>) {
        self.sched_mem_req.drain_one()
    }

    /// A completed request returning from the memory controller.
    pub fn receive_mc(&mut self, req: CacheRequest, _now: Cycle) -> Vec<McpuAction> {
        let mut actions = Vec::new();
        if !self.enabled {
            actions.push(McpuAction::ForwardToNoc(self.memory_ack_message(req)));
            return actions;
        }

        self.count_requests_mc += 1;
        if req.base.id == 0 {
            // Bypass traffic: the cache line is for a tile, not for us.
            let msg = self.memory_ack_message(req);
            if let Some(d) = self.sched_outgoing.push(msg) {
                actions.push(McpuAction::ScheduleOutgoing(d));
            }
            return actions;
        }

        let (reply, done) = {
            let t = self
                .transactions
                .get_mut(&req.base.id)
                .expect("memory reply without a parent instruction");
            t.counter_cache_requests -= 1;
            let emit = matches!(req.ty, AccessType::Fetch | AccessType::Load)
                && t.counter_cache_requests % t.elements_per_response == 0;
            if emit {
                t.counter_scratchpad_requests = t.counter_scratchpad_requests.saturating_sub(1);
            }
            let reply = emit.then(|| (t.instruction.clone(), t.counter_scratchpad_requests == 0));
            (reply, t.counter_cache_requests == 0)
        };

        if let Some((instruction, operand_ready)) = reply {
            let mut write =
                self.scratchpad_request(&instruction, ScratchpadCommand::Write, req.base.id);
            write.size = self.line_size as u32;
            write.set_serviced();
            write.operand_ready = operand_ready;
            let dst = instruction.base.source_tile;
            let msg = self.scratchpad_command_message(write, dst);
            if let Some(d) = self.sched_outgoing.push(msg) {
                actions.push(McpuAction::ScheduleOutgoing(d));
            }
        }

        if done {
            self.transactions.remove(&req.base.id);
        }
        actions
    }

    fn compute_mem_req_addresses(&mut self, instr: &McpuInstruction, actions: &mut Vec<McpuAction>) {
        match instr.sub_operation {
            McpuSubOp::Unit => self.mem_op_unit(instr, actions),
            McpuSubOp::NonUnit | McpuSubOp::OrderedIndex | McpuSubOp::UnorderedIndex => {
                // Ordered and unordered indices produce the same traffic;
                // ordering only surfaces in the operand-ready contract.
                self.mem_op_indexed(instr, actions)
            }
        }
    }

    /// Unit stride: contiguous whole lines.
    fn mem_op_unit(&mut self, instr: &McpuInstruction, actions: &mut Vec<McpuAction>) {
        let width = instr.width.bytes() as u64;
        let elements_per_request = self.line_size / width;
        let requests = (self.vvl * width).div_ceil(self.line_size) as u32;
        let mut address = instr.base_address;
        let mut remaining = self.vvl as i64;
        while remaining > 0 {
            let memory_request = self.cache_request(address, instr);
            if let Some(d) = self.sched_mem_req.push(memory_request) {
                actions.push(McpuAction::ScheduleMemReq(d));
            }
            remaining -= elements_per_request as i64;
            address += self.line_size;
        }
        let transaction = self.transactions.get_mut(&instr.base.id).unwrap();
        transaction.counter_cache_requests = requests;
        transaction.counter_scratchpad_requests = requests;
        transaction.elements_per_response = 1;
    }

    /// One request per logical element at base + index\[i\].
    fn mem_op_indexed(&mut self, instr: &McpuInstruction, actions: &mut Vec<McpuAction>) {
        for index in &instr.indices {
            let memory_request = self.cache_request(instr.base_address + index, instr);
            if let Some(d) = self.sched_mem_req.push(memory_request) {
                actions.push(McpuAction::ScheduleMemReq(d));
            }
        }
        let elements_per_response = (self.line_size / instr.width.bytes() as u64) as u32;
        let expected = instr.indices.len() as u32;
        let transaction = self.transactions.get_mut(&instr.base.id).unwrap();
        transaction.counter_cache_requests = expected;
        transaction.counter_scratchpad_requests = expected.div_ceil(elements_per_response);
        transaction.elements_per_response = elements_per_response;
    }

    fn cache_request(&self, address: u64, instr: &McpuInstruction) -> CacheRequest {
        let ty = match instr.operation {
            McpuOp::Load => AccessType::Load,
            McpuOp::Store => AccessType::Store,
        };
        let mut r = CacheRequest::new(address, ty, instr.base.pc, instr.base.timestamp, instr.base.core);
        r.reg.set_destination(instr.reg.reg, RegKind::Vector);
        r.produced_by_vector = true;
        r.size = self.line_size as u32;
        r.base.id = instr.base.id;
        r.home_tile = instr.base.source_tile;
        r
    }

    fn scratchpad_request(
        &self,
        instr: &McpuInstruction,
        command: ScratchpadCommand,
        id: u32,
    ) -> ScratchpadRequest {
        let mut s = ScratchpadRequest::new(
            instr.base_address,
            command,
            instr.base.pc,
            instr.base.timestamp,
            instr.base.core,
            self.id,
            instr.reg.reg,
        );
        s.base.id = id;
        s
    }

    fn scratchpad_command_message(&self, s: ScratchpadRequest, dst_tile: u16) -> NocMessage {
        NocMessage::new(
            Event::Scratchpad(s),
            NocMessageType::ScratchpadCommand,
            self.line_size as u32,
            self.id,
            dst_tile,
            &self.map,
        )
    }

    fn memory_ack_message(&self, req: CacheRequest) -> NocMessage {
        let dst = req.home_tile;
        NocMessage::new(
            Event::Cache(req),
            NocMessageType::MemoryAck,
            self.line_size as u32,
            self.id,
            dst,
            &self.map,
        )
    }
}
