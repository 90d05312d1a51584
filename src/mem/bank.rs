/*!
L2 cache bank shell.

A bank accepts one access per cycle from the tile arbiter, looks it up in a
set-associative tag array and either acks after the hit latency or allocates
a bank-level miss register and forwards the line request to memory. Misses to
a line that is already outstanding coalesce onto the existing register. The
bank is write-back and write-allocate; a dirty eviction produces a WRITEBACK
request for the memory controller.

The bank can produce more than one ack for a single fill (coalesced misses),
so acks are spread one per cycle and the caller additionally gates each ack
on the arbiter's bank output having space.

Scratchpad accesses hit by definition; they live in the ways reserved through
`lvrf_ways` and never touch the tag array.
*/

use std::collections::{HashMap, VecDeque};

use log::debug;

use crate::config::log2_ceil;
use crate::event::{AccessType, CacheRequest, Cycle, Event};
use crate::trace::TraceLogger;

/// What the bank asks its surroundings to do. The chip turns these into
/// scheduled engine events.
#[derive(Debug)]
pub enum BankAction {
    /// Attempt to send an ack towards the tile after `delay` cycles.
    Ack { ev: Event, delay: u64 },
    /// Forward a missing line (or a writeback) to the memory system.
    McRequest { req: CacheRequest, delay: u64 },
}

#[derive(Debug, Clone, Copy, Default)]
struct Line {
    tag: u64,
    valid: bool,
    dirty: bool,
}

/// Set-associative tag array with per-set LRU replacement.
#[derive(Debug)]
struct TagArray {
    sets: Vec<Vec<Line>>,
    /// Per-set LRU order, most recently used first.
    lru: Vec<Vec<usize>>,
    set_shift: u64,
    set_mask: u64,
}

impl TagArray {
    fn new(num_sets: u64, ways: u64, block_offset_bits: u64, interleave_bits: u64) -> Self {
        assert!(num_sets.is_power_of_two(), "set count must be a power of 2");
        TagArray {
            sets: vec![vec![Line::default(); ways as usize]; num_sets as usize],
            lru: (0..num_sets).map(|_| (0..ways as usize).collect()).collect(),
            set_shift: block_offset_bits + interleave_bits,
            set_mask: num_sets - 1,
        }
    }

    fn index(&self, line_addr: u64) -> usize {
        ((line_addr >> self.set_shift) & self.set_mask) as usize
    }

    fn tag(&self, line_addr: u64) -> u64 {
        line_addr >> self.set_shift
    }

    fn probe(&self, line_addr: u64) -> bool {
        let set = &self.sets[self.index(line_addr)];
        let tag = self.tag(line_addr);
        set.iter().any(|l| l.valid && l.tag == tag)
    }

    fn touch(&mut self, line_addr: u64, write: bool) -> bool {
        let idx = self.index(line_addr);
        let tag = self.tag(line_addr);
        let way = self.sets[idx].iter().position(|l| l.valid && l.tag == tag);
        match way {
            Some(way) => {
                if write {
                    self.sets[idx][way].dirty = true;
                }
                let pos = self.lru[idx].iter().position(|&w| w == way).unwrap();
                let way = self.lru[idx].remove(pos);
                self.lru[idx].insert(0, way);
                true
            }
            None => false,
        }
    }

    /// Allocate a line for `line_addr`, evicting the LRU way. Returns the
    /// evicted line's address and dirtiness when a valid line is displaced.
    /// The stored tag keeps the set bits, so it reconstructs the full line
    /// address on its own.
    fn allocate(&mut self, line_addr: u64, write: bool) -> Option<(u64, bool)> {
        let idx = self.index(line_addr);
        let way = *self.lru[idx].last().unwrap();
        let victim = self.sets[idx][way];
        let evicted = victim
            .valid
            .then(|| (victim.tag << self.set_shift, victim.dirty));
        self.sets[idx][way] = Line {
            tag: self.tag(line_addr),
            valid: true,
            dirty: write,
        };
        let pos = self.lru[idx].iter().position(|&w| w == way).unwrap();
        let way = self.lru[idx].remove(pos);
        self.lru[idx].insert(0, way);
        evicted
    }
}

#[derive(Debug)]
pub struct L2Bank {
    pub tile_id: u16,
    pub bank_id: u16,
    line_size: u64,
    hit_latency: u64,
    miss_latency: u64,
    max_outstanding_misses: usize,
    always_hit: bool,
    track_evictions: bool,

    tags: TagArray,
    input: VecDeque<Event>,
    issue_scheduled: bool,
    /// Outstanding misses keyed by line address. The first request of a line
    /// travelled to memory; the vector holds the coalesced followers.
    mshrs: HashMap<u64, Vec<CacheRequest>>,
    outstanding_wbs: usize,
    eviction_times: HashMap<u64, Cycle>,

    pub hits: u64,
    pub misses: u64,
    total_service_cycles: u64,
    serviced_accesses: u64,
}

impl L2Bank {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        tile_id: u16,
        bank_id: u16,
        size_kb: u64,
        line_size: u64,
        associativity: u64,
        lvrf_ways: u64,
        interleave_bits: u64,
        hit_latency: u64,
        miss_latency: u64,
        max_outstanding_misses: u16,
        track_evictions: bool,
    ) -> Self {
        let ways = associativity - lvrf_ways;
        let num_sets = (size_kb * 1024) / (associativity * line_size);
        debug!(
            "l2 bank {tile_id}.{bank_id}: {num_sets} sets, {ways} ways, {line_size}B lines"
        );
        L2Bank {
            tile_id,
            bank_id,
            line_size,
            hit_latency,
            miss_latency,
            max_outstanding_misses: max_outstanding_misses as usize,
            always_hit: false,
            track_evictions,
            tags: TagArray::new(num_sets, ways, log2_ceil(line_size), interleave_bits),
            input: VecDeque::new(),
            issue_scheduled: false,
            mshrs: HashMap::new(),
            outstanding_wbs: 0,
            eviction_times: HashMap::new(),
            hits: 0,
            misses: 0,
            total_service_cycles: 0,
            serviced_accesses: 0,
        }
    }

    /// Make every lookup hit, for unit testing the surrounding plumbing.
    pub fn set_always_hit(&mut self, always_hit: bool) {
        self.always_hit = always_hit;
    }

    fn line_addr(&self, addr: u64) -> u64 {
        addr & !(self.line_size - 1)
    }

    /// Accept an access from the arbiter. Returns true when the caller must
    /// schedule an issue tick (one is pending at a time).
    pub fn get_access(&mut self, mut ev: Event, now: Cycle) -> bool {
        ev.core_mut().mark_reach_cache_bank(now);
        self.input.push_back(ev);
        !std::mem::replace(&mut self.issue_scheduled, true)
    }

    /// Issue one access into the lookup pipeline. The caller has already
    /// checked the arbiter's bank output for space. Returns the resulting
    /// actions and whether another issue tick is needed.
    pub fn issue(&mut self, now: Cycle, trace: &mut Option<TraceLogger>) -> (Vec<BankAction>, bool) {
        let mut actions = Vec::new();
        let Some(ev) = self.input.front() else {
            self.issue_scheduled = false;
            return (actions, false);
        };

        // A new miss needs a free miss register; leave the access queued
        // until one drains.
        if let Event::Cache(r) = ev {
            let line = self.line_addr(r.address);
            let would_allocate = r.ty != AccessType::Writeback
                && !self.always_hit
                && !self.tags.probe(line)
                && !self.mshrs.contains_key(&line);
            if would_allocate && self.mshrs.len() >= self.max_outstanding_misses {
                return (actions, true);
            }
        }

        let ev = self.input.pop_front().unwrap();
        match ev {
            Event::Scratchpad(mut s) => {
                s.set_serviced();
                actions.push(BankAction::Ack {
                    ev: Event::Scratchpad(s),
                    delay: self.hit_latency,
                });
            }
            Event::Cache(mut r) => {
                self.log_access(&r, now, trace);
                let line = self.line_addr(r.address);
                let write = matches!(r.ty, AccessType::Store | AccessType::Writeback);
                let hit = self.always_hit || self.tags.touch(line, write);
                if hit {
                    self.hits += 1;
                    self.serviced_accesses += 1;
                    self.total_service_cycles += self.hit_latency;
                    if let Some(t) = trace {
                        t.l2_hit(now, r.base.core, r.base.pc, r.address);
                    }
                    r.set_serviced();
                    actions.push(BankAction::Ack {
                        ev: Event::Cache(r),
                        delay: self.hit_latency,
                    });
                } else {
                    self.misses += 1;
                    if let Some(t) = trace {
                        t.l2_miss(now, r.base.core, r.base.pc, r.address);
                        if let Some(evicted_at) = self.eviction_times.remove(&line) {
                            t.miss_on_evicted(now, r.base.core, r.base.pc, r.address, now - evicted_at);
                        }
                    }
                    if r.ty == AccessType::Writeback {
                        // No allocation on the way out; the line travels to
                        // memory and the ack returns through the fill path.
                        self.outstanding_wbs += 1;
                        actions.push(BankAction::McRequest {
                            req: r,
                            delay: self.miss_latency,
                        });
                    } else if let Some(waiters) = self.mshrs.get_mut(&line) {
                        waiters.push(r);
                    } else {
                        self.mshrs.insert(line, Vec::new());
                        actions.push(BankAction::McRequest {
                            req: r,
                            delay: self.miss_latency,
                        });
                    }
                }
            }
            other => panic!("bank cannot service a {} event", other.kind_name()),
        }

        let reschedule = !self.input.is_empty();
        self.issue_scheduled = reschedule;
        (actions, reschedule)
    }

    /// Complete a miss or a writeback whose memory ack returned. Reloads the
    /// line, acks the original request and every coalesced follower (one
    /// cycle apart), and emits a writeback for a displaced dirty line.
    pub fn fill(&mut self, mut req: CacheRequest, now: Cycle, trace: &mut Option<TraceLogger>) -> Vec<BankAction> {
        let mut actions = Vec::new();
        let line = self.line_addr(req.address);
        let waiters = if req.ty == AccessType::Writeback {
            // Evicted-line writebacks ack through here too and never held a
            // register.
            self.outstanding_wbs = self.outstanding_wbs.saturating_sub(1);
            Vec::new()
        } else {
            self.mshrs.remove(&line).unwrap_or_default()
        };

        self.serviced_accesses += 1;
        self.total_service_cycles += now.saturating_sub(req.base.reach_cache_bank());

        if req.ty != AccessType::Writeback {
            let write = req.ty == AccessType::Store;
            if let Some((evicted_addr, dirty)) = self.tags.allocate(line, write) {
                if self.track_evictions {
                    self.eviction_times.insert(evicted_addr, now);
                }
                if dirty {
                    if let Some(t) = trace {
                        t.l2_wb(now, 0, 0, evicted_addr, self.line_size);
                    }
                    let mut wb = CacheRequest::writeback(evicted_addr);
                    wb.size = self.line_size as u32;
                    wb.base.core = req.base.core;
                    wb.cache_bank = self.bank_id;
                    actions.push(BankAction::McRequest { req: wb, delay: 1 });
                }
            }
        }

        req.set_serviced();
        actions.push(BankAction::Ack {
            ev: Event::Cache(req),
            delay: 0,
        });
        for (i, mut waiter) in waiters.into_iter().enumerate() {
            waiter.set_serviced();
            actions.push(BankAction::Ack {
                ev: Event::Cache(waiter),
                delay: 1 + i as u64,
            });
        }
        actions
    }

    fn log_access(&self, r: &CacheRequest, now: Cycle, trace: &mut Option<TraceLogger>) {
        let Some(t) = trace else { return };
        match r.ty {
            AccessType::Fetch | AccessType::Load => {
                t.l2_read(now, r.base.core, r.base.pc, r.address, r.size as u64)
            }
            AccessType::Store | AccessType::Writeback => {
                t.l2_write(now, r.base.core, r.base.pc, r.address, r.size as u64)
            }
        }
    }

    pub fn outstanding_misses(&self) -> usize {
        self.mshrs.len()
    }

    pub fn has_pending_input(&self) -> bool {
        !self.input.is_empty()
    }

    pub fn avg_latency(&self) -> f64 {
        if self.serviced_accesses == 0 {
            0.0
        } else {
            self.total_service_cycles as f64 / self.serviced_accesses as f64
        }
    }
}
