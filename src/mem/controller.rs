/*!
Memory controller shell.

Each memory tile owns one controller. The controller accepts line requests,
decodes the DRAM coordinates (rank, bank, row, column) under the configured
address mapping, issues one request per cycle from a FIFO and completes it a
fixed latency later. The only piece of scheduling modelled here is the
per-(rank, bank) open row: a request to a different row pays a penalty and is
stamped `misses-row`/`closes-row` for the latency trace. The full command
scheduler is outside this model.
*/

use std::collections::{HashMap, VecDeque};

use crate::config::{log2_ceil, AddressMappingPolicy, SimConfig};
use crate::event::{CacheRequest, Cycle};

#[derive(Debug)]
pub struct MemoryController {
    pub id: u16,
    latency: u64,
    row_miss_penalty: u64,
    queue: VecDeque<CacheRequest>,
    issue_scheduled: bool,
    open_rows: HashMap<(u64, u64), u64>,

    rank_shift: u64,
    bank_shift: u64,
    row_shift: u64,
    col_shift: u64,
    rank_mask: u64,
    bank_mask: u64,
    row_mask: u64,
    col_mask: u64,

    pub count_requests: u64,
    pub count_row_misses: u64,
    total_service_cycles: u64,
    completed: u64,
}

impl MemoryController {
    pub fn new(id: u16, cfg: &SimConfig) -> Self {
        let mc_shift = log2_ceil(cfg.line_size);
        let (col_shift, bank_shift, rank_shift, row_shift) = match cfg.address_mapping_policy {
            AddressMappingPolicy::OpenPage => {
                let col = mc_shift + log2_ceil(cfg.num_cols_per_bank);
                let bank = col + log2_ceil(cfg.num_banks_per_mc);
                let rank = bank;
                let row = rank + log2_ceil(cfg.num_rows_per_bank);
                (col, bank, rank, row)
            }
            AddressMappingPolicy::ClosePage => {
                let bank = mc_shift + log2_ceil(cfg.num_banks_per_mc);
                let rank = bank;
                let col = rank + log2_ceil(cfg.num_cols_per_bank);
                let row = col + log2_ceil(cfg.num_rows_per_bank);
                (col, bank, rank, row)
            }
        };
        MemoryController {
            id,
            latency: cfg.mc_latency,
            row_miss_penalty: cfg.mc_row_miss_penalty,
            queue: VecDeque::new(),
            issue_scheduled: false,
            open_rows: HashMap::new(),
            rank_shift,
            bank_shift,
            row_shift,
            col_shift,
            rank_mask: 0,
            bank_mask: cfg.num_banks_per_mc.next_power_of_two() - 1,
            row_mask: cfg.num_rows_per_bank.next_power_of_two() - 1,
            col_mask: cfg.num_cols_per_bank.next_power_of_two() - 1,
            count_requests: 0,
            count_row_misses: 0,
            total_service_cycles: 0,
            completed: 0,
        }
    }

    fn field(addr: u64, shift: u64, mask: u64) -> u64 {
        if mask == 0 { 0 } else { (addr >> shift) & mask }
    }

    /// Accept a request. Returns true when the caller must schedule an issue
    /// tick.
    pub fn accept(&mut self, mut req: CacheRequest, now: Cycle) -> bool {
        req.base.mark_reach_mc(now);
        self.count_requests += 1;
        self.queue.push_back(req);
        !std::mem::replace(&mut self.issue_scheduled, true)
    }

    /// Issue one request. Returns the request with its completion delay, and
    /// whether another issue tick is needed.
    pub fn issue(&mut self, now: Cycle) -> (Option<(CacheRequest, u64)>, bool) {
        let Some(mut req) = self.queue.pop_front() else {
            self.issue_scheduled = false;
            return (None, false);
        };
        req.base.mark_mc_issue(now);

        let addr = req.address;
        let rank = Self::field(addr, self.rank_shift, self.rank_mask);
        let bank = Self::field(addr, self.bank_shift, self.bank_mask);
        let row = Self::field(addr, self.row_shift, self.row_mask);
        let col = Self::field(addr, self.col_shift, self.col_mask);
        req.set_memory_access_info(rank, bank, row, col);

        let mut delay = self.latency;
        match self.open_rows.get(&(rank, bank)) {
            Some(open) if *open == row => {}
            Some(_) => {
                req.set_misses_row();
                req.set_closes_row();
                self.count_row_misses += 1;
                delay += self.row_miss_penalty;
            }
            None => {
                req.set_misses_row();
                self.count_row_misses += 1;
                delay += self.row_miss_penalty;
            }
        }
        self.open_rows.insert((rank, bank), row);

        let reschedule = !self.queue.is_empty();
        self.issue_scheduled = reschedule;
        (Some((req, delay)), reschedule)
    }

    /// Finalize a completed request: from here on it is an ack.
    pub fn complete(&mut self, req: &mut CacheRequest, now: Cycle) {
        req.memory_ack = true;
        req.set_serviced();
        req.grow_size_requested_to_memory(req.size.max(1) as u16);
        self.completed += 1;
        self.total_service_cycles += now.saturating_sub(req.base.reach_mc());
    }

    pub fn avg_latency(&self) -> f64 {
        if self.completed == 0 {
            0.0
        } else {
            self.total_service_cycles as f64 / self.completed as f64
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::event::AccessType;

    fn mc() -> MemoryController {
        let mut cfg = SimConfig::for_topology(1, 1, 1);
        cfg.mc_latency = 50;
        cfg.mc_row_miss_penalty = 20;
        MemoryController::new(0, &cfg)
    }

    fn req(addr: u64) -> CacheRequest {
        CacheRequest::new(addr, AccessType::Load, 0, 0, 0)
    }

    #[test]
    fn first_touch_misses_the_row_then_hits() {
        let mut m = mc();
        assert!(m.accept(req(0x10_0000), 1));
        let (Some((r1, d1)), _) = m.issue(2) else { panic!() };
        assert!(r1.misses_row());
        assert_eq!(d1, 70);

        // Same row again: no penalty.
        m.accept(req(0x10_0040), 3);
        let (Some((r2, d2)), _) = m.issue(4) else { panic!() };
        assert!(!r2.misses_row());
        assert_eq!(d2, 50);
    }

    #[test]
    fn row_change_closes_the_open_row() {
        let mut m = mc();
        m.accept(req(0x0), 0);
        let (Some((_, _)), _) = m.issue(1) else { panic!() };
        // Far address: same (rank, bank) only if bank bits match; address 0
        // and this one differ in row bits with the open-page layout.
        let far = 1u64 << 40;
        m.accept(req(far), 2);
        let (Some((r, _)), _) = m.issue(3) else { panic!() };
        assert!(r.misses_row());
        assert!(r.closes_row());
    }

    #[test]
    fn completion_marks_the_ack() {
        let mut m = mc();
        m.accept(req(0x40), 0);
        let (Some((mut r, d)), _) = m.issue(1) else { panic!() };
        m.complete(&mut r, 1 + d);
        assert!(r.is_serviced());
        assert!(r.memory_ack);
    }

    #[test]
    fn one_issue_per_tick_with_reschedule() {
        let mut m = mc();
        assert!(m.accept(req(0x40), 0));
        assert!(!m.accept(req(0x80), 0));
        let (Some(_), reschedule) = m.issue(1) else { panic!() };
        assert!(reschedule);
        let (Some(_), reschedule) = m.issue(2) else { panic!() };
        assert!(!reschedule);
    }
}
