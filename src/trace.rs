/*!
Execution trace writer.

Each record is one newline-delimited line of `cycle,core,pc,kind,a,b`. The
`kind` vocabulary is fixed; `a` and `b` are record-specific (an address, a
bank id, a stall reason). Tracing is off by default and can be restricted to
a cycle window and to a subset of kinds.

This writer is for the cycle-accurate trace consumed by analysis scripts and
by the tests. Diagnostics go through the `log` facade instead.
*/

use std::collections::HashSet;
use std::io::Write;

use crate::event::Cycle;

pub struct TraceLogger {
    out: Box<dyn Write>,
    kinds: Option<HashSet<String>>,
    start_tick: Cycle,
    end_tick: Cycle,
}

impl std::fmt::Debug for TraceLogger {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TraceLogger")
            .field("kinds", &self.kinds)
            .field("start_tick", &self.start_tick)
            .field("end_tick", &self.end_tick)
            .finish()
    }
}

impl TraceLogger {
    pub fn new(out: Box<dyn Write>, kinds: &[String], start_tick: Cycle, end_tick: Cycle) -> Self {
        let kinds = if kinds.is_empty() {
            None
        } else {
            Some(kinds.iter().cloned().collect())
        };
        TraceLogger {
            out,
            kinds,
            start_tick,
            end_tick,
        }
    }

    fn record(&mut self, cycle: Cycle, core: u16, pc: u64, kind: &str, a: u64, b: u64) {
        if cycle < self.start_tick || cycle > self.end_tick {
            return;
        }
        if let Some(kinds) = &self.kinds
            && !kinds.contains(kind)
        {
            return;
        }
        // Trace volume dwarfs everything else; ignore sink errors here and
        // surface them once at flush time.
        let _ = writeln!(self.out, "{cycle},{core},{pc:#x},{kind},{a:#x},{b}");
    }

    pub fn flush(&mut self) -> std::io::Result<()> {
        self.out.flush()
    }

    pub fn l2_read(&mut self, cycle: Cycle, core: u16, pc: u64, addr: u64, size: u64) {
        self.record(cycle, core, pc, "l2_read", addr, size);
    }

    pub fn l2_write(&mut self, cycle: Cycle, core: u16, pc: u64, addr: u64, size: u64) {
        self.record(cycle, core, pc, "l2_write", addr, size);
    }

    pub fn l2_miss(&mut self, cycle: Cycle, core: u16, pc: u64, addr: u64) {
        self.record(cycle, core, pc, "l2_miss", addr, 0);
    }

    pub fn l2_hit(&mut self, cycle: Cycle, core: u16, pc: u64, addr: u64) {
        self.record(cycle, core, pc, "l2_hit", addr, 0);
    }

    pub fn l2_wb(&mut self, cycle: Cycle, core: u16, pc: u64, addr: u64, size: u64) {
        self.record(cycle, core, pc, "l2_wb", addr, size);
    }

    pub fn local_bank_request(&mut self, cycle: Cycle, core: u16, pc: u64, bank: u64, addr: u64) {
        self.record(cycle, core, pc, "local_bank_request", bank, addr);
    }

    pub fn remote_bank_request(&mut self, cycle: Cycle, core: u16, pc: u64, tile: u64, addr: u64) {
        self.record(cycle, core, pc, "remote_bank_request", tile, addr);
    }

    pub fn tile_send_ack(&mut self, cycle: Cycle, core: u16, pc: u64, tile: u64, addr: u64) {
        self.record(cycle, core, pc, "tile_send_ack", tile, addr);
    }

    pub fn noc_src(&mut self, cycle: Cycle, core: u16, pc: u64, src: u64) {
        self.record(cycle, core, pc, "noc_src", src, 0);
    }

    pub fn noc_dst(&mut self, cycle: Cycle, core: u16, pc: u64, dst: u64) {
        self.record(cycle, core, pc, "noc_dst", dst, 0);
    }

    pub fn miss_serviced(&mut self, cycle: Cycle, core: u16, pc: u64, addr: u64) {
        self.record(cycle, core, pc, "miss_serviced", addr, 0);
    }

    pub fn miss_on_evicted(&mut self, cycle: Cycle, core: u16, pc: u64, addr: u64, evicted_age: u64) {
        self.record(cycle, core, pc, "miss_on_evicted", addr, evicted_age);
    }

    pub fn stall(&mut self, cycle: Cycle, core: u16, reason: u64) {
        self.record(cycle, core, 0, "stall", reason, 0);
    }

    pub fn resume(&mut self, cycle: Cycle, core: u16, a: u64) {
        self.record(cycle, core, 0, "resume", a, 0);
    }

    /// Per-thousand-instruction heartbeat.
    pub fn ki(&mut self, cycle: Cycle, core: u16) {
        self.record(cycle, core, 0, "ki", 0, 0);
    }
}

/// A logger wired to a shared in-memory sink, for tests.
#[cfg(test)]
pub mod capture {
    use std::io::Write;
    use std::sync::{Arc, Mutex};

    use super::TraceLogger;

    #[derive(Clone, Default)]
    pub struct Sink(Arc<Mutex<Vec<u8>>>);

    impl Sink {
        pub fn lines(&self) -> Vec<String> {
            let buf = self.0.lock().unwrap();
            String::from_utf8_lossy(&buf).lines().map(str::to_string).collect()
        }
    }

    impl Write for Sink {
        fn write(&mut self, data: &[u8]) -> std::io::Result<usize> {
            self.0.lock().unwrap().extend_from_slice(data);
            Ok(data.len())
        }

        fn flush(&mut self) -> std::io::Result<()> {
            Ok(())
        }
    }

    pub fn capturing_logger() -> (TraceLogger, Sink) {
        let sink = Sink::default();
        let logger = TraceLogger::new(Box::new(sink.clone()), &[], 0, u64::MAX);
        (logger, sink)
    }
}

#[cfg(test)]
mod tests {
    use super::capture::capturing_logger;
    use super::*;

    #[test]
    fn records_have_the_documented_shape() {
        let (mut log, sink) = capturing_logger();
        log.l2_miss(42, 1, 0x8000_0010, 0x1000);
        let lines = sink.lines();
        assert_eq!(lines, vec!["42,1,0x8000010,l2_miss,0x1000,0"]);
    }

    #[test]
    fn window_and_kind_filters_apply() {
        let sink = capture::Sink::default();
        let mut log = TraceLogger::new(Box::new(sink.clone()), &["stall".to_string()], 10, 20);
        log.stall(5, 0, 1);
        log.stall(15, 0, 1);
        log.resume(15, 0, 0);
        log.stall(25, 0, 1);
        assert_eq!(sink.lines().len(), 1);
    }
}
