//! Simulator binary.
//!
//! Reads a JSON parameter tree, assembles the chip and drives the timing
//! model with a small synthetic traffic front end: each core issues a
//! configurable number of strided loads. The real functional ISA emulator
//! attaches through the same `FrontEnd` trait; the synthetic one exists so
//! the timing model can be exercised and profiled standalone.
//!
//! Usage: tilesim [config.json]

use std::fs;
use std::process::ExitCode;

use log::info;

use tilesim::config::{Architecture, ParamTree, SimConfig, SimulationMode};
use tilesim::event::{AccessType, CacheRequest, Cycle, Event, RegKind};
use tilesim::sim::{Chip, ExecutionDrivenOrchestrator, FrontEnd};
use tilesim::trace::TraceLogger;
use tilesim::SimError;

/// Strided-load traffic generator standing in for the ISA emulator.
struct SyntheticFrontEnd {
    instructions_per_core: u64,
    issued: Vec<u64>,
    finished: Vec<bool>,
    stride: u64,
    l1_hits: u64,
}

impl SyntheticFrontEnd {
    fn new(num_cores: u16, instructions_per_core: u64, stride: u64) -> Self {
        SyntheticFrontEnd {
            instructions_per_core,
            issued: vec![0; num_cores as usize],
            finished: vec![false; num_cores as usize],
            stride,
            l1_hits: 0,
        }
    }
}

impl FrontEnd for SyntheticFrontEnd {
    fn simulate_one(&mut self, core: u16, current_cycle: Cycle, events: &mut Vec<Event>) -> bool {
        let n = &mut self.issued[core as usize];
        if *n < self.instructions_per_core {
            let addr = 0x8000_0000 + core as u64 * 0x10_0000 + *n * self.stride;
            let reg = (*n % 31 + 1) as u16;
            let mut r = CacheRequest::new(addr, AccessType::Load, 0x1000 + *n * 4, current_cycle, core)
                .with_destination(reg, RegKind::Integer);
            r.size = 8;
            events.push(Event::Cache(r));
            *n += 1;
        } else if !self.finished[core as usize] {
            self.finished[core as usize] = true;
            events.push(Event::Finish(tilesim::event::Finish::new(0, current_cycle, core)));
        }
        true
    }

    fn ack_register(&mut self, _core: u16, _kind: RegKind, _reg: u16, _cycle: Cycle) -> bool {
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
        _cycle: Cycle,
    ) -> bool {
        true
    }

    fn service_cache_request(&mut self, _request: &CacheRequest, _cycle: Cycle) -> Option<CacheRequest> {
        None
    }

    fn set_vvl(&mut self, _core: u16, _vvl: u64) {}

    fn num_l1_data_hits(&self) -> u64 {
        self.l1_hits
    }
}

fn run() -> Result<(), SimError> {
    let tree = match std::env::args().nth(1) {
        Some(path) => ParamTree::from_json(&fs::read_to_string(path)?)?,
        None => ParamTree::empty(),
    };
    let cfg = SimConfig::from_tree(&tree)?;
    if cfg.architecture != Architecture::Tiled {
        return Err(SimError::FrontEnd(
            "only the tiled assembly is driven by this binary; the unit-test \
             assemblies are exercised through the component tests"
                .into(),
        ));
    }
    if cfg.simulation_mode != SimulationMode::ExecutionDriven {
        return Err(SimError::FrontEnd(
            "trace-driven replay attaches to the same event-input seam but is \
             not part of this binary"
                .into(),
        ));
    }
    info!(
        "assembling {} tiles x {} cores, {} memory cpus, {:?} noc",
        cfg.num_tiles,
        cfg.cores_per_tile(),
        cfg.num_memory_cpus,
        cfg.noc_model
    );

    let trace = if cfg.trace {
        let file = fs::File::create("trace.out")?;
        Some(TraceLogger::new(
            Box::new(std::io::BufWriter::new(file)),
            &cfg.events_to_trace,
            cfg.trace_start_tick,
            cfg.trace_end_tick,
        ))
    } else {
        None
    };

    let instructions = tree.get_u64("synthetic.instructions_per_core", 1000)?;
    let stride = tree.get_u64("synthetic.stride", 64)?;
    let front = SyntheticFrontEnd::new(cfg.num_cores, instructions, stride);

    let chip = Chip::new(cfg, trace)?;
    let mut orchestrator = ExecutionDrivenOrchestrator::new(chip, front);
    orchestrator.run();

    println!("Simulated {} cycles ({} orchestrator iterations)", orchestrator.current_cycle, orchestrator.cycles_executed);
    print!("{}", orchestrator.save_reports());
    if let Some(t) = orchestrator.chip.trace.as_mut() {
        t.flush()?;
    }
    Ok(())
}

fn main() -> ExitCode {
    env_logger::init();
    match run() {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("error: {e}");
            ExitCode::FAILURE
        }
    }
}
