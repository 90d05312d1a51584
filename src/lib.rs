#![doc = r#"
Tilesim library crate.

A cycle-level architectural simulator for a tiled manycore processor with a
vector-capable memory subsystem. The functional ISA emulator is an external
collaborator reached through the `sim::FrontEnd` trait; this crate models
time: caches, tile arbiters, the on-chip network and the memory tiles.

Modules:
- config: dotted-path parameter tree and the validated `SimConfig`
- error: typed configuration and simulation errors
- event: the closed event taxonomy and its visitor dispatch
- mem: tiles, access directors, arbiters, L2 banks, memory controllers and
  the memory-CPU wrapper
- noc: message tables and the functional/mesh/detailed network back ends
- sim: the discrete-event engine, the chip assembly and the orchestrator
- trace: the newline-delimited execution trace writer

In tests, a scripted front end and event builders are available under
`crate::test_utils`.
"#]

pub mod config;
pub mod error;
pub mod event;
pub mod mem;
pub mod noc;
pub mod sim;
pub mod trace;

// Re-export the types most consumers touch at the crate root.
pub use config::{ParamTree, SimConfig};
pub use error::{ConfigError, SimError};
pub use sim::{Chip, ExecutionDrivenOrchestrator, FrontEnd};

// Shared test utilities (only compiled for tests)
#[cfg(test)]
pub mod test_utils;
