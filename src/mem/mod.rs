/*!
Memory-side components.

Modules and responsibilities
- tile: entry/exit point of the timing model; routes through its director.
- director: home-tile/bank mapping and the four-state scratchpad dispatch.
- arbiter: per-tile bounded FIFOs and round-robin injection into NoC and L2.
- bank: L2 bank shell (tag array, miss registers, writebacks).
- controller: memory controller with address decode and open-row tracking.
- mcpu: memory-CPU wrapper expanding vector memory instructions.
*/

pub mod arbiter;
pub mod bank;
pub mod controller;
pub mod director;
pub mod mcpu;
pub mod tile;

pub use arbiter::{Arbiter, ArbiterMessage};
pub use bank::L2Bank;
pub use controller::MemoryController;
pub use director::{AccessDirector, TileAction};
pub use mcpu::MemoryCpuWrapper;
pub use tile::Tile;
