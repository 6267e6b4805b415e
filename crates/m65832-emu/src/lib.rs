//! M65832 emulator core.
//!
//! An interpretive, cycle-counting emulator for the M65832, a 32-bit
//! successor to the 6502/65816 line: width-moded CPU interpreter,
//! two-level MMU with a TLB, memory-mapped I/O dispatch, a compare
//! timer, a trap/interrupt sequencer and an optional cycle-accurate
//! 6502 coprocessor sharing physical memory.

pub mod bus;
pub mod cop;
pub mod cpu;
pub mod debug;
pub mod devices;
pub mod emu;
pub mod error;
pub mod exception;
pub mod interrupt;
pub mod mem;
pub mod mmio;
pub mod mmu;
pub mod primitives;
pub mod reg;

pub use emu::Emu;
pub use error::EmuError;
pub use exception::{Trap, TrapKind};
