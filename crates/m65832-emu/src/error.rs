//! Infrastructural errors.
//!
//! These are API-surface failures (construction, registration, host
//! loads) and are kept strictly apart from architectural exceptions:
//! an `EmuError` never vectors through the machine, and an
//! architectural exception is never reported as an `EmuError`.

use thiserror::Error;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum EmuError {
    #[error("physical memory size must be non-zero")]
    ZeroMemory,

    #[error("MMIO region table is full ({max} regions)")]
    MmioTableFull { max: usize },

    #[error("MMIO region {name:?} overlaps an existing region")]
    MmioOverlap { name: String },

    #[error("no MMIO region named {name:?}")]
    MmioNotFound { name: String },

    #[error("load of {len} bytes at {addr:#010x} exceeds physical memory")]
    LoadOutOfRange { addr: u32, len: usize },

    #[error("no coprocessor is attached")]
    NoCoprocessor,

    #[error("shadow bank index {0} out of range (0..4)")]
    BadShadowBank(usize),
}
