//! Asynchronous interrupt lines.
//!
//! IRQ is a level; NMI and ABORT are edge-latched pulses. Pending
//! lines are sampled once per step, after instruction commit, and
//! taken in the fixed priority order ABORT > NMI > IRQ. Page faults
//! and illegal-opcode traps are synchronous and sequenced inside the
//! instruction itself, so they never appear here.

use crate::exception::TrapKind;

/// The interrupt selected for delivery on a given step.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Interrupt {
    Abort,
    Nmi,
    Irq,
}

impl Interrupt {
    pub fn trap_kind(&self) -> TrapKind {
        match self {
            Interrupt::Abort => TrapKind::Abort,
            Interrupt::Nmi => TrapKind::Nmi,
            Interrupt::Irq => TrapKind::Irq,
        }
    }
}

/// Latched interrupt lines. The external IRQ level is kept separate
/// from the timer's own level so clearing one does not lose the other.
#[derive(Debug, Default)]
pub struct InterruptLines {
    /// External level-triggered IRQ line.
    pub irq: bool,
    /// Edge-latched NMI, cleared when taken.
    pub nmi: bool,
    /// Edge-latched ABORT, cleared when taken.
    pub abort: bool,
}

impl InterruptLines {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn clear(&mut self) {
        self.irq = false;
        self.nmi = false;
        self.abort = false;
    }

    /// Pick the highest-priority pending interrupt. `irq_level` is the
    /// combined external + peripheral IRQ level; it is only deliverable
    /// when the I flag is clear.
    pub fn pending(&self, irq_level: bool, irq_enabled: bool) -> Option<Interrupt> {
        if self.abort {
            return Some(Interrupt::Abort);
        }
        if self.nmi {
            return Some(Interrupt::Nmi);
        }
        if irq_level && irq_enabled {
            return Some(Interrupt::Irq);
        }
        None
    }

    /// Whether any line would wake a WAI-halted core. A masked IRQ
    /// still wakes the core; it just does not vector.
    pub fn any_raised(&self, irq_level: bool) -> bool {
        self.abort || self.nmi || irq_level
    }

    /// Clear the edge latch for a taken interrupt.
    pub fn acknowledge(&mut self, taken: Interrupt) {
        match taken {
            Interrupt::Abort => self.abort = false,
            Interrupt::Nmi => self.nmi = false,
            Interrupt::Irq => {}
        }
    }
}
