//! Architectural exceptions and the host-visible trap snapshot.
//!
//! Exceptions raised while executing an instruction flow back to the
//! step loop as `Result<_, Exception>` and are recovered there by
//! vectoring through the machine's trap mechanism; they never escape
//! `step()`. The host only ever sees the [`Trap`] snapshot.

use crate::primitives::constants::{
    EVEC_ABORT, EVEC_IRQ, EVEC_NMI, VEC_ABORT, VEC_BRK, VEC_COP, VEC_ILLEGAL_OP, VEC_IRQ, VEC_NMI,
    VEC_PAGE_FAULT, VEC_SYSCALL,
};

/// An exception raised by the CPU during instruction execution.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Exception {
    /// Translation failed; the fault type and FAULTVA are already
    /// latched in the MMU state. Carries the faulting virtual address.
    PageFault(u32),
    /// Undefined or mode-illegal encoding. Carries the opcode byte.
    IllegalOpcode(u8),
    /// Supervisor-only operation attempted in user mode.
    Privilege,
    /// Register-window access with a misaligned direct-page offset.
    Alignment(u32),
    /// BRK instruction.
    Brk,
    /// COP instruction.
    Cop,
    /// TRAP instruction (system call).
    Syscall,
}

impl Exception {
    /// Whether the pushed return PC must point at the restart address
    /// (`inst_pc`) rather than past the instruction.
    pub fn restarts(&self) -> bool {
        matches!(self, Exception::PageFault(_) | Exception::Alignment(_))
    }

    /// Native vector slot for this exception, as an offset from VBR.
    pub fn vector(&self) -> u32 {
        match self {
            Exception::PageFault(_) => VEC_PAGE_FAULT,
            Exception::IllegalOpcode(_) => VEC_ILLEGAL_OP,
            Exception::Privilege => VEC_ILLEGAL_OP,
            Exception::Alignment(_) => VEC_ILLEGAL_OP,
            Exception::Brk => VEC_BRK,
            Exception::Cop => VEC_COP,
            Exception::Syscall => VEC_SYSCALL,
        }
    }

    /// Whether the vector slot holds a full 32-bit entry. The legacy
    /// block at $FFE0..$FFFF keeps 16-bit slots combined with the high
    /// half of VBR.
    pub fn wide_vector(&self) -> bool {
        matches!(self, Exception::PageFault(_) | Exception::Syscall)
    }

    pub fn trap_kind(&self) -> TrapKind {
        match self {
            Exception::PageFault(_) => TrapKind::PageFault,
            Exception::IllegalOpcode(_) => TrapKind::IllegalOp,
            Exception::Privilege => TrapKind::Privilege,
            Exception::Alignment(_) => TrapKind::Alignment,
            Exception::Brk => TrapKind::Brk,
            Exception::Cop => TrapKind::Cop,
            Exception::Syscall => TrapKind::Syscall,
        }
    }
}

/// Externally observable trap kinds. Architectural exceptions record
/// themselves here as they vector; BREAKPOINT and WATCHPOINT are the
/// only kinds that halt `step()` for the host.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum TrapKind {
    #[default]
    None,
    Brk,
    Cop,
    Irq,
    Nmi,
    Abort,
    PageFault,
    Syscall,
    IllegalOp,
    Privilege,
    Breakpoint,
    Watchpoint,
    Alignment,
}

impl TrapKind {
    /// Stable string name for host diagnostics.
    pub fn name(&self) -> &'static str {
        match self {
            TrapKind::None => "NONE",
            TrapKind::Brk => "BRK",
            TrapKind::Cop => "COP",
            TrapKind::Irq => "IRQ",
            TrapKind::Nmi => "NMI",
            TrapKind::Abort => "ABORT",
            TrapKind::PageFault => "PAGE_FAULT",
            TrapKind::Syscall => "SYSCALL",
            TrapKind::IllegalOp => "ILLEGAL_OP",
            TrapKind::Privilege => "PRIVILEGE",
            TrapKind::Breakpoint => "BREAKPOINT",
            TrapKind::Watchpoint => "WATCHPOINT",
            TrapKind::Alignment => "ALIGNMENT",
        }
    }
}

/// The trap snapshot the host polls between steps.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Trap {
    pub kind: TrapKind,
    /// Associated address: faulting VA, breakpoint PC, watchpoint
    /// data address. Zero when the kind carries no address.
    pub addr: u32,
}

/// Vector offsets used when an asynchronous interrupt is delivered.
/// Emulation mode uses the fixed legacy table instead of VBR.
pub fn interrupt_vectors(emulation: bool) -> InterruptVectors {
    if emulation {
        InterruptVectors {
            abort: EVEC_ABORT,
            nmi: EVEC_NMI,
            irq: EVEC_IRQ,
        }
    } else {
        InterruptVectors {
            abort: VEC_ABORT,
            nmi: VEC_NMI,
            irq: VEC_IRQ,
        }
    }
}

#[derive(Debug, Clone, Copy)]
pub struct InterruptVectors {
    pub abort: u32,
    pub nmi: u32,
    pub irq: u32,
}
