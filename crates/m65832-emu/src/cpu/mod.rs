//! CPU state and the step loop.
//!
//! One instance per emulated machine. The CPU owns the physical bus,
//! the MMU, the register files and (optionally) the 6502 coprocessor;
//! nothing in the core holds a pointer back into the CPU.

use crate::bus::Bus;
use crate::cop::Cop6502;
use crate::debug::DebugHooks;
use crate::exception::{interrupt_vectors, Exception, Trap, TrapKind};
use crate::interrupt::{Interrupt, InterruptLines};
use crate::mmu::{Access, Mmu};
use crate::primitives::constants::{
    EVEC_IRQ, EVEC_RESET, SYSREG_ASID, SYSREG_ASIDINVAL, SYSREG_BASE, SYSREG_FAULTVA,
    SYSREG_MMUCR, SYSREG_PTBR_HI, SYSREG_PTBR_LO, SYSREG_SIZE, SYSREG_TIMER_CMP,
    SYSREG_TIMER_CNT, SYSREG_TIMER_CTRL, SYSREG_TLBFLUSH, SYSREG_TLBINVAL,
};
use crate::reg::f_reg::FRegisters;
use crate::reg::status::{Status, W_NATIVE32};
use crate::reg::window::WindowFile;
use tracing::debug;

pub mod addressing;
pub mod alu;
pub mod exec;
pub mod exec_ext;

/// Cycles charged for a trap or interrupt entry sequence.
const TRAP_CYCLES: u64 = 7;

pub struct Cpu {
    // Register file.
    pub a: u32,
    pub x: u32,
    pub y: u32,
    /// Stack pointer; 8-bit within page 1 in emulation, 16-bit in
    /// 65816-native mode, full 32-bit in W=11.
    pub s: u32,
    pub pc: u32,
    /// Start PC of the currently executing instruction; the restart
    /// address when a fault must rerun it.
    pub inst_pc: u32,
    /// Direct-page base.
    pub d: u32,
    /// Absolute base.
    pub b: u32,
    /// Vector base (supervisor only).
    pub vbr: u32,
    /// Auxiliary: MUL high half, DIV remainder, LDQ/STQ high word.
    pub t: u32,
    pub p: Status,
    pub fregs: FRegisters,
    pub window: WindowFile,
    /// Opcode byte of the instruction currently executing.
    pub opcode: u8,

    pub mmu: Mmu,
    pub bus: Bus,
    pub cop: Option<Box<Cop6502>>,

    pub lines: InterruptLines,
    /// Waiting for an interrupt (WAI).
    pub halted: bool,
    /// Stopped until external reset (STP).
    pub stopped: bool,
    pub trap: Trap,
    /// Total cycles executed since reset.
    pub cycle: u64,
    pub debug: DebugHooks,

    /// LL/SC reservation: physical address, cleared by any store.
    reservation: Option<u32>,
    /// Breakpoint currently being stepped over.
    bp_resume: Option<u32>,
    /// Guards against recursive faulting while pushing trap context.
    in_trap_entry: bool,
}

impl Cpu {
    pub fn new(memory_size: usize) -> Self {
        Self {
            a: 0,
            x: 0,
            y: 0,
            s: 0x0000_01FF,
            pc: 0,
            inst_pc: 0,
            d: 0,
            b: 0,
            vbr: 0,
            t: 0,
            p: Status::reset(),
            fregs: FRegisters::new(),
            window: WindowFile::new(),
            opcode: 0,
            mmu: Mmu::new(),
            bus: Bus::new(memory_size),
            cop: None,
            lines: InterruptLines::new(),
            halted: false,
            stopped: false,
            trap: Trap::default(),
            cycle: 0,
            debug: DebugHooks::new(),
            reservation: None,
            bp_resume: None,
            in_trap_entry: false,
        }
    }

    /// Reset to the architectural power-on state and reload PC from
    /// the 16-bit reset vector. Physical memory contents survive.
    pub fn reset(&mut self) {
        self.a = 0;
        self.x = 0;
        self.y = 0;
        self.t = 0;
        self.d = 0;
        self.b = 0;
        self.vbr = 0;
        self.s = 0x0000_01FF;
        self.p = Status::reset();
        self.mmu.reset();
        self.bus.timer.reset();
        self.lines.clear();
        self.halted = false;
        self.stopped = false;
        self.trap = Trap::default();
        self.reservation = None;
        self.bp_resume = None;
        self.in_trap_entry = false;
        self.cycle = 0;
        self.pc = self.bus.read(EVEC_RESET, 2);
        self.inst_pc = self.pc;
        if let Some(cop) = self.cop.as_mut() {
            cop.reset();
        }
    }

    /// Convenience for hosts that want to skip the mode dance: enter
    /// 32-bit native mode with wide indexes.
    pub fn enter_native32(&mut self) {
        self.p.set_w(W_NATIVE32);
        self.p.set_xw(0b11);
    }

    // --- Width-aware register views ---

    pub fn a_w(&self) -> u32 {
        self.a & alu::mask(self.p.a_width())
    }

    /// Merge a result into A at width, preserving the untouched high
    /// bytes.
    pub fn set_a(&mut self, value: u32, width: u8) {
        let m = alu::mask(width);
        self.a = (self.a & !m) | (value & m);
    }

    pub fn x_w(&self) -> u32 {
        self.x & alu::mask(self.p.x_width())
    }

    pub fn set_x(&mut self, value: u32, width: u8) {
        let m = alu::mask(width);
        self.x = (self.x & !m) | (value & m);
    }

    pub fn y_w(&self) -> u32 {
        self.y & alu::mask(self.p.x_width())
    }

    pub fn set_y(&mut self, value: u32, width: u8) {
        let m = alu::mask(width);
        self.y = (self.y & !m) | (value & m);
    }

    /// Apply the mode mask to a new stack-pointer value.
    pub fn set_s(&mut self, value: u32) {
        self.s = match self.p.w() {
            0b00 => 0x0000_0100 | (value & 0xFF),
            0b11 => value,
            _ => value & 0xFFFF,
        };
    }

    fn stack_dec(&self, s: u32) -> u32 {
        match self.p.w() {
            0b00 => 0x0000_0100 | (s.wrapping_sub(1) & 0xFF),
            0b11 => s.wrapping_sub(1),
            _ => s.wrapping_sub(1) & 0xFFFF,
        }
    }

    fn stack_inc(&self, s: u32) -> u32 {
        match self.p.w() {
            0b00 => 0x0000_0100 | (s.wrapping_add(1) & 0xFF),
            0b11 => s.wrapping_add(1),
            _ => s.wrapping_add(1) & 0xFFFF,
        }
    }

    // --- Virtual memory access ---

    fn translate(&mut self, va: u32, access: Access) -> Result<u32, Exception> {
        self.mmu.translate(&mut self.bus, va, access, self.p.s)
    }

    /// Translate every page a span touches, before anything commits.
    pub(crate) fn pretranslate(&mut self, va: u32, len: u32, access: Access) -> Result<(), Exception> {
        self.translate(va, access)?;
        let last = va.wrapping_add(len - 1) & !0xFFF;
        let mut page = va & !0xFFF;
        while page != last {
            page = page.wrapping_add(0x1000);
            self.translate(page, access)?;
        }
        Ok(())
    }

    fn phys_read(&mut self, pa: u32, width: u8) -> Result<u32, Exception> {
        if pa.wrapping_sub(SYSREG_BASE) < SYSREG_SIZE {
            if !self.p.s {
                return Err(Exception::Privilege);
            }
            return Ok(self.sysreg_read(pa - SYSREG_BASE));
        }
        Ok(self.bus.read(pa, width))
    }

    fn phys_write(&mut self, pa: u32, value: u32, width: u8) -> Result<(), Exception> {
        if pa.wrapping_sub(SYSREG_BASE) < SYSREG_SIZE {
            if !self.p.s {
                return Err(Exception::Privilege);
            }
            self.sysreg_write(pa - SYSREG_BASE, value);
            return Ok(());
        }
        self.bus.write(pa, value, width);
        Ok(())
    }

    /// Virtual read of 1, 2 or 4 bytes. Page-crossing accesses
    /// translate both pages before touching either, so a fault leaves
    /// no handler side effects behind.
    pub fn vread(&mut self, va: u32, width: u8, access: Access) -> Result<u32, Exception> {
        let pa0 = self.translate(va, access)?;
        let end = va.wrapping_add(width as u32 - 1);
        let value = if (va ^ end) & !0xFFF != 0 {
            // Crosses a page: translate both sides up front, then fall
            // back to byte accesses so handlers only see 1/2/4 widths.
            self.translate(end & !0xFFF, access)?;
            let mut value = 0u32;
            for i in 0..width as u32 {
                let pa = self.translate(va.wrapping_add(i), access)?;
                value |= self.phys_read(pa, 1)? << (8 * i);
            }
            value
        } else {
            self.phys_read(pa0, width)?
        };
        if access != Access::Fetch {
            self.check_watch(va, width, false);
        }
        Ok(value)
    }

    pub fn read(&mut self, va: u32, width: u8) -> Result<u32, Exception> {
        self.vread(va, width, Access::Load)
    }

    /// Virtual write of 1, 2 or 4 bytes. Any committed store
    /// invalidates an outstanding LL/SC reservation.
    pub fn write(&mut self, va: u32, value: u32, width: u8) -> Result<(), Exception> {
        let pa0 = self.translate(va, Access::Store)?;
        let end = va.wrapping_add(width as u32 - 1);
        if (va ^ end) & !0xFFF != 0 {
            self.translate(end & !0xFFF, Access::Store)?;
            for i in 0..width as u32 {
                let pa = self.translate(va.wrapping_add(i), Access::Store)?;
                self.phys_write(pa, (value >> (8 * i)) & 0xFF, 1)?;
            }
        } else {
            self.phys_write(pa0, value, width)?;
        }
        self.reservation = None;
        self.check_watch(va, width, true);
        Ok(())
    }

    pub fn read64(&mut self, va: u32) -> Result<u64, Exception> {
        self.pretranslate(va, 8, Access::Load)?;
        let lo = self.vread(va, 4, Access::Load)? as u64;
        let hi = self.vread(va.wrapping_add(4), 4, Access::Load)? as u64;
        Ok(lo | (hi << 32))
    }

    pub fn write64(&mut self, va: u32, value: u64) -> Result<(), Exception> {
        self.pretranslate(va, 8, Access::Store)?;
        self.write(va, value as u32, 4)?;
        self.write(va.wrapping_add(4), (value >> 32) as u32, 4)
    }

    // --- Operand fetch ---

    pub fn fetch8(&mut self) -> Result<u8, Exception> {
        let v = self.vread(self.pc, 1, Access::Fetch)?;
        self.pc = self.pc.wrapping_add(1);
        Ok(v as u8)
    }

    pub fn fetch16(&mut self) -> Result<u16, Exception> {
        let v = self.vread(self.pc, 2, Access::Fetch)?;
        self.pc = self.pc.wrapping_add(2);
        Ok(v as u16)
    }

    pub fn fetch32(&mut self) -> Result<u32, Exception> {
        let v = self.vread(self.pc, 4, Access::Fetch)?;
        self.pc = self.pc.wrapping_add(4);
        Ok(v)
    }

    /// Fetch an absolute operand: 16 bits normally, 32 in W=11.
    pub fn fetch_abs(&mut self) -> Result<u32, Exception> {
        if self.p.native32() {
            self.fetch32()
        } else {
            Ok(self.fetch16()? as u32)
        }
    }

    // --- Stack ---

    /// Push `width` bytes, high byte first. All byte addresses are
    /// translated before the first byte is stored.
    pub fn push(&mut self, value: u32, width: u8) -> Result<(), Exception> {
        let mut addrs = [0u32; 8];
        let mut s = self.s;
        for i in (0..width as usize).rev() {
            addrs[i] = s;
            s = self.stack_dec(s);
        }
        for i in 0..width as usize {
            self.translate(addrs[i], Access::Store)?;
        }
        for i in (0..width as usize).rev() {
            self.write(addrs[i], (value >> (8 * i)) as u32, 1)?;
        }
        self.s = s;
        Ok(())
    }

    /// Pull `width` bytes, low byte first.
    pub fn pull(&mut self, width: u8) -> Result<u32, Exception> {
        let mut addrs = [0u32; 8];
        let mut s = self.s;
        for slot in addrs.iter_mut().take(width as usize) {
            s = self.stack_inc(s);
            *slot = s;
        }
        for addr in addrs.iter().take(width as usize) {
            self.translate(*addr, Access::Load)?;
        }
        let mut value = 0u32;
        for i in 0..width as usize {
            value |= self.read(addrs[i], 1)? << (8 * i);
        }
        self.s = s;
        Ok(value)
    }

    // --- LL/SC ---

    pub(crate) fn set_reservation(&mut self, pa: u32) {
        self.reservation = Some(pa);
    }

    pub(crate) fn take_reservation(&mut self, pa: u32) -> bool {
        let hit = self.reservation == Some(pa);
        self.reservation = None;
        hit
    }

    pub fn reservation_valid(&self) -> bool {
        self.reservation.is_some()
    }

    // --- Step loop ---

    /// Execute one instruction (or deliver one pending event) and
    /// return the cycles consumed. Architectural exceptions are
    /// resolved internally by vectoring; they never escape.
    pub fn step(&mut self) -> u64 {
        if self.stopped {
            return 0;
        }

        if self.halted {
            // The time base keeps running while the core waits so a
            // timer match can wake it.
            self.bus.timer.tick(1);
            self.service_interrupts();
            return 0;
        }

        if self.debug.breakpoints.contains(&self.pc) && self.bp_resume != Some(self.pc) {
            self.bp_resume = Some(self.pc);
            self.trap = Trap {
                kind: TrapKind::Breakpoint,
                addr: self.pc,
            };
            return 0;
        }
        self.bp_resume = None;

        self.inst_pc = self.pc;
        self.trace_hook();

        let cycles = match exec::execute_one(self) {
            Ok(cycles) => cycles,
            Err(e) => {
                self.take_exception(e);
                TRAP_CYCLES
            }
        };

        self.cycle += cycles;
        self.bus.timer.tick(cycles);
        self.service_interrupts();
        cycles
    }

    fn trace_hook(&mut self) {
        if self.debug.trace.is_none() {
            return;
        }
        let mut bytes = [0u8; 4];
        let mut n = 0;
        for (i, slot) in bytes.iter_mut().enumerate() {
            match self.mmu.probe(&self.bus.ram, self.pc.wrapping_add(i as u32)) {
                Some(pa) => {
                    *slot = self.bus.ram.read8(pa);
                    n += 1;
                }
                None => break,
            }
        }
        if let Some(mut cb) = self.debug.trace.take() {
            cb(self.pc, &bytes[..n]);
            self.debug.trace = Some(cb);
        }
    }

    fn check_watch(&mut self, va: u32, width: u8, is_write: bool) {
        for w in &self.debug.watchpoints {
            if w.overlaps(va, width) && w.fires_on(is_write) {
                self.trap = Trap {
                    kind: TrapKind::Watchpoint,
                    addr: va,
                };
            }
        }
    }

    // --- Trap sequencing ---

    /// Vector through the machine exception mechanism. Synchronous
    /// traps push the PC past the instruction; restartable faults push
    /// `inst_pc` so the handler can rerun it.
    pub(crate) fn take_exception(&mut self, e: Exception) {
        let kind = e.trap_kind();
        let addr = match e {
            Exception::PageFault(va) | Exception::Alignment(va) => va,
            _ => 0,
        };
        self.trap = Trap { kind, addr };
        debug!(
            kind = kind.name(),
            pc = format_args!("{:#010x}", self.inst_pc),
            "trap"
        );

        let return_pc = if e.restarts() { self.inst_pc } else { self.pc };
        // BRK keeps its legacy emulation vector; the post-65816
        // exception kinds always go through the VBR-relative table.
        let (offset, wide, legacy) = if self.p.e() && matches!(e, Exception::Brk) {
            (EVEC_IRQ, false, true)
        } else {
            (e.vector(), e.wide_vector(), false)
        };
        self.enter_vector(return_pc, offset, wide, legacy);
    }

    fn service_interrupts(&mut self) {
        let irq_level = self.lines.irq || self.bus.timer.irq_asserted();
        if self.halted && self.lines.any_raised(irq_level) {
            self.halted = false;
        }
        if let Some(int) = self.lines.pending(irq_level, !self.p.i) {
            self.take_interrupt(int);
        }
    }

    fn take_interrupt(&mut self, int: Interrupt) {
        self.lines.acknowledge(int);
        self.halted = false;
        self.trap = Trap {
            kind: int.trap_kind(),
            addr: 0,
        };
        debug!(kind = int.trap_kind().name(), "interrupt");
        let emulation = self.p.e();
        let vectors = interrupt_vectors(emulation);
        let offset = match int {
            Interrupt::Abort => vectors.abort,
            Interrupt::Nmi => vectors.nmi,
            Interrupt::Irq => vectors.irq,
        };
        self.enter_vector(self.pc, offset, false, emulation);
        self.cycle += TRAP_CYCLES;
        self.bus.timer.tick(TRAP_CYCLES);
    }

    /// Push the return context and load PC from a vector slot. A fault
    /// while delivering stops the machine rather than recursing.
    fn enter_vector(&mut self, return_pc: u32, offset: u32, wide: bool, legacy: bool) {
        if self.in_trap_entry {
            self.stopped = true;
            return;
        }
        self.in_trap_entry = true;
        let result = self.vector_sequence(return_pc, offset, wide, legacy);
        self.in_trap_entry = false;
        if result.is_err() {
            self.stopped = true;
        }
    }

    fn vector_sequence(
        &mut self,
        return_pc: u32,
        offset: u32,
        wide: bool,
        legacy: bool,
    ) -> Result<(), Exception> {
        if self.p.e() {
            self.push(return_pc, 2)?;
            self.push(self.p.low() as u32, 1)?;
        } else {
            self.push(return_pc, 4)?;
            self.push(self.p.bits() as u32, 2)?;
        }
        self.p.i = true;
        self.p.d = false;
        self.pc = if legacy {
            self.vread(offset, 2, Access::Load)?
        } else if wide {
            self.vread(self.vbr.wrapping_add(offset), 4, Access::Load)?
        } else {
            let entry = self.vread(self.vbr.wrapping_add(offset), 2, Access::Load)?;
            (self.vbr & 0xFFFF_0000) | entry
        };
        Ok(())
    }

    // --- System registers ---

    fn sysreg_read(&mut self, offset: u32) -> u32 {
        match offset & !0x3 {
            SYSREG_MMUCR => self.mmu.read_mmucr(),
            SYSREG_ASID => self.mmu.asid as u32,
            SYSREG_FAULTVA => self.mmu.faultva,
            SYSREG_PTBR_LO => self.mmu.ptbr as u32,
            SYSREG_PTBR_HI => (self.mmu.ptbr >> 32) as u32,
            SYSREG_TIMER_CTRL => self.bus.timer.read_ctrl(),
            SYSREG_TIMER_CMP => self.bus.timer.read_cmp(),
            SYSREG_TIMER_CNT => self.bus.timer.read_cnt(),
            _ => 0,
        }
    }

    fn sysreg_write(&mut self, offset: u32, value: u32) {
        match offset & !0x3 {
            SYSREG_MMUCR => self.mmu.write_mmucr(value),
            SYSREG_TLBINVAL => self.mmu.invalidate_va(value),
            SYSREG_ASID => self.mmu.asid = value as u8,
            SYSREG_ASIDINVAL => self.mmu.invalidate_asid(value as u8),
            SYSREG_FAULTVA => self.mmu.faultva = value,
            SYSREG_PTBR_LO => {
                self.mmu.ptbr = (self.mmu.ptbr & 0xFFFF_FFFF_0000_0000) | value as u64
            }
            SYSREG_PTBR_HI => {
                self.mmu.ptbr = (self.mmu.ptbr & 0xFFFF_FFFF) | ((value as u64) << 32)
            }
            SYSREG_TLBFLUSH => self.mmu.flush(),
            SYSREG_TIMER_CTRL => self.bus.timer.write_ctrl(value),
            SYSREG_TIMER_CMP => self.bus.timer.write_cmp(value),
            SYSREG_TIMER_CNT => self.bus.timer.write_cnt(value),
            _ => {}
        }
    }

    // --- Coprocessor driver ---

    /// Run the coprocessor for at least `cycles` 6502 cycles. The
    /// coprocessor borrows physical memory for the duration of the
    /// batch; it keeps no reference between calls.
    pub fn run_cop(&mut self, cycles: u32) -> Option<u32> {
        let cop = self.cop.as_mut()?;
        Some(cop.run_batch(self.bus.ram.bytes_mut(), cycles))
    }
}
