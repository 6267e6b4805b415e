//! Host-facing emulator wrapper.
//!
//! `Emu` owns the CPU and exposes the host API: construction, reset,
//! stepping and running, physical memory access, MMIO registration,
//! debug hooks, interrupt lines and the coprocessor surface. The run
//! loop stops cleanly at a step boundary when the host raises the
//! stop flag or a host-visible trap (breakpoint/watchpoint) fires.

use crate::cop::{Cop6502, ShadowWrite};
use crate::cpu::Cpu;
use crate::debug::{TraceFn, Watchpoint};
use crate::error::EmuError;
use crate::exception::{Trap, TrapKind};
use crate::mmio::MmioHandler;

pub struct Emu {
    pub cpu: Cpu,
    running: bool,
}

impl Emu {
    /// Construct a machine with `memory_size` bytes of zero-filled
    /// physical memory.
    pub fn new(memory_size: usize) -> Result<Self, EmuError> {
        if memory_size == 0 {
            return Err(EmuError::ZeroMemory);
        }
        Ok(Self {
            cpu: Cpu::new(memory_size),
            running: false,
        })
    }

    pub fn reset(&mut self) {
        self.cpu.reset();
    }

    /// Execute one instruction; returns the cycles consumed.
    pub fn step(&mut self) -> u64 {
        self.cpu.step()
    }

    /// Run until `cycles` have elapsed, the host stop flag is raised,
    /// STP executes, or a host-visible trap fires. Returns the cycles
    /// actually consumed.
    pub fn run(&mut self, cycles: u64) -> u64 {
        self.running = true;
        let mut consumed = 0u64;
        while self.running && consumed < cycles && !self.cpu.stopped {
            let step = self.cpu.step();
            if step == 0 {
                match self.cpu.trap.kind {
                    TrapKind::Breakpoint | TrapKind::Watchpoint => break,
                    _ => {}
                }
                if self.cpu.halted {
                    // WAI: no instruction retires, but wall time passes.
                    consumed += 1;
                    continue;
                }
                break;
            }
            consumed += step;
            if matches!(
                self.cpu.trap.kind,
                TrapKind::Breakpoint | TrapKind::Watchpoint
            ) {
                break;
            }
        }
        self.running = false;
        consumed
    }

    /// Ask a running loop to stop at the next step boundary. Safe to
    /// call from an MMIO or trace callback.
    pub fn stop(&mut self) {
        self.running = false;
    }

    pub fn is_running(&self) -> bool {
        self.running
    }

    // --- Physical memory ---

    pub fn read8(&mut self, addr: u32) -> u8 {
        self.cpu.bus.read(addr, 1) as u8
    }

    pub fn read16(&mut self, addr: u32) -> u16 {
        self.cpu.bus.read(addr, 2) as u16
    }

    pub fn read32(&mut self, addr: u32) -> u32 {
        self.cpu.bus.read(addr, 4)
    }

    pub fn write8(&mut self, addr: u32, value: u8) {
        self.cpu.bus.write(addr, value as u32, 1);
    }

    pub fn write16(&mut self, addr: u32, value: u16) {
        self.cpu.bus.write(addr, value as u32, 2);
    }

    pub fn write32(&mut self, addr: u32, value: u32) {
        self.cpu.bus.write(addr, value, 4);
    }

    pub fn read_block(&self, addr: u32, buf: &mut [u8]) {
        for (i, slot) in buf.iter_mut().enumerate() {
            *slot = self.cpu.bus.ram.read8(addr.wrapping_add(i as u32));
        }
    }

    pub fn write_block(&mut self, addr: u32, data: &[u8]) {
        for (i, byte) in data.iter().enumerate() {
            self.cpu.bus.ram.write8(addr.wrapping_add(i as u32), *byte);
        }
    }

    /// Zero-copy view of physical memory for loaders.
    pub fn mem(&self) -> &[u8] {
        self.cpu.bus.ram.bytes()
    }

    pub fn mem_mut(&mut self) -> &mut [u8] {
        self.cpu.bus.ram.bytes_mut()
    }

    /// Load a raw image at a physical address.
    pub fn load(&mut self, addr: u32, data: &[u8]) -> Result<(), EmuError> {
        let end = addr as u64 + data.len() as u64;
        if end > self.cpu.bus.ram.len() as u64 {
            return Err(EmuError::LoadOutOfRange {
                addr,
                len: data.len(),
            });
        }
        self.write_block(addr, data);
        Ok(())
    }

    // --- MMIO ---

    pub fn mmio_register(
        &mut self,
        base: u32,
        size: u32,
        name: &str,
        handler: Box<dyn MmioHandler>,
    ) -> Result<(), EmuError> {
        self.cpu.bus.register(base, size, name, handler)
    }

    pub fn mmio_unregister(&mut self, name: &str) -> Result<(), EmuError> {
        self.cpu.bus.unregister(name)
    }

    pub fn mmio_find(&self, name: &str) -> Option<(u32, u32, bool)> {
        self.cpu.bus.find(name).map(|r| (r.base, r.size, r.active))
    }

    pub fn mmio_set_active(&mut self, name: &str, active: bool) -> Result<(), EmuError> {
        match self.cpu.bus.find_mut(name) {
            Some(region) => {
                region.active = active;
                Ok(())
            }
            None => Err(EmuError::MmioNotFound {
                name: name.to_string(),
            }),
        }
    }

    pub fn mmio_clear(&mut self) {
        self.cpu.bus.clear_regions();
    }

    // --- Debug hooks ---

    pub fn add_breakpoint(&mut self, addr: u32) {
        self.cpu.debug.add_breakpoint(addr);
    }

    pub fn remove_breakpoint(&mut self, addr: u32) {
        self.cpu.debug.remove_breakpoint(addr);
    }

    pub fn add_watchpoint(&mut self, addr: u32, len: u32, on_read: bool, on_write: bool) {
        self.cpu.debug.add_watchpoint(Watchpoint {
            addr,
            len,
            on_read,
            on_write,
        });
    }

    pub fn remove_watchpoint(&mut self, addr: u32) {
        self.cpu.debug.remove_watchpoint(addr);
    }

    pub fn set_trace(&mut self, callback: TraceFn) {
        self.cpu.debug.trace = Some(callback);
    }

    pub fn clear_trace(&mut self) {
        self.cpu.debug.trace = None;
    }

    // --- Trap snapshot ---

    pub fn trap(&self) -> Trap {
        self.cpu.trap
    }

    pub fn clear_trap(&mut self) {
        self.cpu.trap = Trap::default();
    }

    /// Stable string name for a trap kind.
    pub fn trap_name(kind: TrapKind) -> &'static str {
        kind.name()
    }

    // --- Interrupt lines ---

    pub fn set_irq(&mut self, level: bool) {
        self.cpu.lines.irq = level;
    }

    /// Pulse the edge-latched NMI line.
    pub fn nmi(&mut self) {
        self.cpu.lines.nmi = true;
    }

    /// Pulse the edge-latched ABORT line.
    pub fn abort(&mut self) {
        self.cpu.lines.abort = true;
    }

    /// Host convenience: switch straight into 32-bit native mode.
    pub fn enter_native32(&mut self) {
        self.cpu.enter_native32();
    }

    // --- Coprocessor ---

    /// Attach a 6502 coprocessor (replacing any existing one).
    pub fn cop_init(&mut self) {
        self.cpu.cop = Some(Box::new(Cop6502::new()));
    }

    pub fn cop_reset(&mut self) -> Result<(), EmuError> {
        let ram = self.cpu.bus.ram.bytes();
        match self.cpu.cop.as_mut() {
            Some(cop) => {
                cop.reset();
                cop.reset_vector(ram);
                Ok(())
            }
            None => Err(EmuError::NoCoprocessor),
        }
    }

    /// Run the coprocessor for at least `cycles` 6502 cycles.
    pub fn cop_run(&mut self, cycles: u32) -> Result<u32, EmuError> {
        self.cpu.run_cop(cycles).ok_or(EmuError::NoCoprocessor)
    }

    pub fn cop_set_vbr(&mut self, vbr: u32) -> Result<(), EmuError> {
        self.with_cop(|cop| cop.set_vbr(vbr))
    }

    pub fn cop_set_shadow_bank(
        &mut self,
        index: usize,
        base: u16,
        active: bool,
    ) -> Result<(), EmuError> {
        if index >= crate::cop::SHADOW_BANKS {
            return Err(EmuError::BadShadowBank(index));
        }
        self.with_cop(|cop| cop.set_shadow_bank(index, base, active))
    }

    pub fn cop_set_timing(
        &mut self,
        cycles_per_line: u32,
        lines_per_frame: u32,
    ) -> Result<(), EmuError> {
        self.with_cop(|cop| cop.set_timing(cycles_per_line, lines_per_frame))
    }

    pub fn cop_irq(&mut self, level: bool) -> Result<(), EmuError> {
        self.with_cop(|cop| cop.set_irq(level))
    }

    pub fn cop_nmi(&mut self, level: bool) -> Result<(), EmuError> {
        self.with_cop(|cop| cop.set_nmi(level))
    }

    pub fn cop_fifo_pop(&mut self) -> Result<Option<ShadowWrite>, EmuError> {
        match self.cpu.cop.as_mut() {
            Some(cop) => Ok(cop.fifo_pop()),
            None => Err(EmuError::NoCoprocessor),
        }
    }

    fn with_cop<F: FnOnce(&mut Cop6502)>(&mut self, f: F) -> Result<(), EmuError> {
        match self.cpu.cop.as_mut() {
            Some(cop) => {
                f(cop);
                Ok(())
            }
            None => Err(EmuError::NoCoprocessor),
        }
    }
}
