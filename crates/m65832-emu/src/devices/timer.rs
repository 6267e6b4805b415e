//! 32-bit compare timer.
//!
//! The counter advances once per elapsed CPU cycle while enabled. On
//! reaching the compare value it latches the counter and raises its
//! IRQ level; while the IRQ is pending, reads of CNT return the latch
//! so the host observes the precise match value.

use bitflags::bitflags;
use tracing::trace;

bitflags! {
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct TimerCtrl: u8 {
        const ENABLE = 1 << 0;
        const AUTO_RESET = 1 << 1;
        const IRQ_ENABLE = 1 << 2;
        /// Read-only status bit.
        const IRQ_PENDING = 1 << 3;
        /// Write-1-to-clear; always reads 0.
        const IRQ_CLEAR = 1 << 4;
    }
}

#[derive(Debug)]
pub struct Timer {
    ctrl: TimerCtrl,
    cmp: u32,
    cnt: u32,
    /// Counter value captured at the moment of the last match.
    latch: u32,
}

impl Timer {
    pub fn new() -> Self {
        Self {
            ctrl: TimerCtrl::empty(),
            cmp: 0,
            cnt: 0,
            latch: 0,
        }
    }

    pub fn reset(&mut self) {
        *self = Self::new();
    }

    /// Advance by `cycles` CPU cycles.
    pub fn tick(&mut self, cycles: u64) {
        if !self.ctrl.contains(TimerCtrl::ENABLE) {
            return;
        }
        for _ in 0..cycles {
            self.cnt = self.cnt.wrapping_add(1);
            if self.cnt == self.cmp {
                self.latch = self.cnt;
                self.ctrl.insert(TimerCtrl::IRQ_PENDING);
                trace!(cnt = self.cnt, "timer compare match");
                if self.ctrl.contains(TimerCtrl::AUTO_RESET) {
                    self.cnt = 0;
                }
            }
        }
    }

    /// IRQ level as seen by the CPU core.
    pub fn irq_asserted(&self) -> bool {
        self.ctrl
            .contains(TimerCtrl::IRQ_PENDING | TimerCtrl::IRQ_ENABLE)
    }

    pub fn read_ctrl(&self) -> u32 {
        (self.ctrl & !TimerCtrl::IRQ_CLEAR).bits() as u32
    }

    pub fn write_ctrl(&mut self, value: u32) {
        let value = TimerCtrl::from_bits_truncate(value as u8);
        if value.contains(TimerCtrl::IRQ_CLEAR) {
            self.ctrl.remove(TimerCtrl::IRQ_PENDING);
        }
        // ENABLE/AUTO_RESET/IRQ_ENABLE are host-writable; the pending
        // bit only changes via a match or IRQ_CLEAR.
        let writable = TimerCtrl::ENABLE | TimerCtrl::AUTO_RESET | TimerCtrl::IRQ_ENABLE;
        self.ctrl = (self.ctrl & !writable) | (value & writable);
    }

    pub fn read_cmp(&self) -> u32 {
        self.cmp
    }

    pub fn write_cmp(&mut self, value: u32) {
        self.cmp = value;
    }

    /// Latched value while an IRQ is pending, live counter otherwise.
    pub fn read_cnt(&self) -> u32 {
        if self.ctrl.contains(TimerCtrl::IRQ_PENDING) {
            self.latch
        } else {
            self.cnt
        }
    }

    pub fn write_cnt(&mut self, value: u32) {
        self.cnt = value;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn match_latches_and_raises_irq() {
        let mut t = Timer::new();
        t.write_cmp(3);
        t.write_ctrl((TimerCtrl::ENABLE | TimerCtrl::IRQ_ENABLE).bits() as u32);
        t.tick(2);
        assert!(!t.irq_asserted());
        t.tick(1);
        assert!(t.irq_asserted());
        assert_eq!(t.read_cnt(), 3);
        // The live counter keeps moving but CNT reads stay latched.
        t.tick(5);
        assert_eq!(t.read_cnt(), 3);
        t.write_ctrl(TimerCtrl::IRQ_CLEAR.bits() as u32);
        assert!(!t.irq_asserted());
        assert_eq!(t.read_cnt(), 8);
    }

    #[test]
    fn auto_reset_zeroes_counter() {
        let mut t = Timer::new();
        t.write_cmp(2);
        t.write_ctrl((TimerCtrl::ENABLE | TimerCtrl::AUTO_RESET).bits() as u32);
        t.tick(2);
        assert_eq!(t.read_cnt(), 2); // latched
        t.write_ctrl(TimerCtrl::IRQ_CLEAR.bits() as u32);
        assert_eq!(t.read_cnt(), 0);
    }
}
