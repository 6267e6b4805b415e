//! 6502/65C02 opcode dispatch.
//!
//! Cycle counts follow the published NMOS tables, including the +1
//! page-cross penalty on indexed reads and the branch-taken/page-cross
//! penalties. 65C02 extensions and the stable NMOS undocumented
//! opcodes are gated by the compatibility flags; everything else
//! undefined executes as a NOP of the documented length and timing
//! (or jams, for the NMOS KIL column when illegals are enabled).

use super::{Cop6502, P6502};

/// NMI vector inside the coprocessor window.
const VEC_NMI: u16 = 0xFFFA;
/// IRQ/BRK vector inside the coprocessor window.
const VEC_IRQ: u16 = 0xFFFE;

impl Cop6502 {
    /// Execute one instruction (or take one interrupt) and return the
    /// cycles consumed. Returns 0 only when jammed.
    pub(crate) fn step(&mut self, mem: &mut [u8]) -> u32 {
        if self.jammed {
            return 0;
        }

        // NMI is edge-detected against the previous line level.
        let nmi_edge = self.nmi_pending && !self.nmi_prev;
        self.nmi_prev = self.nmi_pending;
        let cycles = if nmi_edge {
            self.interrupt(mem, VEC_NMI)
        } else if self.irq_line && !self.p.contains(P6502::IRQ_DISABLE) {
            self.interrupt(mem, VEC_IRQ)
        } else {
            self.dispatch(mem)
        };
        self.total_cycles += cycles as u64;
        cycles
    }

    fn interrupt(&mut self, mem: &mut [u8], vector: u16) -> u32 {
        let pc = self.pc;
        self.push8(mem, (pc >> 8) as u8);
        self.push8(mem, pc as u8);
        let p = (self.p | P6502::UNUSED) - P6502::BREAK;
        self.push8(mem, p.bits());
        self.p.insert(P6502::IRQ_DISABLE);
        if self.cmos {
            self.p.remove(P6502::DECIMAL);
        }
        self.pc = self.read16(mem, vector);
        7
    }

    fn dispatch(&mut self, mem: &mut [u8]) -> u32 {
        let opcode = self.fetch8(mem);
        match opcode {
            // brk
            0x00 => {
                let ret = self.pc.wrapping_add(1);
                self.push8(mem, (ret >> 8) as u8);
                self.push8(mem, ret as u8);
                let p = self.p | P6502::UNUSED | P6502::BREAK;
                self.push8(mem, p.bits());
                self.p.insert(P6502::IRQ_DISABLE);
                if self.cmos {
                    self.p.remove(P6502::DECIMAL);
                }
                self.pc = self.read16(mem, VEC_IRQ);
                7
            }

            // ora
            0x09 => {
                let v = self.fetch8(mem);
                self.ora(v);
                2
            }
            0x05 => {
                let addr = self.zp(mem);
                let v = self.read(mem, addr);
                self.ora(v);
                3
            }
            0x15 => {
                let addr = self.zp_x(mem);
                let v = self.read(mem, addr);
                self.ora(v);
                4
            }
            0x0D => {
                let addr = self.abs(mem);
                let v = self.read(mem, addr);
                self.ora(v);
                4
            }
            0x1D => {
                let (addr, crossed) = self.abs_x(mem);
                let v = self.read(mem, addr);
                self.ora(v);
                4 + crossed as u32
            }
            0x19 => {
                let (addr, crossed) = self.abs_y(mem);
                let v = self.read(mem, addr);
                self.ora(v);
                4 + crossed as u32
            }
            0x01 => {
                let addr = self.ind_x(mem);
                let v = self.read(mem, addr);
                self.ora(v);
                6
            }
            0x11 => {
                let (addr, crossed) = self.ind_y(mem);
                let v = self.read(mem, addr);
                self.ora(v);
                5 + crossed as u32
            }
            0x12 if self.cmos => {
                let addr = self.ind_zp(mem);
                let v = self.read(mem, addr);
                self.ora(v);
                5
            }

            // and
            0x29 => {
                let v = self.fetch8(mem);
                self.and(v);
                2
            }
            0x25 => {
                let addr = self.zp(mem);
                let v = self.read(mem, addr);
                self.and(v);
                3
            }
            0x35 => {
                let addr = self.zp_x(mem);
                let v = self.read(mem, addr);
                self.and(v);
                4
            }
            0x2D => {
                let addr = self.abs(mem);
                let v = self.read(mem, addr);
                self.and(v);
                4
            }
            0x3D => {
                let (addr, crossed) = self.abs_x(mem);
                let v = self.read(mem, addr);
                self.and(v);
                4 + crossed as u32
            }
            0x39 => {
                let (addr, crossed) = self.abs_y(mem);
                let v = self.read(mem, addr);
                self.and(v);
                4 + crossed as u32
            }
            0x21 => {
                let addr = self.ind_x(mem);
                let v = self.read(mem, addr);
                self.and(v);
                6
            }
            0x31 => {
                let (addr, crossed) = self.ind_y(mem);
                let v = self.read(mem, addr);
                self.and(v);
                5 + crossed as u32
            }
            0x32 if self.cmos => {
                let addr = self.ind_zp(mem);
                let v = self.read(mem, addr);
                self.and(v);
                5
            }

            // eor
            0x49 => {
                let v = self.fetch8(mem);
                self.eor(v);
                2
            }
            0x45 => {
                let addr = self.zp(mem);
                let v = self.read(mem, addr);
                self.eor(v);
                3
            }
            0x55 => {
                let addr = self.zp_x(mem);
                let v = self.read(mem, addr);
                self.eor(v);
                4
            }
            0x4D => {
                let addr = self.abs(mem);
                let v = self.read(mem, addr);
                self.eor(v);
                4
            }
            0x5D => {
                let (addr, crossed) = self.abs_x(mem);
                let v = self.read(mem, addr);
                self.eor(v);
                4 + crossed as u32
            }
            0x59 => {
                let (addr, crossed) = self.abs_y(mem);
                let v = self.read(mem, addr);
                self.eor(v);
                4 + crossed as u32
            }
            0x41 => {
                let addr = self.ind_x(mem);
                let v = self.read(mem, addr);
                self.eor(v);
                6
            }
            0x51 => {
                let (addr, crossed) = self.ind_y(mem);
                let v = self.read(mem, addr);
                self.eor(v);
                5 + crossed as u32
            }
            0x52 if self.cmos => {
                let addr = self.ind_zp(mem);
                let v = self.read(mem, addr);
                self.eor(v);
                5
            }

            // adc
            0x69 => {
                let v = self.fetch8(mem);
                self.adc(v)
            }
            0x65 => {
                let addr = self.zp(mem);
                let v = self.read(mem, addr);
                1 + self.adc(v)
            }
            0x75 => {
                let addr = self.zp_x(mem);
                let v = self.read(mem, addr);
                2 + self.adc(v)
            }
            0x6D => {
                let addr = self.abs(mem);
                let v = self.read(mem, addr);
                2 + self.adc(v)
            }
            0x7D => {
                let (addr, crossed) = self.abs_x(mem);
                let v = self.read(mem, addr);
                2 + crossed as u32 + self.adc(v)
            }
            0x79 => {
                let (addr, crossed) = self.abs_y(mem);
                let v = self.read(mem, addr);
                2 + crossed as u32 + self.adc(v)
            }
            0x61 => {
                let addr = self.ind_x(mem);
                let v = self.read(mem, addr);
                4 + self.adc(v)
            }
            0x71 => {
                let (addr, crossed) = self.ind_y(mem);
                let v = self.read(mem, addr);
                3 + crossed as u32 + self.adc(v)
            }
            0x72 if self.cmos => {
                let addr = self.ind_zp(mem);
                let v = self.read(mem, addr);
                3 + self.adc(v)
            }

            // sbc
            0xE9 => {
                let v = self.fetch8(mem);
                self.sbc(v)
            }
            0xE5 => {
                let addr = self.zp(mem);
                let v = self.read(mem, addr);
                1 + self.sbc(v)
            }
            0xF5 => {
                let addr = self.zp_x(mem);
                let v = self.read(mem, addr);
                2 + self.sbc(v)
            }
            0xED => {
                let addr = self.abs(mem);
                let v = self.read(mem, addr);
                2 + self.sbc(v)
            }
            0xFD => {
                let (addr, crossed) = self.abs_x(mem);
                let v = self.read(mem, addr);
                2 + crossed as u32 + self.sbc(v)
            }
            0xF9 => {
                let (addr, crossed) = self.abs_y(mem);
                let v = self.read(mem, addr);
                2 + crossed as u32 + self.sbc(v)
            }
            0xE1 => {
                let addr = self.ind_x(mem);
                let v = self.read(mem, addr);
                4 + self.sbc(v)
            }
            0xF1 => {
                let (addr, crossed) = self.ind_y(mem);
                let v = self.read(mem, addr);
                3 + crossed as u32 + self.sbc(v)
            }
            0xF2 if self.cmos => {
                let addr = self.ind_zp(mem);
                let v = self.read(mem, addr);
                3 + self.sbc(v)
            }

            // cmp
            0xC9 => {
                let v = self.fetch8(mem);
                self.compare(self.a, v);
                2
            }
            0xC5 => {
                let addr = self.zp(mem);
                let v = self.read(mem, addr);
                self.compare(self.a, v);
                3
            }
            0xD5 => {
                let addr = self.zp_x(mem);
                let v = self.read(mem, addr);
                self.compare(self.a, v);
                4
            }
            0xCD => {
                let addr = self.abs(mem);
                let v = self.read(mem, addr);
                self.compare(self.a, v);
                4
            }
            0xDD => {
                let (addr, crossed) = self.abs_x(mem);
                let v = self.read(mem, addr);
                self.compare(self.a, v);
                4 + crossed as u32
            }
            0xD9 => {
                let (addr, crossed) = self.abs_y(mem);
                let v = self.read(mem, addr);
                self.compare(self.a, v);
                4 + crossed as u32
            }
            0xC1 => {
                let addr = self.ind_x(mem);
                let v = self.read(mem, addr);
                self.compare(self.a, v);
                6
            }
            0xD1 => {
                let (addr, crossed) = self.ind_y(mem);
                let v = self.read(mem, addr);
                self.compare(self.a, v);
                5 + crossed as u32
            }
            0xD2 if self.cmos => {
                let addr = self.ind_zp(mem);
                let v = self.read(mem, addr);
                self.compare(self.a, v);
                5
            }

            // cpx / cpy
            0xE0 => {
                let v = self.fetch8(mem);
                self.compare(self.x, v);
                2
            }
            0xE4 => {
                let addr = self.zp(mem);
                let v = self.read(mem, addr);
                self.compare(self.x, v);
                3
            }
            0xEC => {
                let addr = self.abs(mem);
                let v = self.read(mem, addr);
                self.compare(self.x, v);
                4
            }
            0xC0 => {
                let v = self.fetch8(mem);
                self.compare(self.y, v);
                2
            }
            0xC4 => {
                let addr = self.zp(mem);
                let v = self.read(mem, addr);
                self.compare(self.y, v);
                3
            }
            0xCC => {
                let addr = self.abs(mem);
                let v = self.read(mem, addr);
                self.compare(self.y, v);
                4
            }

            // bit
            0x24 => {
                let addr = self.zp(mem);
                let v = self.read(mem, addr);
                self.bit(v);
                3
            }
            0x2C => {
                let addr = self.abs(mem);
                let v = self.read(mem, addr);
                self.bit(v);
                4
            }
            0x34 if self.cmos => {
                let addr = self.zp_x(mem);
                let v = self.read(mem, addr);
                self.bit(v);
                4
            }
            0x3C if self.cmos => {
                let (addr, crossed) = self.abs_x(mem);
                let v = self.read(mem, addr);
                self.bit(v);
                4 + crossed as u32
            }
            0x89 if self.cmos => {
                // bit #: only Z
                let v = self.fetch8(mem);
                self.p.set(P6502::ZERO, self.a & v == 0);
                2
            }

            // loads
            0xA9 => {
                let v = self.fetch8(mem);
                self.a = v;
                self.set_nz(v);
                2
            }
            0xA5 => {
                let addr = self.zp(mem);
                self.a = self.read(mem, addr);
                let a = self.a;
                self.set_nz(a);
                3
            }
            0xB5 => {
                let addr = self.zp_x(mem);
                self.a = self.read(mem, addr);
                let a = self.a;
                self.set_nz(a);
                4
            }
            0xAD => {
                let addr = self.abs(mem);
                self.a = self.read(mem, addr);
                let a = self.a;
                self.set_nz(a);
                4
            }
            0xBD => {
                let (addr, crossed) = self.abs_x(mem);
                self.a = self.read(mem, addr);
                let a = self.a;
                self.set_nz(a);
                4 + crossed as u32
            }
            0xB9 => {
                let (addr, crossed) = self.abs_y(mem);
                self.a = self.read(mem, addr);
                let a = self.a;
                self.set_nz(a);
                4 + crossed as u32
            }
            0xA1 => {
                let addr = self.ind_x(mem);
                self.a = self.read(mem, addr);
                let a = self.a;
                self.set_nz(a);
                6
            }
            0xB1 => {
                let (addr, crossed) = self.ind_y(mem);
                self.a = self.read(mem, addr);
                let a = self.a;
                self.set_nz(a);
                5 + crossed as u32
            }
            0xB2 if self.cmos => {
                let addr = self.ind_zp(mem);
                self.a = self.read(mem, addr);
                let a = self.a;
                self.set_nz(a);
                5
            }
            0xA2 => {
                let v = self.fetch8(mem);
                self.x = v;
                self.set_nz(v);
                2
            }
            0xA6 => {
                let addr = self.zp(mem);
                self.x = self.read(mem, addr);
                let x = self.x;
                self.set_nz(x);
                3
            }
            0xB6 => {
                let addr = self.zp_y(mem);
                self.x = self.read(mem, addr);
                let x = self.x;
                self.set_nz(x);
                4
            }
            0xAE => {
                let addr = self.abs(mem);
                self.x = self.read(mem, addr);
                let x = self.x;
                self.set_nz(x);
                4
            }
            0xBE => {
                let (addr, crossed) = self.abs_y(mem);
                self.x = self.read(mem, addr);
                let x = self.x;
                self.set_nz(x);
                4 + crossed as u32
            }
            0xA0 => {
                let v = self.fetch8(mem);
                self.y = v;
                self.set_nz(v);
                2
            }
            0xA4 => {
                let addr = self.zp(mem);
                self.y = self.read(mem, addr);
                let y = self.y;
                self.set_nz(y);
                3
            }
            0xB4 => {
                let addr = self.zp_x(mem);
                self.y = self.read(mem, addr);
                let y = self.y;
                self.set_nz(y);
                4
            }
            0xAC => {
                let addr = self.abs(mem);
                self.y = self.read(mem, addr);
                let y = self.y;
                self.set_nz(y);
                4
            }
            0xBC => {
                let (addr, crossed) = self.abs_x(mem);
                self.y = self.read(mem, addr);
                let y = self.y;
                self.set_nz(y);
                4 + crossed as u32
            }

            // stores
            0x85 => {
                let addr = self.zp(mem);
                let a = self.a;
                self.write(mem, addr, a);
                3
            }
            0x95 => {
                let addr = self.zp_x(mem);
                let a = self.a;
                self.write(mem, addr, a);
                4
            }
            0x8D => {
                let addr = self.abs(mem);
                let a = self.a;
                self.write(mem, addr, a);
                4
            }
            0x9D => {
                let (addr, _) = self.abs_x(mem);
                let a = self.a;
                self.write(mem, addr, a);
                5
            }
            0x99 => {
                let (addr, _) = self.abs_y(mem);
                let a = self.a;
                self.write(mem, addr, a);
                5
            }
            0x81 => {
                let addr = self.ind_x(mem);
                let a = self.a;
                self.write(mem, addr, a);
                6
            }
            0x91 => {
                let (addr, _) = self.ind_y(mem);
                let a = self.a;
                self.write(mem, addr, a);
                6
            }
            0x92 if self.cmos => {
                let addr = self.ind_zp(mem);
                let a = self.a;
                self.write(mem, addr, a);
                5
            }
            0x86 => {
                let addr = self.zp(mem);
                let x = self.x;
                self.write(mem, addr, x);
                3
            }
            0x96 => {
                let addr = self.zp_y(mem);
                let x = self.x;
                self.write(mem, addr, x);
                4
            }
            0x8E => {
                let addr = self.abs(mem);
                let x = self.x;
                self.write(mem, addr, x);
                4
            }
            0x84 => {
                let addr = self.zp(mem);
                let y = self.y;
                self.write(mem, addr, y);
                3
            }
            0x94 => {
                let addr = self.zp_x(mem);
                let y = self.y;
                self.write(mem, addr, y);
                4
            }
            0x8C => {
                let addr = self.abs(mem);
                let y = self.y;
                self.write(mem, addr, y);
                4
            }
            // stz (65C02)
            0x64 if self.cmos => {
                let addr = self.zp(mem);
                self.write(mem, addr, 0);
                3
            }
            0x74 if self.cmos => {
                let addr = self.zp_x(mem);
                self.write(mem, addr, 0);
                4
            }
            0x9C if self.cmos => {
                let addr = self.abs(mem);
                self.write(mem, addr, 0);
                4
            }
            0x9E if self.cmos => {
                let (addr, _) = self.abs_x(mem);
                self.write(mem, addr, 0);
                5
            }

            // shifts
            0x0A => {
                let (r, c) = (self.a << 1, self.a & 0x80 != 0);
                self.a = r;
                self.p.set(P6502::CARRY, c);
                self.set_nz(r);
                2
            }
            0x06 => self.rmw_zp(mem, Self::do_asl, 5),
            0x16 => self.rmw_zp_x(mem, Self::do_asl, 6),
            0x0E => self.rmw_abs(mem, Self::do_asl, 6),
            0x1E => self.rmw_abs_x(mem, Self::do_asl, 7),
            0x4A => {
                let c = self.a & 1 != 0;
                self.a >>= 1;
                self.p.set(P6502::CARRY, c);
                let a = self.a;
                self.set_nz(a);
                2
            }
            0x46 => self.rmw_zp(mem, Self::do_lsr, 5),
            0x56 => self.rmw_zp_x(mem, Self::do_lsr, 6),
            0x4E => self.rmw_abs(mem, Self::do_lsr, 6),
            0x5E => self.rmw_abs_x(mem, Self::do_lsr, 7),
            0x2A => {
                let carry_in = self.p.contains(P6502::CARRY) as u8;
                let c = self.a & 0x80 != 0;
                self.a = (self.a << 1) | carry_in;
                self.p.set(P6502::CARRY, c);
                let a = self.a;
                self.set_nz(a);
                2
            }
            0x26 => self.rmw_zp(mem, Self::do_rol, 5),
            0x36 => self.rmw_zp_x(mem, Self::do_rol, 6),
            0x2E => self.rmw_abs(mem, Self::do_rol, 6),
            0x3E => self.rmw_abs_x(mem, Self::do_rol, 7),
            0x6A => {
                let carry_in = (self.p.contains(P6502::CARRY) as u8) << 7;
                let c = self.a & 1 != 0;
                self.a = (self.a >> 1) | carry_in;
                self.p.set(P6502::CARRY, c);
                let a = self.a;
                self.set_nz(a);
                2
            }
            0x66 => self.rmw_zp(mem, Self::do_ror, 5),
            0x76 => self.rmw_zp_x(mem, Self::do_ror, 6),
            0x6E => self.rmw_abs(mem, Self::do_ror, 6),
            0x7E => self.rmw_abs_x(mem, Self::do_ror, 7),

            // inc / dec
            0xE6 => self.rmw_zp(mem, Self::do_inc, 5),
            0xF6 => self.rmw_zp_x(mem, Self::do_inc, 6),
            0xEE => self.rmw_abs(mem, Self::do_inc, 6),
            0xFE => self.rmw_abs_x(mem, Self::do_inc, 7),
            0xC6 => self.rmw_zp(mem, Self::do_dec, 5),
            0xD6 => self.rmw_zp_x(mem, Self::do_dec, 6),
            0xCE => self.rmw_abs(mem, Self::do_dec, 6),
            0xDE => self.rmw_abs_x(mem, Self::do_dec, 7),
            0x1A if self.cmos => {
                self.a = self.a.wrapping_add(1);
                let a = self.a;
                self.set_nz(a);
                2
            }
            0x3A if self.cmos => {
                self.a = self.a.wrapping_sub(1);
                let a = self.a;
                self.set_nz(a);
                2
            }
            0xE8 => {
                self.x = self.x.wrapping_add(1);
                let x = self.x;
                self.set_nz(x);
                2
            }
            0xCA => {
                self.x = self.x.wrapping_sub(1);
                let x = self.x;
                self.set_nz(x);
                2
            }
            0xC8 => {
                self.y = self.y.wrapping_add(1);
                let y = self.y;
                self.set_nz(y);
                2
            }
            0x88 => {
                self.y = self.y.wrapping_sub(1);
                let y = self.y;
                self.set_nz(y);
                2
            }

            // tsb / trb (65C02)
            0x04 if self.cmos => {
                let addr = self.zp(mem);
                let v = self.read(mem, addr);
                self.p.set(P6502::ZERO, v & self.a == 0);
                let r = v | self.a;
                self.write(mem, addr, r);
                5
            }
            0x0C if self.cmos => {
                let addr = self.abs(mem);
                let v = self.read(mem, addr);
                self.p.set(P6502::ZERO, v & self.a == 0);
                let r = v | self.a;
                self.write(mem, addr, r);
                6
            }
            0x14 if self.cmos => {
                let addr = self.zp(mem);
                let v = self.read(mem, addr);
                self.p.set(P6502::ZERO, v & self.a == 0);
                let r = v & !self.a;
                self.write(mem, addr, r);
                5
            }
            0x1C if self.cmos => {
                let addr = self.abs(mem);
                let v = self.read(mem, addr);
                self.p.set(P6502::ZERO, v & self.a == 0);
                let r = v & !self.a;
                self.write(mem, addr, r);
                6
            }

            // branches
            0x10 => self.branch(mem, !self.p.contains(P6502::NEGATIVE)),
            0x30 => self.branch(mem, self.p.contains(P6502::NEGATIVE)),
            0x50 => self.branch(mem, !self.p.contains(P6502::OVERFLOW)),
            0x70 => self.branch(mem, self.p.contains(P6502::OVERFLOW)),
            0x90 => self.branch(mem, !self.p.contains(P6502::CARRY)),
            0xB0 => self.branch(mem, self.p.contains(P6502::CARRY)),
            0xD0 => self.branch(mem, !self.p.contains(P6502::ZERO)),
            0xF0 => self.branch(mem, self.p.contains(P6502::ZERO)),
            0x80 if self.cmos => self.branch(mem, true),

            // jumps
            0x4C => {
                self.pc = self.abs(mem);
                3
            }
            0x6C => {
                let ptr = self.abs(mem);
                self.pc = self.read16_bug(mem, ptr);
                5
            }
            0x7C if self.cmos => {
                let base = self.abs(mem);
                let ptr = base.wrapping_add(self.x as u16);
                self.pc = self.read16(mem, ptr);
                6
            }
            0x20 => {
                let target = self.abs(mem);
                let ret = self.pc.wrapping_sub(1);
                self.push8(mem, (ret >> 8) as u8);
                self.push8(mem, ret as u8);
                self.pc = target;
                6
            }
            0x60 => {
                let lo = self.pop8(mem) as u16;
                let hi = self.pop8(mem) as u16;
                self.pc = (lo | (hi << 8)).wrapping_add(1);
                6
            }
            0x40 => {
                let p = self.pop8(mem);
                self.p = (P6502::from_bits_truncate(p) | P6502::UNUSED) - P6502::BREAK;
                let lo = self.pop8(mem) as u16;
                let hi = self.pop8(mem) as u16;
                self.pc = lo | (hi << 8);
                6
            }

            // stack
            0x48 => {
                let a = self.a;
                self.push8(mem, a);
                3
            }
            0x68 => {
                self.a = self.pop8(mem);
                let a = self.a;
                self.set_nz(a);
                4
            }
            0x08 => {
                let p = (self.p | P6502::UNUSED | P6502::BREAK).bits();
                self.push8(mem, p);
                3
            }
            0x28 => {
                let p = self.pop8(mem);
                self.p = (P6502::from_bits_truncate(p) | P6502::UNUSED) - P6502::BREAK;
                4
            }
            0xDA if self.cmos => {
                let x = self.x;
                self.push8(mem, x);
                3
            }
            0xFA if self.cmos => {
                self.x = self.pop8(mem);
                let x = self.x;
                self.set_nz(x);
                4
            }
            0x5A if self.cmos => {
                let y = self.y;
                self.push8(mem, y);
                3
            }
            0x7A if self.cmos => {
                self.y = self.pop8(mem);
                let y = self.y;
                self.set_nz(y);
                4
            }

            // transfers
            0xAA => {
                self.x = self.a;
                let x = self.x;
                self.set_nz(x);
                2
            }
            0x8A => {
                self.a = self.x;
                let a = self.a;
                self.set_nz(a);
                2
            }
            0xA8 => {
                self.y = self.a;
                let y = self.y;
                self.set_nz(y);
                2
            }
            0x98 => {
                self.a = self.y;
                let a = self.a;
                self.set_nz(a);
                2
            }
            0xBA => {
                self.x = self.s;
                let x = self.x;
                self.set_nz(x);
                2
            }
            0x9A => {
                self.s = self.x;
                2
            }

            // flags
            0x18 => {
                self.p.remove(P6502::CARRY);
                2
            }
            0x38 => {
                self.p.insert(P6502::CARRY);
                2
            }
            0x58 => {
                self.p.remove(P6502::IRQ_DISABLE);
                2
            }
            0x78 => {
                self.p.insert(P6502::IRQ_DISABLE);
                2
            }
            0xB8 => {
                self.p.remove(P6502::OVERFLOW);
                2
            }
            0xD8 => {
                self.p.remove(P6502::DECIMAL);
                2
            }
            0xF8 => {
                self.p.insert(P6502::DECIMAL);
                2
            }

            // nop
            0xEA => 2,

            // NMOS undocumented opcodes (stable subset).
            0xA7 if self.nmos_illegal => {
                let addr = self.zp(mem);
                let v = self.read(mem, addr);
                self.lax(v);
                3
            }
            0xB7 if self.nmos_illegal => {
                let addr = self.zp_y(mem);
                let v = self.read(mem, addr);
                self.lax(v);
                4
            }
            0xAF if self.nmos_illegal => {
                let addr = self.abs(mem);
                let v = self.read(mem, addr);
                self.lax(v);
                4
            }
            0xBF if self.nmos_illegal => {
                let (addr, crossed) = self.abs_y(mem);
                let v = self.read(mem, addr);
                self.lax(v);
                4 + crossed as u32
            }
            0xA3 if self.nmos_illegal => {
                let addr = self.ind_x(mem);
                let v = self.read(mem, addr);
                self.lax(v);
                6
            }
            0xB3 if self.nmos_illegal => {
                let (addr, crossed) = self.ind_y(mem);
                let v = self.read(mem, addr);
                self.lax(v);
                5 + crossed as u32
            }
            0x87 if self.nmos_illegal => {
                let addr = self.zp(mem);
                let v = self.a & self.x;
                self.write(mem, addr, v);
                3
            }
            0x97 if self.nmos_illegal => {
                let addr = self.zp_y(mem);
                let v = self.a & self.x;
                self.write(mem, addr, v);
                4
            }
            0x8F if self.nmos_illegal => {
                let addr = self.abs(mem);
                let v = self.a & self.x;
                self.write(mem, addr, v);
                4
            }
            0x83 if self.nmos_illegal => {
                let addr = self.ind_x(mem);
                let v = self.a & self.x;
                self.write(mem, addr, v);
                6
            }
            0xC7 if self.nmos_illegal => self.rmw_zp(mem, Self::do_dcp, 5),
            0xD7 if self.nmos_illegal => self.rmw_zp_x(mem, Self::do_dcp, 6),
            0xCF if self.nmos_illegal => self.rmw_abs(mem, Self::do_dcp, 6),
            0xDF if self.nmos_illegal => self.rmw_abs_x(mem, Self::do_dcp, 7),
            0xC3 if self.nmos_illegal => self.rmw_ind_x(mem, Self::do_dcp, 8),
            0xD3 if self.nmos_illegal => self.rmw_ind_y(mem, Self::do_dcp, 8),
            0xE7 if self.nmos_illegal => self.rmw_zp(mem, Self::do_isb, 5),
            0xF7 if self.nmos_illegal => self.rmw_zp_x(mem, Self::do_isb, 6),
            0xEF if self.nmos_illegal => self.rmw_abs(mem, Self::do_isb, 6),
            0xFF if self.nmos_illegal => self.rmw_abs_x(mem, Self::do_isb, 7),
            0xE3 if self.nmos_illegal => self.rmw_ind_x(mem, Self::do_isb, 8),
            0xF3 if self.nmos_illegal => self.rmw_ind_y(mem, Self::do_isb, 8),
            0x07 if self.nmos_illegal => self.rmw_zp(mem, Self::do_slo, 5),
            0x17 if self.nmos_illegal => self.rmw_zp_x(mem, Self::do_slo, 6),
            0x0F if self.nmos_illegal => self.rmw_abs(mem, Self::do_slo, 6),
            0x1F if self.nmos_illegal => self.rmw_abs_x(mem, Self::do_slo, 7),
            0x03 if self.nmos_illegal => self.rmw_ind_x(mem, Self::do_slo, 8),
            0x13 if self.nmos_illegal => self.rmw_ind_y(mem, Self::do_slo, 8),
            0x27 if self.nmos_illegal => self.rmw_zp(mem, Self::do_rla, 5),
            0x37 if self.nmos_illegal => self.rmw_zp_x(mem, Self::do_rla, 6),
            0x2F if self.nmos_illegal => self.rmw_abs(mem, Self::do_rla, 6),
            0x3F if self.nmos_illegal => self.rmw_abs_x(mem, Self::do_rla, 7),
            0x23 if self.nmos_illegal => self.rmw_ind_x(mem, Self::do_rla, 8),
            0x33 if self.nmos_illegal => self.rmw_ind_y(mem, Self::do_rla, 8),
            0x47 if self.nmos_illegal => self.rmw_zp(mem, Self::do_sre, 5),
            0x57 if self.nmos_illegal => self.rmw_zp_x(mem, Self::do_sre, 6),
            0x4F if self.nmos_illegal => self.rmw_abs(mem, Self::do_sre, 6),
            0x5F if self.nmos_illegal => self.rmw_abs_x(mem, Self::do_sre, 7),
            0x43 if self.nmos_illegal => self.rmw_ind_x(mem, Self::do_sre, 8),
            0x53 if self.nmos_illegal => self.rmw_ind_y(mem, Self::do_sre, 8),
            0x67 if self.nmos_illegal => self.rmw_zp(mem, Self::do_rra, 5),
            0x77 if self.nmos_illegal => self.rmw_zp_x(mem, Self::do_rra, 6),
            0x6F if self.nmos_illegal => self.rmw_abs(mem, Self::do_rra, 6),
            0x7F if self.nmos_illegal => self.rmw_abs_x(mem, Self::do_rra, 7),
            0x63 if self.nmos_illegal => self.rmw_ind_x(mem, Self::do_rra, 8),
            0x73 if self.nmos_illegal => self.rmw_ind_y(mem, Self::do_rra, 8),
            0x0B | 0x2B if self.nmos_illegal => {
                // anc
                let v = self.fetch8(mem);
                self.a &= v;
                let a = self.a;
                self.set_nz(a);
                self.p.set(P6502::CARRY, a & 0x80 != 0);
                2
            }
            0x4B if self.nmos_illegal => {
                // alr
                let v = self.fetch8(mem);
                self.a &= v;
                let c = self.a & 1 != 0;
                self.a >>= 1;
                self.p.set(P6502::CARRY, c);
                let a = self.a;
                self.set_nz(a);
                2
            }
            0x6B if self.nmos_illegal => {
                // arr
                let v = self.fetch8(mem);
                let and = self.a & v;
                let carry_in = (self.p.contains(P6502::CARRY) as u8) << 7;
                self.a = (and >> 1) | carry_in;
                let a = self.a;
                self.set_nz(a);
                self.p.set(P6502::CARRY, a & 0x40 != 0);
                self.p
                    .set(P6502::OVERFLOW, ((a >> 6) ^ (a >> 5)) & 1 != 0);
                2
            }
            0xCB if self.nmos_illegal => {
                // sbx
                let v = self.fetch8(mem);
                let and = self.a & self.x;
                self.p.set(P6502::CARRY, and >= v);
                self.x = and.wrapping_sub(v);
                let x = self.x;
                self.set_nz(x);
                2
            }
            0x02 | 0x12 | 0x22 | 0x32 | 0x42 | 0x52 | 0x62 | 0x72 | 0x92 | 0xB2 | 0xD2 | 0xF2
                if self.nmos_illegal =>
            {
                // kil
                self.jammed = true;
                self.pc = self.pc.wrapping_sub(1);
                0
            }

            // Everything else behaves as a NOP of documented length
            // and timing.
            _ => self.undefined_nop(mem, opcode),
        }
    }

    /// NOP lengths and cycles for the undefined columns.
    fn undefined_nop(&mut self, mem: &mut [u8], opcode: u8) -> u32 {
        let _ = mem;
        match opcode {
            // imm-operand NOPs
            0x80 | 0x82 | 0x89 | 0xC2 | 0xE2 => {
                self.pc = self.pc.wrapping_add(1);
                2
            }
            // zp
            0x04 | 0x44 | 0x64 => {
                self.pc = self.pc.wrapping_add(1);
                3
            }
            // zp,X
            0x14 | 0x34 | 0x54 | 0x74 | 0xD4 | 0xF4 => {
                self.pc = self.pc.wrapping_add(1);
                4
            }
            // abs / abs,X
            0x0C | 0x1C | 0x3C | 0x5C | 0x7C | 0xDC | 0xFC => {
                self.pc = self.pc.wrapping_add(2);
                4
            }
            _ => 2,
        }
    }

    // --- ALU helpers ---

    fn set_nz(&mut self, value: u8) {
        self.p.set(P6502::ZERO, value == 0);
        self.p.set(P6502::NEGATIVE, value & 0x80 != 0);
    }

    fn ora(&mut self, v: u8) {
        self.a |= v;
        let a = self.a;
        self.set_nz(a);
    }

    fn and(&mut self, v: u8) {
        self.a &= v;
        let a = self.a;
        self.set_nz(a);
    }

    fn eor(&mut self, v: u8) {
        self.a ^= v;
        let a = self.a;
        self.set_nz(a);
    }

    fn lax(&mut self, v: u8) {
        self.a = v;
        self.x = v;
        self.set_nz(v);
    }

    fn compare(&mut self, reg: u8, v: u8) {
        let diff = reg.wrapping_sub(v);
        self.p.set(P6502::CARRY, reg >= v);
        self.set_nz(diff);
    }

    fn bit(&mut self, v: u8) {
        self.p.set(P6502::ZERO, self.a & v == 0);
        self.p.set(P6502::NEGATIVE, v & 0x80 != 0);
        self.p.set(P6502::OVERFLOW, v & 0x40 != 0);
    }

    /// ADC with 6502 decimal rules. Returns the extra cycle a 65C02
    /// charges in decimal mode, plus the base 2.
    fn adc(&mut self, v: u8) -> u32 {
        let carry = self.p.contains(P6502::CARRY) as u16;
        let a = self.a as u16;
        let bin = a + v as u16 + carry;
        if self.bcd_enabled && self.p.contains(P6502::DECIMAL) {
            let mut lo = (a & 0xF) + (v as u16 & 0xF) + carry;
            let mut hi = (a >> 4) + (v as u16 >> 4);
            if lo > 9 {
                lo += 6;
                hi += 1;
            }
            // NMOS parts compute N and V from the intermediate binary
            // result; the 65C02 fixes the flags (and pays a cycle).
            self.p.set(P6502::OVERFLOW, (!(a ^ v as u16) & (a ^ (hi << 4)) & 0x80) != 0);
            if hi > 9 {
                hi += 6;
            }
            let result = ((hi & 0xF) << 4) | (lo & 0xF);
            self.p.set(P6502::CARRY, hi > 0xF);
            self.a = result as u8;
            if self.cmos {
                let a = self.a;
                self.set_nz(a);
                3
            } else {
                self.p.set(P6502::ZERO, bin as u8 == 0);
                self.p.set(P6502::NEGATIVE, (hi << 4) & 0x80 != 0);
                2
            }
        } else {
            self.p.set(P6502::CARRY, bin > 0xFF);
            self.p
                .set(P6502::OVERFLOW, (!(a ^ v as u16) & (a ^ bin) & 0x80) != 0);
            self.a = bin as u8;
            let a = self.a;
            self.set_nz(a);
            2
        }
    }

    /// SBC with 6502 decimal rules; same cycle convention as `adc`.
    fn sbc(&mut self, v: u8) -> u32 {
        let borrow = !self.p.contains(P6502::CARRY) as i16;
        let a = self.a as i16;
        let bin = a - v as i16 - borrow;
        self.p.set(P6502::CARRY, bin >= 0);
        self.p.set(
            P6502::OVERFLOW,
            ((a ^ v as i16) & (a ^ bin) & 0x80) != 0,
        );
        if self.bcd_enabled && self.p.contains(P6502::DECIMAL) {
            let mut lo = (a & 0xF) - (v as i16 & 0xF) - borrow;
            let mut hi = (a >> 4) - (v as i16 >> 4);
            if lo < 0 {
                lo -= 6;
                hi -= 1;
            }
            if hi < 0 {
                hi -= 6;
            }
            let result = (((hi & 0xF) << 4) | (lo & 0xF)) as u8;
            self.a = result;
            if self.cmos {
                let a = self.a;
                self.set_nz(a);
                3
            } else {
                self.set_nz(bin as u8);
                2
            }
        } else {
            self.a = bin as u8;
            let a = self.a;
            self.set_nz(a);
            2
        }
    }

    // --- RMW helpers ---

    fn do_asl(&mut self, v: u8) -> u8 {
        self.p.set(P6502::CARRY, v & 0x80 != 0);
        let r = v << 1;
        self.set_nz(r);
        r
    }

    fn do_lsr(&mut self, v: u8) -> u8 {
        self.p.set(P6502::CARRY, v & 1 != 0);
        let r = v >> 1;
        self.set_nz(r);
        r
    }

    fn do_rol(&mut self, v: u8) -> u8 {
        let carry_in = self.p.contains(P6502::CARRY) as u8;
        self.p.set(P6502::CARRY, v & 0x80 != 0);
        let r = (v << 1) | carry_in;
        self.set_nz(r);
        r
    }

    fn do_ror(&mut self, v: u8) -> u8 {
        let carry_in = (self.p.contains(P6502::CARRY) as u8) << 7;
        self.p.set(P6502::CARRY, v & 1 != 0);
        let r = (v >> 1) | carry_in;
        self.set_nz(r);
        r
    }

    fn do_inc(&mut self, v: u8) -> u8 {
        let r = v.wrapping_add(1);
        self.set_nz(r);
        r
    }

    fn do_dec(&mut self, v: u8) -> u8 {
        let r = v.wrapping_sub(1);
        self.set_nz(r);
        r
    }

    fn do_dcp(&mut self, v: u8) -> u8 {
        let r = v.wrapping_sub(1);
        let a = self.a;
        self.compare(a, r);
        r
    }

    fn do_isb(&mut self, v: u8) -> u8 {
        let r = v.wrapping_add(1);
        self.sbc(r);
        r
    }

    fn do_slo(&mut self, v: u8) -> u8 {
        self.p.set(P6502::CARRY, v & 0x80 != 0);
        let r = v << 1;
        self.ora(r);
        r
    }

    fn do_rla(&mut self, v: u8) -> u8 {
        let carry_in = self.p.contains(P6502::CARRY) as u8;
        self.p.set(P6502::CARRY, v & 0x80 != 0);
        let r = (v << 1) | carry_in;
        self.and(r);
        r
    }

    fn do_sre(&mut self, v: u8) -> u8 {
        self.p.set(P6502::CARRY, v & 1 != 0);
        let r = v >> 1;
        self.eor(r);
        r
    }

    fn do_rra(&mut self, v: u8) -> u8 {
        let carry_in = (self.p.contains(P6502::CARRY) as u8) << 7;
        self.p.set(P6502::CARRY, v & 1 != 0);
        let r = (v >> 1) | carry_in;
        self.adc(r);
        r
    }

    fn rmw_zp(&mut self, mem: &mut [u8], f: fn(&mut Self, u8) -> u8, cycles: u32) -> u32 {
        let addr = self.zp(mem);
        let v = self.read(mem, addr);
        let r = f(self, v);
        self.write(mem, addr, r);
        cycles
    }

    fn rmw_zp_x(&mut self, mem: &mut [u8], f: fn(&mut Self, u8) -> u8, cycles: u32) -> u32 {
        let addr = self.zp_x(mem);
        let v = self.read(mem, addr);
        let r = f(self, v);
        self.write(mem, addr, r);
        cycles
    }

    fn rmw_abs(&mut self, mem: &mut [u8], f: fn(&mut Self, u8) -> u8, cycles: u32) -> u32 {
        let addr = self.abs(mem);
        let v = self.read(mem, addr);
        let r = f(self, v);
        self.write(mem, addr, r);
        cycles
    }

    fn rmw_abs_x(&mut self, mem: &mut [u8], f: fn(&mut Self, u8) -> u8, cycles: u32) -> u32 {
        let (addr, _) = self.abs_x(mem);
        let v = self.read(mem, addr);
        let r = f(self, v);
        self.write(mem, addr, r);
        cycles
    }

    fn rmw_ind_x(&mut self, mem: &mut [u8], f: fn(&mut Self, u8) -> u8, cycles: u32) -> u32 {
        let addr = self.ind_x(mem);
        let v = self.read(mem, addr);
        let r = f(self, v);
        self.write(mem, addr, r);
        cycles
    }

    fn rmw_ind_y(&mut self, mem: &mut [u8], f: fn(&mut Self, u8) -> u8, cycles: u32) -> u32 {
        let (addr, _) = self.ind_y(mem);
        let v = self.read(mem, addr);
        let r = f(self, v);
        self.write(mem, addr, r);
        cycles
    }

    // --- Addressing ---

    fn fetch8(&mut self, mem: &[u8]) -> u8 {
        let v = self.read(mem, self.pc);
        self.pc = self.pc.wrapping_add(1);
        v
    }

    fn fetch16(&mut self, mem: &[u8]) -> u16 {
        let lo = self.fetch8(mem) as u16;
        let hi = self.fetch8(mem) as u16;
        lo | (hi << 8)
    }

    fn zp(&mut self, mem: &[u8]) -> u16 {
        self.fetch8(mem) as u16
    }

    fn zp_x(&mut self, mem: &[u8]) -> u16 {
        self.fetch8(mem).wrapping_add(self.x) as u16
    }

    fn zp_y(&mut self, mem: &[u8]) -> u16 {
        self.fetch8(mem).wrapping_add(self.y) as u16
    }

    fn abs(&mut self, mem: &[u8]) -> u16 {
        self.fetch16(mem)
    }

    fn abs_x(&mut self, mem: &[u8]) -> (u16, bool) {
        let base = self.fetch16(mem);
        let addr = base.wrapping_add(self.x as u16);
        (addr, (base ^ addr) & 0xFF00 != 0)
    }

    fn abs_y(&mut self, mem: &[u8]) -> (u16, bool) {
        let base = self.fetch16(mem);
        let addr = base.wrapping_add(self.y as u16);
        (addr, (base ^ addr) & 0xFF00 != 0)
    }

    fn ind_x(&mut self, mem: &[u8]) -> u16 {
        let zp = self.fetch8(mem).wrapping_add(self.x);
        let lo = self.read(mem, zp as u16) as u16;
        let hi = self.read(mem, zp.wrapping_add(1) as u16) as u16;
        lo | (hi << 8)
    }

    fn ind_y(&mut self, mem: &[u8]) -> (u16, bool) {
        let zp = self.fetch8(mem);
        let lo = self.read(mem, zp as u16) as u16;
        let hi = self.read(mem, zp.wrapping_add(1) as u16) as u16;
        let base = lo | (hi << 8);
        let addr = base.wrapping_add(self.y as u16);
        (addr, (base ^ addr) & 0xFF00 != 0)
    }

    /// 65C02 (zp) mode.
    fn ind_zp(&mut self, mem: &[u8]) -> u16 {
        let zp = self.fetch8(mem);
        let lo = self.read(mem, zp as u16) as u16;
        let hi = self.read(mem, zp.wrapping_add(1) as u16) as u16;
        lo | (hi << 8)
    }

    fn branch(&mut self, mem: &[u8], taken: bool) -> u32 {
        let rel = self.fetch8(mem) as i8;
        if !taken {
            return 2;
        }
        let old = self.pc;
        self.pc = self.pc.wrapping_add(rel as u16);
        // +1 for the taken branch, +1 more for a page crossing.
        3 + ((old ^ self.pc) & 0xFF00 != 0) as u32
    }

    // --- Stack ---

    fn push8(&mut self, mem: &mut [u8], value: u8) {
        let addr = 0x0100 | self.s as u16;
        self.write(mem, addr, value);
        self.s = self.s.wrapping_sub(1);
    }

    fn pop8(&mut self, mem: &[u8]) -> u8 {
        self.s = self.s.wrapping_add(1);
        let addr = 0x0100 | self.s as u16;
        self.read(mem, addr)
    }
}
