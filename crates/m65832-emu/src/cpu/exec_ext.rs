//! The $02 extended-prefix families.
//!
//! $02 selects the extended page in every mode (unlike the 65816,
//! where it is COP in emulation). The second byte picks a family:
//! MUL/DIV, atomics, base-register sets, register-window control,
//! TRAP/COP, T transfers, 64-bit loads/stores, LEA, the FPU blocks,
//! and the register-targeted ALU / barrel shifter / extend groups.

use crate::cpu::addressing::{AddrMode, Operand};
use crate::cpu::{alu, Cpu};
use crate::exception::Exception;
use crate::mmu::Access;
use crate::reg::status::P_S;

pub fn execute(cpu: &mut Cpu) -> Result<u64, Exception> {
    let sub = cpu.fetch8()?;
    match sub {
        // mul
        0x00 => op_mul(cpu, AddrMode::Imm, 8),
        0x01 => op_mul(cpu, AddrMode::Dp, 9),
        0x02 => op_mul(cpu, AddrMode::Abs, 10),
        0x03 => op_mul(cpu, AddrMode::AbsX, 10),
        // div
        0x04 => op_div(cpu, AddrMode::Imm, 12),
        0x05 => op_div(cpu, AddrMode::Dp, 13),
        0x06 => op_div(cpu, AddrMode::Abs, 14),
        0x07 => op_div(cpu, AddrMode::AbsX, 14),

        // cas
        0x10 => op_cas(cpu, AddrMode::Dp, 8),
        0x11 => op_cas(cpu, AddrMode::Abs, 9),
        // lli
        0x12 => op_lli(cpu, AddrMode::Dp, 4),
        0x13 => op_lli(cpu, AddrMode::Abs, 5),
        // sci
        0x14 => op_sci(cpu, AddrMode::Dp, 4),
        0x15 => op_sci(cpu, AddrMode::Abs, 5),

        0x20 => {
            // sd #imm32
            cpu.d = cpu.fetch32()?;
            Ok(3)
        }
        0x21 => {
            // sb #imm32
            cpu.b = cpu.fetch32()?;
            Ok(3)
        }
        0x22 => {
            // tad
            cpu.d = cpu.a;
            Ok(2)
        }
        0x23 => {
            // tab
            cpu.b = cpu.a;
            Ok(2)
        }
        0x24 => {
            // tda
            cpu.a = cpu.d;
            cpu.p.set_nz(cpu.a, 4);
            Ok(2)
        }
        0x25 => {
            // tba
            cpu.a = cpu.b;
            cpu.p.set_nz(cpu.a, 4);
            Ok(2)
        }
        0x26 => {
            // tav (supervisor)
            if !cpu.p.s {
                return Err(Exception::Privilege);
            }
            cpu.vbr = cpu.a;
            Ok(2)
        }
        0x27 => {
            // tva (supervisor)
            if !cpu.p.s {
                return Err(Exception::Privilege);
            }
            cpu.a = cpu.vbr;
            cpu.p.set_nz(cpu.a, 4);
            Ok(2)
        }

        0x30 => {
            // enr
            cpu.p.r = true;
            Ok(2)
        }
        0x31 => {
            // dsr
            cpu.p.r = false;
            Ok(2)
        }
        0x32 => op_sepw(cpu),
        0x33 => op_repw(cpu),

        0x40 => {
            // trap
            Err(Exception::Syscall)
        }
        0x41 => {
            // cop: the signature byte is consumed before vectoring
            cpu.fetch8()?;
            Err(Exception::Cop)
        }

        0x86 => {
            // tta
            cpu.a = cpu.t;
            cpu.p.set_nz(cpu.a, 4);
            Ok(2)
        }
        0x87 => {
            // tat
            cpu.t = cpu.a;
            Ok(2)
        }

        // ldq / stq
        0x88 => op_ldq(cpu, AddrMode::Dp, 7),
        0x89 => op_ldq(cpu, AddrMode::Abs, 8),
        0x8A => op_stq(cpu, AddrMode::Dp, 7),
        0x8B => op_stq(cpu, AddrMode::Abs, 8),

        // lea
        0xA0 => op_lea(cpu, false, 3),
        0xA1 => op_lea(cpu, true, 3),
        0xA2 => op_lea_abs(cpu, false, 3),
        0xA3 => op_lea_abs(cpu, true, 3),

        // fpu, single then double
        0xC0..=0xCA => op_fpu(cpu, sub - 0xC0, false),
        0xD0..=0xDA => op_fpu(cpu, sub - 0xD0, true),

        0xE8 => op_alur(cpu),
        0xE9 => op_shift(cpu),
        0xEA => op_ext_group(cpu),

        _ => illegal(cpu, sub),
    }
}

/// Undefined extended encodings: NOP under P.K, illegal-op trap
/// otherwise.
fn illegal(cpu: &mut Cpu, _sub: u8) -> Result<u64, Exception> {
    if cpu.p.k {
        Ok(2)
    } else {
        Err(Exception::IllegalOpcode(cpu.opcode))
    }
}

fn op_mul(cpu: &mut Cpu, mode: AddrMode, cycles: u64) -> Result<u64, Exception> {
    let w = cpu.p.a_width();
    let op = cpu.resolve(mode)?;
    let v = cpu.load_op(op, w)?;
    let (lo, hi) = alu::mul(cpu.a_w(), v, w);
    cpu.set_a(lo, w);
    cpu.t = hi;
    cpu.p.set_nz(lo, w);
    Ok(cycles)
}

fn op_div(cpu: &mut Cpu, mode: AddrMode, cycles: u64) -> Result<u64, Exception> {
    let w = cpu.p.a_width();
    let op = cpu.resolve(mode)?;
    let v = cpu.load_op(op, w)?;
    let a = cpu.a_w();
    if v == 0 {
        // Division by zero saturates and flags V; no trap.
        cpu.set_a(alu::mask(w), w);
        cpu.t = a;
        cpu.p.v = true;
        cpu.p.set_nz(alu::mask(w), w);
        return Ok(cycles);
    }
    let (q, r) = alu::div(a, v, w);
    cpu.set_a(q, w);
    cpu.t = r;
    cpu.p.v = false;
    cpu.p.set_nz(q, w);
    Ok(cycles)
}

/// Compare-and-swap: if the operand equals X the accumulator is
/// stored and Z set; otherwise X is loaded with the observed value and
/// Z cleared. The location is translated with write intent up front,
/// like any atomic RMW.
fn op_cas(cpu: &mut Cpu, mode: AddrMode, cycles: u64) -> Result<u64, Exception> {
    let w = cpu.p.a_width();
    let op = cpu.resolve(mode)?;
    if let Operand::Mem(addr) = op {
        cpu.pretranslate(addr, w as u32, Access::Store)?;
    }
    let current = cpu.load_op(op, w)?;
    if current == cpu.x_w() {
        let a = cpu.a_w();
        cpu.store_op(op, a, w)?;
        cpu.p.z = true;
    } else {
        cpu.set_x(current, w);
        cpu.p.z = false;
    }
    Ok(cycles)
}

/// Load-linked: loads the operand and arms the reservation.
fn op_lli(cpu: &mut Cpu, mode: AddrMode, cycles: u64) -> Result<u64, Exception> {
    let w = cpu.p.a_width();
    let op = cpu.resolve(mode)?;
    let v = cpu.load_op(op, w)?;
    cpu.set_a(v, w);
    cpu.p.set_nz(v, w);
    if let Operand::Mem(addr) = op {
        let pa = cpu.mmu.probe(&cpu.bus.ram, addr).unwrap_or(addr);
        cpu.set_reservation(pa);
    }
    Ok(cycles)
}

/// Store-conditional: stores only if the reservation survived; any
/// intervening store to any address has killed it.
fn op_sci(cpu: &mut Cpu, mode: AddrMode, cycles: u64) -> Result<u64, Exception> {
    let w = cpu.p.a_width();
    let op = cpu.resolve(mode)?;
    match op {
        Operand::Mem(addr) => {
            let pa = cpu.mmu.probe(&cpu.bus.ram, addr).unwrap_or(addr);
            if cpu.take_reservation(pa) {
                let a = cpu.a_w();
                cpu.write(addr, a, w)?;
                cpu.p.z = true;
            } else {
                cpu.p.z = false;
            }
        }
        _ => cpu.p.z = false,
    }
    Ok(cycles)
}

fn op_sepw(cpu: &mut Cpu) -> Result<u64, Exception> {
    let m = cpu.fetch16()?;
    let mut bits = cpu.p.bits() | m;
    if !cpu.p.s {
        // User mode cannot forge the supervisor bit.
        bits &= !P_S;
    }
    cpu.p.set_bits(bits);
    Ok(3)
}

fn op_repw(cpu: &mut Cpu) -> Result<u64, Exception> {
    let m = cpu.fetch16()?;
    let bits = cpu.p.bits() & !m;
    cpu.p.set_bits(bits);
    Ok(3)
}

fn op_ldq(cpu: &mut Cpu, mode: AddrMode, cycles: u64) -> Result<u64, Exception> {
    let op = cpu.resolve(mode)?;
    match op {
        Operand::Mem(addr) => {
            let v = cpu.read64(addr)?;
            cpu.a = v as u32;
            cpu.t = (v >> 32) as u32;
        }
        Operand::Window(idx) => {
            cpu.a = cpu.window.get(idx);
            cpu.t = cpu.window.get(idx + 1);
        }
        Operand::Imm(_) => unreachable!("ldq has no immediate form"),
    }
    cpu.p.set_nz(cpu.a, 4);
    Ok(cycles)
}

fn op_stq(cpu: &mut Cpu, mode: AddrMode, cycles: u64) -> Result<u64, Exception> {
    let op = cpu.resolve(mode)?;
    match op {
        Operand::Mem(addr) => {
            let v = (cpu.a as u64) | ((cpu.t as u64) << 32);
            cpu.write64(addr, v)?;
        }
        Operand::Window(idx) => {
            cpu.window.set(idx, cpu.a);
            cpu.window.set(idx + 1, cpu.t);
        }
        Operand::Imm(_) => unreachable!("stq has no immediate form"),
    }
    Ok(cycles)
}

/// LEA computes the direct-page address even when the register window
/// is enabled: it is an address computation, not an access.
fn op_lea(cpu: &mut Cpu, indexed: bool, cycles: u64) -> Result<u64, Exception> {
    let dp8 = cpu.fetch8()? as u32;
    let index = if indexed { cpu.x_w() } else { 0 };
    let addr = cpu.d.wrapping_add(dp8.wrapping_add(index));
    cpu.a = addr;
    cpu.p.set_nz(addr, 4);
    Ok(cycles)
}

fn op_lea_abs(cpu: &mut Cpu, indexed: bool, cycles: u64) -> Result<u64, Exception> {
    let abs = cpu.fetch_abs()?;
    let index = if indexed { cpu.x_w() } else { 0 };
    let addr = cpu.b.wrapping_add(abs).wrapping_add(index);
    cpu.a = addr;
    cpu.p.set_nz(addr, 4);
    Ok(cycles)
}

// --- FPU ---

/// Two-operand destructive FPU ops: Fd = Fd op Fs. The register byte
/// is fd<<4 | fs. `.S` works on the low 32 bits, `.D` on all 64.
fn op_fpu(cpu: &mut Cpu, op: u8, double: bool) -> Result<u64, Exception> {
    let rb = cpu.fetch8()?;
    let fd = (rb >> 4) as usize;
    let fs = (rb & 0xF) as usize;
    if double {
        fpu_d(cpu, op, fd, fs)
    } else {
        fpu_s(cpu, op, fd, fs)
    }
}

fn fpu_s(cpu: &mut Cpu, op: u8, fd: usize, fs: usize) -> Result<u64, Exception> {
    let a = cpu.fregs.read_s(fd);
    let b = cpu.fregs.read_s(fs);
    match op {
        0x0 => cpu.fregs.write_s(fd, a + b),
        0x1 => cpu.fregs.write_s(fd, a - b),
        0x2 => cpu.fregs.write_s(fd, a * b),
        0x3 => cpu.fregs.write_s(fd, a / b),
        0x4 => cpu.fregs.write_s(fd, a.sqrt()),
        0x5 => cpu.fregs.write_s(fd, -a),
        0x6 => cpu.fregs.write_s(fd, a.abs()),
        0x7 => fcmp(cpu, a.partial_cmp(&b)),
        0x8 => {
            // i2f.s
            cpu.fregs.write_s(fd, cpu.a as i32 as f32);
        }
        0x9 => {
            // f2i.s, saturating
            cpu.a = a as i32 as u32;
            cpu.p.set_nz(cpu.a, 4);
        }
        0xA => cpu.fregs.write_s(fd, b),
        _ => unreachable!("op range checked by the dispatcher"),
    }
    Ok(4)
}

fn fpu_d(cpu: &mut Cpu, op: u8, fd: usize, fs: usize) -> Result<u64, Exception> {
    let a = cpu.fregs.read_d(fd);
    let b = cpu.fregs.read_d(fs);
    match op {
        0x0 => cpu.fregs.write_d(fd, a + b),
        0x1 => cpu.fregs.write_d(fd, a - b),
        0x2 => cpu.fregs.write_d(fd, a * b),
        0x3 => cpu.fregs.write_d(fd, a / b),
        0x4 => cpu.fregs.write_d(fd, a.sqrt()),
        0x5 => cpu.fregs.write_d(fd, -a),
        0x6 => cpu.fregs.write_d(fd, a.abs()),
        0x7 => fcmp(cpu, a.partial_cmp(&b)),
        0x8 => {
            // i2f.d
            cpu.fregs.write_d(fd, cpu.a as i32 as f64);
        }
        0x9 => {
            // f2i.d, saturating
            cpu.a = a as i32 as u32;
            cpu.p.set_nz(cpu.a, 4);
        }
        0xA => cpu.fregs.write_d(fd, b),
        _ => unreachable!("op range checked by the dispatcher"),
    }
    Ok(4)
}

fn fcmp(cpu: &mut Cpu, ord: Option<std::cmp::Ordering>) {
    use std::cmp::Ordering;
    match ord {
        Some(Ordering::Equal) => {
            cpu.p.z = true;
            cpu.p.n = false;
            cpu.p.c = true;
            cpu.p.v = false;
        }
        Some(Ordering::Less) => {
            cpu.p.z = false;
            cpu.p.n = true;
            cpu.p.c = false;
            cpu.p.v = false;
        }
        Some(Ordering::Greater) => {
            cpu.p.z = false;
            cpu.p.n = false;
            cpu.p.c = true;
            cpu.p.v = false;
        }
        None => {
            // Unordered.
            cpu.p.z = false;
            cpu.p.n = false;
            cpu.p.c = false;
            cpu.p.v = true;
        }
    }
}

// --- Register-targeted ALU ---

fn read_reg(cpu: &Cpu, reg: u8, w: u8) -> Result<u32, Exception> {
    let v = match reg {
        0 => cpu.a,
        1 => cpu.x,
        2 => cpu.y,
        3 => cpu.t,
        4 => cpu.s,
        5 => cpu.d,
        6 => cpu.b,
        _ => return Err(Exception::IllegalOpcode(cpu.opcode)),
    };
    Ok(v & alu::mask(w))
}

fn write_reg(cpu: &mut Cpu, reg: u8, value: u32, w: u8) {
    let m = alu::mask(w);
    let merge = |old: u32| (old & !m) | (value & m);
    match reg {
        0 => cpu.a = merge(cpu.a),
        1 => cpu.x = merge(cpu.x),
        2 => cpu.y = merge(cpu.y),
        3 => cpu.t = merge(cpu.t),
        4 => {
            let s = merge(cpu.s);
            cpu.set_s(s);
        }
        5 => cpu.d = merge(cpu.d),
        6 => cpu.b = merge(cpu.b),
        _ => {}
    }
}

/// $E8: third byte is op<<4 | reg, operating at the accumulator width.
fn op_alur(cpu: &mut Cpu) -> Result<u64, Exception> {
    let spec = cpu.fetch8()?;
    let op = spec >> 4;
    let reg = spec & 0xF;
    let w = cpu.p.a_width();
    let rv = read_reg(cpu, reg, w)?;
    let a = cpu.a_w();
    match op {
        0x0 => {
            // add
            let (r, c, v) = alu::adc(a, rv, false, w);
            cpu.set_a(r, w);
            cpu.p.c = c;
            cpu.p.v = v;
            cpu.p.set_nz(r, w);
        }
        0x1 => {
            // sub
            let (r, c, v) = alu::sbc(a, rv, true, w);
            cpu.set_a(r, w);
            cpu.p.c = c;
            cpu.p.v = v;
            cpu.p.set_nz(r, w);
        }
        0x2 => {
            // and
            let r = a & rv;
            cpu.set_a(r, w);
            cpu.p.set_nz(r, w);
        }
        0x3 => {
            // or
            let r = a | rv;
            cpu.set_a(r, w);
            cpu.p.set_nz(r, w);
        }
        0x4 => {
            // eor
            let r = a ^ rv;
            cpu.set_a(r, w);
            cpu.p.set_nz(r, w);
        }
        0x5 => {
            // cmp
            let (c, z, n) = alu::cmp(a, rv, w);
            cpu.p.c = c;
            cpu.p.z = z;
            cpu.p.n = n;
        }
        0x6 => {
            // mov a <- reg
            cpu.set_a(rv, w);
            cpu.p.set_nz(rv, w);
        }
        0x7 => {
            // mov reg <- a
            write_reg(cpu, reg, a, w);
            cpu.p.set_nz(a, w);
        }
        0x8 => {
            // neg
            let r = 0u32.wrapping_sub(rv) & alu::mask(w);
            write_reg(cpu, reg, r, w);
            cpu.p.set_nz(r, w);
        }
        0x9 => {
            // not
            let r = !rv & alu::mask(w);
            write_reg(cpu, reg, r, w);
            cpu.p.set_nz(r, w);
        }
        _ => return illegal(cpu, spec),
    }
    Ok(3)
}

/// $E9: barrel shifter, third byte is op<<5 | count.
fn op_shift(cpu: &mut Cpu) -> Result<u64, Exception> {
    let spec = cpu.fetch8()?;
    let count = (spec & 0x1F) as u32;
    let op = match spec >> 5 {
        0 => alu::ShiftOp::Shl,
        1 => alu::ShiftOp::Shr,
        2 => alu::ShiftOp::Sar,
        3 => alu::ShiftOp::Rol,
        4 => alu::ShiftOp::Ror,
        _ => return illegal(cpu, spec),
    };
    let w = cpu.p.a_width();
    let (r, c) = alu::barrel(op, cpu.a_w(), count, cpu.p.c, w);
    cpu.set_a(r, w);
    cpu.p.c = c;
    cpu.p.set_nz(r, w);
    Ok(3)
}

/// $EA: extend group; results are always full 32-bit.
fn op_ext_group(cpu: &mut Cpu) -> Result<u64, Exception> {
    let spec = cpu.fetch8()?;
    let op = match spec {
        0 => alu::ExtOp::Sext8,
        1 => alu::ExtOp::Sext16,
        2 => alu::ExtOp::Zext8,
        3 => alu::ExtOp::Zext16,
        4 => alu::ExtOp::Clz,
        5 => alu::ExtOp::Ctz,
        6 => alu::ExtOp::Popcnt,
        _ => return illegal(cpu, spec),
    };
    cpu.a = alu::extend(op, cpu.a);
    cpu.p.set_nz(cpu.a, 4);
    Ok(3)
}
