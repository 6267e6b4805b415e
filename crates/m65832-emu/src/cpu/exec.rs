//! Base opcode page dispatch.
//!
//! Keyed on the first opcode byte. The map is the 65816 page with the
//! M65832 deviations: $02 is the universal extended prefix in every
//! mode, $AB is LDA long, $B3 is LDA [dp],Y, and $44/$54 are the
//! incrementing/decrementing block moves. Long (24-bit) addressing
//! decodes as an illegal operation in W=11.

use crate::cpu::addressing::{AddrMode, Operand};
use crate::cpu::{alu, exec_ext, Cpu};
use crate::exception::Exception;
use crate::mmu::Access;

/// Fetch and execute a single instruction, returning its cycle count.
pub fn execute_one(cpu: &mut Cpu) -> Result<u64, Exception> {
    let opcode = cpu.fetch8()?;
    cpu.opcode = opcode;
    execute(cpu, opcode)
}

pub fn execute(cpu: &mut Cpu, opcode: u8) -> Result<u64, Exception> {
    match opcode {
        0x00 => op_brk(cpu),
        0x01 => op_ora(cpu, AddrMode::IndDpX, 6),
        0x02 => exec_ext::execute(cpu),
        0x03 => op_ora(cpu, AddrMode::Sr, 4),
        0x04 => op_tsb(cpu, AddrMode::Dp, 5),
        0x05 => op_ora(cpu, AddrMode::Dp, 3),
        0x06 => op_asl_mem(cpu, AddrMode::Dp, 5),
        0x07 => op_ora(cpu, AddrMode::IndDpLong, 6),
        0x08 => op_php(cpu),
        0x09 => op_ora(cpu, AddrMode::Imm, 2),
        0x0A => op_asl_a(cpu),
        0x0B => op_phd(cpu),
        0x0C => op_tsb(cpu, AddrMode::Abs, 6),
        0x0D => op_ora(cpu, AddrMode::Abs, 4),
        0x0E => op_asl_mem(cpu, AddrMode::Abs, 6),
        0x0F => op_ora(cpu, AddrMode::Long, 5),

        0x10 => {
            // bpl
            let taken = !cpu.p.n;
            op_branch(cpu, taken)
        }
        0x11 => op_ora(cpu, AddrMode::IndDpY, 5),
        0x12 => op_ora(cpu, AddrMode::IndDp, 5),
        0x13 => op_ora(cpu, AddrMode::SrY, 7),
        0x14 => op_trb(cpu, AddrMode::Dp, 5),
        0x15 => op_ora(cpu, AddrMode::DpX, 4),
        0x16 => op_asl_mem(cpu, AddrMode::DpX, 6),
        0x17 => op_ora(cpu, AddrMode::IndDpLongY, 6),
        0x18 => {
            // clc
            cpu.p.c = false;
            Ok(2)
        }
        0x19 => op_ora(cpu, AddrMode::AbsY, 4),
        0x1A => op_inc_a(cpu),
        0x1B => op_tcs(cpu),
        0x1C => op_trb(cpu, AddrMode::Abs, 6),
        0x1D => op_ora(cpu, AddrMode::AbsX, 4),
        0x1E => op_asl_mem(cpu, AddrMode::AbsX, 7),
        0x1F => op_ora(cpu, AddrMode::LongX, 5),

        0x20 => op_jsr_abs(cpu),
        0x21 => op_and(cpu, AddrMode::IndDpX, 6),
        0x22 => op_jsl(cpu),
        0x23 => op_and(cpu, AddrMode::Sr, 4),
        0x24 => op_bit(cpu, AddrMode::Dp, 3),
        0x25 => op_and(cpu, AddrMode::Dp, 3),
        0x26 => op_rol_mem(cpu, AddrMode::Dp, 5),
        0x27 => op_and(cpu, AddrMode::IndDpLong, 6),
        0x28 => op_plp(cpu),
        0x29 => op_and(cpu, AddrMode::Imm, 2),
        0x2A => op_rol_a(cpu),
        0x2B => op_pld(cpu),
        0x2C => op_bit(cpu, AddrMode::Abs, 4),
        0x2D => op_and(cpu, AddrMode::Abs, 4),
        0x2E => op_rol_mem(cpu, AddrMode::Abs, 6),
        0x2F => op_and(cpu, AddrMode::Long, 5),

        0x30 => {
            // bmi
            let taken = cpu.p.n;
            op_branch(cpu, taken)
        }
        0x31 => op_and(cpu, AddrMode::IndDpY, 5),
        0x32 => op_and(cpu, AddrMode::IndDp, 5),
        0x33 => op_and(cpu, AddrMode::SrY, 7),
        0x34 => op_bit(cpu, AddrMode::DpX, 4),
        0x35 => op_and(cpu, AddrMode::DpX, 4),
        0x36 => op_rol_mem(cpu, AddrMode::DpX, 6),
        0x37 => op_and(cpu, AddrMode::IndDpLongY, 6),
        0x38 => {
            // sec
            cpu.p.c = true;
            Ok(2)
        }
        0x39 => op_and(cpu, AddrMode::AbsY, 4),
        0x3A => op_dec_a(cpu),
        0x3B => op_tsc(cpu),
        0x3C => op_bit(cpu, AddrMode::AbsX, 4),
        0x3D => op_and(cpu, AddrMode::AbsX, 4),
        0x3E => op_rol_mem(cpu, AddrMode::AbsX, 7),
        0x3F => op_and(cpu, AddrMode::LongX, 5),

        0x40 => op_rti(cpu),
        0x41 => op_eor(cpu, AddrMode::IndDpX, 6),
        0x42 => {
            // wdm: reserved, skips its signature byte
            cpu.fetch8()?;
            Ok(2)
        }
        0x43 => op_eor(cpu, AddrMode::Sr, 4),
        0x44 => op_block_move(cpu, true),
        0x45 => op_eor(cpu, AddrMode::Dp, 3),
        0x46 => op_lsr_mem(cpu, AddrMode::Dp, 5),
        0x47 => op_eor(cpu, AddrMode::IndDpLong, 6),
        0x48 => op_pha(cpu),
        0x49 => op_eor(cpu, AddrMode::Imm, 2),
        0x4A => op_lsr_a(cpu),
        0x4B => {
            // phk
            let bank = (cpu.inst_pc >> 16) & 0xFF;
            cpu.push(bank, 1)?;
            Ok(3)
        }
        0x4C => op_jmp_abs(cpu),
        0x4D => op_eor(cpu, AddrMode::Abs, 4),
        0x4E => op_lsr_mem(cpu, AddrMode::Abs, 6),
        0x4F => op_eor(cpu, AddrMode::Long, 5),

        0x50 => {
            // bvc
            let taken = !cpu.p.v;
            op_branch(cpu, taken)
        }
        0x51 => op_eor(cpu, AddrMode::IndDpY, 5),
        0x52 => op_eor(cpu, AddrMode::IndDp, 5),
        0x53 => op_eor(cpu, AddrMode::SrY, 7),
        0x54 => op_block_move(cpu, false),
        0x55 => op_eor(cpu, AddrMode::DpX, 4),
        0x56 => op_lsr_mem(cpu, AddrMode::DpX, 6),
        0x57 => op_eor(cpu, AddrMode::IndDpLongY, 6),
        0x58 => {
            // cli
            cpu.p.i = false;
            Ok(2)
        }
        0x59 => op_eor(cpu, AddrMode::AbsY, 4),
        0x5A => op_phy(cpu),
        0x5B => op_tcd(cpu),
        0x5C => op_jml_long(cpu),
        0x5D => op_eor(cpu, AddrMode::AbsX, 4),
        0x5E => op_lsr_mem(cpu, AddrMode::AbsX, 7),
        0x5F => op_eor(cpu, AddrMode::LongX, 5),

        0x60 => op_rts(cpu),
        0x61 => op_adc(cpu, AddrMode::IndDpX, 6),
        0x62 => op_per(cpu),
        0x63 => op_adc(cpu, AddrMode::Sr, 4),
        0x64 => op_stz(cpu, AddrMode::Dp, 3),
        0x65 => op_adc(cpu, AddrMode::Dp, 3),
        0x66 => op_ror_mem(cpu, AddrMode::Dp, 5),
        0x67 => op_adc(cpu, AddrMode::IndDpLong, 6),
        0x68 => op_pla(cpu),
        0x69 => op_adc(cpu, AddrMode::Imm, 2),
        0x6A => op_ror_a(cpu),
        0x6B => op_rtl(cpu),
        0x6C => op_jmp_ind(cpu),
        0x6D => op_adc(cpu, AddrMode::Abs, 4),
        0x6E => op_ror_mem(cpu, AddrMode::Abs, 6),
        0x6F => op_adc(cpu, AddrMode::Long, 5),

        0x70 => {
            // bvs
            let taken = cpu.p.v;
            op_branch(cpu, taken)
        }
        0x71 => op_adc(cpu, AddrMode::IndDpY, 5),
        0x72 => op_adc(cpu, AddrMode::IndDp, 5),
        0x73 => op_adc(cpu, AddrMode::SrY, 7),
        0x74 => op_stz(cpu, AddrMode::DpX, 4),
        0x75 => op_adc(cpu, AddrMode::DpX, 4),
        0x76 => op_ror_mem(cpu, AddrMode::DpX, 6),
        0x77 => op_adc(cpu, AddrMode::IndDpLongY, 6),
        0x78 => {
            // sei
            cpu.p.i = true;
            Ok(2)
        }
        0x79 => op_adc(cpu, AddrMode::AbsY, 4),
        0x7A => op_ply(cpu),
        0x7B => op_tdc(cpu),
        0x7C => op_jmp_ind_x(cpu, false),
        0x7D => op_adc(cpu, AddrMode::AbsX, 4),
        0x7E => op_ror_mem(cpu, AddrMode::AbsX, 7),
        0x7F => op_adc(cpu, AddrMode::LongX, 5),

        0x80 => op_branch(cpu, true),
        0x81 => op_sta(cpu, AddrMode::IndDpX, 6),
        0x82 => op_brl(cpu),
        0x83 => op_sta(cpu, AddrMode::Sr, 4),
        0x84 => op_sty(cpu, AddrMode::Dp, 3),
        0x85 => op_sta(cpu, AddrMode::Dp, 3),
        0x86 => op_stx(cpu, AddrMode::Dp, 3),
        0x87 => op_sta(cpu, AddrMode::IndDpLong, 6),
        0x88 => op_dey(cpu),
        0x89 => op_bit_imm(cpu),
        0x8A => op_txa(cpu),
        0x8B => op_phb(cpu),
        0x8C => op_sty(cpu, AddrMode::Abs, 4),
        0x8D => op_sta(cpu, AddrMode::Abs, 4),
        0x8E => op_stx(cpu, AddrMode::Abs, 4),
        0x8F => op_sta(cpu, AddrMode::Long, 5),

        0x90 => {
            // bcc
            let taken = !cpu.p.c;
            op_branch(cpu, taken)
        }
        0x91 => op_sta(cpu, AddrMode::IndDpY, 6),
        0x92 => op_sta(cpu, AddrMode::IndDp, 5),
        0x93 => op_sta(cpu, AddrMode::SrY, 7),
        0x94 => op_sty(cpu, AddrMode::DpX, 4),
        0x95 => op_sta(cpu, AddrMode::DpX, 4),
        0x96 => op_stx(cpu, AddrMode::DpY, 4),
        0x97 => op_sta(cpu, AddrMode::IndDpLongY, 6),
        0x98 => op_tya(cpu),
        0x99 => op_sta(cpu, AddrMode::AbsY, 5),
        0x9A => {
            // txs
            let x = cpu.x_w();
            cpu.set_s(x);
            Ok(2)
        }
        0x9B => op_txy(cpu),
        0x9C => op_stz(cpu, AddrMode::Abs, 4),
        0x9D => op_sta(cpu, AddrMode::AbsX, 5),
        0x9E => op_stz(cpu, AddrMode::AbsX, 5),
        0x9F => op_sta(cpu, AddrMode::LongX, 5),

        0xA0 => op_ldy(cpu, AddrMode::ImmX, 2),
        0xA1 => op_lda(cpu, AddrMode::IndDpX, 6),
        0xA2 => op_ldx(cpu, AddrMode::ImmX, 2),
        0xA3 => op_lda(cpu, AddrMode::Sr, 4),
        0xA4 => op_ldy(cpu, AddrMode::Dp, 3),
        0xA5 => op_lda(cpu, AddrMode::Dp, 3),
        0xA6 => op_ldx(cpu, AddrMode::Dp, 3),
        0xA7 => op_lda(cpu, AddrMode::IndDpLong, 6),
        0xA8 => op_tay(cpu),
        0xA9 => op_lda(cpu, AddrMode::Imm, 2),
        0xAA => op_tax(cpu),
        0xAB => op_lda(cpu, AddrMode::Long, 5),
        0xAC => op_ldy(cpu, AddrMode::Abs, 4),
        0xAD => op_lda(cpu, AddrMode::Abs, 4),
        0xAE => op_ldx(cpu, AddrMode::Abs, 4),
        0xAF => op_lda(cpu, AddrMode::Long, 5),

        0xB0 => {
            // bcs
            let taken = cpu.p.c;
            op_branch(cpu, taken)
        }
        0xB1 => op_lda(cpu, AddrMode::IndDpY, 5),
        0xB2 => op_lda(cpu, AddrMode::IndDp, 5),
        0xB3 => op_lda(cpu, AddrMode::IndDpLongY, 6),
        0xB4 => op_ldy(cpu, AddrMode::DpX, 4),
        0xB5 => op_lda(cpu, AddrMode::DpX, 4),
        0xB6 => op_ldx(cpu, AddrMode::DpY, 4),
        0xB7 => op_lda(cpu, AddrMode::IndDpLongY, 6),
        0xB8 => {
            // clv
            cpu.p.v = false;
            Ok(2)
        }
        0xB9 => op_lda(cpu, AddrMode::AbsY, 4),
        0xBA => op_tsx(cpu),
        0xBB => op_tyx(cpu),
        0xBC => op_ldy(cpu, AddrMode::AbsX, 4),
        0xBD => op_lda(cpu, AddrMode::AbsX, 4),
        0xBE => op_ldx(cpu, AddrMode::AbsY, 4),
        0xBF => op_lda(cpu, AddrMode::LongX, 5),

        0xC0 => op_cpy(cpu, AddrMode::ImmX, 2),
        0xC1 => op_cmp(cpu, AddrMode::IndDpX, 6),
        0xC2 => op_rep(cpu),
        0xC3 => op_cmp(cpu, AddrMode::Sr, 4),
        0xC4 => op_cpy(cpu, AddrMode::Dp, 3),
        0xC5 => op_cmp(cpu, AddrMode::Dp, 3),
        0xC6 => op_dec_mem(cpu, AddrMode::Dp, 5),
        0xC7 => op_cmp(cpu, AddrMode::IndDpLong, 6),
        0xC8 => op_iny(cpu),
        0xC9 => op_cmp(cpu, AddrMode::Imm, 2),
        0xCA => op_dex(cpu),
        0xCB => {
            // wai
            cpu.halted = true;
            Ok(3)
        }
        0xCC => op_cpy(cpu, AddrMode::Abs, 4),
        0xCD => op_cmp(cpu, AddrMode::Abs, 4),
        0xCE => op_dec_mem(cpu, AddrMode::Abs, 6),
        0xCF => op_cmp(cpu, AddrMode::Long, 5),

        0xD0 => {
            // bne
            let taken = !cpu.p.z;
            op_branch(cpu, taken)
        }
        0xD1 => op_cmp(cpu, AddrMode::IndDpY, 5),
        0xD2 => op_cmp(cpu, AddrMode::IndDp, 5),
        0xD3 => op_cmp(cpu, AddrMode::SrY, 7),
        0xD4 => op_pei(cpu),
        0xD5 => op_cmp(cpu, AddrMode::DpX, 4),
        0xD6 => op_dec_mem(cpu, AddrMode::DpX, 6),
        0xD7 => op_cmp(cpu, AddrMode::IndDpLongY, 6),
        0xD8 => {
            // cld
            cpu.p.d = false;
            Ok(2)
        }
        0xD9 => op_cmp(cpu, AddrMode::AbsY, 4),
        0xDA => op_phx(cpu),
        0xDB => {
            // stp
            cpu.stopped = true;
            Ok(3)
        }
        0xDC => op_jml_ind(cpu),
        0xDD => op_cmp(cpu, AddrMode::AbsX, 4),
        0xDE => op_dec_mem(cpu, AddrMode::AbsX, 7),
        0xDF => op_cmp(cpu, AddrMode::LongX, 5),

        0xE0 => op_cpx(cpu, AddrMode::ImmX, 2),
        0xE1 => op_sbc(cpu, AddrMode::IndDpX, 6),
        0xE2 => op_sep(cpu),
        0xE3 => op_sbc(cpu, AddrMode::Sr, 4),
        0xE4 => op_cpx(cpu, AddrMode::Dp, 3),
        0xE5 => op_sbc(cpu, AddrMode::Dp, 3),
        0xE6 => op_inc_mem(cpu, AddrMode::Dp, 5),
        0xE7 => op_sbc(cpu, AddrMode::IndDpLong, 6),
        0xE8 => op_inx(cpu),
        0xE9 => op_sbc(cpu, AddrMode::Imm, 2),
        0xEA => {
            // nop
            Ok(2)
        }
        0xEB => op_xba(cpu),
        0xEC => op_cpx(cpu, AddrMode::Abs, 4),
        0xED => op_sbc(cpu, AddrMode::Abs, 4),
        0xEE => op_inc_mem(cpu, AddrMode::Abs, 6),
        0xEF => op_sbc(cpu, AddrMode::Long, 5),

        0xF0 => {
            // beq
            let taken = cpu.p.z;
            op_branch(cpu, taken)
        }
        0xF1 => op_sbc(cpu, AddrMode::IndDpY, 5),
        0xF2 => op_sbc(cpu, AddrMode::IndDp, 5),
        0xF3 => op_sbc(cpu, AddrMode::SrY, 7),
        0xF4 => op_pea(cpu),
        0xF5 => op_sbc(cpu, AddrMode::DpX, 4),
        0xF6 => op_inc_mem(cpu, AddrMode::DpX, 6),
        0xF7 => op_sbc(cpu, AddrMode::IndDpLongY, 6),
        0xF8 => {
            // sed
            cpu.p.d = true;
            Ok(2)
        }
        0xF9 => op_sbc(cpu, AddrMode::AbsY, 4),
        0xFA => op_plx(cpu),
        0xFB => op_xce(cpu),
        0xFC => op_jmp_ind_x(cpu, true),
        0xFD => op_sbc(cpu, AddrMode::AbsX, 4),
        0xFE => op_inc_mem(cpu, AddrMode::AbsX, 7),
        0xFF => op_sbc(cpu, AddrMode::LongX, 5),
    }
}

/// Resolve an operand, rejecting long addressing in W=11. The operand
/// bytes are still consumed so the pushed PC points past the whole
/// instruction.
fn operand(cpu: &mut Cpu, mode: AddrMode) -> Result<Operand, Exception> {
    if mode.long() && cpu.p.native32() {
        let len = mode.operand_len(cpu);
        cpu.pc = cpu.pc.wrapping_add(len);
        return Err(Exception::IllegalOpcode(cpu.opcode));
    }
    cpu.resolve(mode)
}

/// Splice a jump target into PC: within the current 64 KiB bank
/// outside W=11, the full 32-bit value in W=11.
fn splice_pc(cpu: &Cpu, target: u32) -> u32 {
    if cpu.p.native32() {
        target
    } else {
        (cpu.pc & 0xFFFF_0000) | (target & 0xFFFF)
    }
}

/// Return-address width for JSR/RTS.
fn return_width(cpu: &Cpu) -> u8 {
    if cpu.p.native32() {
        4
    } else {
        2
    }
}

// --- Loads and stores ---

fn op_lda(cpu: &mut Cpu, mode: AddrMode, cycles: u64) -> Result<u64, Exception> {
    let w = cpu.p.a_width();
    let op = operand(cpu, mode)?;
    let v = cpu.load_op(op, w)?;
    cpu.set_a(v, w);
    cpu.p.set_nz(v, w);
    Ok(cycles)
}

fn op_ldx(cpu: &mut Cpu, mode: AddrMode, cycles: u64) -> Result<u64, Exception> {
    let w = cpu.p.x_width();
    let op = operand(cpu, mode)?;
    let v = cpu.load_op(op, w)?;
    cpu.set_x(v, w);
    cpu.p.set_nz(v, w);
    Ok(cycles)
}

fn op_ldy(cpu: &mut Cpu, mode: AddrMode, cycles: u64) -> Result<u64, Exception> {
    let w = cpu.p.x_width();
    let op = operand(cpu, mode)?;
    let v = cpu.load_op(op, w)?;
    cpu.set_y(v, w);
    cpu.p.set_nz(v, w);
    Ok(cycles)
}

fn op_sta(cpu: &mut Cpu, mode: AddrMode, cycles: u64) -> Result<u64, Exception> {
    let w = cpu.p.a_width();
    let op = operand(cpu, mode)?;
    let a = cpu.a_w();
    cpu.store_op(op, a, w)?;
    Ok(cycles)
}

fn op_stx(cpu: &mut Cpu, mode: AddrMode, cycles: u64) -> Result<u64, Exception> {
    let w = cpu.p.x_width();
    let op = operand(cpu, mode)?;
    let x = cpu.x_w();
    cpu.store_op(op, x, w)?;
    Ok(cycles)
}

fn op_sty(cpu: &mut Cpu, mode: AddrMode, cycles: u64) -> Result<u64, Exception> {
    let w = cpu.p.x_width();
    let op = operand(cpu, mode)?;
    let y = cpu.y_w();
    cpu.store_op(op, y, w)?;
    Ok(cycles)
}

fn op_stz(cpu: &mut Cpu, mode: AddrMode, cycles: u64) -> Result<u64, Exception> {
    let w = cpu.p.a_width();
    let op = operand(cpu, mode)?;
    cpu.store_op(op, 0, w)?;
    Ok(cycles)
}

// --- Logic and arithmetic ---

fn op_ora(cpu: &mut Cpu, mode: AddrMode, cycles: u64) -> Result<u64, Exception> {
    let w = cpu.p.a_width();
    let op = operand(cpu, mode)?;
    let v = cpu.load_op(op, w)?;
    let r = (cpu.a_w() | v) & alu::mask(w);
    cpu.set_a(r, w);
    cpu.p.set_nz(r, w);
    Ok(cycles)
}

fn op_and(cpu: &mut Cpu, mode: AddrMode, cycles: u64) -> Result<u64, Exception> {
    let w = cpu.p.a_width();
    let op = operand(cpu, mode)?;
    let v = cpu.load_op(op, w)?;
    let r = cpu.a_w() & v;
    cpu.set_a(r, w);
    cpu.p.set_nz(r, w);
    Ok(cycles)
}

fn op_eor(cpu: &mut Cpu, mode: AddrMode, cycles: u64) -> Result<u64, Exception> {
    let w = cpu.p.a_width();
    let op = operand(cpu, mode)?;
    let v = cpu.load_op(op, w)?;
    let r = (cpu.a_w() ^ v) & alu::mask(w);
    cpu.set_a(r, w);
    cpu.p.set_nz(r, w);
    Ok(cycles)
}

fn op_adc(cpu: &mut Cpu, mode: AddrMode, cycles: u64) -> Result<u64, Exception> {
    let w = cpu.p.a_width();
    let op = operand(cpu, mode)?;
    let v = cpu.load_op(op, w)?;
    let a = cpu.a_w();
    // The overflow flag always reflects the binary interpretation.
    let (_, _, bin_v) = alu::adc(a, v, cpu.p.c, w);
    let (r, c) = if cpu.p.d {
        alu::adc_bcd(a, v, cpu.p.c, w)
    } else {
        let (r, c, _) = alu::adc(a, v, cpu.p.c, w);
        (r, c)
    };
    cpu.set_a(r, w);
    cpu.p.c = c;
    cpu.p.v = bin_v;
    cpu.p.set_nz(r, w);
    Ok(cycles)
}

fn op_sbc(cpu: &mut Cpu, mode: AddrMode, cycles: u64) -> Result<u64, Exception> {
    let w = cpu.p.a_width();
    let op = operand(cpu, mode)?;
    let v = cpu.load_op(op, w)?;
    let a = cpu.a_w();
    let (_, _, bin_v) = alu::sbc(a, v, cpu.p.c, w);
    let (r, c) = if cpu.p.d {
        alu::sbc_bcd(a, v, cpu.p.c, w)
    } else {
        let (r, c, _) = alu::sbc(a, v, cpu.p.c, w);
        (r, c)
    };
    cpu.set_a(r, w);
    cpu.p.c = c;
    cpu.p.v = bin_v;
    cpu.p.set_nz(r, w);
    Ok(cycles)
}

fn op_cmp(cpu: &mut Cpu, mode: AddrMode, cycles: u64) -> Result<u64, Exception> {
    let w = cpu.p.a_width();
    let op = operand(cpu, mode)?;
    let v = cpu.load_op(op, w)?;
    let (c, z, n) = alu::cmp(cpu.a_w(), v, w);
    cpu.p.c = c;
    cpu.p.z = z;
    cpu.p.n = n;
    Ok(cycles)
}

fn op_cpx(cpu: &mut Cpu, mode: AddrMode, cycles: u64) -> Result<u64, Exception> {
    let w = cpu.p.x_width();
    let op = operand(cpu, mode)?;
    let v = cpu.load_op(op, w)?;
    let (c, z, n) = alu::cmp(cpu.x_w(), v, w);
    cpu.p.c = c;
    cpu.p.z = z;
    cpu.p.n = n;
    Ok(cycles)
}

fn op_cpy(cpu: &mut Cpu, mode: AddrMode, cycles: u64) -> Result<u64, Exception> {
    let w = cpu.p.x_width();
    let op = operand(cpu, mode)?;
    let v = cpu.load_op(op, w)?;
    let (c, z, n) = alu::cmp(cpu.y_w(), v, w);
    cpu.p.c = c;
    cpu.p.z = z;
    cpu.p.n = n;
    Ok(cycles)
}

fn op_bit(cpu: &mut Cpu, mode: AddrMode, cycles: u64) -> Result<u64, Exception> {
    let w = cpu.p.a_width();
    let op = operand(cpu, mode)?;
    let v = cpu.load_op(op, w)?;
    cpu.p.z = cpu.a_w() & v == 0;
    cpu.p.n = v & alu::sign_bit(w) != 0;
    cpu.p.v = v & (alu::sign_bit(w) >> 1) != 0;
    Ok(cycles)
}

fn op_bit_imm(cpu: &mut Cpu) -> Result<u64, Exception> {
    // bit #: only Z is affected.
    let w = cpu.p.a_width();
    let op = operand(cpu, AddrMode::Imm)?;
    let v = cpu.load_op(op, w)?;
    cpu.p.z = cpu.a_w() & v == 0;
    Ok(2)
}

fn op_tsb(cpu: &mut Cpu, mode: AddrMode, cycles: u64) -> Result<u64, Exception> {
    let w = cpu.p.a_width();
    let op = operand(cpu, mode)?;
    let v = cpu.load_op(op, w)?;
    let a = cpu.a_w();
    cpu.p.z = a & v == 0;
    cpu.store_op(op, v | a, w)?;
    Ok(cycles)
}

fn op_trb(cpu: &mut Cpu, mode: AddrMode, cycles: u64) -> Result<u64, Exception> {
    let w = cpu.p.a_width();
    let op = operand(cpu, mode)?;
    let v = cpu.load_op(op, w)?;
    let a = cpu.a_w();
    cpu.p.z = a & v == 0;
    cpu.store_op(op, v & !a, w)?;
    Ok(cycles)
}

// --- Shifts and increments ---

fn op_asl_a(cpu: &mut Cpu) -> Result<u64, Exception> {
    let w = cpu.p.a_width();
    let (r, c) = alu::asl(cpu.a_w(), w);
    cpu.set_a(r, w);
    cpu.p.c = c;
    cpu.p.set_nz(r, w);
    Ok(2)
}

fn op_asl_mem(cpu: &mut Cpu, mode: AddrMode, cycles: u64) -> Result<u64, Exception> {
    let w = cpu.p.a_width();
    let op = operand(cpu, mode)?;
    let v = cpu.load_op(op, w)?;
    let (r, c) = alu::asl(v, w);
    cpu.store_op(op, r, w)?;
    cpu.p.c = c;
    cpu.p.set_nz(r, w);
    Ok(cycles)
}

fn op_lsr_a(cpu: &mut Cpu) -> Result<u64, Exception> {
    let w = cpu.p.a_width();
    let (r, c) = alu::lsr(cpu.a_w(), w);
    cpu.set_a(r, w);
    cpu.p.c = c;
    cpu.p.set_nz(r, w);
    Ok(2)
}

fn op_lsr_mem(cpu: &mut Cpu, mode: AddrMode, cycles: u64) -> Result<u64, Exception> {
    let w = cpu.p.a_width();
    let op = operand(cpu, mode)?;
    let v = cpu.load_op(op, w)?;
    let (r, c) = alu::lsr(v, w);
    cpu.store_op(op, r, w)?;
    cpu.p.c = c;
    cpu.p.set_nz(r, w);
    Ok(cycles)
}

fn op_rol_a(cpu: &mut Cpu) -> Result<u64, Exception> {
    let w = cpu.p.a_width();
    let (r, c) = alu::rol(cpu.a_w(), cpu.p.c, w);
    cpu.set_a(r, w);
    cpu.p.c = c;
    cpu.p.set_nz(r, w);
    Ok(2)
}

fn op_rol_mem(cpu: &mut Cpu, mode: AddrMode, cycles: u64) -> Result<u64, Exception> {
    let w = cpu.p.a_width();
    let op = operand(cpu, mode)?;
    let v = cpu.load_op(op, w)?;
    let (r, c) = alu::rol(v, cpu.p.c, w);
    cpu.store_op(op, r, w)?;
    cpu.p.c = c;
    cpu.p.set_nz(r, w);
    Ok(cycles)
}

fn op_ror_a(cpu: &mut Cpu) -> Result<u64, Exception> {
    let w = cpu.p.a_width();
    let (r, c) = alu::ror(cpu.a_w(), cpu.p.c, w);
    cpu.set_a(r, w);
    cpu.p.c = c;
    cpu.p.set_nz(r, w);
    Ok(2)
}

fn op_ror_mem(cpu: &mut Cpu, mode: AddrMode, cycles: u64) -> Result<u64, Exception> {
    let w = cpu.p.a_width();
    let op = operand(cpu, mode)?;
    let v = cpu.load_op(op, w)?;
    let (r, c) = alu::ror(v, cpu.p.c, w);
    cpu.store_op(op, r, w)?;
    cpu.p.c = c;
    cpu.p.set_nz(r, w);
    Ok(cycles)
}

fn op_inc_a(cpu: &mut Cpu) -> Result<u64, Exception> {
    let w = cpu.p.a_width();
    let r = cpu.a_w().wrapping_add(1) & alu::mask(w);
    cpu.set_a(r, w);
    cpu.p.set_nz(r, w);
    Ok(2)
}

fn op_dec_a(cpu: &mut Cpu) -> Result<u64, Exception> {
    let w = cpu.p.a_width();
    let r = cpu.a_w().wrapping_sub(1) & alu::mask(w);
    cpu.set_a(r, w);
    cpu.p.set_nz(r, w);
    Ok(2)
}

fn op_inc_mem(cpu: &mut Cpu, mode: AddrMode, cycles: u64) -> Result<u64, Exception> {
    let w = cpu.p.a_width();
    let op = operand(cpu, mode)?;
    let r = cpu.load_op(op, w)?.wrapping_add(1) & alu::mask(w);
    cpu.store_op(op, r, w)?;
    cpu.p.set_nz(r, w);
    Ok(cycles)
}

fn op_dec_mem(cpu: &mut Cpu, mode: AddrMode, cycles: u64) -> Result<u64, Exception> {
    let w = cpu.p.a_width();
    let op = operand(cpu, mode)?;
    let r = cpu.load_op(op, w)?.wrapping_sub(1) & alu::mask(w);
    cpu.store_op(op, r, w)?;
    cpu.p.set_nz(r, w);
    Ok(cycles)
}

fn op_inx(cpu: &mut Cpu) -> Result<u64, Exception> {
    let w = cpu.p.x_width();
    let r = cpu.x_w().wrapping_add(1) & alu::mask(w);
    cpu.set_x(r, w);
    cpu.p.set_nz(r, w);
    Ok(2)
}

fn op_dex(cpu: &mut Cpu) -> Result<u64, Exception> {
    let w = cpu.p.x_width();
    let r = cpu.x_w().wrapping_sub(1) & alu::mask(w);
    cpu.set_x(r, w);
    cpu.p.set_nz(r, w);
    Ok(2)
}

fn op_iny(cpu: &mut Cpu) -> Result<u64, Exception> {
    let w = cpu.p.x_width();
    let r = cpu.y_w().wrapping_add(1) & alu::mask(w);
    cpu.set_y(r, w);
    cpu.p.set_nz(r, w);
    Ok(2)
}

fn op_dey(cpu: &mut Cpu) -> Result<u64, Exception> {
    let w = cpu.p.x_width();
    let r = cpu.y_w().wrapping_sub(1) & alu::mask(w);
    cpu.set_y(r, w);
    cpu.p.set_nz(r, w);
    Ok(2)
}

// --- Control flow ---

fn op_branch(cpu: &mut Cpu, taken: bool) -> Result<u64, Exception> {
    let rel = cpu.fetch8()? as i8 as i32;
    if taken {
        cpu.pc = cpu.pc.wrapping_add(rel as u32);
        Ok(3)
    } else {
        Ok(2)
    }
}

fn op_brl(cpu: &mut Cpu) -> Result<u64, Exception> {
    let rel = cpu.fetch16()? as i16 as i32;
    cpu.pc = cpu.pc.wrapping_add(rel as u32);
    Ok(4)
}

fn op_jmp_abs(cpu: &mut Cpu) -> Result<u64, Exception> {
    let target = cpu.fetch_abs()?;
    cpu.pc = splice_pc(cpu, target);
    Ok(3)
}

fn op_jmp_ind(cpu: &mut Cpu) -> Result<u64, Exception> {
    // jmp (abs): the pointer lives in bank 0 outside W=11.
    let ptr_addr = cpu.fetch_abs()?;
    let pw = cpu.pointer_width();
    let target = cpu.vread(ptr_addr, pw, Access::Load)?;
    cpu.pc = splice_pc(cpu, target);
    Ok(5)
}

fn op_jmp_ind_x(cpu: &mut Cpu, call: bool) -> Result<u64, Exception> {
    // jmp/jsr (abs,X): the pointer is indexed inside the program bank.
    let abs = cpu.fetch_abs()?;
    let x = cpu.x_w();
    let ptr_addr = if cpu.p.native32() {
        abs.wrapping_add(x)
    } else {
        (cpu.pc & 0xFFFF_0000) | (abs.wrapping_add(x) & 0xFFFF)
    };
    let pw = cpu.pointer_width();
    let target = cpu.vread(ptr_addr, pw, Access::Load)?;
    if call {
        let ret = cpu.pc.wrapping_sub(1);
        cpu.push(ret, return_width(cpu))?;
    }
    cpu.pc = splice_pc(cpu, target);
    Ok(if call { 8 } else { 6 })
}

fn op_jml_long(cpu: &mut Cpu) -> Result<u64, Exception> {
    if cpu.p.native32() {
        cpu.pc = cpu.pc.wrapping_add(3);
        return Err(Exception::IllegalOpcode(cpu.opcode));
    }
    let target = cpu.fetch_long()?;
    cpu.pc = target;
    Ok(4)
}

fn op_jml_ind(cpu: &mut Cpu) -> Result<u64, Exception> {
    // jml [abs]: 24-bit pointer in bank 0.
    if cpu.p.native32() {
        cpu.pc = cpu.pc.wrapping_add(2);
        return Err(Exception::IllegalOpcode(cpu.opcode));
    }
    let ptr_addr = cpu.fetch16()? as u32;
    let lo = cpu.vread(ptr_addr, 2, Access::Load)?;
    let hi = cpu.vread(ptr_addr.wrapping_add(2), 1, Access::Load)?;
    cpu.pc = lo | (hi << 16);
    Ok(6)
}

fn op_jsr_abs(cpu: &mut Cpu) -> Result<u64, Exception> {
    let target = cpu.fetch_abs()?;
    let ret = cpu.pc.wrapping_sub(1);
    cpu.push(ret, return_width(cpu))?;
    cpu.pc = splice_pc(cpu, target);
    Ok(6)
}

fn op_jsl(cpu: &mut Cpu) -> Result<u64, Exception> {
    if cpu.p.native32() {
        cpu.pc = cpu.pc.wrapping_add(3);
        return Err(Exception::IllegalOpcode(cpu.opcode));
    }
    let target = cpu.fetch_long()?;
    let ret = cpu.pc.wrapping_sub(1);
    cpu.push(ret & 0x00FF_FFFF, 3)?;
    cpu.pc = target;
    Ok(8)
}

fn op_rts(cpu: &mut Cpu) -> Result<u64, Exception> {
    let w = return_width(cpu);
    let ret = cpu.pull(w)?.wrapping_add(1);
    cpu.pc = splice_pc(cpu, ret);
    Ok(6)
}

fn op_rtl(cpu: &mut Cpu) -> Result<u64, Exception> {
    if cpu.p.native32() {
        return Err(Exception::IllegalOpcode(cpu.opcode));
    }
    let ret = cpu.pull(3)?.wrapping_add(1);
    cpu.pc = ret & 0x00FF_FFFF;
    Ok(6)
}

fn op_rti(cpu: &mut Cpu) -> Result<u64, Exception> {
    let was_supervisor = cpu.p.s;
    if cpu.p.e() {
        let p = cpu.pull(1)? as u8;
        cpu.p.set_low(p);
        cpu.pc = cpu.pull(2)?;
    } else {
        let mut p = cpu.pull(2)? as u16;
        if !was_supervisor {
            // User-mode RTI cannot forge supervisor state.
            p &= !crate::reg::status::P_S;
        }
        cpu.p.set_bits(p);
        cpu.pc = cpu.pull(4)?;
    }
    Ok(7)
}

fn op_brk(cpu: &mut Cpu) -> Result<u64, Exception> {
    // The signature byte is consumed; the pushed PC points past it.
    cpu.fetch8()?;
    Err(Exception::Brk)
}

// --- Stack ---

fn op_pha(cpu: &mut Cpu) -> Result<u64, Exception> {
    let w = cpu.p.a_width();
    let a = cpu.a_w();
    cpu.push(a, w)?;
    Ok(3)
}

fn op_pla(cpu: &mut Cpu) -> Result<u64, Exception> {
    let w = cpu.p.a_width();
    let v = cpu.pull(w)?;
    cpu.set_a(v, w);
    cpu.p.set_nz(v, w);
    Ok(4)
}

fn op_phx(cpu: &mut Cpu) -> Result<u64, Exception> {
    let w = cpu.p.x_width();
    let x = cpu.x_w();
    cpu.push(x, w)?;
    Ok(3)
}

fn op_plx(cpu: &mut Cpu) -> Result<u64, Exception> {
    let w = cpu.p.x_width();
    let v = cpu.pull(w)?;
    cpu.set_x(v, w);
    cpu.p.set_nz(v, w);
    Ok(4)
}

fn op_phy(cpu: &mut Cpu) -> Result<u64, Exception> {
    let w = cpu.p.x_width();
    let y = cpu.y_w();
    cpu.push(y, w)?;
    Ok(3)
}

fn op_ply(cpu: &mut Cpu) -> Result<u64, Exception> {
    let w = cpu.p.x_width();
    let v = cpu.pull(w)?;
    cpu.set_y(v, w);
    cpu.p.set_nz(v, w);
    Ok(4)
}

fn op_php(cpu: &mut Cpu) -> Result<u64, Exception> {
    let p = cpu.p.low() as u32;
    cpu.push(p, 1)?;
    Ok(3)
}

fn op_plp(cpu: &mut Cpu) -> Result<u64, Exception> {
    let v = cpu.pull(1)? as u8;
    cpu.p.set_low(v);
    Ok(4)
}

fn op_phd(cpu: &mut Cpu) -> Result<u64, Exception> {
    let w = return_width(cpu);
    let d = cpu.d;
    cpu.push(d, w)?;
    Ok(4)
}

fn op_pld(cpu: &mut Cpu) -> Result<u64, Exception> {
    let w = return_width(cpu);
    let v = cpu.pull(w)?;
    cpu.d = v;
    cpu.p.set_nz(v, w);
    Ok(5)
}

fn op_phb(cpu: &mut Cpu) -> Result<u64, Exception> {
    if cpu.p.native32() {
        let b = cpu.b;
        cpu.push(b, 4)?;
    } else {
        // Legacy bank byte.
        let bank = (cpu.b >> 16) & 0xFF;
        cpu.push(bank, 1)?;
    }
    Ok(3)
}

fn op_pea(cpu: &mut Cpu) -> Result<u64, Exception> {
    let w = return_width(cpu);
    let v = cpu.fetch_abs()?;
    cpu.push(v, w)?;
    Ok(5)
}

fn op_pei(cpu: &mut Cpu) -> Result<u64, Exception> {
    let pw = cpu.pointer_width();
    let op = operand(cpu, AddrMode::Dp)?;
    let ptr = cpu.load_op(op, pw)?;
    cpu.push(ptr, pw)?;
    Ok(6)
}

fn op_per(cpu: &mut Cpu) -> Result<u64, Exception> {
    let rel = cpu.fetch16()? as i16 as i32;
    let value = cpu.pc.wrapping_add(rel as u32);
    let w = return_width(cpu);
    cpu.push(value, w)?;
    Ok(6)
}

// --- Transfers ---

fn op_tax(cpu: &mut Cpu) -> Result<u64, Exception> {
    let w = cpu.p.x_width();
    let v = cpu.a & alu::mask(w);
    cpu.set_x(v, w);
    cpu.p.set_nz(v, w);
    Ok(2)
}

fn op_txa(cpu: &mut Cpu) -> Result<u64, Exception> {
    let w = cpu.p.a_width();
    let v = cpu.x & alu::mask(w);
    cpu.set_a(v, w);
    cpu.p.set_nz(v, w);
    Ok(2)
}

fn op_tay(cpu: &mut Cpu) -> Result<u64, Exception> {
    let w = cpu.p.x_width();
    let v = cpu.a & alu::mask(w);
    cpu.set_y(v, w);
    cpu.p.set_nz(v, w);
    Ok(2)
}

fn op_tya(cpu: &mut Cpu) -> Result<u64, Exception> {
    let w = cpu.p.a_width();
    let v = cpu.y & alu::mask(w);
    cpu.set_a(v, w);
    cpu.p.set_nz(v, w);
    Ok(2)
}

fn op_txy(cpu: &mut Cpu) -> Result<u64, Exception> {
    let w = cpu.p.x_width();
    let v = cpu.x_w();
    cpu.set_y(v, w);
    cpu.p.set_nz(v, w);
    Ok(2)
}

fn op_tyx(cpu: &mut Cpu) -> Result<u64, Exception> {
    let w = cpu.p.x_width();
    let v = cpu.y_w();
    cpu.set_x(v, w);
    cpu.p.set_nz(v, w);
    Ok(2)
}

fn op_tsx(cpu: &mut Cpu) -> Result<u64, Exception> {
    let w = cpu.p.x_width();
    let v = cpu.s & alu::mask(w);
    cpu.set_x(v, w);
    cpu.p.set_nz(v, w);
    Ok(2)
}

/// Base-register transfer width: 16-bit outside W=11, 32-bit inside.
fn base_width(cpu: &Cpu) -> u8 {
    if cpu.p.native32() {
        4
    } else {
        2
    }
}

fn op_tcs(cpu: &mut Cpu) -> Result<u64, Exception> {
    let a = cpu.a;
    cpu.set_s(a);
    Ok(2)
}

fn op_tsc(cpu: &mut Cpu) -> Result<u64, Exception> {
    let w = base_width(cpu);
    let v = cpu.s & alu::mask(w);
    cpu.set_a(v, w);
    cpu.p.set_nz(v, w);
    Ok(2)
}

fn op_tcd(cpu: &mut Cpu) -> Result<u64, Exception> {
    let w = base_width(cpu);
    cpu.d = cpu.a & alu::mask(w);
    cpu.p.set_nz(cpu.d, w);
    Ok(2)
}

fn op_tdc(cpu: &mut Cpu) -> Result<u64, Exception> {
    let w = base_width(cpu);
    let v = cpu.d & alu::mask(w);
    cpu.set_a(v, w);
    cpu.p.set_nz(v, w);
    Ok(2)
}

fn op_xba(cpu: &mut Cpu) -> Result<u64, Exception> {
    if cpu.p.native32() {
        // Swap the 16-bit halves.
        cpu.a = cpu.a.rotate_right(16);
        cpu.p.set_nz(cpu.a, 2);
    } else {
        let lo = cpu.a & 0xFF;
        let hi = (cpu.a >> 8) & 0xFF;
        cpu.a = (cpu.a & 0xFFFF_0000) | (lo << 8) | hi;
        cpu.p.set_nz(cpu.a, 1);
    }
    Ok(3)
}

// --- Flag manipulation ---

fn op_rep(cpu: &mut Cpu) -> Result<u64, Exception> {
    let m = cpu.fetch8()?;
    let low = cpu.p.low() & !m;
    cpu.p.set_low(low);
    Ok(3)
}

fn op_sep(cpu: &mut Cpu) -> Result<u64, Exception> {
    let m = cpu.fetch8()?;
    let low = cpu.p.low() | m;
    cpu.p.set_low(low);
    Ok(3)
}

fn op_xce(cpu: &mut Cpu) -> Result<u64, Exception> {
    // C=1 enters emulation, C=0 enters 65816-native; the old E lands
    // in C. W=11 is only reachable through SEPW or the host call.
    let old_e = cpu.p.e();
    if cpu.p.c {
        cpu.p.set_w(0b00);
        cpu.p.set_xw(0b00);
        let s = cpu.s;
        cpu.set_s(s);
    } else if old_e {
        cpu.p.set_w(0b01);
    }
    cpu.p.c = old_e;
    Ok(2)
}

// --- Block moves ---

/// MVN ($44) increments the indexes, MVP ($54) decrements. One byte
/// moves per execution; PC stays on the opcode until the count in A is
/// exhausted, so faults and interrupts stay precise.
fn op_block_move(cpu: &mut Cpu, increment: bool) -> Result<u64, Exception> {
    let dst_bank = cpu.fetch8()? as u32;
    let src_bank = cpu.fetch8()? as u32;
    let aw = cpu.p.a_width();
    let xw = cpu.p.x_width();

    let src = (src_bank << 16).wrapping_add(cpu.x_w());
    let dst = (dst_bank << 16).wrapping_add(cpu.y_w());
    let byte = cpu.read(src, 1)?;
    cpu.write(dst, byte, 1)?;

    let (x, y) = if increment {
        (cpu.x_w().wrapping_add(1), cpu.y_w().wrapping_add(1))
    } else {
        (cpu.x_w().wrapping_sub(1), cpu.y_w().wrapping_sub(1))
    };
    cpu.set_x(x, xw);
    cpu.set_y(y, xw);

    let remaining = cpu.a_w();
    cpu.set_a(remaining.wrapping_sub(1), aw);
    if remaining != 0 {
        // More bytes to move: rerun this instruction.
        cpu.pc = cpu.inst_pc;
    }
    Ok(7)
}
