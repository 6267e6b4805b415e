//! Stack round trips, width dispatch and mode switching.

use m65832_emu::Emu;

fn machine(program: &[u8]) -> Emu {
    let mut emu = Emu::new(0x40_0000).unwrap();
    emu.load(0x1000, program).unwrap();
    emu.write16(0xFFFC, 0x1000);
    emu.reset();
    emu
}

fn run_to_stp(emu: &mut Emu) {
    for _ in 0..100_000 {
        if emu.cpu.stopped {
            return;
        }
        emu.step();
    }
    panic!("program never reached STP");
}

#[test]
fn pha_pla_round_trip_8bit() {
    // lda #$5A ; pha ; lda #$00 ; pla ; stp
    let mut emu = machine(&[0xA9, 0x5A, 0x48, 0xA9, 0x00, 0x68, 0xDB]);
    run_to_stp(&mut emu);
    assert_eq!(emu.cpu.a & 0xFF, 0x5A);
    assert_eq!(emu.cpu.s, 0x0000_01FF);
}

#[test]
fn pha_pla_round_trip_32bit() {
    let mut emu = machine(&[
        0xA9, 0xEF, 0xBE, 0xAD, 0xDE, // lda #$DEADBEEF
        0x48, // pha
        0xA9, 0x00, 0x00, 0x00, 0x00, // lda #0
        0x68, // pla
        0xDB,
    ]);
    emu.enter_native32();
    let s0 = emu.cpu.s;
    run_to_stp(&mut emu);
    assert_eq!(emu.cpu.a, 0xDEAD_BEEF);
    assert_eq!(emu.cpu.s, s0);
}

#[test]
fn push_moves_sp_by_exactly_width() {
    // In W=11, PHA moves S by 4 and PHP by exactly 1.
    let mut emu = machine(&[0x48, 0x08, 0xDB]); // pha ; php ; stp
    emu.enter_native32();
    let s0 = emu.cpu.s;
    run_to_stp(&mut emu);
    assert_eq!(emu.cpu.s, s0.wrapping_sub(5));
}

#[test]
fn phx_ply_width_follows_index_field() {
    // SEP #$10 sets X0: index width becomes 16-bit even though the
    // accumulator stays 8-bit emulation width.
    let mut emu = machine(&[
        0xE2, 0x10, // sep #$10 (X field 01 -> 16-bit indexes)
        0xA2, 0x34, 0x12, // ldx #$1234
        0xDA, // phx
        0xA2, 0x00, 0x00, // ldx #0
        0xFA, // plx
        0xDB,
    ]);
    run_to_stp(&mut emu);
    assert_eq!(emu.cpu.x & 0xFFFF, 0x1234);
}

#[test]
fn php_plp_restore_flags() {
    // sec ; sed ; php ; clc ; cld ; plp ; stp
    let mut emu = machine(&[0x38, 0xF8, 0x08, 0x18, 0xD8, 0x28, 0xDB]);
    run_to_stp(&mut emu);
    assert!(emu.cpu.p.c);
    assert!(emu.cpu.p.d);
}

#[test]
fn sep_rep_complementary_masks_restore_p() {
    // The same mask set then cleared returns the original low byte.
    let mut emu = machine(&[0xE2, 0x30, 0xC2, 0x30, 0xDB]); // sep #$30 ; rep #$30 ; stp
    let before = emu.cpu.p.bits();
    run_to_stp(&mut emu);
    assert_eq!(emu.cpu.p.bits(), before);
}

#[test]
fn sep_widens_under_emulation() {
    // Width changes are honored even with E=1: SEP #$20 sets M0 and
    // the machine leaves emulation mode (the redesigned behavior).
    let mut emu = machine(&[0xE2, 0x20, 0xA9, 0x34, 0x12, 0xDB]); // sep #$20 ; lda #$1234 ; stp
    assert!(emu.cpu.p.e());
    run_to_stp(&mut emu);
    assert!(!emu.cpu.p.e());
    assert_eq!(emu.cpu.p.a_width(), 2);
    assert_eq!(emu.cpu.a & 0xFFFF, 0x1234);
}

#[test]
fn emulation_stack_stays_in_page_one() {
    // Pushes in W=00 wrap inside $0100..$01FF with the high bits
    // forced, regardless of how S was loaded.
    let mut emu = machine(&[0xA2, 0x00, 0x9A, 0x48, 0xDB]); // ldx #0 ; txs ; pha ; stp
    run_to_stp(&mut emu);
    assert_eq!(emu.cpu.s, 0x0000_01FF);
}

#[test]
fn xce_swaps_carry_and_mode() {
    // clc ; xce enters 65816-native; sec ; xce returns to emulation.
    let mut emu = machine(&[0x18, 0xFB, 0xDB]);
    run_to_stp(&mut emu);
    assert!(!emu.cpu.p.e());
    assert_eq!(emu.cpu.p.a_width(), 2);
    assert!(emu.cpu.p.c); // old E landed in C

    let mut emu = machine(&[0x18, 0xFB, 0x38, 0xFB, 0xDB]);
    run_to_stp(&mut emu);
    assert!(emu.cpu.p.e());
    assert!(!emu.cpu.p.c);
}

#[test]
fn sepw_reaches_the_wide_mode_bits() {
    // sepw #$0220 sets M0 (bit 5) and M1 (bit 9): straight to W=11.
    let mut emu = machine(&[0x02, 0x32, 0x20, 0x02, 0xDB]);
    run_to_stp(&mut emu);
    assert!(emu.cpu.p.native32());
    assert_eq!(emu.cpu.p.a_width(), 4);
}

#[test]
fn e_bit_reads_as_w_eq_00_for_all_w_states() {
    let mut emu = machine(&[0xDB]);
    for (w, expected_e) in [(0b00u8, true), (0b01, false), (0b10, false), (0b11, false)] {
        emu.cpu.p.set_w(w);
        assert_eq!(emu.cpu.p.e(), expected_e);
    }
}

#[test]
fn phd_pld_round_trip() {
    // Set D via the extended SD, push it, clobber, pull it back.
    let mut emu = machine(&[
        0x02, 0x20, 0x00, 0x02, 0x00, 0x00, // sd #$00000200
        0x0B, // phd
        0x02, 0x20, 0x00, 0x00, 0x00, 0x00, // sd #0
        0x2B, // pld
        0xDB,
    ]);
    run_to_stp(&mut emu);
    assert_eq!(emu.cpu.d, 0x0000_0200);
}

#[test]
fn jsr_pushes_wide_return_in_native32() {
    let mut emu = machine(&[
        0x20, 0x00, 0x20, 0x00, 0x00, // jsr $00002000 (32-bit operand)
        0xDB,
    ]);
    emu.write8(0x2000, 0x60); // rts
    emu.enter_native32();
    emu.step(); // jsr
    assert_eq!(emu.cpu.pc, 0x2000);
    assert_eq!(emu.cpu.s, 0x0000_01FB); // 4 bytes pushed
    emu.step(); // rts
    assert_eq!(emu.cpu.pc, 0x1005);
    run_to_stp(&mut emu);
}
