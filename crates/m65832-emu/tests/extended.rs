//! The $02 extended families: MUL/DIV, atomics, base registers, the
//! register window, 64-bit moves, LEA and the register-targeted ALU
//! groups.

use m65832_emu::{Emu, TrapKind};

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
fn mul_splits_product_across_a_and_t() {
    // In 32-bit mode: $FFFFFFFF * 2 = low $FFFFFFFE, high 1.
    let mut emu = machine(&[
        0xA9, 0xFF, 0xFF, 0xFF, 0xFF, // lda #$FFFFFFFF
        0x02, 0x00, 0x02, 0x00, 0x00, 0x00, // mul #$00000002
        0xDB,
    ]);
    emu.enter_native32();
    run_to_stp(&mut emu);
    assert_eq!(emu.cpu.a, 0xFFFF_FFFE);
    assert_eq!(emu.cpu.t, 1);
}

#[test]
fn div_leaves_quotient_and_remainder() {
    // 17 / 5 -> A=3, T=2.
    let mut emu = machine(&[0xA9, 0x11, 0x02, 0x04, 0x05, 0xDB]);
    run_to_stp(&mut emu);
    assert_eq!(emu.cpu.a & 0xFF, 3);
    assert_eq!(emu.cpu.t, 2);
    assert!(!emu.cpu.p.v);
}

#[test]
fn div_by_zero_saturates_and_sets_v() {
    let mut emu = machine(&[0xA9, 0x11, 0x02, 0x04, 0x00, 0xDB]);
    run_to_stp(&mut emu);
    assert_eq!(emu.cpu.a & 0xFF, 0xFF);
    assert_eq!(emu.cpu.t, 0x11);
    assert!(emu.cpu.p.v);
}

#[test]
fn tta_tat_move_t_both_ways() {
    let mut emu = machine(&[
        0xA9, 0x11, // lda #$11
        0x02, 0x87, // tat
        0xA9, 0x00, // lda #0
        0x02, 0x86, // tta
        0xDB,
    ]);
    run_to_stp(&mut emu);
    assert_eq!(emu.cpu.a, 0x11);
    assert_eq!(emu.cpu.t, 0x11);
}

#[test]
fn lli_sci_succeeds_without_intervening_store() {
    let mut emu = machine(&[
        0x02, 0x12, 0x50, // lli $50
        0x1A, // inc a
        0x02, 0x14, 0x50, // sci $50
        0xDB,
    ]);
    emu.write8(0x50, 0x20);
    run_to_stp(&mut emu);
    assert!(emu.cpu.p.z); // store-conditional succeeded
    assert_eq!(emu.read8(0x50), 0x21);
    assert!(!emu.cpu.reservation_valid());
}

#[test]
fn any_store_invalidates_the_reservation() {
    // The intervening STA targets a completely different address; the
    // reservation must still die.
    let mut emu = machine(&[
        0x02, 0x12, 0x50, // lli $50
        0x8D, 0x00, 0x40, // sta $4000
        0x02, 0x14, 0x50, // sci $50
        0xDB,
    ]);
    emu.write8(0x50, 0x20);
    run_to_stp(&mut emu);
    assert!(!emu.cpu.p.z);
    assert_eq!(emu.read8(0x50), 0x20); // conditional store suppressed
}

#[test]
fn sd_sb_and_transfers_set_the_bases() {
    let mut emu = machine(&[
        0x02, 0x20, 0x00, 0x02, 0x00, 0x00, // sd #$00000200
        0x02, 0x21, 0x00, 0x40, 0x00, 0x00, // sb #$00004000
        0xA9, 0x7A, // lda #$7A
        0x85, 0x04, // sta $04 (direct page -> $0204)
        0x8D, 0x10, 0x00, // sta $0010 (absolute -> $4010)
        0xDB,
    ]);
    run_to_stp(&mut emu);
    assert_eq!(emu.read8(0x0204), 0x7A);
    assert_eq!(emu.read8(0x4010), 0x7A);
}

#[test]
fn register_window_shadows_direct_page() {
    // enr ; lda #$66 ; sta $08 ; dsr ; lda $08 ; stp
    // With R set the store lands in R2, not memory.
    let mut emu = machine(&[
        0x02, 0x30, // enr
        0xA9, 0x66, // lda #$66
        0x85, 0x08, // sta $08 -> R2
        0x02, 0x31, // dsr
        0xA5, 0x08, // lda $08 (memory this time)
        0xDB,
    ]);
    emu.write8(0x08, 0x00);
    run_to_stp(&mut emu);
    assert_eq!(emu.cpu.window.get(2), 0x66);
    assert_eq!(emu.cpu.a & 0xFF, 0x00); // memory untouched
}

#[test]
fn misaligned_window_access_raises_alignment() {
    let mut emu = machine(&[
        0x02, 0x30, // enr
        0xA5, 0x06, // lda $06 (not 4-byte aligned)
        0xDB,
    ]);
    emu.write16(0xFFF8, 0x2000);
    emu.write8(0x2000, 0xDB);
    run_to_stp(&mut emu);
    assert_eq!(emu.trap().kind, TrapKind::Alignment);
    assert_eq!(emu.trap().addr, 0x06);
}

#[test]
fn ldq_stq_move_64_bits_through_a_and_t() {
    let mut emu = machine(&[
        0x02, 0x89, 0x00, 0x40, // ldq $4000
        0x02, 0x8B, 0x08, 0x40, // stq $4008
        0xDB,
    ]);
    emu.write32(0x4000, 0xAABB_CCDD);
    emu.write32(0x4004, 0x1122_3344);
    run_to_stp(&mut emu);
    assert_eq!(emu.cpu.a, 0xAABB_CCDD);
    assert_eq!(emu.cpu.t, 0x1122_3344);
    assert_eq!(emu.read32(0x4008), 0xAABB_CCDD);
    assert_eq!(emu.read32(0x400C), 0x1122_3344);
}

#[test]
fn lea_computes_addresses_without_touching_memory() {
    let mut emu = machine(&[
        0x02, 0x20, 0x00, 0x02, 0x00, 0x00, // sd #$00000200
        0xA2, 0x04, // ldx #$04
        0x02, 0xA1, 0x10, // lea $10,x
        0xDB,
    ]);
    run_to_stp(&mut emu);
    assert_eq!(emu.cpu.a, 0x0214);
}

#[test]
fn alur_register_forms() {
    // mov a<-x ; add t ; cmp y
    let mut emu = machine(&[
        0xA2, 0x07, // ldx #$07
        0x02, 0xE8, 0x61, // alur mov a <- x
        0x02, 0x87, // tat (t = 7)
        0x02, 0xE8, 0x03, // alur add a, t -> 14
        0xDB,
    ]);
    run_to_stp(&mut emu);
    assert_eq!(emu.cpu.a & 0xFF, 14);
}

#[test]
fn barrel_shifter_operates_at_width() {
    // In 32-bit mode, sar #4 of $80000000 keeps the sign.
    let mut emu = machine(&[
        0xA9, 0x00, 0x00, 0x00, 0x80, // lda #$80000000
        0x02, 0xE9, 0x44, // shift sar #4
        0xDB,
    ]);
    emu.enter_native32();
    run_to_stp(&mut emu);
    assert_eq!(emu.cpu.a, 0xF800_0000);
}

#[test]
fn extend_group_produces_32_bit_results() {
    // lda #$80 ; sext8 -> $FFFFFF80, then popcnt -> 25.
    let mut emu = machine(&[
        0xA9, 0x80, // lda #$80
        0x02, 0xEA, 0x00, // sext8
        0x02, 0xEA, 0x06, // popcnt
        0xDB,
    ]);
    run_to_stp(&mut emu);
    assert_eq!(emu.cpu.a, 25);
}

#[test]
fn clz_ctz_count_from_the_right_ends() {
    let mut emu = machine(&[0xA9, 0x10, 0x02, 0xEA, 0x04, 0xDB]); // clz of $10
    run_to_stp(&mut emu);
    assert_eq!(emu.cpu.a, 27);

    let mut emu = machine(&[0xA9, 0x10, 0x02, 0xEA, 0x05, 0xDB]); // ctz of $10
    run_to_stp(&mut emu);
    assert_eq!(emu.cpu.a, 4);
}

#[test]
fn cas_repeated_with_same_value_is_idempotent() {
    // CAS then CAS again with X updated to the new value leaves the
    // word at the swapped value.
    let mut emu = machine(&[
        0xA2, 0x42, 0xA9, 0x99, // x=$42, a=$99
        0x02, 0x10, 0x50, // cas $50 (swaps in $99)
        0xA2, 0x99, // x=$99
        0x02, 0x10, 0x50, // cas $50 (stores $99 again)
        0xDB,
    ]);
    emu.write8(0x50, 0x42);
    run_to_stp(&mut emu);
    assert!(emu.cpu.p.z);
    assert_eq!(emu.read8(0x50), 0x99);
}

#[test]
fn user_mode_cannot_forge_supervisor_via_sepw() {
    let mut emu = machine(&[
        0x02, 0x33, 0x00, 0x08, // repw #$0800 (drop to user)
        0x02, 0x32, 0x00, 0x08, // sepw #$0800 (try to regain S)
        0xDB,
    ]);
    run_to_stp(&mut emu);
    assert!(!emu.cpu.p.s);
}

#[test]
fn user_mode_tav_is_a_privilege_trap() {
    let mut emu = machine(&[
        0x02, 0x33, 0x00, 0x08, // repw #$0800
        0x02, 0x26, // tav
        0xDB,
    ]);
    emu.write16(0xFFF8, 0x2000);
    emu.write8(0x2000, 0xDB);
    run_to_stp(&mut emu);
    assert_eq!(emu.trap().kind, TrapKind::Privilege);
}

#[test]
fn fcmp_orders_and_flags_unordered() {
    // Compare 2.0 vs 3.0 (less), then NaN (unordered -> V).
    let mut emu = machine(&[
        0xA9, 0x02, 0x02, 0xC8, 0x00, // i2f.s f0 = 2.0
        0xA9, 0x03, 0x02, 0xC8, 0x10, // i2f.s f1 = 3.0
        0x02, 0xC7, 0x01, // fcmp.s f0, f1
        0xDB,
    ]);
    run_to_stp(&mut emu);
    assert!(emu.cpu.p.n);
    assert!(!emu.cpu.p.z);
    assert!(!emu.cpu.p.c);
    assert!(!emu.cpu.p.v);

    let mut emu = machine(&[0x02, 0xC3, 0x00, 0x02, 0xC7, 0x00, 0xDB]); // fdiv f0,f0 (0/0=NaN) ; fcmp
    run_to_stp(&mut emu);
    assert!(emu.cpu.p.v);
}
