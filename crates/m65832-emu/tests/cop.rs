//! The 6502 coprocessor: window addressing, shadow-I/O logging,
//! interrupts, BCD and cycle accuracy.

use m65832_emu::cop::Cop6502;
use m65832_emu::Emu;

/// Coprocessor window based at 64 KiB inside a 1 MiB machine, with a
/// program at window address $0200 and the reset vector pointing at
/// it.
fn machine(program: &[u8]) -> Emu {
    let mut emu = Emu::new(0x10_0000).unwrap();
    emu.cop_init();
    emu.cop_set_vbr(0x1_0000).unwrap();
    emu.load(0x1_0000 + 0x200, program).unwrap();
    emu.load(0x1_0000 + 0xFFFC, &[0x00, 0x02]).unwrap();
    emu.cop_reset().unwrap();
    emu
}

fn cop(emu: &mut Emu) -> &mut Cop6502 {
    emu.cpu.cop.as_mut().unwrap()
}

#[test]
fn reset_loads_pc_from_window_vector() {
    let mut emu = machine(&[0xEA]);
    assert_eq!(cop(&mut emu).pc, 0x0200);
}

#[test]
fn lda_sta_through_the_window() {
    // lda #$5A ; sta $10 ; lda $10
    let mut emu = machine(&[0xA9, 0x5A, 0x85, 0x10, 0xA5, 0x10]);
    emu.cop_run(8).unwrap();
    assert_eq!(cop(&mut emu).a, 0x5A);
    // The store landed inside the window, not at physical $10.
    assert_eq!(emu.read8(0x1_0010), 0x5A);
    assert_eq!(emu.read8(0x0010), 0x00);
}

#[test]
fn run_batch_completes_the_instruction_in_flight() {
    // lda #$01 (2 cycles) ; sta $10 (3 cycles): asking for 3 cycles
    // must finish the store rather than stopping inside it.
    let mut emu = machine(&[0xA9, 0x01, 0x85, 0x10]);
    let consumed = emu.cop_run(3).unwrap();
    assert_eq!(consumed, 5);
    assert_eq!(emu.read8(0x1_0010), 0x01);
}

#[test]
fn cycle_counts_include_page_cross_penalty() {
    // lda $12FF,y with Y=1 crosses into $1300: 4+1 cycles.
    let mut emu = machine(&[0xA0, 0x01, 0xB9, 0xFF, 0x12]);
    let consumed = emu.cop_run(1).unwrap(); // ldy #$01 (2 cycles)
    assert_eq!(consumed, 2);
    let consumed = emu.cop_run(1).unwrap();
    assert_eq!(consumed, 5);
}

#[test]
fn branch_taken_and_page_cross_cycles() {
    // beq not taken: 2. beq taken, same page: 3.
    let mut emu = machine(&[0xA9, 0x01, 0xF0, 0x02, 0xF0, 0x00]); // lda #1 ; beq +2 ; beq +0
    emu.cop_run(1).unwrap();
    assert_eq!(emu.cop_run(1).unwrap(), 2); // not taken
    // Force Z and take the next branch.
    cop(&mut emu).a = 0;
    cop(&mut emu).p |= m65832_emu::cop::P6502::ZERO;
    assert_eq!(emu.cop_run(1).unwrap(), 3);
}

#[test]
fn shadow_writes_are_logged_with_frame_and_cycle() {
    // Two stores into bank 1 at $D400.
    let mut emu = machine(&[
        0xA9, 0x17, // lda #$17
        0x8D, 0x00, 0xD4, // sta $D400
        0xA9, 0x2C, // lda #$2C
        0x8D, 0x05, 0xD4, // sta $D405
    ]);
    emu.cop_set_shadow_bank(1, 0xD400, true).unwrap();
    emu.cop_set_timing(100, 10).unwrap();
    emu.cop_run(12).unwrap();

    let first = emu.cop_fifo_pop().unwrap().expect("first write logged");
    assert_eq!(first.bank, 1);
    assert_eq!(first.reg, 0);
    assert_eq!(first.value, 0x17);
    assert_eq!(first.frame, 0);
    // The store finishes during the second instruction: 2+4 cycles in,
    // the write is stamped before the cycle counter advances past it.
    assert!(first.cycle <= 6);

    let second = emu.cop_fifo_pop().unwrap().expect("second write logged");
    assert_eq!(second.reg, 5);
    assert_eq!(second.value, 0x2C);
    assert!(second.cycle >= first.cycle);

    // Reads come back from the shadow register file, and nothing hit
    // the window RAM underneath.
    assert_eq!(cop(&mut emu).bank(1).reg(0), 0x17);
    assert_eq!(emu.read8(0x1_D400), 0x00);
}

#[test]
fn nmi_is_edge_detected() {
    let mut emu = machine(&[0xEA, 0xEA, 0xEA, 0xEA]);
    emu.load(0x1_0000 + 0xFFFA, &[0x00, 0x03]).unwrap(); // NMI -> $0300
    emu.load(0x1_0000 + 0x300, &[0x40]).unwrap(); // rti
    emu.cop_run(1).unwrap(); // nop

    emu.cop_nmi(true).unwrap();
    emu.cop_run(1).unwrap(); // edge: NMI taken
    assert_eq!(cop(&mut emu).pc, 0x0300);
    emu.cop_run(6).unwrap(); // rti

    // The line is still high: no second edge, so no re-entry.
    emu.cop_run(1).unwrap();
    assert_ne!(cop(&mut emu).pc, 0x0300);

    // Dropping and raising the line makes a new edge.
    emu.cop_nmi(false).unwrap();
    emu.cop_run(1).unwrap();
    emu.cop_nmi(true).unwrap();
    emu.cop_run(1).unwrap();
    assert_eq!(cop(&mut emu).pc, 0x0300);
}

#[test]
fn irq_is_level_sampled_and_masked_by_i() {
    let mut emu = machine(&[0x58, 0xEA, 0xEA]); // cli ; nop ; nop
    emu.load(0x1_0000 + 0xFFFE, &[0x00, 0x03]).unwrap();
    emu.load(0x1_0000 + 0x300, &[0x40]).unwrap();
    emu.cop_irq(true).unwrap();

    emu.cop_run(1).unwrap(); // cli (I was set at reset, IRQ held off)
    emu.cop_run(1).unwrap(); // now the level is sampled
    assert_eq!(cop(&mut emu).pc, 0x0300);
    emu.cop_irq(false).unwrap();
}

#[test]
fn bcd_adc_follows_nibble_rules() {
    // sed ; lda #$19 ; clc ; adc #$03 -> $22
    let mut emu = machine(&[0xF8, 0xA9, 0x19, 0x18, 0x69, 0x03]);
    emu.cop_run(11).unwrap();
    assert_eq!(cop(&mut emu).a, 0x22);
}

#[test]
fn bcd_disabled_flag_reverts_to_binary() {
    let mut emu = machine(&[0xF8, 0xA9, 0x19, 0x18, 0x69, 0x03]);
    cop(&mut emu).bcd_enabled = false;
    emu.cop_run(11).unwrap();
    assert_eq!(cop(&mut emu).a, 0x1C);
}

#[test]
fn cmos_extensions_are_gated() {
    // $64 (stz zp) is a NOP-shaped undefined on NMOS, a store on CMOS.
    let program = [0xA9, 0x55, 0x85, 0x10, 0x64, 0x10]; // lda/sta/stz $10
    let mut emu = machine(&program);
    emu.cop_run(10).unwrap();
    assert_eq!(emu.read8(0x1_0010), 0x55); // NMOS: stz did nothing

    let mut emu = machine(&program);
    cop(&mut emu).cmos = true;
    emu.cop_run(10).unwrap();
    assert_eq!(emu.read8(0x1_0010), 0x00); // CMOS: stz cleared it
}

#[test]
fn nmos_illegal_lax_loads_a_and_x() {
    let mut emu = machine(&[0xA7, 0x10]); // lax $10
    emu.load(0x1_0010, &[0x3C]).unwrap();
    cop(&mut emu).nmos_illegal = true;
    emu.cop_run(3).unwrap();
    assert_eq!(cop(&mut emu).a, 0x3C);
    assert_eq!(cop(&mut emu).x, 0x3C);
}

#[test]
fn kil_jams_until_reset() {
    let mut emu = machine(&[0x02]); // kil
    cop(&mut emu).nmos_illegal = true;
    assert_eq!(emu.cop_run(10).unwrap(), 0);
    assert!(cop(&mut emu).is_jammed());
    emu.cop_reset().unwrap();
    assert!(!cop(&mut emu).is_jammed());
}

#[test]
fn fifo_overflow_drops_oldest() {
    // A tight store loop overflows the 256-entry FIFO; the newest
    // entries survive.
    let mut emu = machine(&[
        0xA2, 0x00, // ldx #0
        0x8E, 0x00, 0xD4, // loop: stx $D400
        0xE8, // inx
        0xD0, 0xFA, // bne loop
        0xEA,
    ]);
    emu.cop_set_shadow_bank(0, 0xD400, true).unwrap();
    // 256 iterations of stx/inx/bne.
    emu.cop_run(256 * 9 + 2).unwrap();
    // FIFO holds at most 256 entries and the tail is the latest value.
    let mut last = None;
    let mut count = 0;
    while let Some(entry) = emu.cop_fifo_pop().unwrap() {
        last = Some(entry);
        count += 1;
    }
    assert!(count <= 256);
    assert_eq!(last.unwrap().value, 0xFF);
}

#[test]
fn jmp_indirect_page_wrap_bug_is_nmos_only() {
    // Pointer at $04FF: NMOS reads the high byte from $0400, CMOS
    // from $0500.
    let mut emu = machine(&[0x6C, 0xFF, 0x04]); // jmp ($04FF)
    emu.load(0x1_04FF, &[0x34]).unwrap();
    emu.load(0x1_0400, &[0x12]).unwrap();
    emu.load(0x1_0500, &[0x56]).unwrap();
    emu.cop_run(5).unwrap();
    assert_eq!(cop(&mut emu).pc, 0x1234);

    let mut emu = machine(&[0x6C, 0xFF, 0x04]);
    emu.load(0x1_04FF, &[0x34]).unwrap();
    emu.load(0x1_0400, &[0x12]).unwrap();
    emu.load(0x1_0500, &[0x56]).unwrap();
    cop(&mut emu).cmos = true;
    emu.cop_run(5).unwrap();
    assert_eq!(cop(&mut emu).pc, 0x5634);
}
