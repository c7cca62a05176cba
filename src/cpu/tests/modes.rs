//! MC6809 vs HD6309 variant-specific behavior.

use super::*;

fn new_6309_at(pc: u16) -> (Cpu, FlatBus) {
    let mut cpu = Cpu::new(CpuVariant::Hd6309);
    cpu.reset();
    cpu.state = CpuState::NextInstruction;
    cpu.pc = pc;
    cpu.s = 0x8000;
    (cpu, FlatBus::new())
}

#[test]
fn ldq_immediate_is_illegal_noop_on_6809() {
    let (mut cpu, mut bus) = new_cpu_at(0x2000);
    bus.load(0x2000, &[0xCD, 0x11, 0x22, 0x33, 0x44]);
    cpu.step(&mut bus);
    assert_eq!(cpu.q(), 0);
    assert_eq!(cpu.pc, 0x2005);
}

#[test]
fn ldq_immediate_loads_d_and_w_on_6309() {
    let (mut cpu, mut bus) = new_6309_at(0x2000);
    bus.load(0x2000, &[0xCD, 0x11, 0x22, 0x33, 0x44]);
    cpu.step(&mut bus);
    assert_eq!(cpu.d(), 0x1122);
    assert_eq!(cpu.w(), 0x3344);
}

#[test]
fn hd6309_page2_instructions_are_noop_on_6809() {
    let (mut cpu, mut bus) = new_cpu_at(0x2000);
    cpu.x = 0x1234;
    cpu.y = 0x0001;
    bus.load(0x2000, &[0x10, 0x30, 0x12]); // ADDR X,Y (6309-only)
    cpu.step(&mut bus);
    assert_eq!(cpu.x, 0x1234);
    assert_eq!(cpu.y, 0x0001);
}

#[test]
fn addr_register_register_adds_wide_registers() {
    let (mut cpu, mut bus) = new_6309_at(0x2000);
    cpu.x = 0x1000;
    cpu.y = 0x0001;
    bus.load(0x2000, &[0x10, 0x30, 0x12]); // ADDR X,Y -> Y += X
    cpu.step(&mut bus);
    assert_eq!(cpu.y, 0x1001);
    assert_eq!(cpu.x, 0x1000);
}

#[test]
fn divd_by_zero_sets_div0_flag() {
    let (mut cpu, mut bus) = new_6309_at(0x2000);
    cpu.set_d(100);
    bus.load(0x2000, &[0x11, 0x82, 0x00]); // DIVD #0
    cpu.step(&mut bus);
    assert!(cpu.md & super::super::hd6309::MD_DIV0 != 0);
}

#[test]
fn tfm_inc_inc_copies_block_and_advances_both_pointers() {
    let (mut cpu, mut bus) = new_6309_at(0x2000);
    bus.mem[0x3000] = 0xAA;
    bus.mem[0x3001] = 0xBB;
    cpu.x = 0x3000;
    cpu.y = 0x4000;
    cpu.set_w(2);
    bus.load(0x2000, &[0x11, 0x30, 0x12]); // TFM X+,Y+
    cpu.step(&mut bus); // decodes TFM and sets up tfm state
    assert!(cpu.tfm.is_some());
    // Each byte is moved only once the state machine cycles back through
    // LabelA/LabelB (where interrupts would be polled) to NextInstruction.
    for _ in 0..10 {
        cpu.step(&mut bus);
        if cpu.tfm.is_none() {
            break;
        }
    }
    assert!(cpu.tfm.is_none());
    assert_eq!(bus.mem[0x4000], 0xAA);
    assert_eq!(bus.mem[0x4001], 0xBB);
    assert_eq!(cpu.x, 0x3002);
    assert_eq!(cpu.y, 0x4002);
}
