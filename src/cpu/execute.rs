//! Opcode dispatch: base page (0x00-0xFF), page 2 (0x10 prefix), and page 3
//! (0x11 prefix), per §4.2. Addressing-mode computation is shared across
//! the accumulator/index-register variants of each operation the same way
//! the silicon does it — only the operand fetch differs.

use super::flags::*;
use super::indexed;
use super::{Bus, Cpu, CpuState};

/// 8-bit ALU ops that read two operands and optionally write back to the
/// accumulator (SUB/CMP/SBC/AND/BIT/LDA/EOR/ADC/OR/ADD all share this
/// shape; only CMP/BIT don't write back).
enum Alu8 {
    Sub,
    Cmp,
    Sbc,
    And,
    Bit,
    Ld,
    Eor,
    Adc,
    Or,
    Add,
}

enum Alu16 {
    Add,
    Sub,
}

#[derive(Clone, Copy)]
pub(crate) enum RegSel {
    D,
    X,
    Y,
    U,
    S,
}

impl Cpu {
    pub(crate) fn dispatch(&mut self, bus: &mut impl Bus, opcode: u16) {
        if opcode & 0xFF00 == 0x1000 {
            self.dispatch_page2(bus, (opcode & 0xFF) as u8);
            return;
        }
        if opcode & 0xFF00 == 0x1100 {
            self.dispatch_page3(bus, (opcode & 0xFF) as u8);
            return;
        }
        self.dispatch_page0(bus, opcode as u8);
    }

    fn dispatch_page0(&mut self, bus: &mut impl Bus, op: u8) {
        match op {
            // ---- direct-page read-modify-write (0x00-0x0F) ----
            0x00 => self.rmw_direct(bus, Self::op_neg),
            0x01 => self.rmw_direct(bus, Self::op_neg), // illegal: NEG alias
            0x02 => self.rmw_direct(bus, Self::op_neg_then_com), // illegal "NEGCOM"
            0x03 => self.rmw_direct(bus, Self::op_com),
            0x04 => self.rmw_direct(bus, Self::op_lsr),
            0x05 => self.rmw_direct(bus, Self::op_lsr), // illegal: LSR alias
            0x06 => self.rmw_direct(bus, Self::op_ror),
            0x07 => self.rmw_direct(bus, Self::op_asr),
            0x08 => self.rmw_direct(bus, Self::op_asl),
            0x09 => self.rmw_direct(bus, Self::op_rol),
            0x0A => self.rmw_direct(bus, Self::op_dec),
            0x0B => self.rmw_direct(bus, Self::op_dec), // illegal: DEC alias
            0x0C => self.rmw_direct(bus, Self::op_inc),
            0x0D => self.tst_direct(bus),
            0x0E => self.jmp_direct(bus),
            0x0F => self.rmw_direct(bus, Self::op_clr),

            0x10 | 0x11 => unreachable!("consumed by prefix handling"),
            0x12 => {} // NOP
            0x13 => self.state = CpuState::Sync,
            0x14 => {
                log::warn!("HCF opcode 0x14 at pc={:#06x}, CPU halted permanently", self.pc);
                self.state = CpuState::Hcf;
            }
            0x15 => {
                log::warn!("HCF opcode 0x15 at pc={:#06x}, CPU halted permanently", self.pc);
                self.state = CpuState::Hcf;
            }
            0x16 => self.lbra(bus),
            0x17 => self.lbsr(bus),
            0x18 => {
                // illegal: shifts CC left by one bit, preserving the top
                // bit pattern (masked quirk per hardware trace analysis).
                let cc = self.cc;
                self.cc = (cc << 1) | ((cc & 0x80) >> 7);
            }
            0x19 => self.daa(),
            0x1A => {
                let v = self.fetch_u8(bus);
                self.cc |= v;
            }
            0x1B => {} // illegal no-op
            0x1C => {
                let v = self.fetch_u8(bus);
                self.cc &= v;
            }
            0x1D => self.sex(),
            0x1E => {
                let pb = self.fetch_u8(bus);
                self.exchange(pb);
            }
            0x1F => {
                let pb = self.fetch_u8(bus);
                self.transfer(pb);
            }

            // ---- short branches (0x20-0x2F) ----
            0x20..=0x2F => self.short_branch(bus, op & 0x0F),

            // ---- LEA / stack ops / misc inherent (0x30-0x3F) ----
            0x30 => {
                let (addr, _) = indexed::decode(self, bus);
                self.x = addr;
                self.cc = set_bit(self.cc, CC_Z, addr == 0);
            }
            0x31 => {
                let (addr, _) = indexed::decode(self, bus);
                self.y = addr;
                self.cc = set_bit(self.cc, CC_Z, addr == 0);
            }
            0x32 => {
                let (addr, _) = indexed::decode(self, bus);
                self.s = addr;
            }
            0x33 => {
                let (addr, _) = indexed::decode(self, bus);
                self.u = addr;
            }
            0x34 => {
                let mask = self.fetch_u8(bus);
                self.push_list_s(bus, mask);
            }
            0x35 => {
                let mask = self.fetch_u8(bus);
                self.pull_list_s(bus, mask);
            }
            0x36 => {
                let mask = self.fetch_u8(bus);
                self.push_list_u(bus, mask);
            }
            0x37 => {
                let mask = self.fetch_u8(bus);
                self.pull_list_u(bus, mask);
            }
            0x38 => {
                // illegal: alternate ANDCC encoding
                let v = self.fetch_u8(bus);
                self.cc &= v;
            }
            0x39 => {
                self.pc = self.pull_u16_s(bus);
            }
            0x3A => {
                self.x = self.x.wrapping_add(self.b() as u16);
            }
            0x3B => self.rti(bus),
            0x3C => self.cwai(bus),
            0x3D => self.mul(),
            0x3E => {
                // illegal RESET: behaves like a hardware reset vector fetch
                self.state = CpuState::Reset;
            }
            0x3F => self.swi(bus, super::vectors::SWI, true),

            // ---- inherent A-register RMW (0x40-0x4F) ----
            0x40 => self.rmw_a(Self::op_neg),
            0x41 => self.rmw_a(Self::op_neg),
            0x42 => self.rmw_a(Self::op_neg_then_com),
            0x43 => self.rmw_a(Self::op_com),
            0x44 => self.rmw_a(Self::op_lsr),
            0x45 => self.rmw_a(Self::op_lsr),
            0x46 => self.rmw_a(Self::op_ror),
            0x47 => self.rmw_a(Self::op_asr),
            0x48 => self.rmw_a(Self::op_asl),
            0x49 => self.rmw_a(Self::op_rol),
            0x4A => self.rmw_a(Self::op_dec),
            0x4B => self.rmw_a(Self::op_dec),
            0x4C => self.rmw_a(Self::op_inc),
            0x4D => {
                let a = self.a();
                self.cc = nz8(self.cc, a);
                self.cc &= !CC_V;
            }
            0x4E => self.rmw_a(Self::op_neg), // illegal
            0x4F => self.rmw_a(Self::op_clr),

            // ---- inherent B-register RMW (0x50-0x5F) ----
            0x50 => self.rmw_b(Self::op_neg),
            0x51 => self.rmw_b(Self::op_neg),
            0x52 => self.rmw_b(Self::op_neg_then_com),
            0x53 => self.rmw_b(Self::op_com),
            0x54 => self.rmw_b(Self::op_lsr),
            0x55 => self.rmw_b(Self::op_lsr),
            0x56 => self.rmw_b(Self::op_ror),
            0x57 => self.rmw_b(Self::op_asr),
            0x58 => self.rmw_b(Self::op_asl),
            0x59 => self.rmw_b(Self::op_rol),
            0x5A => self.rmw_b(Self::op_dec),
            0x5B => self.rmw_b(Self::op_dec),
            0x5C => self.rmw_b(Self::op_inc),
            0x5D => {
                let b = self.b();
                self.cc = nz8(self.cc, b);
                self.cc &= !CC_V;
            }
            0x5E => self.rmw_b(Self::op_neg),
            0x5F => self.rmw_b(Self::op_clr),

            // ---- indexed RMW (0x60-0x6F) ----
            0x60 => self.rmw_indexed(bus, Self::op_neg),
            0x61 => self.rmw_indexed(bus, Self::op_neg),
            0x62 => self.rmw_indexed(bus, Self::op_neg_then_com),
            0x63 => self.rmw_indexed(bus, Self::op_com),
            0x64 => self.rmw_indexed(bus, Self::op_lsr),
            0x65 => self.rmw_indexed(bus, Self::op_lsr),
            0x66 => self.rmw_indexed(bus, Self::op_ror),
            0x67 => self.rmw_indexed(bus, Self::op_asr),
            0x68 => self.rmw_indexed(bus, Self::op_asl),
            0x69 => self.rmw_indexed(bus, Self::op_rol),
            0x6A => self.rmw_indexed(bus, Self::op_dec),
            0x6B => self.rmw_indexed(bus, Self::op_dec),
            0x6C => self.rmw_indexed(bus, Self::op_inc),
            0x6D => self.tst_indexed(bus),
            0x6E => {
                let (addr, _) = indexed::decode(self, bus);
                self.pc = addr;
            }
            0x6F => self.rmw_indexed(bus, Self::op_clr),

            // ---- extended RMW (0x70-0x7F) ----
            0x70 => self.rmw_extended(bus, Self::op_neg),
            0x71 => self.rmw_extended(bus, Self::op_neg),
            0x72 => self.rmw_extended(bus, Self::op_neg_then_com),
            0x73 => self.rmw_extended(bus, Self::op_com),
            0x74 => self.rmw_extended(bus, Self::op_lsr),
            0x75 => self.rmw_extended(bus, Self::op_lsr),
            0x76 => self.rmw_extended(bus, Self::op_ror),
            0x77 => self.rmw_extended(bus, Self::op_asr),
            0x78 => self.rmw_extended(bus, Self::op_asl),
            0x79 => self.rmw_extended(bus, Self::op_rol),
            0x7A => self.rmw_extended(bus, Self::op_dec),
            0x7B => self.rmw_extended(bus, Self::op_dec),
            0x7C => self.rmw_extended(bus, Self::op_inc),
            0x7D => self.tst_extended(bus),
            0x7E => {
                self.pc = self.fetch_u16(bus);
            }
            0x7F => self.rmw_extended(bus, Self::op_clr),

            // ---- A-register ALU, immediate/direct/indexed/extended ----
            0x80 => self.alu8_a(bus, Alu8::Sub, Self::fetch_immediate8),
            0x81 => self.alu8_a(bus, Alu8::Cmp, Self::fetch_immediate8),
            0x82 => self.alu8_a(bus, Alu8::Sbc, Self::fetch_immediate8),
            0x83 => self.alu16_d(bus, Alu16::Sub, Self::fetch_immediate16),
            0x84 => self.alu8_a(bus, Alu8::And, Self::fetch_immediate8),
            0x85 => self.alu8_a(bus, Alu8::Bit, Self::fetch_immediate8),
            0x86 => self.alu8_a(bus, Alu8::Ld, Self::fetch_immediate8),
            0x87 => {
                let _ = self.fetch_u8(bus);
            } // illegal: STA immediate, discarded
            0x88 => self.alu8_a(bus, Alu8::Eor, Self::fetch_immediate8),
            0x89 => self.alu8_a(bus, Alu8::Adc, Self::fetch_immediate8),
            0x8A => self.alu8_a(bus, Alu8::Or, Self::fetch_immediate8),
            0x8B => self.alu8_a(bus, Alu8::Add, Self::fetch_immediate8),
            0x8C => self.alu16_cmp(bus, RegSel::X, Self::fetch_immediate16),
            0x8D => self.bsr(bus),
            0x8E => {
                let v = self.fetch_u16(bus);
                self.x = v;
                self.cc = nz16(self.cc, v);
                self.cc &= !CC_V;
            }
            0x8F => {
                let _ = self.fetch_u16(bus);
            } // illegal: STX immediate, discarded

            0x90 => self.alu8_a(bus, Alu8::Sub, Self::addr_direct),
            0x91 => self.alu8_a(bus, Alu8::Cmp, Self::addr_direct),
            0x92 => self.alu8_a(bus, Alu8::Sbc, Self::addr_direct),
            0x93 => self.alu16_d(bus, Alu16::Sub, Self::addr_direct16),
            0x94 => self.alu8_a(bus, Alu8::And, Self::addr_direct),
            0x95 => self.alu8_a(bus, Alu8::Bit, Self::addr_direct),
            0x96 => self.alu8_a(bus, Alu8::Ld, Self::addr_direct),
            0x97 => self.store_direct(bus, Self::a),
            0x98 => self.alu8_a(bus, Alu8::Eor, Self::addr_direct),
            0x99 => self.alu8_a(bus, Alu8::Adc, Self::addr_direct),
            0x9A => self.alu8_a(bus, Alu8::Or, Self::addr_direct),
            0x9B => self.alu8_a(bus, Alu8::Add, Self::addr_direct),
            0x9C => self.alu16_cmp(bus, RegSel::X, Self::addr_direct16),
            0x9D => self.jsr_direct(bus),
            0x9E => self.ld16_direct(bus, RegSel::X),
            0x9F => self.store16_direct(bus, RegSel::X),

            0xA0 => self.alu8_a(bus, Alu8::Sub, Self::addr_indexed),
            0xA1 => self.alu8_a(bus, Alu8::Cmp, Self::addr_indexed),
            0xA2 => self.alu8_a(bus, Alu8::Sbc, Self::addr_indexed),
            0xA3 => self.alu16_d(bus, Alu16::Sub, Self::addr_indexed16),
            0xA4 => self.alu8_a(bus, Alu8::And, Self::addr_indexed),
            0xA5 => self.alu8_a(bus, Alu8::Bit, Self::addr_indexed),
            0xA6 => self.alu8_a(bus, Alu8::Ld, Self::addr_indexed),
            0xA7 => self.store_indexed(bus, Self::a),
            0xA8 => self.alu8_a(bus, Alu8::Eor, Self::addr_indexed),
            0xA9 => self.alu8_a(bus, Alu8::Adc, Self::addr_indexed),
            0xAA => self.alu8_a(bus, Alu8::Or, Self::addr_indexed),
            0xAB => self.alu8_a(bus, Alu8::Add, Self::addr_indexed),
            0xAC => self.alu16_cmp(bus, RegSel::X, Self::addr_indexed16),
            0xAD => self.jsr_indexed(bus),
            0xAE => self.ld16_indexed(bus, RegSel::X),
            0xAF => self.store16_indexed(bus, RegSel::X),

            0xB0 => self.alu8_a(bus, Alu8::Sub, Self::addr_extended),
            0xB1 => self.alu8_a(bus, Alu8::Cmp, Self::addr_extended),
            0xB2 => self.alu8_a(bus, Alu8::Sbc, Self::addr_extended),
            0xB3 => self.alu16_d(bus, Alu16::Sub, Self::addr_extended16),
            0xB4 => self.alu8_a(bus, Alu8::And, Self::addr_extended),
            0xB5 => self.alu8_a(bus, Alu8::Bit, Self::addr_extended),
            0xB6 => self.alu8_a(bus, Alu8::Ld, Self::addr_extended),
            0xB7 => self.store_extended(bus, Self::a),
            0xB8 => self.alu8_a(bus, Alu8::Eor, Self::addr_extended),
            0xB9 => self.alu8_a(bus, Alu8::Adc, Self::addr_extended),
            0xBA => self.alu8_a(bus, Alu8::Or, Self::addr_extended),
            0xBB => self.alu8_a(bus, Alu8::Add, Self::addr_extended),
            0xBC => self.alu16_cmp(bus, RegSel::X, Self::addr_extended16),
            0xBD => self.jsr_extended(bus),
            0xBE => self.ld16_extended(bus, RegSel::X),
            0xBF => self.store16_extended(bus, RegSel::X),

            // ---- B-register ALU / D-register 16-bit group ----
            0xC0 => self.alu8_b(bus, Alu8::Sub, Self::fetch_immediate8),
            0xC1 => self.alu8_b(bus, Alu8::Cmp, Self::fetch_immediate8),
            0xC2 => self.alu8_b(bus, Alu8::Sbc, Self::fetch_immediate8),
            0xC3 => self.alu16_d(bus, Alu16::Add, Self::fetch_immediate16),
            0xC4 => self.alu8_b(bus, Alu8::And, Self::fetch_immediate8),
            0xC5 => self.alu8_b(bus, Alu8::Bit, Self::fetch_immediate8),
            0xC6 => self.alu8_b(bus, Alu8::Ld, Self::fetch_immediate8),
            0xC7 => {
                let _ = self.fetch_u8(bus);
            } // illegal: STB immediate
            0xC8 => self.alu8_b(bus, Alu8::Eor, Self::fetch_immediate8),
            0xC9 => self.alu8_b(bus, Alu8::Adc, Self::fetch_immediate8),
            0xCA => self.alu8_b(bus, Alu8::Or, Self::fetch_immediate8),
            0xCB => self.alu8_b(bus, Alu8::Add, Self::fetch_immediate8),
            0xCC => {
                let v = self.fetch_u16(bus);
                self.set_d(v);
                self.cc = nz16(self.cc, v);
                self.cc &= !CC_V;
            }
            0xCD => self.ldq_immediate(bus), // illegal on 6809, LDQ on 6309
            0xCE => {
                let v = self.fetch_u16(bus);
                self.u = v;
                self.cc = nz16(self.cc, v);
                self.cc &= !CC_V;
            }
            0xCF => {
                let _ = self.fetch_u16(bus);
            } // illegal: STU immediate

            0xD0 => self.alu8_b(bus, Alu8::Sub, Self::addr_direct),
            0xD1 => self.alu8_b(bus, Alu8::Cmp, Self::addr_direct),
            0xD2 => self.alu8_b(bus, Alu8::Sbc, Self::addr_direct),
            0xD3 => self.alu16_d(bus, Alu16::Add, Self::addr_direct16),
            0xD4 => self.alu8_b(bus, Alu8::And, Self::addr_direct),
            0xD5 => self.alu8_b(bus, Alu8::Bit, Self::addr_direct),
            0xD6 => self.alu8_b(bus, Alu8::Ld, Self::addr_direct),
            0xD7 => self.store_direct(bus, Self::b),
            0xD8 => self.alu8_b(bus, Alu8::Eor, Self::addr_direct),
            0xD9 => self.alu8_b(bus, Alu8::Adc, Self::addr_direct),
            0xDA => self.alu8_b(bus, Alu8::Or, Self::addr_direct),
            0xDB => self.alu8_b(bus, Alu8::Add, Self::addr_direct),
            0xDC => self.ldd_direct(bus),
            0xDD => self.std_direct(bus),
            0xDE => self.ld16_direct(bus, RegSel::U),
            0xDF => self.store16_direct(bus, RegSel::U),

            0xE0 => self.alu8_b(bus, Alu8::Sub, Self::addr_indexed),
            0xE1 => self.alu8_b(bus, Alu8::Cmp, Self::addr_indexed),
            0xE2 => self.alu8_b(bus, Alu8::Sbc, Self::addr_indexed),
            0xE3 => self.alu16_d(bus, Alu16::Add, Self::addr_indexed16),
            0xE4 => self.alu8_b(bus, Alu8::And, Self::addr_indexed),
            0xE5 => self.alu8_b(bus, Alu8::Bit, Self::addr_indexed),
            0xE6 => self.alu8_b(bus, Alu8::Ld, Self::addr_indexed),
            0xE7 => self.store_indexed(bus, Self::b),
            0xE8 => self.alu8_b(bus, Alu8::Eor, Self::addr_indexed),
            0xE9 => self.alu8_b(bus, Alu8::Adc, Self::addr_indexed),
            0xEA => self.alu8_b(bus, Alu8::Or, Self::addr_indexed),
            0xEB => self.alu8_b(bus, Alu8::Add, Self::addr_indexed),
            0xEC => self.ldd_indexed(bus),
            0xED => self.std_indexed(bus),
            0xEE => self.ld16_indexed(bus, RegSel::U),
            0xEF => self.store16_indexed(bus, RegSel::U),

            0xF0 => self.alu8_b(bus, Alu8::Sub, Self::addr_extended),
            0xF1 => self.alu8_b(bus, Alu8::Cmp, Self::addr_extended),
            0xF2 => self.alu8_b(bus, Alu8::Sbc, Self::addr_extended),
            0xF3 => self.alu16_d(bus, Alu16::Add, Self::addr_extended16),
            0xF4 => self.alu8_b(bus, Alu8::And, Self::addr_extended),
            0xF5 => self.alu8_b(bus, Alu8::Bit, Self::addr_extended),
            0xF6 => self.alu8_b(bus, Alu8::Ld, Self::addr_extended),
            0xF7 => self.store_extended(bus, Self::b),
            0xF8 => self.alu8_b(bus, Alu8::Eor, Self::addr_extended),
            0xF9 => self.alu8_b(bus, Alu8::Adc, Self::addr_extended),
            0xFA => self.alu8_b(bus, Alu8::Or, Self::addr_extended),
            0xFB => self.alu8_b(bus, Alu8::Add, Self::addr_extended),
            0xFC => self.ldd_extended(bus),
            0xFD => self.std_extended(bus),
            0xFE => self.ld16_extended(bus, RegSel::U),
            0xFF => self.store16_extended(bus, RegSel::U),
        }
    }

    fn dispatch_page2(&mut self, bus: &mut impl Bus, op: u8) {
        match op {
            0x21..=0x2F => self.long_branch(bus, op & 0x0F),
            0x3F => self.swi(bus, super::vectors::SWI2, true),
            0x83 => self.alu16_cmp(bus, RegSel::D, Self::fetch_immediate16),
            0x8C => self.alu16_cmp(bus, RegSel::Y, Self::fetch_immediate16),
            0x8E => {
                let v = self.fetch_u16(bus);
                self.y = v;
                self.cc = nz16(self.cc, v);
                self.cc &= !CC_V;
            }
            0x93 => self.alu16_cmp(bus, RegSel::D, Self::addr_direct16),
            0x9C => self.alu16_cmp(bus, RegSel::Y, Self::addr_direct16),
            0x9E => self.ld16_direct(bus, RegSel::Y),
            0x9F => self.store16_direct(bus, RegSel::Y),
            0xA3 => self.alu16_cmp(bus, RegSel::D, Self::addr_indexed16),
            0xAC => self.alu16_cmp(bus, RegSel::Y, Self::addr_indexed16),
            0xAE => self.ld16_indexed(bus, RegSel::Y),
            0xAF => self.store16_indexed(bus, RegSel::Y),
            0xB3 => self.alu16_cmp(bus, RegSel::D, Self::addr_extended16),
            0xBC => self.alu16_cmp(bus, RegSel::Y, Self::addr_extended16),
            0xBE => self.ld16_extended(bus, RegSel::Y),
            0xBF => self.store16_extended(bus, RegSel::Y),
            0xCE => {
                let v = self.fetch_u16(bus);
                self.s = v;
                self.cc = nz16(self.cc, v);
                self.cc &= !CC_V;
            }
            0xDE => self.ld16_direct(bus, RegSel::S),
            0xDF => self.store16_direct(bus, RegSel::S),
            0xEE => self.ld16_indexed(bus, RegSel::S),
            0xEF => self.store16_indexed(bus, RegSel::S),
            0xFE => self.ld16_extended(bus, RegSel::S),
            0xFF => self.store16_extended(bus, RegSel::S),
            _ => self.hd6309_page2(bus, op),
        }
    }

    fn dispatch_page3(&mut self, bus: &mut impl Bus, op: u8) {
        match op {
            0x3F => self.swi(bus, super::vectors::SWI3, true),
            0x83 => self.alu16_cmp(bus, RegSel::U, Self::fetch_immediate16),
            0x8C => self.alu16_cmp(bus, RegSel::S, Self::fetch_immediate16),
            0x93 => self.alu16_cmp(bus, RegSel::U, Self::addr_direct16),
            0x9C => self.alu16_cmp(bus, RegSel::S, Self::addr_direct16),
            0xA3 => self.alu16_cmp(bus, RegSel::U, Self::addr_indexed16),
            0xAC => self.alu16_cmp(bus, RegSel::S, Self::addr_indexed16),
            0xB3 => self.alu16_cmp(bus, RegSel::U, Self::addr_extended16),
            0xBC => self.alu16_cmp(bus, RegSel::S, Self::addr_extended16),
            _ => self.hd6309_page3(bus, op),
        }
    }

    // ---- addressing-mode operand fetch helpers ----

    fn fetch_immediate8(&mut self, bus: &mut impl Bus) -> u8 {
        self.fetch_u8(bus)
    }
    fn fetch_immediate16(&mut self, bus: &mut impl Bus) -> u16 {
        self.fetch_u16(bus)
    }
    fn addr_direct(&mut self, bus: &mut impl Bus) -> u8 {
        let addr = self.direct_addr(bus);
        bus.read(addr)
    }
    fn addr_direct16(&mut self, bus: &mut impl Bus) -> u16 {
        let addr = self.direct_addr(bus);
        let hi = bus.read(addr) as u16;
        let lo = bus.read(addr.wrapping_add(1)) as u16;
        (hi << 8) | lo
    }
    fn addr_indexed(&mut self, bus: &mut impl Bus) -> u8 {
        let (addr, _) = indexed::decode(self, bus);
        bus.read(addr)
    }
    fn addr_indexed16(&mut self, bus: &mut impl Bus) -> u16 {
        let (addr, _) = indexed::decode(self, bus);
        let hi = bus.read(addr) as u16;
        let lo = bus.read(addr.wrapping_add(1)) as u16;
        (hi << 8) | lo
    }
    fn addr_extended(&mut self, bus: &mut impl Bus) -> u8 {
        let addr = self.fetch_u16(bus);
        bus.read(addr)
    }
    fn addr_extended16(&mut self, bus: &mut impl Bus) -> u16 {
        let addr = self.fetch_u16(bus);
        let hi = bus.read(addr) as u16;
        let lo = bus.read(addr.wrapping_add(1)) as u16;
        (hi << 8) | lo
    }

    fn direct_addr(&mut self, bus: &mut impl Bus) -> u16 {
        let lo = self.fetch_u8(bus);
        ((self.dp as u16) << 8) | lo as u16
    }

    // ---- generic ALU application ----

    fn apply_alu8(&mut self, op: Alu8, acc: u8, operand: u8) -> u8 {
        match op {
            Alu8::Sub => {
                let (r, cc) = sub8(self.cc, acc, operand, 0);
                self.cc = cc;
                r
            }
            Alu8::Cmp => {
                let (_, cc) = sub8(self.cc, acc, operand, 0);
                self.cc = cc;
                acc
            }
            Alu8::Sbc => {
                let borrow = (self.cc & CC_C != 0) as u8;
                let (r, cc) = sub8(self.cc, acc, operand, borrow);
                self.cc = cc;
                r
            }
            Alu8::And => {
                let r = acc & operand;
                self.cc = logic8(self.cc, r);
                r
            }
            Alu8::Bit => {
                let r = acc & operand;
                self.cc = logic8(self.cc, r);
                acc
            }
            Alu8::Ld => {
                self.cc = logic8(self.cc, operand);
                operand
            }
            Alu8::Eor => {
                let r = acc ^ operand;
                self.cc = logic8(self.cc, r);
                r
            }
            Alu8::Adc => {
                let carry = (self.cc & CC_C != 0) as u8;
                let (r, cc) = add8(self.cc, acc, operand, carry);
                self.cc = cc;
                r
            }
            Alu8::Or => {
                let r = acc | operand;
                self.cc = logic8(self.cc, r);
                r
            }
            Alu8::Add => {
                let (r, cc) = add8(self.cc, acc, operand, 0);
                self.cc = cc;
                r
            }
        }
    }

    fn alu8_a(&mut self, bus: &mut impl Bus, op: Alu8, fetch: fn(&mut Self, &mut impl Bus) -> u8) {
        let operand = fetch(self, bus);
        let acc = self.a();
        let r = self.apply_alu8(op, acc, operand);
        self.set_a(r);
    }

    fn alu8_b(&mut self, bus: &mut impl Bus, op: Alu8, fetch: fn(&mut Self, &mut impl Bus) -> u8) {
        let operand = fetch(self, bus);
        let acc = self.b();
        let r = self.apply_alu8(op, acc, operand);
        self.set_b(r);
    }

    fn alu16_d(
        &mut self,
        bus: &mut impl Bus,
        op: Alu16,
        fetch: fn(&mut Self, &mut impl Bus) -> u16,
    ) {
        let operand = fetch(self, bus);
        let d = self.d();
        let (r, cc) = match op {
            Alu16::Add => add16(self.cc, d, operand),
            Alu16::Sub => sub16(self.cc, d, operand),
        };
        self.cc = cc;
        self.set_d(r);
    }

    fn alu16_cmp(
        &mut self,
        bus: &mut impl Bus,
        reg: RegSel,
        fetch: fn(&mut Self, &mut impl Bus) -> u16,
    ) {
        let operand = fetch(self, bus);
        let v = self.reg_value(reg);
        let (_, cc) = sub16(self.cc, v, operand);
        self.cc = cc;
    }

    fn reg_value(&self, reg: RegSel) -> u16 {
        match reg {
            RegSel::D => self.d(),
            RegSel::X => self.x,
            RegSel::Y => self.y,
            RegSel::U => self.u,
            RegSel::S => self.s,
        }
    }
    fn set_reg_value(&mut self, reg: RegSel, v: u16) {
        match reg {
            RegSel::D => self.set_d(v),
            RegSel::X => self.x = v,
            RegSel::Y => self.y = v,
            RegSel::U => self.u = v,
            RegSel::S => self.s = v,
        }
    }

    // ---- read-modify-write helpers ----

    fn rmw_direct(&mut self, bus: &mut impl Bus, f: fn(&mut Self, u8) -> u8) {
        let addr = self.direct_addr(bus);
        let v = bus.read(addr);
        let r = f(self, v);
        bus.write(addr, r);
    }
    fn rmw_indexed(&mut self, bus: &mut impl Bus, f: fn(&mut Self, u8) -> u8) {
        let (addr, _) = indexed::decode(self, bus);
        let v = bus.read(addr);
        let r = f(self, v);
        bus.write(addr, r);
    }
    fn rmw_extended(&mut self, bus: &mut impl Bus, f: fn(&mut Self, u8) -> u8) {
        let addr = self.fetch_u16(bus);
        let v = bus.read(addr);
        let r = f(self, v);
        bus.write(addr, r);
    }
    fn rmw_a(&mut self, f: fn(&mut Self, u8) -> u8) {
        let v = self.a();
        let r = f(self, v);
        self.set_a(r);
    }
    fn rmw_b(&mut self, f: fn(&mut Self, u8) -> u8) {
        let v = self.b();
        let r = f(self, v);
        self.set_b(r);
    }

    fn op_neg(&mut self, v: u8) -> u8 {
        let (r, cc) = neg8(self.cc, v);
        self.cc = cc;
        r
    }
    fn op_neg_then_com(&mut self, v: u8) -> u8 {
        let (r1, cc1) = neg8(self.cc, v);
        self.cc = cc1;
        let (r2, cc2) = com8(self.cc, r1);
        self.cc = cc2;
        r2
    }
    fn op_com(&mut self, v: u8) -> u8 {
        let (r, cc) = com8(self.cc, v);
        self.cc = cc;
        r
    }
    fn op_lsr(&mut self, v: u8) -> u8 {
        let (r, cc) = lsr8(self.cc, v);
        self.cc = cc;
        r
    }
    fn op_ror(&mut self, v: u8) -> u8 {
        let (r, cc) = ror8(self.cc, v);
        self.cc = cc;
        r
    }
    fn op_asr(&mut self, v: u8) -> u8 {
        let (r, cc) = asr8(self.cc, v);
        self.cc = cc;
        r
    }
    fn op_asl(&mut self, v: u8) -> u8 {
        let (r, cc) = asl8(self.cc, v);
        self.cc = cc;
        r
    }
    fn op_rol(&mut self, v: u8) -> u8 {
        let (r, cc) = rol8(self.cc, v);
        self.cc = cc;
        r
    }
    fn op_dec(&mut self, v: u8) -> u8 {
        let (r, cc) = dec8(self.cc, v);
        self.cc = cc;
        r
    }
    fn op_inc(&mut self, v: u8) -> u8 {
        let (r, cc) = inc8(self.cc, v);
        self.cc = cc;
        r
    }
    fn op_clr(&mut self, _v: u8) -> u8 {
        self.cc = (self.cc & !(CC_N | CC_V | CC_C)) | CC_Z;
        0
    }

    fn tst_direct(&mut self, bus: &mut impl Bus) {
        let addr = self.direct_addr(bus);
        let v = bus.read(addr);
        self.cc = nz8(self.cc, v);
        self.cc &= !CC_V;
    }
    fn tst_indexed(&mut self, bus: &mut impl Bus) {
        let (addr, _) = indexed::decode(self, bus);
        let v = bus.read(addr);
        self.cc = nz8(self.cc, v);
        self.cc &= !CC_V;
    }
    fn tst_extended(&mut self, bus: &mut impl Bus) {
        let addr = self.fetch_u16(bus);
        let v = bus.read(addr);
        self.cc = nz8(self.cc, v);
        self.cc &= !CC_V;
    }
    fn jmp_direct(&mut self, bus: &mut impl Bus) {
        self.pc = self.direct_addr(bus);
    }

    // ---- 16-bit register load/store ----

    fn ld16_direct(&mut self, bus: &mut impl Bus, reg: RegSel) {
        let v = self.addr_direct16(bus);
        self.set_reg_value(reg, v);
        self.cc = nz16(self.cc, v);
        self.cc &= !CC_V;
    }
    fn ld16_indexed(&mut self, bus: &mut impl Bus, reg: RegSel) {
        let v = self.addr_indexed16(bus);
        self.set_reg_value(reg, v);
        self.cc = nz16(self.cc, v);
        self.cc &= !CC_V;
    }
    fn ld16_extended(&mut self, bus: &mut impl Bus, reg: RegSel) {
        let v = self.addr_extended16(bus);
        self.set_reg_value(reg, v);
        self.cc = nz16(self.cc, v);
        self.cc &= !CC_V;
    }
    fn store16_direct(&mut self, bus: &mut impl Bus, reg: RegSel) {
        let addr = self.direct_addr(bus);
        let v = self.reg_value(reg);
        bus.write(addr, (v >> 8) as u8);
        bus.write(addr.wrapping_add(1), v as u8);
        self.cc = nz16(self.cc, v);
        self.cc &= !CC_V;
    }
    fn store16_indexed(&mut self, bus: &mut impl Bus, reg: RegSel) {
        let (addr, _) = indexed::decode(self, bus);
        let v = self.reg_value(reg);
        bus.write(addr, (v >> 8) as u8);
        bus.write(addr.wrapping_add(1), v as u8);
        self.cc = nz16(self.cc, v);
        self.cc &= !CC_V;
    }
    fn store16_extended(&mut self, bus: &mut impl Bus, reg: RegSel) {
        let addr = self.fetch_u16(bus);
        let v = self.reg_value(reg);
        bus.write(addr, (v >> 8) as u8);
        bus.write(addr.wrapping_add(1), v as u8);
        self.cc = nz16(self.cc, v);
        self.cc &= !CC_V;
    }

    fn ldd_direct(&mut self, bus: &mut impl Bus) {
        let v = self.addr_direct16(bus);
        self.set_d(v);
        self.cc = nz16(self.cc, v);
        self.cc &= !CC_V;
    }
    fn ldd_indexed(&mut self, bus: &mut impl Bus) {
        let v = self.addr_indexed16(bus);
        self.set_d(v);
        self.cc = nz16(self.cc, v);
        self.cc &= !CC_V;
    }
    fn ldd_extended(&mut self, bus: &mut impl Bus) {
        let v = self.addr_extended16(bus);
        self.set_d(v);
        self.cc = nz16(self.cc, v);
        self.cc &= !CC_V;
    }
    fn std_direct(&mut self, bus: &mut impl Bus) {
        let addr = self.direct_addr(bus);
        let v = self.d();
        bus.write(addr, (v >> 8) as u8);
        bus.write(addr.wrapping_add(1), v as u8);
        self.cc = nz16(self.cc, v);
        self.cc &= !CC_V;
    }
    fn std_indexed(&mut self, bus: &mut impl Bus) {
        let (addr, _) = indexed::decode(self, bus);
        let v = self.d();
        bus.write(addr, (v >> 8) as u8);
        bus.write(addr.wrapping_add(1), v as u8);
        self.cc = nz16(self.cc, v);
        self.cc &= !CC_V;
    }
    fn std_extended(&mut self, bus: &mut impl Bus) {
        let addr = self.fetch_u16(bus);
        let v = self.d();
        bus.write(addr, (v >> 8) as u8);
        bus.write(addr.wrapping_add(1), v as u8);
        self.cc = nz16(self.cc, v);
        self.cc &= !CC_V;
    }

    fn store_direct(&mut self, bus: &mut impl Bus, get: fn(&Self) -> u8) {
        let addr = self.direct_addr(bus);
        let v = get(self);
        bus.write(addr, v);
        self.cc = nz8(self.cc, v);
        self.cc &= !CC_V;
    }
    fn store_indexed(&mut self, bus: &mut impl Bus, get: fn(&Self) -> u8) {
        let (addr, _) = indexed::decode(self, bus);
        let v = get(self);
        bus.write(addr, v);
        self.cc = nz8(self.cc, v);
        self.cc &= !CC_V;
    }
    fn store_extended(&mut self, bus: &mut impl Bus, get: fn(&Self) -> u8) {
        let addr = self.fetch_u16(bus);
        let v = get(self);
        bus.write(addr, v);
        self.cc = nz8(self.cc, v);
        self.cc &= !CC_V;
    }

    // ---- control flow ----

    fn short_branch(&mut self, bus: &mut impl Bus, cond: u8) {
        let off = self.fetch_u8(bus) as i8 as i16;
        if self.branch_taken(cond) {
            self.pc = (self.pc as i32 + off as i32) as u16;
        }
    }
    fn long_branch(&mut self, bus: &mut impl Bus, cond: u8) {
        let off = self.fetch_u16(bus) as i16;
        if self.branch_taken(cond) {
            self.pc = (self.pc as i32 + off as i32) as u16;
        }
    }
    fn lbra(&mut self, bus: &mut impl Bus) {
        let off = self.fetch_u16(bus) as i16;
        self.pc = (self.pc as i32 + off as i32) as u16;
    }
    fn lbsr(&mut self, bus: &mut impl Bus) {
        let off = self.fetch_u16(bus) as i16;
        let ret = self.pc;
        self.push_u16_s(bus, ret);
        self.pc = (self.pc as i32 + off as i32) as u16;
    }
    fn bsr(&mut self, bus: &mut impl Bus) {
        let off = self.fetch_u8(bus) as i8 as i16;
        let ret = self.pc;
        self.push_u16_s(bus, ret);
        self.pc = (self.pc as i32 + off as i32) as u16;
    }
    fn jsr_direct(&mut self, bus: &mut impl Bus) {
        let addr = self.direct_addr(bus);
        let ret = self.pc;
        self.push_u16_s(bus, ret);
        self.pc = addr;
    }
    fn jsr_indexed(&mut self, bus: &mut impl Bus) {
        let (addr, _) = indexed::decode(self, bus);
        let ret = self.pc;
        self.push_u16_s(bus, ret);
        self.pc = addr;
    }
    fn jsr_extended(&mut self, bus: &mut impl Bus) {
        let addr = self.fetch_u16(bus);
        let ret = self.pc;
        self.push_u16_s(bus, ret);
        self.pc = addr;
    }

    fn branch_taken(&self, cond: u8) -> bool {
        let c = self.cc & CC_C != 0;
        let v = self.cc & CC_V != 0;
        let z = self.cc & CC_Z != 0;
        let n = self.cc & CC_N != 0;
        match cond {
            0x0 => true,         // BRA
            0x1 => false,        // BRN
            0x2 => !c && !z,     // BHI
            0x3 => c || z,       // BLS
            0x4 => !c,           // BCC/BHS
            0x5 => c,            // BCS/BLO
            0x6 => !z,           // BNE
            0x7 => z,            // BEQ
            0x8 => !v,           // BVC
            0x9 => v,            // BVS
            0xA => !n,           // BPL
            0xB => n,            // BMI
            0xC => n == v,       // BGE
            0xD => n != v,       // BLT
            0xE => !z && n == v, // BGT
            0xF => z || n != v,  // BLE
            _ => false,
        }
    }

    fn daa(&mut self) {
        let a = self.a();
        let mut correction: u16 = 0;
        let half = self.cc & CC_H != 0;
        let carry = self.cc & CC_C != 0;
        let lo = a & 0x0F;
        let hi = a >> 4;
        if half || lo > 9 {
            correction |= 0x06;
        }
        if carry || hi > 9 || (hi >= 9 && lo > 9) {
            correction |= 0x60;
        }
        let result = a as u16 + correction;
        self.set_a(result as u8);
        self.cc = nz8(self.cc, result as u8);
        self.cc = set_bit(self.cc, CC_C, carry || result > 0xFF);
    }

    fn sex(&mut self) {
        let b = self.b();
        let extended = b as i8 as i16 as u16;
        self.set_d(extended);
        self.cc = nz16(self.cc, extended);
        self.cc &= !CC_V;
    }

    fn mul(&mut self) {
        let result = self.a() as u16 * self.b() as u16;
        self.set_d(result);
        self.cc = set_bit(self.cc, CC_Z, result == 0);
        self.cc = set_bit(self.cc, CC_C, result & 0x80 != 0);
    }

    fn cwai(&mut self, bus: &mut impl Bus) {
        let mask = self.fetch_u8(bus);
        self.cc &= mask;
        self.cc |= CC_E;
        self.push_entire_s(bus);
        self.state = CpuState::CwaiCheckHalt;
    }

    pub(crate) fn swi(&mut self, bus: &mut impl Bus, vector: u16, set_if: bool) {
        self.cc |= CC_E;
        self.push_entire_s(bus);
        if set_if {
            self.cc |= CC_I | CC_F;
        }
        let hi = bus.read(vector) as u16;
        let lo = bus.read(vector.wrapping_add(1)) as u16;
        self.pc = (hi << 8) | lo;
    }

    fn rti(&mut self, bus: &mut impl Bus) {
        let cc = bus.read(self.s);
        if cc & CC_E != 0 {
            self.pull_entire_s(bus);
        } else {
            self.cc = self.pull_u8_s(bus);
            self.pc = self.pull_u16_s(bus);
        }
    }

    fn push_list_s(&mut self, bus: &mut impl Bus, mask: u8) {
        if mask & 0x80 != 0 {
            let v = self.pc;
            self.push_u16_s(bus, v);
        }
        if mask & 0x40 != 0 {
            let v = self.u;
            self.push_u16_s(bus, v);
        }
        if mask & 0x20 != 0 {
            let v = self.y;
            self.push_u16_s(bus, v);
        }
        if mask & 0x10 != 0 {
            let v = self.x;
            self.push_u16_s(bus, v);
        }
        if mask & 0x08 != 0 {
            let v = self.dp;
            self.push_u8_s(bus, v);
        }
        if mask & 0x04 != 0 {
            let v = self.b();
            self.push_u8_s(bus, v);
        }
        if mask & 0x02 != 0 {
            let v = self.a();
            self.push_u8_s(bus, v);
        }
        if mask & 0x01 != 0 {
            let v = self.cc;
            self.push_u8_s(bus, v);
        }
    }
    fn pull_list_s(&mut self, bus: &mut impl Bus, mask: u8) {
        if mask & 0x01 != 0 {
            self.cc = self.pull_u8_s(bus);
        }
        if mask & 0x02 != 0 {
            let v = self.pull_u8_s(bus);
            self.set_a(v);
        }
        if mask & 0x04 != 0 {
            let v = self.pull_u8_s(bus);
            self.set_b(v);
        }
        if mask & 0x08 != 0 {
            self.dp = self.pull_u8_s(bus);
        }
        if mask & 0x10 != 0 {
            self.x = self.pull_u16_s(bus);
        }
        if mask & 0x20 != 0 {
            self.y = self.pull_u16_s(bus);
        }
        if mask & 0x40 != 0 {
            self.u = self.pull_u16_s(bus);
        }
        if mask & 0x80 != 0 {
            self.pc = self.pull_u16_s(bus);
        }
    }
    fn push_list_u(&mut self, bus: &mut impl Bus, mask: u8) {
        if mask & 0x80 != 0 {
            let v = self.pc;
            self.push_u16_u(bus, v);
        }
        if mask & 0x40 != 0 {
            let v = self.s;
            self.push_u16_u(bus, v);
        }
        if mask & 0x20 != 0 {
            let v = self.y;
            self.push_u16_u(bus, v);
        }
        if mask & 0x10 != 0 {
            let v = self.x;
            self.push_u16_u(bus, v);
        }
        if mask & 0x08 != 0 {
            let v = self.dp;
            self.push_u8_u(bus, v);
        }
        if mask & 0x04 != 0 {
            let v = self.b();
            self.push_u8_u(bus, v);
        }
        if mask & 0x02 != 0 {
            let v = self.a();
            self.push_u8_u(bus, v);
        }
        if mask & 0x01 != 0 {
            let v = self.cc;
            self.push_u8_u(bus, v);
        }
    }
    fn pull_list_u(&mut self, bus: &mut impl Bus, mask: u8) {
        if mask & 0x01 != 0 {
            self.cc = self.pull_u8_u(bus);
        }
        if mask & 0x02 != 0 {
            let v = self.pull_u8_u(bus);
            self.set_a(v);
        }
        if mask & 0x04 != 0 {
            let v = self.pull_u8_u(bus);
            self.set_b(v);
        }
        if mask & 0x08 != 0 {
            self.dp = self.pull_u8_u(bus);
        }
        if mask & 0x10 != 0 {
            self.x = self.pull_u16_u(bus);
        }
        if mask & 0x20 != 0 {
            self.y = self.pull_u16_u(bus);
        }
        if mask & 0x40 != 0 {
            self.s = self.pull_u16_u(bus);
        }
        if mask & 0x80 != 0 {
            self.pc = self.pull_u16_u(bus);
        }
    }

    /// 6309 LDQ immediate (illegal on 6809, where the fetched bytes are
    /// simply discarded per the documented illegal-opcode fidelity goal).
    fn ldq_immediate(&mut self, bus: &mut impl Bus) {
        let hi = self.fetch_u16(bus);
        let lo = self.fetch_u16(bus);
        if self.variant() == super::CpuVariant::Hd6309 {
            let q = ((hi as u32) << 16) | lo as u32;
            self.set_q(q);
            self.cc = set_bit(self.cc, CC_Z, q == 0);
            self.cc = set_bit(self.cc, CC_N, q & 0x8000_0000 != 0);
            self.cc &= !CC_V;
        }
    }
}
