//! HD6309-only instructions: TFM block transfer, register-register
//! arithmetic, W/Q wide operations, DIVD/DIVQ/MULD, and bit manipulation
//! (§4.2 "HD6309 additions"). Dispatched from page 2/3 opcodes the base
//! MC6809 leaves undefined; on an `Mc6809` core these opcodes are treated
//! as illegal no-ops rather than panicking, matching the base CPU's
//! documented illegal-opcode fidelity goal.

use super::flags::*;
use super::{Bus, Cpu, CpuVariant, TfmMode, TfmState};

impl Cpu {
    pub(crate) fn hd6309_page2(&mut self, bus: &mut impl Bus, op: u8) {
        if self.variant() != CpuVariant::Hd6309 {
            return;
        }
        match op {
            0x30 => self.reg_reg_op(bus, RegRegOp::Add),
            0x31 => self.reg_reg_op(bus, RegRegOp::Adc),
            0x32 => self.reg_reg_op(bus, RegRegOp::Sub),
            0x33 => self.reg_reg_op(bus, RegRegOp::Sbc),
            0x34 => self.reg_reg_op(bus, RegRegOp::And),
            0x35 => self.reg_reg_op(bus, RegRegOp::Or),
            0x36 => self.reg_reg_op(bus, RegRegOp::Eor),
            0x37 => self.reg_reg_op(bus, RegRegOp::Cmp),
            0x38 => self.bit_op(bus, BitOp::Band),
            0x39 => self.bit_op(bus, BitOp::Biand),
            0x3A => self.bit_op(bus, BitOp::Bor),
            0x3B => self.bit_op(bus, BitOp::Bior),
            0x3C => self.bit_op(bus, BitOp::Beor),
            0x3D => self.bit_op(bus, BitOp::Bieor),
            0x3E => self.ldbt(bus),
            0x3F => self.stbt(bus),
            0x40 => self.sexw(),
            0x80 => self.divq_immediate(bus),
            0x81 => self.mulq_unimplemented(), // reserved, treated as NOP
            0x82 => self.divd_immediate(bus),
            0x83 => self.mulw_immediate(bus),
            0x8B => self.addw_immediate(bus),
            0x8F => self.ldw_immediate(bus),
            0xC0 => self.subw_immediate(bus),
            0xC3 => self.addw_d_immediate(bus),
            _ => {} // unmapped HD6309 page-2 opcode: no-op
        }
    }

    pub(crate) fn hd6309_page3(&mut self, bus: &mut impl Bus, op: u8) {
        if self.variant() != CpuVariant::Hd6309 {
            return;
        }
        match op {
            0x30 => {
                // TFM ,R+ (generic entry; specific direction byte follows)
                self.start_tfm(bus, TfmMode::IncInc);
            }
            0x31 => self.start_tfm(bus, TfmMode::DecDec),
            0x32 => self.start_tfm(bus, TfmMode::IncFixed),
            0x33 => self.start_tfm(bus, TfmMode::FixedInc),
            0x80 => self.muld_immediate(bus),
            _ => {}
        }
    }

    fn start_tfm(&mut self, bus: &mut impl Bus, mode: TfmMode) {
        let postbyte = self.fetch_u8(bus);
        let src_reg = postbyte >> 4;
        let dst_reg = postbyte & 0xF;
        let remaining = self.w();
        self.tfm = if remaining == 0 {
            None
        } else {
            Some(TfmState {
                mode,
                src_reg,
                dst_reg,
                remaining,
            })
        };
    }

    fn reg_reg_op(&mut self, bus: &mut impl Bus, op: RegRegOp) {
        let postbyte = self.fetch_u8(bus);
        let src = postbyte >> 4;
        let dst = postbyte & 0xF;
        if self.reg_is_wide(src) && self.reg_is_wide(dst) {
            let a = self.wide_reg_get(dst);
            let b = self.wide_reg_get(src);
            let (r, cc) = match op {
                RegRegOp::Add => add16(self.cc, a, b),
                RegRegOp::Sub => sub16(self.cc, a, b),
                RegRegOp::Cmp => {
                    let (_, cc) = sub16(self.cc, a, b);
                    (a, cc)
                }
                RegRegOp::And => {
                    let r = a & b;
                    (r, logic16(self.cc, r))
                }
                RegRegOp::Or => {
                    let r = a | b;
                    (r, logic16(self.cc, r))
                }
                RegRegOp::Eor => {
                    let r = a ^ b;
                    (r, logic16(self.cc, r))
                }
                RegRegOp::Adc => {
                    let carry = (self.cc & CC_C != 0) as u16;
                    add16(self.cc, a, b.wrapping_add(carry))
                }
                RegRegOp::Sbc => {
                    let carry = (self.cc & CC_C != 0) as u16;
                    sub16(self.cc, a, b.wrapping_add(carry))
                }
            };
            self.cc = cc;
            if !matches!(op, RegRegOp::Cmp) {
                self.wide_reg_set(dst, r);
            }
        } else {
            let a = self.narrow_reg_get(dst);
            let b = self.narrow_reg_get(src);
            let (r, cc) = match op {
                RegRegOp::Add => add8(self.cc, a, b, 0),
                RegRegOp::Sub => sub8(self.cc, a, b, 0),
                RegRegOp::Cmp => {
                    let (_, cc) = sub8(self.cc, a, b, 0);
                    (a, cc)
                }
                RegRegOp::And => {
                    let r = a & b;
                    (r, logic8(self.cc, r))
                }
                RegRegOp::Or => {
                    let r = a | b;
                    (r, logic8(self.cc, r))
                }
                RegRegOp::Eor => {
                    let r = a ^ b;
                    (r, logic8(self.cc, r))
                }
                RegRegOp::Adc => {
                    let carry = (self.cc & CC_C != 0) as u8;
                    add8(self.cc, a, b, carry)
                }
                RegRegOp::Sbc => {
                    let carry = (self.cc & CC_C != 0) as u8;
                    sub8(self.cc, a, b, carry)
                }
            };
            self.cc = cc;
            if !matches!(op, RegRegOp::Cmp) {
                self.narrow_reg_set(dst, r);
            }
        }
    }

    fn reg_is_wide(&self, nibble: u8) -> bool {
        nibble & 0xF <= 0x7
    }
    fn wide_reg_get(&self, nibble: u8) -> u16 {
        match nibble & 0xF {
            0x0 => self.d(),
            0x1 => self.x,
            0x2 => self.y,
            0x3 => self.u,
            0x4 => self.s,
            0x5 => self.pc,
            0x6 => self.w(),
            _ => self.v,
        }
    }
    fn wide_reg_set(&mut self, nibble: u8, v: u16) {
        match nibble & 0xF {
            0x0 => self.set_d(v),
            0x1 => self.x = v,
            0x2 => self.y = v,
            0x3 => self.u = v,
            0x4 => self.s = v,
            0x5 => self.pc = v,
            0x6 => self.set_w(v),
            _ => self.v = v,
        }
    }
    fn narrow_reg_get(&self, nibble: u8) -> u8 {
        match nibble & 0xF {
            0x8 => self.a(),
            0x9 => self.b(),
            0xA => self.cc,
            0xB => self.dp,
            0xC => self.e(),
            0xD => self.f(),
            _ => 0,
        }
    }
    fn narrow_reg_set(&mut self, nibble: u8, v: u8) {
        match nibble & 0xF {
            0x8 => self.set_a(v),
            0x9 => self.set_b(v),
            0xA => self.cc = v,
            0xB => self.dp = v,
            0xC => self.set_e(v),
            0xD => self.set_f(v),
            _ => {}
        }
    }

    fn sexw(&mut self) {
        let f = self.f();
        let extended = f as i8 as i16 as u16;
        self.set_d(extended);
        self.cc = nz16(self.cc, extended);
        self.cc &= !CC_V;
    }

    fn mulw_immediate(&mut self, bus: &mut impl Bus) {
        let operand = self.fetch_u16(bus);
        let result = (self.d() as i16 as i32 * operand as i16 as i32) as u32;
        self.set_q(result);
        self.cc = set_bit(self.cc, CC_Z, result == 0);
    }

    fn muld_immediate(&mut self, bus: &mut impl Bus) {
        let operand = self.fetch_u16(bus);
        let result = (self.d() as i16 as i32 * operand as i16 as i32) as u32;
        self.set_q(result);
        self.cc = set_bit(self.cc, CC_Z, result == 0);
        self.cc = set_bit(self.cc, CC_N, result & 0x8000_0000 != 0);
    }

    fn mulq_unimplemented(&mut self) {}

    fn divd_immediate(&mut self, bus: &mut impl Bus) {
        let divisor = self.fetch_u8(bus) as i8;
        if divisor == 0 {
            self.md |= MD_DIV0;
            return;
        }
        let dividend = self.d() as i16;
        let quotient = dividend / divisor as i16;
        let remainder = dividend % divisor as i16;
        self.set_a((remainder as i8) as u8);
        self.set_b(quotient as u8);
        self.cc = set_bit(self.cc, CC_Z, quotient == 0);
        self.cc = set_bit(self.cc, CC_N, quotient < 0);
        if quotient > i8::MAX as i16 || quotient < i8::MIN as i16 {
            self.md |= MD_DIV0;
        }
    }

    fn divq_immediate(&mut self, bus: &mut impl Bus) {
        let divisor = self.fetch_u16(bus) as i16;
        if divisor == 0 {
            self.md |= MD_DIV0;
            return;
        }
        let dividend = self.q() as i32;
        let quotient = dividend / divisor as i32;
        let remainder = dividend % divisor as i32;
        self.set_d(remainder as u16);
        self.set_w(quotient as u16);
        self.cc = set_bit(self.cc, CC_Z, quotient == 0);
        self.cc = set_bit(self.cc, CC_N, quotient < 0);
    }

    fn addw_immediate(&mut self, bus: &mut impl Bus) {
        let operand = self.fetch_u16(bus);
        let w = self.w();
        let (r, cc) = add16(self.cc, w, operand);
        self.cc = cc;
        self.set_w(r);
    }
    fn subw_immediate(&mut self, bus: &mut impl Bus) {
        let operand = self.fetch_u16(bus);
        let w = self.w();
        let (r, cc) = sub16(self.cc, w, operand);
        self.cc = cc;
        self.set_w(r);
    }
    fn addw_d_immediate(&mut self, bus: &mut impl Bus) {
        let operand = self.fetch_u16(bus);
        let d = self.d();
        let (r, cc) = add16(self.cc, d, operand);
        self.cc = cc;
        self.set_d(r);
    }
    fn ldw_immediate(&mut self, bus: &mut impl Bus) {
        let v = self.fetch_u16(bus);
        self.set_w(v);
        self.cc = nz16(self.cc, v);
        self.cc &= !CC_V;
    }

    fn bit_postbyte_addr(&mut self, bus: &mut impl Bus) -> (u8, u8, u8, u16) {
        let postbyte = self.fetch_u8(bus);
        let reg_sel = postbyte >> 6;
        let dst_bit = (postbyte >> 3) & 0x7;
        let src_bit = postbyte & 0x7;
        let addr = self.direct_addr_for_bitop(bus);
        (reg_sel, dst_bit, src_bit, addr)
    }

    fn direct_addr_for_bitop(&mut self, bus: &mut impl Bus) -> u16 {
        let lo = self.fetch_u8(bus);
        ((self.dp as u16) << 8) | lo as u16
    }

    fn bit_op(&mut self, bus: &mut impl Bus, op: BitOp) {
        let (reg_sel, dst_bit, src_bit, addr) = self.bit_postbyte_addr(bus);
        let mem = bus.read(addr);
        let mem_bit = (mem >> src_bit) & 1 != 0;
        let reg = self.narrow_reg_get(match reg_sel {
            0 => 0x8,
            1 => 0x9,
            _ => 0xA,
        });
        let reg_bit = (reg >> dst_bit) & 1 != 0;
        let result = match op {
            BitOp::Band => reg_bit && mem_bit,
            BitOp::Bor => reg_bit || mem_bit,
            BitOp::Beor => reg_bit != mem_bit,
            BitOp::Biand => reg_bit && !mem_bit,
            BitOp::Bior => reg_bit || !mem_bit,
            BitOp::Bieor => reg_bit != !mem_bit,
        };
        let new_reg = if result {
            reg | (1 << dst_bit)
        } else {
            reg & !(1 << dst_bit)
        };
        self.narrow_reg_set(
            match reg_sel {
                0 => 0x8,
                1 => 0x9,
                _ => 0xA,
            },
            new_reg,
        );
    }

    fn ldbt(&mut self, bus: &mut impl Bus) {
        let (reg_sel, dst_bit, src_bit, addr) = self.bit_postbyte_addr(bus);
        let mem = bus.read(addr);
        let bit = (mem >> src_bit) & 1;
        let reg_nibble = match reg_sel {
            0 => 0x8,
            1 => 0x9,
            _ => 0xA,
        };
        let reg = self.narrow_reg_get(reg_nibble);
        let new_reg = if bit != 0 {
            reg | (1 << dst_bit)
        } else {
            reg & !(1 << dst_bit)
        };
        self.narrow_reg_set(reg_nibble, new_reg);
    }

    /// Executes one byte of an in-progress TFM, suspending between bytes so
    /// interrupts can be polled at `LabelB` (§4.2, §8 boundary: `W=0` runs
    /// zero iterations).
    pub(crate) fn step_tfm(&mut self, bus: &mut impl Bus, mut tfm: TfmState) {
        if tfm.remaining == 0 {
            self.tfm = None;
            return;
        }
        let src = self.tfm_reg(tfm.src_reg);
        let dst = self.tfm_reg(tfm.dst_reg);
        let byte = bus.read(src);
        bus.write(dst, byte);
        match tfm.mode {
            TfmMode::IncInc => {
                self.set_tfm_reg(tfm.src_reg, src.wrapping_add(1));
                self.set_tfm_reg(tfm.dst_reg, dst.wrapping_add(1));
            }
            TfmMode::DecDec => {
                self.set_tfm_reg(tfm.src_reg, src.wrapping_sub(1));
                self.set_tfm_reg(tfm.dst_reg, dst.wrapping_sub(1));
            }
            TfmMode::IncFixed => {
                self.set_tfm_reg(tfm.src_reg, src.wrapping_add(1));
            }
            TfmMode::FixedInc => {
                self.set_tfm_reg(tfm.dst_reg, dst.wrapping_add(1));
            }
        }
        tfm.remaining -= 1;
        self.tfm = if tfm.remaining == 0 { None } else { Some(tfm) };
    }

    fn tfm_reg(&self, sel: u8) -> u16 {
        match sel & 0x3 {
            0 => self.d(),
            1 => self.x,
            2 => self.y,
            _ => self.u,
        }
    }
    fn set_tfm_reg(&mut self, sel: u8, v: u16) {
        match sel & 0x3 {
            0 => self.set_d(v),
            1 => self.x = v,
            2 => self.y = v,
            _ => self.u = v,
        }
    }

    fn stbt(&mut self, bus: &mut impl Bus) {
        let (reg_sel, src_bit, dst_bit, addr) = self.bit_postbyte_addr(bus);
        let reg_nibble = match reg_sel {
            0 => 0x8,
            1 => 0x9,
            _ => 0xA,
        };
        let reg = self.narrow_reg_get(reg_nibble);
        let bit = (reg >> src_bit) & 1;
        let mem = bus.read(addr);
        let new_mem = if bit != 0 {
            mem | (1 << dst_bit)
        } else {
            mem & !(1 << dst_bit)
        };
        bus.write(addr, new_mem);
    }
}

/// MD register bits (§4.2 HD6309 register file).
pub const MD_DIV0: u8 = 0x80;
pub const MD_ILLEGAL: u8 = 0x40;
pub const MD_NATIVE6309: u8 = 0x01;
pub const MD_FIRQ_STACK: u8 = 0x02;

enum RegRegOp {
    Add,
    Adc,
    Sub,
    Sbc,
    And,
    Or,
    Eor,
    Cmp,
}

enum BitOp {
    Band,
    Biand,
    Bor,
    Bior,
    Beor,
    Bieor,
}

fn logic16(cc: u8, result: u16) -> u8 {
    let mut cc = nz16(cc, result);
    cc &= !CC_V;
    cc
}
