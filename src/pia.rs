//! MC6821 Peripheral Interface Adapter, ×2 in the machine (§4.5).
//!
//! Each PIA has two independent sides (A, B); each side exposes 3 logical
//! registers (control, direction, output) through 2 addressable slots,
//! giving 4 addressable slots per PIA chip. Reading the data slot clears
//! the side's interrupt-received flag; writing it respects the direction
//! register so bits configured as inputs are unaffected.
//!
//! The four delegate hooks per side (data pre-read/post-write, control
//! pre-read/post-write) are how the machine layer samples external state
//! (keyboard matrix, joystick comparator, cassette input) and reacts to
//! writes (DAC level, sound mux select, ROM bank, cassette motor) without
//! the PIA knowing what's on the other end.

use crate::delegate::{Hook, ValueHook};

const CRA_DDR_SELECT: u8 = 0x04;
const CRA_CX1_ENABLE: u8 = 0x01;
const CRA_CX1_RISING: u8 = 0x02;
const CRA_IRQ_FLAG: u8 = 0x80;

/// One side (A or B) of a PIA.
pub struct PiaSide {
    control: u8,
    direction: u8,
    output: u8,
    cx1: bool,
    interrupt_received: bool,

    pub data_pre_read: ValueHook<(), u8>,
    pub data_post_write: Hook<u8>,
    pub control_pre_read: ValueHook<(), u8>,
    pub control_post_write: Hook<u8>,
}

impl PiaSide {
    fn new() -> Self {
        Self {
            control: 0,
            direction: 0,
            output: 0,
            cx1: false,
            interrupt_received: false,
            data_pre_read: ValueHook::none(),
            data_post_write: Hook::none(),
            control_pre_read: ValueHook::none(),
            control_post_write: Hook::none(),
        }
    }

    fn reset(&mut self) {
        self.control = 0;
        self.direction = 0;
        self.output = 0;
        self.interrupt_received = false;
        // cx1 level and hooks survive a reset; they reflect external wiring.
    }

    /// `true` once direction/control select has settled into "data" mode,
    /// i.e. control bit 2 is set.
    fn data_selected(&self) -> bool {
        self.control & CRA_DDR_SELECT != 0
    }

    /// The combined pin value presented to the outside world (§3 invariant):
    /// output bits driven where `direction` says output, with any external
    /// sampled input substituted in on the input bits.
    fn pin_value(&mut self) -> u8 {
        let sampled = self.data_pre_read.call(()).unwrap_or(0xFF);
        (self.output & self.direction) | (sampled & !self.direction)
    }

    /// Read the data/direction slot (slot 0 within the side).
    fn read_data_or_ddr(&mut self) -> u8 {
        if self.data_selected() {
            let value = self.pin_value();
            self.interrupt_received = false;
            self.control &= !CRA_IRQ_FLAG;
            value
        } else {
            self.direction
        }
    }

    fn write_data_or_ddr(&mut self, value: u8) {
        if self.data_selected() {
            self.output = value;
            self.data_post_write.call(value);
        } else {
            self.direction = value;
        }
    }

    fn read_control(&mut self) -> u8 {
        if let Some(v) = self.control_pre_read.call(()) {
            return v;
        }
        self.control
    }

    fn write_control(&mut self, value: u8) {
        // Bit 7 is read-only (the IRQ flag); only the low 7 bits are settable.
        self.control = (self.control & CRA_IRQ_FLAG) | (value & 0x7F);
        self.control_post_write.call(value);
    }

    /// Feed a new level to the CX1 input line; latches `interrupt_received`
    /// on the edge selected by control bit 1.
    pub fn set_cx1(&mut self, level: bool) {
        let rising = self.control & CRA_CX1_RISING != 0;
        let edge = (!self.cx1 && level && rising) || (self.cx1 && !level && !rising);
        self.cx1 = level;
        if edge {
            self.interrupt_received = true;
            self.control |= CRA_IRQ_FLAG;
        }
    }

    /// `true` if this side is asserting its IRQ output (interrupt latched
    /// and CX1 interrupts enabled via control bit 0).
    pub fn irq(&self) -> bool {
        self.interrupt_received && self.control & CRA_CX1_ENABLE != 0
    }

    pub fn output(&self) -> u8 {
        self.output
    }

    pub fn direction(&self) -> u8 {
        self.direction
    }

    pub fn control(&self) -> u8 {
        self.control
    }

    pub fn cx1(&self) -> bool {
        self.cx1
    }

    pub fn interrupt_received(&self) -> bool {
        self.interrupt_received
    }

    /// Restore raw register state from a snapshot, bypassing the normal
    /// read/write side-effects (IRQ clearing, post-write hooks).
    pub fn restore(&mut self, control: u8, direction: u8, output: u8, cx1: bool, interrupt_received: bool) {
        self.control = control;
        self.direction = direction;
        self.output = output;
        self.cx1 = cx1;
        self.interrupt_received = interrupt_received;
    }
}

impl Default for PiaSide {
    fn default() -> Self {
        Self::new()
    }
}

/// A full MC6821 with its two sides, addressed as 4 consecutive slots:
/// `0` = side A data/DDR, `1` = side A control, `2` = side B data/DDR,
/// `3` = side B control.
pub struct Pia {
    pub side_a: PiaSide,
    pub side_b: PiaSide,
}

impl Pia {
    pub fn new() -> Self {
        Self {
            side_a: PiaSide::new(),
            side_b: PiaSide::new(),
        }
    }

    pub fn reset(&mut self) {
        self.side_a.reset();
        self.side_b.reset();
    }

    pub fn read(&mut self, slot: u8) -> u8 {
        match slot & 0x3 {
            0 => self.side_a.read_data_or_ddr(),
            1 => self.side_a.read_control(),
            2 => self.side_b.read_data_or_ddr(),
            _ => self.side_b.read_control(),
        }
    }

    pub fn write(&mut self, slot: u8, value: u8) {
        match slot & 0x3 {
            0 => self.side_a.write_data_or_ddr(value),
            1 => self.side_a.write_control(value),
            2 => self.side_b.write_data_or_ddr(value),
            _ => self.side_b.write_control(value),
        }
    }

    /// Combined IRQ output of both sides (the machine ORs this with the
    /// other PIA's output before driving the CPU's IRQ or FIRQ pin).
    pub fn irq(&self) -> bool {
        self.side_a.irq() || self.side_b.irq()
    }
}

impl Default for Pia {
    fn default() -> Self {
        Self::new()
    }
}
