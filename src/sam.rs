//! SAM (Synchronous Address Multiplexer), §4.3.
//!
//! Every CPU memory cycle passes through here: the SAM decodes the chip
//! select from the address and the control register's map-type bit,
//! translates the address for whichever RAM configuration is attached,
//! charges the CPU the right number of sub-cycles for the current speed
//! mode (including the slow/fast transition cycles), and advances the VDG
//! counter chain in lock-step with the video divider ratios selected by
//! the control register's V field.

/// Destination a CPU cycle resolves to once the SAM has decoded it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChipSelect {
    Ram,
    /// `0x8000..=0xFEFF` when TY selects ROM (internal BASIC ROM or cart ROM
    /// window; which one is a machine-layer concern, not the SAM's).
    RomRegion,
    Pia0,
    Pia1,
    CartIo,
    MiscIo,
    SamRegister,
    VectorRom,
}

/// Per-V-mode (x divider, y divider) pair, §4.3's "X-divider ÷1/÷2/÷3;
/// Y-divider ÷1/÷2/÷3/÷12". Approximates the real SAM's table; the exact
/// per-mode ratios aren't independently verifiable without the datasheet
/// in hand, so these are chosen to be internally consistent with the
/// divider *ranges* the spec states (see DESIGN.md).
const DIVIDERS: [(u8, u8); 8] = [
    (1, 12),
    (1, 12),
    (1, 3),
    (1, 2),
    (1, 1),
    (1, 1),
    (2, 1),
    (3, 1),
];

/// The three-stage VDG address counter chain: a free-running 4-bit low
/// counter, a single intermediate bit fed by the X-divider, and an
/// 11-bit high counter fed by the Y-divider through that intermediate
/// bit's falling edge.
pub struct VdgCounterChain {
    low: u8,
    bit4: bool,
    high: u16,
    sub_x: u8,
    sub_y: u8,
    /// `true` for exactly one pending carry after a divider-ratio change
    /// that would otherwise glitch; that carry is swallowed rather than
    /// counted, modelling the "wired to ground" transitional state.
    grounded: bool,
}

impl VdgCounterChain {
    pub fn new() -> Self {
        Self {
            low: 0,
            bit4: false,
            high: 0,
            sub_x: 0,
            sub_y: 0,
            grounded: false,
        }
    }

    /// After an FS pulse, the chain resets and bits [15:5] load from `F << 6`
    /// (§8 invariant 4).
    pub fn reset_from_fs(&mut self, f_field: u8) {
        self.low = 0;
        self.bit4 = false;
        self.sub_x = 0;
        self.sub_y = 0;
        self.high = (f_field as u16) << 6;
    }

    /// A DIV12→DIV3-style mid-cycle Y-divider drop produces a glitch: the
    /// next carry into the high counter is wired to ground instead of
    /// being counted.
    pub fn notify_divider_change(&mut self, old_y_div: u8, new_y_div: u8) {
        if old_y_div == 12 && new_y_div == 3 {
            self.grounded = true;
            self.sub_y = 0;
        }
    }

    /// Advance the chain by one SAM cycle under the given divider ratios.
    pub fn tick(&mut self, x_div: u8, y_div: u8) {
        let low_wraps = self.low == 0x0F;
        self.low = (self.low + 1) & 0x0F;
        if !low_wraps {
            return;
        }
        self.sub_x += 1;
        if self.sub_x < x_div {
            return;
        }
        self.sub_x = 0;
        let prev_bit4 = self.bit4;
        self.bit4 = !self.bit4;
        if !(prev_bit4 && !self.bit4) {
            return; // only the falling edge of bit4 carries into the Y chain
        }
        if self.grounded {
            self.grounded = false;
            return;
        }
        self.sub_y += 1;
        if self.sub_y >= y_div {
            self.sub_y = 0;
            self.high = (self.high + 1) & 0x7FF;
        }
    }

    pub fn low(&self) -> u8 {
        self.low
    }

    pub fn high(&self) -> u16 {
        self.high
    }

    /// Full 16-bit VDG address: bits [15:5] from the high counter, bit 4
    /// from the intermediate stage, bits [3:0] free-running.
    pub fn address(&self) -> u16 {
        ((self.high as u16) << 5) | ((self.bit4 as u16) << 4) | (self.low as u16)
    }

    /// Raw internal state, for snapshotting only.
    pub fn raw(&self) -> (u8, bool, u16, u8, u8, bool) {
        (self.low, self.bit4, self.high, self.sub_x, self.sub_y, self.grounded)
    }

    pub fn set_raw(&mut self, low: u8, bit4: bool, high: u16, sub_x: u8, sub_y: u8, grounded: bool) {
        self.low = low;
        self.bit4 = bit4;
        self.high = high;
        self.sub_x = sub_x;
        self.sub_y = sub_y;
        self.grounded = grounded;
    }
}

impl Default for VdgCounterChain {
    fn default() -> Self {
        Self::new()
    }
}

/// The SAM's control register and derived behaviour.
pub struct Sam {
    register: u16,
    pub counters: VdgCounterChain,
    prev_fast: bool,
    /// `true`/`false` toggles each consecutive fast cycle; used to decide
    /// whether a fast-to-slow transition charges 17 or 25 sub-cycles.
    fast_parity: bool,
}

impl Sam {
    pub fn new() -> Self {
        Self {
            register: 0,
            counters: VdgCounterChain::new(),
            prev_fast: false,
            fast_parity: false,
        }
    }

    pub fn reset(&mut self) {
        self.register = 0;
        self.counters = VdgCounterChain::new();
        self.prev_fast = false;
        self.fast_parity = false;
    }

    pub fn control_register(&self) -> u16 {
        self.register
    }

    pub fn v(&self) -> u8 {
        (self.register & 0x7) as u8
    }

    pub fn f(&self) -> u8 {
        ((self.register >> 3) & 0x7F) as u8
    }

    pub fn page(&self) -> bool {
        (self.register >> 10) & 1 != 0
    }

    pub fn rate(&self) -> u8 {
        ((self.register >> 11) & 0x3) as u8
    }

    pub fn mem_size(&self) -> u8 {
        ((self.register >> 13) & 0x3) as u8
    }

    /// `TY`: `true` selects RAM in `0x8000..=0xFEFF`, `false` selects ROM.
    pub fn map_type(&self) -> bool {
        (self.register >> 15) & 1 != 0
    }

    fn dividers(&self) -> (u8, u8) {
        DIVIDERS[self.v() as usize]
    }

    /// Write to one of the 32 addressable bit-set/bit-clear slots in
    /// `0xFFC0..=0xFFDF`. Even offsets clear the bit, odd offsets set it
    /// (§3 SAM control register). Any write re-derives the working fields
    /// by construction, since every field above is computed from
    /// `self.register` on demand.
    pub fn write_register(&mut self, addr: u16) {
        let offset = addr.wrapping_sub(0xFFC0) as u8;
        let bit = offset >> 1;
        let set = offset & 1 != 0;
        let mask = 1u16 << bit;
        let old_y_div = self.dividers().1;
        if set {
            self.register |= mask;
        } else {
            self.register &= !mask;
        }
        let new_y_div = self.dividers().1;
        if old_y_div != new_y_div {
            log::debug!("SAM Y divider changed {} -> {} (V={:#05b})", old_y_div, new_y_div, self.v());
            self.counters.notify_divider_change(old_y_div, new_y_div);
        }
    }

    /// Decode the chip select for a CPU address (§4.3 point 1). The vector
    /// ROM window always wins regardless of `TY` (§8 invariant 2).
    pub fn select(&self, addr: u16) -> ChipSelect {
        match addr {
            0xFFE0..=0xFFFF => ChipSelect::VectorRom,
            0xFFC0..=0xFFDF => ChipSelect::SamRegister,
            0xFF60..=0xFFBF => ChipSelect::MiscIo,
            0xFF40..=0xFF5F => ChipSelect::CartIo,
            0xFF20..=0xFF3F => ChipSelect::Pia1,
            0xFF00..=0xFF1F => ChipSelect::Pia0,
            0x8000..=0xFEFF => {
                if self.map_type() {
                    ChipSelect::Ram
                } else {
                    ChipSelect::RomRegion
                }
            }
            _ => ChipSelect::Ram,
        }
    }

    /// Translate a CPU address into a DRAM address `Z` per the memory-size
    /// field M[1:0] (§4.3 point 2). Smaller RAM configurations multiplex
    /// fewer physical address bits per chip and use the page bit (P) and
    /// RAS-1 to select between ganged banks; the common 64K-dynamic
    /// configuration passes the address through mostly unchanged.
    pub fn translate(&self, addr: u16, ras1: bool) -> u32 {
        let addr = addr as u32;
        match self.mem_size() {
            0 => (addr & 0x0FFF) | ((self.page() as u32) << 12),
            1 => (addr & 0x3FFF) | ((self.page() as u32) << 14),
            2 => addr,
            _ => addr | ((ras1 as u32) << 16),
        }
    }

    /// Whether address `addr` runs at the fast rate under the current R
    /// field: `00` always slow, `01` fast only above `0x8000`
    /// (the address-dependent "POKE" fast-mode trick), `1x` always fast.
    fn wants_fast(&self, addr: u16) -> bool {
        match self.rate() {
            0 => false,
            1 => addr >= 0x8000,
            _ => true,
        }
    }

    /// Charge the CPU the correct number of sub-cycles for one memory
    /// cycle at `addr` (§4.3 point 3), tracking speed-mode transitions.
    pub fn charge_cycle(&mut self, addr: u16) -> u32 {
        let fast = self.wants_fast(addr);
        let cost = if fast == self.prev_fast {
            if fast {
                8
            } else {
                16
            }
        } else if fast {
            15 // slow-to-fast transition
        } else if self.fast_parity {
            17
        } else {
            25
        };
        self.fast_parity = if fast { !self.fast_parity } else { false };
        self.prev_fast = fast;
        cost
    }

    /// Advance the VDG counter chain by one SAM cycle under the current
    /// V-mode dividers.
    pub fn tick_vdg(&mut self) {
        let (x_div, y_div) = self.dividers();
        self.counters.tick(x_div, y_div);
    }

    /// Notify the SAM of an FS pulse: the VDG counter chain resets and
    /// reloads bits [15:5] from `F << 6`.
    pub fn on_fs_pulse(&mut self) {
        self.counters.reset_from_fs(self.f());
    }

    /// Restore the raw control register from a snapshot, bypassing the
    /// bit-set/bit-clear write protocol.
    pub fn set_register(&mut self, register: u16) {
        self.register = register;
    }

    /// Speed-mode transition state, for snapshotting only.
    pub fn timing_state(&self) -> (bool, bool) {
        (self.prev_fast, self.fast_parity)
    }

    pub fn set_timing_state(&mut self, prev_fast: bool, fast_parity: bool) {
        self.prev_fast = prev_fast;
        self.fast_parity = fast_parity;
    }
}

impl Default for Sam {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn vector_rom_wins_regardless_of_map_type() {
        let mut sam = Sam::new();
        assert_eq!(sam.select(0xFFFE), ChipSelect::VectorRom);
        sam.write_register(0xFFC0 + 30); // set bit 15 (TY)
        assert_eq!(sam.select(0xFFFE), ChipSelect::VectorRom);
    }

    #[test]
    fn rom_region_selected_when_map_type_clear() {
        let sam = Sam::new();
        assert_eq!(sam.select(0x9000), ChipSelect::RomRegion);
    }

    #[test]
    fn ram_region_selected_when_map_type_set() {
        let mut sam = Sam::new();
        sam.write_register(0xFFC0 + 31); // set bit 15 (TY)
        assert_eq!(sam.select(0x9000), ChipSelect::Ram);
    }

    #[test]
    fn io_windows_decode_to_expected_chip_selects() {
        let sam = Sam::new();
        assert_eq!(sam.select(0xFF10), ChipSelect::Pia0);
        assert_eq!(sam.select(0xFF30), ChipSelect::Pia1);
        assert_eq!(sam.select(0xFF50), ChipSelect::CartIo);
        assert_eq!(sam.select(0xFF80), ChipSelect::MiscIo);
        assert_eq!(sam.select(0xFFD0), ChipSelect::SamRegister);
    }

    #[test]
    fn bit_write_offsets_clear_and_set_correctly() {
        let mut sam = Sam::new();
        sam.write_register(0xFFC0 + 1); // set bit 0 (V0)
        assert_eq!(sam.v() & 1, 1);
        sam.write_register(0xFFC0 + 0); // clear bit 0
        assert_eq!(sam.v() & 1, 0);
    }

    #[test]
    fn constant_slow_mode_charges_exactly_16_per_cycle() {
        let mut sam = Sam::new();
        let mut total = 0u32;
        for _ in 0..10 {
            total += sam.charge_cycle(0x2000);
        }
        assert_eq!(total, 160);
    }

    #[test]
    fn fs_pulse_reloads_high_bits_from_f_shifted() {
        let mut sam = Sam::new();
        // Set F field (bits 3..9) to some nonzero value, e.g. 0b0010101 = 21.
        for bit in [3, 5] {
            sam.write_register(0xFFC0 + (bit * 2) + 1);
        }
        sam.on_fs_pulse();
        assert_eq!(sam.counters.high(), (sam.f() as u16) << 6);
    }

    #[test]
    fn translate_64k_dynamic_passes_address_through() {
        let mut sam = Sam::new();
        // mem_size defaults to 0 (4K); set M1 (register bit 14) for mem_size==2 (64K).
        sam.write_register(0xFFC0 + (14 * 2) + 1);
        assert_eq!(sam.mem_size(), 2);
        assert_eq!(sam.translate(0x1234, false), 0x1234);
    }
}
