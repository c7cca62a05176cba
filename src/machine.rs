//! Machine assembly: wires the CPU, SAM, VDG, both PIAs, and the cartridge
//! slot into one cycle-driven unit (§4.7, §9 "parts and components").
//!
//! Mirrors the teacher's own `Emu::run_cycles`: rather than handing the CPU
//! off to `Cpu::run` wholesale, `Machine::run_cycles` walks the state
//! machine one micro-step at a time so instruction breakpoints can be
//! checked right at the `LabelB` boundary — the same point where the CPU
//! itself calls its internal `instruction_hook`. The instruction list lives
//! on `Machine` (it brackets `cpu.step`); the two watchpoint lists live on
//! `Peripherals` (they bracket the bus `read`/`write` path), per the split
//! recorded in DESIGN.md.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use crate::breakpoint::BreakpointList;
use crate::cartridge::{Cartridge, CartridgeLines};
use crate::config::MachineConfig;
use crate::cpu::{Bus, Cpu, CpuState};
use crate::error::{CoreError, CoreResult};
use crate::pia::Pia;
use crate::sam::{ChipSelect, Sam};
use crate::scheduler::{EventHandle, EventList};
use crate::snapshot::{self, SnapshotSources};
use crate::tick::Tick;
use crate::vdg::{Pixel, Vdg, ACTIVE_SCANLINE_END, HS_WIDTH, LINE_TOTAL};

/// Breakpoint/watchpoint condition bit: set when a cartridge is attached
/// (§4.6 `cond_mask`/`cond`).
pub const COND_CARTRIDGE_PRESENT: u8 = 0x01;

/// Internal BASIC ROM / cartridge ROM window is at most this large; larger
/// images don't fit the `0x8000..=0xFEFF` decode window a real SAM offers.
const MAX_ROM_BYTES: usize = 32 * 1024;

/// Why [`Machine::run_cycles`] returned early.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StopReason {
    /// Ran the full requested cycle budget.
    CyclesComplete,
    /// The CPU is halted (external HALT line asserted, e.g. by a cartridge).
    Halted,
    /// The CPU executed HCF and will never resume.
    Hcf,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum MachineEvent {
    HsFall,
    HsRise,
}

/// Scale a PIA output byte to a signed DAC level (§4.4 "Tape/sound bus
/// bridges"): `0x80` is centre (silence), full swing is +/-32768.
fn dac_level(byte: u8) -> i16 {
    ((byte as i16) - 0x80) << 8
}

/// Read `n` consecutive VDG data cells starting at the counter chain's
/// current address, each synthesised as a plain RAM byte (external/
/// semigraphics/inverse bits are mode-level properties the VDG already
/// carries in its latched control lines, not per-byte RAM content, so
/// they're left clear here — see DESIGN.md).
fn fetch_vdg_cells(sam: &Sam, ram: &[u8], n: usize) -> Vec<u16> {
    let base = sam.counters.address();
    (0..n)
        .map(|i| {
            let addr = base.wrapping_add(i as u16);
            let phys = sam.translate(addr, false) as usize % ram.len().max(1);
            ram[phys] as u16
        })
        .collect()
}

/// Everything the CPU's [`Bus`] reaches through: SAM decode, RAM/ROM, both
/// PIAs, the cartridge slot, the VDG's scanline scheduling, and the
/// tape/sound bus bridge.
struct Peripherals {
    sam: Sam,
    vdg: Vdg,
    pia0: Pia,
    pia1: Pia,
    cartridge: Option<Box<dyn Cartridge>>,
    cartridge_lines: Option<CartridgeLines>,
    audio: crate::audio::AudioBridge,
    /// Shared with `pia1.side_a.data_pre_read`; updated on every PIA1
    /// access rather than continuously, matching "sampled at reads of the
    /// multiplexer" (§6 "CAS tape format").
    tape_input_bit: Arc<AtomicBool>,
    ram: Vec<u8>,
    rom: Vec<u8>,
    read_watch: BreakpointList,
    write_watch: BreakpointList,
    events: EventList<MachineEvent>,
    hs_fall: EventHandle,
    hs_rise: EventHandle,
    tick: Tick,
    elapsed_cycles: u64,
}

impl Peripherals {
    fn new(config: &mut MachineConfig) -> Self {
        let ram = vec![0u8; config.ram_size.bytes()];
        let vdg = Vdg::new(config.tv_standard);

        let mut pia1 = Pia::new();
        let tape_input_bit = Arc::new(AtomicBool::new(true));
        {
            let bit = tape_input_bit.clone();
            pia1.side_a
                .data_pre_read
                .set(move |_| if bit.load(Ordering::Relaxed) { 0xFF } else { 0xFE });
        }

        let mut events: EventList<MachineEvent> = EventList::new();
        let hs_fall = events.alloc(MachineEvent::HsFall);
        let hs_rise = events.alloc(MachineEvent::HsRise);
        events.enqueue(hs_fall, LINE_TOTAL as u32, 0);
        events.enqueue(hs_rise, HS_WIDTH as u32, 0);

        let cartridge = config.cartridge.take();
        if cartridge.is_some() {
            log::debug!("cartridge attached at machine construction");
        }

        Self {
            sam: Sam::new(),
            vdg,
            pia0: Pia::new(),
            pia1,
            cartridge,
            cartridge_lines: config.cartridge_lines.take(),
            audio: crate::audio::AudioBridge::new(),
            tape_input_bit,
            ram,
            rom: Vec::new(),
            read_watch: BreakpointList::new(),
            write_watch: BreakpointList::new(),
            events,
            hs_fall,
            hs_rise,
            tick: 0,
            elapsed_cycles: 0,
        }
    }

    fn reset(&mut self) {
        self.sam.reset();
        self.vdg.reset();
        self.pia0.reset();
        self.pia1.reset();
        if let Some(cart) = &mut self.cartridge {
            cart.reset();
        }
        self.tick = 0;
        self.elapsed_cycles = 0;
        self.events.dequeue(self.hs_fall);
        self.events.dequeue(self.hs_rise);
        self.events.enqueue(self.hs_fall, LINE_TOTAL as u32, 0);
        self.events.enqueue(self.hs_rise, HS_WIDTH as u32, 0);
    }

    fn conditions(&self) -> u8 {
        if self.cartridge.is_some() {
            COND_CARTRIDGE_PRESENT
        } else {
            0
        }
    }

    fn cartridge_signal_levels(&self) -> (bool, bool, bool) {
        match &self.cartridge_lines {
            Some(lines) => (lines.firq(), lines.nmi(), lines.halt()),
            None => (false, false, false),
        }
    }

    fn read_rom_region(&mut self, addr: u16) -> u8 {
        let internal = if self.rom.is_empty() {
            0xFF
        } else {
            self.rom[(addr as usize - 0x8000) % self.rom.len()]
        };
        match &mut self.cartridge {
            Some(cart) => cart.read(addr, false, true, internal),
            None => internal,
        }
    }

    fn read_vector_rom(&self, addr: u16) -> u8 {
        if self.rom.len() < 32 {
            return 0xFF;
        }
        let offset = (addr - 0xFFE0) as usize;
        self.rom[self.rom.len() - 32 + offset]
    }

    fn raw_read(&mut self, addr: u16) -> u8 {
        match self.sam.select(addr) {
            ChipSelect::Ram => {
                let phys = self.sam.translate(addr, false) as usize % self.ram.len().max(1);
                self.ram[phys]
            }
            ChipSelect::RomRegion => self.read_rom_region(addr),
            ChipSelect::VectorRom => self.read_vector_rom(addr),
            ChipSelect::Pia0 => self.pia0.read((addr.wrapping_sub(0xFF00) & 0x3) as u8),
            ChipSelect::Pia1 => {
                self.tape_input_bit.store(self.audio.input_bit(), Ordering::Relaxed);
                self.pia1.read((addr.wrapping_sub(0xFF20) & 0x3) as u8)
            }
            ChipSelect::CartIo => match &mut self.cartridge {
                Some(cart) => cart.read(addr, true, false, 0xFF),
                None => 0xFF,
            },
            ChipSelect::MiscIo | ChipSelect::SamRegister => 0xFF,
        }
    }

    fn raw_write(&mut self, addr: u16, data: u8) {
        match self.sam.select(addr) {
            ChipSelect::Ram => {
                let phys = self.sam.translate(addr, false) as usize % self.ram.len().max(1);
                self.ram[phys] = data;
            }
            ChipSelect::RomRegion => {
                if let Some(cart) = &mut self.cartridge {
                    cart.write(addr, false, true, data);
                }
            }
            ChipSelect::VectorRom => {}
            ChipSelect::Pia0 => self.pia0.write((addr.wrapping_sub(0xFF00) & 0x3) as u8, data),
            ChipSelect::Pia1 => {
                self.pia1.write((addr.wrapping_sub(0xFF20) & 0x3) as u8, data);
                self.audio.write_level(dac_level(self.pia1.side_a.output()));
            }
            ChipSelect::CartIo => {
                if let Some(cart) = &mut self.cartridge {
                    cart.write(addr, true, false, data);
                }
            }
            ChipSelect::MiscIo => {}
            ChipSelect::SamRegister => self.sam.write_register(addr),
        }
    }

    fn charge_and_pump(&mut self, addr: u16) {
        let cost = self.sam.charge_cycle(addr);
        self.elapsed_cycles += cost as u64;
        self.tick = self.tick.wrapping_add(cost);
        self.sam.tick_vdg();
        self.pump_events();
    }

    fn pump_events(&mut self) {
        let due = self.events.run(self.tick);
        for (handle, kind) in due {
            match kind {
                MachineEvent::HsFall => {
                    let delay = self.vdg.next_hs_fall_delay();
                    let sam = &self.sam;
                    let ram = &self.ram;
                    self.vdg.on_hs_fall(&mut |n| fetch_vdg_cells(sam, ram, n));
                    if self.vdg.scanline == ACTIVE_SCANLINE_END {
                        self.sam.on_fs_pulse();
                    }
                    self.events.enqueue(handle, self.tick.wrapping_add(delay), self.tick);
                    self.events
                        .enqueue(self.hs_rise, self.tick.wrapping_add(HS_WIDTH as u32), self.tick);
                }
                MachineEvent::HsRise => {
                    self.vdg.on_hs_rise();
                }
            }
        }
    }
}

impl Bus for Peripherals {
    fn read(&mut self, addr: u16) -> u8 {
        let value = self.raw_read(addr);
        if !self.read_watch.is_empty() {
            let conditions = self.conditions();
            self.read_watch.dispatch(addr, conditions);
        }
        self.charge_and_pump(addr);
        value
    }

    fn write(&mut self, addr: u16, data: u8) {
        self.raw_write(addr, data);
        if !self.write_watch.is_empty() {
            let conditions = self.conditions();
            self.write_watch.dispatch(addr, conditions);
        }
        self.charge_and_pump(addr);
    }

    fn elapsed_cycles(&self) -> u64 {
        self.elapsed_cycles
    }
}

/// A complete Dragon 32/64 / CoCo machine: CPU plus everything it's wired
/// to. The public surface is cycle-stepping, breakpoint/watchpoint
/// installation, ROM loading, and snapshot save/load (§5 "shared
/// resources", §6).
pub struct Machine {
    cpu: Cpu,
    peripherals: Peripherals,
    instruction: BreakpointList,
    prev_cart_nmi: bool,
    last_stop: StopReason,
}

impl Machine {
    pub fn new(mut config: MachineConfig) -> Self {
        let cpu = Cpu::new(config.cpu_variant);
        let peripherals = Peripherals::new(&mut config);
        let mut machine = Self {
            cpu,
            peripherals,
            instruction: BreakpointList::new(),
            prev_cart_nmi: false,
            last_stop: StopReason::CyclesComplete,
        };
        machine.reset();
        machine
    }

    /// Load a ROM image into the internal BASIC ROM / cartridge-ROM window.
    pub fn load_rom(&mut self, data: &[u8]) -> CoreResult<()> {
        if data.len() > MAX_ROM_BYTES {
            return Err(CoreError::RomTooLarge {
                got: data.len(),
                max: MAX_ROM_BYTES,
            });
        }
        self.peripherals.rom = data.to_vec();
        Ok(())
    }

    /// Reset the CPU and every peripheral (§4.2 "reset"). ROM and RAM
    /// contents survive; the SAM control register, PIAs, and VDG scanline
    /// state do not.
    pub fn reset(&mut self) {
        self.cpu.reset();
        self.peripherals.reset();
        self.prev_cart_nmi = false;
        self.last_stop = StopReason::CyclesComplete;
    }

    fn sync_interrupt_lines(&mut self) {
        let irq = self.peripherals.pia0.irq();
        let firq_from_pia = self.peripherals.pia1.irq();
        let (cart_firq, cart_nmi, cart_halt) = self.peripherals.cartridge_signal_levels();
        self.cpu.set_irq(irq);
        self.cpu.set_firq(firq_from_pia || cart_firq);
        if cart_nmi && !self.prev_cart_nmi {
            self.cpu.signal_nmi();
        }
        self.prev_cart_nmi = cart_nmi;
        self.cpu.halt = cart_halt;
    }

    /// Run up to `cycles` sub-cycle-equivalent bus cycles, stopping early on
    /// halt. Instruction breakpoints are checked at every `LabelB`
    /// transition — the same point the CPU itself fires its internal
    /// `instruction_hook` — since a stored hook closure can't reach back
    /// into `Machine`'s own breakpoint list without aliasing `&mut self`
    /// through two paths (see DESIGN.md). If a handler moves the PC,
    /// whatever breakpoints sit at the new address are re-checked
    /// immediately (§4.6) rather than waiting for the next `LabelB` visit.
    pub fn run_cycles(&mut self, cycles: u32) -> u32 {
        let start = self.peripherals.elapsed_cycles;
        self.last_stop = StopReason::CyclesComplete;
        while self.cpu.running && self.peripherals.elapsed_cycles.wrapping_sub(start) < cycles as u64 {
            if self.cpu.state == CpuState::LabelB && !self.instruction.is_empty() {
                let conditions = self.peripherals.conditions();
                let mut pc = self.cpu.pc;
                loop {
                    self.instruction.dispatch(pc, conditions);
                    if self.cpu.pc == pc {
                        break;
                    }
                    pc = self.cpu.pc;
                }
            }
            if self.cpu.state == CpuState::Hcf {
                self.last_stop = StopReason::Hcf;
                break;
            }
            self.cpu.step(&mut self.peripherals);
            self.sync_interrupt_lines();
            if self.cpu.halt {
                self.last_stop = StopReason::Halted;
            }
        }
        (self.peripherals.elapsed_cycles - start) as u32
    }

    pub fn last_stop(&self) -> StopReason {
        self.last_stop
    }

    pub fn cpu(&self) -> &Cpu {
        &self.cpu
    }

    pub fn cpu_mut(&mut self) -> &mut Cpu {
        &mut self.cpu
    }

    /// Host-facing PIA0 access (keyboard matrix / printer busy wiring is a
    /// host concern, §1 Non-goals; the hook points live here).
    pub fn pia0_mut(&mut self) -> &mut Pia {
        &mut self.peripherals.pia0
    }

    /// Host-facing PIA1 access (joystick comparator wiring is a host
    /// concern, §1 Non-goals; the cassette/sound bits are already wired to
    /// the internal [`crate::audio::AudioBridge`]).
    pub fn pia1_mut(&mut self) -> &mut Pia {
        &mut self.peripherals.pia1
    }

    /// Install the host's scanline sink. Called once per active scanline
    /// with a full `ACTIVE_WIDTH`-pixel row (§6 "one complete scanline of
    /// nominal pixels").
    pub fn set_render_line_hook<F: FnMut(Vec<Pixel>) + Send + 'static>(&mut self, f: F) {
        self.peripherals.vdg.render_line.set(f);
    }

    pub fn set_hs_hook<F: FnMut(bool) + Send + 'static>(&mut self, f: F) {
        self.peripherals.vdg.signal_hs.set(f);
    }

    pub fn set_fs_hook<F: FnMut(bool) + Send + 'static>(&mut self, f: F) {
        self.peripherals.vdg.signal_fs.set(f);
    }

    /// Pull one sample from the tape/sound bus bridge (§4.4 "Tape/sound bus
    /// bridges"); the host audio backend is out of scope (§1 Non-goals),
    /// but the bridge itself lives in the core.
    pub fn audio_sample(&mut self) -> i16 {
        self.peripherals.audio.sample()
    }

    /// The instruction breakpoint list (§4.6). Handlers installed here fire
    /// at every `LabelB` boundary whose PC and qualifying conditions match.
    pub fn instruction_breakpoints(&mut self) -> &mut BreakpointList {
        &mut self.instruction
    }

    pub fn read_watchpoints(&mut self) -> &mut BreakpointList {
        &mut self.peripherals.read_watch
    }

    pub fn write_watchpoints(&mut self) -> &mut BreakpointList {
        &mut self.peripherals.write_watch
    }

    /// Capture a full snapshot (§6 "Snapshot file layout").
    pub fn save_snapshot(&self) -> Vec<u8> {
        let cartridge_state = self
            .peripherals
            .cartridge
            .as_ref()
            .map(|c| c.save_state())
            .unwrap_or_default();
        let sources = SnapshotSources {
            cpu: &self.cpu,
            sam: &self.peripherals.sam,
            vdg: &self.peripherals.vdg,
            pia0: &self.peripherals.pia0,
            pia1: &self.peripherals.pia1,
            ram: &self.peripherals.ram,
            cartridge_state,
        };
        snapshot::capture(&sources)
    }

    /// Restore a snapshot taken by [`Self::save_snapshot`]. The VDG's TV
    /// standard, cartridge, and hooks are carried over from the machine's
    /// current configuration rather than the blob, per `snapshot::restore`'s
    /// contract.
    pub fn load_snapshot(&mut self, data: &[u8]) -> CoreResult<()> {
        let tv_standard_vdg = Vdg::new(crate::config::TvStandard::Ntsc);
        let restored = snapshot::restore(data, tv_standard_vdg).map_err(|e| {
            log::warn!("snapshot load failed: {e}");
            e
        })?;

        self.cpu = restored.cpu;
        self.peripherals.sam = restored.sam;
        let mut vdg = restored.vdg;
        std::mem::swap(&mut vdg.render_line, &mut self.peripherals.vdg.render_line);
        std::mem::swap(&mut vdg.signal_hs, &mut self.peripherals.vdg.signal_hs);
        std::mem::swap(&mut vdg.signal_fs, &mut self.peripherals.vdg.signal_fs);
        self.peripherals.vdg = vdg;
        self.peripherals.pia0 = restored.pia0;
        self.peripherals.pia1 = restored.pia1;
        if restored.ram.len() == self.peripherals.ram.len() {
            self.peripherals.ram = restored.ram;
        }
        if let Some(cart) = &mut self.peripherals.cartridge {
            cart.load_state(&restored.cartridge_state);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{RamSize, TvStandard};
    use crate::cpu::CpuVariant;
    use std::sync::atomic::{AtomicU32, Ordering as AtomicOrdering};

    fn test_machine() -> Machine {
        let config = MachineConfig::new(CpuVariant::Mc6809, TvStandard::Ntsc).with_ram_size(RamSize::Kb64);
        Machine::new(config)
    }

    #[test]
    fn reset_vectors_pc_from_ffe_region() {
        let mut machine = test_machine();
        // Vector ROM is floating (0xFF) with no ROM loaded, so reset lands
        // the PC at 0xFFFF -- still a deterministic, inspectable value.
        machine.run_cycles(20);
        assert_eq!(machine.cpu().pc, 0xFFFF);
    }

    #[test]
    fn loading_rom_oversize_is_rejected() {
        let mut machine = test_machine();
        let oversized = vec![0u8; MAX_ROM_BYTES + 1];
        assert!(machine.load_rom(&oversized).is_err());
    }

    #[test]
    fn run_cycles_executes_ldy_immediate_from_ram() {
        let mut machine = test_machine();
        // Route the reset vector (via the floating vector ROM) is awkward
        // to target precisely without a ROM image, so drive the CPU
        // directly: park PC in RAM and single-step past reset by hand.
        machine.cpu_mut().reset();
        machine.cpu_mut().state = CpuState::NextInstruction;
        machine.cpu_mut().pc = 0x2000;
        {
            let periph = &mut machine.peripherals;
            periph.ram[0x2000] = 0x10; // LDY immediate, page-2 opcode prefix
            periph.ram[0x2001] = 0x8E;
            periph.ram[0x2002] = 0x12;
            periph.ram[0x2003] = 0x34;
        }
        machine.run_cycles(400);
        assert_eq!(machine.cpu().y, 0x1234);
    }

    #[test]
    fn instruction_breakpoint_fires_at_label_b() {
        let mut machine = test_machine();
        machine.cpu_mut().reset();
        machine.cpu_mut().state = CpuState::LabelA;
        machine.cpu_mut().pc = 0x3000;
        machine.peripherals.ram[0x3000] = 0x12; // NOP
        let hits = Arc::new(AtomicU32::new(0));
        let h = hits.clone();
        machine
            .instruction_breakpoints()
            .add(crate::breakpoint::Breakpoint::at(0x3000), move |_| {
                h.fetch_add(1, AtomicOrdering::SeqCst);
            });
        machine.run_cycles(400);
        assert_eq!(hits.load(AtomicOrdering::SeqCst), 1);
    }

    #[test]
    fn write_watchpoint_fires_after_ram_is_serviced() {
        let mut machine = test_machine();
        machine.cpu_mut().reset();
        machine.cpu_mut().state = CpuState::NextInstruction;
        machine.cpu_mut().pc = 0x4000;
        {
            let periph = &mut machine.peripherals;
            periph.ram[0x4000] = 0x86; // LDA immediate
            periph.ram[0x4001] = 0x42;
            periph.ram[0x4002] = 0x97; // STA direct
            periph.ram[0x4003] = 0x10; // DP defaults to 0 -> address 0x0010
        }
        let seen = Arc::new(AtomicU32::new(0));
        let s = seen.clone();
        machine
            .write_watchpoints()
            .add(crate::breakpoint::Breakpoint::at(0x0010), move |addr| {
                s.store(addr as u32, AtomicOrdering::SeqCst);
            });
        machine.run_cycles(500);
        assert_eq!(seen.load(AtomicOrdering::SeqCst), 0x0010);
        assert_eq!(machine.peripherals.ram[0x0010], 0x42);
    }

    #[test]
    fn snapshot_round_trips_cpu_registers() {
        let mut machine = test_machine();
        machine.cpu_mut().reset();
        machine.cpu_mut().x = 0xBEEF;
        machine.cpu_mut().pc = 0x5000;
        let blob = machine.save_snapshot();

        let mut other = test_machine();
        other.load_snapshot(&blob).expect("load_snapshot");
        assert_eq!(other.cpu().x, 0xBEEF);
        assert_eq!(other.cpu().pc, 0x5000);
    }

    #[test]
    fn cartridge_firq_line_reaches_cpu_dispatch() {
        let (mut signals, lines) = CartridgeLines::new_pair();
        let config = MachineConfig::new(CpuVariant::Mc6809, TvStandard::Ntsc)
            .with_cartridge_and_lines(Box::new(crate::cartridge::PlaceholderCartridge), lines);
        let mut machine = Machine::new(config);
        machine.cpu_mut().reset();
        machine.cpu_mut().state = CpuState::LabelA;
        machine.cpu_mut().cc &= !crate::cpu::CC_F;
        machine.cpu_mut().pc = 0x6000;
        {
            let periph = &mut machine.peripherals;
            periph.ram[0x6000] = 0x12; // NOP, keeps PC parked for the assertion below
            // FIRQ vector points into RAM at 0x6100.
            periph.rom = vec![0xFF; 32];
            let vector_offset = (crate::cpu::vectors::FIRQ - 0xFFE0) as usize;
            periph.rom[vector_offset] = 0x61;
            periph.rom[vector_offset + 1] = 0x00;
        }
        signals.signal_firq(true);
        // One `run_cycles` call: sync_interrupt_lines sets the CPU's FIRQ
        // input, then LabelB dispatches it at the next instruction boundary.
        machine.run_cycles(800);
        assert_eq!(machine.cpu().pc, 0x6100);
        assert!(machine.cpu().cc & crate::cpu::CC_F != 0);
    }
}
