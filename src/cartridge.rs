//! Cartridge capability interface (§3, §6).
//!
//! The core knows only the capability set a cartridge exposes — it never
//! inspects a cartridge's internals. Concrete cartridges are free to wire
//! up whatever chip-select and signalling logic they need behind this
//! trait; the core's job stops at calling `read`/`write`/`reset`/`detach`
//! and reacting to the signal callbacks a cartridge invokes through the
//! [`CartridgeSignals`] handle it is given at attachment.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// Upward signals a cartridge can raise into the machine, bound at
/// attachment time rather than stored as a parent back-pointer (§9,
/// "parts and components"). A cartridge holds one of these and calls into
/// it instead of reaching back through a `&mut Machine`.
pub struct CartridgeSignals {
    pub firq: Box<dyn FnMut(bool) + Send>,
    pub nmi: Box<dyn FnMut(bool) + Send>,
    pub halt: Box<dyn FnMut(bool) + Send>,
}

impl CartridgeSignals {
    pub fn signal_firq(&mut self, level: bool) {
        (self.firq)(level);
    }
    pub fn signal_nmi(&mut self, level: bool) {
        (self.nmi)(level);
    }
    pub fn signal_halt(&mut self, level: bool) {
        (self.halt)(level);
    }
}

/// The machine side of a cartridge's signal lines: three flags a
/// cartridge's [`CartridgeSignals`] closures set, and the machine polls at
/// its own pace (instruction boundaries) rather than being called back
/// into directly. `Arc<AtomicBool>` rather than a channel or back-pointer,
/// since a level line only ever needs "what's the current value", not a
/// queue of edges.
#[derive(Clone)]
pub struct CartridgeLines {
    firq: Arc<AtomicBool>,
    nmi: Arc<AtomicBool>,
    halt: Arc<AtomicBool>,
}

impl CartridgeLines {
    /// Build a bound `(CartridgeSignals, CartridgeLines)` pair: pass the
    /// signals half into a cartridge's constructor, keep the lines half to
    /// hand to the machine alongside the cartridge itself.
    pub fn new_pair() -> (CartridgeSignals, CartridgeLines) {
        let firq = Arc::new(AtomicBool::new(false));
        let nmi = Arc::new(AtomicBool::new(false));
        let halt = Arc::new(AtomicBool::new(false));
        let signals = CartridgeSignals {
            firq: {
                let f = firq.clone();
                Box::new(move |level| f.store(level, Ordering::Relaxed))
            },
            nmi: {
                let n = nmi.clone();
                Box::new(move |level| n.store(level, Ordering::Relaxed))
            },
            halt: {
                let h = halt.clone();
                Box::new(move |level| h.store(level, Ordering::Relaxed))
            },
        };
        (signals, CartridgeLines { firq, nmi, halt })
    }

    pub fn firq(&self) -> bool {
        self.firq.load(Ordering::Relaxed)
    }
    pub fn nmi(&self) -> bool {
        self.nmi.load(Ordering::Relaxed)
    }
    pub fn halt(&self) -> bool {
        self.halt.load(Ordering::Relaxed)
    }
}

/// The capability set every cartridge variant implements (§3).
///
/// `P2`/`R2` are the cartridge chip-select strobes (I/O and ROM windows);
/// the core passes both plus the current data-bus byte on every access so
/// the cartridge can decode its own address space without the core
/// knowing anything about cartridge-specific memory maps.
pub trait Cartridge: Send {
    fn read(&mut self, addr: u16, p2: bool, r2: bool, data: u8) -> u8;
    fn write(&mut self, addr: u16, p2: bool, r2: bool, data: u8);
    fn reset(&mut self);
    fn detach(&mut self);

    /// Opaque state blob for snapshotting (§6, "cart state"). The core
    /// round-trips this verbatim; it never inspects the contents.
    fn save_state(&self) -> Vec<u8> {
        Vec::new()
    }
    fn load_state(&mut self, _data: &[u8]) {}
}

/// A single ROM image mapped into the cartridge ROM window (`R2`). The one
/// fully-implemented cartridge body the core's own tests exercise.
pub struct RomCartridge {
    rom: Vec<u8>,
}

impl RomCartridge {
    pub fn new(rom: Vec<u8>) -> Self {
        Self { rom }
    }
}

impl Cartridge for RomCartridge {
    fn read(&mut self, addr: u16, _p2: bool, r2: bool, data: u8) -> u8 {
        if r2 && self.rom.is_empty() {
            data
        } else if r2 {
            let offset = (addr as usize) % self.rom.len();
            self.rom[offset]
        } else {
            data
        }
    }

    fn write(&mut self, _addr: u16, _p2: bool, _r2: bool, _data: u8) {
        // ROM-only cartridge: writes are simply dropped.
    }

    fn reset(&mut self) {}
    fn detach(&mut self) {}

    fn save_state(&self) -> Vec<u8> {
        Vec::new()
    }
    fn load_state(&mut self, _data: &[u8]) {}
}

/// Up to four cartridges chained through one slot, pass-through style: a
/// read/write is offered to each sub-cartridge in turn, and a reset/detach
/// reaches every one of them (§3 "multi-slot pass-through").
pub struct MultiSlotCartridge {
    slots: Vec<Box<dyn Cartridge>>,
}

impl MultiSlotCartridge {
    pub fn new() -> Self {
        Self { slots: Vec::new() }
    }

    pub fn attach(&mut self, cart: Box<dyn Cartridge>) {
        self.slots.push(cart);
    }
}

impl Default for MultiSlotCartridge {
    fn default() -> Self {
        Self::new()
    }
}

impl Cartridge for MultiSlotCartridge {
    fn read(&mut self, addr: u16, p2: bool, r2: bool, data: u8) -> u8 {
        let mut value = data;
        for slot in &mut self.slots {
            value = slot.read(addr, p2, r2, value);
        }
        value
    }

    fn write(&mut self, addr: u16, p2: bool, r2: bool, data: u8) {
        for slot in &mut self.slots {
            slot.write(addr, p2, r2, data);
        }
    }

    fn reset(&mut self) {
        for slot in &mut self.slots {
            slot.reset();
        }
    }

    fn detach(&mut self) {
        for slot in &mut self.slots {
            slot.detach();
        }
    }

    fn save_state(&self) -> Vec<u8> {
        // Length-prefixed concatenation so load_state can split it back up.
        let mut out = Vec::new();
        for slot in &self.slots {
            let blob = slot.save_state();
            out.extend_from_slice(&(blob.len() as u32).to_le_bytes());
            out.extend_from_slice(&blob);
        }
        out
    }

    fn load_state(&mut self, mut data: &[u8]) {
        for slot in &mut self.slots {
            if data.len() < 4 {
                break;
            }
            let len = u32::from_le_bytes([data[0], data[1], data[2], data[3]]) as usize;
            data = &data[4..];
            if data.len() < len {
                break;
            }
            slot.load_state(&data[..len]);
            data = &data[len..];
        }
    }
}

// DOS-variant (DragonDOS/RSDOS/Delta), SPI-bridge memory expander, and IDE
// cartridges are out of implementation scope here (SPEC_FULL B): the core
// only needs the capability interface above to drive them. PLACEHOLDER:
// a real DOS cartridge would decode its own FDC registers in `read`/`write`
// and raise `signal_nmi` on the FDC's INTRQ line.
pub struct PlaceholderCartridge;

impl Cartridge for PlaceholderCartridge {
    fn read(&mut self, _addr: u16, _p2: bool, _r2: bool, data: u8) -> u8 {
        data
    }
    fn write(&mut self, _addr: u16, _p2: bool, _r2: bool, _data: u8) {}
    fn reset(&mut self) {}
    fn detach(&mut self) {}
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rom_cartridge_serves_bytes_only_when_r2_asserted() {
        let mut cart = RomCartridge::new(vec![0xAA, 0xBB, 0xCC]);
        assert_eq!(cart.read(0, false, true, 0xFF), 0xAA);
        assert_eq!(cart.read(1, false, true, 0xFF), 0xBB);
        assert_eq!(cart.read(0, false, false, 0xFF), 0xFF);
    }

    #[test]
    fn rom_cartridge_wraps_address_beyond_image_size() {
        let mut cart = RomCartridge::new(vec![0x11, 0x22]);
        assert_eq!(cart.read(2, false, true, 0), 0x11);
        assert_eq!(cart.read(3, false, true, 0), 0x22);
    }

    #[test]
    fn multi_slot_chains_reads_through_each_cartridge() {
        let mut multi = MultiSlotCartridge::new();
        multi.attach(Box::new(RomCartridge::new(vec![0x42])));
        assert_eq!(multi.read(0, false, true, 0), 0x42);
    }

    #[test]
    fn cartridge_lines_reflect_signals_calls() {
        let (mut signals, lines) = CartridgeLines::new_pair();
        assert!(!lines.firq());
        signals.signal_firq(true);
        assert!(lines.firq());
        signals.signal_firq(false);
        assert!(!lines.firq());
    }

    #[test]
    fn multi_slot_round_trips_state_through_length_prefixes() {
        let mut multi = MultiSlotCartridge::new();
        multi.attach(Box::new(RomCartridge::new(vec![0x01])));
        multi.attach(Box::new(RomCartridge::new(vec![0x02])));
        let blob = multi.save_state();
        // A RomCartridge carries no mutable state, so the blob is just the
        // two zero-length headers; verify it round-trips without panicking.
        multi.load_state(&blob);
    }
}
