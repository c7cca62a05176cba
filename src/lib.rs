//! Dragon 32/64 and Tandy Color Computer cycle-accurate emulation core.
//!
//! This crate provides a platform-agnostic emulation core with a stable C
//! ABI alongside its native Rust API. No OS APIs are used by the core
//! itself — all I/O crosses the boundary through byte buffers, PIA register
//! taps, and the VDG scanline hook.
//!
//! # Architecture
//!
//! - `tick` / `scheduler` / `delegate`: wrap-safe cycle arithmetic, the
//!   cooperative event list, and the boxed-closure hook abstraction the
//!   rest of the core is built on
//! - `cpu`: MC6809/HD6309 instruction core, driven one micro-step at a time
//! - `sam`: address decode, RAM/ROM mux, and the VDG's pixel-clock divider
//!   chain
//! - `vdg`: scanline timing and pixel decode
//! - `pia`: the two MC6821 peripheral interface adapters
//! - `cartridge`: the cartridge slot's capability interface
//! - `breakpoint`: the instruction/watchpoint engine
//! - `machine`: wires all of the above into one cycle-driven unit
//! - `snapshot`: save-state capture/restore
//! - `audio`: the tape/sound bus bridge
//!
//! # Non-goals (§1)
//!
//! Host UI, video blitting, an audio backend, ROM/config file discovery,
//! keyboard/joystick host integration, and a debug wire protocol server are
//! all out of scope; this crate stops at the capability interfaces those
//! concerns are built on top of.

pub mod audio;
pub mod breakpoint;
pub mod cartridge;
pub mod config;
pub mod cpu;
pub mod delegate;
pub mod error;
pub mod machine;
pub mod pia;
pub mod sam;
pub mod scheduler;
pub mod snapshot;
pub mod tick;
pub mod vdg;

pub use config::{MachineConfig, RamSize, TvStandard};
pub use cpu::CpuVariant;
pub use error::{CoreError, CoreResult};
pub use machine::{Machine, StopReason};

use std::ptr;
use std::slice;

fn ram_size_from_code(code: u8) -> RamSize {
    match code {
        0 => RamSize::Kb4,
        1 => RamSize::Kb16,
        3 => RamSize::Kb512,
        _ => RamSize::Kb64,
    }
}

fn tv_standard_from_code(code: u8) -> TvStandard {
    match code {
        1 => TvStandard::PalDragon64,
        2 => TvStandard::PalCoco,
        _ => TvStandard::Ntsc,
    }
}

fn cpu_variant_from_code(code: u8) -> CpuVariant {
    match code {
        1 => CpuVariant::Hd6309,
        _ => CpuVariant::Mc6809,
    }
}

/// Create a new machine instance.
///
/// `cpu_variant`: 0 = MC6809, 1 = HD6309.
/// `tv_standard`: 0 = NTSC, 1 = PAL (Dragon 64), 2 = PAL (CoCo).
/// `ram_size`: 0 = 4K, 1 = 16K, 2 = 64K, 3 = 512K.
///
/// Returns null on allocation failure; never fails otherwise, since these
/// codes always map to a supported combination.
#[no_mangle]
pub extern "C" fn machine_create(cpu_variant: u8, tv_standard: u8, ram_size: u8) -> *mut Machine {
    let config = MachineConfig::new(cpu_variant_from_code(cpu_variant), tv_standard_from_code(tv_standard))
        .with_ram_size(ram_size_from_code(ram_size));
    Box::into_raw(Box::new(Machine::new(config)))
}

/// Destroy a machine instance. Safe to call with a null pointer.
#[no_mangle]
pub extern "C" fn machine_destroy(machine: *mut Machine) {
    if !machine.is_null() {
        unsafe {
            drop(Box::from_raw(machine));
        }
    }
}

/// Load a ROM image into the internal BASIC ROM / cartridge-ROM window.
/// Returns 0 on success, a negative [`CoreError::to_c_code`] on failure.
#[no_mangle]
pub extern "C" fn machine_load_rom(machine: *mut Machine, data: *const u8, len: usize) -> i32 {
    if machine.is_null() || data.is_null() {
        return -1;
    }
    let machine = unsafe { &mut *machine };
    let rom = unsafe { slice::from_raw_parts(data, len) };
    match machine.load_rom(rom) {
        Ok(()) => 0,
        Err(e) => e.to_c_code(),
    }
}

/// Reset the CPU and every peripheral.
#[no_mangle]
pub extern "C" fn machine_reset(machine: *mut Machine) {
    if machine.is_null() {
        return;
    }
    unsafe { &mut *machine }.reset();
}

/// Run up to `cycles` sub-cycle-equivalent bus cycles. Returns the number
/// actually run (may be less than requested if the CPU halts or hits HCF).
#[no_mangle]
pub extern "C" fn machine_run_cycles(machine: *mut Machine, cycles: u32) -> u32 {
    if machine.is_null() {
        return 0;
    }
    unsafe { &mut *machine }.run_cycles(cycles)
}

/// Why the last `machine_run_cycles` call returned early: 0 = ran the full
/// budget, 1 = halted, 2 = HCF.
#[no_mangle]
pub extern "C" fn machine_last_stop(machine: *const Machine) -> i32 {
    if machine.is_null() {
        return 0;
    }
    match unsafe { &*machine }.last_stop() {
        StopReason::CyclesComplete => 0,
        StopReason::Halted => 1,
        StopReason::Hcf => 2,
    }
}

/// Current program counter, for host-side diagnostics.
#[no_mangle]
pub extern "C" fn machine_pc(machine: *const Machine) -> u16 {
    if machine.is_null() {
        return 0;
    }
    unsafe { &*machine }.cpu().pc
}

/// Read one of PIA0's four addressable slots (data/control × side A/B).
#[no_mangle]
pub extern "C" fn machine_pia0_read(machine: *mut Machine, slot: u8) -> u8 {
    if machine.is_null() {
        return 0xFF;
    }
    unsafe { &mut *machine }.pia0_mut().read(slot)
}

/// Write one of PIA0's four addressable slots — the keyboard matrix drive
/// lines live here; mapping host key events onto rows/columns is a host
/// concern (§1 Non-goals), this is the raw register tap.
#[no_mangle]
pub extern "C" fn machine_pia0_write(machine: *mut Machine, slot: u8, value: u8) {
    if machine.is_null() {
        return;
    }
    unsafe { &mut *machine }.pia0_mut().write(slot, value);
}

/// Read one of PIA1's four addressable slots (cassette/sound and joystick
/// comparator lines).
#[no_mangle]
pub extern "C" fn machine_pia1_read(machine: *mut Machine, slot: u8) -> u8 {
    if machine.is_null() {
        return 0xFF;
    }
    unsafe { &mut *machine }.pia1_mut().read(slot)
}

#[no_mangle]
pub extern "C" fn machine_pia1_write(machine: *mut Machine, slot: u8, value: u8) {
    if machine.is_null() {
        return;
    }
    unsafe { &mut *machine }.pia1_mut().write(slot, value);
}

/// Pull one sample from the tape/sound bus bridge. The host audio backend
/// itself is out of scope (§1 Non-goals).
#[no_mangle]
pub extern "C" fn machine_audio_sample(machine: *mut Machine) -> i16 {
    if machine.is_null() {
        return 0;
    }
    unsafe { &mut *machine }.audio_sample()
}

/// Size needed for a save-state buffer. Recomputes the snapshot, so callers
/// that also want the bytes should prefer a single `machine_save_state`
/// call sized generously rather than probing first.
#[no_mangle]
pub extern "C" fn machine_save_state_size(machine: *const Machine) -> usize {
    if machine.is_null() {
        return 0;
    }
    unsafe { &*machine }.save_snapshot().len()
}

/// Save machine state to a buffer. Returns bytes written on success, or a
/// negative code if `cap` is too small (`-1`) or `machine`/`out` is null.
#[no_mangle]
pub extern "C" fn machine_save_state(machine: *const Machine, out: *mut u8, cap: usize) -> i32 {
    if machine.is_null() || out.is_null() {
        return -1;
    }
    let blob = unsafe { &*machine }.save_snapshot();
    if blob.len() > cap {
        return -1;
    }
    let dest = unsafe { slice::from_raw_parts_mut(out, blob.len()) };
    dest.copy_from_slice(&blob);
    blob.len() as i32
}

/// Load machine state from a buffer. Returns 0 on success, a negative
/// [`CoreError::to_c_code`] on failure.
#[no_mangle]
pub extern "C" fn machine_load_state(machine: *mut Machine, data: *const u8, len: usize) -> i32 {
    if machine.is_null() || data.is_null() {
        return -1;
    }
    let machine = unsafe { &mut *machine };
    let blob = unsafe { slice::from_raw_parts(data, len) };
    match machine.load_snapshot(blob) {
        Ok(()) => 0,
        Err(e) => e.to_c_code(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_create_destroy() {
        let machine = machine_create(0, 0, 2);
        assert!(!machine.is_null());
        machine_destroy(machine);
    }

    #[test]
    fn test_run_cycles() {
        let machine = machine_create(0, 0, 2);
        let executed = machine_run_cycles(machine, 1000);
        assert!(executed > 0);
        machine_destroy(machine);
    }

    #[test]
    fn test_pia_round_trip() {
        let machine = machine_create(0, 0, 2);
        machine_pia0_write(machine, 0, 0xAA);
        // Direction register defaults to all-input, so a data-slot write
        // doesn't change what reads back until DDR is configured; this
        // just exercises the pointer-marshalling path without panicking.
        let _ = machine_pia0_read(machine, 0);
        machine_destroy(machine);
    }

    #[test]
    fn test_save_load_state_round_trip() {
        let machine = machine_create(0, 0, 2);
        let size = machine_save_state_size(machine);
        let mut buf = vec![0u8; size];
        let written = machine_save_state(machine, buf.as_mut_ptr(), buf.len());
        assert_eq!(written, size as i32);

        let other = machine_create(0, 0, 2);
        let code = machine_load_state(other, buf.as_ptr(), buf.len());
        assert_eq!(code, 0);
        assert_eq!(machine_pc(other), machine_pc(machine));

        machine_destroy(machine);
        machine_destroy(other);
    }

    #[test]
    fn null_pointers_are_handled_without_panicking() {
        assert_eq!(machine_run_cycles(ptr::null_mut(), 10), 0);
        assert_eq!(machine_load_rom(ptr::null_mut(), ptr::null(), 0), -1);
        machine_reset(ptr::null_mut());
        machine_destroy(ptr::null_mut());
    }
}
