//! Machine configuration (ambient, §SPEC_FULL A).
//!
//! `MachineConfig` is an in-memory struct the host populates before
//! constructing a [`crate::machine::Machine`]; parsing it *from* a config
//! file is explicitly out of scope (§1). Built the way the teacher's
//! `Emu::new()` / `load_rom` pair is used: sane `Default`, then setters,
//! then hand to the constructor.

use crate::cartridge::{Cartridge, CartridgeLines};
use crate::cpu::CpuVariant;
use crate::error::{CoreError, CoreResult};

/// Which machine model's timing and PAL-padding rules apply (§4.4).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TvStandard {
    Ntsc,
    /// Dragon 64's padding shape: 25 blank sub-lines inserted at two points.
    PalDragon64,
    /// CoCo's padding shape: 26 then 24 blank sub-lines at two different points.
    PalCoco,
}

/// RAM sizes the SAM's M[1:0] field can describe.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RamSize {
    Kb4,
    Kb16,
    Kb64,
    Kb512,
}

impl RamSize {
    pub fn bytes(self) -> usize {
        match self {
            RamSize::Kb4 => 4 * 1024,
            RamSize::Kb16 => 16 * 1024,
            RamSize::Kb64 => 64 * 1024,
            RamSize::Kb512 => 512 * 1024,
        }
    }

    fn from_bytes(n: usize) -> CoreResult<Self> {
        match n {
            4096 => Ok(RamSize::Kb4),
            16384 => Ok(RamSize::Kb16),
            65536 => Ok(RamSize::Kb64),
            524288 => Ok(RamSize::Kb512),
            other => Err(CoreError::UnsupportedRamSize(other)),
        }
    }
}

/// Host-supplied configuration for a [`crate::machine::Machine`].
///
/// Keymap, ROM discovery and config-file parsing are out of scope (§1);
/// this struct is the *result* of that host-side process, not a parser.
pub struct MachineConfig {
    pub cpu_variant: CpuVariant,
    pub tv_standard: TvStandard,
    pub ram_size: RamSize,
    pub cartridge: Option<Box<dyn Cartridge>>,
    /// The machine-facing half of the cartridge's signal lines, if the
    /// cartridge was constructed with a [`CartridgeLines::new_pair`] and
    /// can raise FIRQ/NMI/HALT. `None` for cartridges that never do (ROM,
    /// pass-through, placeholder).
    pub cartridge_lines: Option<CartridgeLines>,
}

impl MachineConfig {
    pub fn new(cpu_variant: CpuVariant, tv_standard: TvStandard) -> Self {
        Self {
            cpu_variant,
            tv_standard,
            ram_size: RamSize::Kb64,
            cartridge: None,
            cartridge_lines: None,
        }
    }

    pub fn with_ram_bytes(mut self, bytes: usize) -> CoreResult<Self> {
        self.ram_size = RamSize::from_bytes(bytes)?;
        Ok(self)
    }

    pub fn with_ram_size(mut self, size: RamSize) -> Self {
        self.ram_size = size;
        self
    }

    pub fn with_cartridge(mut self, cartridge: Box<dyn Cartridge>) -> Self {
        self.cartridge = Some(cartridge);
        self
    }

    /// Attach a cartridge together with the machine-facing half of its
    /// signal lines (§9 "parts and components").
    pub fn with_cartridge_and_lines(mut self, cartridge: Box<dyn Cartridge>, lines: CartridgeLines) -> Self {
        self.cartridge = Some(cartridge);
        self.cartridge_lines = Some(lines);
        self
    }
}

impl Default for MachineConfig {
    /// Dragon 64 defaults: HD6309 is not standard on a stock Dragon, so the
    /// default variant is MC6809/NTSC-equivalent Dragon timing with 64K.
    fn default() -> Self {
        Self::new(CpuVariant::Mc6809, TvStandard::Ntsc)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_is_64k_mc6809() {
        let cfg = MachineConfig::default();
        assert_eq!(cfg.cpu_variant, CpuVariant::Mc6809);
        assert_eq!(cfg.ram_size.bytes(), 65536);
        assert!(cfg.cartridge.is_none());
    }

    #[test]
    fn unsupported_ram_size_is_rejected() {
        let result = MachineConfig::default().with_ram_bytes(12345);
        assert!(result.is_err());
    }

    #[test]
    fn builder_chains_without_cartridge() {
        let cfg = MachineConfig::new(CpuVariant::Hd6309, TvStandard::PalCoco)
            .with_ram_size(RamSize::Kb16);
        assert_eq!(cfg.cpu_variant, CpuVariant::Hd6309);
        assert_eq!(cfg.ram_size.bytes(), 16384);
    }
}
