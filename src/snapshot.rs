//! Snapshot save/load, §6 "Snapshot file layout".
//!
//! No serialization crate is pulled in for this: the layout is a small,
//! fixed, hand-rolled binary format in the same length-prefixed style
//! already used for cartridge state blobs (`crate::cartridge`). A
//! snapshot captures CPU, SAM, VDG, both PIAs, RAM, and an opaque
//! cartridge blob; it never reaches into `Machine` plumbing beyond
//! those parts, so this module only knows about the component types
//! directly, not about how a machine wires them together.
//!
//! The CPU's internal [`crate::cpu::CpuState`] is richer than hardware
//! state a snapshot format needs to distinguish; it collapses to the
//! small set of "compat" state codes named in §6: `normal=0, sync=1,
//! cwai=2, done-instruction=11, hcf=12`. Restoring from a compat code
//! picks a representative internal state for each (see
//! `compat_to_cpu_state`); execution resumes correctly from any of them
//! because the state machine only depends on that state, not on how it
//! was reached.

use crate::cpu::{Cpu, CpuState, CpuVariant, TfmMode, TfmState};
use crate::error::{CoreError, CoreResult};
use crate::pia::Pia;
use crate::sam::Sam;
use crate::vdg::{ControlLines, Vdg};

const MAGIC: &[u8; 4] = b"DGNC";
const VERSION: u8 = 1;

struct Writer {
    buf: Vec<u8>,
}

impl Writer {
    fn new() -> Self {
        Self { buf: Vec::new() }
    }
    fn u8(&mut self, v: u8) {
        self.buf.push(v);
    }
    fn bool(&mut self, v: bool) {
        self.buf.push(v as u8);
    }
    fn u16(&mut self, v: u16) {
        self.buf.extend_from_slice(&v.to_le_bytes());
    }
    fn u32(&mut self, v: u32) {
        self.buf.extend_from_slice(&v.to_le_bytes());
    }
    fn bytes(&mut self, v: &[u8]) {
        self.u32(v.len() as u32);
        self.buf.extend_from_slice(v);
    }
}

struct Reader<'a> {
    buf: &'a [u8],
    pos: usize,
}

impl<'a> Reader<'a> {
    fn new(buf: &'a [u8]) -> Self {
        Self { buf, pos: 0 }
    }

    fn u8(&mut self) -> CoreResult<u8> {
        let v = *self
            .buf
            .get(self.pos)
            .ok_or_else(|| CoreError::SnapshotParse("unexpected end of data".into()))?;
        self.pos += 1;
        Ok(v)
    }

    fn bool(&mut self) -> CoreResult<bool> {
        Ok(self.u8()? != 0)
    }

    fn u16(&mut self) -> CoreResult<u16> {
        let lo = self.u8()? as u16;
        let hi = self.u8()? as u16;
        Ok(lo | (hi << 8))
    }

    fn u32(&mut self) -> CoreResult<u32> {
        let a = self.u8()? as u32;
        let b = self.u8()? as u32;
        let c = self.u8()? as u32;
        let d = self.u8()? as u32;
        Ok(a | (b << 8) | (c << 16) | (d << 24))
    }

    fn bytes(&mut self) -> CoreResult<Vec<u8>> {
        let len = self.u32()? as usize;
        let end = self
            .pos
            .checked_add(len)
            .filter(|&e| e <= self.buf.len())
            .ok_or_else(|| CoreError::SnapshotParse("blob length exceeds remaining data".into()))?;
        let slice = self.buf[self.pos..end].to_vec();
        self.pos = end;
        Ok(slice)
    }
}

/// Collapse the CPU's execution state to the compat code a snapshot
/// stores (§6). Several internal states fold onto the same code because
/// a loader only needs to know "normal / syncing / cwai-ing / finished
/// instruction / halted", not the exact micro-step within that.
fn cpu_state_to_compat(state: CpuState) -> u8 {
    match state {
        CpuState::Hcf => 12,
        CpuState::CwaiCheckHalt => 2,
        CpuState::Sync | CpuState::SyncCheckHalt => 1,
        CpuState::NextInstruction => 11,
        CpuState::Reset | CpuState::ResetCheckHalt | CpuState::LabelA | CpuState::LabelB | CpuState::DispatchIrq => 0,
    }
}

fn compat_to_cpu_state(code: u8) -> CoreResult<CpuState> {
    match code {
        0 => Ok(CpuState::LabelA),
        1 => Ok(CpuState::Sync),
        2 => Ok(CpuState::CwaiCheckHalt),
        11 => Ok(CpuState::NextInstruction),
        12 => Ok(CpuState::Hcf),
        other => Err(CoreError::SnapshotParse(format!("unknown compat state code {other}"))),
    }
}

fn write_cpu(w: &mut Writer, cpu: &Cpu) {
    w.u8(match cpu.variant() {
        CpuVariant::Mc6809 => 0,
        CpuVariant::Hd6309 => 1,
    });
    w.u16(cpu.d());
    w.u16(cpu.w());
    w.u16(cpu.x);
    w.u16(cpu.y);
    w.u16(cpu.u);
    w.u16(cpu.s);
    w.u16(cpu.pc);
    w.u8(cpu.dp);
    w.u8(cpu.cc);
    w.u16(cpu.v);
    w.u8(cpu.md);
    w.u8(cpu_state_to_compat(cpu.state));

    for (raw, latch, active) in cpu.interrupt_shadows() {
        w.bool(raw);
        w.bool(latch);
        w.bool(active);
    }
    w.bool(cpu.nmi_armed());
    w.u8(cpu.cwai_mask());
    w.bool(cpu.halt);
    w.bool(cpu.running);

    match cpu.tfm {
        None => w.u8(0),
        Some(tfm) => {
            w.u8(1);
            w.u8(match tfm.mode {
                TfmMode::IncInc => 0,
                TfmMode::DecDec => 1,
                TfmMode::IncFixed => 2,
                TfmMode::FixedInc => 3,
            });
            w.u8(tfm.src_reg);
            w.u8(tfm.dst_reg);
            w.u16(tfm.remaining);
        }
    }
}

fn read_cpu(r: &mut Reader) -> CoreResult<Cpu> {
    let variant = match r.u8()? {
        0 => CpuVariant::Mc6809,
        1 => CpuVariant::Hd6309,
        other => return Err(CoreError::SnapshotParse(format!("unknown CPU variant code {other}"))),
    };
    let mut cpu = Cpu::new(variant);
    cpu.set_d(r.u16()?);
    cpu.set_w(r.u16()?);
    cpu.x = r.u16()?;
    cpu.y = r.u16()?;
    cpu.u = r.u16()?;
    cpu.s = r.u16()?;
    cpu.pc = r.u16()?;
    cpu.dp = r.u8()?;
    cpu.cc = r.u8()?;
    cpu.v = r.u16()?;
    cpu.md = r.u8()?;
    cpu.state = compat_to_cpu_state(r.u8()?)?;

    let mut shadows = [(false, false, false); 3];
    for slot in &mut shadows {
        let raw = r.bool()?;
        let latch = r.bool()?;
        let active = r.bool()?;
        *slot = (raw, latch, active);
    }
    cpu.set_interrupt_shadows(shadows);
    cpu.set_nmi_armed(r.bool()?);
    cpu.set_cwai_mask(r.u8()?);
    cpu.halt = r.bool()?;
    cpu.running = r.bool()?;

    cpu.tfm = match r.u8()? {
        0 => None,
        1 => {
            let mode = match r.u8()? {
                0 => TfmMode::IncInc,
                1 => TfmMode::DecDec,
                2 => TfmMode::IncFixed,
                3 => TfmMode::FixedInc,
                other => return Err(CoreError::SnapshotParse(format!("unknown TFM mode code {other}"))),
            };
            let src_reg = r.u8()?;
            let dst_reg = r.u8()?;
            let remaining = r.u16()?;
            Some(TfmState {
                mode,
                src_reg,
                dst_reg,
                remaining,
            })
        }
        other => return Err(CoreError::SnapshotParse(format!("unknown TFM presence flag {other}"))),
    };

    Ok(cpu)
}

fn write_sam(w: &mut Writer, sam: &Sam) {
    w.u16(sam.control_register());
    let (low, bit4, high, sub_x, sub_y, grounded) = sam.counters.raw();
    w.u8(low);
    w.bool(bit4);
    w.u16(high);
    w.u8(sub_x);
    w.u8(sub_y);
    w.bool(grounded);
    let (prev_fast, fast_parity) = sam.timing_state();
    w.bool(prev_fast);
    w.bool(fast_parity);
}

fn read_sam(r: &mut Reader) -> CoreResult<Sam> {
    let mut sam = Sam::new();
    sam.set_register(r.u16()?);
    let low = r.u8()?;
    let bit4 = r.bool()?;
    let high = r.u16()?;
    let sub_x = r.u8()?;
    let sub_y = r.u8()?;
    let grounded = r.bool()?;
    sam.counters.set_raw(low, bit4, high, sub_x, sub_y, grounded);
    let prev_fast = r.bool()?;
    let fast_parity = r.bool()?;
    sam.set_timing_state(prev_fast, fast_parity);
    Ok(sam)
}

fn write_vdg(w: &mut Writer, vdg: &Vdg) {
    w.u16(vdg.scanline);
    w.u8(vdg.row);
    w.bool(vdg.hs);
    w.bool(vdg.fs);
    w.bool(vdg.lines.a_g);
    w.bool(vdg.lines.a_s);
    w.u8(vdg.lines.gm);
    w.bool(vdg.lines.css);
    w.bool(vdg.lines.ext);
    w.bool(vdg.lines.inv);
}

fn apply_vdg(r: &mut Reader, vdg: &mut Vdg) -> CoreResult<()> {
    vdg.scanline = r.u16()?;
    vdg.row = r.u8()?;
    vdg.hs = r.bool()?;
    vdg.fs = r.bool()?;
    vdg.lines = ControlLines {
        a_g: r.bool()?,
        a_s: r.bool()?,
        gm: r.u8()?,
        css: r.bool()?,
        ext: r.bool()?,
        inv: r.bool()?,
    };
    Ok(())
}

fn write_pia(w: &mut Writer, pia: &Pia) {
    for side in [&pia.side_a, &pia.side_b] {
        w.u8(side.control());
        w.u8(side.direction());
        w.u8(side.output());
        w.bool(side.cx1());
        w.bool(side.interrupt_received());
    }
}

fn apply_pia(r: &mut Reader, pia: &mut Pia) -> CoreResult<()> {
    for side in [&mut pia.side_a, &mut pia.side_b] {
        let control = r.u8()?;
        let direction = r.u8()?;
        let output = r.u8()?;
        let cx1 = r.bool()?;
        let interrupt_received = r.bool()?;
        side.restore(control, direction, output, cx1, interrupt_received);
    }
    Ok(())
}

/// Everything a snapshot captures outside of RAM and the cartridge, which
/// the caller owns directly and passes in/out separately (§6: RAM is a
/// raw byte dump, the cartridge section is an opaque blob the core never
/// inspects).
pub struct SnapshotSources<'a> {
    pub cpu: &'a Cpu,
    pub sam: &'a Sam,
    pub vdg: &'a Vdg,
    pub pia0: &'a Pia,
    pub pia1: &'a Pia,
    pub ram: &'a [u8],
    pub cartridge_state: Vec<u8>,
}

/// The restored components, handed back for the caller (normally
/// `Machine::load_snapshot`) to install. The cartridge blob is returned
/// rather than applied, since this module has no `Cartridge` handle to
/// apply it to.
pub struct RestoredState {
    pub cpu: Cpu,
    pub sam: Sam,
    pub vdg: Vdg,
    pub pia0: Pia,
    pub pia1: Pia,
    pub ram: Vec<u8>,
    pub cartridge_state: Vec<u8>,
}

/// Serialize a full machine snapshot.
pub fn capture(sources: &SnapshotSources) -> Vec<u8> {
    let mut w = Writer::new();
    w.buf.extend_from_slice(MAGIC);
    w.u8(VERSION);
    write_cpu(&mut w, sources.cpu);
    write_sam(&mut w, sources.sam);
    write_vdg(&mut w, sources.vdg);
    write_pia(&mut w, sources.pia0);
    write_pia(&mut w, sources.pia1);
    w.bytes(sources.ram);
    w.bytes(&sources.cartridge_state);
    w.buf
}

/// Parse a snapshot produced by [`capture`]. `vdg` and the two `pia`
/// values are reconstructed with placeholder hooks/TV standard; the
/// caller re-wires hooks and swaps in its own `Vdg`/`Pia` instances'
/// delegate fields as needed — only the register-level state round-trips
/// through the blob.
pub fn restore(data: &[u8], tv_standard_vdg: Vdg) -> CoreResult<RestoredState> {
    let mut r = Reader::new(data);
    if data.len() < 5 || &data[0..4] != MAGIC {
        return Err(CoreError::SnapshotParse("bad magic".into()));
    }
    r.pos = 4;
    let version = r.u8()?;
    if version != VERSION {
        return Err(CoreError::UnsupportedSnapshotVersion(version));
    }

    let cpu = read_cpu(&mut r)?;
    let sam = read_sam(&mut r)?;
    let mut vdg = tv_standard_vdg;
    apply_vdg(&mut r, &mut vdg)?;
    let mut pia0 = Pia::new();
    apply_pia(&mut r, &mut pia0)?;
    let mut pia1 = Pia::new();
    apply_pia(&mut r, &mut pia1)?;
    let ram = r.bytes()?;
    let cartridge_state = r.bytes()?;

    Ok(RestoredState {
        cpu,
        sam,
        vdg,
        pia0,
        pia1,
        ram,
        cartridge_state,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::TvStandard;

    #[test]
    fn round_trips_cpu_registers_and_compat_state() {
        let mut cpu = Cpu::new(CpuVariant::Hd6309);
        cpu.pc = 0x4000;
        cpu.x = 0x1234;
        cpu.set_d(0xBEEF);
        cpu.state = CpuState::Hcf;
        cpu.set_nmi_armed(true);

        let sam = Sam::new();
        let vdg = Vdg::new(TvStandard::Ntsc);
        let pia0 = Pia::new();
        let pia1 = Pia::new();
        let ram = vec![0xAAu8; 1024];

        let sources = SnapshotSources {
            cpu: &cpu,
            sam: &sam,
            vdg: &vdg,
            pia0: &pia0,
            pia1: &pia1,
            ram: &ram,
            cartridge_state: vec![1, 2, 3],
        };
        let blob = capture(&sources);
        let restored = restore(&blob, Vdg::new(TvStandard::Ntsc)).expect("restore");

        assert_eq!(restored.cpu.pc, 0x4000);
        assert_eq!(restored.cpu.x, 0x1234);
        assert_eq!(restored.cpu.d(), 0xBEEF);
        assert_eq!(restored.cpu.state, CpuState::Hcf);
        assert_eq!(restored.cartridge_state, vec![1, 2, 3]);
        assert_eq!(restored.ram, ram);
    }

    #[test]
    fn compat_state_folds_sync_variants_together() {
        assert_eq!(cpu_state_to_compat(CpuState::Sync), 1);
        assert_eq!(cpu_state_to_compat(CpuState::SyncCheckHalt), 1);
        assert_eq!(cpu_state_to_compat(CpuState::CwaiCheckHalt), 2);
        assert_eq!(cpu_state_to_compat(CpuState::NextInstruction), 11);
        assert_eq!(cpu_state_to_compat(CpuState::Hcf), 12);
        assert_eq!(cpu_state_to_compat(CpuState::Reset), 0);
    }

    #[test]
    fn bad_magic_is_rejected() {
        let result = restore(&[0, 0, 0, 0, 0], Vdg::new(TvStandard::Ntsc));
        assert!(result.is_err());
    }

    #[test]
    fn unsupported_version_is_rejected() {
        let mut blob = Vec::new();
        blob.extend_from_slice(MAGIC);
        blob.push(99);
        let result = restore(&blob, Vdg::new(TvStandard::Ntsc));
        assert!(matches!(result, Err(CoreError::UnsupportedSnapshotVersion(99))));
    }
}
