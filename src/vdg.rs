//! MC6847 Video Display Generator, §4.4.
//!
//! The VDG is driven entirely by two scheduled events per scanline
//! (HS-fall, HS-rise) plus the FS edge raised when the scanline counter
//! wraps. It never touches RAM directly — `fetch_data` is a delegate the
//! machine implements by reading through the SAM's VDG translation path,
//! and `render_line` hands a fully decoded scanline of pixels to whatever
//! the host wired up (a framebuffer, a null sink in tests, etc).

use crate::config::TvStandard;
use crate::delegate::Hook;

/// Horizontal timing, in SAM sub-cycles (§4.4).
pub const HS_FRONT_PORCH: u16 = 34;
pub const HS_WIDTH: u16 = 64;
pub const HS_BACK_PORCH: u16 = 70;
pub const LEFT_BORDER: u16 = 120;
pub const ACTIVE_WIDTH: u16 = 512;
pub const RIGHT_BORDER: u16 = 112;
pub const LINE_TOTAL: u16 = 912;

/// First and one-past-last active scanline (192 active lines).
pub const ACTIVE_SCANLINE_START: u16 = 38;
pub const ACTIVE_SCANLINE_END: u16 = 229;

const NTSC_SCANLINES: u16 = 262;

/// A palette index. The actual RGB/composite mapping is a host concern;
/// the core only needs to name which of the VDG's fixed colours a pixel
/// resolves to.
pub type Pixel = u8;

pub mod palette {
    use super::Pixel;
    pub const GREEN: Pixel = 0;
    pub const YELLOW: Pixel = 1;
    pub const BLUE: Pixel = 2;
    pub const RED: Pixel = 3;
    pub const BUFF: Pixel = 4;
    pub const CYAN: Pixel = 5;
    pub const MAGENTA: Pixel = 6;
    pub const ORANGE: Pixel = 7;
    pub const BLACK: Pixel = 8;
    pub const WHITE: Pixel = 9;
    pub const DARK_GREEN: Pixel = 10;
    pub const DARK_ORANGE: Pixel = 11;
}

/// Decoded render mode, derived from the latched control lines.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RenderMode {
    AlphaInternal,
    AlphaExternal,
    Semigraphics4,
    Semigraphics6,
    Semigraphics8,
    ColorGraphics { bits_per_pixel: u8 },
    ResolutionGraphics { bits_per_pixel: u8 },
}

/// The VDG's latched mode-control lines (§3 "VDG scanline state").
#[derive(Debug, Clone, Copy, Default)]
pub struct ControlLines {
    /// A/G: graphics (true) vs alphanumeric/semigraphics (false).
    pub a_g: bool,
    /// A/S, latched per-cell from the fetch buffer in text modes but also
    /// exposed here as the last-seen value for mode derivation.
    pub a_s: bool,
    pub gm: u8,
    pub css: bool,
    pub ext: bool,
    pub inv: bool,
}

impl ControlLines {
    pub fn mode(&self) -> RenderMode {
        if !self.a_g {
            if self.a_s {
                match self.gm & 0x3 {
                    0 => RenderMode::Semigraphics4,
                    1 => RenderMode::Semigraphics6,
                    _ => RenderMode::Semigraphics8,
                }
            } else if self.ext {
                RenderMode::AlphaExternal
            } else {
                RenderMode::AlphaInternal
            }
        } else {
            match self.gm {
                0 | 1 => RenderMode::ResolutionGraphics { bits_per_pixel: 1 },
                2 | 3 => RenderMode::ResolutionGraphics { bits_per_pixel: 2 },
                4 | 5 => RenderMode::ColorGraphics { bits_per_pixel: 1 },
                _ => RenderMode::ColorGraphics { bits_per_pixel: 2 },
            }
        }
    }

    /// `true` when the current mode fetches 16 bytes/row instead of 32
    /// (the higher-resolution graphics modes).
    pub fn sixteen_byte_mode(&self) -> bool {
        matches!(self.gm, 6 | 7)
    }
}

/// PLACEHOLDER: a stand-in 5x7 internal character generator. The spec
/// names the interface (internal ROM vs external fetch) but not the
/// glyph bit patterns themselves; reproducing the real MC6847 ROM
/// contents is out of this core's scope, so each row is a simple
/// deterministic function of the character code rather than a faithful
/// font. `render_line` output is therefore structurally correct (right
/// widths, right mode dispatch) but not visually a real character set.
fn internal_chargen_row(code: u8, row: u8) -> u8 {
    code.wrapping_add(row).reverse_bits() & 0x7C
}

/// One fetched VDG data cell, decoded from the raw 16-bit word the
/// machine's `fetch_data` hook returns: bit 15 INT/EXT, bit 14 A/S, bit 13
/// INV, bits 7:0 data byte (§3).
#[derive(Debug, Clone, Copy)]
struct FetchCell {
    external: bool,
    semigraphics: bool,
    inverse: bool,
    data: u8,
}

impl From<u16> for FetchCell {
    fn from(word: u16) -> Self {
        Self {
            external: word & 0x8000 != 0,
            semigraphics: word & 0x4000 != 0,
            inverse: word & 0x2000 != 0,
            data: (word & 0xFF) as u8,
        }
    }
}

pub struct Vdg {
    pub scanline: u16,
    pub row: u8,
    pub hs: bool,
    pub fs: bool,
    pub lines: ControlLines,
    tv: TvStandard,
    pad_groups_emitted: u8,

    pub render_line: Hook<Vec<Pixel>>,
    pub signal_hs: Hook<bool>,
    pub signal_fs: Hook<bool>,
}

impl Vdg {
    pub fn new(tv: TvStandard) -> Self {
        Self {
            scanline: 0,
            row: 0,
            hs: true,
            fs: false,
            lines: ControlLines::default(),
            tv,
            pad_groups_emitted: 0,
            render_line: Hook::none(),
            signal_hs: Hook::none(),
            signal_fs: Hook::none(),
        }
    }

    pub fn reset(&mut self) {
        self.scanline = 0;
        self.row = 0;
        self.hs = true;
        self.fs = false;
        self.pad_groups_emitted = 0;
    }

    fn foreground_background(&self) -> (Pixel, Pixel) {
        if self.lines.css {
            (palette::ORANGE, palette::DARK_ORANGE)
        } else {
            (palette::GREEN, palette::DARK_GREEN)
        }
    }

    /// Decode one scanline's worth of fetched cells into a pixel row.
    /// Active-area pixels only; borders are filled by the caller/host if
    /// desired (the spec's interface is "one complete scanline of nominal
    /// pixels", §6).
    fn decode_row(&self, cells: &[u16]) -> Vec<Pixel> {
        let mut pixels = Vec::with_capacity(ACTIVE_WIDTH as usize);
        match self.lines.mode() {
            RenderMode::AlphaInternal | RenderMode::AlphaExternal => {
                let (fg, bg) = (palette::GREEN, palette::DARK_GREEN);
                for &word in cells {
                    let cell = FetchCell::from(word);
                    // External chargen is reached through the same fetch
                    // path as RAM data, so both variants resolve through
                    // the placeholder table here.
                    let glyph_row = internal_chargen_row(cell.data, self.row);
                    let inverse = cell.inverse ^ self.lines.inv;
                    for bit in (2..=6).rev() {
                        let set = (glyph_row >> bit) & 1 != 0;
                        let lit = set ^ inverse;
                        pixels.push(if lit { fg } else { bg });
                    }
                }
            }
            RenderMode::Semigraphics4 | RenderMode::Semigraphics6 | RenderMode::Semigraphics8 => {
                for &word in cells {
                    let cell = FetchCell::from(word);
                    let colour_field = (cell.data >> 4) & 0x7;
                    let colour = COLOUR_FIELD[(colour_field & 0x7) as usize];
                    for _ in 0..8 {
                        pixels.push(colour);
                    }
                }
            }
            RenderMode::ColorGraphics { bits_per_pixel } => {
                let palette_set = if self.lines.css {
                    [palette::WHITE, palette::BUFF, palette::CYAN, palette::MAGENTA]
                } else {
                    [palette::GREEN, palette::BUFF, palette::YELLOW, palette::CYAN]
                };
                for &word in cells {
                    let byte = (word & 0xFF) as u8;
                    push_indexed_pixels(&mut pixels, byte, bits_per_pixel, &palette_set);
                }
            }
            RenderMode::ResolutionGraphics { bits_per_pixel } => {
                let (fg, bg) = self.foreground_background();
                for &word in cells {
                    let byte = (word & 0xFF) as u8;
                    push_indexed_pixels(&mut pixels, byte, bits_per_pixel, &[bg, fg, fg, fg]);
                }
            }
        }
        pixels.truncate(ACTIVE_WIDTH as usize);
        while pixels.len() < ACTIVE_WIDTH as usize {
            pixels.push(palette::BLACK);
        }
        pixels
    }

    /// How many 16-bit cells the current mode fetches per row.
    pub fn fetch_word_count(&self) -> usize {
        if self.lines.sixteen_byte_mode() {
            22
        } else {
            42
        }
    }

    /// How many extra 912-sub-cycle blank lines this scanline boundary
    /// inserts, per the TV standard's PAL padding shape (§4.4).
    fn padding_lines_at(&self, scanline: u16) -> u16 {
        match self.tv {
            TvStandard::Ntsc => 0,
            TvStandard::PalDragon64 => {
                if scanline == 0 || scanline == NTSC_SCANLINES / 2 {
                    25
                } else {
                    0
                }
            }
            TvStandard::PalCoco => {
                if scanline == 0 {
                    26
                } else if scanline == NTSC_SCANLINES / 2 {
                    24
                } else {
                    0
                }
            }
        }
    }

    /// Total sub-cycles until the next HS-fall from this one, including
    /// any PAL padding inserted at this boundary (§8 invariant 5).
    pub fn next_hs_fall_delay(&self) -> u32 {
        LINE_TOTAL as u32 + self.padding_lines_at(self.scanline) as u32 * LINE_TOTAL as u32
    }

    /// HS-fall handler: render the completed line, toggle HS low, advance
    /// the scanline counter and row-within-character, and raise FS at the
    /// appropriate boundary.
    ///
    /// `fetch` supplies the row's raw data cells on demand rather than
    /// being stored as a hook field: the machine composing `Vdg` alongside
    /// the SAM and RAM it reads through can't hand the VDG a closure that
    /// captures those sibling fields back (that would alias `&mut self`
    /// through two paths at once), but a closure borrowed only for the
    /// duration of this call is fine.
    pub fn on_hs_fall(&mut self, fetch: &mut dyn FnMut(usize) -> Vec<u16>) {
        if (ACTIVE_SCANLINE_START..ACTIVE_SCANLINE_END).contains(&self.scanline) {
            let cells = fetch(self.fetch_word_count());
            let row = self.decode_row(&cells);
            self.render_line.call(row);
        }

        self.hs = false;
        self.signal_hs.call(false);

        self.scanline = (self.scanline + 1) % NTSC_SCANLINES;
        self.row = if self.row == 11 { 0 } else { self.row + 1 };

        if self.scanline == 0 {
            self.fs = false;
            self.signal_fs.call(false);
        } else if self.scanline == ACTIVE_SCANLINE_END {
            self.fs = true;
            self.signal_fs.call(true);
        }
    }

    /// HS-rise handler: toggle HS high.
    pub fn on_hs_rise(&mut self) {
        self.hs = true;
        self.signal_hs.call(true);
    }
}

const COLOUR_FIELD: [Pixel; 8] = [
    palette::GREEN,
    palette::YELLOW,
    palette::BLUE,
    palette::RED,
    palette::BUFF,
    palette::CYAN,
    palette::MAGENTA,
    palette::ORANGE,
];

fn push_indexed_pixels(out: &mut Vec<Pixel>, byte: u8, bits_per_pixel: u8, palette_set: &[Pixel; 4]) {
    if bits_per_pixel == 1 {
        for bit in (0..8).rev() {
            let set = (byte >> bit) & 1 != 0;
            out.push(if set { palette_set[1] } else { palette_set[0] });
        }
    } else {
        for pair in (0..4).rev() {
            let idx = (byte >> (pair * 2)) & 0x3;
            out.push(palette_set[idx as usize]);
        }
    }
}
