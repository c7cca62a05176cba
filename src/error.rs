//! Error types at the machine/UI boundary (§7).
//!
//! The core never panics on external input and never uses exceptions-style
//! nonlocal exits internally. Illegal instructions, HCF, and unmapped bus
//! reads are not errors — they are documented behaviours handled in place.
//! What *does* cross this boundary as a `Result` is configuration mistakes,
//! snapshot parse failures, and out-of-memory at construction.

use thiserror::Error;

/// Errors surfaced to the host across the machine construction and
/// snapshot load/save APIs.
#[derive(Debug, Error)]
pub enum CoreError {
    #[error("invalid machine configuration: {0}")]
    InvalidConfig(String),

    #[error("ROM image too large for slot: got {got} bytes, slot holds at most {max}")]
    RomTooLarge { got: usize, max: usize },

    #[error("RAM size {0} bytes is not one of the supported SAM memory sizes")]
    UnsupportedRamSize(usize),

    #[error("snapshot parse error: {0}")]
    SnapshotParse(String),

    #[error("snapshot has unsupported version tag {0}")]
    UnsupportedSnapshotVersion(u8),

    #[error("out of memory allocating {0}")]
    OutOfMemory(&'static str),
}

pub type CoreResult<T> = Result<T, CoreError>;

impl CoreError {
    /// Stable negative error code for the C ABI (§7), mirroring the
    /// teacher's `Result<_, i32>` convention at the FFI boundary.
    pub fn to_c_code(&self) -> i32 {
        match self {
            CoreError::InvalidConfig(_) => -1,
            CoreError::RomTooLarge { .. } => -2,
            CoreError::UnsupportedRamSize(_) => -3,
            CoreError::SnapshotParse(_) => -4,
            CoreError::UnsupportedSnapshotVersion(_) => -5,
            CoreError::OutOfMemory(_) => -6,
        }
    }
}
