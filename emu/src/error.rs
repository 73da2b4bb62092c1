//! Typed error taxonomy for the core.
//!
//! Only failures the frontend must react to (bad BIOS, bad ROM, bad save
//! file) are modeled as `Result` errors. Guest misbehavior during emulation
//! (unmapped access, undefined instruction, division by zero in HLE) is
//! handled in place via open-bus / exception vectors / logging and never
//! propagates as an `Err` out of [`crate::gba::Gba::run_for`].

/// Top-level error returned by the core's fallible entry points.
#[derive(Debug, thiserror::Error)]
pub enum CoreError {
    #[error(transparent)]
    Configuration(#[from] ConfigurationError),
    #[error(transparent)]
    Image(#[from] ImageError),
}

/// Errors in how the core was configured before it could run.
#[derive(Debug, thiserror::Error)]
pub enum ConfigurationError {
    #[error("BIOS image missing")]
    MissingBios,
    #[error("BIOS image must be exactly 16 KiB, got {0} bytes")]
    WrongBiosSize(usize),
    #[error("ROM exceeds the 32 MiB cartridge address space ({0} bytes)")]
    RomTooLarge(usize),
}

/// Errors in the content of a loaded ROM or save file.
#[derive(Debug, thiserror::Error)]
pub enum ImageError {
    #[error("ROM image is empty or truncated")]
    TruncatedRom,
    #[error("save file size {0} does not match any known backup size")]
    UnrecognizedSaveSize(usize),
    #[error("cartridge header checksum mismatch: expected {expected:#04x}, got {got:#04x}")]
    BadHeaderChecksum { expected: u8, got: u8 },
}
