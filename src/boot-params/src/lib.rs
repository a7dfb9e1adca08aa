//! Guest-visible structures of the x86 Linux boot protocol.
//!
//! Every structure in this crate is laid out byte for byte the way an unmodified kernel reads it
//! from the "zero page". All multi-byte fields are little endian wrappers with an alignment of
//! one, so the packed structures can be borrowed and updated in place.

use vm_memory::GuestMemoryError;

pub mod e820;
pub mod screen_info;
pub mod setup_header;
pub mod vbe;
pub mod zero_page;

pub use e820::{E820Entry, E820Error, E820Table, E820Type, E820_MAX_ENTRIES};
pub use screen_info::ScreenInfo;
pub use setup_header::SetupHeader;
pub use vbe::{VbeBootInfo, VbeModeInfoBlock};
pub use zero_page::BootParams;

#[derive(Debug, thiserror::Error, displaydoc::Display)]
pub enum BootParamsError {
    /// Guest memory error: {0}
    GuestMemory(#[from] GuestMemoryError),
    /// E820 table error: {0}
    E820(#[from] E820Error),
}

pub type Result<T> = std::result::Result<T, BootParamsError>;

/// Rounds `value` up to the next multiple of `align`, which must be a power of two.
pub(crate) const fn align_up(value: u64, align: u64) -> u64 {
    (value + align - 1) & !(align - 1)
}
