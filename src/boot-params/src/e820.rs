use std::fmt;

use zerocopy::little_endian::{U32, U64};
use zerocopy::{AsBytes, FromBytes, FromZeroes};

/// Number of E820 slots available in the zero page.
pub const E820_MAX_ENTRIES: usize = 128;

/// Memory types understood by the guest.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[repr(u32)]
pub enum E820Type {
    Ram = 1,
    Reserved = 2,
    Acpi = 3,
    Nvs = 4,
    Unusable = 5,
}

impl E820Type {
    pub fn from_raw(raw: u32) -> Option<Self> {
        match raw {
            1 => Some(E820Type::Ram),
            2 => Some(E820Type::Reserved),
            3 => Some(E820Type::Acpi),
            4 => Some(E820Type::Nvs),
            5 => Some(E820Type::Unusable),
            _ => None,
        }
    }
}

#[derive(Debug, PartialEq, Eq, thiserror::Error, displaydoc::Display)]
pub enum E820Error {
    /// The E820 map cannot hold more than {0} entries
    TooManyEntries(usize),
    /// Zero length E820 entry at {0:#x}
    EmptyEntry(u64),
    /// E820 entry at {0:#x} starts before the end of the previous entry
    Unordered(u64),
}

/// A single `boot_e820_entry`: 20 bytes, no padding.
#[repr(C, packed)]
#[derive(Clone, Copy, Default, PartialEq, Eq, AsBytes, FromZeroes, FromBytes)]
pub struct E820Entry {
    addr: U64,
    size: U64,
    type_: U32,
}

impl fmt::Debug for E820Entry {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(
            f,
            "{:#x} - {:#x} type {}",
            self.addr(),
            self.end(),
            self.type_.get()
        )
    }
}

impl E820Entry {
    pub fn new(addr: u64, size: u64, entry_type: E820Type) -> Self {
        E820Entry {
            addr: U64::new(addr),
            size: U64::new(size),
            type_: U32::new(entry_type as u32),
        }
    }

    pub fn addr(&self) -> u64 {
        self.addr.get()
    }

    pub fn size(&self) -> u64 {
        self.size.get()
    }

    pub fn set_size(&mut self, size: u64) {
        self.size.set(size);
    }

    /// First address past the entry.
    pub fn end(&self) -> u64 {
        self.addr().saturating_add(self.size())
    }

    pub fn entry_type(&self) -> Option<E820Type> {
        E820Type::from_raw(self.type_.get())
    }
}

/// E820 map bounded by the capacity of the zero page.
///
/// Entries are kept sorted and non-overlapping and none of them is empty; a push that would
/// break any of that is refused.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct E820Table {
    entries: Vec<E820Entry>,
}

impl E820Table {
    pub fn new() -> Self {
        E820Table {
            entries: Vec::with_capacity(E820_MAX_ENTRIES),
        }
    }

    pub fn push(&mut self, entry: E820Entry) -> Result<(), E820Error> {
        if entry.size() == 0 {
            return Err(E820Error::EmptyEntry(entry.addr()));
        }
        if let Some(last) = self.entries.last() {
            if entry.addr() < last.end() {
                return Err(E820Error::Unordered(entry.addr()));
            }
        }
        if self.entries.len() == E820_MAX_ENTRIES {
            return Err(E820Error::TooManyEntries(E820_MAX_ENTRIES));
        }
        self.entries.push(entry);
        Ok(())
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn as_slice(&self) -> &[E820Entry] {
        &self.entries
    }

    pub fn iter(&self) -> impl Iterator<Item = &E820Entry> {
        self.entries.iter()
    }
}
