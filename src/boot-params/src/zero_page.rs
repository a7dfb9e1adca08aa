use std::fmt;

use log::debug;
use vm_memory::{Bytes, GuestAddress, GuestMemory};
use zerocopy::little_endian::{U32, U64};
use zerocopy::{AsBytes, FromBytes, FromZeroes};

use crate::e820::{E820Entry, E820Table, E820_MAX_ENTRIES};
use crate::screen_info::ScreenInfo;
use crate::setup_header::SetupHeader;
use crate::Result;

/// `boot_params`, a.k.a. the zero page.
///
/// Only the fields this VMM fills in are spelled out; everything else is kept as opaque padding
/// so the offsets of the named fields match the kernel's definition.
#[repr(C, packed)]
#[derive(Clone, Copy, PartialEq, Eq, AsBytes, FromZeroes, FromBytes)]
pub struct BootParams {
    pub screen_info: ScreenInfo,
    _apm_bios_info: [u8; 0x14],
    _pad2: [u8; 4],
    pub tboot_addr: U64,
    _ist_info: [u8; 0x10],
    pub acpi_rsdp_addr: U64,
    _pad3: [u8; 8],
    _hd0_info: [u8; 16],
    _hd1_info: [u8; 16],
    _sys_desc_table: [u8; 0x10],
    _olpc_ofw_header: [u8; 0x10],
    pub ext_ramdisk_image: U32,
    pub ext_ramdisk_size: U32,
    pub ext_cmd_line_ptr: U32,
    _pad4: [u8; 112],
    pub cc_blob_address: U32,
    _edid_info: [u8; 0x80],
    _efi_info: [u8; 0x20],
    pub alt_mem_k: U32,
    pub scratch: U32,
    pub e820_entries: u8,
    pub eddbuf_entries: u8,
    pub edd_mbr_sig_buf_entries: u8,
    pub kbd_status: u8,
    pub secure_boot: u8,
    _pad5: [u8; 2],
    pub sentinel: u8,
    _pad6: [u8; 1],
    pub hdr: SetupHeader,
    _pad7: [u8; 36],
    _edd_mbr_sig_buffer: [u8; 64],
    e820_table: [E820Entry; E820_MAX_ENTRIES],
    _pad8: [u8; 48],
    _eddbuf: [u8; 0x1ec],
    _pad9: [u8; 276],
}

const _: () = assert!(std::mem::size_of::<BootParams>() == 0x1000);

impl fmt::Debug for BootParams {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        writeln!(f, "screen_info : {:#x?}", self.screen_info)?;
        writeln!(f, "hdr : {:#x?}", self.hdr)?;
        writeln!(f, "alt_mem_k : {:#x?}", self.alt_mem_k)?;
        writeln!(f, "e820_entries : {}", self.e820_entries)?;
        for entry in self.e820_table() {
            writeln!(f, "\t{:?}", entry)?;
        }
        Ok(())
    }
}

impl Default for BootParams {
    fn default() -> Self {
        BootParams::new_zeroed()
    }
}

impl BootParams {
    /// Copies `table` into the zero page and sets the entry count.
    pub fn set_e820_table(&mut self, table: &E820Table) {
        let entries = table.as_slice();
        self.e820_table = [E820Entry::default(); E820_MAX_ENTRIES];
        self.e820_table[..entries.len()].copy_from_slice(entries);
        // E820Table never holds more than E820_MAX_ENTRIES (128) entries.
        self.e820_entries = entries.len() as u8;
    }

    /// The populated part of the E820 table.
    pub fn e820_table(&self) -> &[E820Entry] {
        let count = usize::from(self.e820_entries).min(E820_MAX_ENTRIES);
        &self.e820_table[..count]
    }

    pub fn len(&self) -> usize {
        self.as_bytes().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Writes the whole structure into guest memory in a single copy.
    pub fn write_to_guest<M: GuestMemory>(&self, mem: &M, address: GuestAddress) -> Result<()> {
        debug!("{:#x?} at {:#x}", self, address.0);
        mem.write_slice(self.as_bytes(), address)?;
        Ok(())
    }

    pub fn read_from_guest<M: GuestMemory>(mem: &M, address: GuestAddress) -> Result<Self> {
        let mut params = BootParams::new_zeroed();
        mem.read_slice(params.as_bytes_mut(), address)?;
        Ok(params)
    }
}

#[cfg(test)]
mod tests {
    use vm_memory::GuestMemoryMmap;

    use super::*;
    use crate::e820::E820Type;
    use crate::setup_header::KERNEL_HDR_MAGIC;

    #[test]
    fn test_layout() {
        let mut params = BootParams::default();
        params.screen_info.orig_video_is_vga = 0x23;
        params.acpi_rsdp_addr.set(0x000e_0000);
        params.alt_mem_k.set(0x1234);
        params.hdr.header.set(KERNEL_HDR_MAGIC);

        let mut table = E820Table::new();
        table
            .push(E820Entry::new(0, 0x10_0000, E820Type::Reserved))
            .unwrap();
        table
            .push(E820Entry::new(0x10_0000, 0x10_0000, E820Type::Ram))
            .unwrap();
        params.set_e820_table(&table);

        let bytes = params.as_bytes();
        assert_eq!(bytes.len(), 0x1000);
        assert_eq!(bytes[0x0f], 0x23);
        assert_eq!(&bytes[0x70..0x78], &0x000e_0000u64.to_le_bytes());
        assert_eq!(&bytes[0x1e0..0x1e4], &0x1234u32.to_le_bytes());
        assert_eq!(bytes[0x1e8], 2);
        assert_eq!(&bytes[0x202..0x206], b"HdrS");
        // Second E820 entry: 0x2d0 + 20.
        assert_eq!(&bytes[0x2e4..0x2ec], &0x10_0000u64.to_le_bytes());
        assert_eq!(&bytes[0x2f4..0x2f8], &1u32.to_le_bytes());
        assert_eq!(params.e820_table(), table.as_slice());
    }

    #[test]
    fn test_set_e820_table_clears_stale_entries() {
        let mut params = BootParams::default();
        let mut table = E820Table::new();
        table
            .push(E820Entry::new(0, 0x1000, E820Type::Ram))
            .unwrap();
        table
            .push(E820Entry::new(0x1000, 0x1000, E820Type::Reserved))
            .unwrap();
        params.set_e820_table(&table);

        params.set_e820_table(&E820Table::new());
        assert_eq!(params.e820_entries, 0);
        assert!(params.as_bytes()[0x2d0..0x2d0 + 40].iter().all(|b| *b == 0));
    }

    #[test]
    fn test_guest_round_trip() {
        let mem: GuestMemoryMmap<()> =
            GuestMemoryMmap::from_ranges(&[(GuestAddress(0), 0x10000)]).unwrap();

        let mut params = BootParams::default();
        params.hdr.header.set(KERNEL_HDR_MAGIC);
        params.hdr.cmd_line_ptr.set(0x2_0000);
        params.write_to_guest(&mem, GuestAddress(0x7000)).unwrap();

        let read = BootParams::read_from_guest(&mem, GuestAddress(0x7000)).unwrap();
        assert_eq!(read, params);

        // The structure does not fit past the end of guest memory.
        assert!(params.write_to_guest(&mem, GuestAddress(0xf800)).is_err());
    }
}
