use zerocopy::little_endian::{U16, U32, U64};
use zerocopy::{AsBytes, FromBytes, FromZeroes};

/// "HdrS"
pub const KERNEL_HDR_MAGIC: u32 = 0x5372_6448;
pub const KERNEL_BOOT_FLAG_MAGIC: u16 = 0xaa55;
/// Loader type for boot loaders without an assigned ID.
pub const KERNEL_LOADER_OTHER: u8 = 0xff;
/// Boot protocol 2.02: no ramdisk fields.
pub const BOOT_PROTOCOL_2_02: u16 = 0x0202;
/// Boot protocol 2.04: first version whose ramdisk fields the kernel honours here.
pub const BOOT_PROTOCOL_2_04: u16 = 0x0204;
/// `/dev/ram0`
pub const ROOT_DEV_RAMDISK: u16 = 0x0100;

/// The real-mode kernel header, found at offset 0x1f1 of the zero page.
#[repr(C, packed)]
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, AsBytes, FromZeroes, FromBytes)]
pub struct SetupHeader {
    pub setup_sects: u8,
    pub root_flags: U16,
    pub syssize: U32,
    pub ram_size: U16,
    pub vid_mode: U16,
    pub root_dev: U16,
    pub boot_flag: U16,
    pub jump: U16,
    pub header: U32,
    pub version: U16,
    pub realmode_swtch: U32,
    pub start_sys_seg: U16,
    pub kernel_version: U16,
    pub type_of_loader: u8,
    pub loadflags: u8,
    pub setup_move_size: U16,
    pub code32_start: U32,
    pub ramdisk_image: U32,
    pub ramdisk_size: U32,
    pub bootsect_kludge: U32,
    pub heap_end_ptr: U16,
    pub ext_loader_ver: u8,
    pub ext_loader_type: u8,
    pub cmd_line_ptr: U32,
    pub initrd_addr_max: U32,
    pub kernel_alignment: U32,
    pub relocatable_kernel: u8,
    pub min_alignment: u8,
    pub xloadflags: U16,
    pub cmdline_size: U32,
    pub hardware_subarch: U32,
    pub hardware_subarch_data: U64,
    pub payload_offset: U32,
    pub payload_length: U32,
    pub setup_data: U64,
    pub pref_address: U64,
    pub init_size: U32,
    pub handover_offset: U32,
    pub kernel_info_offset: U32,
}

impl SetupHeader {
    /// Whether the header advertises the ramdisk fields.
    pub fn has_ramdisk(&self) -> bool {
        self.version.get() >= BOOT_PROTOCOL_2_04 && self.ramdisk_image.get() != 0
    }
}
