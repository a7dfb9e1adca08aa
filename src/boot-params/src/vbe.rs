use zerocopy::little_endian::{U16, U32};
use zerocopy::{AsBytes, FromBytes, FromZeroes};

use crate::align_up;

/// Frame buffers are handed to the guest in 64 KiB units.
pub const FRAMEBUFFER_GRANULE: u64 = 0x1_0000;

/// VBE mode info block, as returned by VBE function 01h (256 bytes).
#[repr(C, packed)]
#[derive(Clone, Copy, Debug, PartialEq, Eq, AsBytes, FromZeroes, FromBytes)]
pub struct VbeModeInfoBlock {
    // VBE 1.0 and above.
    pub mode_attributes: U16,
    pub win_a_attributes: u8,
    pub win_b_attributes: u8,
    pub win_granularity: U16,
    pub win_size: U16,
    pub win_a_segment: U16,
    pub win_b_segment: U16,
    pub win_func_ptr: U32,
    pub bytes_per_scan_line: U16,
    // VBE 1.2 and above.
    pub x_resolution: U16,
    pub y_resolution: U16,
    pub x_char_size: u8,
    pub y_char_size: u8,
    pub number_of_planes: u8,
    pub bits_per_pixel: u8,
    pub number_of_banks: u8,
    pub memory_model: u8,
    pub bank_size: u8,
    pub number_of_image_pages: u8,
    _reserved0: u8,
    pub red_mask_size: u8,
    pub red_field_position: u8,
    pub green_mask_size: u8,
    pub green_field_position: u8,
    pub blue_mask_size: u8,
    pub blue_field_position: u8,
    pub rsvd_mask_size: u8,
    pub rsvd_field_position: u8,
    pub direct_color_mode_info: u8,
    // VBE 2.0 and above.
    pub phys_base_ptr: U32,
    _reserved1: U32,
    _reserved2: U16,
    // VBE 3.0 and above.
    pub lin_bytes_per_scan_line: U16,
    pub bnk_number_of_image_pages: u8,
    pub lin_number_of_image_pages: u8,
    pub lin_red_mask_size: u8,
    pub lin_red_field_position: u8,
    pub lin_green_mask_size: u8,
    pub lin_green_field_position: u8,
    pub lin_blue_mask_size: u8,
    pub lin_blue_field_position: u8,
    pub lin_rsvd_mask_size: u8,
    pub lin_rsvd_field_position: u8,
    pub max_pixel_clock: U32,
    _reserved3: [u8; 190],
}

/// VESA information collected by the platform firmware before the VMM started.
#[repr(C, packed)]
#[derive(Clone, Copy, Debug, PartialEq, Eq, AsBytes, FromZeroes, FromBytes)]
pub struct VbeBootInfo {
    pub mode_info: VbeModeInfoBlock,
    pub mode: U32,
    /// Real mode segment of the protected mode interface.
    pub interface_seg: U32,
    pub interface_off: U32,
    pub interface_len: U32,
}

impl VbeBootInfo {
    /// Physical address of the VBE protected mode interface.
    pub fn pm_interface_addr(&self) -> u64 {
        (u64::from(self.interface_seg.get()) << 4) + u64::from(self.interface_off.get())
    }

    /// Size of the linear frame buffer of the current mode, rounded up to 64 KiB.
    pub fn framebuffer_size(&self) -> u64 {
        let scan_line = u64::from(self.mode_info.bytes_per_scan_line.get());
        let lines = u64::from(self.mode_info.y_resolution.get());
        align_up(scan_line * lines, FRAMEBUFFER_GRANULE)
    }
}

#[cfg(test)]
mod tests {
    use std::mem::size_of;

    use super::*;

    #[test]
    fn test_layout() {
        assert_eq!(size_of::<VbeModeInfoBlock>(), 256);
        assert_eq!(size_of::<VbeBootInfo>(), 256 + 16);

        let mut block = VbeModeInfoBlock::new_zeroed();
        block.bytes_per_scan_line.set(0x1122);
        block.y_resolution.set(0x3344);
        block.phys_base_ptr.set(0xe000_0000);
        block.max_pixel_clock.set(0xaabb_ccdd);

        let bytes = block.as_bytes();
        assert_eq!(&bytes[0x10..0x12], &[0x22, 0x11]);
        assert_eq!(&bytes[0x14..0x16], &[0x44, 0x33]);
        assert_eq!(&bytes[0x28..0x2c], &0xe000_0000u32.to_le_bytes());
        assert_eq!(&bytes[0x3e..0x42], &0xaabb_ccddu32.to_le_bytes());
    }

    #[test]
    fn test_pm_interface_addr() {
        let mut info = VbeBootInfo::new_zeroed();
        info.interface_seg.set(0xc000);
        info.interface_off.set(0x1234);
        assert_eq!(info.pm_interface_addr(), 0xc1234);
    }

    #[test]
    fn test_framebuffer_size() {
        let mut info = VbeBootInfo::new_zeroed();
        // 1024x768x32
        info.mode_info.bytes_per_scan_line.set(4096);
        info.mode_info.y_resolution.set(768);
        assert_eq!(info.framebuffer_size(), 0x30_0000);

        // 800x600x24 is not a multiple of 64 KiB.
        info.mode_info.bytes_per_scan_line.set(2400);
        info.mode_info.y_resolution.set(600);
        assert_eq!(info.framebuffer_size(), 0x16_0000);
    }
}
