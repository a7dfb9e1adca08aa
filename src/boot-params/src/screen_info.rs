use zerocopy::little_endian::{U16, U32};
use zerocopy::{AsBytes, FromBytes, FromZeroes};

use crate::vbe::VbeBootInfo;

/// `orig_video_isVGA` value telling the guest it runs on a VESA linear frame buffer.
pub const VIDEO_TYPE_VLFB: u8 = 0x23;

/// `screen_info`, the first 64 bytes of the zero page.
///
/// An all-zero block means the guest has no graphics.
#[repr(C, packed)]
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, AsBytes, FromZeroes, FromBytes)]
pub struct ScreenInfo {
    pub orig_x: u8,
    pub orig_y: u8,
    pub ext_mem_k: U16,
    pub orig_video_page: U16,
    pub orig_video_mode: u8,
    pub orig_video_cols: u8,
    pub flags: u8,
    _unused2: u8,
    pub orig_video_ega_bx: U16,
    _unused3: U16,
    pub orig_video_lines: u8,
    pub orig_video_is_vga: u8,
    pub orig_video_points: U16,
    pub lfb_width: U16,
    pub lfb_height: U16,
    pub lfb_depth: U16,
    pub lfb_base: U32,
    /// Frame buffer size in 64 KiB units.
    pub lfb_size: U32,
    pub cl_magic: U16,
    pub cl_offset: U16,
    pub lfb_linelength: U16,
    pub red_size: u8,
    pub red_pos: u8,
    pub green_size: u8,
    pub green_pos: u8,
    pub blue_size: u8,
    pub blue_pos: u8,
    pub rsvd_size: u8,
    pub rsvd_pos: u8,
    pub vesapm_seg: U16,
    pub vesapm_off: U16,
    pub pages: U16,
    pub vesa_attributes: U16,
    pub capabilities: U32,
    pub ext_lfb_base: U32,
    _reserved: [u8; 2],
}

impl ScreenInfo {
    /// Describes a VESA linear frame buffer of `lfb_size` bytes mapped at `lfb_base`.
    pub fn vesa_lfb(vbe: &VbeBootInfo, lfb_base: u32, lfb_size: u64) -> Self {
        let mode = &vbe.mode_info;
        let mut info = ScreenInfo::new_zeroed();

        info.orig_video_is_vga = VIDEO_TYPE_VLFB;
        info.lfb_width = mode.x_resolution;
        info.lfb_height = mode.y_resolution;
        info.lfb_depth = U16::new(mode.bits_per_pixel.into());
        info.lfb_base = U32::new(lfb_base);
        // Truncation is fine: the frame buffer lives below 4 GiB.
        info.lfb_size = U32::new((lfb_size >> 16) as u32);
        info.lfb_linelength = mode.bytes_per_scan_line;

        info.red_size = mode.red_mask_size;
        info.red_pos = mode.red_field_position;
        info.green_size = mode.green_mask_size;
        info.green_pos = mode.green_field_position;
        info.blue_size = mode.blue_mask_size;
        info.blue_pos = mode.blue_field_position;
        info.rsvd_size = mode.rsvd_mask_size;
        info.rsvd_pos = mode.rsvd_field_position;

        info.vesapm_seg = U16::new(vbe.interface_seg.get() as u16);
        info.vesapm_off = U16::new(vbe.interface_off.get() as u16);
        info.pages = U16::new(mode.number_of_planes.into());
        info
    }

    /// Whether the block advertises no graphics at all.
    pub fn is_disabled(&self) -> bool {
        self.as_bytes().iter().all(|b| *b == 0)
    }
}
