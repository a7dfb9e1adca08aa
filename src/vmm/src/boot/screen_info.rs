// Copyright 2023 Amazon.com, Inc. or its affiliates. All Rights Reserved.
// SPDX-License-Identifier: Apache-2.0

use boot_params::{ScreenInfo, VbeBootInfo};
use log::{debug, error};
use zerocopy::{AsBytes, FromZeroes};

use crate::arch::{PAGE_SIZE, VBE_PM_INTERFACE_MIN};
use crate::device_manager::resources::{
    MapError, Reservation, ReservationError, ReservationMapper, ResourceAllocator,
};
use crate::platform::{BootInfoKind, PlatformBootInfo};

/// Reasons for booting the guest without a frame buffer.
#[derive(Debug, thiserror::Error, displaydoc::Display)]
enum VesaError {
    /// Failed to reserve the VBE protected mode interface: {0}
    ReservePmInterface(ReservationError),
    /// Failed to map the VBE protected mode interface: {0}
    MapPmInterface(MapError),
    /// Failed to reserve base pointer for VESA frame buffer: {0}
    ReserveFramebuffer(ReservationError),
    /// Failed to map base pointer for VESA frame buffer: {0}
    MapFramebuffer(MapError),
    /// Frame buffer base {0:#x} does not fit in 32 bits
    FramebufferTooHigh(u64),
}

fn read_vbe_info(platform: &dyn PlatformBootInfo) -> Option<VbeBootInfo> {
    let mut info = VbeBootInfo::new_zeroed();
    match platform.read_extended_bootinfo(BootInfoKind::Vbe, info.as_bytes_mut()) {
        Ok(_) => Some(info),
        Err(err) => {
            debug!("No VESA frame buffer: {}", err);
            None
        }
    }
}

/// Maps the page aligned range around the protected mode interface, when it sits above the
/// real mode IVT and BDA.
fn map_pm_interface(
    vbe: &VbeBootInfo,
    resources: &ResourceAllocator,
    mapper: &mut dyn ReservationMapper,
) -> Result<(), VesaError> {
    let pm_base = vbe.pm_interface_addr();
    if pm_base <= VBE_PM_INTERFACE_MIN {
        return Ok(());
    }

    let aligned_pm = pm_base & !(PAGE_SIZE - 1);
    let len = u64::from(vbe.interface_len.get()) + (pm_base - aligned_pm);
    let size = (len + PAGE_SIZE - 1) & !(PAGE_SIZE - 1);
    let reservation = resources
        .reserve_at(aligned_pm, size)
        .map_err(VesaError::ReservePmInterface)?;
    mapper
        .map(&reservation)
        .map_err(VesaError::MapPmInterface)
}

// The boot protocol only has room for a 32-bit base. Checked before anything is mapped.
fn framebuffer_base(reservation: &Reservation) -> Result<u32, VesaError> {
    u32::try_from(reservation.addr).map_err(|_| VesaError::FramebufferTooHigh(reservation.addr))
}

fn map_framebuffer(
    vbe: &VbeBootInfo,
    resources: &ResourceAllocator,
    mapper: &mut dyn ReservationMapper,
) -> Result<ScreenInfo, VesaError> {
    map_pm_interface(vbe, resources, mapper)?;

    let fb_size = vbe.framebuffer_size();
    let reservation = resources
        .reserve_anon(fb_size)
        .map_err(VesaError::ReserveFramebuffer)?;
    let lfb_base = framebuffer_base(&reservation)?;
    let phys_base = u64::from(vbe.mode_info.phys_base_ptr.get());
    mapper
        .map_at_base(&reservation, phys_base)
        .map_err(VesaError::MapFramebuffer)?;

    debug!(
        "VESA frame buffer of {:#x} bytes at {:#x}, backed by {:#x}",
        fb_size, lfb_base, phys_base
    );
    Ok(ScreenInfo::vesa_lfb(vbe, lfb_base, fb_size))
}

/// Describes the frame buffer to the guest.
///
/// Every failure is logged and degrades to an all zero block, which tells the guest it has no
/// graphics.
pub(crate) fn make_screen_info(
    platform: &dyn PlatformBootInfo,
    resources: &ResourceAllocator,
    mapper: &mut dyn ReservationMapper,
) -> ScreenInfo {
    if !cfg!(feature = "vesa-framebuffer") {
        return ScreenInfo::new_zeroed();
    }
    let Some(vbe) = read_vbe_info(platform) else {
        return ScreenInfo::new_zeroed();
    };

    match map_framebuffer(&vbe, resources, mapper) {
        Ok(info) => info,
        Err(err) => {
            error!("{}. Disabling VESA frame buffer", err);
            ScreenInfo::new_zeroed()
        }
    }
}
