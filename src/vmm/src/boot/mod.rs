// Copyright 2023 Amazon.com, Inc. or its affiliates. All Rights Reserved.
// SPDX-License-Identifier: Apache-2.0

//! Construction of the legacy x86 boot environment of a guest.
//!
//! [`init_guest_boot_structure`] lays out the kernel command line and the zero page in guest RAM
//! and [`init_guest_vcpu_entry`] points the boot vCPU at the kernel, the way a 32-bit boot
//! protocol loader would.

mod cmdline;
mod e820;
mod screen_info;

use std::mem::size_of;

use boot_params::setup_header::{
    BOOT_PROTOCOL_2_02, BOOT_PROTOCOL_2_04, KERNEL_BOOT_FLAG_MAGIC, KERNEL_HDR_MAGIC,
    KERNEL_LOADER_OTHER, ROOT_DEV_RAMDISK,
};
use boot_params::{BootParams, BootParamsError, E820Error, E820Table, ScreenInfo};
use linux_loader::cmdline::Cmdline;
use log::info;
use vm_memory::GuestAddress;

use crate::arch::x86_64::regs::{setup_entry_regs, RegsError, VcpuRegisters};
use crate::arch::ZERO_PAGE_ALIGNMENT;
use crate::vmm_config::boot_source::{BootSourceConfig, BootSourceConfigError, InitrdConfig};
use crate::vstate::memory::RamError;
use crate::GuestVm;

/// Errors thrown while building the guest boot environment.
#[derive(Debug, thiserror::Error, displaydoc::Display)]
pub enum BootError {
    /// Failed to allocate {size} bytes for the guest {what}: {source}
    Allocation {
        what: &'static str,
        size: u64,
        source: RamError,
    },
    /// Invalid kernel command line: {0}
    Cmdline(#[from] linux_loader::cmdline::Error),
    /// Failed to write the kernel command line: {0}
    LoadCmdline(#[from] linux_loader::loader::Error),
    /// Failed to build the E820 map: {0}
    E820(#[from] E820Error),
    /// Failed to write the boot parameters: {0}
    BootParams(#[from] BootParamsError),
    /// Guest {1} address {0:#x} does not fit in the 32-bit boot header
    AddressTooHigh(u64, &'static str),
    /// The boot parameters have not been placed in guest memory yet
    BootParamsNotPlaced,
    /// Invalid initrd range: {0}
    InitrdRange(RamError),
    /// Failed to set up the vCPU entry registers: {0}
    Registers(#[from] RegsError),
    /// Invalid boot source configuration: {0}
    InvalidConfig(#[from] BootSourceConfigError),
}

/// Where the boot structures of a guest ended up.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct GuestBootInfo {
    pub cmdline_addr: GuestAddress,
    /// Length of the command line, without the terminating NUL.
    pub cmdline_len: usize,
    pub boot_params_addr: GuestAddress,
}

/// Values of the setup header that come from the caller.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
struct HeaderFields {
    kernel_load_addr: u32,
    kernel_alignment: u32,
    cmdline_addr: u32,
    cmdline_len: u32,
    /// Address and size.
    ramdisk: Option<(u32, u32)>,
}

fn to_u32(value: u64, what: &'static str) -> Result<u32, BootError> {
    u32::try_from(value).map_err(|_| BootError::AddressTooHigh(value, what))
}

/// Fills in the zero page. Boot protocol reference: Documentation/x86/boot.rst.
fn build_boot_params(hdr: &HeaderFields, screen_info: ScreenInfo, e820: &E820Table) -> BootParams {
    let mut params = BootParams::default();

    params.hdr.header.set(KERNEL_HDR_MAGIC);
    params.hdr.boot_flag.set(KERNEL_BOOT_FLAG_MAGIC);
    params.hdr.type_of_loader = KERNEL_LOADER_OTHER;
    params.hdr.code32_start.set(hdr.kernel_load_addr);
    params.hdr.kernel_alignment.set(hdr.kernel_alignment);
    params.hdr.relocatable_kernel = 1;

    params.screen_info = screen_info;
    params.set_e820_table(e820);

    params.hdr.cmd_line_ptr.set(hdr.cmdline_addr);
    params.hdr.cmdline_size.set(hdr.cmdline_len);

    // Only used by the kernel to report a decompression failure.
    params.alt_mem_k.set(0);

    match hdr.ramdisk {
        Some((addr, size)) => {
            params.hdr.ramdisk_image.set(addr);
            params.hdr.ramdisk_size.set(size);
            params.hdr.root_dev.set(ROOT_DEV_RAMDISK);
            params.hdr.version.set(BOOT_PROTOCOL_2_04);
        }
        None => params.hdr.version.set(BOOT_PROTOCOL_2_02),
    }
    params
}

/// Lays out the command line and the zero page in guest memory.
///
/// The steps run in order and each must succeed before the next starts. The zero page is
/// populated locally and copied into the guest in a single write, so the guest never sees a
/// partially built structure.
///
/// # Arguments
///
/// * `guest` - The guest to boot; receives the resulting [`GuestBootInfo`].
/// * `cmdline` - Kernel command line.
/// * `kernel_load_addr` - Address of the 32-bit kernel entry point.
/// * `kernel_alignment` - Physical alignment a relocatable kernel must keep.
/// * `initrd` - Initrd already present in guest memory. An initrd at address zero is ignored.
pub fn init_guest_boot_structure(
    guest: &mut GuestVm,
    cmdline: &Cmdline,
    kernel_load_addr: GuestAddress,
    kernel_alignment: u32,
    initrd: Option<InitrdConfig>,
) -> Result<GuestBootInfo, BootError> {
    let mut hdr = HeaderFields {
        kernel_load_addr: to_u32(kernel_load_addr.0, "kernel")?,
        kernel_alignment,
        ..Default::default()
    };
    if let Some(initrd) = initrd.filter(|initrd| initrd.address != 0) {
        hdr.ramdisk = Some((
            to_u32(initrd.address, "initrd")?,
            to_u32(initrd.size, "initrd size")?,
        ));
    }

    let (cmdline_addr, cmdline_len) =
        cmdline::place_cmdline(&guest.guest_memory, &mut guest.guest_ram, cmdline)?;
    hdr.cmdline_addr = to_u32(cmdline_addr.0, "command line")?;
    hdr.cmdline_len = to_u32(cmdline_len as u64, "command line size")?;

    let e820 = e820::build_e820_map(guest.guest_ram.regions())?;

    let screen_info = screen_info::make_screen_info(
        guest.platform.as_ref(),
        &guest.resource_allocator,
        guest.mapper.as_mut(),
    );

    let size = size_of::<BootParams>() as u64;
    let boot_params_addr = guest
        .guest_ram
        .allocate(size, ZERO_PAGE_ALIGNMENT)
        .map_err(|source| BootError::Allocation {
            what: "boot params",
            size,
            source,
        })?;
    info!(
        "Guest boot info allocated at {:#x}. Populating...",
        boot_params_addr.0
    );

    let params = build_boot_params(&hdr, screen_info, &e820);
    params.write_to_guest(&guest.guest_memory, boot_params_addr)?;

    let boot_info = GuestBootInfo {
        cmdline_addr,
        cmdline_len,
        boot_params_addr,
    };
    guest.boot_info = Some(boot_info);
    Ok(boot_info)
}

/// Sets the boot vCPU up to enter the kernel at `entry_addr` with the zero page in `rsi`.
pub fn init_guest_vcpu_entry<V: VcpuRegisters + ?Sized>(
    guest: &GuestVm,
    vcpu: &mut V,
    entry_addr: GuestAddress,
) -> Result<(), BootError> {
    let boot_info = guest.boot_info.ok_or(BootError::BootParamsNotPlaced)?;

    info!(
        "Initializing guest to start running at {:#x}",
        entry_addr.0
    );
    setup_entry_regs(vcpu, entry_addr.0, boot_info.boot_params_addr.0)?;
    Ok(())
}

/// Builds the boot environment described by `config`.
///
/// The configuration is validated before any guest memory is touched and the initrd range is
/// kept out of reach of the boot structure allocations.
pub fn configure_boot_source(
    guest: &mut GuestVm,
    config: &BootSourceConfig,
) -> Result<GuestBootInfo, BootError> {
    let cmdline = config.cmdline()?;

    if let Some(initrd) = config.initrd {
        guest
            .guest_ram
            .mark_allocated(GuestAddress(initrd.address), initrd.size)
            .map_err(BootError::InitrdRange)?;
    }

    init_guest_boot_structure(
        guest,
        &cmdline,
        GuestAddress(config.kernel_load_addr),
        config.kernel_alignment,
        config.initrd,
    )
}

#[cfg(test)]
mod tests {
    use boot_params::{E820Entry, E820Type};
    use zerocopy::AsBytes;

    use super::*;
    use crate::device_manager::resources::UnsupportedMapper;
    use crate::platform::HeadlessPlatform;
    use crate::vstate::memory::GuestMemoryMmap;

    fn guest() -> GuestVm {
        let mem = GuestMemoryMmap::from_ranges(&[(GuestAddress(0), 0x100_0000)]).unwrap();
        GuestVm::new(mem, Box::new(HeadlessPlatform), Box::new(UnsupportedMapper)).unwrap()
    }

    fn cmdline(args: &str) -> Cmdline {
        let mut cmdline = Cmdline::new(crate::arch::CMDLINE_MAX_SIZE).unwrap();
        cmdline.insert_str(args).unwrap();
        cmdline
    }

    #[test]
    fn test_build_boot_params() {
        let mut e820 = E820Table::new();
        e820.push(E820Entry::new(0, 0x1000, E820Type::Ram)).unwrap();
        let hdr = HeaderFields {
            kernel_load_addr: 0x10_0000,
            kernel_alignment: 0x20_0000,
            cmdline_addr: 0x2_0000,
            cmdline_len: 13,
            ramdisk: None,
        };

        let params = build_boot_params(&hdr, ScreenInfo::default(), &e820);
        assert_eq!(params.hdr.header.get(), KERNEL_HDR_MAGIC);
        assert_eq!(params.hdr.boot_flag.get(), 0xaa55);
        assert_eq!(params.hdr.type_of_loader, 0xff);
        assert_eq!(params.hdr.code32_start.get(), 0x10_0000);
        assert_eq!(params.hdr.kernel_alignment.get(), 0x20_0000);
        assert_eq!(params.hdr.relocatable_kernel, 1);
        assert_eq!(params.hdr.cmd_line_ptr.get(), 0x2_0000);
        assert_eq!(params.hdr.cmdline_size.get(), 13);
        assert_eq!(params.hdr.version.get(), 0x0202);
        assert_eq!(params.hdr.ramdisk_image.get(), 0);
        assert_eq!(params.hdr.root_dev.get(), 0);
        assert_eq!(params.alt_mem_k.get(), 0);
        assert_eq!(params.e820_table(), e820.as_slice());
        assert!(params.screen_info.is_disabled());

        let hdr = HeaderFields {
            ramdisk: Some((0x80_0000, 0x1234)),
            ..hdr
        };
        let params = build_boot_params(&hdr, ScreenInfo::default(), &e820);
        assert_eq!(params.hdr.version.get(), 0x0204);
        assert_eq!(params.hdr.ramdisk_image.get(), 0x80_0000);
        assert_eq!(params.hdr.ramdisk_size.get(), 0x1234);
        assert_eq!(params.hdr.root_dev.get(), 0x0100);
    }

    #[test]
    fn test_init_guest_boot_structure() {
        let mut guest = guest();
        let boot_info = init_guest_boot_structure(
            &mut guest,
            &cmdline("console=ttyS0"),
            GuestAddress(0x10_0000),
            0x20_0000,
            None,
        )
        .unwrap();

        assert_eq!(guest.boot_info(), Some(boot_info));
        assert_eq!(boot_info.cmdline_len, 13);
        assert_eq!(boot_info.boot_params_addr.0 % ZERO_PAGE_ALIGNMENT, 0);

        let params = BootParams::read_from_guest(guest.guest_memory(), boot_info.boot_params_addr)
            .unwrap();
        assert_eq!(params.hdr.version.get(), 0x0202);
        assert_eq!(
            u64::from(params.hdr.cmd_line_ptr.get()),
            boot_info.cmdline_addr.0
        );
        assert_eq!(params.hdr.cmdline_size.get(), 13);
        assert_eq!(params.e820_entries, 2);
        assert!(params.screen_info.is_disabled());

        // The guest copy matches the locally built structure byte for byte.
        let expected = build_boot_params(
            &HeaderFields {
                kernel_load_addr: 0x10_0000,
                kernel_alignment: 0x20_0000,
                cmdline_addr: u32::try_from(boot_info.cmdline_addr.0).unwrap(),
                cmdline_len: 13,
                ramdisk: None,
            },
            ScreenInfo::default(),
            &e820::build_e820_map(guest.guest_ram().regions()).unwrap(),
        );
        assert_eq!(params, expected);
        assert_eq!(params.as_bytes(), expected.as_bytes());
    }

    #[test]
    fn test_initrd_at_zero_is_ignored() {
        let mut guest = guest();
        let boot_info = init_guest_boot_structure(
            &mut guest,
            &cmdline("console=ttyS0"),
            GuestAddress(0x10_0000),
            0x20_0000,
            Some(InitrdConfig {
                address: 0,
                size: 0x1000,
            }),
        )
        .unwrap();

        let params = BootParams::read_from_guest(guest.guest_memory(), boot_info.boot_params_addr)
            .unwrap();
        assert_eq!(params.hdr.version.get(), 0x0202);
        assert!(!params.hdr.has_ramdisk());
    }

    #[test]
    fn test_kernel_above_4g() {
        let mut guest = guest();
        assert!(matches!(
            init_guest_boot_structure(
                &mut guest,
                &cmdline("console=ttyS0"),
                GuestAddress(1 << 32),
                0x20_0000,
                None,
            ),
            Err(BootError::AddressTooHigh(_, "kernel"))
        ));
        assert!(guest.boot_info().is_none());
    }

    #[test]
    fn test_boot_params_allocation_failure() {
        // Room for the command line but not for a whole page.
        let mem = GuestMemoryMmap::from_ranges(&[(GuestAddress(0), 0x2000)]).unwrap();
        let mut guest =
            GuestVm::new(mem, Box::new(HeadlessPlatform), Box::new(UnsupportedMapper)).unwrap();

        let err = init_guest_boot_structure(
            &mut guest,
            &cmdline("console=ttyS0"),
            GuestAddress(0x10_0000),
            0x20_0000,
            None,
        )
        .unwrap_err();
        assert!(matches!(
            err,
            BootError::Allocation {
                what: "boot params",
                ..
            }
        ));
        assert!(guest.boot_info().is_none());
    }

    #[cfg(target_arch = "x86_64")]
    #[test]
    fn test_init_guest_vcpu_entry() {
        let mut guest = guest();
        let mut regs = kvm_bindings::kvm_regs {
            rax: 1,
            ..Default::default()
        };

        assert!(matches!(
            init_guest_vcpu_entry(&guest, &mut regs, GuestAddress(0x10_0000)),
            Err(BootError::BootParamsNotPlaced)
        ));

        let boot_info = configure_boot_source(&mut guest, &BootSourceConfig::default()).unwrap();
        init_guest_vcpu_entry(&guest, &mut regs, GuestAddress(0x10_0000)).unwrap();
        assert_eq!(regs.rax, 0);
        assert_eq!(regs.rip, 0x10_0000);
        assert_eq!(regs.rsi, boot_info.boot_params_addr.0);
    }

    #[test]
    fn test_configure_boot_source_keeps_initrd() {
        let mut guest = guest();
        // The initrd covers the bottom of usable RAM.
        let config = BootSourceConfig {
            initrd: Some(InitrdConfig {
                address: 0x1000,
                size: 0x10_0000,
            }),
            ..Default::default()
        };

        let boot_info = configure_boot_source(&mut guest, &config).unwrap();
        assert!(boot_info.cmdline_addr.0 >= 0x10_1000);
        assert!(boot_info.boot_params_addr.0 >= 0x10_1000);

        let params = BootParams::read_from_guest(guest.guest_memory(), boot_info.boot_params_addr)
            .unwrap();
        assert_eq!(params.hdr.version.get(), 0x0204);
        assert_eq!(params.hdr.ramdisk_image.get(), 0x1000);
        assert_eq!(params.hdr.ramdisk_size.get(), 0x10_0000);
        assert_eq!(params.hdr.root_dev.get(), 0x0100);
        assert_eq!(params.as_bytes().len(), 0x1000);
    }

    #[test]
    fn test_configure_boot_source_rejects_config_first() {
        let mut guest = guest();
        let config = BootSourceConfig {
            boot_args: Some("a".repeat(crate::arch::CMDLINE_MAX_SIZE)),
            ..Default::default()
        };
        assert!(matches!(
            configure_boot_source(&mut guest, &config),
            Err(BootError::InvalidConfig(_))
        ));
        // Nothing was allocated.
        assert_eq!(
            guest.guest_ram_mut().allocate(1, 1).unwrap(),
            GuestAddress(crate::vstate::memory::MIN_ALLOC_ADDR)
        );
    }
}
