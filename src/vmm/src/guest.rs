// Copyright 2023 Amazon.com, Inc. or its affiliates. All Rights Reserved.
// SPDX-License-Identifier: Apache-2.0

use std::sync::{Arc, Mutex};

use crate::boot::GuestBootInfo;
use crate::device_manager::resources::{ReservationMapper, ResourceAllocator};
use crate::devices::legacy::{Cmos, CMOS_DATA_PORT, CMOS_INDEX_PORT};
use crate::devices::{PioError, PortIoBus, PortIoInterface, PortRange};
use crate::platform::PlatformBootInfo;
use crate::vstate::memory::{GuestMemoryMmap, GuestRam, RamError};

/// Errors associated with creating a guest.
#[derive(Debug, thiserror::Error, displaydoc::Display)]
pub enum GuestVmError {
    /// Invalid guest RAM layout: {0}
    GuestRam(#[from] RamError),
    /// Failed to create the resource allocator: {0}
    ResourceAllocator(#[from] vm_allocator::Error),
    /// Failed to register legacy device: {0}
    LegacyDevice(#[from] PioError),
}

/// Everything the boot builder and the port dispatcher know about one guest.
pub struct GuestVm {
    pub(crate) guest_memory: GuestMemoryMmap,
    pub(crate) guest_ram: GuestRam,
    pub(crate) resource_allocator: ResourceAllocator,
    pub(crate) platform: Box<dyn PlatformBootInfo>,
    pub(crate) mapper: Box<dyn ReservationMapper>,
    pub(crate) pio_bus: PortIoBus,
    pub(crate) boot_info: Option<GuestBootInfo>,
}

impl std::fmt::Debug for GuestVm {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GuestVm")
            .field("guest_ram", &self.guest_ram)
            .field("pio_bus", &self.pio_bus)
            .field("boot_info", &self.boot_info)
            .finish_non_exhaustive()
    }
}

impl GuestVm {
    /// Creates the guest context on top of already allocated guest memory.
    pub fn new(
        guest_memory: GuestMemoryMmap,
        platform: Box<dyn PlatformBootInfo>,
        mapper: Box<dyn ReservationMapper>,
    ) -> Result<Self, GuestVmError> {
        let guest_ram = GuestRam::from_guest_memory(&guest_memory)?;
        Ok(GuestVm {
            guest_memory,
            guest_ram,
            resource_allocator: ResourceAllocator::new()?,
            platform,
            mapper,
            pio_bus: PortIoBus::new(),
            boot_info: None,
        })
    }

    /// Registers the legacy devices every PC guest expects.
    pub fn register_legacy_devices(&mut self) -> Result<(), GuestVmError> {
        let (below_4g, above_4g) = self.guest_ram.split_at_4g();
        let cmos = Arc::new(Mutex::new(Cmos::new(below_4g, above_4g)));
        self.pio_bus.add_handler(
            PortRange::new(CMOS_INDEX_PORT, CMOS_DATA_PORT),
            PortIoInterface::new(cmos, "cmos"),
        )?;
        Ok(())
    }

    pub fn guest_memory(&self) -> &GuestMemoryMmap {
        &self.guest_memory
    }

    pub fn guest_ram(&self) -> &GuestRam {
        &self.guest_ram
    }

    pub fn guest_ram_mut(&mut self) -> &mut GuestRam {
        &mut self.guest_ram
    }

    pub fn resource_allocator(&self) -> &ResourceAllocator {
        &self.resource_allocator
    }

    pub fn pio_bus(&self) -> &PortIoBus {
        &self.pio_bus
    }

    /// Mutable access to the port I/O table, for device registration.
    pub fn pio_bus_mut(&mut self) -> &mut PortIoBus {
        &mut self.pio_bus
    }

    /// Where the boot structures were placed, once `init_guest_boot_structure` succeeded.
    pub fn boot_info(&self) -> Option<GuestBootInfo> {
        self.boot_info
    }
}
