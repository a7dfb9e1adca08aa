// Copyright 2023 Amazon.com, Inc. or its affiliates. All Rights Reserved.
// SPDX-License-Identifier: Apache-2.0

use std::cell::RefCell;

pub use vm_allocator::AllocPolicy;
use vm_allocator::AddressAllocator;

use crate::arch;

/// Errors associated with reserving guest physical address space.
#[derive(Debug, thiserror::Error, displaydoc::Display)]
pub enum ReservationError {
    /// Range {0:#x} - {1:#x} is outside of every reservable window
    OutsideWindows(u64, u64),
    /// Range {0:#x} - {1:#x} overlaps an existing reservation
    Overlap(u64, u64),
    /// Failed to reserve guest address space: {0}
    Allocator(#[from] vm_allocator::Error),
}

/// Errors reported by the hypervisor layer when backing a reservation.
#[derive(Debug, thiserror::Error, displaydoc::Display)]
pub enum MapError {
    /// Failed to map reservation at {0:#x}: {1}
    Map(u64, String),
    /// Mapping reservations is not supported by this platform
    Unsupported,
}

/// A range of guest physical address space set aside for a mapping.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Reservation {
    /// First guest physical address of the range.
    pub addr: u64,
    /// Size of the range in bytes.
    pub size: u64,
}

/// Backs reservations with host memory. Implemented by the hypervisor layer.
pub trait ReservationMapper {
    /// Backs `reservation` with fresh memory, identity mapped into the guest.
    fn map(&mut self, reservation: &Reservation) -> Result<(), MapError>;
    /// Backs `reservation` with the host physical range starting at `phys_base`.
    fn map_at_base(&mut self, reservation: &Reservation, phys_base: u64) -> Result<(), MapError>;
}

/// Mapper for platforms that cannot map anything into the guest.
#[derive(Debug, Default)]
pub struct UnsupportedMapper;

impl ReservationMapper for UnsupportedMapper {
    fn map(&mut self, _reservation: &Reservation) -> Result<(), MapError> {
        Err(MapError::Unsupported)
    }

    fn map_at_base(&mut self, _reservation: &Reservation, _phys_base: u64) -> Result<(), MapError> {
        Err(MapError::Unsupported)
    }
}

/// A resource manager for guest physical address space that is not RAM
///
/// At the moment, we support:
///
/// * Exact reservations in the legacy hole below 1 MiB (VBE BIOS code)
/// * Exact or anonymous reservations in the 32-bit MMIO gap (frame buffers)
#[derive(Debug)]
pub struct ResourceAllocator {
    // Allocator for the legacy video/BIOS hole
    legacy_memory: RefCell<AddressAllocator>,
    // Allocator for memory in the MMIO address space
    mmio_memory: RefCell<AddressAllocator>,
    // Everything granted so far. `ExactMatch` alone accepts a range nested inside an earlier one.
    reserved: RefCell<Vec<Reservation>>,
}

impl ResourceAllocator {
    /// Create a new resource allocator covering the default x86 windows
    pub fn new() -> Result<Self, vm_allocator::Error> {
        Ok(Self {
            legacy_memory: RefCell::new(AddressAllocator::new(
                arch::LEGACY_HOLE_START,
                arch::LEGACY_HOLE_SIZE,
            )?),
            mmio_memory: RefCell::new(AddressAllocator::new(
                arch::MMIO_MEM_START,
                arch::MMIO_MEM_SIZE,
            )?),
            reserved: RefCell::new(Vec::new()),
        })
    }

    /// Reserve `[addr, addr + size)` exactly
    ///
    /// The range must lie completely inside the legacy hole or the MMIO gap.
    pub fn reserve_at(&self, addr: u64, size: u64) -> Result<Reservation, ReservationError> {
        let end = addr
            .checked_add(size)
            .ok_or(ReservationError::OutsideWindows(addr, u64::MAX))?;
        let inside = |start: u64, len: u64| addr >= start && end <= start + len;

        let allocator = if inside(arch::LEGACY_HOLE_START, arch::LEGACY_HOLE_SIZE) {
            &self.legacy_memory
        } else if inside(arch::MMIO_MEM_START, arch::MMIO_MEM_SIZE) {
            &self.mmio_memory
        } else {
            return Err(ReservationError::OutsideWindows(addr, end));
        };

        if self
            .reserved
            .borrow()
            .iter()
            .any(|r| r.addr < end && addr < r.addr + r.size)
        {
            return Err(ReservationError::Overlap(addr, end));
        }

        let range = allocator
            .borrow_mut()
            .allocate(size, 1, AllocPolicy::ExactMatch(addr))?;
        Ok(self.record(range.start(), size))
    }

    /// Reserve `size` bytes anywhere in the MMIO address space
    ///
    /// If it succeeds, the reservation starts on a page boundary.
    pub fn reserve_anon(&self, size: u64) -> Result<Reservation, ReservationError> {
        let range = self.mmio_memory.borrow_mut().allocate(
            size,
            arch::PAGE_SIZE,
            AllocPolicy::FirstMatch,
        )?;
        Ok(self.record(range.start(), size))
    }

    fn record(&self, addr: u64, size: u64) -> Reservation {
        let reservation = Reservation { addr, size };
        self.reserved.borrow_mut().push(reservation);
        reservation
    }
}
