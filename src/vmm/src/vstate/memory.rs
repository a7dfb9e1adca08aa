// Copyright 2023 Amazon.com, Inc. or its affiliates. All Rights Reserved.
// SPDX-License-Identifier: Apache-2.0

use bitflags::bitflags;
pub use vm_allocator::AllocPolicy;
use vm_allocator::AddressAllocator;
pub use vm_memory::GuestAddress;
use vm_memory::{GuestMemory, GuestMemoryRegion};

/// Guest memory backed by anonymous mappings, without dirty page tracking.
pub type GuestMemoryMmap = vm_memory::GuestMemoryMmap<()>;

/// Nothing is ever handed out below this address: the first page holds the real mode IVT and a
/// zero guest address reads as "absent" in the boot protocol.
pub const MIN_ALLOC_ADDR: u64 = 0x1000;

bitflags! {
    /// State of a guest RAM region.
    #[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
    pub struct RegionFlags: u32 {
        /// At least one byte of the region has been handed out.
        const ALLOCATED = 1 << 0;
    }
}

/// Errors associated with guest RAM bookkeeping.
#[derive(Debug, thiserror::Error, displaydoc::Display)]
pub enum RamError {
    /// The guest has no RAM regions
    NoRegions,
    /// Guest RAM region at {0:#x} has zero length
    EmptyRegion(u64),
    /// Guest RAM region at {0:#x} is not sorted or overlaps the previous one
    UnorderedRegion(u64),
    /// Invalid allocation request of {size:#x} bytes aligned to {alignment:#x}
    InvalidRequest { size: u64, alignment: u64 },
    /// Not enough free guest RAM for {0:#x} bytes
    OutOfMemory(u64),
    /// Range {0:#x} - {1:#x} is not backed by guest RAM
    NotRam(u64, u64),
    /// Range {0:#x} - {1:#x} overlaps guest RAM that is already in use
    AlreadyAllocated(u64, u64),
    /// Address allocator error: {0}
    Allocator(#[from] vm_allocator::Error),
}

/// A contiguous range of guest physical RAM.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct RamRegion {
    pub start: GuestAddress,
    pub size: u64,
    pub flags: RegionFlags,
}

impl RamRegion {
    pub fn new(start: GuestAddress, size: u64) -> Self {
        RamRegion {
            start,
            size,
            flags: RegionFlags::empty(),
        }
    }

    /// First address past the region.
    pub fn end(&self) -> u64 {
        self.start.0.saturating_add(self.size)
    }
}

/// Allocator for guest RAM.
///
/// Keeps the guest RAM layout sorted by address, together with one address allocator per region
/// that tracks which parts have already been used for boot structures, the kernel and the initrd.
#[derive(Debug)]
pub struct GuestRam {
    regions: Vec<RamRegion>,
    // `None` for regions that lie entirely below `MIN_ALLOC_ADDR`.
    allocators: Vec<Option<AddressAllocator>>,
    // Every range handed out so far, as `[start, end)`. `ExactMatch` on its own accepts a
    // request nested inside an earlier, larger allocation.
    used: Vec<(u64, u64)>,
}

impl GuestRam {
    /// Creates the allocator from a list of regions sorted by start address.
    pub fn new(regions: Vec<RamRegion>) -> Result<Self, RamError> {
        if regions.is_empty() {
            return Err(RamError::NoRegions);
        }

        let mut prev_end = 0;
        let mut allocators = Vec::with_capacity(regions.len());
        for (idx, region) in regions.iter().enumerate() {
            if region.size == 0 {
                return Err(RamError::EmptyRegion(region.start.0));
            }
            if idx > 0 && region.start.0 < prev_end {
                return Err(RamError::UnorderedRegion(region.start.0));
            }
            prev_end = region.end();

            let base = region.start.0.max(MIN_ALLOC_ADDR);
            let allocator = if base < region.end() {
                Some(AddressAllocator::new(base, region.end() - base)?)
            } else {
                None
            };
            allocators.push(allocator);
        }

        Ok(GuestRam {
            regions,
            allocators,
            used: Vec::new(),
        })
    }

    /// Describes the RAM of an existing guest memory object.
    pub fn from_guest_memory<M: GuestMemory>(mem: &M) -> Result<Self, RamError> {
        let mut regions: Vec<RamRegion> = mem
            .iter()
            .map(|region| RamRegion::new(region.start_addr(), region.len()))
            .collect();
        regions.sort_by_key(|region| region.start);
        Self::new(regions)
    }

    /// The RAM regions, sorted by start address.
    pub fn regions(&self) -> &[RamRegion] {
        &self.regions
    }

    /// Total amount of RAM below and above 4 GiB.
    pub fn split_at_4g(&self) -> (u64, u64) {
        const FOUR_GIB: u64 = 1 << 32;
        self.regions.iter().fold((0, 0), |(low, high), region| {
            let below = region.end().min(FOUR_GIB).saturating_sub(region.start.0);
            (low + below, high + region.size - below)
        })
    }

    /// Allocates `size` bytes of guest RAM, first fit over the regions.
    ///
    /// # Arguments
    ///
    /// * `size` - The size in bytes of the memory to allocate
    /// * `alignment` - The alignment of the address of the first byte, a power of two
    pub fn allocate(&mut self, size: u64, alignment: u64) -> Result<GuestAddress, RamError> {
        if size == 0 || !alignment.is_power_of_two() {
            return Err(RamError::InvalidRequest { size, alignment });
        }

        for (region, allocator) in self.regions.iter_mut().zip(self.allocators.iter_mut()) {
            let Some(allocator) = allocator else {
                continue;
            };
            if let Ok(range) = allocator.allocate(size, alignment, AllocPolicy::FirstMatch) {
                region.flags.insert(RegionFlags::ALLOCATED);
                self.used.push((range.start(), range.start() + size));
                return Ok(GuestAddress(range.start()));
            }
        }

        Err(RamError::OutOfMemory(size))
    }

    /// Marks `[addr, addr + size)` as used so that later allocations avoid it.
    ///
    /// The range may span several adjacent regions but must be entirely backed by RAM. Either the
    /// whole range is marked or nothing is.
    pub fn mark_allocated(&mut self, addr: GuestAddress, size: u64) -> Result<(), RamError> {
        let start = addr.0;
        let end = start
            .checked_add(size)
            .ok_or(RamError::NotRam(start, u64::MAX))?;
        if size == 0 {
            return Ok(());
        }

        let covered: u64 = self
            .regions
            .iter()
            .map(|region| region.end().min(end).saturating_sub(region.start.0.max(start)))
            .sum();
        if covered != size {
            return Err(RamError::NotRam(start, end));
        }
        // Low memory below MIN_ALLOC_ADDR is never tracked.
        let tracked_start = start.max(MIN_ALLOC_ADDR);
        if self
            .used
            .iter()
            .any(|&(lo, hi)| lo < end && tracked_start < hi)
        {
            return Err(RamError::AlreadyAllocated(start, end));
        }

        let mut taken = Vec::new();
        let mut result = Ok(());
        for (idx, (region, allocator)) in self
            .regions
            .iter()
            .zip(self.allocators.iter_mut())
            .enumerate()
        {
            let Some(allocator) = allocator else {
                continue;
            };
            let lo = region.start.0.max(start).max(MIN_ALLOC_ADDR);
            let hi = region.end().min(end);
            if lo >= hi {
                continue;
            }
            match allocator.allocate(hi - lo, 1, AllocPolicy::ExactMatch(lo)) {
                Ok(range) => taken.push((idx, range)),
                Err(err) => {
                    result = Err(RamError::Allocator(err));
                    break;
                }
            }
        }

        if result.is_err() {
            for (idx, range) in taken {
                if let Some(allocator) = self.allocators[idx].as_mut() {
                    // Freeing a range we just allocated cannot fail.
                    let _ = allocator.free(&range);
                }
            }
            return result;
        }

        for (idx, range) in taken {
            self.regions[idx].flags.insert(RegionFlags::ALLOCATED);
            self.used.push((range.start(), range.end().saturating_add(1)));
        }
        Ok(())
    }
}
