// Copyright 2023 Amazon.com, Inc. or its affiliates. All Rights Reserved.
// SPDX-License-Identifier: Apache-2.0

use boot_params::{E820Entry, E820Error, E820Table, E820Type};
use log::debug;

use crate::arch::FIRST_ADDR_PAST_32BITS;
use crate::vstate::memory::RamRegion;

/// Builds the E820 map describing `regions` to the guest.
///
/// Gaps between regions, and the space between the last region and 4 GiB, are reported as
/// reserved so that the map covers `[0, 4 GiB)` without holes. Adjacent regions are merged into
/// a single RAM entry.
pub(crate) fn build_e820_map(regions: &[RamRegion]) -> Result<E820Table, E820Error> {
    let mut table = E820Table::new();
    // The entry being grown. Starts as an empty reserved cursor at address 0.
    let mut current = E820Entry::new(0, 0, E820Type::Reserved);

    for region in regions.iter().filter(|region| region.size > 0) {
        let start = region.start.0;
        if current.end() != start {
            if current.size() != 0 {
                table.push(current)?;
            }
            // current.end() < start: regions are sorted and do not overlap.
            let gap_start = current.end();
            table.push(E820Entry::new(gap_start, start - gap_start, E820Type::Reserved))?;
            current = E820Entry::new(start, 0, E820Type::Ram);
        } else if current.size() == 0 {
            current = E820Entry::new(start, 0, E820Type::Ram);
        }
        current.set_size(region.end() - current.addr());
    }

    if current.size() != 0 {
        table.push(current)?;
    }
    let end = current.end();
    if end < FIRST_ADDR_PAST_32BITS {
        table.push(E820Entry::new(
            end,
            FIRST_ADDR_PAST_32BITS - end,
            E820Type::Reserved,
        ))?;
    }

    debug!("Final e820 map is:");
    for entry in table.iter() {
        debug!("\t{:?}", entry);
    }
    Ok(table)
}
