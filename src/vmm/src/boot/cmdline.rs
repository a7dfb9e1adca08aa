// Copyright 2023 Amazon.com, Inc. or its affiliates. All Rights Reserved.
// SPDX-License-Identifier: Apache-2.0

use linux_loader::cmdline::Cmdline;
use linux_loader::loader::load_cmdline;
use log::info;
use vm_memory::{GuestAddress, GuestMemory};

use super::BootError;
use crate::vstate::memory::GuestRam;

/// Copies the NUL terminated command line into freshly allocated guest RAM.
///
/// Returns the guest address of the string and its length without the NUL.
pub(crate) fn place_cmdline<M: GuestMemory>(
    mem: &M,
    ram: &mut GuestRam,
    cmdline: &Cmdline,
) -> Result<(GuestAddress, usize), BootError> {
    let len = cmdline.as_cstring()?.as_bytes().len();
    let size = len as u64 + 1;
    let addr = ram
        .allocate(size, 1)
        .map_err(|source| BootError::Allocation {
            what: "command line",
            size,
            source,
        })?;

    info!("Constructing guest cmdline at {:#x} of size {}", addr.0, len);
    load_cmdline(mem, addr, cmdline)?;
    Ok((addr, len))
}
