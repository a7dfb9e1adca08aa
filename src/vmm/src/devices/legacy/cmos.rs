// Copyright 2025 Red Hat, Inc.
// SPDX-License-Identifier: Apache-2.0

use std::cmp::min;

use log::debug;

use crate::devices::pio::{PortIoError, PortIoHandler};

/// Port selecting the CMOS register.
pub const CMOS_INDEX_PORT: u16 = 0x70;
/// Port reading the selected CMOS register.
pub const CMOS_DATA_PORT: u16 = 0x71;

const INDEX_MASK: u8 = 0x7f;
const DATA_LEN: usize = 128;

/// CMOS memory, as far as firmware and kernels read it for the memory size.
#[derive(Debug)]
pub struct Cmos {
    index: u8,
    data: [u8; DATA_LEN],
}

impl Cmos {
    pub fn new(mem_below_4g: u64, mem_above_4g: u64) -> Cmos {
        debug!("cmos: mem_below_4g={mem_below_4g:#x} mem_above_4g={mem_above_4g:#x}");

        let mut data = [0u8; DATA_LEN];

        // Extended memory from 16 MB to 4 GB in units of 64 KB
        let ext_mem = min(
            0xFFFF,
            mem_below_4g.saturating_sub(16 * 1024 * 1024) / (64 * 1024),
        );
        data[0x34] = ext_mem as u8;
        data[0x35] = (ext_mem >> 8) as u8;

        // High memory (> 4GB) in units of 64 KB
        let high_mem = min(0xFFFFFF, mem_above_4g / (64 * 1024));
        data[0x5b] = high_mem as u8;
        data[0x5c] = (high_mem >> 8) as u8;
        data[0x5d] = (high_mem >> 16) as u8;

        Cmos { index: 0, data }
    }
}

impl PortIoHandler for Cmos {
    fn read(&mut self, port: u16, size: u8) -> Result<u32, PortIoError> {
        if size != 1 {
            return Err(PortIoError::UnsupportedSize(port, size));
        }

        match port {
            CMOS_INDEX_PORT => Ok(self.index.into()),
            CMOS_DATA_PORT => Ok(self.data[usize::from(self.index & INDEX_MASK)].into()),
            _ => Err(PortIoError::UnsupportedPort(port)),
        }
    }

    fn write(&mut self, port: u16, size: u8, value: u32) -> Result<(), PortIoError> {
        if size != 1 {
            return Err(PortIoError::UnsupportedSize(port, size));
        }

        match port {
            // Bit 7 of the index masks NMIs, which are not emulated.
            CMOS_INDEX_PORT => self.index = value as u8 & INDEX_MASK,
            CMOS_DATA_PORT => debug!("cmos: ignoring write to register {:#x}", self.index),
            _ => return Err(PortIoError::UnsupportedPort(port)),
        }
        Ok(())
    }
}
