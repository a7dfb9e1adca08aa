// Copyright 2023 Amazon.com, Inc. or its affiliates. All Rights Reserved.
// SPDX-License-Identifier: Apache-2.0

//! Information the platform firmware collected before the VMM started.

use boot_params::VbeBootInfo;
use zerocopy::AsBytes;

/// Kinds of extended boot information a platform may provide.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum BootInfoKind {
    /// VESA BIOS extensions state, laid out as [`VbeBootInfo`].
    Vbe,
}

/// Errors associated with querying the platform firmware.
#[derive(Debug, PartialEq, Eq, thiserror::Error, displaydoc::Display)]
pub enum PlatformError {
    /// Boot information of kind {0:?} is not available
    NotPresent(BootInfoKind),
    /// Boot information needs {0} bytes, buffer holds {1}
    BufferTooSmall(usize, usize),
}

/// Read access to the firmware provided boot information.
pub trait PlatformBootInfo {
    /// Copies the boot information of `kind` into `buf` and returns the number of bytes written.
    fn read_extended_bootinfo(&self, kind: BootInfoKind, buf: &mut [u8])
        -> Result<usize, PlatformError>;
}

/// A platform without any extended boot information.
#[derive(Debug, Default)]
pub struct HeadlessPlatform;

impl PlatformBootInfo for HeadlessPlatform {
    fn read_extended_bootinfo(
        &self,
        kind: BootInfoKind,
        _buf: &mut [u8],
    ) -> Result<usize, PlatformError> {
        Err(PlatformError::NotPresent(kind))
    }
}

/// A platform whose firmware left VBE state behind.
#[derive(Debug)]
pub struct VbePlatform {
    info: VbeBootInfo,
}

impl VbePlatform {
    pub fn new(info: VbeBootInfo) -> Self {
        VbePlatform { info }
    }
}

impl PlatformBootInfo for VbePlatform {
    fn read_extended_bootinfo(
        &self,
        kind: BootInfoKind,
        buf: &mut [u8],
    ) -> Result<usize, PlatformError> {
        match kind {
            BootInfoKind::Vbe => {
                let bytes = self.info.as_bytes();
                let buf_len = buf.len();
                let dst = buf
                    .get_mut(..bytes.len())
                    .ok_or(PlatformError::BufferTooSmall(bytes.len(), buf_len))?;
                dst.copy_from_slice(bytes);
                Ok(bytes.len())
            }
        }
    }
}
