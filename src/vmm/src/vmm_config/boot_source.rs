// Copyright 2018 Amazon.com, Inc. or its affiliates. All Rights Reserved.
// SPDX-License-Identifier: Apache-2.0

use linux_loader::cmdline::Cmdline;
use serde::{Deserialize, Serialize};

use crate::arch::CMDLINE_MAX_SIZE;

/// Default guest kernel command line:
/// - `reboot=k` shut down the guest on reboot, instead of well... rebooting;
/// - `panic=1` on panic, reboot after 1 second;
/// - `nomodule` disable loadable kernel module support;
/// - `earlyprintk=serial` early console on the legacy serial port.
pub const DEFAULT_KERNEL_CMDLINE: &str = "reboot=k panic=1 nomodule earlyprintk=serial";

/// Default load address of a bzImage protected mode kernel.
pub const DEFAULT_KERNEL_LOAD_ADDR: u64 = 0x10_0000;

/// Default physical alignment a relocatable kernel is asked to honour.
pub const DEFAULT_KERNEL_ALIGNMENT: u32 = 0x20_0000;

/// Errors associated with actions on `BootSourceConfig`.
#[derive(Debug, thiserror::Error, displaydoc::Display, PartialEq, Eq)]
pub enum BootSourceConfigError {
    /// The kernel command line is invalid: {0}
    InvalidKernelCommandLine(String),
    /// The kernel alignment {0:#x} is not a power of two
    InvalidKernelAlignment(u32),
    /// The initrd at {0:#x} of {1:#x} bytes does not fit in 32-bit address space
    InvalidInitrd(u64, u64),
}

/// Location of an initrd already placed in guest memory.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct InitrdConfig {
    /// Guest physical address of the first byte.
    pub address: u64,
    /// Size in bytes.
    pub size: u64,
}

fn default_kernel_load_addr() -> u64 {
    DEFAULT_KERNEL_LOAD_ADDR
}

fn default_kernel_alignment() -> u32 {
    DEFAULT_KERNEL_ALIGNMENT
}

/// Strongly typed data structure used to configure the boot source of the
/// guest.
#[derive(Clone, Debug, PartialEq, Eq, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct BootSourceConfig {
    /// The boot arguments to pass to the kernel. If this field is uninitialized,
    /// DEFAULT_KERNEL_CMDLINE is used.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub boot_args: Option<String>,
    /// Address of the 32-bit kernel entry point.
    #[serde(default = "default_kernel_load_addr")]
    pub kernel_load_addr: u64,
    #[serde(default = "default_kernel_alignment")]
    pub kernel_alignment: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub initrd: Option<InitrdConfig>,
}

impl Default for BootSourceConfig {
    fn default() -> Self {
        BootSourceConfig {
            boot_args: None,
            kernel_load_addr: DEFAULT_KERNEL_LOAD_ADDR,
            kernel_alignment: DEFAULT_KERNEL_ALIGNMENT,
            initrd: None,
        }
    }
}

impl BootSourceConfig {
    /// Checks the configuration and builds the kernel command line.
    pub fn cmdline(&self) -> Result<Cmdline, BootSourceConfigError> {
        if !self.kernel_alignment.is_power_of_two() {
            return Err(BootSourceConfigError::InvalidKernelAlignment(
                self.kernel_alignment,
            ));
        }
        if let Some(initrd) = self.initrd {
            let fits = initrd
                .address
                .checked_add(initrd.size)
                .map_or(false, |end| end <= 1 << 32);
            if initrd.address == 0 || !fits {
                return Err(BootSourceConfigError::InvalidInitrd(
                    initrd.address,
                    initrd.size,
                ));
            }
        }

        let mut cmdline = Cmdline::new(CMDLINE_MAX_SIZE)
            .map_err(|err| BootSourceConfigError::InvalidKernelCommandLine(err.to_string()))?;
        cmdline
            .insert_str(self.boot_args.as_deref().unwrap_or(DEFAULT_KERNEL_CMDLINE))
            .map_err(|err| BootSourceConfigError::InvalidKernelCommandLine(err.to_string()))?;
        Ok(cmdline)
    }
}
