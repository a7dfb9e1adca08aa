// Copyright 2018 Amazon.com, Inc. or its affiliates. All Rights Reserved.
// SPDX-License-Identifier: Apache-2.0
//
// Portions Copyright 2017 The Chromium OS Authors. All rights reserved.
// Use of this source code is governed by a BSD-style license that can be
// found in the THIRD-PARTY file.

//! Guest boot construction and port I/O emulation for x86 guests.
//!
//! The boot builder synthesizes what a legacy bootloader would leave behind for a Linux kernel:
//! the command line, the zero page (setup header, E820 map, VESA screen info) and the register
//! state of the boot vCPU. The port I/O bus routes trapped `in`/`out` instructions to emulated
//! devices for the lifetime of the guest.

#![warn(missing_debug_implementations)]

/// Architecture specific bits of the guest: memory layout and vCPU registers.
pub mod arch;
/// Boot environment construction.
pub mod boot;
/// Guest physical address space reservations.
pub mod device_manager;
/// Emulated devices and the port I/O bus.
pub mod devices;
mod guest;
/// Metrics system.
pub mod logger;
/// Firmware provided boot information.
pub mod platform;
/// Configuration of the boot source.
pub mod vmm_config;
/// Guest memory bookkeeping.
pub mod vstate;

pub use crate::boot::{
    configure_boot_source, init_guest_boot_structure, init_guest_vcpu_entry, BootError,
    GuestBootInfo,
};
pub use crate::guest::{GuestVm, GuestVmError};
